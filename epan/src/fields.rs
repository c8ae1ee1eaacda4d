use std::collections::HashMap;

use crate::ftypes::FieldValue;

/// A key-value store of fields saved while dissecting a packet. Each key is the filter name of
/// the field, and a field may be saved several times.
#[derive(Debug, Clone, Default)]
pub struct FieldsStore(HashMap<String, Vec<FieldValue>>);

impl FieldsStore {
    pub fn insert(&mut self, filter: &str, value: FieldValue) {
        self.0.entry(filter.to_string()).or_default().push(value);
    }

    pub fn get(&self, filter: &str) -> Option<&FieldValue> {
        self.0.get(filter).and_then(|xs| xs.first())
    }

    pub fn get_multi(&self, filter: &str) -> Option<&[FieldValue]> {
        self.0.get(filter).map(|xs| xs.as_slice())
    }

    pub fn get_u8(&self, filter: &str) -> Option<u8> {
        self.get_u64(filter).and_then(|v| v.try_into().ok())
    }

    pub fn get_u16(&self, filter: &str) -> Option<u16> {
        self.get_u64(filter).and_then(|v| v.try_into().ok())
    }

    pub fn get_u32(&self, filter: &str) -> Option<u32> {
        self.get_u64(filter).and_then(|v| v.try_into().ok())
    }

    pub fn get_u64(&self, filter: &str) -> Option<u64> {
        self.get(filter).and_then(FieldValue::as_u64)
    }

    pub fn get_i64(&self, filter: &str) -> Option<i64> {
        self.get(filter).and_then(FieldValue::as_i64)
    }

    pub fn get_bytes(&self, filter: &str) -> Option<&[u8]> {
        self.get(filter).and_then(FieldValue::as_bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
