//! Dissector registration.
//!
//! Registration happens once, through a [`RegistryBuilder`]. Protocols, fields, subtree types,
//! dissector handles, dissector tables and heuristic lists are all collected there, and
//! [`RegistryBuilder::build`] freezes them into a [`Registry`]. The registry is never modified
//! afterwards and may be shared by any number of threads dissecting packets.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dissect::Protocol;
use crate::frame::{self, Builtins};
use crate::proto::{EttIndex, FieldTable, HeaderFieldInfo, HfIndex, ProtoId, ProtoItem};
use crate::{DissectError, FieldType, PacketContext, Tvb};

/// Name of the table the driver looks link types up in.
pub const WTAP_ENCAP_TABLE: &str = "wtap_encap";

/// Something that can decode a buffer into the tree.
///
/// A dissector returns the number of bytes it consumed. Dissectors called from a heuristic list
/// return 0 to decline the buffer, in which case everything they did is undone. An error from a
/// heuristic dissector means it accepted the buffer and then found it broken.
pub trait Dissector: Send + Sync {
    fn dissect(
        &self,
        tvb: &Tvb,
        cx: &mut PacketContext<'_>,
        tree: ProtoItem,
    ) -> Result<usize, DissectError>;
}

impl<F> Dissector for F
where
    F: Fn(&Tvb, &mut PacketContext<'_>, ProtoItem) -> Result<usize, DissectError> + Send + Sync,
{
    fn dissect(
        &self,
        tvb: &Tvb,
        cx: &mut PacketContext<'_>,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        (self)(tvb, cx, tree)
    }
}

struct HandleInner {
    name: String,
    proto: Option<ProtoId>,
    dissector: Box<dyn Dissector>,
}

/// A shareable reference to a dissector, optionally tied to the protocol it decodes.
#[derive(Clone)]
pub struct DissectorHandle(Arc<HandleInner>);

impl DissectorHandle {
    pub fn new(
        name: impl Into<String>,
        proto: Option<ProtoId>,
        dissector: impl Dissector + 'static,
    ) -> Self {
        DissectorHandle(Arc::new(HandleInner {
            name: name.into(),
            proto,
            dissector: Box::new(dissector),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn protocol(&self) -> Option<ProtoId> {
        self.0.proto
    }

    pub(crate) fn dissector(&self) -> &dyn Dissector {
        self.0.dissector.as_ref()
    }

    /// Whether both handles refer to the same registration.
    pub fn ptr_eq(&self, other: &DissectorHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DissectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DissectorHandle")
            .field("name", &self.0.name)
            .field("proto", &self.0.proto)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKey {
    Uint(u32),
    String(String),
    Payload,
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::Uint(key) => write!(f, "{key}"),
            TableKey::String(key) => write!(f, "\"{key}\""),
            TableKey::Payload => f.write_str("payload"),
        }
    }
}

/// A binding that replaced an earlier one during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub table: String,
    pub key: TableKey,
    pub replaced: String,
    pub by: String,
}

/// Maps keys taken from a lower layer (a port, an ethertype, a string) to the dissector of the
/// next layer. A table may also have a single payload binding, used by protocols whose payload
/// carries no type information (the "decode as" case).
#[derive(Debug, Clone)]
pub struct DissectorTable {
    name: String,
    uints: HashMap<u32, DissectorHandle>,
    strings: HashMap<String, DissectorHandle>,
    payload: Option<DissectorHandle>,
}

impl DissectorTable {
    fn new(name: &str) -> Self {
        DissectorTable {
            name: name.to_owned(),
            uints: HashMap::new(),
            strings: HashMap::new(),
            payload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_uint(&self, key: u32) -> Option<&DissectorHandle> {
        self.uints.get(&key)
    }

    pub fn get_string(&self, key: &str) -> Option<&DissectorHandle> {
        self.strings.get(key)
    }

    pub fn payload(&self) -> Option<&DissectorHandle> {
        self.payload.as_ref()
    }

    pub fn len(&self) -> usize {
        self.uints.len() + self.strings.len() + usize::from(self.payload.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicEntry {
    short_name: String,
    handle: DissectorHandle,
    priority: i32,
    enabled: bool,
    seq: usize,
}

impl HeuristicEntry {
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn handle(&self) -> &DissectorHandle {
        &self.handle
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Candidates for a payload that a lower layer cannot attribute by key. Once built, entries are
/// ordered by descending priority, ties in registration order.
#[derive(Debug, Clone)]
pub struct HeuristicList {
    name: String,
    entries: Vec<HeuristicEntry>,
}

impl HeuristicList {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[HeuristicEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub id: ProtoId,
    /// Long name, e.g. "User Datagram Protocol".
    pub name: String,
    /// Short name used in columns and annotations, e.g. "UDP".
    pub short_name: String,
    /// Filter name, e.g. "udp".
    pub filter: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Protocols(Vec<ProtocolInfo>);

impl Protocols {
    pub(crate) fn register(
        &mut self,
        fields: &mut FieldTable,
        name: &str,
        short_name: &str,
        filter: &str,
    ) -> ProtoId {
        if let Some(existing) = self.find(filter) {
            warn!(filter, "protocol registered twice, keeping the first registration");
            return existing.id;
        }
        let id = ProtoId(fields.register(HeaderFieldInfo::new(
            name,
            filter,
            FieldType::Protocol,
        )));
        self.0.push(ProtocolInfo {
            id,
            name: name.to_owned(),
            short_name: short_name.to_owned(),
            filter: filter.to_owned(),
        });
        id
    }

    fn get(&self, id: ProtoId) -> Option<&ProtocolInfo> {
        self.0.iter().find(|p| p.id == id)
    }

    fn find(&self, filter: &str) -> Option<&ProtocolInfo> {
        self.0.iter().find(|p| p.filter == filter)
    }
}

/// Collects everything dissectors register. See the [module docs](self).
pub struct RegistryBuilder {
    fields: FieldTable,
    protocols: Protocols,
    handles: HashMap<String, DissectorHandle>,
    tables: HashMap<String, DissectorTable>,
    heuristics: HashMap<String, HeuristicList>,
    duplicates: Vec<Duplicate>,
    builtins: Builtins,
    frame_handle: DissectorHandle,
    data_handle: DissectorHandle,
    heuristic_seq: usize,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// A builder with the built-in protocols (`frame`, `data`, `_ws.malformed`, `_ws.expert`)
    /// and the link type table already registered.
    pub fn new() -> Self {
        let mut fields = FieldTable::new();
        let mut protocols = Protocols::default();
        let builtins = Builtins::register(&mut fields, &mut protocols);
        let frame_handle =
            DissectorHandle::new("frame", Some(builtins.frame), frame::dissect_frame);
        let data_handle = DissectorHandle::new("data", Some(builtins.data), frame::dissect_data);

        let mut builder = RegistryBuilder {
            fields,
            protocols,
            handles: HashMap::new(),
            tables: HashMap::new(),
            heuristics: HashMap::new(),
            duplicates: Vec::new(),
            builtins,
            frame_handle: frame_handle.clone(),
            data_handle: data_handle.clone(),
            heuristic_seq: 0,
        };
        builder.handles.insert("frame".to_owned(), frame_handle);
        builder.handles.insert("data".to_owned(), data_handle);
        builder.register_table(WTAP_ENCAP_TABLE);
        builder
    }

    pub fn register_protocol(&mut self, name: &str, short_name: &str, filter: &str) -> ProtoId {
        self.protocols
            .register(&mut self.fields, name, short_name, filter)
    }

    /// Registers a protocol type generated by `#[derive(Protocol)]`, along with its fields and
    /// bindings.
    pub fn register<P: Protocol>(&mut self) -> ProtoId {
        let id = P::proto_register(self);
        P::proto_reg_handoff(self);
        id
    }

    pub fn register_field(&mut self, info: HeaderFieldInfo) -> HfIndex {
        self.fields.register(info)
    }

    pub fn get_or_create_text_node(
        &mut self,
        name: &str,
        abbrev: &str,
        parent: Option<ProtoId>,
    ) -> HfIndex {
        self.fields.get_or_create_text_node(name, abbrev, parent)
    }

    pub fn register_subtree(&mut self) -> EttIndex {
        self.fields.register_subtree()
    }

    pub fn get_or_create_ett(&mut self, name: &str) -> EttIndex {
        self.fields.get_or_create_ett(name)
    }

    pub fn find_field(&self, abbrev: &str) -> Option<HfIndex> {
        self.fields.find(abbrev)
    }

    pub fn find_protocol(&self, filter: &str) -> Option<ProtoId> {
        self.protocols.find(filter).map(|p| p.id)
    }

    /// Creates a named handle which other dissectors can look up. Registering a name again
    /// replaces the previous handle.
    pub fn register_dissector(
        &mut self,
        name: &str,
        proto: Option<ProtoId>,
        dissector: impl Dissector + 'static,
    ) -> DissectorHandle {
        let handle = DissectorHandle::new(name, proto, dissector);
        if self
            .handles
            .insert(name.to_owned(), handle.clone())
            .is_some()
        {
            warn!(name, "dissector registered twice, the last registration wins");
        }
        match name {
            "frame" => self.frame_handle = handle.clone(),
            "data" => self.data_handle = handle.clone(),
            _ => {}
        }
        handle
    }

    /// Creates an anonymous handle, named after its protocol.
    pub fn create_dissector_handle(
        &mut self,
        proto: ProtoId,
        dissector: impl Dissector + 'static,
    ) -> DissectorHandle {
        let name = self
            .protocols
            .get(proto)
            .map_or_else(String::new, |p| p.filter.clone());
        DissectorHandle::new(name, Some(proto), dissector)
    }

    pub fn find_dissector(&self, name: &str) -> Option<DissectorHandle> {
        self.handles.get(name).cloned()
    }

    fn table_entry(&mut self, name: &str) -> &mut DissectorTable {
        self.tables
            .entry(name.to_owned())
            .or_insert_with(|| DissectorTable::new(name))
    }

    /// Creates the table if it does not exist yet. Binding to a table that was never registered
    /// also creates it, so registration order between protocols does not matter.
    pub fn register_table(&mut self, name: &str) {
        self.table_entry(name);
    }

    fn note_duplicate(
        &mut self,
        table: &str,
        key: TableKey,
        previous: Option<DissectorHandle>,
        handle: &DissectorHandle,
    ) {
        let Some(previous) = previous.filter(|p| !p.ptr_eq(handle)) else {
            return;
        };
        warn!(
            table,
            %key,
            replaced = previous.name(),
            by = handle.name(),
            "dissector table entry overwritten"
        );
        self.duplicates.push(Duplicate {
            table: table.to_owned(),
            key,
            replaced: previous.name().to_owned(),
            by: handle.name().to_owned(),
        });
    }

    pub fn add_uint(&mut self, table: &str, key: u32, handle: &DissectorHandle) {
        let previous = self.table_entry(table).uints.insert(key, handle.clone());
        self.note_duplicate(table, TableKey::Uint(key), previous, handle);
    }

    pub fn add_uint_range(
        &mut self,
        table: &str,
        keys: RangeInclusive<u32>,
        handle: &DissectorHandle,
    ) {
        for key in keys {
            self.add_uint(table, key, handle);
        }
    }

    pub fn add_string(&mut self, table: &str, key: &str, handle: &DissectorHandle) {
        let previous = self
            .table_entry(table)
            .strings
            .insert(key.to_owned(), handle.clone());
        self.note_duplicate(table, TableKey::String(key.to_owned()), previous, handle);
    }

    /// Binds the payload of `table`, for tables whose parent protocol has no key to offer.
    pub fn set_payload(&mut self, table: &str, handle: &DissectorHandle) {
        let previous = self.table_entry(table).payload.replace(handle.clone());
        self.note_duplicate(table, TableKey::Payload, previous, handle);
    }

    pub fn register_heuristic_list(&mut self, name: &str) {
        self.heuristics
            .entry(name.to_owned())
            .or_insert_with(|| HeuristicList {
                name: name.to_owned(),
                entries: Vec::new(),
            });
    }

    /// Adds a candidate to a heuristic list. Higher priorities are tried first.
    pub fn add_heuristic(
        &mut self,
        list: &str,
        short_name: &str,
        handle: &DissectorHandle,
        priority: i32,
    ) {
        self.register_heuristic_list(list);
        let seq = self.heuristic_seq;
        self.heuristic_seq += 1;

        let Some(list_entry) = self.heuristics.get_mut(list) else {
            return;
        };
        let before = list_entry.entries.len();
        list_entry.entries.retain(|e| e.short_name != short_name);
        if list_entry.entries.len() != before {
            warn!(list, short_name, "heuristic dissector registered twice");
        }
        list_entry.entries.push(HeuristicEntry {
            short_name: short_name.to_owned(),
            handle: handle.clone(),
            priority,
            enabled: true,
            seq,
        });
    }

    /// Enables or disables a heuristic candidate. Returns false if there is no such candidate.
    pub fn set_heuristic_enabled(&mut self, list: &str, short_name: &str, enabled: bool) -> bool {
        let entry = self
            .heuristics
            .get_mut(list)
            .and_then(|l| l.entries.iter_mut().find(|e| e.short_name == short_name));
        match entry {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn build(mut self) -> Registry {
        for list in self.heuristics.values_mut() {
            list.entries
                .sort_by_key(|e| (Reverse(e.priority), e.seq));
        }
        debug!(
            fields = self.fields.len(),
            tables = self.tables.len(),
            heuristic_lists = self.heuristics.len(),
            "registry built"
        );
        Registry {
            fields: Arc::new(self.fields),
            protocols: self.protocols,
            handles: self.handles,
            tables: self.tables,
            heuristics: self.heuristics,
            duplicates: self.duplicates,
            builtins: self.builtins,
            frame_handle: self.frame_handle,
            data_handle: self.data_handle,
        }
    }
}

/// The frozen result of registration. See the [module docs](self).
#[derive(Debug)]
pub struct Registry {
    fields: Arc<FieldTable>,
    protocols: Protocols,
    handles: HashMap<String, DissectorHandle>,
    tables: HashMap<String, DissectorTable>,
    heuristics: HashMap<String, HeuristicList>,
    duplicates: Vec<Duplicate>,
    builtins: Builtins,
    frame_handle: DissectorHandle,
    data_handle: DissectorHandle,
}

impl Registry {
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub(crate) fn field_table(&self) -> Arc<FieldTable> {
        Arc::clone(&self.fields)
    }

    pub fn protocol(&self, id: ProtoId) -> Option<&ProtocolInfo> {
        self.protocols.get(id)
    }

    pub fn find_protocol(&self, filter: &str) -> Option<&ProtocolInfo> {
        self.protocols.find(filter)
    }

    pub fn find_dissector(&self, name: &str) -> Option<&DissectorHandle> {
        self.handles.get(name)
    }

    pub fn table(&self, name: &str) -> Option<&DissectorTable> {
        self.tables.get(name)
    }

    pub fn heuristic_list(&self, name: &str) -> Option<&HeuristicList> {
        self.heuristics.get(name)
    }

    /// Table bindings that were overwritten during registration.
    pub fn duplicates(&self) -> &[Duplicate] {
        &self.duplicates
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub(crate) fn frame_handle(&self) -> &DissectorHandle {
        &self.frame_handle
    }

    pub(crate) fn data_handle(&self) -> &DissectorHandle {
        &self.data_handle
    }
}

#[cfg(test)]
mod test_registry {
    use super::*;

    fn nop(_tvb: &Tvb, _cx: &mut PacketContext<'_>, _tree: ProtoItem) -> Result<usize, DissectError> {
        Ok(0)
    }

    #[test]
    fn registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
        assert_send_sync::<DissectorHandle>();
    }

    #[test]
    fn builtins_are_registered() {
        let registry = RegistryBuilder::new().build();
        assert!(registry.table(WTAP_ENCAP_TABLE).is_some());
        assert!(registry.find_dissector("data").is_some());
        assert!(registry.find_protocol("frame").is_some());
        assert!(registry.find_protocol("_ws.malformed").is_some());
        assert!(registry.fields().find("_ws.expert").is_some());
    }

    #[test]
    fn last_binding_wins_and_is_recorded() {
        let mut builder = RegistryBuilder::new();
        let a = builder.register_dissector("a", None, nop);
        let b = builder.register_dissector("b", None, nop);
        builder.register_table("t");
        builder.register_table("t");
        builder.add_uint("t", 7, &a);
        builder.add_uint("t", 7, &a);
        builder.add_uint("t", 7, &b);
        let registry = builder.build();

        let table = registry.table("t").unwrap();
        assert_eq!(table.get_uint(7).map(|h| h.name()), Some("b"));
        assert_eq!(
            registry.duplicates(),
            &[Duplicate {
                table: "t".to_owned(),
                key: TableKey::Uint(7),
                replaced: "a".to_owned(),
                by: "b".to_owned(),
            }]
        );
    }

    #[test]
    fn ranges_strings_and_payloads() {
        let mut builder = RegistryBuilder::new();
        let h = builder.register_dissector("h", None, nop);
        builder.add_uint_range("port", 5000..=5002, &h);
        builder.add_string("media", "text/plain", &h);
        builder.set_payload("proto.payload", &h);
        let registry = builder.build();

        assert_eq!(registry.table("port").map(DissectorTable::len), Some(3));
        assert!(registry.table("port").unwrap().get_uint(5003).is_none());
        assert!(registry
            .table("media")
            .unwrap()
            .get_string("text/plain")
            .is_some());
        assert!(registry.table("proto.payload").unwrap().payload().is_some());
    }

    #[test]
    fn heuristics_by_priority_then_registration() {
        let mut builder = RegistryBuilder::new();
        let h = builder.register_dissector("h", None, nop);
        builder.add_heuristic("udp", "low", &h, -1);
        builder.add_heuristic("udp", "first", &h, 0);
        builder.add_heuristic("udp", "high", &h, 10);
        builder.add_heuristic("udp", "second", &h, 0);
        assert!(builder.set_heuristic_enabled("udp", "second", false));
        assert!(!builder.set_heuristic_enabled("udp", "missing", false));
        let registry = builder.build();

        let list = registry.heuristic_list("udp").unwrap();
        let names: Vec<_> = list.entries().iter().map(|e| e.short_name()).collect();
        assert_eq!(names, ["high", "first", "second", "low"]);
        assert!(!list.entries()[2].enabled());
    }

    #[test]
    fn protocols_are_unique_by_filter() {
        let mut builder = RegistryBuilder::new();
        let a = builder.register_protocol("Foo Protocol", "FOO", "foo");
        let b = builder.register_protocol("Foo Again", "FOO2", "foo");
        assert_eq!(a, b);
        let registry = builder.build();
        assert_eq!(registry.protocol(a).map(|p| p.short_name.as_str()), Some("FOO"));
    }
}
