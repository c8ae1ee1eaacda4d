//! Typed field values.
//!
//! [`FieldType`] is the closed set of kinds a header field can be declared with. Each kind knows
//! how wide it is on the wire, how to decode itself from a [`Tvb`] or from user supplied text, how
//! values of its kind compare, and how they are displayed.

use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tvb::{Encoding, Tvb};
use crate::DissectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// No value, used for labels and subtree roots.
    None,
    Protocol,
    Boolean,
    Uint8,
    Uint16,
    Uint24,
    Uint32,
    Uint40,
    Uint48,
    Uint56,
    Uint64,
    Int8,
    Int16,
    Int24,
    Int32,
    Int40,
    Int48,
    Int56,
    Int64,
    Float,
    Double,
    AbsoluteTime,
    RelativeTime,
    String,
    Bytes,
    Ether,
    Ipv4,
    Ipv6,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::None => "FT_NONE",
            FieldType::Protocol => "FT_PROTOCOL",
            FieldType::Boolean => "FT_BOOLEAN",
            FieldType::Uint8 => "FT_UINT8",
            FieldType::Uint16 => "FT_UINT16",
            FieldType::Uint24 => "FT_UINT24",
            FieldType::Uint32 => "FT_UINT32",
            FieldType::Uint40 => "FT_UINT40",
            FieldType::Uint48 => "FT_UINT48",
            FieldType::Uint56 => "FT_UINT56",
            FieldType::Uint64 => "FT_UINT64",
            FieldType::Int8 => "FT_INT8",
            FieldType::Int16 => "FT_INT16",
            FieldType::Int24 => "FT_INT24",
            FieldType::Int32 => "FT_INT32",
            FieldType::Int40 => "FT_INT40",
            FieldType::Int48 => "FT_INT48",
            FieldType::Int56 => "FT_INT56",
            FieldType::Int64 => "FT_INT64",
            FieldType::Float => "FT_FLOAT",
            FieldType::Double => "FT_DOUBLE",
            FieldType::AbsoluteTime => "FT_ABSOLUTE_TIME",
            FieldType::RelativeTime => "FT_RELATIVE_TIME",
            FieldType::String => "FT_STRING",
            FieldType::Bytes => "FT_BYTES",
            FieldType::Ether => "FT_ETHER",
            FieldType::Ipv4 => "FT_IPv4",
            FieldType::Ipv6 => "FT_IPv6",
        }
    }

    /// Width in bytes of integer kinds.
    fn int_width(self) -> Option<usize> {
        use FieldType::*;
        match self {
            Uint8 | Int8 => Some(1),
            Uint16 | Int16 => Some(2),
            Uint24 | Int24 => Some(3),
            Uint32 | Int32 => Some(4),
            Uint40 | Int40 => Some(5),
            Uint48 | Int48 => Some(6),
            Uint56 | Int56 => Some(7),
            Uint64 | Int64 => Some(8),
            _ => Option::None,
        }
    }

    /// The natural number of bytes the kind occupies on the wire, if it is fixed.
    pub fn wire_width(self) -> Option<usize> {
        match self {
            FieldType::Float => Some(4),
            FieldType::Double => Some(8),
            FieldType::Ether => Some(6),
            FieldType::Ipv4 => Some(4),
            FieldType::Ipv6 => Some(16),
            _ => self.int_width(),
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            FieldType::Uint8
                | FieldType::Uint16
                | FieldType::Uint24
                | FieldType::Uint32
                | FieldType::Uint40
                | FieldType::Uint48
                | FieldType::Uint56
                | FieldType::Uint64
        )
    }

    pub fn is_signed(self) -> bool {
        self.int_width().is_some() && !self.is_unsigned()
    }

    pub fn is_integer(self) -> bool {
        self.int_width().is_some()
    }

    /// Decodes a value of this kind from `len` bytes at `offset`.
    ///
    /// Integers may be shorter than their declared width. Booleans take 1 to 8 bytes. Times
    /// take 4 bytes (seconds) or 8 bytes (seconds then nanoseconds).
    pub fn from_tvb(
        self,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        enc: Encoding,
    ) -> Result<FieldValue, DissectError> {
        let invalid = || DissectError::InvalidLength { ftype: self, len };

        let value = match self {
            FieldType::None => {
                tvb.ensure_bytes_exist(offset, len)?;
                FieldValue::None
            }
            FieldType::Protocol => {
                tvb.ensure_bytes_exist(offset, len)?;
                FieldValue::Protocol
            }
            FieldType::Boolean => {
                if !(1..=8).contains(&len) {
                    return Err(invalid());
                }
                FieldValue::Boolean(tvb.get_uint(offset, len, enc)?)
            }
            ft if ft.is_unsigned() => {
                let width = ft.int_width().unwrap_or(8);
                if len == 0 || len > width {
                    return Err(invalid());
                }
                FieldValue::Uint(tvb.get_uint(offset, len, enc)?)
            }
            ft if ft.is_signed() => {
                let width = ft.int_width().unwrap_or(8);
                if len == 0 || len > width {
                    return Err(invalid());
                }
                FieldValue::Int(tvb.get_int(offset, len, enc)?)
            }
            FieldType::Float => match len {
                4 => FieldValue::Float(tvb.get_f32(offset, enc)? as f64),
                8 => FieldValue::Float(tvb.get_f64(offset, enc)?),
                _ => return Err(invalid()),
            },
            FieldType::Double => match len {
                8 => FieldValue::Float(tvb.get_f64(offset, enc)?),
                _ => return Err(invalid()),
            },
            FieldType::AbsoluteTime | FieldType::RelativeTime => {
                let signed = self == FieldType::RelativeTime;
                let secs = match len {
                    4 | 8 if signed => tvb.get_i32(offset, enc)? as i64,
                    4 | 8 => tvb.get_u32(offset, enc)? as i64,
                    _ => return Err(invalid()),
                };
                let nsecs = if len == 8 {
                    tvb.get_u32(offset + 4, enc)?
                } else {
                    0
                };
                if nsecs >= NANOS_PER_SEC {
                    return Err(DissectError::malformed(format!(
                        "{nsecs} nanoseconds is not a valid fraction of a second"
                    )));
                }
                let ts = Timestamp::new(secs, nsecs);
                if signed {
                    FieldValue::RelativeTime(ts)
                } else {
                    FieldValue::AbsoluteTime(ts)
                }
            }
            FieldType::String => FieldValue::String(tvb.get_string(offset, len)?),
            FieldType::Bytes => FieldValue::Bytes(tvb.get_bytes(offset, len)?),
            FieldType::Ether => {
                if len != 6 {
                    return Err(invalid());
                }
                FieldValue::Ether(tvb.get_ether(offset)?)
            }
            FieldType::Ipv4 => {
                if len != 4 {
                    return Err(invalid());
                }
                let raw = tvb.get_u32(offset, enc)?;
                FieldValue::Ipv4(Ipv4Addr::from(raw))
            }
            FieldType::Ipv6 => {
                if len != 16 {
                    return Err(invalid());
                }
                FieldValue::Ipv6(tvb.get_ipv6(offset)?)
            }
            _ => return Err(invalid()),
        };
        Ok(value)
    }

    /// Decodes a value of this kind from its textual form.
    pub fn parse(self, text: &str) -> Result<FieldValue, FtError> {
        let text = text.trim();
        let invalid = |reason: &str| FtError::Invalid {
            ftype: self,
            text: text.to_owned(),
            reason: reason.to_owned(),
        };
        let overflow = || FtError::Overflow {
            ftype: self,
            text: text.to_owned(),
        };

        match self {
            FieldType::None | FieldType::Protocol => Err(FtError::Unsupported {
                ftype: self,
                op: "parse",
            }),
            FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => Ok(FieldValue::Boolean(1)),
                "false" => Ok(FieldValue::Boolean(0)),
                _ => parse_magnitude(text)
                    .map(FieldValue::Boolean)
                    .map_err(|e| e.into_error(self, text)),
            },
            ft if ft.is_unsigned() => {
                let bits = ft.int_width().unwrap_or(8) as u32 * 8;
                if text.starts_with('-') {
                    return Err(overflow());
                }
                let value = parse_magnitude(text).map_err(|e| e.into_error(self, text))?;
                if bits < 64 && value >> bits != 0 {
                    return Err(overflow());
                }
                Ok(FieldValue::Uint(value))
            }
            ft if ft.is_signed() => {
                let bits = ft.int_width().unwrap_or(8) as u32 * 8;
                let (negative, digits) = match text.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, text.strip_prefix('+').unwrap_or(text)),
                };
                let magnitude =
                    parse_magnitude(digits).map_err(|e| e.into_error(self, text))? as i128;
                let value = if negative { -magnitude } else { magnitude };
                let min = -(1i128 << (bits - 1));
                let max = (1i128 << (bits - 1)) - 1;
                if value < min || value > max {
                    return Err(overflow());
                }
                Ok(FieldValue::Int(value as i64))
            }
            FieldType::Float | FieldType::Double => {
                let value: f64 = text.parse().map_err(|_| invalid("not a number"))?;
                if self == FieldType::Float && value.is_finite() && value.abs() > f32::MAX as f64
                {
                    return Err(overflow());
                }
                Ok(FieldValue::Float(value))
            }
            FieldType::AbsoluteTime => parse_absolute_time(text)
                .map(FieldValue::AbsoluteTime)
                .ok_or_else(|| invalid("not a date and time or a number of seconds")),
            FieldType::RelativeTime => {
                let text = text.strip_suffix("seconds").unwrap_or(text).trim_end();
                parse_decimal_seconds(text)
                    .map(FieldValue::RelativeTime)
                    .ok_or_else(|| invalid("not a number of seconds"))
            }
            FieldType::String => {
                let unquoted = text
                    .strip_prefix('"')
                    .and_then(|t| t.strip_suffix('"'))
                    .unwrap_or(text);
                Ok(FieldValue::String(unquoted.to_owned()))
            }
            FieldType::Bytes => parse_hex_bytes(text)
                .map(|b| FieldValue::Bytes(Bytes::from(b)))
                .ok_or_else(|| invalid("not a byte string")),
            FieldType::Ether => {
                let bytes = parse_hex_bytes(text).ok_or_else(|| invalid("not a byte string"))?;
                let mac: [u8; 6] = bytes
                    .try_into()
                    .map_err(|_| invalid("a hardware address is 6 bytes"))?;
                Ok(FieldValue::Ether(mac))
            }
            FieldType::Ipv4 => text
                .parse()
                .map(FieldValue::Ipv4)
                .map_err(|_| invalid("not an IPv4 address")),
            FieldType::Ipv6 => text
                .parse()
                .map(FieldValue::Ipv6)
                .map_err(|_| invalid("not an IPv6 address")),
            _ => Err(FtError::Unsupported {
                ftype: self,
                op: "parse",
            }),
        }
    }

    /// Whether this kind supports ordering comparisons in addition to equality.
    pub fn is_ordered(self) -> bool {
        !matches!(
            self,
            FieldType::None | FieldType::Protocol | FieldType::Boolean
        )
    }

    /// Renders `value` with the given display. Integer kinds use the declared width to pad hex
    /// output.
    pub fn to_display(self, value: &FieldValue, display: FieldDisplay) -> String {
        match value {
            FieldValue::Uint(v) => self.display_uint(*v, display),
            FieldValue::Int(v) => {
                let bits = self.int_width().unwrap_or(8) as u32 * 8;
                let raw = if bits == 64 {
                    *v as u64
                } else {
                    (*v as u64) & ((1u64 << bits) - 1)
                };
                let dec = v.to_string();
                self.display_int(dec, raw, display)
            }
            FieldValue::Float(v) if self == FieldType::Float => format!("{}", *v as f32),
            _ => value.to_string_with(display),
        }
    }

    fn display_uint(self, value: u64, display: FieldDisplay) -> String {
        self.display_int(value.to_string(), value, display)
    }

    fn display_int(self, dec: String, raw: u64, display: FieldDisplay) -> String {
        let digits = self.int_width().unwrap_or(8) * 2;
        match display {
            FieldDisplay::Hex => format!("0x{raw:0digits$x}"),
            FieldDisplay::Oct => format!("0{raw:o}"),
            FieldDisplay::DecHex => format!("{dec} (0x{raw:0digits$x})"),
            FieldDisplay::HexDec => format!("0x{raw:0digits$x} ({dec})"),
            _ => dec,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a field's value is rendered in labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldDisplay {
    #[default]
    None,
    Dec,
    Hex,
    Oct,
    DecHex,
    HexDec,
    SepColon,
    SepDash,
    SepDot,
    SepSpace,
}

impl FieldDisplay {
    fn separator(self) -> Option<char> {
        match self {
            FieldDisplay::SepColon => Some(':'),
            FieldDisplay::SepDash => Some('-'),
            FieldDisplay::SepDot => Some('.'),
            FieldDisplay::SepSpace => Some(' '),
            _ => None,
        }
    }
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Seconds and nanoseconds. Negative times are normalised so that `nsecs` is always positive,
/// e.g. -1.25s is stored as `{ secs: -2, nsecs: 750_000_000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub secs: i64,
    pub nsecs: u32,
}

impl Timestamp {
    pub fn new(secs: i64, nsecs: u32) -> Self {
        Timestamp {
            secs: secs + (nsecs / NANOS_PER_SEC) as i64,
            nsecs: nsecs % NANOS_PER_SEC,
        }
    }

    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC as i128 + self.nsecs as i128
    }

    pub fn from_nanos(nanos: i128) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC as i128) as i64;
        let nsecs = nanos.rem_euclid(NANOS_PER_SEC as i128) as u32;
        Timestamp { secs, nsecs }
    }

    fn relative_string(&self) -> String {
        if self.secs < 0 && self.nsecs > 0 {
            format!("-{}.{:09}", -(self.secs + 1), NANOS_PER_SEC - self.nsecs)
        } else {
            format!("{}.{:09}", self.secs, self.nsecs)
        }
    }

    fn absolute_string(&self) -> String {
        match DateTime::from_timestamp(self.secs, self.nsecs) {
            Some(dt) => dt.format("%b %e, %Y %H:%M:%S%.9f UTC").to_string(),
            None => format!("Not representable ({})", self.relative_string()),
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    None,
    /// Booleans keep the raw value so that masks can be displayed.
    Boolean(u64),
    Uint(u64),
    Int(i64),
    Float(f64),
    AbsoluteTime(Timestamp),
    RelativeTime(Timestamp),
    String(String),
    Bytes(Bytes),
    Ether([u8; 6]),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Protocol,
}

/// Comparison operators, the same set filters use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
        }
    }
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::None => "none",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Uint(_) => "unsigned integer",
            FieldValue::Int(_) => "signed integer",
            FieldValue::Float(_) => "floating point",
            FieldValue::AbsoluteTime(_) => "absolute time",
            FieldValue::RelativeTime(_) => "relative time",
            FieldValue::String(_) => "string",
            FieldValue::Bytes(_) => "byte string",
            FieldValue::Ether(_) => "hardware address",
            FieldValue::Ipv4(_) => "IPv4 address",
            FieldValue::Ipv6(_) => "IPv6 address",
            FieldValue::Protocol => "protocol",
        }
    }

    /// Compares two values of the same kind.
    ///
    /// Booleans only support equality, which treats any non-zero value as true. Floats follow
    /// IEEE 754, so every comparison involving NaN is false except `Ne`.
    pub fn compare(&self, op: CmpOp, other: &FieldValue) -> Result<bool, FtError> {
        use FieldValue::*;

        let ord = match (self, other) {
            (Boolean(a), Boolean(b)) => {
                if !op.is_equality() {
                    return Err(FtError::UnsupportedOp {
                        op,
                        kind: self.kind(),
                    });
                }
                (*a != 0).cmp(&(*b != 0))
            }
            (Uint(a), Uint(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => match a.partial_cmp(b) {
                Some(ord) => ord,
                Option::None => return Ok(op == CmpOp::Ne),
            },
            (AbsoluteTime(a), AbsoluteTime(b)) | (RelativeTime(a), RelativeTime(b)) => a.cmp(b),
            (String(a), String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Bytes(a), Bytes(b)) => a[..].cmp(&b[..]),
            (Ether(a), Ether(b)) => a.cmp(b),
            (Ipv4(a), Ipv4(b)) => a.cmp(b),
            (Ipv6(a), Ipv6(b)) => a.cmp(b),
            (None, None) | (Protocol, Protocol) => {
                return Err(FtError::UnsupportedOp {
                    op,
                    kind: self.kind(),
                })
            }
            _ => {
                return Err(FtError::Mismatch {
                    left: self.kind(),
                    right: other.kind(),
                })
            }
        };
        Ok(op.holds(ord))
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Uint(v) | FieldValue::Boolean(v) => Some(*v),
            _ => Option::None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => Option::None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => Option::None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => Option::None,
        }
    }

    fn to_string_with(&self, display: FieldDisplay) -> String {
        match self {
            FieldValue::None | FieldValue::Protocol => String::new(),
            FieldValue::Boolean(v) => if *v != 0 { "True" } else { "False" }.to_owned(),
            FieldValue::Uint(v) => v.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::AbsoluteTime(ts) => ts.absolute_string(),
            FieldValue::RelativeTime(ts) => format!("{} seconds", ts.relative_string()),
            FieldValue::String(s) => s.clone(),
            FieldValue::Bytes(b) => hex_string(b, display.separator()),
            FieldValue::Ether(mac) => hex_string(mac, Some(':')),
            FieldValue::Ipv4(addr) => addr.to_string(),
            FieldValue::Ipv6(addr) => addr.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(FieldDisplay::SepColon))
    }
}

fn hex_string(bytes: &[u8], sep: Option<char>) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            if let Some(sep) = sep {
                out.push(sep);
            }
        }
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Errors from decoding or comparing values outside of a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FtError {
    #[error("\"{text}\" is not a valid {ftype} value: {reason}")]
    Invalid {
        ftype: FieldType,
        text: String,
        reason: String,
    },

    #[error("\"{text}\" does not fit in {ftype}")]
    Overflow { ftype: FieldType, text: String },

    #[error("{ftype} does not support {op}")]
    Unsupported { ftype: FieldType, op: &'static str },

    #[error("{kind} values do not support {op:?}")]
    UnsupportedOp { op: CmpOp, kind: &'static str },

    #[error("cannot compare {left} with {right}")]
    Mismatch {
        left: &'static str,
        right: &'static str,
    },
}

enum MagnitudeError {
    Invalid,
    Overflow,
}

impl MagnitudeError {
    fn into_error(self, ftype: FieldType, text: &str) -> FtError {
        match self {
            MagnitudeError::Invalid => FtError::Invalid {
                ftype,
                text: text.to_owned(),
                reason: "not a number".to_owned(),
            },
            MagnitudeError::Overflow => FtError::Overflow {
                ftype,
                text: text.to_owned(),
            },
        }
    }
}

/// Parses an unsigned integer literal: `0x` prefix for hex, leading `0` for octal, decimal
/// otherwise.
fn parse_magnitude(text: &str) -> Result<u64, MagnitudeError> {
    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(MagnitudeError::Invalid);
    }
    u64::from_str_radix(digits, radix).map_err(|_| MagnitudeError::Overflow)
}

fn parse_decimal_seconds(text: &str) -> Option<Timestamp> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = rest.split_once('.').unwrap_or((rest, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
        || frac.len() > 9
    {
        return None;
    }
    let secs: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let nsecs: i128 = format!("{frac:0<9}").parse().ok()?;
    let nanos = secs * NANOS_PER_SEC as i128 + nsecs;
    let nanos = if negative { -nanos } else { nanos };
    if nanos.abs() > i64::MAX as i128 * NANOS_PER_SEC as i128 {
        return None;
    }
    Some(Timestamp::from_nanos(nanos))
}

fn parse_absolute_time(text: &str) -> Option<Timestamp> {
    let text = text.strip_suffix("UTC").unwrap_or(text).trim_end();
    for fmt in ["%b %d, %Y %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            let utc = dt.and_utc();
            return Some(Timestamp::new(
                utc.timestamp(),
                utc.timestamp_subsec_nanos(),
            ));
        }
    }
    parse_decimal_seconds(text)
}

/// Accepts `aa:bb:cc`, `aa-bb-cc`, `aa.bb.cc`, `aa bb cc` or `aabbcc`.
fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() {
        return None;
    }
    let sep = text.chars().find(|c| matches!(c, ':' | '-' | '.' | ' '));
    match sep {
        Some(sep) => text
            .split(sep)
            .map(|group| {
                if group.is_empty() || group.len() > 2 {
                    None
                } else {
                    u8::from_str_radix(group, 16).ok()
                }
            })
            .collect(),
        None => {
            if text.len() % 2 != 0 || !text.is_ascii() {
                return None;
            }
            (0..text.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
                .collect()
        }
    }
}
