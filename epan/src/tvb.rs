//! Bounds-checked, immutable views over packet bytes.
//!
//! A [`Tvb`] knows two lengths: the number of bytes that were actually captured, and the number
//! of bytes the packet claims to have (the reported length). Reads inside the captured region
//! succeed. Reads that end past the captured region but inside the reported one fail with
//! [`DissectError::Bounds`], and anything beyond that fails with
//! [`DissectError::ReportedBounds`]. Dissectors rely on that distinction to tell a short
//! snapshot from a lying length field.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::DissectError;

/// Byte order used when decoding multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    BigEndian,
    LittleEndian,
    /// Not applicable, for byte strings and other single-byte data. Integers read with this
    /// encoding are treated as big endian.
    Na,
}

/// Identifies the data source a buffer's bytes are attributed to. The captured frame is always
/// [`SourceId::FRAME`]; reassembled or decompressed buffers get their own id through
/// [`PacketContext::add_data_source`](crate::PacketContext::add_data_source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    pub const FRAME: SourceId = SourceId(0);
    /// Composite buffers which have not been attached to a data source yet.
    pub const DETACHED: SourceId = SourceId(u32::MAX);

    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    segment: usize,
    start: usize,
    len: usize,
}

/// A cursor over captured packet bytes. Cloning and sub-setting never copy packet data.
#[derive(Debug, Clone)]
pub struct Tvb {
    segments: Arc<[Bytes]>,
    spans: Arc<[Span]>,
    captured: usize,
    reported: usize,
    source: SourceId,
    base: usize,
}

impl Tvb {
    /// Wraps captured bytes. A reported length smaller than the captured one is raised to it.
    pub fn new(data: impl Into<Bytes>, reported_len: usize) -> Self {
        let data: Bytes = data.into();
        let captured = data.len();
        let spans: Vec<Span> = if captured == 0 {
            Vec::new()
        } else {
            vec![Span {
                segment: 0,
                start: 0,
                len: captured,
            }]
        };
        Tvb {
            segments: Arc::from(vec![data]),
            spans: spans.into(),
            captured,
            reported: reported_len.max(captured),
            source: SourceId::FRAME,
            base: 0,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data), data.len())
    }

    /// Concatenates buffers into one with continuous offsets, e.g. for reassembly. Every piece
    /// but the last must be fully captured, otherwise the offsets past it would be meaningless.
    pub fn composite(pieces: &[Tvb]) -> Result<Tvb, DissectError> {
        let mut segments = Vec::new();
        let mut spans = Vec::new();
        let mut captured = 0;
        let mut reported = 0;

        for (i, piece) in pieces.iter().enumerate() {
            if i + 1 < pieces.len() && piece.captured < piece.reported {
                return Err(DissectError::Bounds {
                    offset: captured,
                    len: piece.reported,
                    captured: captured + piece.captured,
                });
            }
            for span in piece.spans.iter() {
                let seg = piece.segments[span.segment].slice(span.start..span.start + span.len);
                spans.push(Span {
                    segment: segments.len(),
                    start: 0,
                    len: span.len,
                });
                segments.push(seg);
            }
            captured += piece.captured;
            reported += piece.reported;
        }

        Ok(Tvb {
            segments: segments.into(),
            spans: spans.into(),
            captured,
            reported,
            source: SourceId::DETACHED,
            base: 0,
        })
    }

    /// Number of captured bytes.
    pub fn length(&self) -> usize {
        self.captured
    }

    pub fn reported_length(&self) -> usize {
        self.reported
    }

    /// Reported bytes left from `offset`, zero if `offset` is past the end.
    pub fn length_remaining(&self, offset: usize) -> usize {
        self.reported.saturating_sub(offset)
    }

    pub fn captured_length_remaining(&self, offset: usize) -> usize {
        self.captured.saturating_sub(offset)
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Translates an offset in this buffer to an offset in its data source.
    pub fn raw_offset(&self, offset: usize) -> usize {
        self.base + offset
    }

    pub(crate) fn with_source(mut self, source: SourceId) -> Tvb {
        self.source = source;
        self.base = 0;
        self
    }

    /// Fails the way a read of `len` bytes at `offset` would.
    pub fn ensure_bytes_exist(&self, offset: usize, len: usize) -> Result<(), DissectError> {
        let end = offset
            .checked_add(len)
            .ok_or(DissectError::ReportedBounds {
                offset,
                len,
                reported: self.reported,
            })?;
        if end <= self.captured {
            Ok(())
        } else if end <= self.reported {
            Err(DissectError::Bounds {
                offset,
                len,
                captured: self.captured,
            })
        } else {
            Err(DissectError::ReportedBounds {
                offset,
                len,
                reported: self.reported,
            })
        }
    }

    pub fn bytes_exist(&self, offset: usize, len: usize) -> bool {
        self.ensure_bytes_exist(offset, len).is_ok()
    }

    /// A view of `len` bytes starting at `offset`. The subset's captured length is whatever part
    /// of it was captured in `self`.
    pub fn subset(&self, offset: usize, len: usize) -> Result<Tvb, DissectError> {
        let end = offset.checked_add(len).filter(|end| *end <= self.reported);
        let Some(end) = end else {
            return Err(DissectError::OutOfRange {
                offset,
                len,
                reported: self.reported,
            });
        };
        let captured = end.min(self.captured).saturating_sub(offset);

        Ok(Tvb {
            segments: Arc::clone(&self.segments),
            spans: self.spans_in(offset, captured).into(),
            captured,
            reported: len,
            source: self.source,
            base: self.base + offset,
        })
    }

    pub fn subset_remaining(&self, offset: usize) -> Result<Tvb, DissectError> {
        if offset > self.reported {
            return Err(DissectError::OutOfRange {
                offset,
                len: 0,
                reported: self.reported,
            });
        }
        self.subset(offset, self.reported - offset)
    }

    fn spans_in(&self, mut offset: usize, mut len: usize) -> Vec<Span> {
        let mut out = Vec::new();
        for span in self.spans.iter() {
            if len == 0 {
                break;
            }
            if offset >= span.len {
                offset -= span.len;
                continue;
            }
            let take = (span.len - offset).min(len);
            out.push(Span {
                segment: span.segment,
                start: span.start + offset,
                len: take,
            });
            len -= take;
            offset = 0;
        }
        out
    }

    // Callers check bounds first.
    fn copy_to(&self, offset: usize, dst: &mut [u8]) {
        let mut dst = dst;
        for span in self.spans_in(offset, dst.len()) {
            let seg = &self.segments[span.segment];
            let (head, tail) = std::mem::take(&mut dst).split_at_mut(span.len);
            head.copy_from_slice(&seg[span.start..span.start + span.len]);
            dst = tail;
        }
    }

    /// Reads an unsigned integer of 1 to 8 bytes.
    pub fn get_uint(&self, offset: usize, width: usize, enc: Encoding) -> Result<u64, DissectError> {
        if !(1..=8).contains(&width) {
            return Err(DissectError::InvalidWidth { width });
        }
        self.ensure_bytes_exist(offset, width)?;
        let mut buf = [0u8; 8];
        self.copy_to(offset, &mut buf[..width]);
        let bytes = &buf[..width];
        let value = match enc {
            Encoding::LittleEndian => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64),
            Encoding::BigEndian | Encoding::Na => {
                bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
            }
        };
        Ok(value)
    }

    /// Reads a signed integer of 1 to 8 bytes, sign-extended from its width.
    pub fn get_int(&self, offset: usize, width: usize, enc: Encoding) -> Result<i64, DissectError> {
        let raw = self.get_uint(offset, width, enc)?;
        Ok(sign_extend(raw, width as u32 * 8))
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8, DissectError> {
        Ok(self.get_uint(offset, 1, Encoding::Na)? as u8)
    }

    pub fn get_u16(&self, offset: usize, enc: Encoding) -> Result<u16, DissectError> {
        Ok(self.get_uint(offset, 2, enc)? as u16)
    }

    pub fn get_u24(&self, offset: usize, enc: Encoding) -> Result<u32, DissectError> {
        Ok(self.get_uint(offset, 3, enc)? as u32)
    }

    pub fn get_u32(&self, offset: usize, enc: Encoding) -> Result<u32, DissectError> {
        Ok(self.get_uint(offset, 4, enc)? as u32)
    }

    pub fn get_u40(&self, offset: usize, enc: Encoding) -> Result<u64, DissectError> {
        self.get_uint(offset, 5, enc)
    }

    pub fn get_u48(&self, offset: usize, enc: Encoding) -> Result<u64, DissectError> {
        self.get_uint(offset, 6, enc)
    }

    pub fn get_u56(&self, offset: usize, enc: Encoding) -> Result<u64, DissectError> {
        self.get_uint(offset, 7, enc)
    }

    pub fn get_u64(&self, offset: usize, enc: Encoding) -> Result<u64, DissectError> {
        self.get_uint(offset, 8, enc)
    }

    pub fn get_i8(&self, offset: usize) -> Result<i8, DissectError> {
        Ok(self.get_u8(offset)? as i8)
    }

    pub fn get_i16(&self, offset: usize, enc: Encoding) -> Result<i16, DissectError> {
        Ok(self.get_u16(offset, enc)? as i16)
    }

    pub fn get_i24(&self, offset: usize, enc: Encoding) -> Result<i32, DissectError> {
        Ok(self.get_int(offset, 3, enc)? as i32)
    }

    pub fn get_i32(&self, offset: usize, enc: Encoding) -> Result<i32, DissectError> {
        Ok(self.get_u32(offset, enc)? as i32)
    }

    pub fn get_i64(&self, offset: usize, enc: Encoding) -> Result<i64, DissectError> {
        Ok(self.get_u64(offset, enc)? as i64)
    }

    pub fn get_f32(&self, offset: usize, enc: Encoding) -> Result<f32, DissectError> {
        Ok(f32::from_bits(self.get_u32(offset, enc)?))
    }

    pub fn get_f64(&self, offset: usize, enc: Encoding) -> Result<f64, DissectError> {
        Ok(f64::from_bits(self.get_u64(offset, enc)?))
    }

    /// IPv4 addresses are always in network byte order.
    pub fn get_ipv4(&self, offset: usize) -> Result<Ipv4Addr, DissectError> {
        Ok(Ipv4Addr::from(self.get_u32(offset, Encoding::BigEndian)?))
    }

    pub fn get_ipv6(&self, offset: usize) -> Result<Ipv6Addr, DissectError> {
        Ok(Ipv6Addr::from(self.get_array::<16>(offset)?))
    }

    pub fn get_ether(&self, offset: usize) -> Result<[u8; 6], DissectError> {
        self.get_array::<6>(offset)
    }

    pub fn get_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DissectError> {
        self.ensure_bytes_exist(offset, N)?;
        let mut buf = [0u8; N];
        self.copy_to(offset, &mut buf);
        Ok(buf)
    }

    /// Returns `len` bytes from `offset`. This is zero-copy unless the range straddles the pieces
    /// of a composite buffer.
    pub fn get_bytes(&self, offset: usize, len: usize) -> Result<Bytes, DissectError> {
        self.ensure_bytes_exist(offset, len)?;
        let spans = self.spans_in(offset, len);
        match spans.as_slice() {
            [] => Ok(Bytes::new()),
            [span] => Ok(self.segments[span.segment].slice(span.start..span.start + span.len)),
            _ => {
                let mut buf = BytesMut::zeroed(len);
                self.copy_to(offset, &mut buf);
                Ok(buf.freeze())
            }
        }
    }

    /// Decodes `len` bytes as UTF-8, replacing invalid sequences.
    pub fn get_string(&self, offset: usize, len: usize) -> Result<String, DissectError> {
        let bytes = self.get_bytes(offset, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// All captured bytes of this view.
    pub fn to_bytes(&self) -> Bytes {
        self.get_bytes(0, self.captured).unwrap_or_default()
    }

    /// Whether the captured bytes at `offset` equal `needle`.
    pub fn memeql(&self, offset: usize, needle: &[u8]) -> bool {
        matches!(self.get_bytes(offset, needle.len()), Ok(bytes) if bytes == needle)
    }

    /// Searches the captured bytes from `offset` for `needle`, looking at no more than
    /// `max_len` bytes if given. Returns the absolute offset of the first match.
    pub fn find_u8(&self, offset: usize, max_len: Option<usize>, needle: u8) -> Option<usize> {
        let avail = self.captured_length_remaining(offset);
        let len = max_len.map_or(avail, |max| max.min(avail));
        let bytes = self.get_bytes(offset, len).ok()?;
        bytes.iter().position(|b| *b == needle).map(|i| offset + i)
    }
}

impl From<Vec<u8>> for Tvb {
    fn from(data: Vec<u8>) -> Self {
        let len = data.len();
        Tvb::new(data, len)
    }
}

pub(crate) fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
