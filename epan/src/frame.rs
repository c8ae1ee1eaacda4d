//! The per-packet driver and the built-in protocols every registry carries.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::context::{DataSource, PacketContext, PacketInfo};
use crate::ftypes::{FieldDisplay, FieldType, FieldValue, Timestamp};
use crate::packet::{Protocols, Registry, WTAP_ENCAP_TABLE};
use crate::proto::{EttIndex, FieldTable, HeaderFieldInfo, HfIndex, ProtoId, ProtoItem, ProtoTree};
use crate::{DissectError, Encoding, Tvb};

/// Indices of the built-in protocols and fields.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub frame: ProtoId,
    pub frame_time: HfIndex,
    pub frame_number: HfIndex,
    pub frame_len: HfIndex,
    pub frame_cap_len: HfIndex,
    pub frame_encap: HfIndex,
    pub frame_protocols: HfIndex,
    pub ett_frame: EttIndex,
    pub data: ProtoId,
    pub data_data: HfIndex,
    pub data_len: HfIndex,
    pub ett_data: EttIndex,
    pub malformed: ProtoId,
    pub expert: HfIndex,
}

impl Builtins {
    pub(crate) fn register(fields: &mut FieldTable, protocols: &mut Protocols) -> Self {
        let frame = protocols.register(fields, "Frame", "Frame", "frame");
        let data = protocols.register(fields, "Data", "Data", "data");
        let malformed = protocols.register(fields, "Malformed Packet", "Malformed", "_ws.malformed");

        let mut field = |name: &str, abbrev: &str, ftype, display, parent| {
            fields.register(
                HeaderFieldInfo::new(name, abbrev, ftype)
                    .with_display(display)
                    .with_parent(parent),
            )
        };
        let frame_time = field(
            "Arrival Time",
            "frame.time",
            FieldType::AbsoluteTime,
            FieldDisplay::None,
            frame,
        );
        let frame_number = field(
            "Frame Number",
            "frame.number",
            FieldType::Uint64,
            FieldDisplay::Dec,
            frame,
        );
        let frame_len = field(
            "Frame Length",
            "frame.len",
            FieldType::Uint32,
            FieldDisplay::Dec,
            frame,
        );
        let frame_cap_len = field(
            "Capture Length",
            "frame.cap_len",
            FieldType::Uint32,
            FieldDisplay::Dec,
            frame,
        );
        let frame_encap = field(
            "Encapsulation type",
            "frame.encap_type",
            FieldType::Int32,
            FieldDisplay::Dec,
            frame,
        );
        let frame_protocols = field(
            "Protocols in frame",
            "frame.protocols",
            FieldType::String,
            FieldDisplay::None,
            frame,
        );
        let data_data = field(
            "Data",
            "data.data",
            FieldType::Bytes,
            FieldDisplay::None,
            data,
        );
        let data_len = field(
            "Length",
            "data.len",
            FieldType::Int32,
            FieldDisplay::Dec,
            data,
        );
        let expert = field(
            "Expert Info",
            "_ws.expert",
            FieldType::None,
            FieldDisplay::None,
            malformed,
        );

        Builtins {
            frame,
            frame_time,
            frame_number,
            frame_len,
            frame_cap_len,
            frame_encap,
            frame_protocols,
            ett_frame: fields.get_or_create_ett("frame"),
            data,
            data_data,
            data_len,
            ett_data: fields.get_or_create_ett("data"),
            malformed,
            expert,
        }
    }
}

/// One captured packet.
#[derive(Debug, Clone)]
pub struct Frame {
    pub number: u64,
    /// Encapsulation of the first layer, looked up in the `wtap_encap` table.
    pub link_type: u32,
    pub data: Bytes,
    /// Length of the packet on the wire. At least `data.len()`.
    pub reported_len: usize,
    pub timestamp: Option<Timestamp>,
}

impl Frame {
    pub fn new(number: u64, link_type: u32, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Frame {
            number,
            link_type,
            reported_len: data.len(),
            data,
            timestamp: None,
        }
    }

    /// Declares the frame as cut short by the capture's snapshot length.
    pub fn with_reported_len(mut self, reported_len: usize) -> Self {
        self.reported_len = reported_len;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Everything learnt about one packet.
#[derive(Debug, Clone)]
pub struct Dissection {
    pub tree: ProtoTree,
    pub pinfo: PacketInfo,
    /// Set if any layer hit a bounds, malformed or dissector bug error, or the packet was
    /// aborted.
    pub malformed: bool,
    /// Bytes consumed by the link layer. A layer that failed counts as having consumed its whole
    /// buffer. Zero if the packet was aborted.
    pub consumed: usize,
    pub sources: Vec<DataSource>,
    pub(crate) show_hidden: bool,
}

impl Dissection {
    /// Renders the tree as indented text, with hidden items if the engine was configured to
    /// show them.
    pub fn render(&self) -> String {
        self.tree.render(self.show_hidden)
    }
}

/// The dissection engine: a frozen [`Registry`] and the limits to apply.
///
/// `Epan` is `Send + Sync`; packets may be dissected concurrently from any number of threads.
#[derive(Debug, Clone)]
pub struct Epan {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl Epan {
    pub fn new(registry: impl Into<Arc<Registry>>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Epan {
            registry: registry.into(),
            config,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dissects one packet.
    ///
    /// Failures confined to a layer are recorded in the tree and never surface here. If the
    /// recursion ceiling or the tree item ceiling is hit, the packet is aborted: the tree is kept
    /// as it was, annotated, and marked malformed. The only error returned is
    /// [`DissectError::UnrecognizedTopLevel`], when no dissector handles the frame's link type
    /// and the data fallback is disabled.
    pub fn dissect(&self, frame: &Frame) -> Result<Dissection, DissectError> {
        let tvb = Tvb::new(frame.data.clone(), frame.reported_len);
        let pinfo = PacketInfo::for_frame(frame, &tvb);
        let mut cx = PacketContext::new(&self.registry, &self.config, pinfo, &tvb);
        let root = cx.tree.root();

        match cx.call_dissector(self.registry.frame_handle(), &tvb, root) {
            Ok(_) => {}
            Err(err @ DissectError::UnrecognizedTopLevel { .. }) => return Err(err),
            Err(err) => {
                warn!(frame = frame.number, error = %err, "dissection aborted");
                cx.abort(&tvb, root, &err);
            }
        }
        Ok(cx.finish())
    }
}

pub(crate) fn dissect_frame(
    tvb: &Tvb,
    cx: &mut PacketContext<'_>,
    tree: ProtoItem,
) -> Result<usize, DissectError> {
    let b = *cx.registry().builtins();
    let reported = tvb.reported_length();
    let captured = tvb.length();

    let ti = cx.tree.add_protocol_item(tree, b.frame, tvb, 0, None)?;
    cx.tree.set_text(
        ti,
        format!(
            "Frame {}: {} bytes on wire, {} bytes captured",
            cx.pinfo.number, reported, captured
        ),
    );
    let frame_tree = cx.tree.add_subtree(ti, b.ett_frame);

    if let Some(ts) = cx.pinfo.timestamp {
        cx.tree.add_item_with_value(
            frame_tree,
            b.frame_time,
            tvb,
            0,
            0,
            FieldValue::AbsoluteTime(ts),
            None,
        )?;
    }
    let generated = [
        (b.frame_encap, FieldValue::Int(cx.pinfo.link_type as i64)),
        (b.frame_number, FieldValue::Uint(cx.pinfo.number)),
        (b.frame_len, FieldValue::Uint(reported as u64)),
        (b.frame_cap_len, FieldValue::Uint(captured as u64)),
    ];
    for (hf, value) in generated {
        cx.tree
            .add_item_with_value(frame_tree, hf, tvb, 0, 0, value, None)?;
    }
    let protocols = cx.tree.add_item_with_value(
        frame_tree,
        b.frame_protocols,
        tvb,
        0,
        0,
        FieldValue::String(String::new()),
        None,
    )?;

    let link_type = cx.pinfo.link_type;
    let consumed = match cx.call_uint(WTAP_ENCAP_TABLE, link_type, tvb, tree)? {
        Some(consumed) => consumed,
        None if cx.data_fallback() => {
            debug!(link_type, "no dissector for link type, showing as data");
            cx.call_data(tvb, tree)?
        }
        None => return Err(DissectError::UnrecognizedTopLevel { link_type }),
    };
    cx.set_consumed(consumed);

    let layers = cx.layer_names().join(":");
    cx.tree
        .set_value(protocols, FieldValue::String(layers));
    Ok(reported)
}

pub(crate) fn dissect_data(
    tvb: &Tvb,
    cx: &mut PacketContext<'_>,
    tree: ProtoItem,
) -> Result<usize, DissectError> {
    let b = *cx.registry().builtins();
    let len = tvb.length();
    if len == 0 {
        return Ok(0);
    }

    let ti = cx.tree.add_protocol_item(tree, b.data, tvb, 0, Some(len))?;
    cx.tree.set_text(ti, format!("Data ({len} bytes)"));
    let data_tree = cx.tree.add_subtree(ti, b.ett_data);
    cx.tree
        .add_item(data_tree, b.data_data, tvb, 0, Some(len), Encoding::Na)?;
    cx.tree.add_item_with_value(
        data_tree,
        b.data_len,
        tvb,
        0,
        0,
        FieldValue::Int(len as i64),
        None,
    )?;
    Ok(tvb.reported_length())
}
