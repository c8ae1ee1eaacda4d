//! Per-packet state and the dispatch functions dissectors use to hand over to the next layer.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{debug, trace, warn};

use crate::column::{Column, Columns};
use crate::config::EngineConfig;
use crate::expert::{ExpertGroup, ExpertInfo, Severity};
use crate::fields::FieldsStore;
use crate::frame::{Dissection, Frame};
use crate::ftypes::Timestamp;
use crate::packet::{DissectorHandle, Registry};
use crate::proto::{HfIndex, ProtoId, ProtoItem, ProtoTree};
use crate::tvb::SourceId;
use crate::{DissectError, Tvb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Address {
    #[default]
    None,
    Ether([u8; 6]),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::None => Ok(()),
            Address::Ether(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            Address::Ipv4(addr) => write!(f, "{addr}"),
            Address::Ipv6(addr) => write!(f, "{addr}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortType {
    #[default]
    None,
    Tcp,
    Udp,
    Sctp,
}

/// What the layers dissected so far have learnt about the packet.
#[derive(Debug, Clone, Default)]
pub struct PacketInfo {
    pub number: u64,
    pub timestamp: Option<Timestamp>,
    pub link_type: u32,
    pub captured_len: usize,
    pub reported_len: usize,

    pub dl_src: Address,
    pub dl_dst: Address,
    pub net_src: Address,
    pub net_dst: Address,
    pub src: Address,
    pub dst: Address,
    pub port_type: PortType,
    pub src_port: u32,
    pub dst_port: u32,

    /// The key the current dissector was found under, when called through a table.
    pub match_uint: u32,
    pub match_string: Option<String>,

    pub columns: Columns,
    /// Protocols of the dissectors called so far, outermost first.
    pub layers: Vec<ProtoId>,
    pub current_proto: Option<ProtoId>,
    pub fields: FieldsStore,
    pub expert: Vec<ExpertInfo>,

    pub malformed: bool,
    /// Set when a layer ran into the end of the captured data.
    pub truncated: bool,
}

impl PacketInfo {
    pub(crate) fn for_frame(frame: &Frame, tvb: &Tvb) -> Self {
        PacketInfo {
            number: frame.number,
            timestamp: frame.timestamp,
            link_type: frame.link_type,
            captured_len: tvb.length(),
            reported_len: tvb.reported_length(),
            ..Default::default()
        }
    }

    /// The most severe expert annotation of the packet.
    pub fn max_severity(&self) -> Option<Severity> {
        self.expert.iter().map(|e| e.severity).max()
    }
}

/// A buffer whose bytes tree nodes may point into, e.g. the frame or a reassembled payload.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: String,
    pub tvb: Tvb,
}

/// Mutable state of one packet's dissection, handed to every dissector.
pub struct PacketContext<'r> {
    pub pinfo: PacketInfo,
    pub tree: ProtoTree,
    registry: &'r Registry,
    depth: usize,
    max_depth: usize,
    data_fallback: bool,
    show_hidden: bool,
    sources: Vec<DataSource>,
    consumed: usize,
}

impl<'r> PacketContext<'r> {
    /// A context for dissecting `frame_tvb`, which becomes the `Frame` data source.
    pub fn new(
        registry: &'r Registry,
        config: &EngineConfig,
        pinfo: PacketInfo,
        frame_tvb: &Tvb,
    ) -> Self {
        let fields = registry.field_table();
        let tree = if config.build_tree {
            ProtoTree::new(fields)
        } else {
            ProtoTree::disabled(fields)
        };
        PacketContext {
            pinfo,
            tree: tree.with_max_items(config.max_tree_items),
            registry,
            depth: 0,
            max_depth: config.max_depth,
            data_fallback: config.data_fallback,
            show_hidden: config.show_hidden,
            sources: vec![DataSource {
                name: "Frame".to_owned(),
                tvb: frame_tvb.clone(),
            }],
            consumed: 0,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Number of dissector calls currently on the stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn data_fallback(&self) -> bool {
        self.data_fallback
    }

    pub(crate) fn set_consumed(&mut self, consumed: usize) {
        self.consumed = consumed;
    }

    /// Looks up a field by filter name.
    pub fn field(&self, abbrev: &str) -> Result<HfIndex, DissectError> {
        self.registry
            .fields()
            .find(abbrev)
            .ok_or_else(|| DissectError::UnknownField(abbrev.to_owned()))
    }

    /// Filter names of the protocols dissected so far, without the frame itself.
    pub fn layer_names(&self) -> Vec<&'r str> {
        let registry = self.registry;
        let frame = registry.builtins().frame;
        self.pinfo
            .layers
            .iter()
            .filter(|p| **p != frame)
            .filter_map(|p| registry.protocol(*p))
            .map(|p| p.filter.as_str())
            .collect()
    }

    /// Calls a dissector, catching the errors that only concern its layer.
    ///
    /// A caught error is recorded as an annotation under `tree`, the packet is marked malformed,
    /// and the whole buffer is reported as consumed so that the caller carries on after it.
    pub fn call_dissector(
        &mut self,
        handle: &DissectorHandle,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        match self.call_dissector_only(handle, tvb, tree) {
            Err(err) if err.is_recoverable() => {
                self.show_exception(handle, tvb, tree, &err);
                Ok(tvb.reported_length())
            }
            other => other,
        }
    }

    /// Calls a dissector and passes any error on to the caller.
    pub fn call_dissector_only(
        &mut self,
        handle: &DissectorHandle,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        if self.depth >= self.max_depth {
            warn!(
                depth = self.depth,
                dissector = handle.name(),
                "maximum dissection depth reached"
            );
            return Err(DissectError::RecursionLimitExceeded {
                depth: self.max_depth,
            });
        }

        self.depth += 1;
        let saved_proto = self.pinfo.current_proto;
        if let Some(proto) = handle.protocol() {
            self.pinfo.current_proto = Some(proto);
            self.pinfo.layers.push(proto);
        }
        trace!(
            dissector = handle.name(),
            depth = self.depth,
            len = tvb.reported_length(),
            "calling dissector"
        );

        let result = handle.dissector().dissect(tvb, self, tree);

        self.depth -= 1;
        self.pinfo.current_proto = saved_proto;
        result
    }

    pub fn call_dissector_by_name(
        &mut self,
        name: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        let registry = self.registry;
        let handle = registry
            .find_dissector(name)
            .ok_or_else(|| DissectError::UnknownDissector(name.to_owned()))?;
        self.call_dissector(handle, tvb, tree)
    }

    /// Hands the buffer to the `data` dissector.
    pub fn call_data(&mut self, tvb: &Tvb, tree: ProtoItem) -> Result<usize, DissectError> {
        let registry = self.registry;
        self.call_dissector(registry.data_handle(), tvb, tree)
    }

    /// Calls the dissector bound to `key` in `table`. Returns `None` if there is none, without
    /// any side effect.
    pub fn call_uint(
        &mut self,
        table: &str,
        key: u32,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<Option<usize>, DissectError> {
        let registry = self.registry;
        let table = registry
            .table(table)
            .ok_or_else(|| DissectError::UnknownTable(table.to_owned()))?;
        let Some(handle) = table.get_uint(key) else {
            return Ok(None);
        };

        let saved = std::mem::replace(&mut self.pinfo.match_uint, key);
        let result = self.call_dissector(handle, tvb, tree);
        self.pinfo.match_uint = saved;
        result.map(Some)
    }

    /// Like [`call_uint`](Self::call_uint), only telling whether a dissector was found. A found
    /// dissector that consumed nothing still counts.
    pub fn try_uint(
        &mut self,
        table: &str,
        key: u32,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<bool, DissectError> {
        Ok(self.call_uint(table, key, tvb, tree)?.is_some())
    }

    pub fn try_string(
        &mut self,
        table: &str,
        key: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<bool, DissectError> {
        let registry = self.registry;
        let table = registry
            .table(table)
            .ok_or_else(|| DissectError::UnknownTable(table.to_owned()))?;
        let Some(handle) = table.get_string(key) else {
            return Ok(false);
        };

        let saved = self.pinfo.match_string.replace(key.to_owned());
        let result = self.call_dissector(handle, tvb, tree);
        self.pinfo.match_string = saved;
        result.map(|_| true)
    }

    /// Calls the payload binding of `table`, if any.
    pub fn try_payload(
        &mut self,
        table: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<bool, DissectError> {
        let registry = self.registry;
        let table = registry
            .table(table)
            .ok_or_else(|| DissectError::UnknownTable(table.to_owned()))?;
        match table.payload() {
            Some(handle) => self.call_dissector(handle, tvb, tree).map(|_| true),
            None => Ok(false),
        }
    }

    /// Offers the buffer to each enabled candidate of a heuristic list until one accepts it, and
    /// returns what the accepting dissector consumed, or 0 if none did.
    ///
    /// The tree under `tree`, the packet info and the data sources are saved before every attempt
    /// and restored when a candidate returns 0, so a declining candidate leaves no trace. A
    /// candidate that fails has claimed the buffer: its failure is annotated like that of any
    /// other layer and the whole buffer counts as consumed.
    pub fn try_heuristic(
        &mut self,
        list: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        let registry = self.registry;
        let list = registry
            .heuristic_list(list)
            .ok_or_else(|| DissectError::UnknownHeuristicList(list.to_owned()))?;

        for entry in list.entries().iter().filter(|e| e.enabled()) {
            let saved = self.pinfo.clone();
            let mark = self.tree.mark(tree);
            let nr_sources = self.sources.len();
            trace!(
                list = list.name(),
                heuristic = entry.short_name(),
                "trying heuristic dissector"
            );

            match self.call_dissector_only(entry.handle(), tvb, tree) {
                Ok(0) => {}
                Ok(consumed) => {
                    debug!(
                        list = list.name(),
                        heuristic = entry.short_name(),
                        consumed,
                        "heuristic dissector accepted"
                    );
                    return Ok(consumed);
                }
                Err(err) if err.is_recoverable() => {
                    debug!(
                        list = list.name(),
                        heuristic = entry.short_name(),
                        error = %err,
                        "heuristic dissector failed after accepting"
                    );
                    self.show_exception(entry.handle(), tvb, tree, &err);
                    return Ok(tvb.reported_length());
                }
                Err(err) => return Err(err),
            }

            self.pinfo = saved;
            self.tree.rollback(mark);
            self.sources.truncate(nr_sources);
        }
        Ok(0)
    }

    /// Attaches an expert annotation to the tree and records it in the packet info.
    pub fn add_expert(
        &mut self,
        parent: ProtoItem,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        info: ExpertInfo,
    ) -> Result<ProtoItem, DissectError> {
        let hf = self.registry.builtins().expert;
        self.add_expert_with(hf, parent, tvb, offset, len, info)
    }

    fn add_expert_with(
        &mut self,
        hf: HfIndex,
        parent: ProtoItem,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        info: ExpertInfo,
    ) -> Result<ProtoItem, DissectError> {
        tvb.ensure_bytes_exist(offset, len)?;
        let item = self
            .tree
            .add_expert_item(parent, hf, tvb, offset, len, info.clone())?;
        self.pinfo.expert.push(ExpertInfo { item, ..info });
        Ok(item)
    }

    /// Registers a new data source, e.g. a reassembled payload, and returns the buffer attached
    /// to it. Tree nodes added from the returned buffer point into the new source.
    pub fn add_data_source(&mut self, name: impl Into<String>, tvb: Tvb) -> Tvb {
        let tvb = tvb.with_source(SourceId(self.sources.len() as u32));
        self.sources.push(DataSource {
            name: name.into(),
            tvb: tvb.clone(),
        });
        tvb
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.sources
    }

    fn layer_name(&self, handle: &DissectorHandle) -> &'r str {
        let registry = self.registry;
        match handle.protocol().and_then(|p| registry.protocol(p)) {
            Some(proto) => &proto.short_name,
            None => "unknown",
        }
    }

    fn show_exception(
        &mut self,
        handle: &DissectorHandle,
        tvb: &Tvb,
        tree: ProtoItem,
        err: &DissectError,
    ) {
        let name = self.layer_name(handle);
        debug!(layer = name, error = %err, "layer failed, skipping the rest of it");

        self.pinfo.malformed = true;
        let (summary, severity, column_text) = match err {
            DissectError::Bounds { .. } => {
                self.pinfo.truncated = true;
                (
                    format!("[Packet size limited during capture: {name} truncated]"),
                    Severity::Warn,
                    "[Packet size limited during capture]",
                )
            }
            err if err.is_dissector_bug() => (
                format!("[Dissector bug, protocol {name}: {err}]"),
                Severity::Error,
                "[Dissector bug]",
            ),
            _ => (
                format!("[Malformed Packet: {name}]"),
                Severity::Error,
                "[Malformed Packet]",
            ),
        };
        self.pinfo
            .columns
            .append_sep(Column::Info, " ", column_text);

        let hf = self.registry.builtins().malformed.hf();
        let info = ExpertInfo::new(severity, ExpertGroup::Malformed, summary);
        if let Err(err) = self.add_expert_with(hf, tree, tvb, 0, 0, info) {
            debug!(error = %err, "could not annotate the failed layer");
        }
    }

    /// Annotates a packet whose dissection was aborted.
    pub(crate) fn abort(&mut self, tvb: &Tvb, root: ProtoItem, err: &DissectError) {
        self.pinfo.malformed = true;
        let hf = self.registry.builtins().malformed.hf();
        let info = ExpertInfo::new(
            Severity::Error,
            ExpertGroup::Malformed,
            format!("[Dissection aborted: {err}]"),
        );
        // A full tree has no room for the annotation, the packet info still gets it.
        if self.add_expert_with(hf, root, tvb, 0, 0, info.clone()).is_err() {
            self.pinfo.expert.push(info);
        }
    }

    pub(crate) fn finish(self) -> Dissection {
        Dissection {
            malformed: self.pinfo.malformed,
            consumed: self.consumed,
            tree: self.tree,
            pinfo: self.pinfo,
            sources: self.sources,
            show_hidden: self.show_hidden,
        }
    }
}

#[cfg(test)]
mod test_packet_context {
    use super::*;
    use crate::packet::RegistryBuilder;

    fn registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        let proto = builder.register_protocol("Short Protocol", "SHORT", "short");
        let short = builder.register_dissector(
            "short",
            Some(proto),
            |tvb: &Tvb, _cx: &mut PacketContext<'_>, _tree: ProtoItem| -> Result<usize, DissectError> {
                tvb.get_u32(0, crate::Encoding::BigEndian)?;
                Ok(4)
            },
        );
        builder.add_uint("test.table", 1, &short);
        builder.add_string("test.names", "short", &short);
        builder.build()
    }

    #[test]
    fn addresses_display_like_their_kind() {
        assert_eq!(Address::None.to_string(), "");
        assert_eq!(
            Address::Ether([0, 0x1b, 0x21, 0xaa, 0xbb, 0x0c]).to_string(),
            "00:1b:21:aa:bb:0c"
        );
        assert_eq!(
            Address::Ipv4(Ipv4Addr::new(192, 168, 0, 1)).to_string(),
            "192.168.0.1"
        );
    }

    #[test]
    fn failed_layer_is_annotated_and_skipped() {
        let registry = registry();
        // Two bytes captured out of ten on the wire.
        let tvb = Tvb::new(vec![1, 2], 10);
        let mut cx = PacketContext::new(&registry, &EngineConfig::default(), PacketInfo::default(), &tvb);
        let root = cx.tree.root();

        assert_eq!(cx.call_uint("test.table", 1, &tvb, root), Ok(Some(10)));
        assert!(cx.pinfo.malformed);
        assert!(cx.pinfo.truncated);
        assert_eq!(cx.pinfo.match_uint, 0);
        assert_eq!(cx.depth(), 0);
        assert_eq!(cx.pinfo.expert.len(), 1);
        assert_eq!(
            cx.pinfo.expert[0].summary,
            "[Packet size limited during capture: SHORT truncated]"
        );
        assert_eq!(cx.pinfo.max_severity(), Some(Severity::Warn));
        assert_eq!(
            cx.pinfo.columns.get(Column::Info),
            "[Packet size limited during capture]"
        );
        assert_eq!(cx.layer_names(), vec!["short"]);
    }

    #[test]
    fn string_keys_dispatch() {
        let registry = registry();
        let tvb = Tvb::from_slice(&[0; 4]);
        let mut cx = PacketContext::new(&registry, &EngineConfig::default(), PacketInfo::default(), &tvb);
        let root = cx.tree.root();

        assert_eq!(cx.try_string("test.names", "short", &tvb, root), Ok(true));
        assert_eq!(cx.try_string("test.names", "long", &tvb, root), Ok(false));
        assert_eq!(cx.try_payload("test.names", &tvb, root), Ok(false));
        assert!(!cx.pinfo.malformed);
        assert_eq!(cx.pinfo.match_string, None);
    }

    #[test]
    fn unknown_dissector_names_are_bugs() {
        let registry = registry();
        let tvb = Tvb::from_slice(&[0; 4]);
        let mut cx = PacketContext::new(&registry, &EngineConfig::default(), PacketInfo::default(), &tvb);
        let root = cx.tree.root();
        assert_eq!(
            cx.call_dissector_by_name("nope", &tvb, root),
            Err(DissectError::UnknownDissector("nope".to_owned()))
        );
    }

    #[test]
    fn expert_infos_are_kept_even_without_a_tree() {
        let registry = registry();
        let config = EngineConfig {
            build_tree: false,
            ..Default::default()
        };
        let tvb = Tvb::from_slice(&[0; 4]);
        let mut cx = PacketContext::new(&registry, &config, PacketInfo::default(), &tvb);
        let root = cx.tree.root();

        let info = ExpertInfo::new(Severity::Note, ExpertGroup::Sequence, "Retransmission");
        let item = cx.add_expert(root, &tvb, 0, 2, info).unwrap();
        assert!(item.is_null());
        assert_eq!(cx.pinfo.expert.len(), 1);
        assert!(cx.tree.is_empty());

        let info = ExpertInfo::new(Severity::Note, ExpertGroup::Sequence, "Past the end");
        assert!(cx.add_expert(root, &tvb, 2, 4, info).is_err());
        assert_eq!(cx.pinfo.expert.len(), 1);
    }

    #[test]
    fn data_sources_get_their_own_ids() {
        let registry = registry();
        let tvb = Tvb::from_slice(&[0; 4]);
        let mut cx = PacketContext::new(&registry, &EngineConfig::default(), PacketInfo::default(), &tvb);

        let reassembled = cx.add_data_source("Reassembled", Tvb::from_slice(b"hello world"));
        assert_ne!(reassembled.source(), tvb.source());
        let names: Vec<_> = cx.data_sources().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Frame", "Reassembled"]);
        assert_eq!(cx.data_sources()[1].tvb.source(), reassembled.source());
    }
}
