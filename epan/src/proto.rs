//! Field definitions and the protocol tree.
//!
//! Every value that shows up in a tree is described by a [`HeaderFieldInfo`] registered in a
//! [`FieldTable`] and referenced by its [`HfIndex`]. The tree itself is an arena of
//! [`ProtoNode`]s owned by a [`ProtoTree`]; dissectors only ever hold [`ProtoItem`] handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::expert::ExpertInfo;
use crate::ftypes::{FieldDisplay, FieldType, FieldValue};
use crate::tvb::{sign_extend, Encoding, SourceId, Tvb};
use crate::DissectError;

/// Index of a registered header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HfIndex(pub(crate) u32);

/// Index of a registered subtree type. Subtree types only matter to front-ends that remember
/// which subtrees are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EttIndex(pub(crate) u32);

/// A registered protocol. Protocols are header fields of type [`FieldType::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtoId(pub(crate) HfIndex);

impl ProtoId {
    pub fn hf(self) -> HfIndex {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFieldInfo {
    pub name: String,
    /// The filter name, e.g. `udp.srcport`.
    pub abbrev: String,
    pub ftype: FieldType,
    pub display: FieldDisplay,
    /// Zero when the field covers whole bytes.
    pub bitmask: u64,
    pub blurb: Option<String>,
    pub parent: Option<ProtoId>,
}

impl HeaderFieldInfo {
    pub fn new(name: impl Into<String>, abbrev: impl Into<String>, ftype: FieldType) -> Self {
        HeaderFieldInfo {
            name: name.into(),
            abbrev: abbrev.into(),
            ftype,
            display: FieldDisplay::None,
            bitmask: 0,
            blurb: None,
            parent: None,
        }
    }

    pub fn with_display(mut self, display: FieldDisplay) -> Self {
        self.display = display;
        self
    }

    pub fn with_bitmask(mut self, bitmask: u64) -> Self {
        self.bitmask = bitmask;
        self
    }

    pub fn with_blurb(mut self, blurb: Option<&str>) -> Self {
        self.blurb = blurb.map(str::to_owned);
        self
    }

    pub fn with_parent(mut self, parent: ProtoId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// All registered header fields and subtree types.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    fields: Vec<HeaderFieldInfo>,
    by_abbrev: HashMap<String, HfIndex>,
    etts: HashMap<String, EttIndex>,
    ett_count: u32,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field. Several fields may share a filter name, lookups by name return the
    /// first one.
    pub fn register(&mut self, info: HeaderFieldInfo) -> HfIndex {
        let idx = HfIndex(self.fields.len() as u32);
        self.by_abbrev.entry(info.abbrev.clone()).or_insert(idx);
        self.fields.push(info);
        idx
    }

    /// Creates a label-only field for the given filter name, intended for subtree roots with no
    /// value of their own. If a field with that name exists, simply returns it.
    pub fn get_or_create_text_node(
        &mut self,
        name: &str,
        abbrev: &str,
        parent: Option<ProtoId>,
    ) -> HfIndex {
        if let Some(idx) = self.find(abbrev) {
            return idx;
        }
        let mut info = HeaderFieldInfo::new(name, abbrev, FieldType::None);
        info.parent = parent;
        self.register(info)
    }

    /// Allocates an anonymous subtree type.
    pub fn register_subtree(&mut self) -> EttIndex {
        let idx = EttIndex(self.ett_count);
        self.ett_count += 1;
        idx
    }

    /// Creates a subtree type keyed by name. If one exists for the name, simply returns it.
    pub fn get_or_create_ett(&mut self, name: &str) -> EttIndex {
        if let Some(idx) = self.etts.get(name) {
            return *idx;
        }
        let idx = self.register_subtree();
        self.etts.insert(name.to_owned(), idx);
        idx
    }

    pub fn get(&self, hf: HfIndex) -> Option<&HeaderFieldInfo> {
        self.fields.get(hf.0 as usize)
    }

    pub fn find(&self, abbrev: &str) -> Option<HfIndex> {
        self.by_abbrev.get(abbrev).copied()
    }

    pub fn ett(&self, name: &str) -> Option<EttIndex> {
        self.etts.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HfIndex, &HeaderFieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, info)| (HfIndex(i as u32), info))
    }
}

/// Handle to a node of a [`ProtoTree`]. A null handle stands for "no tree": adding children to
/// it and editing it are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtoItem(Option<u32>);

impl ProtoItem {
    pub const NULL: ProtoItem = ProtoItem(None);

    pub fn is_null(self) -> bool {
        self.0.is_none()
    }

    fn index(self) -> Option<usize> {
        self.0.map(|i| i as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoNode {
    hf: Option<HfIndex>,
    value: Option<FieldValue>,
    source: SourceId,
    start: usize,
    length: Option<usize>,
    text: Option<String>,
    hidden: bool,
    ett: Option<EttIndex>,
    expert: Option<ExpertInfo>,
    parent: ProtoItem,
    children: Vec<ProtoItem>,
}

impl ProtoNode {
    fn new(hf: Option<HfIndex>, tvb: &Tvb, offset: usize, length: Option<usize>) -> Self {
        ProtoNode {
            hf,
            value: None,
            source: tvb.source(),
            start: tvb.raw_offset(offset),
            length,
            text: None,
            hidden: false,
            ett: None,
            expert: None,
            parent: ProtoItem::NULL,
            children: Vec::new(),
        }
    }

    fn with_value(mut self, value: Option<FieldValue>) -> Self {
        self.value = value;
        self
    }

    fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn hf(&self) -> Option<HfIndex> {
        self.hf
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Offset of the first byte in the node's data source.
    pub fn start(&self) -> usize {
        self.start
    }

    /// `None` while the node is an open subtree whose end is not known yet.
    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn ett(&self) -> Option<EttIndex> {
        self.ett
    }

    pub fn expert(&self) -> Option<&ExpertInfo> {
        self.expert.as_ref()
    }

    pub fn parent(&self) -> ProtoItem {
        self.parent
    }

    pub fn children(&self) -> &[ProtoItem] {
        &self.children
    }

    fn contains(&self, source: SourceId, offset: usize) -> bool {
        self.source == source
            && offset >= self.start
            && offset < self.start + self.length.unwrap_or(0)
    }
}

/// A position in a [`ProtoTree`] to roll back to. See [`ProtoTree::mark`].
#[derive(Debug, Clone)]
pub struct TreeMark {
    len: usize,
    parent: ProtoItem,
    parent_state: Option<(Option<String>, Option<usize>, bool, Option<EttIndex>)>,
}

/// The decoded structure of one packet.
#[derive(Debug, Clone)]
pub struct ProtoTree {
    fields: Arc<FieldTable>,
    nodes: Vec<ProtoNode>,
    enabled: bool,
    max_items: usize,
}

impl ProtoTree {
    pub fn new(fields: Arc<FieldTable>) -> Self {
        let root = ProtoNode::new(None, &Tvb::from_slice(&[]), 0, Some(0));
        ProtoTree {
            fields,
            nodes: vec![root],
            enabled: true,
            max_items: usize::MAX,
        }
    }

    /// A tree which only validates: values are still read, so errors still surface, but no node
    /// is ever created.
    pub fn disabled(fields: Arc<FieldTable>) -> Self {
        ProtoTree {
            enabled: false,
            ..Self::new(fields)
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The invisible root every top-level node hangs from.
    pub fn root(&self) -> ProtoItem {
        if self.enabled {
            ProtoItem(Some(0))
        } else {
            ProtoItem::NULL
        }
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Number of nodes, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, item: ProtoItem) -> Option<&ProtoNode> {
        self.nodes.get(item.index()?)
    }

    fn node_mut(&mut self, item: ProtoItem) -> Option<&mut ProtoNode> {
        self.nodes.get_mut(item.index()?)
    }

    pub fn children(&self, item: ProtoItem) -> &[ProtoItem] {
        self.node(item).map_or(&[], |n| n.children())
    }

    pub fn parent(&self, item: ProtoItem) -> ProtoItem {
        self.node(item).map_or(ProtoItem::NULL, |n| n.parent)
    }

    /// The most recently added child of `parent`.
    pub fn last_child(&self, parent: ProtoItem) -> ProtoItem {
        self.children(parent)
            .last()
            .copied()
            .unwrap_or(ProtoItem::NULL)
    }

    fn field(&self, hf: HfIndex) -> Result<&HeaderFieldInfo, DissectError> {
        self.fields
            .get(hf)
            .ok_or_else(|| DissectError::UnknownField(format!("#{}", hf.0)))
    }

    fn push(&mut self, parent: ProtoItem, mut node: ProtoNode) -> Result<ProtoItem, DissectError> {
        if !self.enabled {
            return Ok(ProtoItem::NULL);
        }
        let Some(p) = parent.index().filter(|p| *p < self.nodes.len()) else {
            return Ok(ProtoItem::NULL);
        };
        if self.len() >= self.max_items {
            return Err(DissectError::TreeItemsExceeded {
                max: self.max_items,
            });
        }
        let item = ProtoItem(Some(self.nodes.len() as u32));
        node.parent = parent;
        self.nodes.push(node);
        self.nodes[p].children.push(item);
        Ok(item)
    }

    /// Reads the field `hf` from the buffer and adds it under `parent`.
    ///
    /// With `length = None` the field takes its natural width, or the rest of the captured bytes
    /// for variable width kinds.
    pub fn add_item(
        &mut self,
        parent: ProtoItem,
        hf: HfIndex,
        tvb: &Tvb,
        offset: usize,
        length: Option<usize>,
        enc: Encoding,
    ) -> Result<ProtoItem, DissectError> {
        self.add_item_ret_value(parent, hf, tvb, offset, length, enc)
            .map(|(item, _)| item)
    }

    /// Like [`add_item`](Self::add_item), also returning the decoded value.
    pub fn add_item_ret_value(
        &mut self,
        parent: ProtoItem,
        hf: HfIndex,
        tvb: &Tvb,
        offset: usize,
        length: Option<usize>,
        enc: Encoding,
    ) -> Result<(ProtoItem, FieldValue), DissectError> {
        let info = self.field(hf)?;
        let (ftype, bitmask) = (info.ftype, info.bitmask);

        let len = length
            .or(ftype.wire_width())
            .unwrap_or_else(|| tvb.captured_length_remaining(offset));
        let mut value = ftype.from_tvb(tvb, offset, len, enc)?;
        if bitmask != 0 {
            value = apply_bitmask(value, bitmask);
        }

        let stored = match ftype {
            FieldType::None | FieldType::Protocol => None,
            _ => Some(value.clone()),
        };
        let node = ProtoNode::new(Some(hf), tvb, offset, Some(len)).with_value(stored);
        let item = self.push(parent, node)?;
        Ok((item, value))
    }

    /// Adds the item for a protocol layer. `length = None` covers the rest of the captured
    /// bytes.
    pub fn add_protocol_item(
        &mut self,
        parent: ProtoItem,
        proto: ProtoId,
        tvb: &Tvb,
        offset: usize,
        length: Option<usize>,
    ) -> Result<ProtoItem, DissectError> {
        let len = length.unwrap_or_else(|| tvb.captured_length_remaining(offset));
        tvb.ensure_bytes_exist(offset, len)?;
        self.field(proto.hf())?;
        self.push(parent, ProtoNode::new(Some(proto.hf()), tvb, offset, Some(len)))
    }

    /// Adds a value-less field (a protocol or a label field) whose length is not known yet.
    /// Close it with [`set_end`](Self::set_end) or [`set_len`](Self::set_len).
    pub fn add_item_open(
        &mut self,
        parent: ProtoItem,
        hf: HfIndex,
        tvb: &Tvb,
        offset: usize,
    ) -> Result<ProtoItem, DissectError> {
        tvb.ensure_bytes_exist(offset, 0)?;
        self.field(hf)?;
        self.push(parent, ProtoNode::new(Some(hf), tvb, offset, None))
    }

    /// Adds a node with a value supplied by the dissector, e.g. a computed or reformatted one.
    /// When `repr` is set, the label shows it instead of the formatted value.
    #[allow(clippy::too_many_arguments)]
    pub fn add_item_with_value(
        &mut self,
        parent: ProtoItem,
        hf: HfIndex,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        value: FieldValue,
        repr: Option<&str>,
    ) -> Result<ProtoItem, DissectError> {
        tvb.ensure_bytes_exist(offset, len)?;
        let info = self.field(hf)?;
        let mut node = ProtoNode::new(Some(hf), tvb, offset, Some(len)).with_value(Some(value));
        if let Some(repr) = repr {
            node.text = Some(format!("{}: {}", info.name, repr));
        }
        self.push(parent, node)
    }

    /// Adds a label covering `len` bytes.
    pub fn add_text(
        &mut self,
        parent: ProtoItem,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        text: impl Into<String>,
    ) -> Result<ProtoItem, DissectError> {
        tvb.ensure_bytes_exist(offset, len)?;
        self.push(parent, ProtoNode::new(None, tvb, offset, Some(len)).with_text(text))
    }

    /// Adds a labelled subtree whose length is not known yet.
    pub fn add_subtree_open(
        &mut self,
        parent: ProtoItem,
        tvb: &Tvb,
        offset: usize,
        ett: EttIndex,
        text: impl Into<String>,
    ) -> Result<ProtoItem, DissectError> {
        tvb.ensure_bytes_exist(offset, 0)?;
        let item = self.push(parent, ProtoNode::new(None, tvb, offset, None).with_text(text))?;
        Ok(self.add_subtree(item, ett))
    }

    pub(crate) fn add_expert_item(
        &mut self,
        parent: ProtoItem,
        hf: HfIndex,
        tvb: &Tvb,
        offset: usize,
        len: usize,
        info: ExpertInfo,
    ) -> Result<ProtoItem, DissectError> {
        let mut node = ProtoNode::new(Some(hf), tvb, offset, Some(len)).with_text(&info.summary);
        node.expert = Some(info);
        let item = self.push(parent, node)?;
        if let Some(node) = self.node_mut(item) {
            if let Some(expert) = node.expert.as_mut() {
                expert.item = item;
            }
        }
        Ok(item)
    }

    /// Turns `item` into a subtree root and returns it, so children can be added to it.
    pub fn add_subtree(&mut self, item: ProtoItem, ett: EttIndex) -> ProtoItem {
        match self.node_mut(item) {
            Some(node) => {
                node.ett = Some(ett);
                item
            }
            None => ProtoItem::NULL,
        }
    }

    /// Sets the length of `item` so that it ends right before `end` in `tvb`.
    pub fn set_end(&mut self, item: ProtoItem, tvb: &Tvb, end: usize) {
        let end = tvb.raw_offset(end);
        if let Some(node) = self.node_mut(item) {
            node.length = Some(end.saturating_sub(node.start));
        }
    }

    pub fn set_len(&mut self, item: ProtoItem, len: usize) {
        if let Some(node) = self.node_mut(item) {
            node.length = Some(len);
        }
    }

    /// Replaces the label of `item`.
    pub fn set_text(&mut self, item: ProtoItem, text: impl Into<String>) {
        if let Some(node) = self.node_mut(item) {
            node.text = Some(text.into());
        }
    }

    pub fn append_text(&mut self, item: ProtoItem, text: &str) {
        if self.node(item).is_none() {
            return;
        }
        let mut label = self.label(item);
        label.push_str(text);
        self.set_text(item, label);
    }

    pub fn set_hidden(&mut self, item: ProtoItem) {
        if let Some(node) = self.node_mut(item) {
            node.hidden = true;
        }
    }

    pub(crate) fn set_value(&mut self, item: ProtoItem, value: FieldValue) {
        if let Some(node) = self.node_mut(item) {
            node.value = Some(value);
        }
    }

    /// The text shown for `item`: its override text if set, otherwise `Name: value`.
    pub fn label(&self, item: ProtoItem) -> String {
        let Some(node) = self.node(item) else {
            return String::new();
        };
        if let Some(text) = &node.text {
            return text.clone();
        }
        let Some(info) = node.hf.and_then(|hf| self.fields.get(hf)) else {
            return String::new();
        };
        match &node.value {
            Some(value) => format!(
                "{}: {}",
                info.name,
                info.ftype.to_display(value, info.display)
            ),
            None => info.name.clone(),
        }
    }

    /// Every node for field `hf`, in insertion order.
    pub fn find_all(&self, hf: HfIndex) -> impl Iterator<Item = ProtoItem> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.hf == Some(hf))
            .map(|(i, _)| ProtoItem(Some(i as u32)))
    }

    /// Every node for the field named `abbrev`, including fields sharing the name.
    pub fn find_by_abbrev<'a>(&'a self, abbrev: &'a str) -> impl Iterator<Item = ProtoItem> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| {
                n.hf
                    .and_then(|hf| self.fields.get(hf))
                    .is_some_and(|info| info.abbrev == abbrev)
            })
            .map(|(i, _)| ProtoItem(Some(i as u32)))
    }

    pub fn first_value(&self, hf: HfIndex) -> Option<&FieldValue> {
        self.find_all(hf)
            .find_map(|item| self.node(item).and_then(|n| n.value.as_ref()))
    }

    /// Nodes whose byte range covers `offset` in the given data source, outermost first.
    pub fn nodes_at(&self, source: SourceId, offset: usize) -> Vec<ProtoItem> {
        self.walk()
            .filter(|(_, item)| self.node(*item).is_some_and(|n| n.contains(source, offset)))
            .map(|(_, item)| item)
            .collect()
    }

    /// Depth-first traversal of all nodes with their depth, top-level nodes at depth 0.
    pub fn walk(&self) -> Walk<'_> {
        let stack = self
            .children(ProtoItem(Some(0)))
            .iter()
            .rev()
            .map(|c| (0, *c))
            .collect();
        Walk { tree: self, stack }
    }

    /// Remembers the current shape of the tree under `parent`, see [`rollback`](Self::rollback).
    pub fn mark(&self, parent: ProtoItem) -> TreeMark {
        TreeMark {
            len: self.nodes.len(),
            parent,
            parent_state: self
                .node(parent)
                .map(|n| (n.text.clone(), n.length, n.hidden, n.ett)),
        }
    }

    /// Drops every node added since `mark` and restores the label, length, visibility and
    /// subtree type of the marked parent.
    pub fn rollback(&mut self, mark: TreeMark) {
        for idx in (mark.len..self.nodes.len()).rev() {
            if let Some(p) = self.nodes[idx].parent.index().filter(|p| *p < mark.len) {
                let child = ProtoItem(Some(idx as u32));
                self.nodes[p].children.retain(|c| *c != child);
            }
        }
        self.nodes.truncate(mark.len.max(1));
        if let (Some(node), Some((text, length, hidden, ett))) =
            (self.node_mut(mark.parent), mark.parent_state)
        {
            node.text = text;
            node.length = length;
            node.hidden = hidden;
            node.ett = ett;
        }
    }

    /// Renders the tree as indented text.
    pub fn render(&self, show_hidden: bool) -> String {
        let mut out = String::new();
        let mut hidden_depth: Option<usize> = None;
        for (depth, item) in self.walk() {
            if let Some(d) = hidden_depth {
                if depth > d {
                    continue;
                }
                hidden_depth = None;
            }
            let Some(node) = self.node(item) else {
                continue;
            };
            if node.hidden && !show_hidden {
                hidden_depth = Some(depth);
                continue;
            }
            out.push_str(&"    ".repeat(depth));
            out.push_str(&self.label(item));
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ProtoTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

pub struct Walk<'a> {
    tree: &'a ProtoTree,
    stack: Vec<(usize, ProtoItem)>,
}

impl Iterator for Walk<'_> {
    type Item = (usize, ProtoItem);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, item) = self.stack.pop()?;
        let children = self.tree.children(item);
        self.stack
            .extend(children.iter().rev().map(|c| (depth + 1, *c)));
        Some((depth, item))
    }
}

fn apply_bitmask(value: FieldValue, mask: u64) -> FieldValue {
    let shift = mask.trailing_zeros();
    match value {
        FieldValue::Uint(v) => FieldValue::Uint((v & mask) >> shift),
        FieldValue::Boolean(v) => FieldValue::Boolean(v & mask),
        FieldValue::Int(v) => {
            let bits = 64 - mask.leading_zeros() - shift;
            FieldValue::Int(sign_extend(((v as u64) & mask) >> shift, bits))
        }
        other => other,
    }
}

#[cfg(test)]
mod test_proto_tree {
    use super::*;

    struct Fixture {
        tree: ProtoTree,
        proto: ProtoId,
        hf_port: HfIndex,
        hf_flags: HfIndex,
        hf_payload: HfIndex,
        ett: EttIndex,
    }

    fn fixture() -> Fixture {
        let mut fields = FieldTable::new();
        let proto = ProtoId(fields.register(HeaderFieldInfo::new(
            "Test Protocol",
            "test",
            FieldType::Protocol,
        )));
        let hf_port = fields.register(
            HeaderFieldInfo::new("Port", "test.port", FieldType::Uint16)
                .with_display(FieldDisplay::Dec),
        );
        let hf_flags = fields.register(
            HeaderFieldInfo::new("Flag", "test.flag", FieldType::Uint8)
                .with_bitmask(0x30)
                .with_display(FieldDisplay::Hex),
        );
        let hf_payload = fields.register(
            HeaderFieldInfo::new("Payload", "test.payload", FieldType::Bytes)
                .with_display(FieldDisplay::SepColon),
        );
        let ett = fields.get_or_create_ett("test");
        Fixture {
            tree: ProtoTree::new(Arc::new(fields)),
            proto,
            hf_port,
            hf_flags,
            hf_payload,
            ett,
        }
    }

    #[test]
    fn builds_nested_items_in_order() {
        let Fixture {
            mut tree,
            proto,
            hf_port,
            hf_payload,
            ett,
            ..
        } = fixture();
        let tvb = Tvb::from_slice(&[0x00, 0x35, 0xde, 0xad]);

        let ti = tree.add_protocol_item(tree.root(), proto, &tvb, 0, None).unwrap();
        let sub = tree.add_subtree(ti, ett);
        let port = tree
            .add_item(sub, hf_port, &tvb, 0, None, Encoding::BigEndian)
            .unwrap();
        tree.add_item(sub, hf_payload, &tvb, 2, None, Encoding::Na)
            .unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children(sub).len(), 2);
        assert_eq!(tree.label(ti), "Test Protocol");
        assert_eq!(tree.label(port), "Port: 53");
        assert_eq!(tree.first_value(hf_port), Some(&FieldValue::Uint(53)));
        assert_eq!(
            tree.to_string(),
            "Test Protocol\n    Port: 53\n    Payload: de:ad\n"
        );
        assert_eq!(tree.node(ti).and_then(|n| n.length()), Some(4));
    }

    #[test]
    fn bitmask_is_applied() {
        let Fixture {
            mut tree, hf_flags, ..
        } = fixture();
        let tvb = Tvb::from_slice(&[0xff]);
        let (_, value) = tree
            .add_item_ret_value(tree.root(), hf_flags, &tvb, 0, None, Encoding::Na)
            .unwrap();
        assert_eq!(value, FieldValue::Uint(3));
    }

    #[test]
    fn disabled_tree_still_validates() {
        let Fixture { tree, hf_port, .. } = fixture();
        let mut tree = ProtoTree::disabled(Arc::new(tree.fields().clone()));
        let tvb = Tvb::new(vec![0x00], 4);

        assert!(tree.root().is_null());
        assert!(matches!(
            tree.add_item(tree.root(), hf_port, &tvb, 0, None, Encoding::BigEndian),
            Err(DissectError::Bounds { .. })
        ));
        let item = tree
            .add_text(tree.root(), &tvb, 0, 1, "label")
            .unwrap();
        assert!(item.is_null());
        tree.set_text(item, "ignored");
        assert!(tree.is_empty());
    }

    #[test]
    fn open_subtree_is_closed_later() {
        let Fixture { mut tree, ett, .. } = fixture();
        let tvb = Tvb::from_slice(&[0; 10]);
        let sub = tvb.subset(2, 8).unwrap();

        let item = tree
            .add_subtree_open(tree.root(), &sub, 1, ett, "Options")
            .unwrap();
        assert_eq!(tree.node(item).and_then(|n| n.length()), None);
        assert_eq!(tree.node(item).map(|n| n.start()), Some(3));

        tree.set_end(item, &sub, 5);
        assert_eq!(tree.node(item).and_then(|n| n.length()), Some(4));
        assert_eq!(tree.nodes_at(SourceId::FRAME, 6), vec![item]);
        assert!(tree.nodes_at(SourceId::FRAME, 7).is_empty());
    }

    #[test]
    fn rollback_restores_parent() {
        let Fixture {
            mut tree,
            proto,
            hf_port,
            ..
        } = fixture();
        let tvb = Tvb::from_slice(&[0, 1, 2, 3]);
        let ti = tree.add_protocol_item(tree.root(), proto, &tvb, 0, None).unwrap();
        let before = tree.to_string();

        let mark = tree.mark(ti);
        tree.add_item(ti, hf_port, &tvb, 0, None, Encoding::BigEndian)
            .unwrap();
        tree.append_text(ti, ", junk");
        tree.set_hidden(ti);
        tree.rollback(mark);

        assert_eq!(tree.to_string(), before);
        assert!(tree.children(ti).is_empty());
        assert_eq!(tree.find_all(hf_port).count(), 0);
    }

    #[test]
    fn item_ceiling() {
        let Fixture { tree, .. } = fixture();
        let mut tree = tree.with_max_items(2);
        let tvb = Tvb::from_slice(&[0]);
        tree.add_text(tree.root(), &tvb, 0, 1, "a").unwrap();
        tree.add_text(tree.root(), &tvb, 0, 1, "b").unwrap();
        assert_eq!(
            tree.add_text(tree.root(), &tvb, 0, 1, "c"),
            Err(DissectError::TreeItemsExceeded { max: 2 })
        );
    }

    #[test]
    fn hidden_items_are_not_rendered() {
        let Fixture {
            mut tree, hf_port, ..
        } = fixture();
        let tvb = Tvb::from_slice(&[0, 7]);
        let item = tree
            .add_item(tree.root(), hf_port, &tvb, 0, None, Encoding::BigEndian)
            .unwrap();
        tree.set_hidden(item);
        assert_eq!(tree.render(false), "");
        assert_eq!(tree.render(true), "Port: 7\n");
        assert_eq!(tree.find_by_abbrev("test.port").count(), 1);
    }

    #[test]
    fn fields_are_idempotent_by_name() {
        let mut fields = FieldTable::new();
        let a = fields.get_or_create_text_node("Header", "p.header", None);
        let b = fields.get_or_create_text_node("Header", "p.header", None);
        assert_eq!(a, b);
        assert_eq!(fields.get_or_create_ett("p"), fields.get_or_create_ett("p"));
        assert_ne!(fields.get_or_create_ett("p"), fields.register_subtree());
    }
}
