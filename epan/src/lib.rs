//! **epan** is a packet dissection engine: it takes captured frames and decodes them, layer by
//! layer, into a tree of typed fields. Protocols are written either by hand, as functions over a
//! [`Tvb`] cursor, or declaratively from Rust data types with `#[derive(Protocol)]`.
//!
//! * [Getting started](#getting-started)
//! * [The engine](#the-engine)
//!     * [Buffers](#buffers)
//!     * [Fields and the protocol tree](#fields-and-the-protocol-tree)
//!     * [Dispatch](#dispatch)
//!     * [Errors](#errors)
//! * [Deriving dissectors](#deriving-dissectors)
//!     * [Types](#types)
//!     * [Taps and custom displays](#taps-and-custom-displays)
//!     * [Calling subdissectors](#calling-subdissectors)
//!     * [Attributes](#attributes)
//!
//! # Getting started
//!
//! A UDP dissector, bound to the IP protocol table and handing its payload to whatever is
//! registered for its ports, looks like this.
//!
//! ```rust
//! use epan::{Epan, EngineConfig, Frame, RegistryBuilder};
//!
//! #[derive(epan::Protocol)]
//! #[epan(decode_from = [("ip.proto", 17)])]
//! struct Udp {
//!     src_port: u16,
//!     dst_port: u16,
//!     length: u16,
//!     checksum: u16,
//!     #[epan(subdissector = ("udp.port", "dst_port", "src_port"))]
//!     payload: Vec<u8>,
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register::<Udp>();
//! // Pretend the frames carry bare UDP.
//! let udp = builder.find_dissector("udp").unwrap();
//! builder.add_uint(epan::WTAP_ENCAP_TABLE, 1, &udp);
//!
//! let epan = Epan::new(builder.build(), EngineConfig::default()).unwrap();
//! let frame = Frame::new(1, 1, vec![0x30, 0x39, 0x00, 0x35, 0x00, 0x0a, 0x00, 0x00, 0xca, 0xfe]);
//! let dissection = epan.dissect(&frame).unwrap();
//!
//! let dst_port = dissection.tree.fields().find("udp.dst_port").unwrap();
//! assert_eq!(dissection.tree.first_value(dst_port).unwrap().as_u64(), Some(53));
//! ```
//!
//! * The protocol **derives `epan::Protocol`**. Since this is UDP, the dissector is bound to the
//! `"ip.proto"` table under key 17, and the `"udp.port"` table is created for the next layer.
//! * [`RegistryBuilder::register`] registers the protocol, its fields and its dissector, then
//! runs its handoff. Once every protocol is in, [`RegistryBuilder::build`] freezes the registry.
//! * [`Epan`] dissects frames against the frozen registry. It is `Send + Sync`, so any number of
//! threads may share it.
//!
//! # The engine
//!
//! ## Buffers
//!
//! A [`Tvb`] is a bounds-checked view into packet bytes. It knows two lengths: what was captured,
//! and what the packet claims it had on the wire. Reads past the captured bytes fail with
//! [`DissectError::Bounds`], reads past the reported length with
//! [`DissectError::ReportedBounds`]. Subsets and composites share the underlying storage.
//!
//! ## Fields and the protocol tree
//!
//! Every field has a [`HeaderFieldInfo`], registered once and identified by an [`HfIndex`]. The
//! per-packet [`ProtoTree`] holds nodes pointing at a field, a byte range and a decoded
//! [`FieldValue`]. Values can be parsed from text and compared with [`FieldType::parse`] and
//! [`FieldValue::compare`], the way a display filter would.
//!
//! ## Dispatch
//!
//! Dissectors find the next layer through [dissector tables](DissectorTable), keyed by integers
//! (ports, ethertypes), strings or a single payload binding, and through
//! [heuristic lists](HeuristicList) whose candidates inspect the buffer and decline by returning
//! 0. A declining candidate leaves no trace in the tree, the packet info or the data sources. A
//! candidate that fails has claimed the buffer, and its failure is annotated like any other.
//!
//! ```rust
//! use epan::{DissectError, Encoding, FieldDisplay, FieldType, HeaderFieldInfo, PacketContext};
//! use epan::{ProtoItem, RegistryBuilder, Tvb};
//!
//! let mut builder = RegistryBuilder::new();
//! let proto = builder.register_protocol("Trivial Protocol", "TRIV", "triv");
//! let hf_magic = builder.register_field(
//!     HeaderFieldInfo::new("Magic", "triv.magic", FieldType::Uint16)
//!         .with_display(FieldDisplay::Hex)
//!         .with_parent(proto),
//! );
//! let ett = builder.get_or_create_ett("triv");
//! builder.register_heuristic_list("udp");
//! let triv = builder.create_dissector_handle(
//!     proto,
//!     move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
//!         if !tvb.bytes_exist(0, 2) || tvb.get_u16(0, Encoding::BigEndian)? != 0xbeef {
//!             return Ok(0);
//!         }
//!         let ti = cx.tree.add_protocol_item(tree, proto, tvb, 0, Some(2))?;
//!         let subtree = cx.tree.add_subtree(ti, ett);
//!         cx.tree.add_item(subtree, hf_magic, tvb, 0, None, Encoding::BigEndian)?;
//!         Ok(2)
//!     },
//! );
//! builder.add_heuristic("udp", "triv_udp", &triv, 0);
//! let registry = builder.build();
//! assert_eq!(registry.heuristic_list("udp").unwrap().entries().len(), 1);
//! ```
//!
//! ## Errors
//!
//! Dissectors return `Result<usize, DissectError>` and use `?` freely. A bounds or malformed
//! error stops the layer that raised it: the nearest [`PacketContext::call_dissector`] records it
//! in the tree ("[Malformed Packet: X]" or "[Packet size limited during capture: X truncated]"),
//! marks the packet, and the layers below carry on. Exceeding the recursion depth or the tree
//! size aborts the whole packet instead. See [`DissectError::is_recoverable`].
//!
//! # Deriving dissectors
//!
//! ## Types
//!
//! Rust type              | Field type  | Encoding     | Display
//! -----------------------|-------------|--------------|-----------
//! `u8` to `u64`          | `FT_UINT*`  | big endian   | decimal
//! `i8` to `i64`          | `FT_INT*`   | big endian   | decimal
//! `Vec<u8>` or `[u8; _]` | `FT_BYTES`  | none         | colon separated
//!
//! Nested types derive `ProtocolField` and become subtrees. A unit tuple struct is transparent:
//! it decodes exactly like the type it wraps.
//!
//! ```rust
//! #[derive(epan::Protocol)]
//! #[epan(decode_from = "moldudp64.payload")]
//! struct MyProtocol {
//!     header: Header,
//! }
//!
//! #[derive(epan::ProtocolField)]
//! struct Header {
//!     src_port: u16,
//!     dst_port: u16,
//!     sequence: SequenceNumber,
//! }
//!
//! #[derive(epan::ProtocolField)]
//! struct SequenceNumber(u64);
//! ```
//!
//! A `Vec<u8>` takes the rest of the buffer, unless a prior field gives its length.
//!
//! ```rust
//! #[derive(epan::ProtocolField)]
//! struct Message {
//!     length: u16,
//!     #[epan(len_field = "length")]
//!     data: Vec<u8>,
//! }
//! ```
//!
//! ## Taps and custom displays
//!
//! A tap is a function called with the value of a field as it is decoded. Its parameters are
//! picked out of the current packet by type, in any order; see the [`tap`] module.
//!
//! ```rust
//! use epan::tap::{Field, Fields, Offset};
//!
//! #[derive(epan::ProtocolField)]
//! struct Header {
//!     #[epan(save)]
//!     kind: u8,
//!     #[epan(tap = "check_len")]
//!     len: u16,
//! }
//!
//! fn check_len(Field(len): Field<u16>, Fields(fields): Fields, Offset(offset): Offset) {
//!     let kind = fields.get_u8("proto.header.kind");
//!     println!("kind {kind:?} with length {len} at offset {offset}");
//! }
//! ```
//!
//! `decode_with` takes the same parameters and returns the text to display instead of the
//! formatted value.
//!
//! ```rust
//! use epan::tap::Field;
//!
//! #[derive(epan::ProtocolField)]
//! struct Header {
//!     #[epan(decode_with = "show_flag")]
//!     flag: u8,
//! }
//!
//! fn show_flag(Field(flag): Field<u8>) -> &'static str {
//!     if flag == 0 { "off" } else { "on" }
//! }
//! ```
//!
//! ## Calling subdissectors
//!
//! A byte field can be handed to the next layer instead of being shown as bytes.
//!
//! * `#[epan(subdissector = "foo.payload")]` calls the payload binding of the `"foo.payload"`
//! table, which is what a "decode as" setting would pick.
//! * `#[epan(subdissector = ("foo.port", "dst_port", "src_port"))]` looks the value of each listed
//! field up in the `"foo.port"` table, in order, until one has a dissector.
//!
//! If nothing is found the bytes go to the `data` dissector. A payload whose length is given by
//! a prior field is dissected inside the current protocol's subtree; otherwise the next layer is
//! added next to the current protocol.
//!
//! ## Attributes
//!
//! ### Protocol attributes
//!
//! * `#[epan(proto_desc = "...")]`, `#[epan(proto_name = "...")]`, `#[epan(proto_filter =
//! "...")]`: the long name, short name and filter name. They default to the type's name, upper
//! cased, and for the filter name, snake cased.
//! * `#[epan(decode_from = "foo.payload")]` or `#[epan(decode_from = [("foo.port", 1234, 5678),
//! "bar.payload"])]`: the tables to bind the protocol's dissector into.
//!
//! ### Field attributes
//!
//! * `#[epan(rename = "...")]`: display name of the field, otherwise its name title cased.
//! * `#[epan(hide)]`: the field is decoded and can be found, but is not shown.
//! * `#[epan(save)]`: the value is kept in the packet's [`FieldsStore`] under its filter name.
//! * `#[epan(len_field = "...")]`: the byte length of a `Vec<u8>`.
//! * `#[epan(enc = "little")]`: byte order of an integer, `"big"` by default.
//! * `#[epan(display = "hex")]`: one of `"dec"`, `"hex"`, `"oct"`, `"dec_hex"`, `"hex_dec"`.
//! * `#[epan(tap = "...")]` or `#[epan(tap = ["...", "..."])]`, `#[epan(decode_with = "...")]`,
//! `#[epan(subdissector = ...)]`: see above.
//!
//! Doc comments on fields become the field's description.

pub mod column;
pub mod config;
pub mod context;
pub mod dissect;
pub mod error;
pub mod expert;
pub mod fields;
pub mod frame;
pub mod ftypes;
pub mod packet;
pub mod proto;
pub mod tap;
pub mod tvb;

pub use column::{Column, Columns};
pub use config::{ConfigError, EngineConfig};
pub use context::{Address, DataSource, PacketContext, PacketInfo, PortType};
pub use dissect::{
    DissectorArgs, Dissect, Primitive, Protocol, ProtocolDissector, RegisterArgs, Subdissect,
    SubdissectorKey,
};
pub use error::DissectError;
pub use expert::{ExpertGroup, ExpertInfo, Severity};
pub use fields::FieldsStore;
pub use frame::{Builtins, Dissection, Epan, Frame};
pub use ftypes::{CmpOp, FieldDisplay, FieldType, FieldValue, FtError, Timestamp};
pub use packet::{
    Dissector, DissectorHandle, DissectorTable, Duplicate, HeuristicEntry, HeuristicList,
    ProtocolInfo, Registry, RegistryBuilder, TableKey, WTAP_ENCAP_TABLE,
};
pub use proto::{
    EttIndex, FieldTable, HeaderFieldInfo, HfIndex, ProtoId, ProtoItem, ProtoNode, ProtoTree,
    TreeMark,
};
pub use tvb::{Encoding, SourceId, Tvb};

pub use epan_derive::{Protocol, ProtocolField};
