//! The traits and helpers behind `#[derive(Protocol)]` and `#[derive(ProtocolField)]`.
//!
//! Generated code walks a struct's fields in order. Each field gets a [`DissectorArgs`] pointing
//! at its offset and its filter name (the *prefix*, e.g. `udp.src_port`), and is decoded by its
//! type's [`Dissect`] implementation. Registration goes the same way with [`RegisterArgs`].

use std::fmt::Display;
use std::marker::PhantomData;

use bytes::Bytes;

use crate::column::Column;
use crate::fields::FieldsStore;
use crate::ftypes::{FieldDisplay, FieldType, FieldValue};
use crate::packet::{Dissector, RegistryBuilder};
use crate::proto::{EttIndex, HeaderFieldInfo, HfIndex, ProtoId, ProtoItem};
use crate::{DissectError, Encoding, PacketContext, Tvb};

/// Integers are big endian unless a field says otherwise.
pub const DEFAULT_INT_ENCODING: Encoding = Encoding::BigEndian;

/// Everything a field needs to know to decode itself.
#[derive(Clone, Copy)]
pub struct DissectorArgs<'a> {
    pub tvb: &'a Tvb,
    /// Tree the protocol itself was added to. Subdissectors hang their layer here.
    pub proto_root: ProtoItem,
    /// Filter name of the field, e.g. `udp.src_port`.
    pub prefix: &'a str,
    pub offset: usize,
    /// Node to add the field under.
    pub parent: ProtoItem,
    /// Number of bytes taken by a variable length field, as given by an earlier length field.
    pub list_len: Option<usize>,
    pub enc: Option<Encoding>,
}

impl DissectorArgs<'_> {
    pub fn hf_index(&self, cx: &PacketContext<'_>) -> Result<HfIndex, DissectError> {
        cx.field(self.prefix)
    }

    pub fn ett_index(&self, cx: &PacketContext<'_>) -> Option<EttIndex> {
        cx.registry().fields().ett(self.prefix)
    }

    /// Adds the node of a struct field (or of the protocol itself) with an open length, and
    /// makes it a subtree. The caller closes it once all the inner fields are known.
    pub fn add_subtree(&self, cx: &mut PacketContext<'_>) -> Result<ProtoItem, DissectError> {
        let hf = self.hf_index(cx)?;
        let ett = self.ett_index(cx);
        let item = cx.tree.add_item_open(self.parent, hf, self.tvb, self.offset)?;
        Ok(match ett {
            Some(ett) => cx.tree.add_subtree(item, ett),
            None => item,
        })
    }
}

/// Everything a field needs to know to register itself.
#[derive(Debug, Clone, Copy)]
pub struct RegisterArgs<'a> {
    pub proto_id: ProtoId,
    /// Display name of the field.
    pub name: &'a str,
    pub prefix: &'a str,
    pub blurb: Option<&'a str>,
    pub display: Option<FieldDisplay>,
}

/// A type which knows how to decode and register itself as a field.
pub trait Dissect {
    /// The decoded value, for fields whose value can be used by later fields. `()` otherwise.
    type Emit;

    /// Adds the field to the protocol tree. Returns the number of bytes dissected.
    fn add_to_tree(
        args: &DissectorArgs<'_>,
        cx: &mut PacketContext<'_>,
    ) -> Result<usize, DissectError>;

    /// Registers the field, and any inner fields, under `args.prefix`.
    fn register(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder);

    /// Decodes the value without touching the tree.
    fn emit(args: &DissectorArgs<'_>) -> Result<Self::Emit, DissectError>;
}

/// A single field with a value.
pub trait Primitive: Dissect {
    /// Adds the field to the protocol tree, displayed with a custom string.
    fn add_to_tree_format_value(
        args: &DissectorArgs<'_>,
        cx: &mut PacketContext<'_>,
        s: &impl Display,
    ) -> Result<usize, DissectError>;

    /// Saves the field into the packet's fields store.
    fn save(args: &DissectorArgs<'_>, store: &mut FieldsStore) -> Result<(), DissectError>;
}

/// Adds a single field to the protocol tree, read straight from the buffer.
fn add_to_tree_single_field(
    args: &DissectorArgs<'_>,
    cx: &mut PacketContext<'_>,
    size: usize,
    default_enc: Encoding,
) -> Result<usize, DissectError> {
    let hf = args.hf_index(cx)?;
    cx.tree.add_item(
        args.parent,
        hf,
        args.tvb,
        args.offset,
        Some(size),
        args.enc.unwrap_or(default_enc),
    )?;
    Ok(size)
}

fn add_to_tree_format_value(
    args: &DissectorArgs<'_>,
    cx: &mut PacketContext<'_>,
    size: usize,
    value: FieldValue,
    s: &impl Display,
) -> Result<usize, DissectError> {
    let hf = args.hf_index(cx)?;
    cx.tree.add_item_with_value(
        args.parent,
        hf,
        args.tvb,
        args.offset,
        size,
        value,
        Some(&s.to_string()),
    )?;
    Ok(size)
}

fn register_hf_index(
    args: &RegisterArgs<'_>,
    builder: &mut RegistryBuilder,
    default_display: FieldDisplay,
    ftype: FieldType,
) -> HfIndex {
    builder.register_field(
        HeaderFieldInfo::new(args.name, args.prefix, ftype)
            .with_display(args.display.unwrap_or(default_display))
            .with_blurb(args.blurb)
            .with_parent(args.proto_id),
    )
}

/// Registers the node and the subtree index of a struct field. The protocol's own node already
/// exists by the time its fields are registered, so it is reused.
pub fn register_subtree(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder) {
    if builder.find_field(args.prefix).is_none() {
        builder.get_or_create_text_node(args.name, args.prefix, Some(args.proto_id));
    }
    builder.get_or_create_ett(args.prefix);
}

macro_rules! impl_primitive_uint {
    ($($t:ty => $ftype:ident),* $(,)?) => {$(
        impl Dissect for $t {
            type Emit = $t;

            fn add_to_tree(
                args: &DissectorArgs<'_>,
                cx: &mut PacketContext<'_>,
            ) -> Result<usize, DissectError> {
                add_to_tree_single_field(args, cx, std::mem::size_of::<$t>(), DEFAULT_INT_ENCODING)
            }

            fn register(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder) {
                register_hf_index(args, builder, FieldDisplay::Dec, FieldType::$ftype);
            }

            fn emit(args: &DissectorArgs<'_>) -> Result<$t, DissectError> {
                let value = args.tvb.get_uint(
                    args.offset,
                    std::mem::size_of::<$t>(),
                    args.enc.unwrap_or(DEFAULT_INT_ENCODING),
                )?;
                Ok(value as $t)
            }
        }

        impl Primitive for $t {
            fn add_to_tree_format_value(
                args: &DissectorArgs<'_>,
                cx: &mut PacketContext<'_>,
                s: &impl Display,
            ) -> Result<usize, DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                add_to_tree_format_value(
                    args,
                    cx,
                    std::mem::size_of::<$t>(),
                    FieldValue::Uint(value as u64),
                    s,
                )
            }

            fn save(args: &DissectorArgs<'_>, store: &mut FieldsStore) -> Result<(), DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                store.insert(args.prefix, FieldValue::Uint(value as u64));
                Ok(())
            }
        }
    )*};
}

macro_rules! impl_primitive_int {
    ($($t:ty => $ftype:ident),* $(,)?) => {$(
        impl Dissect for $t {
            type Emit = $t;

            fn add_to_tree(
                args: &DissectorArgs<'_>,
                cx: &mut PacketContext<'_>,
            ) -> Result<usize, DissectError> {
                add_to_tree_single_field(args, cx, std::mem::size_of::<$t>(), DEFAULT_INT_ENCODING)
            }

            fn register(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder) {
                register_hf_index(args, builder, FieldDisplay::Dec, FieldType::$ftype);
            }

            fn emit(args: &DissectorArgs<'_>) -> Result<$t, DissectError> {
                let value = args.tvb.get_int(
                    args.offset,
                    std::mem::size_of::<$t>(),
                    args.enc.unwrap_or(DEFAULT_INT_ENCODING),
                )?;
                Ok(value as $t)
            }
        }

        impl Primitive for $t {
            fn add_to_tree_format_value(
                args: &DissectorArgs<'_>,
                cx: &mut PacketContext<'_>,
                s: &impl Display,
            ) -> Result<usize, DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                add_to_tree_format_value(
                    args,
                    cx,
                    std::mem::size_of::<$t>(),
                    FieldValue::Int(value as i64),
                    s,
                )
            }

            fn save(args: &DissectorArgs<'_>, store: &mut FieldsStore) -> Result<(), DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                store.insert(args.prefix, FieldValue::Int(value as i64));
                Ok(())
            }
        }
    )*};
}

impl_primitive_uint!(u8 => Uint8, u16 => Uint16, u32 => Uint32, u64 => Uint64);
impl_primitive_int!(i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64);

/// Length of a variable length byte field: given by a length field, or the rest of the captured
/// bytes.
fn bytes_len(args: &DissectorArgs<'_>) -> usize {
    args.list_len
        .unwrap_or_else(|| args.tvb.captured_length_remaining(args.offset))
}

impl<const N: usize> Dissect for [u8; N] {
    type Emit = Bytes;

    fn add_to_tree(
        args: &DissectorArgs<'_>,
        cx: &mut PacketContext<'_>,
    ) -> Result<usize, DissectError> {
        add_to_tree_single_field(args, cx, N, Encoding::Na)
    }

    fn register(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder) {
        register_hf_index(args, builder, FieldDisplay::SepColon, FieldType::Bytes);
    }

    fn emit(args: &DissectorArgs<'_>) -> Result<Bytes, DissectError> {
        args.tvb.get_bytes(args.offset, N)
    }
}

impl Dissect for Vec<u8> {
    type Emit = Bytes;

    fn add_to_tree(
        args: &DissectorArgs<'_>,
        cx: &mut PacketContext<'_>,
    ) -> Result<usize, DissectError> {
        add_to_tree_single_field(args, cx, bytes_len(args), Encoding::Na)
    }

    fn register(args: &RegisterArgs<'_>, builder: &mut RegistryBuilder) {
        register_hf_index(args, builder, FieldDisplay::SepColon, FieldType::Bytes);
    }

    fn emit(args: &DissectorArgs<'_>) -> Result<Bytes, DissectError> {
        args.tvb.get_bytes(args.offset, bytes_len(args))
    }
}

macro_rules! impl_primitive_bytes {
    ($(impl$(<$n:ident>)? for $t:ty;)*) => {$(
        impl$(<const $n: usize>)? Primitive for $t {
            fn add_to_tree_format_value(
                args: &DissectorArgs<'_>,
                cx: &mut PacketContext<'_>,
                s: &impl Display,
            ) -> Result<usize, DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                add_to_tree_format_value(args, cx, value.len(), FieldValue::Bytes(value), s)
            }

            fn save(args: &DissectorArgs<'_>, store: &mut FieldsStore) -> Result<(), DissectError> {
                let value = <$t as Dissect>::emit(args)?;
                store.insert(args.prefix, FieldValue::Bytes(value));
                Ok(())
            }
        }
    )*};
}

impl_primitive_bytes! {
    impl<N> for [u8; N];
    impl for Vec<u8>;
}

/// A value which can select the next dissector out of a table.
pub trait SubdissectorKey {
    /// Calls the dissector bound to this key. Returns whether there was one.
    fn try_subdissector(
        &self,
        cx: &mut PacketContext<'_>,
        table: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<bool, DissectError>;
}

/// The unit key stands for the table's payload binding.
impl SubdissectorKey for () {
    fn try_subdissector(
        &self,
        cx: &mut PacketContext<'_>,
        table: &str,
        tvb: &Tvb,
        tree: ProtoItem,
    ) -> Result<bool, DissectError> {
        cx.try_payload(table, tvb, tree)
    }
}

macro_rules! impl_subdissector_key_uint {
    ($($t:ty),*) => {$(
        impl SubdissectorKey for $t {
            fn try_subdissector(
                &self,
                cx: &mut PacketContext<'_>,
                table: &str,
                tvb: &Tvb,
                tree: ProtoItem,
            ) -> Result<bool, DissectError> {
                cx.try_uint(table, u32::from(*self), tvb, tree)
            }
        }
    )*};
}

impl_subdissector_key_uint!(u8, u16, u32);

/// Byte fields whose contents can be handed to another dissector.
pub trait Subdissect: Dissect {
    /// The buffer for the next layer.
    fn setup_tvb_next(args: &DissectorArgs<'_>) -> Result<Tvb, DissectError>;
}

fn setup_tvb_next_with_len(args: &DissectorArgs<'_>, len: Option<usize>) -> Result<Tvb, DissectError> {
    let len = len.unwrap_or_else(|| args.tvb.length_remaining(args.offset));
    args.tvb.subset(args.offset, len)
}

impl Subdissect for Vec<u8> {
    fn setup_tvb_next(args: &DissectorArgs<'_>) -> Result<Tvb, DissectError> {
        setup_tvb_next_with_len(args, args.list_len)
    }
}

impl<const N: usize> Subdissect for [u8; N] {
    fn setup_tvb_next(args: &DissectorArgs<'_>) -> Result<Tvb, DissectError> {
        setup_tvb_next_with_len(args, Some(N))
    }
}

/// A protocol root, generated by `#[derive(Protocol)]`.
pub trait Protocol: Dissect + Sized + 'static {
    /// Long name, e.g. "User Datagram Protocol".
    fn proto_desc() -> &'static str;
    /// Short name, shown in the protocol column.
    fn proto_name() -> &'static str;
    /// Filter name, also the prefix of every field.
    fn proto_filter() -> &'static str;

    /// Registers the protocol, its fields, and a dissector named after the filter name.
    fn proto_register(builder: &mut RegistryBuilder) -> ProtoId {
        let proto_id =
            builder.register_protocol(Self::proto_desc(), Self::proto_name(), Self::proto_filter());
        let args = RegisterArgs {
            proto_id,
            name: Self::proto_desc(),
            prefix: Self::proto_filter(),
            blurb: None,
            display: None,
        };
        <Self as Dissect>::register(&args, builder);
        builder.register_dissector(
            Self::proto_filter(),
            Some(proto_id),
            ProtocolDissector::<Self>::new(),
        );
        proto_id
    }

    /// Binds the protocol's dissector into the tables of lower layers.
    fn proto_reg_handoff(builder: &mut RegistryBuilder);
}

/// The dissector of a derived protocol.
pub struct ProtocolDissector<P>(PhantomData<fn() -> P>);

impl<P> ProtocolDissector<P> {
    pub fn new() -> Self {
        ProtocolDissector(PhantomData)
    }
}

impl<P> Default for ProtocolDissector<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Protocol> Dissector for ProtocolDissector<P> {
    fn dissect(
        &self,
        tvb: &Tvb,
        cx: &mut PacketContext<'_>,
        tree: ProtoItem,
    ) -> Result<usize, DissectError> {
        cx.pinfo.columns.set(Column::Protocol, P::proto_name());
        cx.pinfo.columns.clear(Column::Info);

        let args = DissectorArgs {
            tvb,
            proto_root: tree,
            prefix: P::proto_filter(),
            offset: 0,
            parent: tree,
            list_len: None,
            enc: None,
        };
        <P as Dissect>::add_to_tree(&args, cx)
    }
}
