//! Helper types to work with taps, inspired by Axum's magic functions.
//!
//! Although the module is called "tap", it is used in multiple places in the derive macros,
//! beyond the `tap` attribute: `decode_with` functions take their arguments the same way.
//!
//! See <https://github.com/alexpusch/rust-magic-function-params> for how the magic parameter
//! passing stuff works.

use bytes::Bytes;

use crate::context::PacketInfo;
use crate::fields::FieldsStore;
use crate::Tvb;

/// A context holding packet information we might care about. *Meant for internal use*.
#[derive(Clone, Copy)]
#[doc(hidden)]
pub struct Context<'a, T: Clone> {
    pub field: T,
    pub fields: &'a FieldsStore,
    pub pinfo: &'a PacketInfo,
    pub tvb: &'a Tvb,
    pub offset: usize,
}

trait FromContext<'a, T: Clone> {
    fn from_ctx(ctx: &Context<'a, T>) -> Self;
}

/// The current field, if any. The absence of a value is represented by `Field(())`.
///
/// ```rust
/// # use epan::tap::Field;
/// # use epan::ProtocolField;
/// #[derive(ProtocolField)]
/// struct MyProto {
///     #[epan(tap = "log_port")]
///     src_port: u16,
/// }
/// fn log_port(Field(port): Field<u16>) {
///     println!("Received packet from port {port}");
/// }
/// ```
pub struct Field<T: Clone>(pub T);
/// A key value store of previous fields encountered and saved. Each key is the filter name for
/// that field.
pub struct Fields<'a>(pub &'a FieldsStore);
/// The nanosecond timestamp recorded in the packet capture data, 0 if there is none.
pub struct PacketNanos(pub i64);
/// Captured bytes of the buffer being dissected.
pub struct Packet(pub Bytes);
/// Current offset into the buffer.
///
/// You probably want to use this in combination with [`Packet`] to index and slice the packet
/// data.
pub struct Offset(pub usize);
/// Number of the packet in the capture.
pub struct PacketNumber(pub u64);

impl<T: Clone> FromContext<'_, T> for Field<T> {
    fn from_ctx(ctx: &Context<T>) -> Self {
        Self(ctx.field.clone())
    }
}

impl<T: Clone> FromContext<'_, T> for PacketNanos {
    fn from_ctx(ctx: &Context<T>) -> Self {
        let nanos = ctx.pinfo.timestamp.map_or(0, |ts| ts.as_nanos());
        Self(nanos as i64)
    }
}

impl<'a, T: Clone> FromContext<'a, T> for Fields<'a> {
    fn from_ctx(ctx: &Context<'a, T>) -> Self {
        Self(ctx.fields)
    }
}

impl<T: Clone> FromContext<'_, T> for Packet {
    fn from_ctx(ctx: &Context<T>) -> Self {
        Self(ctx.tvb.to_bytes())
    }
}

impl<T: Clone> FromContext<'_, T> for Offset {
    fn from_ctx(ctx: &Context<T>) -> Self {
        Self(ctx.offset)
    }
}

impl<T: Clone> FromContext<'_, T> for PacketNumber {
    fn from_ctx(ctx: &Context<T>) -> Self {
        Self(ctx.pinfo.number)
    }
}

#[doc(hidden)]
pub trait Handler<'a, T: Clone, Args, Ret> {
    fn call(self, ctx: &Context<'a, T>) -> Ret;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<'a, F, T, $($arg,)* Ret> Handler<'a, T, ($($arg,)*), Ret> for F
        where
            F: Fn($($arg,)*) -> Ret,
            T: Clone,
            $($arg: FromContext<'a, T>,)*
        {
            fn call(self, _ctx: &Context<'a, T>) -> Ret {
                (self)($($arg::from_ctx(_ctx)),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(Arg);
impl_handler!(Arg1, Arg2);
impl_handler!(Arg1, Arg2, Arg3);
impl_handler!(Arg1, Arg2, Arg3, Arg4);
impl_handler!(Arg1, Arg2, Arg3, Arg4, Arg5);
impl_handler!(Arg1, Arg2, Arg3, Arg4, Arg5, Arg6);

#[doc(hidden)]
pub fn handle_tap<'a, T, Args, H>(ctx: &Context<'a, T>, handler: H)
where
    T: Clone,
    H: Handler<'a, T, Args, ()>,
{
    handler.call(ctx)
}

#[doc(hidden)]
pub fn handle_decode_with<'a, T, Args, Ret, H>(ctx: &Context<'a, T>, handler: H) -> Ret
where
    T: Clone,
    H: Handler<'a, T, Args, Ret>,
    Ret: std::fmt::Display,
{
    handler.call(ctx)
}
