#![allow(dead_code)]

// Tests that ProtocolFields which are a unit tuple are allowed to have field options, and that
// the options of the outer field win

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = "moldudp.payload")]
struct ProtoFoo {
    seconds: TimeStamp,
    #[epan(display = "dec")]
    nanos: TimeStamp,
}

// This declares a re-usable TimeStamp type. Note that we cannot do something like `type TimeStamp
// = u32` as we can't implement external traits on primitive types.
#[derive(ProtocolField)]
struct TimeStamp(#[epan(enc = "little", display = "hex")] u32);

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<ProtoFoo>();
    let registry = builder.build();
    let fields = registry.fields();

    let seconds = fields.get(fields.find("proto_foo.seconds").unwrap()).unwrap();
    assert_eq!(seconds.display, FieldDisplay::Hex);
    let nanos = fields.get(fields.find("proto_foo.nanos").unwrap()).unwrap();
    assert_eq!(nanos.display, FieldDisplay::Dec);
}
