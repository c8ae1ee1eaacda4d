#![allow(dead_code)]

// Tests that the decode_from = [("some.thing", 420)] is accepted, and that the bindings are made

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = [("udp.port", 1234, 5678), "udp.payload"])]
struct ProtoFoo {
    bar: u64,
    baz: [u8; 9],
}

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<ProtoFoo>();
    let registry = builder.build();

    let port = registry.table("udp.port").unwrap();
    assert_eq!(port.get_uint(1234).unwrap().name(), "proto_foo");
    assert_eq!(port.get_uint(5678).unwrap().name(), "proto_foo");
    let payload = registry.table("udp.payload").unwrap();
    assert_eq!(payload.payload().unwrap().name(), "proto_foo");
}
