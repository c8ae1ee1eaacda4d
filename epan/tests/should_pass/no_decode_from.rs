#![allow(dead_code)]

// Tests that a protocol need not bind itself anywhere, e.g. when it is only reached by name

use epan::*;

#[derive(Protocol)]
#[epan(proto_desc = "Foo Protocol", proto_name = "FOO", proto_filter = "foo")]
struct ProtoFoo {
    bar: u16,
}

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<ProtoFoo>();
    let registry = builder.build();

    let info = registry.find_protocol("foo").unwrap();
    assert_eq!(info.name, "Foo Protocol");
    assert_eq!(info.short_name, "FOO");
    assert!(registry.find_dissector("foo").is_some());
    assert!(registry.fields().find("foo.bar").is_some());
}
