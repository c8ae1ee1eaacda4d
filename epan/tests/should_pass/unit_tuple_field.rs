// A single-field tuple struct is transparent: it registers and displays as its inner type.

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = ("wtap_encap", 203))]
struct Service {
    port: Port,
}

#[derive(ProtocolField)]
struct Port(u16);

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<Service>();
    let registry = builder.build();
    let fields = registry.fields();
    let port = fields.get(fields.find("service.port").unwrap()).unwrap();
    assert_eq!(port.ftype, FieldType::Uint16);

    let epan = Epan::new(registry, EngineConfig::default()).unwrap();
    let dissection = epan.dissect(&Frame::new(1, 203, vec![0x01, 0xbb])).unwrap();
    assert!(dissection.render().contains("    Port: 443"));
}
