// Struct fields become subtrees, with their own fields one level down.

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = ("wtap_encap", 201))]
struct Tunnel {
    header: Header,
    length: u32,
}

#[derive(ProtocolField)]
struct Header {
    version: u8,
    flags: u16,
}

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<Tunnel>();
    let registry = builder.build();
    assert!(registry.fields().find("tunnel.header.version").is_some());
    assert!(registry.fields().find("tunnel.length").is_some());

    let epan = Epan::new(registry, EngineConfig::default()).unwrap();
    let frame = Frame::new(1, 201, vec![2, 0x80, 0x01, 0, 0, 0, 64]);
    let dissection = epan.dissect(&frame).unwrap();

    let rendered = dissection.render();
    for line in [
        "TUNNEL",
        "    Header",
        "        Version: 2",
        "        Flags: 32769",
        "    Length: 64",
    ] {
        assert!(rendered.lines().any(|l| l == line), "{line:?} not in\n{rendered}");
    }
    let header = dissection.tree.find_by_abbrev("tunnel.header").next().unwrap();
    assert_eq!(dissection.tree.node(header).unwrap().length(), Some(3));
}
