// A flat protocol bound straight to a link type, dissected end to end.

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = ("wtap_encap", 200))]
struct Heartbeat {
    session: [u8; 4],
    sequence: u64,
}

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<Heartbeat>();
    let epan = Epan::new(builder.build(), EngineConfig::default()).unwrap();

    let mut data = b"ABCD".to_vec();
    data.extend_from_slice(&7u64.to_be_bytes());
    let dissection = epan.dissect(&Frame::new(1, 200, data)).unwrap();

    assert!(!dissection.malformed);
    assert_eq!(dissection.consumed, 12);
    let rendered = dissection.render();
    assert!(rendered.lines().any(|l| l == "HEARTBEAT"), "{rendered}");
    assert!(rendered.lines().any(|l| l == "    Sequence: 7"), "{rendered}");
    assert_eq!(dissection.tree.find_by_abbrev("heartbeat.session").count(), 1);
}
