//! Protocols built with the derive macros, dissected through the full engine.

#![allow(dead_code)]

use std::cell::RefCell;

use epan::tap::{Field, Fields};
use epan::*;
use test_log::test;

#[derive(Protocol)]
#[epan(decode_from = [("ip.proto", 17)])]
struct Udp {
    src_port: u16,
    dst_port: u16,
    length: u16,
    checksum: u16,
    #[epan(subdissector = ("udp.port", "dst_port", "src_port"))]
    payload: Vec<u8>,
}

#[derive(Protocol)]
#[epan(
    proto_desc = "Sample Protocol",
    proto_name = "SAMPLE",
    proto_filter = "sample",
    decode_from = ("udp.port", 7000)
)]
struct Sample {
    /// Kind of message.
    #[epan(save, decode_with = "kind_name")]
    kind: u8,
    #[epan(enc = "little", tap = "record_len")]
    len: u16,
    #[epan(hide)]
    reserved: u8,
    seq: SequenceNumber,
    #[epan(len_field = "len")]
    body: Vec<u8>,
    #[epan(subdissector = "sample.trailer")]
    trailer: Vec<u8>,
}

#[derive(ProtocolField)]
struct SequenceNumber(#[epan(display = "hex")] u32);

fn kind_name(Field(kind): Field<u8>) -> &'static str {
    match kind {
        1 => "ping",
        2 => "pong",
        _ => "unknown",
    }
}

thread_local! {
    static LENGTHS: RefCell<Vec<(u16, Option<u8>)>> = const { RefCell::new(Vec::new()) };
}

fn record_len(Field(len): Field<u16>, Fields(fields): Fields) {
    LENGTHS.with(|lens| lens.borrow_mut().push((len, fields.get_u8("sample.kind"))));
}

fn engine() -> Epan {
    engine_with(EngineConfig::default())
}

fn engine_with(config: EngineConfig) -> Epan {
    let mut builder = RegistryBuilder::new();
    builder.register::<Udp>();
    builder.register::<Sample>();
    let udp = builder.find_dissector("udp").unwrap();
    builder.add_uint(WTAP_ENCAP_TABLE, 1, &udp);
    Epan::new(builder.build(), config).unwrap()
}

fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Frame {
    let mut data = Vec::new();
    data.extend_from_slice(&src_port.to_be_bytes());
    data.extend_from_slice(&dst_port.to_be_bytes());
    data.extend_from_slice(&(8 + payload.len() as u16).to_be_bytes());
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(payload);
    Frame::new(1, 1, data)
}

const SAMPLE: &[u8] = &[1, 3, 0, 0xff, 0, 0, 0, 0x2a, b'a', b'b', b'c', b'z', b'z'];

fn protocols(dissection: &Dissection) -> String {
    let hf = dissection.tree.fields().find("frame.protocols").unwrap();
    dissection.tree.first_value(hf).unwrap().to_string()
}

#[test]
fn registration_follows_the_struct() {
    let epan = engine();
    let registry = epan.registry();
    let fields = registry.fields();

    let kind = fields.get(fields.find("sample.kind").unwrap()).unwrap();
    assert_eq!(kind.name, "Kind");
    assert_eq!(kind.ftype, FieldType::Uint8);
    assert_eq!(kind.blurb.as_deref(), Some("Kind of message."));

    let seq = fields.get(fields.find("sample.seq").unwrap()).unwrap();
    assert_eq!(seq.ftype, FieldType::Uint32);
    assert_eq!(seq.display, FieldDisplay::Hex);

    let body = fields.get(fields.find("sample.body").unwrap()).unwrap();
    assert_eq!(body.ftype, FieldType::Bytes);

    // Payloads handed to other dissectors are not fields of their own.
    assert!(fields.find("udp.payload").is_none());
    assert!(registry.table("udp.port").is_some());
    assert!(registry.table("sample.trailer").is_some());
    assert_eq!(
        registry.table("ip.proto").unwrap().get_uint(17).unwrap().name(),
        "udp"
    );
    assert_eq!(registry.find_protocol("sample").unwrap().short_name, "SAMPLE");
}

#[test]
fn layers_are_found_through_the_port_table() {
    LENGTHS.with(|lens| lens.borrow_mut().clear());
    let dissection = engine().dissect(&udp_frame(12345, 7000, SAMPLE)).unwrap();

    assert!(!dissection.malformed);
    assert_eq!(protocols(&dissection), "udp:sample:data");
    assert_eq!(dissection.pinfo.columns.get(Column::Protocol), "SAMPLE");

    let rendered = dissection.tree.render(false);
    for line in [
        "UDP",
        "    Src Port: 12345",
        "    Dst Port: 7000",
        "Sample Protocol",
        "    Kind: ping",
        "    Len: 3",
        "    Seq: 0x0000002a",
        "    Body: 61:62:63",
        "Data (2 bytes)",
    ] {
        assert!(rendered.lines().any(|l| l == line), "{line:?} not in\n{rendered}");
    }
    assert!(!rendered.contains("Reserved"));
    assert!(dissection.tree.render(true).contains("Reserved: 255"));
    assert_eq!(dissection.tree.find_by_abbrev("sample.reserved").count(), 1);

    let sample = dissection.tree.find_by_abbrev("sample").next().unwrap();
    assert_eq!(dissection.tree.node(sample).unwrap().length(), Some(SAMPLE.len()));

    assert_eq!(dissection.pinfo.fields.get_u8("sample.kind"), Some(1));
    assert_eq!(LENGTHS.with(|lens| lens.borrow().clone()), vec![(3, Some(1))]);
}

#[test]
fn hidden_fields_are_rendered_on_request() {
    let frame = udp_frame(12345, 7000, SAMPLE);
    let dissection = engine().dissect(&frame).unwrap();
    assert!(!dissection.render().contains("Reserved"));

    let config = EngineConfig {
        show_hidden: true,
        ..Default::default()
    };
    let dissection = engine_with(config).dissect(&frame).unwrap();
    assert!(dissection.render().contains("Reserved: 255"));
    assert_eq!(dissection.render(), dissection.tree.render(true));
}

#[test]
fn source_port_is_tried_after_destination_port() {
    let dissection = engine().dissect(&udp_frame(7000, 9999, SAMPLE)).unwrap();
    assert_eq!(protocols(&dissection), "udp:sample:data");
}

#[test]
fn unknown_ports_fall_back_to_data() {
    let dissection = engine().dissect(&udp_frame(1, 2, b"hello")).unwrap();
    assert_eq!(protocols(&dissection), "udp:data");
    assert!(dissection.tree.render(false).contains("Data (5 bytes)"));
}

#[test]
fn short_header_is_malformed() {
    let frame = Frame::new(1, 1, vec![0x30, 0x39, 0x1b, 0x58, 0x00]);
    let dissection = engine().dissect(&frame).unwrap();

    assert!(dissection.malformed);
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("Src Port: 12345"), "{rendered}");
    assert!(rendered.contains("[Malformed Packet: UDP]"), "{rendered}");
    assert_eq!(protocols(&dissection), "udp");
}

#[test]
fn length_field_past_the_end_is_malformed() {
    // Claims 9 bytes of body, only 3 are there.
    let payload = [1, 9, 0, 0, 0, 0, 0, 1, b'a', b'b', b'c'];
    let dissection = engine().dissect(&udp_frame(1, 7000, &payload)).unwrap();

    assert!(dissection.malformed);
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("[Malformed Packet: SAMPLE]"), "{rendered}");
    assert!(rendered.contains("Seq: 0x00000001"), "{rendered}");
    assert!(!rendered.contains("Body"), "{rendered}");
}
