//! End to end scenarios: a small link layer dispatching to test protocols through a table, a
//! heuristic list and the data fallback.

use epan::*;
use test_log::test;

const LINK_TYPE: u32 = 147;

fn link_layer(builder: &mut RegistryBuilder) {
    let proto = builder.register_protocol("Test Link Layer", "LINK", "link");
    let hf_type = builder.register_field(
        HeaderFieldInfo::new("Type", "link.type", FieldType::Uint16)
            .with_display(FieldDisplay::Hex)
            .with_parent(proto),
    );
    let hf_next_len = builder.register_field(
        HeaderFieldInfo::new("Next layer length", "link.next_len", FieldType::Uint32)
            .with_display(FieldDisplay::Dec)
            .with_parent(proto),
    );
    let ett = builder.get_or_create_ett("link");
    builder.register_table("link.type");
    builder.register_heuristic_list("link");

    let link = builder.register_dissector(
        "link",
        Some(proto),
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            cx.pinfo.columns.set(Column::Protocol, "LINK");
            let ti = cx.tree.add_protocol_item(tree, proto, tvb, 0, Some(2))?;
            let subtree = cx.tree.add_subtree(ti, ett);
            let kind = tvb.get_u16(0, Encoding::BigEndian)?;
            cx.tree
                .add_item(subtree, hf_type, tvb, 0, Some(2), Encoding::BigEndian)?;

            let next = tvb.subset_remaining(2)?;
            let consumed = match cx.call_uint("link.type", u32::from(kind), &next, tree)? {
                Some(consumed) => consumed,
                None => match cx.try_heuristic("link", &next, tree)? {
                    0 => cx.call_data(&next, tree)?,
                    consumed => consumed,
                },
            };
            cx.tree.add_item_with_value(
                subtree,
                hf_next_len,
                tvb,
                0,
                0,
                FieldValue::Uint(consumed as u64),
                None,
            )?;
            Ok(tvb.reported_length())
        },
    );
    builder.add_uint(WTAP_ENCAP_TABLE, LINK_TYPE, &link);
}

/// A protocol bound to link type 1 reading two 32 bit values, the second one at offset 4.
fn two_words(builder: &mut RegistryBuilder) {
    let proto = builder.register_protocol("Two Words", "WORDS", "words");
    let hf_first = builder.register_field(
        HeaderFieldInfo::new("First", "words.first", FieldType::Uint32)
            .with_display(FieldDisplay::Hex)
            .with_parent(proto),
    );
    let hf_second = builder.register_field(
        HeaderFieldInfo::new("Second", "words.second", FieldType::Uint32)
            .with_display(FieldDisplay::Hex)
            .with_parent(proto),
    );
    let words = builder.register_dissector(
        "words",
        Some(proto),
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            let ti = cx.tree.add_protocol_item(tree, proto, tvb, 0, None)?;
            cx.tree.add_item(ti, hf_first, tvb, 0, None, Encoding::BigEndian)?;
            cx.tree.add_item(ti, hf_second, tvb, 4, None, Encoding::BigEndian)?;
            Ok(8)
        },
    );
    builder.add_uint("link.type", 1, &words);
}

fn engine(config: EngineConfig, setup: impl FnOnce(&mut RegistryBuilder)) -> Epan {
    let mut builder = RegistryBuilder::new();
    link_layer(&mut builder);
    setup(&mut builder);
    Epan::new(builder.build(), config).unwrap()
}

fn protocols(dissection: &Dissection) -> String {
    let hf = dissection.tree.fields().find("frame.protocols").unwrap();
    match dissection.tree.first_value(hf) {
        Some(FieldValue::String(s)) => s.clone(),
        other => panic!("unexpected frame.protocols value {other:?}"),
    }
}

fn next_len(dissection: &Dissection) -> Option<u64> {
    let hf = dissection.tree.fields().find("link.next_len").unwrap();
    dissection.tree.first_value(hf).and_then(FieldValue::as_u64)
}

#[test]
fn well_formed_packet() {
    let epan = engine(EngineConfig::default(), two_words);
    let frame = Frame::new(1, LINK_TYPE, vec![0, 1, 0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 7]);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(!dissection.malformed);
    assert_eq!(protocols(&dissection), "link:words");
    assert_eq!(next_len(&dissection), Some(8));
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("First: 0xdeadbeef"), "{rendered}");
    assert!(rendered.contains("Second: 0x00000007"), "{rendered}");
    assert_eq!(dissection.pinfo.columns.get(Column::Protocol), "LINK");
}

#[test]
fn short_capture_is_reported_as_truncated() {
    let epan = engine(EngineConfig::default(), two_words);
    // Eight bytes of the protocol were on the wire, only four were captured.
    let frame =
        Frame::new(1, LINK_TYPE, vec![0, 1, 0xde, 0xad, 0xbe, 0xef]).with_reported_len(10);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.malformed);
    assert!(dissection.pinfo.truncated);
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("First: 0xdeadbeef"), "{rendered}");
    assert!(!rendered.contains("Second"), "{rendered}");
    assert!(
        rendered.contains("[Packet size limited during capture: WORDS truncated]"),
        "{rendered}"
    );
    // The link layer carried on after the failed layer, which counts as fully consumed.
    assert_eq!(next_len(&dissection), Some(8));
    assert_eq!(dissection.pinfo.max_severity(), Some(Severity::Warn));
}

#[test]
fn short_packet_is_reported_as_malformed() {
    let epan = engine(EngineConfig::default(), two_words);
    let frame = Frame::new(1, LINK_TYPE, vec![0, 1, 0xde, 0xad, 0xbe, 0xef]);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.malformed);
    assert!(!dissection.pinfo.truncated);
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("[Malformed Packet: WORDS]"), "{rendered}");
    assert_eq!(next_len(&dissection), Some(4));
    assert!(dissection
        .pinfo
        .columns
        .get(Column::Info)
        .contains("[Malformed Packet]"));
    assert_eq!(dissection.pinfo.max_severity(), Some(Severity::Error));
}

fn heuristics(builder: &mut RegistryBuilder) {
    let greedy = builder.register_protocol("Greedy", "GREEDY", "greedy");
    let hf_greedy = builder.register_field(
        HeaderFieldInfo::new("Byte", "greedy.byte", FieldType::Uint8)
            .with_display(FieldDisplay::Dec)
            .with_parent(greedy),
    );
    // Adds to the tree, the columns and the data sources, then changes its mind.
    let greedy = builder.create_dissector_handle(
        greedy,
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            cx.pinfo.columns.set(Column::Info, "greedy");
            cx.add_data_source("Greedy payload", tvb.clone());
            cx.tree.add_item(tree, hf_greedy, tvb, 0, None, Encoding::Na)?;
            Ok(0)
        },
    );
    // Recognizes "BK", then wants a 32 bit value after it.
    let broken = builder.register_protocol("Broken", "BROKEN", "broken");
    let broken = builder.create_dissector_handle(
        broken,
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            if !tvb.memeql(0, b"BK") {
                return Ok(0);
            }
            cx.add_data_source("Broken payload", tvb.clone());
            cx.tree.add_protocol_item(tree, broken, tvb, 0, None)?;
            tvb.get_u32(2, Encoding::BigEndian)?;
            Ok(6)
        },
    );
    let real = builder.register_protocol("Real", "REAL", "real");
    let real = builder.create_dissector_handle(
        real,
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            if !tvb.memeql(0, b"RL") {
                return Ok(0);
            }
            cx.pinfo.columns.set(Column::Info, "real");
            cx.tree.add_protocol_item(tree, real, tvb, 0, None)?;
            Ok(tvb.reported_length())
        },
    );
    builder.add_heuristic("link", "real_link", &real, 0);
    builder.add_heuristic("link", "greedy_link", &greedy, 10);
    builder.add_heuristic("link", "broken_link", &broken, 10);
}

#[test]
fn rejected_heuristics_leave_no_trace() {
    let epan = engine(EngineConfig::default(), heuristics);
    let entries: Vec<&str> = epan
        .registry()
        .heuristic_list("link")
        .unwrap()
        .entries()
        .iter()
        .map(|e| e.short_name())
        .collect();
    assert_eq!(entries, ["greedy_link", "broken_link", "real_link"]);

    let frame = Frame::new(1, LINK_TYPE, b"\x99\x99RL!".to_vec());
    let dissection = epan.dissect(&frame).unwrap();

    assert!(!dissection.malformed);
    assert_eq!(protocols(&dissection), "link:real");
    assert_eq!(dissection.pinfo.columns.get(Column::Info), "real");
    assert_eq!(dissection.tree.find_by_abbrev("greedy.byte").count(), 0);
    assert_eq!(dissection.tree.find_by_abbrev("broken").count(), 0);
    assert_eq!(dissection.tree.find_by_abbrev("real").count(), 1);
    assert_eq!(next_len(&dissection), Some(3));
    assert_eq!(dissection.sources.len(), 1);
}

#[test]
fn heuristic_failing_after_accepting_is_malformed() {
    let epan = engine(EngineConfig::default(), heuristics);
    let frame = Frame::new(1, LINK_TYPE, b"\x99\x99BK!".to_vec());
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.malformed);
    assert_eq!(protocols(&dissection), "link:broken");
    assert_eq!(dissection.tree.find_by_abbrev("broken").count(), 1);
    assert_eq!(dissection.tree.find_by_abbrev("greedy.byte").count(), 0);
    let rendered = dissection.tree.render(false);
    assert!(rendered.contains("[Malformed Packet: BROKEN]"), "{rendered}");
    assert!(!rendered.contains("Data ("), "{rendered}");
    assert_eq!(
        dissection.pinfo.columns.get(Column::Info),
        "[Malformed Packet]"
    );
    assert_eq!(dissection.sources.len(), 2);
    assert_eq!(next_len(&dissection), Some(3));
}

#[test]
fn nothing_accepting_falls_back_to_data() {
    let epan = engine(EngineConfig::default(), heuristics);
    let frame = Frame::new(1, LINK_TYPE, b"\x99\x99XYZ".to_vec());
    let dissection = epan.dissect(&frame).unwrap();

    assert_eq!(protocols(&dissection), "link:data");
    assert!(dissection.tree.render(false).contains("Data (3 bytes)"));
    assert_eq!(dissection.pinfo.columns.get(Column::Info), "");
}

#[test]
fn disabled_heuristics_are_skipped() {
    let epan = engine(EngineConfig::default(), |builder| {
        heuristics(builder);
        assert!(builder.set_heuristic_enabled("link", "real_link", false));
        assert!(!builder.set_heuristic_enabled("link", "no_such_heuristic", false));
    });
    let frame = Frame::new(1, LINK_TYPE, b"\x99\x99RL!".to_vec());
    let dissection = epan.dissect(&frame).unwrap();
    assert_eq!(protocols(&dissection), "link:data");
}

fn endless(builder: &mut RegistryBuilder) {
    let proto = builder.register_protocol("Endless", "ENDLESS", "endless");
    let endless = builder.register_dissector(
        "endless",
        Some(proto),
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            cx.tree.add_protocol_item(tree, proto, tvb, 0, Some(0))?;
            cx.call_uint("link.type", 2, tvb, tree)?;
            Ok(0)
        },
    );
    builder.add_uint("link.type", 2, &endless);
}

#[test]
fn recursion_is_capped() {
    let config = EngineConfig {
        max_depth: 8,
        ..Default::default()
    };
    let epan = engine(config, endless);
    let frame = Frame::new(1, LINK_TYPE, vec![0, 2, 1, 2, 3]);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.malformed);
    assert_eq!(dissection.consumed, 0);
    // frame and link, then as many rounds as the ceiling allows.
    assert_eq!(dissection.tree.find_by_abbrev("endless").count(), 6);
    let summary = &dissection.pinfo.expert.last().unwrap().summary;
    assert_eq!(
        summary,
        "[Dissection aborted: maximum dissection depth of 8 exceeded]"
    );
    // The link layer never got to finish.
    assert_eq!(next_len(&dissection), None);
}

#[test]
fn tree_size_is_capped() {
    let config = EngineConfig {
        max_tree_items: 4,
        ..Default::default()
    };
    let epan = engine(config, two_words);
    let frame = Frame::new(1, LINK_TYPE, vec![0, 1, 0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 7]);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.malformed);
    assert_eq!(dissection.tree.len(), 4);
    let summary = &dissection.pinfo.expert.last().unwrap().summary;
    assert!(summary.contains("more than 4 items"), "{summary}");
}

#[test]
fn unknown_link_type() {
    let epan = engine(EngineConfig::default(), two_words);
    let frame = Frame::new(1, 999, vec![1, 2, 3]);
    let dissection = epan.dissect(&frame).unwrap();
    assert_eq!(protocols(&dissection), "data");

    let config = EngineConfig {
        data_fallback: false,
        ..Default::default()
    };
    let epan = engine(config, two_words);
    assert_eq!(
        epan.dissect(&frame).unwrap_err(),
        DissectError::UnrecognizedTopLevel { link_type: 999 }
    );
}

#[test]
fn without_a_tree_errors_still_surface() {
    let config = EngineConfig {
        build_tree: false,
        ..Default::default()
    };
    let epan = engine(config, two_words);
    let frame = Frame::new(1, LINK_TYPE, vec![0, 1, 0xde, 0xad, 0xbe, 0xef]);
    let dissection = epan.dissect(&frame).unwrap();

    assert!(dissection.tree.is_empty());
    assert!(dissection.malformed);
    assert_eq!(dissection.pinfo.columns.get(Column::Protocol), "LINK");
    assert!(dissection
        .pinfo
        .columns
        .get(Column::Info)
        .contains("[Malformed Packet]"));
}

#[test]
fn frames_can_be_dissected_concurrently() {
    let epan = engine(EngineConfig::default(), |builder| {
        two_words(builder);
        heuristics(builder);
    });
    let frames: Vec<Frame> = (0..64u64)
        .map(|n| match n % 3 {
            0 => Frame::new(n, LINK_TYPE, vec![0, 1, 0, 0, 0, n as u8, 0, 0, 0, 1]),
            1 => Frame::new(n, LINK_TYPE, b"\x99\x99RL".to_vec()),
            _ => Frame::new(n, LINK_TYPE, vec![0, 1, 0xff]).with_reported_len(10),
        })
        .collect();
    let sequential: Vec<String> = frames
        .iter()
        .map(|f| epan.dissect(f).unwrap().tree.render(true))
        .collect();

    let concurrent: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = frames
            .chunks(16)
            .map(|chunk| {
                let epan = &epan;
                s.spawn(move || {
                    chunk
                        .iter()
                        .map(|f| epan.dissect(f).unwrap().tree.render(true))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });
    assert_eq!(sequential, concurrent);
}

#[test]
fn rebinding_a_key_is_recorded() {
    let mut builder = RegistryBuilder::new();
    link_layer(&mut builder);
    two_words(&mut builder);
    let other = builder.register_dissector(
        "other",
        None,
        |_tvb: &Tvb, _cx: &mut PacketContext<'_>, _tree: ProtoItem| -> Result<usize, DissectError> {
            Ok(0)
        },
    );
    builder.add_uint("link.type", 1, &other);
    let registry = builder.build();

    assert_eq!(
        registry.table("link.type").unwrap().get_uint(1).unwrap().name(),
        "other"
    );
    let [duplicate] = registry.duplicates() else {
        panic!("expected exactly one duplicate binding");
    };
    assert_eq!(duplicate.table, "link.type");
    assert_eq!(duplicate.replaced, "words");
    assert_eq!(duplicate.by, "other");
}

#[test]
fn config_is_validated() {
    assert!(matches!(
        EngineConfig::from_json_str(r#"{ "max_depth": 0 }"#),
        Err(ConfigError::TooSmall {
            field: "max_depth",
            ..
        })
    ));
    assert!(matches!(
        EngineConfig::from_json_str(r#"{ "max_dpeth": 4 }"#),
        Err(ConfigError::Parse(_))
    ));
    let config = EngineConfig {
        max_tree_items: 0,
        ..Default::default()
    };
    assert!(Epan::new(RegistryBuilder::new().build(), config).is_err());
}
