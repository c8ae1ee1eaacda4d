//! A heuristic dissector: the "trivial" protocol has no port of its own, it recognizes itself by
//! a magic number at the start of a UDP payload.

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = [("ip.proto", 17)])]
struct Udp {
    src_port: u16,
    dst_port: u16,
    length: u16,
    checksum: u16,
    #[epan(subdissector = "udp.payload")]
    payload: Vec<u8>,
}

const MAGIC: u16 = 0xbeef;

fn register_trivial(builder: &mut RegistryBuilder) {
    let proto = builder.register_protocol("Trivial Protocol", "TRIV", "triv");
    let hf_magic = builder.register_field(
        HeaderFieldInfo::new("Magic", "triv.magic", FieldType::Uint16)
            .with_display(FieldDisplay::Hex)
            .with_parent(proto),
    );
    let hf_counter = builder.register_field(
        HeaderFieldInfo::new("Counter", "triv.counter", FieldType::Uint32)
            .with_display(FieldDisplay::Dec)
            .with_parent(proto),
    );
    let ett = builder.get_or_create_ett("triv");

    let trivial = builder.create_dissector_handle(
        proto,
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            if !tvb.bytes_exist(0, 2) || tvb.get_u16(0, Encoding::BigEndian)? != MAGIC {
                return Ok(0);
            }
            cx.pinfo.columns.set(Column::Protocol, "TRIV");
            let ti = cx.tree.add_protocol_item(tree, proto, tvb, 0, Some(6))?;
            let subtree = cx.tree.add_subtree(ti, ett);
            cx.tree
                .add_item(subtree, hf_magic, tvb, 0, None, Encoding::BigEndian)?;
            let (_, counter) = cx.tree.add_item_ret_value(
                subtree,
                hf_counter,
                tvb,
                2,
                None,
                Encoding::BigEndian,
            )?;
            if counter.as_u64() == Some(0) {
                cx.add_expert(
                    subtree,
                    tvb,
                    2,
                    4,
                    ExpertInfo::new(Severity::Note, ExpertGroup::Sequence, "Counter restarted"),
                )?;
            }
            Ok(6)
        },
    );

    // The UDP payload binding hands everything to the heuristic list.
    let udp_heuristics = builder.register_dissector(
        "udp.heuristics",
        None,
        |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            match cx.try_heuristic("udp", tvb, tree)? {
                0 => cx.call_data(tvb, tree),
                consumed => Ok(consumed),
            }
        },
    );
    builder.register_heuristic_list("udp");
    builder.add_heuristic("udp", "triv_udp", &trivial, 0);
    builder.set_payload("udp.payload", &udp_heuristics);
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut builder = RegistryBuilder::new();
    builder.register::<Udp>();
    register_trivial(&mut builder);
    if let Some(udp) = builder.find_dissector("udp") {
        builder.add_uint(WTAP_ENCAP_TABLE, 1, &udp);
    }
    let Ok(epan) = Epan::new(builder.build(), EngineConfig::default()) else {
        return;
    };

    let udp_header = [0x30, 0x39, 0x30, 0x3a, 0x00, 0x0e, 0x00, 0x00];
    for payload in [
        vec![0xbe, 0xef, 0x00, 0x00, 0x00, 0x00],
        vec![0xbe, 0xef, 0x00, 0x00, 0x00, 0x01],
        vec![0xca, 0xfe, 0x00, 0x00, 0x00, 0x01],
    ] {
        let frame = Frame::new(1, 1, [udp_header.as_slice(), &payload].concat());
        if let Ok(dissection) = epan.dissect(&frame) {
            print!("{}", dissection.tree);
            for expert in &dissection.pinfo.expert {
                println!("expert: {expert}");
            }
            println!();
        }
    }
}
