//! Dissects a few hand-made UDP datagrams with a derived UDP dissector and a hand written one for
//! the echo protocol.
//!
//! Run with `RUST_LOG=epan=trace` to follow the dispatch.

use epan::tap::{Field, PacketNumber};
use epan::*;
use tracing_subscriber::EnvFilter;

// The ip.proto field obtained from http://www.iana.org/assignments/protocol-numbers/protocol-numbers.xml

#[derive(Protocol)]
#[epan(
    proto_desc = "Baby UDP by epan",
    proto_name = "Baby UDP",
    proto_filter = "baby_udp",
    decode_from = [("ip.proto", 17)],
)]
struct Udp {
    src_port: u16,
    #[epan(save, tap = "log_port")]
    dst_port: u16,
    length: u16,
    #[epan(display = "hex")]
    checksum: u16,
    #[epan(subdissector = ("baby_udp.port", "dst_port", "src_port"))]
    payload: Vec<u8>,
}

fn log_port(Field(port): Field<u16>, PacketNumber(n): PacketNumber) {
    tracing::info!(packet = n, port, "datagram");
}

fn register_echo(builder: &mut RegistryBuilder) {
    let proto = builder.register_protocol("Echo Protocol", "ECHO", "echo");
    let hf_data = builder.register_field(
        HeaderFieldInfo::new("Echo data", "echo.data", FieldType::Bytes)
            .with_display(FieldDisplay::SepSpace)
            .with_parent(proto),
    );
    let ett = builder.get_or_create_ett("echo");
    let echo = builder.register_dissector(
        "echo",
        Some(proto),
        move |tvb: &Tvb, cx: &mut PacketContext<'_>, tree: ProtoItem| -> Result<usize, DissectError> {
            cx.pinfo.columns.set(Column::Protocol, "ECHO");
            let len = tvb.length();
            cx.pinfo
                .columns
                .set(Column::Info, &format!("Echo ({len} bytes)"));
            let ti = cx.tree.add_protocol_item(tree, proto, tvb, 0, None)?;
            let subtree = cx.tree.add_subtree(ti, ett);
            cx.tree
                .add_item(subtree, hf_data, tvb, 0, Some(len), Encoding::Na)?;
            Ok(len)
        },
    );
    builder.add_uint("baby_udp.port", 7, &echo);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = RegistryBuilder::new();
    builder.register::<Udp>();
    register_echo(&mut builder);
    // No IP layer here, the frames carry bare UDP.
    if let Some(udp) = builder.find_dissector("baby_udp") {
        builder.add_uint(WTAP_ENCAP_TABLE, 1, &udp);
    }

    let epan = match Epan::new(builder.build(), EngineConfig::default()) {
        Ok(epan) => epan,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let frames = [
        Frame::new(1, 1, vec![0xd4, 0x31, 0x00, 0x07, 0x00, 0x0c, 0xbe, 0xef, b'p', b'i', b'n', b'g']),
        Frame::new(2, 1, vec![0x00, 0x07, 0xd4, 0x31, 0x00, 0x0c, 0xbe, 0xef, b'p', b'o']).with_reported_len(12),
        Frame::new(3, 1, vec![0x30, 0x39, 0x00, 0x35, 0x00, 0x0a, 0x12, 0x34, 0xca, 0xfe]),
        Frame::new(4, 1, vec![0x30, 0x39, 0x00]),
    ];
    for frame in &frames {
        match epan.dissect(frame) {
            Ok(dissection) => {
                println!(
                    "#{} {} {}",
                    frame.number,
                    dissection.pinfo.columns.get(Column::Protocol),
                    dissection.pinfo.columns.get(Column::Info),
                );
                print!("{}", dissection.tree);
                println!();
            }
            Err(err) => eprintln!("#{}: {err}", frame.number),
        }
    }
}
