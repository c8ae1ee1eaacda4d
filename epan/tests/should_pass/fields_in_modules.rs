// Field types may live in other modules; their filter names follow the field names, not the
// module path.

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = ("wtap_encap", 202))]
struct Outer {
    middle: middle::Middle,
}

mod middle {
    use epan::*;

    #[derive(ProtocolField)]
    pub struct Middle {
        inner: inner::Inner,
    }

    mod inner {
        use epan::*;

        #[derive(ProtocolField)]
        pub struct Inner {
            x: u8,
        }
    }
}

fn main() {
    let mut builder = RegistryBuilder::new();
    builder.register::<Outer>();
    let epan = Epan::new(builder.build(), EngineConfig::default()).unwrap();

    let dissection = epan.dissect(&Frame::new(1, 202, vec![9])).unwrap();
    let hf = dissection.tree.fields().find("outer.middle.inner.x").unwrap();
    assert_eq!(dissection.tree.first_value(hf), Some(&FieldValue::Uint(9)));
}
