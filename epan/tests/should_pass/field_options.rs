#![allow(dead_code)]

// Tests the field options which change how a field is registered and shown

use epan::*;

#[derive(Protocol)]
#[epan(decode_from = ("ethertype", 0x88b5))]
struct ProtoFoo {
    /// Number of the message.
    #[epan(rename = "Sequence", display = "hex_dec")]
    seq: u32,
    #[epan(enc = "little", save)]
    len: u16,
    #[epan(hide)]
    reserved: [u8; 2],
    #[epan(len_field = "len", display = "sep_space")]
    data: Vec<u8>,
    #[epan(subdissector = "proto_foo.payload")]
    payload: Vec<u8>,
}

fn main() {}
