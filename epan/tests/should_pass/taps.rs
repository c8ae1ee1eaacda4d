#![allow(dead_code)]

use bytes::Bytes;
use epan::tap::*;
use epan::*;

#[derive(ProtocolField)]
struct Foo {
    #[epan(tap = ["f", "g", "h", "i", "j", "k"])]
    x: u8,
    // Just check that taps work for non-primitive types too.
    #[epan(len_field = "x", tap = ["f", "g3"])]
    xs: Vec<u8>,
    #[epan(tap = ["f", "g2"])]
    bar: Bar,
    #[epan(tap = "f", decode_with = "l")]
    y: u32,
}

#[derive(ProtocolField)]
struct Bar(u16);

fn f() {}
fn g(_x: Field<u8>) {}
fn h(_x: Field<u8>, _fields: Fields) {}
fn i(_x: Field<u8>, _fields: Fields, _nanos: PacketNanos) {}
fn j(_x: Field<u8>, _fields: Fields, _nanos: PacketNanos, _pkt: Packet) {}
fn k(_x: Field<u8>, _fields: Fields, _nanos: PacketNanos, _pkt: Packet, _offset: Offset) {}
fn l(Field(y): Field<u32>, PacketNumber(n): PacketNumber) -> String {
    format!("{y} in packet {n}")
}

fn g2(_x: Field<u16>) {}
fn g3(_x: Field<Bytes>) {}

fn main() {}
