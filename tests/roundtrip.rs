//! Codec round-trip tests over randomized values.

use std::io::Cursor;

use rand::prelude::*;

use bolt::packstream::{deserialize, serialize};
use bolt::{Map, Node, Relationship, Value};

fn arbitrary_int(rng: &mut ThreadRng) -> i64 {
    // spread across the encoding widths rather than uniformly over i64
    match rng.gen_range(0..5) {
        0 => rng.gen_range(-16..=127),
        1 => rng.gen_range(i64::from(i8::MIN)..=i64::from(i8::MAX)),
        2 => rng.gen_range(i64::from(i16::MIN)..=i64::from(i16::MAX)),
        3 => rng.gen_range(i64::from(i32::MIN)..=i64::from(i32::MAX)),
        _ => rng.gen(),
    }
}

fn arbitrary_string(rng: &mut ThreadRng) -> String {
    let len = match rng.gen_range(0..3) {
        0 => rng.gen_range(0..16),
        1 => rng.gen_range(16..256),
        _ => rng.gen_range(256..1024),
    };
    (0..len)
        .map(|_| char::from(rng.gen_range(b' '..=b'~')))
        .collect()
}

fn arbitrary_node(rng: &mut ThreadRng) -> Node {
    Node {
        id: arbitrary_int(rng),
        labels: (0..rng.gen_range(0..3))
            .map(|_| arbitrary_string(rng))
            .collect(),
        properties: arbitrary_map(rng, 0),
    }
}

fn arbitrary_map(rng: &mut ThreadRng, depth: usize) -> Map {
    (0..rng.gen_range(0..4))
        .map(|i| (format!("k{}", i), arbitrary_value(rng, depth)))
        .collect()
}

fn arbitrary_value(rng: &mut ThreadRng, depth: usize) -> Value {
    let choices = if depth == 0 { 5 } else { 9 };
    match rng.gen_range(0..choices) {
        0 => Value::Null,
        1 => Value::Bool(rng.gen()),
        2 => Value::Int(arbitrary_int(rng)),
        3 => Value::Float(f64::from(rng.gen::<i32>()) / 64.0),
        4 => Value::from(arbitrary_string(rng)),
        5 => Value::from(arbitrary_node(rng)),
        6 => Value::List(
            (0..rng.gen_range(0..5))
                .map(|_| arbitrary_value(rng, depth - 1))
                .collect(),
        ),
        7 => Value::Map(arbitrary_map(rng, depth - 1)),
        _ => Value::from(Relationship {
            id: arbitrary_int(rng),
            start: arbitrary_int(rng),
            end: arbitrary_int(rng),
            typ: arbitrary_string(rng),
            properties: arbitrary_map(rng, depth - 1),
        }),
    }
}

fn encode(value: &Value) -> Vec<u8> {
    let mut bytes = vec![];
    serialize(value, &mut bytes).expect("serialization failed");
    bytes
}

#[test]
fn random_values_roundtrip() {
    let mut rng = rand::thread_rng();
    for _ in 0..300 {
        let value = arbitrary_value(&mut rng, 3);
        let bytes = encode(&value);
        let back = deserialize(&mut Cursor::new(&bytes)).expect("decoding failed");
        assert_eq!(back, value, "bytes were {:02X?}", bytes);
    }
}

#[test]
fn reencoding_is_idempotent() {
    let mut rng = rand::thread_rng();
    for _ in 0..300 {
        let value = arbitrary_value(&mut rng, 2);
        let bytes = encode(&value);
        let back = deserialize(&mut Cursor::new(&bytes)).expect("decoding failed");
        assert_eq!(encode(&back), bytes);
    }
}

#[test]
fn random_ints_use_the_minimal_width() {
    fn expected_width(n: i64) -> usize {
        if (-16..=127).contains(&n) {
            1
        } else if i64::from(i8::MIN) <= n && n <= i64::from(i8::MAX) {
            2
        } else if i64::from(i16::MIN) <= n && n <= i64::from(i16::MAX) {
            3
        } else if i64::from(i32::MIN) <= n && n <= i64::from(i32::MAX) {
            5
        } else {
            9
        }
    }

    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let n = arbitrary_int(&mut rng);
        let bytes = encode(&Value::Int(n));
        assert_eq!(bytes.len(), expected_width(n), "encoding {}", n);
        let back = deserialize(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(back, Value::Int(n));
    }
}
