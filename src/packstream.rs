//! Serialization of [`Value`]s to and from their packed wire form.
//!
//! Every value starts with a marker byte. The marker selects the type and,
//! for variable-length types, either carries a small length in its low nibble
//! or selects a big-endian length extension of 8, 16 or 32 bits. Integers are
//! always written in the smallest width that fits; any width is accepted on
//! input.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::errors::{Error, Result};
use crate::value::{Map, Node, Path, Relationship, Structure, UnboundRelationship, Value};

/// Marker bytes of the wire format.
pub mod markers {
    pub const TINY_STRING: u8 = 0x80;
    pub const TINY_LIST: u8 = 0x90;
    pub const TINY_MAP: u8 = 0xA0;
    pub const TINY_STRUCT: u8 = 0xB0;
    pub const NULL: u8 = 0xC0;
    pub const FLOAT: u8 = 0xC1;
    pub const FALSE: u8 = 0xC2;
    pub const TRUE: u8 = 0xC3;
    pub const INT8: u8 = 0xC8;
    pub const INT16: u8 = 0xC9;
    pub const INT32: u8 = 0xCA;
    pub const INT64: u8 = 0xCB;
    pub const STRING8: u8 = 0xD0;
    pub const STRING16: u8 = 0xD1;
    pub const STRING32: u8 = 0xD2;
    pub const LIST8: u8 = 0xD4;
    pub const LIST16: u8 = 0xD5;
    pub const LIST32: u8 = 0xD6;
    pub const MAP8: u8 = 0xD8;
    pub const MAP16: u8 = 0xD9;
    pub const MAP32: u8 = 0xDA;
    pub const STRUCT8: u8 = 0xDC;
    pub const STRUCT16: u8 = 0xDD;
}

/// Structure signatures reserved for the graph types.
pub mod signatures {
    pub const NODE: u8 = 0x4E;
    pub const PATH: u8 = 0x50;
    pub const RELATIONSHIP: u8 = 0x52;
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
}

// Inline tiny ints cover [-16, 127]: positive values are the marker itself,
// negative values sign-extend out of the 0xF0..=0xFF markers.
const TINY_INT_MIN: i64 = -16;
const TINY_INT_MAX: i64 = 127;

// Container capacity hints from the wire are clamped before allocating, so a
// hostile length prefix cannot reserve more than this many slots up front.
const PREALLOC_LIMIT: usize = 1024;

/// Serialize one value onto `sink` in its minimal-width encoding.
pub fn serialize<W: Write>(value: &Value, sink: &mut W) -> Result<()> {
    match value {
        Value::Null => sink.write_u8(markers::NULL)?,
        Value::Bool(true) => sink.write_u8(markers::TRUE)?,
        Value::Bool(false) => sink.write_u8(markers::FALSE)?,
        Value::Int(n) | Value::Identity(n) => serialize_int(*n, sink)?,
        Value::Float(x) => {
            sink.write_u8(markers::FLOAT)?;
            sink.write_f64::<BE>(*x)?;
        }
        Value::String(s) => serialize_string(s, sink)?,
        Value::List(items) => {
            write_length(markers::TINY_LIST, markers::LIST8, items.len(), sink)?;
            for item in items {
                serialize(item, sink)?;
            }
        }
        Value::Map(map) => serialize_map(map, sink)?,
        Value::Structure(s) => serialize_struct(s.signature, &s.fields, sink)?,
        Value::Node(n) => serialize_node(n, sink)?,
        Value::Relationship(r) => {
            write_struct_header(signatures::RELATIONSHIP, 5, sink)?;
            serialize_int(r.id, sink)?;
            serialize_int(r.start, sink)?;
            serialize_int(r.end, sink)?;
            serialize_string(&r.typ, sink)?;
            serialize_map(&r.properties, sink)?;
        }
        Value::UnboundRelationship(r) => serialize_unbound(r, sink)?,
        Value::Path(p) => {
            write_struct_header(signatures::PATH, 3, sink)?;
            write_length(markers::TINY_LIST, markers::LIST8, p.nodes.len(), sink)?;
            for node in &p.nodes {
                serialize_node(node, sink)?;
            }
            write_length(
                markers::TINY_LIST,
                markers::LIST8,
                p.relationships.len(),
                sink,
            )?;
            for rel in &p.relationships {
                serialize_unbound(rel, sink)?;
            }
            write_length(markers::TINY_LIST, markers::LIST8, p.sequence.len(), sink)?;
            for n in &p.sequence {
                serialize_int(*n, sink)?;
            }
        }
    }
    Ok(())
}

fn serialize_int<W: Write>(n: i64, sink: &mut W) -> Result<()> {
    if (TINY_INT_MIN..=TINY_INT_MAX).contains(&n) {
        sink.write_i8(n as i8)?;
    } else if i64::from(i8::MIN) <= n && n <= i64::from(i8::MAX) {
        sink.write_u8(markers::INT8)?;
        sink.write_i8(n as i8)?;
    } else if i64::from(i16::MIN) <= n && n <= i64::from(i16::MAX) {
        sink.write_u8(markers::INT16)?;
        sink.write_i16::<BE>(n as i16)?;
    } else if i64::from(i32::MIN) <= n && n <= i64::from(i32::MAX) {
        sink.write_u8(markers::INT32)?;
        sink.write_i32::<BE>(n as i32)?;
    } else {
        sink.write_u8(markers::INT64)?;
        sink.write_i64::<BE>(n)?;
    }
    Ok(())
}

fn serialize_string<W: Write>(s: &str, sink: &mut W) -> Result<()> {
    write_length(markers::TINY_STRING, markers::STRING8, s.len(), sink)?;
    sink.write_all(s.as_bytes())?;
    Ok(())
}

fn serialize_map<W: Write>(map: &Map, sink: &mut W) -> Result<()> {
    write_length(markers::TINY_MAP, markers::MAP8, map.len(), sink)?;
    for (key, value) in map.iter() {
        serialize_string(key, sink)?;
        serialize(value, sink)?;
    }
    Ok(())
}

pub(crate) fn serialize_struct<W: Write>(signature: u8, fields: &[Value], sink: &mut W) -> Result<()> {
    write_struct_header(signature, fields.len(), sink)?;
    for field in fields {
        serialize(field, sink)?;
    }
    Ok(())
}

fn serialize_node<W: Write>(node: &Node, sink: &mut W) -> Result<()> {
    write_struct_header(signatures::NODE, 3, sink)?;
    serialize_int(node.id, sink)?;
    write_length(markers::TINY_LIST, markers::LIST8, node.labels.len(), sink)?;
    for label in &node.labels {
        serialize_string(label, sink)?;
    }
    serialize_map(&node.properties, sink)
}

fn serialize_unbound<W: Write>(rel: &UnboundRelationship, sink: &mut W) -> Result<()> {
    write_struct_header(signatures::UNBOUND_RELATIONSHIP, 3, sink)?;
    serialize_int(rel.id, sink)?;
    serialize_string(&rel.typ, sink)?;
    serialize_map(&rel.properties, sink)
}

// The string, list and map length extensions are laid out identically, offset
// from a per-type base marker (8-bit, then 16-bit, then 32-bit).
fn write_length<W: Write>(tiny: u8, base: u8, len: usize, sink: &mut W) -> Result<()> {
    if len <= 15 {
        sink.write_u8(tiny + len as u8)?;
    } else if len <= u8::MAX as usize {
        sink.write_u8(base)?;
        sink.write_u8(len as u8)?;
    } else if len <= u16::MAX as usize {
        sink.write_u8(base + 1)?;
        sink.write_u16::<BE>(len as u16)?;
    } else if len <= u32::MAX as usize {
        sink.write_u8(base + 2)?;
        sink.write_u32::<BE>(len as u32)?;
    } else {
        return Err(Error::OutOfRange("value length exceeds the wire format"));
    }
    Ok(())
}

fn write_struct_header<W: Write>(signature: u8, len: usize, sink: &mut W) -> Result<()> {
    if len <= 15 {
        sink.write_u8(markers::TINY_STRUCT + len as u8)?;
    } else if len <= u8::MAX as usize {
        sink.write_u8(markers::STRUCT8)?;
        sink.write_u8(len as u8)?;
    } else if len <= u16::MAX as usize {
        sink.write_u8(markers::STRUCT16)?;
        sink.write_u16::<BE>(len as u16)?;
    } else {
        return Err(Error::StructOverflow);
    }
    sink.write_u8(signature)?;
    Ok(())
}

/// Deserialize exactly one value from `source`.
pub fn deserialize<R: Read>(source: &mut R) -> Result<Value> {
    let marker = source.read_u8()?;
    match marker {
        0x00..=0x7F => Ok(Value::Int(i64::from(marker))),
        // tiny negative ints sign-extend the low nibble: 0xFF is -1
        0xF0..=0xFF => Ok(Value::Int(i64::from(marker as i8))),
        0x80..=0x8F => read_string(usize::from(marker & 0x0F), source),
        0x90..=0x9F => read_list(usize::from(marker & 0x0F), source),
        0xA0..=0xAF => read_map(usize::from(marker & 0x0F), source),
        0xB0..=0xBF => read_struct(usize::from(marker & 0x0F), source),
        markers::NULL => Ok(Value::Null),
        markers::FLOAT => Ok(Value::Float(source.read_f64::<BE>()?)),
        markers::FALSE => Ok(Value::Bool(false)),
        markers::TRUE => Ok(Value::Bool(true)),
        markers::INT8 => Ok(Value::Int(i64::from(source.read_i8()?))),
        markers::INT16 => Ok(Value::Int(i64::from(source.read_i16::<BE>()?))),
        markers::INT32 => Ok(Value::Int(i64::from(source.read_i32::<BE>()?))),
        markers::INT64 => Ok(Value::Int(source.read_i64::<BE>()?)),
        markers::STRING8 => {
            let len = usize::from(source.read_u8()?);
            read_string(len, source)
        }
        markers::STRING16 => {
            let len = usize::from(source.read_u16::<BE>()?);
            read_string(len, source)
        }
        markers::STRING32 => {
            let len = source.read_u32::<BE>()? as usize;
            read_string(len, source)
        }
        markers::LIST8 => {
            let len = usize::from(source.read_u8()?);
            read_list(len, source)
        }
        markers::LIST16 => {
            let len = usize::from(source.read_u16::<BE>()?);
            read_list(len, source)
        }
        markers::LIST32 => {
            let len = source.read_u32::<BE>()? as usize;
            read_list(len, source)
        }
        markers::MAP8 => {
            let len = usize::from(source.read_u8()?);
            read_map(len, source)
        }
        markers::MAP16 => {
            let len = usize::from(source.read_u16::<BE>()?);
            read_map(len, source)
        }
        markers::MAP32 => {
            let len = source.read_u32::<BE>()? as usize;
            read_map(len, source)
        }
        markers::STRUCT8 => {
            let len = usize::from(source.read_u8()?);
            read_struct(len, source)
        }
        markers::STRUCT16 => {
            let len = usize::from(source.read_u16::<BE>()?);
            read_struct(len, source)
        }
        _ => Err(Error::InvalidValueMarker(marker)),
    }
}

fn read_string<R: Read>(len: usize, source: &mut R) -> Result<Value> {
    // Read through a bounded take rather than pre-allocating len bytes: the
    // length prefix is untrusted until the payload has actually arrived.
    let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    let n = source.take(len as u64).read_to_end(&mut buf)?;
    if n < len {
        return Err(Error::UnexpectedEndOfInput);
    }
    let s = String::from_utf8(buf).map_err(|_| Error::violation("invalid UTF-8 in string"))?;
    Ok(Value::String(s))
}

fn read_list<R: Read>(len: usize, source: &mut R) -> Result<Value> {
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(deserialize(source)?);
    }
    Ok(Value::List(items))
}

fn read_map<R: Read>(len: usize, source: &mut R) -> Result<Value> {
    let mut map = Map::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        let key = match deserialize(source)? {
            Value::String(s) => s,
            _ => return Err(Error::InvalidMapKeyType),
        };
        let value = deserialize(source)?;
        map.insert(key, value);
    }
    Ok(Value::Map(map))
}

fn read_struct<R: Read>(len: usize, source: &mut R) -> Result<Value> {
    let signature = source.read_u8()?;
    let mut fields = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        fields.push(deserialize(source)?);
    }
    specialize(Structure { signature, fields })
}

// Structures with reserved signatures become the graph types; the shape of
// their fields is fixed and anything else from the server is a violation.
fn specialize(s: Structure) -> Result<Value> {
    match s.signature {
        signatures::NODE => {
            let node = node_from_fields(s.fields)?;
            Ok(Value::Node(Box::new(node)))
        }
        signatures::RELATIONSHIP => {
            let mut fields = s.fields.into_iter();
            let (id, start, end, typ, properties) = match (
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
            ) {
                (
                    Some(Value::Int(id) | Value::Identity(id)),
                    Some(Value::Int(start) | Value::Identity(start)),
                    Some(Value::Int(end) | Value::Identity(end)),
                    Some(Value::String(typ)),
                    Some(Value::Map(properties)),
                    None,
                ) => (id, start, end, typ, properties),
                _ => return Err(Error::violation("malformed relationship structure")),
            };
            Ok(Value::Relationship(Box::new(Relationship {
                id,
                start,
                end,
                typ,
                properties,
            })))
        }
        signatures::UNBOUND_RELATIONSHIP => {
            let rel = unbound_from_fields(s.fields)?;
            Ok(Value::UnboundRelationship(Box::new(rel)))
        }
        signatures::PATH => {
            let mut fields = s.fields.into_iter();
            let (nodes, rels, sequence) =
                match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (
                        Some(Value::List(nodes)),
                        Some(Value::List(rels)),
                        Some(Value::List(sequence)),
                        None,
                    ) => (nodes, rels, sequence),
                    _ => return Err(Error::violation("malformed path structure")),
                };
            let nodes = nodes
                .into_iter()
                .map(|v| match v {
                    Value::Node(n) => Ok(*n),
                    _ => Err(Error::violation("path nodes must be nodes")),
                })
                .collect::<Result<Vec<Node>>>()?;
            let relationships = rels
                .into_iter()
                .map(|v| match v {
                    Value::UnboundRelationship(r) => Ok(*r),
                    _ => Err(Error::violation("path relationships must be relationships")),
                })
                .collect::<Result<Vec<UnboundRelationship>>>()?;
            let sequence = sequence
                .into_iter()
                .map(|v| {
                    v.as_int()
                        .ok_or_else(|| Error::violation("path sequence must hold integers"))
                })
                .collect::<Result<Vec<i64>>>()?;
            validate_path(&nodes, &relationships, &sequence)?;
            Ok(Value::Path(Box::new(Path {
                nodes,
                relationships,
                sequence,
            })))
        }
        _ => Ok(Value::Structure(s)),
    }
}

fn node_from_fields(fields: Vec<Value>) -> Result<Node> {
    let mut fields = fields.into_iter();
    let (id, labels, properties) = match (fields.next(), fields.next(), fields.next(), fields.next())
    {
        (
            Some(Value::Int(id) | Value::Identity(id)),
            Some(Value::List(labels)),
            Some(Value::Map(properties)),
            None,
        ) => (id, labels, properties),
        _ => return Err(Error::violation("malformed node structure")),
    };
    let labels = labels
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            _ => Err(Error::violation("node labels must be strings")),
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(Node {
        id,
        labels,
        properties,
    })
}

fn unbound_from_fields(fields: Vec<Value>) -> Result<UnboundRelationship> {
    let mut fields = fields.into_iter();
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (
            Some(Value::Int(id) | Value::Identity(id)),
            Some(Value::String(typ)),
            Some(Value::Map(properties)),
            None,
        ) => Ok(UnboundRelationship {
            id,
            typ,
            properties,
        }),
        _ => Err(Error::violation("malformed relationship structure")),
    }
}

fn validate_path(nodes: &[Node], rels: &[UnboundRelationship], sequence: &[i64]) -> Result<()> {
    if sequence.len() % 2 != 0 {
        return Err(Error::violation("odd-length path sequence"));
    }
    if nodes.is_empty() && !sequence.is_empty() {
        return Err(Error::violation("path sequence without nodes"));
    }
    for hop in sequence.chunks(2) {
        let rel_idx = hop[0];
        let node_idx = hop[1];
        if rel_idx == 0 || rel_idx.unsigned_abs() as usize > rels.len() {
            return Err(Error::violation("path relationship index out of range"));
        }
        if node_idx < 0 || node_idx as usize >= nodes.len() {
            return Err(Error::violation("path node index out of range"));
        }
    }
    Ok(())
}
