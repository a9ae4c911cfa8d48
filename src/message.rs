//! Whole messages: a tag plus its argument values, carried as a single
//! structure value per chunked message.

use std::io::Read;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::chunk::{ChunkReader, ChunkWriter};
use crate::errors::{Error, Result};
use crate::packstream;
use crate::value::{Map, Value};

/// Message tags. The tag byte doubles as the signature of the message's
/// carrier structure, and is disjoint from the value-type signatures.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// Client: authenticate and name the driver.
    Init = 0x01,
    /// Client: clear a failure so the session can continue.
    AckFailure = 0x0E,
    /// Client: abandon everything in flight and return to a clean state.
    Reset = 0x0F,
    /// Client: submit a statement with parameters.
    Run = 0x10,
    /// Client: throw away the pending result.
    DiscardAll = 0x2F,
    /// Client: stream the pending result.
    PullAll = 0x3F,
    /// Server: the request completed, with metadata.
    Success = 0x70,
    /// Server: one result record.
    Record = 0x71,
    /// Server: the request was skipped.
    Ignored = 0x7E,
    /// Server: the request failed, with code and message.
    Failure = 0x7F,
}

/// One received message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub tag: MessageTag,
    pub fields: Vec<Value>,
}

impl Message {
    /// The metadata map carried by SUCCESS and FAILURE replies. An absent
    /// field is an empty map; a non-map field is a violation.
    pub fn into_meta(mut self) -> Result<Map> {
        match self.fields.pop() {
            None => Ok(Map::new()),
            Some(Value::Map(meta)) if self.fields.is_empty() => Ok(meta),
            _ => Err(Error::violation("malformed message metadata")),
        }
    }

    /// The values of a RECORD reply.
    pub fn into_record_values(mut self) -> Result<Vec<Value>> {
        match self.fields.pop() {
            Some(Value::List(values)) if self.fields.is_empty() => Ok(values),
            _ => Err(Error::violation("malformed record message")),
        }
    }
}

/// Append one message to the outbound buffer: a structure whose signature is
/// the tag and whose fields are `fields`, sealed with the message terminator.
pub fn send(out: &mut ChunkWriter, tag: MessageTag, fields: &[Value]) -> Result<()> {
    packstream::serialize_struct(tag.into(), fields, out)?;
    out.end_message();
    Ok(())
}

/// Read exactly one message out of the chunked stream and re-arm it for the
/// next. The top-level value must be a structure with a known tag, and the
/// message terminator must follow immediately.
pub fn recv<R: Read>(chunks: &mut ChunkReader, transport: &mut R) -> Result<Message> {
    let mut body = chunks.message(transport);
    let value = packstream::deserialize(&mut body)?;
    let mut probe = [0u8; 1];
    if body.read(&mut probe).map_err(Error::from)? != 0 {
        return Err(Error::violation("trailing bytes after message"));
    }
    chunks.next_message()?;

    let structure = match value {
        Value::Structure(s) => s,
        other => {
            return Err(Error::ProtocolViolation(format!(
                "top-level message must be a structure, got {}",
                other.type_name()
            )))
        }
    };
    let tag = MessageTag::try_from(structure.signature).map_err(|_| {
        Error::ProtocolViolation(format!(
            "unknown message tag 0x{:02X}",
            structure.signature
        ))
    })?;
    Ok(Message {
        tag,
        fields: structure.fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn wire(f: impl FnOnce(&mut ChunkWriter)) -> Vec<u8> {
        let mut out = ChunkWriter::new();
        f(&mut out);
        let mut bytes = vec![];
        out.flush_into(&mut bytes).unwrap();
        bytes
    }

    fn recv_one(bytes: &[u8]) -> Result<Message> {
        let mut chunks = ChunkReader::new();
        recv(&mut chunks, &mut Cursor::new(bytes))
    }

    #[test]
    fn run_message_roundtrips() {
        let params: Map = [("n", Value::Int(1))].into_iter().collect();
        let fields = vec![Value::from("RETURN $n"), Value::Map(params)];
        let bytes = wire(|out| send(out, MessageTag::Run, &fields).unwrap());

        let msg = recv_one(&bytes).unwrap();
        assert_eq!(msg.tag, MessageTag::Run);
        assert_eq!(msg.fields, fields);
    }

    #[test]
    fn empty_messages_roundtrip() {
        for tag in [
            MessageTag::PullAll,
            MessageTag::DiscardAll,
            MessageTag::AckFailure,
            MessageTag::Reset,
        ] {
            let bytes = wire(|out| send(out, tag, &[]).unwrap());
            let msg = recv_one(&bytes).unwrap();
            assert_eq!(msg.tag, tag);
            assert!(msg.fields.is_empty());
        }
    }

    #[test]
    fn multiple_messages_in_sequence() {
        let bytes = wire(|out| {
            send(out, MessageTag::Run, &[Value::from("X"), Value::Map(Map::new())]).unwrap();
            send(out, MessageTag::PullAll, &[]).unwrap();
        });
        let mut chunks = ChunkReader::new();
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(recv(&mut chunks, &mut cursor).unwrap().tag, MessageTag::Run);
        assert_eq!(
            recv(&mut chunks, &mut cursor).unwrap().tag,
            MessageTag::PullAll
        );
    }

    #[test]
    fn non_struct_top_level_is_a_violation() {
        let bytes = wire(|out| {
            crate::packstream::serialize(&Value::Int(1), out).unwrap();
            out.end_message();
        });
        assert!(matches!(
            recv_one(&bytes),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn unknown_tag_is_a_violation() {
        let bytes = wire(|out| {
            crate::packstream::serialize_struct(0x42, &[], out).unwrap();
            out.end_message();
        });
        assert!(matches!(
            recv_one(&bytes),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_a_violation() {
        let bytes = wire(|out| {
            crate::packstream::serialize_struct(MessageTag::Reset.into(), &[], out).unwrap();
            out.write_all(&[0xC0]).unwrap(); // stray null after the message value
            out.end_message();
        });
        assert!(matches!(
            recv_one(&bytes),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn meta_extraction() {
        let meta: Map = [("fields", Value::List(vec![Value::from("n")]))]
            .into_iter()
            .collect();
        let msg = Message {
            tag: MessageTag::Success,
            fields: vec![Value::Map(meta.clone())],
        };
        assert_eq!(msg.into_meta().unwrap(), meta);

        let empty = Message {
            tag: MessageTag::Ignored,
            fields: vec![],
        };
        assert_eq!(empty.into_meta().unwrap(), Map::new());

        let bad = Message {
            tag: MessageTag::Success,
            fields: vec![Value::Int(1)],
        };
        assert!(matches!(bad.into_meta(), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn record_value_extraction() {
        let msg = Message {
            tag: MessageTag::Record,
            fields: vec![Value::List(vec![Value::Int(1), Value::Null])],
        };
        assert_eq!(
            msg.into_record_values().unwrap(),
            vec![Value::Int(1), Value::Null]
        );

        let bad = Message {
            tag: MessageTag::Record,
            fields: vec![],
        };
        assert!(matches!(
            bad.into_record_values(),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
