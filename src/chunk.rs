//! Chunked message framing over a byte transport.
//!
//! Each chunk on the wire is a big-endian `u16` length followed by that many
//! payload bytes; a zero-length chunk terminates a message. The writer
//! assembles whole messages into an outbound buffer so that any number of
//! pipelined requests reach the transport in a single write. The reader
//! hands out the bytes of exactly one message at a time.

use std::io::{self, IoSlice, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::errors::{Error, Result};

/// Largest chunk payload the length prefix can describe.
pub const MAX_CHUNK: usize = 0xFFFF;

/// Assembles messages into length-prefixed chunks.
///
/// Writes accumulate into the current chunk, splitting transparently when the
/// payload reaches [`MAX_CHUNK`]. [`ChunkWriter::end_message`] seals the
/// message with the zero-length terminator; [`ChunkWriter::flush_into`] hands
/// the assembled bytes to the transport.
#[derive(Debug, Default)]
pub struct ChunkWriter {
    buf: Vec<u8>,
    // offset of the open chunk's 2-byte header, if a chunk is open
    chunk_start: Option<usize>,
    poisoned: bool,
}

impl ChunkWriter {
    pub fn new() -> Self {
        ChunkWriter::default()
    }

    /// True when there is nothing to flush.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn open_payload_len(&self) -> usize {
        match self.chunk_start {
            Some(start) => self.buf.len() - start - 2,
            None => 0,
        }
    }

    fn close_chunk(&mut self) {
        if let Some(start) = self.chunk_start.take() {
            let len = (self.buf.len() - start - 2) as u16;
            self.buf[start..start + 2].copy_from_slice(&len.to_be_bytes());
        }
    }

    fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if self.chunk_start.is_none() {
                let start = self.buf.len();
                self.buf.extend_from_slice(&[0, 0]);
                self.chunk_start = Some(start);
            }
            let room = MAX_CHUNK - self.open_payload_len();
            let take = data.len().min(room);
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.open_payload_len() == MAX_CHUNK {
                self.close_chunk();
            }
        }
    }

    /// Seal the current message: close any in-flight chunk and append the
    /// terminator. The next write begins a new message.
    pub fn end_message(&mut self) {
        self.close_chunk();
        self.buf.extend_from_slice(&[0, 0]);
    }

    /// Write every assembled byte to `transport` and clear the buffer.
    ///
    /// A transport error poisons the writer; all later writes and flushes
    /// fail with the same condition.
    pub fn flush_into<W: Write>(&mut self, transport: &mut W) -> Result<()> {
        if self.poisoned {
            return Err(Error::SessionEnded);
        }
        if self.buf.is_empty() {
            return Ok(());
        }
        let outcome = transport
            .write_all(&self.buf)
            .and_then(|_| transport.flush());
        if let Err(err) = outcome {
            self.poisoned = true;
            return Err(err.into());
        }
        self.buf.clear();
        Ok(())
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "chunk writer poisoned"));
        }
        self.append(data);
        Ok(data.len())
    }

    // coalesce all slices into the open chunk
    fn write_vectored(&mut self, bufs: &[IoSlice]) -> io::Result<usize> {
        let mut written = 0;
        for buf in bufs {
            written += self.write(buf)?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        // assembly only; the transport is flushed by flush_into
        Ok(())
    }
}

/// Tracks the inbound chunk state: how much of the current chunk is unread,
/// and whether the message terminator has been seen.
#[derive(Debug, Default)]
pub struct ChunkReader {
    remaining: usize,
    at_end: bool,
}

impl ChunkReader {
    pub fn new() -> Self {
        ChunkReader::default()
    }

    /// True once the current message's terminator has been consumed.
    pub fn at_end_of_message(&self) -> bool {
        self.at_end
    }

    /// Re-arm the reader for the next message. Consumes nothing from the
    /// transport; only valid once the current message has been fully read.
    pub fn next_message(&mut self) -> Result<()> {
        if !self.at_end {
            return Err(Error::InvalidArgument(
                "cannot advance before the end of the current message",
            ));
        }
        self.at_end = false;
        Ok(())
    }

    /// Borrow the bytes of the current message as an [`io::Read`] over
    /// `transport`.
    pub fn message<'a, R: Read>(&'a mut self, transport: &'a mut R) -> MessageBody<'a, R> {
        MessageBody {
            chunks: self,
            transport,
        }
    }
}

/// The payload of one message: reads return its bytes across chunk
/// boundaries and yield 0 at the message terminator.
pub struct MessageBody<'a, R> {
    chunks: &'a mut ChunkReader,
    transport: &'a mut R,
}

impl<R: Read> Read for MessageBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.chunks.at_end {
            return Ok(0);
        }
        while self.chunks.remaining == 0 {
            let len = self.transport.read_u16::<BE>()?;
            if len == 0 {
                self.chunks.at_end = true;
                return Ok(0);
            }
            self.chunks.remaining = usize::from(len);
        }
        let want = buf.len().min(self.chunks.remaining);
        let got = self.transport.read(&mut buf[..want])?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transport closed inside a chunk",
            ));
        }
        self.chunks.remaining -= got;
        Ok(got)
    }
}
