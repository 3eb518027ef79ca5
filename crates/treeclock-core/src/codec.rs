//! Compact binary serialization for stamps and their components.
//!
//! # Wire format (v1)
//!
//! Every stand-alone artifact opens with a one-byte version tag equal to
//! the library's major version; it is the single compatibility control.
//!
//! ```text
//! id artifact:     version:u8  id-nodes
//! event artifact:  version:u8  event-nodes
//! stamp artifact:  version:u8  header:u8
//!                  id-len:BE   id-nodes
//!                  event-len:BE event-nodes
//! ```
//!
//! `Id` nodes, pre-order, one byte each: `0x00` unowned leaf, `0x01`
//! owned leaf, `0x02` interior (followed by the left then right
//! subtree). The tree shape is self-delimiting; no length prefix.
//!
//! `Event` nodes, pre-order, one header byte each: bit 0 set for
//! interior nodes, bits 1.. carry the counter byte length. A length of
//! zero means the counter is zero; otherwise that many big-endian bytes
//! follow, then (for interior nodes) the left and right subtrees.
//!
//! The stamp header packs the byte length of the id-length field in its
//! high nibble and of the event-length field in its low nibble, each in
//! `1..=4`; the component lengths themselves are big-endian.
//!
//! Decoders refuse truncated input, trailing bytes, unknown node tags,
//! and (for IDs) trees not in normal form. Event decoding is a tolerant
//! receiver: denormalized wire trees are accepted verbatim, provided
//! every accumulated counter fits the configured width.

use tracing::debug;

use crate::counter::{Counter, COUNTER_BYTES};
use crate::error::{Error, Result};
use crate::tree::{Event, Id, Stamp};

/// Version tag written to and required from every serialized artifact.
/// Tracks the crate's major version.
pub const WIRE_VERSION: u8 = 1;

const ID_NODE_NULL: u8 = 0x00;
const ID_NODE_SEED: u8 = 0x01;
const ID_NODE_PARENT: u8 = 0x02;

const EVENT_PARENT_FLAG: u8 = 0x01;

/// Component lengths in a stamp are at most 32-bit.
const MAX_LEN_LEN: usize = 4;

/// Nesting bound for decoded trees. Any genuine ITC is orders of
/// magnitude shallower; the bound keeps hostile input from exhausting
/// the stack.
const MAX_TREE_DEPTH: usize = 1024;

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.input.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.input.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    const fn is_exhausted(&self) -> bool {
        self.pos == self.input.len()
    }
}

// ---------------------------------------------------------------------------
// Node-level encoding
// ---------------------------------------------------------------------------

fn write_id_nodes(id: &Id, buf: &mut [u8], pos: &mut usize) {
    match id {
        Id::Zero => {
            buf[*pos] = ID_NODE_NULL;
            *pos += 1;
        }
        Id::One => {
            buf[*pos] = ID_NODE_SEED;
            *pos += 1;
        }
        Id::Branch(l, r) => {
            buf[*pos] = ID_NODE_PARENT;
            *pos += 1;
            write_id_nodes(l, buf, pos);
            write_id_nodes(r, buf, pos);
        }
    }
}

fn read_id_nodes(reader: &mut Reader<'_>, depth: usize) -> Result<Id> {
    if depth > MAX_TREE_DEPTH {
        return Err(Error::CorruptId);
    }
    match reader.byte().ok_or(Error::CorruptId)? {
        ID_NODE_NULL => Ok(Id::Zero),
        ID_NODE_SEED => Ok(Id::One),
        ID_NODE_PARENT => {
            // Raw construction: decoding must observe, not repair, the
            // wire shape; normal form is checked afterwards.
            let left = read_id_nodes(reader, depth + 1)?;
            let right = read_id_nodes(reader, depth + 1)?;
            Ok(Id::Branch(Box::new(left), Box::new(right)))
        }
        tag => {
            debug!(tag, "unknown id node tag");
            Err(Error::CorruptId)
        }
    }
}

/// Minimal big-endian byte length of a counter (0 encodes as no bytes).
fn counter_len(value: Counter) -> usize {
    if value == 0 {
        0
    } else {
        ((Counter::BITS - value.leading_zeros()).div_ceil(8)) as usize
    }
}

fn write_counter(value: Counter, buf: &mut [u8], pos: &mut usize) {
    let len = counter_len(value);
    let bytes = value.to_be_bytes();
    buf[*pos..*pos + len].copy_from_slice(&bytes[COUNTER_BYTES - len..]);
    *pos += len;
}

fn event_nodes_len(event: &Event) -> usize {
    match event {
        Event::Leaf(n) => 1 + counter_len(*n),
        Event::Branch(n, l, r) => {
            1 + counter_len(*n) + event_nodes_len(l) + event_nodes_len(r)
        }
    }
}

fn write_event_nodes(event: &Event, buf: &mut [u8], pos: &mut usize) {
    match event {
        Event::Leaf(n) => {
            buf[*pos] = (counter_len(*n) as u8) << 1;
            *pos += 1;
            write_counter(*n, buf, pos);
        }
        Event::Branch(n, l, r) => {
            buf[*pos] = ((counter_len(*n) as u8) << 1) | EVENT_PARENT_FLAG;
            *pos += 1;
            write_counter(*n, buf, pos);
            write_event_nodes(l, buf, pos);
            write_event_nodes(r, buf, pos);
        }
    }
}

fn read_event_nodes(reader: &mut Reader<'_>, depth: usize) -> Result<Event> {
    if depth > MAX_TREE_DEPTH {
        return Err(Error::CorruptEvent);
    }
    let header = reader.byte().ok_or(Error::CorruptEvent)?;
    let len = header >> 1;
    if usize::from(len) > COUNTER_BYTES {
        return Err(Error::UnsupportedCounterSize(len));
    }
    let bytes = reader.take(usize::from(len)).ok_or(Error::CorruptEvent)?;
    let value = bytes
        .iter()
        .fold(0 as Counter, |acc, b| (acc << 8) | Counter::from(*b));

    if header & EVENT_PARENT_FLAG == 0 {
        return Ok(Event::Leaf(value));
    }
    let left = read_event_nodes(reader, depth + 1)?;
    let right = read_event_nodes(reader, depth + 1)?;
    Ok(Event::Branch(value, Box::new(left), Box::new(right)))
}

// ---------------------------------------------------------------------------
// Id artifacts
// ---------------------------------------------------------------------------

impl Id {
    /// Exact size of this tree's serialized artifact in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + self.node_count()
    }

    /// Serialize into a caller-provided buffer, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for an empty buffer,
    /// [`Error::CorruptId`] when the tree is not in normal form, and
    /// [`Error::InsufficientResources`] when the buffer is too small.
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidParam("empty output buffer"));
        }
        self.validate(true)?;
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(Error::InsufficientResources {
                needed,
                capacity: buf.len(),
            });
        }
        buf[0] = WIRE_VERSION;
        let mut pos = 1;
        write_id_nodes(self, buf, &mut pos);
        Ok(pos)
    }

    /// Serialize into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptId`] when the tree is not in normal form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.encoded_len()];
        let written = self.serialize_into(&mut out)?;
        debug_assert_eq!(written, out.len());
        Ok(out)
    }

    /// Decode an ID artifact.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for empty input,
    /// [`Error::IncompatibleVersion`] on a version-tag mismatch, and
    /// [`Error::CorruptId`] for truncated input, trailing bytes, unknown
    /// node tags, or a tree not in normal form.
    pub fn deserialize(input: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(input);
        check_version(&mut reader)?;
        let id = read_id_nodes(&mut reader, 0)?;
        if !reader.is_exhausted() {
            return Err(Error::CorruptId);
        }
        id.validate(true)?;
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Event artifacts
// ---------------------------------------------------------------------------

impl Event {
    /// Exact size of this tree's serialized artifact in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + event_nodes_len(self)
    }

    /// Serialize into a caller-provided buffer, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for an empty buffer and
    /// [`Error::InsufficientResources`] when the buffer is too small.
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidParam("empty output buffer"));
        }
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(Error::InsufficientResources {
                needed,
                capacity: buf.len(),
            });
        }
        buf[0] = WIRE_VERSION;
        let mut pos = 1;
        write_event_nodes(self, buf, &mut pos);
        Ok(pos)
    }

    /// Serialize into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// None in practice; kept fallible for symmetry with [`Id`] and
    /// [`Stamp`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.encoded_len()];
        let written = self.serialize_into(&mut out)?;
        debug_assert_eq!(written, out.len());
        Ok(out)
    }

    /// Decode an event artifact. Denormalized trees are accepted, but
    /// every accumulated counter must fit the configured width.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for empty input,
    /// [`Error::IncompatibleVersion`] on a version-tag mismatch,
    /// [`Error::UnsupportedCounterSize`] when a counter is wider than
    /// this build supports, and [`Error::CorruptEvent`] for truncated
    /// input, trailing bytes, or out-of-range accumulated counters.
    pub fn deserialize(input: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(input);
        check_version(&mut reader)?;
        let event = read_event_nodes(&mut reader, 0)?;
        if !reader.is_exhausted() {
            return Err(Error::CorruptEvent);
        }
        event.validate()?;
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Stamp artifacts
// ---------------------------------------------------------------------------

/// Minimal byte length of a component length field (always at least 1).
fn len_len(len: usize) -> usize {
    let mut bytes = 1;
    let mut rest = len >> 8;
    while rest != 0 {
        bytes += 1;
        rest >>= 8;
    }
    bytes
}

fn write_len(len: usize, bytes: usize, buf: &mut [u8], pos: &mut usize) {
    for shift in (0..bytes).rev() {
        buf[*pos] = ((len >> (shift * 8)) & 0xFF) as u8;
        *pos += 1;
    }
}

impl Stamp {
    /// Exact size of this stamp's serialized artifact in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let id_len = self.id.node_count();
        let event_len = event_nodes_len(&self.event);
        2 + len_len(id_len) + id_len + len_len(event_len) + event_len
    }

    /// Serialize into a caller-provided buffer, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for an empty buffer or a component too
    /// large for a 32-bit length, [`Error::CorruptId`] when the ID is
    /// not in normal form, and [`Error::InsufficientResources`] when the
    /// buffer is too small.
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidParam("empty output buffer"));
        }
        self.id.validate(true)?;

        let id_len = self.id.node_count();
        let event_len = event_nodes_len(&self.event);
        let id_len_len = len_len(id_len);
        let event_len_len = len_len(event_len);
        if id_len_len > MAX_LEN_LEN || event_len_len > MAX_LEN_LEN {
            return Err(Error::InvalidParam("component exceeds 32-bit length"));
        }

        let needed = 2 + id_len_len + id_len + event_len_len + event_len;
        if buf.len() < needed {
            return Err(Error::InsufficientResources {
                needed,
                capacity: buf.len(),
            });
        }

        buf[0] = WIRE_VERSION;
        buf[1] = ((id_len_len as u8) << 4) | (event_len_len as u8);
        let mut pos = 2;
        write_len(id_len, id_len_len, buf, &mut pos);
        write_id_nodes(&self.id, buf, &mut pos);
        write_len(event_len, event_len_len, buf, &mut pos);
        write_event_nodes(&self.event, buf, &mut pos);
        Ok(pos)
    }

    /// Serialize into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptId`] when the ID is not in normal form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.encoded_len()];
        let written = self.serialize_into(&mut out)?;
        debug_assert_eq!(written, out.len());
        Ok(out)
    }

    /// Decode a stamp artifact.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for empty input or a length-length nibble
    /// outside `1..=4`, [`Error::IncompatibleVersion`] on a version-tag
    /// mismatch, [`Error::CorruptStamp`] for truncation, trailing bytes,
    /// or inconsistent component lengths, and any component-level error
    /// ([`Error::CorruptId`], [`Error::CorruptEvent`],
    /// [`Error::UnsupportedCounterSize`]).
    pub fn deserialize(input: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(input);
        check_version(&mut reader)?;

        let header = reader.byte().ok_or(Error::CorruptStamp)?;
        let id_len_len = usize::from(header >> 4);
        let event_len_len = usize::from(header & 0x0F);
        if !(1..=MAX_LEN_LEN).contains(&id_len_len)
            || !(1..=MAX_LEN_LEN).contains(&event_len_len)
        {
            // A length-length outside 1..=4 is caller error, not wire
            // damage.
            return Err(Error::InvalidParam("component length-length not in 1..=4"));
        }

        let id_len = read_len(&mut reader, id_len_len)?;
        let id_payload = reader.take(id_len).ok_or(Error::CorruptStamp)?;
        // Component payloads carry no version byte of their own.
        let mut id_reader = Reader::new(id_payload);
        let id = read_id_nodes(&mut id_reader, 0)?;
        if !id_reader.is_exhausted() {
            return Err(Error::CorruptStamp);
        }
        id.validate(true)?;

        let event_len = read_len(&mut reader, event_len_len)?;
        let event_payload = reader.take(event_len).ok_or(Error::CorruptStamp)?;
        let mut event_reader = Reader::new(event_payload);
        let event = read_event_nodes(&mut event_reader, 0)?;
        if !event_reader.is_exhausted() {
            return Err(Error::CorruptStamp);
        }
        event.validate()?;

        if !reader.is_exhausted() {
            debug!(trailing = input.len() - reader.pos, "trailing bytes after stamp");
            return Err(Error::CorruptStamp);
        }
        Ok(Self::new(id, event))
    }
}

fn read_len(reader: &mut Reader<'_>, bytes: usize) -> Result<usize> {
    let raw = reader.take(bytes).ok_or(Error::CorruptStamp)?;
    Ok(raw.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
}

fn check_version(reader: &mut Reader<'_>) -> Result<()> {
    let found = reader
        .byte()
        .ok_or(Error::InvalidParam("empty input"))?;
    if found != WIRE_VERSION {
        return Err(Error::IncompatibleVersion {
            expected: WIRE_VERSION,
            found,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
