//! Node identity and its persisted record.

use core::fmt::Write;

use portable_atomic::{AtomicI16, Ordering};

use crate::bitmap::MAX_NODES;

/// Highest assignable node id.
pub const MAX_NODE_ID: u16 = (MAX_NODES - 1) as u16;

/// A node id in `0..=MAX_NODE_ID`. "No id" is spelled `Option::<NodeId>::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(u16);

impl NodeId {
    pub const fn new(id: u16) -> Option<Self> {
        if id <= MAX_NODE_ID { Some(Self(id)) } else { None }
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

/// The live node id, readable from any task.
pub struct NodeIdCell(AtomicI16);

impl NodeIdCell {
    const UNASSIGNED: i16 = -1;

    pub const fn new(init: Option<NodeId>) -> Self {
        Self(AtomicI16::new(Self::encode(init)))
    }

    const fn encode(id: Option<NodeId>) -> i16 {
        match id {
            Some(id) => id.0 as i16,
            None => Self::UNASSIGNED,
        }
    }

    pub fn load(&self) -> Option<NodeId> {
        let raw = self.0.load(Ordering::Acquire);
        if raw < 0 { None } else { NodeId::new(raw as u16) }
    }

    pub fn store(&self, id: Option<NodeId>) {
        self.0.store(Self::encode(id), Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    Empty,
    NotANumber,
    OutOfRange,
}

/// Where the node id survives a reboot. Each `store` replaces the whole record.
pub trait NodeIdStore {
    type Error;

    fn load(&mut self) -> Result<NodeId, Self::Error>;
    fn store(&mut self, id: NodeId) -> Result<(), Self::Error>;
}

/// Longest record: three digits and a newline.
pub const RECORD_MAX_LEN: usize = 8;

/// Renders the on-disk record, e.g. `"42\n"`.
pub fn format_record(id: NodeId) -> heapless::String<RECORD_MAX_LEN> {
    let mut out = heapless::String::new();
    // Cannot overflow: at most three digits.
    let _ = write!(out, "{}\n", id.get());
    out
}

/// Parses a record written by [`format_record`]. Surrounding whitespace and
/// leading zeros are accepted.
pub fn parse_record(raw: &[u8]) -> Result<NodeId, RecordError> {
    let text = raw.trim_ascii();
    if text.is_empty() {
        return Err(RecordError::Empty);
    }

    let mut value: u32 = 0;
    for &c in text {
        if !c.is_ascii_digit() {
            return Err(RecordError::NotANumber);
        }
        value = value.saturating_mul(10).saturating_add((c - b'0') as u32);
    }

    u16::try_from(value)
        .ok()
        .and_then(NodeId::new)
        .ok_or(RecordError::OutOfRange)
}

/// Volatile store used by host tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    pub record: heapless::Vec<u8, RECORD_MAX_LEN>,
    pub fail_writes: bool,
    pub writes: usize,
}

#[cfg(test)]
impl NodeIdStore for MemoryStore {
    type Error = RecordError;

    fn load(&mut self) -> Result<NodeId, RecordError> {
        parse_record(&self.record)
    }

    fn store(&mut self, id: NodeId) -> Result<(), RecordError> {
        if self.fail_writes {
            return Err(RecordError::Empty);
        }
        self.record.clear();
        let _ = self.record.extend_from_slice(format_record(id).as_bytes());
        self.writes += 1;
        Ok(())
    }
}
