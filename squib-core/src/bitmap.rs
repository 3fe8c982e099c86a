//! Per-node addressing bitmap.
//!
//! Bit `id % 8` (LSB first) of byte `id / 8` belongs to node `id`. Reads of an
//! id outside the table, including the unassigned sentinel, are always false
//! so an unaddressed node can never fire.

use core::fmt;

use crate::node_id::NodeId;

/// Number of addressable nodes.
pub const MAX_NODES: usize = 512;

/// Bytes needed to hold one bit per node.
pub const BITMAP_LEN: usize = MAX_NODES / 8;

/// Hex digits needed to spell out a whole bitmap.
pub const BITMAP_HEX_LEN: usize = BITMAP_LEN * 2;

/// Raw node id value meaning "no id assigned".
pub const UNASSIGNED: i32 = -1;

fn locate(id: i32) -> Option<(usize, u8)> {
    if id < 0 || id >= MAX_NODES as i32 {
        return None;
    }
    Some(((id / 8) as usize, 1 << (id % 8)))
}

/// Tests the bit for `id`. Out of range ids read as false.
pub fn get_bit(bitmap: &[u8; BITMAP_LEN], id: i32) -> bool {
    match locate(id) {
        Some((byte, mask)) => bitmap[byte] & mask != 0,
        None => false,
    }
}

/// Sets or clears the bit for `id`. Out of range ids are ignored.
pub fn set_bit(bitmap: &mut [u8; BITMAP_LEN], id: i32, value: bool) {
    if let Some((byte, mask)) = locate(id) {
        if value {
            bitmap[byte] |= mask;
        } else {
            bitmap[byte] &= !mask;
        }
    }
}

/// Maps an optional node id onto the raw value the bit functions take.
pub const fn raw_id(node: Option<NodeId>) -> i32 {
    match node {
        Some(id) => id.get() as i32,
        None => UNASSIGNED,
    }
}

/// The detonate fan-out: one bit per node.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DetonateBitmap([u8; BITMAP_LEN]);

impl DetonateBitmap {
    pub const fn new() -> Self {
        Self([0; BITMAP_LEN])
    }

    pub const fn from_bytes(bytes: [u8; BITMAP_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; BITMAP_LEN] {
        &self.0
    }

    pub fn get(&self, id: i32) -> bool {
        get_bit(&self.0, id)
    }

    pub fn set(&mut self, id: i32, value: bool) {
        set_bit(&mut self.0, id, value)
    }

    /// Whether `node` is addressed. An unassigned node never is.
    pub fn addresses(&self, node: Option<NodeId>) -> bool {
        self.get(raw_id(node))
    }

    pub fn clear(&mut self) {
        self.0 = [0; BITMAP_LEN];
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    /// Ids of every set bit, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = u16> + '_ {
        (0..MAX_NODES as u16).filter(|&id| self.get(id as i32))
    }

    /// Decodes hex pairs (high nibble first) into bytes. A pair containing a
    /// non-hex character decodes to zero; missing pairs stay zero.
    pub fn from_hex(hex: &[u8]) -> Self {
        let mut bytes = [0u8; BITMAP_LEN];
        for (byte, pair) in bytes.iter_mut().zip(hex.chunks_exact(2)) {
            *byte = match (hex_value(pair[0]), hex_value(pair[1])) {
                (Some(hi), Some(lo)) => (hi << 4) | lo,
                _ => 0,
            };
        }
        Self(bytes)
    }

    /// Writes the bitmap as 128 lowercase hex digits.
    pub fn write_hex<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for byte in &self.0 {
            write!(out, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Default for DetonateBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DetonateBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter_set()).finish()
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
