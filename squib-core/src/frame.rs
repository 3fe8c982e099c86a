//! Wire frame codec.
//!
//! Layout (little-endian, `FRAME_LEN` bytes):
//!
//! | Offset | Size | Field       |
//! |--------|------|-------------|
//! | 0      | 2    | crc         |
//! | 2      | 4    | magic       |
//! | 6      | 1    | armed       |
//! | 7      | 1    | padding     |
//! | 8      | 64   | pyro_bits   |
//!
//! The crc covers the whole frame with its own field zeroed.

use crc::{CRC_16_IBM_SDLC, Crc};

use crate::bitmap::{BITMAP_LEN, DetonateBitmap};
use crate::config::MAX_PAYLOAD_LEN;

const CRC_OFFSET: usize = 0;
const MAGIC_OFFSET: usize = 2;
const ARMED_OFFSET: usize = 6;
const BITS_OFFSET: usize = 8;

pub const FRAME_LEN: usize = BITS_OFFSET + BITMAP_LEN;

const _: () = assert!(FRAME_LEN == 72);
const _: () = assert!(
    FRAME_LEN <= MAX_PAYLOAD_LEN,
    "A frame must fit in a single radio payload!"
);

/// Reflected CCITT, register seeded with 0xFFFF.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    TooShort,
    CrcMismatch,
    MagicMismatch,
}

/// What a transmitter puts on the air: the arm flag and who should fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FramePayload {
    pub armed: bool,
    pub pyro_bits: DetonateBitmap,
}

impl FramePayload {
    pub const fn new() -> Self {
        Self {
            armed: false,
            pyro_bits: DetonateBitmap::new(),
        }
    }
}

/// Payload staged on a transmitter for the next outgoing frame.
pub type TransmitPayload = FramePayload;

/// A frame whose crc and magic have both been checked. Only [`validate`]
/// builds one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidatedFrame {
    payload: FramePayload,
}

impl ValidatedFrame {
    pub fn armed(&self) -> bool {
        self.payload.armed
    }

    pub fn pyro_bits(&self) -> &DetonateBitmap {
        &self.payload.pyro_bits
    }

    pub fn payload(&self) -> FramePayload {
        self.payload
    }
}

pub fn encode(payload: &FramePayload, magic: u32) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[MAGIC_OFFSET..ARMED_OFFSET].copy_from_slice(&magic.to_le_bytes());
    out[ARMED_OFFSET] = payload.armed as u8;
    out[BITS_OFFSET..].copy_from_slice(payload.pyro_bits.as_bytes());

    let crc = crc16(&out);
    out[CRC_OFFSET..MAGIC_OFFSET].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Checks length, then crc, then magic. Nothing in the frame is read before
/// all three pass.
///
/// Trailing bytes past `FRAME_LEN` are part of the crc, so a longer buffer only
/// validates if its sender covered them.
pub fn validate(bytes: &[u8], expected_magic: u32) -> Result<ValidatedFrame, ValidationError> {
    if bytes.len() < FRAME_LEN {
        return Err(ValidationError::TooShort);
    }

    let stored = u16::from_le_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]]);
    let mut digest = CRC16.digest();
    digest.update(&[0, 0]);
    digest.update(&bytes[MAGIC_OFFSET..]);
    if digest.finalize() != stored {
        return Err(ValidationError::CrcMismatch);
    }

    let magic = u32::from_le_bytes([
        bytes[MAGIC_OFFSET],
        bytes[MAGIC_OFFSET + 1],
        bytes[MAGIC_OFFSET + 2],
        bytes[MAGIC_OFFSET + 3],
    ]);
    if magic != expected_magic {
        return Err(ValidationError::MagicMismatch);
    }

    let mut bits = [0u8; BITMAP_LEN];
    bits.copy_from_slice(&bytes[BITS_OFFSET..FRAME_LEN]);
    Ok(ValidatedFrame {
        payload: FramePayload {
            armed: bytes[ARMED_OFFSET] != 0,
            pyro_bits: DetonateBitmap::from_bytes(bits),
        },
    })
}
