// Copyright 2024 SEM Driver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Payload packing and unpacking.
//!
//! Payloads are sequences of 4-byte slots. A slot's shape is a typed enum
//! rather than a runtime format code, so a malformed slot can't be
//! assembled at all.

use crate::constants::SLOT_SIZE;
use crate::error::Error;

/// The shape of one 4-byte payload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// An opaque 4-byte blob.
    Blob4,
    /// Two little-endian `u16` values packed into one slot.
    TwoU16,
    /// One little-endian IEEE-754 `f32`.
    F32,
}

/// One decoded slot, tagged with the [`Slot`] shape that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    Blob4([u8; 4]),
    TwoU16(u16, u16),
    F32(f32),
}

impl Decoded {
    /// # Panics
    /// If this slot was not decoded as [`Slot::F32`]. Callers control the
    /// format they asked for, so a mismatch here is a logic error in this
    /// crate, not something a caller can trigger.
    pub fn as_f32(&self) -> f32 {
        match self {
            Decoded::F32(v) => *v,
            other => panic!("slot decoded as {other:?}, not F32"),
        }
    }

    /// # Panics
    /// See [`Decoded::as_f32`].
    pub fn as_two_u16(&self) -> (u16, u16) {
        match self {
            Decoded::TwoU16(a, b) => (*a, *b),
            other => panic!("slot decoded as {other:?}, not TwoU16"),
        }
    }

    /// # Panics
    /// See [`Decoded::as_f32`].
    pub fn as_blob4(&self) -> [u8; 4] {
        match self {
            Decoded::Blob4(b) => *b,
            other => panic!("slot decoded as {other:?}, not Blob4"),
        }
    }
}

/// Pack a list of `f32` values into little-endian slots, one value per slot.
pub fn pack_f32(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * SLOT_SIZE);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// `slots` zero-filled 4-byte slots, used for requests that only read a
/// reply and carry no meaningful argument data.
pub fn fill_zeros(slots: usize) -> Vec<u8> {
    vec![0u8; slots * SLOT_SIZE]
}

/// Pack one byte per slot's low byte, zero-filling the rest of each slot.
/// Used for single-byte arguments such as a detector id or scan mode that
/// the wire format still carries in a full 4-byte slot.
pub fn pack_byte_slot(b: u8) -> [u8; 4] {
    [b, 0, 0, 0]
}

/// ASCII-encode `text`, append a NUL terminator, and zero-pad to the next
/// multiple of 4 bytes.
pub fn pack_ascii_padded(text: &str) -> Result<Vec<u8>, Error> {
    if !text.is_ascii() {
        return Err(Error::invalid_usage(
            "text must be ASCII to be sent to the microscope",
        ));
    }
    let mut out = text.as_bytes().to_vec();
    out.push(0);
    while out.len() % SLOT_SIZE != 0 {
        out.push(0);
    }
    Ok(out)
}

/// Decode `payload` into one [`Decoded`] value per entry of `fmt`.
pub fn decode(payload: &[u8], fmt: &[Slot]) -> Result<Vec<Decoded>, Error> {
    let needed = fmt.len() * SLOT_SIZE;
    if payload.len() < needed {
        return Err(Error::communication(format!(
            "expected at least {needed} payload bytes for format {fmt:?}, got {}",
            payload.len()
        )));
    }

    let mut out = Vec::with_capacity(fmt.len());
    for (i, slot) in fmt.iter().enumerate() {
        let chunk = &payload[i * SLOT_SIZE..i * SLOT_SIZE + SLOT_SIZE];
        out.push(match slot {
            Slot::Blob4 => Decoded::Blob4(chunk.try_into().unwrap()),
            Slot::TwoU16 => Decoded::TwoU16(
                u16::from_le_bytes([chunk[0], chunk[1]]),
                u16::from_le_bytes([chunk[2], chunk[3]]),
            ),
            Slot::F32 => Decoded::F32(f32::from_le_bytes(chunk.try_into().unwrap())),
        });
    }
    Ok(out)
}

/// Convenience wrapper for the common case of a single `f32` slot.
pub fn decode_one_f32(payload: &[u8]) -> Result<f32, Error> {
    Ok(decode(payload, &[Slot::F32])?[0].as_f32())
}

/// Convenience wrapper for the common case of a single two-`u16` slot.
pub fn decode_one_two_u16(payload: &[u8]) -> Result<(u16, u16), Error> {
    Ok(decode(payload, &[Slot::TwoU16])?[0].as_two_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_round_trips() {
        let packed = pack_f32(&[1.5, -2.25]);
        let decoded = decode(&packed, &[Slot::F32, Slot::F32]).unwrap();
        assert_eq!(decoded[0].as_f32(), 1.5);
        assert_eq!(decoded[1].as_f32(), -2.25);
    }

    #[test]
    fn two_u16_round_trips() {
        let mut bytes = 7u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        let decoded = decode(&bytes, &[Slot::TwoU16]).unwrap();
        assert_eq!(decoded[0].as_two_u16(), (7, 3));
    }

    #[test]
    fn ascii_padding_reaches_a_multiple_of_four() {
        let packed = pack_ascii_padded("abc").unwrap();
        assert_eq!(packed.len() % 4, 0);
        assert_eq!(&packed[..3], b"abc");
        assert_eq!(packed[3], 0);
    }

    #[test]
    fn decode_rejects_short_payload() {
        assert!(decode(&[0u8; 3], &[Slot::F32]).is_err());
    }
}
