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

//! Frame encoding and decoding: `[SYNC, LEN, OP, STATUS, PAYLOAD.., CKSUM]`.

use crate::constants::{MAX_PAYLOAD_LEN, STATUS_ERROR_BIT, STATUS_FAULT_MASK, SYNC};
use crate::error::Error;
use crate::transport::Transport;

/// A decoded reply frame.
#[derive(Debug, Clone)]
pub struct Reply {
    pub op: u8,
    pub status: u8,
    pub error: bool,
    pub errorcode: Option<u32>,
    pub payload: Vec<u8>,
}

/// Build a request frame for `op` carrying `payload`.
///
/// `op` is already constrained to `0..=255` by its type, so there is
/// nothing to validate there beyond the payload length.
pub fn encode(op: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::invalid_usage(format!(
            "payload of {} bytes exceeds the {}-byte limit",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let len = payload.len() as u8 + 5;
    let mut frame = Vec::with_capacity(len as usize);
    frame.push(SYNC);
    frame.push(len);
    frame.push(op);
    frame.push(0x00);
    frame.extend_from_slice(payload);

    let checksum = frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame.push(checksum);

    Ok(frame)
}

/// Read and decode one reply frame from `transport`.
///
/// Returns `Ok(None)` on a clean timeout (no bytes at all arrived before
/// the port's read timeout elapsed) rather than treating it as an error;
/// callers that require a reply turn that into [`Error::Communication`].
pub fn decode<T: Transport>(transport: &mut T) -> Result<Option<Reply>, Error> {
    let mut header = [0u8; 2];
    let got = transport.read_buf(&mut header)?;
    if got == 0 {
        log::warn!("timed out waiting for a reply header");
        return Ok(None);
    }
    if got == 1 {
        log::warn!("reply header truncated to 1 byte before timeout");
        return Ok(None);
    }

    if header[0] != SYNC {
        return Err(Error::communication(format!(
            "expected sync byte {:#04X}, got {:#04X}",
            SYNC, header[0]
        )));
    }

    let len = header[1];
    if len < 5 {
        return Err(Error::communication(format!(
            "reply claims a length of {len} bytes, which is too short to hold a header and checksum"
        )));
    }

    let mut rest = vec![0u8; len as usize - 2];
    let got = transport.read_buf(&mut rest)?;
    if got != rest.len() {
        return Err(Error::communication(format!(
            "reply body truncated: expected {} bytes, got {got}",
            rest.len()
        )));
    }

    let mut frame = Vec::with_capacity(len as usize);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&rest);

    let expected_checksum = frame[..frame.len() - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    let actual_checksum = *frame.last().unwrap();
    if expected_checksum != actual_checksum {
        return Err(Error::communication(format!(
            "checksum mismatch: computed {expected_checksum:#04X}, frame carries {actual_checksum:#04X}"
        )));
    }

    let op = frame[2];
    let status = frame[3];
    if status & STATUS_FAULT_MASK != 0 {
        return Err(Error::communication(format!(
            "reply to opcode {op:#04X} set transport fault bits in status {status:#04X}"
        )));
    }

    let error = status & STATUS_ERROR_BIT != 0;
    let payload = frame[4..frame.len() - 1].to_vec();

    let errorcode = if error {
        if payload.len() < 4 {
            return Err(Error::communication(format!(
                "error reply to opcode {op:#04X} is missing its 4-byte error code"
            )));
        }
        Some(u32::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]))
    } else {
        None
    };

    Ok(Some(Reply {
        op,
        status,
        error,
        errorcode,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_computes_checksum() {
        let frame = encode(0, &[0, 0, 0, 0]).unwrap();
        assert_eq!(frame[0], SYNC);
        assert_eq!(frame[1], 9);
        assert_eq!(frame[2], 0);
        assert_eq!(frame[3], 0x00);
        let checksum = frame[..frame.len() - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(*frame.last().unwrap(), checksum);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode(0, &payload),
            Err(Error::InvalidUsage(_))
        ));
    }
}
