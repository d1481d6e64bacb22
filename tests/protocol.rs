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

//! Integration tests against the parts of the crate reachable from
//! outside it: the wire codec, the payload codec, and session
//! construction over [`MockPort`].
//!
//! The typed operation surface in `ops` only grows retrying public
//! methods on `Microscope<serial::SystemPort>`, since reconnecting needs
//! a port name a generic `Microscope<P>` doesn't carry — so these tests
//! exercise the codec and lifecycle layers directly rather than calling
//! device operations through a mock port.

use xlsem::frame::{self, Reply};
use xlsem::payload::{self, Slot};
use xlsem::transport::mock::MockPort;
use xlsem::{CapabilityRanges, Config, Microscope};

fn decode_reply(bytes: &[u8]) -> Result<Option<Reply>, xlsem::Error> {
    let mut port = MockPort::with_inbound(bytes);
    frame::decode(&mut port)
}

#[test]
fn encode_then_decode_recovers_op_and_payload() {
    let payload = payload::pack_f32(&[1234.5]);
    let frame = frame::encode(0x2A, &payload).unwrap();

    let reply = decode_reply(&frame).unwrap().unwrap();
    assert_eq!(reply.op, 0x2A);
    assert!(!reply.error);
    assert_eq!(payload::decode_one_f32(&reply.payload).unwrap(), 1234.5);
}

#[test]
fn decode_rejects_a_frame_that_does_not_start_with_sync() {
    let mut frame = frame::encode(1, &[]).unwrap();
    frame[0] = 0x00;
    assert!(decode_reply(&frame).is_err());
}

#[test]
fn decode_detects_a_single_bit_checksum_flip() {
    let mut frame = frame::encode(1, &payload::pack_f32(&[3.0])).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    assert!(decode_reply(&frame).is_err());
}

#[test]
fn decode_returns_none_on_a_clean_timeout() {
    assert!(decode_reply(&[]).unwrap().is_none());
}

#[test]
fn two_u16_slots_round_trip_through_the_wire() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&3u16.to_le_bytes());
    payload.extend_from_slice(&42u16.to_le_bytes());
    let frame = frame::encode(0, &payload).unwrap();

    let reply = decode_reply(&frame).unwrap().unwrap();
    let decoded = payload::decode(&reply.payload, &[Slot::TwoU16]).unwrap();
    assert_eq!(decoded[0].as_two_u16(), (3, 42));
}

/// An error reply carries its error code in the first slot of the
/// payload, after the status byte's error bit is set.
#[test]
fn error_reply_carries_its_device_error_code() {
    let mut frame = frame::encode(5, &99u32.to_le_bytes()).unwrap();
    frame[3] = 0x01; // status error bit
    let checksum = frame[..frame.len() - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    *frame.last_mut().unwrap() = checksum;

    let reply = decode_reply(&frame).unwrap().unwrap();
    assert!(reply.error);
    assert_eq!(reply.errorcode, Some(99));
}

#[test]
fn a_session_over_a_mock_port_starts_unconnected_until_handshaken() {
    let scope = Microscope::from_port(MockPort::empty(), CapabilityRanges::xl30(), Config::default()).unwrap();
    assert!(!scope.is_connected());
    assert!(scope.machine_type().is_none());
}

#[test]
fn closing_a_session_drops_the_port() {
    let mut scope = Microscope::from_port(MockPort::empty(), CapabilityRanges::xl30(), Config::default()).unwrap();
    scope.close();
    assert!(!scope.is_connected());
}

#[test]
fn xl30_capability_ranges_cover_the_documented_bounds() {
    let caps = CapabilityRanges::xl30();
    assert!(caps.high_tension.contains(&30_000.0));
    assert!(!caps.high_tension.contains(&50_000.0));
    assert_eq!(caps.stigmator_count, 1);
}
