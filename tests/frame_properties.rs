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

//! Property tests for the wire codec's universal invariants: whatever
//! `encode` builds, `decode` must read back unchanged, and a single
//! flipped byte anywhere in the checksum must be caught.

use proptest::prelude::*;

use xlsem::frame;
use xlsem::transport::mock::MockPort;

fn decode_bytes(bytes: &[u8]) -> Result<Option<frame::Reply>, xlsem::Error> {
    let mut port = MockPort::with_inbound(bytes);
    frame::decode(&mut port)
}

proptest! {
    #[test]
    fn encode_decode_round_trips(op in any::<u8>(), payload in prop::collection::vec(any::<u8>(), 0..=250)) {
        let frame = frame::encode(op, &payload).unwrap();
        let reply = decode_bytes(&frame).unwrap().unwrap();

        prop_assert_eq!(reply.op, op);
        prop_assert!(!reply.error);
        prop_assert_eq!(reply.payload, payload);
    }

    #[test]
    fn payloads_past_the_limit_are_always_rejected(
        op in any::<u8>(),
        extra in 1usize..=16,
    ) {
        let payload = vec![0u8; 250 + extra];
        prop_assert!(frame::encode(op, &payload).is_err());
    }

    #[test]
    fn flipping_any_payload_or_checksum_byte_is_caught(
        op in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 1..=32),
        flip_index in 0usize..32,
    ) {
        // Indices 0 and 1 (sync and length) are excluded: flipping the
        // length byte changes how many bytes `decode` reads and would
        // make this test's own math about the "true" checksum unsound,
        // not the decoder's. Status, payload, and checksum bytes are all
        // covered, which is the part the checksum is meant to protect.
        let mut frame = frame::encode(op, &payload).unwrap();
        let flip_index = 2 + flip_index % (frame.len() - 2);
        frame[flip_index] ^= 0x01;
        prop_assert!(decode_bytes(&frame).is_err());
    }
}
