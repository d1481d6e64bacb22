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

//! # XL-series SEM driver
//!
//! A host-side driver for the proprietary framed binary protocol spoken
//! over RS-232 by Philips/FEI XL-series scanning electron microscopes
//! (XL20/XL30/XL40). The host sends opcoded commands and receives
//! structured replies that drive high tension, vacuum, detector
//! selection, stage motion, imaging parameters, image capture, and beam
//! control.
//!
//! The crate is organized leaf-first:
//!
//! - [`transport`]: byte-level serial port adapter.
//! - [`frame`]: the `[SYNC, LEN, OP, STATUS, PAYLOAD.., CKSUM]` wire framing.
//! - [`payload`]: 4-byte-slot argument packing and reply decoding.
//! - [`capability`]: enumerated modes, the detector/detector-type
//!   catalogues, and the configured capability ranges.
//! - [`reliability`]: the retry-with-reconnect wrapper every operation runs
//!   under.
//! - [`session`]: connection lifecycle and the handshake run on every
//!   (re)connect.
//! - [`ops`]: the typed operation surface, one pair of methods per opcode.
//! - [`ports`]: serial port enumeration, used by the CLI to help an
//!   operator pick a `--port`.
//! - [`error`]: the error taxonomy shared by every fallible call.
//!
//! The filesystem on the microscope's embedded control PC, which stores
//! TIFFs written by [`ops`]'s `write_tiff_image`, is retrieved out of band
//! over SMB; this crate never touches it.

pub mod capability;
pub mod constants;
pub mod error;
pub mod frame;
pub mod ops;
pub mod payload;
pub mod ports;
pub mod reliability;
pub mod session;
pub mod transport;

pub use capability::{
    CapabilityRanges, DetectorInfo, DetectorSupport, DetectorTypeInfo, ImageFilterMode, LineTime,
    LinesPerFrame, MachineType, ScanMode, SpecimenCurrentDetectorMode, DETECTOR_CATALOGUE,
    DETECTOR_TYPES,
};
pub use error::{Error, Result};
pub use frame::Reply;
pub use ops::{BeamShift, DetectorReading, Stigmator, StagePosition, TiffOptions};
pub use reliability::Policy;
pub use session::{Config, IdInfo, Microscope};
