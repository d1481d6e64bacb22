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

//! Error taxonomy for the driver.
//!
//! Every fallible operation in this crate returns one of the variants below.
//! [`Error::is_retryable`] drives the reliability wrapper in
//! [`crate::reliability`]: communication faults are worth retrying, caller
//! mistakes are not.

use std::fmt;

/// Everything that can go wrong talking to the microscope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was attempted on a session with no live transport.
    #[error("not connected to the microscope")]
    NotConnected,

    /// The caller used the API incorrectly (bad argument shape, reentrant
    /// use of a scoped session, payload too large, etc). Never retried.
    #[error("{0}")]
    InvalidUsage(String),

    /// An argument was out of the range the device advertises. Never
    /// retried: retrying would just fail identically.
    #[error("{0}")]
    Value(String),

    /// A framing, checksum, timeout, or transport-level fault. Retried by
    /// the reliability wrapper.
    #[error("communication error: {0}")]
    Communication(String),

    /// The device accepted the frame but reported an error status for the
    /// opcode. Carries the raw 32-bit device error code.
    #[error("device rejected opcode {op:#04X} with error code {code:#010X}")]
    DeviceError { op: u8, code: u32 },

    /// A lower-level I/O failure from the serial port itself, distinct
    /// from a protocol-level communication fault. Retried.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether the reliability wrapper should retry a call that failed
    /// with this error: communication and I/O faults are worth another
    /// attempt, caller mistakes and device refusals are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Communication(_) | Error::Io(_) | Error::NotConnected
        )
    }

    pub(crate) fn invalid_usage(msg: impl Into<String>) -> Self {
        Error::InvalidUsage(msg.into())
    }

    pub(crate) fn value(msg: impl fmt::Display) -> Self {
        Error::Value(msg.to_string())
    }

    pub(crate) fn communication(msg: impl fmt::Display) -> Self {
        Error::Communication(msg.to_string())
    }

    pub(crate) fn io(msg: impl fmt::Display) -> Self {
        Error::Io(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
