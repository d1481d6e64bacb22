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

//! Session construction, connection lifecycle, and the handshake run on
//! every (re)connect.

use std::time::Duration;

use serial::SerialPort;

use crate::capability::{CapabilityRanges, DetectorSupport, MachineType};
use crate::error::Error;
use crate::frame::Reply;
use crate::reliability::Policy;
use crate::transport::{self, Transport};

/// Construction-time knobs covering retry/reconnect behavior and
/// whether to autodetect attached detectors on connect.
#[derive(Debug, Clone)]
pub struct Config {
    pub policy: Policy,
    pub detectors_autodetect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            policy: Policy::default(),
            detectors_autodetect: false,
        }
    }
}

/// Identity reported by `get_id` (opcode 0).
#[derive(Debug, Clone, Copy)]
pub struct IdInfo {
    pub machine_type: MachineType,
    pub serial: u16,
}

/// Everything learned about the connected machine, populated by the
/// initial handshake and (for detectors) the optional auto-probe.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceState {
    pub machine_type: Option<MachineType>,
    pub machine_serial: Option<u16>,
    pub detectors: DetectorSupport,
}

/// A session talking to one XL-series microscope over one serial port.
///
/// Generic over the transport so the protocol engine can be exercised
/// against an in-memory mock in tests; the concrete, name-owning
/// constructor and reconnect logic are only available for
/// `Microscope<serial::SystemPort>`, since only a named port can be
/// reopened.
pub struct Microscope<P = serial::SystemPort> {
    pub(crate) port_name: Option<String>,
    pub(crate) port: Option<P>,
    pub(crate) capability: CapabilityRanges,
    pub(crate) config: Config,
    pub(crate) state: DeviceState,
    in_scoped_use: bool,
}

impl<P: SerialPort> Microscope<P> {
    /// Wrap an already-open port. The session does not own it in the
    /// sense of being able to reopen it by name; closing it is still the
    /// session's responsibility.
    pub fn from_port(port: P, capability: CapabilityRanges, config: Config) -> Result<Self, Error> {
        capability.validate()?;
        Ok(Microscope {
            port_name: None,
            port: Some(port),
            capability,
            config,
            state: DeviceState::default(),
            in_scoped_use: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn machine_type(&self) -> Option<MachineType> {
        self.state.machine_type
    }

    pub fn machine_serial(&self) -> Option<u16> {
        self.state.machine_serial
    }

    pub fn capability(&self) -> &CapabilityRanges {
        &self.capability
    }

    /// Run the caller's closure with a connected session, opening the
    /// port first if it is owned and not yet open, and always closing it
    /// again on the way out. Reentrant use is a caller error.
    pub fn with_context<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error>
    where
        Self: Openable,
    {
        if self.in_scoped_use {
            return Err(Error::invalid_usage(
                "with_context called while already inside a scoped use of this session",
            ));
        }
        self.in_scoped_use = true;

        let opened_here = if !self.is_connected() {
            Openable::open(self)?;
            true
        } else {
            false
        };

        let result = f(self);

        if opened_here {
            self.close();
        }
        self.in_scoped_use = false;
        result
    }

    /// Release the port. Idempotent.
    pub fn close(&mut self) {
        self.port = None;
    }

    pub(crate) fn require_port(&mut self) -> Result<&mut P, Error> {
        self.port.as_mut().ok_or(Error::NotConnected)
    }

    pub(crate) fn send(&mut self, op: u8, payload: &[u8]) -> Result<(), Error> {
        let frame = crate::frame::encode(op, payload)?;
        log::debug!("TX op {op:#04X}: {frame:02X?}");
        self.require_port()?.write_all(&frame)
    }

    pub(crate) fn recv(&mut self) -> Result<Reply, Error> {
        let port = self.require_port()?;
        match crate::frame::decode(port)? {
            Some(reply) => {
                log::debug!("RX: {reply:?}");
                Ok(reply)
            }
            None => Err(Error::communication("no reply received before the port timed out")),
        }
    }

    /// Run `f` with the port's read timeout temporarily overridden,
    /// restoring the prior timeout afterward regardless of outcome.
    pub(crate) fn with_timeout<T>(
        &mut self,
        timeout: Duration,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let prior = self.require_port()?.timeout();
        self.require_port()?.set_timeout(timeout)?;
        let result = f(self);
        if let Some(port) = self.port.as_mut() {
            let _ = port.set_timeout(prior);
        }
        result
    }

    /// Drain stale bytes, query identity, and optionally auto-probe the
    /// detector catalogue. Run after every (re)connect.
    pub(crate) fn handshake(&mut self) -> Result<(), Error> {
        let id = self.get_id_once()?;
        self.state.machine_type = Some(id.machine_type);
        self.state.machine_serial = Some(id.serial);
        log::info!(
            "connected to {:?} serial #{}",
            id.machine_type,
            id.serial
        );

        if self.config.detectors_autodetect {
            self.autodetect_detectors();
        }
        Ok(())
    }

    fn autodetect_detectors(&mut self) {
        for entry in crate::capability::DETECTOR_CATALOGUE {
            match entry.detector_type {
                None | Some(4) => continue,
                _ => {}
            }
            let outcome = self.set_detector_once(entry.id).is_ok();
            self.state.detectors.mark(entry.id, outcome);
        }
    }
}

/// Marker trait implemented only for the concrete `SystemPort` session,
/// since only a named port can be (re)opened.
pub trait Openable {
    fn open(&mut self) -> Result<(), Error>;
}

impl Microscope<serial::SystemPort> {
    /// Construct a session that owns `port_name` and will open it lazily
    /// on first use (via `connect` or `with_context`).
    pub fn new(
        port_name: impl Into<String>,
        capability: CapabilityRanges,
        config: Config,
    ) -> Result<Self, Error> {
        capability.validate()?;
        Ok(Microscope {
            port_name: Some(port_name.into()),
            port: None,
            capability,
            config,
            state: DeviceState::default(),
            in_scoped_use: false,
        })
    }

    /// Open the port (if not already open) and run the handshake.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.port.is_some() {
            return Ok(());
        }
        Openable::open(self)
    }

    pub fn disconnect(&mut self) {
        self.close();
    }

    /// Close, wait, and reopen the port, rerunning the handshake.
    /// Returns success/failure without raising: a failed reconnect is
    /// not itself an error, it just means the next attempt of the
    /// calling operation will also fail.
    pub(crate) fn reconnect(&mut self) -> bool {
        self.close();
        std::thread::sleep(self.config.policy.reconnect_delay);
        Openable::open(self).is_ok()
    }
}

impl Openable for Microscope<serial::SystemPort> {
    fn open(&mut self) -> Result<(), Error> {
        let name = self
            .port_name
            .as_ref()
            .ok_or_else(|| Error::invalid_usage("session has no port name to open"))?;
        let port = transport::open(name)?;
        self.port = Some(port);
        self.handshake()
    }
}

impl<P> Drop for Microscope<P> {
    fn drop(&mut self) {
        // Dropping `port` here guarantees release on every exit path,
        // including panics.
        self.port = None;
    }
}
