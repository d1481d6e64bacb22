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

//! The byte-level transport adapter.
//!
//! [`Transport`] is implemented for every `serial::SerialPort`, so the
//! protocol engine in [`crate::session`] and [`crate::ops`] is generic
//! over the real `serial::SystemPort` and over an in-memory mock used in
//! tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use serial::SerialPort;

use crate::error::Error;

/// Default read timeout applied when a port is opened.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Byte-level operations the frame codec needs from a serial port.
pub trait Transport {
    /// Fill `buf` with bytes read under the port's current timeout.
    ///
    /// Returns the number of bytes actually read. A return of `0` means
    /// the timeout elapsed before any byte arrived; a return strictly
    /// between `0` and `buf.len()` means the timeout elapsed mid-read.
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error>;

    fn timeout(&self) -> Duration;
}

impl<P: SerialPort> Transport for P {
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match Read::read(self, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        Write::write_all(self, data)?;
        Write::flush(self)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        SerialPort::set_timeout(self, timeout)
            .map_err(|e| Error::communication(format!("failed to set port timeout: {e}")))
    }

    fn timeout(&self) -> Duration {
        SerialPort::timeout(self)
    }
}

/// The port settings every XL-series machine expects: 9600 baud, 8 data
/// bits, no parity, 1 stop bit, no flow control.
pub fn port_settings() -> serial::PortSettings {
    serial::PortSettings {
        baud_rate: serial::BaudRate::Baud9600,
        char_size: serial::CharSize::Bits8,
        parity: serial::Parity::ParityNone,
        stop_bits: serial::StopBits::Stop1,
        flow_control: serial::FlowControl::FlowNone,
    }
}

/// Open `port_name`, configure it, and drain any bytes left over from a
/// previous session before handing it back.
pub fn open(port_name: &str) -> Result<serial::SystemPort, Error> {
    let mut port = serial::SystemPort::open(port_name)
        .map_err(|e| Error::communication(format!("couldn't open serial port `{port_name}`: {e}")))?;

    port.configure(&port_settings())
        .map_err(|e| Error::communication(format!("couldn't configure serial port `{port_name}`: {e}")))?;
    Transport::set_timeout(&mut port, DEFAULT_TIMEOUT)?;

    drain(&mut port)?;

    Ok(port)
}

/// Read and discard bytes under a short timeout until none remain.
fn drain<T: Transport>(transport: &mut T) -> Result<(), Error> {
    let prior = transport.timeout();
    transport.set_timeout(Duration::from_secs(1))?;

    let mut buf = [0u8; 64];
    loop {
        let n = transport.read_buf(&mut buf)?;
        if n == 0 {
            break;
        }
        log::debug!("drained {n} stale byte(s) from the port");
    }

    transport.set_timeout(prior)?;
    Ok(())
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory serial port used by unit and integration tests.
    //!
    //! Public only behind `test-util` (auto-enabled for `cargo test` via a
    //! dev-dependency on this crate itself) so integration tests under
    //! `tests/` can drive [`crate::session::Microscope`] without a real
    //! serial port, without leaking a mock into normal library consumers.

    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use serial::{Result as SerialResult, SerialPort};

    /// A loopback-free mock port: bytes written by the test are never read
    /// back; `inbound` is drained by reads, `outbound` collects writes.
    pub struct MockPort {
        pub inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
        timeout: Duration,
    }

    impl MockPort {
        pub fn with_inbound(bytes: &[u8]) -> Self {
            MockPort {
                inbound: bytes.iter().copied().collect(),
                outbound: Vec::new(),
                timeout: Duration::from_secs(60),
            }
        }

        pub fn empty() -> Self {
            Self::with_inbound(&[])
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbound.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "mock port timed out"));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialPort for MockPort {
        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn set_timeout(&mut self, timeout: Duration) -> SerialResult<()> {
            self.timeout = timeout;
            Ok(())
        }

        fn configure(&mut self, _settings: &serial::PortSettings) -> SerialResult<()> {
            Ok(())
        }

        fn reconfigure(
            &mut self,
            _setup: &dyn Fn(&mut dyn serial::SerialPortSettings) -> SerialResult<()>,
        ) -> SerialResult<()> {
            Ok(())
        }

        fn set_rts(&mut self, _level: bool) -> SerialResult<()> {
            Ok(())
        }

        fn set_dtr(&mut self, _level: bool) -> SerialResult<()> {
            Ok(())
        }

        fn read_cts(&mut self) -> SerialResult<bool> {
            Ok(false)
        }

        fn read_dsr(&mut self) -> SerialResult<bool> {
            Ok(false)
        }

        fn read_ri(&mut self) -> SerialResult<bool> {
            Ok(false)
        }

        fn read_cd(&mut self) -> SerialResult<bool> {
            Ok(false)
        }
    }
}
