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

//! The typed operation surface: one pair of methods per opcode (a
//! generic, retry-free `*_once` that talks to any [`Transport`], and a
//! public method on `Microscope<serial::SystemPort>` that runs it under
//! [`crate::reliability`]).
//!
//! Range and membership checks against [`crate::capability::CapabilityRanges`]
//! happen in the public wrapper, before a frame is ever built; the `*_once`
//! layer trusts its caller and leaves the raw wire calls unchecked.

use std::time::Duration;

use serial::SerialPort;

use crate::capability::{
    ImageFilterMode, LineTime, LinesPerFrame, MachineType, ScanMode, SpecimenCurrentDetectorMode,
    HIGH_TENSION_ABSOLUTE,
};
use crate::constants::*;
use crate::error::Error;
use crate::payload::{self, Slot};
use crate::reliability;
use crate::session::{IdInfo, Microscope};

/// Stage axes as reported by / sent to opcode 190 and the 177/179/187/189
/// setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub tilt: f32,
    pub rot: f32,
}

/// Beam shift, opcodes 80/81.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamShift {
    pub x: f32,
    pub y: f32,
}

/// Stigmator correction, opcodes 70/71.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stigmator {
    pub x: f32,
    pub y: f32,
}

/// The detector id and type code returned by `get_detector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorReading {
    pub id: u16,
    pub detector_type: u16,
}

/// Flags accepted by `write_tiff_image`, opcode 84.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffOptions {
    pub print_magnification: bool,
    pub graphics_bitplane: bool,
    pub databar: bool,
    pub overwrite: bool,
}

// --- Generic, retry-free wire calls -------------------------------------
//
// Everything in this block works against any `Transport`, including the
// mock port, so it is exercised directly in this module's unit tests
// without a real serial line. None of it retries or reconnects; that is
// layered on in the next block.
impl<P: SerialPort> Microscope<P> {
    pub(crate) fn get_id_once(&mut self) -> Result<IdInfo, Error> {
        self.send(OP_GET_ID, &payload::fill_zeros(1))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_GET_ID, code: reply.errorcode.unwrap_or(0) });
        }
        let (raw_type, serial) = payload::decode_one_two_u16(&reply.payload)?;
        let machine_type = MachineType::from_wire(raw_type)
            .ok_or_else(|| Error::communication(format!("unknown machine type code {raw_type}")))?;
        Ok(IdInfo { machine_type, serial })
    }

    fn get_f32_once(&mut self, op: u8) -> Result<f32, Error> {
        self.send(op, &payload::fill_zeros(1))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op, code: reply.errorcode.unwrap_or(0) });
        }
        payload::decode_one_f32(&reply.payload)
    }

    fn set_f32_once(&mut self, op: u8, value: f32) -> Result<(), Error> {
        self.send(op, &payload::pack_f32(&[value]))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn get_two_u16_once(&mut self, op: u8) -> Result<(u16, u16), Error> {
        self.send(op, &payload::fill_zeros(1))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op, code: reply.errorcode.unwrap_or(0) });
        }
        payload::decode_one_two_u16(&reply.payload)
    }

    fn set_u16_once(&mut self, op: u8, value: u16) -> Result<(), Error> {
        let mut slot = [0u8; 4];
        slot[..2].copy_from_slice(&value.to_le_bytes());
        self.send(op, &slot)?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn set_byte_once(&mut self, op: u8, value: u8) -> Result<(), Error> {
        self.send(op, &payload::pack_byte_slot(value))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn vent_pump_once(&mut self, action: u8) -> Result<(), Error> {
        self.send(OP_VENT_PUMP, &payload::pack_byte_slot(action))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_VENT_PUMP, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn set_hightension_once(&mut self, ht: f32) -> Result<bool, Error> {
        if ht == 0.0 {
            self.send(OP_SET_HT_ENABLED, &payload::pack_byte_slot(0))?;
            let reply = self.recv()?;
            return Ok(!reply.error);
        }

        self.send(OP_SET_HT_ENABLED, &payload::pack_byte_slot(1))?;
        let reply = self.recv()?;
        if reply.error {
            log::warn!("device refused to enable high tension");
            return Ok(false);
        }

        if let Err(e) = self.set_f32_once(OP_SET_HT_VALUE, ht) {
            log::warn!("device refused the high tension target, disabling: {e}");
            self.send(OP_SET_HT_ENABLED, &payload::pack_byte_slot(0))?;
            self.recv()?;
            return Ok(false);
        }

        // Poll until the reported value settles within 100V of the
        // target, or give up after 90s. Timing out here is raised as an
        // I/O fault so the retry/reconnect wrapper gets a chance to try
        // again.
        for _ in 0..180 {
            std::thread::sleep(Duration::from_millis(500));
            let current = self.get_f32_once(OP_GET_HT_VALUE)?;
            if (current - ht).abs() < 100.0 {
                return Ok(true);
            }
        }
        Err(Error::io(format!(
            "high tension did not settle near {ht}V within 90s"
        )))
    }

    fn get_detector_once(&mut self) -> Result<DetectorReading, Error> {
        let (id, detector_type) = self.get_two_u16_once(OP_GET_DETECTOR)?;
        Ok(DetectorReading { id, detector_type })
    }

    pub(crate) fn set_detector_once(&mut self, id: u16) -> Result<bool, Error> {
        let mut slot = [0u8; 4];
        slot[..2].copy_from_slice(&id.to_le_bytes());
        self.send(OP_SET_DETECTOR, &slot)?;
        let reply = self.recv()?;
        Ok(!reply.error)
    }

    fn get_scanmode_once(&mut self) -> Result<ScanMode, Error> {
        let (raw, _) = self.get_two_u16_once(OP_GET_SCANMODE)?;
        ScanMode::from_wire(raw).ok_or_else(|| Error::communication(format!("unknown scan mode {raw}")))
    }

    fn set_scanmode_once(&mut self, mode: ScanMode) -> Result<(), Error> {
        self.set_byte_once(OP_SET_SCANMODE, mode.to_wire())
    }

    fn get_lines_per_frame_once(&mut self) -> Result<LinesPerFrame, Error> {
        let (raw, _) = self.get_two_u16_once(OP_GET_LINES_PER_FRAME)?;
        LinesPerFrame::from_wire(raw)
            .ok_or_else(|| Error::communication(format!("unknown lines-per-frame code {raw}")))
    }

    fn set_lines_per_frame_once(&mut self, value: LinesPerFrame) -> Result<(), Error> {
        self.set_u16_once(OP_SET_LINES_PER_FRAME, value.to_wire())
    }

    fn get_linetime_once(&mut self) -> Result<LineTime, Error> {
        let (raw, _) = self.get_two_u16_once(OP_LINETIME)?;
        LineTime::from_wire(raw).ok_or_else(|| Error::communication(format!("unknown line time code {raw}")))
    }

    fn set_linetime_once(&mut self, value: LineTime) -> Result<(), Error> {
        self.set_u16_once(OP_LINETIME, value.to_wire())
    }

    fn get_selected_area_size_once(&mut self) -> Result<(f32, f32), Error> {
        let x = self.get_f32_once(OP_GET_SELECTED_AREA_SIZE_X)?;
        let y = self.get_f32_once(OP_GET_SELECTED_AREA_SIZE_Y)?;
        Ok((x, y))
    }

    fn set_selected_area_size_once(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        if let Some(x) = x {
            self.set_f32_once(OP_SET_SELECTED_AREA_SIZE_X, x)?;
        }
        if let Some(y) = y {
            self.set_f32_once(OP_SET_SELECTED_AREA_SIZE_Y, y)?;
        }
        Ok(())
    }

    fn get_area_or_dot_shift_once(&mut self) -> Result<(f32, f32), Error> {
        let x = self.get_f32_once(OP_GET_AREA_OR_DOT_SHIFT_X)?;
        let y = self.get_f32_once(OP_GET_AREA_OR_DOT_SHIFT_Y)?;
        Ok((x, y))
    }

    fn set_area_or_dot_shift_once(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        if let Some(x) = x {
            self.set_f32_once(OP_SET_AREA_OR_DOT_SHIFT_X, x)?;
        }
        if let Some(y) = y {
            self.set_f32_once(OP_SET_AREA_OR_DOT_SHIFT_Y, y)?;
        }
        Ok(())
    }

    fn make_photo_once(&mut self) -> Result<(), Error> {
        self.send(OP_MAKE_PHOTO, &[])?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_MAKE_PHOTO, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn is_oplocked_once(&mut self) -> Result<bool, Error> {
        let (v, _) = self.get_two_u16_once(OP_IS_OPLOCKED)?;
        Ok(v != 0)
    }

    fn auto_contrastbrightness_once(&mut self) -> Result<(), Error> {
        self.send(OP_AUTO_CONTRASTBRIGHTNESS, &[])?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError {
                op: OP_AUTO_CONTRASTBRIGHTNESS,
                code: reply.errorcode.unwrap_or(0),
            });
        }
        // The device keeps adjusting for a while after acking the
        // request; there is no "done" signal on the wire, so wait out a
        // fixed 30s instead of polling for one.
        std::thread::sleep(Duration::from_secs(30));
        Ok(())
    }

    fn auto_focus_once(&mut self) -> Result<(), Error> {
        self.with_timeout(Duration::from_secs(240), |dev| {
            dev.send(OP_AUTO_FOCUS, &[])?;
            let reply = dev.recv()?;
            if reply.error {
                return Err(Error::DeviceError { op: OP_AUTO_FOCUS, code: reply.errorcode.unwrap_or(0) });
            }
            Ok(())
        })
    }

    fn get_specimen_current_detector_mode_once(&mut self) -> Result<SpecimenCurrentDetectorMode, Error> {
        let (raw, _) = self.get_two_u16_once(OP_GET_SPECIMEN_CURRENT_DETECTOR_MODE)?;
        SpecimenCurrentDetectorMode::from_wire(raw)
            .ok_or_else(|| Error::communication(format!("unknown specimen current detector mode {raw}")))
    }

    fn is_beam_blanked_once(&mut self) -> Result<bool, Error> {
        let (v, _) = self.get_two_u16_once(OP_IS_BEAM_BLANKED)?;
        Ok(v != 0)
    }

    fn get_stigmator_once(&mut self) -> Result<Stigmator, Error> {
        self.send(OP_GET_STIGMATOR, &payload::fill_zeros(2))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_GET_STIGMATOR, code: reply.errorcode.unwrap_or(0) });
        }
        let decoded = payload::decode(&reply.payload, &[Slot::F32, Slot::F32])?;
        Ok(Stigmator { x: decoded[0].as_f32(), y: decoded[1].as_f32() })
    }

    fn set_stigmator_once(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        let current = if x.is_none() || y.is_none() {
            Some(self.get_stigmator_once()?)
        } else {
            None
        };
        let x = x.unwrap_or_else(|| current.unwrap().x);
        let y = y.unwrap_or_else(|| current.unwrap().y);
        self.send(OP_SET_STIGMATOR, &payload::pack_f32(&[x, y]))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_SET_STIGMATOR, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn get_imagefilter_mode_once(&mut self) -> Result<(ImageFilterMode, u32), Error> {
        let (mode_raw, frames_log2) = self.get_two_u16_once(OP_GET_IMAGEFILTER_MODE)?;
        let mode = ImageFilterMode::from_wire(mode_raw)
            .ok_or_else(|| Error::communication(format!("unknown image filter mode {mode_raw}")))?;
        Ok((mode, 1u32 << frames_log2))
    }

    fn set_imagefilter_mode_once(&mut self, mode: ImageFilterMode, log2_frames: u16) -> Result<(), Error> {
        let slot = [mode.to_wire(), log2_frames as u8, 0, 0];
        self.send(OP_SET_IMAGEFILTER_MODE, &slot)?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError {
                op: OP_SET_IMAGEFILTER_MODE,
                code: reply.errorcode.unwrap_or(0),
            });
        }
        Ok(())
    }

    fn get_beamshift_once(&mut self) -> Result<BeamShift, Error> {
        self.send(OP_GET_BEAMSHIFT, &payload::fill_zeros(2))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_GET_BEAMSHIFT, code: reply.errorcode.unwrap_or(0) });
        }
        let decoded = payload::decode(&reply.payload, &[Slot::F32, Slot::F32])?;
        Ok(BeamShift { x: decoded[0].as_f32(), y: decoded[1].as_f32() })
    }

    fn set_beamshift_once(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        let current = if x.is_none() || y.is_none() {
            Some(self.get_beamshift_once()?)
        } else {
            None
        };
        let x = x.unwrap_or_else(|| current.unwrap().x);
        let y = y.unwrap_or_else(|| current.unwrap().y);
        self.send(OP_SET_BEAMSHIFT, &payload::pack_f32(&[x, y]))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_SET_BEAMSHIFT, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn write_tiff_image_once(&mut self, filename_slots: &[u8], flag_low: u8, flag_high: u8) -> Result<(), Error> {
        let mut payload = vec![flag_low, flag_high, 0, 0];
        payload.extend_from_slice(filename_slots);
        self.send(OP_WRITE_TIFF_IMAGE, &payload)?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_WRITE_TIFF_IMAGE, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn set_scanrotation_once(&mut self, degrees: f32) -> Result<(), Error> {
        self.set_f32_once(OP_SET_SCANROTATION, degrees)
    }

    fn get_databar_text_once(&mut self) -> Result<String, Error> {
        self.send(OP_GET_DATABAR_TEXT, &payload::fill_zeros(11))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_GET_DATABAR_TEXT, code: reply.errorcode.unwrap_or(0) });
        }
        if reply.payload.len() < 4 {
            return Err(Error::communication("databar text reply is missing its 4-byte header"));
        }
        let text_bytes = &reply.payload[4..];
        let nul = text_bytes.iter().position(|&b| b == 0).unwrap_or(text_bytes.len());
        String::from_utf8(text_bytes[..nul].to_vec())
            .map_err(|_| Error::communication("databar text reply was not valid ASCII"))
    }

    fn set_databar_text_once(&mut self, slots: &[u8]) -> Result<(), Error> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(slots);
        self.send(OP_SET_DATABAR_TEXT, &payload)?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError { op: OP_SET_DATABAR_TEXT, code: reply.errorcode.unwrap_or(0) });
        }
        Ok(())
    }

    fn stage_home_once(&mut self) -> Result<(), Error> {
        self.with_timeout(Duration::from_secs(2 * 60 + 30 + 15), |dev| {
            dev.send(OP_STAGE_HOME, &[])?;
            let reply = dev.recv()?;
            if reply.error {
                return Err(Error::DeviceError { op: OP_STAGE_HOME, code: reply.errorcode.unwrap_or(0) });
            }
            Ok(())
        })
    }

    fn get_stage_position_once(&mut self) -> Result<StagePosition, Error> {
        self.send(OP_GET_STAGE_POSITION, &payload::fill_zeros(5))?;
        let reply = self.recv()?;
        if reply.error {
            return Err(Error::DeviceError {
                op: OP_GET_STAGE_POSITION,
                code: reply.errorcode.unwrap_or(0),
            });
        }
        let decoded = payload::decode(&reply.payload, &[Slot::F32; 5])?;
        Ok(StagePosition {
            x: decoded[0].as_f32(),
            y: decoded[1].as_f32(),
            z: decoded[2].as_f32(),
            tilt: decoded[3].as_f32(),
            rot: decoded[4].as_f32(),
        })
    }

    /// Motion order is X/Y first, then rotation, then Z — with a Z
    /// failure logged but swallowed rather than propagated — and finally
    /// tilt. No boundary checking is done here. See DESIGN.md for why
    /// this stays as-is rather than being reordered to the physically
    /// safer Z-before-tilt sequence.
    fn set_stage_position_once(
        &mut self,
        x: Option<f32>,
        y: Option<f32>,
        z: Option<f32>,
        tilt: Option<f32>,
        rot: Option<f32>,
    ) -> Result<(), Error> {
        if x.is_some() || y.is_some() {
            let current = self.get_stage_position_once()?;
            let x = x.unwrap_or(current.x);
            let y = y.unwrap_or(current.y);
            self.with_timeout(Duration::from_secs(60), |dev| {
                dev.send(OP_SET_STAGE_XY, &payload::pack_f32(&[x, y]))?;
                let reply = dev.recv()?;
                if reply.error {
                    return Err(Error::DeviceError {
                        op: OP_SET_STAGE_XY,
                        code: reply.errorcode.unwrap_or(0),
                    });
                }
                Ok(())
            })?;
        }

        if let Some(rot) = rot {
            self.set_f32_once(OP_SET_STAGE_ROTATION, rot)?;
        }

        if let Some(z) = z {
            if let Err(e) = self.set_f32_once(OP_SET_STAGE_Z, z) {
                log::warn!("setting stage Z failed, continuing anyway: {e}");
            }
        }

        if let Some(tilt) = tilt {
            self.set_f32_once(OP_SET_STAGE_TILT, tilt)?;
        }

        Ok(())
    }
}

// --- Retrying public surface --------------------------------------------
//
// Only available on the concrete, named-port session: reconnecting needs
// a port name to reopen, which `Microscope<P>` in general does not have.
impl Microscope<serial::SystemPort> {
    fn run_retried<T>(&mut self, op: impl FnMut(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let policy = self.config.policy;
        reliability::run(self, &policy, op, |dev| dev.reconnect())
    }

    pub fn get_id(&mut self) -> Result<IdInfo, Error> {
        self.run_retried(|dev| dev.get_id_once())
    }

    pub fn get_hightension(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_HT_VALUE))
    }

    pub fn is_hightension_enabled(&mut self) -> Result<bool, Error> {
        self.run_retried(|dev| {
            let (v, _) = dev.get_two_u16_once(OP_GET_HT_ENABLED)?;
            Ok(v != 0)
        })
    }

    /// Disables high tension if `ht` is `0.0`; otherwise enables it,
    /// requests the target voltage, and waits for the device to report a
    /// value within 100V of it. Returns whether the device accepted the
    /// request, not whether the beam is currently on target.
    pub fn set_hightension(&mut self, ht: f32) -> Result<bool, Error> {
        if ht != 0.0 {
            if !self.capability.high_tension.contains(&ht) {
                return Err(Error::value(format!(
                    "high tension must be 0 or within {:?}, got {ht}",
                    self.capability.high_tension
                )));
            }
            if !HIGH_TENSION_ABSOLUTE.contains(&ht) {
                return Err(Error::value(format!(
                    "high tension must be within the absolute bounds {:?}",
                    HIGH_TENSION_ABSOLUTE
                )));
            }
        }
        self.run_retried(move |dev| dev.set_hightension_once(ht))
    }

    pub fn pump(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.vent_pump_once(VENT_PUMP_PUMP))
    }

    pub fn vent(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.vent_pump_once(VENT_PUMP_VENT))
    }

    pub fn stop_vent(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.vent_pump_once(VENT_PUMP_STOP))
    }

    pub fn get_spotsize(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_SPOTSIZE))
    }

    pub fn set_spotsize(&mut self, spotsize: f32) -> Result<(), Error> {
        if !self.capability.spot_size.contains(&spotsize) {
            return Err(Error::value(format!(
                "spot size must be within {:?}",
                self.capability.spot_size
            )));
        }
        self.run_retried(move |dev| dev.set_f32_once(OP_SET_SPOTSIZE, spotsize))
    }

    pub fn get_magnification(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_MAGNIFICATION))
    }

    pub fn set_magnification(&mut self, magnification: f32) -> Result<(), Error> {
        if !self.capability.magnification.contains(&magnification) {
            return Err(Error::value(format!(
                "magnification must be within {:?}",
                self.capability.magnification
            )));
        }
        self.run_retried(move |dev| dev.set_f32_once(OP_SET_MAGNIFICATION, magnification))
    }

    pub fn get_detector(&mut self) -> Result<DetectorReading, Error> {
        self.run_retried(|dev| dev.get_detector_once())
    }

    /// Marked buggy upstream ("currently not able to reliably set the SE
    /// detector"); kept faithfully — a successful device ack here does
    /// not reliably mean the detector actually switched.
    pub fn set_detector(&mut self, id: u16) -> Result<bool, Error> {
        self.run_retried(move |dev| dev.set_detector_once(id))
    }

    pub fn get_scanmode(&mut self) -> Result<ScanMode, Error> {
        self.run_retried(|dev| dev.get_scanmode_once())
    }

    pub fn set_scanmode(&mut self, mode: ScanMode) -> Result<(), Error> {
        if !self.capability.supported_scan_modes.contains(&mode) {
            return Err(Error::value(format!(
                "scan mode {mode:?} is not supported by this device's configured capability"
            )));
        }
        self.run_retried(move |dev| dev.set_scanmode_once(mode))
    }

    pub fn get_lines_per_frame(&mut self) -> Result<LinesPerFrame, Error> {
        self.run_retried(|dev| dev.get_lines_per_frame_once())
    }

    pub fn set_lines_per_frame(&mut self, value: LinesPerFrame) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_lines_per_frame_once(value))
    }

    pub fn get_linetime(&mut self) -> Result<LineTime, Error> {
        self.run_retried(|dev| dev.get_linetime_once())
    }

    pub fn set_linetime(&mut self, value: LineTime) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_linetime_once(value))
    }

    pub fn get_selected_area_size(&mut self) -> Result<(f32, f32), Error> {
        self.run_retried(|dev| dev.get_selected_area_size_once())
    }

    pub fn set_selected_area_size(&mut self, sizex: Option<f32>, sizey: Option<f32>) -> Result<(), Error> {
        let range = 0.0..=100.0;
        if let Some(x) = sizex {
            if !range.contains(&x) {
                return Err(Error::value("selected area size x must be within 0..=100"));
            }
        }
        if let Some(y) = sizey {
            if !range.contains(&y) {
                return Err(Error::value("selected area size y must be within 0..=100"));
            }
        }
        self.run_retried(move |dev| dev.set_selected_area_size_once(sizex, sizey))
    }

    pub fn get_area_or_dot_shift(&mut self) -> Result<(f32, f32), Error> {
        self.run_retried(|dev| dev.get_area_or_dot_shift_once())
    }

    pub fn set_area_or_dot_shift(&mut self, xshift: Option<f32>, yshift: Option<f32>) -> Result<(), Error> {
        let range = -100.0..=100.0;
        if let Some(x) = xshift {
            if !range.contains(&x) {
                return Err(Error::value("x shift must be within -100..=100"));
            }
        }
        if let Some(y) = yshift {
            if !range.contains(&y) {
                return Err(Error::value("y shift must be within -100..=100"));
            }
        }
        self.run_retried(move |dev| dev.set_area_or_dot_shift_once(xshift, yshift))
    }

    pub fn make_photo(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.make_photo_once())
    }

    pub fn is_oplocked(&mut self) -> Result<bool, Error> {
        self.run_retried(|dev| dev.is_oplocked_once())
    }

    pub fn set_oplock(&mut self, locked: bool) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_byte_once(OP_OPLOCK, locked as u8))
    }

    pub fn get_contrast(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_CONTRAST))
    }

    pub fn set_contrast(&mut self, value: f32) -> Result<(), Error> {
        if !(0.0..=100.0).contains(&value) {
            return Err(Error::value("contrast must be within 0..=100"));
        }
        self.run_retried(move |dev| dev.set_f32_once(OP_SET_CONTRAST, value))
    }

    pub fn get_brightness(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_BRIGHTNESS))
    }

    pub fn set_brightness(&mut self, value: f32) -> Result<(), Error> {
        if !(0.0..=100.0).contains(&value) {
            return Err(Error::value("brightness must be within 0..=100"));
        }
        self.run_retried(move |dev| dev.set_f32_once(OP_SET_BRIGHTNESS, value))
    }

    pub fn auto_contrastbrightness(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.auto_contrastbrightness_once())
    }

    /// Marked buggy upstream ("does not work on our XL30 ESEM"); kept
    /// faithfully.
    pub fn get_specimen_current_detector_mode(&mut self) -> Result<SpecimenCurrentDetectorMode, Error> {
        self.run_retried(|dev| dev.get_specimen_current_detector_mode_once())
    }

    /// Marked buggy upstream ("does not work on our XL30 ESEM"); kept
    /// faithfully.
    pub fn set_specimen_current_detector_mode(&mut self, mode: SpecimenCurrentDetectorMode) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_u16_once(OP_SET_SPECIMEN_CURRENT_DETECTOR_MODE, mode.to_wire() as u16))
    }

    pub fn get_specimen_current(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_SPECIMEN_CURRENT))
    }

    pub fn is_beam_blanked(&mut self) -> Result<bool, Error> {
        self.run_retried(|dev| dev.is_beam_blanked_once())
    }

    pub fn blank(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.set_byte_once(OP_SET_BLANK, 1))
    }

    pub fn unblank(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.set_byte_once(OP_SET_BLANK, 0))
    }

    pub fn get_stigmator(&mut self) -> Result<Stigmator, Error> {
        self.run_retried(|dev| dev.get_stigmator_once())
    }

    pub fn set_stigmator(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_stigmator_once(x, y))
    }

    pub fn get_imagefilter_mode(&mut self) -> Result<(ImageFilterMode, u32), Error> {
        self.run_retried(|dev| dev.get_imagefilter_mode_once())
    }

    /// Marked buggy upstream ("cannot reliably set Average mode with a
    /// frame count other than 2"); kept faithfully — the device itself
    /// mishandles other frame counts in `Average` mode.
    pub fn set_imagefilter_mode(&mut self, mode: ImageFilterMode, frames: u32) -> Result<(), Error> {
        if !frames.is_power_of_two() {
            return Err(Error::invalid_usage("frame count must be a power of two"));
        }
        let log2 = frames.trailing_zeros() as u16;
        self.run_retried(move |dev| dev.set_imagefilter_mode_once(mode, log2))
    }

    pub fn get_beamshift(&mut self) -> Result<BeamShift, Error> {
        self.run_retried(|dev| dev.get_beamshift_once())
    }

    /// Marked buggy upstream ("currently not checking x/y bounds"); kept
    /// faithfully.
    pub fn set_beamshift(&mut self, x: Option<f32>, y: Option<f32>) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_beamshift_once(x, y))
    }

    pub fn write_tiff_image(&mut self, path: &str, options: TiffOptions) -> Result<(), Error> {
        let filename_slots = payload::pack_ascii_padded(path)?;
        let mut flag_high = 0u8;
        if options.print_magnification {
            flag_high |= 0x80;
        }
        if options.graphics_bitplane {
            flag_high |= 0x40;
        }
        if options.databar {
            flag_high |= 0x20;
        }
        let mut flag_low = 0u8;
        if options.overwrite {
            flag_low |= 0x10;
        }
        self.run_retried(move |dev| dev.write_tiff_image_once(&filename_slots, flag_low, flag_high))
    }

    pub fn get_scanrotation(&mut self) -> Result<f32, Error> {
        self.run_retried(|dev| dev.get_f32_once(OP_GET_SCANROTATION))
    }

    /// Scan rotation is accepted within `[-90, 90]` degrees; see
    /// DESIGN.md for why that range and not some other.
    pub fn set_scanrotation(&mut self, degrees: f32) -> Result<(), Error> {
        if !(-90.0..=90.0).contains(&degrees) {
            return Err(Error::value("scan rotation must be within -90..=90 degrees"));
        }
        self.run_retried(move |dev| dev.set_scanrotation_once(degrees))
    }

    pub fn get_databar_text(&mut self) -> Result<String, Error> {
        self.run_retried(|dev| dev.get_databar_text_once())
    }

    pub fn set_databar_text(&mut self, text: &str) -> Result<(), Error> {
        if text.len() > 39 {
            return Err(Error::invalid_usage("databar text is limited to 39 characters"));
        }
        let slots = payload::pack_ascii_padded(text)?;
        self.run_retried(move |dev| dev.set_databar_text_once(&slots))
    }

    pub fn auto_focus(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.auto_focus_once())
    }

    /// Can prompt for confirmation on the device control PC, so this
    /// call may block for a long time waiting on an operator there.
    pub fn stage_home(&mut self) -> Result<(), Error> {
        self.run_retried(|dev| dev.stage_home_once())
    }

    pub fn get_stage_position(&mut self) -> Result<StagePosition, Error> {
        self.run_retried(|dev| dev.get_stage_position_once())
    }

    /// Moves whichever axes are `Some`, leaving the rest untouched. See
    /// [`Microscope::set_stage_position_once`] for the motion order and
    /// its swallowed Z failure.
    pub fn set_stage_position(
        &mut self,
        x: Option<f32>,
        y: Option<f32>,
        z: Option<f32>,
        tilt: Option<f32>,
        rot: Option<f32>,
    ) -> Result<(), Error> {
        self.run_retried(move |dev| dev.set_stage_position_once(x, y, z, tilt, rot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRanges;
    use crate::session::Config;
    use crate::transport::mock::MockPort;

    fn reply_ok(op: u8, payload: &[u8]) -> Vec<u8> {
        crate::frame::encode(op, payload).unwrap()
    }

    fn session_over(bytes: Vec<u8>) -> Microscope<MockPort> {
        let port = MockPort::with_inbound(&bytes);
        Microscope::from_port(port, CapabilityRanges::xl30(), Config::default()).unwrap()
    }

    #[test]
    fn get_id_once_decodes_machine_type_and_serial() {
        let mut payload = vec![0u8; 4];
        payload[..2].copy_from_slice(&3u16.to_le_bytes());
        payload[2..4].copy_from_slice(&4242u16.to_le_bytes());
        let mut dev = session_over(reply_ok(OP_GET_ID, &payload));

        let id = dev.get_id_once().unwrap();
        assert_eq!(id.machine_type, MachineType::Xl30);
        assert_eq!(id.serial, 4242);
    }

    #[test]
    fn get_spotsize_once_decodes_f32() {
        let mut dev = session_over(reply_ok(OP_GET_SPOTSIZE, &payload::pack_f32(&[3.5])));
        assert_eq!(dev.get_f32_once(OP_GET_SPOTSIZE).unwrap(), 3.5);
    }

    #[test]
    fn set_detector_once_reports_device_refusal() {
        let mut frame = reply_ok(OP_SET_DETECTOR, &[0, 0, 0, 0]);
        // Flip the status byte's error bit directly, rather than
        // reconstructing an error-shaped frame by hand.
        let status_index = 3;
        frame[status_index] |= STATUS_ERROR_BIT;
        frame[frame.len() - 1] = frame[..frame.len() - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        let mut dev = session_over(frame);
        assert_eq!(dev.set_detector_once(2).unwrap(), false);
    }

    #[test]
    fn get_stage_position_once_decodes_all_five_axes() {
        let payload = payload::pack_f32(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut dev = session_over(reply_ok(OP_GET_STAGE_POSITION, &payload));
        let pos = dev.get_stage_position_once().unwrap();
        assert_eq!(pos, StagePosition { x: 1.0, y: 2.0, z: 3.0, tilt: 4.0, rot: 5.0 });
    }

    fn error_reply(op: u8) -> Vec<u8> {
        let mut frame = reply_ok(op, &[0, 0, 0, 0]);
        let status_index = 3;
        frame[status_index] |= STATUS_ERROR_BIT;
        let last = frame.len() - 1;
        frame[last] = frame[..last].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        frame
    }

    #[test]
    fn set_stage_position_once_swallows_a_z_failure_and_still_moves_tilt() {
        // current position (read because x/y were given), xy ack,
        // rotation ack, a Z error, then a tilt ack.
        let mut bytes = reply_ok(OP_GET_STAGE_POSITION, &payload::pack_f32(&[0.0, 0.0, 0.0, 0.0, 0.0]));
        bytes.extend(reply_ok(OP_SET_STAGE_XY, &[]));
        bytes.extend(reply_ok(OP_SET_STAGE_ROTATION, &[]));
        bytes.extend(error_reply(OP_SET_STAGE_Z));
        bytes.extend(reply_ok(OP_SET_STAGE_TILT, &[]));

        let mut dev = session_over(bytes);
        let result = dev.set_stage_position_once(Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0));
        assert!(result.is_ok(), "a swallowed Z failure must not fail the whole call: {result:?}");
    }

    #[test]
    fn get_scanmode_once_rejects_an_unrecognized_wire_code() {
        let mut payload = vec![0u8; 4];
        payload[..2].copy_from_slice(&99u16.to_le_bytes());
        let mut dev = session_over(reply_ok(OP_GET_SCANMODE, &payload));
        assert!(dev.get_scanmode_once().is_err());
    }

    #[test]
    fn set_imagefilter_mode_rejects_a_non_power_of_two_frame_count() {
        let mut dev = Microscope::from_port(MockPort::empty(), CapabilityRanges::xl30(), Config::default()).unwrap();
        let result = dev.set_imagefilter_mode(ImageFilterMode::Average, 3);
        assert!(matches!(result, Err(Error::InvalidUsage(_))));
    }
}
