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

//! The capability model: enumerated scan/image-filter/specimen-current
//! modes, the fixed detector and detector-type catalogues, and the
//! configured ranges a session validates caller arguments against.

use std::ops::RangeInclusive;

use crate::error::Error;

/// Which XL-series machine a session is talking to, decoded from the
/// `get_id` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineType {
    Xl20,
    Xl30,
    Xl40,
}

impl MachineType {
    pub(crate) fn from_wire(code: u16) -> Option<Self> {
        match code {
            2 => Some(MachineType::Xl20),
            3 => Some(MachineType::Xl30),
            4 => Some(MachineType::Xl40),
            _ => None,
        }
    }
}

/// The electron-beam scan pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    ExtXy = 1,
    LineY = 3,
    LineX = 4,
    Spot = 5,
    SelectedArea = 6,
    FullFrame = 7,
}

impl ScanMode {
    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        match v {
            1 => Some(ScanMode::ExtXy),
            3 => Some(ScanMode::LineY),
            4 => Some(ScanMode::LineX),
            5 => Some(ScanMode::Spot),
            6 => Some(ScanMode::SelectedArea),
            7 => Some(ScanMode::FullFrame),
            _ => None,
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        self as u8
    }
}

/// How the image is built up from successive scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilterMode {
    Live = 0,
    Average = 1,
    Integrate = 2,
    Freeze = 3,
}

impl ImageFilterMode {
    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        match v {
            0 => Some(ImageFilterMode::Live),
            1 => Some(ImageFilterMode::Average),
            2 => Some(ImageFilterMode::Integrate),
            3 => Some(ImageFilterMode::Freeze),
            _ => None,
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        self as u8
    }
}

/// What the specimen-current detector is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecimenCurrentDetectorMode {
    TouchAlarm = 0,
    Imaging = 1,
    Measuring = 2,
}

impl SpecimenCurrentDetectorMode {
    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        match v {
            0 => Some(SpecimenCurrentDetectorMode::TouchAlarm),
            1 => Some(SpecimenCurrentDetectorMode::Imaging),
            2 => Some(SpecimenCurrentDetectorMode::Measuring),
            _ => None,
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        self as u8
    }
}

/// How many lines make up one frame. Most values are discrete line
/// counts; `Tv` is a special broadcast-compatible sentinel the device
/// reports in place of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinesPerFrame {
    L121,
    L242,
    L484,
    L968,
    L1452,
    L1936,
    L2420,
    L2904,
    L3388,
    L3872,
    L180,
    L360,
    L720,
    Tv,
}

impl LinesPerFrame {
    const TABLE: &'static [(u16, LinesPerFrame, Option<u32>)] = &[
        (0, LinesPerFrame::L121, Some(121)),
        (1, LinesPerFrame::L242, Some(242)),
        (2, LinesPerFrame::L484, Some(484)),
        (3, LinesPerFrame::L968, Some(968)),
        (4, LinesPerFrame::L1452, Some(1452)),
        (5, LinesPerFrame::L1936, Some(1936)),
        (6, LinesPerFrame::L2420, Some(2420)),
        (7, LinesPerFrame::L2904, Some(2904)),
        (8, LinesPerFrame::L3388, Some(3388)),
        (9, LinesPerFrame::L3872, Some(3872)),
        (10, LinesPerFrame::L180, Some(180)),
        (11, LinesPerFrame::L360, Some(360)),
        (12, LinesPerFrame::L720, Some(720)),
        (100, LinesPerFrame::Tv, None),
    ];

    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        Self::TABLE.iter().find(|(w, _, _)| *w == v).map(|(_, m, _)| *m)
    }

    pub(crate) fn to_wire(self) -> u16 {
        Self::TABLE
            .iter()
            .find(|(_, m, _)| *m == self)
            .map(|(w, _, _)| *w)
            .unwrap()
    }

    /// The line count this setting names, or `None` for the `Tv` sentinel.
    pub fn lines(self) -> Option<u32> {
        Self::TABLE.iter().find(|(_, m, _)| *m == self).and_then(|(_, _, c)| *c)
    }
}

/// How long the beam dwells on each line. Discrete enumerated durations
/// in microseconds (1.25ms, 1.87ms, 3.43ms, 6.86ms, 20ms, 40ms, 60ms,
/// 120ms, 240ms, 360ms, 1020ms), plus the same `Tv` sentinel as
/// [`LinesPerFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTime {
    Us1250,
    Us1870,
    Us3430,
    Us6860,
    Us20000,
    Us40000,
    Us60000,
    Us120000,
    Us240000,
    Us360000,
    Us1020000,
    Tv,
}

impl LineTime {
    const TABLE: &'static [(u16, LineTime, Option<u32>)] = &[
        (0, LineTime::Us1250, Some(1_250)),
        (1, LineTime::Us1870, Some(1_870)),
        (2, LineTime::Us3430, Some(3_430)),
        (3, LineTime::Us6860, Some(6_860)),
        (4, LineTime::Us20000, Some(20_000)),
        (5, LineTime::Us40000, Some(40_000)),
        (6, LineTime::Us60000, Some(60_000)),
        (7, LineTime::Us120000, Some(120_000)),
        (8, LineTime::Us240000, Some(240_000)),
        (9, LineTime::Us360000, Some(360_000)),
        (10, LineTime::Us1020000, Some(1_020_000)),
        (100, LineTime::Tv, None),
    ];

    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        Self::TABLE.iter().find(|(w, _, _)| *w == v).map(|(_, m, _)| *m)
    }

    pub(crate) fn to_wire(self) -> u16 {
        Self::TABLE
            .iter()
            .find(|(_, m, _)| *m == self)
            .map(|(w, _, _)| *w)
            .unwrap()
    }

    /// Dwell time in microseconds, or `None` for the `Tv` sentinel.
    pub fn microseconds(self) -> Option<u32> {
        Self::TABLE.iter().find(|(_, m, _)| *m == self).and_then(|(_, _, c)| *c)
    }
}

/// One entry of the detector-type catalogue (5 fixed entries).
#[derive(Debug, Clone, Copy)]
pub struct DetectorTypeInfo {
    pub id: u8,
    pub long_name: &'static str,
    pub short_name: &'static str,
}

pub const DETECTOR_TYPES: &[DetectorTypeInfo] = &[
    DetectorTypeInfo { id: 0, long_name: "Solid State Detector", short_name: "SSD" },
    DetectorTypeInfo { id: 1, long_name: "Photo Multiplier", short_name: "PMT" },
    DetectorTypeInfo { id: 2, long_name: "Photo Multiplier grid 10kV", short_name: "SED" },
    DetectorTypeInfo { id: 3, long_name: "eXternal Analog Interface Board", short_name: "XAIB" },
    DetectorTypeInfo { id: 4, long_name: "Multiple mixed detector id", short_name: "MULTIPLE" },
];

/// One entry of the fixed detector catalogue. `detector_type` indexes
/// into [`DETECTOR_TYPES`]; it is `None` for "no detector connected".
#[derive(Debug, Clone, Copy)]
pub struct DetectorInfo {
    pub id: u16,
    pub name: &'static str,
    pub detector_type: Option<u8>,
    pub short_name: Option<&'static str>,
}

/// The fixed, immutable table of known detector ids. Whether a given
/// entry is actually present on a connected machine is tracked
/// separately in [`DetectorSupport`], not in this table — see
/// DESIGN.md (REDESIGN FLAGS).
pub const DETECTOR_CATALOGUE: &[DetectorInfo] = &[
    DetectorInfo { id: 0, name: "No detector connected", detector_type: None, short_name: None },
    DetectorInfo { id: 1, name: "Specimen current detector", detector_type: Some(0), short_name: Some("SC") },
    DetectorInfo { id: 2, name: "Everhart-Thornley Detector", detector_type: Some(0), short_name: Some("ETD") },
    DetectorInfo { id: 3, name: "Large Field Detector", detector_type: Some(0), short_name: Some("LFD") },
    DetectorInfo { id: 4, name: "Backscatter Electron", detector_type: Some(0), short_name: Some("BSE") },
    DetectorInfo { id: 5, name: "Solid State 4-quadrant BSE", detector_type: Some(0), short_name: Some("SSD") },
    DetectorInfo { id: 6, name: "Gaseous Secondary Electron Detector", detector_type: Some(0), short_name: Some("GSED") },
    DetectorInfo { id: 7, name: "Gaseous Backscatter Detector", detector_type: Some(0), short_name: Some("GBSD") },
    DetectorInfo { id: 8, name: "Cathodoluminescence Detector", detector_type: Some(1), short_name: Some("CL") },
    DetectorInfo { id: 9, name: "Energy Dispersive X-ray Detector", detector_type: Some(3), short_name: Some("EDX") },
    DetectorInfo { id: 10, name: "Wavelength Dispersive X-ray Detector", detector_type: Some(3), short_name: Some("WDX") },
    DetectorInfo { id: 11, name: "Infrared Detector", detector_type: Some(1), short_name: Some("IR") },
    DetectorInfo { id: 12, name: "Transmitted Electron Detector", detector_type: Some(0), short_name: Some("TED") },
    DetectorInfo { id: 13, name: "Low Voltage High Contrast Detector", detector_type: Some(0), short_name: Some("LVHCD") },
    DetectorInfo { id: 14, name: "Secondary Electron Detector", detector_type: Some(0), short_name: Some("SED") },
    DetectorInfo { id: 15, name: "Auxiliary detector 1", detector_type: Some(3), short_name: Some("AUX1") },
    DetectorInfo { id: 16, name: "Auxiliary detector 2", detector_type: Some(3), short_name: Some("AUX2") },
    DetectorInfo { id: 17, name: "Auxiliary detector 3", detector_type: Some(3), short_name: Some("AUX3") },
    DetectorInfo { id: 18, name: "Auxiliary detector 4", detector_type: Some(3), short_name: Some("AUX4") },
    DetectorInfo { id: 19, name: "Auxiliary detector 5", detector_type: Some(3), short_name: Some("AUX5") },
    DetectorInfo { id: 20, name: "Auxiliary detector 6", detector_type: Some(3), short_name: Some("AUX6") },
    DetectorInfo { id: 21, name: "Auxiliary detector 7", detector_type: Some(3), short_name: Some("AUX7") },
    DetectorInfo { id: 22, name: "Auxiliary detector 8", detector_type: Some(3), short_name: Some("AUX8") },
    DetectorInfo { id: 23, name: "Auxiliary detector 9", detector_type: Some(3), short_name: Some("AUX9") },
    DetectorInfo { id: 24, name: "Auxiliary detector 10", detector_type: Some(3), short_name: Some("AUX10") },
    DetectorInfo { id: 25, name: "Auxiliary detector 11", detector_type: Some(3), short_name: Some("AUX11") },
    DetectorInfo { id: 26, name: "Auxiliary detector 12", detector_type: Some(3), short_name: Some("AUX12") },
    DetectorInfo { id: 27, name: "Auxiliary detector 13", detector_type: Some(3), short_name: Some("AUX13") },
    DetectorInfo { id: 28, name: "Auxiliary detector 14", detector_type: Some(3), short_name: Some("AUX14") },
    DetectorInfo { id: 29, name: "Auxiliary detector 15", detector_type: Some(3), short_name: Some("AUX15") },
    DetectorInfo { id: 256, name: "Mixed", detector_type: Some(4), short_name: Some("MIX") },
];

/// Mutable "is this detector actually present" bitset, tracked apart
/// from the immutable [`DETECTOR_CATALOGUE`] so the catalogue itself
/// never needs to change shape at run time.
#[derive(Debug, Clone, Default)]
pub struct DetectorSupport {
    supported: std::collections::HashMap<u16, bool>,
}

impl DetectorSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_supported(&self, id: u16) -> Option<bool> {
        self.supported.get(&id).copied()
    }

    pub fn mark(&mut self, id: u16, supported: bool) {
        self.supported.insert(id, supported);
    }
}

/// Device-advertised ranges and enumerations that [`crate::ops`]
/// validates caller arguments against.
#[derive(Debug, Clone)]
pub struct CapabilityRanges {
    pub high_tension: RangeInclusive<f32>,
    pub spot_size: RangeInclusive<f32>,
    pub magnification: RangeInclusive<f32>,
    pub supported_scan_modes: Vec<ScanMode>,
    pub stigmator_count: u8,
}

/// Hard, machine-independent bounds enforced in addition to the
/// configured range above: an absolute 200V-30kV clamp on top of a
/// device's own configured high-tension range.
pub const HIGH_TENSION_ABSOLUTE: RangeInclusive<f32> = 200.0..=30_000.0;

impl CapabilityRanges {
    /// The fixed capability set for an XL30.
    pub fn xl30() -> Self {
        CapabilityRanges {
            high_tension: 100.0..=30_000.0,
            spot_size: 1.0..=10.0,
            magnification: 20.0..=400_000.0,
            supported_scan_modes: vec![
                ScanMode::FullFrame,
                ScanMode::SelectedArea,
                ScanMode::Spot,
                ScanMode::LineX,
                ScanMode::LineY,
                ScanMode::ExtXy,
            ],
            stigmator_count: 1,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.high_tension.start() > self.high_tension.end() {
            return Err(Error::invalid_usage(
                "high tension range maximum must be >= minimum",
            ));
        }
        if self.spot_size.start() > self.spot_size.end() {
            return Err(Error::invalid_usage(
                "spot size range maximum must be >= minimum",
            ));
        }
        if self.magnification.start() > self.magnification.end() {
            return Err(Error::invalid_usage(
                "magnification range maximum must be >= minimum",
            ));
        }
        if self.supported_scan_modes.is_empty() {
            return Err(Error::invalid_usage(
                "at least one scan mode must be supported",
            ));
        }
        Ok(())
    }
}
