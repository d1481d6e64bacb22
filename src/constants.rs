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

//! Wire-level constants: the sync byte, status bit masks, slot size, and
//! the opcode catalogue.

/// First byte of every frame, request or reply.
pub const SYNC: u8 = 0x05;

/// Size in bytes of one payload slot.
pub const SLOT_SIZE: usize = 4;

/// Largest payload a single frame may carry (so `LEN` fits one byte).
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Bit 7 of the status byte: set when the device reports an error.
pub const STATUS_ERROR_BIT: u8 = 0x80;

/// Bits 0-5 of the status byte: any of these set means a transport fault.
pub const STATUS_FAULT_MASK: u8 = 0x3F;

pub const OP_GET_ID: u8 = 0;
pub const OP_GET_HT_VALUE: u8 = 2;
pub const OP_SET_HT_VALUE: u8 = 3;
pub const OP_GET_HT_ENABLED: u8 = 4;
pub const OP_SET_HT_ENABLED: u8 = 5;
pub const OP_GET_SPOTSIZE: u8 = 6;
pub const OP_SET_SPOTSIZE: u8 = 7;
pub const OP_GET_MAGNIFICATION: u8 = 12;
pub const OP_SET_MAGNIFICATION: u8 = 13;
pub const OP_GET_DETECTOR: u8 = 14;
pub const OP_SET_DETECTOR: u8 = 15;
pub const OP_GET_SCANMODE: u8 = 16;
pub const OP_SET_SCANMODE: u8 = 17;
pub const OP_GET_LINES_PER_FRAME: u8 = 18;
pub const OP_SET_LINES_PER_FRAME: u8 = 19;
pub const OP_LINETIME: u8 = 21;
pub const OP_GET_SELECTED_AREA_SIZE_X: u8 = 22;
pub const OP_SET_SELECTED_AREA_SIZE_X: u8 = 23;
pub const OP_GET_SELECTED_AREA_SIZE_Y: u8 = 24;
pub const OP_SET_SELECTED_AREA_SIZE_Y: u8 = 25;
pub const OP_GET_AREA_OR_DOT_SHIFT_X: u8 = 26;
pub const OP_SET_AREA_OR_DOT_SHIFT_X: u8 = 27;
pub const OP_GET_AREA_OR_DOT_SHIFT_Y: u8 = 28;
pub const OP_SET_AREA_OR_DOT_SHIFT_Y: u8 = 29;
pub const OP_MAKE_PHOTO: u8 = 37;
pub const OP_IS_OPLOCKED: u8 = 38;
pub const OP_OPLOCK: u8 = 39;
pub const OP_GET_CONTRAST: u8 = 48;
pub const OP_SET_CONTRAST: u8 = 49;
pub const OP_GET_BRIGHTNESS: u8 = 50;
pub const OP_SET_BRIGHTNESS: u8 = 51;
pub const OP_AUTO_CONTRASTBRIGHTNESS: u8 = 53;
pub const OP_GET_SPECIMEN_CURRENT_DETECTOR_MODE: u8 = 58;
pub const OP_SET_SPECIMEN_CURRENT_DETECTOR_MODE: u8 = 59;
pub const OP_GET_SPECIMEN_CURRENT: u8 = 60;
pub const OP_IS_BEAM_BLANKED: u8 = 62;
pub const OP_SET_BLANK: u8 = 63;
pub const OP_GET_STIGMATOR: u8 = 70;
pub const OP_SET_STIGMATOR: u8 = 71;
pub const OP_GET_IMAGEFILTER_MODE: u8 = 74;
pub const OP_SET_IMAGEFILTER_MODE: u8 = 75;
pub const OP_GET_BEAMSHIFT: u8 = 80;
pub const OP_SET_BEAMSHIFT: u8 = 81;
pub const OP_WRITE_TIFF_IMAGE: u8 = 84;
pub const OP_GET_SCANROTATION: u8 = 98;
pub const OP_SET_SCANROTATION: u8 = 99;
pub const OP_GET_DATABAR_TEXT: u8 = 100;
pub const OP_SET_DATABAR_TEXT: u8 = 101;
pub const OP_AUTO_FOCUS: u8 = 111;
pub const OP_VENT_PUMP: u8 = 113;
pub const OP_STAGE_HOME: u8 = 175;
pub const OP_SET_STAGE_XY: u8 = 177;
pub const OP_SET_STAGE_ROTATION: u8 = 179;
pub const OP_SET_STAGE_Z: u8 = 187;
pub const OP_SET_STAGE_TILT: u8 = 189;
pub const OP_GET_STAGE_POSITION: u8 = 190;

/// Sub-action byte for [`OP_VENT_PUMP`]: begin pumping down.
pub const VENT_PUMP_PUMP: u8 = 0;
/// Sub-action byte for [`OP_VENT_PUMP`]: begin venting.
pub const VENT_PUMP_VENT: u8 = 1;
/// Sub-action byte for [`OP_VENT_PUMP`]: stop an in-progress vent.
pub const VENT_PUMP_STOP: u8 = 2;
