// SPDX-License-Identifier: GPL-3.0-only
//! 18-byte descriptor slots (EDID bytes 54-125)

use serde::Serialize;

use super::timing::StandardTiming;
use super::ChromaticityPoint;

pub const DESCRIPTOR_LEN: usize = 18;

const TAG_SERIAL: u8 = 0xFF;
const TAG_TEXT: u8 = 0xFE;
const TAG_NAME: u8 = 0xFC;
const TAG_RANGE_LIMITS: u8 = 0xFD;
const TAG_WHITE_POINT: u8 = 0xFB;
const TAG_STANDARD_TIMINGS: u8 = 0xFA;
const TAG_DUMMY: u8 = 0x10;

/// Decoded contents of one descriptor slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Descriptor {
    DetailedTiming(DetailedTiming),
    Text { kind: TextKind, text: String },
    RangeLimits(RangeLimits),
    WhitePoints([Option<WhitePoint>; 2]),
    StandardTimings([Option<StandardTiming>; 6]),
    /// Manufacturer-specific or not yet understood
    Other { tag: u8, data: [u8; 13] },
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextKind {
    ProductName,
    SerialNumber,
    Unspecified,
}

impl Descriptor {
    /// Classify and decode one slot
    ///
    /// All-zero and all-0xFF slots are unused. A nonzero pixel clock marks
    /// a detailed timing. A display descriptor also has a zero byte 2; one
    /// that doesn't is kept as [`Descriptor::Other`]. Otherwise byte 3 is
    /// the display descriptor tag.
    pub fn decode(bytes: &[u8; DESCRIPTOR_LEN], revision: u8) -> Self {
        if bytes.iter().all(|&b| b == 0x00) || bytes.iter().all(|&b| b == 0xFF) {
            return Descriptor::Unused;
        }

        if bytes[0] != 0 || bytes[1] != 0 {
            return Descriptor::DetailedTiming(DetailedTiming::decode(bytes));
        }

        let tag = bytes[3];
        let data = payload(bytes);
        if bytes[2] != 0 {
            return Descriptor::Other { tag, data };
        }
        match tag {
            TAG_SERIAL => Descriptor::Text { kind: TextKind::SerialNumber, text: decode_text(&data) },
            TAG_TEXT => Descriptor::Text { kind: TextKind::Unspecified, text: decode_text(&data) },
            TAG_NAME => Descriptor::Text { kind: TextKind::ProductName, text: decode_text(&data) },
            TAG_RANGE_LIMITS => Descriptor::RangeLimits(RangeLimits::decode(bytes)),
            TAG_WHITE_POINT => Descriptor::WhitePoints([
                WhitePoint::decode(&data[0..5]),
                WhitePoint::decode(&data[5..10]),
            ]),
            TAG_STANDARD_TIMINGS => {
                let mut timings = [None; 6];
                for (slot, pair) in timings.iter_mut().zip(data.chunks_exact(2)) {
                    *slot = StandardTiming::decode([pair[0], pair[1]], revision);
                }
                Descriptor::StandardTimings(timings)
            }
            TAG_DUMMY => Descriptor::Unused,
            tag => Descriptor::Other { tag, data },
        }
    }

    pub fn as_detailed_timing(&self) -> Option<&DetailedTiming> {
        match self {
            Descriptor::DetailedTiming(timing) => Some(timing),
            _ => None,
        }
    }

    pub fn is_unused(&self) -> bool {
        matches!(self, Descriptor::Unused)
    }
}

fn payload(bytes: &[u8; DESCRIPTOR_LEN]) -> [u8; 13] {
    let mut data = [0u8; 13];
    data.copy_from_slice(&bytes[5..]);
    data
}

/// Text runs to the first line feed; padding spaces are dropped
fn decode_text(data: &[u8]) -> String {
    data.iter()
        .take_while(|&&b| b != 0x0A)
        .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '?' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StereoMode {
    None,
    FieldSequentialRight,
    FieldSequentialLeft,
    InterleavedRight,
    InterleavedLeft,
    FourWayInterleaved,
    SideBySide,
}

impl StereoMode {
    fn from_flags(flags: u8) -> Self {
        match ((flags >> 4) & 0b110) | (flags & 0b1) {
            0b010 => StereoMode::FieldSequentialRight,
            0b100 => StereoMode::FieldSequentialLeft,
            0b011 => StereoMode::InterleavedRight,
            0b101 => StereoMode::InterleavedLeft,
            0b110 => StereoMode::FourWayInterleaved,
            0b111 => StereoMode::SideBySide,
            _ => StereoMode::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncType {
    Analog { bipolar: bool, serrated: bool, sync_on_all_rgb: bool },
    DigitalComposite { serrated: bool, hsync_positive: bool },
    DigitalSeparate { vsync_positive: bool, hsync_positive: bool },
}

impl SyncType {
    fn from_flags(flags: u8) -> Self {
        let bit2 = flags & 0x04 != 0;
        let bit1 = flags & 0x02 != 0;
        match (flags >> 3) & 0b11 {
            0b00 => SyncType::Analog { bipolar: false, serrated: bit2, sync_on_all_rgb: bit1 },
            0b01 => SyncType::Analog { bipolar: true, serrated: bit2, sync_on_all_rgb: bit1 },
            0b10 => SyncType::DigitalComposite { serrated: bit2, hsync_positive: bit1 },
            _ => SyncType::DigitalSeparate { vsync_positive: bit2, hsync_positive: bit1 },
        }
    }
}

/// A fully specified video mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetailedTiming {
    pub pixel_clock_khz: u32,
    pub horizontal_active: u16,
    pub horizontal_blanking: u16,
    pub vertical_active: u16,
    pub vertical_blanking: u16,
    pub horizontal_sync_offset: u16,
    pub horizontal_sync_pulse: u16,
    pub vertical_sync_offset: u8,
    pub vertical_sync_pulse: u8,
    pub horizontal_image_mm: u16,
    pub vertical_image_mm: u16,
    pub horizontal_border: u8,
    pub vertical_border: u8,
    pub interlaced: bool,
    pub stereo: StereoMode,
    pub sync: SyncType,
}

impl DetailedTiming {
    fn decode(b: &[u8; DESCRIPTOR_LEN]) -> Self {
        let hi_nibble = |byte: u8| u16::from(byte >> 4) << 8;
        let lo_nibble = |byte: u8| u16::from(byte & 0x0F) << 8;

        Self {
            pixel_clock_khz: u32::from(u16::from_le_bytes([b[0], b[1]])) * 10,
            horizontal_active: u16::from(b[2]) | hi_nibble(b[4]),
            horizontal_blanking: u16::from(b[3]) | lo_nibble(b[4]),
            vertical_active: u16::from(b[5]) | hi_nibble(b[7]),
            vertical_blanking: u16::from(b[6]) | lo_nibble(b[7]),
            horizontal_sync_offset: u16::from(b[8]) | (u16::from(b[11] & 0xC0) << 2),
            horizontal_sync_pulse: u16::from(b[9]) | (u16::from(b[11] & 0x30) << 4),
            vertical_sync_offset: (b[10] >> 4) | ((b[11] & 0x0C) << 2),
            vertical_sync_pulse: (b[10] & 0x0F) | ((b[11] & 0x03) << 4),
            horizontal_image_mm: u16::from(b[12]) | hi_nibble(b[14]),
            vertical_image_mm: u16::from(b[13]) | lo_nibble(b[14]),
            horizontal_border: b[15],
            vertical_border: b[16],
            interlaced: b[17] & 0x80 != 0,
            stereo: StereoMode::from_flags(b[17]),
            sync: SyncType::from_flags(b[17]),
        }
    }

    pub fn horizontal_total(&self) -> u32 {
        u32::from(self.horizontal_active) + u32::from(self.horizontal_blanking)
    }

    pub fn vertical_total(&self) -> u32 {
        u32::from(self.vertical_active) + u32::from(self.vertical_blanking)
    }

    /// Field rate in Hz, `None` if the totals are zero
    pub fn refresh_rate(&self) -> Option<f64> {
        let pixels = self.horizontal_total() * self.vertical_total();
        if pixels == 0 {
            return None;
        }
        Some(f64::from(self.pixel_clock_khz) * 1000.0 / f64::from(pixels))
    }
}

/// Secondary GTF curve parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecondaryGtf {
    pub start_frequency_khz: u16,
    /// Twice the C parameter
    pub c2: u8,
    pub m: u16,
    pub k: u8,
    /// Twice the J parameter
    pub j2: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimingFormula {
    DefaultGtf,
    RangeLimitsOnly,
    SecondaryGtf(SecondaryGtf),
    Cvt([u8; 7]),
    Unknown(u8),
}

/// Display range limits (tag 0xFD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeLimits {
    pub min_vertical_hz: u16,
    pub max_vertical_hz: u16,
    pub min_horizontal_khz: u16,
    pub max_horizontal_khz: u16,
    /// `None` when the display leaves it unspecified (0xFF)
    pub max_pixel_clock_mhz: Option<u16>,
    pub formula: TimingFormula,
}

impl RangeLimits {
    fn decode(b: &[u8; DESCRIPTOR_LEN]) -> Self {
        // EDID 1.4 rate offsets: +255 for the max (x1) or both (x1 | x0)
        let offsets = b[4];
        let offset = |flags: u8, max: bool| -> u16 {
            match flags & 0b11 {
                0b10 if max => 255,
                0b11 => 255,
                _ => 0,
            }
        };
        let vertical = offsets & 0b11;
        let horizontal = (offsets >> 2) & 0b11;

        let mut extra = [0u8; 7];
        extra.copy_from_slice(&b[11..18]);

        let formula = match b[10] {
            0x00 => TimingFormula::DefaultGtf,
            0x01 => TimingFormula::RangeLimitsOnly,
            0x02 => TimingFormula::SecondaryGtf(SecondaryGtf {
                start_frequency_khz: u16::from(b[12]) * 2,
                c2: b[13],
                m: u16::from_le_bytes([b[14], b[15]]),
                k: b[16],
                j2: b[17],
            }),
            0x04 => TimingFormula::Cvt(extra),
            other => TimingFormula::Unknown(other),
        };

        Self {
            min_vertical_hz: u16::from(b[5]) + offset(vertical, false),
            max_vertical_hz: u16::from(b[6]) + offset(vertical, true),
            min_horizontal_khz: u16::from(b[7]) + offset(horizontal, false),
            max_horizontal_khz: u16::from(b[8]) + offset(horizontal, true),
            max_pixel_clock_mhz: (b[9] != 0xFF).then(|| u16::from(b[9]) * 10),
            formula,
        }
    }
}

/// Additional white point (tag 0xFB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WhitePoint {
    pub index: u8,
    pub point: ChromaticityPoint,
    /// Stored as (gamma * 100) - 100; 0xFF means defined elsewhere
    pub gamma_raw: u8,
}

impl WhitePoint {
    /// Index 0 marks an empty entry
    fn decode(entry: &[u8]) -> Option<Self> {
        let index = entry[0];
        if index == 0 {
            return None;
        }
        let low = entry[1];
        Some(Self {
            index,
            point: ChromaticityPoint::from_parts(entry[2], low >> 2, entry[3], low),
            gamma_raw: entry[4],
        })
    }

    pub fn gamma(&self) -> Option<f32> {
        super::gamma_from_raw(self.gamma_raw)
    }
}
