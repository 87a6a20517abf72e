// SPDX-License-Identifier: GPL-3.0-only
//! EDID 1.3/1.4 base block decoder
//!
//! Decodes the 128-byte identity block a display exposes at I2C address
//! 0x50. Only the base block is interpreted; extension blocks (CEA-861,
//! DisplayID) are counted but not parsed. Decoding never fails because of a
//! bad checksum: the record is still produced and flagged, so callers can
//! decide whether to trust it.

mod descriptor;
mod timing;

pub use descriptor::{
    DESCRIPTOR_LEN, DetailedTiming, Descriptor, RangeLimits, SecondaryGtf, StereoMode, SyncType,
    TextKind, TimingFormula, WhitePoint,
};
pub use timing::{AspectRatio, EstablishedTiming, EstablishedTimings, StandardTiming};

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// I2C address of the EDID EEPROM
pub const I2C_ADDRESS_EDID: u16 = 0x50;

pub const EDID_BLOCK_LEN: usize = 128;

pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EdidError {
    #[error("EDID block truncated: got {0} of {EDID_BLOCK_LEN} bytes")]
    Truncated(usize),

    #[error("EDID header signature missing")]
    BadHeader,

    /// Returned by [`DecodedEdid::trusted`]; the record is kept for callers
    /// that want to show it anyway
    #[error("EDID checksum byte 0x{checksum:02X} does not balance the block")]
    ChecksumInvalid { checksum: u8, record: Box<EdidRecord> },
}

/// Three-letter PNP vendor id, packed as 3x5 bits (A = 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManufacturerId(pub u16);

impl ManufacturerId {
    pub fn letters(&self) -> [char; 3] {
        let letter = |shift: u16| {
            let v = ((self.0 >> shift) & 0x1F) as u8;
            if (1..=26).contains(&v) { (b'A' + v - 1) as char } else { '?' }
        };
        [letter(10), letter(5), letter(0)]
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.letters().iter().try_for_each(|c| write!(f, "{}", c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DigitalInterface {
    Undefined,
    Dvi,
    HdmiA,
    HdmiB,
    Mddi,
    DisplayPort,
    Other(u8),
}

/// Analog video white/sync levels relative to blank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalLevel {
    /// +0.7 / -0.3 V
    Plus700Minus300,
    /// +0.714 / -0.286 V
    Plus714Minus286,
    /// +1.0 / -0.4 V
    Plus1000Minus400,
    /// +0.7 / 0 V
    Plus700Minus0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoInput {
    Digital {
        /// VESA DFP 1.x compatible (bit 0)
        dfp_compatible: bool,
        /// Bits per primary color; 1.4 only
        bit_depth: Option<u8>,
        /// 1.4 only
        interface: DigitalInterface,
    },
    Analog {
        signal_level: SignalLevel,
        blank_to_black_setup: bool,
        separate_sync: bool,
        composite_sync: bool,
        sync_on_green: bool,
        serrated_vsync: bool,
    },
}

impl VideoInput {
    fn decode(b: u8, revision: u8) -> Self {
        if b & 0x80 != 0 {
            let extended = revision >= 4;
            let bit_depth = match (b >> 4) & 0b111 {
                0b001..=0b110 if extended => Some(((b >> 4) & 0b111) * 2 + 4),
                _ => None,
            };
            let interface = if !extended {
                DigitalInterface::Undefined
            } else {
                match b & 0x0F {
                    0 => DigitalInterface::Undefined,
                    1 => DigitalInterface::Dvi,
                    2 => DigitalInterface::HdmiA,
                    3 => DigitalInterface::HdmiB,
                    4 => DigitalInterface::Mddi,
                    5 => DigitalInterface::DisplayPort,
                    other => DigitalInterface::Other(other),
                }
            };
            VideoInput::Digital { dfp_compatible: b & 0x01 != 0, bit_depth, interface }
        } else {
            let signal_level = match (b >> 5) & 0b11 {
                0b00 => SignalLevel::Plus700Minus300,
                0b01 => SignalLevel::Plus714Minus286,
                0b10 => SignalLevel::Plus1000Minus400,
                _ => SignalLevel::Plus700Minus0,
            };
            VideoInput::Analog {
                signal_level,
                blank_to_black_setup: b & 0x10 != 0,
                separate_sync: b & 0x08 != 0,
                composite_sync: b & 0x04 != 0,
                sync_on_green: b & 0x02 != 0,
                serrated_vsync: b & 0x01 != 0,
            }
        }
    }

    pub fn is_digital(&self) -> bool {
        matches!(self, VideoInput::Digital { .. })
    }
}

/// Feature support byte (24)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Features {
    pub standby: bool,
    pub suspend: bool,
    pub active_off: bool,
    /// Bits 4-3; meaning depends on whether the input is digital
    pub display_type: u8,
    pub srgb_default: bool,
    pub preferred_timing_native: bool,
    pub continuous_frequency: bool,
}

impl Features {
    fn decode(b: u8) -> Self {
        Self {
            standby: b & 0x80 != 0,
            suspend: b & 0x40 != 0,
            active_off: b & 0x20 != 0,
            display_type: (b >> 3) & 0b11,
            srgb_default: b & 0x04 != 0,
            preferred_timing_native: b & 0x02 != 0,
            continuous_frequency: b & 0x01 != 0,
        }
    }
}

/// Basic display parameters (bytes 20-24)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasicParameters {
    pub input: VideoInput,
    /// 0 when unknown or variable
    pub max_horizontal_cm: u8,
    pub max_vertical_cm: u8,
    /// (gamma * 100) - 100, 0xFF when stored in an extension
    pub gamma_raw: u8,
    pub features: Features,
}

impl BasicParameters {
    pub fn gamma(&self) -> Option<f32> {
        gamma_from_raw(self.gamma_raw)
    }
}

pub(crate) fn gamma_from_raw(raw: u8) -> Option<f32> {
    (raw != 0xFF).then(|| (f32::from(raw) + 100.0) / 100.0)
}

/// CIE 1931 coordinate, 10-bit binary fraction of 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChromaticityPoint {
    pub x: u16,
    pub y: u16,
}

impl ChromaticityPoint {
    /// Reassemble from the high bytes and the two-bit low parts
    pub(crate) fn from_parts(x_msb: u8, x_lsb: u8, y_msb: u8, y_lsb: u8) -> Self {
        Self {
            x: (u16::from(x_msb) << 2) | u16::from(x_lsb & 0b11),
            y: (u16::from(y_msb) << 2) | u16::from(y_lsb & 0b11),
        }
    }

    pub fn x_f32(&self) -> f32 {
        f32::from(self.x) / 1024.0
    }

    pub fn y_f32(&self) -> f32 {
        f32::from(self.y) / 1024.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chromaticity {
    pub red: ChromaticityPoint,
    pub green: ChromaticityPoint,
    pub blue: ChromaticityPoint,
    pub white: ChromaticityPoint,
}

impl Chromaticity {
    fn decode(b: &[u8]) -> Self {
        let (rg, bw) = (b[0], b[1]);
        Self {
            red: ChromaticityPoint::from_parts(b[2], rg >> 6, b[3], rg >> 4),
            green: ChromaticityPoint::from_parts(b[4], rg >> 2, b[5], rg),
            blue: ChromaticityPoint::from_parts(b[6], bw >> 6, b[7], bw >> 4),
            white: ChromaticityPoint::from_parts(b[8], bw >> 2, b[9], bw),
        }
    }
}

/// Everything the base block says about a display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdidRecord {
    pub manufacturer: ManufacturerId,
    pub product_code: u16,
    pub serial_number: u32,
    /// 0xFF marks `manufacture_year` as a model year (1.4)
    pub manufacture_week: u8,
    pub manufacture_year: u16,
    pub version: u8,
    pub revision: u8,
    pub basic: BasicParameters,
    pub chromaticity: Chromaticity,
    pub established_timings: EstablishedTimings,
    pub standard_timings: [Option<StandardTiming>; 8],
    pub descriptors: [Descriptor; 4],
    pub extension_count: u8,
    pub checksum: u8,
}

impl EdidRecord {
    /// PNP id plus product code, as used in `/sys/class/drm` and hwdb
    pub fn pnp_id(&self) -> String {
        format!("{}{:04X}", self.manufacturer, self.product_code)
    }

    pub fn is_model_year(&self) -> bool {
        self.manufacture_week == 0xFF
    }

    /// The first detailed timing, which is the preferred mode
    pub fn preferred_timing(&self) -> Option<&DetailedTiming> {
        self.descriptors.iter().find_map(Descriptor::as_detailed_timing)
    }

    pub fn detailed_timings(&self) -> impl Iterator<Item = &DetailedTiming> {
        self.descriptors.iter().filter_map(Descriptor::as_detailed_timing)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.text(TextKind::ProductName)
    }

    pub fn serial_text(&self) -> Option<&str> {
        self.text(TextKind::SerialNumber)
    }

    pub fn range_limits(&self) -> Option<&RangeLimits> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::RangeLimits(limits) => Some(limits),
            _ => None,
        })
    }

    fn text(&self, wanted: TextKind) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::Text { kind, text } if *kind == wanted => Some(text.as_str()),
            _ => None,
        })
    }
}

/// A decoded block together with the result of its checksum test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEdid {
    pub record: EdidRecord,
    pub checksum_ok: bool,
}

impl DecodedEdid {
    /// The record, or [`EdidError::ChecksumInvalid`] if the block is corrupt
    pub fn trusted(self) -> Result<EdidRecord, EdidError> {
        if self.checksum_ok {
            Ok(self.record)
        } else {
            Err(EdidError::ChecksumInvalid {
                checksum: self.record.checksum,
                record: Box::new(self.record),
            })
        }
    }
}

/// Sum of all bytes modulo 256; zero for a valid block
pub fn block_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Decode the base block from the start of `raw`
///
/// Bytes beyond the first 128 (extension blocks) are ignored.
pub fn decode(raw: &[u8]) -> Result<DecodedEdid, EdidError> {
    let block = raw.get(..EDID_BLOCK_LEN).ok_or(EdidError::Truncated(raw.len()))?;
    if block[..8] != EDID_HEADER {
        return Err(EdidError::BadHeader);
    }

    let version = block[18];
    let revision = block[19];

    let mut standard_timings = [None; 8];
    for (slot, pair) in standard_timings.iter_mut().zip(block[38..54].chunks_exact(2)) {
        *slot = StandardTiming::decode([pair[0], pair[1]], revision);
    }

    let descriptors: [Descriptor; 4] = std::array::from_fn(|i| {
        let start = 54 + i * DESCRIPTOR_LEN;
        let mut slot = [0u8; DESCRIPTOR_LEN];
        slot.copy_from_slice(&block[start..start + DESCRIPTOR_LEN]);
        Descriptor::decode(&slot, revision)
    });

    let record = EdidRecord {
        manufacturer: ManufacturerId(u16::from_be_bytes([block[8], block[9]])),
        product_code: u16::from_le_bytes([block[10], block[11]]),
        serial_number: u32::from_le_bytes([block[12], block[13], block[14], block[15]]),
        manufacture_week: block[16],
        manufacture_year: u16::from(block[17]) + 1990,
        version,
        revision,
        basic: BasicParameters {
            input: VideoInput::decode(block[20], revision),
            max_horizontal_cm: block[21],
            max_vertical_cm: block[22],
            gamma_raw: block[23],
            features: Features::decode(block[24]),
        },
        chromaticity: Chromaticity::decode(&block[25..35]),
        established_timings: EstablishedTimings::from_bytes([block[35], block[36], block[37]]),
        standard_timings,
        descriptors,
        extension_count: block[126],
        checksum: block[127],
    };

    let sum = block_sum(block);
    if sum != 0 {
        warn!(sum, "EDID checksum mismatch");
    }

    Ok(DecodedEdid { record, checksum_ok: sum == 0 })
}

/// A realistic 1.4 block for a 27" DisplayPort monitor
#[cfg(test)]
pub(crate) fn sample_block() -> [u8; EDID_BLOCK_LEN] {
    let mut block = [0u8; EDID_BLOCK_LEN];
    block[..8].copy_from_slice(&EDID_HEADER);
    // "DEL", product 0xA0C5, serial 0x4C4B4A41, week 12 of 2020, EDID 1.4
    block[8..20].copy_from_slice(&[
        0x10, 0xAC, 0xC5, 0xA0, 0x41, 0x4A, 0x4B, 0x4C, 12, 30, 0x01, 0x04,
    ]);
    // Digital 8 bpc DisplayPort, 60x34 cm, gamma 2.2, features
    block[20..25].copy_from_slice(&[0xA5, 60, 34, 0x78, 0xEA]);
    block[25..35].copy_from_slice(&[0xEE, 0x54, 0xA3, 0x54, 0x4C, 0x9A, 0x26, 0x0F, 0x50, 0x54]);
    block[35..38].copy_from_slice(&[0x21, 0x08, 0x00]);
    block[38..54].copy_from_slice(&[
        0xD1, 0xC0, 0x81, 0x80, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
        0x01,
    ]);
    // 1920x1080 @ 60 Hz, 148.5 MHz
    block[54..72].copy_from_slice(&[
        0x02, 0x3A, 0x80, 0x18, 0x71, 0x38, 0x2D, 0x40, 0x58, 0x2C, 0x45, 0x00, 0x58, 0x54, 0x21,
        0x00, 0x00, 0x1E,
    ]);
    block[72..90].copy_from_slice(&[
        0x00, 0x00, 0x00, 0xFD, 0x00, 48, 75, 30, 83, 17, 0x01, 0x0A, 0x20, 0x20, 0x20, 0x20, 0x20,
        0x20,
    ]);
    block[90..95].copy_from_slice(&[0x00, 0x00, 0x00, 0xFC, 0x00]);
    block[95..108].copy_from_slice(b"DELL U2720Q\n ");
    block[108..113].copy_from_slice(&[0x00, 0x00, 0x00, 0xFF, 0x00]);
    block[113..126].copy_from_slice(b"ABC123\n      ");
    block[126] = 1;
    block[127] = 0u8.wrapping_sub(block_sum(&block[..127]));
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_sample_identity() {
        let decoded = decode(&sample_block()).unwrap();
        assert!(decoded.checksum_ok);

        let record = decoded.record;
        assert_eq!(record.manufacturer.to_string(), "DEL");
        assert_eq!(record.product_code, 0xA0C5);
        assert_eq!(record.pnp_id(), "DELA0C5");
        assert_eq!(record.serial_number, 0x4C4B4A41);
        assert_eq!(record.manufacture_week, 12);
        assert_eq!(record.manufacture_year, 2020);
        assert_eq!((record.version, record.revision), (1, 4));
        assert_eq!(record.extension_count, 1);
        assert_eq!(record.display_name(), Some("DELL U2720Q"));
        assert_eq!(record.serial_text(), Some("ABC123"));
    }

    #[test]
    fn test_decode_sample_basic_parameters() {
        let basic = decode(&sample_block()).unwrap().record.basic;

        assert_eq!(
            basic.input,
            VideoInput::Digital {
                dfp_compatible: true,
                bit_depth: Some(8),
                interface: DigitalInterface::DisplayPort,
            }
        );
        assert_eq!((basic.max_horizontal_cm, basic.max_vertical_cm), (60, 34));
        assert_eq!(basic.gamma(), Some(2.2));
        assert!(basic.features.standby);
        assert!(basic.features.suspend);
        assert!(basic.features.active_off);
        assert_eq!(basic.features.display_type, 0b01);
        assert!(!basic.features.srgb_default);
        assert!(basic.features.preferred_timing_native);
        assert!(!basic.features.continuous_frequency);
    }

    #[test]
    fn test_chromaticity_reassembly() {
        let chroma = decode(&sample_block()).unwrap().record.chromaticity;

        assert_eq!(chroma.red, ChromaticityPoint { x: 655, y: 338 });
        assert_eq!(chroma.green, ChromaticityPoint { x: 307, y: 618 });
        assert_eq!(chroma.blue, ChromaticityPoint { x: 153, y: 61 });
        assert_eq!(chroma.white, ChromaticityPoint { x: 321, y: 336 });
        assert!((chroma.white.x_f32() - 0.313).abs() < 0.001);
    }

    #[test]
    fn test_timings() {
        let record = decode(&sample_block()).unwrap().record;

        let established: Vec<_> = record.established_timings.iter().collect();
        assert_eq!(
            established,
            vec![
                EstablishedTiming::T640x480At60,
                EstablishedTiming::T800x600At60,
                EstablishedTiming::T1024x768At60,
            ]
        );

        let standard: Vec<_> = record.standard_timings.iter().flatten().collect();
        assert_eq!(standard.len(), 2);
        assert_eq!((standard[0].horizontal_active, standard[0].vertical_active()), (1920, 1080));
        assert_eq!((standard[1].horizontal_active, standard[1].vertical_active()), (1280, 1024));

        let preferred = record.preferred_timing().unwrap();
        assert_eq!(preferred.pixel_clock_khz, 148_500);
        assert_eq!((preferred.horizontal_active, preferred.vertical_active), (1920, 1080));
        assert_eq!((preferred.horizontal_image_mm, preferred.vertical_image_mm), (600, 340));
        assert_eq!(record.detailed_timings().count(), 1);

        let limits = record.range_limits().unwrap();
        assert_eq!((limits.min_vertical_hz, limits.max_vertical_hz), (48, 75));
        assert_eq!(limits.max_pixel_clock_mhz, Some(170));
    }

    #[test]
    fn test_flipped_checksum_keeps_fields() {
        let block = sample_block();
        let good = decode(&block).unwrap();

        let mut corrupt = block;
        corrupt[127] = corrupt[127].wrapping_add(1);
        let bad = decode(&corrupt).unwrap();

        assert!(!bad.checksum_ok);
        assert_eq!(EdidRecord { checksum: good.record.checksum, ..bad.record }, good.record);
    }

    #[test]
    fn test_trusted() {
        assert!(decode(&sample_block()).unwrap().trusted().is_ok());

        let mut corrupt = sample_block();
        corrupt[20] ^= 0x01;
        let err = decode(&corrupt).unwrap().trusted().unwrap_err();
        assert!(matches!(err, EdidError::ChecksumInvalid { .. }));
    }

    #[test]
    fn test_all_unused_descriptors() {
        let mut block = sample_block();
        block[54..126].fill(0x00);
        block[72..90].fill(0xFF);
        block[127] = 0u8.wrapping_sub(block_sum(&block[..127]));

        let decoded = decode(&block).unwrap();
        assert!(decoded.checksum_ok);
        assert!(decoded.record.descriptors.iter().all(Descriptor::is_unused));
        assert_eq!(decoded.record.preferred_timing(), None);
        assert_eq!(decoded.record.display_name(), None);
    }

    #[test]
    fn test_analog_input_before_1_4() {
        let mut block = sample_block();
        block[19] = 3;
        block[20] = 0b0010_1110;
        let record = decode(&block).unwrap().record;

        assert_eq!(
            record.basic.input,
            VideoInput::Analog {
                signal_level: SignalLevel::Plus714Minus286,
                blank_to_black_setup: false,
                separate_sync: true,
                composite_sync: true,
                sync_on_green: true,
                serrated_vsync: false,
            }
        );
    }

    #[test]
    fn test_digital_details_need_1_4() {
        let mut block = sample_block();
        block[19] = 3;
        let record = decode(&block).unwrap().record;

        assert_eq!(
            record.basic.input,
            VideoInput::Digital {
                dfp_compatible: true,
                bit_depth: None,
                interface: DigitalInterface::Undefined,
            }
        );
    }

    #[test]
    fn test_unknown_gamma() {
        let mut block = sample_block();
        block[23] = 0xFF;
        assert_eq!(decode(&block).unwrap().record.basic.gamma(), None);
    }

    #[test]
    fn test_rejects_short_and_headerless_input() {
        assert_eq!(decode(&sample_block()[..100]), Err(EdidError::Truncated(100)));

        let mut block = sample_block();
        block[0] = 0x01;
        assert_eq!(decode(&block), Err(EdidError::BadHeader));
    }

    #[test]
    fn test_trailing_extension_is_ignored() {
        let mut raw = sample_block().to_vec();
        raw.extend_from_slice(&[0x02; EDID_BLOCK_LEN]);
        assert_eq!(decode(&raw).unwrap(), decode(&sample_block()).unwrap());
    }

    #[test]
    fn test_manufacturer_letters() {
        assert_eq!(ManufacturerId(0x1E6D).to_string(), "GSM");
        assert_eq!(ManufacturerId(0x0000).to_string(), "???");
    }

    proptest! {
        #[test]
        fn test_checksum_flag_matches_byte_sum(body in proptest::collection::vec(any::<u8>(), 120)) {
            let mut block = EDID_HEADER.to_vec();
            block.extend_from_slice(&body);

            let decoded = decode(&block).unwrap();
            prop_assert_eq!(decoded.checksum_ok, block_sum(&block) == 0);
        }

        #[test]
        fn test_decode_is_deterministic(body in proptest::collection::vec(any::<u8>(), 120)) {
            let mut block = EDID_HEADER.to_vec();
            block.extend_from_slice(&body);

            prop_assert_eq!(decode(&block), decode(&block));
        }
    }
}
