// SPDX-License-Identifier: GPL-3.0-only
//! Established and standard timings (EDID bytes 35-53)

use serde::Serialize;

/// One of the fixed modes in the established timings bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EstablishedTiming {
    T720x400At70,
    T720x400At88,
    T640x480At60,
    T640x480At67,
    T640x480At72,
    T640x480At75,
    T800x600At56,
    T800x600At60,
    T800x600At72,
    T800x600At75,
    T832x624At75,
    T1024x768At87Interlaced,
    T1024x768At60,
    T1024x768At70,
    T1024x768At75,
    T1280x1024At75,
    T1152x870At75,
}

impl EstablishedTiming {
    /// Bitmap order: byte 35 bit 7 first, byte 37 bit 7 last
    pub const ALL: [EstablishedTiming; 17] = [
        EstablishedTiming::T720x400At70,
        EstablishedTiming::T720x400At88,
        EstablishedTiming::T640x480At60,
        EstablishedTiming::T640x480At67,
        EstablishedTiming::T640x480At72,
        EstablishedTiming::T640x480At75,
        EstablishedTiming::T800x600At56,
        EstablishedTiming::T800x600At60,
        EstablishedTiming::T800x600At72,
        EstablishedTiming::T800x600At75,
        EstablishedTiming::T832x624At75,
        EstablishedTiming::T1024x768At87Interlaced,
        EstablishedTiming::T1024x768At60,
        EstablishedTiming::T1024x768At70,
        EstablishedTiming::T1024x768At75,
        EstablishedTiming::T1280x1024At75,
        EstablishedTiming::T1152x870At75,
    ];

    /// Bit in the 24-bit value `byte35 << 16 | byte36 << 8 | byte37`
    fn mask(self) -> u32 {
        1 << (23 - self as u32)
    }

    /// (width, height, refresh Hz)
    pub fn mode(self) -> (u16, u16, u8) {
        match self {
            EstablishedTiming::T720x400At70 => (720, 400, 70),
            EstablishedTiming::T720x400At88 => (720, 400, 88),
            EstablishedTiming::T640x480At60 => (640, 480, 60),
            EstablishedTiming::T640x480At67 => (640, 480, 67),
            EstablishedTiming::T640x480At72 => (640, 480, 72),
            EstablishedTiming::T640x480At75 => (640, 480, 75),
            EstablishedTiming::T800x600At56 => (800, 600, 56),
            EstablishedTiming::T800x600At60 => (800, 600, 60),
            EstablishedTiming::T800x600At72 => (800, 600, 72),
            EstablishedTiming::T800x600At75 => (800, 600, 75),
            EstablishedTiming::T832x624At75 => (832, 624, 75),
            EstablishedTiming::T1024x768At87Interlaced => (1024, 768, 87),
            EstablishedTiming::T1024x768At60 => (1024, 768, 60),
            EstablishedTiming::T1024x768At70 => (1024, 768, 70),
            EstablishedTiming::T1024x768At75 => (1024, 768, 75),
            EstablishedTiming::T1280x1024At75 => (1280, 1024, 75),
            EstablishedTiming::T1152x870At75 => (1152, 870, 75),
        }
    }
}

/// Established timings I and II plus the manufacturer's reserved bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EstablishedTimings {
    bits: u32,
}

impl EstablishedTimings {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self { bits: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) }
    }

    pub fn supports(&self, timing: EstablishedTiming) -> bool {
        self.bits & timing.mask() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = EstablishedTiming> + '_ {
        EstablishedTiming::ALL.into_iter().filter(|t| self.supports(*t))
    }

    /// Manufacturer-specific timing flags (byte 37, bits 6-0)
    pub fn manufacturer_reserved(&self) -> u8 {
        (self.bits & 0x7F) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AspectRatio {
    /// Only for EDID revisions before 1.3, where code 00 meant 1:1
    Ratio1x1,
    Ratio16x10,
    Ratio4x3,
    Ratio5x4,
    Ratio16x9,
}

impl AspectRatio {
    fn from_bits(bits: u8, revision: u8) -> Self {
        match bits & 0b11 {
            0b00 if revision < 3 => AspectRatio::Ratio1x1,
            0b00 => AspectRatio::Ratio16x10,
            0b01 => AspectRatio::Ratio4x3,
            0b10 => AspectRatio::Ratio5x4,
            _ => AspectRatio::Ratio16x9,
        }
    }

    /// Vertical lines for `horizontal` pixels at this ratio
    pub fn vertical_for(self, horizontal: u16) -> u16 {
        let h = u32::from(horizontal);
        let v = match self {
            AspectRatio::Ratio1x1 => h,
            AspectRatio::Ratio16x10 => h * 10 / 16,
            AspectRatio::Ratio4x3 => h * 3 / 4,
            AspectRatio::Ratio5x4 => h * 4 / 5,
            AspectRatio::Ratio16x9 => h * 9 / 16,
        };
        v as u16
    }
}

/// A two-byte standard timing identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StandardTiming {
    pub horizontal_active: u16,
    pub aspect_ratio: AspectRatio,
    pub refresh_rate: u8,
}

impl StandardTiming {
    /// `None` for the unused markers `01 01` and `00 00`
    pub fn decode(bytes: [u8; 2], revision: u8) -> Option<Self> {
        if bytes == [0x01, 0x01] || bytes[0] == 0x00 {
            return None;
        }
        Some(Self {
            horizontal_active: (u16::from(bytes[0]) + 31) * 8,
            aspect_ratio: AspectRatio::from_bits(bytes[1] >> 6, revision),
            refresh_rate: (bytes[1] & 0x3F) + 60,
        })
    }

    pub fn vertical_active(&self) -> u16 {
        self.aspect_ratio.vertical_for(self.horizontal_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_established_bit_order() {
        let timings = EstablishedTimings::from_bytes([0x80, 0x00, 0x80]);
        let modes: Vec<_> = timings.iter().collect();
        assert_eq!(
            modes,
            vec![EstablishedTiming::T720x400At70, EstablishedTiming::T1152x870At75]
        );
        assert_eq!(timings.manufacturer_reserved(), 0);
    }

    #[test]
    fn test_manufacturer_bits_are_separate() {
        let timings = EstablishedTimings::from_bytes([0x00, 0x01, 0x7F]);
        assert!(timings.supports(EstablishedTiming::T1280x1024At75));
        assert_eq!(timings.iter().count(), 1);
        assert_eq!(timings.manufacturer_reserved(), 0x7F);
    }

    #[test]
    fn test_standard_timing_1080p() {
        let timing = StandardTiming::decode([0xD1, 0xC0], 4).unwrap();
        assert_eq!(timing.horizontal_active, 1920);
        assert_eq!(timing.vertical_active(), 1080);
        assert_eq!(timing.refresh_rate, 60);
    }

    #[test]
    fn test_standard_timing_aspect_depends_on_revision() {
        let new = StandardTiming::decode([0x81, 0x0F], 3).unwrap();
        assert_eq!(new.aspect_ratio, AspectRatio::Ratio16x10);
        assert_eq!(new.vertical_active(), 800);
        assert_eq!(new.refresh_rate, 75);

        let old = StandardTiming::decode([0x81, 0x0F], 2).unwrap();
        assert_eq!(old.aspect_ratio, AspectRatio::Ratio1x1);
    }

    #[test]
    fn test_unused_standard_timing() {
        assert_eq!(StandardTiming::decode([0x01, 0x01], 4), None);
        assert_eq!(StandardTiming::decode([0x00, 0x00], 4), None);
    }
}
