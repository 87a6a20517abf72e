// SPDX-License-Identifier: GPL-3.0-only
//! VCP control codes and their metadata
//!
//! Every control this crate knows about is a variant of [`ControlId`]. The
//! associated [`ControlSpec`] table carries the human-readable name, the
//! typical range reported by displays and whether the code can be read,
//! written, or both.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Whether a control can be queried, set, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadWrite,
    /// Momentary actions such as factory resets
    WriteOnly,
    ReadOnly,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

/// Metadata for one VCP control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSpec {
    /// Raw feature code sent on the wire
    pub code: u8,

    /// Human-readable, kebab-case name (also accepted by [`ControlId::from_name`])
    pub name: &'static str,

    /// Maximum most displays report for continuous controls.
    /// `None` for enumerated or momentary controls.
    pub typical_max: Option<u16>,

    pub access: Access,
}

/// A VCP feature code this crate can address
///
/// Static convergence (0x28) and top-left screen purity (0xE8) each appear
/// twice in older control tables under different names; they are one
/// control each here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlId {
    Reset = 0x04,
    ResetBrightnessAndContrast = 0x05,
    ResetGeometry = 0x06,
    ResetColor = 0x08,
    Brightness = 0x10,
    Contrast = 0x12,
    RedGain = 0x16,
    GreenGain = 0x18,
    BlueGain = 0x1A,
    AutoSizeCenter = 0x1E,
    HorizontalPosition = 0x20,
    Width = 0x22,
    PincushionAmplitude = 0x24,
    PincushionBalance = 0x26,
    /// Horizontal and vertical static convergence share this code
    StaticConvergence = 0x28,
    VerticalPosition = 0x30,
    Height = 0x32,
    VerticalLinearity = 0x3A,
    VerticalLinearityBalance = 0x3C,
    KeystoneBalance = 0x40,
    PincushionPhase = 0x42,
    TopPincushionAmplitude = 0x46,
    TopPincushionBalance = 0x48,
    BottomPincushionAmplitude = 0x4A,
    BottomPincushionBalance = 0x4C,
    MoireCancel = 0x56,
    InputSource = 0x60,
    AudioSpeakerVolume = 0x62,
    RedBlackLevel = 0x6C,
    GreenBlackLevel = 0x6E,
    BlueBlackLevel = 0x70,
    Settings = 0xB0,
    OnScreenDisplay = 0xCA,
    OsdLanguage = 0xCC,
    PowerMode = 0xD6,
    DisplayMode = 0xDC,
    VcpVersion = 0xDF,
    ColorPreset = 0xE0,
    PowerControl = 0xE1,
    /// Also listed as bottom-left screen purity in some tables
    TopLeftScreenPurity = 0xE8,
    TopRightScreenPurity = 0xE9,
    BottomRightScreenPurity = 0xEB,
}

const fn continuous(code: u8, name: &'static str) -> ControlSpec {
    ControlSpec { code, name, typical_max: Some(100), access: Access::ReadWrite }
}

const fn enumerated(code: u8, name: &'static str, access: Access) -> ControlSpec {
    ControlSpec { code, name, typical_max: None, access }
}

impl ControlId {
    /// Every known control, in feature-code order
    pub const ALL: [ControlId; 42] = [
        ControlId::Reset,
        ControlId::ResetBrightnessAndContrast,
        ControlId::ResetGeometry,
        ControlId::ResetColor,
        ControlId::Brightness,
        ControlId::Contrast,
        ControlId::RedGain,
        ControlId::GreenGain,
        ControlId::BlueGain,
        ControlId::AutoSizeCenter,
        ControlId::HorizontalPosition,
        ControlId::Width,
        ControlId::PincushionAmplitude,
        ControlId::PincushionBalance,
        ControlId::StaticConvergence,
        ControlId::VerticalPosition,
        ControlId::Height,
        ControlId::VerticalLinearity,
        ControlId::VerticalLinearityBalance,
        ControlId::KeystoneBalance,
        ControlId::PincushionPhase,
        ControlId::TopPincushionAmplitude,
        ControlId::TopPincushionBalance,
        ControlId::BottomPincushionAmplitude,
        ControlId::BottomPincushionBalance,
        ControlId::MoireCancel,
        ControlId::InputSource,
        ControlId::AudioSpeakerVolume,
        ControlId::RedBlackLevel,
        ControlId::GreenBlackLevel,
        ControlId::BlueBlackLevel,
        ControlId::Settings,
        ControlId::OnScreenDisplay,
        ControlId::OsdLanguage,
        ControlId::PowerMode,
        ControlId::DisplayMode,
        ControlId::VcpVersion,
        ControlId::ColorPreset,
        ControlId::PowerControl,
        ControlId::TopLeftScreenPurity,
        ControlId::TopRightScreenPurity,
        ControlId::BottomRightScreenPurity,
    ];

    /// Raw feature code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Metadata for this control
    pub fn spec(self) -> ControlSpec {
        use Access::*;
        match self {
            ControlId::Reset => enumerated(0x04, "reset", WriteOnly),
            ControlId::ResetBrightnessAndContrast => {
                enumerated(0x05, "reset-brightness-and-contrast", WriteOnly)
            }
            ControlId::ResetGeometry => enumerated(0x06, "reset-geometry", WriteOnly),
            ControlId::ResetColor => enumerated(0x08, "reset-color", WriteOnly),
            ControlId::Brightness => continuous(0x10, "brightness"),
            ControlId::Contrast => continuous(0x12, "contrast"),
            ControlId::RedGain => continuous(0x16, "red-gain"),
            ControlId::GreenGain => continuous(0x18, "green-gain"),
            ControlId::BlueGain => continuous(0x1A, "blue-gain"),
            ControlId::AutoSizeCenter => enumerated(0x1E, "auto-size-center", WriteOnly),
            ControlId::HorizontalPosition => continuous(0x20, "horizontal-position"),
            ControlId::Width => continuous(0x22, "width"),
            ControlId::PincushionAmplitude => continuous(0x24, "pincushion-amplitude"),
            ControlId::PincushionBalance => continuous(0x26, "pincushion-balance"),
            ControlId::StaticConvergence => continuous(0x28, "static-convergence"),
            ControlId::VerticalPosition => continuous(0x30, "vertical-position"),
            ControlId::Height => continuous(0x32, "height"),
            ControlId::VerticalLinearity => continuous(0x3A, "vertical-linearity"),
            ControlId::VerticalLinearityBalance => {
                continuous(0x3C, "vertical-linearity-balance")
            }
            ControlId::KeystoneBalance => continuous(0x40, "keystone-balance"),
            ControlId::PincushionPhase => continuous(0x42, "pincushion-phase"),
            ControlId::TopPincushionAmplitude => continuous(0x46, "top-pincushion-amplitude"),
            ControlId::TopPincushionBalance => continuous(0x48, "top-pincushion-balance"),
            ControlId::BottomPincushionAmplitude => {
                continuous(0x4A, "bottom-pincushion-amplitude")
            }
            ControlId::BottomPincushionBalance => continuous(0x4C, "bottom-pincushion-balance"),
            ControlId::MoireCancel => continuous(0x56, "moire-cancel"),
            ControlId::InputSource => enumerated(0x60, "input-source", ReadWrite),
            ControlId::AudioSpeakerVolume => continuous(0x62, "audio-speaker-volume"),
            ControlId::RedBlackLevel => continuous(0x6C, "red-black-level"),
            ControlId::GreenBlackLevel => continuous(0x6E, "green-black-level"),
            ControlId::BlueBlackLevel => continuous(0x70, "blue-black-level"),
            ControlId::Settings => enumerated(0xB0, "settings", WriteOnly),
            ControlId::OnScreenDisplay => enumerated(0xCA, "on-screen-display", ReadWrite),
            ControlId::OsdLanguage => enumerated(0xCC, "osd-language", ReadWrite),
            ControlId::PowerMode => enumerated(0xD6, "power-mode", ReadWrite),
            ControlId::DisplayMode => enumerated(0xDC, "display-mode", ReadWrite),
            ControlId::VcpVersion => enumerated(0xDF, "vcp-version", ReadOnly),
            ControlId::ColorPreset => enumerated(0xE0, "color-preset", ReadWrite),
            ControlId::PowerControl => enumerated(0xE1, "power-control", ReadWrite),
            ControlId::TopLeftScreenPurity => continuous(0xE8, "top-left-screen-purity"),
            ControlId::TopRightScreenPurity => continuous(0xE9, "top-right-screen-purity"),
            ControlId::BottomRightScreenPurity => {
                continuous(0xEB, "bottom-right-screen-purity")
            }
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Look up a control by raw feature code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Look up a control by name (case-insensitive, `_` and `-` interchangeable)
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        CONTROLS_BY_NAME.get(key.as_str()).copied()
    }
}

static CONTROLS_BY_NAME: Lazy<HashMap<&'static str, ControlId>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, ControlId> =
        ControlId::ALL.iter().map(|c| (c.name(), *c)).collect();
    // Names used by older tables for the merged codes
    map.insert("horizontal-static-convergence", ControlId::StaticConvergence);
    map.insert("vertical-static-convergence", ControlId::StaticConvergence);
    map.insert("bottom-left-screen-purity", ControlId::TopLeftScreenPurity);
    map.insert("dpms", ControlId::PowerMode);
    map.insert("magic-bright", ControlId::DisplayMode);
    map
});

impl TryFrom<u8> for ControlId {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl From<ControlId> for u8 {
    fn from(control: ControlId) -> u8 {
        control.code()
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

impl std::str::FromStr for ControlId {
    type Err = String;

    /// Accepts a control name or a hex/decimal feature code (`0x10`, `16`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(control) = Self::from_name(s) {
            return Ok(control);
        }
        let code = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => s.parse::<u8>(),
        }
        .map_err(|_| format!("unknown control '{}'", s))?;
        Self::from_code(code).ok_or_else(|| format!("unknown feature code 0x{:02X}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_code_matches_discriminant() {
        for control in ControlId::ALL {
            assert_eq!(control.spec().code, control as u8, "{:?}", control);
        }
    }

    #[test]
    fn test_codes_and_names_are_unique() {
        let mut codes: Vec<u8> = ControlId::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ControlId::ALL.len());

        let mut names: Vec<&str> = ControlId::ALL.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ControlId::ALL.len());
    }

    #[test]
    fn test_merged_codes_resolve_to_one_control() {
        assert_eq!(
            ControlId::from_name("horizontal_static_convergence"),
            Some(ControlId::StaticConvergence)
        );
        assert_eq!(
            ControlId::from_name("vertical-static-convergence"),
            Some(ControlId::StaticConvergence)
        );
        assert_eq!(
            ControlId::from_name("bottom-left-screen-purity"),
            Some(ControlId::TopLeftScreenPurity)
        );
        assert_eq!(ControlId::from_code(0xEA), None);
    }

    #[test]
    fn test_parse_name_and_code() {
        assert_eq!("Brightness".parse::<ControlId>(), Ok(ControlId::Brightness));
        assert_eq!("0x12".parse::<ControlId>(), Ok(ControlId::Contrast));
        assert_eq!("96".parse::<ControlId>(), Ok(ControlId::InputSource));
        assert!("0x11".parse::<ControlId>().is_err());
        assert!("volume-knob".parse::<ControlId>().is_err());
    }

    #[test]
    fn test_access() {
        assert!(!ControlId::Reset.spec().access.readable());
        assert!(ControlId::Reset.spec().access.writable());
        assert!(!ControlId::VcpVersion.spec().access.writable());
        assert_eq!(ControlId::Brightness.spec().typical_max, Some(100));
    }
}
