// SPDX-License-Identifier: GPL-3.0-only
//! Display protocols
//!
//! [`ddc_ci`] speaks the monitor control channel; [`edid`] decodes the
//! identity block the monitor exposes on its EEPROM address.

pub mod ddc_ci;
pub mod edid;
