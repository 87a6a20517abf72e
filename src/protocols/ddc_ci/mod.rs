// SPDX-License-Identifier: GPL-3.0-only
//! DDC/CI (Display Data Channel Command Interface) protocol implementation
//!
//! DDC/CI is a standard protocol for controlling monitors over the I2C bus
//! carried by the video cable. [`frame`] turns commands into bytes and back;
//! [`engine`] drives those frames over a [`Session`](crate::session::Session)
//! with the settle delays and retries displays need.

pub mod engine;
pub mod frame;

pub use engine::VcpEngine;
pub use frame::{
    FeatureKind, FrameError, ReadRequest, ReadResponse, VcpValue, WriteCommand, decode_response,
    encode_read, encode_write,
};

/// 7-bit I2C address of the DDC/CI command channel
pub const I2C_ADDRESS_DDC_CI: u16 = 0x37;

/// Source address byte opening every host frame
pub const HOST_ADDRESS: u8 = 0x51;

/// Display write address; seeds the checksum of host frames
pub const DISPLAY_ADDRESS: u8 = 0x6E;

/// Host virtual address; seeds the checksum of display replies
pub const HOST_VIRTUAL_ADDRESS: u8 = 0x50;

/// Set on the length byte of every frame
pub const LENGTH_FLAG: u8 = 0x80;

pub const OPCODE_GET_VCP: u8 = 0x01;
pub const OPCODE_VCP_REPLY: u8 = 0x02;
pub const OPCODE_SET_VCP: u8 = 0x03;

/// Payload bytes of a VCP reply: opcode, result, code, type, max (2), current (2)
pub const VCP_REPLY_PAYLOAD_LEN: usize = 8;

/// Full VCP reply: source address, length, payload, checksum
pub const VCP_REPLY_LEN: usize = VCP_REPLY_PAYLOAD_LEN + 3;
