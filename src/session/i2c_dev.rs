// SPDX-License-Identifier: GPL-3.0-only
//! Linux `/dev/i2c-N` transport
//!
//! Each DRM connector exposes its DDC lines as an i2c-dev character device.
//! The kernel prepends the 7-bit slave address selected on the adapter, so
//! frames are written starting at the source address byte. Access usually
//! requires membership in the `i2c` group.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use i2c_linux::I2c;

use crate::error::{DdcError, Result};
use crate::protocols::ddc_ci::I2C_ADDRESS_DDC_CI;
use crate::protocols::edid::{EDID_BLOCK_LEN, I2C_ADDRESS_EDID};

use super::{Session, SessionProvider, TransportError};

/// Pause between polls while the display NACKs its reply
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct I2cDevSession {
    path: PathBuf,
    bus: I2c<File>,
    address: Option<u16>,
}

impl std::fmt::Debug for I2cDevSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "I2cDevSession({})", self.path.display())
    }
}

impl I2cDevSession {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let bus = I2c::from_path(&path)?;
        Ok(Self { path, bus, address: None })
    }

    fn select(&mut self, address: u16) -> std::result::Result<(), TransportError> {
        if self.address == Some(address) {
            return Ok(());
        }
        self.bus
            .smbus_set_slave_address(address, false)
            .map_err(classify)?;
        self.address = Some(address);
        Ok(())
    }
}

impl Session for I2cDevSession {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn send(&mut self, frame: &[u8]) -> std::result::Result<(), TransportError> {
        self.select(I2C_ADDRESS_DDC_CI)?;
        self.bus.write_all(frame).map_err(classify)?;
        trace!(display_id = %self.id(), "Sent {:02X?}", frame);
        Ok(())
    }

    fn receive(
        &mut self,
        capacity: usize,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        self.select(I2C_ADDRESS_DDC_CI)?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; capacity];

        loop {
            match self.bus.read(&mut buf).map_err(classify) {
                Ok(n) => {
                    buf.truncate(n);
                    trace!(display_id = %self.id(), "Received {:02X?}", buf);
                    return Ok(buf);
                }
                Err(TransportError::Nack) if Instant::now() < deadline => {
                    std::thread::sleep(RECEIVE_POLL_INTERVAL);
                }
                Err(TransportError::Nack) => return Err(TransportError::Timeout),
                Err(e) => return Err(e),
            }
        }
    }

    fn read_identity_block(&mut self) -> std::result::Result<[u8; EDID_BLOCK_LEN], TransportError> {
        self.select(I2C_ADDRESS_EDID)?;
        // Reset the EEPROM's read pointer to the start of the base block
        self.bus.write_all(&[0x00]).map_err(classify)?;
        let mut block = [0u8; EDID_BLOCK_LEN];
        self.bus.read_exact(&mut block).map_err(classify)?;
        Ok(block)
    }
}

/// Map an errno from the i2c-dev driver onto the retry policy
fn classify(err: io::Error) -> TransportError {
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) | Some(libc::EIO) => TransportError::Nack,
        Some(libc::ETIMEDOUT) => TransportError::Timeout,
        Some(libc::ENODEV) | Some(libc::ENOENT) => {
            TransportError::Unavailable(format!("device gone: {}", err))
        }
        _ => TransportError::Io(err),
    }
}

/// Opens i2c-dev sessions
///
/// A display id is a bus number (`"4"`), a device name (`"i2c-4"`) or a
/// full path (`"/dev/i2c-4"`).
#[derive(Debug, Clone, Default)]
pub struct I2cDevProvider;

impl I2cDevProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(display_id: &str) -> PathBuf {
        if display_id.starts_with('/') {
            PathBuf::from(display_id)
        } else if display_id.parse::<u32>().is_ok() {
            PathBuf::from(format!("/dev/i2c-{}", display_id))
        } else {
            PathBuf::from("/dev").join(display_id)
        }
    }
}

impl SessionProvider for I2cDevProvider {
    type Session = I2cDevSession;

    fn open_session(&self, display_id: &str) -> Result<I2cDevSession> {
        let path = Self::resolve(display_id);
        match I2cDevSession::open(&path) {
            Ok(session) => {
                debug!("Opened {}", path.display());
                Ok(session)
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    warn!("No permission to open {}; is the user in the i2c group?", path.display());
                }
                Err(DdcError::from_transport(display_id, TransportError::Io(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_display_ids() {
        assert_eq!(I2cDevProvider::resolve("4"), PathBuf::from("/dev/i2c-4"));
        assert_eq!(I2cDevProvider::resolve("i2c-12"), PathBuf::from("/dev/i2c-12"));
        assert_eq!(I2cDevProvider::resolve("/dev/i2c-3"), PathBuf::from("/dev/i2c-3"));
    }

    #[test]
    fn test_classify_errno() {
        assert!(matches!(
            classify(io::Error::from_raw_os_error(libc::ENXIO)),
            TransportError::Nack
        ));
        assert!(matches!(
            classify(io::Error::from_raw_os_error(libc::EREMOTEIO)),
            TransportError::Nack
        ));
        assert!(classify(io::Error::from_raw_os_error(libc::ENODEV)).is_fatal());
        assert!(classify(io::Error::from_raw_os_error(libc::EACCES)).is_fatal());
        assert!(!classify(io::Error::from_raw_os_error(libc::EAGAIN)).is_fatal());
    }

    #[test]
    fn test_non_adapter_rejects_address() {
        // /dev/null opens fine but has no i2c ioctls
        let mut session = I2cDevSession::open("/dev/null").unwrap();
        assert!(session.send(&[0x51, 0x80, 0xBE]).is_err());
        assert_eq!(session.address, None);
    }

    #[test]
    fn test_missing_device_is_fatal() {
        let err = I2cDevProvider::new()
            .open_session("/nonexistent/i2c-99")
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
