// SPDX-License-Identifier: GPL-3.0-only
//! Monitor control over DDC/CI and EDID
//!
//! This crate speaks the two protocols a computer uses to talk to an
//! external monitor over the video cable's I2C lines: DDC/CI for reading and
//! changing settings (brightness, contrast, input source, ...) and EDID for
//! reading the display's identity block.
//!
//! The byte transport is pluggable through [`Session`]; a Linux `/dev/i2c-N`
//! implementation is included behind the `i2c-dev` feature and
//! [`MockDisplay`] simulates a monitor for tests.
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(all(feature = "i2c-dev", target_os = "linux"))]
//! # fn example() -> monitor_ddc::Result<()> {
//! use monitor_ddc::session::i2c_dev::I2cDevProvider;
//! use monitor_ddc::{ControlId, SessionProvider, get_control, read_edid, set_control};
//!
//! let mut session = I2cDevProvider::new().open_session("4")?;
//! set_control(&mut session, ControlId::Brightness, 60)?;
//! if let Some(current) = get_control(&mut session, ControlId::Brightness)?.current_value() {
//!     println!("brightness is {}", current);
//! }
//! let edid = read_edid(&mut session)?;
//! println!("{:?}", edid.record.display_name());
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub mod config;
pub mod controls;
pub mod error;
pub mod protocols;
pub mod session;

pub use config::{Config, TransactionConfig};
pub use controls::{Access, ControlId, ControlSpec};
pub use error::{DdcError, Result};
pub use protocols::ddc_ci::{
    FeatureKind, FrameError, ReadRequest, ReadResponse, VcpEngine, VcpValue, WriteCommand,
};
pub use protocols::edid::{DecodedEdid, EdidError, EdidRecord};
pub use session::{
    DisplayId, MockDisplay, MockProvider, Session, SessionProvider, SessionRegistry,
    SharedSession, TransportError,
};

/// Set a control with the default timing
///
/// Returns once the settle delay has passed. Displays do not acknowledge
/// writes, so `Ok` only means the frame was delivered.
pub fn set_control<S: Session + ?Sized>(session: &mut S, control: ControlId, value: u16) -> Result<()> {
    VcpEngine::default().write(session, &WriteCommand::new(control, value))
}

/// Read a control with the default timing and retry policy
pub fn get_control<S: Session + ?Sized>(session: &mut S, control: ControlId) -> Result<ReadResponse> {
    VcpEngine::default().get(session, control)
}

/// Fetch and decode the display's EDID base block
///
/// A bad checksum is reported through [`DecodedEdid::checksum_ok`], not as
/// an error.
pub fn read_edid<S: Session + ?Sized>(session: &mut S) -> Result<DecodedEdid> {
    let raw = session
        .read_identity_block()
        .map_err(|e| DdcError::from_transport(session.id(), e))?;

    let decoded = protocols::edid::decode(&raw).map_err(|source| DdcError::Edid {
        id: session.id(),
        source,
    })?;

    debug!(
        display_id = %session.id(),
        manufacturer = %decoded.record.manufacturer,
        checksum_ok = decoded.checksum_ok,
        "Read EDID"
    );
    Ok(decoded)
}
