//! # artemis-loader
//!
//! A library for programming firmware onto Apollo3 ("Artemis") modules over
//! a serial UART, via two bootloader protocols:
//!
//! - **SVL** (SparkFun Variable Loader): a compact framed protocol for
//!   pushing an application binary into a device already running SVL.
//! - **WU** (Wired Update): the vendor's secure-bootloader reflashing
//!   protocol, used to (re)install the SVL bootloader itself. Building a WU
//!   image involves wrapping the application in an OTA blob, then splitting
//!   that blob into one or more wired-update chunks (see [`image`]).
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate.
//!
//! ## Cancellation Model
//!
//! Long-running operations ([`upload_firmware`], [`update_bootloader`]) check
//! a [`CancelContext`] at phase boundaries. This allows an embedding
//! application (e.g. a CLI) to signal interruption (e.g. Ctrl-C) and have the
//! operation stop gracefully, without the core needing to poll anything
//! internally.
//!
//! ### Quick Start
//!
//! ```ignore
//! use artemis_loader::{CancelContext, cancel_context_from_global};
//!
//! // Option 1: use the global interrupt flag (set by a CLI on Ctrl-C).
//! let cancel = cancel_context_from_global();
//!
//! // Option 2: a custom cancel context.
//! use std::sync::atomic::{AtomicBool, Ordering};
//! let flag = AtomicBool::new(false);
//! let cancel = CancelContext::new(move || flag.load(Ordering::SeqCst));
//!
//! // Option 3: no cancellation.
//! let cancel = CancelContext::none();
//! ```
//!
//! ## Features
//!
//! - `native` (default): native serial port support via `serialport`.
//! - `serde`: serialization support for config-facing data types.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use artemis_loader::upload_firmware;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     upload_firmware(Path::new("firmware.bin"), "/dev/ttyUSB0", 115200, &mut |line| {
//!         println!("{line}");
//!     })?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod device;
pub mod error;
pub mod host;
pub mod image;
pub mod orchestrator;
pub mod port;
pub mod protocol;

/// Global interrupt flag for CLI-to-library communication.
///
/// Set by a CLI when Ctrl-C is received, and checked by
/// [`cancel_context_from_global`] during long-running operations.
static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);

/// Explicit cancellation context for long-running library operations.
///
/// Unlike the global interrupt checker, this is passed explicitly through the
/// call chain, making it testable and composable. The protocol drivers in
/// [`orchestrator`] check it at phase boundaries (before opening a port for a
/// new attempt); it is not threaded into the per-byte read/write path.
#[derive(Clone, Default)]
pub struct CancelContext {
    checker: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl CancelContext {
    /// Create a new cancel context with the given checker function.
    #[must_use]
    pub fn new<F>(checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            checker: Some(Arc::new(checker)),
        }
    }

    /// Create a no-op cancel context (always returns "not cancelled").
    #[must_use]
    pub fn none() -> Self {
        Self { checker: None }
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.checker.as_ref().is_some_and(|c| c())
    }

    /// Check and return an `Io`/`Interrupted` error if cancelled.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            return Err(crate::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "operation cancelled",
            )));
        }
        Ok(())
    }
}

impl From<fn() -> bool> for CancelContext {
    fn from(checker: fn() -> bool) -> Self {
        Self::new(checker)
    }
}

/// Create a `CancelContext` that bridges to the global interrupt flag.
#[must_use]
pub fn cancel_context_from_global() -> CancelContext {
    CancelContext::new(|| INTERRUPT_FLAG.load(Ordering::SeqCst))
}

/// Set the global interrupt flag (for a CLI to call when Ctrl-C is received).
pub fn set_interrupt_flag() {
    INTERRUPT_FLAG.store(true, Ordering::SeqCst);
}

/// Clear the global interrupt flag.
pub fn clear_interrupt_flag() {
    INTERRUPT_FLAG.store(false, Ordering::SeqCst);
}

/// Returns whether interruption was requested.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_FLAG.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    INTERRUPT_FLAG.store(value, Ordering::SeqCst);
}

pub use device::{DetectedPort, DeviceKind, TransportKind};
pub use error::{Error, Phase, Result};
pub use host::{auto_detect_port, discover_artemis_ports, discover_ports};
pub use image::{OtaOptions, WiredOptions};
pub use orchestrator::{update_bootloader, upload_firmware, UpdateOptions};
pub use port::{Port, PortEnumerator, PortInfo, SerialConfig};
pub use protocol::{crc16, crc32};

#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
