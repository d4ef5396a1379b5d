//! The two public entry points: `upload_firmware` (SVL) and
//! `update_bootloader` (WU). Each owns the serial port for the duration of
//! the operation and wraps the underlying protocol driver in the outer
//! retry loop described for its protocol.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cancel_context_from_global;
use crate::error::{Error, Result};
use crate::image::{ota, wired};
use crate::port::SerialConfig;
use crate::protocol::{svl, wu};

#[cfg(feature = "native")]
use crate::port::NativePort;
#[cfg(not(feature = "native"))]
use crate::port::Port;

/// Configuration accepted by [`update_bootloader`], carrying every
/// "Recognized configuration option" with its literal default.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Load address baked into the OTA blob header.
    pub load_address_blob: u32,
    /// Load address baked into each wired-update chunk header.
    pub load_address_image: u32,
    /// OTA blob magic number (0xCB = NONSECURE).
    pub magic_num: u8,
    /// Wired-update image type (6 = NONSECURE).
    pub image_type: u8,
    /// Wired-update options byte carried on the first chunk only (bit 0 =
    /// perform OTA after wired download).
    pub options: u8,
    /// Delay in ms before the device resets after the update, or 0 to skip
    /// the RESET message entirely.
    pub reset_after: u32,
    /// Image number to ABORT before starting, or -1 to skip ABORT.
    pub abort: i32,
    /// Device-side OTA descriptor address, or 0xFFFFFFFF to skip OTADESC.
    pub otadesc: u32,
    /// Maximum bytes of application data per wired-update chunk. Must be a
    /// multiple of the flash page size.
    pub split: usize,
    /// Version word baked into the OTA blob header.
    pub version: u16,
    /// Authentication algorithm selector shared by the OTA blob and each
    /// wired-update chunk (0 = disabled).
    pub authalgo: u8,
    /// Encryption algorithm selector shared by the OTA blob and each
    /// wired-update chunk (0 = disabled, 1 = AES-128). 2 (AES-256) is
    /// rejected by the builders: the header's KEK field is a fixed 16
    /// bytes and cannot hold a wrapped 32-byte key.
    pub encalgo: u8,
    /// HMAC key table index.
    pub auth_key_idx: u32,
    /// AES key table index.
    pub enc_key_idx: u32,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            load_address_blob: 0xC000,
            load_address_image: 0x2_0000,
            magic_num: ota::MAGIC_NONSECURE,
            image_type: wired::IMAGE_TYPE_NONSECURE,
            options: 0x1,
            reset_after: 2,
            abort: -1,
            otadesc: 0xFE000,
            split: 0x4_8000,
            version: 0,
            authalgo: 0,
            encalgo: 0,
            auth_key_idx: 8,
            enc_key_idx: 8,
        }
    }
}

impl UpdateOptions {
    fn ota_options(&self) -> ota::OtaOptions {
        ota::OtaOptions {
            load_address: self.load_address_blob,
            magic_num: self.magic_num,
            auth_key_idx: self.auth_key_idx,
            enc_key_idx: self.enc_key_idx,
            version: self.version,
            authalgo: self.authalgo,
            encalgo: self.encalgo,
            ..ota::OtaOptions::default()
        }
    }

    fn wired_options(&self) -> wired::WiredOptions {
        wired::WiredOptions {
            load_address: self.load_address_image,
            image_type: self.image_type,
            authalgo: self.authalgo,
            encalgo: self.encalgo,
            auth_key_idx: self.auth_key_idx,
            enc_key_idx: self.enc_key_idx,
            options: self.options,
            split: self.split,
        }
    }

    fn wu_options(&self) -> wu::WuOptions {
        wu::WuOptions {
            otadesc_addr: self.otadesc,
            abort: self.abort,
            reset_after: self.reset_after,
        }
    }
}

fn read_image(file_path: &Path) -> Result<Vec<u8>> {
    fs::read(file_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(file_path.display().to_string())
        } else {
            Error::Io(e)
        }
    })
}

#[cfg(feature = "native")]
fn open_port(port: &str, baud: u32, timeout: Duration) -> Result<NativePort> {
    let config = SerialConfig::new(port, baud).with_timeout(timeout);
    NativePort::open(&config)
}

#[cfg(not(feature = "native"))]
fn open_port(_port: &str, _baud: u32, _timeout: Duration) -> Result<Box<dyn Port>> {
    Err(Error::PortUnavailable(
        "no native serial backend compiled in".to_string(),
    ))
}

/// Push `file_path` into a device already running the SVL bootloader.
///
/// Opens `port` up to [`svl::MAX_ATTEMPTS`] times (a fresh open counts as one
/// attempt), running one full setup+bootload sequence per attempt. `progress`
/// receives a human-readable line for every significant event.
pub fn upload_firmware(
    file_path: &Path,
    port: &str,
    baud: u32,
    progress: &mut dyn FnMut(&str),
) -> Result<()> {
    let image = read_image(file_path)?;
    let cancel = cancel_context_from_global();

    let mut last_err = None;
    for attempt in 1..=svl::MAX_ATTEMPTS {
        cancel.check()?;
        progress(&format!("Upload attempt {attempt}/{}", svl::MAX_ATTEMPTS));

        match open_port(port, baud, svl::READ_TIMEOUT) {
            Ok(mut serial) => match svl::run_attempt(&mut serial, &image, progress) {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e.to_string()),
            },
            Err(e) => last_err = Some(e.to_string()),
        }
    }

    Err(Error::RetryExhausted {
        attempts: svl::MAX_ATTEMPTS,
        last_reason: last_err.unwrap_or_else(|| "unknown failure".to_string()),
    })
}

/// Reflash the SVL bootloader (or another non-secure image) onto the
/// factory secure bootloader via the WU protocol.
///
/// Builds the OTA blob then the wired-update blob in memory, pre-checks that
/// `port` can be opened at all, then runs up to [`wu::MAX_ATTEMPTS`] full
/// handshake+transfer attempts, each against a freshly opened and
/// auto-booted port.
pub fn update_bootloader(
    bundled_svl_path: &Path,
    port: &str,
    baud: u32,
    options: &UpdateOptions,
    progress: &mut dyn FnMut(&str),
) -> Result<()> {
    let app = read_image(bundled_svl_path)?;
    let cancel = cancel_context_from_global();

    progress("Building OTA blob");
    let ota_blob = ota::build_ota_blob(&options.ota_options(), &app)?;
    progress("Building wired-update blob");
    let wired_blob = wired::build_wired_blob(&options.wired_options(), &ota_blob)?;

    // Pre-check port openability before committing to the retry loop.
    open_port(port, baud, Duration::from_secs(5))
        .map_err(|_| Error::PortUnavailable(port.to_string()))?;

    let wu_options = options.wu_options();
    let mut last_err = None;
    for attempt in 1..=wu::MAX_ATTEMPTS {
        cancel.check()?;
        progress(&format!("Update attempt {attempt}/{}", wu::MAX_ATTEMPTS));

        let mut serial = match open_port(port, baud, wu::READ_TIMEOUT) {
            Ok(serial) => serial,
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            },
        };

        let result = match wu::auto_boot(&mut serial) {
            Ok(()) => wu::run_attempt(&mut serial, &wired_blob, &wu_options, options.split, progress),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e.to_string()),
        }
    }

    Err(Error::RetryExhausted {
        attempts: wu::MAX_ATTEMPTS,
        last_reason: last_err.unwrap_or_else(|| "unknown failure".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_recognized_defaults() {
        let options = UpdateOptions::default();
        assert_eq!(options.load_address_blob, 0xC000);
        assert_eq!(options.load_address_image, 0x2_0000);
        assert_eq!(options.magic_num, 0xCB);
        assert_eq!(options.image_type, 6);
        assert_eq!(options.options, 0x1);
        assert_eq!(options.reset_after, 2);
        assert_eq!(options.abort, -1);
        assert_eq!(options.otadesc, 0xFE000);
        assert_eq!(options.split, 0x4_8000);
        assert_eq!(options.auth_key_idx, 8);
        assert_eq!(options.enc_key_idx, 8);
    }

    #[test]
    fn upload_firmware_reports_missing_file() {
        let path = Path::new("/nonexistent/path/to/firmware.bin");
        let err = upload_firmware(path, "/dev/null", 115200, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn update_bootloader_reports_missing_file() {
        let path = Path::new("/nonexistent/path/to/svl.bin");
        let options = UpdateOptions::default();
        let err = update_bootloader(path, "/dev/null", 115200, &options, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
