//! Image Builder: constructs the signed/encrypted blobs the secure
//! bootloader expects, from a plain application binary.
//!
//! Two distinct blob formats are built here:
//!
//! - [`ota`]: the OTA blob header wrapped around an application image.
//! - [`wired`]: the wired-update blob, which chunks an (often OTA-wrapped)
//!   image into independently authenticated/encrypted pieces sized for one
//!   `UPDATE` message each.
//!
//! [`keys`] holds the dummy key tables both builders draw from.

pub mod keys;
pub mod ota;
pub mod wired;

pub use ota::{build_ota_blob, OtaOptions};
pub use wired::{build_wired_blob, WiredOptions};
