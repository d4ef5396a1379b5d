//! Protocol implementations: checksums, the SVL frame protocol, and the
//! WU (wired bootloader update) message protocol.

pub mod crc;
pub mod crypto;
pub mod svl;
pub mod wu;

pub use crc::{crc16, crc32};
