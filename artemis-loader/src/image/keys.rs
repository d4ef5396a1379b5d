//! Dummy key tables for image authentication/encryption.
//!
//! These are the vendor bootloader's placeholder key material: real
//! deployments provision their own keys into INFO0 and substitute them here.
//! Key indices 8-15 are reserved for INFO0-resident keys; this table's
//! layout follows that convention.

/// First usable AES key index (INFO0-resident keys start here).
pub const MIN_AES_KEY_IDX: u32 = 8;
/// Last usable AES key index.
pub const MAX_AES_KEY_IDX: u32 = 15;
/// First usable HMAC key index.
pub const MIN_HMAC_KEY_IDX: u32 = 8;
/// Last usable HMAC key index.
pub const MAX_HMAC_KEY_IDX: u32 = 15;

/// Fixed key used to encrypt the session AES key for an `INFO0_NOOTA` image.
pub const INFO_KEY: u32 = 0xD894_E09E;
/// Fixed key used to encrypt the session AES key for any other image type.
pub const FLASH_KEY: u32 = 0x1234_4321;

/// Bytes per key-table slot.
pub const KEY_IDX_BYTES: usize = 16;

/// All-zero IV used when wrapping a session key under a key-table entry.
pub const IV_VAL_0: [u8; 16] = [0u8; 16];

#[rustfmt::skip]
const HMAC_KEY_TABLE: [u8; 4 * KEY_IDX_BYTES * 2] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55,
    0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55,
    0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE,
    0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE,
];

#[rustfmt::skip]
const AES_KEY_TABLE: [u8; KEY_IDX_BYTES * 8] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
    0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55,
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
    0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5,
    0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE, 0xAD, 0xDE,
];

/// HMAC key slot for `key_idx` (relative to index 0, i.e. caller subtracts
/// [`MIN_HMAC_KEY_IDX`] first): one 32-byte (`AM_HMAC_SIG_SIZE`) row.
pub fn hmac_key_slot(key_idx: u32) -> &'static [u8] {
    let start = key_idx as usize * 32;
    &HMAC_KEY_TABLE[start..start + 32]
}

/// AES key slot for `key_idx` (relative to index 0), `key_size` bytes long.
/// Rows are strided by [`KEY_IDX_BYTES`] regardless of `key_size`: callers
/// currently only ever request 16-byte (AES-128) slots, since the image
/// header formats have no room for a wrapped 32-byte AES-256 key, but the
/// stride still holds for a wider read as long as `key_idx` leaves enough
/// trailing rows in the table.
pub fn aes_key_slot(key_idx: u32, key_size: usize) -> &'static [u8] {
    let start = key_idx as usize * KEY_IDX_BYTES;
    &AES_KEY_TABLE[start..start + key_size]
}
