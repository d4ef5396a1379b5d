//! Error types for artemis-loader.

use std::io;
use thiserror::Error;

/// Result type for artemis-loader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Phase in which a timeout occurred, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// SVL baud-detect / version handshake.
    Setup,
    /// SVL frame-by-frame bootload loop.
    Bootload,
    /// WU HELLO/STATUS exchange.
    HelloStatus,
    /// Waiting for an ACK to a WU command.
    Ack,
    /// Waiting for an ACK to a WU DATA chunk.
    Data,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Bootload => "bootload",
            Self::HelloStatus => "hello/status",
            Self::Ack => "ack",
            Self::Data => "data",
        };
        f.write_str(name)
    }
}

/// Error type for artemis-loader operations.
///
/// Forms a closed taxonomy: every failure the SVL and WU protocol drivers
/// can produce is one of these variants. Local recovery (frame retries,
/// whole-handshake retries) happens inside the protocol drivers; everything
/// that escapes a driver is one of these kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The chosen port is no longer enumerated or cannot be opened.
    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    /// Image file missing or unreadable.
    #[error("Firmware file not found: {0}")]
    FileNotFound(String),

    /// A blocking read returned fewer bytes than required.
    #[error("Timeout in {phase} phase")]
    Timeout {
        /// The phase in which the timeout occurred.
        phase: Phase,
    },

    /// Received framed packet has a non-zero CRC residue.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Expected CRC value.
        expected: u16,
        /// Actual CRC value.
        actual: u16,
    },

    /// Received message type is not the one expected for the current state.
    #[error("unexpected message: expected {expected}, got {got:#x}")]
    UnexpectedMessage {
        /// Description of what was expected.
        expected: &'static str,
        /// The message type actually received.
        got: u32,
    },

    /// A well-formed ACK with non-success status.
    #[error("device NACK: msgType={msg_type:#x} ackStatus={ack_status} seq={seq:#x}")]
    DeviceNack {
        /// Message type the NACK refers to.
        msg_type: u32,
        /// ACK status code.
        ack_status: u32,
        /// Sequence number carried in the NACK.
        seq: u32,
    },

    /// SVL retry count or WU attempt count exceeded its cap.
    #[error("retries exhausted after {attempts} attempt(s): {last_reason}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Reason the final attempt failed.
        last_reason: String,
    },

    /// Non-word-aligned load address, INFO0 length constraints violated, or
    /// a `split` value that is not a multiple of the flash page size.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}
