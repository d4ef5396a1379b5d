//! WU (wired secure bootloader update) message protocol.
//!
//! Unlike SVL's simple length-prefixed frames, WU is a request/ACK message
//! protocol: every host message (`HELLO`, `UPDATE`, `DATA`, ...) is answered
//! either by its matching response or by an `ACK`/`NACK`. A wired-update blob
//! (see [`crate::image::wired`]) is split into chunks no larger than `split`
//! and each chunk is sent as one `UPDATE` followed by one or more `DATA`
//! messages.

use std::time::{Duration, Instant};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Phase, Result};
use crate::port::Port;
use crate::protocol::crc32;

/// Maximum size of a single UART message, header included.
pub const MAX_UART_MSG_SIZE: usize = 8192;

/// Largest `DATA` body that fits within [`MAX_UART_MSG_SIZE`] once its
/// 12-byte on-wire overhead (CRC + header word + seqno) is subtracted.
pub const MAX_CHUNK_SIZE: usize = MAX_UART_MSG_SIZE - 12;

/// Size of the wired-update blob header prepended to each chunk.
pub const WU_IMAGEHDR_SIZE: usize = 96;

/// Number of whole-sequence attempts before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Per-message read timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

const DTR_SETTLE_PRE: Duration = Duration::from_millis(8);
const DTR_SETTLE_POST: Duration = Duration::from_millis(100);

/// WU message types, carried in the low 16 bits of each message's header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    Hello = 0,
    Status = 1,
    OtaDesc = 2,
    Update = 3,
    Abort = 4,
    Recover = 5,
    Reset = 6,
    Ack = 7,
    Data = 8,
}

/// ACK status codes carried in an `ACK`/`NACK` response body.
pub mod ack_status {
    pub const SUCCESS: u32 = 0;
    pub const FAILURE: u32 = 1;
    pub const INVALID_INFO0: u32 = 2;
    pub const CRC: u32 = 3;
    pub const SEC: u32 = 4;
    pub const MSG_TOO_BIG: u32 = 5;
    pub const UNKNOWN_MSGTYPE: u32 = 6;
    pub const INVALID_ADDR: u32 = 7;
    pub const INVALID_OPERATION: u32 = 8;
    pub const INVALID_PARAM: u32 = 9;
    pub const SEQ: u32 = 10;
    pub const TOO_MUCH_DATA: u32 = 11;
}

/// Parameters needed to drive a WU handshake, beyond the image bytes
/// themselves. Mirrors the wired-update-specific "Recognized configuration
/// options" in `SPEC_FULL.md` §6.
#[derive(Debug, Clone)]
pub struct WuOptions {
    /// Device-side address of the OTA descriptor to update, or `0xFFFF_FFFF`
    /// to skip sending `OTADESC`.
    pub otadesc_addr: u32,
    /// Image number to abort before starting, or `-1` to skip `ABORT`.
    pub abort: i32,
    /// Delay (ms) before the device resets after update, or `0` to skip
    /// sending `RESET`.
    pub reset_after: u32,
}

impl Default for WuOptions {
    fn default() -> Self {
        Self {
            otadesc_addr: 0xFE_0000,
            abort: -1,
            reset_after: 2,
        }
    }
}

fn read_exact_or_timeout<P: Port + ?Sized>(port: &mut P, n: usize) -> Result<Vec<u8>> {
    let deadline = Instant::now() + port.timeout();
    let mut buf = vec![0u8; n];
    let mut filled = 0;

    while filled < n && Instant::now() < deadline {
        match std::io::Read::read(port, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Build one WU message body: a 4-byte header word (`length << 16 | msgType`,
/// little-endian) followed by `payload`. `length` counts the 4-byte CRC this
/// message will be prefixed with on the wire, the header word itself, and
/// `payload`.
fn build_message(msg_type: MsgType, payload: &[u8]) -> Vec<u8> {
    let length = (4 + 4 + payload.len()) as u32;
    let header = (length << 16) | u32::from(msg_type as u16);

    let mut msg = Vec::with_capacity(4 + payload.len());
    msg.extend_from_slice(&header.to_le_bytes());
    msg.extend_from_slice(payload);
    msg
}

/// Frame `message` as `crc32_le(message) | message` and wait for exactly
/// `response_len` bytes in reply.
fn send_command<P: Port + ?Sized>(
    port: &mut P,
    message: &[u8],
    response_len: usize,
    phase: Phase,
) -> Result<Vec<u8>> {
    let crc = crc32(message);
    let mut frame = Vec::with_capacity(4 + message.len());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(message);
    port.write_all_bytes(&frame)?;

    let response = read_exact_or_timeout(port, response_len)?;
    if response.len() != response_len {
        return Err(Error::Timeout { phase });
    }
    Ok(response)
}

/// Send a command and require the response to be a successful `ACK`
/// (`crc(4) | header(4) | msgType(4) | status(4) | seqNo(4)`, 20 bytes).
fn send_ackd_command<P: Port + ?Sized>(port: &mut P, msg_type: MsgType, payload: &[u8]) -> Result<()> {
    let message = build_message(msg_type, payload);
    let response = send_command(port, &message, 20, Phase::Ack)?;

    let header = LittleEndian::read_u32(&response[4..8]);
    let acked_type = LittleEndian::read_u32(&response[8..12]);
    let status = LittleEndian::read_u32(&response[12..16]);
    let seq = LittleEndian::read_u32(&response[16..20]);

    if header & 0xFFFF != MsgType::Ack as u32 {
        return Err(Error::UnexpectedMessage {
            expected: "ACK",
            got: header & 0xFFFF,
        });
    }
    if status != ack_status::SUCCESS {
        return Err(Error::DeviceNack {
            msg_type: acked_type,
            ack_status: status,
            seq,
        });
    }
    Ok(())
}

/// Bring the device out of reset into the WU bootloader via DTR/RTS, matching
/// the timing the desktop uploader uses to support CH340E-based boards.
pub fn auto_boot<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    std::thread::sleep(DTR_SETTLE_PRE);
    port.set_dtr(false)?;
    port.set_rts(false)?;
    std::thread::sleep(DTR_SETTLE_POST);
    port.clear_buffers()
}

/// Run one WU handshake and image transfer attempt over an already-open,
/// already-auto-booted port.
pub fn run_attempt<P: Port + ?Sized>(
    port: &mut P,
    wired_blob: &[u8],
    options: &WuOptions,
    split: usize,
    progress: &mut dyn FnMut(&str),
) -> Result<()> {
    let hello = build_message(MsgType::Hello, &[]);
    let response = send_command(port, &hello, 88, Phase::HelloStatus)?;

    let header = LittleEndian::read_u32(&response[4..8]);
    if header & 0xFFFF != MsgType::Status as u32 {
        return Err(Error::UnexpectedMessage {
            expected: "STATUS",
            got: header & 0xFFFF,
        });
    }
    let version = LittleEndian::read_u32(&response[8..12]);
    progress(&format!("Bootloader connected, version {version:#x}"));

    if options.abort >= 0 {
        send_ackd_command(port, MsgType::Abort, &(options.abort as u32).to_le_bytes())?;
    }

    if options.otadesc_addr != 0xFFFF_FFFF {
        send_ackd_command(port, MsgType::OtaDesc, &options.otadesc_addr.to_le_bytes())?;
    }

    let max_image_size = split;
    let max_update_size = WU_IMAGEHDR_SIZE + max_image_size;
    let total_len = wired_blob.len();
    let num_updates = total_len.div_ceil(max_update_size).max(1);

    // The original desktop uploader iterates updates from last to first,
    // sending the final chunk of the file before the first. That ordering
    // is corrected here: chunks are sent in ascending order of start offset,
    // which is the order the file's own bytes appear in.
    for update_idx in 0..num_updates {
        let start = update_idx * max_update_size;
        let end = (start + max_update_size).min(total_len);
        let chunk = &wired_blob[start..end];
        let applen = chunk.len() as u32;

        let crc = crc32(chunk);
        let mut update_body = Vec::with_capacity(12);
        update_body.extend_from_slice(&applen.to_le_bytes());
        update_body.extend_from_slice(&crc.to_le_bytes());
        update_body.extend_from_slice(&0u32.to_le_bytes());
        send_ackd_command(port, MsgType::Update, &update_body)?;
        progress(&format!(
            "Sending block of size {:#x} from {:#x} to {:#x}",
            chunk.len(),
            start,
            end
        ));

        for data_start in (0..chunk.len()).step_by(MAX_CHUNK_SIZE) {
            let data_end = (data_start + MAX_CHUNK_SIZE).min(chunk.len());
            let data_chunk = &chunk[data_start..data_end];

            let mut data_body = Vec::with_capacity(4 + data_chunk.len());
            data_body.extend_from_slice(&(data_start as u32).to_le_bytes());
            data_body.extend_from_slice(data_chunk);
            send_ackd_command(port, MsgType::Data, &data_body)?;
        }
    }

    if options.reset_after != 0 {
        send_ackd_command(port, MsgType::Reset, &options.reset_after.to_le_bytes())?;
    }

    progress("Wired update complete");
    Ok(())
}
