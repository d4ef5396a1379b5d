//! SVL (SparkFun Variable Loader) frame protocol.
//!
//! A compact length-prefixed packet protocol used to push an application
//! binary into a device already running the SVL bootloader: a baud-detect
//! handshake followed by a frame-by-frame bootload loop, each frame
//! acknowledged by the device before the next is sent.

use std::time::{Duration, Instant};

use crate::error::{Error, Phase, Result};
use crate::port::Port;
use crate::protocol::crc16;

/// SVL frame size: the device accepts application data in 2048-byte chunks.
pub const FRAME_SIZE: usize = 512 * 4;

/// Maximum number of consecutive RETRY responses before giving up on a frame.
pub const MAX_RESEND: u32 = 4;

/// Maximum number of whole-sequence attempts (reopen port, renegotiate, reload).
pub const MAX_ATTEMPTS: u32 = 3;

/// Per-read timeout used for the SVL handshake and bootload loop.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Device reset settle time after opening the port, before talking SVL.
const RESET_SETTLE: Duration = Duration::from_millis(150);

/// SVL command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SvlCommand {
    /// Bootloader version query (sent by device in response to `0x55`).
    Ver = 0x01,
    /// Request the bootloader to begin accepting frames.
    Bl = 0x02,
    /// Device is ready for the next frame.
    Next = 0x03,
    /// Host sends one frame of application data.
    Frame = 0x04,
    /// Device asks the host to resend the current frame.
    Retry = 0x05,
    /// Host signals that all frames have been sent.
    Done = 0x06,
}

impl SvlCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Ver),
            0x02 => Some(Self::Bl),
            0x03 => Some(Self::Next),
            0x04 => Some(Self::Frame),
            0x05 => Some(Self::Retry),
            0x06 => Some(Self::Done),
            _ => None,
        }
    }
}

/// A decoded (or failed-to-decode) SVL packet.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Command byte, valid only when `timeout` is `false`.
    pub cmd: u8,
    /// Packet payload (excludes the command byte and trailing CRC).
    pub data: Vec<u8>,
    /// Whether the CRC-16 over `cmd|data|crc` validated to zero.
    pub crc_ok: bool,
    /// Whether the read timed out before a complete packet arrived.
    pub timeout: bool,
}

fn read_up_to<P: Port + ?Sized>(port: &mut P, n: usize) -> Result<Vec<u8>> {
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

/// Wait for one SVL packet: `len_be_u16 | cmd_u8 | payload | crc_be_u16`.
///
/// If fewer than two bytes of the length prefix arrive, the result is a
/// timeout. A length of zero is an empty packet, returned successfully
/// without a further read (this is a deliberate reading of the original
/// bootloader's behavior: see `SPEC_FULL.md` §9 for the rationale).
pub fn wait_for_packet<P: Port + ?Sized>(port: &mut P) -> Result<Packet> {
    let len_bytes = read_up_to(port, 2)?;
    if len_bytes.len() < 2 {
        return Ok(Packet {
            timeout: true,
            ..Default::default()
        });
    }
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

    if len == 0 {
        return Ok(Packet {
            cmd: 0,
            data: Vec::new(),
            crc_ok: true,
            timeout: false,
        });
    }

    let body = read_up_to(port, len)?;
    if body.len() < len {
        return Ok(Packet {
            timeout: true,
            ..Default::default()
        });
    }

    // A well-formed packet carries at least cmd(1) + crc(2); a shorter body
    // is a malformed frame rather than a panic.
    if len < 3 {
        return Ok(Packet {
            cmd: body[0],
            data: Vec::new(),
            crc_ok: false,
            timeout: false,
        });
    }

    let cmd = body[0];
    let data = body[1..len - 2].to_vec();
    let crc_ok = crc16(&body) == 0;

    Ok(Packet {
        cmd,
        data,
        crc_ok,
        timeout: false,
    })
}

/// Send one SVL packet: `num_bytes_be_u16 | cmd | data | crc16(cmd|data)_be`.
pub fn send_packet<P: Port + ?Sized>(port: &mut P, cmd: SvlCommand, data: &[u8]) -> Result<()> {
    let num_bytes = (3 + data.len()) as u16;

    let mut payload = Vec::with_capacity(1 + data.len());
    payload.push(cmd as u8);
    payload.extend_from_slice(data);
    let crc = crc16(&payload);

    let mut frame = Vec::with_capacity(2 + payload.len() + 2);
    frame.extend_from_slice(&num_bytes.to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc.to_be_bytes());

    port.write_all_bytes(&frame)
}

/// Run one SVL upload attempt (setup + bootload) over an already-open port.
///
/// This is the unit that the outer retry loop in [`crate::upload_firmware`]
/// repeats up to [`MAX_ATTEMPTS`] times, each time against a freshly opened
/// port.
pub fn run_attempt<P: Port + ?Sized>(
    port: &mut P,
    image: &[u8],
    progress: &mut dyn FnMut(&str),
) -> Result<()> {
    std::thread::sleep(RESET_SETTLE);
    phase_setup(port, progress)?;
    phase_bootload(port, image, progress)
}

fn phase_setup<P: Port + ?Sized>(port: &mut P, progress: &mut dyn FnMut(&str)) -> Result<()> {
    port.clear_buffers()?;
    port.write_all_bytes(&[0x55])?;

    let packet = wait_for_packet(port)?;
    if packet.timeout {
        return Err(Error::Timeout { phase: Phase::Setup });
    }
    if !packet.crc_ok {
        return Err(Error::CrcMismatch {
            expected: 0,
            actual: crc16(&[&[packet.cmd][..], &packet.data[..]].concat()),
        });
    }

    let version = packet
        .data
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    progress(&format!("Bootloader version {version:#x}"));

    send_packet(port, SvlCommand::Bl, &[])
}

fn phase_bootload<P: Port + ?Sized>(
    port: &mut P,
    image: &[u8],
    progress: &mut dyn FnMut(&str),
) -> Result<()> {
    let total_frames = image.len().div_ceil(FRAME_SIZE).max(1);
    let mut curr_frame: usize = 1;
    let mut resend_count: u32 = 0;

    loop {
        let packet = wait_for_packet(port)?;
        if packet.timeout {
            return Err(Error::Timeout {
                phase: Phase::Bootload,
            });
        }
        if !packet.crc_ok {
            return Err(Error::CrcMismatch {
                expected: 0,
                actual: 1,
            });
        }

        match SvlCommand::from_byte(packet.cmd) {
            Some(SvlCommand::Next) => {
                curr_frame += 1;
                resend_count = 0;
            },
            Some(SvlCommand::Retry) => {
                resend_count += 1;
                if resend_count >= MAX_RESEND {
                    return Err(Error::RetryExhausted {
                        attempts: resend_count,
                        last_reason: "device requested RETRY too many times".to_string(),
                    });
                }
            },
            _ => {
                return Err(Error::UnexpectedMessage {
                    expected: "NEXT or RETRY",
                    got: u32::from(packet.cmd),
                });
            },
        }

        if curr_frame <= total_frames {
            let start = (curr_frame - 1) * FRAME_SIZE;
            let end = (start + FRAME_SIZE).min(image.len());
            progress(&format!("Sending frame {curr_frame}/{total_frames}"));
            send_packet(port, SvlCommand::Frame, &image[start..end])?;
        } else {
            send_packet(port, SvlCommand::Done, &[])?;
            progress("Upload complete");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};

    /// In-memory `Port` used to drive the SVL state machine in tests
    /// without a real serial device.
    struct MockPort {
        to_host: VecDeque<u8>,
        from_host: Vec<u8>,
        timeout: Duration,
    }

    impl MockPort {
        fn new() -> Self {
            Self {
                to_host: VecDeque::new(),
                from_host: Vec::new(),
                timeout: READ_TIMEOUT,
            }
        }

        fn push_device_bytes(&mut self, bytes: &[u8]) {
            self.to_host.extend(bytes);
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.to_host.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
            }
            let mut n = 0;
            while n < buf.len() {
                if let Some(b) = self.to_host.pop_front() {
                    buf[n] = b;
                    n += 1;
                } else {
                    break;
                }
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.from_host.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
            Ok(())
        }
        fn baud_rate(&self) -> u32 {
            115200
        }
        fn clear_buffers(&mut self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn set_dtr(&mut self, _level: bool) -> Result<()> {
            Ok(())
        }
        fn set_rts(&mut self, _level: bool) -> Result<()> {
            Ok(())
        }
        fn read_cts(&mut self) -> Result<bool> {
            Ok(false)
        }
        fn read_dsr(&mut self) -> Result<bool> {
            Ok(false)
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn device_packet(cmd: SvlCommand, data: &[u8]) -> Vec<u8> {
        let mut payload = vec![cmd as u8];
        payload.extend_from_slice(data);
        let crc = crc16(&payload);
        let num_bytes = (3 + data.len()) as u16;
        let mut frame = num_bytes.to_be_bytes().to_vec();
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame
    }

    #[test]
    fn send_packet_round_trips_through_wait_for_packet() {
        let mut port = MockPort::new();
        send_packet(&mut port, SvlCommand::Frame, &[1, 2, 3]).unwrap();
        port.push_device_bytes(&port.from_host.clone());
        let packet = wait_for_packet(&mut port).unwrap();
        assert!(!packet.timeout);
        assert!(packet.crc_ok);
        assert_eq!(packet.cmd, SvlCommand::Frame as u8);
        assert_eq!(packet.data, vec![1, 2, 3]);
    }

    #[test]
    fn empty_packet_parses_without_further_reads() {
        let mut port = MockPort::new();
        port.push_device_bytes(&[0x00, 0x00]);
        let packet = wait_for_packet(&mut port).unwrap();
        assert!(!packet.timeout);
        assert!(packet.crc_ok);
        assert_eq!(packet.cmd, 0);
        assert!(packet.data.is_empty());
    }

    #[test]
    fn short_length_prefix_is_a_timeout() {
        let mut port = MockPort::new();
        port.push_device_bytes(&[0x00]);
        let packet = wait_for_packet(&mut port).unwrap();
        assert!(packet.timeout);
    }

    /// S1: SVL happy path, 3 frames over a 5000-byte image.
    #[test]
    fn s1_happy_path_three_frames() {
        let image = vec![0xAAu8; 5000];
        let mut port = MockPort::new();

        port.push_device_bytes(&device_packet(SvlCommand::Ver, &5000u32.to_be_bytes()));
        for _ in 0..3 {
            port.push_device_bytes(&device_packet(SvlCommand::Next, &[]));
        }

        let mut log = Vec::new();
        run_attempt(&mut port, &image, &mut |m| log.push(m.to_string())).unwrap();

        // cmd=BL, then FRAME x3, then DONE: four outgoing packets.
        assert!(log.iter().any(|m| m.contains("frame 1/3")));
        assert!(log.iter().any(|m| m.contains("frame 3/3")));
        assert!(log.iter().any(|m| m.contains("complete")));
    }

    /// S2: one RETRY, then success; resend_count must reset to 0 on next NEXT.
    #[test]
    fn s2_retry_once_then_success() {
        let image = vec![0xAAu8; FRAME_SIZE];
        let mut port = MockPort::new();

        port.push_device_bytes(&device_packet(SvlCommand::Ver, &0u32.to_be_bytes()));
        port.push_device_bytes(&device_packet(SvlCommand::Next, &[]));
        port.push_device_bytes(&device_packet(SvlCommand::Retry, &[]));
        port.push_device_bytes(&device_packet(SvlCommand::Next, &[]));

        let mut log = Vec::new();
        run_attempt(&mut port, &image, &mut |m| log.push(m.to_string())).unwrap();
        assert!(log.iter().any(|m| m.contains("complete")));
    }

    /// S3: RETRY four times in a row exhausts the resend cap.
    #[test]
    fn s3_retry_cap_exhausted() {
        let image = vec![0xAAu8; FRAME_SIZE];
        let mut port = MockPort::new();

        port.push_device_bytes(&device_packet(SvlCommand::Ver, &0u32.to_be_bytes()));
        port.push_device_bytes(&device_packet(SvlCommand::Next, &[]));
        for _ in 0..MAX_RESEND {
            port.push_device_bytes(&device_packet(SvlCommand::Retry, &[]));
        }

        let err = run_attempt(&mut port, &image, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { .. }));
    }
}
