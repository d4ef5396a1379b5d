//! artemis-loader CLI - command-line tool for programming Apollo3 (Artemis)
//! firmware over SVL and the wired bootloader update protocol.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use std::path::PathBuf;

mod commands;
mod config;

use commands::completions::{cmd_completions, cmd_completions_install};
use commands::list_ports::cmd_list_ports;
use commands::update_bootloader::{cmd_update_bootloader, UpdateBootloaderArgs};
use commands::upload::cmd_upload;
use config::Config;

/// artemis-loader - program Apollo3 (Artemis) firmware over a serial UART.
#[derive(Parser)]
#[command(name = "artemis-loader")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, env = "ARTEMIS_PORT", global = true)]
    port: Option<String>,

    /// Baud rate for data transfer.
    #[arg(short, long, default_value = "115200", env = "ARTEMIS_BAUD", global = true)]
    baud: u32,

    /// Verbose output level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload an application binary to a device running SVL.
    Upload {
        /// Path to the application binary.
        firmware: PathBuf,
    },

    /// Reflash the SVL bootloader via the secure Wired Update protocol.
    UpdateBootloader {
        /// Path to the SVL (or other non-secure) binary to install.
        svl_image: PathBuf,

        /// Load address baked into the OTA blob header.
        #[arg(long, value_parser = parse_hex_u32)]
        load_address_blob: Option<u32>,

        /// Load address baked into each wired-update chunk header.
        #[arg(long, value_parser = parse_hex_u32)]
        load_address_image: Option<u32>,

        /// OTA blob magic number.
        #[arg(long, value_parser = parse_hex_u8)]
        magic_num: Option<u8>,

        /// Wired-update image type.
        #[arg(long)]
        image_type: Option<u8>,

        /// Wired-update options byte carried on the first chunk.
        #[arg(long, value_parser = parse_hex_u8)]
        options: Option<u8>,

        /// Delay in ms before the device resets after the update, or 0 to
        /// skip the RESET message entirely.
        #[arg(long)]
        reset_after: Option<u32>,

        /// Image number to ABORT before starting, or -1 to skip ABORT.
        #[arg(long)]
        abort: Option<i32>,

        /// Device-side OTA descriptor address, or 0xFFFFFFFF to skip OTADESC.
        #[arg(long, value_parser = parse_hex_u32)]
        otadesc: Option<u32>,

        /// Maximum bytes of application data per wired-update chunk.
        #[arg(long, value_parser = parse_hex_usize)]
        split: Option<usize>,

        /// Version word baked into the OTA blob header.
        #[arg(long)]
        version: Option<u16>,

        /// Authentication algorithm selector (0 = disabled).
        #[arg(long)]
        authalgo: Option<u8>,

        /// Encryption algorithm selector (0 = disabled, 1 = AES-128). 2
        /// (AES-256) is rejected: the image header's KEK field has no room
        /// for a wrapped 32-byte key.
        #[arg(long)]
        encalgo: Option<u8>,

        /// HMAC key table index.
        #[arg(long)]
        auth_key_idx: Option<u32>,

        /// AES key table index.
        #[arg(long)]
        enc_key_idx: Option<u32>,
    },

    /// List available serial ports.
    ListPorts,

    /// Generate or install shell completions.
    Completions {
        /// Target shell. Auto-detected from $SHELL if omitted.
        shell: Option<Shell>,

        /// Install the completion script instead of printing it to stdout.
        #[arg(long)]
        install: bool,
    },
}

/// Parse a hexadecimal or decimal `u32` (accepts a leading `0x`/`0X`).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let stripped = s.trim_start_matches("0x").trim_start_matches("0X");
    if stripped.len() != s.len() {
        u32::from_str_radix(stripped, 16).map_err(|e| format!("Invalid hex value: {e}"))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid value: {e}"))
    }
}

/// Parse a hexadecimal or decimal `u8` (accepts a leading `0x`/`0X`).
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let stripped = s.trim_start_matches("0x").trim_start_matches("0X");
    if stripped.len() != s.len() {
        u8::from_str_radix(stripped, 16).map_err(|e| format!("Invalid hex value: {e}"))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid value: {e}"))
    }
}

/// Parse a hexadecimal or decimal `usize` (accepts a leading `0x`/`0X`).
fn parse_hex_usize(s: &str) -> Result<usize, String> {
    let stripped = s.trim_start_matches("0x").trim_start_matches("0X");
    if stripped.len() != s.len() {
        usize::from_str_radix(stripped, 16).map_err(|e| format!("Invalid hex value: {e}"))
    } else {
        s.parse::<usize>().map_err(|e| format!("Invalid value: {e}"))
    }
}

/// Resolve the serial port to use: CLI flag, then remembered config, then
/// auto-detection.
fn resolve_port(port: Option<&str>) -> Result<String> {
    use anyhow::Context;
    use artemis_loader::host;

    if let Some(p) = port {
        return Ok(p.to_string());
    }

    if let Some(p) = Config::load().port {
        return Ok(p);
    }

    let detected = host::auto_detect_port()
        .context("No serial port specified and auto-detection failed. Use -p to specify a port.")?;
    println!(
        "{} Auto-detected port: {} [{}]",
        style("🔍").cyan(),
        style(&detected.name).green(),
        detected.device.name()
    );
    Ok(detected.name)
}

fn install_ctrlc_handler() {
    let _ = ctrlc::set_handler(|| {
        artemis_loader::set_interrupt_flag();
        eprintln!("\n{} Interrupt received, stopping...", style("⚠").yellow());
    });
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    install_ctrlc_handler();

    let config = Config::load();
    let baud = if cli.baud == 115_200 {
        config.baud.unwrap_or(cli.baud)
    } else {
        cli.baud
    };

    match cli.command {
        Commands::Upload { firmware } => {
            cmd_upload(&firmware, cli.port.as_deref(), baud)?;
        },
        Commands::UpdateBootloader {
            svl_image,
            load_address_blob,
            load_address_image,
            magic_num,
            image_type,
            options,
            reset_after,
            abort,
            otadesc,
            split,
            version,
            authalgo,
            encalgo,
            auth_key_idx,
            enc_key_idx,
        } => {
            let args = UpdateBootloaderArgs {
                load_address_blob,
                load_address_image,
                magic_num,
                image_type,
                options,
                reset_after,
                abort,
                otadesc,
                split,
                version,
                authalgo,
                encalgo,
                auth_key_idx,
                enc_key_idx,
            };
            cmd_update_bootloader(&svl_image, cli.port.as_deref(), baud, args)?;
        },
        Commands::ListPorts => {
            cmd_list_ports();
        },
        Commands::Completions { shell, install } => {
            if install {
                cmd_completions_install(shell)?;
            } else {
                let shell = shell.or_else(commands::completions::detect_shell_type).unwrap_or(Shell::Bash);
                cmd_completions(shell);
            }
        },
    }

    Ok(())
}
