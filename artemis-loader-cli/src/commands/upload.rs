//! `upload` subcommand: push an application binary to a device already
//! running the SVL bootloader.

use anyhow::{Context, Result};
use artemis_loader::upload_firmware;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::resolve_port;

pub(crate) fn cmd_upload(firmware: &Path, port: Option<&str>, baud: u32) -> Result<()> {
    println!("{} Loading firmware: {}", style("📦").cyan(), firmware.display());

    let port = resolve_port(port)?;
    println!("{} Using port: {} @ {} baud", style("🔌").cyan(), port, baud);

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // static template string, unwrap is safe
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );

    upload_firmware(firmware, &port, baud, &mut |line| {
        pb.set_message(line.to_string());
        pb.tick();
    })
    .with_context(|| format!("Failed to upload {}", firmware.display()))?;

    pb.finish_and_clear();
    println!("\n{} Upload completed successfully!", style("🎉").green().bold());

    Ok(())
}
