//! `update-bootloader` subcommand: reflash the SVL bootloader (or another
//! non-secure image) onto the factory secure bootloader via WU.

use anyhow::{Context, Result};
use artemis_loader::{update_bootloader, UpdateOptions};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::resolve_port;

/// CLI-facing overrides for [`UpdateOptions`], one field per "Recognized
/// configuration option". `None` keeps the library default.
#[derive(Default)]
pub(crate) struct UpdateBootloaderArgs {
    pub load_address_blob: Option<u32>,
    pub load_address_image: Option<u32>,
    pub magic_num: Option<u8>,
    pub image_type: Option<u8>,
    pub options: Option<u8>,
    pub reset_after: Option<u32>,
    pub abort: Option<i32>,
    pub otadesc: Option<u32>,
    pub split: Option<usize>,
    pub version: Option<u16>,
    pub authalgo: Option<u8>,
    pub encalgo: Option<u8>,
    pub auth_key_idx: Option<u32>,
    pub enc_key_idx: Option<u32>,
}

impl UpdateBootloaderArgs {
    fn into_options(self) -> UpdateOptions {
        let defaults = UpdateOptions::default();
        UpdateOptions {
            load_address_blob: self.load_address_blob.unwrap_or(defaults.load_address_blob),
            load_address_image: self.load_address_image.unwrap_or(defaults.load_address_image),
            magic_num: self.magic_num.unwrap_or(defaults.magic_num),
            image_type: self.image_type.unwrap_or(defaults.image_type),
            options: self.options.unwrap_or(defaults.options),
            reset_after: self.reset_after.unwrap_or(defaults.reset_after),
            abort: self.abort.unwrap_or(defaults.abort),
            otadesc: self.otadesc.unwrap_or(defaults.otadesc),
            split: self.split.unwrap_or(defaults.split),
            version: self.version.unwrap_or(defaults.version),
            authalgo: self.authalgo.unwrap_or(defaults.authalgo),
            encalgo: self.encalgo.unwrap_or(defaults.encalgo),
            auth_key_idx: self.auth_key_idx.unwrap_or(defaults.auth_key_idx),
            enc_key_idx: self.enc_key_idx.unwrap_or(defaults.enc_key_idx),
        }
    }
}

pub(crate) fn cmd_update_bootloader(
    svl_image: &Path,
    port: Option<&str>,
    baud: u32,
    args: UpdateBootloaderArgs,
) -> Result<()> {
    println!("{} Loading SVL image: {}", style("📦").cyan(), svl_image.display());

    let port = resolve_port(port)?;
    println!("{} Using port: {} @ {} baud", style("🔌").cyan(), port, baud);

    let options = args.into_options();

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // static template string, unwrap is safe
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );

    update_bootloader(svl_image, &port, baud, &options, &mut |line| {
        pb.set_message(line.to_string());
        pb.tick();
    })
    .with_context(|| format!("Failed to update bootloader from {}", svl_image.display()))?;

    pb.finish_and_clear();
    println!("\n{} Bootloader update completed successfully!", style("🎉").green().bold());

    Ok(())
}
