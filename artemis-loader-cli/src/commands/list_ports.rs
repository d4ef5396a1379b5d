//! `list-ports` subcommand: dump detected serial ports and the auto-detect
//! candidate.

use artemis_loader::host;
use console::style;

pub(crate) fn cmd_list_ports() {
    println!("{}", style("Available Serial Ports").bold().underlined());

    let detected = host::discover_ports();

    if detected.is_empty() {
        println!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };

        let product = port.product.as_deref().unwrap_or("");
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        println!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            if product.is_empty() {
                String::new()
            } else {
                format!(" - {}", style(product).dim())
            }
        );
    }

    if let Ok(auto_port) = host::auto_detect_port() {
        println!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}
