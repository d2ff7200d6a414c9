//! `devices` subcommand: list hidraw nodes and flag the LED interface.

use super::{DevicesOutput, Result, device};

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::enumerate_devices();

    if json {
        let output = DevicesOutput {
            count: devices.len(),
            devices,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    if devices.is_empty() {
        println!("No hidraw devices found.");
        return Ok(());
    }

    println!(
        "Found {} hidraw device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        let marker = if dev.vendor_interface { "  <- LED" } else { "" };
        println!("  [{}] {}{marker}", i + 1, dev.path);
        match dev.descriptor_prefix {
            Some(ref prefix) => println!("      Descriptor: {prefix}"),
            None => println!("      Descriptor: (unreadable)"),
        }
    }

    Ok(())
}
