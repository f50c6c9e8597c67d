//! Info command: device and memory configuration.

use anyhow::Result;
use dwt_compute::config::{available_memory, system_memory};
use dwt_compute::{CpuDevice, DeviceContext, DeviceElement, ImageRole, ManagerConfig, format_bytes};
use dwt_core::{ChannelLayout, Dimensions};

pub fn run(verbose: bool) -> Result<()> {
    let device = CpuDevice::new();
    let config = ManagerConfig::from_env();

    println!("Device:            {}", device.name());
    println!("Device alignment:  {} B", device.alignment());
    println!("Host alignment:    {} B", config.host_alignment);
    println!(
        "Effective:         {} B{}",
        config.effective_alignment(device.alignment()),
        if config.honor_device_alignment { "" } else { " (device requirement ignored)" }
    );
    println!("System memory:     {}", format_bytes(system_memory()));
    println!("Available:         {}", format_bytes(available_memory()));
    println!("Host budget:       {}", format_bytes(config.host_budget()));
    println!("Threads:           {}", rayon::current_num_threads());

    if verbose {
        // Formats the manager asks for, per pipeline element.
        let dims = Dimensions::new(1, 1);
        for element in [DeviceElement::Float32, DeviceElement::SignedInt16, DeviceElement::Float16] {
            println!();
            println!("Pipeline {element}:");
            for layout in [ChannelLayout::Gray, ChannelLayout::Rgb] {
                for role in ImageRole::ALL {
                    let desc = role.desc(dims, layout, element);
                    println!(
                        "  {layout:<5} {role:<9} {:?}/{} {:?}",
                        desc.format.order, desc.format.data_type, desc.access
                    );
                }
            }
        }
    }

    Ok(())
}
