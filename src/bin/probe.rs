//! ravens-perch-probe: a one-shot diagnostic CLI. Prints what the
//! reconciliation core would see for a single device path, without
//! starting the daemon or touching the settings store.

use clap::Parser;

use ravens_perch::config::SystemConfig;
use ravens_perch::device_tracker::{node_index, read_fingerprint};
use ravens_perch::hardware::{probe_capabilities, HardwareProbe};
use ravens_perch::profile;
use ravens_perch::types::ProfileOverrides;

#[derive(Parser, Debug)]
#[command(name = "ravens-perch-probe", about = "Inspect a UVC device's fingerprint, capabilities, and selected profile")]
struct Args {
    /// Path to a V4L2 device node, e.g. /dev/video0.
    device_path: String,

    /// CPU score threshold below which hardware encoding is skipped (§4.4).
    #[arg(long, default_value_t = SystemConfig::default().cpu_threshold)]
    cpu_threshold: u8,
}

fn main() {
    ravens_perch::init_logging();
    let args = Args::parse();

    let hardware = HardwareProbe::detect();
    println!("host: cpu_score={} effective_score={}", hardware.cpu_score(), hardware.effective_score());
    println!("encoders: {:?}", hardware.encoders());

    match read_fingerprint(&args.device_path) {
        Ok((fingerprint, hardware_name)) => {
            println!("fingerprint: {fingerprint:?}");
            println!("uid: {}", fingerprint.uid());
            println!("hardware_name: {hardware_name}");
        }
        Err(e) => {
            eprintln!("failed to read fingerprint for {}: {e}", args.device_path);
        }
    }

    if let Some(index) = node_index(&args.device_path) {
        println!("node_index: {index}");
    }

    match probe_capabilities(&args.device_path) {
        Ok(capabilities) => {
            for (format, resolutions) in &capabilities {
                for (resolution, framerates) in resolutions {
                    println!("  {format} {resolution} @ {framerates:?} fps");
                }
            }

            let profile = profile::select(
                &capabilities,
                hardware.effective_score(),
                &ProfileOverrides::default(),
                hardware.encoders(),
                args.cpu_threshold,
            );
            println!("selected profile: {profile:?}");
        }
        Err(e) => {
            eprintln!("failed to probe capabilities for {}: {e}", args.device_path);
            std::process::exit(1);
        }
    }
}
