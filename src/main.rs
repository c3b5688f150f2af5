//! Cyclometer - wheel revolution counter
//!
//! Console entry point: pick an input device, calibrate, then print distance
//! and speed once a second.

use anyhow::Result;
use cyclometer::capture::device::list_input_devices;
use cyclometer::config::AppConfig;
use cyclometer::detector::velocity::is_stale;
use cyclometer::{RevolutionTracker, FEET_PER_MILE};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cyclometer=info".parse()?),
        )
        .init();

    println!(
        "Cyclometer v{} ({})",
        cyclometer::VERSION,
        cyclometer::BUILD_DATE
    );
    println!();

    let args: Vec<String> = std::env::args().collect();

    let mut device_name: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => {
                list_devices();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("cyclometer {}", cyclometer::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--device" | "-d" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --device requires a device name");
                    return Ok(());
                }
                device_name = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    return Ok(());
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
            _ => {
                // Positional argument - treat as device name if not set
                if device_name.is_none() {
                    device_name = Some(args[i].clone());
                }
            }
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path);

    let device = match device_name.or_else(|| config.device.clone()) {
        Some(device) => device,
        None => match select_device()? {
            Some(device) => {
                config.device = Some(device.clone());
                if let Err(e) = config.save(&config_path) {
                    error!("Failed to remember device selection: {}", e);
                }
                device
            }
            None => return Ok(()),
        },
    };

    run(&device, &config)
}

fn print_help() {
    println!("Usage: cyclometer [OPTIONS] [DEVICE]");
    println!();
    println!("Options:");
    println!("  -l, --list              List available input devices");
    println!("  -d, --device NAME       Capture from the named input device");
    println!("  -c, --config PATH       Read settings from PATH");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Without a device, the remembered device is used or you are asked to pick one.");
    println!("Use \"default\" for the system default input.");
}

fn list_devices() {
    match list_input_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("No input devices found.");
        }
        Ok(devices) => {
            println!("{} inputs", devices.len());
            for (i, device) in devices.iter().enumerate() {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!(
                    "  {}. {}{} ({} channels)",
                    i + 1,
                    device.name,
                    default_marker,
                    device.input_channels
                );
                if !device.sample_rates.is_empty() {
                    println!("     Sample rates: {:?}", device.sample_rates);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }
}

/// Ask which input device to use
fn select_device() -> Result<Option<String>> {
    let devices = list_input_devices().unwrap_or_default();
    if devices.is_empty() {
        println!("No input devices available. Exiting.");
        return Ok(None);
    }

    list_devices();
    println!();
    print!("Which audio device? (1-{}): ", devices.len());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    match input.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= devices.len() => Ok(Some(devices[n - 1].name.clone())),
        _ => {
            println!("Invalid selection. Exiting.");
            Ok(None)
        }
    }
}

fn run(device: &str, config: &AppConfig) -> Result<()> {
    let tracker = RevolutionTracker::with_cpal(config.tracker.clone());

    if let Err(e) = tracker.start(device) {
        println!("Error: could not open '{}': {}", device, e);
        println!("Use --list to see available devices.");
        return Err(e.into());
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    let projection = tracker.projection();
    println!("Wheel: {} feet per revolution", projection.ft_per_rev());

    println!("Calibrating: do not pedal");
    while tracker.is_calibrating() && running.load(Ordering::SeqCst) {
        print!("\r{:>3.0}%", tracker.calibration_progress() * 100.0);
        io::stdout().flush()?;
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();
    if !running.load(Ordering::SeqCst) {
        tracker.stop();
        return Ok(());
    }

    let cal = tracker.calibration();
    info!(
        readings = cal.readings,
        mean_stdev = %format!("{:.2}", cal.mean),
        threshold = %format!("{:.2}", tracker.threshold()),
        "Calibration finished"
    );
    println!("Calibration complete: start pedalling");

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let data = tracker.get_snapshot();

        if data.age(now) >= config.quit_after() {
            println!(
                "{} seconds without update, quitting",
                config.quit_after().as_secs()
            );
            break;
        }

        if !is_stale(&data, now, config.stale_after()) {
            let distance_ft = projection.distance_ft(&data, now);
            println!(
                "{} feet ({:.2} miles) @ {:.2} mph",
                distance_ft as i64,
                distance_ft / FEET_PER_MILE,
                data.velocity_mph
            );
        }

        std::thread::sleep(config.status_interval());
    }

    tracker.stop();
    println!("Done.");

    Ok(())
}
