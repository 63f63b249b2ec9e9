//! E3K Application
//!
//! Command-line driver for the E3K acquisition board.
//!
//! # Usage
//!
//! ```bash
//! # Acquire 100 samples from the simulated device
//! e3k acquire --samples 100
//!
//! # Acquire from a USB serial port, channels A0 and A3, 500 Hz
//! e3k acquire --device serial --port /dev/ttyUSB0 --mode serial --rate 500 --channels 0,3
//!
//! # Acquire over Wi-Fi as JSON
//! e3k acquire --device tcp --addr 192.168.4.1:3333 --mode wifi --rate 1000 --json
//!
//! # Show the control word for a configuration
//! e3k encode --mode bluetooth --rate 1000
//!
//! # List serial ports
//! e3k ports
//! ```

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use e3k_core::types::{AdcChannel, ChannelMask, CommMode, Configuration, DataRate};
use e3k_native::acquisition::{Acquisition, AcquisitionError, AcquisitionSettings, SampleBuffer};
use e3k_native::bridge::{SimulatedDevice, StreamTransport, Transport};

/// E3K Application
#[derive(Parser, Debug)]
#[command(name = "e3k")]
#[command(author, version, about = "E3K sensor board acquisition tool", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure the device, read samples, then stop the stream
    Acquire {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Number of samples to read
        #[arg(short = 'n', long, default_value = "10")]
        samples: usize,

        /// Wait after configuring the device, in milliseconds
        #[arg(long, default_value = "1000")]
        settle_ms: u64,

        /// Print the sample buffer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the control word for a configuration
    Encode {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List available serial ports
    Ports,
}

/// Link to the device.
#[derive(Args, Debug)]
struct DeviceArgs {
    /// Device connection type: serial, tcp, or simulate
    #[arg(short, long, default_value = "simulate")]
    device: String,

    /// Serial port path (e.g., /dev/ttyUSB0, /dev/rfcomm0 or COM3)
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Device address for tcp (e.g., 192.168.4.1:3333)
    #[arg(long)]
    addr: Option<String>,

    /// Read timeout in milliseconds
    #[arg(long, default_value = "100")]
    timeout_ms: u64,
}

/// Acquisition configuration sent to the device.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Communication mode: serial, bluetooth, wifi, or default
    #[arg(short, long, default_value = "bluetooth")]
    mode: String,

    /// Sampling rate in Hz: 10, 100, 500, or 1000
    #[arg(short, long, default_value = "10")]
    rate: u16,

    /// Comma-separated channel indices 0-5 (all channels if omitted)
    #[arg(short, long)]
    channels: Option<String>,

    /// Clear the stream bit
    #[arg(long)]
    stream_off: bool,
}

impl ConfigArgs {
    fn to_configuration(&self) -> anyhow::Result<Configuration> {
        let mask = match &self.channels {
            Some(list) => parse_channels(list)?,
            None => ChannelMask::ALL,
        };

        Ok(Configuration {
            stream_on: !self.stream_off,
            mode: parse_mode(&self.mode)?,
            rate: DataRate::from_hz(self.rate)?,
            channels: mask,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("E3K v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Acquire {
            device,
            config,
            samples,
            settle_ms,
            json,
        } => {
            let config = config.to_configuration()?;
            let settings = AcquisitionSettings {
                settle_delay: Duration::from_millis(settle_ms),
                ..Default::default()
            };
            run_acquire(&device, &config, samples, settings, json)?;
        }
        Commands::Encode { config } => {
            print_control_word(&config.to_configuration()?);
        }
        Commands::Ports => {
            list_ports();
        }
    }

    Ok(())
}

/// Open the transport named by `--device`
fn open_transport(args: &DeviceArgs) -> anyhow::Result<Box<dyn Transport>> {
    let timeout = Duration::from_millis(args.timeout_ms);

    match args.device.to_lowercase().as_str() {
        "simulate" => {
            info!("Using simulated device");
            Ok(Box::new(StreamTransport::new(SimulatedDevice::new())))
        }
        "tcp" => {
            let addr = args.addr.as_deref().context("--addr is required for tcp")?;
            let transport = StreamTransport::<std::net::TcpStream>::connect_tcp(addr, timeout)
                .with_context(|| format!("Failed to connect to {addr}"))?;
            Ok(Box::new(transport))
        }
        #[cfg(feature = "serial")]
        "serial" => {
            use e3k_native::bridge::{SerialSettings, SerialTransport};

            let port = args.port.as_deref().context("--port is required for serial")?;
            let settings = SerialSettings {
                baud_rate: args.baud,
                timeout,
                ..SerialSettings::new(port)
            };
            let transport = SerialTransport::open_serial(&settings)
                .with_context(|| format!("Failed to open {port}"))?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "serial"))]
        "serial" => bail!("Serial support not enabled. Rebuild with --features serial"),
        other => bail!("Unknown device type: {other} (expected serial, tcp, or simulate)"),
    }
}

/// Run one acquisition and print the result
fn run_acquire(
    device: &DeviceArgs,
    config: &Configuration,
    samples: usize,
    settings: AcquisitionSettings,
    json: bool,
) -> anyhow::Result<()> {
    let transport = open_transport(device)?;
    let mut acquisition = Acquisition::new(transport).with_settings(settings);

    match acquisition.run(config, samples) {
        Ok(buffer) => {
            if !buffer.is_complete() {
                warn!(
                    "Collected {}/{} samples ({} frames skipped)",
                    buffer.len(),
                    buffer.requested(),
                    buffer.skipped()
                );
            }
            print_buffer(&buffer, json)
        }
        Err(AcquisitionError::ReadFailed { source, partial }) => {
            print_buffer(&partial, json)?;
            let context = format!("Acquisition stopped after {} samples", partial.len());
            Err(anyhow!(source).context(context))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_buffer(buffer: &SampleBuffer, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(buffer)?);
        return Ok(());
    }

    let header: Vec<String> = buffer
        .channels()
        .active_channels()
        .map(|ch| ch.to_string())
        .collect();
    println!("{}", header.join("\t"));

    for sample in buffer {
        let row: Vec<String> = sample.values().iter().map(u16::to_string).collect();
        println!("{}", row.join("\t"));
    }

    Ok(())
}

fn print_control_word(config: &Configuration) {
    let word = config.control_word();
    let text = word.to_ascii();

    println!("Control word: {} ({})", word, word.bits());
    println!("Wire bytes:   {:02X?}", text.as_bytes());
    println!(
        "Stream {}, {} mode, {}, channels {}",
        if config.stream_on { "on" } else { "off" },
        config.mode,
        config.rate,
        config.channels
    );
    for ch in config.channels.active_channels() {
        println!("  {} <- GPIO{}", ch, ch.gpio());
    }
}

fn list_ports() {
    info!("Scanning for serial ports...");

    #[cfg(feature = "serial")]
    {
        let ports = e3k_native::bridge::list_ports();
        if ports.is_empty() {
            info!("  (none found)");
        }
        for port in ports {
            println!("{port}");
        }
    }

    #[cfg(not(feature = "serial"))]
    warn!("Serial support not enabled. Rebuild with --features serial");
}

/// Parse a communication mode name
fn parse_mode(name: &str) -> anyhow::Result<CommMode> {
    match name.to_lowercase().as_str() {
        "serial" | "usb" => Ok(CommMode::Serial),
        "bluetooth" | "bt" => Ok(CommMode::Bluetooth),
        "wifi" => Ok(CommMode::WiFi),
        "default" => Ok(CommMode::Default),
        other => bail!("Unknown mode: {other} (expected serial, bluetooth, wifi, or default)"),
    }
}

/// Parse a comma-separated list of channel indices
fn parse_channels(list: &str) -> anyhow::Result<ChannelMask> {
    let mut mask = ChannelMask::NONE;

    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let index: usize = item.parse().with_context(|| format!("Invalid channel index: {item}"))?;
        let channel = AdcChannel::from_index(index)
            .with_context(|| format!("Channel out of range: {index}"))?;
        mask = mask.with(channel);
    }

    Ok(mask)
}
