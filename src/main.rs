use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use mower_drive::config::{InputSource, MowerConfig};
use mower_drive::motor::{ProtocolEncoder, ProtocolVariant, mix_with};
use mower_drive::runtime::{self, ExitReason};
use mower_drive::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "mower-drive", version, about = "Joystick drive control for the mower")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the drive loop (default)
    Run(RunArgs),
    /// Send a single all-stop and exit
    Stop(SerialArgs),
    /// Open the port, write an all-stop and print whatever comes back
    ProbeSerial(SerialArgs),
    /// List connected gamepads
    ListJoysticks,
    /// Print the wheel speeds and packets for one stick position
    Encode {
        #[arg(allow_hyphen_values = true)]
        forward: f32,
        #[arg(allow_hyphen_values = true)]
        steer: f32,
        #[arg(long, value_enum)]
        protocol: Option<ProtocolVariant>,
    },
}

#[derive(Debug, Default, Args)]
struct SerialArgs {
    /// Motor controller serial port
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    #[arg(long, value_enum)]
    protocol: Option<ProtocolVariant>,

    /// Log packets instead of opening the port
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    #[command(flatten)]
    serial: SerialArgs,

    #[arg(long, value_enum)]
    input: Option<InputSource>,

    /// Publish status on the state topic
    #[arg(long)]
    telemetry: bool,
}

impl SerialArgs {
    fn apply(&self, config: &mut MowerConfig) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(protocol) = self.protocol {
            config.serial.protocol = protocol;
        }
        if self.dry_run {
            config.serial.dry_run = true;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<MowerConfig> {
    match path {
        Some(path) => Ok(MowerConfig::load(path)?),
        None => Ok(MowerConfig::default()),
    }
}

async fn run(args: RunArgs, mut config: MowerConfig) -> Result<()> {
    args.serial.apply(&mut config);
    if let Some(source) = args.input {
        config.input.source = source;
    }
    if args.telemetry {
        config.telemetry.enabled = true;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, stopping"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        on_signal.cancel();
    });

    match runtime::run(config, cancel).await? {
        ExitReason::Cancelled => info!("Stopped"),
        ExitReason::ShutdownRequested => {
            // Powering off the host is left to the service manager
            info!("Shutdown requested from the joystick");
        }
    }
    Ok(())
}

#[cfg(feature = "gamepad")]
fn list_joysticks() -> Result<()> {
    let pads = mower_drive::input::gamepad::list_gamepads()?;
    if pads.is_empty() {
        println!("No gamepads connected");
    }
    for (index, name) in pads {
        println!("{}: {}", index, name);
    }
    Ok(())
}

#[cfg(not(feature = "gamepad"))]
fn list_joysticks() -> Result<()> {
    Err(mower_drive::config::ConfigError::Invalid {
        field: "input.source",
        reason: "built without the `gamepad` feature".to_string(),
    }
    .into())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args, config).await,
        Command::Stop(args) => {
            args.apply(&mut config);
            config.validate()?;
            runtime::stop_motors(&config)?;
            println!("All-stop sent on {}", config.serial.port);
            Ok(())
        }
        Command::ProbeSerial(args) => {
            args.apply(&mut config);
            config.validate()?;
            let probe: Vec<u8> = ProtocolEncoder::new(config.serial.protocol)
                .stop_packets()
                .iter()
                .flat_map(|packet| packet.as_bytes().to_vec())
                .collect();
            let reply = runtime::probe_serial(&config, &probe, Duration::from_secs(1))?;
            if reply.is_empty() {
                println!("No reply (write succeeded)");
            } else {
                println!("Reply: {:02X?}", reply);
                println!("Text: {}", String::from_utf8_lossy(&reply).trim_end());
            }
            Ok(())
        }
        Command::ListJoysticks => list_joysticks(),
        Command::Encode {
            forward,
            steer,
            protocol,
        } => {
            if let Some(protocol) = protocol {
                config.serial.protocol = protocol;
            }
            config.validate()?;
            let speeds = mix_with(forward, steer, &config.mixer_settings());
            println!("left={:.2} right={:.2}", speeds.left, speeds.right);
            for packet in ProtocolEncoder::new(config.serial.protocol).encode(speeds) {
                println!("{}", packet);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Runtime error: {}", e);
        if let Error::DeviceUnavailable(_) = e {
            eprintln!("Check the serial port path and cable, or pass --dry-run");
        }
        std::process::exit(1);
    }
}
