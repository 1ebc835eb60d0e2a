//! serial-line-controller CLI
//!
//! `list` shows the serial ports on this host, `monitor` holds a line-oriented
//! session with one device (records to stdout, stdin lines to the device) and
//! reconnects when the device goes away, `config` prints or writes the
//! effective configuration.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serial_line_controller::authorization::{enumerate_ports, PortCandidate, PortSelector};
use serial_line_controller::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serial_line_controller::{
    ConnectionOverrides, ControllerError, ControllerOptions, DisconnectHandler, SerialController,
    SystemPortAuthorizer, WhitelistSelector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "serial-line-controller")]
#[command(about = "Line-oriented command channel to a serial microcontroller")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config file; RUST_LOG wins over both)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and whether they are whitelisted
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Connect to a device and exchange lines with it
    Monitor(MonitorArgs),
    /// Print the effective configuration
    Config {
        /// Write it to this file instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Serial port to use (granted without selection)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides config file)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Record delimiter, escapes such as \r\n allowed (overrides config file)
    #[arg(short, long)]
    delimiter: Option<String>,

    /// Print raw chunks instead of delimiter-framed records
    #[arg(long)]
    raw: bool,

    /// Exit instead of reconnecting when the device goes away
    #[arg(long)]
    no_reconnect: bool,
}

#[derive(Serialize)]
struct ListedPort {
    #[serde(flatten)]
    candidate: PortCandidate,
    whitelisted: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(level) = &cli.log_level {
        loader.config_mut().logging.level = level.clone();
    }
    init_tracing(&loader.config().logging);
    debug!("Configuration loaded from {:?}", loader.config_path);

    match cli.command {
        Command::List { json } => list_ports(loader.config(), json).await,
        Command::Monitor(args) => monitor(loader.into_config(), args).await,
        Command::Config { write } => {
            match write {
                Some(path) => {
                    loader.save_to(&path)?;
                    info!("Configuration written to {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(loader.config())?),
            }
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn list_ports(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let selector = WhitelistSelector::from_config(&config.devices);
    let ports: Vec<ListedPort> = enumerate_ports()
        .await?
        .into_iter()
        .map(|candidate| ListedPort {
            whitelisted: selector.is_permitted(&candidate),
            candidate,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        let ids = match (port.candidate.vendor_id, port.candidate.product_id) {
            (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<20} {:<10} {:<30} {}",
            port.candidate.port_id,
            ids,
            port.candidate.display_name,
            if port.whitelisted { "whitelisted" } else { "" }
        );
    }
    Ok(())
}

async fn monitor(mut config: Config, args: MonitorArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = args.port {
        config.devices.authorized_ports = vec![port];
    }
    if let Some(delimiter) = args.delimiter {
        config.framing.delimiter = delimiter;
    }
    if args.raw {
        config.framing.decode_text = false;
    }
    config.validate()?;

    let overrides = ConnectionOverrides {
        baud_rate: args.baud,
        ..Default::default()
    };
    let reconnect_delay = config.devices.reconnect_delay();
    let controller = SerialController::new(
        SystemPortAuthorizer::from_config(&config.devices),
        ControllerOptions::from_config(&config),
    );
    let delimiter = controller.options().delimiter.clone();

    let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
    let on_disconnect: DisconnectHandler = Arc::new(move |error: ControllerError| {
        let _ = lost_tx.send(error);
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        match controller
            .connect(overrides.clone(), Some(Arc::clone(&on_disconnect)))
            .await
        {
            Ok(connection) => {
                info!(
                    "Monitoring {} (vendor {:?}, product {:?})",
                    connection.port_name, connection.vendor_id, connection.product_id
                );
                controller.continuously_read(|record| println!("{record}"));
            }
            Err(e) if args.no_reconnect => return Err(e.into()),
            Err(e) => {
                warn!("Connect failed: {}; retrying in {:?}", e, reconnect_delay);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                    _ = tokio::time::sleep(reconnect_delay) => continue,
                }
            }
        }

        // Session: forward stdin until the link is lost or we are interrupted.
        let lost = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, closing port");
                    controller.disconnect().await;
                    return Ok(());
                }
                error = lost_rx.recv() => match error {
                    Some(error) if error.is_link_lost() => break error,
                    Some(error) => warn!("{}", error),
                    None => return Ok(()),
                },
                line = stdin.next_line(), if stdin_open => match line? {
                    Some(line) => match controller.write(&format!("{line}{delimiter}"), true).await {
                        Ok(Some(sent)) => debug!("Sent {} bytes", sent),
                        Ok(None) => warn!("No writable port attached; dropped {:?}", line),
                        Err(e) => warn!("Write failed: {}", e),
                    },
                    None => {
                        debug!("stdin closed; still reading");
                        stdin_open = false;
                    }
                },
            }
        };

        controller.disconnect().await;
        if args.no_reconnect {
            return Err(lost.into());
        }
        warn!("{}; reconnecting in {:?}", lost, reconnect_delay);
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}
