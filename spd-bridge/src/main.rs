//! spd-bridge — WebSocket ↔ SCPI bridge for the Siglent SPD3303X
//!
//! Relays SCPI text commands between WebSocket clients and the instrument,
//! which may be attached as a USB serial port (free-running stream) or a
//! USBTMC character device (strict write-then-read). Measurement queries are
//! correlated with their replies and assembled into telemetry samples; a
//! local terminal panel shows live state and accepts commands of its own.
//!
//! ```text
//! web client ──ws──┐
//!                  ├─> gateway actor ──> SPD3303X
//! terminal ────────┘        │
//!                           └─> telemetry sink (JSONL)
//! ```

mod config;
mod server;
mod ui;

use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Mutex;

use config::BridgeConfig;
use spd_link::{classify_path, discover, DetectError, DetectedDevice, InstrumentHandle, LinkError, StreamLink, TransportKind, UsbTmcLink};
use spd_relay::{pump_lines, run_gateway, GatewayCommand, JsonlSink, TelemetrySink};
use spd_sim::{run_supply_task, VirtualSupply, VirtualSupplyConfig};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    path: Option<String>,
    sim: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        path: None,
        sim: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--sim" => args.sim = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if !other.starts_with('-') => args.path = Some(other.to_string()),
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                std::process::exit(2);
            }
        }
    }
    args
}

fn print_usage() {
    println!("Usage: spd-bridge [DEVICE] [--sim]");
    println!();
    println!("  spd-bridge                      auto-detect the instrument");
    println!("  spd-bridge /dev/cu.usbserial-10 use a specific serial port");
    println!("  spd-bridge /dev/usbtmc0         use a specific USBTMC device");
    println!("  spd-bridge --sim                run against a simulated supply");
}

fn init_tracing(log_file: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "spd_bridge=info,spd_protocol=info,spd_link=info,spd_relay=info,spd_sim=info".into()
    });

    // The panel owns stdout on an interactive terminal, so logs go to a
    // file there; piped/headless runs log to stderr as usual.
    if std::io::stdout().is_terminal() {
        match std::fs::File::create(log_file) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(Mutex::new(file)),
                    )
                    .init();
            }
            Err(_) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Pick the device to open: explicit path, single match, or interactive pick
fn choose_device(args: &Args) -> Result<(TransportKind, String), ExitCode> {
    if let Some(path) = &args.path {
        return Ok((classify_path(path), path.clone()));
    }

    let devices = match discover() {
        Ok(devices) => devices,
        Err(DetectError::NoDevice) => {
            eprintln!("No serial port or USBTMC device found. Connect the SPD3303X and try again.");
            eprintln!("  Serial:  spd-bridge /dev/ttyUSB0");
            eprintln!("  USBTMC:  spd-bridge /dev/usbtmc0");
            return Err(ExitCode::FAILURE);
        }
        Err(e) => {
            eprintln!("Device discovery failed: {e}");
            return Err(ExitCode::FAILURE);
        }
    };

    if devices.len() == 1 {
        let device = &devices[0];
        println!(
            "Found device: {}  —  {}",
            device.path,
            device.description.as_deref().unwrap_or("")
        );
        return Ok((device.kind, device.path.clone()));
    }

    println!("Multiple devices found:\n");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{}]  {}  —  {}",
            i + 1,
            device.path,
            device.description.as_deref().unwrap_or("")
        );
    }
    println!();

    loop {
        print!("Type a number [1-{}] and press Enter: ", devices.len());
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return Err(ExitCode::FAILURE);
        }
        if let Ok(choice) = line.trim().parse::<usize>() {
            if (1..=devices.len()).contains(&choice) {
                let DetectedDevice { kind, path, .. } = devices[choice - 1].clone();
                return Ok((kind, path));
            }
        }
        println!("  Please enter a number between 1 and {}", devices.len());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args();
    let config = BridgeConfig::load();
    init_tracing(&config.log_file);

    let (cmd_tx, cmd_rx) = mpsc::channel::<GatewayCommand>(256);
    let (event_tx, event_rx) = mpsc::channel(256);

    // Open the instrument. Failure here is the only fatal error class.
    let handle = if args.sim {
        let (bridge_side, supply_side) = tokio::io::duplex(1024);
        let supply = VirtualSupply::from_config(VirtualSupplyConfig::default());
        tokio::spawn(async move {
            if let Err(e) = run_supply_task(supply_side, supply).await {
                warn!("Virtual supply stopped: {}", e);
            }
        });
        println!("Running against a simulated SPD3303X");
        spawn_stream_reader(StreamLink::new("sim", bridge_side), &cmd_tx)
    } else {
        let (kind, path) = match choose_device(&args) {
            Ok(choice) => choice,
            Err(code) => return code,
        };

        match kind {
            TransportKind::Serial => {
                println!("Opening serial port: {} at {} baud", path, config.baud_rate);
                match StreamLink::open(&path, config.baud_rate) {
                    Ok(link) => spawn_stream_reader(link, &cmd_tx),
                    Err(e) => {
                        eprintln!("Failed to open {path}: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            TransportKind::UsbTmc => {
                println!("Opening USBTMC device: {path}");
                match UsbTmcLink::open(&path, config.reply_timeout()) {
                    Ok(link) => InstrumentHandle::UsbTmc(link),
                    Err(LinkError::PermissionDenied(path)) => {
                        eprintln!("Permission denied: {path}");
                        eprintln!("Add a udev rule to grant access:");
                        eprintln!("  echo 'SUBSYSTEM==\"usbmisc\", KERNEL==\"usbtmc*\", ATTRS{{idVendor}}==\"f4ec\", MODE=\"0666\"' \\");
                        eprintln!("    | sudo tee /etc/udev/rules.d/99-siglent-spd3303x.rules");
                        eprintln!("  sudo udevadm control --reload-rules && sudo udevadm trigger");
                        return ExitCode::FAILURE;
                    }
                    Err(e) => {
                        eprintln!("Failed to open {path}: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
        }
    };

    let kind = handle.kind();
    let transport_desc = handle.describe();

    // Telemetry sink is optional; a broken sink degrades, never aborts
    let sink: Option<Box<dyn TelemetrySink + Send>> = if config.telemetry.enabled {
        match JsonlSink::open(&config.telemetry.path) {
            Ok(sink) => Some(Box::new(sink)),
            Err(e) => {
                warn!("Telemetry disabled, cannot open {}: {}", config.telemetry.path, e);
                None
            }
        }
    } else {
        None
    };
    let telemetry_desc = sink
        .as_ref()
        .map(|s| s.describe())
        .unwrap_or_else(|| "disabled".to_string());

    let listener = match TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind ws://{}: {e}", config.bind_addr());
            return ExitCode::FAILURE;
        }
    };
    println!("WebSocket server listening on ws://{}", config.bind_addr());
    info!("WebSocket server listening on ws://{}", config.bind_addr());

    tokio::spawn(run_gateway(
        handle,
        sink,
        config.telemetry.measurement.clone(),
        cmd_rx,
        event_tx,
    ));
    tokio::spawn(server::run_server(listener, kind, cmd_tx.clone()));

    match ui::run_ui(
        cmd_tx,
        event_rx,
        transport_desc,
        telemetry_desc,
        config.reply_timeout(),
    )
    .await
    {
        Ok(()) => {
            println!("Bridge stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("UI error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Split a stream link, spawn its read loop, and return the gateway's handle
fn spawn_stream_reader<T>(
    link: StreamLink<T>,
    cmd_tx: &mpsc::Sender<GatewayCommand>,
) -> InstrumentHandle
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (writer, reader) = link.split();
    let (line_tx, line_rx) = mpsc::channel(256);

    let report_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = reader.run(line_tx).await {
            let _ = report_tx
                .send(GatewayCommand::ReportError {
                    source: "link".to_string(),
                    message: e.to_string(),
                })
                .await;
        }
    });
    tokio::spawn(pump_lines(line_rx, cmd_tx.clone()));

    InstrumentHandle::Stream(writer)
}
