//! elm-usb bridge
//!
//! Talks to an ELM327 OBD-II interface behind a PL2303 USB-serial adapter.
//! Acquires the adapter, runs the PL2303 bring-up, then relays commands to the
//! device and prints every received frame on stdout.

mod config;
mod usb;

use anyhow::{Context, Result};
use clap::Parser;
use common::{FrameReceiver, Session, setup_logging};
use config::{BridgeConfig, UsbSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use usb::RusbTransport;

type AdapterSession = Session<RusbTransport>;

#[derive(Parser, Debug)]
#[command(name = "elm-usb-bridge")]
#[command(
    author,
    version,
    about = "ELM327 bridge - Drive an OBD-II interface over a PL2303 USB-serial adapter"
)]
#[command(long_about = "
Opens the PL2303 USB-serial adapter (067b:2303) in front of an ELM327 OBD-II
interface, initialises it for 38400 baud, and relays commands to it. Every
CR-terminated response line is printed on stdout; logs go to stderr.

EXAMPLES:
    # Interactive session: type AT/OBD commands, one per line
    elm-usb-bridge

    # Reset the interface and read engine RPM, then exit
    elm-usb-bridge --send ATZ --send 010C

    # Wait longer for slow responses
    elm-usb-bridge --send 0100 --idle-ms 5000

    # List attached adapters
    elm-usb-bridge --list-devices

    # Run with debug logging (every bring-up step is logged)
    elm-usb-bridge --log-level debug

CONFIGURATION:
    The bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/elm-usb/bridge.toml
    3. /etc/elm-usb/bridge.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List PL2303 adapters and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Send a command and print its responses (repeatable, sent in order)
    #[arg(short, long, value_name = "CMD")]
    send: Vec<String>,

    /// With --send: stop waiting for responses after this long without a frame
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    idle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = BridgeConfig::default();
        let path = BridgeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        BridgeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        BridgeConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    config::validate_log_level(log_level)?;

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("elm-usb bridge v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    let context = rusb::Context::new().context("Failed to initialise libusb")?;

    if args.list_devices {
        return list_devices_mode(&context);
    }

    let session = connect(context, config.usb.clone()).await?;
    let frames = session
        .start_read_loop(
            config.transport.read_chunk_size,
            config.transport.frame_queue_capacity,
        )
        .context("Failed to start read loop")?;

    let result = if args.send.is_empty() {
        run_interactive(&session, &frames).await
    } else {
        run_commands(&session, &frames, &args.send, Duration::from_millis(args.idle_ms)).await
    };

    info!("Closing adapter...");
    let closed = close_session(session).await;

    match (result, closed) {
        (Err(e), Err(close_err)) => {
            error!("Error closing adapter: {:#}", close_err);
            Err(e)
        }
        (result, closed) => result.and(closed),
    }
}

/// List attached adapters and exit
fn list_devices_mode(context: &rusb::Context) -> Result<()> {
    let adapters = usb::list_adapters(context).context("Failed to enumerate USB devices")?;

    if adapters.is_empty() {
        println!("No PL2303 adapters found.");
    } else {
        println!("Found {} PL2303 adapter(s):\n", adapters.len());
        for adapter in adapters {
            println!(
                "  {:04x}:{:04x} - {} {}",
                adapter.vendor_id,
                adapter.product_id,
                adapter
                    .manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                adapter.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03}",
                adapter.bus_number, adapter.device_address
            );
            if let Some(serial) = &adapter.serial_number {
                println!("      Serial: {}", serial);
            }
            println!();
        }
    }

    Ok(())
}

/// Acquire the adapter and run bring-up off the async runtime
async fn connect(context: rusb::Context, settings: UsbSettings) -> Result<Arc<AdapterSession>> {
    let session = tokio::task::spawn_blocking(move || -> Result<AdapterSession> {
        let transport =
            usb::open_adapter(&context, &settings).context("Failed to acquire adapter")?;
        let session = Session::new(transport);
        session.bring_up().context("PL2303 bring-up failed")?;
        Ok(session)
    })
    .await
    .context("Bring-up task panicked")??;

    info!(
        "Adapter ready: {}",
        session
            .transport()
            .product()
            .unwrap_or("unnamed PL2303 adapter")
    );
    Ok(Arc::new(session))
}

async fn send_command(session: &Arc<AdapterSession>, command: String) -> Result<()> {
    let session = session.clone();
    tokio::task::spawn_blocking(move || session.send(&command))
        .await
        .context("Write task panicked")?
        .context("Failed to send command")
}

async fn close_session(session: Arc<AdapterSession>) -> Result<()> {
    tokio::task::spawn_blocking(move || session.close())
        .await
        .context("Close task panicked")?
        .context("Read loop failed")
}

/// Send each command in turn, printing frames until the device goes quiet
///
/// Ctrl+C stops waiting and skips the remaining commands.
async fn run_commands(
    session: &Arc<AdapterSession>,
    frames: &FrameReceiver,
    commands: &[String],
    idle: Duration,
) -> Result<()> {
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for command in commands {
        send_command(session, command.clone()).await?;
        match wait_for_responses(frames, idle, &mut ctrl_c).await {
            Responses::Idle => {}
            Responses::Ended => {
                warn!("Frame stream ended before all commands were sent");
                break;
            }
            Responses::Interrupted => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }
    Ok(())
}

/// How waiting for a command's responses ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Responses {
    /// No frame arrived for the idle period
    Idle,
    /// The frame stream ended
    Ended,
    /// Shutdown was requested
    Interrupted,
}

/// Print frames until the device goes quiet, the stream ends or `shutdown` fires
async fn wait_for_responses<F>(frames: &FrameReceiver, idle: Duration, shutdown: F) -> Responses
where
    F: Future<Output = std::io::Result<()>> + Unpin,
{
    tokio::select! {
        open = print_until_idle(frames, idle) => {
            if open { Responses::Idle } else { Responses::Ended }
        }
        result = shutdown => {
            if let Err(e) = result {
                error!("Error waiting for Ctrl+C: {}", e);
            }
            Responses::Interrupted
        }
    }
}

/// Print frames until none arrives for `idle`; false if the stream ended
async fn print_until_idle(frames: &FrameReceiver, idle: Duration) -> bool {
    loop {
        match tokio::time::timeout(idle, frames.recv()).await {
            Ok(Ok(frame)) => println!("{}", frame),
            Ok(Err(_)) => return false,
            Err(_) => return true,
        }
    }
}

/// Relay stdin lines to the device and frames to stdout until EOF or Ctrl+C
async fn run_interactive(session: &Arc<AdapterSession>, frames: &FrameReceiver) -> Result<()> {
    info!("Interactive mode: one command per line, Ctrl+D or Ctrl+C to exit");

    let mut lines = spawn_stdin_reader()?;
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                // An empty line is forwarded too: a bare CR repeats the last command
                Some(line) => send_command(session, line).await?,
                None => {
                    info!("End of input");
                    return Ok(());
                }
            },
            frame = frames.recv() => match frame {
                Ok(frame) => println!("{}", frame),
                Err(_) => {
                    // The loop's own error is reported when the session closes
                    warn!("Frame stream ended");
                    return Ok(());
                }
            },
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                return Ok(());
            }
        }
    }
}

/// Read stdin on a plain thread so a pending read never holds up runtime shutdown
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        let line = line.trim_end_matches('\r').to_string();
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::create_frame_channel;
    use std::future::{pending, ready};

    const IDLE: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_wait_for_responses_goes_idle() {
        let (tx, rx) = create_frame_channel(4);
        tx.send_blocking("OK".to_string()).unwrap();

        let outcome = wait_for_responses(&rx, IDLE, pending()).await;
        assert_eq!(outcome, Responses::Idle);
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_responses_reports_end_of_stream() {
        let (tx, rx) = create_frame_channel(4);
        drop(tx);

        let outcome = wait_for_responses(&rx, IDLE, pending()).await;
        assert_eq!(outcome, Responses::Ended);
    }

    #[tokio::test]
    async fn test_wait_for_responses_stops_on_shutdown() {
        // A long idle period with an open, silent stream only ends through shutdown
        let (_tx, rx) = create_frame_channel(4);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_responses(&rx, Duration::from_secs(3600), ready(Ok(()))),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Responses::Interrupted);
    }

    #[tokio::test]
    async fn test_wait_for_responses_shutdown_error_still_interrupts() {
        let (_tx, rx) = create_frame_channel(4);
        let failed = ready(Err(std::io::Error::other("no signal handler")));

        let outcome = wait_for_responses(&rx, Duration::from_secs(3600), failed).await;
        assert_eq!(outcome, Responses::Interrupted);
    }
}
