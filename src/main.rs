use clap::Parser;
use gimbal_controller::{
    init_logging, input, Directory, LoopbackTransport, SerialTransport, Session, Settings,
    Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Drive a PTZ gimbal over a serial link", long_about = None)]
struct Args {
    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gimbal directory file mapping names to addresses (JSON)
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Serial port, e.g. /dev/ttyUSB0 or COM5
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Gimbal selected at startup
    #[arg(long)]
    gimbal: Option<String>,

    /// Start in press-and-hold mode
    #[arg(long)]
    hold: bool,

    /// Log frames instead of writing to the serial port
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(directory) = args.directory {
        settings.directory = directory;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if args.gimbal.is_some() {
        settings.default_gimbal = args.gimbal;
    }
    if args.hold {
        settings.hold_mode = true;
    }

    let directory = Directory::load(&settings.directory)?;
    info!(gimbals = directory.len(), "loaded gimbal directory");

    let transport: Arc<dyn Transport> = if args.dry_run {
        Arc::new(LoopbackTransport::new())
    } else {
        Arc::new(SerialTransport::new(
            settings.port.clone(),
            settings.baud_rate,
            settings.timeout(),
        ))
    };

    let session = Session::start(&settings, directory, transport)?;
    let report = session
        .run(input::events(BufReader::new(tokio::io::stdin())))
        .await;

    println!(
        "Sent {} frames ({} failed) to {}",
        report.stats.frames_sent, report.stats.frames_failed, report.gimbal
    );
    Ok(())
}
