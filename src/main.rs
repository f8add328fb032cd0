//! QR Scanner CLI
//!
//! Opens the webcam (or a mock camera with `--demo`) and reads QR codes
//! in one of three delivery modes.

use clap::Parser;
use qr_scanner::{
    capture::{FileConfig, MockCamera},
    decode::MockDecoder,
    metrics::MetricsRegistry,
    scan::{CancelToken, DeliveryMode, ScanError, ScanOutcome},
    QrScanner,
};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};

/// Frame at which the demo decoder "finds" its code.
const DEMO_CODE_FRAME: u64 = 10;

/// Exit status used when the user interrupts a scan.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "qr-scanner", version, about = "Read QR codes from a webcam")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delivery mode, overrides the config file.
    #[arg(short, long, value_enum)]
    mode: Option<DeliveryMode>,

    /// Camera device index.
    #[arg(long)]
    device: Option<u32>,

    /// Capture width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Capture height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Number of codes to read one after another in handoff mode.
    #[arg(long, default_value_t = 1)]
    reads: u32,

    /// Use a mock camera whose frames reveal TEXT after a few polls.
    #[arg(long, value_name = "TEXT")]
    demo: Option<String>,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Do not open a preview window.
    #[arg(long)]
    no_preview: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("QR Scanner v{}", qr_scanner::VERSION);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            exit(2);
        }
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let metrics = match MetricsRegistry::new() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };
    if let Some(metrics) = &metrics {
        serve_metrics(config.metrics.port, metrics);
    }

    let status = match config.scan.mode {
        DeliveryMode::Handoff => read_codes(&cli, &config, &cancel, metrics.as_ref()),
        DeliveryMode::Continuous | DeliveryMode::ExitOnSuccess => {
            scan_until_done(&cli, &config, &cancel, metrics.as_ref())
        }
    };

    if let Some(metrics) = &metrics {
        let snapshot = metrics.snapshot();
        info!(
            "Processed {} frames ({} skipped), decoded {} codes",
            snapshot.frames_captured, snapshot.frames_skipped, snapshot.codes_decoded
        );
    }
    exit(status);
}

fn load_config(cli: &Cli) -> Result<FileConfig, qr_scanner::capture::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(mode) = cli.mode {
        config.scan.mode = mode;
    }
    if let Some(device) = cli.device {
        config.capture.device_id = device;
    }
    if let Some(width) = cli.width {
        config.capture.width = width;
    }
    if let Some(height) = cli.height {
        config.capture.height = height;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_preview {
        config.scan.preview = false;
    }

    config.capture.validate()?;
    config.scan.validate()?;
    Ok(config)
}

#[cfg(feature = "metrics")]
fn serve_metrics(port: u16, metrics: &MetricsRegistry) {
    use qr_scanner::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), metrics.clone());
    if let Err(e) = server.spawn() {
        warn!("Failed to start metrics server: {}", e);
    }
}

#[cfg(not(feature = "metrics"))]
fn serve_metrics(port: u16, _metrics: &MetricsRegistry) {
    if port != 0 {
        warn!("Built without the `metrics` feature, not serving metrics on port {}", port);
    }
}

fn start_scanner(
    cli: &Cli,
    config: &FileConfig,
    cancel: &CancelToken,
    metrics: Option<&MetricsRegistry>,
) -> Result<QrScanner, ScanError> {
    match &cli.demo {
        Some(text) => {
            info!("Demo mode: the code appears at frame {}", DEMO_CODE_FRAME);
            let decoder = MockDecoder::new().with_code_at(DEMO_CODE_FRAME, text.clone());
            configure(QrScanner::builder(MockCamera::new(), decoder), config, cancel, metrics)
                .start()
        }
        None => start_webcam(config, cancel, metrics),
    }
}

#[cfg(feature = "camera")]
fn start_webcam(
    config: &FileConfig,
    cancel: &CancelToken,
    metrics: Option<&MetricsRegistry>,
) -> Result<QrScanner, ScanError> {
    use qr_scanner::{capture::NokhwaCamera, decode::RqrrDecoder};

    let camera = NokhwaCamera::first_available()?;
    configure(
        QrScanner::builder(camera, RqrrDecoder::new()),
        config,
        cancel,
        metrics,
    )
    .start()
}

#[cfg(not(feature = "camera"))]
fn start_webcam(
    _config: &FileConfig,
    _cancel: &CancelToken,
    _metrics: Option<&MetricsRegistry>,
) -> Result<QrScanner, ScanError> {
    Err(qr_scanner::capture::CameraError::DeviceNotFound(
        "built without the `camera` feature, use --demo".to_owned(),
    )
    .into())
}

fn configure<C, D>(
    builder: qr_scanner::ScannerBuilder<C, D>,
    config: &FileConfig,
    cancel: &CancelToken,
    metrics: Option<&MetricsRegistry>,
) -> qr_scanner::ScannerBuilder<C, D>
where
    C: qr_scanner::Camera + Send + 'static,
    D: qr_scanner::Decoder + Send + 'static,
{
    let builder = builder
        .capture_config(config.capture.clone())
        .scan_config(config.scan.clone())
        .cancel_token(cancel.clone());
    match metrics {
        Some(metrics) => builder.metrics(metrics.clone()),
        None => builder,
    }
}

/// Runs continuous or exit-on-success mode until it ends.
fn scan_until_done(
    cli: &Cli,
    config: &FileConfig,
    cancel: &CancelToken,
    metrics: Option<&MetricsRegistry>,
) -> i32 {
    let scanner = match start_scanner(cli, config, cancel, metrics) {
        Ok(scanner) => scanner,
        Err(e) => {
            error!("Failed to start scanner: {}", e);
            return 1;
        }
    };
    info!("Scanning, press Ctrl-C to stop");

    match (scanner.wait(), config.scan.mode) {
        (Ok(ScanOutcome::Delivered), _) => 0,
        (Ok(ScanOutcome::Cancelled), DeliveryMode::Continuous) => 0,
        (Ok(ScanOutcome::Cancelled), _) => EXIT_INTERRUPTED,
        (Err(e), _) => {
            error!("Scanner failed: {}", e);
            1
        }
    }
}

/// Runs `--reads` handoff sessions back to back.
fn read_codes(
    cli: &Cli,
    config: &FileConfig,
    cancel: &CancelToken,
    metrics: Option<&MetricsRegistry>,
) -> i32 {
    for _ in 0..cli.reads.max(1) {
        println!("Starting QR code reader...");
        let mut scanner = match start_scanner(cli, config, cancel, metrics) {
            Ok(scanner) => scanner,
            Err(e) => {
                error!("Failed to start scanner: {}", e);
                return 1;
            }
        };

        match scanner.read_code() {
            Ok(result) => {
                println!("Read succeeded!");
                println!("QR code data: {}", result.text());
            }
            Err(ScanError::Cancelled(_)) => {
                eprintln!("The read operation was interrupted.");
                return EXIT_INTERRUPTED;
            }
            Err(e) => {
                error!("Read failed: {}", e);
                return 1;
            }
        }
    }
    0
}
