//! Tekcap - screen capture for Tektronix sampling oscilloscopes
//!
//! Listens on a serial port for hardcopy output and saves each screen as PNG.

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tekcap_core::cli::{print_exit_codes, replay, CaptureConsumer, CliResult, ExitCodes};
use tekcap_core::config::{self as app_config, AppConfig};
use tekcap_core::core::events::{CaptureEvent, ChannelSink};
use tekcap_core::core::protocol::{SCOPE_X_RES, SCOPE_Y_RES};
use tekcap_core::core::session::{spawn_worker, SessionControl};
use tekcap_core::core::simulator::{ScopeSimulator, TestPattern};
use tekcap_core::core::transport::{list_ports, PortSession, SystemPortOpener};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// Synthetic screen for the simulate command
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// Eight vertical color bars
    Bars,
    /// Black and white checkerboard
    Checker,
}

impl From<Pattern> for TestPattern {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Bars => TestPattern::Bars,
            Pattern::Checker => TestPattern::Checker,
        }
    }
}

/// Tekcap CLI
#[derive(Parser, Debug)]
#[command(
    name = "tekcap",
    version,
    about = "Serial screen capture for Tektronix CSA803 / 1180x sampling oscilloscopes",
    long_about = None
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, env = "TEKCAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Capture screens from a scope
    Capture {
        /// Serial port (e.g. /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Stop after this many captures
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Directory for PNG files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Append operator messages to this file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Decode a recorded capture stream
    Replay {
        /// Raw bytes recorded from the serial line
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for PNG files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Write a synthetic capture stream
    Simulate {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Image to encode
        #[arg(short, long, value_enum, default_value_t = Pattern::Bars)]
        pattern: Pattern,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show exit codes
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(ExitCodes::CONFIG_ERROR);
        }
    };

    let _log_guard = init_tracing(&cli, &config);
    tracing::debug!("Starting tekcap v{}", tekcap_core::VERSION);

    let result = match run(&cli, config) {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
    };

    if let Some(message) = result.message() {
        if result.is_success() {
            if !cli.quiet {
                println!("{message}");
            }
        } else {
            eprintln!("Error: {message}");
        }
    }
    result.to_exit_code()
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

/// Console logging plus an optional daily log file. The returned guard must
/// live until exit so buffered file output is flushed.
fn init_tracing(cli: &Cli, config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tekcap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::ListPorts { format } => list_serial_ports(cli, *format),
        Commands::Capture {
            port,
            baud,
            count,
            output_dir,
            log,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.port.name = port.clone();
            }
            if let Some(baud) = baud {
                config.port.baud_rate = *baud;
            }
            if let Some(dir) = output_dir {
                config.output.directory = Some(dir.clone());
            }
            run_capture(cli, &config, *count, log.as_deref())
        }
        Commands::Replay { input, output_dir } => {
            let dir = output_dir.clone().or_else(|| config.output.directory.clone());
            run_replay(cli, &config, input, dir)
        }
        Commands::Simulate { output, pattern } => {
            let raster = TestPattern::from(*pattern).render(SCOPE_X_RES, SCOPE_Y_RES);
            let stream = ScopeSimulator::new().capture(&raster);
            std::fs::write(output, &stream)?;
            Ok(CliResult::success_with_message(format!(
                "Wrote {} bytes to {}",
                stream.len(),
                output.display()
            )))
        }
        Commands::Config { action } => handle_config(cli, action, &config),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn list_serial_ports(cli: &Cli, format: OutputFormat) -> anyhow::Result<CliResult> {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => return Ok(CliResult::from(&e)),
    };

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if ports.is_empty() {
                if !cli.quiet {
                    println!("No serial ports found.");
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }
    Ok(CliResult::success())
}

fn output_dir(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

fn run_capture(cli: &Cli, config: &AppConfig, count: Option<u64>, log: Option<&Path>) -> anyhow::Result<CliResult> {
    if config.port.name.trim().is_empty() {
        return Ok(CliResult::error(
            ExitCodes::INVALID_ARGS,
            "No serial port specified; pass --port or set port.name in the config file",
        ));
    }

    let mut consumer = CaptureConsumer::new(output_dir(config.output.directory.clone())?, &config.output.file_prefix)
        .with_bell(true)
        .with_echo(!cli.quiet);
    if let Some(path) = log {
        consumer.log_mut().start_file(path)?;
    }

    let port = PortSession::new(Box::new(SystemPortOpener), config.port.settings());
    let (sink, events) = ChannelSink::unbounded();
    let control = Arc::new(SessionControl::new(&config.port.name));

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let control = Arc::clone(&control);
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            control.request_termination();
        })?;
    }

    let mut worker = spawn_worker(port, sink, control, config.timing.timing())?;
    let mut saved = 0u64;

    loop {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                if let CaptureEvent::Status(text) = &event {
                    if !cli.quiet {
                        eprint!("\r\x1b[2K{text}");
                        let _ = std::io::stderr().flush();
                    }
                }
                if let Some(path) = consumer.handle(event)? {
                    saved += 1;
                    if !cli.quiet {
                        eprintln!();
                    }
                    println!("{}", path.display());
                    if count.is_some_and(|n| saved >= n) {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if worker.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    worker.stop();
    if !cli.quiet {
        eprintln!();
    }

    let summary = format!("{saved} capture(s) saved");
    if interrupted.load(Ordering::SeqCst) && count.is_some_and(|n| saved < n) {
        return Ok(CliResult::cancelled(summary));
    }
    Ok(CliResult::success_with_message(summary))
}

fn run_replay(cli: &Cli, config: &AppConfig, input: &Path, dir: Option<PathBuf>) -> anyhow::Result<CliResult> {
    let recording = match std::fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => return Ok(CliResult::from(e)),
    };

    let mut consumer = CaptureConsumer::new(output_dir(dir)?, &config.output.file_prefix).with_echo(!cli.quiet);
    let summary = replay(&recording, &mut consumer)?;

    for path in consumer.saved() {
        println!("{}", path.display());
    }
    if summary.captures == 0 {
        return Ok(CliResult::error(
            ExitCodes::PROTOCOL_ERROR,
            format!("No complete capture found in {}", input.display()),
        ));
    }
    Ok(CliResult::success_with_message(format!(
        "{} capture(s) decoded",
        summary.captures
    )))
}

fn handle_config(cli: &Cli, action: &ConfigAction, config: &AppConfig) -> anyhow::Result<CliResult> {
    let path = match cli.config.clone().or_else(app_config::config_file) {
        Some(path) => path,
        None => return Ok(CliResult::config_error("Could not determine config directory")),
    };

    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Ok(CliResult::config_error(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            if let Err(e) = AppConfig::default().save_to(&path) {
                return Ok(CliResult::config_error(e.to_string()));
            }
            Ok(CliResult::success_with_message(format!("Wrote {}", path.display())))
        }
        ConfigAction::Show => {
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(config)?);
            Ok(CliResult::success())
        }
    }
}
