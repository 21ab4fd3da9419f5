use anyhow::{Context, Result};
use clap::Parser;
use qrscan::{MetadataClient, MetadataLookup, MetadataRecord, ScannerConfig, ScannerOrchestrator};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "qrscan")]
#[command(about = "Live QR code scanner with metadata lookup")]
#[command(version)]
#[command(long_about = "Streams camera frames through a QR decoder, shows the most recent \
decoded value and can look up record metadata for numeric codes over HTTP.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "qrscan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the scanner")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH", help = "Write logs to this file instead of stderr")]
    log_file: Option<PathBuf>,

    /// Enable keyboard controls
    #[arg(short, long, help = "Enable keyboard controls: 'l' looks up the code, 'q' quits")]
    keyboard: bool,

    /// Look up one record and exit
    #[arg(
        long,
        value_name = "ID",
        help = "Fetch metadata for a record id, print it as JSON and exit"
    )]
    lookup: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        println!("# qrscan configuration file");
        println!("# Every key is optional");
        println!("# QRSCAN_<SECTION>__<KEY> environment variables override file values");
        println!();
        println!("{}", ScannerConfig::default_toml()?);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting qrscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ScannerConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().context("Invalid configuration")?;

    if let Some(id) = args.lookup {
        let exit_code = lookup_once(&config, id).await?;
        drop(log_guard);
        std::process::exit(exit_code);
    }

    let mut orchestrator = ScannerOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(args.keyboard);

    let span = info_span!("session", id = %orchestrator.session_id());
    let exit_code = run_session(orchestrator, args.dry_run).instrument(span).await?;

    info!("qrscan exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

async fn run_session(mut orchestrator: ScannerOrchestrator, dry_run: bool) -> Result<i32> {
    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize scanner: {}", e);
        e
    })?;

    if dry_run {
        info!("Dry run completed successfully - all components initialized");
        return Ok(0);
    }

    if let Err(e) = orchestrator.start().await {
        if !e.is_terminal() {
            error!("Failed to start scanner: {}", e);
            orchestrator.shutdown().await?;
            return Err(e.into());
        }
        // The scan screen keeps showing the error until the user quits
        warn!("Scanner is not scanning: {}", e);
    }

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;
    Ok(exit_code)
}

/// Fetch one record through the same lookup path the scan screen uses
async fn lookup_once(config: &ScannerConfig, id: i64) -> Result<i32> {
    let client = MetadataClient::from_config(&config.metadata)?;
    info!("Looking up record {} at {}", id, client.base_url());

    let lookup = MetadataLookup::new(client);
    let (success_tx, mut rx) =
        mpsc::unbounded_channel::<std::result::Result<MetadataRecord, String>>();
    let error_tx = success_tx.clone();

    lookup
        .fetch(
            id,
            move |record| {
                let _ = success_tx.send(Ok(record));
            },
            move |message| {
                let _ = error_tx.send(Err(message));
            },
        )
        .await?;

    match rx.recv().await.context("Lookup finished without a result")? {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        Err(message) => {
            eprintln!("Lookup failed: {}", message);
            Ok(1)
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qrscan={}", log_level)));

    // stdout belongs to the scan screen
    let (writer, guard, ansi) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
