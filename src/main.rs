//! cdp-typist - keystroke synthesis for browser tabs
//!
//! Entry point for the command-line binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdp_typist::config::Config;
use cdp_typist::input::KeyMapper;
use cdp_typist::layout;
use cdp_typist::preferences::{clamp_rate, Preferences};
use cdp_typist::scheduler::{JobScheduler, RunOutcome, TypingRate};
use cdp_typist::server::{serve, Dispatcher};
use cdp_typist::transport::{CdpTransport, MemoryTransport, TargetId, Transport};

/// Command-line arguments for cdp-typist
#[derive(Parser, Debug)]
#[command(name = "cdp-typist")]
#[command(version, about = "Type text into browser tabs over the DevTools protocol", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CDP_TYPIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Browser-level DevTools WebSocket URL
    #[arg(short, long, env = "CDP_TYPIST_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log key events instead of sending them to a browser
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve JSON-lines requests on stdin/stdout
    Serve,

    /// Type text into a tab and wait for it to finish
    Type {
        /// Target tab id ("first" = first page)
        #[arg(short, long)]
        target: Option<String>,

        /// Characters per second (saved as the new default)
        #[arg(short, long)]
        rate: Option<f64>,

        /// Type the text as given, without layout correction
        #[arg(long)]
        no_correct: bool,

        /// Text to type
        text: String,
    },

    /// Send one keyboard layout toggle
    Toggle {
        /// Target tab id ("first" = first page)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// List page targets
    Targets,

    /// Print or set the saved typing rate
    Rate {
        /// New rate in characters per second
        value: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_warning) = load_config(&args);

    // Initialize logging
    let _log_guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  cdp-typist v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("════════════════════════════════════════════════════════");

    if let Some(warning) = config_warning {
        warn!("{}", warning);
    }
    debug!("Config: {:?}", config);

    if let Err(e) = run(args, config).await {
        eprintln!("{}", cdp_typist::utils::format_user_error(&e));
        return Err(e);
    }

    Ok(())
}

fn load_config(args: &Args) -> (Config, Option<String>) {
    let path = args.config.clone().or_else(Config::default_path);

    let (config, warning) = match path {
        Some(path) if path.exists() || args.config.is_some() => match Config::load(&path) {
            Ok(config) => (config, None),
            Err(e) => (
                Config::default_config(),
                Some(format!("Failed to load config: {:#}, using defaults", e)),
            ),
        },
        _ => (Config::default_config(), None),
    };

    (config.with_overrides(args.endpoint.clone()), warning)
}

async fn run(args: Args, config: Config) -> Result<()> {
    let prefs_path = Preferences::default_path();

    match args.command {
        Command::Rate { value } => {
            let path = prefs_path.context("No config directory for preferences")?;
            match value {
                Some(rate) => {
                    let prefs = Preferences {
                        rate: clamp_rate(rate),
                    };
                    prefs.save(&path)?;
                    println!("{}", prefs.rate);
                }
                None => println!("{}", Preferences::load(&path).rate),
            }
            Ok(())
        }

        Command::Targets => {
            if args.dry_run {
                println!("{}\t(dry run)", TargetId::FIRST);
                return Ok(());
            }
            let transport = CdpTransport::connect(&config.cdp.endpoint, config.command_timeout())
                .await
                .context("Failed to connect to DevTools")?;
            debug!("Listing page targets on {}", transport.endpoint());
            for target in transport.list_targets().await? {
                println!("{}\t{}\t{}", target.target_id, target.title, target.url);
            }
            Ok(())
        }

        Command::Serve => {
            let scheduler = build_scheduler(args.dry_run, &config).await?;
            let rate = saved_rate(prefs_path.as_deref(), &config);
            let dispatcher = Dispatcher::new(scheduler, rate)
                .with_default_target(config.default_target());

            serve(
                Arc::new(dispatcher),
                tokio::io::stdin(),
                tokio::io::stdout(),
            )
            .await
        }

        Command::Type {
            target,
            rate,
            no_correct,
            text,
        } => {
            let rate = match rate {
                Some(rate) => {
                    let rate = clamp_rate(rate);
                    if let Some(path) = &prefs_path {
                        if let Err(e) = (Preferences { rate }).save(path) {
                            warn!("Failed to save typing rate: {:#}", e);
                        }
                    }
                    TypingRate::new(rate)?
                }
                None => saved_rate(prefs_path.as_deref(), &config),
            };

            let (chars, toggles) = if no_correct {
                (text.chars().collect(), Vec::new())
            } else {
                let correction = layout::correct(&text);
                (correction.chars(), correction.boundaries)
            };

            let target = target.map_or_else(|| config.default_target(), TargetId::new);
            let scheduler = build_scheduler(args.dry_run, &config).await?;

            let typing = scheduler.start(&target, chars, toggles, rate);
            tokio::pin!(typing);

            let outcome = tokio::select! {
                outcome = &mut typing => outcome,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, pausing");
                    scheduler.stop(&target).await;
                    typing.await
                }
            };

            match outcome? {
                RunOutcome::Completed { length } => println!("typed {} characters", length),
                RunOutcome::Paused { cursor, length } => {
                    println!("paused at {}/{}", cursor, length)
                }
                RunOutcome::Superseded => {}
            }
            Ok(())
        }

        Command::Toggle { target } => {
            let target = target.map_or_else(|| config.default_target(), TargetId::new);
            let scheduler = build_scheduler(args.dry_run, &config).await?;
            scheduler.layout_toggle_now(&target).await?;
            Ok(())
        }
    }
}

async fn build_scheduler(dry_run: bool, config: &Config) -> Result<Arc<JobScheduler>> {
    let transport: Arc<dyn Transport> = if dry_run {
        info!("Dry run: key events are logged, not sent");
        Arc::new(MemoryTransport::logging())
    } else {
        let cdp = CdpTransport::connect(&config.cdp.endpoint, config.command_timeout())
            .await
            .context("Failed to connect to DevTools")?;
        info!("Connected to DevTools at {}", cdp.endpoint());
        Arc::new(cdp)
    };

    Ok(Arc::new(JobScheduler::new(
        transport,
        KeyMapper::new(config.dialect()),
    )))
}

/// Saved preference when present, else the configured default
fn saved_rate(prefs_path: Option<&Path>, config: &Config) -> TypingRate {
    match prefs_path {
        Some(path) if path.exists() => Preferences::load(path).typing_rate(),
        _ => config.default_rate(),
    }
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("cdp_typist={level},warn", level = log_level))
    });

    // stdout belongs to the request protocol; logs go to stderr
    let (file_writer, guard) = match log_file_location(args, config)? {
        Some((dir, file_name)) => {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr),
                )
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
    }

    Ok(guard)
}

fn log_file_location(args: &Args, config: &Config) -> Result<Option<(PathBuf, PathBuf)>> {
    let (dir, file_name) = if let Some(path) = &args.log_file {
        let file_name = path
            .file_name()
            .map(PathBuf::from)
            .context("--log-file must name a file")?;
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        (dir, file_name)
    } else if let Some(dir) = &config.logging.log_dir {
        (dir.clone(), PathBuf::from("cdp-typist.log"))
    } else {
        return Ok(None);
    };

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    Ok(Some((dir, file_name)))
}
