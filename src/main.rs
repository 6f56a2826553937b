use clap::{Parser, Subcommand};
use grabber::analytics::{self, AnalyticsPersistence, AnalyticsStore};
use grabber::config::{ConfigLoader, StoreConfig};
use grabber::extractor::YtDlpExtractor;
use grabber::job::RequesterId;
use grabber::messaging::{self, Messenger};
use grabber::{Dispatcher, Engine, LoadSnapshot, SubmitOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "grabber")]
#[command(version = "0.1.0")]
#[command(about = "Rate-limited media download engine driven by yt-dlp", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine, reading `<requester_id> <url>` lines from stdin
    Run {
        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Show progress bars (stderr)
        #[arg(short, long, default_value_t = true)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the persisted analytics as JSON
    Stats {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

enum Ingress {
    Submit(RequesterId, String),
    Status(RequesterId),
}

fn parse_line(line: &str) -> Option<Ingress> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    if first == "status" {
        return Some(Ingress::Status(parts.next()?.parse().ok()?));
    }
    let requester = first.parse().ok()?;
    Some(Ingress::Submit(requester, parts.next()?.to_string()))
}

fn reply_text(outcome: &SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Accepted {
            job_id,
            queue_position,
            remaining,
        } => format!(
            "Added to queue ({}), position {}. Remaining requests: {}",
            job_id, queue_position, remaining
        ),
        SubmitOutcome::RateLimited {
            retry_after_seconds,
        } => format!(
            "Rate limit exceeded. Try again in {} seconds.",
            retry_after_seconds
        ),
        SubmitOutcome::UnsupportedSource => {
            "Unsupported link. Supported: TikTok, Instagram, Twitter/X, Facebook.".to_string()
        }
    }
}

async fn ingress(engine: Arc<Engine>, messenger: Arc<dyn Messenger>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(Ingress::Submit(requester, url)) => {
                let outcome = engine.submit(requester, &url);
                if let Err(e) = messenger.notify(requester, &reply_text(&outcome)).await {
                    log::warn!("Could not answer requester {}: {}", requester, e);
                }
            }
            Some(Ingress::Status(requester)) => {
                println!("{}", serde_json::to_string_pretty(&engine.status(requester))?);
            }
            None if line.trim().is_empty() => {}
            None => log::warn!("Ignoring malformed line: {}", line),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, progress } => {
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
            } else {
                log::set_boxed_logger(Box::new(logger))?;
                log::set_max_level(log::LevelFilter::Info);
            }

            log::info!("Loading config from {:?}", config);
            let config_data = ConfigLoader::load(&config)?;

            let messenger =
                messaging::build(&config_data.messenger, progress.then(|| multi.clone()))?;
            let store =
                AnalyticsStore::open(analytics::open_persistence(&config_data.analytics)?).await;
            let extractor = Arc::new(YtDlpExtractor::new(config_data.extractor_binary.clone()));
            let engine = Arc::new(Engine::new(
                &config_data,
                extractor,
                messenger.clone(),
                store,
            ));

            let dispatcher = Dispatcher::new(engine.clone());
            dispatcher.start().await;

            let mut status_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
                );
                let mut load_rx = engine.watch_load();
                status_task = Some(tokio::spawn(async move {
                    while load_rx.changed().await.is_ok() {
                        let load: LoadSnapshot = load_rx.borrow().clone();
                        pb.set_message(format!(
                            "Queue: {} | Workers: {}/{} | Completed: {} | Errors: {}",
                            load.queue_depth,
                            load.active_workers,
                            load.max_workers,
                            load.total_completed,
                            load.total_errors
                        ));
                        pb.tick();
                    }
                    pb.finish_and_clear();
                }));
            }

            log::info!("Reading requests from stdin...");
            let drain = tokio::select! {
                result = ingress(engine.clone(), messenger.clone()) => {
                    result?;
                    log::info!("Input closed, draining queue");
                    true
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutting down...");
                    false
                }
            };

            dispatcher.shutdown(drain).await?;
            if let Some(task) = status_task {
                task.abort();
            }

            let snapshot = engine.analytics().snapshot();
            println!("\n✅ Session finished:");
            println!("   Completed (all time): {}", snapshot.total_completed);
            println!("   Errors (all time): {}", snapshot.total_errors());
            println!("   Peak workers: {}", engine.peak_active());
            println!("   Uptime: {}s", engine.uptime().as_secs());
        }
        Commands::Check { config } => {
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(log::LevelFilter::Warn);

            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!(
                        "   Rate limit: {} per {}s",
                        cfg.rate_limit.max_requests, cfg.rate_limit.window_seconds
                    );
                    println!("   Workers: {}", cfg.max_concurrency);
                    println!(
                        "   Limits: {}s, {}MB",
                        cfg.max_duration_secs,
                        cfg.max_file_size_bytes / 1024 / 1024
                    );
                    println!("   Extractor: {}", cfg.extractor_binary);
                    println!("   Analytics: {:?}", cfg.analytics);
                    println!("   Messenger: {:?}", cfg.messenger);
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Stats { config } => {
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(log::LevelFilter::Warn);

            let config_data = ConfigLoader::load(&config)?;
            if config_data.analytics == StoreConfig::Memory {
                anyhow::bail!("analytics are not persisted with the memory store");
            }
            let persistence = analytics::open_persistence(&config_data.analytics)?;
            match persistence.load().await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("No analytics recorded at {}", persistence.describe()),
            }
        }
    }

    Ok(())
}
