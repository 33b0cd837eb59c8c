// Hearo command line interface
// Listen, replay, simulate and inspect alert history

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hearo_lib::alerts::Alert;
use hearo_lib::logging::init_logging;
use hearo_lib::state::default_config_path;
use hearo_lib::{AppConfig, HearoApp};

#[derive(Parser)]
#[command(name = "hearo")]
#[command(about = "Household sound-event alerts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: <config dir>/hearo/config.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen on the default microphone until Ctrl-C
    Listen,

    /// Replay a WAV file through the listening pipeline
    Replay {
        file: PathBuf,

        /// Override the capture interval
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Dispatch a classification without audio
    Simulate {
        /// Sound label, e.g. fire_alarm or doorbell
        label: String,

        #[arg(long, default_value = "0.9")]
        confidence: f32,

        /// Live location reading overriding the default
        #[arg(long)]
        location: Option<String>,
    },

    /// Show recent alerts
    History {
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Show available classifier backends and channel status
    Status,

    /// Print the effective configuration
    Config {
        /// Also write it to the config path
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("No config directory available")?,
    };
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config
                    .save(&config_path)
                    .with_context(|| format!("Failed to write {}", config_path.display()))?;
                eprintln!("Wrote {}", config_path.display());
            }
            return Ok(());
        }
        Commands::Replay {
            interval_ms: Some(interval_ms),
            ..
        } => {
            config.capture_interval_ms = interval_ms;
        }
        _ => {}
    }

    let app = HearoApp::init(config).await.context("Failed to start Hearo")?;

    match cli.command {
        Commands::Listen => {
            app.listen_microphone()
                .await
                .context("Could not open the microphone")?;
            run_until_done(&app).await?;
        }
        Commands::Replay { file, .. } => {
            app.replay(&file)
                .with_context(|| format!("Could not replay {}", file.display()))?;
            run_until_done(&app).await?;
        }
        Commands::Simulate {
            label,
            confidence,
            location,
        } => {
            let alert = app.simulate(&label, confidence, location.as_deref())?;
            print_alert(&alert);
        }
        Commands::History { limit } => {
            let alerts = app.stored_alerts(limit)?;
            if alerts.is_empty() {
                println!("No alerts yet");
            }
            for alert in &alerts {
                print_alert(alert);
            }
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&app.status())?);
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Run the session until it ends or the user presses Ctrl-C
async fn run_until_done(app: &HearoApp) -> Result<()> {
    tokio::select! {
        result = app.wait() => {
            result.context("Listening session ended with an error")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            log::info!("Stopping");
            app.stop().await?;
        }
    }

    let recent = app.recent_alerts(app.config().history_capacity);
    println!("{} alert(s) in history", recent.len());
    for alert in &recent {
        print_alert(alert);
    }
    Ok(())
}

fn print_alert(alert: &Alert) {
    println!(
        "#{:<5} {}  {:<8}  {}",
        alert.id,
        alert.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
        alert.severity.as_str(),
        alert.summary()
    );
}
