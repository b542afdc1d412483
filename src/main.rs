//! # skycast
//!
//! Command-line front end: lists weather agents and runs the
//! search → request → poll flow against the agent backend.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};

use skycast_client::{cheapest, find_agent, HttpBackend};
use skycast_core::{AgentDescriptor, AgentDirectory};
use skycast_engine::{DeskView, PollOptions, WeatherDesk};
use skycast_settings::{LoggingSettings, SkycastSettings};
use skycast_telemetry::{init_telemetry, TelemetryConfig};

const EXIT_FAILED: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// Weather reports from paid weather agents.
#[derive(Parser, Debug)]
#[command(name = "skycast", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.skycast/settings.json`).
    #[arg(long, global = true, env = "SKYCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides settings).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available weather agents.
    Agents,

    /// Request a weather report and wait for it.
    Weather {
        /// Location to report on.
        #[arg(long, short)]
        location: String,

        /// Agent address or name.
        #[arg(long, short, required_unless_present = "cheapest", conflicts_with = "cheapest")]
        agent: Option<String>,

        /// Use the lowest-priced agent.
        #[arg(long)]
        cheapest: bool,

        #[arg(long)]
        poll_interval_ms: Option<u64>,

        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<SkycastSettings> {
        let mut settings = match self.config {
            Some(ref path) => skycast_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => skycast_settings::load_settings().context("Failed to load settings")?,
        };

        if let Some(ref url) = self.api_url {
            settings.api.base_url.clone_from(url);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Command::Weather {
            poll_interval_ms,
            timeout_ms,
            ..
        } = self.command
        {
            if let Some(ms) = poll_interval_ms {
                settings.polling.interval_ms = ms;
            }
            if let Some(ms) = timeout_ms {
                settings.polling.timeout_ms = ms;
            }
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

fn telemetry_config(logging: &LoggingSettings) -> TelemetryConfig {
    let base = TelemetryConfig::from_level_name(&logging.level, logging.json);
    logging
        .modules
        .iter()
        .fold(base, |config, (module, level)| match level.parse::<Level>() {
            Ok(level) => config.with_module_level(module.as_str(), level),
            Err(_) => {
                eprintln!("skycast: ignoring unknown log level {level:?} for {module}");
                config
            }
        })
}

fn poll_options(settings: &SkycastSettings) -> PollOptions {
    PollOptions::new(settings.polling.interval(), settings.polling.timeout())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = cli.load_settings()?;
    init_telemetry(&telemetry_config(&settings.logging));
    debug!(base_url = %settings.api.base_url, "settings loaded");

    let backend =
        Arc::new(HttpBackend::new(&settings.api).context("Failed to build HTTP client")?);

    match cli.command {
        Command::Agents => list_agents(&*backend, cli.json).await,
        Command::Weather {
            location,
            agent,
            cheapest,
            ..
        } => {
            let desk = WeatherDesk::new(Arc::clone(&backend), backend, poll_options(&settings));
            desk.set_location(location);
            let choice = match agent {
                Some(key) if !cheapest => AgentChoice::Named(key),
                _ => AgentChoice::Cheapest,
            };
            weather(&desk, choice, cli.json).await
        }
    }
}

async fn list_agents(directory: &dyn AgentDirectory, json: bool) -> Result<ExitCode> {
    let agents = match directory.search_agents().await {
        Ok(agents) => agents,
        Err(e) => {
            eprintln!("Failed to fetch weather agents: {e}");
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
    } else {
        for agent in &agents {
            println!("{:<32} ${:<8.2} {}", agent.name, agent.price, agent.address);
        }
    }
    Ok(ExitCode::SUCCESS)
}

enum AgentChoice {
    Cheapest,
    Named(String),
}

impl AgentChoice {
    fn pick<'a>(&self, agents: &'a [AgentDescriptor]) -> Option<&'a AgentDescriptor> {
        match self {
            Self::Cheapest => cheapest(agents),
            Self::Named(key) => find_agent(agents, key),
        }
    }
}

async fn weather(
    desk: &WeatherDesk<HttpBackend, HttpBackend>,
    choice: AgentChoice,
    json: bool,
) -> Result<ExitCode> {
    let view = desk.search_agents().await;
    if let Some(ref error) = view.error {
        eprintln!("{error}");
        return Ok(ExitCode::from(EXIT_FAILED));
    }

    let Some(agent) = choice.pick(&view.agents) else {
        match choice {
            AgentChoice::Cheapest => eprintln!("No weather agents available"),
            AgentChoice::Named(key) => eprintln!("Unknown weather agent: {key}"),
        }
        return Ok(ExitCode::from(EXIT_FAILED));
    };
    info!(agent = %agent.name, address = %agent.address, price = agent.price, "agent selected");
    let address = agent.address.clone();

    let canceller = desk.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let view = desk.get_weather(&address).await;
    interrupt.abort();

    print_view(&view, json)?;
    Ok(exit_code(&view))
}

fn print_view(view: &DeskView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }
    if let Some(ref weather) = view.weather {
        println!("Location: {}", weather.location);
        println!("Price: ${:.2}", weather.price);
        println!("Analysis: {}", weather.analysis);
    }
    if let Some(ref error) = view.error {
        eprintln!("{error}");
    }
    Ok(())
}

fn exit_code(view: &DeskView) -> ExitCode {
    match view.error.as_deref() {
        None => ExitCode::SUCCESS,
        Some(skycast_engine::desk::MSG_CANCELLED) => ExitCode::from(EXIT_INTERRUPTED),
        Some(_) => ExitCode::from(EXIT_FAILED),
    }
}
