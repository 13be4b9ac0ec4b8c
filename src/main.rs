//! Service orchestrator daemon and operator CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use service_orchestrator::boot::DryRunStarter;
use service_orchestrator::config::{load_config, OrchestratorConfig};
use service_orchestrator::events::EventEnvelope;
use service_orchestrator::isolation::ConfigBindingValidator;
use service_orchestrator::lifecycle::{spawn_signal_handler, Orchestrator, Shutdown};
use service_orchestrator::model::{join_ids, InstanceId};
use service_orchestrator::observability::{init_logging, init_metrics};
use service_orchestrator::store::InstanceStore;

#[derive(Parser)]
#[command(name = "service-orchestrator")]
#[command(about = "Isolation-gated boot and schedule control for network services", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bind addresses declared in a service config file
    CheckConfig {
        /// Service type, e.g. tor, sing-box, adguard-home
        service_type: String,
        file: PathBuf,
    },
    /// Run the isolation checks for one instance and print the report
    Verify { instance_id: String },
    /// Print the startup layers for all auto-start instances
    Plan,
    /// Boot auto-start instances, then apply schedules until SIGINT/SIGTERM
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };
    init_logging(&config.observability);

    match cli.command {
        Commands::CheckConfig { service_type, file } => check_config(&service_type, file).await,
        Commands::Verify { instance_id } => verify(config, InstanceId::new(instance_id)).await,
        Commands::Plan => plan(config).await,
        Commands::Run => run(config).await,
    }
}

async fn check_config(service_type: &str, file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(&file).await?;
    let addresses = ConfigBindingValidator::new().extract_bind_ips(service_type, &content)?;

    for address in addresses {
        println!("{address}");
    }
    Ok(())
}

async fn verify(config: OrchestratorConfig, id: InstanceId) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::from_config(config, Arc::new(DryRunStarter))?;
    let instance = orchestrator.store.get_instance(&id).await?;

    let report = orchestrator.verifier.verify_pre_start(&instance).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.passed {
        return Err(format!("instance {id} failed isolation verification").into());
    }
    Ok(())
}

async fn plan(config: OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::from_config(config, Arc::new(DryRunStarter))?;

    let ids: Vec<InstanceId> = orchestrator
        .store
        .list_auto_start_instances()
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();
    let layers = orchestrator.dependencies.compute_startup_order(&ids).await?;

    for (index, layer) in layers.iter().enumerate() {
        println!("layer {index}: {}", join_ids(layer, ", "));
    }
    Ok(())
}

async fn run(config: OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("service-orchestrator v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Process spawning belongs to the host's instance manager; this binary
    // only drives ordering, isolation and scheduling.
    let orchestrator = Orchestrator::from_config(config, Arc::new(DryRunStarter))?;
    let shutdown = Arc::new(Shutdown::new());
    let signals = spawn_signal_handler(shutdown.clone());

    let mut events = orchestrator.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => log_event(&envelope),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event logger lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match orchestrator.boot.execute_boot_sequence(&shutdown.token()).await {
        Ok(summary) => tracing::info!(
            started = summary.started.len(),
            layers = summary.layers,
            "Boot sequence finished"
        ),
        // Instances that did start keep running; scheduling still applies.
        Err(e) => tracing::error!(error = %e, "Boot sequence incomplete"),
    }

    if !shutdown.is_triggered() {
        orchestrator.scheduler.start().await?;
        shutdown.wait().await;
        orchestrator.scheduler.stop().await?;
    }

    let _ = signals.await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_event(envelope: &EventEnvelope) {
    tracing::info!(
        event_id = %envelope.id,
        source = %envelope.source,
        kind = envelope.event.kind(),
        payload = %serde_json::to_string(&envelope.event).unwrap_or_default(),
        "Event"
    );
}
