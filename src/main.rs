use chrono::{DateTime, Local};
use color_eyre::{eyre::eyre, Result};
use padlink::config::BridgeConfig;
use padlink::events::{self, EventReceiver, LinkStatus, PipelineEvent, RunState};
use padlink::logging::{self, Severity};
use padlink::orchestrator::{ControlCommand, Orchestrator};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// What the console panel knows from the status channel
#[derive(Debug)]
struct PanelView {
    device: LinkStatus,
    network: LinkStatus,
    pipeline: RunState,
    warnings: u64,
    errors: u64,
    last_problem: Option<(DateTime<Local>, String)>,
}

impl Default for PanelView {
    fn default() -> Self {
        Self {
            device: LinkStatus::Disconnected,
            network: LinkStatus::Disconnected,
            pipeline: RunState::Stopped,
            warnings: 0,
            errors: 0,
            last_problem: None,
        }
    }
}

type SharedView = Arc<Mutex<PanelView>>;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = BridgeConfig::load()
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;

    let (publisher, receiver) = events::channel(config.runtime.event_capacity);
    logging::init_tracing(Some(publisher.clone()))?;
    info!("Configuration loaded: {:?}", config);

    let autostart = config.runtime.autostart;
    let orchestrator = Arc::new(Orchestrator::new(config, publisher));

    let view = SharedView::default();
    let _drain_handle = tokio::spawn(drain_events(receiver, view.clone()));

    if autostart {
        run_command(&orchestrator, ControlCommand::Start).await;
    }

    info!("Commands: start, stop, status, quit");
    run_panel(&orchestrator, &view).await?;

    run_command(&orchestrator, ControlCommand::Stop).await;
    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

/// Reads console commands until `quit`, end of input followed by Ctrl-C, or Ctrl-C
async fn run_panel(orchestrator: &Arc<Orchestrator>, view: &SharedView) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Ctrl-C received");
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    "" => {}
                    "quit" | "exit" => return Ok(()),
                    "status" => print_status(orchestrator, view),
                    other => match other.parse::<ControlCommand>() {
                        Ok(command) => run_command(orchestrator, command).await,
                        Err(e) => warn!("{}", e),
                    },
                },
                None => {
                    debug!("Console input closed, waiting for Ctrl-C");
                    tokio::signal::ctrl_c().await?;
                    return Ok(());
                }
            }
        }
    }
}

// Start and stop join threads, keep them off the runtime.
async fn run_command(orchestrator: &Arc<Orchestrator>, command: ControlCommand) {
    let handle = orchestrator.clone();
    match tokio::task::spawn_blocking(move || handle.handle(command)).await {
        Ok(true) => debug!("{:?} applied", command),
        Ok(false) => info!("{:?} ignored, pipeline already in that state", command),
        Err(e) => error!("{:?} failed: {}", command, e),
    }
}

async fn drain_events(mut receiver: EventReceiver, view: SharedView) {
    while let Some(status) = receiver.recv().await {
        let Ok(mut panel) = view.lock() else {
            error!("Panel view lock poisoned, stopping status updates");
            return;
        };
        match status.event {
            PipelineEvent::Device(link) => {
                if panel.device != link {
                    info!("Controller: {:?}", link);
                }
                panel.device = link;
            }
            PipelineEvent::Network(link) => {
                if panel.network != link {
                    info!("Network: {:?}", link);
                }
                panel.network = link;
            }
            PipelineEvent::Pipeline(state) => panel.pipeline = state,
            PipelineEvent::Input(_) => {}
            PipelineEvent::Log { severity, message } => match severity {
                Severity::Error => {
                    panel.errors += 1;
                    panel.last_problem = Some((status.at, message));
                }
                Severity::Warning => {
                    panel.warnings += 1;
                    panel.last_problem = Some((status.at, message));
                }
                Severity::Info | Severity::Debug => {}
            },
        }
    }
    debug!("Status channel closed");
}

fn print_status(orchestrator: &Orchestrator, view: &SharedView) {
    let status = orchestrator.status();
    println!(
        "pipeline: {} | target {} ({:?}) | poll {} Hz | transmit {} Hz",
        if status.running { "running" } else { "stopped" },
        status.target,
        status.network,
        status.poll_hz,
        status.transmit_hz
    );

    match view.lock() {
        Ok(view) => {
            println!(
                "last event: {:?} | controller: {:?} | network: {:?} | {} warnings, {} errors",
                view.pipeline, view.device, view.network, view.warnings, view.errors
            );
            if let Some((at, message)) = &view.last_problem {
                println!("last problem at {}: {}", at.format("%H:%M:%S"), message);
            }
        }
        Err(_) => warn!("Panel view unavailable"),
    }

    match orchestrator.input_snapshot() {
        Ok(snapshot) => match toml::to_string(&snapshot) {
            Ok(text) => println!("{}", text.trim_end()),
            Err(e) => warn!("Could not render input snapshot: {}", e),
        },
        Err(e) => warn!("{}", e),
    }
}
