//! Redaction worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use redact_media::{DetectorFactory, FaceDetector, MediaError, MediaResult, YuNetFactory};
use redact_models::{
    ChatId, JobId, JobKind, JobOutcome, MessageRef, ModeMetadata, ProcessingMode, UserId,
    VoiceLevel,
};
use redact_queue::{JobTicket, Scheduler, SubmissionLimits};
use redact_worker::control::{self, ControlReply};
use redact_worker::{
    JobCoordinator, JobExecutor, LocalFileStore, LogTransport, NotifyError, NotifyResult,
    Transport, WorkerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "redact-worker", version, about = "Face and voice redaction worker")]
struct Cli {
    /// YuNet model file; searched in the default locations when omitted
    #[arg(long, env = "REDACT_YUNET_MODEL", global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read JSON control commands from stdin, one per line, and answer on stdout
    Serve {
        /// Directory that relative payload paths are resolved against
        #[arg(long, env = "REDACT_PAYLOAD_ROOT", default_value = ".")]
        payload_root: PathBuf,
    },
    /// Redact one file and exit
    Process {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = CliMode::Face)]
        mode: CliMode,
        /// Stronger voice disguise (voice mode only)
        #[arg(long)]
        secure: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Face,
    Voice,
}

/// Stands in for the detector when no model could be loaded, so voice
/// jobs still run and face jobs fail with the load error.
struct UnavailableDetectors {
    reason: String,
}

impl DetectorFactory for UnavailableDetectors {
    fn create(&self, _width: u32, _height: u32) -> MediaResult<Box<dyn FaceDetector>> {
        Err(MediaError::model_not_found(self.reason.clone()))
    }
}

/// Copies the finished artifact to a fixed path before the workspace is removed.
struct SaveToPath {
    dest: PathBuf,
}

#[async_trait]
impl Transport for SaveToPath {
    async fn notify_turn(&self, _chat_id: ChatId) -> NotifyResult<()> {
        Ok(())
    }

    async fn notify_queue_update(
        &self,
        _chat_id: ChatId,
        message: Option<MessageRef>,
        _position: usize,
        _eta_secs: u64,
    ) -> NotifyResult<Option<MessageRef>> {
        Ok(message)
    }

    async fn deliver_result(
        &self,
        _chat_id: ChatId,
        _kind: JobKind,
        outcome: &JobOutcome,
    ) -> NotifyResult<()> {
        if let Some(output) = outcome.output() {
            tokio::fs::copy(output, &self.dest)
                .await
                .map_err(|e| NotifyError::failed(format!("{}: {e}", self.dest.display())))?;
        }
        Ok(())
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("redact=info"));

    // Logs go to stderr; stdout carries control replies.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .init();
    }
}

fn load_detectors(model: Option<PathBuf>) -> Arc<dyn DetectorFactory> {
    let factory = match model {
        Some(path) => YuNetFactory::new(path),
        None => YuNetFactory::discover(),
    };
    match factory {
        Ok(factory) => Arc::new(factory),
        Err(e) => {
            warn!(error = %e, "Face detector unavailable; face jobs will fail");
            Arc::new(UnavailableDetectors {
                reason: e.to_string(),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    info!(?config, "Starting redact-worker");

    if let Some(port) = config.metrics_port {
        redact_worker::metrics::install_prometheus(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let detectors = load_detectors(cli.model);

    match cli.command {
        Command::Serve { payload_root } => serve(config, detectors, payload_root).await,
        Command::Process {
            input,
            output,
            mode,
            secure,
        } => process(config, detectors, input, output, mode, secure).await,
    }
}

async fn serve(
    config: WorkerConfig,
    detectors: Arc<dyn DetectorFactory>,
    payload_root: PathBuf,
) -> anyhow::Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(LogTransport::new());
    let store = Arc::new(LocalFileStore::new(payload_root));
    let executor = JobExecutor::new(&config, detectors, store.clone(), transport.clone());
    let coordinator = JobCoordinator::new(
        Scheduler::new(config.scheduler_config()),
        executor,
        transport,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            line = lines.next_line() => line.context("reading control input")?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match control::parse_line(&line) {
            Ok(command) => control::handle(&coordinator, &store, command).await,
            Err(reply) => reply,
        };
        let mut encoded = serde_json::to_vec(&reply)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    if !coordinator.shutdown(config.shutdown_timeout).await {
        error!("Shutdown timed out with jobs still running");
    }
    info!("Worker shutdown complete");
    Ok(())
}

async fn process(
    config: WorkerConfig,
    detectors: Arc<dyn DetectorFactory>,
    input: PathBuf,
    output: PathBuf,
    mode: CliMode,
    secure: bool,
) -> anyhow::Result<()> {
    let mode = ModeMetadata {
        mode: match mode {
            CliMode::Face => ProcessingMode::Face,
            CliMode::Voice => ProcessingMode::Voice,
        },
        voice_level: if secure {
            VoiceLevel::Secure
        } else {
            VoiceLevel::Fast
        },
    };

    let store = Arc::new(LocalFileStore::new("."));
    let (media, file) = control::describe_payload(&store, &input).await?;
    let kind = SubmissionLimits::resolve_kind(media, &mode)?;
    let estimated_secs = config.eta.job_secs(kind, file.size_mb()) as u64;

    let transport = Arc::new(SaveToPath {
        dest: output.clone(),
    });
    let executor = JobExecutor::new(&config, detectors, store, transport);
    let ticket = JobTicket {
        job_id: JobId::new(),
        user_id: UserId(0),
        chat_id: ChatId(0),
        kind,
        file,
        mode,
        started_at: chrono::Utc::now(),
        estimated_secs,
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = executor.execute(&ticket, &cancel).await;
    ctrl_c.abort();

    match outcome {
        JobOutcome::Success { .. } => {
            info!(output = %output.display(), "Done");
            Ok(())
        }
        JobOutcome::SuccessDegraded { reason, .. } => {
            warn!(output = %output.display(), reason = %reason, "Done without audio");
            Ok(())
        }
        JobOutcome::Cancelled => bail!("cancelled"),
        JobOutcome::Failed { reason } => bail!("failed: {reason}"),
    }
}
