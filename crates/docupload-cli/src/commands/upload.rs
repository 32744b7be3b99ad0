//! Upload command - Upload local files to the document store
//!
//! Provides the `docupload upload` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Opens every file as a byte source
//! 3. Enqueues them on an [`UploadQueue`] backed by the HTTP store
//! 4. Waits until the queue is idle, or on Ctrl+C cancels everything and
//!    waits for the open upload sessions to be deleted
//! 5. Prints one outcome per file and fails if any upload did not succeed

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use docupload_api::HttpDocumentStore;
use docupload_core::config::Config;
use docupload_core::domain::UploadStatus;
use docupload_core::ports::{ByteSource, FileSource};
use docupload_engine::{EngineConfig, UploadQueue};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{info, warn};

use crate::output::{get_formatter, OutputFormat};

/// How long an interrupted run waits for open sessions to be deleted
const CANCEL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Workspace to upload into (overrides store.workspace_id)
    #[arg(long)]
    pub workspace: Option<String>,

    /// Maximum number of parallel uploads (overrides upload.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// JSON object forwarded to the server with every file
    #[arg(long, value_name = "JSON")]
    pub run_options: Option<String>,
}

impl UploadCommand {
    /// Execute the upload command
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let config = Config::load_or_default(config_path);
        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Invalid configuration: {}", messages.join("; "));
        }

        let run_options = self
            .run_options
            .as_deref()
            .map(parse_run_options)
            .transpose()?;

        let mut sources: Vec<Arc<dyn ByteSource>> = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let source = FileSource::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            sources.push(Arc::new(source));
        }

        let store = HttpDocumentStore::from_config(&config.store, self.workspace.as_deref())
            .context("Failed to set up the document store client")?;

        let mut engine_config = EngineConfig::from(&config);
        if let Some(concurrency) = self.concurrency {
            engine_config = engine_config.with_concurrency(concurrency);
        }

        info!(
            files = sources.len(),
            concurrency = engine_config.concurrency,
            workspace = %store.client().workspace(),
            "Starting uploads"
        );

        let queue = UploadQueue::new(Arc::new(store), engine_config, Handle::current());
        let reporter = tokio::spawn(report_progress(queue.clone()));
        queue.enqueue(sources, run_options);

        tokio::select! {
            _ = queue.wait_idle() => {}
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C signal")?;
                formatter.warn("Interrupted, cancelling remaining uploads");
                for item in queue.items() {
                    if !item.status().is_terminal() {
                        queue.cancel(item.id());
                    }
                }
                if tokio::time::timeout(CANCEL_GRACE, queue.drain_background())
                    .await
                    .is_err()
                {
                    warn!(
                        grace_secs = CANCEL_GRACE.as_secs(),
                        "Gave up waiting for upload sessions to be deleted"
                    );
                }
            }
        }
        reporter.abort();

        let items = queue.items();
        for item in &items {
            formatter.outcome(item);
        }

        let summary = queue.summary();
        if format.is_json() {
            let json = serde_json::to_value(summary).context("Failed to serialize summary")?;
            formatter.print_json(&json);
        } else {
            formatter.info(&format!(
                "{} of {} uploaded, {} bytes",
                summary.counts.succeeded,
                items.len(),
                summary.uploaded_bytes
            ));
        }

        let unfinished = items
            .iter()
            .filter(|item| item.status() != UploadStatus::Succeeded)
            .count();
        if unfinished > 0 {
            bail!("{unfinished} of {} uploads did not succeed", items.len());
        }
        Ok(())
    }
}

/// Parses `--run-options`, which must be a JSON object
fn parse_run_options(raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--run-options is not valid JSON")?;
    if !value.is_object() {
        bail!("--run-options must be a JSON object");
    }
    Ok(value)
}

/// Logs overall progress whenever the percentage changes
async fn report_progress(queue: UploadQueue) {
    let mut rx = queue.subscribe();
    let mut last_percent = None;
    while rx.changed().await.is_ok() {
        let summary = rx.borrow_and_update().summary;
        if last_percent != Some(summary.percent) {
            last_percent = Some(summary.percent);
            info!(
                percent = summary.percent,
                uploaded = summary.uploaded_bytes,
                total = summary.total_bytes,
                in_flight = summary.in_flight_count,
                "Upload progress"
            );
        }
    }
}
