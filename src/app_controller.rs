use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::Config;
use crate::export::CaptionExporter;
use crate::image_source::ImageSource;
use crate::providers::{self, CaptionProvider};
use crate::queue::{CaptionQueue, Fanout, ProviderProfile, QueueEvent, QueueObserver, RetryPolicy};
use crate::store::{ItemStatus, ItemStore};

// @module: Application controller for batch captioning

/// Outcome of one captioning run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    // @field: Images found
    pub total: usize,
    // @field: Images captioned successfully
    pub captioned: usize,
    // @field: Images that ended in error
    pub failed: usize,
    // @field: Images left untouched by a stopped run
    pub interrupted: usize,
    // @field: Caption files written
    pub written: Vec<PathBuf>,
}

/// Progress bar driven by queue events
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        Self { bar }
    }

    /// Observer without a visible bar
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl QueueObserver for ProgressObserver {
    fn on_event(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Captioned { .. } => self.bar.inc(1),
            QueueEvent::StatusChanged { status: ItemStatus::Error, .. } => self.bar.inc(1),
            QueueEvent::StatusChanged { status: ItemStatus::Loading, message: Some(message), .. } => {
                self.bar.set_message(message.clone());
            }
            QueueEvent::Throttled { concurrency_limit, dispatch_delay } => {
                self.bar.println(format!(
                    "Quota limit hit: slowing down to {} request(s) every {:.0}s",
                    concurrency_limit,
                    dispatch_delay.as_secs_f64()
                ));
            }
            QueueEvent::RunFinished { cancelled: true } => self.bar.abandon_with_message("stopped"),
            QueueEvent::RunFinished { cancelled: false } => self.bar.finish_with_message("done"),
            _ => {}
        }
    }
}

/// Main application controller for image captioning
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Provider used instead of the configured one
    provider_override: Option<Arc<dyn CaptionProvider>>,
    // @field: Show a progress bar on the terminal
    show_progress: bool,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            provider_override: None,
            show_progress: true,
        })
    }

    /// Controller that sends every request to `provider`, without a progress bar
    pub fn with_provider(config: Config, provider: Arc<dyn CaptionProvider>) -> Self {
        Self {
            config,
            provider_override: Some(provider),
            show_progress: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn provider(&self) -> Arc<dyn CaptionProvider> {
        match &self.provider_override {
            Some(provider) => provider.clone(),
            None => providers::from_config(&self.config.caption),
        }
    }

    /// Build a queue wired to the store and an extra observer
    pub fn build_queue(&self, store: Arc<ItemStore>, observer: Arc<dyn QueueObserver>) -> CaptionQueue {
        let fanout = Fanout::new().with(store).with(observer);
        CaptionQueue::new(
            self.provider(),
            Arc::new(fanout),
            ProviderProfile::from_config(&self.config.caption),
            RetryPolicy::from_config(&self.config.caption.common),
            self.config.caption.common.prompt.clone(),
        )
    }

    // @method: Caption every image under `input` and write caption files to `output_dir`
    pub async fn run(&self, input: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<RunSummary> {
        if !input.exists() {
            return Err(anyhow!("Input path does not exist: {:?}", input));
        }

        let items = ImageSource::load_items(&input)
            .with_context(|| format!("Failed to scan images in {:?}", input))?;
        if items.is_empty() {
            warn!("No images found in {:?}", input);
            return Ok(RunSummary::default());
        }

        let store = Arc::new(ItemStore::new());
        for item in items {
            store.add(item);
        }
        info!(
            "Captioning {} image(s) with {} ({})",
            store.len(),
            self.config.caption.provider.display_name(),
            self.config.caption.get_model()
        );

        let total = store.len() as u64;
        let progress = Arc::new(if self.show_progress {
            ProgressObserver::new(total)
        } else {
            ProgressObserver::hidden(total)
        });
        let queue = Arc::new(self.build_queue(store.clone(), progress));

        let stop_queue = queue.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping caption run");
                stop_queue.cancel();
            }
        });

        queue.run(store.uncaptioned_jobs()).await;
        ctrl_c.abort();

        let interrupted = store.reset_interrupted();
        if interrupted > 0 {
            warn!("{} image(s) were not captioned before the stop", interrupted);
        }

        let source_root = if input.is_file() {
            input.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            input.clone()
        };
        self.finish(&store, &source_root, &output_dir, force_overwrite, interrupted)
    }

    fn finish(
        &self,
        store: &ItemStore,
        source_root: &Path,
        output_dir: &Path,
        force_overwrite: bool,
        interrupted: usize,
    ) -> Result<RunSummary> {
        let items = store.snapshot();
        for item in items.iter().filter(|item| item.status == ItemStatus::Error) {
            warn!(
                "Failed: {:?}: {}",
                item.source_path,
                item.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        let exporter = CaptionExporter::new(self.config.export.clone());
        let written = exporter.write_all(&items, source_root, output_dir, force_overwrite)?;
        debug!("Wrote {} caption file(s) to {:?}", written.len(), output_dir);

        let counts = store.counts();
        let summary = RunSummary {
            total: items.len(),
            captioned: counts.get(&ItemStatus::Success).copied().unwrap_or(0),
            failed: counts.get(&ItemStatus::Error).copied().unwrap_or(0),
            interrupted,
            written,
        };
        info!(
            "Done: {} captioned, {} failed, {} interrupted, {} file(s) written",
            summary.captioned,
            summary.failed,
            summary.interrupted,
            summary.written.len()
        );
        Ok(summary)
    }
}
