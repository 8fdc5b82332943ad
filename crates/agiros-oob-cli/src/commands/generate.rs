//! Generate command implementation

use std::path::PathBuf;

use agiros_oob_build::{
    FailureLog, GenerateMode, GenerateOptions, GenerationSummary, IndicatifProgressUI,
    NoOpProgressUI, ProgressUI, ReleaseGenerator, SystemRunner,
};
use agiros_oob_config::Config;
use agiros_oob_queue::QueueStore;
use color_eyre::eyre::{eyre, Context, Result};
use tracing::{info, warn};

/// Generate command implementation
pub struct GenerateCommand {
    config: Config,
    mode: GenerateMode,
    limit: Option<usize>,
    enqueue: bool,
    package: Option<PathBuf>,
    show_progress: bool,
}

impl GenerateCommand {
    pub fn new(
        config: Config,
        mode: GenerateMode,
        limit: Option<usize>,
        enqueue: bool,
        package: Option<PathBuf>,
        show_progress: bool,
    ) -> Self {
        Self { config, mode, limit, enqueue, package, show_progress }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = &self.config;
        info!(
            "Generating {} metadata (tracks distro {}, ros distro {})",
            self.mode, config.tracks_distro, config.ros_distro
        );
        if self.package.is_none() && !config.release_dir.is_dir() {
            return Err(eyre!("Release directory does not exist: {}", config.release_dir.display()));
        }
        for tool in config.missing_tools() {
            warn!("{} not found on PATH", tool);
        }

        let runner = SystemRunner::from_config(config);
        let log = FailureLog::new(&config.fail_log);
        let store = QueueStore::open(&config.queue_file, config.meta_file(), &config.code_dir);
        let ui: Box<dyn ProgressUI> = if self.show_progress && self.package.is_none() {
            Box::new(IndicatifProgressUI::new())
        } else {
            Box::new(NoOpProgressUI)
        };

        let generator = ReleaseGenerator::new(config, &runner, &log, ui.as_ref()).with_queue(&store);
        let options = GenerateOptions { mode: self.mode, limit: self.limit, enqueue: self.enqueue };
        let summary = match &self.package {
            Some(dir) => generator
                .run_single(dir, options)
                .await
                .wrap_err_with(|| format!("Generation failed for {}", dir.display()))?,
            None => generator.run(options).await.wrap_err("Generation failed")?,
        };

        print_summary(&summary, &log);
        if summary.failed.is_empty() {
            Ok(())
        } else {
            Err(eyre!("{} tree(s) failed to generate", summary.failed.len()))
        }
    }
}

fn print_summary(summary: &GenerationSummary, log: &FailureLog) {
    println!("\n✓ {} generated, {} gbp.conf synced", summary.generated, summary.gbp_synced);
    if summary.enqueued > 0 {
        println!("✓ {} task(s) queued", summary.enqueued);
    }
    if !summary.skipped.is_empty() {
        println!("Skipped {}:", summary.skipped.len());
        for (name, reason) in &summary.skipped {
            println!("  - {name}: {reason}");
        }
    }
    if !summary.failed.is_empty() {
        println!("Failed {}:", summary.failed.len());
        for name in &summary.failed {
            println!("  - {name}");
        }
        println!("Failures are recorded in {}", log.path().display());
    }
}
