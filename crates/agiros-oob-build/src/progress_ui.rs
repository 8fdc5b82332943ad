//! Progress display for batch runs
//!
//! The display is also the observer of subprocess output, so streamed lines
//! are printed above the progress bar instead of tearing it.

use std::sync::Mutex;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use crate::process::{CommandSpec, OutputObserver};

/// Trait for progress UI implementations
pub trait ProgressUI: OutputObserver {
    /// This display as a subprocess output observer
    fn observer(&self) -> &dyn OutputObserver;

    /// A pass over `total` packages starts
    fn batch_started(&self, total: usize);

    /// A package starts
    fn package_started(&self, name: &str);

    /// A package finished; `error` is set on failure
    fn package_finished(&self, name: &str, error: Option<&str>);

    /// A package was skipped
    fn package_skipped(&self, name: &str, reason: &str);

    /// The pass is over
    fn finish(&self);
}

const BAR_TEMPLATE: &str =
    "{prefix:.bold.dim} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Indicatif-based progress UI implementation
pub struct IndicatifProgressUI {
    bar: ProgressBar,
    failures: Mutex<usize>,
    start_time: Instant,
}

impl IndicatifProgressUI {
    /// Create a new indicatif progress UI
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => debug!("Falling back to the default bar style: {}", e),
        }
        bar.set_prefix("Packages");
        Self { bar, failures: Mutex::new(0), start_time: Instant::now() }
    }

    fn print(&self, text: String) {
        self.bar.suspend(|| println!("{text}"));
    }
}

impl Default for IndicatifProgressUI {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputObserver for IndicatifProgressUI {
    fn on_command(&self, spec: &CommandSpec, dry_run: bool) {
        let tag = if dry_run { "[DRY]" } else { "[RUN]" };
        self.print(format!("{tag} {}\n      cwd={}", spec.command_line(), spec.cwd.display()));
    }

    fn on_line(&self, line: &str) {
        self.print(line.to_string());
    }
}

impl ProgressUI for IndicatifProgressUI {
    fn observer(&self) -> &dyn OutputObserver {
        self
    }

    fn batch_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.enable_steady_tick(std::time::Duration::from_millis(120));
    }

    fn package_started(&self, name: &str) {
        self.bar.set_message(name.to_string());
        self.print(format!("==> {name}"));
    }

    fn package_finished(&self, name: &str, error: Option<&str>) {
        match error {
            None => self.print(format!("✓ {name}")),
            Some(reason) => {
                if let Ok(mut failures) = self.failures.lock() {
                    *failures += 1;
                }
                self.print(format!("✗ {name}: {reason}"));
            }
        }
        self.bar.inc(1);
    }

    fn package_skipped(&self, name: &str, reason: &str) {
        self.print(format!("- {name}: {reason}"));
        self.bar.inc(1);
    }

    fn finish(&self) {
        let failures = self.failures.lock().map(|f| *f).unwrap_or(0);
        let elapsed = self.start_time.elapsed();
        self.bar.finish_with_message(format!("done in {elapsed:.1?}, {failures} failed"));
    }
}

/// No-op progress UI; events only go to the log
pub struct NoOpProgressUI;

impl OutputObserver for NoOpProgressUI {
    fn on_command(&self, spec: &CommandSpec, dry_run: bool) {
        let tag = if dry_run { "[DRY]" } else { "[RUN]" };
        info!("{} {} (cwd={})", tag, spec.command_line(), spec.cwd.display());
    }

    fn on_line(&self, line: &str) {
        debug!("{}", line);
    }
}

impl ProgressUI for NoOpProgressUI {
    fn observer(&self) -> &dyn OutputObserver {
        self
    }

    fn batch_started(&self, total: usize) {
        info!("Processing {} package(s)", total);
    }

    fn package_started(&self, name: &str) {
        info!("Building package {}", name);
    }

    fn package_finished(&self, name: &str, error: Option<&str>) {
        match error {
            None => info!("Package {} built successfully", name),
            Some(reason) => error!("Package {} failed: {}", name, reason),
        }
    }

    fn package_skipped(&self, name: &str, reason: &str) {
        info!("Skipping {}: {}", name, reason);
    }

    fn finish(&self) {
        info!("Batch finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicatif_progress_ui() {
        let ui = IndicatifProgressUI::new();
        ui.batch_started(2);
        ui.package_started("pkgA");
        ui.on_command(&CommandSpec::new("gbp", "/tmp").arg("buildpackage"), false);
        ui.on_line("dpkg-buildpackage: info: source package pkgA");
        ui.package_finished("pkgA", None);
        ui.package_started("pkgB");
        ui.package_finished("pkgB", Some("rpm failed rc=1"));
        ui.finish();
        assert_eq!(*ui.failures.lock().unwrap(), 1);
        assert_eq!(ui.bar.position(), 2);
    }

    #[test]
    fn test_noop_progress_ui() {
        let ui = NoOpProgressUI;
        ui.batch_started(1);
        ui.package_skipped("pkgA", "already completed");
        ui.on_line("anything");
        ui.finish();
    }
}
