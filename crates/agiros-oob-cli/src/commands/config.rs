//! Config command implementation

use agiros_oob_config::Config;
use color_eyre::eyre::{eyre, Context, Result};
use tracing::{error, warn};

/// Prints the effective configuration and optionally checks it
pub struct ConfigCommand {
    config: Config,
    check: bool,
}

impl ConfigCommand {
    pub fn new(config: Config, check: bool) -> Self {
        Self { config, check }
    }

    pub async fn execute(&self) -> Result<()> {
        match self.config.source() {
            Some(path) => println!("# loaded from {}", path.display()),
            None => println!("# built-in defaults and environment"),
        }
        let yaml =
            serde_yaml::to_string(&self.config).wrap_err("Failed to serialize config to YAML")?;
        print!("{yaml}");

        if !self.check {
            return Ok(());
        }

        println!();
        if let Err(e) = self.config.validate() {
            error!("{}", e);
            return Err(eyre!("Configuration check failed"));
        }
        println!("✓ Release directory: {}", self.config.release_dir.display());
        println!("✓ Code directory: {}", self.config.code_dir.display());

        let missing = self.config.missing_tools();
        for tool in &missing {
            warn!("{} not found on PATH", tool);
        }
        if missing.is_empty() {
            println!("✓ All external tools found");
        }
        println!("\n✓ Configuration checks passed");
        Ok(())
    }
}
