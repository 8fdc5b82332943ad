//! CLI command implementations

pub mod config;
pub mod gbp;
pub mod generate;
pub mod queue;
pub mod tracks;

pub use config::ConfigCommand;
pub use gbp::GbpCommand;
pub use generate::GenerateCommand;
pub use queue::QueueCommand;
pub use tracks::TracksCommand;
