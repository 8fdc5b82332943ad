//! Durable build queue for the AGIROS out-of-band packaging tools
//!
//! The queue lives in two files kept consistent after every write:
//!
//! - a line file with one package name per line, suffixed with `#` once the
//!   package built successfully; it owns ordering and completion;
//! - a JSON side file `<line file>.meta.json` holding each package's source
//!   path and per-kind extra arguments.
//!
//! [`codec`] parses and renders both files, [`model::merge`] reconciles them
//! into a [`QueueState`], and [`QueueStore`] performs reload-modify-save
//! mutations through a [`QueueFiles`] port.

pub mod codec;
pub mod error;
pub mod model;
pub mod store;

pub use codec::{LineEntry, LineFile, MetaFile, PackageMeta};
pub use error::{QueueError, Result};
pub use model::{merge, QueueState};
pub use store::{FsQueueFiles, MemoryQueueFiles, QueueFiles, QueueStore};
