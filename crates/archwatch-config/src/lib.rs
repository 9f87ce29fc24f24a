//! Configuration system for archwatch.
//!
//! A config file lists the directories to monitor, each with its archive
//! destination, the action to perform, and the delay before performing it:
//!
//! ```json
//! {
//!   "configs": [
//!     {
//!       "sourceFolder": "/srv/inbox",
//!       "archiveFolder": "/srv/archive",
//!       "action": "MOVE",
//!       "delay": 5,
//!       "unit": "SECONDS"
//!     }
//!   ]
//! }
//! ```
//!
//! JSON is the primary format; files ending in `.toml` are parsed as TOML
//! with the same schema. An optional `settings` object tunes the watcher
//! runtime (stability polling, restart budget, hash algorithm).

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    DEFAULT_CONFIG_FILE, load_config_file, resolve_config_path, save_config,
    write_default_config,
};
pub use error::{ConfigError, Result};
pub use types::*;
