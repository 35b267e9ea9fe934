//! Configuration for tile builds.
//!
//! [`BuilderConfig`] carries every setting of a build with documented
//! defaults; it can be assembled in code with `with_*` setters or loaded from
//! an INI file.
//!
//! # Example
//!
//! ```
//! use tilebaker::config::BuilderConfig;
//! use tilebaker::coord::TileScheme;
//!
//! let config = BuilderConfig::new()
//!     .with_cache_scheme(TileScheme::Xyz)
//!     .with_download_retries(3);
//! assert!(config.validate().is_ok());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigError, CONFIG_FILE_NAME};
pub use settings::BuilderConfig;
