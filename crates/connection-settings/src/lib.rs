//! Connection settings for the application's local API server, resolved from a JSON config
//! file, caller supplied overrides and built in defaults. Also holds the small environment
//! probes and logging setup the command line tools share.

mod error;
pub mod logging;
pub mod settings;
pub mod wsl;

pub use error::{Error, Result};
pub use settings::{ConfigLocation, ConnectionInfo, Overrides, resolve};
