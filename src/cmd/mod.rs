//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `init`    | `Init`           |
//! | `context` | `Context`        |
//! | `config`  | `Config`         |

pub mod config;
pub mod context;
pub mod init;
pub mod serve;

pub use config::{cmd_config, load_config};
pub use context::cmd_context;
pub use init::cmd_init;
pub use serve::cmd_serve;
