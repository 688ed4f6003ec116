//! HTTP surface.
//!
//! ```text
//! ┌──────────┐   HTTP   ┌─────────────────────────────────────────────┐
//! │  Client  │ ───────> │  router.rs  (axum Router, ServerConfig)     │
//! │   (UI)   │ <─────── │    ├─ api.rs  (route handlers, AppState)    │
//! └──────────┘ WebSocket│    └─ ws.rs   (/ws event stream)            │
//!                       │         │                                   │
//!                       │         v                                   │
//!                       │  chat::ChatOrchestrator                     │
//!                       └─────────────────────────────────────────────┘
//! ```
//!
//! Every handler is a thin shell over one orchestrator operation;
//! [`api::ApiError`] turns [`crate::errors::ChatError`] into a status code
//! and a `{"error": ...}` body.

pub mod api;
pub mod router;
pub mod ws;

pub use api::{ApiError, AppState, api_router};
pub use router::{ServerConfig, build_router, start_server};
