//! Conversation, message and document persistence.
//!
//! | Operation           | `ChatDb` method                         |
//! |---------------------|-----------------------------------------|
//! | add                 | `add_document`                          |
//! | markLoading/refresh | `begin_attempt(conv, id, None)`         |
//! | edit                | `begin_attempt(conv, id, Some(url))`    |
//! | markComplete        | `complete_attempt(id, generation, ..)`  |
//! | markError           | `fail_attempt(id, generation, ..)`      |
//! | remove              | `remove_document` (idempotent)          |
//! | list                | `list_documents` (insertion order)      |
//!
//! Every method is a single statement or a single transaction, and all of
//! them run behind the `DbHandle` mutex, so callers never observe a
//! half-written document.

pub mod db;
pub mod models;

pub use db::{ChatDb, DbHandle};
pub use models::*;
