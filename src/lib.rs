//! Context Keeper - persistent assistant context with a live viewer
//!
//! A small set of JSON/markdown documents describes the current working
//! context: focus, decisions, feedback, UX settings, and a queue of pending
//! feedback queries. Around them:
//! - an updater for manual mutations (CLI and viewer)
//! - a polling feedback agent that turns feedback into UX configuration
//! - a local HTTP server with a browser viewer that reflects every change
//!
//! # Example
//!
//! ```ignore
//! use context_keeper::{ContextStore, updater, types::{FeedbackKind, FeedbackSource}};
//!
//! let store = ContextStore::open(".context")?;
//! store.init()?;
//! updater::add_feedback(&store, "make it darker", FeedbackKind::Preference, None, FeedbackSource::Manual)?;
//! ```

// Core modules
pub mod types;
pub mod config;
pub mod store;
pub mod updater;
pub mod agent;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use config::Config;

pub use store::{
    ContextStore,
    Document,
    DocumentKind,
    StoreError,
    StoreLimits,
};

pub use agent::{
    CycleOutcome,
    FeedbackAgent,
};

pub use server::{
    ServerState,
    router,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Persistent assistant context", NAME, VERSION)
}
