pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod input;
pub mod links;
pub mod pipeline;
pub mod responder;
pub mod state;
pub mod theme;
pub mod tui;
pub mod ui;
pub mod voice;

// Re-export main types for convenience
pub use config::Config;
pub use error::{ChatError, Result};
pub use input::OutboundPayload;
pub use links::format_links;
pub use pipeline::{ChatView, Pipeline, PipelineEvent};
pub use responder::{HttpResponder, Responder};
pub use state::{Author, Message, PendingIndicator, RenderState, Transcript};
pub use theme::{FileStore, ThemePreference, ThemeStore};
