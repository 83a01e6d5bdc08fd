//! Terminal UI shell.
//!
//! The shell:
//! - Builds one editable row per catalog command, grouped in section tabs
//! - Holds the connection settings the operator edits
//! - Hands sends to the dispatcher and renders results in the transcript

pub mod app;
pub mod rows;
pub mod tui;
pub mod view;

pub use app::App;
pub use tui::run;
