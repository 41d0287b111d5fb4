//! Terminal presentation.
//!
//! - [`screen`]: the shared terminal and what is drawn on it
//! - [`editor`]: the line editor used by interactive prompts
//! - [`theme`]: light/dark styles

pub mod editor;
pub mod screen;
pub mod theme;

pub use editor::LineEditor;
pub use screen::{status_line, Screen};
pub use theme::Theme;
