//! Ready-made stages for capture pipelines.
//!
//! This module provides:
//! - Reading captures from disk or `file://` URIs
//! - Saving images and text with templated file names
//! - Clipboard integration through a clipboard command
//! - Turning links into text

pub mod clipboard;
pub mod file;
pub mod source;
pub mod text;

pub use clipboard::{ClipboardSink, CommandClipboard, CopyToClipboard};
pub use file::{FileSaveConfig, SaveToFile};
pub use source::FileSource;
pub use text::UriToText;
