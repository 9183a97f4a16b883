//! Clipboard integration for copying captures.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::data::{DataType, Payload, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::Stage;

const TEXT_MIME: &str = "text/plain;charset=utf-8";
const IMAGE_MIME: &str = "image/png";

/// Destination for clipboard contents.
pub trait ClipboardSink: Send + Sync {
    fn copy(&self, bytes: &[u8], mime_type: &str) -> Result<()>;
}

/// Copies by piping the bytes into a clipboard command such as `wl-copy`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        Self::new("wl-copy")
    }
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check if the clipboard command can be spawned.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl ClipboardSink for CommandClipboard {
    fn copy(&self, bytes: &[u8], mime_type: &str) -> Result<()> {
        log::debug!(
            "Copying {} bytes ({}) via {}",
            bytes.len(),
            mime_type,
            self.program
        );

        let mut child = Command::new(&self.program)
            .arg("--type")
            .arg(mime_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PipelineError::Clipboard(format!(
                    "Failed to spawn {} (is it installed?): {}",
                    self.program, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(bytes).map_err(|e| {
                PipelineError::Clipboard(format!(
                    "Failed to write to {} stdin: {}",
                    self.program, e
                ))
            })?;
        }

        let output = child.wait_with_output().map_err(|e| {
            PipelineError::Clipboard(format!("Failed to wait for {}: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Clipboard(format!(
                "{} failed: {}",
                self.program,
                stderr.trim()
            )));
        }

        log::debug!("{} command completed successfully", self.program);
        Ok(())
    }
}

/// Copies images, text, or links to the clipboard and passes the data on
/// unchanged.
pub struct CopyToClipboard {
    sink: Arc<dyn ClipboardSink>,
    estimate: TimeEstimate,
}

impl Default for CopyToClipboard {
    fn default() -> Self {
        Self::new(Arc::new(CommandClipboard::default()))
    }
}

impl CopyToClipboard {
    pub fn new(sink: Arc<dyn ClipboardSink>) -> Self {
        Self {
            sink,
            estimate: TimeEstimate::INSTANTANEOUS,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.estimate = TimeEstimate::new(weight, false);
        self
    }
}

impl Stage for CopyToClipboard {
    fn name(&self) -> &str {
        "copy-to-clipboard"
    }

    fn input_types(&self) -> TypeSet {
        TypeSet::of(&[DataType::Image, DataType::Text, DataType::Uri])
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        if self.input_types().contains(input) {
            TypeSet::single(input)
        } else {
            TypeSet::new()
        }
    }

    fn time_estimate(&self) -> TimeEstimate {
        self.estimate
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        cancel.check()?;
        progress.set_status("Copying to clipboard");

        match data.payload() {
            Payload::Image(bytes) => self.sink.copy(bytes, IMAGE_MIME)?,
            Payload::Text(text) => self.sink.copy(text.as_bytes(), TEXT_MIME)?,
            Payload::Uri(uri) => self.sink.copy(uri.as_str().as_bytes(), TEXT_MIME)?,
            other => {
                return Err(PipelineError::InvalidOperation(format!(
                    "cannot copy {:?} payload to the clipboard",
                    other
                )));
            }
        }

        log::info!("Copied '{}' ({}) to clipboard", data.name(), data.data_type());
        progress.set_progress(1.0);
        Ok(Some(data))
    }
}
