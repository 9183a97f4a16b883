//! Link-to-text conversion.

use crate::cancel::CancelToken;
use crate::data::{DataType, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::Stage;

/// Turns a link into its textual form.
///
/// With [`UriToText::local_paths`], `file://` links become plain filesystem
/// paths; other schemes are always kept as URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UriToText {
    local_paths: bool,
}

impl UriToText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_paths() -> Self {
        Self { local_paths: true }
    }
}

impl Stage for UriToText {
    fn name(&self) -> &str {
        "uri-to-text"
    }

    fn input_types(&self) -> TypeSet {
        TypeSet::single(DataType::Uri)
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        if input == DataType::Uri {
            TypeSet::single(DataType::Text)
        } else {
            TypeSet::new()
        }
    }

    fn time_estimate(&self) -> TimeEstimate {
        TimeEstimate::INSTANTANEOUS
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        cancel.check()?;
        let uri = data.as_uri().ok_or_else(|| {
            PipelineError::InvalidOperation(format!(
                "'{}' is tagged {} but carries no link",
                data.name(),
                data.data_type()
            ))
        })?;

        let text = match uri.scheme() {
            "file" if self.local_paths => uri
                .to_file_path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|_| uri.to_string()),
            _ => uri.to_string(),
        };
        progress.set_progress(1.0);

        Ok(Some(TypedData::from_text(text, data.name())))
    }
}
