//! Source stage that loads a capture from disk.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::cancel::CancelToken;
use crate::data::{DataType, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::Stage;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];
const TEXT_EXTENSIONS: [&str; 4] = ["txt", "md", "log", "csv"];

/// Resolve a plain path or a `file://` URI to a filesystem path.
///
/// Percent-encoded URIs (spaces, non-ASCII characters) are decoded.
pub fn resolve_location(location: &str) -> Result<PathBuf> {
    if !location.starts_with("file://") {
        return Ok(PathBuf::from(location));
    }

    let url = Url::parse(location)
        .map_err(|e| PipelineError::InvalidUri(format!("'{}': {}", location, e)))?;
    url.to_file_path()
        .map_err(|_| PipelineError::InvalidUri(format!("Cannot convert URI to path: {}", location)))
}

/// Data type implied by a file extension.
pub fn detect_type(path: &Path) -> DataType {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        DataType::Image
    } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        DataType::Text
    } else {
        DataType::RawData
    }
}

/// Reads a file and tags it by extension: images, text, or raw bytes.
pub struct FileSource {
    path: PathBuf,
    estimate: TimeEstimate,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            estimate: TimeEstimate::SHORT_OPERATION,
        }
    }

    /// Accepts a path or a `file://` URI.
    pub fn from_location(location: &str) -> Result<Self> {
        Ok(Self::new(resolve_location(location)?))
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.estimate = TimeEstimate::new(weight, false);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Stage for FileSource {
    fn name(&self) -> &str {
        "file-source"
    }

    fn input_types(&self) -> TypeSet {
        TypeSet::single(DataType::None)
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        if input == DataType::None {
            TypeSet::single(detect_type(&self.path))
        } else {
            TypeSet::new()
        }
    }

    fn time_estimate(&self) -> TimeEstimate {
        self.estimate
    }

    fn process(
        &self,
        _data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        cancel.check()?;
        progress.set_status(format!("Reading {}", self.path.display()));
        log::debug!("Reading capture from: {}", self.path.display());

        let bytes = fs::read(&self.path)?;
        let name = self
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("capture")
            .to_string();

        log::info!(
            "Read {} bytes from {}",
            bytes.len(),
            self.path.display()
        );
        progress.set_progress(1.0);

        let data = match detect_type(&self.path) {
            DataType::Image => TypedData::from_image(bytes, name),
            DataType::Text => TypedData::from_text(String::from_utf8_lossy(&bytes), name),
            _ => TypedData::from_bytes(bytes, name),
        };
        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_and_tags_by_extension() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("shot.png");
        let text = temp.path().join("note.TXT");
        let blob = temp.path().join("dump.bin");
        std::fs::write(&image, [137, 80, 78, 71]).unwrap();
        std::fs::write(&text, "hello").unwrap();
        std::fs::write(&blob, [0, 1]).unwrap();

        let progress = ProgressTracker::new();
        let cancel = CancelToken::new();

        let out = FileSource::new(&image)
            .process(TypedData::none(), &progress, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(out.data_type(), DataType::Image);
        assert_eq!(out.name(), "shot");
        assert_eq!(progress.progress(), 1.0);

        let out = FileSource::new(&text)
            .process(TypedData::none(), &progress, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(out.as_text(), Some("hello"));

        let source = FileSource::new(&blob);
        assert_eq!(
            source.output_types(DataType::None),
            TypeSet::single(DataType::RawData)
        );
        let out = source
            .process(TypedData::none(), &progress, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(out.as_bytes(), Some(&[0u8, 1][..]));
    }

    #[test]
    fn resolves_percent_encoded_file_uri() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("capture file.png");
        std::fs::write(&file_path, b"portal-bytes").unwrap();
        let uri = Url::from_file_path(&file_path).unwrap().to_string();

        let source = FileSource::from_location(&uri).unwrap();
        assert_eq!(source.path(), file_path.as_path());
        assert!(matches!(
            resolve_location("file://[bad"),
            Err(PipelineError::InvalidUri(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FileSource::new("/definitely/not/here.png")
            .process(TypedData::none(), &ProgressTracker::new(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn honours_cancellation_before_reading() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = FileSource::new("/definitely/not/here.png")
            .process(TypedData::none(), &ProgressTracker::new(), &cancel)
            .unwrap_err();
        assert!(err.is_canceled());
    }
}
