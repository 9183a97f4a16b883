//! Saving captures to disk.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use url::Url;

use crate::cancel::CancelToken;
use crate::data::{DataType, Payload, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::Stage;

/// Configuration for file saving.
#[derive(Debug, Clone)]
pub struct FileSaveConfig {
    /// Directory to save captures to.
    pub save_directory: PathBuf,
    /// Filename template (supports chrono format specifiers).
    pub filename_template: String,
    /// Extension for image captures.
    pub format: String,
    /// Extension for text captures.
    pub text_format: String,
}

impl Default for FileSaveConfig {
    fn default() -> Self {
        Self {
            save_directory: dirs::picture_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Snapflow"),
            filename_template: "capture_%Y-%m-%d_%H%M%S".to_string(),
            format: "png".to_string(),
            text_format: "txt".to_string(),
        }
    }
}

/// Generate a filename based on the template and current time.
///
/// Templates with invalid format specifiers are used verbatim.
pub fn generate_filename(template: &str, extension: &str) -> String {
    let mut stem = String::new();
    if write!(stem, "{}", Local::now().format(template)).is_err() {
        log::warn!("Invalid filename template '{}', using it verbatim", template);
        stem = template.to_string();
    }
    format!("{}.{}", stem, extension)
}

/// Ensure the save directory exists, creating it if necessary.
pub fn ensure_directory_exists(directory: &Path) -> Result<PathBuf> {
    if !directory.exists() {
        log::info!("Creating capture directory: {}", directory.display());
        fs::create_dir_all(directory)?;
    }

    let canonical = directory
        .canonicalize()
        .unwrap_or_else(|_| directory.to_path_buf());

    Ok(canonical)
}

/// First path in `directory` named `filename` that does not exist yet,
/// appending `_1`, `_2`, ... to the stem on collision.
fn unique_path(directory: &Path, filename: &str) -> PathBuf {
    let candidate = directory.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, extension) = match filename.rsplit_once('.') {
        Some((stem, extension)) => (stem, format!(".{}", extension)),
        None => (filename, String::new()),
    };
    (1..)
        .map(|n| directory.join(format!("{}_{}{}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Expand tilde (~) in path strings.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

/// Writes images, text, or raw bytes to the save directory and emits the
/// `file://` URI of the written file.
pub struct SaveToFile {
    config: FileSaveConfig,
    estimate: TimeEstimate,
}

impl SaveToFile {
    pub fn new(config: FileSaveConfig) -> Self {
        Self {
            config,
            estimate: TimeEstimate::SHORT_OPERATION,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.estimate = TimeEstimate::new(weight, false);
        self
    }

    pub fn config(&self) -> &FileSaveConfig {
        &self.config
    }

    fn extension_for(&self, data_type: DataType) -> &str {
        match data_type {
            DataType::Image => &self.config.format,
            DataType::Text => &self.config.text_format,
            _ => "bin",
        }
    }
}

impl Stage for SaveToFile {
    fn name(&self) -> &str {
        "save-to-file"
    }

    fn input_types(&self) -> TypeSet {
        TypeSet::of(&[DataType::Image, DataType::Text, DataType::RawData])
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        if self.input_types().contains(input) {
            TypeSet::single(DataType::Uri)
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
        let data_type = data.data_type();
        let extension = self.extension_for(data_type).to_string();
        let (name, payload) = data.into_parts();
        let bytes = match payload {
            Payload::Image(bytes) | Payload::Bytes(bytes) => bytes,
            Payload::Text(text) => text.into_bytes(),
            other => {
                return Err(PipelineError::InvalidOperation(format!(
                    "cannot save {:?} payload tagged {}",
                    other, data_type
                )));
            }
        };

        progress.set_status("Saving to file");
        let directory = ensure_directory_exists(&self.config.save_directory)?;
        let filename = generate_filename(&self.config.filename_template, &extension);
        let file_path = unique_path(&directory, &filename);

        log::info!(
            "Saving {} capture to: {} ({} bytes)",
            data_type,
            file_path.display(),
            bytes.len()
        );
        fs::write(&file_path, &bytes)?;
        progress.set_progress(0.5);

        let written_size = fs::metadata(&file_path)?.len();
        log::debug!("File written: {} bytes", written_size);

        // User read/write only
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&file_path, Permissions::from_mode(0o600))?;
        }

        let uri = Url::from_file_path(&file_path).map_err(|_| {
            PipelineError::InvalidUri(format!(
                "Saved path is not absolute: {}",
                file_path.display()
            ))
        })?;
        progress.set_status(format!("Saved {}", file_path.display()));
        progress.set_progress(1.0);
        log::info!("Capture '{}' saved: {}", name, file_path.display());

        Ok(Some(TypedData::from_uri(uri, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> FileSaveConfig {
        FileSaveConfig {
            save_directory: dir.join("nested"),
            filename_template: "shot".to_string(),
            ..FileSaveConfig::default()
        }
    }

    #[test]
    fn test_generate_filename() {
        let filename = generate_filename("test_%Y%m%d", "png");
        assert!(filename.starts_with("test_"));
        assert!(filename.ends_with(".png"));
        assert!(filename.contains("20"));
    }

    #[test]
    fn invalid_template_is_used_verbatim() {
        assert_eq!(generate_filename("bad_%Q", "txt"), "bad_%Q.txt");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/Pictures");
        assert!(!expanded.to_string_lossy().starts_with("~"));

        let no_tilde = expand_tilde("/absolute/path");
        assert_eq!(no_tilde, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_default_config() {
        let config = FileSaveConfig::default();
        assert_eq!(config.format, "png");
        assert_eq!(config.text_format, "txt");
        assert!(config.save_directory.to_string_lossy().contains("Snapflow"));
    }

    #[test]
    fn saves_image_and_emits_file_uri() {
        let temp = TempDir::new().unwrap();
        let stage = SaveToFile::new(config_in(temp.path()));
        let progress = ProgressTracker::new();

        let out = stage
            .process(
                TypedData::from_image(vec![1, 2, 3], "shot"),
                &progress,
                &CancelToken::new(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(out.data_type(), DataType::Uri);
        let path = out.as_uri().unwrap().to_file_path().unwrap();
        assert!(path.ends_with("nested/shot.png"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(progress.progress(), 1.0);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn text_uses_text_extension_and_collisions_get_suffix() {
        let temp = TempDir::new().unwrap();
        let stage = SaveToFile::new(config_in(temp.path()));
        let cancel = CancelToken::new();

        let first = stage
            .process(TypedData::from_text("a", "n"), &ProgressTracker::new(), &cancel)
            .unwrap()
            .unwrap();
        let second = stage
            .process(TypedData::from_text("b", "n"), &ProgressTracker::new(), &cancel)
            .unwrap()
            .unwrap();

        let first = first.as_uri().unwrap().to_file_path().unwrap();
        let second = second.as_uri().unwrap().to_file_path().unwrap();
        assert!(first.ends_with("shot.txt"));
        assert!(second.ends_with("shot_1.txt"));
        assert_eq!(fs::read_to_string(second).unwrap(), "b");
    }

    #[test]
    fn raw_bytes_use_bin_extension() {
        let stage = SaveToFile::new(FileSaveConfig::default());
        assert_eq!(stage.extension_for(DataType::RawData), "bin");
        assert_eq!(
            stage.output_types(DataType::RawData),
            TypeSet::single(DataType::Uri)
        );
        assert!(stage.output_types(DataType::Uri).is_empty());
    }

    #[test]
    fn canceled_before_write_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let stage = SaveToFile::new(config_in(temp.path()));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = stage
            .process(TypedData::from_image(vec![1], "x"), &ProgressTracker::new(), &cancel)
            .unwrap_err();
        assert!(err.is_canceled());
        assert!(!temp.path().join("nested").exists());
    }
}
