//! The stage capability and the registry of shared, pre-configured stages.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::data::{DataType, TypeSet, TypedData};
use crate::error::Result;
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;

/// A unit of transformation or side effect in a pipeline.
///
/// Stages declare up front which tags they accept and which tags they can
/// produce, so chains and routers can check compatibility without looking at
/// payloads. A stage returning `Ok(None)` produced nothing (for example an
/// unmatched route).
pub trait Stage: Send + Sync {
    /// Human readable name used in logs and errors.
    fn name(&self) -> &str;

    fn input_types(&self) -> TypeSet;

    /// Tags this stage may produce when given `input`.
    fn output_types(&self, input: DataType) -> TypeSet;

    fn time_estimate(&self) -> TimeEstimate {
        TimeEstimate::default()
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>>;
}

/// Stages are shared between any number of chains, routers and tasks.
pub type SharedStage = Arc<dyn Stage>;

/// What a registered stage can be used for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const IMAGE_UPLOADER: Capabilities = Capabilities(1 << 0);
    pub const TEXT_UPLOADER: Capabilities = Capabilities(1 << 1);
    pub const URL_SHORTENER: Capabilities = Capabilities(1 << 2);
    pub const FILE_UPLOADER: Capabilities = Capabilities(1 << 3);

    const NAMES: [(Capabilities, &'static str); 4] = [
        (Self::IMAGE_UPLOADER, "image-uploader"),
        (Self::TEXT_UPLOADER, "text-uploader"),
        (Self::URL_SHORTENER, "url-shortener"),
        (Self::FILE_UPLOADER, "file-uploader"),
    ];

    /// True if every flag in `other` is set here.
    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Capabilities(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join(" | "))
    }
}

/// Handle to a stage inside a [`StageRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(usize);

pub struct RegisteredStage {
    pub name: String,
    pub capabilities: Capabilities,
    pub stage: SharedStage,
}

/// Stages configured once and referenced by handle from many pipelines.
///
/// Entries are never removed, so handles stay valid for the registry's
/// lifetime.
#[derive(Default)]
pub struct StageRegistry {
    entries: Vec<RegisteredStage>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        capabilities: Capabilities,
        stage: SharedStage,
    ) -> StageHandle {
        let name = name.into();
        log::debug!("Registering stage '{}' as {:?}", name, capabilities);
        self.entries.push(RegisteredStage {
            name,
            capabilities,
            stage,
        });
        StageHandle(self.entries.len() - 1)
    }

    pub fn get(&self, handle: StageHandle) -> Option<SharedStage> {
        self.entries
            .get(handle.0)
            .map(|entry| Arc::clone(&entry.stage))
    }

    pub fn find(&self, name: &str) -> Option<StageHandle> {
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .map(StageHandle)
    }

    /// Stages whose capabilities include every flag in `wanted`.
    pub fn with_capability(
        &self,
        wanted: Capabilities,
    ) -> impl Iterator<Item = (StageHandle, &RegisteredStage)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.capabilities.contains(wanted))
            .map(|(index, entry)| (StageHandle(index), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Configurable stages shared by the engine tests.

    use std::sync::Mutex;

    use super::*;
    use crate::error::PipelineError;

    type Behavior = dyn Fn(TypedData, &ProgressTracker, &CancelToken) -> Result<Option<TypedData>>
        + Send
        + Sync;

    pub struct FnStage {
        pub name: String,
        pub inputs: Mutex<TypeSet>,
        pub outputs: TypeSet,
        pub estimate: TimeEstimate,
        pub calls: Arc<Mutex<Vec<String>>>,
        behavior: Box<Behavior>,
    }

    impl FnStage {
        pub fn new<F>(name: &str, inputs: &[DataType], outputs: &[DataType], behavior: F) -> Self
        where
            F: Fn(TypedData, &ProgressTracker, &CancelToken) -> Result<Option<TypedData>>
                + Send
                + Sync
                + 'static,
        {
            Self {
                name: name.to_string(),
                inputs: Mutex::new(TypeSet::of(inputs)),
                outputs: TypeSet::of(outputs),
                estimate: TimeEstimate::SHORT_OPERATION,
                calls: Arc::new(Mutex::new(Vec::new())),
                behavior: Box::new(behavior),
            }
        }

        pub fn with_weight(mut self, weight: f64) -> Self {
            self.estimate = TimeEstimate::new(weight, false);
            self
        }

        pub fn with_calls(mut self, calls: Arc<Mutex<Vec<String>>>) -> Self {
            self.calls = calls;
            self
        }

        /// Turns text into upper-case text.
        pub fn upper(name: &str) -> Self {
            Self::new(name, &[DataType::Text], &[DataType::Text], |data, _, _| {
                let text = data.as_text().unwrap_or_default().to_uppercase();
                Ok(Some(TypedData::from_text(text, data.name())))
            })
        }

        /// Produces a fixed text from nothing.
        pub fn source(name: &str, text: &'static str) -> Self {
            Self::new(name, &[DataType::None], &[DataType::Text], move |_, _, _| {
                Ok(Some(TypedData::from_text(text, "source")))
            })
        }

        pub fn failing(name: &str, inputs: &[DataType]) -> Self {
            Self::new(name, inputs, &[], |_, _, _| {
                Err(PipelineError::InvalidOperation("boom".into()))
            })
        }
    }

    impl Stage for FnStage {
        fn name(&self) -> &str {
            &self.name
        }

        fn input_types(&self) -> TypeSet {
            self.inputs.lock().unwrap().clone()
        }

        fn output_types(&self, input: DataType) -> TypeSet {
            if self.input_types().contains(input) {
                self.outputs.clone()
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
            self.calls.lock().unwrap().push(self.name.clone());
            (self.behavior)(data, progress, cancel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FnStage;
    use super::*;

    #[test]
    fn capabilities_combine_and_query() {
        let caps = Capabilities::IMAGE_UPLOADER | Capabilities::FILE_UPLOADER;
        assert!(caps.contains(Capabilities::IMAGE_UPLOADER));
        assert!(caps.contains(Capabilities::IMAGE_UPLOADER | Capabilities::FILE_UPLOADER));
        assert!(!caps.contains(Capabilities::URL_SHORTENER));
        assert!(caps.contains(Capabilities::NONE));
        assert_eq!(
            format!("{caps:?}"),
            "Capabilities(image-uploader | file-uploader)"
        );
    }

    #[test]
    fn registry_shares_stages_by_handle() {
        let mut registry = StageRegistry::new();
        let upper: SharedStage = Arc::new(FnStage::upper("upper"));
        let saver: SharedStage = Arc::new(FnStage::upper("saver"));

        let upper_handle = registry.register("upper", Capabilities::TEXT_UPLOADER, upper.clone());
        let saver_handle = registry.register(
            "saver",
            Capabilities::IMAGE_UPLOADER | Capabilities::TEXT_UPLOADER,
            saver,
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("saver"), Some(saver_handle));
        assert!(registry.find("missing").is_none());
        let fetched = registry.get(upper_handle).unwrap();
        assert!(Arc::ptr_eq(&fetched, &upper));

        let text: Vec<_> = registry
            .with_capability(Capabilities::TEXT_UPLOADER)
            .map(|(handle, _)| handle)
            .collect();
        assert_eq!(text, vec![upper_handle, saver_handle]);

        let images: Vec<_> = registry
            .with_capability(Capabilities::IMAGE_UPLOADER)
            .map(|(_, entry)| entry.name.as_str())
            .collect();
        assert_eq!(images, vec!["saver"]);
    }
}
