//! Type-keyed dispatch to one of several stages.

use std::collections::BTreeMap;

use crate::cancel::CancelToken;
use crate::data::{DataType, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::{SharedStage, Stage};

/// Routes data to the stage registered for its type tag.
///
/// Exactly one route runs per call and it receives the full progress
/// tracker. Data without a route is dropped: `process` returns `Ok(None)`.
pub struct DataRouter {
    name: String,
    routes: BTreeMap<DataType, SharedStage>,
}

impl DataRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: BTreeMap::new(),
        }
    }

    /// Registers `stage` for `slot`, replacing any previous route.
    ///
    /// Fails with [`PipelineError::RouteRejected`] if the stage does not
    /// accept `slot`.
    pub fn connect(&mut self, slot: DataType, stage: SharedStage) -> Result<()> {
        let accepted = stage.input_types();
        if !accepted.contains(slot) {
            return Err(PipelineError::RouteRejected {
                slot,
                stage: stage.name().to_string(),
                accepted,
            });
        }
        if let Some(previous) = self.routes.insert(slot, stage) {
            log::debug!(
                "Router '{}': replaced route {} -> '{}'",
                self.name,
                slot,
                previous.name()
            );
        }
        Ok(())
    }

    /// Builder form of [`DataRouter::connect`].
    pub fn route(mut self, slot: DataType, stage: SharedStage) -> Result<Self> {
        self.connect(slot, stage)?;
        Ok(self)
    }

    pub fn disconnect(&mut self, slot: DataType) -> Option<SharedStage> {
        self.routes.remove(&slot)
    }

    pub fn get(&self, slot: DataType) -> Option<&SharedStage> {
        self.routes.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Stage for DataRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_types(&self) -> TypeSet {
        self.routes.keys().copied().collect()
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        self.routes
            .get(&input)
            .map(|stage| stage.output_types(input))
            .unwrap_or_default()
    }

    fn time_estimate(&self) -> TimeEstimate {
        TimeEstimate::max(self.routes.values().map(|stage| stage.time_estimate()))
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        let data_type = data.data_type();
        let Some(stage) = self.routes.get(&data_type) else {
            log::debug!(
                "Router '{}': no route for {} data '{}', dropping",
                self.name,
                data_type,
                data.name()
            );
            return Ok(None);
        };

        let accepted = stage.input_types();
        if !accepted.contains(data_type) {
            return Err(PipelineError::TypeMismatch {
                stage: stage.name().to_string(),
                data_type,
                accepted,
            });
        }

        log::debug!(
            "Router '{}': {} data -> '{}'",
            self.name,
            data_type,
            stage.name()
        );
        stage.process(data, progress, cancel)
    }
}
