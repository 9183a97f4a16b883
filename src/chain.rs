//! Sequential composition of stages.

use crate::cancel::CancelToken;
use crate::data::{DataType, TypeSet, TypedData};
use crate::error::{PipelineError, Result};
use crate::estimate::TimeEstimate;
use crate::progress::ProgressTracker;
use crate::stage::{SharedStage, Stage};

/// Runs stages in order, feeding each output into the next stage.
///
/// Progress is split between stages proportionally to their time estimate
/// weights: stage `i` owns the parent range
/// `[Σw<i / W, (Σw<i + w_i) / W]`. When every weight is zero the range is
/// split evenly.
pub struct ProcessorChain {
    name: String,
    stages: Vec<SharedStage>,
}

impl ProcessorChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Builds a chain, validating every hop like [`ProcessorChain::push`].
    pub fn with_stages(name: impl Into<String>, stages: Vec<SharedStage>) -> Result<Self> {
        let mut chain = Self::new(name);
        for stage in stages {
            chain.push(stage)?;
        }
        Ok(chain)
    }

    /// Appends a stage.
    ///
    /// Fails when the chain already produces known types and none of them
    /// is accepted by `stage`. Data is re-checked at process time either way.
    pub fn push(&mut self, stage: SharedStage) -> Result<()> {
        if !self.stages.is_empty() {
            let produced = self.produced_types();
            let accepted = stage.input_types();
            if !produced.is_empty() && produced.is_disjoint(&accepted) {
                return Err(PipelineError::IncompatibleStage {
                    stage: stage.name().to_string(),
                    produced,
                    accepted,
                });
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder form of [`ProcessorChain::push`].
    pub fn then(mut self, stage: SharedStage) -> Result<Self> {
        self.push(stage)?;
        Ok(self)
    }

    pub fn stages(&self) -> &[SharedStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every tag the chain can produce from any of its accepted inputs.
    fn produced_types(&self) -> TypeSet {
        let mut produced = TypeSet::new();
        for input in self.input_types().iter() {
            produced.extend_from(&self.output_types(input));
        }
        produced
    }
}

impl Stage for ProcessorChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_types(&self) -> TypeSet {
        self.stages
            .first()
            .map(|stage| stage.input_types())
            .unwrap_or_default()
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        let mut current = TypeSet::single(input);
        for stage in &self.stages {
            let accepted = stage.input_types();
            let mut next = TypeSet::new();
            for data_type in current.iter().filter(|t| accepted.contains(*t)) {
                next.extend_from(&stage.output_types(data_type));
            }
            current = next;
        }
        current
    }

    fn time_estimate(&self) -> TimeEstimate {
        TimeEstimate::sum(self.stages.iter().map(|stage| stage.time_estimate()))
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        if self.stages.is_empty() {
            progress.set_progress(1.0);
            return Ok(Some(data));
        }

        let weights: Vec<f64> = self
            .stages
            .iter()
            .map(|stage| stage.time_estimate().weight())
            .collect();
        let total: f64 = weights.iter().sum();
        let count = self.stages.len() as f64;

        let mut data = data;
        let mut completed = 0.0;
        for (index, (stage, weight)) in self.stages.iter().zip(&weights).enumerate() {
            cancel.check()?;

            let accepted = stage.input_types();
            if !accepted.contains(data.data_type()) {
                return Err(PipelineError::TypeMismatch {
                    stage: stage.name().to_string(),
                    data_type: data.data_type(),
                    accepted,
                });
            }

            let (start, span) = if total > 0.0 {
                (completed / total, weight / total)
            } else {
                (index as f64 / count, 1.0 / count)
            };
            log::debug!(
                "Chain '{}' step {}/{}: '{}' with {} data",
                self.name,
                index + 1,
                self.stages.len(),
                stage.name(),
                data.data_type()
            );

            let child = progress.sub_range(start, span);
            match stage.process(data, &child, cancel)? {
                Some(next) => data = next,
                None => {
                    log::debug!(
                        "Chain '{}' stopped after '{}': no data produced",
                        self.name,
                        stage.name()
                    );
                    progress.set_progress(1.0);
                    return Ok(None);
                }
            }

            completed += weight;
            let end = if index + 1 == self.stages.len() {
                1.0
            } else {
                start + span
            };
            progress.set_progress(end);
        }

        Ok(Some(data))
    }
}

/// A chain that starts with a source, so it can run as a standalone command.
pub struct CommandChain {
    chain: ProcessorChain,
}

impl CommandChain {
    /// Starts a command from `source`, which must accept [`DataType::None`].
    pub fn new(name: impl Into<String>, source: SharedStage) -> Result<Self> {
        if !source.input_types().contains(DataType::None) {
            return Err(PipelineError::InvalidCommand(format!(
                "'{}' is not a source (accepts {})",
                source.name(),
                source.input_types()
            )));
        }
        let mut chain = ProcessorChain::new(name);
        chain.push(source)?;
        Ok(Self { chain })
    }

    pub fn push(&mut self, stage: SharedStage) -> Result<()> {
        self.chain.push(stage)
    }

    pub fn then(mut self, stage: SharedStage) -> Result<Self> {
        self.push(stage)?;
        Ok(self)
    }

    pub fn chain(&self) -> &ProcessorChain {
        &self.chain
    }
}

impl Stage for CommandChain {
    fn name(&self) -> &str {
        self.chain.name()
    }

    fn input_types(&self) -> TypeSet {
        self.chain.input_types()
    }

    fn output_types(&self, input: DataType) -> TypeSet {
        self.chain.output_types(input)
    }

    fn time_estimate(&self) -> TimeEstimate {
        self.chain.time_estimate()
    }

    fn process(
        &self,
        data: TypedData,
        progress: &ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<Option<TypedData>> {
        self.chain.process(data, progress, cancel)
    }
}
