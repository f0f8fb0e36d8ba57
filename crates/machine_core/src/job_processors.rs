use std::{collections::BTreeMap, fmt, sync::Arc};

use shared::domain::ProcessorKind;
use tracing::{info, warn};

use crate::resources::JobProcessor;

/// Job processors keyed by kind, plus the deprecated single-processor shape
/// older configurations still carry.
///
/// The legacy fields only exist between configuration load and
/// [`JobProcessorDirectory::migrate_legacy`]; after that the keyed map is the
/// only representation.
#[derive(Default)]
pub struct JobProcessorDirectory {
    processors: BTreeMap<ProcessorKind, Arc<dyn JobProcessor>>,
    legacy_processor: Option<Arc<dyn JobProcessor>>,
    legacy_planner: Option<String>,
}

impl JobProcessorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, kind: ProcessorKind, processor: Arc<dyn JobProcessor>) {
        if self.processors.insert(kind, processor).is_some() {
            warn!(kind = %kind, "job processor replaced during configuration load");
        }
    }

    pub(crate) fn set_legacy(
        &mut self,
        processor: Option<Arc<dyn JobProcessor>>,
        planner: Option<String>,
    ) {
        self.legacy_processor = processor;
        self.legacy_planner = planner;
    }

    /// Folds the legacy processor into the keyed map under the default kind.
    ///
    /// Only folds when the keyed map is empty. The legacy fields are cleared
    /// either way, so a second call is always a no-op. Returns whether a fold
    /// happened.
    pub fn migrate_legacy(&mut self) -> bool {
        let legacy = self.legacy_processor.take();
        if let Some(planner) = self.legacy_planner.take() {
            info!(planner = %planner, "dropping deprecated job planner");
        }

        let Some(processor) = legacy else {
            return false;
        };

        if !self.processors.is_empty() {
            warn!(
                legacy = processor.name(),
                "keyed job processors already configured; discarding legacy job processor"
            );
            return false;
        }

        let kind = ProcessorKind::default();
        info!(kind = %kind, processor = processor.name(), "migrated legacy job processor");
        self.processors.insert(kind, processor);
        true
    }

    pub fn has_legacy(&self) -> bool {
        self.legacy_processor.is_some() || self.legacy_planner.is_some()
    }

    pub fn get(&self, kind: ProcessorKind) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(&kind).cloned()
    }

    pub fn all(&self) -> &BTreeMap<ProcessorKind, Arc<dyn JobProcessor>> {
        &self.processors
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl fmt::Debug for JobProcessorDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcessorDirectory")
            .field(
                "processors",
                &self
                    .processors
                    .iter()
                    .map(|(kind, processor)| (kind.as_str(), processor.name()))
                    .collect::<Vec<_>>(),
            )
            .field("has_legacy", &self.has_legacy())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/job_processors_tests.rs"]
mod tests;
