use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::{ReentrantMutex, RwLock};
use shared::{
    domain::ProcessorKind,
    error::{MachineError, RegistryError},
};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    job_processors::JobProcessorDirectory,
    listeners::{ListenerHub, MachineListener},
    operation::{OperationCallback, OperationHandle},
    registry::ResourceRegistry,
    resources::{Camera, Feeder, Head, Identifiable, JobProcessor, MachineDriver},
    sequencer::{CommandSequencer, EnablementGate, SequencerPhase},
};

pub const USER_REQUESTED_STOP: &str = "User requested stop.";

/// Aggregate root: resource registries, job processors, listeners, and the
/// command sequencer for one physical machine.
///
/// Build one through [`MachineBuilder`]; the builder's `build` is the only
/// place configuration is committed.
pub struct Machine {
    heads: RwLock<ResourceRegistry<dyn Head>>,
    feeders: RwLock<ResourceRegistry<dyn Feeder>>,
    cameras: RwLock<ResourceRegistry<dyn Camera>>,
    job_processors: JobProcessorDirectory,
    hub: Arc<ListenerHub>,
    gate: EnablementGate,
    sequencer: CommandSequencer,
    driver: Option<Arc<dyn MachineDriver>>,
    enablement: ReentrantMutex<()>,
}

impl Machine {
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    pub fn heads(&self) -> Vec<Arc<dyn Head>> {
        self.heads.read().list().to_vec()
    }

    pub fn head(&self, id: &str) -> Result<Arc<dyn Head>, RegistryError> {
        self.heads.read().get(id)
    }

    pub fn default_head(&self) -> Option<Arc<dyn Head>> {
        self.heads.read().first()
    }

    pub fn add_head(&self, head: Arc<dyn Head>) -> Result<(), RegistryError> {
        self.heads.write().add(head)
    }

    pub fn remove_head(&self, head: &Arc<dyn Head>) -> Option<Arc<dyn Head>> {
        self.heads.write().remove(head)
    }

    pub fn feeders(&self) -> Vec<Arc<dyn Feeder>> {
        self.feeders.read().list().to_vec()
    }

    pub fn feeder(&self, id: &str) -> Result<Arc<dyn Feeder>, RegistryError> {
        self.feeders.read().get(id)
    }

    pub fn add_feeder(&self, feeder: Arc<dyn Feeder>) -> Result<(), RegistryError> {
        self.feeders.write().add(feeder)
    }

    pub fn remove_feeder(&self, feeder: &Arc<dyn Feeder>) -> Option<Arc<dyn Feeder>> {
        self.feeders.write().remove(feeder)
    }

    pub fn cameras(&self) -> Vec<Arc<dyn Camera>> {
        self.cameras.read().list().to_vec()
    }

    pub fn camera(&self, id: &str) -> Result<Arc<dyn Camera>, RegistryError> {
        self.cameras.read().get(id)
    }

    pub fn add_camera(&self, camera: Arc<dyn Camera>) -> Result<(), RegistryError> {
        self.cameras.write().add(camera)
    }

    pub fn remove_camera(&self, camera: &Arc<dyn Camera>) -> Option<Arc<dyn Camera>> {
        self.cameras.write().remove(camera)
    }

    pub fn job_processors(&self) -> &BTreeMap<ProcessorKind, Arc<dyn JobProcessor>> {
        self.job_processors.all()
    }

    pub fn job_processor(&self, kind: ProcessorKind) -> Option<Arc<dyn JobProcessor>> {
        self.job_processors.get(kind)
    }

    pub fn add_listener(&self, listener: Arc<dyn MachineListener>) -> bool {
        self.hub.subscribe(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MachineListener>) -> bool {
        self.hub.unsubscribe(listener)
    }

    pub fn fire_head_activity(&self, head: &Arc<dyn Head>) {
        self.hub.fire_head_activity(head);
    }

    /// Homes every head in registry order on the calling thread, stopping at
    /// the first failure.
    pub fn home(&self) -> Result<(), MachineError> {
        for head in self.heads() {
            debug!(head = head.id(), "homing head");
            head.home().map_err(|source| MachineError::HomingFailed {
                head: head.id().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Queues [`Machine::home`] on the sequencer.
    pub fn submit_home(self: &Arc<Self>, ignore_enabled: bool) -> OperationHandle<()> {
        let machine = Arc::clone(self);
        self.sequencer
            .submit_with(move || Ok(machine.home()?), None, ignore_enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.gate.is_open()
    }

    /// Switches the machine through its driver and notifies listeners.
    ///
    /// On driver failure the enabled flag is left as it was and listeners get
    /// `enable_failed`/`disable_failed` with the driver's reason.
    ///
    /// Concurrent callers are serialized through notification, so listeners
    /// see events in the order the gate changed. The lock is reentrant: a
    /// listener may call `set_enabled` from its callback on the same thread.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), MachineError> {
        let _serialized = self.enablement.lock();
        let switched = match &self.driver {
            Some(driver) => driver.set_enabled(enabled),
            None => Ok(()),
        };

        match (enabled, switched) {
            (true, Ok(())) => {
                self.gate.set(true);
                info!("machine enabled");
                self.hub.fire_enabled();
                Ok(())
            }
            (false, Ok(())) => {
                self.gate.set(false);
                info!("machine disabled");
                self.hub.fire_disabled(USER_REQUESTED_STOP);
                Ok(())
            }
            (true, Err(err)) => {
                warn!(error = %format!("{err:#}"), "machine enable failed");
                self.hub.fire_enable_failed(format!("{err:#}"));
                Err(MachineError::EnableFailed(err))
            }
            (false, Err(err)) => {
                warn!(error = %format!("{err:#}"), "machine disable failed");
                self.hub.fire_disable_failed(format!("{err:#}"));
                Err(MachineError::DisableFailed(err))
            }
        }
    }

    pub fn submit<T, F>(&self, work: F) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.sequencer.submit(work)
    }

    pub fn submit_with_callback<T, F, C>(&self, work: F, callback: C) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: OperationCallback<T> + 'static,
    {
        self.sequencer.submit_with_callback(work, callback)
    }

    pub fn submit_with<T, F>(
        &self,
        work: F,
        callback: Option<Box<dyn OperationCallback<T>>>,
        ignore_enabled: bool,
    ) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.sequencer.submit_with(work, callback, ignore_enabled)
    }

    pub fn sequencer_phase(&self) -> SequencerPhase {
        self.sequencer.phase()
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("enabled", &self.is_enabled())
            .field("heads", &*self.heads.read())
            .field("feeders", &*self.feeders.read())
            .field("cameras", &*self.cameras.read())
            .field("job_processors", &self.job_processors)
            .field("sequencer", &self.sequencer)
            .finish()
    }
}

/// Receives parsed configuration and commits it into a [`Machine`].
///
/// `build` consumes the builder, so the commit (duplicate checks and the
/// legacy job processor migration) happens exactly once and before any
/// operation can be submitted.
#[derive(Default)]
pub struct MachineBuilder {
    settings: Settings,
    heads: Vec<Arc<dyn Head>>,
    feeders: Vec<Arc<dyn Feeder>>,
    cameras: Vec<Arc<dyn Camera>>,
    job_processors: Vec<(ProcessorKind, Arc<dyn JobProcessor>)>,
    legacy_job_processor: Option<Arc<dyn JobProcessor>>,
    legacy_job_planner: Option<String>,
    driver: Option<Arc<dyn MachineDriver>>,
    listeners: Vec<Arc<dyn MachineListener>>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn head(mut self, head: Arc<dyn Head>) -> Self {
        self.heads.push(head);
        self
    }

    pub fn feeder(mut self, feeder: Arc<dyn Feeder>) -> Self {
        self.feeders.push(feeder);
        self
    }

    pub fn camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn job_processor(mut self, kind: ProcessorKind, processor: Arc<dyn JobProcessor>) -> Self {
        self.job_processors.push((kind, processor));
        self
    }

    /// Deprecated single-processor configuration shape.
    pub fn legacy_job_processor(mut self, processor: Arc<dyn JobProcessor>) -> Self {
        self.legacy_job_processor = Some(processor);
        self
    }

    pub fn legacy_job_planner(mut self, planner: impl Into<String>) -> Self {
        self.legacy_job_planner = Some(planner.into());
        self
    }

    pub fn driver(mut self, driver: Arc<dyn MachineDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn MachineListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<Machine, MachineError> {
        self.settings
            .validate()
            .map_err(MachineError::InvalidSettings)?;

        let mut heads = ResourceRegistry::new();
        for head in self.heads {
            heads.add(head)?;
        }
        let mut feeders = ResourceRegistry::new();
        for feeder in self.feeders {
            feeders.add(feeder)?;
        }
        let mut cameras = ResourceRegistry::new();
        for camera in self.cameras {
            cameras.add(camera)?;
        }

        let mut job_processors = JobProcessorDirectory::new();
        for (kind, processor) in self.job_processors {
            job_processors.insert(kind, processor);
        }
        job_processors.set_legacy(self.legacy_job_processor, self.legacy_job_planner);
        job_processors.migrate_legacy();

        let hub = Arc::new(ListenerHub::new());
        for listener in self.listeners {
            hub.subscribe(listener);
        }

        let gate = EnablementGate::new(false);
        let sequencer = CommandSequencer::new(
            Arc::clone(&hub),
            gate.clone(),
            self.settings.worker_thread_name.clone(),
        );

        let machine = Machine {
            heads: RwLock::new(heads),
            feeders: RwLock::new(feeders),
            cameras: RwLock::new(cameras),
            job_processors,
            hub,
            gate,
            sequencer,
            driver: self.driver,
            enablement: ReentrantMutex::new(()),
        };

        info!(
            heads = machine.heads.read().len(),
            feeders = machine.feeders.read().len(),
            cameras = machine.cameras.read().len(),
            job_processors = machine.job_processors.len(),
            "machine configuration committed"
        );

        if self.settings.start_enabled {
            machine.set_enabled(true)?;
        }

        Ok(machine)
    }
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
