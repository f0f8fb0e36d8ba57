//! Control core for one physical machine: resource registries, listener
//! fan-out, job processor directory, and the single-worker command sequencer.

pub mod config;
pub mod job_processors;
pub mod listeners;
pub mod machine;
pub mod operation;
pub mod registry;
pub mod resources;
pub mod sequencer;

pub use config::{load_settings, Settings};
pub use job_processors::JobProcessorDirectory;
pub use listeners::{ListenerHub, MachineEvent, MachineListener};
pub use machine::{Machine, MachineBuilder, USER_REQUESTED_STOP};
pub use operation::{callback_fn, FnCallback, OperationCallback, OperationHandle, OperationResult};
pub use registry::ResourceRegistry;
pub use resources::{Camera, Feeder, Head, Identifiable, JobProcessor, MachineDriver};
pub use sequencer::{CommandSequencer, EnablementGate, SequencerPhase};
pub use shared::error::{MachineError, OperationError, RegistryError};
