use thiserror::Error;

use crate::domain::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} '{id}' is already registered")]
    DuplicateIdentifier { kind: ResourceKind, id: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },
}

impl RegistryError {
    pub fn id(&self) -> &str {
        match self {
            RegistryError::DuplicateIdentifier { id, .. } | RegistryError::NotFound { id, .. } => id,
        }
    }
}

/// Outcome failure of a single submitted operation.
///
/// None of these are fatal to the machine; a failed operation only retires
/// the worker generation it ran on.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("machine is not enabled")]
    MachineNotEnabled,
    #[error("operation failed: {0:#}")]
    OperationFailed(#[source] anyhow::Error),
    #[error("operation cancelled after an earlier operation failed")]
    Cancelled,
    #[error("sequencer worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl OperationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }

    pub fn is_not_enabled(&self) -> bool {
        matches!(self, OperationError::MachineNotEnabled)
    }
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to home head '{head}': {source:#}")]
    HomingFailed {
        head: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to enable machine: {0:#}")]
    EnableFailed(#[source] anyhow::Error),
    #[error("failed to disable machine: {0:#}")]
    DisableFailed(#[source] anyhow::Error),
    #[error("invalid machine settings: {0:#}")]
    InvalidSettings(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_name_kind_and_id() {
        let err = RegistryError::DuplicateIdentifier {
            kind: ResourceKind::Feeder,
            id: "F1".into(),
        };
        assert_eq!(err.to_string(), "feeder 'F1' is already registered");
        assert_eq!(err.id(), "F1");
    }

    #[test]
    fn operation_failed_keeps_cause_chain() {
        let cause = anyhow::anyhow!("vacuum sensor").context("pick failed");
        let err = OperationError::OperationFailed(cause);
        assert_eq!(err.to_string(), "operation failed: pick failed: vacuum sensor");
        assert!(!err.is_cancelled());
        assert!(OperationError::Cancelled.is_cancelled());
    }

    #[test]
    fn homing_failure_wraps_source() {
        let err = MachineError::HomingFailed {
            head: "H1".into(),
            source: anyhow::anyhow!("limit switch stuck"),
        };
        assert_eq!(err.to_string(), "failed to home head 'H1': limit switch stuck");
    }
}
