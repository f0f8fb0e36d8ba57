use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Head,
    Feeder,
    Camera,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Head => "head",
            ResourceKind::Feeder => "feeder",
            ResourceKind::Camera => "camera",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind tag under which a job processor is registered.
///
/// New kinds are added as variants; configuration files refer to them by
/// their kebab-case tag.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    #[default]
    PickAndPlace,
    SolderPaste,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 2] = [ProcessorKind::PickAndPlace, ProcessorKind::SolderPaste];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorKind::PickAndPlace => "pick-and-place",
            ProcessorKind::SolderPaste => "solder-paste",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProcessorKind(pub String);

impl fmt::Display for UnknownProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job processor kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownProcessorKind {}

impl FromStr for ProcessorKind {
    type Err = UnknownProcessorKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        ProcessorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownProcessorKind(raw.to_string()))
    }
}
