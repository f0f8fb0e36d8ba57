//! Collaborator seams: the core only sees resources through these traits.

use shared::domain::ResourceKind;

pub trait Identifiable {
    fn id(&self) -> &str;
}

/// Motion/actuation resource. Homing is driver territory.
pub trait Head: Identifiable + Send + Sync {
    fn home(&self) -> anyhow::Result<()>;
}

pub trait Feeder: Identifiable + Send + Sync {
    fn name(&self) -> &str {
        self.id()
    }
}

pub trait Camera: Identifiable + Send + Sync {
    fn name(&self) -> &str {
        self.id()
    }
}

/// Ties a registry element type to the kind reported in registry errors.
pub trait RegistryItem: Identifiable {
    const KIND: ResourceKind;
}

impl RegistryItem for dyn Head {
    const KIND: ResourceKind = ResourceKind::Head;
}

impl RegistryItem for dyn Feeder {
    const KIND: ResourceKind = ResourceKind::Feeder;
}

impl RegistryItem for dyn Camera {
    const KIND: ResourceKind = ResourceKind::Camera;
}

pub trait JobProcessor: Send + Sync {
    fn name(&self) -> &str;
}

/// Hardware side of the enable/disable switch.
pub trait MachineDriver: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> anyhow::Result<()>;
}
