//! Simulated collaborators standing in for real drivers.

use std::{sync::Arc, thread, time::Duration};

use machine_core::{
    Camera, Feeder, Head, Identifiable, JobProcessor, MachineDriver, MachineListener,
};
use tracing::{info, warn};

pub struct SimHead {
    pub id: String,
    pub home_time: Duration,
    pub fail_home: bool,
}

impl Identifiable for SimHead {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Head for SimHead {
    fn home(&self) -> anyhow::Result<()> {
        thread::sleep(self.home_time);
        if self.fail_home {
            anyhow::bail!("simulated homing fault on {}", self.id);
        }
        info!(head = %self.id, "head homed");
        Ok(())
    }
}

pub struct SimFeeder {
    pub id: String,
}

impl Identifiable for SimFeeder {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Feeder for SimFeeder {}

pub struct SimCamera {
    pub id: String,
}

impl Identifiable for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Camera for SimCamera {}

pub struct NamedProcessor(pub String);

impl JobProcessor for NamedProcessor {
    fn name(&self) -> &str {
        &self.0
    }
}

pub struct SimDriver;

impl MachineDriver for SimDriver {
    fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        info!(enabled, "simulated driver switched");
        Ok(())
    }
}

/// Mirrors every machine event into the log.
pub struct LoggingListener;

impl LoggingListener {
    pub fn shared() -> Arc<dyn MachineListener> {
        Arc::new(LoggingListener)
    }
}

impl MachineListener for LoggingListener {
    fn head_activity(&self, head: &Arc<dyn Head>) {
        info!(head = head.id(), "head activity");
    }

    fn enabled(&self) {
        info!("machine enabled");
    }

    fn enable_failed(&self, reason: &str) {
        warn!(reason, "machine enable failed");
    }

    fn disabled(&self, reason: &str) {
        info!(reason, "machine disabled");
    }

    fn disable_failed(&self, reason: &str) {
        warn!(reason, "machine disable failed");
    }

    fn busy_changed(&self, busy: bool) {
        info!(busy, "machine busy changed");
    }
}
