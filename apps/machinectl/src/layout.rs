use std::{collections::BTreeMap, fs, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use machine_core::{Machine, MachineBuilder, Settings};
use serde::Deserialize;
use shared::domain::ProcessorKind;

use crate::sim::{LoggingListener, NamedProcessor, SimCamera, SimDriver, SimFeeder, SimHead};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    pub heads: Vec<HeadLayout>,
    pub feeders: Vec<IdOnly>,
    pub cameras: Vec<IdOnly>,
    pub job_processors: BTreeMap<String, String>,
    /// Pre-keyed configurations carried a single processor.
    pub job_processor: Option<String>,
    pub job_planner: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadLayout {
    pub id: String,
    #[serde(default)]
    pub home_millis: u64,
    #[serde(default)]
    pub fail_home: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdOnly {
    pub id: String,
}

pub fn load_layout(path: &Path) -> anyhow::Result<Layout> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read layout file '{}'", path.display()))?;
    parse_layout(&raw).with_context(|| format!("invalid layout file '{}'", path.display()))
}

pub fn parse_layout(raw: &str) -> anyhow::Result<Layout> {
    Ok(toml::from_str(raw)?)
}

impl Layout {
    pub fn builder(self, settings: Settings) -> anyhow::Result<MachineBuilder> {
        let mut builder = Machine::builder()
            .settings(settings)
            .driver(Arc::new(SimDriver))
            .listener(LoggingListener::shared());

        for head in self.heads {
            builder = builder.head(Arc::new(SimHead {
                id: head.id,
                home_time: Duration::from_millis(head.home_millis),
                fail_home: head.fail_home,
            }));
        }
        for feeder in self.feeders {
            builder = builder.feeder(Arc::new(SimFeeder { id: feeder.id }));
        }
        for camera in self.cameras {
            builder = builder.camera(Arc::new(SimCamera { id: camera.id }));
        }
        for (tag, name) in self.job_processors {
            let kind: ProcessorKind = tag.parse()?;
            builder = builder.job_processor(kind, Arc::new(NamedProcessor(name)));
        }
        if let Some(name) = self.job_processor {
            builder = builder.legacy_job_processor(Arc::new(NamedProcessor(name)));
        }
        if let Some(planner) = self.job_planner {
            builder = builder.legacy_job_planner(planner);
        }
        Ok(builder)
    }
}
