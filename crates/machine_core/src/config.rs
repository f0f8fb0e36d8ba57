use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

use crate::sequencer::DEFAULT_WORKER_THREAD_NAME;

pub const DEFAULT_SETTINGS_FILE: &str = "machine.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker_thread_name: String,
    pub start_enabled: bool,
    pub log_filter: String,
}

impl Settings {
    /// Checks values that would otherwise fail later, on the worker side.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_thread_name.trim().is_empty() {
            anyhow::bail!("worker_thread_name must not be empty");
        }
        if self.worker_thread_name.contains('\0') {
            anyhow::bail!("worker_thread_name must not contain NUL characters");
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.into(),
            start_enabled: false,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then the TOML file (when it exists), then environment overrides.
///
/// With no explicit path, `machine.toml` in the working directory is used if
/// present. An explicit path that does not exist is an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
            read_settings_file(Path::new(DEFAULT_SETTINGS_FILE))?
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    parse_settings(&raw).with_context(|| format!("invalid settings file '{}'", path.display()))
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    let settings: Settings = toml::from_str(raw)?;
    settings.validate()?;
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("MACHINE_WORKER_THREAD_NAME") {
        settings.worker_thread_name = v;
    }
    if let Some(v) = lookup("APP__WORKER_THREAD_NAME") {
        settings.worker_thread_name = v;
    }

    for key in ["MACHINE_START_ENABLED", "APP__START_ENABLED"] {
        if let Some(v) = lookup(key) {
            settings.start_enabled = parse_flag(&v).with_context(|| format!("invalid {key}"))?;
        }
    }

    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings.validate().context("invalid environment override")
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean flag, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let settings = parse_settings("start_enabled = true\n").expect("parse");
        assert!(settings.start_enabled);
        assert_eq!(settings.worker_thread_name, DEFAULT_WORKER_THREAD_NAME);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn rejects_blank_thread_name() {
        let err = parse_settings("worker_thread_name = \"  \"").expect_err("blank");
        assert!(err.to_string().contains("worker_thread_name"));
    }

    #[test]
    fn rejects_thread_name_with_nul() {
        let err = parse_settings("worker_thread_name = \"seq\\u0000x\"\n").expect_err("nul");
        assert!(format!("{err:#}").contains("NUL"));
    }

    #[test]
    fn env_thread_name_with_nul_is_rejected() {
        let mut settings = Settings::default();
        let err = apply_env_overrides(&mut settings, env(&[("APP__WORKER_THREAD_NAME", "a\0b")]))
            .expect_err("nul");
        assert_eq!(err.to_string(), "invalid environment override");
        assert!(format!("{err:#}").contains("NUL"));
    }

    #[test]
    fn app_prefixed_env_wins_over_machine_prefixed() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("MACHINE_WORKER_THREAD_NAME", "seq-a"),
                ("APP__WORKER_THREAD_NAME", "seq-b"),
                ("MACHINE_START_ENABLED", "yes"),
                ("APP__LOG_FILTER", "machine_core=debug"),
            ]),
        )
        .expect("overrides");

        assert_eq!(settings.worker_thread_name, "seq-b");
        assert!(settings.start_enabled);
        assert_eq!(settings.log_filter, "machine_core=debug");
    }

    #[test]
    fn malformed_flag_is_reported() {
        let mut settings = Settings::default();
        let err = apply_env_overrides(&mut settings, env(&[("APP__START_ENABLED", "maybe")]))
            .expect_err("bad flag");
        assert_eq!(err.to_string(), "invalid APP__START_ENABLED");
        assert!(!settings.start_enabled);
    }

    #[test]
    fn reads_settings_from_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("machine.toml");
        fs::write(
            &path,
            "worker_thread_name = \"bench-seq\"\nlog_filter = \"debug\"\n",
        )
        .expect("write");

        let settings = read_settings_file(&path).expect("settings");
        assert_eq!(settings.worker_thread_name, "bench-seq");
        assert_eq!(settings.log_filter, "debug");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_settings(Some(&dir.path().join("absent.toml"))).expect_err("missing");
        assert!(err.to_string().contains("failed to read settings file"));
    }
}
