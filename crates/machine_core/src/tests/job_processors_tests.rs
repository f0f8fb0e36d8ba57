use super::*;

struct NamedProcessor(&'static str);

impl JobProcessor for NamedProcessor {
    fn name(&self) -> &str {
        self.0
    }
}

fn processor(name: &'static str) -> Arc<dyn JobProcessor> {
    Arc::new(NamedProcessor(name))
}

#[test]
fn legacy_processor_folds_into_default_kind_once() {
    let legacy = processor("reference-pnp");
    let mut directory = JobProcessorDirectory::new();
    directory.set_legacy(Some(Arc::clone(&legacy)), Some("simple-planner".into()));

    assert!(directory.migrate_legacy());
    assert_eq!(directory.len(), 1);
    let migrated = directory
        .get(ProcessorKind::PickAndPlace)
        .expect("default kind");
    assert!(Arc::ptr_eq(&migrated, &legacy));
    assert!(!directory.has_legacy());

    assert!(!directory.migrate_legacy());
    assert_eq!(directory.len(), 1);
}

#[test]
fn migration_without_legacy_processor_leaves_map_empty() {
    let mut directory = JobProcessorDirectory::new();
    directory.set_legacy(None, Some("orphan-planner".into()));

    assert!(!directory.migrate_legacy());
    assert!(directory.is_empty());
    assert!(!directory.has_legacy());
}

#[test]
fn populated_map_wins_over_legacy_processor() {
    let mut directory = JobProcessorDirectory::new();
    directory.insert(ProcessorKind::SolderPaste, processor("paste"));
    directory.set_legacy(Some(processor("legacy")), None);

    assert!(!directory.migrate_legacy());
    assert!(directory.get(ProcessorKind::PickAndPlace).is_none());
    assert_eq!(
        directory
            .get(ProcessorKind::SolderPaste)
            .expect("paste")
            .name(),
        "paste"
    );
    assert!(!directory.has_legacy());
}

#[test]
fn all_is_ordered_by_kind() {
    let mut directory = JobProcessorDirectory::new();
    directory.insert(ProcessorKind::SolderPaste, processor("paste"));
    directory.insert(ProcessorKind::PickAndPlace, processor("pnp"));

    let kinds: Vec<ProcessorKind> = directory.all().keys().copied().collect();
    assert_eq!(
        kinds,
        vec![ProcessorKind::PickAndPlace, ProcessorKind::SolderPaste]
    );
}
