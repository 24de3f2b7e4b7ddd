use super::*;
use crate::replay::ReplayPlatform;
use evlwatch_common::{MessagePayload, NativeLevel, PlatformError};

fn filled(log: &str, count: u16) -> ReplayPlatform {
    let replay = ReplayPlatform::new();
    replay.add_log(log);
    for i in 0..count {
        replay.push_event(log, 100 + i, "src", NativeLevel::Information, &["x"]);
    }
    replay
}

fn drain(source: &mut dyn LogSource) -> Vec<u64> {
    std::iter::from_fn(|| source.read_next()).map(|r| r.record_id).collect()
}

fn classic(replay: &ReplayPlatform, log: &str) -> ClassicLogSource {
    ClassicLogSource::open(Arc::new(replay.clone()), log).unwrap()
}

fn modern(replay: &ReplayPlatform, log: &str) -> ModernLogSource {
    replay.set_modern_available(true);
    ModernLogSource::open(Arc::new(replay.clone()), log).unwrap()
}

#[test]
fn test_classic_seek_and_read() {
    let replay = filled("Application", 5);
    let mut source = classic(&replay, "Application");

    source.seek(3);
    assert_eq!(drain(&mut source), vec![3, 4, 5]);
    assert_eq!(source.last_id(), 5);

    source.seek(1);
    assert_eq!(drain(&mut source), vec![1, 2, 3, 4, 5]);
    assert!(source.is_valid());
}

#[test]
fn test_classic_seek_past_end_reads_nothing() {
    let replay = filled("Application", 2);
    let mut source = classic(&replay, "Application");

    source.seek(3);
    assert!(source.read_next().is_none());
    source.seek(SEEK_END);
    assert!(source.read_next().is_none());
}

#[test]
fn test_classic_seek_before_oldest_starts_at_oldest() {
    let replay = filled("System", 6);
    replay.retain_newest("System", 2);
    let mut source = classic(&replay, "System");

    source.seek(1);
    assert_eq!(drain(&mut source), vec![5, 6]);
}

#[test]
fn test_classic_empty_log() {
    let replay = filled("Setup", 0);
    let mut source = classic(&replay, "Setup");

    assert_eq!(source.last_id(), 0);
    source.seek(1);
    assert!(source.read_next().is_none());
}

#[test]
fn test_classic_seek_defect_falls_back_to_sequential() {
    let replay = filled("Application", 4);
    replay.set_seek_defect("Application", true);
    let mut source = classic(&replay, "Application");

    assert!(source.seek_supported());
    source.seek(3);
    assert_eq!(drain(&mut source), vec![3, 4]);
    assert!(!source.seek_supported());

    // later seeks on the same instance stay sequential
    source.seek(2);
    assert_eq!(drain(&mut source), vec![2, 3, 4]);
    assert!(source.is_valid());
}

#[test]
fn test_classic_buffer_grows_for_large_record() {
    let replay = filled("Application", 1);
    let big = "y".repeat(70_000);
    replay.push_event("Application", 7, "src", NativeLevel::Error, &[&big]);
    let mut source = classic(&replay, "Application");

    source.seek(1);
    let records: Vec<_> = std::iter::from_fn(|| source.read_next()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].payload, MessagePayload::Inserts(vec![big]));
    assert!(source.buffer_size() > 64 * 1024);
}

#[test]
fn test_classic_open_missing_log() {
    let replay = ReplayPlatform::new();
    assert!(ClassicLogSource::open(Arc::new(replay), "Nope").is_err());
}

#[test]
fn test_classic_read_failure_ends_cycle() {
    let replay = filled("Application", 3);
    let mut source = classic(&replay, "Application");
    replay.set_read_failure("Application", true);

    source.seek(1);
    assert!(source.read_next().is_none());
    assert!(source.is_valid());

    replay.set_read_failure("Application", false);
    source.seek(2);
    assert_eq!(drain(&mut source), vec![2, 3]);
}

#[test]
fn test_open_denied_log() {
    let replay = filled("Security", 1);
    replay.set_modern_available(true);
    replay.set_access_denied("Security", true);

    assert!(matches!(
        ClassicLogSource::open(Arc::new(replay.clone()), "Security"),
        Err(PlatformError::PermissionDenied(_))
    ));
    assert!(matches!(
        ModernLogSource::open(Arc::new(replay), "Security"),
        Err(PlatformError::PermissionDenied(_))
    ));
}

#[test]
fn test_modern_reads_across_batches() {
    let count = (BATCH_SIZE * 2 + 3) as u16;
    let replay = filled("Application", count);
    let mut source = modern(&replay, "Application");

    source.seek(2);
    let ids = drain(&mut source);
    assert_eq!(ids.len(), count as usize - 1);
    assert_eq!(ids.first(), Some(&2));
    assert_eq!(ids.last(), Some(&(count as u64)));
}

#[test]
fn test_modern_seek_end_waits_for_new_records() {
    let replay = filled("Application", 3);
    let mut source = modern(&replay, "Application");

    source.seek(SEEK_END);
    assert!(source.read_next().is_none());

    replay.push_event("Application", 1, "src", NativeLevel::Warning, &[]);
    assert_eq!(drain(&mut source), vec![4]);
}

#[test]
fn test_modern_seek_past_newest() {
    let replay = filled("Application", 3);
    let mut source = modern(&replay, "Application");

    source.seek(10);
    assert!(source.read_next().is_none());
    assert_eq!(source.last_id(), 3);
}

#[test]
fn test_modern_records_are_rendered() {
    let replay = filled("Application", 0);
    replay.add_library("app.dll", &[(5, "disk %1 full")]);
    replay.register_message_files("Application", "disk", "app.dll");
    replay.push_event("Application", 5, "disk", NativeLevel::Error, &["C:"]);
    let mut source = modern(&replay, "Application");

    source.seek(1);
    let record = source.read_next().unwrap();
    assert_eq!(record.payload, MessagePayload::Rendered("disk C: full".to_string()));
}

#[test]
fn test_modern_channel_outside_registry() {
    let replay = ReplayPlatform::new();
    replay.set_modern_available(true);
    replay.add_channel("Microsoft-Windows-Test/Operational");
    replay.push_event("Microsoft-Windows-Test/Operational", 1, "t", NativeLevel::Error, &[]);

    let mut source = modern(&replay, "Microsoft-Windows-Test/Operational");
    source.seek(1);
    assert_eq!(drain(&mut source), vec![1]);
    assert!(ModernLogSource::open(Arc::new(replay), "Missing").is_err());
}

#[test]
fn test_platform_variant_selection() {
    let replay = filled("Application", 2);
    let platform = replay.clone().into_platform();

    assert_eq!(platform.effective_variant(ApiVariant::Modern), ApiVariant::Classic);
    replay.set_modern_available(true);
    assert_eq!(platform.effective_variant(ApiVariant::Modern), ApiVariant::Modern);
    assert_eq!(platform.effective_variant(ApiVariant::Classic), ApiVariant::Classic);

    let mut source = platform.open("Application", ApiVariant::Modern).unwrap();
    source.seek(1);
    assert_eq!(drain(source.as_mut()), vec![1, 2]);
    assert!(platform.open("Missing", ApiVariant::Classic).is_err());
}

#[test]
fn test_platform_without_modern_api() {
    let replay = Arc::new(filled("Application", 1));
    replay.set_modern_available(true);
    let platform = EventLogPlatform::new(replay.clone(), replay.clone(), replay);

    assert_eq!(platform.effective_variant(ApiVariant::Modern), ApiVariant::Classic);
}
