//! Crash-recovery and persistence-equivalence checks against the real
//! storage stack.

use std::io::Write;
use std::path::PathBuf;

use contracts::EngineConfig;
use kernel_api::{EngineApi, EventLog, SqliteWorldStore};

fn temp_config(name: &str) -> EngineConfig {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let root: PathBuf = std::env::temp_dir().join(format!("world_recovery_{name}_{nanos}"));
    EngineConfig {
        world_width: 80,
        world_height: 80,
        data_dir: root.join("data"),
        agents_root: root.join("agents"),
        ..EngineConfig::default()
    }
}

fn cleanup(config: &EngineConfig) {
    if let Some(root) = config.data_dir.parent() {
        let _ = std::fs::remove_dir_all(root);
    }
}

#[tokio::test]
async fn restart_resumes_from_the_last_committed_tick() {
    let config = temp_config("resume");
    let mut engine = EngineApi::init(config.clone(), "model-a").expect("init");
    engine.run_ticks(5).await.expect("run");
    drop(engine);

    let reopened = EngineApi::open(config.clone()).expect("open");
    assert_eq!(reopened.tick(), 5);
    cleanup(&config);
}

#[tokio::test]
async fn partial_log_frame_from_a_crash_is_discarded() {
    let config = temp_config("torn_frame");
    let mut engine = EngineApi::init(config.clone(), "model-a").expect("init");
    engine.run_ticks(3).await.expect("run");
    drop(engine);

    // A process killed mid-append leaves a torn frame for the never
    // committed tick 4.
    let log_path = config.event_log_path();
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&log_path)
        .expect("open log");
    file.write_all(b"{\"tick\":4,\"seq\":9999,\"type\":\"agent_mo")
        .expect("tear");
    drop(file);

    let reopened = EngineApi::open(config.clone()).expect("open");
    assert_eq!(reopened.tick(), 3);

    let frames = EventLog::new(&log_path).read_all().expect("read log");
    assert!(frames.iter().all(|event| event.tick <= 3));
    cleanup(&config);
}

#[tokio::test]
async fn loaded_state_equals_the_in_memory_state() {
    let config = temp_config("equivalence");
    let mut engine = EngineApi::init(config.clone(), "model-a").expect("init");
    engine.run_ticks(4).await.expect("run");

    let store = SqliteWorldStore::open_reader(config.database_path()).expect("reader");
    let loaded = store.load_kernel(&config).expect("load");

    assert_eq!(loaded.meta(), engine.kernel().meta());
    assert_eq!(loaded.cells(), engine.kernel().cells());
    assert_eq!(loaded.objects(), engine.kernel().objects());
    assert_eq!(loaded.agents(), engine.kernel().agents());
    assert_eq!(loaded.named_places(), engine.kernel().named_places());
    assert_eq!(loaded.structures(), engine.kernel().structures());
    assert_eq!(loaded.conversations(), engine.kernel().conversations());
    assert_eq!(loaded.invitations(), engine.kernel().invitations());
    assert_eq!(loaded.id_counters(), engine.kernel().id_counters());
    cleanup(&config);
}

#[tokio::test]
async fn event_sequence_numbers_are_monotone_across_ticks() {
    let config = temp_config("seq");
    let mut engine = EngineApi::init(config.clone(), "model-a").expect("init");
    for tick in 0..6 {
        engine.enqueue_observer_command(contracts::ObserverCommand::TriggerEvent {
            text: format!("omen {tick}"),
        });
        engine.tick_once().await.expect("tick");
    }
    drop(engine);

    let frames = EventLog::new(config.event_log_path())
        .read_all()
        .expect("read log");
    let seqs: Vec<u64> = frames.iter().map(|event| event.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(seqs.len(), sorted.len(), "sequence numbers repeat");
    assert_eq!(seqs, sorted, "sequence numbers out of order");
    cleanup(&config);
}
