//! ProcessLogger over JsonlActivityLog: day rollover, retention and tolerant read-back

use agentwatch_core::application::ProcessLogger;
use agentwatch_core::domain::{
    ActivityState, AgentProcess, LifecycleKind, LogKind, ProcessLifecycleEvent, ProcessSnapshot,
};
use agentwatch_core::port::time_provider::mocks::ManualClock;
use agentwatch_infra_jsonl::JsonlActivityLog;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

// 2026-01-31T23:59:00Z
const BEFORE_MIDNIGHT: i64 = 1_769_903_940_000;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn agent(pid: u32, state: ActivityState) -> AgentProcess {
    AgentProcess {
        pid,
        label: "claude".to_string(),
        command_line: "claude --continue".to_string(),
        exe_path: "claude".to_string(),
        start_time: Some(BEFORE_MIDNIGHT - 600_000),
        cpu_percent: Some(0.5),
        rss_kb: Some(204_800),
        threads: Some(12),
        tty: Some("pts/3".to_string()),
        cwd: Some("/ws/site".to_string()),
        repo_path: Some("/ws/site".to_string()),
        heuristic_state: state,
        quiet_seconds: 0,
        first_seen_at: BEFORE_MIDNIGHT,
        wrapper_state: None,
        sandbox: None,
        state,
        awaiting_user: false,
    }
}

#[test]
fn test_rollover_retention_and_read_back() {
    let tmp = TempDir::new().unwrap();
    let log = Arc::new(JsonlActivityLog::new(tmp.path(), 30, 60));

    // Leftovers from earlier runs: one expired, one recent
    std::fs::write(log.file_path(LogKind::Events, day(2025, 12, 1)), "{}\n").unwrap();
    std::fs::write(log.file_path(LogKind::Snapshots, day(2026, 1, 20)), "{}\n").unwrap();

    let clock = Arc::new(ManualClock::new(BEFORE_MIDNIGHT));
    let logger = ProcessLogger::new(log.clone(), clock.clone(), 1);

    logger.record_cycle(&[agent(42, ActivityState::Working)]);
    assert!(
        !log.file_path(LogKind::Events, day(2025, 12, 1)).exists(),
        "first write applies retention"
    );
    assert!(log.file_path(LogKind::Snapshots, day(2026, 1, 20)).exists());

    // Past midnight UTC: new day files
    clock.advance_secs(120);
    logger.record_cycle(&[agent(42, ActivityState::Waiting)]);
    clock.advance_secs(5);
    logger.record_cycle(&[]);

    let jan: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 1, 31)).unwrap();
    let feb: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 2, 1)).unwrap();
    assert_eq!(jan.len(), 1);
    assert_eq!(jan[0].event, LifecycleKind::ProcessStart);
    assert_eq!(
        feb.iter().map(|e| e.event).collect::<Vec<_>>(),
        vec![LifecycleKind::StateChange, LifecycleKind::ProcessEnd]
    );

    // Corrupt a line in the middle of the range
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(log.file_path(LogKind::Snapshots, day(2026, 1, 31)))
        .unwrap();
    file.write_all(b"{\"pid\": \n").unwrap();
    drop(file);

    // Snapshot cycles were the first two; the empty third cycle writes none
    let written = vec![
        ProcessSnapshot::from_agent(&agent(42, ActivityState::Working), at(BEFORE_MIDNIGHT)),
        ProcessSnapshot::from_agent(&agent(42, ActivityState::Waiting), at(BEFORE_MIDNIGHT + 120_000)),
    ];
    let snapshots: Vec<ProcessSnapshot> = log
        .read_range(LogKind::Snapshots, day(2026, 1, 31), day(2026, 2, 1))
        .unwrap();
    assert_eq!(snapshots, written);
    assert_eq!(snapshots[1].repo_path.as_deref(), Some("/ws/site"));
    assert_eq!(snapshots[1].uptime_ms, Some(720_000));

    let dates: Vec<NaiveDate> = log
        .list_files(LogKind::Snapshots)
        .unwrap()
        .iter()
        .map(|f| f.date)
        .collect();
    assert_eq!(dates, vec![day(2026, 1, 20), day(2026, 1, 31), day(2026, 2, 1)]);
}

#[test]
fn test_unwritable_directory_never_panics() {
    let tmp = TempDir::new().unwrap();
    // A file where the log directory should be
    let blocked = tmp.path().join("blocked");
    std::fs::write(&blocked, "not a directory").unwrap();

    let log = Arc::new(JsonlActivityLog::new(&blocked, 30, 60));
    let clock = Arc::new(ManualClock::new(BEFORE_MIDNIGHT));
    let logger = ProcessLogger::new(log, clock, 1);

    let written = logger.record_cycle(&[agent(7, ActivityState::Working)]);
    assert_eq!(written.events, 0);
    assert_eq!(written.snapshots, 0);
    assert_eq!(logger.cycles(), 1);
}
