// JSONL ActivityLog Implementation
//
// Layout: <dir>/<prefix>_<YYYY-MM-DD>.jsonl, one JSON object per line,
// one file per record kind per UTC day.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use agentwatch_core::domain::{LogKind, ProcessLifecycleEvent, ProcessSnapshot};
use agentwatch_core::port::{ActivityLog, LogError, RetentionReport};

const FILE_EXTENSION: &str = ".jsonl";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One day file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileInfo {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Append-only daily JSONL files
///
/// The directory is created on the first append. Retention keeps files no
/// older than `max_age_days`, then at most `max_files` per kind (0 disables
/// the count limit).
pub struct JsonlActivityLog {
    dir: PathBuf,
    max_age_days: u32,
    max_files: usize,
    // Appends from one process never interleave within a file
    write_lock: Mutex<()>,
}

impl JsonlActivityLog {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: u32, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_age_days,
            max_files,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `kind` records for `date`
    pub fn file_path(&self, kind: LogKind, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}{}",
            kind.file_prefix(),
            date.format(DATE_FORMAT),
            FILE_EXTENSION
        ))
    }

    /// Day files of `kind`, oldest first
    pub fn list_files(&self, kind: LogKind) -> Result<Vec<LogFileInfo>, LogError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LogError::Io(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| parse_file_date(kind, n)) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(LogFileInfo {
                date,
                path: entry.path(),
                size_bytes: metadata.len(),
            });
        }

        files.sort_by_key(|f| f.date);
        Ok(files)
    }

    /// Records of one day. A missing file reads as empty; malformed lines are skipped.
    pub fn read_day<T: DeserializeOwned>(
        &self,
        kind: LogKind,
        date: NaiveDate,
    ) -> Result<Vec<T>, LogError> {
        read_records(&self.file_path(kind, date))
    }

    /// Records from `from` through `to`, both inclusive, in file order
    pub fn read_range<T: DeserializeOwned>(
        &self,
        kind: LogKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<T>, LogError> {
        let mut records = Vec::new();
        for file in self.list_files(kind)? {
            if file.date < from || file.date > to {
                continue;
            }
            records.extend(read_records::<T>(&file.path)?);
        }
        Ok(records)
    }

    fn append<T: Serialize>(
        &self,
        kind: LogKind,
        records: &[T],
        recorded_at: impl Fn(&T) -> DateTime<Utc>,
    ) -> Result<(), LogError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut by_day: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for record in records {
            let buffer = by_day.entry(recorded_at(record).date_naive()).or_default();
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(&self.dir).map_err(|source| LogError::Write {
            path: self.dir.display().to_string(),
            source,
        })?;

        for (day, lines) in by_day {
            let path = self.file_path(kind, day);
            append_lines(&path, lines.as_bytes()).map_err(|source| LogError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn retain_kind(&self, kind: LogKind, today: NaiveDate, report: &mut RetentionReport) -> Result<(), LogError> {
        let cutoff = today - Duration::days(i64::from(self.max_age_days));
        let mut kept = Vec::new();

        for file in self.list_files(kind)? {
            if file.date < cutoff {
                if remove_file(&file.path) {
                    report.expired += 1;
                }
            } else {
                kept.push(file);
            }
        }

        if self.max_files > 0 && kept.len() > self.max_files {
            let excess = kept.len() - self.max_files;
            // Oldest first, so the newest `max_files` survive
            for file in kept.iter().take(excess) {
                if remove_file(&file.path) {
                    report.over_limit += 1;
                }
            }
        }
        Ok(())
    }
}

impl ActivityLog for JsonlActivityLog {
    fn append_snapshots(&self, records: &[ProcessSnapshot]) -> Result<(), LogError> {
        self.append(LogKind::Snapshots, records, |r| r.recorded_at)
    }

    fn append_events(&self, records: &[ProcessLifecycleEvent]) -> Result<(), LogError> {
        self.append(LogKind::Events, records, |r| r.recorded_at)
    }

    fn enforce_retention(&self, today: NaiveDate) -> Result<RetentionReport, LogError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = RetentionReport::default();
        for kind in LogKind::all() {
            self.retain_kind(kind, today, &mut report)?;
        }

        if report.expired + report.over_limit > 0 {
            info!(
                dir = %self.dir.display(),
                expired = report.expired,
                over_limit = report.over_limit,
                "Old activity logs removed"
            );
        }
        Ok(report)
    }
}

/// `<prefix>_<YYYY-MM-DD>.jsonl` -> date, for the given kind only
fn parse_file_date(kind: LogKind, name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(kind.file_prefix())?
        .strip_prefix('_')?
        .strip_suffix(FILE_EXTENSION)?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

fn append_lines(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove log file");
            false
        }
    }
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LogError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LogError::Io(e)),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                debug!(file = %path.display(), line = line_no, "Skipping non-UTF-8 log line");
                continue;
            }
            Err(e) => return Err(LogError::Io(e)),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(file = %path.display(), line = line_no, error = %e, "Skipping malformed log line");
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwatch_core::domain::{ActivityState, LifecycleKind};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ended(pid: u32, recorded_at: DateTime<Utc>) -> ProcessLifecycleEvent {
        ProcessLifecycleEvent::ended(
            pid,
            "claude",
            Some(recorded_at.timestamp_millis() - 60_000),
            ActivityState::Waiting,
            recorded_at,
        )
    }

    fn touch(log: &JsonlActivityLog, kind: LogKind, date: NaiveDate) {
        fs::create_dir_all(log.dir()).unwrap();
        fs::write(log.file_path(kind, date), "{}\n").unwrap();
    }

    #[test]
    fn test_creates_directory_and_names_file_by_day() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path().join("nested/process-logs"), 30, 60);

        log.append_events(&[ended(10, at(2026, 2, 1, 9, 30))]).unwrap();

        let path = tmp.path().join("nested/process-logs/events_2026-02-01.jsonl");
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"event\":\"process_end\""));
        assert!(contents.contains("\"durationMs\":60000"));
    }

    #[test]
    fn test_records_split_at_utc_midnight() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 30, 60);

        log.append_events(&[
            ended(1, at(2026, 1, 31, 23, 59)),
            ended(2, at(2026, 2, 1, 0, 0)),
        ])
        .unwrap();

        let jan: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 1, 31)).unwrap();
        let feb: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 2, 1)).unwrap();
        assert_eq!(jan.iter().map(|e| e.pid).collect::<Vec<_>>(), vec![1]);
        assert_eq!(feb.iter().map(|e| e.pid).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_appends_preserve_earlier_lines() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 30, 60);

        log.append_events(&[ended(1, at(2026, 2, 1, 8, 0))]).unwrap();
        log.append_events(&[ended(2, at(2026, 2, 1, 9, 0))]).unwrap();

        let events: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 2, 1)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pid, 1);
        assert_eq!(events[1].event, LifecycleKind::ProcessEnd);
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 30, 60);
        log.append_events(&[ended(1, at(2026, 2, 1, 8, 0))]).unwrap();

        let path = log.file_path(LogKind::Events, day(2026, 2, 1));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"recordedAt\": truncated\n\n").unwrap();
        file.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        drop(file);
        log.append_events(&[ended(2, at(2026, 2, 1, 9, 0))]).unwrap();

        let events: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 2, 1)).unwrap();
        assert_eq!(events.iter().map(|e| e.pid).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_missing_day_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path().join("never-created"), 30, 60);

        let events: Vec<ProcessLifecycleEvent> = log.read_day(LogKind::Events, day(2026, 2, 1)).unwrap();
        assert!(events.is_empty());
        assert!(log.list_files(LogKind::Events).unwrap().is_empty());
    }

    #[test]
    fn test_read_range_is_inclusive_and_skips_gaps() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 30, 60);
        for (pid, d) in [(1, 1), (3, 3), (4, 4), (6, 6)] {
            log.append_events(&[ended(pid, at(2026, 2, d, 12, 0))]).unwrap();
        }

        let events: Vec<ProcessLifecycleEvent> =
            log.read_range(LogKind::Events, day(2026, 2, 1), day(2026, 2, 4)).unwrap();
        assert_eq!(events.iter().map(|e| e.pid).collect::<Vec<_>>(), vec![1, 3, 4]);

        let none: Vec<ProcessLifecycleEvent> =
            log.read_range(LogKind::Events, day(2026, 2, 5), day(2026, 2, 2)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_list_files_filters_by_kind_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 30, 60);
        touch(&log, LogKind::Snapshots, day(2026, 2, 3));
        touch(&log, LogKind::Snapshots, day(2026, 1, 30));
        touch(&log, LogKind::Events, day(2026, 2, 1));
        fs::write(tmp.path().join("snapshots_latest.jsonl"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();

        let files = log.list_files(LogKind::Snapshots).unwrap();
        let dates: Vec<NaiveDate> = files.iter().map(|f| f.date).collect();
        assert_eq!(dates, vec![day(2026, 1, 30), day(2026, 2, 3)]);
        assert_eq!(files[0].size_bytes, 3);
    }

    #[test]
    fn test_retention_by_age_then_count() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path(), 10, 3);
        let today = day(2026, 2, 20);

        // 2026-02-10 is exactly max age and is kept
        for d in [1, 5, 10, 12, 15, 19, 20] {
            touch(&log, LogKind::Snapshots, day(2026, 2, d));
        }
        touch(&log, LogKind::Events, day(2026, 2, 19));

        let report = log.enforce_retention(today).unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.over_limit, 2);

        let kept: Vec<NaiveDate> = log
            .list_files(LogKind::Snapshots)
            .unwrap()
            .iter()
            .map(|f| f.date)
            .collect();
        assert_eq!(kept, vec![day(2026, 2, 15), day(2026, 2, 19), day(2026, 2, 20)]);
        assert_eq!(log.list_files(LogKind::Events).unwrap().len(), 1);
    }

    #[test]
    fn test_retention_on_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlActivityLog::new(tmp.path().join("absent"), 30, 60);
        assert_eq!(log.enforce_retention(day(2026, 2, 1)).unwrap(), RetentionReport::default());
    }
}
