use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use contracts::Event;

use crate::StorageError;

/// Append-only JSONL audit log. One framed record per line; the engine never
/// replays it. A crash can leave a partial trailing line, which is detected
/// and skipped on the next read, and a failed commit truncates the file back
/// to its pre-append length.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one frame per event and flushes. Returns the file length
    /// before the append so the caller can roll the frames back.
    pub fn append(&self, events: &[Event]) -> Result<u64, StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let prior_len = file.seek(SeekFrom::End(0))?;

        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())?;
        file.sync_data()?;

        Ok(prior_len)
    }

    /// Rolls the log back to a length previously returned by `append`. Used
    /// when the database transaction under the same commit envelope fails.
    pub fn truncate_to(&self, len: u64) -> Result<(), StorageError> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        Ok(())
    }

    /// Reads every complete frame. A trailing line without a newline is a
    /// torn write and is ignored, as is any line that fails to parse.
    pub fn read_all(&self) -> Result<Vec<Event>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut raw = String::new();
        File::open(&self.path)?.read_to_string(&mut raw)?;

        let complete = match raw.rfind('\n') {
            Some(last_newline) => &raw[..=last_newline],
            None => return Ok(Vec::new()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(complete.as_bytes()).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(err) => warn!(error = %err, "skipping unreadable event frame"),
            }
        }
        Ok(events)
    }

    pub fn tail(&self, n: usize) -> Result<Vec<Event>, StorageError> {
        let mut events = self.read_all()?;
        if events.len() > n {
            events.drain(..events.len() - n);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EventKind;
    use std::io::Write as _;

    fn temp_log(name: &str) -> EventLog {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        EventLog::new(std::env::temp_dir().join(format!("world_events_{name}_{nanos}.jsonl")))
    }

    fn sample_event(tick: u64, seq: u64) -> Event {
        Event {
            tick,
            seq,
            kind: EventKind::ObserverTriggered {
                text: "a cold wind rises".to_string(),
            },
        }
    }

    #[test]
    fn frames_round_trip() {
        let log = temp_log("round_trip");
        log.append(&[sample_event(1, 1), sample_event(1, 2)])
            .expect("append");

        let events = log.read_all().expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].seq, 2);
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn partial_trailing_frame_is_ignored() {
        let log = temp_log("partial");
        log.append(&[sample_event(1, 1)]).expect("append");

        // Simulate a crash mid-append: a frame without its newline.
        let mut file = OpenOptions::new()
            .append(true)
            .open(log.path())
            .expect("open");
        file.write_all(b"{\"tick\":2,\"seq\":2,\"ty").expect("write");
        drop(file);

        let events = log.read_all().expect("read");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tick, 1);
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn truncate_rolls_back_an_append() {
        let log = temp_log("truncate");
        log.append(&[sample_event(1, 1)]).expect("first");
        let before = log.append(&[sample_event(2, 2)]).expect("second");
        log.truncate_to(before).expect("truncate");

        let events = log.read_all().expect("read");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tick, 1);
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn corrupt_middle_line_is_skipped() {
        let log = temp_log("corrupt");
        log.append(&[sample_event(1, 1)]).expect("append");
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(log.path())
                .expect("open");
            file.write_all(b"not json at all\n").expect("write");
        }
        log.append(&[sample_event(3, 3)]).expect("append");

        let events = log.read_all().expect("read");
        assert_eq!(events.len(), 2);
        let _ = std::fs::remove_file(log.path());
    }
}
