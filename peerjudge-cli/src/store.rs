/// Append-only JSONL decision log.
///
/// One record per line, tagged with its project and question so several
/// sessions can share a file. Decision lines carry the flattened decision;
/// session lines carry the per-reviewer quota, and the last one for a key wins.
use peerjudge_core::{Decision, DecisionStore, SessionKey, StoreError};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    project_id: String,
    question_id: String,
    per_reviewer_quota: usize,
}

#[derive(Serialize, Deserialize)]
struct DecisionRecord {
    project_id: String,
    question_id: String,
    #[serde(flatten)]
    decision: Decision,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LogRecord {
    Session(SessionRecord),
    Decision(DecisionRecord),
}

impl LogRecord {
    fn key(&self) -> SessionKey {
        match self {
            LogRecord::Session(r) => SessionKey::new(&r.project_id, &r.question_id),
            LogRecord::Decision(r) => SessionKey::new(&r.project_id, &r.question_id),
        }
    }
}

pub struct JsonlStore {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonlStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlStore {
            path: path.to_path_buf(),
            writer: Mutex::new(file),
        })
    }

    fn write_record(&self, record: &LogRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record).map_err(|e| StoreError::Codec(e.to_string()))?;

        let mut file = self
            .writer
            .lock()
            .map_err(|_| StoreError::Unavailable("log writer lock poisoned".to_string()))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn records_for(&self, key: &SessionKey) -> Result<Vec<LogRecord>, StoreError> {
        Ok(read_records(&self.path)?
            .into_iter()
            .filter(|r| r.key() == *key)
            .collect())
    }
}

impl DecisionStore for JsonlStore {
    fn append(&self, key: &SessionKey, decision: &Decision) -> Result<(), StoreError> {
        self.write_record(&LogRecord::Decision(DecisionRecord {
            project_id: key.project_id.clone(),
            question_id: key.question_id.clone(),
            decision: decision.clone(),
        }))
    }

    fn load(&self, key: &SessionKey) -> Result<Vec<Decision>, StoreError> {
        Ok(self
            .records_for(key)?
            .into_iter()
            .filter_map(|r| match r {
                LogRecord::Decision(r) => Some(r.decision),
                LogRecord::Session(_) => None,
            })
            .collect())
    }

    fn save_quota(&self, key: &SessionKey, per_reviewer_quota: usize) -> Result<(), StoreError> {
        self.write_record(&LogRecord::Session(SessionRecord {
            project_id: key.project_id.clone(),
            question_id: key.question_id.clone(),
            per_reviewer_quota,
        }))
    }

    fn load_quota(&self, key: &SessionKey) -> Result<Option<usize>, StoreError> {
        Ok(self
            .records_for(key)?
            .into_iter()
            .filter_map(|r| match r {
                LogRecord::Session(r) => Some(r.per_reviewer_quota),
                LogRecord::Decision(_) => None,
            })
            .last())
    }
}

fn read_records(path: &Path) -> Result<Vec<LogRecord>, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(&line)
            .map_err(|e| StoreError::Codec(format!("{}:{}: {e}", path.display(), n + 1)))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use peerjudge_core::Outcome;

    fn decision(reviewer: &str, a: i64, b: i64) -> Decision {
        Decision {
            reviewer_id: reviewer.to_string(),
            item_a: a,
            item_b: b,
            outcome: Outcome::Right,
            latency_ms: 4200,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_then_load_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        let q1 = SessionKey::new("p", "q1");
        let q2 = SessionKey::new("p", "q2");

        store.append(&q1, &decision("r1", 1, 2)).unwrap();
        store.append(&q2, &decision("r1", 3, 4)).unwrap();
        store.append(&q1, &decision("r2", 2, 3)).unwrap();

        let loaded = store.load(&q1).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].reviewer_id, "r2");
        assert_eq!(loaded[0].outcome, Outcome::Right);
        assert_eq!(read_records(&path).unwrap().len(), 3);

        // A second handle sees the same file.
        let reopened = JsonlStore::open(&path).unwrap();
        assert_eq!(reopened.load(&q2).unwrap(), vec![store.load(&q2).unwrap()[0].clone()]);
    }

    #[test]
    fn test_quota_lines_sit_beside_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        let q1 = SessionKey::new("p", "q1");
        let q2 = SessionKey::new("p", "q2");

        assert_eq!(store.load_quota(&q1).unwrap(), None);
        store.save_quota(&q1, 10).unwrap();
        store.append(&q1, &decision("r1", 1, 2)).unwrap();
        store.save_quota(&q2, 4).unwrap();
        store.save_quota(&q1, 12).unwrap();

        assert_eq!(store.load_quota(&q1).unwrap(), Some(12));
        assert_eq!(store.load_quota(&q2).unwrap(), Some(4));
        assert_eq!(store.load(&q1).unwrap().len(), 1);
        assert!(store.load(&q2).unwrap().is_empty());

        let first = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(first.lines().next().unwrap()).unwrap();
        assert_eq!(value["per_reviewer_quota"], 10);
        assert!(value.get("reviewer_id").is_none());
    }

    #[test]
    fn test_record_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        store.append(&SessionKey::new("p", "q"), &decision("r1", 1, 2)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["project_id"], "p");
        assert_eq!(value["outcome"], "right");
        assert_eq!(value["item_a"], 1);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let store = JsonlStore::open(&path).unwrap();
        let err = store.load(&SessionKey::new("p", "q")).unwrap_err();
        assert!(matches!(err, StoreError::Codec(msg) if msg.contains(":1:")));
    }
}
