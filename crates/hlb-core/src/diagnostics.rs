//! Operator-facing diagnostics: one JSON file per failure or dumped update.
//!
//! Nothing in the bot reads these files back. Writes are best-effort; a
//! failure to record is logged and swallowed.

use std::{
    error::Error as StdError,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::Value;

use crate::{utils::iso_timestamp_utc, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Malformed,
    HandlerError,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticRecord {
    pub captured_at: String,
    pub event_id: i64,
    pub kind: DiagnosticKind,
    pub message: String,
    pub trace_or_context: String,
}

#[derive(Debug)]
pub struct ErrorRecorder {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ErrorRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a diagnostic record. Returns the file written, if any.
    pub fn record(
        &self,
        event_id: i64,
        kind: DiagnosticKind,
        message: &str,
        context: &str,
    ) -> Option<PathBuf> {
        let record = DiagnosticRecord {
            captured_at: iso_timestamp_utc(),
            event_id,
            kind,
            message: message.to_string(),
            trace_or_context: context.to_string(),
        };
        let name = format!("{}-error.json", self.file_stem(event_id));
        match self.write_json(&name, &record) {
            Ok(path) => {
                tracing::warn!(event_id, ?kind, path = %path.display(), "recorded diagnostic: {message}");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(event_id, ?kind, "failed to write diagnostic record: {e}");
                None
            }
        }
    }

    /// Record an error, using its source chain plus `context` as the trace.
    pub fn record_error(
        &self,
        event_id: i64,
        kind: DiagnosticKind,
        error: &Error,
        context: &str,
    ) -> Option<PathBuf> {
        let mut trace = String::new();
        let mut source = error.source();
        while let Some(s) = source {
            trace.push_str("caused by: ");
            trace.push_str(&s.to_string());
            trace.push('\n');
            source = s.source();
        }
        trace.push_str(context);
        self.record(event_id, kind, &error.to_string(), &trace)
    }

    /// Persist a raw update verbatim (pretty-printed) for later inspection.
    pub fn dump_update(&self, event_id: i64, raw: &Value) -> Option<PathBuf> {
        let name = format!("{}.json", self.file_stem(event_id));
        match self.write_json(&name, raw) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(event_id, "failed to dump update: {e}");
                None
            }
        }
    }

    /// `<unix secs>-<event id>-<subsec nanos>-<seq>`: unique even for
    /// same-second failures of the same update.
    fn file_stem(&self, event_id: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{event_id}-{:09}-{seq}",
            now.as_secs(),
            now.subsec_nanos()
        )
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let txt = serde_json::to_string_pretty(value)?;
        // create_new: never clobber an earlier record.
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        std::io::Write::write_all(&mut f, txt.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files(dir: &Path) -> Vec<PathBuf> {
        let mut out: Vec<_> = fs::read_dir(dir)
            .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    #[test]
    fn same_second_records_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let rec = ErrorRecorder::new(dir.path().join("updates"));

        for _ in 0..5 {
            assert!(rec
                .record(7, DiagnosticKind::HandlerError, "boom", "")
                .is_some());
        }
        assert_eq!(files(rec.dir()).len(), 5);
    }

    #[test]
    fn record_contents_are_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let rec = ErrorRecorder::new(dir.path());
        let err = Error::External("handler exploded".to_string());

        let path = rec
            .record_error(55, DiagnosticKind::HandlerError, &err, "route=group")
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("-55-"));
        assert!(name.ends_with("-error.json"));

        let v: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["event_id"], 55);
        assert_eq!(v["kind"], "handler_error");
        assert_eq!(v["message"], "external error: handler exploded");
        assert_eq!(v["trace_or_context"], "route=group");
    }

    #[test]
    fn dump_is_pretty_verbatim_json() {
        let dir = tempfile::tempdir().unwrap();
        let rec = ErrorRecorder::new(dir.path());
        let raw = json!({ "update_id": 3, "poll": { "id": "p" } });

        let path = rec.dump_update(3, &raw).unwrap();
        let txt = fs::read_to_string(path).unwrap();
        assert!(txt.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&txt).unwrap(), raw);
    }

    #[test]
    fn unwritable_store_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let rec = ErrorRecorder::new(&blocker);
        assert!(rec
            .record(1, DiagnosticKind::Malformed, "bad", "")
            .is_none());
        assert!(rec.dump_update(1, &json!({})).is_none());
    }
}
