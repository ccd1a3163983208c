//! Per-order session: part counters, artifact naming and the measurement log.
//!
//! One [`Session`] owns one order directory. Counter assignment, the
//! non-overwrite check, the artifact write and the log append all happen under
//! the session's single mutex, so concurrent inspections of the same order see
//! each other's effects atomically. Different orders share nothing.
//!
//! Across processes an order is claimed by a `.{order}.lock` marker created
//! with `create_new`; a second [`Session::open`] of the same order fails with
//! [`SessionError::Locked`] until the first one closes.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::classify::{MeasurementVector, Verdict};
use crate::error::SessionError;

/// Upper bound on counters tried when artifact names collide.
pub const MAX_PATH_ATTEMPTS: usize = 1000;

/// Column header of the per-order log.
pub const LOG_HEADER: [&str; 19] = [
    "Number",
    "OK/NOK",
    "OrderNumber",
    "Counter",
    "Date",
    "Time",
    "Value1",
    "Value2",
    "Value3",
    "Value4",
    "Value5",
    "Value6",
    "Value7",
    "Value8",
    "Value9",
    "Value10",
    "Value11",
    "Value12",
    "User",
];

const COL_NUMBER: usize = 0;
const COL_VERDICT: usize = 1;
const COL_COUNTER: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Artifact file extension without the dot.
    pub extension: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            extension: "jpg".to_string(),
        }
    }
}

/// One row of the measurement log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// 1-based row number within the order's log.
    pub number: u64,
    /// Overall OK/NOK decision.
    pub verdict: Verdict,
    /// Order number the part belongs to.
    pub order: String,
    /// Part identifier, as used in the artifact name.
    pub part: String,
    /// Camera that took the frame.
    pub cam_id: u32,
    /// Part counter encoded in the artifact name.
    pub counter: u64,
    /// Operator of the session.
    pub user: String,
    /// Inspection time; written as separate date and time columns.
    pub timestamp: DateTime<Local>,
    /// The twelve measurements in log column order.
    pub values: MeasurementVector,
}

impl MeasurementRecord {
    /// CSV line including the trailing newline.
    pub fn to_csv_row(&self) -> String {
        let mut fields: Vec<String> = Vec::with_capacity(LOG_HEADER.len());
        fields.push(self.number.to_string());
        fields.push(self.verdict.as_str().to_string());
        fields.push(csv_field(&self.order));
        fields.push(self.counter.to_string());
        fields.push(self.timestamp.format("%Y-%m-%d").to_string());
        fields.push(self.timestamp.format("%H:%M:%S").to_string());
        fields.extend(self.values.values().iter().map(|v| format!("{v:.2}")));
        fields.push(csv_field(&self.user));
        let mut line = fields.join(",");
        line.push('\n');
        line
    }
}

/// Running totals of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ok: u64,
    pub nok: u64,
    pub total: u64,
    /// `ok / total`, `0.0` before the first part.
    pub ok_rate: f64,
    pub nok_rate: f64,
}

impl SessionStats {
    fn from_counts(ok: u64, nok: u64) -> Self {
        let total = ok + nok;
        let rate = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            }
        };
        Self {
            ok,
            nok,
            total,
            ok_rate: rate(ok),
            nok_rate: rate(nok),
        }
    }
}

/// Fields of a record the caller decides; the session fills in the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordDraft {
    /// Decides the `OK_`/`NOK_` artifact prefix and the log's verdict column.
    pub verdict: Verdict,
    /// Part identifier; path separators are replaced in the artifact name.
    pub part: String,
    /// Camera id for the `_CAM{n}` suffix.
    pub cam_id: u32,
    /// Inspection time.
    pub timestamp: DateTime<Local>,
    /// Measurements for the log row.
    pub values: MeasurementVector,
}

/// Outcome of [`Session::commit`].
#[derive(Clone, Debug, PartialEq)]
pub struct Committed {
    /// The row as appended to the log, with row number and counter assigned.
    pub record: MeasurementRecord,
    /// Path of the artifact that was written.
    pub artifact: PathBuf,
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if cur.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

fn validate_order(order: &str) -> Result<(), SessionError> {
    let reason = if order.trim().is_empty() {
        Some("empty")
    } else if order.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if order == "." || order == ".." {
        Some("reserved name")
    } else if order.contains('\0') {
        Some("contains NUL")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SessionError::InvalidOrder {
            order: order.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Counter encoded in an artifact file name of this order, if any.
fn counter_from_artifact_name(name: &str, order: &str) -> Option<u64> {
    let rest = name
        .strip_prefix("OK_")
        .or_else(|| name.strip_prefix("NOK_"))?;
    let rest = rest.strip_prefix(order)?.strip_prefix('_')?;
    let at = rest.rfind("Count")?;
    let digits = &rest[at + "Count".len()..];
    let end = digits.find("_CAM")?;
    digits[..end].parse().ok()
}

/// Remove an artifact of a failed commit; `false` (and an error log) if it stays.
fn discard_artifact(path: &Path, what: &str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            log::error!("could not remove {what} artifact {}: {e}", path.display());
            false
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Recovered {
    max_counter: u64,
    rows: u64,
    ok: u64,
    nok: u64,
    /// The log ends in a row without its newline.
    unterminated: bool,
}

fn recover_from_log(path: &Path) -> Result<Recovered, SessionError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Recovered::default()),
        Err(e) => return Err(SessionError::io(path, e)),
    };
    let mut rec = Recovered {
        unterminated: !raw.is_empty() && !raw.ends_with('\n'),
        ..Recovered::default()
    };
    let mut data_rows = 0u64;
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let fields = parse_csv_line(line);
        if fields.first().map(String::as_str) == Some(LOG_HEADER[0]) {
            continue;
        }
        data_rows += 1;
        if let Some(n) = fields.get(COL_NUMBER).and_then(|v| v.trim().parse::<u64>().ok()) {
            rec.rows = rec.rows.max(n);
        }
        match fields.get(COL_VERDICT).and_then(|v| Verdict::parse(v)) {
            Some(Verdict::Ok) => rec.ok += 1,
            Some(Verdict::Nok) => rec.nok += 1,
            None => log::warn!("{}: row {data_rows} has no verdict", path.display()),
        }
        if let Some(c) = fields.get(COL_COUNTER).and_then(|v| v.trim().parse::<u64>().ok()) {
            rec.max_counter = rec.max_counter.max(c);
        }
    }
    rec.rows = rec.rows.max(data_rows);
    Ok(rec)
}

fn max_artifact_counter(dir: &Path, order: &str) -> Result<u64, SessionError> {
    let entries = fs::read_dir(dir).map_err(|e| SessionError::io(dir, e))?;
    let mut max = 0;
    for entry in entries {
        let entry = entry.map_err(|e| SessionError::io(dir, e))?;
        if let Some(c) = entry
            .file_name()
            .to_str()
            .and_then(|n| counter_from_artifact_name(n, order))
        {
            max = max.max(c);
        }
    }
    Ok(max)
}

/// Exclusive claim on an order directory. Dropping it removes the marker.
#[derive(Debug)]
struct OrderLock {
    path: PathBuf,
}

impl OrderLock {
    fn acquire(dir: &Path, order: &str) -> Result<Self, SessionError> {
        let path = dir.join(format!(".{order}.lock"));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SessionError::Locked {
                    order: order.to_string(),
                    path,
                })
            }
            Err(e) => return Err(SessionError::io(path, e)),
        };
        let written = writeln!(file, "{}", std::process::id()).and_then(|_| file.sync_all());
        drop(file);
        let lock = Self { path };
        written.map_err(|e| SessionError::io(&lock.path, e))?;
        Ok(lock)
    }
}

impl Drop for OrderLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::error!("could not release order lock {}: {e}", self.path.display());
        }
    }
}

#[derive(Debug)]
struct SessionState {
    open: bool,
    next_counter: u64,
    ok: u64,
    nok: u64,
    rows: u64,
    log: Option<File>,
    /// Prefix the next append with a newline.
    unterminated: bool,
    order_lock: Option<OrderLock>,
}

/// Persistence state of one order. Share it as `Arc<Session>`.
#[derive(Debug)]
pub struct Session {
    order: String,
    user: String,
    dir: PathBuf,
    log_path: PathBuf,
    extension: String,
    state: Mutex<SessionState>,
}

impl Session {
    /// Open (or resume) the session of `order` under `root`.
    ///
    /// The first counter handed out is one past the highest counter found in
    /// either the artifact file names or the log; row number and OK/NOK totals
    /// continue from the log.
    ///
    /// Fails with [`SessionError::Locked`] while another session holds the
    /// order, in this process or another one.
    pub fn open(
        root: impl AsRef<Path>,
        order: &str,
        user: &str,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        validate_order(order)?;
        let dir = root.as_ref().join(order);
        fs::create_dir_all(&dir).map_err(|e| SessionError::io(&dir, e))?;
        let order_lock = OrderLock::acquire(&dir, order)?;

        let log_path = dir.join(format!("{order}.csv"));
        let recovered = recover_from_log(&log_path)?;
        let max_file = max_artifact_counter(&dir, order)?;
        let next_counter = recovered.max_counter.max(max_file) + 1;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SessionError::io(&log_path, e))?;

        log::info!(
            "session {order}: opened {} (next counter {next_counter}, {} rows)",
            dir.display(),
            recovered.rows
        );
        Ok(Self {
            order: order.to_string(),
            user: user.to_string(),
            dir,
            log_path,
            extension: options.extension,
            state: Mutex::new(SessionState {
                open: true,
                next_counter,
                ok: recovered.ok,
                nok: recovered.nok,
                rows: recovered.rows,
                log: Some(log),
                unterminated: recovered.unterminated,
                order_lock: Some(order_lock),
            }),
        })
    }

    pub fn order(&self) -> &str {
        &self.order
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact file extension without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        let state = self.lock();
        if state.open {
            Ok(state)
        } else {
            Err(SessionError::Closed {
                order: self.order.clone(),
            })
        }
    }

    /// Hand out the next part counter.
    pub fn next_counter(&self) -> Result<u64, SessionError> {
        let mut state = self.lock_open()?;
        let counter = state.next_counter;
        state.next_counter += 1;
        Ok(counter)
    }

    /// Artifact path for the given fields. Does not touch the filesystem.
    pub fn artifact_path(&self, status: Verdict, part: &str, counter: u64, cam_id: u32) -> PathBuf {
        let part: String = part
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        self.dir.join(format!(
            "{}_{}_{}Count{}_CAM{}.{}",
            status.as_str(),
            self.order,
            part,
            counter,
            cam_id,
            self.extension
        ))
    }

    /// First non-existing artifact path starting at `counter`.
    ///
    /// Colliding names advance the counter, at most [`MAX_PATH_ATTEMPTS`]
    /// times. The returned counter is never handed out again by
    /// [`next_counter`](Self::next_counter).
    pub fn build_artifact_path(
        &self,
        status: Verdict,
        part: &str,
        counter: u64,
        cam_id: u32,
    ) -> Result<(u64, PathBuf), SessionError> {
        let mut state = self.lock_open()?;
        let mut counter = counter;
        let mut last = self.artifact_path(status, part, counter, cam_id);
        for _ in 0..MAX_PATH_ATTEMPTS {
            let path = self.artifact_path(status, part, counter, cam_id);
            if !path.exists() {
                state.next_counter = state.next_counter.max(counter + 1);
                return Ok((counter, path));
            }
            log::warn!("artifact {} exists; advancing counter", path.display());
            last = path;
            counter += 1;
        }
        Err(SessionError::PathExhausted {
            attempts: MAX_PATH_ATTEMPTS,
            last,
        })
    }

    fn append_locked(
        &self,
        state: &mut SessionState,
        record: &MeasurementRecord,
    ) -> Result<(), SessionError> {
        let path = &self.log_path;
        let Some(log) = state.log.as_mut() else {
            return Err(SessionError::Closed {
                order: self.order.clone(),
            });
        };
        let before = log
            .metadata()
            .map_err(|e| SessionError::io(path, e))?
            .len();

        let mut buf = String::new();
        if before == 0 {
            buf.push_str(&LOG_HEADER.join(","));
            buf.push('\n');
        } else if state.unterminated {
            buf.push('\n');
        }
        buf.push_str(&record.to_csv_row());

        let written = log
            .write_all(buf.as_bytes())
            .and_then(|_| log.flush())
            .and_then(|_| log.sync_data());
        if let Err(e) = written {
            if let Err(trunc) = log.set_len(before) {
                log::error!("{}: rollback to {before} bytes failed: {trunc}", path.display());
            }
            return Err(SessionError::io(path, e));
        }

        state.unterminated = false;
        state.rows = state.rows.max(record.number);
        match record.verdict {
            Verdict::Ok => state.ok += 1,
            Verdict::Nok => state.nok += 1,
        }
        state.next_counter = state.next_counter.max(record.counter + 1);
        Ok(())
    }

    /// Append one row, writing the header first into an empty log.
    ///
    /// Either the whole row is durably written or the log is left at its
    /// previous length.
    pub fn append_record(&self, record: &MeasurementRecord) -> Result<(), SessionError> {
        let mut state = self.lock_open()?;
        self.append_locked(&mut state, record)
    }

    /// Persist one inspection: counter, unique artifact, image bytes, log row.
    ///
    /// Runs under the session lock. If the log append fails the freshly
    /// written artifact is removed again.
    pub fn commit(&self, draft: &RecordDraft, encoded: &[u8]) -> Result<Committed, SessionError> {
        let mut state = self.lock_open()?;
        let mut counter = state.next_counter;

        let mut created = None;
        let mut last = self.artifact_path(draft.verdict, &draft.part, counter, draft.cam_id);
        for _ in 0..MAX_PATH_ATTEMPTS {
            let path = self.artifact_path(draft.verdict, &draft.part, counter, draft.cam_id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    created = Some((path, file));
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::warn!("artifact {} exists; advancing counter", path.display());
                    last = path;
                    counter += 1;
                }
                Err(e) => return Err(SessionError::io(path, e)),
            }
        }
        let Some((path, mut file)) = created else {
            return Err(SessionError::PathExhausted {
                attempts: MAX_PATH_ATTEMPTS,
                last,
            });
        };
        state.next_counter = counter + 1;

        if let Err(e) = file.write_all(encoded).and_then(|_| file.sync_all()) {
            drop(file);
            discard_artifact(&path, "partial");
            return Err(SessionError::io(path, e));
        }
        drop(file);

        let record = MeasurementRecord {
            number: state.rows + 1,
            verdict: draft.verdict,
            order: self.order.clone(),
            part: draft.part.clone(),
            cam_id: draft.cam_id,
            counter,
            user: self.user.clone(),
            timestamp: draft.timestamp,
            values: draft.values,
        };
        if let Err(e) = self.append_locked(&mut state, &record) {
            discard_artifact(&path, "orphan");
            return Err(e);
        }

        log::debug!(
            "session {}: row {} counter {} -> {}",
            self.order,
            record.number,
            counter,
            path.display()
        );
        Ok(Committed {
            record,
            artifact: path,
        })
    }

    /// OK/NOK totals from the in-memory counters.
    pub fn statistics(&self) -> Result<SessionStats, SessionError> {
        let state = self.lock_open()?;
        Ok(SessionStats::from_counts(state.ok, state.nok))
    }

    /// Flush and release the log and the order. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<(), SessionError> {
        let mut state = self.lock_open()?;
        state.open = false;
        let flushed = match state.log.take() {
            Some(mut log) => log
                .flush()
                .and_then(|_| log.sync_all())
                .map_err(|e| SessionError::io(&self.log_path, e)),
            None => Ok(()),
        };
        drop(state.order_lock.take());
        flushed?;
        log::info!("session {}: closed", self.order);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                log::warn!("session {}: close on drop failed: {e}", self.order);
            }
        }
    }
}

/// One shared [`Session`] per order number.
#[derive(Debug)]
pub struct SessionRegistry {
    root: PathBuf,
    user: String,
    options: SessionOptions,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(root: impl Into<PathBuf>, user: &str, options: SessionOptions) -> Self {
        Self {
            root: root.into(),
            user: user.to_string(),
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The open session for `order`, opening it on first use.
    pub fn session(&self, order: &str) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(s) = sessions.get(order).filter(|s| s.is_open()) {
            return Ok(Arc::clone(s));
        }
        let session = Arc::new(Session::open(
            &self.root,
            order,
            &self.user,
            self.options.clone(),
        )?);
        sessions.insert(order.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Close and forget the session of `order`, if any.
    pub fn close(&self, order: &str) -> Result<(), SessionError> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(order);
        match removed {
            Some(s) if s.is_open() => s.close(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_parse_back() {
        assert_eq!(
            counter_from_artifact_name("OK_1566_P7Count12_CAM1.jpg", "1566"),
            Some(12)
        );
        assert_eq!(
            counter_from_artifact_name("NOK_1566_Count3_CAM2.png", "1566"),
            Some(3)
        );
        assert_eq!(counter_from_artifact_name("OK_1567_P7Count12_CAM1.jpg", "1566"), None);
        assert_eq!(counter_from_artifact_name("1566.csv", "1566"), None);
    }

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(parse_csv_line("1,\"a,b\",\"x\"\"y\",z"), vec!["1", "a,b", "x\"y", "z"]);
    }

    #[test]
    fn order_numbers_are_validated() {
        for bad in ["", "  ", "a/b", "a\\b", "..", "."] {
            assert!(
                matches!(validate_order(bad), Err(SessionError::InvalidOrder { .. })),
                "{bad:?}"
            );
        }
        assert!(validate_order("1566-A").is_ok());
    }

    #[test]
    fn failed_log_append_leaves_no_artifact() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::open(root.path(), "900", "qa", SessionOptions::default()).unwrap();
        // A read-only handle makes every append fail.
        session.lock().log = Some(File::open(session.log_path()).unwrap());

        let draft = RecordDraft {
            verdict: Verdict::Ok,
            part: "P1".into(),
            cam_id: 1,
            timestamp: Local::now(),
            values: MeasurementVector::zeros(),
        };
        let err = session.commit(&draft, b"jpeg").unwrap_err();
        assert!(matches!(err, SessionError::Io { .. }), "{err}");

        let leftovers: Vec<_> = fs::read_dir(session.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".jpg"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(fs::metadata(session.log_path()).unwrap().len(), 0);
        assert_eq!(session.statistics().unwrap().total, 0);
    }

    #[test]
    fn discarding_reports_artifacts_that_stay() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("OK_1_pCount1_CAM1.jpg");
        fs::write(&path, b"x").unwrap();

        assert!(discard_artifact(&path, "partial"));
        assert!(!path.exists());
        assert!(!discard_artifact(&path, "partial"));
    }

    #[test]
    fn unterminated_log_tail_is_detected() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("1.csv");
        fs::write(&path, format!("{}\n1,OK,1,1", LOG_HEADER.join(","))).unwrap();
        let rec = recover_from_log(&path).unwrap();
        assert!(rec.unterminated);
        assert_eq!((rec.rows, rec.ok, rec.max_counter), (1, 1, 1));

        fs::write(&path, format!("{}\n", LOG_HEADER.join(","))).unwrap();
        assert!(!recover_from_log(&path).unwrap().unterminated);
    }

    #[test]
    fn stats_rates_handle_empty_sessions() {
        assert_eq!(SessionStats::from_counts(0, 0).ok_rate, 0.0);
        let s = SessionStats::from_counts(3, 1);
        assert_eq!(s.total, 4);
        assert_eq!(s.ok_rate, 0.75);
        assert_eq!(s.nok_rate, 0.25);
    }
}
