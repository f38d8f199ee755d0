//! SQLite-backed state shared by every phase.
//!
//! Each pool worker opens its own [`Store`]; WAL mode gives concurrent readers
//! and the busy timeout plus [`Store::write`]'s retry loop serialize writers
//! without failing on contention. All writes are keyed upserts.

use std::fmt;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};

use crate::Result;
use crate::records::{
    DownloadStatus, Entry, Language, NewEntry, NewSegment, Recording,
    RecordingDescriptor, Segment, SegmentMethod, SegmentationAttempt, WordlistStatus,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_BUSY_RETRY_ATTEMPTS: u32 = 5;
const WRITE_BUSY_BASE_BACKOFF_MS: u64 = 250;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS languages (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recordings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    language_code TEXT NOT NULL REFERENCES languages(code),
    filename TEXT NOT NULL,
    kind TEXT NOT NULL,
    audio_url TEXT,
    wordlist_url TEXT,
    entry_start INTEGER,
    entry_end INTEGER,
    year INTEGER,
    sequence INTEGER,
    additional_info TEXT,
    local_path TEXT,
    download_status TEXT NOT NULL DEFAULT 'pending',
    size_bytes INTEGER,
    download_error TEXT,
    downloaded_at TEXT,
    wordlist_status TEXT NOT NULL DEFAULT 'pending',
    UNIQUE(language_code, filename)
);

CREATE INDEX IF NOT EXISTS idx_recordings_language ON recordings(language_code);

-- Entries deliberately do not cascade: a recording with entries cannot be deleted.
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recording_id INTEGER NOT NULL REFERENCES recordings(id),
    entry_number INTEGER NOT NULL,
    position INTEGER NOT NULL,
    ipa TEXT,
    gloss TEXT,
    orthography TEXT,
    sound TEXT,
    layout TEXT NOT NULL,
    UNIQUE(recording_id, entry_number)
);

CREATE TABLE IF NOT EXISTS segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL UNIQUE REFERENCES entries(id) ON DELETE CASCADE,
    recording_id INTEGER NOT NULL REFERENCES recordings(id) ON DELETE CASCADE,
    start_ms INTEGER NOT NULL,
    end_ms INTEGER NOT NULL,
    clip_path TEXT NOT NULL,
    method TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_recording ON segments(recording_id);

CREATE TABLE IF NOT EXISTS segmentation_attempts (
    recording_id INTEGER NOT NULL REFERENCES recordings(id) ON DELETE CASCADE,
    method TEXT NOT NULL,
    status TEXT NOT NULL,
    threshold_db REAL,
    min_silence_ms INTEGER,
    span_count INTEGER,
    expected_count INTEGER NOT NULL,
    distance INTEGER,
    evaluated INTEGER,
    error TEXT,
    attempted_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (recording_id, method)
);
"#;

const RECORDING_COLUMNS: &str = "id, language_code, filename, kind, audio_url, wordlist_url, \
     entry_start, entry_end, year, sequence, additional_info, local_path, download_status, \
     size_bytes, download_error, wordlist_status";

const ENTRY_COLUMNS: &str =
    "id, recording_id, entry_number, position, ipa, gloss, orthography, sound, layout";

/// What the downloader learned about one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub status: DownloadStatus,
    pub local_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
}

/// One entry joined with its recording, language and (optional) segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub language_code: String,
    pub language_name: String,
    pub recording_id: i64,
    pub filename: String,
    pub local_path: Option<String>,
    pub range_start: Option<u32>,
    pub range_end: Option<u32>,
    pub entry_number: u32,
    pub ipa: Option<String>,
    pub gloss: Option<String>,
    pub orthography: Option<String>,
    pub segment: Option<ManifestClip>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestClip {
    pub clip_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub method: SegmentMethod,
}

/// Row counts for a quick look at how far the pipeline has come.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub languages: u64,
    pub recordings: u64,
    pub word_lists: u64,
    pub downloads: Vec<(DownloadStatus, u64)>,
    pub wordlists: Vec<(WordlistStatus, u64)>,
    pub entries: u64,
    pub segmented_entries: u64,
    pub failed_segmentations: u64,
}

impl fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn breakdown<S: fmt::Display>(pairs: &[(S, u64)]) -> String {
            if pairs.is_empty() {
                return "none".to_string();
            }
            pairs
                .iter()
                .map(|(status, n)| format!("{status} {n}"))
                .collect::<Vec<_>>()
                .join(", ")
        }

        writeln!(f, "languages:   {}", self.languages)?;
        writeln!(f, "recordings:  {} ({} word lists)", self.recordings, self.word_lists)?;
        writeln!(f, "downloads:   {}", breakdown(&self.downloads))?;
        writeln!(f, "word lists:  {}", breakdown(&self.wordlists))?;
        writeln!(f, "entries:     {} ({} segmented)", self.entries, self.segmented_entries)?;
        write!(f, "failed segmentations: {}", self.failed_segmentations)
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and if needed create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::configure(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        ",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Run `op` in an IMMEDIATE transaction, retrying while SQLite reports busy.
    fn write<T>(
        &mut self,
        mut op: impl FnMut(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match run_in_transaction(&mut self.conn, &mut op) {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) && attempt < WRITE_BUSY_RETRY_ATTEMPTS => {
                    attempt += 1;
                    let delay = WRITE_BUSY_BASE_BACKOFF_MS * u64::from(attempt);
                    tracing::debug!(attempt, delay_ms = delay, "store busy, retrying write");
                    thread::sleep(Duration::from_millis(delay));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // -- languages -----------------------------------------------------------

    pub fn upsert_language(&mut self, language: &Language) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO languages (code, name, url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(code) DO UPDATE SET name = excluded.name, url = excluded.url",
                params![language.code, language.name, language.url],
            )
        })?;
        Ok(())
    }

    /// All languages ordered by code, or just `scope` when given.
    pub fn languages(&self, scope: Option<&str>) -> Result<Vec<Language>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, url FROM languages
             WHERE ?1 IS NULL OR code = ?1 ORDER BY code",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok(Language {
                code: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // -- recordings ----------------------------------------------------------

    /// Insert or refresh a scraped recording. Download and word-list state are left alone.
    pub fn upsert_recording(
        &mut self,
        language_code: &str,
        desc: &RecordingDescriptor,
    ) -> Result<i64> {
        let kind = desc.kind();
        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO recordings (language_code, filename, kind, audio_url, wordlist_url,
                     entry_start, entry_end, year, sequence, additional_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(language_code, filename) DO UPDATE SET
                     kind = excluded.kind,
                     audio_url = excluded.audio_url,
                     wordlist_url = excluded.wordlist_url,
                     entry_start = excluded.entry_start,
                     entry_end = excluded.entry_end,
                     year = excluded.year,
                     sequence = excluded.sequence,
                     additional_info = excluded.additional_info",
                params![
                    language_code,
                    desc.filename,
                    kind,
                    desc.audio_url,
                    desc.wordlist_url,
                    desc.entry_start,
                    desc.entry_end,
                    desc.year,
                    desc.sequence,
                    desc.additional_info,
                ],
            )?;
            tx.query_row(
                "SELECT id FROM recordings WHERE language_code = ?1 AND filename = ?2",
                params![language_code, desc.filename],
                |row| row.get(0),
            )
        })?;
        Ok(id)
    }

    pub fn recording(&self, id: i64) -> Result<Option<Recording>> {
        let sql = format!("SELECT {RECORDING_COLUMNS} FROM recordings WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_recording)
            .optional()?)
    }

    /// Recordings ordered by language and filename, optionally for one language.
    pub fn recordings(&self, language: Option<&str>) -> Result<Vec<Recording>> {
        let sql = format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings
             WHERE ?1 IS NULL OR language_code = ?1
             ORDER BY language_code, filename"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![language], row_to_recording)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_wordlist_status(&mut self, recording_id: i64, status: WordlistStatus) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE recordings SET wordlist_status = ?2 WHERE id = ?1",
                params![recording_id, status],
            )
        })?;
        Ok(())
    }

    pub fn record_download(&mut self, recording_id: i64, record: &DownloadRecord) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE recordings SET
                     download_status = ?2,
                     local_path = COALESCE(?3, local_path),
                     size_bytes = COALESCE(?4, size_bytes),
                     download_error = ?5,
                     downloaded_at = CASE WHEN ?2 = 'complete' THEN datetime('now')
                                          ELSE downloaded_at END
                 WHERE id = ?1",
                params![
                    recording_id,
                    record.status,
                    record.local_path,
                    record.size_bytes.map(sql_int),
                    record.error,
                ],
            )
        })?;
        Ok(())
    }

    // -- entries -------------------------------------------------------------

    /// Upsert a recording's parsed entries in one transaction. Returns how many were written.
    pub fn upsert_entries(&mut self, recording_id: i64, entries: &[NewEntry]) -> Result<usize> {
        self.write(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO entries (recording_id, entry_number, position, ipa, gloss,
                     orthography, sound, layout)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(recording_id, entry_number) DO UPDATE SET
                     position = excluded.position,
                     ipa = excluded.ipa,
                     gloss = excluded.gloss,
                     orthography = excluded.orthography,
                     sound = excluded.sound,
                     layout = excluded.layout",
            )?;
            for entry in entries {
                stmt.execute(params![
                    recording_id,
                    entry.entry_number,
                    entry.position,
                    entry.ipa,
                    entry.gloss,
                    entry.orthography,
                    entry.sound,
                    entry.layout,
                ])?;
            }
            Ok(entries.len())
        })
    }

    /// Entries of one recording in ascending entry_number order.
    pub fn entries(&self, recording_id: i64) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE recording_id = ?1 ORDER BY entry_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![recording_id], |row| {
            Ok(Entry {
                id: row.get(0)?,
                recording_id: row.get(1)?,
                entry_number: row.get(2)?,
                position: row.get(3)?,
                ipa: row.get(4)?,
                gloss: row.get(5)?,
                orthography: row.get(6)?,
                sound: row.get(7)?,
                layout: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn entry_count(&self, recording_id: i64) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE recording_id = ?1",
            params![recording_id],
            |row| row.get(0),
        )?)
    }

    // -- segments ------------------------------------------------------------

    pub fn segment_count(&self, recording_id: i64) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM segments WHERE recording_id = ?1",
            params![recording_id],
            |row| row.get(0),
        )?)
    }

    pub fn segments(&self, recording_id: i64) -> Result<Vec<Segment>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.entry_id, s.recording_id, s.start_ms, s.end_ms, s.clip_path, s.method
             FROM segments s JOIN entries e ON e.id = s.entry_id
             WHERE s.recording_id = ?1 ORDER BY e.entry_number",
        )?;
        let rows = stmt.query_map(params![recording_id], |row| {
            Ok(Segment {
                id: row.get(0)?,
                entry_id: row.get(1)?,
                recording_id: row.get(2)?,
                start_ms: get_u64(row, 3)?,
                end_ms: get_u64(row, 4)?,
                clip_path: row.get(5)?,
                method: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Swap a recording's segments for a new set and record the attempt, atomically.
    ///
    /// Only segment rows are deleted; entries are untouched.
    pub fn replace_segments(
        &mut self,
        attempt: &SegmentationAttempt,
        segments: &[NewSegment],
    ) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM segments WHERE recording_id = ?1",
                params![attempt.recording_id],
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO segments (entry_id, recording_id, start_ms, end_ms, clip_path, method)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(entry_id) DO UPDATE SET
                     recording_id = excluded.recording_id,
                     start_ms = excluded.start_ms,
                     end_ms = excluded.end_ms,
                     clip_path = excluded.clip_path,
                     method = excluded.method",
            )?;
            for seg in segments {
                stmt.execute(params![
                    seg.entry_id,
                    attempt.recording_id,
                    sql_int(seg.start_ms),
                    sql_int(seg.end_ms),
                    seg.clip_path,
                    attempt.method,
                ])?;
            }
            upsert_attempt(tx, attempt)
        })
    }

    /// Record an attempt without touching segments (used for failures).
    pub fn record_attempt(&mut self, attempt: &SegmentationAttempt) -> Result<()> {
        self.write(|tx| upsert_attempt(tx, attempt))
    }

    pub fn attempt(
        &self,
        recording_id: i64,
        method: SegmentMethod,
    ) -> Result<Option<SegmentationAttempt>> {
        Ok(self
            .conn
            .query_row(
                "SELECT recording_id, method, status, threshold_db, min_silence_ms, span_count,
                     expected_count, distance, evaluated, error
                 FROM segmentation_attempts WHERE recording_id = ?1 AND method = ?2",
                params![recording_id, method],
                |row| {
                    Ok(SegmentationAttempt {
                        recording_id: row.get(0)?,
                        method: row.get(1)?,
                        status: row.get(2)?,
                        threshold_db: row.get(3)?,
                        min_silence_ms: row.get(4)?,
                        span_count: row.get(5)?,
                        expected_count: row.get(6)?,
                        distance: row.get(7)?,
                        evaluated: row.get(8)?,
                        error: row.get(9)?,
                    })
                },
            )
            .optional()?)
    }

    // -- export / reporting --------------------------------------------------

    /// Every entry joined with its recording, language and segment, in manifest order.
    pub fn manifest_rows(&self, language: Option<&str>) -> Result<Vec<ManifestRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.code, l.name, r.id, r.filename, r.local_path,
                 COALESCE(r.entry_start,
                     (SELECT MIN(entry_number) FROM entries WHERE recording_id = r.id)),
                 COALESCE(r.entry_end,
                     (SELECT MAX(entry_number) FROM entries WHERE recording_id = r.id)),
                 e.entry_number, e.ipa, e.gloss, e.orthography,
                 s.clip_path, s.start_ms, s.end_ms, s.method
             FROM entries e
             JOIN recordings r ON r.id = e.recording_id
             JOIN languages l ON l.code = r.language_code
             LEFT JOIN segments s ON s.entry_id = e.id
             WHERE ?1 IS NULL OR l.code = ?1
             ORDER BY l.code, r.filename, e.entry_number",
        )?;
        let rows = stmt.query_map(params![language], |row| {
            let clip_path: Option<String> = row.get(11)?;
            let segment = match clip_path {
                Some(clip_path) => Some(ManifestClip {
                    clip_path,
                    start_ms: get_u64(row, 12)?,
                    end_ms: get_u64(row, 13)?,
                    method: row.get(14)?,
                }),
                None => None,
            };
            Ok(ManifestRow {
                language_code: row.get(0)?,
                language_name: row.get(1)?,
                recording_id: row.get(2)?,
                filename: row.get(3)?,
                local_path: row.get(4)?,
                range_start: row.get(5)?,
                range_end: row.get(6)?,
                entry_number: row.get(7)?,
                ipa: row.get(8)?,
                gloss: row.get(9)?,
                orthography: row.get(10)?,
                segment,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn stats(&self, language: Option<&str>) -> Result<CorpusStats> {
        let count = |sql: &str| -> rusqlite::Result<u64> {
            self.conn.query_row(sql, params![language], |row| get_u64(row, 0))
        };

        let mut stats = CorpusStats {
            languages: count("SELECT COUNT(*) FROM languages WHERE ?1 IS NULL OR code = ?1")?,
            recordings: count(
                "SELECT COUNT(*) FROM recordings WHERE ?1 IS NULL OR language_code = ?1",
            )?,
            word_lists: count(
                "SELECT COUNT(*) FROM recordings
                 WHERE kind = 'word-list' AND (?1 IS NULL OR language_code = ?1)",
            )?,
            entries: count(
                "SELECT COUNT(*) FROM entries e JOIN recordings r ON r.id = e.recording_id
                 WHERE ?1 IS NULL OR r.language_code = ?1",
            )?,
            segmented_entries: count(
                "SELECT COUNT(*) FROM segments s JOIN recordings r ON r.id = s.recording_id
                 WHERE ?1 IS NULL OR r.language_code = ?1",
            )?,
            failed_segmentations: count(
                "SELECT COUNT(*) FROM segmentation_attempts a
                 JOIN recordings r ON r.id = a.recording_id
                 WHERE a.status = 'failed' AND (?1 IS NULL OR r.language_code = ?1)",
            )?,
            ..CorpusStats::default()
        };

        let mut stmt = self.conn.prepare(
            "SELECT download_status, COUNT(*) FROM recordings
             WHERE ?1 IS NULL OR language_code = ?1
             GROUP BY download_status ORDER BY download_status",
        )?;
        stats.downloads = stmt
            .query_map(params![language], |row| Ok((row.get(0)?, get_u64(row, 1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT wordlist_status, COUNT(*) FROM recordings
             WHERE kind = 'word-list' AND (?1 IS NULL OR language_code = ?1)
             GROUP BY wordlist_status ORDER BY wordlist_status",
        )?;
        stats.wordlists = stmt
            .query_map(params![language], |row| Ok((row.get(0)?, get_u64(row, 1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(stats)
    }
}

fn run_in_transaction<T>(
    conn: &mut Connection,
    op: &mut impl FnMut(&Transaction<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn upsert_attempt(tx: &Transaction<'_>, attempt: &SegmentationAttempt) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO segmentation_attempts (recording_id, method, status, threshold_db,
             min_silence_ms, span_count, expected_count, distance, evaluated, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(recording_id, method) DO UPDATE SET
             status = excluded.status,
             threshold_db = excluded.threshold_db,
             min_silence_ms = excluded.min_silence_ms,
             span_count = excluded.span_count,
             expected_count = excluded.expected_count,
             distance = excluded.distance,
             evaluated = excluded.evaluated,
             error = excluded.error,
             attempted_at = datetime('now')",
        params![
            attempt.recording_id,
            attempt.method,
            attempt.status,
            attempt.threshold_db,
            attempt.min_silence_ms,
            attempt.span_count,
            attempt.expected_count,
            attempt.distance,
            attempt.evaluated,
            attempt.error,
        ],
    )?;
    Ok(())
}

fn row_to_recording(row: &Row<'_>) -> rusqlite::Result<Recording> {
    Ok(Recording {
        id: row.get(0)?,
        language_code: row.get(1)?,
        filename: row.get(2)?,
        kind: row.get(3)?,
        audio_url: row.get(4)?,
        wordlist_url: row.get(5)?,
        entry_start: row.get(6)?,
        entry_end: row.get(7)?,
        year: row.get(8)?,
        sequence: row.get(9)?,
        additional_info: row.get(10)?,
        local_path: row.get(11)?,
        download_status: row.get(12)?,
        size_bytes: row
            .get::<_, Option<i64>>(13)?
            .map(|n| u64::try_from(n).unwrap_or(0)),
        download_error: row.get(14)?,
        wordlist_status: row.get(15)?,
    })
}

/// SQLite integers are signed; byte counts and offsets never approach `i64::MAX`.
fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    Ok(u64::try_from(value).unwrap_or(0))
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AttemptStatus, ColumnLayout};
    use tempfile::TempDir;

    fn setup_test_store() -> anyhow::Result<(Store, TempDir)> {
        let temp_dir = TempDir::new()?;
        let store = Store::open(&temp_dir.path().join("db").join("test.db"))?;
        Ok((store, temp_dir))
    }

    fn language(code: &str) -> Language {
        Language {
            code: code.to_string(),
            name: format!("Language {code}"),
            url: format!("https://archive.test/Language/{code}/{code}.html"),
        }
    }

    fn descriptor(filename: &str) -> RecordingDescriptor {
        RecordingDescriptor {
            filename: filename.to_string(),
            audio_url: Some(format!("https://archive.test/{filename}")),
            entry_start: Some(1),
            entry_end: Some(3),
            ..RecordingDescriptor::default()
        }
    }

    fn entry(n: u32, ipa: &str) -> NewEntry {
        NewEntry {
            entry_number: n,
            position: n - 1,
            ipa: Some(ipa.to_string()),
            gloss: Some(format!("gloss {n}")),
            orthography: None,
            sound: None,
            layout: ColumnLayout::Header,
        }
    }

    fn attempt(recording_id: i64, status: AttemptStatus) -> SegmentationAttempt {
        SegmentationAttempt {
            recording_id,
            method: SegmentMethod::Reference,
            status,
            threshold_db: Some(-45.0),
            min_silence_ms: Some(300),
            span_count: Some(2),
            expected_count: 3,
            distance: Some(1),
            evaluated: Some(1),
            error: None,
        }
    }

    #[test]
    fn fresh_store_is_empty() -> anyhow::Result<()> {
        let (store, _temp) = setup_test_store()?;
        assert!(store.languages(None)?.is_empty());
        assert_eq!(store.stats(None)?, CorpusStats::default());
        Ok(())
    }

    #[test]
    fn stats_render_status_breakdowns() {
        let stats = CorpusStats {
            languages: 1,
            recordings: 2,
            word_lists: 1,
            downloads: vec![(DownloadStatus::Complete, 1), (DownloadStatus::Pending, 1)],
            entries: 3,
            ..CorpusStats::default()
        };
        let text = stats.to_string();
        assert!(text.contains("recordings:  2 (1 word lists)"));
        assert!(text.contains("downloads:   complete 1, pending 1"));
        assert!(text.contains("word lists:  none"));
    }

    #[test]
    fn recording_upsert_is_keyed_by_language_and_filename() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ABQ"))?;

        let first = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;
        let mut changed = descriptor("abq_word-list_1992_01.wav");
        changed.entry_end = Some(40);
        let second = store.upsert_recording("ABQ", &changed)?;

        assert_eq!(first, second);
        let recs = store.recordings(Some("ABQ"))?;
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].entry_end, Some(40));
        assert_eq!(recs[0].kind, crate::records::RecordingKind::WordList);
        Ok(())
    }

    #[test]
    fn rescrape_keeps_download_state() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ABQ"))?;
        let id = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;
        store.record_download(
            id,
            &DownloadRecord {
                status: DownloadStatus::Complete,
                local_path: Some("data/audio/ABQ/abq_word-list_1992_01.wav".into()),
                size_bytes: Some(1234),
                error: None,
            },
        )?;

        store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;
        let rec = store.recording(id)?.expect("recording exists");
        assert_eq!(rec.download_status, DownloadStatus::Complete);
        assert_eq!(rec.size_bytes, Some(1234));
        Ok(())
    }

    #[test]
    fn recording_requires_existing_language() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        let result = store.upsert_recording("NOPE", &descriptor("x_word-list_2000_01.wav"));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn entries_upsert_without_duplicates() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ABQ"))?;
        let id = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;

        store.upsert_entries(id, &[entry(1, "a"), entry(2, "b")])?;
        store.upsert_entries(id, &[entry(1, "a"), entry(2, "bː")])?;

        let entries = store.entries(id)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].ipa.as_deref(), Some("bː"));
        Ok(())
    }

    #[test]
    fn replacing_segments_keeps_entries() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ABQ"))?;
        let id = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;
        store.upsert_entries(id, &[entry(1, "a"), entry(2, "b"), entry(3, "c")])?;
        let entries = store.entries(id)?;

        let clips: Vec<NewSegment> = entries
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, e)| NewSegment {
                entry_id: e.id,
                start_ms: i as u64 * 1000,
                end_ms: i as u64 * 1000 + 500,
                clip_path: format!("clip_{i}.wav"),
            })
            .collect();
        store.replace_segments(&attempt(id, AttemptStatus::Succeeded), &clips)?;
        assert_eq!(store.segment_count(id)?, 2);

        store.replace_segments(&attempt(id, AttemptStatus::Succeeded), &clips[..1])?;
        assert_eq!(store.segment_count(id)?, 1);
        assert_eq!(store.entry_count(id)?, 3);

        let recorded = store
            .attempt(id, SegmentMethod::Reference)?
            .expect("attempt recorded");
        assert!(recorded.status.is_success());
        assert_eq!(recorded.threshold_db, Some(-45.0));
        Ok(())
    }

    #[test]
    fn one_attempt_row_per_method() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ABQ"))?;
        let id = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;

        let mut failed = attempt(id, AttemptStatus::Failed);
        failed.error = Some("truncated".into());
        store.record_attempt(&failed)?;
        store.record_attempt(&attempt(id, AttemptStatus::Succeeded))?;

        let rows: u32 = store.conn.query_row(
            "SELECT COUNT(*) FROM segmentation_attempts WHERE recording_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        assert_eq!(rows, 1);
        Ok(())
    }

    #[test]
    fn manifest_rows_follow_language_recording_entry_order() -> anyhow::Result<()> {
        let (mut store, _temp) = setup_test_store()?;
        store.upsert_language(&language("ZUL"))?;
        store.upsert_language(&language("ABQ"))?;
        let z = store.upsert_recording("ZUL", &descriptor("zul_word-list_1980_01.wav"))?;
        let b = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_02.wav"))?;
        let a = store.upsert_recording("ABQ", &descriptor("abq_word-list_1992_01.wav"))?;
        store.upsert_entries(z, &[entry(1, "z")])?;
        store.upsert_entries(b, &[entry(2, "b2"), entry(1, "b1")])?;
        store.upsert_entries(a, &[entry(1, "a1")])?;

        let order: Vec<(String, String, u32)> = store
            .manifest_rows(None)?
            .into_iter()
            .map(|r| (r.language_code, r.filename, r.entry_number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("ABQ".into(), "abq_word-list_1992_01.wav".into(), 1),
                ("ABQ".into(), "abq_word-list_1992_02.wav".into(), 1),
                ("ABQ".into(), "abq_word-list_1992_02.wav".into(), 2),
                ("ZUL".into(), "zul_word-list_1980_01.wav".into(), 1),
            ]
        );
        assert_eq!(store.manifest_rows(Some("ZUL"))?.len(), 1);
        Ok(())
    }
}
