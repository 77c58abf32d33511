use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use csv::{Terminator, WriterBuilder};
use regex::Regex;
use tracing::{info, warn};

use crate::assemble::ReviewRow;
use crate::error::ScrapeError;
use crate::item::Bucket;

pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(5);

static UNSAFE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Identity of one record store: a (bucket, item) pair within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub bucket: Bucket,
    pub item_name: String,
    pub run_id: String,
}

impl StoreKey {
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.csv",
            self.bucket,
            sanitize_item_name(&self.item_name),
            self.run_id
        )
    }
}

/// Item name as it appears in store file names.
pub fn sanitize_item_name(name: &str) -> Cow<'_, str> {
    UNSAFE_NAME_RE.replace_all(name, "_")
}

/// Append-only CSV stores, one file per (bucket, item, run).
pub struct CsvSink {
    dir: PathBuf,
    run_id: String,
    retry_cooldown: Duration,
    headers_written: HashSet<PathBuf>,
    /// Raw item name that first used each store path.
    owners: HashMap<PathBuf, String>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>, run_id: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            run_id: run_id.into(),
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            headers_written: HashSet::new(),
            owners: HashMap::new(),
        })
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    pub fn key(&self, bucket: Bucket, item_name: &str) -> StoreKey {
        StoreKey {
            bucket,
            item_name: item_name.to_string(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn path(&self, bucket: Bucket, item_name: &str) -> PathBuf {
        self.dir.join(self.key(bucket, item_name).file_name())
    }

    /// Resolve the store path, refusing one already used by another item.
    fn claim(&mut self, bucket: Bucket, item_name: &str) -> Result<PathBuf, ScrapeError> {
        let path = self.path(bucket, item_name);
        let owner = self
            .owners
            .entry(path.clone())
            .or_insert_with(|| item_name.to_string());
        if owner.as_str() != item_name {
            return Err(ScrapeError::StoreCollision {
                path,
                first: owner.clone(),
                second: item_name.to_string(),
            });
        }
        Ok(path)
    }

    /// Start the store with its header row. Later calls for the same store
    /// are no-ops. Returns whether the header was written.
    pub fn ensure_header(
        &mut self,
        bucket: Bucket,
        item_name: &str,
        columns: &[&str],
    ) -> Result<bool, ScrapeError> {
        let path = self.claim(bucket, item_name)?;
        if self.headers_written.contains(&path) {
            return Ok(false);
        }
        write_records(File::create(&path), std::iter::once(columns.to_vec())).map_err(
            |source| ScrapeError::WriteFailure {
                path: path.clone(),
                source,
            },
        )?;
        self.headers_written.insert(path);
        Ok(true)
    }

    /// Append rows to the store, retrying once after the cooldown.
    pub async fn append(
        &mut self,
        bucket: Bucket,
        item_name: &str,
        rows: &[ReviewRow],
    ) -> Result<usize, ScrapeError> {
        let path = self.claim(bucket, item_name)?;
        retry_once(&path, self.retry_cooldown, || append_rows(&path, rows)).await?;
        info!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(rows.len())
    }
}

fn append_rows(path: &Path, rows: &[ReviewRow]) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path);
    write_records(file, rows.iter().map(ReviewRow::to_record))
}

fn write_records<I, R>(file: io::Result<File>, records: I) -> io::Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file?);
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()
}

/// Run `op`, and if it fails, wait `cooldown` and run it once more.
pub async fn retry_once<T, F>(path: &Path, cooldown: Duration, mut op: F) -> Result<T, ScrapeError>
where
    F: FnMut() -> io::Result<T>,
{
    match op() {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(
                "Failed to write {} ({}), retrying in {:.1}s",
                path.display(),
                e,
                cooldown.as_secs_f64()
            );
            tokio::time::sleep(cooldown).await;
            op().map_err(|source| ScrapeError::WriteFailure {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{ItemConstants, COLUMN_NAMES};

    fn row(name: &str) -> ReviewRow {
        ReviewRow {
            item: ItemConstants {
                name: "Echo_4th_Gen".into(),
                base_price: Some(61.76),
                config_price: None,
                bundle_price: None,
            },
            name: Some(name.into()),
            stars: Some("4.0 out of 5 stars".into()),
            date: None,
            title: Some("Nice, loud".into()),
            body: None,
            helpful: None,
            variant: None,
        }
    }

    #[test]
    fn file_name_is_deterministic_and_safe() {
        let key = StoreKey {
            bucket: Bucket::Critical,
            item_name: "Echo Dot/5th Gen".into(),
            run_id: "20230430211235".into(),
        };
        assert_eq!(key.file_name(), "critical_Echo_Dot_5th_Gen_20230430211235.csv");
    }

    #[tokio::test]
    async fn header_written_once_then_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "20240101000000").unwrap();

        assert!(sink.ensure_header(Bucket::General, "Echo_4th_Gen", &COLUMN_NAMES).unwrap());
        assert!(!sink.ensure_header(Bucket::General, "Echo_4th_Gen", &COLUMN_NAMES).unwrap());
        sink.append(Bucket::General, "Echo_4th_Gen", &[row("Ana")]).await.unwrap();
        sink.append(Bucket::General, "Echo_4th_Gen", &[row("Bo"), row("Cy")]).await.unwrap();

        let written = std::fs::read_to_string(sink.path(Bucket::General, "Echo_4th_Gen")).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], COLUMN_NAMES.join(","));
        assert_eq!(lines[1], "Echo_4th_Gen,61.76,,,Ana,4.0 out of 5 stars,,\"Nice, loud\",,,");
        assert_eq!(written.matches("product_name").count(), 1);
    }

    #[tokio::test]
    async fn append_without_header_never_adds_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "run").unwrap();
        sink.append(Bucket::Positive, "Echo", &[row("Ana")]).await.unwrap();
        sink.append(Bucket::Positive, "Echo", &[row("Bo")]).await.unwrap();

        let written = std::fs::read_to_string(sink.path(Bucket::Positive, "Echo")).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(!written.contains("product_name"));
    }

    #[tokio::test]
    async fn stores_are_separate_per_bucket_and_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = CsvSink::new(dir.path(), "run1").unwrap();
        let mut second = CsvSink::new(dir.path(), "run2").unwrap();
        first.append(Bucket::Critical, "Echo", &[row("Ana")]).await.unwrap();
        first.append(Bucket::Positive, "Echo", &[row("Bo")]).await.unwrap();
        second.append(Bucket::Critical, "Echo", &[row("Cy")]).await.unwrap();

        assert_ne!(first.path(Bucket::Critical, "Echo"), second.path(Bucket::Critical, "Echo"));
        let critical = std::fs::read_to_string(first.path(Bucket::Critical, "Echo")).unwrap();
        assert_eq!(critical.lines().count(), 1);
        assert!(critical.contains("Ana"));
    }

    #[tokio::test]
    async fn items_sharing_a_file_name_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "run").unwrap();
        assert_eq!(sink.path(Bucket::Critical, "Echo Dot"), sink.path(Bucket::Critical, "Echo/Dot"));

        sink.ensure_header(Bucket::Critical, "Echo Dot", &COLUMN_NAMES).unwrap();
        sink.append(Bucket::Critical, "Echo Dot", &[row("Ana")]).await.unwrap();

        let err = sink.ensure_header(Bucket::Critical, "Echo/Dot", &COLUMN_NAMES).unwrap_err();
        assert!(matches!(err, ScrapeError::StoreCollision { ref first, ref second, .. }
            if first == "Echo Dot" && second == "Echo/Dot"));
        let err = sink.append(Bucket::Critical, "Echo/Dot", &[row("Bo")]).await.unwrap_err();
        assert!(matches!(err, ScrapeError::StoreCollision { .. }));

        let written = std::fs::read_to_string(sink.path(Bucket::Critical, "Echo Dot")).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("Ana"));
        assert!(!written.contains("Bo"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_once_recovers_from_single_failure() {
        let mut calls = 0;
        let result = retry_once(Path::new("x.csv"), Duration::from_secs(5), || {
            calls += 1;
            if calls == 1 {
                Err(io::Error::other("disk busy"))
            } else {
                Ok(calls)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_write_failure() {
        let mut calls = 0;
        let result: Result<(), _> = retry_once(Path::new("x.csv"), Duration::from_secs(5), || {
            calls += 1;
            Err(io::Error::other("disk gone"))
        })
        .await;
        assert_eq!(calls, 2);
        assert!(matches!(result, Err(ScrapeError::WriteFailure { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn append_to_missing_directory_fails_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path().join("out"), "run").unwrap();
        std::fs::remove_dir(dir.path().join("out")).unwrap();

        let err = sink.append(Bucket::General, "Echo", &[row("Ana")]).await.unwrap_err();
        assert!(matches!(err, ScrapeError::WriteFailure { .. }));
    }
}
