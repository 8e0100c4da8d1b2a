//! Append-only CSV table of scanned bills.
//!
//! The table is the system of record: one row per successfully scanned bill,
//! columns in [`BillRecord`] field order, header written when the file is
//! first created. Appends are atomic at the file level. Each append copies
//! the current table into a temp file in the same directory, writes the new
//! row there, and renames the temp file over the table. A crash mid-append
//! leaves either the old table or the new one on disk, never a torn row.
//!
//! A process-wide [`BillTable`] handle serialises writers through an internal
//! mutex; share one handle (behind `Arc`) rather than constructing a table
//! per request. Concurrent writers from *separate processes* are not
//! coordinated beyond the rename being atomic.

use crate::error::ScanError;
use crate::record::BillRecord;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Handle to the on-disk bill table.
pub struct BillTable {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl BillTable {
    /// Create a handle for the table at `path`. The file itself is created
    /// lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the table (and its parent directories)
    /// if needed.
    pub fn append(&self, record: &BillRecord) -> Result<(), ScanError> {
        // A poisoned lock only means a previous writer panicked after its
        // rename or before touching anything; the table on disk is intact
        // either way.
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
                parent
            }
            _ => Path::new("."),
        };

        let mut staged = tempfile::Builder::new()
            .prefix(".bills")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| self.write_error(e))?;

        let exists = self.path.exists();
        if exists {
            let mut current = File::open(&self.path).map_err(|e| self.write_error(e))?;
            io::copy(&mut current, staged.as_file_mut()).map_err(|e| self.write_error(e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!exists)
            .from_writer(staged.as_file_mut());
        writer.serialize(record).map_err(|e| self.write_error(e))?;
        writer.flush().map_err(|e| self.write_error(e))?;
        drop(writer);

        staged.persist(&self.path).map_err(|e| self.write_error(e))?;
        debug!("Appended bill row to {}", self.path.display());
        Ok(())
    }

    fn write_error(&self, detail: impl ToString) -> ScanError {
        ScanError::StoreWriteFailed {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }
}

impl std::fmt::Debug for BillTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillTable")
            .field("path", &self.path)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BillFields;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn sample(company: &str) -> BillRecord {
        BillFields {
            company_name: company.into(),
            address: "12 High St".into(),
            subtotal: "$40.00".into(),
            total_amount: "$44.80".into(),
        }
        .into_record("Utilities", NaiveDate::from_ymd_opt(2024, 8, 23).unwrap())
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let table = BillTable::new(dir.path().join("bills.csv"));
        table.append(&sample("First Corp")).unwrap();
        table.append(&sample("Second Corp")).unwrap();

        let contents = std::fs::read_to_string(table.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "company_name,address,subtotal,total_amount,category,Scanned_on"
        );
        assert_eq!(lines.len(), 3, "got: {contents}");
        assert!(lines[1].starts_with("First Corp,"));
        assert!(lines[2].starts_with("Second Corp,"));
    }

    #[test]
    fn append_preserves_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = BillTable::new(dir.path().join("bills.csv"));
        table.append(&sample("Alpha")).unwrap();
        let before = std::fs::read(table.path()).unwrap();

        table.append(&sample("Beta")).unwrap();
        let after = std::fs::read(table.path()).unwrap();
        assert!(after.starts_with(&before), "append must not rewrite old rows");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let table = BillTable::new(dir.path().join("data").join("nested").join("bills.csv"));
        table.append(&sample("Acme")).unwrap();
        assert!(table.path().is_file());
    }

    #[test]
    fn commas_in_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let table = BillTable::new(dir.path().join("bills.csv"));
        let record = BillFields {
            company_name: "Acme Corp".into(),
            address: "123 Main St, Springfield".into(),
            subtotal: "1,000.00".into(),
            total_amount: "1,100.00".into(),
        }
        .into_record("Office", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        table.append(&record).unwrap();

        let mut reader = csv::Reader::from_path(table.path()).unwrap();
        let rows: Vec<BillRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "123 Main St, Springfield");
        assert_eq!(rows[0].subtotal, "1,000.00");
    }

    #[test]
    fn concurrent_appends_keep_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(BillTable::new(dir.path().join("bills.csv")));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for i in 0..5 {
                    table.append(&sample(&format!("Worker {worker} bill {i}"))).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut reader = csv::Reader::from_path(table.path()).unwrap();
        let rows: Vec<BillRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 40);
    }

    #[test]
    fn write_failure_names_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let table = BillTable::new(blocker.join("bills.csv"));
        let err = table.append(&sample("Acme")).unwrap_err();
        match err {
            ScanError::StoreWriteFailed { ref path, .. } => {
                assert!(path.ends_with("bills.csv"), "got: {}", path.display());
            }
            other => panic!("expected StoreWriteFailed, got: {other:?}"),
        }
    }
}
