//! Load the per-symbol CSV archive back into the bars table.

use serde::Serialize;
use thiserror::Error;
use trendscan_core::data::{ArchiveError, BarArchive};

use crate::store::{BarStore, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub files: usize,
    pub rows_read: usize,
    pub rows_inserted: usize,
}

/// Import every archive file, one transaction per file. Rows already stored are kept.
pub fn import_archive(archive: &BarArchive, store: &mut dyn BarStore) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    for (exchange, path) in archive.files()? {
        let bars = archive.read_file(&exchange, &path)?;
        report.files += 1;
        report.rows_read += bars.len();
        let inserted = store.upsert_bars(&bars)?;
        report.rows_inserted += inserted;
        tracing::debug!(path = %path.display(), rows = bars.len(), inserted, "archive file imported");
    }
    tracing::info!(
        files = report.files,
        read = report.rows_read,
        inserted = report.rows_inserted,
        "archive import finished"
    );
    Ok(report)
}
