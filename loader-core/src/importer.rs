//! The bulk importer seam: turns a decompressed chunk's raw
//! bytes into however many `LOAD DATA`-style statements (or native bulk
//! API calls) the session needs. Separated from `SqlSession` because a
//! chunk may need to be split into sub-batches the driver can't swallow
//! whole, independent of how the connection itself is opened.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::session::SqlSession;
use loader_types::{LoaderError, Result};

/// Imports one chunk's bytes into a table over an already-open session.
/// Returns the number of raw (uncompressed) bytes actually applied, used
/// to update progress and the scheduler's in-flight accounting.
///
/// `hard_interrupt` is checked between row batches and honored promptly:
/// on a second interrupt signal, implementations stop and return
/// `Err(LoaderError::Interrupted)` rather than finishing the chunk. Rows
/// already applied stay applied — a resumed load reissues the whole
/// chunk with duplicate-row-replace semantics, so the partial work isn't
/// wasted, just redone.
pub trait BulkImporter: Send + Sync {
    fn import(&self, session: &mut dyn SqlSession, schema: &str, table: &str, data: &[u8], hard_interrupt: &AtomicBool) -> Result<u64>;
}

/// Reference importer for dumps whose rows are newline-terminated,
/// tab-separated records — the default row format this loader targets.
/// Delegates to the session's own bulk-load call, in batches of
/// [`Self::BATCH_LINES`] rows rather than one call for the whole chunk,
/// so a hard interrupt doesn't have to wait out a multi-gigabyte
/// `LOAD DATA` before taking effect.
pub struct LineDelimitedImporter;

impl LineDelimitedImporter {
    const BATCH_LINES: usize = 5_000;
}

impl BulkImporter for LineDelimitedImporter {
    fn import(&self, session: &mut dyn SqlSession, schema: &str, table: &str, data: &[u8], hard_interrupt: &AtomicBool) -> Result<u64> {
        let mut total = 0u64;
        let mut start = 0usize;
        let mut lines_in_batch = 0usize;

        for i in 0..data.len() {
            if data[i] != b'\n' {
                continue;
            }
            lines_in_batch += 1;
            if lines_in_batch < Self::BATCH_LINES {
                continue;
            }
            if hard_interrupt.load(Ordering::SeqCst) {
                return Err(LoaderError::Interrupted);
            }
            total += session.bulk_load(schema, table, &data[start..=i])?;
            start = i + 1;
            lines_in_batch = 0;
        }

        if start < data.len() {
            if hard_interrupt.load(Ordering::SeqCst) {
                return Err(LoaderError::Interrupted);
            }
            total += session.bulk_load(schema, table, &data[start..])?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Row;

    struct FakeSession {
        received: Vec<(String, String, Vec<u8>)>,
    }

    impl SqlSession for FakeSession {
        fn execute(&mut self, _statement: &str) -> Result<()> {
            Ok(())
        }

        fn query(&mut self, _statement: &str) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn bulk_load(&mut self, schema: &str, table: &str, data: &[u8]) -> Result<u64> {
            self.received.push((schema.to_string(), table.to_string(), data.to_vec()));
            Ok(data.len() as u64)
        }
    }

    #[test]
    fn line_delimited_importer_forwards_to_bulk_load() {
        let importer = LineDelimitedImporter;
        let mut session = FakeSession { received: Vec::new() };
        let flag = AtomicBool::new(false);
        let n = importer.import(&mut session, "shop", "orders", b"1\tabc\n2\tdef\n", &flag).unwrap();
        assert_eq!(n, 12);
        assert_eq!(session.received.len(), 1);
        assert_eq!(session.received[0].0, "shop");
    }

    #[test]
    fn batches_at_the_configured_line_count() {
        let importer = LineDelimitedImporter;
        let mut session = FakeSession { received: Vec::new() };
        let flag = AtomicBool::new(false);
        let mut data = Vec::new();
        for _ in 0..(LineDelimitedImporter::BATCH_LINES + 1) {
            data.extend_from_slice(b"1\tabc\n");
        }
        importer.import(&mut session, "shop", "orders", &data, &flag).unwrap();
        assert_eq!(session.received.len(), 2);
    }

    #[test]
    fn hard_interrupt_stops_before_the_next_batch() {
        let importer = LineDelimitedImporter;
        let mut session = FakeSession { received: Vec::new() };
        let flag = AtomicBool::new(true);
        let mut data = Vec::new();
        for _ in 0..(LineDelimitedImporter::BATCH_LINES + 1) {
            data.extend_from_slice(b"1\tabc\n");
        }
        let err = importer.import(&mut session, "shop", "orders", &data, &flag).unwrap_err();
        assert!(matches!(err, LoaderError::Interrupted));
        assert!(session.received.is_empty());
    }
}
