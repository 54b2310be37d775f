use log::{error, info, warn};
use serde::Serialize;
use std::future::Future;

use crate::Result;

/// What a run could not do; nothing here makes the run itself fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// `(table, error)` for every captured per-table failure.
    pub failed: Vec<(String, String)>,
    /// Tables with no artifact to restore.
    pub missing: Vec<String>,
    /// Tables the active manifest transaction already covered.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn skip(&mut self, table: String) {
        if !self.skipped.contains(&table) {
            self.skipped.push(table);
        }
    }

    pub fn missing(&mut self, table: String) {
        if !self.missing.contains(&table) {
            self.missing.push(table);
        }
    }

    pub fn log_summary(&self) {
        if !self.skipped.is_empty() {
            info!(
                "Skipped {} table(s) already in the manifest: {}",
                self.skipped.len(),
                self.skipped.join(", ")
            );
        }
        if !self.missing.is_empty() {
            warn!(
                "No backup found for {} table(s): {}",
                self.missing.len(),
                self.missing.join(", ")
            );
        }
        if !self.failed.is_empty() {
            let tables: Vec<&str> = self.failed.iter().map(|(t, _)| t.as_str()).collect();
            warn!(
                "{} table(s) failed: {}",
                self.failed.len(),
                tables.join(", ")
            );
        }
    }
}

/// Runs one table's step; failures abort the run only when `strict` is set.
///
/// Otherwise the error is logged and recorded in `report` and the caller moves
/// on to the next table.
pub async fn capture_failures<F>(
    strict: bool,
    table: &str,
    report: &mut RunReport,
    step: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match step.await {
        Ok(()) => Ok(()),
        Err(e) if strict => Err(e),
        Err(e) => {
            error!("Failed on {table}: {e}");
            report.failed.push((table.to_string(), e.to_string()));
            Ok(())
        }
    }
}
