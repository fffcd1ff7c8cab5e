//! JSON run report.
//!
//! The report records what each stage saw: per-source outcomes, counts at
//! every filter, the ranked articles with their verdicts, entity groups and
//! how the digest was produced. It is meant for operators checking why an
//! article did or did not make it into the day's digest.

use crate::models::{Digest, RunReport};
use crate::utils::ensure_writable_dir;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Serialize)]
struct ReportFile<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    digest: &'a str,
    delivered: bool,
}

/// Write the run report to `{report_dir}/{date}.json` and return the path.
///
/// # Arguments
///
/// * `report` - The run report; its date names the file.
/// * `digest` - The digest whose text is stored next to the report.
/// * `delivered` - Whether delivery succeeded.
/// * `report_dir` - Target directory, created when missing.
///
/// # Returns
///
/// The path of the written file. A second run on the same day overwrites it.
///
/// # Examples
///
/// ```ignore
/// let path = write_report(&report, &digest, true, "./reports").await?;
/// assert!(path.ends_with(format!("{}.json", report.date)));
/// ```
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_report(
    report: &RunReport,
    digest: &Digest,
    delivered: bool,
    report_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(&ReportFile {
        report,
        digest: digest.text(),
        delivered,
    })?;

    if let Err(e) = ensure_writable_dir(report_dir).await {
        error!(error = %e, "Report directory is not writable");
        return Err(e);
    }

    let path = PathBuf::from(report_dir).join(format!("{}.json", report.date));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}
