//! JSON report output.
//!
//! One file per harvested keyword, grouped by the local date of the run:
//! `{output_dir}/{YYYY-MM-DD}/{keyword-slug}.json`. A second run for the
//! same keyword on the same day overwrites the earlier file.

use crate::extract::Gap;
use crate::fetch::SkippedUrl;
use crate::models::{Record, Theme};
use crate::pipeline::HarvestReport;
use crate::utils::slugify;
use chrono::{Local, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// The document written to disk.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub theme: Theme,
    pub keyword: &'a str,
    pub generated_at: String,
    pub passes: usize,
    pub records: &'a [Record],
    pub skipped: &'a [SkippedUrl],
    pub gaps: &'a [Gap],
}

/// Path of the report for `keyword` on `date`.
pub fn report_path(output_dir: &Path, date: NaiveDate, keyword: &str) -> PathBuf {
    let slug = slugify(keyword);
    let stem = if slug.is_empty() { "batch" } else { slug.as_str() };
    output_dir
        .join(date.to_string())
        .join(format!("{stem}.json"))
}

/// Write the records and report of one harvest. Returns the file written.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %keyword))]
pub async fn write_report(
    output_dir: &Path,
    theme: Theme,
    keyword: &str,
    records: &[Record],
    report: &HarvestReport,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = report_path(output_dir, Local::now().date_naive(), keyword);
    let document = ReportDocument {
        theme,
        keyword,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        passes: report.batch.passes,
        records,
        skipped: &report.batch.skipped,
        gaps: &report.gaps,
    };
    let json = serde_json::to_string_pretty(&document)?;

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(
        path = %path.display(),
        records = records.len(),
        skipped = report.batch.skipped.len(),
        "Wrote JSON report"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{BatchReport, SkipReason};
    use crate::models::Publisher;

    #[test]
    fn test_report_path() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        assert_eq!(
            report_path(Path::new("/out"), date, "Used Cooking Oil"),
            PathBuf::from("/out/2025-05-06/used-cooking-oil.json")
        );
        assert_eq!(
            report_path(Path::new("/out"), date, "???"),
            PathBuf::from("/out/2025-05-06/batch.json")
        );
    }

    #[tokio::test]
    async fn test_write_report_serializes_nulls_and_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![Record {
            publisher: Publisher::Fastmarkets,
            url: "https://www.fastmarkets.com/a".to_string(),
            theme: Theme::Supply,
            keyword: "tallow".to_string(),
            title: Some("Price Up".to_string()),
            date: None,
            author: None,
            content: None,
        }];
        let report = HarvestReport {
            batch: BatchReport {
                processed: 1,
                passes: 3,
                attempts: Vec::new(),
                skipped: vec![SkippedUrl {
                    url: "https://www.fastmarkets.com/b".to_string(),
                    reason: SkipReason::RetriesExhausted {
                        passes: 3,
                        last_error: "timed out fetching https://www.fastmarkets.com/b".to_string(),
                    },
                }],
            },
            gaps: Vec::new(),
        };

        let path = write_report(tmp.path(), Theme::Supply, "tallow", &records, &report)
            .await
            .unwrap();
        assert!(path.ends_with("tallow.json"));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["theme"], "supply");
        assert_eq!(written["records"][0]["title"], "Price Up");
        assert!(written["records"][0]["author"].is_null());
        assert_eq!(written["skipped"][0]["reason"], "retries_exhausted");
        assert_eq!(written["skipped"][0]["passes"], 3);
    }
}
