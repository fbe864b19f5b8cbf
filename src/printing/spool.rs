//! Spool-directory printer
//!
//! Each tag becomes `<bundle_no>-<unix_millis>.json` in the spool directory,
//! written under a temporary name and renamed so the print agent never sees
//! a half-written job.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::LabelPrinter;
use crate::types::PrintData;

pub struct SpoolPrinter {
    spool_dir: PathBuf,
}

impl SpoolPrinter {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }
}

fn job_name(data: &PrintData) -> String {
    let safe: String = data
        .bundle_no
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}", safe, Utc::now().timestamp_millis())
}

#[async_trait]
impl LabelPrinter for SpoolPrinter {
    async fn print_tag(&self, data: &PrintData) -> Result<bool> {
        tokio::fs::create_dir_all(&self.spool_dir)
            .await
            .with_context(|| format!("Failed to create spool dir {}", self.spool_dir.display()))?;

        let name = job_name(data);
        let tmp = self.spool_dir.join(format!(".{name}.tmp"));
        let job = self.spool_dir.join(format!("{name}.json"));

        let body = serde_json::to_vec_pretty(data).context("Failed to serialize tag")?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write spool job {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &job)
            .await
            .context("Failed to publish spool job")?;

        tracing::info!(bundle_no = %data.bundle_no, job = %job.display(), "Tag spooled");
        Ok(true)
    }

    fn printer_name(&self) -> &'static str {
        "spool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Classification;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_spool_writes_one_job_per_tag() {
        let dir = tempdir().unwrap();
        let printer = SpoolPrinter::new(dir.path().join("spool"));
        let data = PrintData {
            classification: Classification::Passed,
            bundle_no: "261OK0001".into(),
            batch_no: "W1_2610001".into(),
            piece_count: 13,
            order_no: "W1".into(),
            pipe_grade: "X52".into(),
            pipe_size: "4.5".into(),
            pipe_length: "12m".into(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            is_reprint: false,
        };

        assert!(printer.print_tag(&data).await.unwrap());

        let jobs: Vec<_> = std::fs::read_dir(dir.path().join("spool"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].starts_with("261OK0001-") && jobs[0].ends_with(".json"));

        let stored: PrintData = serde_json::from_slice(
            &std::fs::read(dir.path().join("spool").join(&jobs[0])).unwrap(),
        )
        .unwrap();
        assert_eq!(stored.piece_count, 13);
    }
}
