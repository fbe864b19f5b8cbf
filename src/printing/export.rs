use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::BundleExporter;
use crate::types::PrintData;

/// Appends each printed tag as one JSON line
pub struct JsonlExporter {
    path: PathBuf,
}

impl JsonlExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BundleExporter for JsonlExporter {
    async fn export(&self, data: &PrintData) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let mut line = serde_json::to_vec(data).context("Failed to serialize export row")?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open export file {}", self.path.display()))?;
        file.write_all(&line).await.context("Failed to append export row")?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Classification;
    use chrono::Utc;
    use tempfile::tempdir;

    fn tag(bundle_no: &str) -> PrintData {
        PrintData {
            classification: Classification::Ndt,
            bundle_no: bundle_no.into(),
            batch_no: "W2_001".into(),
            piece_count: 4,
            order_no: "W2".into(),
            pipe_grade: String::new(),
            pipe_size: String::new(),
            pipe_length: String::new(),
            start_time: Utc::now(),
            end_time: None,
            is_reprint: true,
        }
    }

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("bundles.jsonl");
        let exporter = JsonlExporter::new(&path);

        exporter.export(&tag("W2NDT001")).await.unwrap();
        exporter.export(&tag("W2NDT002")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<PrintData> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].bundle_no, "W2NDT002");
        assert!(rows[0].is_reprint);
    }
}
