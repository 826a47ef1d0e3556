//! Ordered result sinks.
//!
//! Results arrive in input order and are written as they come; each sink
//! flushes on [`ResultSink::finish`].

use crate::crawl::CrawlResult;
use crate::error::Result;
use crate::profile::SiteProfile;
use chrono::Utc;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Destination for crawl results.
pub trait ResultSink {
    fn write(&mut self, result: &CrawlResult) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// CSV with a fixed header: target, link, then one column per field.
///
/// Failed results keep only the target; every later column is empty.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    fields: Vec<String>,
    rows: usize,
}

impl CsvSink<File> {
    pub fn create(path: &Path, profile: &SiteProfile) -> Result<Self> {
        Self::new(File::create(path)?, profile)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap `writer` and emit the header immediately.
    pub fn new(writer: W, profile: &SiteProfile) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(profile.columns())?;
        Ok(Self {
            writer,
            fields: profile.fields.iter().map(|f| f.name.clone()).collect(),
            rows: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::CrawlError::Io(e.into_error()))
    }
}

impl<W: Write> ResultSink for CsvSink<W> {
    fn write(&mut self, result: &CrawlResult) -> Result<()> {
        let mut row: Vec<&str> = Vec::with_capacity(self.fields.len() + 2);
        row.push(&result.target);
        match result.record() {
            Some(record) => {
                row.push(result.link.as_deref().unwrap_or_default());
                for name in &self.fields {
                    row.push(record.get(name).unwrap_or_default());
                }
            }
            None => row.resize(self.fields.len() + 2, ""),
        }
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonlRow<'a> {
    timestamp: String,
    index: usize,
    target: &'a str,
    link: Option<&'a str>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a crate::extraction::ExtractedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a crate::crawl::ItemFailure>,
}

/// One JSON object per result, including the failure reason.
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl JsonlSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for JsonlSink<W> {
    fn write(&mut self, result: &CrawlResult) -> Result<()> {
        let row = JsonlRow {
            timestamp: Utc::now().to_rfc3339(),
            index: result.index,
            target: &result.target,
            link: result.link.as_deref(),
            status: if result.is_success() { "ok" } else { "failed" },
            fields: result.record(),
            error: result.failure(),
        };
        let json = serde_json::to_string(&row)?;
        writeln!(self.writer, "{json}")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{FailureReason, ItemFailure, WorkItem};
    use crate::extraction::ExtractedRecord;

    fn acme() -> CrawlResult {
        CrawlResult::extracted(
            &WorkItem::new(0, "acme.example/company"),
            "https://acme.example/company",
            ExtractedRecord::new(vec![
                ("title".to_string(), Some("Acme".to_string())),
                ("description".to_string(), Some("Anvils, rockets".to_string())),
                ("logo_url".to_string(), Some("https://cdn.example/logo.png".to_string())),
            ]),
        )
    }

    fn failed() -> CrawlResult {
        CrawlResult::failed(
            &WorkItem::new(1, "blocked.example/company"),
            Some("https://blocked.example/company"),
            ItemFailure::new(FailureReason::BlockExhausted { rebuilds: 3 }, 4),
        )
    }

    #[test]
    fn test_csv_header_and_failure_row() {
        let mut sink = CsvSink::new(Vec::new(), &SiteProfile::directory()).unwrap();
        sink.write(&acme()).unwrap();
        sink.write(&failed()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows(), 2);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "target,link,title,description,logo_url");
        assert_eq!(
            lines[1],
            "acme.example/company,https://acme.example/company,Acme,\"Anvils, rockets\",https://cdn.example/logo.png"
        );
        assert_eq!(lines[2], "blocked.example/company,,,,");
    }

    #[test]
    fn test_csv_network_header() {
        let sink = CsvSink::new(Vec::new(), &SiteProfile::network()).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out.trim_end(), "company,link,employees_number");
    }

    #[test]
    fn test_jsonl_carries_failure_reason() {
        let mut sink = JsonlSink::new(Vec::new());
        sink.write(&acme()).unwrap();
        sink.write(&failed()).unwrap();
        sink.finish().unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let rows: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["status"], "ok");
        assert_eq!(rows[0]["fields"]["title"], "Acme");
        assert!(rows[0].get("error").is_none());
        assert_eq!(rows[1]["status"], "failed");
        assert_eq!(rows[1]["error"]["reason"]["kind"], "block_exhausted");
        assert_eq!(rows[1]["link"], "https://blocked.example/company");
    }

    #[test]
    fn test_create_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path, &SiteProfile::network()).unwrap();
        sink.write(&failed()).unwrap();
        sink.finish().unwrap();
        drop(sink);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "company,link,employees_number\nblocked.example/company,,\n");
    }
}
