//! Writes rendered reports and revisions to an output directory.
//!
//! Files are named after the last path segment of the analyzed URL:
//! `<stem>_analysis.md`, `<stem>_analysis.json`, `<stem>_revised.txt` and
//! `<stem>_revised.md`.

use super::{AnalysisReport, ReportFormat};
use crate::util::sanitize_file_stem;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_STEM: &str = "analysis_report";

/// Where a run's artifacts landed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedPaths {
    pub narrative: Option<PathBuf>,
    pub structured: Option<PathBuf>,
    pub revised_text: Option<PathBuf>,
    pub revised_markdown: Option<PathBuf>,
}

impl SavedPaths {
    pub fn all(&self) -> Vec<&Path> {
        [
            &self.narrative,
            &self.structured,
            &self.revised_text,
            &self.revised_markdown,
        ]
        .into_iter()
        .flatten()
        .map(PathBuf::as_path)
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File stem for a source: the last non-empty URL path segment,
    /// sanitized. Non-URL labels are sanitized as-is.
    pub fn file_stem(source: &str) -> String {
        let segment = match url::Url::parse(source) {
            Ok(parsed) => parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(str::to_string),
            Err(_) => Some(source.trim().to_string()).filter(|s| !s.is_empty()),
        };
        match segment {
            Some(segment) => sanitize_file_stem(&segment),
            None => DEFAULT_STEM.to_string(),
        }
    }

    fn path_for(&self, stem: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", stem, suffix))
    }

    fn report_path(&self, stem: &str, format: ReportFormat) -> PathBuf {
        self.path_for(stem, &format!("analysis.{}", format.extension()))
    }

    /// Path the structured report for `source` is written to.
    pub fn structured_path(&self, source: &str) -> PathBuf {
        self.report_path(&Self::file_stem(source), ReportFormat::Structured)
    }

    /// Write both report renderings.
    pub fn save_report(&self, report: &AnalysisReport) -> Result<SavedPaths> {
        self.ensure_dir()?;
        let stem = Self::file_stem(&report.source_url);

        let narrative = self.report_path(&stem, ReportFormat::Narrative);
        write_atomic(&narrative, &report.render(ReportFormat::Narrative))?;
        tracing::info!(path = %narrative.display(), "Saved narrative report");

        let structured = self.report_path(&stem, ReportFormat::Structured);
        write_atomic(&structured, &report.render(ReportFormat::Structured))?;
        tracing::info!(path = %structured.display(), "Saved structured report");

        Ok(SavedPaths {
            narrative: Some(narrative),
            structured: Some(structured),
            ..SavedPaths::default()
        })
    }

    /// Write a revised article as both plain text and Markdown.
    pub fn save_revision(&self, source: &str, revised: &str) -> Result<SavedPaths> {
        self.ensure_dir()?;
        let stem = Self::file_stem(source);

        let text = self.path_for(&stem, "revised.txt");
        write_atomic(&text, revised)?;
        let markdown = self.path_for(&stem, "revised.md");
        write_atomic(&markdown, revised)?;
        tracing::info!(path = %text.display(), "Saved revised article");

        Ok(SavedPaths {
            revised_text: Some(text),
            revised_markdown: Some(markdown),
            ..SavedPaths::default()
        })
    }

    /// Read back a structured report.
    pub fn load_report(path: &Path) -> Result<AnalysisReport> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        AnalysisReport::from_structured_json(&content)
            .with_context(|| format!("Failed to load report {}", path.display()))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create output directory {}", self.dir.display())
        })
    }
}

/// Write through a sibling temp file and rename into place.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("Failed to write {}", path.display()));
    }
    Ok(())
}
