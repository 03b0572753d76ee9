//! The request entry point: fetch, analyze, aggregate, optionally revise.

use crate::analysis::analyze_all;
use crate::fetch::{ContentFetcher, FetchError};
use crate::llm::CompletionGateway;
use crate::report::AnalysisReport;
use crate::revision::{RevisedDocument, RevisionEngine};
use std::sync::Arc;
use thiserror::Error;

/// Where the article comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Url(String),
    /// Text supplied directly; `label` stands in for the URL in reports.
    Text { label: String, text: String },
}

impl DocumentSource {
    pub fn label(&self) -> &str {
        match self {
            DocumentSource::Url(url) => url,
            DocumentSource::Text { label, .. } => label,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch article: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid document source: {0}")]
    InvalidSource(String),
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: AnalysisReport,
    /// The analyzed article text.
    pub document: String,
    /// Present only when revision was requested and succeeded.
    pub revision: Option<RevisedDocument>,
}

pub struct Pipeline {
    gateway: CompletionGateway,
    fetcher: Arc<dyn ContentFetcher>,
    revision: RevisionEngine,
}

impl Pipeline {
    pub fn new(gateway: CompletionGateway, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            gateway,
            fetcher,
            revision: RevisionEngine::default(),
        }
    }

    pub fn with_revision_engine(mut self, engine: RevisionEngine) -> Self {
        self.revision = engine;
        self
    }

    /// Resolve a source to article text. Fetch failures abort the run.
    pub async fn load_document(&self, source: &DocumentSource) -> Result<String, PipelineError> {
        match source {
            DocumentSource::Url(url) => Ok(self.fetcher.fetch(url).await?),
            DocumentSource::Text { label, text } => {
                if text.trim().is_empty() {
                    return Err(PipelineError::InvalidSource(format!("{} is empty", label)));
                }
                Ok(text.clone())
            }
        }
    }

    /// Run all four stages over `document` and aggregate.
    pub async fn analyze_document(&self, label: &str, document: &str) -> AnalysisReport {
        let dimensions = analyze_all(&self.gateway, document).await;
        let report = AnalysisReport::new(label, dimensions);
        tracing::info!(
            source = label,
            overall = report.overall_score.as_str(),
            "Analysis finished"
        );
        report
    }

    /// Revise `document` using a report's suggestions.
    pub async fn revise(
        &self,
        report: &AnalysisReport,
        document: &str,
    ) -> Option<RevisedDocument> {
        self.revision
            .revise(&self.gateway, document, &report.dimensions)
            .await
    }

    pub async fn analyze_and_optionally_revise(
        &self,
        source: DocumentSource,
        want_revision: bool,
    ) -> Result<PipelineOutput, PipelineError> {
        let document = self.load_document(&source).await?;
        let report = self.analyze_document(source.label(), &document).await;

        let revision = if want_revision {
            let revised = self.revise(&report, &document).await;
            if revised.is_none() {
                tracing::warn!(source = source.label(), "Revision produced no output");
            }
            revised
        } else {
            None
        };

        Ok(PipelineOutput {
            report,
            document,
            revision,
        })
    }
}
