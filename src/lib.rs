//! doclens library crate
//!
//! Grades a documentation article along four dimensions (readability,
//! structure, completeness, style) with an LLM, aggregates the verdicts into one
//! score, renders JSON and Markdown reports, and optionally drafts a revision
//! that keeps every hyperlink.

pub mod analysis;
pub mod config;
pub mod fetch;
pub mod keyring;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod revision;
pub mod score;
pub mod util;

pub use analysis::{AnalysisResult, DimensionKey, Score};
pub use pipeline::{DocumentSource, Pipeline, PipelineError, PipelineOutput};
pub use report::{AnalysisReport, ReportFormat};
pub use revision::{RevisedDocument, RevisionEngine};
pub use score::OverallScore;
