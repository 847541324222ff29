use serde::Serialize;

use crate::services::inference::{FileAnalysisRequest, InferenceService};
use crate::services::retrieval::RetrievedFile;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FileError {
    pub(crate) line: Option<u32>,
    pub(crate) message: String,
}

/// Per-file analysis outcome. Not persisted: it only lives long enough to be
/// folded into the submission's grade and feedback document.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FileAnalysisResult {
    pub(crate) filename: String,
    pub(crate) repo_url: String,
    pub(crate) summary: String,
    pub(crate) strengths: Vec<String>,
    pub(crate) weaknesses: Vec<String>,
    pub(crate) errors: Vec<FileError>,
    pub(crate) score_contribution: f64,
    #[serde(skip)]
    pub(crate) degraded: bool,
}

impl FileAnalysisResult {
    /// Zero-score placeholder recorded when the analysis call for one file
    /// fails. Keeps the aggregation input uniform: one result per fetched
    /// file, in activity order.
    pub(crate) fn degraded_stub(filename: &str, repo_url: &str, reason: &str) -> Self {
        Self {
            filename: filename.to_string(),
            repo_url: repo_url.to_string(),
            summary: String::new(),
            strengths: Vec::new(),
            weaknesses: vec![format!("Error de análisis: {reason}")],
            errors: Vec::new(),
            score_contribution: 0.0,
            degraded: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AnalysisContext {
    pub(crate) activity_description: String,
    pub(crate) repo_url: String,
    pub(crate) caller_id: String,
}

/// Runs content analysis over the fetched files in order. Files are analyzed
/// sequentially because each call receives the results already produced for
/// earlier files as context. A failed call is downgraded to a stub so one bad
/// file never blocks grading of the rest.
pub(crate) async fn analyze_files(
    inference: &dyn InferenceService,
    files: &[RetrievedFile],
    context: &AnalysisContext,
) -> Vec<FileAnalysisResult> {
    let mut analyses: Vec<FileAnalysisResult> = Vec::with_capacity(files.len());

    for file in files {
        let request = FileAnalysisRequest {
            path: file.path.clone(),
            content: file.content.clone(),
            activity_description: context.activity_description.clone(),
            repo_url: context.repo_url.clone(),
            caller_id: context.caller_id.clone(),
            prior: analyses.clone(),
        };

        let analysis = match inference.analyze_file(request).await {
            Ok(analysis) => {
                metrics::counter!("file_analysis_total", "status" => "success").increment(1);
                analysis
            }
            Err(err) => {
                tracing::warn!(
                    path = %file.path,
                    user_id = %context.caller_id,
                    error = %err,
                    "File analysis failed; recording degraded result"
                );
                metrics::counter!("file_analysis_total", "status" => "degraded").increment(1);
                FileAnalysisResult::degraded_stub(&file.path, &context.repo_url, &err.to_string())
            }
        };
        analyses.push(analysis);
    }

    analyses
}
