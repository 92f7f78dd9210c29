use crate::error::AnalysisError;
use crate::types::AnalysisReport;
use async_trait::async_trait;
use std::sync::Arc;

const INSTRUCTIONS: &str = "Analyze the following GitHub PR diff and identify issues including: \
1. Code style and formatting issues. \
2. Potential bugs or errors. \
3. Performance improvements. \
4. Best practices violations. \
Output your findings in JSON format with the structure:\n";

const OUTPUT_SCHEMA: &str = r#"{"files": [{"name": <filename>, "issues": [{"type": <style|bug|performance|best_practice>, "line": <line_number>, "description": <description>, "suggestion": <suggestion>}]}], "summary": {"total_files": <int>, "total_issues": <int>, "critical_issues": <int>}}"#;

/// Text-generation service. Takes a prompt, returns the raw JSON document
/// the model produced.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError>;
}

pub fn build_prompt(diff: &str) -> String {
    format!("{INSTRUCTIONS}{OUTPUT_SCHEMA}.\n\n\nCode Diff:\n{diff}")
}

pub fn parse_report(raw: &str) -> Result<AnalysisReport, AnalysisError> {
    serde_json::from_str(raw.trim()).map_err(|err| AnalysisError::MalformedOutput {
        message: err.to_string(),
    })
}

#[derive(Clone)]
pub struct Analyzer {
    generator: Arc<dyn Generator>,
}

impl Analyzer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn analyze(&self, diff: &str) -> Result<AnalysisReport, AnalysisError> {
        let prompt = build_prompt(diff);
        let raw = self.generator.generate(&prompt).await?;
        parse_report(&raw)
    }
}
