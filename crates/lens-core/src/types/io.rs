use crate::types::enums::TaskStatus;
use crate::types::ids::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub repo_url: String,
    pub pr_number: i64,
    pub github_token: Option<String>,
}

/// Owner and repository name taken from a validated repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub task_id: TaskId,
    pub repo: RepoRef,
    pub pr_number: i64,
    pub diff: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Everything a job needs except the task id, which only exists once the
/// task has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPayload {
    pub repo: RepoRef,
    pub pr_number: i64,
    pub diff: String,
}

impl JobPayload {
    pub fn into_job(self, task_id: TaskId) -> AnalysisJob {
        AnalysisJob {
            task_id,
            repo: self.repo,
            pr_number: self.pr_number,
            diff: self.diff,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultsResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[schema(value_type = Object)]
    pub results: Value,
}

/// Terminal view of a task: COMPLETED carries the decoded report, FAILED
/// carries the error text as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub results: Value,
}

/// One entry of a request validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: String,
    pub loc: Vec<String>,
    pub msg: String,
    #[schema(value_type = Object)]
    pub input: Value,
}
