pub mod enums;
pub mod ids;
pub mod io;
pub mod report;

pub use enums::{IssueKind, TaskStatus};
pub use ids::{IdError, TaskId};
pub use io::{
    AnalysisJob, AnalyzeRequest, AnalyzeResponse, FieldError, JobPayload, RepoRef,
    ResultsResponse, StatusResponse, TaskOutcome,
};
pub use report::{AnalysisReport, FileReport, Issue, Summary};
