use crate::AppState;
use crate::github::{DiffSource, FetchError};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use lens_core::error::QueueError;
use lens_core::memory::MemoryStore;
use lens_core::types::{AnalysisJob, RepoRef};
use lens_core::{TaskLifecycle, TaskQueue};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const DIFF: &str = "diff --git a/app.py b/app.py\n+password = 'hunter2'\n";

#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<AnalysisJob>>,
    pub closed: AtomicBool,
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Knows one pull request, `octo/widgets#7`. Repository names pick failures:
/// `broken` answers 500, `offline` fails at the network level.
#[derive(Default)]
pub struct FakeDiffs {
    pub tokens: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl DiffSource for FakeDiffs {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: i64,
        token: Option<&str>,
    ) -> Result<String, FetchError> {
        self.tokens.lock().unwrap().push(token.map(str::to_string));
        match (repo.owner.as_str(), repo.repo.as_str(), pr_number) {
            ("octo", "widgets", 7) => Ok(DIFF.to_string()),
            (_, "broken", _) => Err(FetchError::Status { status: 500 }),
            (_, "offline", _) => Err(FetchError::Network {
                message: "connection refused".to_string(),
            }),
            _ => Err(FetchError::Status { status: 404 }),
        }
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: MemoryStore,
    pub queue: Arc<RecordingQueue>,
    pub diffs: Arc<FakeDiffs>,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let queue = Arc::new(RecordingQueue::default());
        let diffs = Arc::new(FakeDiffs::default());
        let state = AppState {
            lifecycle: TaskLifecycle::new(Arc::new(store.clone())),
            queue: queue.clone(),
            diffs: diffs.clone(),
            repo_host: "github.com".to_string(),
        };
        Self {
            state,
            store,
            queue,
            diffs,
        }
    }

    pub fn app(&self) -> Router {
        crate::app(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.app().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> Reply {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}
