use async_trait::async_trait;
use lens_core::types::RepoRef;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("pr-lens/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
#[error("invalid api url {url:?}: {reason}")]
pub struct InvalidApiUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream returned {status}")]
    Status { status: u16 },
    #[error("upstream request failed: {message}")]
    Network { message: String },
}

/// Source of pull request diffs.
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: i64,
        token: Option<&str>,
    ) -> Result<String, FetchError>;
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: Url,
    default_token: Option<String>,
}

impl GithubClient {
    pub fn new(api_url: &str) -> Result<Self, InvalidApiUrl> {
        let invalid = |reason: String| InvalidApiUrl {
            url: api_url.to_string(),
            reason,
        };
        let parsed = Url::parse(api_url).map_err(|err| invalid(err.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a base url".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: parsed,
            default_token: None,
        })
    }

    /// Credential used for requests that bring none of their own.
    pub fn with_default_token(mut self, token: Option<String>) -> Self {
        self.default_token = token.filter(|value| !value.trim().is_empty());
        self
    }
}

impl GithubClient {
    /// `<api>/repos/{owner}/{repo}/pulls/{number}`, each part encoded as a
    /// single path segment.
    fn pull_url(&self, repo: &RepoRef, pr_number: i64) -> Result<Url, FetchError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::Network {
                message: format!("{} cannot take a path", self.api_url),
            })?
            .pop_if_empty()
            .extend([
                "repos",
                repo.owner.as_str(),
                repo.repo.as_str(),
                "pulls",
                pr_number.to_string().as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait]
impl DiffSource for GithubClient {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: i64,
        token: Option<&str>,
    ) -> Result<String, FetchError> {
        let url = self.pull_url(repo, pr_number)?;
        let mut request = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, DIFF_MEDIA_TYPE)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = token.or(self.default_token.as_deref()) {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|err| FetchError::Network {
            message: err.to_string(),
        })?;
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "diff fetched");
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|err| FetchError::Network {
            message: err.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use std::sync::{Arc, Mutex};

    const DIFF: &str = "diff --git a/main.py b/main.py\n+print(data)\n";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn repo(owner: &str, name: &str) -> RepoRef {
        RepoRef {
            owner: owner.to_string(),
            repo: name.to_string(),
        }
    }

    type Seen = Arc<Mutex<Vec<HeaderMap>>>;

    async fn fake_github() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let captured = Arc::clone(&seen);
        let router = Router::new().route(
            "/repos/{owner}/{repo}/pulls/{number}",
            get(
                move |Path((owner, repo, number)): Path<(String, String, i64)>,
                      headers: HeaderMap| {
                    let captured = Arc::clone(&captured);
                    async move {
                        captured.lock().unwrap().push(headers);
                        match (owner.as_str(), repo.as_str(), number) {
                            ("octo", "widgets", 7) => DIFF.into_response(),
                            ("octo", "private", _) => StatusCode::FORBIDDEN.into_response(),
                            _ => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                },
            ),
        );
        (serve(router).await, seen)
    }

    #[tokio::test]
    async fn fetches_diff_with_credentials() {
        let (base, seen) = fake_github().await;
        let client = GithubClient::new(&base).unwrap();

        let diff = client
            .fetch_diff(&repo("octo", "widgets"), 7, Some("ghp_secret"))
            .await
            .unwrap();
        assert_eq!(diff, DIFF);

        let headers = seen.lock().unwrap()[0].clone();
        assert_eq!(headers["accept"], DIFF_MEDIA_TYPE);
        assert_eq!(headers["authorization"], "Bearer ghp_secret");
        assert_eq!(headers["x-github-api-version"], API_VERSION);
        assert!(headers.contains_key("user-agent"));
    }

    #[tokio::test]
    async fn default_token_applies_only_without_request_token() {
        let (base, seen) = fake_github().await;
        let client = GithubClient::new(&base)
            .unwrap()
            .with_default_token(Some("ghp_default".to_string()));

        client
            .fetch_diff(&repo("octo", "widgets"), 7, None)
            .await
            .unwrap();
        client
            .fetch_diff(&repo("octo", "widgets"), 7, Some("ghp_caller"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["authorization"], "Bearer ghp_default");
        assert_eq!(seen[1]["authorization"], "Bearer ghp_caller");
    }

    #[tokio::test]
    async fn anonymous_request_sends_no_authorization() {
        let (base, seen) = fake_github().await;
        GithubClient::new(&base).unwrap()
            .fetch_diff(&repo("octo", "widgets"), 7, None)
            .await
            .unwrap();
        assert!(!seen.lock().unwrap()[0].contains_key("authorization"));
    }

    #[tokio::test]
    async fn upstream_status_is_reported() {
        let (base, _) = fake_github().await;
        let client = GithubClient::new(&base).unwrap();

        let err = client
            .fetch_diff(&repo("user", "repo"), 123, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));

        let err = client
            .fetch_diff(&repo("octo", "private"), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403 }));
    }

    #[tokio::test]
    async fn repo_parts_stay_inside_their_segments() {
        let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::default();
        let captured = Arc::clone(&seen);
        let router = Router::new().fallback(move |uri: Uri| {
            let captured = Arc::clone(&captured);
            async move {
                captured
                    .lock()
                    .unwrap()
                    .push((uri.path().to_string(), uri.query().map(str::to_string)));
                "not a diff"
            }
        });
        let base = serve(router).await;
        let client = GithubClient::new(&format!("{base}/api/v3/")).unwrap();

        client
            .fetch_diff(&repo("octo", "secret?x="), 7, None)
            .await
            .unwrap();
        client
            .fetch_diff(&repo("octo", "secret#"), 7, None)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for (path, query) in seen.iter() {
            assert!(path.starts_with("/api/v3/repos/octo/secret%"), "{path}");
            assert!(path.ends_with("/pulls/7"), "{path}");
            assert_eq!(path.matches('/').count(), 7, "{path}");
            assert_eq!(*query, None);
        }
    }

    #[test]
    fn rejects_unusable_api_url() {
        assert!(GithubClient::new("not a url").is_err());
        assert!(GithubClient::new("mailto:ops@example.com").is_err());
    }
}
