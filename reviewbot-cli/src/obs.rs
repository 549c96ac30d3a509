use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use tracing::{debug, error, info};

use reviewbot_core::{
    ActionKind, BuildService, Fingerprint, HistoryEntry, LinkTarget, PackageOwner, Request,
    RequestId, RequestState, ReviewState, ReviewerTarget, ServiceError,
};

use crate::xml;

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Client for the build service API.
#[derive(Clone)]
pub struct ObsClient {
    client: Client,
    apiurl: Url,
    user: Option<String>,
    password: Option<String>,
    correlation_id: Option<String>,
}

fn create_obs_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("reviewbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

impl ObsClient {
    pub fn new(apiurl: &str, user: Option<String>, password: Option<String>) -> Result<Self> {
        let apiurl = Url::parse(apiurl).with_context(|| format!("Invalid API URL '{}'", apiurl))?;
        if apiurl.cannot_be_a_base() {
            return Err(anyhow!("API URL '{}' cannot carry a path", apiurl));
        }

        Ok(Self {
            client: create_obs_client()?,
            apiurl,
            user,
            password,
            correlation_id: None,
        })
    }

    /// Send `id` as correlation header on every call.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.apiurl.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(user) = &self.user {
            builder = builder.basic_auth(user, self.password.as_ref());
        }
        if let Some(cid) = &self.correlation_id {
            builder = builder.header(CORRELATION_ID_HEADER, cid);
        }
        builder
    }

    /// GET a document. A 404 is `Ok(None)`.
    async fn get(&self, operation: &'static str, url: Url) -> Result<Option<String>, ServiceError> {
        debug!("GET {}", url);
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| ServiceError::transport(operation, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{}: not found", operation);
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::transport(operation, e.to_string()))?;

        if !status.is_success() {
            error!("{} failed: {} - {}", operation, status, body);
            return Err(ServiceError::transport(
                operation,
                format!("{} - {}", status, body),
            ));
        }

        Ok(Some(body))
    }

    /// POST a command. Client errors mean the service refused it.
    async fn post(&self, operation: &'static str, url: Url) -> Result<(), ServiceError> {
        debug!("POST {}", url);
        let response = self
            .request(Method::POST, url)
            .send()
            .await
            .map_err(|e| ServiceError::transport(operation, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::transport(operation, e.to_string()))?;
        error!("{} failed: {} - {}", operation, status, body);

        if status.is_client_error() {
            Err(ServiceError::rejected(operation, status.as_u16(), body))
        } else {
            Err(ServiceError::transport(
                operation,
                format!("{} - {}", status, body),
            ))
        }
    }
}

/// Search expression for requests in review with a `new` review by `reviewer`.
fn awaiting_review_match(reviewer: &str) -> String {
    format!(
        "state/@name='review' and review[@by_user='{}' and @state='new']",
        reviewer
    )
}

fn reviewer_query(target: &ReviewerTarget) -> Vec<(&'static str, &str)> {
    match target {
        ReviewerTarget::User(user) => vec![("by_user", user.as_str())],
        ReviewerTarget::Group(group) => vec![("by_group", group.as_str())],
        ReviewerTarget::Project(project) => vec![("by_project", project.as_str())],
        ReviewerTarget::Package { project, package } => vec![
            ("by_project", project.as_str()),
            ("by_package", package.as_str()),
        ],
    }
}

#[async_trait]
impl BuildService for ObsClient {
    async fn fingerprint(
        &self,
        project: &str,
        package: &str,
        revision: Option<&str>,
    ) -> Result<Option<Fingerprint>, ServiceError> {
        let mut query = vec![("view", "info")];
        if let Some(rev) = revision {
            query.push(("rev", rev));
        }
        let url = self.url(&["source", project, package], &query);

        match self.get("source info", url).await? {
            Some(body) => xml::parse_source_info(&body),
            None => Ok(None),
        }
    }

    async fn link_target(
        &self,
        project: &str,
        package: &str,
    ) -> Result<Option<LinkTarget>, ServiceError> {
        let url = self.url(&["source", project, package], &[]);
        match self.get("source listing", url).await? {
            Some(body) => xml::parse_link_target(&body, project),
            None => Ok(None),
        }
    }

    async fn history(
        &self,
        project: &str,
        package: &str,
        limit: usize,
    ) -> Result<Option<Vec<HistoryEntry>>, ServiceError> {
        let limit_param = limit.to_string();
        let url = self.url(
            &["source", project, package, "_history"],
            &[("limit", limit_param.as_str())],
        );

        let Some(body) = self.get("history", url).await? else {
            return Ok(None);
        };
        let mut entries = xml::parse_history(&body)?;
        entries.truncate(limit);
        Ok(Some(entries))
    }

    async fn open_requests(
        &self,
        project: &str,
        package: &str,
        states: &[RequestState],
        kind: &ActionKind,
    ) -> Result<Vec<Request>, ServiceError> {
        let states = states
            .iter()
            .map(RequestState::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = self.url(
            &["request"],
            &[
                ("view", "collection"),
                ("project", project),
                ("package", package),
                ("states", states.as_str()),
                ("types", kind.api_name()),
                ("roles", "target"),
            ],
        );

        match self.get("request list", url).await? {
            Some(body) => xml::parse_request_collection(&body),
            None => Ok(Vec::new()),
        }
    }

    async fn request(&self, id: &RequestId) -> Result<Option<Request>, ServiceError> {
        let url = self.url(&["request", id.0.as_str()], &[]);
        match self.get("request", url).await? {
            Some(body) => xml::parse_request(&body).map(Some),
            None => Ok(None),
        }
    }

    async fn requests_awaiting_review(&self, reviewer: &str) -> Result<Vec<Request>, ServiceError> {
        let expression = awaiting_review_match(reviewer);
        let url = self.url(&["search", "request"], &[("match", expression.as_str())]);

        match self.get("request search", url).await? {
            Some(body) => xml::parse_request_collection(&body),
            None => Ok(Vec::new()),
        }
    }

    async fn change_review_state(
        &self,
        id: &RequestId,
        reviewer: &str,
        state: ReviewState,
        message: &str,
    ) -> Result<(), ServiceError> {
        let url = self.url(
            &["request", id.0.as_str()],
            &[
                ("cmd", "changereviewstate"),
                ("newstate", state.as_str()),
                ("by_user", reviewer),
                ("comment", message),
            ],
        );

        self.post("change review state", url).await?;
        info!("Set review of {} on {} to {}", reviewer, id, state);
        Ok(())
    }

    async fn add_review(
        &self,
        id: &RequestId,
        target: &ReviewerTarget,
        message: &str,
    ) -> Result<(), ServiceError> {
        let mut query = vec![("cmd", "addreview")];
        query.extend(reviewer_query(target));
        query.push(("comment", message));
        let url = self.url(&["request", id.0.as_str()], &query);

        self.post("add review", url).await?;
        info!("Added review by {} to {}", target, id);
        Ok(())
    }

    async fn package_owners(&self, package: &str) -> Result<Vec<PackageOwner>, ServiceError> {
        let url = self.url(&["search", "owner"], &[("binary", package)]);
        match self.get("owner search", url).await? {
            Some(body) => xml::parse_owners(&body),
            None => Ok(Vec::new()),
        }
    }
}
