pub mod aggregate;
pub mod diff;
pub mod open;
pub mod paginate;
pub mod query;
pub mod types;

pub use types::{
    OpenPullRequest, PrKind, PrUrl, PullRequestDetail, PullRequestRecord, QuerySource, SearchPage,
    SourcedRecord, TeamId,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;
use types::{GraphQlResponse, Login, OpenSearchData, SearchData};

const USER_AGENT: &str = "plantir";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid team {0:?} (expected org/team-slug)")]
    InvalidTeam(String),

    #[error("GitHub token not found in config or GITHUB_TOKEN")]
    MissingToken,

    #[error("Failed to fetch {strategy} results: {source}")]
    Strategy {
        strategy: QuerySource,
        source: Box<GitHubError>,
    },

    #[error("Failed to get members of team {team}: {source}")]
    TeamMembers {
        team: String,
        source: Box<GitHubError>,
    },
}

/// The slice of the GitHub API the aggregator depends on.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetch one page of merged pull requests matching `search_text`.
    async fn search_page(
        &self,
        search_text: &str,
        cursor: Option<&str>,
    ) -> Result<SearchPage, GitHubError>;

    /// Member logins of `team`, in the order GitHub returns them.
    async fn team_members(&self, team: &TeamId) -> Result<Vec<String>, GitHubError>;

    /// First page of open pull requests matching `search_text`.
    async fn open_pull_requests(
        &self,
        search_text: &str,
    ) -> Result<Vec<OpenPullRequest>, GitHubError>;
}

/// Authenticated GitHub client for the search, team and pull request APIs.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    graphql_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: String) -> GitHubClient {
        let api_url = api_url.trim_end_matches('/').to_string();
        // GitHub Enterprise serves REST under /api/v3 and GraphQL at /api/graphql.
        let graphql_url = match api_url.strip_suffix("/api/v3") {
            Some(root) => format!("{}/api/graphql", root),
            None => format!("{}/graphql", api_url),
        };
        GitHubClient {
            http: reqwest::Client::new(),
            api_url,
            graphql_url,
            token,
        }
    }

    pub fn from_config(config: &Config) -> Result<GitHubClient, GitHubError> {
        let token = config.github_token().ok_or(GitHubError::MissingToken)?;
        Ok(Self::new(config.api_url(), token))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(&self.token)
    }

    /// POST a GraphQL request and return its `data`, turning reported
    /// errors into [`GitHubError::GraphQl`].
    async fn graphql<T: DeserializeOwned>(
        &self,
        payload: &serde_json::Value,
    ) -> Result<T, GitHubError> {
        let response = self
            .http
            .post(&self.graphql_url)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json::<GraphQlResponse<T>>()
            .await?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(GitHubError::GraphQl(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| GitHubError::GraphQl("response carried no data".to_string()))
    }

    /// Fetch pull request metadata plus its diff.
    #[instrument(skip(self), fields(owner = %pr_url.owner, repo = %pr_url.repo, pr = pr_url.pr_number))]
    pub async fn pull_request(&self, pr_url: &PrUrl) -> Result<PullRequestDetail, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, pr_url.owner, pr_url.repo, pr_url.pr_number
        );

        #[derive(Deserialize)]
        struct Label {
            name: String,
        }

        #[derive(Deserialize)]
        struct Branch {
            #[serde(rename = "ref")]
            name: String,
        }

        #[derive(Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            html_url: String,
            body: Option<String>,
            user: Option<Login>,
            #[serde(default)]
            labels: Vec<Label>,
            base: Branch,
            head: Branch,
            additions: u64,
            deletions: u64,
        }

        debug!("fetching PR metadata from GitHub API");
        let metadata = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<PullResponse>()
            .await?;
        debug!(title = %metadata.title, "received PR metadata");

        debug!("fetching PR diff from GitHub API");
        let diff = self
            .get(&url)
            .header("Accept", "application/vnd.github.diff")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let files = diff::file_stats(&diff);
        debug!(diff_bytes = diff.len(), files = files.len(), "received PR diff");

        Ok(PullRequestDetail {
            number: metadata.number,
            title: metadata.title,
            url: metadata.html_url,
            body: metadata.body.unwrap_or_default(),
            author: metadata
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "ghost".to_string()),
            labels: metadata.labels.into_iter().map(|l| l.name).collect(),
            base_branch: metadata.base.name,
            head_branch: metadata.head.name,
            additions: metadata.additions,
            deletions: metadata.deletions,
            files,
            diff,
        })
    }
}

#[async_trait]
impl SearchApi for GitHubClient {
    #[instrument(skip(self, search_text), fields(has_cursor = cursor.is_some()))]
    async fn search_page(
        &self,
        search_text: &str,
        cursor: Option<&str>,
    ) -> Result<SearchPage, GitHubError> {
        let payload = query::search_payload(search_text, cursor);
        let search = self.graphql::<SearchData>(&payload).await?.search;

        debug!(nodes = search.nodes.len(), has_next = search.page_info.has_next_page, "decoded search page");
        Ok(SearchPage {
            records: search.nodes.into_iter().map(Into::into).collect(),
            has_next_page: search.page_info.has_next_page,
            end_cursor: search.page_info.end_cursor,
        })
    }

    #[instrument(skip_all, fields(team = %team))]
    async fn team_members(&self, team: &TeamId) -> Result<Vec<String>, GitHubError> {
        let url = format!(
            "{}/orgs/{}/teams/{}/members?per_page=100",
            self.api_url, team.org, team.slug
        );
        let members = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Login>>()
            .await?;
        debug!(members = members.len(), "resolved team members");
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    #[instrument(skip(self))]
    async fn open_pull_requests(
        &self,
        search_text: &str,
    ) -> Result<Vec<OpenPullRequest>, GitHubError> {
        let payload = query::open_search_payload(search_text);
        let search = self.graphql::<OpenSearchData>(&payload).await?.search;
        debug!(nodes = search.nodes.len(), "decoded open search");
        Ok(search.nodes.into_iter().map(Into::into).collect())
    }
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GitHubError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GitHubError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        pr_number,
    })
}
