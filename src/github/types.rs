use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A merged pull request decoded from a search result page.
/// The URL is the identity: numbers are only unique within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub body: String,
    /// Author's GitHub login (`ghost` for deleted accounts)
    pub author: String,
    pub repo: String,
    pub owner: String,
    pub merged_at: DateTime<Utc>,
    pub labels: Vec<String>,
    pub additions: u64,
    pub deletions: u64,
    pub files: Vec<ChangedFileRecord>,
}

/// A single file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFileRecord {
    /// Path relative to the repository root
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// One decoded page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub records: Vec<PullRequestRecord>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Which query strategy first surfaced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "member", rename_all = "camelCase")]
pub enum QuerySource {
    /// The team itself was the requested reviewer.
    TeamRequested,
    /// The named member reviewed the pull request.
    ReviewedBy(String),
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::TeamRequested => write!(f, "team-review-requested"),
            QuerySource::ReviewedBy(member) => write!(f, "reviewed-by:{}", member),
        }
    }
}

/// An aggregated record with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcedRecord {
    pub source: QuerySource,
    #[serde(flatten)]
    pub record: PullRequestRecord,
}

/// A GitHub team in `organization/team-slug` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamId {
    pub org: String,
    pub slug: String,
}

impl TeamId {
    /// Parse `org/team-slug`. Returns None for anything else.
    pub fn parse(raw: &str) -> Option<TeamId> {
        let (org, slug) = raw.trim().split_once('/')?;
        if org.is_empty() || slug.is_empty() || slug.contains('/') {
            return None;
        }
        Some(TeamId {
            org: org.to_string(),
            slug: slug.to_string(),
        })
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.slug)
    }
}

/// An open pull request from a review-request or mentions search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPullRequest {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub repo: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub is_draft: bool,
    pub labels: Vec<String>,
}

/// Rough origin of a pull request, judged from its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrKind {
    Feature,
    Dependabot,
}

impl OpenPullRequest {
    pub fn kind(&self) -> PrKind {
        match self.author.as_str() {
            "dependabot" | "app/dependabot" | "dependabot[bot]" => PrKind::Dependabot,
            _ => PrKind::Feature,
        }
    }
}

impl fmt::Display for PrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrKind::Feature => write!(f, "feature"),
            PrKind::Dependabot => write!(f, "dependabot"),
        }
    }
}

/// Pull request metadata and diff fetched for the review command.
#[derive(Debug, Clone)]
pub struct PullRequestDetail {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub body: String,
    pub author: String,
    pub labels: Vec<String>,
    pub base_branch: String,
    pub head_branch: String,
    pub additions: u64,
    pub deletions: u64,
    /// Per-file stats derived from the diff
    pub files: Vec<ChangedFileRecord>,
    /// Raw unified diff
    pub diff: String,
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

// Wire shapes of the GraphQL search response.

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchData {
    pub search: SearchConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchConnection {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSearchData {
    pub search: OpenSearchConnection,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSearchConnection {
    #[serde(default)]
    pub nodes: Vec<OpenPullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PullRequestNode {
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
    pub merged_at: DateTime<Utc>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    pub author: Option<Login>,
    pub repository: RepositoryNode,
    #[serde(default)]
    pub labels: Option<Nodes<LabelNode>>,
    #[serde(default)]
    pub files: Option<Nodes<FileNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenPullRequestNode {
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
    pub author: Option<Login>,
    pub repository: RepositoryNode,
    #[serde(default)]
    pub labels: Option<Nodes<LabelNode>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Login {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryNode {
    pub name: String,
    pub owner: Login,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelNode {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileNode {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

impl From<PullRequestNode> for PullRequestRecord {
    fn from(node: PullRequestNode) -> Self {
        PullRequestRecord {
            number: node.number,
            title: node.title,
            url: node.url,
            body: node.body.unwrap_or_default(),
            author: node
                .author
                .map(|a| a.login)
                .unwrap_or_else(|| "ghost".to_string()),
            repo: node.repository.name,
            owner: node.repository.owner.login,
            merged_at: node.merged_at,
            labels: node
                .labels
                .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            additions: node.additions,
            deletions: node.deletions,
            files: node
                .files
                .map(|f| {
                    f.nodes
                        .into_iter()
                        .map(|n| ChangedFileRecord {
                            path: n.path,
                            additions: n.additions,
                            deletions: n.deletions,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl From<OpenPullRequestNode> for OpenPullRequest {
    fn from(node: OpenPullRequestNode) -> Self {
        OpenPullRequest {
            number: node.number,
            title: node.title,
            url: node.url,
            author: node
                .author
                .map(|a| a.login)
                .unwrap_or_else(|| "ghost".to_string()),
            repo: node.repository.name,
            owner: node.repository.owner.login,
            created_at: node.created_at,
            is_draft: node.is_draft,
            labels: node
                .labels
                .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
        }
    }
}
