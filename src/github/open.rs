use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::{debug, instrument};

use super::types::{OpenPullRequest, PrKind};
use super::{GitHubError, SearchApi};

/// Open pull requests relative to the user the token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenQuery {
    /// Waiting on the user's review.
    ReviewRequested,
    /// The user was mentioned or commented, excluding their own PRs.
    Mentions,
}

impl OpenQuery {
    pub fn search_text(self) -> &'static str {
        match self {
            OpenQuery::ReviewRequested => "is:pr is:open review-requested:@me",
            OpenQuery::Mentions => "is:pr is:open (mentions:@me OR commenter:@me) -author:@me",
        }
    }
}

/// Fetch open pull requests for `query`. Only the first page is read.
#[instrument(skip(api))]
pub async fn fetch_open<A: SearchApi + ?Sized>(
    api: &A,
    query: OpenQuery,
) -> Result<Vec<OpenPullRequest>, GitHubError> {
    let prs = api.open_pull_requests(query.search_text()).await?;
    debug!(count = prs.len(), "fetched open pull requests");
    Ok(prs)
}

/// What is left to show after filtering and limiting.
#[derive(Debug, Clone)]
pub struct Listing {
    pub shown: Vec<OpenPullRequest>,
    /// Matches before the limit was applied
    pub total: usize,
}

impl Listing {
    pub fn is_truncated(&self) -> bool {
        self.shown.len() < self.total
    }
}

/// Keep pull requests whose repository name contains `repo`
/// (case-insensitive), order them newest first and cut to `limit`.
/// A limit of 0 keeps everything.
pub fn select(prs: Vec<OpenPullRequest>, repo: Option<&str>, limit: usize) -> Listing {
    let needle = repo.filter(|r| !r.is_empty()).map(str::to_lowercase);
    let mut matching: Vec<OpenPullRequest> = prs
        .into_iter()
        .filter(|pr| {
            needle
                .as_deref()
                .map_or(true, |n| pr.repo.to_lowercase().contains(n))
        })
        .collect();

    // Equal timestamps: features ahead of dependency bumps.
    matching.sort_by_key(|pr| (Reverse(pr.created_at), pr.kind()));

    let total = matching.len();
    if limit > 0 {
        matching.truncate(limit);
    }
    Listing {
        shown: matching,
        total,
    }
}

/// Pending review counts, each list largest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub total: usize,
    pub by_repo: Vec<(String, usize)>,
    pub by_kind: Vec<(PrKind, usize)>,
}

pub fn breakdown(prs: &[OpenPullRequest]) -> Breakdown {
    Breakdown {
        total: prs.len(),
        by_repo: ranked(prs.iter().map(|pr| format!("{}/{}", pr.owner, pr.repo))),
        by_kind: ranked(prs.iter().map(OpenPullRequest::kind)),
    }
}

fn ranked<K: Ord>(keys: impl Iterator<Item = K>) -> Vec<(K, usize)> {
    let mut counts: BTreeMap<K, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    // Stable sort keeps key order among equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}
