use tracing::{debug, instrument};

use super::types::PullRequestRecord;
use super::{GitHubError, SearchApi};

/// Fetch every page of results for one search.
///
/// Follows `endCursor` until the API reports no next page. The first failing
/// page aborts the whole fetch; records from earlier pages are dropped.
#[instrument(skip(api))]
pub async fn fetch_all<A: SearchApi + ?Sized>(
    api: &A,
    search_text: &str,
) -> Result<Vec<PullRequestRecord>, GitHubError> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = api.search_page(search_text, cursor.as_deref()).await?;
        pages += 1;
        debug!(page = pages, records = page.records.len(), "fetched search page");
        records.extend(page.records);

        if !page.has_next_page {
            break;
        }
        match page.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(GitHubError::GraphQl(
                    "hasNextPage was set without an endCursor".to_string(),
                ))
            }
        }
    }

    debug!(pages, total = records.len(), "pagination complete");
    Ok(records)
}
