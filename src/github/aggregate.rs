use std::collections::HashSet;

use tracing::{debug, info, instrument};

use super::paginate::fetch_all;
use super::query::{search_text, DateRange};
use super::types::{PullRequestRecord, QuerySource, SourcedRecord, TeamId};
use super::{GitHubError, SearchApi};

/// Merged pull requests reviewed by `team` within `range`.
///
/// GitHub search cannot OR `team-review-requested:` with `reviewed-by:`, so
/// the union is built client-side: one query for the team as requested
/// reviewer, then one `reviewed-by:` query per member. Results are merged in
/// that strategy order and deduplicated by URL; the first strategy to surface
/// a pull request keeps it. Output is not sorted by date.
///
/// Any failed query aborts the whole aggregation.
#[instrument(skip_all, fields(team = %team, range = %range))]
pub async fn merged_for_team<A: SearchApi + ?Sized>(
    api: &A,
    team: &TeamId,
    range: &DateRange,
    excluded_authors: &[String],
) -> Result<Vec<SourcedRecord>, GitHubError> {
    let team_requested = fetch_strategy(
        api,
        QuerySource::TeamRequested,
        &format!("team-review-requested:{}", team),
        range,
        excluded_authors,
    )
    .await?;

    let members = api
        .team_members(team)
        .await
        .map_err(|e| GitHubError::TeamMembers {
            team: team.to_string(),
            source: Box::new(e),
        })?;
    info!(members = members.len(), "resolved team members");

    // One slot per member, filled in member order, merged after the loop.
    let mut per_member: Vec<(QuerySource, Vec<PullRequestRecord>)> =
        Vec::with_capacity(members.len());
    for member in &members {
        let source = QuerySource::ReviewedBy(member.clone());
        let predicate = format!("reviewed-by:{}", member);
        per_member.push(fetch_strategy(api, source, &predicate, range, excluded_authors).await?);
    }

    let merged = merge(std::iter::once(team_requested).chain(per_member));
    info!(merged = merged.len(), "aggregated team pull requests");
    Ok(merged)
}

async fn fetch_strategy<A: SearchApi + ?Sized>(
    api: &A,
    source: QuerySource,
    predicate: &str,
    range: &DateRange,
    excluded_authors: &[String],
) -> Result<(QuerySource, Vec<PullRequestRecord>), GitHubError> {
    let text = search_text(predicate, range, excluded_authors);
    match fetch_all(api, &text).await {
        Ok(records) => {
            debug!(strategy = %source, records = records.len(), "strategy fetched");
            Ok((source, records))
        }
        Err(e) => Err(GitHubError::Strategy {
            strategy: source,
            source: Box::new(e),
        }),
    }
}

/// Union strategy results in iteration order, keeping the first record seen
/// for each URL.
fn merge<I>(strategies: I) -> Vec<SourcedRecord>
where
    I: IntoIterator<Item = (QuerySource, Vec<PullRequestRecord>)>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for (source, records) in strategies {
        for record in records {
            if seen.insert(record.url.clone()) {
                merged.push(SourcedRecord {
                    source: source.clone(),
                    record,
                });
            }
        }
    }
    merged
}
