use chrono::NaiveDate;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Results requested per search call; the maximum GitHub allows.
pub const PAGE_SIZE: u32 = 100;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    Malformed(String),

    #[error("start date {start} is after end date {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` (a single day) or `YYYY-MM-DD..YYYY-MM-DD`.
    pub fn parse(value: &str) -> Result<DateRange, DateRangeError> {
        match value.split_once("..") {
            Some((start, end)) => {
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    return Err(DateRangeError::Reversed { start, end });
                }
                Ok(DateRange { start, end })
            }
            None => {
                let day = parse_date(value)?;
                Ok(DateRange {
                    start: day,
                    end: day,
                })
            }
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, DateRangeError> {
    // chrono accepts signs and unpadded fields, the search API does not.
    let well_formed = raw.len() == 10
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(DateRangeError::Malformed(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| DateRangeError::Malformed(raw.to_string()))
}

/// Search qualifier text for merged PRs matching `predicate` within `range`.
pub fn search_text(predicate: &str, range: &DateRange, excluded_authors: &[String]) -> String {
    let mut text = format!("is:pr is:merged merged:{} {}", range, predicate);
    for author in excluded_authors {
        text.push_str(" -author:");
        text.push_str(author);
    }
    text
}

const MERGED_SEARCH: &str = r#"query($q: String!, $first: Int!, $after: String) {
  search(query: $q, type: ISSUE, first: $first, after: $after) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      ... on PullRequest {
        number
        title
        url
        body
        mergedAt
        additions
        deletions
        author { login }
        repository {
          name
          owner { login }
        }
        labels(first: 10) {
          nodes { name }
        }
        files(first: 100) {
          nodes {
            path
            additions
            deletions
          }
        }
      }
    }
  }
}"#;

const OPEN_SEARCH: &str = r#"query($q: String!, $first: Int!) {
  search(query: $q, type: ISSUE, first: $first) {
    nodes {
      ... on PullRequest {
        number
        title
        url
        isDraft
        createdAt
        author { login }
        repository {
          name
          owner { login }
        }
        labels(first: 10) {
          nodes { name }
        }
      }
    }
  }
}"#;

/// GraphQL request body for one page of `search_text` results.
///
/// The search text and cursor travel as variables. Without a cursor `after`
/// is JSON `null`, which the API reads as the first page.
pub fn search_payload(search_text: &str, cursor: Option<&str>) -> Value {
    json!({
        "query": MERGED_SEARCH,
        "variables": {
            "q": search_text,
            "first": PAGE_SIZE,
            "after": cursor,
        },
    })
}

/// GraphQL request body for a single page of open pull requests.
pub fn open_search_payload(search_text: &str) -> Value {
    json!({
        "query": OPEN_SEARCH,
        "variables": {
            "q": search_text,
            "first": PAGE_SIZE,
        },
    })
}
