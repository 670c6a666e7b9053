use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;

use crate::github::{PullRequestDetail, PullRequestRecord};

/// Hard ceiling on a rendered summary prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 150_000;
/// Bodies longer than this are cut and marked with an ellipsis.
pub const MAX_BODY_CHARS: usize = 1_000;
/// Changed files listed per pull request.
pub const MAX_FILES_PER_PR: usize = 30;
/// Diffs longer than this are cut before a review.
pub const MAX_DIFF_CHARS: usize = 100_000;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a technical writer summarizing merged pull requests for a software engineering team.

The engineers reading this are busy and care about technical detail. Produce a clear, concise \
summary in plain language, grouped by repository. For each repository, categorize changes into:
- New Features
- Bug Fixes
- Refactors / Improvements
- Other

For each PR, write a one-line summary of what changed and why. Include the PR number and author.
Use markdown formatting.
Finish with takeaways and best practices the team can learn from these changes.
";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt too large ({actual} chars, max {limit}); try a narrower date range")]
    TooLarge { actual: usize, limit: usize },
}

/// Render the summary prompt for a set of merged pull requests.
///
/// Records are grouped by `owner/repo`, groups in lexicographic order, records
/// within a group in the order given. Fails rather than dropping anything when
/// the result exceeds [`MAX_PROMPT_CHARS`].
pub fn build_summary<'a, I>(records: I) -> Result<String, PromptError>
where
    I: IntoIterator<Item = &'a PullRequestRecord>,
{
    let mut grouped: BTreeMap<(&str, &str), Vec<&PullRequestRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry((record.owner.as_str(), record.repo.as_str()))
            .or_default()
            .push(record);
    }

    let mut out = String::from("Summarize the following merged pull requests:\n\n");
    for ((owner, repo), prs) in &grouped {
        let _ = write!(out, "## {}/{}\n\n", owner, repo);
        for pr in prs {
            render_record(&mut out, pr);
        }
    }

    let actual = out.chars().count();
    if actual > MAX_PROMPT_CHARS {
        return Err(PromptError::TooLarge {
            actual,
            limit: MAX_PROMPT_CHARS,
        });
    }
    Ok(out)
}

fn render_record(out: &mut String, pr: &PullRequestRecord) {
    let _ = writeln!(out, "### PR #{}: {} (by @{})", pr.number, pr.title, pr.author);
    if !pr.body.is_empty() {
        let _ = writeln!(out, "Description: {}", truncate_chars(&pr.body, MAX_BODY_CHARS, "..."));
    }
    if !pr.labels.is_empty() {
        let _ = writeln!(out, "Labels: {}", pr.labels.join(", "));
    }
    let _ = writeln!(out, "Stats: +{} -{}", pr.additions, pr.deletions);
    if !pr.files.is_empty() {
        out.push_str("Changed files:\n");
        for file in pr.files.iter().take(MAX_FILES_PER_PR) {
            let _ = writeln!(out, "  - {} (+{} -{})", file.path, file.additions, file.deletions);
        }
    }
    out.push('\n');
}

/// Render the review prompt for a single pull request.
///
/// Returns the prompt and whether the diff had to be truncated.
pub fn build_review(pr: &PullRequestDetail) -> (String, bool) {
    let truncated = pr.diff.chars().count() > MAX_DIFF_CHARS;
    let diff = truncate_chars(&pr.diff, MAX_DIFF_CHARS, "\n\n... [diff truncated due to size]");

    let mut out = String::from("You are a senior software engineer reviewing a pull request.\n\n");
    out.push_str("## PR Information\n");
    let _ = writeln!(out, "- **Title:** {}", pr.title);
    let _ = writeln!(out, "- **Author:** {}", pr.author);
    let _ = writeln!(out, "- **Branch:** {} -> {}", pr.head_branch, pr.base_branch);
    let _ = writeln!(out, "- **Changes:** +{} -{} lines", pr.additions, pr.deletions);
    if !pr.labels.is_empty() {
        let _ = writeln!(out, "- **Labels:** {}", pr.labels.join(", "));
    }
    let _ = writeln!(out, "- **URL:** {}", pr.url);

    if !pr.files.is_empty() {
        out.push_str("\nFiles changed:\n");
        for file in &pr.files {
            let _ = writeln!(out, "- {} (+{} -{})", file.path, file.additions, file.deletions);
        }
    }
    if !pr.body.is_empty() {
        let _ = write!(out, "\n## PR Description\n{}\n", pr.body);
    }

    let _ = write!(out, "\n## Diff\n\n{}\n\n---\n\n", diff);
    out.push_str(
        "Please provide:\n\n\
         ## Summary\n\
         A brief summary (2-4 sentences) of what this PR does, focused on intent and main changes.\n\n\
         ## Code Review\n\
         Feedback on potential bugs, security concerns, performance, error handling and code quality, \
         with concrete suggestions. Be concise and actionable; if the code looks good, say so briefly.\n",
    );
    (out, truncated)
}

/// Keep the first `max` characters of `text`, appending `marker` if cut.
fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}
