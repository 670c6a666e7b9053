use crate::github::open::{Breakdown, Listing};
use crate::github::{PullRequestDetail, SourcedRecord};
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize pull requests: {0}")]
    Json(#[from] serde_json::Error),
}

/// A model-written summary of a team's merged pull requests.
#[derive(Debug, Clone)]
pub struct Summary {
    pub team: String,
    pub range: String,
    pub pr_count: usize,
    pub text: String,
}

/// One line per pull request, in aggregation order.
pub fn write_list<W: Write>(out: &mut W, records: &[SourcedRecord]) -> Result<(), ReportError> {
    writeln!(out)?;
    for sourced in records {
        let pr = &sourced.record;
        writeln!(
            out,
            "  {}/{} #{}  {}  (@{}, merged {})",
            pr.owner,
            pr.repo,
            pr.number,
            pr.title,
            pr.author,
            pr.merged_at.format("%Y-%m-%d")
        )?;
    }
    Ok(())
}

/// Pretty-printed JSON of `value`, newline-terminated.
pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Open pull requests under a heading, with a note when the limit hid some.
pub fn write_open_list<W: Write>(
    out: &mut W,
    heading: &str,
    listing: &Listing,
) -> Result<(), ReportError> {
    writeln!(out, "{}", heading.bold())?;
    writeln!(out)?;
    if listing.is_truncated() {
        writeln!(
            out,
            "Showing {} of {} PRs (use --limit to see more):",
            listing.shown.len(),
            listing.total
        )?;
    } else {
        writeln!(out, "Found {} PRs:", listing.total)?;
    }
    writeln!(out)?;

    for pr in &listing.shown {
        let draft = if pr.is_draft {
            format!(" {}", "[draft]".yellow())
        } else {
            String::new()
        };
        writeln!(
            out,
            "  {}/{} #{}  {}{}  (@{}, opened {})",
            pr.owner,
            pr.repo,
            pr.number,
            pr.title,
            draft,
            pr.author,
            pr.created_at.format("%Y-%m-%d")
        )?;
        writeln!(out, "    {}", pr.url.dimmed())?;
    }
    Ok(())
}

/// Pending review counts by repository and by kind.
pub fn write_breakdown<W: Write>(out: &mut W, stats: &Breakdown) -> Result<(), ReportError> {
    writeln!(out, "{}", format!("PR Review Stats ({} total)", stats.total).bold())?;

    writeln!(out)?;
    writeln!(out, "By Repository:")?;
    let width = stats.by_repo.iter().map(|(r, _)| r.len()).max().unwrap_or(0);
    for (repo, count) in &stats.by_repo {
        writeln!(out, "  {:<width$}  {}", repo, count.to_string().cyan(), width = width)?;
    }

    writeln!(out)?;
    writeln!(out, "By Type:")?;
    for (kind, count) in &stats.by_kind {
        writeln!(out, "  {:<10}  {}", kind.to_string(), count.to_string().cyan())?;
    }
    Ok(())
}

/// Output the summary to the terminal (default) or to a markdown file.
#[instrument(skip(summary), fields(team = %summary.team, prs = summary.pr_count))]
pub fn output_summary(summary: &Summary, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing summary to terminal");
            print_terminal_summary(summary);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing summary to file");
            std::fs::write(path, summary_markdown(summary))?;
            Ok(())
        }
    }
}

fn print_terminal_summary(summary: &Summary) {
    println!();
    println!(
        "{}",
        format!("═══ Merged PRs for {} ({}) ═══", summary.team, summary.range).bold()
    );
    println!("{} pull requests summarized", summary.pr_count.to_string().cyan());
    println!();
    println!("{}", summary.text);
}

fn summary_markdown(summary: &Summary) -> String {
    format!(
        "# Merged PRs for {} ({})\n\n_{} pull requests summarized_\n\n{}\n",
        summary.team, summary.range, summary.pr_count, summary.text
    )
}

/// Print a model review under a header naming the pull request.
pub fn print_review(pr: &PullRequestDetail, review: &str) {
    let rule = "─".repeat(61);
    println!();
    println!("{}", rule.dimmed());
    println!("{}", format!("PR #{}: {}", pr.number, pr.title).bold());
    println!("{}", pr.url.blue());
    println!("{}", rule.dimmed());
    println!();
    println!("{}", review);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::paginate::tests::test_record;
    use crate::github::QuerySource;

    fn sample_records() -> Vec<SourcedRecord> {
        vec![
            SourcedRecord {
                source: QuerySource::TeamRequested,
                record: test_record("https://x/1"),
            },
            SourcedRecord {
                source: QuerySource::ReviewedBy("alice".to_string()),
                record: test_record("https://x/2"),
            },
        ]
    }

    fn sample_summary() -> Summary {
        Summary {
            team: "acme/platform".to_string(),
            range: "2026-02-01..2026-02-11".to_string(),
            pr_count: 2,
            text: "## owner/repo\n- PR #1".to_string(),
        }
    }

    #[test]
    fn test_list_lines() {
        let mut out = Vec::new();
        write_list(&mut out, &sample_records()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  owner/repo #1  Title for https://x/1  (@author, merged 2026-02-11)"));
        assert_eq!(text.lines().filter(|l| l.contains("owner/repo #")).count(), 2);
    }

    #[test]
    fn test_json_carries_source_and_fields() {
        let mut out = Vec::new();
        write_json(&mut out, &sample_records()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["url"], "https://x/1");
        assert_eq!(value[0]["source"]["kind"], "teamRequested");
        assert_eq!(value[1]["source"]["member"], "alice");
        assert_eq!(value[1]["mergedAt"], "2026-02-11T10:00:00Z");
    }

    #[test]
    fn test_summary_markdown() {
        let md = summary_markdown(&sample_summary());
        assert!(md.starts_with("# Merged PRs for acme/platform (2026-02-01..2026-02-11)"));
        assert!(md.contains("_2 pull requests summarized_"));
        assert!(md.contains("- PR #1"));
    }

    #[test]
    fn test_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");
        output_summary(&sample_summary(), Some(&path)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("acme/platform"));
    }

    #[test]
    fn test_output_to_terminal() {
        // Should not panic
        output_summary(&sample_summary(), None).unwrap();
    }

    #[test]
    fn test_open_list_notes_limit() {
        use crate::github::open::{select, tests::open_pr};

        let mut prs: Vec<_> = (1..=5).map(|n| open_pr(n, "api", n as u32, "bob")).collect();
        prs[4].is_draft = true;
        let listing = select(prs, None, 2);

        let mut out = Vec::new();
        write_open_list(&mut out, "PRs waiting for your review...", &listing).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Showing 2 of 5 PRs (use --limit to see more):"));
        assert!(text.contains("  acme/api #5  PR 5"));
        assert!(text.contains("[draft]"));
        assert!(text.contains("(@bob, opened 2026-02-04)"));
        assert!(!text.contains("#3"));
    }

    #[test]
    fn test_open_list_without_limit() {
        use crate::github::open::{select, tests::open_pr};

        let listing = select(vec![open_pr(1, "web", 1, "bob")], None, 20);
        let mut out = Vec::new();
        write_open_list(&mut out, "heading", &listing).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Found 1 PRs:"));
        assert!(text.contains("https://github.com/acme/web/pull/1"));
    }

    #[test]
    fn test_breakdown_lines() {
        use crate::github::open::{breakdown, tests::open_pr};

        let stats = breakdown(&[
            open_pr(1, "api", 1, "bob"),
            open_pr(2, "api", 1, "dependabot"),
            open_pr(3, "web", 1, "bob"),
        ]);
        let mut out = Vec::new();
        write_breakdown(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("PR Review Stats (3 total)"));
        let repo_pos = text.find("acme/api").unwrap();
        assert!(repo_pos < text.find("acme/web").unwrap());
        assert!(text.contains("By Type:"));
        assert!(text.contains("  dependabot"));
    }

    #[test]
    fn test_open_json_empty_is_array() {
        let mut out = Vec::new();
        write_json(&mut out, &Vec::<crate::github::OpenPullRequest>::new()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[]\n");
    }
}
