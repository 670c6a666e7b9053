mod config;
mod github;
mod model;
mod prompt;
mod report;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use config::{Config, ModelSettings};
use github::open::OpenQuery;
use github::query::DateRange;
use github::{GitHubClient, GitHubError, SourcedRecord, TeamId};
use model::bedrock::{BedrockConnector, SsoLogin};
use model::{Connector, CredentialRefresher, ModelInvoker, ModelRequest, SessionTarget};

/// Plantir: summarizes merged pull requests reviewed by a GitHub team,
/// and reviews single pull requests, using Claude on AWS Bedrock.
#[derive(Parser, Debug)]
#[command(name = "plantir", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize merged PRs reviewed by a team
    Summary(SummaryArgs),
    /// Get an AI review of a single PR
    Review(ReviewArgs),
    /// List open PRs waiting for your review
    List(OpenArgs),
    /// List open PRs where you're mentioned or involved in discussions
    Mentions(OpenArgs),
    /// Count open PRs waiting for your review by repository and type
    Stats,
    /// Interactively set the default AWS profile, region and model
    Config,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// AWS named profile (overrides config)
    #[arg(long)]
    profile: Option<String>,

    /// AWS region (overrides config)
    #[arg(long)]
    region: Option<String>,

    /// Bedrock model ID (overrides config)
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Team to summarize (format: org/team)
    #[arg(long)]
    team: String,

    /// Date or inclusive range (YYYY-MM-DD or YYYY-MM-DD..YYYY-MM-DD)
    #[arg(long)]
    time: String,

    #[command(flatten)]
    model: ModelArgs,

    /// Output the merged PR data as JSON instead of a summary
    #[arg(long, conflicts_with = "list")]
    json: bool,

    /// List the merged PRs instead of summarizing them
    #[arg(long)]
    list: bool,

    /// Write the summary as markdown to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Filter by repository name (case-insensitive substring)
    #[arg(long)]
    repo: Option<String>,

    /// Maximum number of PRs to show (0 for unlimited)
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
    pr_url: String,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Summary(args) => run_summary(args).await,
        Command::Review(args) => run_review(args).await,
        Command::List(args) => {
            run_open(
                OpenQuery::ReviewRequested,
                args,
                "PRs waiting for your review...",
                "No PRs waiting for your review!",
            )
            .await
        }
        Command::Mentions(args) => {
            run_open(
                OpenQuery::Mentions,
                args,
                "PRs where you're mentioned or involved...",
                "No PRs with mentions or discussions!",
            )
            .await
        }
        Command::Stats => run_stats().await,
        Command::Config => run_config(),
    }
}

async fn run_summary(args: SummaryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let team = TeamId::parse(&args.team).ok_or_else(|| GitHubError::InvalidTeam(args.team.clone()))?;
    let range = DateRange::parse(&args.time)?;
    let _span = info_span!("summary", team = %team, range = %range).entered();

    info!("loading configuration");
    let config = Config::load()?;
    let client = GitHubClient::from_config(&config)?;

    eprintln!("Fetching merged PRs for team {} ({} to {})...", team, range.start, range.end);
    let records = github::aggregate::merged_for_team(
        &client,
        &team,
        &range,
        &config.search.excluded_authors,
    )
    .await?;
    eprintln!("Found {} merged PRs.", records.len());
    if records.is_empty() {
        return Ok(());
    }

    if args.list {
        report::write_list(&mut std::io::stdout().lock(), &records)?;
        return Ok(());
    }
    if args.json {
        report::write_json(&mut std::io::stdout().lock(), &records)?;
        return Ok(());
    }

    let settings = model_settings(&config, &args.model);
    let mut invoker = connect_model(&settings).await?;
    let text = summarize(&mut invoker, &records, settings.max_tokens).await?;

    let summary = report::Summary {
        team: team.to_string(),
        range: range.to_string(),
        pr_count: records.len(),
        text,
    };
    report::output_summary(&summary, args.output.as_deref())?;
    info!("done");
    Ok(())
}

async fn run_review(args: ReviewArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pr_url = github::parse_pr_url(&args.pr_url)?;
    let _span = info_span!("review", pr_url = %args.pr_url).entered();

    let config = Config::load()?;
    let client = GitHubClient::from_config(&config)?;

    eprintln!("Fetching PR #{} from {}/{}...", pr_url.pr_number, pr_url.owner, pr_url.repo);
    let detail = client.pull_request(&pr_url).await?;
    if detail.diff.trim().is_empty() {
        eprintln!("PR has no changes");
        return Ok(());
    }

    let (prompt, truncated) = prompt::build_review(&detail);
    if truncated {
        eprintln!("Note: Diff was truncated due to size");
    }

    let settings = model_settings(&config, &args.model);
    let request = ModelRequest::single_turn(prompt, None, settings.max_tokens);

    let mut invoker = connect_model(&settings).await?;
    eprintln!("Analyzing with Claude...");
    let review = invoker.invoke(&request).await?;
    report::print_review(&detail, &review);
    Ok(())
}

async fn run_open(
    query: OpenQuery,
    args: OpenArgs,
    heading: &str,
    empty: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let _span = info_span!("open", query = ?query).entered();
    let config = Config::load()?;
    let client = GitHubClient::from_config(&config)?;

    let prs = github::open::fetch_open(&client, query).await?;
    let listing = github::open::select(prs, args.repo.as_deref(), args.limit);
    debug!(shown = listing.shown.len(), total = listing.total, "selected open PRs");

    if args.json {
        report::write_json(&mut std::io::stdout().lock(), &listing.shown)?;
    } else if listing.total == 0 {
        println!("{}", empty);
    } else {
        report::write_open_list(&mut std::io::stdout().lock(), heading, &listing)?;
    }
    Ok(())
}

async fn run_stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let client = GitHubClient::from_config(&config)?;

    let prs = github::open::fetch_open(&client, OpenQuery::ReviewRequested).await?;
    if prs.is_empty() {
        println!("No PRs waiting for your review!");
        return Ok(());
    }
    report::write_breakdown(&mut std::io::stdout().lock(), &github::open::breakdown(&prs))?;
    Ok(())
}

fn run_config() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::path::Path::new(config::CONFIG_FILE);
    let mut config = if path.exists() {
        Config::load_from(path)?
    } else {
        Config::default()
    };

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    config.prompt_model_settings(&mut input, &mut out)?;
    config.save_to(path)?;

    println!("\nConfig saved to {}.", path.display());
    Ok(())
}

fn model_settings(config: &Config, args: &ModelArgs) -> ModelSettings {
    config.model_settings(
        args.profile.as_deref(),
        args.region.as_deref(),
        args.model.as_deref(),
    )
}

/// Build the summary prompt and send it. An oversized prompt fails here,
/// before anything is sent to the model.
async fn summarize<K: Connector, R: CredentialRefresher>(
    invoker: &mut ModelInvoker<K, R>,
    records: &[SourcedRecord],
    max_tokens: u32,
) -> Result<String, Box<dyn std::error::Error>> {
    let prompt = prompt::build_summary(records.iter().map(|r| &r.record))?;
    debug!(prompt_chars = prompt.chars().count(), "built summary prompt");

    let request = ModelRequest::single_turn(prompt, Some(prompt::SUMMARY_SYSTEM_PROMPT), max_tokens);
    eprintln!("Generating summary...");
    Ok(invoker.invoke(&request).await?)
}

async fn connect_model(
    settings: &ModelSettings,
) -> Result<ModelInvoker<BedrockConnector, SsoLogin>, model::ModelError> {
    let target = SessionTarget {
        profile: settings.profile.clone(),
        region: settings.region.clone(),
        model: settings.model.clone(),
    };
    let invoker = ModelInvoker::connect(BedrockConnector, SsoLogin::default(), target).await?;
    debug!(model = %invoker.target().model, region = %invoker.target().region, "model session ready");
    Ok(invoker)
}
