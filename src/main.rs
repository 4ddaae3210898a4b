use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::{debug, info};
use std::fs;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use ytsearch::cli::{Cli, Commands};
use ytsearch::output::{self, OutputFormatterTrait};
use ytsearch::query::{build_query, resolve_date};
use ytsearch::{Config, FixtureExecutor, SearchOrchestrator, SearchRequest, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;
    debug!("Running command: {:?}", cli.command);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let use_color = std::io::stdout().is_terminal();
    let formatter = output::formatter(cli.format, use_color);

    match cli.command {
        Commands::Query { conditions } => {
            let query = build_query(&conditions)?;
            print!("{}", formatter.values("query", &[query]));
        }
        Commands::ResolveDate { token, today } => {
            let now = match today {
                Some(day) => midnight(day)?,
                None => chrono::Utc::now(),
            };
            let date = resolve_date(&token, now)?;
            print!(
                "{}",
                formatter.values("date", &[date.format("%Y-%m-%d").to_string()])
            );
        }
        Commands::Search {
            fixture,
            project,
            assignee,
            state,
            priority,
            text,
            conditions,
            created_since,
            unresolved,
            limit,
            offset,
            sort,
            order,
            repeat,
            metrics,
        } => {
            let engine = fixture_engine(&config, &fixture)?;

            let mut request = SearchRequest::new().include_resolved(!unresolved);
            request.project = project;
            request.assignee = assignee;
            request.state = state;
            request.priority = priority;
            request.text = text;
            request.conditions = conditions;
            request.limit = limit;
            request.offset = offset;
            request.sort_field = sort;
            request.sort_order = order;
            if let Some(since) = created_since {
                request = request.with_date_range("created", Some(&since), None);
            }

            run_searches(&engine, &request, repeat.max(1), formatter.as_ref()).await?;

            print!(
                "{}",
                formatter.analytics(&engine.analytics(), &engine.cache_stats())
            );
            if metrics {
                print!("{}", engine.metrics().gather());
            }
        }
        Commands::Suggest { prefix, limit } => {
            let engine = SearchOrchestrator::new(
                config.engine.clone(),
                Arc::new(FixtureExecutor::new(Vec::new())),
                Arc::new(SystemClock),
            )?;
            print!(
                "{}",
                formatter.values("suggestions", &engine.suggestions(&prefix, limit))
            );
        }
    }
    Ok(())
}

async fn run_searches(
    engine: &SearchOrchestrator,
    request: &SearchRequest,
    repeat: usize,
    formatter: &dyn OutputFormatterTrait,
) -> Result<()> {
    for run in 1..=repeat {
        let result = engine
            .search(request)
            .await
            .with_context(|| format!("search run {run} of {repeat} failed"))?;
        print!("{}", formatter.search_result(&result));
    }
    Ok(())
}

fn fixture_engine(config: &Config, path: &Path) -> Result<SearchOrchestrator> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let executor = FixtureExecutor::from_json(&json)
        .with_context(|| format!("fixture {} is not a JSON array of issues", path.display()))?;
    info!("Loaded {} issues from {}", executor.len(), path.display());

    let engine = SearchOrchestrator::new(
        config.engine.clone(),
        Arc::new(executor),
        Arc::new(SystemClock),
    )?;
    Ok(engine)
}

fn midnight(day: NaiveDate) -> Result<chrono::DateTime<chrono::Utc>> {
    let start = day
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("no midnight on {day}"))?;
    Ok(start.and_utc())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir)
                    .with_context(|| format!("failed to create {}", parent_dir.display()))?;
            }
        }
        let log_file = fs::File::create(log_path)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder.try_init().context("failed to initialise logging")?;
    Ok(())
}
