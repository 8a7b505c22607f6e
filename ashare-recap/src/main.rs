use anyhow::{bail, Context, Result};
use ashare_common::logging::{generate_run_id, init_logging};
use ashare_common::Config;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use ashare_recap::data::{EastmoneyKlineFetcher, HtmlPageProvider};
use ashare_recap::grid::GridService;
use ashare_recap::news::{render_news_at, NewsDigest};
use ashare_recap::recap::{
    build_resolver, orchestrator_config, save_markdown, save_report, ReportAssembler,
    ScrapeOrchestrator,
};
use ashare_recap::watch::{PriceWatcher, SinaQuoteSource};

/// A-share daily recap, grid advice, headlines and price watching.
#[derive(Parser, Debug)]
#[command(name = "ashare-recap")]
#[command(author = "theonlyhennygod")]
#[command(version)]
#[command(about = "A-share daily recap and grid-trading advisor", long_about = None)]
struct Cli {
    /// Config file (default: ~/.ashare-recap/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape indices, ledger and sectors and write the recap report
    Recap {
        /// Sectors whose leaders are looked up
        #[arg(long)]
        top_k: Option<usize>,

        /// Report directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Trading day, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Recommend a grid width and backtest it
    Grid {
        /// Security code, repeatable (default: configured stocks)
        #[arg(long = "code")]
        codes: Vec<String>,

        /// Daily candles to fetch
        #[arg(long)]
        days: Option<u32>,
    },

    /// Write the front-page headline digest
    News {
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Watch configured stocks against their buy/sell prices until Ctrl-C
    Watch,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Recap { .. } => "recap",
            Self::Grid { .. } => "grid",
            Self::News { .. } => "news",
            Self::Watch => "watch",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_and_validate(cli.config.as_deref())?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    let span = info_span!("run", run_id = %generate_run_id(), command = cli.command.name());

    match cli.command {
        Commands::Recap { top_k, out, date } => {
            run_recap(config, top_k, out, date).instrument(span).await
        }
        Commands::Grid { codes, days } => run_grid(config, codes, days).instrument(span).await,
        Commands::News { out } => run_news(config, out).instrument(span).await,
        Commands::Watch => run_watch(config).instrument(span).await,
    }
}

async fn run_recap(
    mut config: Config,
    top_k: Option<usize>,
    out: Option<PathBuf>,
    date: Option<NaiveDate>,
) -> Result<()> {
    if let Some(k) = top_k {
        config.recap.top_k = k;
    }
    let trade_date = date.unwrap_or_else(|| Local::now().date_naive());
    info!(%trade_date, top_k = config.recap.top_k, "Starting recap");

    let resolver = Arc::new(build_resolver(&config));
    let orchestrator = ScrapeOrchestrator::new(resolver, orchestrator_config(&config, trade_date));

    let outcomes = match orchestrator.build_recap().await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            let stage = e.failed_stage().map(|s| s.as_str()).unwrap_or("unknown");
            error!(stage, error = %e, "Recap aborted, no report written");
            std::process::exit(1);
        }
    };

    let now = Local::now().naive_local();
    let text = ReportAssembler::new(config.recap.ledger_limit).render_at(&outcomes, now);
    let dir = out.unwrap_or_else(|| config.recap.report_dir_path());
    let path = save_report(&dir, &text, now).context("Failed to save recap report")?;

    info!(path = %path.display(), "Recap report written");
    println!("{}", path.display());
    Ok(())
}

async fn run_grid(config: Config, codes: Vec<String>, days: Option<u32>) -> Result<()> {
    let codes = if codes.is_empty() {
        config.stocks.iter().map(|s| s.code.clone()).collect()
    } else {
        codes
    };
    if codes.is_empty() {
        bail!("No codes given and no stocks configured");
    }

    let fetcher = Arc::new(EastmoneyKlineFetcher::new(config.sources.call_timeout()));
    let mut service = GridService::new(fetcher, &config.grid);
    if let Some(days) = days {
        service = service.with_lookback(days);
    }

    let mut failures = 0usize;
    for code in &codes {
        match service.advise(code).await {
            Ok(result) => {
                println!("{}: {}", code, result.narrative);
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Err(e) => {
                failures += 1;
                error!(code = %code, error = %e, "Grid analysis failed");
            }
        }
    }

    if failures == codes.len() {
        bail!("Grid analysis failed for every code");
    }
    Ok(())
}

async fn run_news(config: Config, out: Option<PathBuf>) -> Result<()> {
    let pages = Arc::new(HtmlPageProvider::from_config(&config));
    let digest = NewsDigest::new(pages, config.sources.call_timeout());

    let headlines = digest
        .fetch_headlines()
        .await
        .context("Headline extraction failed")?;

    let now = Local::now().naive_local();
    let text = render_news_at(&headlines, now);
    let dir = out.unwrap_or_else(|| config.recap.news_dir_path());
    let path = save_markdown(&dir, "中央新闻", &text, now).context("Failed to save headlines")?;

    info!(path = %path.display(), count = headlines.len(), "Headlines written");
    println!("{}", path.display());
    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    if config.stocks.is_empty() {
        bail!("No stocks configured to watch");
    }

    let source = Arc::new(SinaQuoteSource::new(config.sources.call_timeout()));
    let watcher = PriceWatcher::new(
        source,
        &config.stocks,
        &config.watch,
        Local::now().naive_local(),
    );
    watcher.run().await
}
