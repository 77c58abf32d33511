mod assemble;
mod config;
mod driver;
mod error;
mod extract;
mod fetch;
mod item;
mod locator;
mod logging;
mod pacing;
mod sink;
mod text;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{Config, FetcherKind};
use crate::driver::{apply_global_max_pages, begin_bucket, RunStats, ScrapeDriver};
use crate::fetch::{AnyFetcher, BrowserFetcher, HttpFetcher};
use crate::item::Bucket;
use crate::locator::PageLocator;
use crate::sink::CsvSink;

#[derive(Parser)]
#[command(name = "review_scraper", about = "Product review scraper driven by a headless browser")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every configured item and bucket into CSV files
    Run {
        /// Path to the JSON config
        #[arg(short, long, default_value = "scrape.json")]
        config: PathBuf,
        /// Only scrape items with this display name (repeatable)
        #[arg(short, long = "item")]
        items: Vec<String>,
        /// Reuse an earlier run timestamp and append to its files
        #[arg(long, value_name = "TIMESTAMP")]
        resume_run: Option<String>,
        /// Override the config's output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override the config's log directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print the review pages a run would fetch
    Plan {
        /// Path to the JSON config
        #[arg(short, long, default_value = "scrape.json")]
        config: PathBuf,
        /// Only plan items with this display name (repeatable)
        #[arg(short, long = "item")]
        items: Vec<String>,
        /// URLs shown per bucket
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            items,
            resume_run,
            output_dir,
            log_dir,
        } => {
            let cfg = Config::load(&config)?;
            let run_id =
                resume_run.unwrap_or_else(|| chrono::Local::now().format("%Y%m%d%H%M%S").to_string());
            let log_dir = log_dir.unwrap_or_else(|| cfg.log_dir.clone());
            let _log_guard = logging::init_with_run_log(&log_dir, &run_id)?;
            let output_dir = output_dir.unwrap_or_else(|| cfg.output_dir.clone());

            println!("Run {} writing to {}", run_id, output_dir.display());
            let outcome = run(&cfg, &items, &run_id, &output_dir).await;
            match outcome {
                Ok(stats) => {
                    print_stats(&stats);
                    Ok(())
                }
                Err((stats, e)) => {
                    print_stats(&stats);
                    Err(e)
                }
            }
        }
        Commands::Plan {
            config,
            items,
            limit,
        } => {
            logging::init_stdout();
            let cfg = Config::load(&config)?;
            plan(&cfg, &items, limit)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Scrape with the configured fetcher; the fetcher is closed on every exit path.
async fn run(
    cfg: &Config,
    only: &[String],
    run_id: &str,
    output_dir: &Path,
) -> Result<RunStats, (RunStats, anyhow::Error)> {
    let setup = async {
        let items = cfg.items(only)?;
        let sink = CsvSink::new(output_dir, run_id)
            .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?
            .with_retry_cooldown(cfg.write_retry_cooldown());
        let fetcher = match cfg.fetcher {
            FetcherKind::Browser => AnyFetcher::Browser(BrowserFetcher::launch(cfg.wait_for()).await?),
            FetcherKind::Http => AnyFetcher::Http(HttpFetcher::new(cfg.wait_for())?),
        };
        anyhow::Ok((items, sink, fetcher))
    };
    let (mut items, sink, fetcher) = setup.await.map_err(|e| (RunStats::default(), e))?;

    let mut driver = ScrapeDriver::new(&fetcher, sink, PageLocator::new(&cfg.base_url), cfg.pacing())
        .with_global_max_pages(cfg.global_max_pages)
        .with_timeout_policy(cfg.on_fetch_timeout);
    let result = driver.run(&mut items).await;
    let stats = driver.stats().clone();
    drop(driver);
    fetcher.close().await;

    result.map_err(|e| (stats, e.into()))
}

fn plan(cfg: &Config, only: &[String], limit: usize) -> anyhow::Result<()> {
    let locator = PageLocator::new(&cfg.base_url);
    let mut items = cfg.items(only)?;
    let mut total = 0;

    for item in &mut items {
        apply_global_max_pages(item, cfg.global_max_pages);
        println!("{} ({})", item.name, item.code);
        for bucket in Bucket::SCRAPE_ORDER {
            let fresh = begin_bucket(item, bucket);
            let urls = locator.for_item(item, bucket);
            total += urls.len();
            println!(
                "  {:<8} pages {}..={} | {} urls | {}",
                bucket,
                item.start_page(bucket),
                item.max_pages(bucket),
                urls.len(),
                if fresh { "new file with header" } else { "resume, no header" }
            );
            for url in urls.iter().take(limit) {
                println!("    {}", url);
            }
            if urls.len() > limit {
                println!("    ... {} more", urls.len() - limit);
            }
        }
    }

    println!("\n{} urls across {} items", total, items.len());
    Ok(())
}

fn print_stats(stats: &RunStats) {
    println!("Fetched:       {}", stats.pages_fetched);
    println!("Skipped:       {}", stats.pages_skipped);
    println!("Empty buckets: {}", stats.empty_buckets);
    println!("Rows written:  {}", stats.rows_written);
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
