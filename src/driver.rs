use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::assemble::{assemble, ColumnBundle, ItemConstants, COLUMN_NAMES};
use crate::config::TimeoutPolicy;
use crate::error::ScrapeError;
use crate::extract::extract_page;
use crate::fetch::PageFetcher;
use crate::item::{Bucket, BucketMap, Item};
use crate::locator::PageLocator;
use crate::pacing::Pacing;
use crate::sink::CsvSink;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub empty_buckets: usize,
    pub rows_written: usize,
}

/// Overwrite an item's ceilings with the run-wide override, if any.
pub fn apply_global_max_pages(item: &mut Item, global: Option<BucketMap<u32>>) {
    if let Some(max_pages) = global {
        item.set_max_pages(max_pages);
    }
}

/// Decide where a bucket starts. A bucket starting below the fresh-start
/// threshold is reset to its minimum page and reported as fresh.
pub fn begin_bucket(item: &mut Item, bucket: Bucket) -> bool {
    let fresh = item.starts_fresh(bucket);
    if fresh {
        item.reset_start_page(bucket);
    }
    fresh
}

/// Walks every item and bucket: locate, fetch, extract, assemble, persist,
/// then pause before the next page.
pub struct ScrapeDriver<'a, F> {
    fetcher: &'a F,
    sink: CsvSink,
    locator: PageLocator,
    pacing: Pacing,
    global_max_pages: Option<BucketMap<u32>>,
    on_fetch_timeout: TimeoutPolicy,
    rng: StdRng,
    stats: RunStats,
}

impl<'a, F: PageFetcher> ScrapeDriver<'a, F> {
    pub fn new(fetcher: &'a F, sink: CsvSink, locator: PageLocator, pacing: Pacing) -> Self {
        Self {
            fetcher,
            sink,
            locator,
            pacing,
            global_max_pages: None,
            on_fetch_timeout: TimeoutPolicy::Abort,
            rng: StdRng::from_os_rng(),
            stats: RunStats::default(),
        }
    }

    pub fn with_global_max_pages(mut self, global: Option<BucketMap<u32>>) -> Self {
        self.global_max_pages = global;
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.on_fetch_timeout = policy;
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Scrape every bucket of every item. An empty page only ends its own
    /// (item, bucket); any other error ends the run.
    pub async fn run(&mut self, items: &mut [Item]) -> Result<RunStats, ScrapeError> {
        for item in items.iter_mut() {
            apply_global_max_pages(item, self.global_max_pages);
            for bucket in Bucket::SCRAPE_ORDER {
                match self.scrape_bucket(item, bucket).await {
                    Ok(()) => {}
                    Err(ScrapeError::EmptyPage { url }) => {
                        info!(
                            "Found empty page for {} / {} at {}, moving to next set of pages",
                            item.name, bucket, url
                        );
                        self.stats.empty_buckets += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(self.stats.clone())
    }

    async fn scrape_bucket(&mut self, item: &mut Item, bucket: Bucket) -> Result<(), ScrapeError> {
        debug!("{} / {} start page {}", item.name, bucket, item.start_page(bucket));
        if begin_bucket(item, bucket) {
            self.sink.ensure_header(bucket, &item.name, &COLUMN_NAMES)?;
        }

        let urls = self.locator.for_item(item, bucket);
        if let (Some(first), Some(last)) = (urls.first(), urls.last()) {
            info!("extracting from {} to {}", first, last);
        }

        let pb = ProgressBar::new(urls.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(format!("{} {}", bucket, item.name));

        let result = self.scrape_pages(item, bucket, &urls, &pb).await;
        pb.finish_and_clear();
        result
    }

    async fn scrape_pages(
        &mut self,
        item: &Item,
        bucket: Bucket,
        urls: &[String],
        pb: &ProgressBar,
    ) -> Result<(), ScrapeError> {
        let constants = ItemConstants::from(item);

        for (idx, url) in urls.iter().enumerate() {
            info!("{} {} {} {}", idx, bucket, item.name, url);

            let html = match self.fetcher.fetch(url).await {
                Ok(html) => html,
                Err(e @ ScrapeError::FetchTimeout { .. })
                    if self.on_fetch_timeout == TimeoutPolicy::SkipPage =>
                {
                    warn!("Skipping page {} of {} / {}: {}", idx, item.name, bucket, e);
                    self.stats.pages_skipped += 1;
                    pb.inc(1);
                    self.pause().await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.stats.pages_fetched += 1;

            let bundle = ColumnBundle::new(url, constants.clone(), extract_page(&html));
            if bundle.is_ragged() {
                let lengths: Vec<String> = bundle
                    .column_lengths()
                    .iter()
                    .map(|(field, len)| format!("{}={}", field.column_name(), len))
                    .collect();
                debug!("Ragged columns on {}: {}", url, lengths.join(" "));
            }
            let rows = assemble(&bundle)?;
            self.stats.rows_written += self.sink.append(bucket, &item.name, &rows).await?;

            pb.inc(1);
            self.pause().await;
        }
        Ok(())
    }

    async fn pause(&mut self) {
        let sleep_for = self.pacing.sample(&mut self.rng);
        info!("sleeping for {:.2}s", sleep_for.as_secs_f64());
        tokio::time::sleep(sleep_for).await;
    }
}
