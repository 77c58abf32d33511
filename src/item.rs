use std::fmt;
use std::ops::{Index, IndexMut};

use serde::Deserialize;

/// The source site never lists more than this many review pages.
pub const MAX_PAGES: u32 = 500;

/// A starting page below this means the bucket is scraped from the beginning.
pub const FRESH_START_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    General,
    Critical,
    Positive,
}

impl Bucket {
    /// Order in which an item's buckets are scraped.
    pub const SCRAPE_ORDER: [Bucket; 3] = [Bucket::Critical, Bucket::Positive, Bucket::General];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::General => "general",
            Bucket::Critical => "critical",
            Bucket::Positive => "positive",
        }
    }

    /// Lowest page a bucket may start from. General starts at 2 because its
    /// leading "show all" locator already covers the first page.
    pub fn min_start_page(self) -> u32 {
        match self {
            Bucket::General => 2,
            Bucket::Critical | Bucket::Positive => 1,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One value per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketMap<T> {
    pub general: T,
    pub critical: T,
    pub positive: T,
}

impl<T: Copy> BucketMap<T> {
    pub fn splat(value: T) -> Self {
        Self {
            general: value,
            critical: value,
            positive: value,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Bucket) -> T) -> Self {
        Self {
            general: f(Bucket::General),
            critical: f(Bucket::Critical),
            positive: f(Bucket::Positive),
        }
    }
}

impl<T> Index<Bucket> for BucketMap<T> {
    type Output = T;

    fn index(&self, bucket: Bucket) -> &T {
        match bucket {
            Bucket::General => &self.general,
            Bucket::Critical => &self.critical,
            Bucket::Positive => &self.positive,
        }
    }
}

impl<T> IndexMut<Bucket> for BucketMap<T> {
    fn index_mut(&mut self, bucket: Bucket) -> &mut T {
        match bucket {
            Bucket::General => &mut self.general,
            Bucket::Critical => &mut self.critical,
            Bucket::Positive => &mut self.positive,
        }
    }
}

/// A catalog item whose reviews get scraped.
///
/// Page ceilings and starting pages are kept clamped: every ceiling lies in
/// `[bucket minimum, MAX_PAGES]` and every starting page in
/// `[bucket minimum, ceiling]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub code: String,
    pub name: String,
    pub base_price: Option<f64>,
    pub config_price: Option<f64>,
    pub bundle_price: Option<f64>,
    max_pages: BucketMap<u32>,
    start_pages: BucketMap<u32>,
}

impl Item {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        base_price: Option<f64>,
        config_price: Option<f64>,
        bundle_price: Option<f64>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            base_price,
            config_price,
            bundle_price,
            max_pages: BucketMap::splat(MAX_PAGES),
            start_pages: BucketMap::from_fn(Bucket::min_start_page),
        }
    }

    pub fn with_max_pages(mut self, max_pages: BucketMap<u32>) -> Self {
        self.set_max_pages(max_pages);
        self
    }

    pub fn with_start_pages(mut self, start_pages: BucketMap<u32>) -> Self {
        for bucket in Bucket::SCRAPE_ORDER {
            self.set_start_page(bucket, start_pages[bucket]);
        }
        self
    }

    pub fn max_pages(&self, bucket: Bucket) -> u32 {
        self.max_pages[bucket]
    }

    pub fn start_page(&self, bucket: Bucket) -> u32 {
        self.start_pages[bucket]
    }

    /// Replace all ceilings. Starting pages are re-clamped against them.
    pub fn set_max_pages(&mut self, max_pages: BucketMap<u32>) {
        for bucket in Bucket::SCRAPE_ORDER {
            self.max_pages[bucket] = max_pages[bucket].clamp(bucket.min_start_page(), MAX_PAGES);
            let start = self.start_pages[bucket];
            self.set_start_page(bucket, start);
        }
    }

    pub fn set_start_page(&mut self, bucket: Bucket, page: u32) {
        self.start_pages[bucket] = page.clamp(bucket.min_start_page(), self.max_pages[bucket]);
    }

    /// Whether the bucket starts from the beginning rather than resuming a
    /// truncated range.
    pub fn starts_fresh(&self, bucket: Bucket) -> bool {
        self.start_pages[bucket] < FRESH_START_THRESHOLD
    }

    pub fn reset_start_page(&mut self, bucket: Bucket) {
        self.start_pages[bucket] = bucket.min_start_page();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Item {
        Item::new("B09B8W5FW7", "Echo_Dot", Some(39.99), None, None)
    }

    #[test]
    fn defaults_use_bucket_minimums_and_full_range() {
        let item = echo();
        assert_eq!(item.start_page(Bucket::General), 2);
        assert_eq!(item.start_page(Bucket::Critical), 1);
        assert_eq!(item.start_page(Bucket::Positive), 1);
        for bucket in Bucket::SCRAPE_ORDER {
            assert_eq!(item.max_pages(bucket), MAX_PAGES);
        }
    }

    #[test]
    fn values_above_limit_clamp_to_500() {
        let item = echo()
            .with_max_pages(BucketMap::splat(900))
            .with_start_pages(BucketMap::splat(750));
        for bucket in Bucket::SCRAPE_ORDER {
            assert_eq!(item.max_pages(bucket), 500);
            assert_eq!(item.start_page(bucket), 500);
        }
    }

    #[test]
    fn start_below_minimum_clamps_to_minimum() {
        let item = echo().with_start_pages(BucketMap::splat(0));
        assert_eq!(item.start_page(Bucket::General), 2);
        assert_eq!(item.start_page(Bucket::Critical), 1);
        assert_eq!(item.start_page(Bucket::Positive), 1);
    }

    #[test]
    fn lowering_ceiling_pulls_start_down() {
        let mut item = echo().with_start_pages(BucketMap::splat(40));
        item.set_max_pages(BucketMap::splat(10));
        assert_eq!(item.start_page(Bucket::Critical), 10);
        assert_eq!(item.max_pages(Bucket::Critical), 10);
    }

    #[test]
    fn ceiling_never_drops_below_bucket_minimum() {
        let item = echo().with_max_pages(BucketMap::splat(0));
        assert_eq!(item.max_pages(Bucket::General), 2);
        assert_eq!(item.max_pages(Bucket::Positive), 1);
    }

    #[test]
    fn fresh_start_threshold() {
        let mut item = echo().with_start_pages(BucketMap {
            general: 2,
            critical: 3,
            positive: 1,
        });
        assert!(item.starts_fresh(Bucket::General));
        assert!(!item.starts_fresh(Bucket::Critical));
        assert!(item.starts_fresh(Bucket::Positive));

        item.set_start_page(Bucket::Positive, 2);
        item.reset_start_page(Bucket::Positive);
        assert_eq!(item.start_page(Bucket::Positive), 1);
    }
}
