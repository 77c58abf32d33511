use crate::item::{Bucket, Item};

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.com/product-reviews";

/// Builds review page URLs for an item code.
#[derive(Debug, Clone)]
pub struct PageLocator {
    base_url: String,
}

impl Default for PageLocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl PageLocator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Locators for pages `start..=end` of one bucket, in fetch order.
    ///
    /// General always leads with the non-paginated "show all" locator, even
    /// when the page range is empty.
    pub fn locate(&self, code: &str, bucket: Bucket, start: u32, end: u32) -> Vec<String> {
        let base = &self.base_url;
        match bucket {
            Bucket::General => {
                let first = format!(
                    "{base}/{code}/ref=cm_cr_dp_d_show_all_btm?ie=UTF8&reviewerType=all_reviews"
                );
                std::iter::once(first)
                    .chain((start..=end).map(|page| {
                        format!(
                            "{base}/{code}/ref=cm_cr_arp_d_paging_btm_next_{page}\
                             ?ie=UTF8&reviewerType=all_reviews&pageNumber={page}"
                        )
                    }))
                    .collect()
            }
            Bucket::Critical | Bucket::Positive => {
                let filter = bucket.as_str();
                (start..=end)
                    .map(|page| {
                        format!(
                            "{base}/{code}/ref=cm_cr_arp_d_viewopt_sr\
                             ?ie=UTF8&reviewerType=all_reviews&filterByStar={filter}&pageNumber={page}"
                        )
                    })
                    .collect()
            }
        }
    }

    /// Locators covering the item's current start page through its ceiling.
    pub fn for_item(&self, item: &Item, bucket: Bucket) -> Vec<String> {
        self.locate(
            &item.code,
            bucket,
            item.start_page(bucket),
            item.max_pages(bucket),
        )
    }
}
