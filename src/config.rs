use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::fetch::WaitFor;
use crate::item::{BucketMap, Item};
use crate::locator::DEFAULT_BASE_URL;
use crate::pacing::Pacing;
use crate::sink::sanitize_item_name;

/// What to do when a page's review list never shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Stop the whole run.
    #[default]
    Abort,
    /// Log it and move on to the next page.
    SkipPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherKind {
    #[default]
    Browser,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemConfig {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub base_price: Option<f64>,
    #[serde(default)]
    pub config_price: Option<f64>,
    #[serde(default)]
    pub bundle_price: Option<f64>,
    #[serde(default)]
    pub max_pages: Option<BucketMap<u32>>,
    #[serde(default)]
    pub start_pages: Option<BucketMap<u32>>,
}

impl ItemConfig {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new(
            &self.code,
            &self.name,
            self.base_price,
            self.config_price,
            self.bundle_price,
        );
        if let Some(max) = self.max_pages {
            item = item.with_max_pages(max);
        }
        if let Some(start) = self.start_pages {
            item = item.with_start_pages(start);
        }
        item
    }
}

/// Run configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub items: Vec<ItemConfig>,
    #[serde(default = "default_sleep_mean")]
    pub sleep_mean_secs: f64,
    #[serde(default = "default_sleep_sigma")]
    pub sleep_sigma_secs: f64,
    #[serde(default)]
    pub global_max_pages: Option<BucketMap<u32>>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: f64,
    #[serde(default = "default_marker")]
    pub review_list_marker: String,
    #[serde(default)]
    pub on_fetch_timeout: TimeoutPolicy,
    #[serde(default)]
    pub fetcher: FetcherKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_retry_cooldown")]
    pub write_retry_cooldown_secs: f64,
}

fn default_sleep_mean() -> f64 {
    1.0
}
fn default_sleep_sigma() -> f64 {
    5.0
}
fn default_fetch_timeout() -> f64 {
    5.0
}
fn default_marker() -> String {
    "cm_cr-review_list".to_string()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("scrape_data")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("scrape_logs")
}
fn default_retry_cooldown() -> f64 {
    5.0
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            bail!("config lists no items");
        }
        let mut file_names: HashMap<Cow<'_, str>, &str> = HashMap::new();
        for item in &self.items {
            if item.code.trim().is_empty() || item.name.trim().is_empty() {
                bail!("every item needs a non-empty code and name");
            }
            if let Some(other) = file_names.insert(sanitize_item_name(&item.name), &item.name) {
                bail!(
                    "items {:?} and {:?} would write to the same store files",
                    other,
                    item.name
                );
            }
        }
        if !self.sleep_sigma_secs.is_finite() || self.sleep_sigma_secs < 0.0 {
            bail!("sleep_sigma_secs must be a non-negative number");
        }
        if !self.sleep_mean_secs.is_finite() {
            bail!("sleep_mean_secs must be a number");
        }
        for (field, secs) in [
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("write_retry_cooldown_secs", self.write_retry_cooldown_secs),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                bail!("{} must be a non-negative number of seconds", field);
            }
        }
        if self.review_list_marker.trim().is_empty() {
            bail!("review_list_marker must not be empty");
        }
        Ok(())
    }

    /// Items to scrape, optionally restricted to the given display names.
    pub fn items(&self, only: &[String]) -> Result<Vec<Item>> {
        for name in only {
            if !self.items.iter().any(|i| &i.name == name) {
                bail!("no configured item named {:?}", name);
            }
        }
        Ok(self
            .items
            .iter()
            .filter(|i| only.is_empty() || only.contains(&i.name))
            .map(ItemConfig::to_item)
            .collect())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(self.sleep_mean_secs, self.sleep_sigma_secs)
    }

    pub fn wait_for(&self) -> WaitFor {
        WaitFor {
            marker_id: self.review_list_marker.clone(),
            timeout: Duration::from_secs_f64(self.fetch_timeout_secs),
        }
    }

    pub fn write_retry_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.write_retry_cooldown_secs)
    }
}
