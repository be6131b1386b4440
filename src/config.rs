use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Debug, fs, ops::RangeBounds, path::Path, path::PathBuf};

/// Analysis configuration.
///
/// Loaded from a TOML file and validated before use; every field has a
/// default matching the advertisement dataset. See [`Config::from_file`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Input CSV file.
    pub input: PathBuf,

    /// Key column sets to aggregate by, in order.
    pub group_by: Vec<Vec<String>>,

    /// Number of most frequent values kept per column.
    pub top_values: usize,
    /// Number of values shown in the categorical summary.
    pub categorical_top: usize,
    /// Maximum displayed length of a value before it is elided.
    pub display_width: usize,

    /// Number of rows between progress messages.
    pub progress_every: u64,

    /// Columns used for the final dataset insights.
    pub insights: Insights,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Insights {
    pub spend: String,
    pub impressions: String,
    pub advertiser: String,
    pub ad: String,
    pub date: String,
    pub sponsor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("2024_fb_ads_president_scored_anon.csv"),
            group_by: vec![
                vec!["page_id".to_owned()],
                vec!["page_id".to_owned(), "ad_id".to_owned()],
            ],
            top_values: 5,
            categorical_top: 3,
            display_width: 50,
            progress_every: 50_000,
            insights: Insights::default(),
        }
    }
}

impl Default for Insights {
    fn default() -> Self {
        Self {
            spend: "estimated_spend".to_owned(),
            impressions: "estimated_impressions".to_owned(),
            advertiser: "page_id".to_owned(),
            ad: "ad_id".to_owned(),
            date: "ad_creation_time".to_owned(),
            sponsor: "bylines".to_owned(),
        }
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.top_values, 1..=100).context("invalid number of top values")?;
        check_num(self.categorical_top, 1..=self.top_values)
            .context("invalid number of categorical top values")?;
        check_num(self.display_width, 4..=1000).context("invalid display width")?;
        check_num(self.progress_every, 1..).context("invalid progress interval")?;

        for (i_set, keys) in self.group_by.iter().enumerate() {
            check_keys(keys).with_context(|| format!("invalid group_by set {i_set}"))?;
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_keys(keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        bail!("key set must not be empty");
    }
    if keys.iter().any(|key| key.trim().is_empty()) {
        bail!("key names must not be empty");
    }
    let mut seen = HashSet::new();
    if let Some(key) = keys.iter().find(|key| !seen.insert(key.as_str())) {
        bail!("key {key:?} is repeated");
    }
    Ok(())
}
