use crate::columnar::ColumnarTable;
use crate::config::Config;
use crate::dataset::RowReader;
use crate::group::GroupAggregator;
use crate::profile::DatasetProfiler;
use crate::summary::DatasetSummary;
use crate::table::Table;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tolerance under which aggregated totals count as preserved.
pub const TOTAL_TOLERANCE: f64 = 0.01;

pub const ORIGINAL_TITLE: &str = "Original Dataset Analysis";

/// Which processing strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Streaming,
    Table,
    Columnar,
    All,
}

/// A strategy computing the full analysis of the configured dataset.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn analyze(&self, cfg: &Config) -> Result<Analysis>;
}

/// Dataset re-summarized after aggregating by `keys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub keys: Vec<String>,
    pub summary: DatasetSummary,
}

/// Totals of one numeric column before and after every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTotals {
    pub column: String,
    pub original: f64,
    /// One entry per aggregation; `None` when the column is one of its keys.
    pub aggregated: Vec<Option<f64>>,
}

impl ColumnTotals {
    pub fn preserved(&self, i_agg: usize) -> Option<bool> {
        self.aggregated
            .get(i_agg)
            .copied()
            .flatten()
            .map(|total| (total - self.original).abs() < TOTAL_TOLERANCE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub backend: String,
    pub elapsed_secs: f64,
    /// Estimated bytes retained by the backend's data structures.
    pub footprint_bytes: usize,
    pub original: DatasetSummary,
    pub aggregations: Vec<Aggregation>,
    pub totals: Vec<ColumnTotals>,
}

impl Analysis {
    fn new(
        backend: &str,
        start: Instant,
        footprint_bytes: usize,
        original: DatasetSummary,
        aggregations: Vec<Aggregation>,
    ) -> Self {
        let totals = compute_totals(&original, &aggregations);
        Self {
            backend: backend.to_owned(),
            elapsed_secs: start.elapsed().as_secs_f64(),
            footprint_bytes,
            original,
            aggregations,
            totals,
        }
    }
}

/// Aggregated tables keep the source column order, so columns are matched by
/// position and repeated header names stay distinct.
pub fn compute_totals(original: &DatasetSummary, aggregations: &[Aggregation]) -> Vec<ColumnTotals> {
    original
        .columns
        .iter()
        .enumerate()
        .filter_map(|(i_col, col)| col.numeric.as_ref().map(|num| (i_col, col, num)))
        .map(|(i_col, col, num)| ColumnTotals {
            column: col.name.clone(),
            original: num.sum,
            aggregated: aggregations
                .iter()
                .map(|agg| {
                    if agg.keys.contains(&col.name) {
                        return None;
                    }
                    let sum = agg
                        .summary
                        .columns
                        .get(i_col)
                        .and_then(|col| col.numeric.as_ref())
                        .map_or(0.0, |num| num.sum);
                    Some(sum)
                })
                .collect(),
        })
        .collect()
}

pub fn aggregation_title(keys: &[String]) -> String {
    match keys {
        [key] => format!("Analysis After Aggregation by {key}"),
        _ => format!("Analysis After Aggregation by ({})", keys.join(", ")),
    }
}

/// Run `group` for every configured key set, skipping sets naming unknown columns.
fn aggregate_all<F>(cfg: &Config, mut group: F) -> Result<Vec<Aggregation>>
where
    F: FnMut(&[String]) -> Result<Option<DatasetSummary>>,
{
    let mut aggregations = Vec::with_capacity(cfg.group_by.len());
    for keys in &cfg.group_by {
        if let Some(summary) = group(keys)? {
            aggregations.push(Aggregation {
                keys: keys.clone(),
                summary,
            });
        }
    }
    Ok(aggregations)
}

fn warn_skipped_keys(keys: &[String], error: &anyhow::Error) {
    log::warn!("skipping aggregation by {}: {error:#}", keys.join(", "));
}

/// Single pass over the file with running per-column and per-group aggregates.
pub struct StreamingBackend;

impl Backend for StreamingBackend {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn analyze(&self, cfg: &Config) -> Result<Analysis> {
        let start = Instant::now();
        let mut reader = RowReader::open(&cfg.input, cfg.progress_every)?;
        let headers = reader.headers().to_vec();

        let mut profiler = DatasetProfiler::new(ORIGINAL_TITLE, &headers, cfg.top_values);
        let mut aggregators = Vec::with_capacity(cfg.group_by.len());
        for keys in &cfg.group_by {
            match GroupAggregator::new(&headers, keys) {
                Ok(agg) => aggregators.push(agg),
                Err(error) => warn_skipped_keys(keys, &error),
            }
        }

        while reader.read_row()? {
            let row: Vec<&str> = reader.cells().collect();
            profiler.add_row(row.iter().copied());
            for agg in &mut aggregators {
                agg.add_row(&row);
            }
        }

        let footprint = profiler.footprint()
            + aggregators
                .iter()
                .map(GroupAggregator::footprint)
                .sum::<usize>();
        let original = profiler.finish(reader.invalid_cells());
        let kinds = original.kinds();

        let mut aggregators = aggregators.into_iter().peekable();
        let aggregations = aggregate_all(cfg, |keys| {
            let Some(agg) = aggregators.next_if(|agg| agg.keys() == keys) else {
                return Ok(None);
            };
            let table = agg.finish(&kinds);
            let mut profiler =
                DatasetProfiler::new(&aggregation_title(keys), table.headers(), cfg.top_values);
            for row in table.rows() {
                profiler.add_row(row.iter().map(String::as_str));
            }
            Ok(Some(profiler.finish(0)))
        })?;

        Ok(Analysis::new(
            self.name(),
            start,
            footprint,
            original,
            aggregations,
        ))
    }
}

/// Whole dataset materialized as rows before any statistic is computed.
pub struct TableBackend;

impl Backend for TableBackend {
    fn name(&self) -> &'static str {
        "table"
    }

    fn analyze(&self, cfg: &Config) -> Result<Analysis> {
        let start = Instant::now();
        let reader = RowReader::open(&cfg.input, cfg.progress_every)?;
        let table = Table::load(reader).context("failed to load table")?;

        let original = table.summarize(ORIGINAL_TITLE, cfg.top_values);
        let kinds = original.kinds();

        let aggregations = aggregate_all(cfg, |keys| {
            let grouped = match table.group_by(keys, &kinds) {
                Ok(grouped) => grouped,
                Err(error) => {
                    warn_skipped_keys(keys, &error);
                    return Ok(None);
                }
            };
            Ok(Some(grouped.summarize(&aggregation_title(keys), cfg.top_values)))
        })?;

        Ok(Analysis::new(
            self.name(),
            start,
            table.footprint(),
            original,
            aggregations,
        ))
    }
}

/// Dictionary-encoded column store built while reading.
pub struct ColumnarBackend;

impl Backend for ColumnarBackend {
    fn name(&self) -> &'static str {
        "columnar"
    }

    fn analyze(&self, cfg: &Config) -> Result<Analysis> {
        let start = Instant::now();
        let reader = RowReader::open(&cfg.input, cfg.progress_every)?;
        let table = ColumnarTable::load(reader).context("failed to load columns")?;

        let original = table.summarize(ORIGINAL_TITLE, cfg.top_values);
        let kinds = original.kinds();

        let aggregations = aggregate_all(cfg, |keys| {
            let grouped = match table.group_by(keys, &kinds) {
                Ok(grouped) => grouped,
                Err(error) => {
                    warn_skipped_keys(keys, &error);
                    return Ok(None);
                }
            };
            let grouped = ColumnarTable::from_table(&grouped);
            Ok(Some(grouped.summarize(&aggregation_title(keys), cfg.top_values)))
        })?;

        Ok(Analysis::new(
            self.name(),
            start,
            table.footprint(),
            original,
            aggregations,
        ))
    }
}

pub fn backends(kind: BackendKind) -> Vec<Box<dyn Backend>> {
    let mut backend_ptr_vec: Vec<Box<dyn Backend>> = Vec::new();
    if matches!(kind, BackendKind::Streaming | BackendKind::All) {
        backend_ptr_vec.push(Box::new(StreamingBackend));
    }
    if matches!(kind, BackendKind::Table | BackendKind::All) {
        backend_ptr_vec.push(Box::new(TableBackend));
    }
    if matches!(kind, BackendKind::Columnar | BackendKind::All) {
        backend_ptr_vec.push(Box::new(ColumnarBackend));
    }
    backend_ptr_vec
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs, path::PathBuf};

    fn write_dataset(name: &str, contents: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("adstats-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        let file = dir.join(name);
        fs::write(&file, contents).expect("failed to write dataset");
        file
    }

    fn run_all(name: &str, contents: &str) -> Vec<Analysis> {
        let cfg = Config {
            input: write_dataset(name, contents),
            ..Config::default()
        };
        backends(BackendKind::All)
            .iter()
            .map(|backend| backend.analyze(&cfg).expect("analysis succeeds"))
            .collect()
    }

    const ADS: &str = "page_id,ad_id,estimated_spend,estimated_impressions,currency,bylines\n\
        p1,a1,5,100,USD,Friends of A\n\
        p1,a2,7,,USD,Friends of A\n\
        p2,a3,1.5,40,EUR,\n\
        p3,a4,,10,USD,Committee B\n\
        p2,a5,x,5,,Committee B\n";

    #[test]
    fn backends_agree_on_every_statistic() {
        let analyses = run_all("agree.csv", ADS);
        assert_eq!(analyses.len(), 3);
        for analysis in &analyses[1..] {
            assert_eq!(analysis.original, analyses[0].original);
            assert_eq!(analysis.aggregations, analyses[0].aggregations);
            assert_eq!(analysis.totals, analyses[0].totals);
        }
    }

    #[test]
    fn aggregation_preserves_spend_total() {
        let analysis = &run_all("totals.csv", ADS)[0];
        assert_eq!(analysis.original.rows, 5);
        assert_eq!(analysis.aggregations.len(), 2);
        assert_eq!(analysis.aggregations[0].summary.rows, 3);
        assert_eq!(analysis.aggregations[1].summary.rows, 5);

        let spend = analysis
            .totals
            .iter()
            .find(|totals| totals.column == "estimated_spend")
            .expect("spend is numeric");
        assert_eq!(spend.original, 13.5);
        assert_eq!(spend.aggregated, [Some(13.5_f64), Some(13.5)]);
        assert_eq!(spend.preserved(0), Some(true));

        let by_page = &analysis.aggregations[0].summary;
        let spend = by_page.column("estimated_spend").expect("spend column");
        let num = spend.numeric.as_ref().expect("numeric spend");
        assert_eq!(num.numeric_count, 2);
        assert_eq!(spend.null, 1);
        assert_eq!(num.max, Some(12.0));
    }

    #[test]
    fn key_columns_are_excluded_from_totals() {
        let analysis = &run_all("keys.csv", "page_id,spend\n1,2\n1,3\n2,4\n")[0];
        let page = &analysis.totals[0];
        assert_eq!(page.column, "page_id");
        assert_eq!(page.aggregated, [None::<f64>]);
        assert_eq!(page.preserved(0), None);
    }

    #[test]
    fn repeated_column_names_keep_their_own_totals() {
        let data = "page_id,spend,spend\np1,1,100\np1,2,200\np2,3,300\n";
        for analysis in run_all("repeated.csv", data) {
            assert_eq!(analysis.aggregations.len(), 1);
            let totals: Vec<_> = analysis
                .totals
                .iter()
                .map(|totals| (totals.original, totals.aggregated.clone()))
                .collect();
            assert_eq!(
                totals,
                [(6.0, vec![Some(6.0_f64)]), (600.0, vec![Some(600.0)])]
            );
            assert!(analysis.totals.iter().all(|totals| totals.preserved(0) == Some(true)));
        }
    }

    #[test]
    fn unknown_group_keys_are_skipped() {
        let analyses = run_all("nokeys.csv", "spend\n1\n2\n");
        for analysis in analyses {
            assert!(analysis.aggregations.is_empty());
            assert_eq!(analysis.original.rows, 2);
        }
    }

    #[test]
    fn missing_input_is_an_error() {
        let cfg = Config {
            input: PathBuf::from("/nonexistent/adstats/missing.csv"),
            ..Config::default()
        };
        for backend in backends(BackendKind::All) {
            assert!(backend.analyze(&cfg).is_err());
        }
    }

    #[test]
    fn aggregation_titles() {
        assert_eq!(
            aggregation_title(&["page_id".to_owned()]),
            "Analysis After Aggregation by page_id"
        );
        assert_eq!(
            aggregation_title(&["page_id".to_owned(), "ad_id".to_owned()]),
            "Analysis After Aggregation by (page_id, ad_id)"
        );
    }
}
