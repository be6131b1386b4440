use crate::backend::{Aggregation, Analysis, TOTAL_TOLERANCE};
use crate::config::{Config, Insights};
use crate::summary::{ColumnKind, ColumnSummary, DatasetSummary};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

const RULE_WIDTH: usize = 80;
const NAME_WIDTH: usize = 30;

/// Headline figures of the original dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInsights {
    pub total_spend: Option<f64>,
    pub total_impressions: Option<f64>,
    pub unique_advertisers: Option<u64>,
    pub unique_ads: Option<u64>,
    pub date_range: Option<(String, String)>,
    pub top_sponsors: Vec<(String, u64)>,
}

impl DatasetInsights {
    pub fn new(summary: &DatasetSummary, names: &Insights) -> Self {
        let sum_of = |name: &str| {
            summary
                .column(name)
                .and_then(|col| col.numeric.as_ref())
                .map(|num| num.sum)
        };
        let unique_of = |name: &str| summary.column(name).map(|col| col.unique);

        let date_range = summary.column(&names.date).and_then(|col| match &col.numeric {
            Some(num) => Some((fmt_num(num.min?), fmt_num(num.max?))),
            None => col.lexical_range.clone(),
        });
        let top_sponsors = summary
            .column(&names.sponsor)
            .map(|col| col.top_values.clone())
            .unwrap_or_default();

        Self {
            total_spend: sum_of(names.spend.as_str()),
            total_impressions: sum_of(names.impressions.as_str()),
            unique_advertisers: unique_of(names.advertiser.as_str()),
            unique_ads: unique_of(names.ad.as_str()),
            date_range,
            top_sponsors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub backend: String,
    pub elapsed_secs: f64,
    pub footprint_bytes: usize,
}

/// Cross-backend consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub runs: Vec<RunStats>,
    pub mismatches: Vec<String>,
}

impl Comparison {
    /// Compare every analysis against the first one.
    pub fn new(analyses: &[Analysis]) -> Option<Self> {
        let (reference, others) = analyses.split_first()?;
        if others.is_empty() {
            return None;
        }

        let mut mismatches = Vec::new();
        for other in others {
            check_summary(&mut mismatches, other, &reference.original, &other.original);

            let ref_keys: Vec<_> = reference.aggregations.iter().map(|agg| &agg.keys).collect();
            let keys: Vec<_> = other.aggregations.iter().map(|agg| &agg.keys).collect();
            if ref_keys != keys {
                mismatches.push(format!("{}: aggregation key sets differ", other.backend));
            } else {
                for (ref_agg, agg) in reference.aggregations.iter().zip(&other.aggregations) {
                    check_summary(&mut mismatches, other, &ref_agg.summary, &agg.summary);
                }
            }

            if reference.totals.len() != other.totals.len() {
                mismatches.push(format!(
                    "{}: {} numeric totals instead of {}",
                    other.backend,
                    other.totals.len(),
                    reference.totals.len()
                ));
            }
            for (ref_totals, totals) in reference.totals.iter().zip(&other.totals) {
                let same_original = (ref_totals.original - totals.original).abs() < TOTAL_TOLERANCE;
                let same_aggregated = ref_totals.aggregated.len() == totals.aggregated.len()
                    && ref_totals
                        .aggregated
                        .iter()
                        .zip(&totals.aggregated)
                        .all(|pair| match pair {
                            (Some(a), Some(b)) => (a - b).abs() < TOTAL_TOLERANCE,
                            (None, None) => true,
                            _ => false,
                        });
                if ref_totals.column != totals.column || !same_original || !same_aggregated {
                    mismatches.push(format!(
                        "{}: totals of {} differ",
                        other.backend, totals.column
                    ));
                }
            }
        }

        let runs = analyses
            .iter()
            .map(|analysis| RunStats {
                backend: analysis.backend.clone(),
                elapsed_secs: analysis.elapsed_secs,
                footprint_bytes: analysis.footprint_bytes,
            })
            .collect();

        Some(Self { runs, mismatches })
    }

    pub fn consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

fn check_summary(
    mismatches: &mut Vec<String>,
    other: &Analysis,
    reference: &DatasetSummary,
    summary: &DatasetSummary,
) {
    let checks = [
        ("row count", reference.rows, summary.rows),
        (
            "column count",
            reference.n_columns() as u64,
            summary.n_columns() as u64,
        ),
        ("null count", reference.null_cells(), summary.null_cells()),
        (
            "duplicate rows",
            reference.duplicate_rows,
            summary.duplicate_rows,
        ),
    ];
    for (what, expected, found) in checks {
        if expected != found {
            mismatches.push(format!(
                "{}: {} of {:?} is {found}, expected {expected}",
                other.backend, what, summary.title
            ));
        }
    }
}

/// Everything produced by one invocation, as serialized in JSON mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub analyses: Vec<Analysis>,
    pub insights: Option<DatasetInsights>,
    pub comparison: Option<Comparison>,
}

impl Report {
    pub fn new(analyses: Vec<Analysis>, cfg: &Config) -> Self {
        let insights = analyses
            .first()
            .map(|analysis| DatasetInsights::new(&analysis.original, &cfg.insights));
        let comparison = Comparison::new(&analyses);
        Self {
            analyses,
            insights,
            comparison,
        }
    }

    pub fn write_json(&self, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn write_text(&self, out: &mut dyn Write, cfg: &Config) -> Result<()> {
        for analysis in &self.analyses {
            write_analysis(out, analysis, cfg)?;
        }
        if let Some(insights) = &self.insights {
            write_insights(out, insights)?;
        }
        if let Some(comparison) = &self.comparison {
            write_comparison(out, comparison)?;
        }
        Ok(())
    }
}

fn write_banner(out: &mut dyn Write, title: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    Ok(())
}

fn write_title(out: &mut dyn Write, title: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.chars().count()))?;
    Ok(())
}

pub fn write_analysis(out: &mut dyn Write, analysis: &Analysis, cfg: &Config) -> Result<()> {
    write_banner(out, &format!("BACKEND: {}", analysis.backend))?;

    write_dataset(out, &analysis.original, cfg)?;
    writeln!(
        out,
        "Estimated memory retained: {:.2} MB",
        to_mb(analysis.footprint_bytes)
    )?;

    for agg in &analysis.aggregations {
        writeln!(out)?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        write_reduction(out, &analysis.original, agg)?;
        write_dataset(out, &agg.summary, cfg)?;
    }

    write_totals(out, analysis)?;

    write_banner(out, "SUMMARY")?;
    writeln!(
        out,
        "Original dataset: {} rows, {} columns",
        fmt_count(analysis.original.rows),
        analysis.original.n_columns()
    )?;
    for agg in &analysis.aggregations {
        writeln!(
            out,
            "After {} aggregation: {} rows",
            fmt_keys(&agg.keys),
            fmt_count(agg.summary.rows)
        )?;
    }
    writeln!(out, "Elapsed: {:.3} s", analysis.elapsed_secs)?;
    Ok(())
}

fn write_dataset(out: &mut dyn Write, summary: &DatasetSummary, cfg: &Config) -> Result<()> {
    write_title(out, &summary.title)?;
    writeln!(
        out,
        "Dataset shape: {} rows, {} columns",
        summary.rows,
        summary.n_columns()
    )?;

    writeln!(out)?;
    writeln!(out, "Dataset Info:")?;
    writeln!(out, "Total cells: {}", fmt_count(summary.total_cells()))?;
    writeln!(out, "Non-null values: {}", fmt_count(summary.non_null_cells()))?;
    writeln!(out, "Null values: {}", fmt_count(summary.null_cells()))?;
    writeln!(out, "Duplicate rows: {}", fmt_count(summary.duplicate_rows))?;
    if summary.invalid_cells > 0 {
        writeln!(out, "Invalid UTF-8 cells (read as null): {}", fmt_count(summary.invalid_cells))?;
    }

    writeln!(out)?;
    writeln!(out, "Data Types Summary:")?;
    writeln!(out, "  numeric: {} columns", summary.count_kind(ColumnKind::Numeric))?;
    writeln!(out, "  text: {} columns", summary.count_kind(ColumnKind::Text))?;

    writeln!(out)?;
    writeln!(out, "Column-by-Column Analysis:")?;
    writeln!(out, "{}", "-".repeat(50))?;
    for col in &summary.columns {
        write_column(out, col, cfg)?;
    }

    write_numeric_table(out, summary)?;
    write_categorical(out, summary, cfg)?;
    Ok(())
}

fn write_column(out: &mut dyn Write, col: &ColumnSummary, cfg: &Config) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "Column: {}", col.name)?;
    writeln!(out, "  Count: {}", col.count)?;
    writeln!(out, "  Non-null: {}", col.non_null)?;
    writeln!(out, "  Null: {}", col.null)?;
    writeln!(out, "  Unique values: {}", col.unique)?;

    let Some(num) = &col.numeric else {
        writeln!(out, "  Type: Text")?;
        if !col.top_values.is_empty() {
            writeln!(out, "  Most frequent values:")?;
            for (val, count) in &col.top_values {
                writeln!(out, "    '{}': {count}", elide(val, cfg.display_width))?;
            }
        }
        return Ok(());
    };

    writeln!(out, "  Type: Numeric")?;
    writeln!(out, "  Numeric values: {}", num.numeric_count)?;
    if num.unparsable > 0 {
        writeln!(out, "  Unparsable values: {}", num.unparsable)?;
    }
    writeln!(out, "  Mean: {}", fmt_opt(num.mean))?;
    writeln!(out, "  Std: {}", fmt_opt(num.std_dev))?;
    writeln!(out, "  Min: {}", fmt_opt_raw(num.min))?;
    writeln!(out, "  25%: {}", fmt_opt_raw(num.q25))?;
    writeln!(out, "  50% (Median): {}", fmt_opt_raw(num.median))?;
    writeln!(out, "  75%: {}", fmt_opt_raw(num.q75))?;
    writeln!(out, "  Max: {}", fmt_opt_raw(num.max))?;
    writeln!(out, "  Sum: {:.2}", num.sum)?;
    writeln!(out, "  Zeros: {}", num.zeros)?;
    writeln!(out, "  Negative values: {}", num.negatives)?;
    Ok(())
}

fn write_numeric_table(out: &mut dyn Write, summary: &DatasetSummary) -> Result<()> {
    let numeric: Vec<_> = summary.numeric_columns().collect();
    if numeric.is_empty() {
        return Ok(());
    }

    write_title(out, &format!("{} - Numeric Columns Summary", summary.title))?;
    writeln!(
        out,
        "{:<NAME_WIDTH$} {:>10} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    )?;
    for (col, num) in &numeric {
        writeln!(
            out,
            "{:<NAME_WIDTH$} {:>10} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}",
            elide(&col.name, NAME_WIDTH - 3),
            num.numeric_count,
            fmt_opt(num.mean),
            fmt_opt(num.std_dev),
            fmt_opt(num.min),
            fmt_opt(num.q25),
            fmt_opt(num.median),
            fmt_opt(num.q75),
            fmt_opt(num.max)
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Additional Numeric Statistics:")?;
    let total: f64 = numeric.iter().map(|(_, num)| num.sum).sum();
    let with_zeros = numeric.iter().filter(|(_, num)| num.zeros > 0).count();
    let with_negatives = numeric.iter().filter(|(_, num)| num.negatives > 0).count();
    writeln!(out, "Total sum across all numeric columns: {total:.2}")?;
    writeln!(out, "Columns with zeros: {with_zeros}")?;
    writeln!(out, "Columns with negative values: {with_negatives}")?;
    Ok(())
}

fn write_categorical(out: &mut dyn Write, summary: &DatasetSummary, cfg: &Config) -> Result<()> {
    let text: Vec<_> = summary.text_columns().collect();
    if text.is_empty() {
        return Ok(());
    }

    write_title(out, &format!("{} - Categorical Columns Summary", summary.title))?;
    for col in text {
        writeln!(out)?;
        writeln!(out, "{}:", col.name)?;
        writeln!(out, "  Unique values: {}", col.unique)?;
        writeln!(
            out,
            "  Most frequent: {}",
            col.mode
                .as_deref()
                .map_or("N/A".to_owned(), |mode| elide(mode, cfg.display_width))
        )?;
        writeln!(out, "  Top {} values:", cfg.categorical_top)?;
        for (val, count) in col.top_values.iter().take(cfg.categorical_top) {
            writeln!(
                out,
                "    '{}': {count} ({:.1}%)",
                elide(val, 30),
                percent(*count, summary.rows)
            )?;
        }
    }
    Ok(())
}

fn write_reduction(out: &mut dyn Write, original: &DatasetSummary, agg: &Aggregation) -> Result<()> {
    write_title(out, &format!("Aggregation by {}", fmt_keys(&agg.keys)))?;
    let before = original.rows;
    let after = agg.summary.rows;
    let removed = before.saturating_sub(after);
    writeln!(out, "Original dataset: {before} rows")?;
    writeln!(out, "After aggregation by {:?}: {after} rows", agg.keys)?;
    writeln!(
        out,
        "Reduction: {removed} rows ({:.1}%)",
        percent(removed, before)
    )?;
    Ok(())
}

fn write_totals(out: &mut dyn Write, analysis: &Analysis) -> Result<()> {
    if analysis.totals.is_empty() {
        return Ok(());
    }

    write_title(out, "Numeric Column Totals Comparison")?;
    write!(out, "{:<NAME_WIDTH$} {:>18}", "Column", "Original")?;
    for agg in &analysis.aggregations {
        write!(out, " {:>18}", elide(&agg.keys.join("+"), 18))?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        "-".repeat(NAME_WIDTH + 19 * (analysis.aggregations.len() + 1))
    )?;

    for totals in &analysis.totals {
        write!(
            out,
            "{:<NAME_WIDTH$} {:>18.2}",
            elide(&totals.column, NAME_WIDTH - 3),
            totals.original
        )?;
        for total in &totals.aggregated {
            match total {
                Some(total) => write!(out, " {total:>18.2}")?,
                None => write!(out, " {:>18}", "(key)")?,
            }
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "Total Preservation Check:")?;
    for (i_agg, agg) in analysis.aggregations.iter().enumerate() {
        let broken: Vec<_> = analysis
            .totals
            .iter()
            .filter(|totals| totals.preserved(i_agg) == Some(false))
            .collect();
        if broken.is_empty() {
            writeln!(out, "  {}: totals preserved", fmt_keys(&agg.keys))?;
        }
        for totals in broken {
            let total = totals.aggregated[i_agg].unwrap_or_default();
            writeln!(
                out,
                "  {}: {} differs by {:.2}",
                fmt_keys(&agg.keys),
                totals.column,
                (total - totals.original).abs()
            )?;
        }
    }
    Ok(())
}

fn write_insights(out: &mut dyn Write, insights: &DatasetInsights) -> Result<()> {
    write_banner(out, "FINAL SUMMARY")?;
    writeln!(out, "Dataset Insights:")?;
    if let Some(spend) = insights.total_spend {
        writeln!(out, "- Total estimated spend: ${}", fmt_thousands(spend, 2))?;
    }
    if let Some(impressions) = insights.total_impressions {
        writeln!(
            out,
            "- Total estimated impressions: {}",
            fmt_thousands(impressions, 0)
        )?;
    }
    if let Some(pages) = insights.unique_advertisers {
        writeln!(out, "- Unique pages: {}", fmt_count(pages))?;
    }
    if let Some(ads) = insights.unique_ads {
        writeln!(out, "- Unique ads: {}", fmt_count(ads))?;
    }
    if let Some((first, last)) = &insights.date_range {
        writeln!(out, "- Date range: {first} to {last}")?;
    }

    if !insights.top_sponsors.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "Top {} Advertisers by Ad Count:",
            insights.top_sponsors.len()
        )?;
        for (sponsor, count) in &insights.top_sponsors {
            writeln!(out, "  {sponsor}: {} ads", fmt_count(*count))?;
        }
    }
    Ok(())
}

fn write_comparison(out: &mut dyn Write, comparison: &Comparison) -> Result<()> {
    write_banner(out, "BACKEND COMPARISON")?;
    writeln!(
        out,
        "{:<12} {:>12} {:>14}",
        "backend", "elapsed (s)", "memory (MB)"
    )?;
    for run in &comparison.runs {
        writeln!(
            out,
            "{:<12} {:>12.3} {:>14.2}",
            run.backend,
            run.elapsed_secs,
            to_mb(run.footprint_bytes)
        )?;
    }

    writeln!(out)?;
    if comparison.consistent() {
        writeln!(out, "Consistency check: all backends agree")?;
    } else {
        writeln!(out, "Consistency check: MISMATCH")?;
        for mismatch in &comparison.mismatches {
            writeln!(out, "  {mismatch}")?;
        }
    }
    Ok(())
}

fn fmt_keys(keys: &[String]) -> String {
    match keys {
        [key] => key.clone(),
        _ => format!("({})", keys.join(", ")),
    }
}

fn fmt_num(val: f64) -> String {
    format!("{val}")
}

fn fmt_opt(val: Option<f64>) -> String {
    val.map_or("n/a".to_owned(), |val| format!("{val:.2}"))
}

fn fmt_opt_raw(val: Option<f64>) -> String {
    val.map_or("n/a".to_owned(), fmt_num)
}

fn fmt_count(count: u64) -> String {
    fmt_thousands(count as f64, 0)
}

/// Format with a fixed number of decimals and comma thousands separators.
fn fmt_thousands(val: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, val.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if val < 0.0 && formatted.bytes().any(|b| b != b'0' && b != b'.') {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

fn elide(val: &str, width: usize) -> String {
    if val.chars().count() <= width {
        return val.to_owned();
    }
    let head: String = val.chars().take(width).collect();
    format!("{head}...")
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

fn to_mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::NumericSummary;

    fn column(name: &str, numeric: Option<f64>) -> ColumnSummary {
        ColumnSummary {
            name: name.to_owned(),
            count: 2,
            non_null: 2,
            null: 0,
            unique: 2,
            mode: Some("b".to_owned()),
            top_values: vec![("b".to_owned(), 1), ("c".to_owned(), 1)],
            lexical_range: Some(("b".to_owned(), "c".to_owned())),
            numeric: numeric.map(|sum| NumericSummary {
                numeric_count: 2,
                unparsable: 0,
                sum,
                mean: Some(sum / 2.0),
                std_dev: None,
                min: Some(0.0),
                q25: None,
                median: None,
                q75: None,
                max: Some(sum),
                zeros: 1,
                negatives: 0,
            }),
        }
    }

    fn analysis(backend: &str, rows: u64, spend: f64) -> Analysis {
        let original = DatasetSummary {
            title: "t".to_owned(),
            rows,
            duplicate_rows: 0,
            invalid_cells: 0,
            columns: vec![column("estimated_spend", Some(spend)), column("bylines", None)],
        };
        let totals = crate::backend::compute_totals(&original, &[]);
        Analysis {
            backend: backend.to_owned(),
            elapsed_secs: 0.5,
            footprint_bytes: 2048,
            original,
            aggregations: Vec::new(),
            totals,
        }
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(fmt_thousands(0.0, 2), "0.00");
        assert_eq!(fmt_thousands(999.0, 0), "999");
        assert_eq!(fmt_thousands(1234.5, 2), "1,234.50");
        assert_eq!(fmt_thousands(-1234567.0, 0), "-1,234,567");
        assert_eq!(fmt_count(1_000_000), "1,000,000");
    }

    #[test]
    fn long_values_are_elided() {
        assert_eq!(elide("short", 10), "short");
        assert_eq!(elide("abcdefghij", 4), "abcd...");
        assert_eq!(elide("ééééé", 2), "éé...");
    }

    #[test]
    fn comparison_flags_differences() {
        let same = [analysis("a", 2, 10.0), analysis("b", 2, 10.0)];
        let comparison = Comparison::new(&same).expect("two backends");
        assert!(comparison.consistent());
        assert_eq!(comparison.runs.len(), 2);

        let different = [analysis("a", 2, 10.0), analysis("b", 3, 11.0)];
        let comparison = Comparison::new(&different).expect("two backends");
        assert_eq!(comparison.mismatches.len(), 2);

        assert!(Comparison::new(&same[..1]).is_none());
    }

    #[test]
    fn comparison_flags_missing_totals() {
        let mut short = analysis("b", 2, 10.0);
        short.totals.clear();
        let comparison =
            Comparison::new(&[analysis("a", 2, 10.0), short]).expect("two backends");
        assert_eq!(
            comparison.mismatches,
            ["b: 0 numeric totals instead of 1"]
        );
    }

    #[test]
    fn insights_use_configured_columns() {
        let summary = analysis("a", 2, 10.0).original;
        let insights = DatasetInsights::new(&summary, &Insights::default());
        assert_eq!(insights.total_spend, Some(10.0));
        assert_eq!(insights.total_impressions, None);
        assert_eq!(insights.unique_ads, None);
        assert_eq!(insights.top_sponsors.len(), 2);
    }

    #[test]
    fn text_report_contains_every_section() {
        let cfg = Config::default();
        let report = Report::new(vec![analysis("a", 2, 10.0), analysis("b", 2, 10.0)], &cfg);
        let mut out = Vec::new();
        report.write_text(&mut out, &cfg).expect("writable buffer");
        let text = String::from_utf8(out).expect("utf-8 report");

        for section in [
            "BACKEND: a",
            "Column-by-Column Analysis:",
            "Numeric Columns Summary",
            "Categorical Columns Summary",
            "Numeric Column Totals Comparison",
            "FINAL SUMMARY",
            "- Total estimated spend: $10.00",
            "Consistency check: all backends agree",
        ] {
            assert!(text.contains(section), "missing {section:?} in report");
        }
    }
}
