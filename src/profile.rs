use crate::dataset::{is_null, parse_num};
use crate::stats::{Accumulator, FreqTable, Sample};
use crate::summary::{ColumnSummary, DatasetSummary, NumericSummary};
use std::{
    collections::HashSet,
    hash::{DefaultHasher, Hash, Hasher},
};

/// Running aggregates of a single column, fed one cell at a time.
pub struct ColumnProfile {
    name: String,
    count: u64,
    null: u64,
    unparsable: u64,
    freq: FreqTable,
    acc: Accumulator,
    sample: Sample,
}

impl ColumnProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            count: 0,
            null: 0,
            unparsable: 0,
            freq: FreqTable::new(),
            acc: Accumulator::new(),
            sample: Sample::new(),
        }
    }

    pub fn add(&mut self, cell: &str) {
        self.count += 1;
        if is_null(cell) {
            self.null += 1;
            return;
        }
        self.freq.add(cell);
        match parse_num(cell) {
            Some(val) => {
                self.acc.add(val);
                self.sample.push(val);
            }
            None => self.unparsable += 1,
        }
    }

    pub fn footprint(&self) -> usize {
        self.freq.footprint() + self.sample.footprint()
    }

    pub fn finish(self, top_n: usize) -> ColumnSummary {
        build_column_summary(
            self.name,
            (self.count, self.null, self.unparsable),
            &self.freq,
            &self.acc,
            self.sample,
            top_n,
        )
    }
}

/// Assemble a [`ColumnSummary`] from already accumulated parts.
///
/// `counts` is `(count, null, unparsable)`. The column is numeric when the
/// accumulator saw at least one value.
pub fn build_column_summary(
    name: String,
    counts: (u64, u64, u64),
    freq: &FreqTable,
    acc: &Accumulator,
    sample: Sample,
    top_n: usize,
) -> ColumnSummary {
    let (count, null, unparsable) = counts;

    let numeric = (acc.count() > 0).then(|| {
        let report = acc.report();
        let quartiles = sample.quartiles();
        NumericSummary {
            numeric_count: report.count,
            unparsable,
            sum: report.sum,
            mean: report.mean,
            std_dev: report.std_dev,
            min: report.min,
            q25: quartiles.map(|q| q.q25),
            median: quartiles.map(|q| q.median),
            q75: quartiles.map(|q| q.q75),
            max: report.max,
            zeros: report.zeros,
            negatives: report.negatives,
        }
    });

    ColumnSummary {
        name,
        count,
        non_null: count - null,
        null,
        unique: freq.unique() as u64,
        mode: freq.mode(),
        top_values: freq.top(top_n),
        lexical_range: freq.range(),
        numeric,
    }
}

/// 128-bit row fingerprints used to count duplicate rows without keeping them.
///
/// All null spellings hash alike.
#[derive(Default)]
pub struct RowFingerprints {
    seen: HashSet<u128>,
    duplicates: u64,
}

impl RowFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<'a, I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hasher_a = DefaultHasher::new();
        let mut hasher_b = DefaultHasher::new();
        0xad57_u16.hash(&mut hasher_b);
        for cell in cells {
            let cell = if is_null(cell) { "" } else { cell };
            cell.hash(&mut hasher_a);
            cell.hash(&mut hasher_b);
        }
        let fingerprint = (u128::from(hasher_a.finish()) << 64) | u128::from(hasher_b.finish());
        if !self.seen.insert(fingerprint) {
            self.duplicates += 1;
        }
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn footprint(&self) -> usize {
        self.seen.capacity() * size_of::<u128>()
    }
}

/// Row-at-a-time profiler of a whole dataset.
pub struct DatasetProfiler {
    title: String,
    top_n: usize,
    rows: u64,
    columns: Vec<ColumnProfile>,
    fingerprints: RowFingerprints,
}

impl DatasetProfiler {
    pub fn new(title: &str, headers: &[String], top_n: usize) -> Self {
        Self {
            title: title.to_owned(),
            top_n,
            rows: 0,
            columns: headers.iter().map(|name| ColumnProfile::new(name)).collect(),
            fingerprints: RowFingerprints::new(),
        }
    }

    /// Feed one row. Missing trailing cells count as null.
    pub fn add_row<'a, I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.rows += 1;
        let mut cells = cells.into_iter();
        let mut row = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let cell = cells.next().unwrap_or("");
            column.add(cell);
            row.push(cell);
        }
        self.fingerprints.add(row);
    }

    pub fn footprint(&self) -> usize {
        self.columns.iter().map(ColumnProfile::footprint).sum::<usize>()
            + self.fingerprints.footprint()
    }

    pub fn finish(self, invalid_cells: u64) -> DatasetSummary {
        let top_n = self.top_n;
        DatasetSummary {
            title: self.title,
            rows: self.rows,
            duplicate_rows: self.fingerprints.duplicates(),
            invalid_cells,
            columns: self
                .columns
                .into_iter()
                .map(|column| column.finish(top_n))
                .collect(),
        }
    }
}
