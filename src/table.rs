use crate::dataset::RowReader;
use crate::group::GroupAggregator;
use crate::profile::{ColumnProfile, RowFingerprints};
use crate::summary::{ColumnKind, DatasetSummary};
use anyhow::Result;
use std::io::Read;

/// Fully materialized row-major table of raw cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    invalid_cells: u64,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            invalid_cells: 0,
        }
    }

    /// Read every remaining row of `reader` into memory.
    pub fn load<R: Read>(mut reader: RowReader<R>) -> Result<Self> {
        let headers = reader.headers().to_vec();
        let mut rows = Vec::new();
        while reader.read_row()? {
            rows.push(reader.cells().map(str::to_owned).collect());
        }
        Ok(Self {
            headers,
            rows,
            invalid_cells: reader.invalid_cells(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column(&self, i_col: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(i_col).map_or("", String::as_str))
    }

    /// Summarize column by column, the way a dataframe `describe` would.
    pub fn summarize(&self, title: &str, top_n: usize) -> DatasetSummary {
        let columns = self
            .headers
            .iter()
            .enumerate()
            .map(|(i_col, name)| {
                let mut profile = ColumnProfile::new(name);
                self.column(i_col).for_each(|cell| profile.add(cell));
                profile.finish(top_n)
            })
            .collect();

        let mut fingerprints = RowFingerprints::new();
        for row in &self.rows {
            fingerprints.add(row.iter().map(String::as_str));
        }

        DatasetSummary {
            title: title.to_owned(),
            rows: self.rows.len() as u64,
            duplicate_rows: fingerprints.duplicates(),
            invalid_cells: self.invalid_cells,
            columns,
        }
    }

    /// Aggregate rows sharing the same values of `keys`.
    pub fn group_by(&self, keys: &[String], kinds: &[ColumnKind]) -> Result<Table> {
        let mut agg = GroupAggregator::new(&self.headers, keys)?;
        for row in &self.rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            agg.add_row(&cells);
        }
        Ok(agg.finish(kinds))
    }

    /// Estimated heap bytes held by the cells.
    pub fn footprint(&self) -> usize {
        self.rows
            .iter()
            .map(|row| {
                row.capacity() * size_of::<String>()
                    + row.iter().map(String::capacity).sum::<usize>()
            })
            .sum()
    }
}
