use crate::dataset::{RowReader, is_null, parse_num};
use crate::group::{CellPartial, assemble_groups, key_indices};
use crate::profile::build_column_summary;
use crate::stats::{Accumulator, FreqTable, Sample};
use crate::summary::{ColumnKind, ColumnSummary, DatasetSummary};
use crate::table::Table;
use anyhow::Result;
use std::{
    collections::{HashMap, HashSet},
    io::Read,
};

/// Dictionary-encoded column.
///
/// Every distinct non-null cell is stored once in `dict`; rows hold an
/// optional code into it (`None` for null cells). Numeric parsing happens
/// once per dictionary entry.
#[derive(Debug, Default)]
pub struct Column {
    name: String,
    dict: Vec<String>,
    lookup: HashMap<String, u32>,
    values: Vec<Option<f64>>,
    codes: Vec<Option<u32>>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, cell: &str) {
        if is_null(cell) {
            self.codes.push(None);
            return;
        }
        let code = match self.lookup.get(cell) {
            Some(&code) => code,
            None => {
                let code = self.dict.len() as u32;
                self.dict.push(cell.to_owned());
                self.values.push(parse_num(cell));
                self.lookup.insert(cell.to_owned(), code);
                code
            }
        };
        self.codes.push(Some(code));
    }

    pub fn cell(&self, i_row: usize) -> &str {
        match self.codes[i_row] {
            Some(code) => &self.dict[code as usize],
            None => "",
        }
    }

    pub fn value(&self, i_row: usize) -> Option<f64> {
        self.codes[i_row].and_then(|code| self.values[code as usize])
    }

    pub fn summarize(&self, top_n: usize) -> ColumnSummary {
        let mut counts = vec![0u64; self.dict.len()];
        let mut null = 0;
        let mut unparsable = 0;
        let mut acc = Accumulator::new();
        let mut sample = Sample::new();

        for &code in &self.codes {
            let Some(code) = code else {
                null += 1;
                continue;
            };
            counts[code as usize] += 1;
            match self.values[code as usize] {
                Some(val) => {
                    acc.add(val);
                    sample.push(val);
                }
                None => unparsable += 1,
            }
        }

        let freq = FreqTable::from_counts(self.dict.iter().cloned().zip(counts));
        build_column_summary(
            self.name.clone(),
            (self.codes.len() as u64, null, unparsable),
            &freq,
            &acc,
            sample,
            top_n,
        )
    }

    pub fn footprint(&self) -> usize {
        let dict_bytes: usize = self
            .dict
            .iter()
            .map(|val| 2 * (val.capacity() + size_of::<String>()) + size_of::<u32>())
            .sum();
        dict_bytes
            + self.values.capacity() * size_of::<Option<f64>>()
            + self.codes.capacity() * size_of::<Option<u32>>()
    }
}

/// Column store of a whole dataset.
#[derive(Debug)]
pub struct ColumnarTable {
    columns: Vec<Column>,
    n_rows: usize,
    invalid_cells: u64,
}

impl ColumnarTable {
    pub fn new(headers: &[String]) -> Self {
        Self {
            columns: headers.iter().map(|name| Column::new(name)).collect(),
            n_rows: 0,
            invalid_cells: 0,
        }
    }

    pub fn load<R: Read>(mut reader: RowReader<R>) -> Result<Self> {
        let mut table = Self::new(reader.headers());
        while reader.read_row()? {
            for (i_col, column) in table.columns.iter_mut().enumerate() {
                column.push(reader.cell(i_col));
            }
            table.n_rows += 1;
        }
        table.invalid_cells = reader.invalid_cells();
        Ok(table)
    }

    pub fn from_table(source: &Table) -> Self {
        let mut table = Self::new(source.headers());
        for row in source.rows() {
            for (column, cell) in table.columns.iter_mut().zip(row) {
                column.push(cell);
            }
            table.n_rows += 1;
        }
        table
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }

    fn row_codes(&self, i_row: usize) -> Vec<Option<u32>> {
        self.columns.iter().map(|col| col.codes[i_row]).collect()
    }

    pub fn summarize(&self, title: &str, top_n: usize) -> DatasetSummary {
        // Code tuples identify rows exactly within one table.
        let mut seen = HashSet::with_capacity(self.n_rows);
        let mut duplicate_rows = 0;
        for i_row in 0..self.n_rows {
            if !seen.insert(self.row_codes(i_row)) {
                duplicate_rows += 1;
            }
        }

        DatasetSummary {
            title: title.to_owned(),
            rows: self.n_rows as u64,
            duplicate_rows,
            invalid_cells: self.invalid_cells,
            columns: self.columns.iter().map(|col| col.summarize(top_n)).collect(),
        }
    }

    /// Aggregate rows sharing the same codes in the `keys` columns.
    pub fn group_by(&self, keys: &[String], kinds: &[ColumnKind]) -> Result<Table> {
        let headers = self.headers();
        let key_idx = key_indices(&headers, keys)?;

        let mut index: HashMap<Vec<Option<u32>>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Option<u32>>, Vec<CellPartial>)> = Vec::new();

        for i_row in 0..self.n_rows {
            let key: Vec<_> = key_idx
                .iter()
                .map(|&i_col| self.columns[i_col].codes[i_row])
                .collect();
            let i_group = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, vec![CellPartial::default(); self.columns.len()]));
                groups.len() - 1
            });

            let partials = &mut groups[i_group].1;
            for (i_col, column) in self.columns.iter().enumerate() {
                if key_idx.contains(&i_col) || column.codes[i_row].is_none() {
                    continue;
                }
                if let Some(val) = column.value(i_row) {
                    partials[i_col].add_num(val);
                }
                partials[i_col].set_first(column.cell(i_row));
            }
        }

        log::info!("found {} unique groups for {}", groups.len(), keys.join(", "));

        let decoded = groups.into_iter().map(|(key, partials)| {
            let key = key
                .iter()
                .zip(&key_idx)
                .map(|(code, &i_col)| match code {
                    Some(code) => self.columns[i_col].dict[*code as usize].clone(),
                    None => String::new(),
                })
                .collect();
            (key, partials)
        });
        Ok(assemble_groups(&headers, &key_idx, kinds, decoded))
    }

    pub fn footprint(&self) -> usize {
        self.columns.iter().map(Column::footprint).sum()
    }
}
