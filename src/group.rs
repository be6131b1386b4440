use crate::dataset::{format_num, is_null, parse_num};
use crate::summary::ColumnKind;
use crate::table::Table;
use anyhow::{Result, bail};
use std::collections::HashMap;

/// Partial aggregate of one non-key column within one group.
#[derive(Debug, Clone, Default)]
pub struct CellPartial {
    sum: f64,
    n_num: u64,
    first: Option<String>,
}

impl CellPartial {
    pub fn add(&mut self, cell: &str) {
        if is_null(cell) {
            return;
        }
        if let Some(val) = parse_num(cell) {
            self.add_num(val);
        }
        self.set_first(cell);
    }

    pub fn add_num(&mut self, val: f64) {
        self.sum += val;
        self.n_num += 1;
    }

    pub fn set_first(&mut self, cell: &str) {
        if self.first.is_none() {
            self.first = Some(cell.to_owned());
        }
    }

    /// Final cell: the numeric sum for numeric columns when the group had any
    /// numbers, otherwise the first non-null cell.
    pub fn finish(self, kind: ColumnKind) -> String {
        if kind == ColumnKind::Numeric && self.n_num > 0 {
            return format_num(self.sum);
        }
        self.first.unwrap_or_default()
    }
}

/// Resolve key column names to their indices in `headers`.
///
/// A key must name exactly one column.
pub fn key_indices(headers: &[String], keys: &[String]) -> Result<Vec<usize>> {
    keys.iter()
        .map(|key| {
            let mut matches = headers
                .iter()
                .enumerate()
                .filter(|(_, h)| *h == key)
                .map(|(idx, _)| idx);
            match (matches.next(), matches.next()) {
                (Some(idx), None) => Ok(idx),
                (Some(_), Some(_)) => bail!("column {key:?} appears more than once in headers"),
                (None, _) => bail!("column {key:?} not found in headers"),
            }
        })
        .collect()
}

/// Assemble the aggregated [`Table`] from finished groups.
pub fn assemble_groups<I>(
    headers: &[String],
    key_idx: &[usize],
    kinds: &[ColumnKind],
    groups: I,
) -> Table
where
    I: IntoIterator<Item = (Vec<String>, Vec<CellPartial>)>,
{
    let rows = groups
        .into_iter()
        .map(|(key, partials)| {
            let mut row: Vec<String> = partials
                .into_iter()
                .zip(kinds)
                .map(|(partial, &kind)| partial.finish(kind))
                .collect();
            for (&idx, key_cell) in key_idx.iter().zip(key) {
                row[idx] = key_cell;
            }
            row
        })
        .collect();
    Table::new(headers.to_vec(), rows)
}

/// Group-by aggregator fed one row at a time.
///
/// Groups keep first-appearance order; rows whose key cells are null are
/// grouped under the empty key rather than dropped.
pub struct GroupAggregator {
    keys: Vec<String>,
    key_idx: Vec<usize>,
    headers: Vec<String>,
    index: HashMap<Vec<String>, usize>,
    groups: Vec<(Vec<String>, Vec<CellPartial>)>,
}

impl GroupAggregator {
    pub fn new(headers: &[String], keys: &[String]) -> Result<Self> {
        let key_idx = key_indices(headers, keys)?;
        Ok(Self {
            keys: keys.to_vec(),
            key_idx,
            headers: headers.to_vec(),
            index: HashMap::new(),
            groups: Vec::new(),
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn add_row(&mut self, cells: &[&str]) {
        let key: Vec<String> = self
            .key_idx
            .iter()
            .map(|&idx| {
                let cell = cells.get(idx).copied().unwrap_or("");
                if is_null(cell) {
                    String::new()
                } else {
                    cell.to_owned()
                }
            })
            .collect();

        let i_group = match self.index.get(&key) {
            Some(&i_group) => i_group,
            None => {
                let i_group = self.groups.len();
                let partials = vec![CellPartial::default(); self.headers.len()];
                self.groups.push((key.clone(), partials));
                self.index.insert(key, i_group);
                i_group
            }
        };

        let partials = &mut self.groups[i_group].1;
        for (i_col, partial) in partials.iter_mut().enumerate() {
            if self.key_idx.contains(&i_col) {
                continue;
            }
            partial.add(cells.get(i_col).copied().unwrap_or(""));
        }
    }

    pub fn footprint(&self) -> usize {
        let key_bytes: usize = self
            .groups
            .iter()
            .flat_map(|(key, _)| key.iter())
            .map(|cell| 2 * (cell.capacity() + size_of::<String>()))
            .sum();
        let partial_bytes: usize = self
            .groups
            .iter()
            .flat_map(|(_, partials)| partials.iter())
            .map(|partial| {
                size_of::<CellPartial>() + partial.first.as_ref().map_or(0, String::capacity)
            })
            .sum();
        key_bytes + partial_bytes
    }

    /// Produce one row per group given the column kinds of the source data.
    pub fn finish(self, kinds: &[ColumnKind]) -> Table {
        log::info!(
            "found {} unique groups for {}",
            self.n_groups(),
            self.keys.join(", ")
        );
        assemble_groups(&self.headers, &self.key_idx, kinds, self.groups)
    }
}
