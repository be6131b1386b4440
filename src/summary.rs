use serde::{Deserialize, Serialize};

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Numeric statistics of a column, computed over its parsable cells only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub numeric_count: u64,
    /// Non-null cells that did not parse as a number.
    pub unparsable: u64,
    pub sum: f64,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
    pub zeros: u64,
    pub negatives: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: u64,
    pub non_null: u64,
    pub null: u64,
    pub unique: u64,
    pub mode: Option<String>,
    pub top_values: Vec<(String, u64)>,
    /// Lexically smallest and largest non-null cells.
    pub lexical_range: Option<(String, String)>,
    pub numeric: Option<NumericSummary>,
}

impl ColumnSummary {
    pub fn kind(&self) -> ColumnKind {
        match self.numeric {
            Some(_) => ColumnKind::Numeric,
            None => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub title: String,
    pub rows: u64,
    pub duplicate_rows: u64,
    /// Cells that were not valid UTF-8 and were read as null.
    pub invalid_cells: u64,
    pub columns: Vec<ColumnSummary>,
}

impl DatasetSummary {
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn total_cells(&self) -> u64 {
        self.rows * self.columns.len() as u64
    }

    pub fn null_cells(&self) -> u64 {
        self.columns.iter().map(|col| col.null).sum()
    }

    pub fn non_null_cells(&self) -> u64 {
        self.columns.iter().map(|col| col.non_null).sum()
    }

    pub fn kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(ColumnSummary::kind).collect()
    }

    pub fn count_kind(&self, kind: ColumnKind) -> usize {
        self.columns.iter().filter(|col| col.kind() == kind).count()
    }

    /// First column named `name`.
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = (&ColumnSummary, &NumericSummary)> {
        self.columns
            .iter()
            .filter_map(|col| col.numeric.as_ref().map(|num| (col, num)))
    }

    pub fn text_columns(&self) -> impl Iterator<Item = &ColumnSummary> {
        self.columns.iter().filter(|col| col.numeric.is_none())
    }
}
