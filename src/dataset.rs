use anyhow::{Context, Result, bail};
use csv::{ByteRecord, Reader, ReaderBuilder};
use std::{fs::File, io::Read, path::Path};

/// Sequential reader of CSV rows normalized to the header width.
///
/// Short rows are padded with empty cells and long rows are truncated.
/// Cells that are not valid UTF-8 read as empty and are counted.
pub struct RowReader<R: Read> {
    reader: Reader<R>,
    headers: Vec<String>,
    record: ByteRecord,
    rows_read: u64,
    invalid_cells: u64,
    progress_every: u64,
}

impl RowReader<File> {
    pub fn open<P: AsRef<Path>>(file: P, progress_every: u64) -> Result<Self> {
        let file = file.as_ref();
        log::info!("loading dataset from {file:?}");
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        Self::from_reader(file, progress_every)
    }
}

impl<R: Read> RowReader<R> {
    pub fn from_reader(reader: R, progress_every: u64) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .context("failed to read header row")?
            .iter()
            .map(str::to_owned)
            .collect();
        if headers.is_empty() {
            bail!("dataset has no header row");
        }

        Ok(Self {
            reader,
            headers,
            record: ByteRecord::new(),
            rows_read: 0,
            invalid_cells: 0,
            progress_every: progress_every.max(1),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn invalid_cells(&self) -> u64 {
        self.invalid_cells
    }

    /// Advance to the next row, returning `false` at end of input.
    pub fn read_row(&mut self) -> Result<bool> {
        let has_row = self
            .reader
            .read_byte_record(&mut self.record)
            .context("failed to read dataset")?;
        if !has_row {
            log::info!(
                "dataset loaded: {} columns, {} rows",
                self.headers.len(),
                self.rows_read
            );
            return Ok(false);
        }

        self.rows_read += 1;
        let n_invalid = self
            .record
            .iter()
            .take(self.headers.len())
            .filter(|bytes| std::str::from_utf8(bytes).is_err())
            .count();
        if n_invalid > 0 {
            self.invalid_cells += n_invalid as u64;
            log::warn!("row {} has {n_invalid} invalid UTF-8 cells", self.rows_read);
        }

        if self.rows_read % self.progress_every == 0 {
            log::info!("loaded {} rows", self.rows_read);
        }
        Ok(true)
    }

    /// Cell `i` of the current row; missing and non-UTF-8 cells read as empty.
    pub fn cell(&self, i: usize) -> &str {
        self.record
            .get(i)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    pub fn cells(&self) -> impl Iterator<Item = &str> {
        (0..self.headers.len()).map(|i| self.cell(i))
    }
}

/// Whether a cell counts as missing: absent, empty, or only whitespace.
pub fn is_null(cell: &str) -> bool {
    cell.trim().is_empty()
}

/// Parse a non-null cell as a finite number.
pub fn parse_num(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|val| val.is_finite())
}

/// Render a number so that [`parse_num`] reads back the same value.
pub fn format_num(val: f64) -> String {
    format!("{val}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(data: &[u8]) -> (Vec<String>, Vec<Vec<String>>, u64) {
        let mut reader = RowReader::from_reader(data, 1000).expect("valid header");
        let mut rows = Vec::new();
        while reader.read_row().expect("readable input") {
            rows.push(reader.cells().map(str::to_owned).collect());
        }
        (reader.headers().to_vec(), rows, reader.invalid_cells())
    }

    #[test]
    fn rows_are_normalized_to_header_width() {
        let (headers, rows, invalid) = read_all(b"a,b,c\n1,2\n1,2,3,4\n\"x,y\",,z\n");
        assert_eq!(headers, ["a", "b", "c"]);
        assert_eq!(rows[0], ["1", "2", ""]);
        assert_eq!(rows[1], ["1", "2", "3"]);
        assert_eq!(rows[2], ["x,y", "", "z"]);
        assert_eq!(invalid, 0);
    }

    #[test]
    fn invalid_utf8_cells_read_as_null() {
        let data = b"page_id,spend,bylines\np1,5,A\np1,7,B\xe9\n\xff,3\n";
        let (_, rows, invalid) = read_all(data);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], ["p1", "7", ""]);
        assert_eq!(rows[2], ["", "3", ""]);
        assert_eq!(invalid, 2);
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(RowReader::from_reader("".as_bytes(), 10).is_err());
    }

    #[test]
    fn null_and_numeric_predicates() {
        assert!(is_null(""));
        assert!(is_null("   "));
        assert!(!is_null(" 0 "));

        assert_eq!(parse_num(" 12.5 "), Some(12.5));
        assert_eq!(parse_num("-3"), Some(-3.0));
        assert_eq!(parse_num("1e3"), Some(1000.0));
        assert_eq!(parse_num("abc"), None);
        assert_eq!(parse_num("NaN"), None);
        assert_eq!(parse_num("inf"), None);
    }

    #[test]
    fn formatted_numbers_parse_back_exactly() {
        for val in [30.0, 0.1 + 0.2, -1234.5678, 1e-9] {
            assert_eq!(parse_num(&format_num(val)), Some(val));
        }
    }
}
