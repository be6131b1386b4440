use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Running numeric aggregates of a single column.
///
/// Mean and variance use Welford's update.
#[derive(Debug, Clone)]
pub struct Accumulator {
    n_vals: u64,
    mean: f64,
    diff_2_sum: f64,
    sum: f64,
    min: f64,
    max: f64,
    zeros: u64,
    negatives: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub count: u64,
    pub sum: f64,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub zeros: u64,
    pub negatives: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            zeros: 0,
            negatives: 0,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;

        self.sum += val;
        self.min = self.min.min(val);
        self.max = self.max.max(val);
        if val == 0.0 {
            self.zeros += 1;
        } else if val < 0.0 {
            self.negatives += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.n_vals
    }

    pub fn report(&self) -> AccumulatorReport {
        let has_vals = self.n_vals > 0;
        AccumulatorReport {
            count: self.n_vals,
            sum: self.sum,
            mean: has_vals.then_some(self.mean),
            std_dev: (self.n_vals > 1)
                .then(|| (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()),
            min: has_vals.then_some(self.min),
            max: has_vals.then_some(self.max),
            zeros: self.zeros,
            negatives: self.negatives,
        }
    }
}

/// Retained numeric observations, kept only to compute exact quartiles.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    vals: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

impl Sample {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn footprint(&self) -> usize {
        self.vals.capacity() * size_of::<f64>()
    }

    pub fn quartiles(mut self) -> Option<Quartiles> {
        self.vals.sort_unstable_by(f64::total_cmp);
        Some(Quartiles {
            q25: compute_quantile(&self.vals, 0.25)?,
            median: compute_quantile(&self.vals, 0.5)?,
            q75: compute_quantile(&self.vals, 0.75)?,
        })
    }
}

/// Quantile of a sorted slice, interpolating linearly between closest ranks.
pub fn compute_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Frequency table keyed by observed cell value.
#[derive(Debug, Clone, Default)]
pub struct FreqTable {
    counts: HashMap<String, u64>,
}

impl FreqTable {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut table = Self::new();
        for (val, count) in counts {
            if count > 0 {
                *table.counts.entry(val).or_insert(0) += count;
            }
        }
        table
    }

    pub fn add(&mut self, val: &str) {
        // Avoid allocating for values already seen.
        if let Some(count) = self.counts.get_mut(val) {
            *count += 1;
        } else {
            self.counts.insert(val.to_owned(), 1);
        }
    }

    pub fn unique(&self) -> usize {
        self.counts.len()
    }

    /// Most frequent values, ordered by count descending then value ascending.
    pub fn top(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<_> = self.counts.iter().collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(n)
            .map(|(val, &count)| (val.clone(), count))
            .collect()
    }

    pub fn mode(&self) -> Option<String> {
        self.top(1).into_iter().next().map(|(val, _)| val)
    }

    /// Lexically smallest and largest observed values.
    pub fn range(&self) -> Option<(String, String)> {
        let min = self.counts.keys().min()?;
        let max = self.counts.keys().max()?;
        Some((min.clone(), max.clone()))
    }

    pub fn footprint(&self) -> usize {
        self.counts
            .keys()
            .map(|val| val.capacity() + size_of::<String>() + size_of::<u64>())
            .sum()
    }
}
