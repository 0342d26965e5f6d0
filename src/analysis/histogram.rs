//! Fixed bin count histogram
//!
//! Bins are equal width and span the observed minimum to maximum of the input.
//! Every bin is half-open except the last, which also includes the maximum.
//! A constant input is binned over `value ± 0.5`. NaN and infinite values
//! cannot be placed in a bin; they are counted in [`Histogram::skipped`] so
//! that `total() + skipped` always equals the input length.

use crate::error::{Result, ScopeError};

/// Histogram of one series
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `bins + 1` ascending bin edges
    pub edges: Vec<f64>,
    /// Sample count per bin
    pub counts: Vec<u64>,
    /// Non-finite inputs left out of every bin
    pub skipped: u64,
}

impl Histogram {
    /// Number of bins
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Total number of binned samples
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// (left edge, count) pairs
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.edges
            .iter()
            .zip(self.counts.iter())
            .map(|(&e, &c)| [e, c as f64])
            .collect()
    }

    /// Right edge of the last bin
    pub fn upper_edge(&self) -> f64 {
        self.edges.last().copied().unwrap_or(0.0)
    }
}

/// Bin the finite values of `values` into `bins` equal-width bins
pub fn histogram(values: &[f64], bins: usize) -> Result<Histogram> {
    if bins == 0 {
        return Err(ScopeError::invalid("histogram needs at least one bin"));
    }

    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 1.0));
    let (lo, hi) = if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };

    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| if i == bins { hi } else { lo + i as f64 * width })
        .collect();

    let mut counts = vec![0u64; bins];
    let mut skipped = 0u64;
    for &v in values {
        if !v.is_finite() {
            skipped += 1;
            continue;
        }
        let idx = (((v - lo) / (hi - lo)) * bins as f64) as usize;
        counts[idx.min(bins - 1)] += 1;
    }
    if skipped > 0 {
        tracing::debug!("Histogram skipped {} non-finite values", skipped);
    }

    Ok(Histogram {
        edges,
        counts,
        skipped,
    })
}
