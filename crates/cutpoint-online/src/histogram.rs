// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Exponential histogram: the compressed window representation behind ADWIN.
//!
//! The window is never materialized as raw values. Row `i` holds buckets that
//! each summarize `2^i` consecutive observations with two sufficient
//! statistics (sum and sum of squared deviations). When a row exceeds its
//! capacity its two oldest buckets are merged with the parallel-variance
//! (Chan's) correction and promoted to the next row, so total memory stays
//! `O(max_buckets * log(width))` while the aggregate variance remains exact
//! at the retained resolution.
//!
//! Rows live in a plain `Vec` indexed by row number; within a row, buckets
//! are ordered oldest first. Row 0 is the newest data, the last row the
//! oldest.

/// Compressed statistics for a run of `2^row` observations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bucket {
    /// Sum of the represented observations.
    pub total: f64,
    /// Sum of squared deviations within the bucket (a merged sufficient
    /// statistic, not the raw variance).
    pub variance: f64,
}

/// One row of the histogram. The represented count per bucket is implicit
/// from the row index.
#[derive(Clone, Debug, Default)]
pub struct BucketRow {
    buckets: Vec<Bucket>,
}

impl BucketRow {
    pub(crate) fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    fn insert_bucket(&mut self, total: f64, variance: f64) {
        self.buckets.push(Bucket { total, variance });
    }

    /// Removes the `n` oldest buckets, left-shifting the rest.
    fn drop_oldest(&mut self, n: usize) {
        self.buckets.drain(..n);
    }
}

/// Adaptively-sized window over a numeric stream, stored as compressed
/// bucket statistics.
#[derive(Clone, Debug)]
pub struct ExponentialHistogram {
    rows: Vec<BucketRow>,
    max_buckets: usize,
    total: f64,
    variance: f64,
    width: usize,
    bucket_count: usize,
    max_bucket_count: usize,
}

/// Between-group variance correction for combining two summarized groups
/// (Chan's parallel-combination formula). Exact because each group keeps its
/// first and second moments.
fn between_group_correction(n0: f64, u0: f64, n1: f64, u1: f64) -> f64 {
    let diff = u0 / n0 - u1 / n1;
    n0 * n1 * diff * diff / (n0 + n1)
}

impl ExponentialHistogram {
    /// `max_buckets` is the per-row capacity; one extra transient slot is
    /// used during merges.
    pub fn new(max_buckets: usize) -> Self {
        Self {
            rows: vec![BucketRow::default()],
            max_buckets,
            total: 0.0,
            variance: 0.0,
            width: 0,
            bucket_count: 0,
            max_bucket_count: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Aggregate sum of squared deviations over the whole window.
    pub fn variance_sum(&self) -> f64 {
        self.variance
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// High-water mark of live buckets, for capacity diagnostics.
    pub fn max_bucket_count(&self) -> usize {
        self.max_bucket_count
    }

    pub(crate) fn rows(&self) -> &[BucketRow] {
        &self.rows
    }

    /// Raw observations represented by one bucket of row `row`.
    pub(crate) fn bucket_size(row: usize) -> usize {
        1 << row
    }

    /// Appends one raw observation as a row-0 singleton bucket and
    /// recompresses. The aggregate variance uses Welford's one-pass update
    /// with the pre-insertion mean, which keeps it exact for the window.
    pub fn insert(&mut self, value: f64) {
        self.width += 1;
        if self.width > 1 {
            let prev = (self.width - 1) as f64;
            let deviation = value - self.total / prev;
            self.variance += prev * deviation * deviation / self.width as f64;
        }
        self.total += value;

        self.rows[0].insert_bucket(value, 0.0);
        self.bucket_count += 1;
        if self.bucket_count > self.max_bucket_count {
            self.max_bucket_count = self.bucket_count;
        }

        self.compress();
        self.debug_check_width();
    }

    /// Cascading row compression: merge the two oldest buckets of any row
    /// that exceeds capacity and promote the result to the next row.
    fn compress(&mut self) {
        let mut row = 0;
        while self.rows[row].len() > self.max_buckets {
            let n = Self::bucket_size(row) as f64;
            let first = self.rows[row].buckets[0];
            let second = self.rows[row].buckets[1];
            let correction = between_group_correction(n, first.total, n, second.total);
            let merged_total = first.total + second.total;
            let merged_variance = first.variance + second.variance + correction;

            self.rows[row].drop_oldest(2);
            self.bucket_count -= 2;

            if row + 1 == self.rows.len() {
                self.rows.push(BucketRow::default());
            }
            self.rows[row + 1].insert_bucket(merged_total, merged_variance);
            self.bucket_count += 1;
            if self.bucket_count > self.max_bucket_count {
                self.max_bucket_count = self.bucket_count;
            }

            row += 1;
        }
    }

    /// Removes the oldest bucket (first slot of the highest row) and updates
    /// the aggregates by subtracting its contribution, treating the removed
    /// bucket and the remaining window as two groups of the combination
    /// formula. Returns the number of raw observations removed.
    pub fn delete_oldest(&mut self) -> usize {
        let last = self.rows.len() - 1;
        let removed_count = Self::bucket_size(last);
        let removed = self.rows[last].buckets[0];

        self.width -= removed_count;
        self.total -= removed.total;
        if self.width > 0 {
            let n1 = removed_count as f64;
            let rest = self.width as f64;
            let decrement = removed.variance
                + between_group_correction(n1, removed.total, rest, self.total);
            self.variance -= decrement;
            // Cancellation in the subtraction can leave a tiny negative
            // aggregate; clamp so downstream sqrt stays defined.
            if self.variance < 0.0 {
                self.variance = 0.0;
            }
        } else {
            self.total = 0.0;
            self.variance = 0.0;
        }

        self.rows[last].drop_oldest(1);
        self.bucket_count -= 1;
        if self.rows[last].len() == 0 && self.rows.len() > 1 {
            self.rows.pop();
        }

        self.debug_check_width();
        removed_count
    }

    pub fn clear(&mut self) {
        self.rows = vec![BucketRow::default()];
        self.total = 0.0;
        self.variance = 0.0;
        self.width = 0;
        self.bucket_count = 0;
    }

    fn debug_check_width(&self) {
        debug_assert_eq!(
            self.width,
            self.rows
                .iter()
                .enumerate()
                .map(|(row, r)| r.len() * Self::bucket_size(row))
                .sum::<usize>(),
            "window width diverged from the sum of bucket counts"
        );
        debug_assert!(
            self.rows.iter().all(|r| r.len() <= self.max_buckets + 1),
            "row exceeded capacity without triggering compression"
        );
    }
}
