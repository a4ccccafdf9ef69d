//! Running image-space occupancy counts for balancing object placement.
//!
//! Every successfully placed object records its projected position. Sampling
//! then favors cells that have seen fewer objects, so that a long run of
//! generated scenes covers the frame evenly instead of clustering wherever the
//! constraints make placement easiest.

use std::sync::{Arc, Mutex, PoisonError};

use glam::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, Result};

/// Default number of bins per axis.
pub const DEFAULT_BINS: usize = 10;

/// Total jitter mass spread over all bins before renormalizing.
const JITTER: f64 = 1e-3;

/// A square grid of counts over normalized image space.
///
/// Bins are stored row-major: row index follows `v`, column index follows `u`.
/// Deserialization checks the shape, so a histogram saved by one run can be
/// safely reloaded by the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHistogram")]
pub struct OccupancyHistogram {
    n_bins: usize,
    exponent: f64,
    counts: Vec<u64>,
}

/// Unchecked serialized form of [`OccupancyHistogram`].
#[derive(Deserialize)]
struct RawHistogram {
    n_bins: usize,
    exponent: f64,
    counts: Vec<u64>,
}

impl TryFrom<RawHistogram> for OccupancyHistogram {
    type Error = PopulationError;

    fn try_from(raw: RawHistogram) -> Result<Self> {
        if raw.n_bins == 0 {
            return Err(PopulationError::InvalidOptions(
                "histogram needs at least one bin per axis".into(),
            ));
        }
        if !(raw.exponent.is_finite() && raw.exponent >= 0.0) {
            return Err(PopulationError::InvalidOptions(format!(
                "histogram exponent must be finite and non-negative, got {}",
                raw.exponent
            )));
        }
        let cells = raw.n_bins.checked_mul(raw.n_bins);
        if cells != Some(raw.counts.len()) {
            return Err(PopulationError::InvalidOptions(format!(
                "histogram with {} bins per axis holds {} counts",
                raw.n_bins,
                raw.counts.len()
            )));
        }
        Ok(Self {
            n_bins: raw.n_bins,
            exponent: raw.exponent,
            counts: raw.counts,
        })
    }
}

impl Default for OccupancyHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_BINS, 1.0)
    }
}

impl OccupancyHistogram {
    /// Creates an empty histogram with `n_bins` per axis.
    ///
    /// Higher `exponent` pushes new placements harder toward empty cells.
    #[must_use]
    pub fn new(n_bins: usize, exponent: f64) -> Self {
        let n_bins = n_bins.max(1);
        Self {
            n_bins,
            exponent: exponent.max(0.0),
            counts: vec![0; n_bins * n_bins],
        }
    }

    /// Loads a histogram saved with `serde_json`, checking its shape.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bins per axis.
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Bias strength.
    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Raw counts, row-major.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Count of the bin at `(col, row)`.
    #[must_use]
    pub fn count(&self, col: usize, row: usize) -> u64 {
        self.counts[row * self.n_bins + col]
    }

    /// Number of recorded positions.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Index of the bin containing `(u, v)`, or `None` outside the unit square.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn bin_index(&self, u: f64, v: f64) -> Option<usize> {
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        let n = self.n_bins as f64;
        let col = ((u * n) as usize).min(self.n_bins - 1);
        let row = ((v * n) as usize).min(self.n_bins - 1);
        Some(row * self.n_bins + col)
    }

    /// Counts one placement at `(u, v)`. Returns false if the point is off-screen.
    pub fn record(&mut self, u: f64, v: f64) -> bool {
        match self.bin_index(u, v) {
            Some(index) => {
                self.counts[index] += 1;
                true
            }
            None => {
                log::trace!("ignoring off-screen occupancy sample ({u}, {v})");
                false
            }
        }
    }

    /// Adds the counts of another histogram with the same shape.
    pub fn merge(&mut self, other: &OccupancyHistogram) -> Result<()> {
        if other.n_bins != self.n_bins {
            return Err(PopulationError::HistogramMismatch {
                expected: self.n_bins,
                actual: other.n_bins,
            });
        }
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine += theirs;
        }
        Ok(())
    }

    /// Inverse-occupancy weights raised to the bias exponent, without jitter.
    ///
    /// An exponent of 0 keeps the plain inverse weighting.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn biased_weights(&self) -> Vec<f64> {
        let total = self.total();
        let p: Vec<f64> = if total == 0 {
            uniform(self.counts.len())
        } else {
            self.counts.iter().map(|&c| c as f64 / total as f64).collect()
        };

        let max = p.iter().copied().fold(0.0, f64::max);
        let p_inv = normalize(p.iter().map(|&x| max - x).collect());

        if self.exponent == 0.0 {
            return p_inv;
        }
        normalize(p_inv.iter().map(|&x| x.powf(self.exponent)).collect())
    }

    /// Sampling distribution over bins: biased weights plus a small positive jitter.
    ///
    /// Every entry is strictly positive and the entries sum to 1.
    #[allow(clippy::cast_precision_loss)]
    pub fn probabilities<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let cell_jitter = JITTER / self.counts.len() as f64;
        let jittered = self
            .biased_weights()
            .into_iter()
            .map(|p| p + cell_jitter * (1.0 - rng.gen::<f64>()))
            .collect();
        normalize(jittered)
    }

    /// Draws an image position, favoring under-used bins.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVec2 {
        let probabilities = self.probabilities(rng);
        let draw = rng.gen::<f64>();

        let mut cumulative = 0.0;
        let index = probabilities
            .iter()
            .position(|p| {
                cumulative += p;
                cumulative > draw
            })
            .unwrap_or(probabilities.len() - 1);

        let n = self.n_bins as f64;
        let col = (index % self.n_bins) as f64;
        let row = (index / self.n_bins) as f64;
        DVec2::new((col + rng.gen::<f64>()) / n, (row + rng.gen::<f64>()) / n)
    }
}

#[allow(clippy::cast_precision_loss)]
fn uniform(len: usize) -> Vec<f64> {
    vec![1.0 / len as f64; len]
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return uniform(values.len());
    }
    values.into_iter().map(|v| v / sum).collect()
}

/// A histogram shared between workers that populate scenes in parallel.
///
/// Each access takes the lock for the duration of the closure.
#[derive(Debug, Clone, Default)]
pub struct SharedHistogram(Arc<Mutex<OccupancyHistogram>>);

impl SharedHistogram {
    /// Wraps a histogram for sharing.
    #[must_use]
    pub fn new(histogram: OccupancyHistogram) -> Self {
        Self(Arc::new(Mutex::new(histogram)))
    }

    /// Runs `f` with exclusive access to the histogram.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut OccupancyHistogram) -> R,
    {
        // counts stay consistent even if a holder panicked mid-update
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> OccupancyHistogram {
        self.with(|h| h.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_record_and_count() {
        let mut h = OccupancyHistogram::new(4, 1.0);
        assert!(h.record(0.1, 0.1));
        assert!(h.record(0.9, 0.1));
        assert!(h.record(1.0, 1.0));
        assert_eq!(h.count(0, 0), 1);
        assert_eq!(h.count(3, 0), 1);
        assert_eq!(h.count(3, 3), 1);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn test_off_screen_is_ignored() {
        let mut h = OccupancyHistogram::new(4, 1.0);
        assert!(!h.record(-0.1, 0.5));
        assert!(!h.record(0.5, 1.5));
        assert_eq!(h.total(), 0);
    }

    #[test]
    fn test_empty_histogram_is_uniform() {
        let h = OccupancyHistogram::new(3, 2.0);
        for w in h.biased_weights() {
            assert!((w - 1.0 / 9.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_crowded_bin_is_disfavored() {
        let mut rng = Pcg64::seed_from_u64(1);
        for exponent in [1.0, 2.0, 5.0] {
            let mut h = OccupancyHistogram::new(5, exponent);
            for _ in 0..50 {
                h.record(0.05, 0.05);
            }
            let a = h.bin_index(0.05, 0.05).unwrap();
            let b = h.bin_index(0.95, 0.95).unwrap();
            let p = h.probabilities(&mut rng);
            assert!(p[b] > p[a], "exponent {exponent}: {} <= {}", p[b], p[a]);
        }
    }

    #[test]
    fn test_exponent_sharpens_bias() {
        let mut flat = OccupancyHistogram::new(2, 0.0);
        let mut sharp = OccupancyHistogram::new(2, 3.0);
        for h in [&mut flat, &mut sharp] {
            for _ in 0..3 {
                h.record(0.1, 0.1);
            }
            h.record(0.9, 0.1);
            h.record(0.1, 0.9);
        }
        let empty = flat.bin_index(0.9, 0.9).unwrap();
        let light = flat.bin_index(0.9, 0.1).unwrap();
        let ratio_flat = flat.biased_weights()[empty] / flat.biased_weights()[light];
        let ratio_sharp = sharp.biased_weights()[empty] / sharp.biased_weights()[light];
        assert!(ratio_sharp > ratio_flat);
    }

    #[test]
    fn test_probabilities_are_positive_and_normalized() {
        let mut rng = Pcg64::seed_from_u64(9);
        let mut h = OccupancyHistogram::new(6, 4.0);
        for i in 0..30 {
            h.record(f64::from(i) / 30.0, 0.5);
        }
        let p = h.probabilities(&mut rng);
        assert!(p.iter().all(|&x| x > 0.0));
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_avoids_crowded_region() {
        let mut rng = Pcg64::seed_from_u64(42);
        let mut h = OccupancyHistogram::new(2, 1.0);
        for _ in 0..100 {
            h.record(0.25, 0.25);
        }
        let crowded = (0..2000)
            .map(|_| h.sample(&mut rng))
            .inspect(|s| assert!((0.0..=1.0).contains(&s.x) && (0.0..=1.0).contains(&s.y)))
            .filter(|s| s.x < 0.5 && s.y < 0.5)
            .count();
        // the crowded quadrant only keeps jitter mass
        assert!(crowded < 20, "{crowded} samples in the crowded quadrant");
    }

    #[test]
    fn test_json_round_trip() {
        let mut h = OccupancyHistogram::new(4, 2.0);
        h.record(0.3, 0.7);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(OccupancyHistogram::from_json_str(&json).unwrap(), h);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let no_bins = r#"{"n_bins":0,"exponent":1.0,"counts":[]}"#;
        assert!(OccupancyHistogram::from_json_str(no_bins).is_err());
        assert!(serde_json::from_str::<OccupancyHistogram>(no_bins).is_err());

        let short = r#"{"n_bins":4,"exponent":1.0,"counts":[0,0]}"#;
        let err = OccupancyHistogram::from_json_str(short).unwrap_err();
        assert!(err.to_string().contains("4 bins per axis holds 2 counts"));

        let huge = format!(r#"{{"n_bins":{},"exponent":1.0,"counts":[]}}"#, usize::MAX);
        assert!(OccupancyHistogram::from_json_str(&huge).is_err());
    }

    #[test]
    fn test_merge() {
        let mut a = OccupancyHistogram::new(3, 1.0);
        let mut b = OccupancyHistogram::new(3, 1.0);
        a.record(0.1, 0.1);
        b.record(0.1, 0.1);
        b.record(0.9, 0.9);
        a.merge(&b).unwrap();
        assert_eq!(a.count(0, 0), 2);
        assert_eq!(a.count(2, 2), 1);

        let c = OccupancyHistogram::new(4, 1.0);
        assert!(matches!(
            a.merge(&c),
            Err(PopulationError::HistogramMismatch { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_shared_histogram_across_threads() {
        let shared = SharedHistogram::new(OccupancyHistogram::new(4, 1.0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shared.with(|h| h.record(0.5, 0.5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.snapshot().total(), 100);
    }
}
