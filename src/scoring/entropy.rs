//! Complexity adjustment of extension scores.
//!
//! Low-complexity regions (homopolymer runs, short tandem repeats) easily produce high scoring
//! ungapped segments. An [`EntropyPolicy`] rescales the raw substitution score of a segment based
//! on the information content of the aligned region before the score threshold is applied.

use std::fmt;

use crate::alphabet::{is_base, A_NT, C_NT, G_NT, T_NT};
use crate::errors::{ConfigurationError, ExtenderError};

pub trait EntropyPolicy: fmt::Debug + Send + Sync {
    /// Adjust the raw `score` of a segment spanning `query_span` and `target_span`.
    fn adjust(&self, score: i32, query_span: &[u8], target_span: &[u8]) -> i32;
}

/// Leaves scores untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoAdjustment;

impl EntropyPolicy for NoAdjustment {
    #[inline(always)]
    fn adjust(&self, score: i32, _: &[u8], _: &[u8]) -> i32 {
        score
    }
}

/// Scales positive scores by `min(1, H / saturation_bits)`, where `H` is the Shannon entropy (in
/// bits) of the base composition of the query part of the segment. Only the four unambiguous
/// bases are counted; a span without any of them has zero information content.
///
/// With the default saturation of one bit, only regions dominated by a single base are
/// penalized; raising the saturation towards two bits also penalizes dinucleotide repeats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShannonEntropy {
    saturation_bits: f64,
}

impl ShannonEntropy {
    pub const DEFAULT_SATURATION_BITS: f64 = 1.0;

    pub fn new(saturation_bits: f64) -> Result<Self, ExtenderError> {
        if !saturation_bits.is_finite() || saturation_bits <= 0.0 {
            return Err(ConfigurationError::EntropySaturation(saturation_bits).into());
        }

        Ok(Self { saturation_bits })
    }

    pub fn saturation_bits(&self) -> f64 {
        self.saturation_bits
    }

    /// Shannon entropy of the base composition of `span` in bits, or `None` if the span contains
    /// no unambiguous bases.
    pub fn entropy_bits(span: &[u8]) -> Option<f64> {
        let mut counts = [0usize; 4];
        for code in span.iter().copied().filter(|c| is_base(*c)) {
            counts[code as usize] += 1;
        }

        let total: usize = counts.iter().sum();
        if total == 0 {
            return None;
        }

        let entropy = [A_NT, C_NT, G_NT, T_NT].iter()
            .map(|b| counts[*b as usize])
            .filter(|count| *count > 0)
            .map(|count| {
                let p = count as f64 / total as f64;
                -p * p.log2()
            })
            .sum::<f64>();

        Some(entropy)
    }

    pub fn factor(&self, span: &[u8]) -> f64 {
        Self::entropy_bits(span)
            .map(|h| (h / self.saturation_bits).min(1.0))
            .unwrap_or(0.0)
    }
}

impl Default for ShannonEntropy {
    fn default() -> Self {
        Self { saturation_bits: Self::DEFAULT_SATURATION_BITS }
    }
}

impl EntropyPolicy for ShannonEntropy {
    fn adjust(&self, score: i32, query_span: &[u8], _: &[u8]) -> i32 {
        if score <= 0 {
            return score;
        }

        (score as f64 * self.factor(query_span)).trunc() as i32
    }
}
