pub mod entropy;

use std::fmt::{self, Display, Formatter};
use std::io::Read;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use entropy::{EntropyPolicy, NoAdjustment, ShannonEntropy};

use crate::alphabet::NUC;
use crate::errors::{ConfigurationError, ExtenderError};

/// Reference nucleotide substitution scores (HOXD70 for the four bases), with penalties for
/// soft-masked, ambiguous, unknown and terminator symbols.
#[rustfmt::skip]
const DEFAULT_SCORES: [i32; NUC * NUC] = [
       91,  -114,   -31,  -123, -1000, -1000,  -100, -9100,
     -114,   100,  -125,   -31, -1000, -1000,  -100, -9100,
      -31,  -125,   100,  -114, -1000, -1000,  -100, -9100,
     -123,   -31,  -114,    91, -1000, -1000,  -100, -9100,
    -1000, -1000, -1000, -1000, -1000, -1000, -1000, -9100,
    -1000, -1000, -1000, -1000, -1000, -1000, -1000, -9100,
     -100,  -100,  -100,  -100, -1000, -1000,  -100, -9100,
    -9100, -9100, -9100, -9100, -9100, -9100, -9100, -9100,
];

/// Square substitution score matrix over the encoded alphabet.
///
/// Stored row-major: rows are indexed by the query symbol, columns by the target symbol.
/// Symbols outside the alphabet score as the minimum entry of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScoreTable", into = "RawScoreTable")]
pub struct ScoreTable {
    alphabet_size: usize,
    scores: Vec<i32>,
    min_score: i32,
}

#[derive(Serialize, Deserialize)]
struct RawScoreTable {
    alphabet_size: i32,
    scores: Vec<i32>,
}

impl ScoreTable {
    pub fn new(scores: impl Into<Vec<i32>>, alphabet_size: i32) -> Result<Self, ExtenderError> {
        let scores = scores.into();
        if alphabet_size <= 0 {
            return Err(ConfigurationError::AlphabetSize(alphabet_size).into());
        }

        let alphabet_size = alphabet_size as usize;
        let expected = alphabet_size * alphabet_size;
        if scores.len() != expected {
            return Err(ConfigurationError::ScoreTableSize { expected, actual: scores.len() }.into());
        }

        let min_score = scores.iter().copied().min().unwrap_or_default();

        Ok(Self { alphabet_size, scores, min_score })
    }

    /// Simple match/mismatch scoring over an alphabet of the given size.
    pub fn match_mismatch(alphabet_size: i32, match_score: i32, mismatch_score: i32) -> Result<Self, ExtenderError> {
        let size = alphabet_size.max(0) as usize;
        let scores: Vec<i32> = (0..size)
            .cartesian_product(0..size)
            .map(|(q, t)| if q == t { match_score } else { mismatch_score })
            .collect();

        Self::new(scores, alphabet_size)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ExtenderError> {
        Ok(serde_json::from_reader(reader)?)
    }

    #[inline(always)]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    #[inline(always)]
    pub fn score(&self, query_symbol: u8, target_symbol: u8) -> i32 {
        let (q, t) = (query_symbol as usize, target_symbol as usize);
        if q < self.alphabet_size && t < self.alphabet_size {
            self.scores[q * self.alphabet_size + t]
        } else {
            self.min_score
        }
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.scores
    }
}

impl Default for ScoreTable {
    fn default() -> Self {
        let min_score = DEFAULT_SCORES.iter().copied().min().unwrap_or_default();

        Self {
            alphabet_size: NUC,
            scores: DEFAULT_SCORES.to_vec(),
            min_score,
        }
    }
}

impl TryFrom<RawScoreTable> for ScoreTable {
    type Error = ExtenderError;

    fn try_from(value: RawScoreTable) -> Result<Self, Self::Error> {
        Self::new(value.scores, value.alphabet_size)
    }
}

impl From<ScoreTable> for RawScoreTable {
    fn from(value: ScoreTable) -> Self {
        Self {
            alphabet_size: value.alphabet_size as i32,
            scores: value.scores,
        }
    }
}

impl Display for ScoreTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self.scores
            .chunks(self.alphabet_size)
            .map(|row| row.iter().map(|v| format!("{v:>6}")).join(""));

        write!(f, "{}", rows.format("\n"))
    }
}
