//! Reading seed pairs from tabular text files.
//!
//! One seed per line, two non-negative integers separated by a comma, a tab or spaces. Empty
//! lines and lines starting with `#` are skipped.

use std::io::BufRead;
use std::path::Path;

use itertools::Itertools;

use super::fasta::open_maybe_gzipped;
use crate::alignment::SeedPair;
use crate::errors::ExtenderError;

/// Which column holds which coordinate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SeedColumnOrder {
    /// `query_position, target_position`
    #[default]
    QueryFirst,

    /// `target_position, query_position`
    TargetFirst,
}

fn parse_position(field: &str) -> Result<u32, String> {
    field.parse()
        .map_err(|e| format!("invalid position '{field}' ({e})"))
}

/// Parse a single line. Returns `Ok(None)` for lines without a seed.
pub fn parse_seed_pair_line(line: &str, order: SeedColumnOrder) -> Result<Option<SeedPair>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (first, second) = line.split([',', '\t', ' '])
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect_tuple()
        .ok_or_else(|| format!("expected two fields, got '{line}'"))?;

    let (first, second) = (parse_position(first)?, parse_position(second)?);

    Ok(Some(match order {
        SeedColumnOrder::QueryFirst => SeedPair::new(first, second),
        SeedColumnOrder::TargetFirst => SeedPair::new(second, first),
    }))
}

pub fn read_seed_pairs<R: BufRead>(reader: R, order: SeedColumnOrder) -> Result<Vec<SeedPair>, ExtenderError> {
    let mut seed_pairs = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let parsed = parse_seed_pair_line(&line, order)
            .map_err(|message| ExtenderError::SeedParse { line: i + 1, message })?;

        if let Some(seed_pair) = parsed {
            seed_pairs.push(seed_pair);
        }
    }

    Ok(seed_pairs)
}

pub fn load_seed_pairs(path: &Path, order: SeedColumnOrder) -> Result<Vec<SeedPair>, ExtenderError> {
    read_seed_pairs(open_maybe_gzipped(path)?, order)
}
