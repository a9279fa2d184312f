pub mod fasta;
pub mod output;
pub mod seeds;

pub use fasta::{load_first_sequence, SequenceRecord};
pub use output::write_segments;
pub use seeds::{load_seed_pairs, SeedColumnOrder};
