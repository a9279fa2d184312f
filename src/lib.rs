pub mod alignment;
pub mod alphabet;
pub mod device;
pub mod errors;
pub mod extender;
pub mod io;
pub mod scoring;

pub use alignment::{ScoredSegmentPair, SeedPair};
pub use errors::ExtenderError;
pub use extender::{create_extender, Extender, ExtenderConfig, UngappedExtender};
