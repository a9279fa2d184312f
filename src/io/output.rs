use std::io::Write;

use crate::alignment::ScoredSegmentPair;
use crate::errors::ExtenderError;

pub const SEGMENT_HEADER: &str = "target_position,query_position,length,score";

/// Write segments as CSV, one per line, preceded by a header line.
pub fn write_segments<W: Write>(mut writer: W, segments: &[ScoredSegmentPair]) -> Result<(), ExtenderError> {
    writeln!(writer, "{SEGMENT_HEADER}")?;
    for segment in segments {
        writeln!(writer, "{segment}")?;
    }

    writer.flush()?;

    Ok(())
}
