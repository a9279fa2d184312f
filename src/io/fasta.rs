use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::fasta;

use crate::errors::ExtenderError;

/// Open a possibly gzipped file for buffered reading.
pub(crate) fn open_maybe_gzipped(path: &Path) -> Result<Box<dyn BufRead + Send>, ExtenderError> {
    let is_gzipped = path.extension().is_some_and(|ext| ext == "gz");

    let reader: Box<dyn BufRead + Send> = if is_gzipped {
        Box::new(
            File::open(path)
                .map(MultiGzDecoder::new)
                .map(BufReader::new)?,
        )
    } else {
        Box::new(File::open(path).map(BufReader::new)?)
    };

    Ok(reader)
}

/// A named raw nucleotide sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceRecord {
    pub name: String,
    pub sequence: Vec<u8>,
}

/// Read the first record from FASTA formatted input. Any further records are ignored.
pub fn read_first_sequence<R: BufRead>(reader: R) -> Result<SequenceRecord, ExtenderError> {
    let mut reader = fasta::io::Reader::new(reader);

    let record = reader.records()
        .next()
        .ok_or_else(|| ExtenderError::InvalidSequence("no FASTA records found".to_string()))??;

    let name = String::from_utf8_lossy(record.name()).into_owned();
    let sequence = record.sequence().as_ref().to_vec();
    if sequence.is_empty() {
        return Err(ExtenderError::InvalidSequence(format!("sequence '{name}' is empty")));
    }

    Ok(SequenceRecord { name, sequence })
}

/// Load the first sequence of a FASTA file, which may be gzipped.
pub fn load_first_sequence(path: &Path) -> Result<SequenceRecord, ExtenderError> {
    read_first_sequence(open_maybe_gzipped(path)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn test_read_first_record() {
        let input = b">chr1 some description\nACGT\nacgN\n>chr2\nTTTT\n";
        let record = read_first_sequence(&input[..]).unwrap();

        assert_eq!(record.name, "chr1");
        assert_eq!(record.sequence, b"ACGTacgN");
    }

    #[test]
    fn test_no_records() {
        assert!(matches!(read_first_sequence(&b""[..]), Err(ExtenderError::InvalidSequence(_))));
    }

    #[test]
    fn test_gzipped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.fa.gz");

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b">seq\nGATTACA\n").unwrap();
        encoder.finish().unwrap();

        let record = load_first_sequence(&path).unwrap();
        assert_eq!(record.sequence, b"GATTACA");
    }

    #[test]
    fn test_missing_file() {
        let err = load_first_sequence(Path::new("/nonexistent/seq.fa")).unwrap_err();
        assert!(matches!(err, ExtenderError::IOError(_)));
    }
}
