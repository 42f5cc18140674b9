use std::io::{BufReader, Read};

use anyhow::Error;
use flate2::read::GzDecoder;

/// Transparently decompresses a chunk file stream based on its extension
///: `.zst` via `zstd`, `.gz` via `flate2`, anything else
/// passed through unchanged. Mirrors the enum-of-readers shape of
/// `pbs-datastore`'s blob reader, minus the encryption/checksum layers
/// that have no counterpart here.
enum State<'a> {
    Plain(Box<dyn Read + Send + 'a>),
    Zstd(zstd::stream::read::Decoder<'a, BufReader<Box<dyn Read + Send + 'a>>>),
    Gzip(GzDecoder<Box<dyn Read + Send + 'a>>),
}

pub struct CompressedReader<'a> {
    state: State<'a>,
}

impl<'a> CompressedReader<'a> {
    /// Wraps `inner` according to `filename`'s extension.
    pub fn open(filename: &str, inner: Box<dyn Read + Send + 'a>) -> Result<Self, Error> {
        let state = if filename.ends_with(".zst") {
            State::Zstd(zstd::stream::read::Decoder::new(inner)?)
        } else if filename.ends_with(".gz") {
            State::Gzip(GzDecoder::new(inner))
        } else {
            State::Plain(inner)
        };
        Ok(Self { state })
    }
}

impl Read for CompressedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.state {
            State::Plain(r) => r.read(buf),
            State::Zstd(r) => r.read(buf),
            State::Gzip(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn passthrough_for_unknown_extension() {
        let data = b"hello world".to_vec();
        let mut reader =
            CompressedReader::open("chunk@0.tsv", Box::new(Cursor::new(data.clone()))).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn decodes_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression as GzCompression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), GzCompression::default());
        enc.write_all(b"some table data\n").unwrap();
        let compressed = enc.finish().unwrap();

        let mut reader =
            CompressedReader::open("chunk@0.tsv.gz", Box::new(Cursor::new(compressed))).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"some table data\n");
    }
}
