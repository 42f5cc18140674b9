use std::io::{Read, Seek, SeekFrom};

use anyhow::{bail, Error};
use byteorder::{BigEndian, ReadBytesExt};

/// Reads the uncompressed byte count for a chunk from its `.idx` sidecar:
/// the final 8 bytes of the sidecar, big-endian.
pub fn read_uncompressed_size<R: Read + Seek>(mut reader: R) -> Result<u64, Error> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < 8 {
        bail!("idx sidecar too short ({len} bytes, need at least 8)");
    }
    reader.seek(SeekFrom::End(-8))?;
    Ok(reader.read_u64::<BigEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_trailing_big_endian_u64() {
        let mut buf = vec![0u8; 16]; // some leading per-row offsets, ignored
        buf.extend_from_slice(&1_234_567_890u64.to_be_bytes());
        let size = read_uncompressed_size(Cursor::new(buf)).unwrap();
        assert_eq!(size, 1_234_567_890);
    }

    #[test]
    fn rejects_too_short_sidecar() {
        let buf = vec![0u8; 4];
        assert!(read_uncompressed_size(Cursor::new(buf)).is_err());
    }
}
