use std::io::{Read, Write};

use pixpack_core::types::Compression;

use crate::StoreError;

pub(crate) fn compress(compression: &Compression, raw: &[u8]) -> Result<Vec<u8>, StoreError> {
    match compression {
        Compression::None => Ok(raw.to_vec()),
        Compression::Deflate { level } => {
            let mut enc = flate2::write::ZlibEncoder::new(
                Vec::with_capacity(raw.len() / 2),
                flate2::Compression::new(*level),
            );
            enc.write_all(raw)?;
            Ok(enc.finish()?)
        }
    }
}

pub(crate) fn decompress(
    compression: &Compression,
    stored: &[u8],
    raw_len: u64,
) -> Result<Vec<u8>, StoreError> {
    let out = match compression {
        Compression::None => stored.to_vec(),
        Compression::Deflate { .. } => {
            let mut out = Vec::with_capacity(usize::try_from(raw_len).unwrap_or(0));
            flate2::read::ZlibDecoder::new(stored).read_to_end(&mut out)?;
            out
        }
    };
    if out.len() as u64 != raw_len {
        return Err(StoreError::Codec(format!(
            "chunk decompressed to {} bytes, chunk table says {raw_len}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_codec_is_identity() {
        let raw = vec![7u8; 100];
        let stored = compress(&Compression::None, &raw).unwrap();
        assert_eq!(stored, raw);
        assert_eq!(decompress(&Compression::None, &stored, 100).unwrap(), raw);
    }

    #[test]
    fn deflate_round_trips_and_shrinks_repetitive_data() {
        let raw = vec![42u8; 4096];
        let codec = Compression::Deflate { level: 6 };
        let stored = compress(&codec, &raw).unwrap();
        assert!(stored.len() < raw.len());
        assert_eq!(decompress(&codec, &stored, 4096).unwrap(), raw);
    }

    #[test]
    fn length_mismatch_is_detected() {
        let codec = Compression::Deflate { level: 1 };
        let stored = compress(&codec, &[1, 2, 3]).unwrap();
        assert!(decompress(&codec, &stored, 99).is_err());
    }
}
