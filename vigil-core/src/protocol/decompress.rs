//! Inflation of compressed `STREAM` chunks
//!
//! Chunks arrive as base64-encoded gzip data. Inflating them is CPU work, so
//! [`inflate_chunk`] runs it on the blocking pool and the caller re-enters the
//! state store with the result. A chunk that fails to inflate becomes the
//! [`DECOMPRESSION_ERROR_MARKER`] text instead of being dropped.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Text appended to a module in place of a chunk that could not be inflated
pub const DECOMPRESSION_ERROR_MARKER: &str = "[Decompression Error]";

/// Decode and inflate one chunk synchronously.
pub fn inflate_gzip_base64(encoded: &str) -> Result<String> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Decompress(format!("invalid base64: {}", e)))?;

    let mut text = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| Error::Decompress(format!("invalid gzip data: {}", e)))?;

    Ok(text)
}

/// Inflate one chunk off the async executor.
///
/// Never fails: errors are logged and replaced by the error marker.
pub async fn inflate_chunk(module: String, encoded: String) -> String {
    let outcome = tokio::task::spawn_blocking(move || inflate_gzip_base64(&encoded)).await;

    match outcome {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(module = %module, error = %e, "Decompression failed");
            DECOMPRESSION_ERROR_MARKER.to_string()
        }
        Err(join_err) => {
            tracing::error!(module = %module, error = %join_err, "Decompression task failed");
            DECOMPRESSION_ERROR_MARKER.to_string()
        }
    }
}

/// Compress text the way the backend does (test helper).
#[cfg(test)]
pub(crate) fn gzip_base64(text: &str) -> String {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_round_trip() {
        let encoded = gzip_base64("app/main.py:10:1: F401 unused import\n");
        assert_eq!(
            inflate_gzip_base64(&encoded).unwrap(),
            "app/main.py:10:1: F401 unused import\n"
        );
    }

    #[test]
    fn test_inflate_rejects_bad_base64() {
        let err = inflate_gzip_base64("%%% not base64 %%%").unwrap_err();
        assert!(matches!(err, Error::Decompress(_)));
    }

    #[test]
    fn test_inflate_rejects_non_gzip() {
        let encoded = STANDARD.encode(b"plain bytes, no gzip header");
        assert!(inflate_gzip_base64(&encoded).is_err());
    }

    #[tokio::test]
    async fn test_inflate_chunk_marks_corruption() {
        let text = inflate_chunk("B_Ruff".to_string(), "H4sIAAAA!!corrupt".to_string()).await;
        assert_eq!(text, DECOMPRESSION_ERROR_MARKER);
    }

    #[tokio::test]
    async fn test_inflate_chunk_success() {
        let text = inflate_chunk("B_Ruff".to_string(), gzip_base64("hello")).await;
        assert_eq!(text, "hello");
    }
}
