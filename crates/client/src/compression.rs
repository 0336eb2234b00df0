//! Request/response body compression.
//!
//! Outgoing bodies are zlib-compressed ("deflate" on the wire) once they
//! reach the configured threshold. Responses are decompressed according to
//! their `content-encoding` before the codec sees them.

use std::io::{Read, Write};

use adb_domain::config::{AcceptEncoding, CompressionConfig};
use adb_domain::error::{Error, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;

pub trait CompressionManager: Send + Sync + std::fmt::Debug {
    /// Whether a body of `size` bytes should be compressed before sending.
    fn should_compress(&self, size: usize) -> bool;

    /// `content-encoding` value for bodies produced by [`compress`](Self::compress).
    fn content_encoding(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Encodings to advertise in `accept-encoding`. Empty means no header.
    fn accepted_encodings(&self) -> Vec<AcceptEncoding>;

    /// Decode a response body according to its `content-encoding` header.
    fn decode_body(&self, encoding: Option<&str>, data: Vec<u8>) -> Result<Vec<u8>> {
        match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("identity") => Ok(data),
            Some("deflate") => self.decompress(&data),
            Some("gzip") => gunzip(&data),
            Some(other) => Err(Error::Compression(format!(
                "unsupported content-encoding '{other}'"
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Never compresses, accepts nothing. Encoded responses are still decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl CompressionManager for NoCompression {
    fn should_compress(&self, _size: usize) -> bool {
        false
    }

    fn content_encoding(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        inflate(data)
    }

    fn accepted_encodings(&self) -> Vec<AcceptEncoding> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct DefaultCompressionManager {
    threshold: Option<usize>,
    level: u32,
    accept: Option<AcceptEncoding>,
}

impl DefaultCompressionManager {
    pub fn new(threshold: Option<usize>, level: u32, accept: Option<AcceptEncoding>) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidArgument(format!(
                "compression level must be 0..=9, got {level}"
            )));
        }
        Ok(Self {
            threshold,
            level,
            accept,
        })
    }

    pub fn from_config(cfg: &CompressionConfig) -> Result<Self> {
        Self::new(cfg.threshold, cfg.level, cfg.accept)
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl CompressionManager for DefaultCompressionManager {
    fn should_compress(&self, size: usize) -> bool {
        self.threshold.is_some_and(|t| size >= t)
    }

    fn content_encoding(&self) -> &'static str {
        "deflate"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(self.level));
        enc.write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        enc.finish().map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        inflate(data)
    }

    fn accepted_encodings(&self) -> Vec<AcceptEncoding> {
        self.accept.into_iter().collect()
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Compression(format!("deflate: {e}")))?;
    Ok(out)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Compression(format!("gzip: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;

    #[test]
    fn threshold_is_inclusive() {
        let mgr = DefaultCompressionManager::new(Some(100), 6, None).unwrap();
        assert!(!mgr.should_compress(99));
        assert!(mgr.should_compress(100));
        assert!(mgr.should_compress(4096));
    }

    #[test]
    fn no_threshold_never_compresses() {
        let mgr = DefaultCompressionManager::new(None, 6, Some(AcceptEncoding::Deflate)).unwrap();
        assert!(!mgr.should_compress(usize::MAX));
        assert_eq!(mgr.accepted_encodings(), vec![AcceptEncoding::Deflate]);
    }

    #[test]
    fn invalid_level_rejected() {
        assert!(matches!(
            DefaultCompressionManager::new(Some(1), 10, None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn deflate_output_is_zlib_and_inflates_back() {
        let mgr = DefaultCompressionManager::new(Some(1), 9, None).unwrap();
        let body = br#"{"query":"FOR d IN docs RETURN d"}"#.repeat(20);
        let packed = mgr.compress(&body).unwrap();
        assert!(packed.len() < body.len());
        // zlib header, deflate method
        assert_eq!(packed[0] & 0x0f, 8);
        let unpacked = mgr.decode_body(Some("Deflate"), packed).unwrap();
        assert_eq!(unpacked, body);
    }

    #[test]
    fn gzip_responses_are_decoded() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"[1,2,3]").unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(NoCompression.decode_body(Some("gzip"), gz).unwrap(), b"[1,2,3]");
    }

    #[test]
    fn identity_and_unknown_encodings() {
        assert_eq!(NoCompression.decode_body(None, b"x".to_vec()).unwrap(), b"x");
        assert_eq!(
            NoCompression.decode_body(Some("identity"), b"x".to_vec()).unwrap(),
            b"x"
        );
        assert!(matches!(
            NoCompression.decode_body(Some("br"), b"x".to_vec()),
            Err(Error::Compression(_))
        ));
    }

    #[test]
    fn corrupt_deflate_is_compression_error() {
        let err = NoCompression.decode_body(Some("deflate"), b"nope".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }
}
