use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Encodings the client may ask the server to use for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptEncoding {
    Deflate,
    Gzip,
    Identity,
}

impl AcceptEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptEncoding::Deflate => "deflate",
            AcceptEncoding::Gzip => "gzip",
            AcceptEncoding::Identity => "identity",
        }
    }
}

/// Compression is off unless `threshold` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compress request bodies of at least this many bytes.
    #[serde(default)]
    pub threshold: Option<usize>,
    /// zlib level, 0–9.
    #[serde(default = "d_level")]
    pub level: u32,
    /// Ask the server to compress responses.
    #[serde(default)]
    pub accept: Option<AcceptEncoding>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            level: d_level(),
            accept: None,
        }
    }
}

impl CompressionConfig {
    pub fn is_enabled(&self) -> bool {
        self.threshold.is_some() || self.accept.is_some()
    }
}

fn d_level() -> u32 {
    6
}
