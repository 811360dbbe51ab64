use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use std::io::{self, Write};
use zstd::stream::write::Encoder as ZstdEncoder;

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum CompressionType {
    Zstd,
    Gzip,
    None,
}

impl CompressionType {
    /// Value for the `Content-Encoding` header, if any.
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            CompressionType::Zstd => Some("zstd"),
            CompressionType::Gzip => Some("gzip"),
            CompressionType::None => None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct AcceptedCompression {
    pub supports_zstd: bool,
    pub supports_gzip: bool,
}

pub fn determine_compression(accept_encoding: &str) -> AcceptedCompression {
    let binding = accept_encoding.to_lowercase();
    let encodings: Vec<&str> = binding
        .split(',')
        .map(|s| s.split(';').next().unwrap_or("").trim())
        .collect();
    AcceptedCompression {
        supports_zstd: encodings.iter().any(|&e| e == "zstd"),
        supports_gzip: encodings.iter().any(|&e| e == "gzip"),
    }
}

/// Encodes `content` with the best encoding the client accepts, zstd first.
pub fn encode(
    content: Vec<u8>,
    accepted: AcceptedCompression,
    zstd_level: i32,
    gzip_level: u32,
) -> io::Result<(Vec<u8>, CompressionType)> {
    if accepted.supports_zstd {
        log::debug!("Compressing with zstd level {}", zstd_level);
        let mut encoder = ZstdEncoder::new(Vec::new(), zstd_level)?;
        encoder.write_all(&content)?;
        Ok((encoder.finish()?, CompressionType::Zstd))
    } else if accepted.supports_gzip {
        log::debug!("Compressing with gzip level {}", gzip_level);
        let mut encoder = GzEncoder::new(Vec::new(), GzipCompression::new(gzip_level));
        encoder.write_all(&content)?;
        Ok((encoder.finish()?, CompressionType::Gzip))
    } else {
        Ok((content, CompressionType::None))
    }
}
