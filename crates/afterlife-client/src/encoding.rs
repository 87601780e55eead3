//! Stored-encoding decoders.
//!
//! Publishers may compress payloads and declare it in a `Content-Encoding`
//! or `Stored-Encoding` tag. Bytes are decoded before hashing or parsing;
//! an unknown or absent encoding passes bytes through unchanged.

use afterlife_core::namespace::{TAG_CONTENT_ENCODING, TAG_STORED_ENCODING};
use afterlife_core::TagIndex;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Brotli,
}

impl ContentEncoding {
    /// `Content-Encoding` wins over `Stored-Encoding` when both are present.
    pub fn from_tags(index: &TagIndex) -> Self {
        index
            .first(TAG_CONTENT_ENCODING)
            .or_else(|| index.first(TAG_STORED_ENCODING))
            .map(Self::parse)
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "br" | "brotli" => ContentEncoding::Brotli,
            _ => ContentEncoding::Identity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Brotli => "br",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            ContentEncoding::Identity => Ok(bytes.to_vec()),
            ContentEncoding::Gzip => {
                let mut out = Vec::new();
                flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
                Ok(out)
            }
            ContentEncoding::Brotli => {
                let mut out = Vec::new();
                brotli::Decompressor::new(bytes, 4096).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afterlife_core::Tag;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn brotli(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            w.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn picks_encoding_from_tags() {
        let idx = TagIndex::build(&[Tag::new(TAG_STORED_ENCODING, "br")]);
        assert_eq!(ContentEncoding::from_tags(&idx), ContentEncoding::Brotli);

        let idx = TagIndex::build(&[
            Tag::new(TAG_STORED_ENCODING, "br"),
            Tag::new(TAG_CONTENT_ENCODING, "gzip"),
        ]);
        assert_eq!(ContentEncoding::from_tags(&idx), ContentEncoding::Gzip);

        let idx = TagIndex::build(&[Tag::new(TAG_CONTENT_ENCODING, "zstd")]);
        assert_eq!(ContentEncoding::from_tags(&idx), ContentEncoding::Identity);
    }

    #[test]
    fn decodes_gzip_and_brotli() {
        let body = br#"{"idea_id":"i1"}"#;
        assert_eq!(ContentEncoding::Gzip.decode(&gzip(body)).unwrap(), body);
        assert_eq!(ContentEncoding::Brotli.decode(&brotli(body)).unwrap(), body);
        assert_eq!(ContentEncoding::Identity.decode(body).unwrap(), body);
    }

    #[test]
    fn garbage_gzip_is_an_error() {
        assert!(ContentEncoding::Gzip.decode(b"not gzip").is_err());
    }
}
