use crate::CsvResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};

/// What the upload layer knows about an incoming file.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// e.g. "application/gzip" or "text/csv; charset=utf-8"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// uploaded filename (used for extension fallback)
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl UploadMeta {
    /// Build from raw header values; a `charset=` parameter on the content
    /// type selects the encoding, unknown labels keep UTF-8.
    pub fn from_headers(content_type: &str, content_encoding: &str, name_hint: &str) -> Self {
        let charset = content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, v)| encoding_rs::Encoding::for_label(v.trim().trim_matches('"').as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);

        Self {
            content_type: content_type.to_string(),
            content_encoding: content_encoding.to_string(),
            name_hint: name_hint.to_string(),
            charset,
        }
    }

    fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    pub fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(
                self.media_type().as_str(),
                "application/gzip" | "application/x-gzip"
            )
            || self.name_hint.ends_with(".gz")
    }

    pub fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.media_type() == "application/zstd"
            || self.name_hint.ends_with(".zst")
    }
}

/// Wrap a raw upload with decompression picked from encoding -> type -> extension.
///
/// Charset decoding is left to the parser (see [`UploadMeta::charset`]) so a
/// malformed byte surfaces as an encoding error instead of being replaced.
pub fn open_upload<R>(raw: R, meta: &UploadMeta) -> Box<dyn AsyncRead + Unpin + Send>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    if meta.is_gzip() {
        tracing::debug!(name = %meta.name_hint, "gzip upload");
        Box::new(GzipDecoder::new(BufReader::new(raw)))
    } else if meta.is_zstd() {
        tracing::debug!(name = %meta.name_hint, "zstd upload");
        Box::new(ZstdDecoder::new(BufReader::new(raw)))
    } else {
        Box::new(raw)
    }
}

/// Treat a local file as an upload (meta derived from the extension only).
pub async fn upload_from_path(
    path: &Path,
) -> CsvResult<(Box<dyn AsyncRead + Unpin + Send>, UploadMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = UploadMeta {
        name_hint: name,
        ..Default::default()
    };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match ext {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        _ => {
            meta.content_type = "text/csv".into();
        }
    }

    let reader = open_upload(file, &meta);
    Ok((reader, meta))
}
