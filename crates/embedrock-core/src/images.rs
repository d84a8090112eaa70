//! Image normalization.
//!
//! Every image handed to an embedding function is turned into a decoded
//! [`DynamicImage`] and then re-encoded as PNG before it is base64'd into
//! a request body. URIs may be bare local paths, `file://` URIs, or
//! `http(s)://` URLs; anything else is rejected.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, ImageFormat};
use url::Url;

use crate::error::{Error, Result};

/// An image as it arrives from the caller.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A local path, `file://` URI, or `http(s)://` URL.
    Uri(String),
    /// Encoded image bytes in any supported format.
    Bytes(Vec<u8>),
    Decoded(DynamicImage),
}

impl From<&str> for ImageSource {
    fn from(uri: &str) -> Self {
        ImageSource::Uri(uri.to_string())
    }
}

impl From<String> for ImageSource {
    fn from(uri: String) -> Self {
        ImageSource::Uri(uri)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Decoded(image)
    }
}

/// Where a URI string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriLocation {
    Local(PathBuf),
    Remote(Url),
}

/// Classify a URI by scheme.
///
/// Strings that do not parse as a URL are treated as local paths, as are
/// Windows drive paths (`C:\images\cat.png`).
pub fn resolve_uri(uri: &str) -> Result<UriLocation> {
    if is_drive_path(uri) {
        return Ok(UriLocation::Local(PathBuf::from(uri)));
    }

    let parsed = match Url::parse(uri) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Ok(UriLocation::Local(PathBuf::from(uri)));
        }
        Err(e) => return Err(Error::Validation(format!("invalid image uri {uri}: {e}"))),
    };

    match parsed.scheme() {
        "file" => {
            let path = parsed.to_file_path().unwrap_or_else(|_| PathBuf::from(parsed.path()));
            Ok(UriLocation::Local(path))
        }
        "http" | "https" => Ok(UriLocation::Remote(parsed)),
        scheme => Err(Error::NotImplemented(format!(
            "Only local and http(s) urls are supported, got scheme {scheme}"
        ))),
    }
}

fn is_drive_path(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes.get(2).is_none_or(|&b| b == b'\\' || b == b'/')
}

/// Fetches remote images. One per embedding function so connections are
/// pooled across a batch.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    http: reqwest::Client,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to build HTTP client with timeouts, using default");
                    reqwest::Client::default()
                }),
        }
    }

    /// Decode any [`ImageSource`] into an in-memory image.
    pub async fn to_image(&self, source: ImageSource) -> Result<DynamicImage> {
        match source {
            ImageSource::Decoded(image) => Ok(image),
            ImageSource::Bytes(bytes) => decode_blocking(bytes).await,
            ImageSource::Uri(uri) => match resolve_uri(&uri)? {
                UriLocation::Local(path) => {
                    let bytes = read_local(&path).await?;
                    decode_blocking(bytes).await
                }
                UriLocation::Remote(url) => {
                    let bytes = self.fetch(url).await?;
                    decode_blocking(bytes).await
                }
            },
        }
    }

    /// Decode `source` and return its PNG encoding as base64.
    pub async fn to_base64_png(&self, source: ImageSource) -> Result<String> {
        let image = self.to_image(source).await?;
        let png = tokio::task::spawn_blocking(move || image_to_bytes(&image)).await??;
        Ok(base64::engine::general_purpose::STANDARD.encode(png))
    }

    async fn fetch(&self, url: Url) -> Result<Vec<u8>> {
        tracing::debug!(%url, "fetching remote image");
        let response = self.http.get(url.clone()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Fetch(format!("GET {url} returned {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read image {}: {e}", path.display()),
        ))
    })
}

async fn decode_blocking(bytes: Vec<u8>) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || decode_image(&bytes)).await?
}

/// Decode encoded image bytes, sniffing the format from the content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Encode an image as PNG.
pub fn image_to_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png() -> Vec<u8> {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        image_to_bytes(&DynamicImage::ImageRgba8(img)).unwrap()
    }

    #[test]
    fn test_resolve_bare_path_is_local() {
        assert_eq!(
            resolve_uri("images/cat.png").unwrap(),
            UriLocation::Local(PathBuf::from("images/cat.png"))
        );
        assert_eq!(
            resolve_uri("/tmp/cat.png").unwrap(),
            UriLocation::Local(PathBuf::from("/tmp/cat.png"))
        );
    }

    #[test]
    fn test_resolve_file_uri() {
        assert_eq!(
            resolve_uri("file:///tmp/cat.png").unwrap(),
            UriLocation::Local(PathBuf::from("/tmp/cat.png"))
        );
    }

    #[test]
    fn test_resolve_drive_letter_is_local() {
        assert!(matches!(
            resolve_uri("C:\\images\\cat.png").unwrap(),
            UriLocation::Local(_)
        ));
    }

    #[test]
    fn test_resolve_http_is_remote() {
        assert!(matches!(
            resolve_uri("https://example.com/cat.png").unwrap(),
            UriLocation::Remote(_)
        ));
        assert!(matches!(
            resolve_uri("http://example.com/cat.png").unwrap(),
            UriLocation::Remote(_)
        ));
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let err = resolve_uri("s3://bucket/cat.png").unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
        assert!(err.to_string().contains("Only local and http(s) urls are supported"));
    }

    #[test]
    fn test_png_round_trip_preserves_pixels() {
        let decoded = decode_image(&sample_png()).unwrap();
        assert_eq!(decoded.width(), 2);
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[tokio::test]
    async fn test_to_image_from_bytes_and_file() {
        let loader = ImageLoader::new();
        let png = sample_png();

        let from_bytes = loader.to_image(ImageSource::Bytes(png.clone())).await.unwrap();
        assert_eq!(from_bytes.height(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        std::fs::write(&path, &png).unwrap();

        let from_path = loader
            .to_image(ImageSource::Uri(path.display().to_string()))
            .await
            .unwrap();
        assert_eq!(from_path.width(), 2);

        let file_uri = Url::from_file_path(&path).unwrap().to_string();
        let from_uri = loader.to_image(ImageSource::Uri(file_uri)).await.unwrap();
        assert_eq!(from_uri.width(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let loader = ImageLoader::new();
        let err = loader
            .to_image(ImageSource::from("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_base64_is_png() {
        let loader = ImageLoader::new();
        let encoded = loader
            .to_base64_png(ImageSource::Bytes(sample_png()))
            .await
            .unwrap();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(&raw[..8], b"\x89PNG\r\n\x1a\n");
    }
}
