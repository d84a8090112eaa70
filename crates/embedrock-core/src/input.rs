//! Input shapes accepted by the embedding functions, and their
//! normalization into flat lists.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::DataType;
use image::DynamicImage;

use crate::error::{Error, Result};
use crate::images::ImageSource;

/// A search query.
#[derive(Debug, Clone)]
pub enum Query {
    Text(String),
    Image(DynamicImage),
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Text(text)
    }
}

impl From<DynamicImage> for Query {
    fn from(image: DynamicImage) -> Self {
        Query::Image(image)
    }
}

impl Query {
    /// The error raised when a dynamically typed value is neither text nor
    /// an image.
    pub fn unsupported(family: &str, got: &str) -> Error {
        Error::UnsupportedQuery(format!(
            "{family} supports str or PIL Image as query, got {got}"
        ))
    }
}

/// Images handed to `compute_source_embeddings`.
#[derive(Debug, Clone)]
pub enum SourceInput {
    Single(ImageSource),
    List(Vec<ImageSource>),
    /// A string column of URIs or a binary column of encoded images.
    Array(ArrayRef),
    /// A column split across record batches.
    Chunked(Vec<ArrayRef>),
}

impl From<ImageSource> for SourceInput {
    fn from(source: ImageSource) -> Self {
        SourceInput::Single(source)
    }
}

impl From<&str> for SourceInput {
    fn from(uri: &str) -> Self {
        SourceInput::Single(ImageSource::from(uri))
    }
}

impl From<Vec<u8>> for SourceInput {
    fn from(bytes: Vec<u8>) -> Self {
        SourceInput::Single(ImageSource::Bytes(bytes))
    }
}

impl From<Vec<ImageSource>> for SourceInput {
    fn from(sources: Vec<ImageSource>) -> Self {
        SourceInput::List(sources)
    }
}

impl From<Vec<String>> for SourceInput {
    fn from(uris: Vec<String>) -> Self {
        SourceInput::List(uris.into_iter().map(ImageSource::Uri).collect())
    }
}

impl From<ArrayRef> for SourceInput {
    fn from(array: ArrayRef) -> Self {
        SourceInput::Array(array)
    }
}

/// Flatten any [`SourceInput`] into one list, preserving order.
pub fn sanitize_input(input: SourceInput) -> Result<Vec<ImageSource>> {
    match input {
        SourceInput::Single(source) => Ok(vec![source]),
        SourceInput::List(sources) => Ok(sources),
        SourceInput::Array(array) => array_to_sources(array.as_ref()),
        SourceInput::Chunked(chunks) => {
            let total = chunks.iter().map(|c| c.len()).sum();
            let mut sources = Vec::with_capacity(total);
            for chunk in &chunks {
                sources.extend(array_to_sources(chunk.as_ref())?);
            }
            Ok(sources)
        }
    }
}

fn array_to_sources(array: &dyn Array) -> Result<Vec<ImageSource>> {
    if array.null_count() > 0 {
        return Err(Error::UnsupportedInput(format!(
            "image column contains {} null value(s)",
            array.null_count()
        )));
    }

    let sources = match array.data_type() {
        DataType::Utf8 => uris(array.as_string::<i32>().iter()),
        DataType::LargeUtf8 => uris(array.as_string::<i64>().iter()),
        DataType::Utf8View => uris(array.as_string_view().iter()),
        DataType::Binary => blobs(array.as_binary::<i32>().iter()),
        DataType::LargeBinary => blobs(array.as_binary::<i64>().iter()),
        DataType::BinaryView => blobs(array.as_binary_view().iter()),
        other => {
            return Err(Error::UnsupportedInput(format!(
                "image column must be string or binary, got {other}"
            )));
        }
    };
    Ok(sources)
}

fn uris<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<ImageSource> {
    values
        .flatten()
        .map(|uri| ImageSource::Uri(uri.to_string()))
        .collect()
}

fn blobs<'a>(values: impl Iterator<Item = Option<&'a [u8]>>) -> Vec<ImageSource> {
    values
        .flatten()
        .map(|bytes| ImageSource::Bytes(bytes.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BinaryArray, Int32Array, LargeStringArray, StringArray};
    use std::sync::Arc;

    fn uri_of(source: &ImageSource) -> &str {
        match source {
            ImageSource::Uri(uri) => uri,
            other => panic!("expected uri, got {other:?}"),
        }
    }

    #[test]
    fn test_single_items_become_one_element_lists() {
        assert_eq!(sanitize_input(SourceInput::from("a.png")).unwrap().len(), 1);
        assert_eq!(sanitize_input(SourceInput::from(vec![1u8, 2, 3])).unwrap().len(), 1);
    }

    #[test]
    fn test_string_array_becomes_uris_in_order() {
        let array: ArrayRef = Arc::new(StringArray::from(vec!["a.png", "b.png", "c.png"]));
        let sources = sanitize_input(array.into()).unwrap();
        let uris: Vec<&str> = sources.iter().map(uri_of).collect();
        assert_eq!(uris, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_binary_array_becomes_bytes() {
        let array: ArrayRef = Arc::new(BinaryArray::from_vec(vec![b"one".as_slice(), b"two".as_slice()]));
        let sources = sanitize_input(array.into()).unwrap();
        assert!(matches!(&sources[1], ImageSource::Bytes(b) if b == b"two"));
    }

    #[test]
    fn test_chunked_array_is_combined() {
        let first: ArrayRef = Arc::new(StringArray::from(vec!["a", "b"]));
        let second: ArrayRef = Arc::new(LargeStringArray::from(vec!["c"]));
        let sources = sanitize_input(SourceInput::Chunked(vec![first, second])).unwrap();
        let uris: Vec<&str> = sources.iter().map(uri_of).collect();
        assert_eq!(uris, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nulls_are_rejected() {
        let array: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None]));
        let err = sanitize_input(array.into()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
    }

    #[test]
    fn test_numeric_array_is_rejected() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![1, 2]));
        let err = sanitize_input(array.into()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
    }

    #[test]
    fn test_unsupported_query_is_type_error() {
        let err = Query::unsupported("bedrock-titan-embed-multilingual", "int");
        assert!(matches!(err, Error::UnsupportedQuery(_)));
        assert_eq!(
            err.to_string(),
            "unsupported query: bedrock-titan-embed-multilingual supports str or PIL Image as query, got int"
        );
    }
}
