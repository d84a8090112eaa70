use pyo3::exceptions::{PyNotImplementedError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

use embedrock_core::embedding::{BedrockEmbedding, Cohere, EmbeddingFunction, ModelFamily, Titan};
use embedrock_core::images::decode_image;
use embedrock_core::input::sanitize_input;
use embedrock_core::{Error, ImageSource, Query, SourceInput};

fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::UnsupportedQuery(msg) | Error::UnsupportedInput(msg) => PyTypeError::new_err(msg),
        Error::NotImplemented(msg) => PyNotImplementedError::new_err(msg),
        Error::Validation(msg) => PyValueError::new_err(msg),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Shared state behind each Python class: one embedding function plus the
/// runtime its calls are driven on.
struct Embedder<F: ModelFamily> {
    function: BedrockEmbedding<F>,
    runtime: tokio::runtime::Runtime,
}

impl<F: ModelFamily> Embedder<F> {
    fn new(kwargs: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let overrides = match kwargs {
            Some(dict) => pythonize_dict(dict)?,
            None => serde_json::Value::Null,
        };
        let config = F::default_config().merged_with(&overrides).map_err(to_py_err)?;
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let function = BedrockEmbedding::<F>::new(config).map_err(to_py_err)?;
        Ok(Self { function, runtime })
    }

    fn query(&self, query: &Bound<'_, PyAny>) -> PyResult<Vec<Vec<f32>>> {
        let query = to_query(query, F::NAME)?;
        self.runtime
            .block_on(self.function.compute_query_embeddings(query))
            .map_err(to_py_err)
    }

    fn source(&self, images: &Bound<'_, PyAny>) -> PyResult<Vec<Vec<f32>>> {
        let sources = sanitize_images(images)?;
        self.runtime
            .block_on(self.function.compute_source_embeddings(SourceInput::List(sources)))
            .map_err(to_py_err)
    }

    fn text(&self, text: &str) -> PyResult<Vec<f32>> {
        self.runtime
            .block_on(self.function.generate_text_embeddings(text))
            .map_err(to_py_err)
    }

    fn image(&self, image: &Bound<'_, PyAny>) -> PyResult<Vec<f32>> {
        let source = to_image_source(image)?;
        self.runtime
            .block_on(self.function.generate_image_embedding(source))
            .map_err(to_py_err)
    }
}

macro_rules! embedding_class {
    ($class:ident, $family:ty) => {
        #[pyclass]
        struct $class {
            inner: Embedder<$family>,
        }

        #[pymethods]
        impl $class {
            #[new]
            #[pyo3(signature = (**kwargs))]
            fn new(kwargs: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
                Ok(Self {
                    inner: Embedder::new(kwargs)?,
                })
            }

            fn ndims(&self) -> usize {
                self.inner.function.ndims()
            }

            fn compute_query_embeddings(&self, query: &Bound<'_, PyAny>) -> PyResult<Vec<Vec<f32>>> {
                self.inner.query(query)
            }

            fn compute_source_embeddings(&self, images: &Bound<'_, PyAny>) -> PyResult<Vec<Vec<f32>>> {
                self.inner.source(images)
            }

            fn generate_text_embeddings(&self, text: &str) -> PyResult<Vec<f32>> {
                self.inner.text(text)
            }

            fn generate_image_embedding(&self, image: &Bound<'_, PyAny>) -> PyResult<Vec<f32>> {
                self.inner.image(image)
            }
        }
    };
}

embedding_class!(BedrockCohereEmbeddings, Cohere);
embedding_class!(BedrockTitanEmbeddings, Titan);

/// PIL images are recognised by duck typing so Pillow stays optional.
fn is_pil_image(obj: &Bound<'_, PyAny>) -> PyResult<bool> {
    Ok(obj.hasattr("save")? && obj.hasattr("mode")? && obj.hasattr("size")?)
}

fn pil_to_png(obj: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
    let py = obj.py();
    let buffer = py.import("io")?.call_method0("BytesIO")?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("format", "PNG")?;
    obj.call_method("save", (&buffer,), Some(&kwargs))?;
    let png = buffer.call_method0("getvalue")?;
    Ok(png.downcast::<PyBytes>()?.as_bytes().to_vec())
}

fn to_query(obj: &Bound<'_, PyAny>, name: &str) -> PyResult<Query> {
    if let Ok(text) = obj.extract::<String>() {
        return Ok(Query::Text(text));
    }
    if is_pil_image(obj)? {
        let image = decode_image(&pil_to_png(obj)?).map_err(to_py_err)?;
        return Ok(Query::Image(image));
    }
    let type_name = obj.get_type().name()?.to_string();
    Err(to_py_err(Query::unsupported(name, &type_name)))
}

fn to_image_source(obj: &Bound<'_, PyAny>) -> PyResult<ImageSource> {
    if let Ok(uri) = obj.extract::<String>() {
        return Ok(ImageSource::Uri(uri));
    }
    if let Ok(bytes) = obj.downcast::<PyBytes>() {
        return Ok(ImageSource::Bytes(bytes.as_bytes().to_vec()));
    }
    if is_pil_image(obj)? {
        return Ok(ImageSource::Bytes(pil_to_png(obj)?));
    }
    Err(PyTypeError::new_err(
        "images must be str uris, bytes, or PIL Images",
    ))
}

/// Accept a single uri or bytes, a list, or a pyarrow Array/ChunkedArray.
fn sanitize_images(obj: &Bound<'_, PyAny>) -> PyResult<Vec<ImageSource>> {
    if obj.extract::<String>().is_ok() || obj.downcast::<PyBytes>().is_ok() {
        return sanitize_input(SourceInput::Single(to_image_source(obj)?)).map_err(to_py_err);
    }

    let items = if obj.hasattr("combine_chunks")? {
        obj.call_method0("combine_chunks")?.call_method0("to_pylist")?
    } else if obj.hasattr("to_pylist")? {
        obj.call_method0("to_pylist")?
    } else {
        obj.clone()
    };

    let list = items
        .downcast::<PyList>()
        .map_err(|_| PyTypeError::new_err("images must be a str, bytes, list, or pyarrow array"))?;
    let sources = list
        .iter()
        .map(|item| to_image_source(&item))
        .collect::<PyResult<Vec<_>>>()?;
    sanitize_input(SourceInput::List(sources)).map_err(to_py_err)
}

fn pythonize_dict(dict: &Bound<'_, PyDict>) -> PyResult<serde_json::Value> {
    let py = dict.py();
    let json_mod = py.import("json")?;
    let json_str: String = json_mod
        .call_method1("dumps", (dict,))?
        .extract()?;
    serde_json::from_str(&json_str).map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _embedrock(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<BedrockCohereEmbeddings>()?;
    m.add_class::<BedrockTitanEmbeddings>()?;
    m.add("COHERE_NAME", Cohere::NAME)?;
    m.add("TITAN_NAME", Titan::NAME)?;
    Ok(())
}
