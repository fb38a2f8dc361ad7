//! Parameter mappings and the strategies that encode them.
//!
//! [`Params`] is the ordered key/value mapping the request builder accumulates for
//! path, query and form parameters. A [`FormFormatter`] turns a mapping into a
//! [`FormData`] container, which either renders as a URL-encoded string (query
//! strings, `application/x-www-form-urlencoded` bodies) or travels to the transport
//! as a multipart container.
//!
//! The strategies differ only in how they treat arrays and nested objects:
//!
//! | Strategy | `{"tags": ["a", "b"]}` | nested objects |
//! |----------|------------------------|----------------|
//! | [`FormFormatter::Repeat`] | `tags=a&tags=b` | JSON string |
//! | [`FormFormatter::Join`] | `tags=a,b` | JSON string |
//! | [`FormFormatter::Indexed`] | `tags[0]=a&tags[1]=b` | `a.b[0].c=1` |

use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Number, Value};

/// A binary part, such as an uploaded file.
///
/// File parts are never stringified by any strategy; they are handed to the
/// transport as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// The raw content.
    pub bytes: Bytes,
    /// The file name reported to the server.
    pub file_name: Option<String>,
    /// The MIME type of the content.
    pub mime: Option<String>,
}

impl FilePart {
    /// Creates a file part from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            mime: None,
        }
    }

    /// Sets the file name.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Sets the MIME type.
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// A single parameter value.
///
/// This mirrors a JSON value with one extra leaf kind, [`Param::File`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Param>),
    Object(Params),
    File(FilePart),
}

impl Param {
    /// Returns the string form of a scalar, or `None` for nulls, containers and files.
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            Param::Bool(b) => Some(b.to_string()),
            Param::Number(n) => Some(n.to_string()),
            Param::String(s) => Some(s.clone()),
            Param::Null | Param::Array(_) | Param::Object(_) | Param::File(_) => None,
        }
    }

    /// Converts to a JSON value. File parts become their file name, or null.
    pub fn to_json(&self) -> Value {
        match self {
            Param::Null => Value::Null,
            Param::Bool(b) => Value::Bool(*b),
            Param::Number(n) => Value::Number(n.clone()),
            Param::String(s) => Value::String(s.clone()),
            Param::Array(items) => Value::Array(items.iter().map(Param::to_json).collect()),
            Param::Object(params) => params.to_json(),
            Param::File(file) => file
                .file_name
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }

    /// The string a value takes when it must occupy a single form entry.
    ///
    /// Scalars use their literal form, containers are JSON-stringified.
    fn to_entry_string(&self) -> Option<String> {
        match self {
            Param::Null | Param::File(_) => None,
            Param::Array(_) | Param::Object(_) => Some(self.to_json().to_string()),
            scalar => scalar.as_scalar_string(),
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Param::Null,
            Value::Bool(b) => Param::Bool(b),
            Value::Number(n) => Param::Number(n),
            Value::String(s) => Param::String(s),
            Value::Array(items) => Param::Array(items.into_iter().map(Param::from).collect()),
            Value::Object(map) => Param::Object(Params {
                entries: map.into_iter().map(|(k, v)| (k, Param::from(v))).collect(),
            }),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::String(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::String(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

macro_rules! param_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Param::Number(Number::from(value))
                }
            }
        )*
    };
}

param_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Param::Number)
            .unwrap_or(Param::Null)
    }
}

impl From<f32> for Param {
    fn from(value: f32) -> Self {
        Param::from(f64::from(value))
    }
}

impl From<FilePart> for Param {
    fn from(value: FilePart) -> Self {
        Param::File(value)
    }
}

impl From<Params> for Param {
    fn from(value: Params) -> Self {
        Param::Object(value)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(value: Vec<T>) -> Self {
        Param::Array(value.into_iter().map(Into::into).collect())
    }
}

/// An insertion-ordered key/value mapping.
///
/// Inserting an existing key replaces its value in place.
///
/// # Examples
///
/// ```
/// use openfetch::{FilePart, Params};
///
/// let params = Params::new()
///     .with("name", "doggie")
///     .with("photoUrls", vec!["a.png", "b.png"])
///     .with("photo", FilePart::new(vec![0u8, 1, 2]).file_name("dog.png"));
///
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Param)>,
}

impl Params {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts any serializable value into a mapping.
    ///
    /// `null` becomes an empty mapping. Anything other than an object is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if the value cannot be serialized or
    /// is not a key/value mapping.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        match Param::from(value) {
            Param::Object(params) => Ok(params),
            Param::Null => Ok(Params::new()),
            other => Err(Error::SerializationFailed(format!(
                "expected a key/value mapping, got {}",
                other.to_json()
            ))),
        }
    }

    /// Inserts a value, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Param>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if any value, at any depth, is a file part.
    pub fn has_files(&self) -> bool {
        fn contains_file(param: &Param) -> bool {
            match param {
                Param::File(_) => true,
                Param::Array(items) => items.iter().any(contains_file),
                Param::Object(params) => params.has_files(),
                _ => false,
            }
        }
        self.entries.iter().any(|(_, v)| contains_file(v))
    }

    /// Converts to a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Conversion into a [`Params`] mapping.
///
/// Implemented for [`Params`] (owned or borrowed) and for references to anything
/// serializable (structs, maps, `serde_json::Value`).
pub trait IntoParams {
    fn into_params(self) -> Result<Params>;
}

impl IntoParams for Params {
    fn into_params(self) -> Result<Params> {
        Ok(self)
    }
}

impl IntoParams for &Params {
    fn into_params(self) -> Result<Params> {
        Ok(self.clone())
    }
}

impl<T: Serialize + ?Sized> IntoParams for &T {
    fn into_params(self) -> Result<Params> {
        Params::from_serialize(self)
    }
}

/// One entry of an encoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// An ordered, multi-valued form container.
///
/// This is what every encoding strategy produces. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: FormValue) {
        self.entries.push((key.into(), value));
    }

    pub fn append_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.append(key, FormValue::Text(value.into()));
    }

    pub fn append_file(&mut self, key: impl Into<String>, file: FilePart) {
        self.append(key, FormValue::File(file));
    }

    /// Returns the first value for the key.
    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the first text value for the key.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get_all_text(key).into_iter().next()
    }

    /// Returns every value for the key, in order.
    pub fn get_all(&self, key: &str) -> Vec<&FormValue> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Returns every text value for the key, in order.
    pub fn get_all_text(&self, key: &str) -> Vec<&str> {
        self.get_all(key)
            .into_iter()
            .filter_map(|v| match v {
                FormValue::Text(s) => Some(s.as_str()),
                FormValue::File(_) => None,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the text entries as an `application/x-www-form-urlencoded` string.
    ///
    /// File entries cannot be represented and are left out.
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.entries {
            match value {
                FormValue::Text(text) => {
                    serializer.append_pair(key, text);
                }
                FormValue::File(_) => {
                    tracing::warn!(key = %key, "File part cannot be URL-encoded, skipping");
                }
            }
        }
        serializer.finish()
    }
}

/// Selects how a [`Params`] mapping becomes a [`FormData`] container.
///
/// # Examples
///
/// ```
/// use openfetch::{FormFormatter, Params};
///
/// let params = Params::new().with("tags", vec!["a", "b"]);
///
/// assert_eq!(FormFormatter::Repeat.format(&params).to_query_string(), "tags=a&tags=b");
/// assert_eq!(FormFormatter::Join.format(&params).to_query_string(), "tags=a%2Cb");
/// assert_eq!(
///     FormFormatter::Indexed.format(&params).to_query_string(),
///     "tags%5B0%5D=a&tags%5B1%5D=b"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub enum FormFormatter {
    /// Repeat the key for every array item, like a submitted HTML form.
    #[default]
    Repeat,

    /// Join array items with `,` into a single entry.
    Join,

    /// Flatten nested values into bracketed and dotted paths.
    Indexed,

    /// Any other pure conversion.
    Custom(fn(&Params) -> FormData),
}

impl FormFormatter {
    pub fn format(&self, params: &Params) -> FormData {
        match self {
            FormFormatter::Repeat => repeat_key(params),
            FormFormatter::Join => join(params),
            FormFormatter::Indexed => indexed_path(params),
            FormFormatter::Custom(format_fn) => format_fn(params),
        }
    }
}

/// Repeats the key for each array item. Objects are JSON-stringified.
pub fn repeat_key(params: &Params) -> FormData {
    let mut form = FormData::new();
    for (key, value) in params.iter() {
        match value {
            Param::Array(items) => {
                for item in items {
                    append_entry(&mut form, key, item);
                }
            }
            other => append_entry(&mut form, key, other),
        }
    }
    form
}

/// Joins array items with `,`. Objects are JSON-stringified.
///
/// File parts inside an array cannot be joined and are appended as separate
/// entries after the joined text.
pub fn join(params: &Params) -> FormData {
    let mut form = FormData::new();
    for (key, value) in params.iter() {
        match value {
            Param::Array(items) => {
                let joined = items
                    .iter()
                    .filter_map(Param::to_entry_string)
                    .collect::<Vec<_>>()
                    .join(",");
                form.append_text(key, joined);
                for item in items {
                    if let Param::File(file) = item {
                        form.append_file(key, file.clone());
                    }
                }
            }
            other => append_entry(&mut form, key, other),
        }
    }
    form
}

/// Flattens nested objects and arrays into path keys such as `a[0].b`.
///
/// Scalar leaves keep their literal form; nothing is JSON-stringified.
pub fn indexed_path(params: &Params) -> FormData {
    let mut form = FormData::new();
    flatten_object(&mut form, params, "");
    form
}

fn append_entry(form: &mut FormData, key: &str, value: &Param) {
    match value {
        Param::File(file) => form.append_file(key, file.clone()),
        other => {
            if let Some(text) = other.to_entry_string() {
                form.append_text(key, text);
            }
        }
    }
}

fn flatten_object(form: &mut FormData, params: &Params, path: &str) {
    for (key, value) in params.iter() {
        let key = if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        };
        flatten_value(form, key, value);
    }
}

fn flatten_value(form: &mut FormData, key: String, value: &Param) {
    match value {
        Param::Null => {}
        Param::File(file) => form.append_file(key, file.clone()),
        Param::Object(params) => flatten_object(form, params, &key),
        Param::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                flatten_value(form, format!("{key}[{idx}]"), item);
            }
        }
        scalar => {
            if let Some(text) = scalar.as_scalar_string() {
                form.append_text(key, text);
            }
        }
    }
}
