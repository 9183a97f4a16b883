//! Tagged data exchanged between pipeline stages.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;

use url::Url;

/// Runtime type tag carried by every [`TypedData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    /// No meaningful data. Sources accept this as their input.
    None,
    /// Encoded image bytes (PNG unless stated otherwise).
    Image,
    Text,
    Uri,
    /// A readable byte stream.
    Stream,
    RawData,
    /// Application-defined tag.
    Custom(&'static str),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::None => f.write_str("None"),
            DataType::Image => f.write_str("Image"),
            DataType::Text => f.write_str("Text"),
            DataType::Uri => f.write_str("Uri"),
            DataType::Stream => f.write_str("Stream"),
            DataType::RawData => f.write_str("RawData"),
            DataType::Custom(name) => write!(f, "Custom({name})"),
        }
    }
}

/// Ordered set of data type tags, as declared by a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(BTreeSet<DataType>);

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(types: &[DataType]) -> Self {
        types.iter().copied().collect()
    }

    pub fn single(data_type: DataType) -> Self {
        Self::of(&[data_type])
    }

    pub fn insert(&mut self, data_type: DataType) -> bool {
        self.0.insert(data_type)
    }

    pub fn contains(&self, data_type: DataType) -> bool {
        self.0.contains(&data_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = DataType> + '_ {
        self.0.iter().copied()
    }

    pub fn extend_from(&mut self, other: &TypeSet) {
        self.0.extend(other.iter());
    }

    pub fn is_disjoint(&self, other: &TypeSet) -> bool {
        self.0.is_disjoint(&other.0)
    }
}

impl FromIterator<DataType> for TypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, data_type) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{data_type}")?;
        }
        f.write_str("}")
    }
}

/// Owned value carried by a [`TypedData`].
///
/// Dropping a payload releases whatever it holds; custom payloads can hook
/// their own cleanup through `Drop`.
pub enum Payload {
    Empty,
    Image(Vec<u8>),
    Text(String),
    Uri(Url),
    Stream(Box<dyn Read + Send>),
    Bytes(Vec<u8>),
    Custom(Box<dyn Any + Send>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Image(bytes) => write!(f, "Image({} bytes)", bytes.len()),
            Payload::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            Payload::Uri(url) => write!(f, "Uri({url})"),
            Payload::Stream(_) => f.write_str("Stream(..)"),
            Payload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Payload::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Immutable tagged value passed from stage to stage.
///
/// Whoever receives a `TypedData` owns it. Passing it into another stage
/// hands ownership over; otherwise call [`TypedData::dispose`] (or just drop
/// it) once it is no longer needed.
#[derive(Debug)]
pub struct TypedData {
    data_type: DataType,
    payload: Payload,
    name: String,
}

impl TypedData {
    /// The input handed to sources.
    pub fn none() -> Self {
        Self {
            data_type: DataType::None,
            payload: Payload::Empty,
            name: String::new(),
        }
    }

    pub fn from_image(png: Vec<u8>, name: impl Into<String>) -> Self {
        Self::with_payload(DataType::Image, Payload::Image(png), name)
    }

    pub fn from_text(text: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_payload(DataType::Text, Payload::Text(text.into()), name)
    }

    pub fn from_uri(uri: Url, name: impl Into<String>) -> Self {
        Self::with_payload(DataType::Uri, Payload::Uri(uri), name)
    }

    pub fn from_stream(stream: Box<dyn Read + Send>, name: impl Into<String>) -> Self {
        Self::with_payload(DataType::Stream, Payload::Stream(stream), name)
    }

    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        Self::with_payload(DataType::RawData, Payload::Bytes(bytes), name)
    }

    /// Wraps an application-defined value under a custom tag.
    pub fn custom<T>(tag: &'static str, value: T, name: impl Into<String>) -> Self
    where
        T: Any + Send,
    {
        Self::with_payload(DataType::Custom(tag), Payload::Custom(Box::new(value)), name)
    }

    /// Builds data with an explicit tag. The caller is responsible for the
    /// tag describing the payload.
    pub fn with_payload(data_type: DataType, payload: Payload, name: impl Into<String>) -> Self {
        Self {
            data_type,
            payload,
            name: name.into(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Splits the data into its name and payload.
    pub fn into_parts(self) -> (String, Payload) {
        (self.name, self.payload)
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_uri(&self) -> Option<&Url> {
        match &self.payload {
            Payload::Uri(url) => Some(url),
            _ => None,
        }
    }

    /// Raw bytes for image and binary payloads.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Image(bytes) | Payload::Bytes(bytes) => Some(bytes),
            Payload::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.payload {
            Payload::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Releases the payload.
    pub fn dispose(self) {
        log::debug!("Disposing {} data '{}'", self.data_type, self.name);
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_tag_their_payload() {
        assert_eq!(TypedData::none().data_type(), DataType::None);
        assert_eq!(
            TypedData::from_image(vec![1], "shot").data_type(),
            DataType::Image
        );
        assert_eq!(
            TypedData::from_text("hello", "note").as_text(),
            Some("hello")
        );
        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(
            TypedData::from_uri(url.clone(), "link").as_uri(),
            Some(&url)
        );
        assert_eq!(
            TypedData::from_bytes(vec![1, 2], "blob").data_type(),
            DataType::RawData
        );
    }

    #[test]
    fn custom_payload_downcasts() {
        let data = TypedData::custom("region", (10u32, 20u32), "crop");
        assert_eq!(data.data_type(), DataType::Custom("region"));
        assert_eq!(data.downcast_ref::<(u32, u32)>(), Some(&(10, 20)));
        assert!(data.downcast_ref::<String>().is_none());
    }

    #[test]
    fn type_set_formats_sorted() {
        let set = TypeSet::of(&[DataType::Text, DataType::Image]);
        assert_eq!(set.to_string(), "{Image, Text}");
        assert_eq!(TypeSet::new().to_string(), "{}");
        assert!(set.contains(DataType::Text));
        assert!(!set.contains(DataType::Uri));
    }
}
