//! Format metadata exchanged between components.
//!
//! [`MediaMeta`] is an insertion-ordered key to typed-value map. Adjacent
//! components hand one to each other when they are linked so they can agree on
//! sample rate, resolution, codec and timebase without a fixed schema.

use bytes::Bytes;

/// Possible values for metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque bytes (codec config, extradata).
    Bytes(Bytes),
    /// Rational value such as a timebase (`num / den`).
    Fraction(i32, i32),
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int32(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int64(v)
    }
}

impl From<f32> for MetaValue {
    fn from(v: f32) -> Self {
        MetaValue::Float(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Double(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::String(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::String(v)
    }
}

impl From<Bytes> for MetaValue {
    fn from(v: Bytes) -> Self {
        MetaValue::Bytes(v)
    }
}

impl From<(i32, i32)> for MetaValue {
    fn from((num, den): (i32, i32)) -> Self {
        MetaValue::Fraction(num, den)
    }
}

/// A key-value pair in a [`MediaMeta`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEntry {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: MetaValue,
}

/// Well-known metadata keys.
pub mod keys {
    /// Audio sample rate in Hz (`Int32`).
    pub const SAMPLE_RATE: &str = "sample-rate";
    /// Audio channel count (`Int32`).
    pub const CHANNELS: &str = "channel-count";
    /// Video width in pixels (`Int32`).
    pub const WIDTH: &str = "width";
    /// Video height in pixels (`Int32`).
    pub const HEIGHT: &str = "height";
    /// Codec identifier (`Int32` or `String`).
    pub const CODEC_ID: &str = "codec-id";
    /// Stream timebase (`Fraction`).
    pub const TIME_BASE: &str = "timebase";
    /// Stream duration in microseconds (`Int64`).
    pub const DURATION: &str = "duration";
    /// Bit rate in bits per second (`Int32`).
    pub const BIT_RATE: &str = "bit-rate";
    /// Frame rate (`Fraction` or `Float`).
    pub const FRAME_RATE: &str = "frame-rate";
    /// Mime type (`String`).
    pub const MIME: &str = "mime";
    /// Codec extradata (`Bytes`).
    pub const CODEC_DATA: &str = "codec-data";
}

/// Ordered, typed metadata map.
///
/// Keys keep their first insertion position; setting an existing key replaces
/// its value in place. Most maps hold a handful of entries, so lookups are
/// linear.
///
/// # Example
///
/// ```rust
/// use cadence::metadata::{keys, MediaMeta};
///
/// let meta = MediaMeta::new()
///     .with(keys::SAMPLE_RATE, 48_000)
///     .with(keys::CHANNELS, 2)
///     .with(keys::TIME_BASE, (1, 48_000));
///
/// assert_eq!(meta.get_i32(keys::SAMPLE_RATE), Some(48_000));
/// assert_eq!(meta.get_fraction(keys::TIME_BASE), Some((1, 48_000)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMeta {
    entries: Vec<MetaEntry>,
}

impl MediaMeta {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a field, returning the previous value if the key existed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Option<MetaValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => Some(std::mem::replace(&mut entry.value, value)),
            None => {
                self.entries.push(MetaEntry { key, value });
                None
            }
        }
    }

    /// Get a field by key.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(pos).value)
    }

    /// Copy every field of `other` into this map, overwriting duplicates.
    pub fn merge(&mut self, other: &MediaMeta) {
        for entry in &other.entries {
            self.set(entry.key.clone(), entry.value.clone());
        }
    }

    /// Get an `Int32` field.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            MetaValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Get an integer field, widening `Int32`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            MetaValue::Int64(v) => Some(*v),
            MetaValue::Int32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get a `Float` field.
    pub fn get_f32(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            MetaValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get a floating point field, widening `Float`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            MetaValue::Double(v) => Some(*v),
            MetaValue::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get a `String` field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            MetaValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Get a `Bytes` field.
    pub fn get_bytes(&self, key: &str) -> Option<&Bytes> {
        match self.get(key)? {
            MetaValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Get a `Fraction` field as `(num, den)`.
    pub fn get_fraction(&self, key: &str) -> Option<(i32, i32)> {
        match self.get(key)? {
            MetaValue::Fraction(n, d) => Some((*n, *d)),
            _ => None,
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, MetaEntry> {
        self.entries.iter()
    }

    /// Iterate over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }
}

impl<'a> IntoIterator for &'a MediaMeta {
    type Item = &'a MetaEntry;
    type IntoIter = std::slice::Iter<'a, MetaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for MediaMeta {
    type Item = MetaEntry;
    type IntoIter = std::vec::IntoIter<MetaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_builder() {
        let meta = MediaMeta::new()
            .with(keys::WIDTH, 1920)
            .with(keys::HEIGHT, 1080)
            .with(keys::MIME, "video/avc")
            .with(keys::DURATION, 10_000_000i64);

        assert_eq!(meta.get_i32(keys::WIDTH), Some(1920));
        assert_eq!(meta.get_str(keys::MIME), Some("video/avc"));
        assert_eq!(meta.get_i64(keys::DURATION), Some(10_000_000));
        assert_eq!(meta.get_i64(keys::HEIGHT), Some(1080));
        assert_eq!(meta.get_i32(keys::MIME), None);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut meta = MediaMeta::new().with("a", 1).with("b", 2).with("c", 3);
        let old = meta.set("b", 20);

        assert_eq!(old, Some(MetaValue::Int32(2)));
        assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(meta.get_i32("b"), Some(20));
    }

    #[test]
    fn test_remove_and_merge() {
        let mut meta = MediaMeta::new().with("a", 1).with("b", 2);
        assert_eq!(meta.remove("a"), Some(MetaValue::Int32(1)));
        assert_eq!(meta.remove("a"), None);

        let other = MediaMeta::new().with("b", 5).with("z", 2.5f64);
        meta.merge(&other);
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get_i32("b"), Some(5));
        assert_eq!(meta.get_f64("z"), Some(2.5));
    }

    #[test]
    fn test_bytes_and_iteration() {
        let meta = MediaMeta::new()
            .with(keys::CODEC_DATA, Bytes::from_static(&[0, 0, 0, 1]))
            .with(keys::FRAME_RATE, 29.97f32);

        assert_eq!(meta.get_bytes(keys::CODEC_DATA).map(|b| b.len()), Some(4));
        assert!((meta.get_f64(keys::FRAME_RATE).unwrap() - 29.97).abs() < 1e-4);

        let names: Vec<&str> = (&meta).into_iter().map(|e| e.key.as_str()).collect();
        assert_eq!(names, vec![keys::CODEC_DATA, keys::FRAME_RATE]);
    }
}
