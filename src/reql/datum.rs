//! Datum - the JSON-like value type exchanged with the server.
//!
//! A `Datum` represents any value that can be sent in a query or received in
//! a response.
//!
//! # Supported Types
//!
//! - **Null**: Absence of a value
//! - **Bool**: true or false
//! - **Number**: f64 floating point numbers
//! - **String**: UTF-8 encoded text
//! - **Binary**: opaque byte strings (the `$reql_type$ = "BINARY"`
//!   pseudo-type on the wire)
//! - **Array**: Ordered list of datums
//! - **Object**: Key-value map with canonical (ascending key) order
//!
//! # Example
//!
//! ```rust,ignore
//! use photondb_client::Datum;
//!
//! let doc = Datum::from(vec![Datum::from(1), Datum::from("two")]);
//! assert_eq!(doc.get_nth(1).and_then(Datum::get_string), Some("two"));
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// The key marking a pseudo-type object on the wire.
pub const REQL_TYPE_KEY: &str = "$reql_type$";

/// A value stored in or returned by the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
}

impl Datum {
    /// Check if the datum is null.
    pub fn is_nil(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The variant name, matching the server's type vocabulary.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "NULL",
            Datum::Bool(_) => "BOOL",
            Datum::Number(_) => "NUMBER",
            Datum::String(_) => "STRING",
            Datum::Binary(_) => "BINARY",
            Datum::Array(_) => "ARRAY",
            Datum::Object(_) => "OBJECT",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Number(_) => 2,
            Datum::String(_) => 3,
            Datum::Binary(_) => 4,
            Datum::Array(_) => 5,
            Datum::Object(_) => 6,
        }
    }

    /// Get as bool.
    pub fn get_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number.
    pub fn get_number(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string.
    pub fn get_string(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as binary.
    pub fn get_binary(&self) -> Option<&[u8]> {
        match self {
            Datum::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get as array.
    pub fn get_array(&self) -> Option<&[Datum]> {
        match self {
            Datum::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as object.
    pub fn get_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get a field of an object.
    pub fn get_field(&self, key: &str) -> Option<&Datum> {
        match self {
            Datum::Object(o) => o.get(key),
            _ => None,
        }
    }

    /// Get the i-th element of an array.
    pub fn get_nth(&self, i: usize) -> Option<&Datum> {
        match self {
            Datum::Array(a) => a.get(i),
            _ => None,
        }
    }

    fn mismatch(&self, accessor: &'static str, expected: &'static str) -> Error {
        Error::TypeMismatch {
            accessor,
            expected,
            actual: self.type_name(),
        }
    }

    /// Move out as bool, failing on any other variant.
    pub fn extract_bool(self) -> Result<bool> {
        match self {
            Datum::Bool(b) => Ok(b),
            other => Err(other.mismatch("extract_bool", "BOOL")),
        }
    }

    /// Move out as number, failing on any other variant.
    pub fn extract_number(self) -> Result<f64> {
        match self {
            Datum::Number(n) => Ok(n),
            other => Err(other.mismatch("extract_number", "NUMBER")),
        }
    }

    /// Move out as string, failing on any other variant.
    pub fn extract_string(self) -> Result<String> {
        match self {
            Datum::String(s) => Ok(s),
            other => Err(other.mismatch("extract_string", "STRING")),
        }
    }

    /// Move out as binary, failing on any other variant.
    pub fn extract_binary(self) -> Result<Vec<u8>> {
        match self {
            Datum::Binary(b) => Ok(b),
            other => Err(other.mismatch("extract_binary", "BINARY")),
        }
    }

    /// Move out as array, failing on any other variant.
    pub fn extract_array(self) -> Result<Vec<Datum>> {
        match self {
            Datum::Array(a) => Ok(a),
            other => Err(other.mismatch("extract_array", "ARRAY")),
        }
    }

    /// Move out as object, failing on any other variant.
    pub fn extract_object(self) -> Result<BTreeMap<String, Datum>> {
        match self {
            Datum::Object(o) => Ok(o),
            other => Err(other.mismatch("extract_object", "OBJECT")),
        }
    }

    /// Move a field out of an object, failing if absent or not an object.
    pub fn extract_field(self, key: &str) -> Result<Datum> {
        match self {
            Datum::Object(mut o) => o
                .remove(key)
                .ok_or_else(|| Error::Driver(format!("extract_field: no key `{key}` in object"))),
            other => Err(other.mismatch("extract_field", "OBJECT")),
        }
    }

    /// Move the i-th element out of an array, failing if out of range or not
    /// an array.
    pub fn extract_nth(self, i: usize) -> Result<Datum> {
        match self {
            Datum::Array(mut a) => {
                if i < a.len() {
                    Ok(a.swap_remove(i))
                } else {
                    Err(Error::Driver(format!(
                        "extract_nth: index {i} out of range for array of {}",
                        a.len()
                    )))
                }
            }
            other => Err(other.mismatch("extract_nth", "ARRAY")),
        }
    }

    /// Compare two datums the way the server's comparison operators do:
    /// first by type rank (NULL < BOOL < NUMBER < STRING < BINARY < ARRAY <
    /// OBJECT), then lexicographically within the type.
    pub fn compare(&self, other: &Datum) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Number(a), Datum::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            (Datum::Binary(a), Datum::Binary(b)) => a.cmp(b),
            (Datum::Array(a), Datum::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Datum::Object(a), Datum::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    match ka.cmp(kb) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                    match va.compare(vb) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => unreachable!("rank comparison covers mixed variants"),
        }
    }

    /// Replace non-JSON types with the pseudo-type objects that represent
    /// them on the wire. Identity for everything but BINARY.
    pub fn to_raw(&self) -> Datum {
        match self {
            Datum::Binary(bytes) => {
                let mut object = BTreeMap::new();
                object.insert(REQL_TYPE_KEY.to_string(), Datum::String("BINARY".into()));
                object.insert("data".to_string(), Datum::String(BASE64.encode(bytes)));
                Datum::Object(object)
            }
            other => other.clone(),
        }
    }

    /// Demote a `$reql_type$` pseudo-type object into the datum it encodes.
    /// Objects that do not carry a well-formed pseudo-type pass through
    /// unchanged.
    pub fn from_raw(self) -> Datum {
        let object = match &self {
            Datum::Object(o) => o,
            _ => return self,
        };
        if let Some(Datum::String(kind)) = object.get(REQL_TYPE_KEY) {
            if kind == "BINARY" {
                if let Some(Datum::String(encoded)) = object.get("data") {
                    if let Ok(bytes) = BASE64.decode(encoded) {
                        return Datum::Binary(bytes);
                    }
                }
            }
        }
        self
    }
}

// Conversions

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

macro_rules! datum_from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Datum {
            fn from(n: $ty) -> Self {
                Datum::Number(n as f64)
            }
        })*
    };
}

datum_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(items: Vec<T>) -> Self {
        Datum::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>> From<BTreeMap<String, T>> for Datum {
    fn from(map: BTreeMap<String, T>) -> Self {
        Datum::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()).from_raw()
    }
}

impl<T: Into<Datum>> From<HashMap<String, T>> for Datum {
    fn from(map: HashMap<String, T>) -> Self {
        Datum::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()).from_raw()
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Datum::Null,
        }
    }
}

impl From<serde_json::Value> for Datum {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Datum::Null,
            serde_json::Value::Bool(b) => Datum::Bool(b),
            serde_json::Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Datum::String(s),
            serde_json::Value::Array(arr) => {
                Datum::Array(arr.into_iter().map(Datum::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Datum::Object(obj.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
                    .from_raw()
            }
        }
    }
}

impl From<Datum> for serde_json::Value {
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Null => serde_json::Value::Null,
            Datum::Bool(b) => serde_json::Value::Bool(b),
            Datum::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Datum::String(s) => serde_json::Value::String(s),
            Datum::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            binary @ Datum::Binary(_) => serde_json::Value::from(binary.to_raw()),
            Datum::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Datum::Null => serializer.serialize_unit(),
            Datum::Bool(b) => serializer.serialize_bool(*b),
            Datum::Number(n) => serializer.serialize_f64(*n),
            Datum::String(s) => serializer.serialize_str(s),
            binary @ Datum::Binary(_) => binary.to_raw().serialize(serializer),
            Datum::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for item in arr {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Datum::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (k, v) in obj {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Datum::from(serde_json::Value::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&super::json::write(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getters_match_variants() {
        assert!(Datum::Null.is_nil());
        assert_eq!(Datum::Bool(true).get_bool(), Some(true));
        assert_eq!(Datum::Number(42.5).get_number(), Some(42.5));
        assert_eq!(Datum::from("hello").get_string(), Some("hello"));
        assert_eq!(Datum::from("hello").get_number(), None);

        let arr = Datum::from(vec![1, 2, 3]);
        assert_eq!(arr.get_nth(2).and_then(Datum::get_number), Some(3.0));
        assert_eq!(arr.get_nth(3), None);

        let mut obj = BTreeMap::new();
        obj.insert("age".to_string(), Datum::Number(30.0));
        let obj = Datum::Object(obj);
        assert_eq!(obj.get_field("age").and_then(Datum::get_number), Some(30.0));
        assert_eq!(obj.get_field("name"), None);
    }

    #[test]
    fn extractors_report_mismatch() {
        let err = Datum::from("text").extract_number().unwrap_err();
        match err {
            Error::TypeMismatch {
                accessor,
                expected,
                actual,
            } => {
                assert_eq!(accessor, "extract_number");
                assert_eq!(expected, "NUMBER");
                assert_eq!(actual, "STRING");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn compare_orders_by_type_rank() {
        let ranked = [
            Datum::Null,
            Datum::Bool(false),
            Datum::Number(1e9),
            Datum::from("a"),
            Datum::Binary(vec![0]),
            Datum::Array(vec![]),
            Datum::Object(BTreeMap::new()),
        ];
        for (i, a) in ranked.iter().enumerate() {
            for (j, b) in ranked.iter().enumerate() {
                assert_eq!(a.compare(b), i.cmp(&j), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn compare_is_antisymmetric() {
        let values = [
            Datum::from(1),
            Datum::from(2),
            Datum::from("abc"),
            Datum::from("abd"),
            Datum::from(vec![1, 2]),
            Datum::from(vec![1, 2, 3]),
            Datum::Bool(true),
        ];
        for a in &values {
            for b in &values {
                assert_eq!(a.compare(b), b.compare(a).reverse());
            }
        }
    }

    #[test]
    fn compare_arrays_lexicographically() {
        let short = Datum::from(vec![1, 2]);
        let long = Datum::from(vec![1, 2, 3]);
        let bigger = Datum::from(vec![1, 9]);
        assert_eq!(short.compare(&long), Ordering::Less);
        assert_eq!(long.compare(&bigger), Ordering::Less);
        assert_eq!(short.compare(&short.clone()), Ordering::Equal);
    }

    #[test]
    fn binary_pseudo_type_round_trips() {
        let binary = Datum::Binary(b"hello world".to_vec());
        let raw = binary.to_raw();
        assert_eq!(
            raw.get_field(REQL_TYPE_KEY).and_then(Datum::get_string),
            Some("BINARY")
        );
        assert_eq!(raw.from_raw(), binary);
    }

    #[test]
    fn malformed_pseudo_type_passes_through() {
        let mut obj = BTreeMap::new();
        obj.insert(REQL_TYPE_KEY.to_string(), Datum::String("BINARY".into()));
        obj.insert("data".to_string(), Datum::Number(1.0));
        let datum = Datum::Object(obj.clone());
        assert_eq!(datum.clone().from_raw(), datum);
    }

    #[test]
    fn json_value_conversion_demotes_binary() {
        let value = serde_json::json!({"$reql_type$": "BINARY", "data": "aGk="});
        assert_eq!(Datum::from(value), Datum::Binary(b"hi".to_vec()));
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Datum::from(None::<i32>), Datum::Null);
        assert_eq!(Datum::from(Some(3)), Datum::Number(3.0));
    }
}
