//! Descriptor-driven conversion between `Value`s and JSON.
//!
//! # Design
//! Encoding walks a model's `TypeDescriptor` in declared order and keys each
//! field by its wire name. Decoding is driven by the declared target type:
//! unknown JSON keys are ignored, missing keys and `null` leave the field
//! unset, and any shape mismatch is an error naming the JSON path, e.g.
//! `Transaction.lineItems[2].quantity`. Nothing is coerced between shapes.
//!
//! The serializer also owns the temp directory used to materialize file
//! responses and the string encodings used for path, query and header
//! parameters.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};

use crate::error::{Error, Result};
use crate::model::{DeclaredType, FieldType, IntFormat, Model, Object, Value};

/// ISO-8601 date-time with numeric offset, e.g. `2024-05-01T12:30:00+02:00`.
/// Sub-second precision is kept when present (`10:30:00.250+00:00`).
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const TEMP_FILE_PREFIX: &str = "payment-sdk-";

/// How a list parameter is flattened into a query or header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionFormat {
    /// Comma separated.
    #[default]
    Csv,
    /// Space separated.
    Ssv,
    /// Tab separated.
    Tsv,
    /// Pipe separated.
    Pipes,
    /// One query pair per element.
    Multi,
}

#[derive(Debug, Clone)]
pub struct Serializer {
    temp_dir: PathBuf,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Serializer {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn serialize_model<M: Model>(&self, model: &M) -> Result<serde_json::Value> {
        self.serialize(&Value::Object(model.to_object()))
    }

    /// Encode `value` as JSON. Model objects are keyed by wire name.
    pub fn serialize(&self, value: &Value) -> Result<serde_json::Value> {
        encode(value, None, "$")
    }

    pub fn deserialize_model<M: Model + FieldType>(&self, json: &serde_json::Value) -> Result<M> {
        self.deserialize_as::<M>(json)
    }

    /// Decode `json` into any field type, including `Vec<M>` and maps.
    pub fn deserialize_as<T: FieldType>(&self, json: &serde_json::Value) -> Result<T> {
        let value = self.deserialize(json, &T::declared_type())?;
        T::from_value(value)
    }

    /// Decode `json` according to `declared`.
    pub fn deserialize(&self, json: &serde_json::Value, declared: &DeclaredType) -> Result<Value> {
        let root = match declared {
            DeclaredType::Model(descriptor) => descriptor().name().to_string(),
            _ => "$".to_string(),
        };
        decode(json, declared, &root)
    }

    /// Write `bytes` to a new uniquely named file in the temp directory.
    ///
    /// The caller owns the returned file and is responsible for removing it.
    pub fn write_temp_file(&self, bytes: &[u8], filename_hint: Option<&str>) -> Result<PathBuf> {
        let suffix = filename_hint
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .map(|name| format!("-{name}"))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)?;
        file.write_all(bytes)?;
        let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
        Ok(path)
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn mismatch<T>(path: &str, expected: &DeclaredType, json: &serde_json::Value) -> Result<T> {
    Err(Error::serialization(format!(
        "{path}: expected {expected}, found {}",
        json_kind(json)
    )))
}

fn decode(json: &serde_json::Value, declared: &DeclaredType, path: &str) -> Result<Value> {
    use serde_json::Value as Json;

    if json.is_null() {
        return Ok(Value::Null);
    }
    match (declared, json) {
        (DeclaredType::Boolean, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (DeclaredType::Integer(format), Json::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return mismatch(path, declared, json);
            };
            if *format == IntFormat::Int32 && i32::try_from(i).is_err() {
                return Err(Error::serialization(format!("{path}: {i} does not fit in int32")));
            }
            Ok(Value::Int(i))
        }
        (DeclaredType::Number, Json::Number(n)) => match n.as_f64() {
            Some(f) => Ok(Value::Float(f)),
            None => mismatch(path, declared, json),
        },
        (DeclaredType::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (DeclaredType::Date, Json::String(s)) => parse_date(s)
            .map(Value::Date)
            .ok_or_else(|| Error::serialization(format!("{path}: `{s}` is not a date"))),
        (DeclaredType::DateTime, Json::String(s)) => parse_date_time(s)
            .map(Value::DateTime)
            .ok_or_else(|| Error::serialization(format!("{path}: `{s}` is not a date-time"))),
        (DeclaredType::Enum { name, variants }, Json::String(s)) => {
            if variants.contains(&s.as_str()) {
                Ok(Value::Enum(s.clone()))
            } else {
                Err(Error::serialization(format!("{path}: `{s}` is not a valid {name}")))
            }
        }
        (DeclaredType::Model(descriptor), Json::Object(map)) => {
            let descriptor = descriptor().resolve(map);
            let mut object = Object::new(descriptor);
            for field in descriptor.fields() {
                let Some(raw) = map.get(field.wire_name) else {
                    continue;
                };
                let value = decode(raw, &field.declared, &format!("{path}.{}", field.wire_name))?;
                if !value.is_null() {
                    object.set(field.name, value)?;
                }
            }
            Ok(Value::Object(object))
        }
        (DeclaredType::Array(inner), Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode(item, inner, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (DeclaredType::Map(inner), Json::Object(map)) => map
            .iter()
            .map(|(k, v)| decode(v, inner, &format!("{path}.{k}")).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map),
        (DeclaredType::Any, other) => Ok(Value::Json(other.clone())),
        _ => mismatch(path, declared, json),
    }
}

fn encode(value: &Value, declared: Option<&DeclaredType>, path: &str) -> Result<serde_json::Value> {
    use serde_json::Value as Json;

    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => {
            if let Some(DeclaredType::Integer(IntFormat::Int32)) = declared {
                if i32::try_from(*i).is_err() {
                    return Err(Error::serialization(format!("{path}: {i} does not fit in int32")));
                }
            }
            Json::from(*i)
        }
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| Error::serialization(format!("{path}: {f} is not a finite number")))?,
        Value::String(s) | Value::Enum(s) => Json::String(s.clone()),
        Value::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => Json::String(dt.format(DATE_TIME_FORMAT).to_string()),
        Value::Array(items) => {
            let inner = match declared {
                Some(DeclaredType::Array(inner)) => Some(inner.as_ref()),
                _ => None,
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(encode(item, inner, &format!("{path}[{i}]"))?);
            }
            Json::Array(out)
        }
        Value::Map(entries) => {
            let inner = match declared {
                Some(DeclaredType::Map(inner)) => Some(inner.as_ref()),
                _ => None,
            };
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), encode(v, inner, &format!("{path}.{k}"))?);
            }
            Json::Object(out)
        }
        Value::Object(object) => {
            let descriptor = object.descriptor();
            let mut out = serde_json::Map::new();
            for field in descriptor.fields() {
                let Some(v) = object.get(field.name) else {
                    continue;
                };
                if v.is_null() {
                    continue;
                }
                let child = format!("{path}.{}", field.wire_name);
                out.insert(field.wire_name.to_string(), encode(v, Some(&field.declared), &child)?);
            }
            Json::Object(out)
        }
        Value::File(p) => {
            return Err(Error::serialization(format!(
                "{path}: file {} cannot be embedded in a JSON body",
                p.display()
            )))
        }
        Value::Json(j) => j.clone(),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_date_time(s).map(|dt| dt.date_naive()))
}

fn parse_date_time(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, DATE_TIME_FORMAT))
        .ok()
}

/// Render a scalar (or a list, comma separated) as a plain string.
pub fn to_string_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) | Value::Enum(s) => s.clone(),
        Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        Value::DateTime(dt) => dt.format(DATE_TIME_FORMAT).to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(to_string_value).collect();
            serialize_collection(&parts, CollectionFormat::Csv)
        }
        Value::Map(_) | Value::Object(_) | Value::Json(_) => {
            encode(value, None, "$").map(|j| j.to_string()).unwrap_or_default()
        }
        Value::File(p) => p.display().to_string(),
    }
}

/// Percent-encoded path segment.
pub fn to_path_value(value: &Value) -> String {
    urlencoding::encode(&to_string_value(value)).into_owned()
}

/// Query parameter value; the query string builder takes care of encoding.
pub fn to_query_value(value: &Value) -> String {
    to_string_value(value)
}

pub fn to_header_value(value: &Value) -> String {
    to_string_value(value)
}

/// Join `values` with the separator of `format`. `Multi` joins with `&`,
/// callers building a query use [`query_pairs`] instead.
pub fn serialize_collection(values: &[String], format: CollectionFormat) -> String {
    let separator = match format {
        CollectionFormat::Csv => ",",
        CollectionFormat::Ssv => " ",
        CollectionFormat::Tsv => "\t",
        CollectionFormat::Pipes => "|",
        CollectionFormat::Multi => "&",
    };
    values.join(separator)
}

/// Query pairs for a list parameter; `Multi` repeats the name per element.
pub fn query_pairs(name: &str, values: &[String], format: CollectionFormat) -> Vec<(String, String)> {
    match format {
        CollectionFormat::Multi => values
            .iter()
            .map(|v| (name.to_string(), v.clone()))
            .collect(),
        other => vec![(name.to_string(), serialize_collection(values, other))],
    }
}

/// Strip any directory components from a server-supplied file name.
pub fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DescriptorFn, Discriminator, TypeDescriptor};
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    crate::model_enum! {
        enum Kind {
            Card => "CARD",
            Invoice => "INVOICE",
        }
    }

    crate::model! {
        struct Item {
            unique_id: Option<String> => "uniqueId",
            quantity: Option<i32> => "quantity",
            kind: Option<Kind> => "type",
        }
    }

    crate::model! {
        struct Order {
            id: Option<i64> => "id",
            linked_space_id: Option<i64> => "linkedSpaceId",
            created_on: Option<DateTime<FixedOffset>> => "createdOn",
            due_on: Option<NaiveDate> => "dueOn",
            amount: Option<f64> => "amount",
            items: Option<Vec<Item>> => "lineItems",
            meta: Option<BTreeMap<String, String>> => "metaData",
            parent: Option<Box<Order>> => "parent",
        }
    }

    fn sample() -> Order {
        Order {
            id: Some(9_007_199_254_740_993),
            linked_space_id: Some(12),
            created_on: Some(
                FixedOffset::east_opt(2 * 3600)
                    .unwrap()
                    .with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
                    .unwrap(),
            ),
            due_on: Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            amount: Some(19.95),
            items: Some(vec![
                Item {
                    unique_id: Some("a".into()),
                    quantity: Some(2),
                    kind: Some(Kind::Card),
                },
                Item {
                    unique_id: Some("b".into()),
                    quantity: None,
                    kind: Some(Kind::Invoice),
                },
            ]),
            meta: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            parent: Some(Box::new(Order {
                id: Some(1),
                ..Default::default()
            })),
        }
    }

    #[test]
    fn serialize_uses_wire_names_and_formats() {
        let json = Serializer::default().serialize_model(&sample()).unwrap();
        assert_eq!(json["linkedSpaceId"], 12);
        assert_eq!(json["createdOn"], "2024-05-01T12:30:00+02:00");
        assert_eq!(json["dueOn"], "2024-06-01");
        assert_eq!(json["lineItems"][0]["uniqueId"], "a");
        assert_eq!(json["lineItems"][0]["type"], "CARD");
        assert!(json["lineItems"][1].get("quantity").is_none());
        assert_eq!(json["metaData"]["k"], "v");
        assert_eq!(json["parent"], json!({"id": 1}));
        assert!(json.get("linked_space_id").is_none());
    }

    #[test]
    fn serialize_emits_fields_in_declared_order() {
        let json = Serializer::default().serialize_model(&sample()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "id",
                "linkedSpaceId",
                "createdOn",
                "dueOn",
                "amount",
                "lineItems",
                "metaData",
                "parent"
            ]
        );
    }

    #[test]
    fn round_trip_reproduces_nested_graph() {
        let serializer = Serializer::default();
        let original = sample();
        let json = serializer.serialize_model(&original).unwrap();
        let back: Order = serializer.deserialize_model(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn unknown_keys_are_ignored_and_missing_keys_unset() {
        let json = json!({"id": 5, "somethingNew": {"x": 1}, "amount": null});
        let order: Order = Serializer::default().deserialize_model(&json).unwrap();
        assert_eq!(order.id, Some(5));
        assert_eq!(order.amount, None);
        assert_eq!(order.items, None);
    }

    #[test]
    fn shape_mismatch_names_the_path() {
        let json = json!({"lineItems": [{"quantity": 1}, {"quantity": "two"}]});
        let err = Serializer::default().deserialize_model::<Order>(&json).unwrap_err();
        match err {
            Error::Serialization(msg) => {
                assert!(msg.contains("Order.lineItems[1].quantity"), "{msg}");
                assert!(msg.contains("expected int32"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_where_object_expected_fails() {
        let json = json!({"parent": "not an object"});
        assert!(matches!(
            Serializer::default().deserialize_model::<Order>(&json),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn integer_formats_are_metadata_driven() {
        let s = Serializer::default();
        assert!(s.deserialize_model::<Item>(&json!({"quantity": 3_000_000_000u64})).is_err());
        let order: Order = s.deserialize_model(&json!({"id": 3_000_000_000u64})).unwrap();
        assert_eq!(order.id, Some(3_000_000_000));
        assert!(s.deserialize_model::<Order>(&json!({"id": 1.5})).is_err());
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let err = Serializer::default()
            .deserialize_model::<Item>(&json!({"type": "CASH"}))
            .unwrap_err();
        assert!(err.to_string().contains("not a valid Kind"));
    }

    #[test]
    fn date_time_accepts_utc_designator_and_fractions() {
        let order: Order = Serializer::default()
            .deserialize_model(&json!({"createdOn": "2024-05-01T10:30:00.250Z"}))
            .unwrap();
        let created = order.created_on.unwrap();
        assert_eq!(created.timestamp(), 1_714_559_400);
    }

    #[test]
    fn date_time_fractions_survive_a_round_trip() {
        let s = Serializer::default();
        let order: Order = s
            .deserialize_model(&json!({"createdOn": "2024-05-01T10:30:00.250Z"}))
            .unwrap();
        let json = s.serialize_model(&order).unwrap();
        assert_eq!(json["createdOn"], "2024-05-01T10:30:00.250+00:00");
        let back: Order = s.deserialize_model(&json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn whole_second_date_times_keep_the_atom_form() {
        let dt = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
            .unwrap();
        assert_eq!(to_path_value(&Value::DateTime(dt)), "2024-05-01T12:30:00+02:00");
    }

    #[test]
    fn deserialize_list_of_models() {
        let items: Vec<Item> = Serializer::default()
            .deserialize_as(&json!([{"uniqueId": "x"}, {"uniqueId": "y"}]))
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].unique_id.as_deref(), Some("y"));
    }

    crate::model! {
        struct Connector {
            kind: Option<String> => "type",
            name: Option<String> => "name",
        }
    }

    crate::model! {
        struct CardConnector {
            kind: Option<String> => "type",
            name: Option<String> => "name",
            brand: Option<String> => "brand",
        }
    }

    #[test]
    fn discriminator_selects_concrete_descriptor() {
        let polymorphic: &'static TypeDescriptor = Box::leak(Box::new(
            TypeDescriptor::new("Connector", Connector::descriptor().fields().to_vec())
                .with_discriminator(Discriminator {
                    property: "type",
                    mapping: vec![("card", CardConnector::descriptor as DescriptorFn)],
                }),
        ));
        let map = json!({"type": "card", "name": "visa", "brand": "VISA"});
        let obj = map.as_object().unwrap();
        assert_eq!(polymorphic.resolve(obj).name(), "CardConnector");

        let value = decode(&map, &DeclaredType::Model(CardConnector::descriptor), "$").unwrap();
        let Value::Object(object) = value else {
            panic!("expected object");
        };
        assert_eq!(object.get("brand"), Some(&Value::String("VISA".into())));

        let base = Connector::from_object(object).unwrap();
        assert_eq!(base.name.as_deref(), Some("visa"));

        let other = json!({"type": "bank"});
        assert_eq!(polymorphic.resolve(other.as_object().unwrap()).name(), "Connector");
    }

    #[test]
    fn files_cannot_be_embedded_in_json() {
        let err = Serializer::default()
            .serialize(&Value::File(PathBuf::from("/tmp/x")))
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn temp_files_are_unique_and_hold_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = Serializer::new(dir.path());
        let a = serializer.write_temp_file(b"%PDF-1", Some("../../invoice.pdf")).unwrap();
        let b = serializer.write_temp_file(b"%PDF-2", Some("invoice.pdf")).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(a.file_name().unwrap().to_string_lossy().ends_with("-invoice.pdf"));
        assert_eq!(std::fs::read(&a).unwrap(), b"%PDF-1");
        assert_eq!(std::fs::read(&b).unwrap(), b"%PDF-2");
    }

    #[test]
    fn parameter_values() {
        let dt = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap();
        assert_eq!(to_query_value(&Value::DateTime(dt)), "2024-01-02T03:04:05+00:00");
        assert_eq!(to_header_value(&Value::Bool(true)), "true");
        assert_eq!(to_path_value(&Value::String("a b/c".into())), "a%20b%2Fc");
        assert_eq!(
            to_query_value(&Value::Array(vec![Value::Int(1), Value::Int(2)])),
            "1,2"
        );
    }

    #[test]
    fn collection_formats() {
        let values = vec!["a".to_string(), "b".to_string()];
        assert_eq!(serialize_collection(&values, CollectionFormat::Csv), "a,b");
        assert_eq!(serialize_collection(&values, CollectionFormat::Ssv), "a b");
        assert_eq!(serialize_collection(&values, CollectionFormat::Tsv), "a\tb");
        assert_eq!(serialize_collection(&values, CollectionFormat::Pipes), "a|b");
        assert_eq!(
            query_pairs("id", &values, CollectionFormat::Multi),
            vec![("id".to_string(), "a".to_string()), ("id".to_string(), "b".to_string())]
        );
        assert_eq!(
            query_pairs("id", &values, CollectionFormat::Pipes),
            vec![("id".to_string(), "a|b".to_string())]
        );
    }

    #[test]
    fn sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\temp\\report.csv"), "report.csv");
        assert_eq!(sanitize_filename("\"plain.txt\""), "plain.txt");
    }
}
