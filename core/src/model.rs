//! Type descriptors and the dynamic value tree the serializer walks.
//!
//! # Design
//! Each model type owns a `TypeDescriptor` built once on first use: its
//! fields in declared order, their wire names and their declared types. The
//! serializer only ever looks at descriptors and `Value`s, so no model needs
//! hand-written JSON code. Model structs stay plain typed structs; the
//! `model!` macro derives the descriptor and a by-name field accessor from
//! the struct definition.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::{Error, Result};

/// Resolves a model descriptor lazily, which allows self-referencing models.
pub type DescriptorFn = fn() -> &'static TypeDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntFormat {
    Int32,
    Int64,
}

/// The declared type of a field or of a response.
#[derive(Clone)]
pub enum DeclaredType {
    Boolean,
    Integer(IntFormat),
    Number,
    String,
    Date,
    DateTime,
    Enum {
        name: &'static str,
        variants: &'static [&'static str],
    },
    Model(DescriptorFn),
    Array(Box<DeclaredType>),
    Map(Box<DeclaredType>),
    File,
    /// Arbitrary JSON, kept untouched.
    Any,
}

impl DeclaredType {
    pub fn array_of(inner: DeclaredType) -> Self {
        DeclaredType::Array(Box::new(inner))
    }

    pub fn map_of(inner: DeclaredType) -> Self {
        DeclaredType::Map(Box::new(inner))
    }

    /// Format hint carried alongside the type.
    pub fn format(&self) -> Option<&'static str> {
        match self {
            DeclaredType::Integer(IntFormat::Int32) => Some("int32"),
            DeclaredType::Integer(IntFormat::Int64) => Some("int64"),
            DeclaredType::Number => Some("double"),
            DeclaredType::Date => Some("date"),
            DeclaredType::DateTime => Some("date-time"),
            DeclaredType::File => Some("binary"),
            _ => None,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Boolean => f.write_str("boolean"),
            DeclaredType::Integer(IntFormat::Int32) => f.write_str("int32"),
            DeclaredType::Integer(IntFormat::Int64) => f.write_str("int64"),
            DeclaredType::Number => f.write_str("number"),
            DeclaredType::String => f.write_str("string"),
            DeclaredType::Date => f.write_str("date"),
            DeclaredType::DateTime => f.write_str("date-time"),
            DeclaredType::Enum { name, .. } => write!(f, "enum {name}"),
            DeclaredType::Model(descriptor) => f.write_str(descriptor().name()),
            DeclaredType::Array(inner) => write!(f, "array of {inner}"),
            DeclaredType::Map(inner) => write!(f, "map of {inner}"),
            DeclaredType::File => f.write_str("file"),
            DeclaredType::Any => f.write_str("any"),
        }
    }
}

impl fmt::Debug for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeclaredType({self})")
    }
}

/// Metadata of one model field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub wire_name: &'static str,
    pub declared: DeclaredType,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, wire_name: &'static str, declared: DeclaredType) -> Self {
        Self {
            name,
            wire_name,
            declared,
        }
    }

    pub fn format(&self) -> Option<&'static str> {
        self.declared.format()
    }
}

/// Selects a concrete model descriptor from a property of the JSON object.
#[derive(Debug, Clone)]
pub struct Discriminator {
    pub property: &'static str,
    pub mapping: Vec<(&'static str, DescriptorFn)>,
}

/// Field metadata of one model type.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
    discriminator: Option<Discriminator>,
}

impl TypeDescriptor {
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name,
            fields,
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_wire_name(&self, wire_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.wire_name == wire_name)
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// The descriptor to decode `object` with: a discriminator match, or `self`.
    pub fn resolve(
        &'static self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> &'static TypeDescriptor {
        let Some(discriminator) = &self.discriminator else {
            return self;
        };
        let Some(tag) = object.get(discriminator.property).and_then(|v| v.as_str()) else {
            return self;
        };
        discriminator
            .mapping
            .iter()
            .find(|(value, _)| *value == tag)
            .map(|(_, descriptor)| descriptor())
            .unwrap_or(self)
    }
}

/// A decoded value, tagged with enough type information to re-encode it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Enum(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Object),
    File(PathBuf),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "date-time",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::File(_) => "file",
            Value::Json(_) => "json",
        }
    }
}

/// Field values of one model instance, keyed by field name.
#[derive(Clone)]
pub struct Object {
    descriptor: &'static TypeDescriptor,
    fields: Vec<(&'static str, Value)>,
}

impl Object {
    pub fn new(descriptor: &'static TypeDescriptor) -> Self {
        Self {
            descriptor,
            fields: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Set a declared field. Names the descriptor does not know are rejected.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let descriptor = self.descriptor;
        let field = descriptor.field(name).ok_or_else(|| {
            Error::serialization(format!("{} has no field `{name}`", descriptor.name))
        })?;
        match self.fields.iter_mut().find(|(n, _)| *n == field.name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.name, value)),
        }
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn into_fields(self) -> impl Iterator<Item = (&'static str, Value)> {
        self.fields.into_iter()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.descriptor, other.descriptor) && self.fields == other.fields
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.descriptor.name);
        for (name, value) in &self.fields {
            s.field(name, value);
        }
        s.finish()
    }
}

/// A typed struct described by a `TypeDescriptor`.
///
/// Implemented by the `model!` macro; `field` / `set_field` give access by
/// field name for generic tooling.
pub trait Model: Default + Sized {
    fn descriptor() -> &'static TypeDescriptor;

    fn field(&self, name: &str) -> Option<Value>;

    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;

    /// Snapshot of all set fields, in declared order.
    fn to_object(&self) -> Object {
        let descriptor = Self::descriptor();
        let mut fields = Vec::new();
        for field in descriptor.fields() {
            if let Some(value) = self.field(field.name) {
                if !value.is_null() {
                    fields.push((field.name, value));
                }
            }
        }
        Object { descriptor, fields }
    }

    /// Build from an object; fields this type does not declare are skipped,
    /// which lets a base type accept an object decoded as one of its subtypes.
    fn from_object(object: Object) -> Result<Self> {
        let descriptor = Self::descriptor();
        let mut model = Self::default();
        for (name, value) in object.into_fields() {
            if descriptor.field(name).is_some() {
                model.set_field(name, value)?;
            }
        }
        Ok(model)
    }
}

/// Conversion between a Rust field type and `Value`.
pub trait FieldType: Sized {
    fn declared_type() -> DeclaredType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

fn unexpected<T>(expected: &str, found: &Value) -> Result<T> {
    Err(Error::serialization(format!(
        "expected {expected}, found {}",
        found.kind()
    )))
}

impl FieldType for bool {
    fn declared_type() -> DeclaredType {
        DeclaredType::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => unexpected("boolean", &other),
        }
    }
}

impl FieldType for i32 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Integer(IntFormat::Int32)
    }

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => i32::try_from(i)
                .map_err(|_| Error::serialization(format!("{i} does not fit in int32"))),
            other => unexpected("int32", &other),
        }
    }
}

impl FieldType for i64 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Integer(IntFormat::Int64)
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => unexpected("int64", &other),
        }
    }
}

impl FieldType for f64 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Number
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => unexpected("number", &other),
        }
    }
}

impl FieldType for String {
    fn declared_type() -> DeclaredType {
        DeclaredType::String
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => unexpected("string", &other),
        }
    }
}

impl FieldType for NaiveDate {
    fn declared_type() -> DeclaredType {
        DeclaredType::Date
    }

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            other => unexpected("date", &other),
        }
    }
}

impl FieldType for DateTime<FixedOffset> {
    fn declared_type() -> DeclaredType {
        DeclaredType::DateTime
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(d) => Ok(d),
            other => unexpected("date-time", &other),
        }
    }
}

impl FieldType for PathBuf {
    fn declared_type() -> DeclaredType {
        DeclaredType::File
    }

    fn to_value(&self) -> Value {
        Value::File(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::File(p) => Ok(p),
            other => unexpected("file", &other),
        }
    }
}

impl FieldType for serde_json::Value {
    fn declared_type() -> DeclaredType {
        DeclaredType::Any
    }

    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(j) => Ok(j),
            Value::Null => Ok(serde_json::Value::Null),
            other => unexpected("any", &other),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn declared_type() -> DeclaredType {
        T::declared_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FieldType> FieldType for Box<T> {
    fn declared_type() -> DeclaredType {
        T::declared_type()
    }

    fn to_value(&self) -> Value {
        self.as_ref().to_value()
    }

    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::array_of(T::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(FieldType::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => unexpected("array", &other),
        }
    }
}

impl<T: FieldType> FieldType for BTreeMap<String, T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::map_of(T::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => unexpected("map", &other),
        }
    }
}

/// Declare a model struct together with its `TypeDescriptor`.
///
/// ```
/// payment_sdk::model! {
///     pub struct Space {
///         pub id: Option<i64> => "id",
///         pub linked_space_id: Option<i64> => "linkedSpaceId",
///     }
/// }
/// ```
#[macro_export]
macro_rules! model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::model::Model for $name {
            fn descriptor() -> &'static $crate::model::TypeDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::model::TypeDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::model::TypeDescriptor::new(
                        stringify!($name),
                        vec![
                            $(
                                $crate::model::FieldDescriptor::new(
                                    stringify!($field),
                                    $wire,
                                    <$fty as $crate::model::FieldType>::declared_type(),
                                ),
                            )*
                        ],
                    )
                })
            }

            fn field(&self, name: &str) -> Option<$crate::model::Value> {
                match name {
                    $(
                        stringify!($field) => {
                            Some($crate::model::FieldType::to_value(&self.$field))
                        }
                    )*
                    _ => None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::model::Value,
            ) -> $crate::error::Result<()> {
                match name {
                    $(
                        stringify!($field) => {
                            self.$field = <$fty as $crate::model::FieldType>::from_value(value)?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::error::Error::Serialization(format!(
                        "{} has no field `{}`",
                        stringify!($name),
                        name
                    ))),
                }
            }
        }

        impl $crate::model::FieldType for $name {
            fn declared_type() -> $crate::model::DeclaredType {
                $crate::model::DeclaredType::Model(
                    <$name as $crate::model::Model>::descriptor,
                )
            }

            fn to_value(&self) -> $crate::model::Value {
                $crate::model::Value::Object($crate::model::Model::to_object(self))
            }

            fn from_value(value: $crate::model::Value) -> $crate::error::Result<Self> {
                match value {
                    $crate::model::Value::Object(object) => {
                        <$name as $crate::model::Model>::from_object(object)
                    }
                    other => Err($crate::error::Error::Serialization(format!(
                        "expected {}, found {}",
                        stringify!($name),
                        other.kind()
                    ))),
                }
            }
        }
    };
}

/// Declare a string enum with its wire values.
#[macro_export]
macro_rules! model_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )*
        }

        impl $name {
            pub const VARIANTS: &'static [&'static str] = &[$($wire),*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)*
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::Error;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)*
                    other => Err($crate::error::Error::Serialization(format!(
                        "`{}` is not a valid {}",
                        other,
                        stringify!($name)
                    ))),
                }
            }
        }

        impl $crate::model::FieldType for $name {
            fn declared_type() -> $crate::model::DeclaredType {
                $crate::model::DeclaredType::Enum {
                    name: stringify!($name),
                    variants: $name::VARIANTS,
                }
            }

            fn to_value(&self) -> $crate::model::Value {
                $crate::model::Value::Enum(self.as_str().to_string())
            }

            fn from_value(value: $crate::model::Value) -> $crate::error::Result<Self> {
                match value {
                    $crate::model::Value::Enum(s) | $crate::model::Value::String(s) => s.parse(),
                    other => Err($crate::error::Error::Serialization(format!(
                        "expected {}, found {}",
                        stringify!($name),
                        other.kind()
                    ))),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::model! {
        struct Node {
            id: Option<i64> => "id",
            linked_space_id: Option<i64> => "linkedSpaceId",
            children: Option<Vec<Node>> => "children",
        }
    }

    crate::model_enum! {
        enum Color {
            Red => "RED",
            Dark => "DARK_GREEN",
        }
    }

    #[test]
    fn descriptor_keeps_declared_order_and_wire_names() {
        let d = Node::descriptor();
        let names: Vec<_> = d.fields().iter().map(|f| (f.name, f.wire_name)).collect();
        assert_eq!(
            names,
            vec![
                ("id", "id"),
                ("linked_space_id", "linkedSpaceId"),
                ("children", "children")
            ]
        );
        assert_eq!(d.field("id").unwrap().format(), Some("int64"));
        assert_eq!(d.field_by_wire_name("linkedSpaceId").unwrap().name, "linked_space_id");
    }

    #[test]
    fn descriptor_is_built_once() {
        assert!(std::ptr::eq(Node::descriptor(), Node::descriptor()));
    }

    #[test]
    fn self_referencing_model_declares_nested_array() {
        let children = &Node::descriptor().field("children").unwrap().declared;
        assert_eq!(children.to_string(), "array of Node");
    }

    #[test]
    fn field_accessor_by_name() {
        let mut node = Node::default();
        node.set_field("linked_space_id", Value::Int(7)).unwrap();
        assert_eq!(node.linked_space_id, Some(7));
        assert_eq!(node.field("linked_space_id"), Some(Value::Int(7)));
        assert_eq!(node.field("missing"), None);
        assert!(node.set_field("missing", Value::Null).is_err());
        assert!(node.set_field("id", Value::String("x".into())).is_err());
    }

    #[test]
    fn to_object_skips_unset_fields() {
        let node = Node {
            id: Some(1),
            ..Default::default()
        };
        let object = node.to_object();
        assert_eq!(object.fields().count(), 1);
        assert_eq!(object.get("id"), Some(&Value::Int(1)));
        assert_eq!(Node::from_object(object).unwrap(), node);
    }

    #[test]
    fn object_rejects_undeclared_fields() {
        let mut object = Object::new(Node::descriptor());
        assert!(object.set("bogus", Value::Int(1)).is_err());
        object.set("id", Value::Int(1)).unwrap();
        object.set("id", Value::Int(2)).unwrap();
        assert_eq!(object.get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn enum_wire_values() {
        assert_eq!(Color::Dark.as_str(), "DARK_GREEN");
        assert_eq!("RED".parse::<Color>().unwrap(), Color::Red);
        assert!("BLUE".parse::<Color>().is_err());
        assert_eq!(Color::from_value(Value::Enum("RED".into())).unwrap(), Color::Red);
    }

    #[test]
    fn int32_range_is_checked() {
        assert!(i32::from_value(Value::Int(i64::from(i32::MAX) + 1)).is_err());
        assert_eq!(i32::from_value(Value::Int(-5)).unwrap(), -5);
    }
}
