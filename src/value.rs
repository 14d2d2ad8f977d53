//! Provides the runtime value model.
//!
//! Context data enters the engine through [`Value::from_serializable`] which
//! accepts anything implementing [`Serialize`](serde::Serialize).  Inside
//! directives values behave close to what the inherited templates expect:
//! `+` concatenates when either side is a string, `0`, `""`, `null` and
//! `undefined` are falsy, sequences stringify comma separated.
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use serde::ser::{self, Serialize, Serializer};

use crate::error::{Error, ErrorKind};

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ValueKind {
    Undefined,
    Null,
    Bool,
    Number,
    String,
    Seq,
    Map,
}

#[derive(Clone)]
enum Repr {
    Undefined,
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Shared(Arc<Shared>),
}

#[derive(Clone)]
enum Shared {
    String(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl fmt::Debug for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repr::Undefined => write!(f, "Undefined"),
            Repr::Null => write!(f, "Null"),
            Repr::Bool(val) => fmt::Debug::fmt(val, f),
            Repr::I64(val) => fmt::Debug::fmt(val, f),
            Repr::F64(val) => fmt::Debug::fmt(val, f),
            Repr::Shared(val) => fmt::Debug::fmt(val, f),
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shared::String(val) => fmt::Debug::fmt(val, f),
            Shared::Seq(val) => fmt::Debug::fmt(val, f),
            Shared::Map(val) => fmt::Debug::fmt(val, f),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(Repr);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl Default for Value {
    fn default() -> Value {
        Value(Repr::Undefined)
    }
}

enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn coerce(a: &Value, b: &Value) -> Option<CoerceResult> {
    match (&a.0, &b.0) {
        (Repr::I64(a), Repr::I64(b)) => Some(CoerceResult::I64(*a, *b)),
        (Repr::I64(a), Repr::F64(b)) => Some(CoerceResult::F64(*a as f64, *b)),
        (Repr::F64(a), Repr::I64(b)) => Some(CoerceResult::F64(*a, *b as f64)),
        (Repr::F64(a), Repr::F64(b)) => Some(CoerceResult::F64(*a, *b)),
        _ => None,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Undefined, Repr::Undefined) => true,
            (Repr::Null, Repr::Null) => true,
            (Repr::Bool(a), Repr::Bool(b)) => a == b,
            (Repr::Shared(a), Repr::Shared(b)) => match (&**a, &**b) {
                (Shared::String(a), Shared::String(b)) => a == b,
                (Shared::Seq(a), Shared::Seq(b)) => a == b,
                (Shared::Map(a), Shared::Map(b)) => a == b,
                _ => false,
            },
            _ => match coerce(self, other) {
                Some(CoerceResult::I64(a, b)) => a == b,
                Some(CoerceResult::F64(a, b)) => a == b,
                None => false,
            },
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (&self.0, &other.0) {
            (Repr::Shared(a), Repr::Shared(b)) => match (&**a, &**b) {
                (Shared::String(a), Shared::String(b)) => a.partial_cmp(b),
                _ => None,
            },
            _ => match coerce(self, other) {
                Some(CoerceResult::I64(a, b)) => a.partial_cmp(&b),
                Some(CoerceResult::F64(a, b)) => a.partial_cmp(&b),
                None => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            // missing and null values render as nothing so that optional
            // fields do not leak placeholder words into documents
            Repr::Undefined | Repr::Null => Ok(()),
            Repr::Bool(val) => write!(f, "{}", val),
            Repr::I64(val) => write!(f, "{}", val),
            Repr::F64(val) => {
                if val.fract() == 0.0 && val.is_finite() && val.abs() < 9007199254740992.0 {
                    write!(f, "{}", *val as i64)
                } else {
                    write!(f, "{}", val)
                }
            }
            Repr::Shared(shared) => match &**shared {
                Shared::String(s) => write!(f, "{}", s),
                Shared::Seq(items) => {
                    for (idx, item) in items.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", item)?;
                    }
                    Ok(())
                }
                Shared::Map(_) => write!(f, "[object Object]"),
            },
        }
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        Value(Repr::Null)
    }
}

impl From<bool> for Value {
    #[inline(always)]
    fn from(val: bool) -> Self {
        Value(Repr::Bool(val))
    }
}

impl From<f64> for Value {
    #[inline(always)]
    fn from(val: f64) -> Self {
        Value(Repr::F64(val))
    }
}

impl<'a> From<&'a str> for Value {
    #[inline(always)]
    fn from(val: &'a str) -> Self {
        Value(Repr::Shared(Arc::new(Shared::String(val.into()))))
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        Value(Repr::Shared(Arc::new(Shared::String(val))))
    }
}

impl From<Vec<Value>> for Value {
    #[inline(always)]
    fn from(val: Vec<Value>) -> Self {
        Value(Repr::Shared(Arc::new(Shared::Seq(val))))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    #[inline(always)]
    fn from(val: BTreeMap<String, Value>) -> Self {
        Value(Repr::Shared(Arc::new(Shared::Map(val))))
    }
}

macro_rules! int_from {
    ($($ty:ty)*) => {
        $(
            impl From<$ty> for Value {
                #[inline(always)]
                fn from(val: $ty) -> Self {
                    Value(Repr::I64(val as i64))
                }
            }
        )*
    };
}

int_from!(i8 i16 i32 i64 u8 u16 u32);

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value(Repr::I64(val as i64))
    }
}

macro_rules! primitive_try_from {
    ($ty:ident, {
        $($pat:pat => $expr:expr,)*
    }) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let opt = match &value.0 {
                    $($pat => TryFrom::try_from($expr).ok(),)*
                    _ => None,
                };
                opt.ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        concat!("cannot convert to ", stringify!($ty)),
                    )
                })
            }
        }
    };
}

macro_rules! primitive_int_try_from {
    ($ty:ident) => {
        primitive_try_from!($ty, {
            Repr::I64(val) => *val,
        });
    };
}

primitive_int_try_from!(u8);
primitive_int_try_from!(u32);
primitive_int_try_from!(u64);
primitive_int_try_from!(i32);
primitive_int_try_from!(i64);
primitive_int_try_from!(usize);

primitive_try_from!(bool, {
    Repr::Bool(val) => *val,
});

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.0 {
            Repr::F64(val) => Ok(val),
            Repr::I64(val) => Ok(val as f64),
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                "cannot convert to f64",
            )),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                "cannot convert to string",
            )),
        }
    }
}

impl Value {
    /// The undefined value
    pub const UNDEFINED: Value = Value(Repr::Undefined);

    /// Creates a value from something that can be serialized.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Value, Error> {
        value.serialize(ValueSerializer)
    }

    /// Returns the value kind.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            Repr::Undefined => ValueKind::Undefined,
            Repr::Null => ValueKind::Null,
            Repr::Bool(_) => ValueKind::Bool,
            Repr::I64(_) | Repr::F64(_) => ValueKind::Number,
            Repr::Shared(ref shared) => match **shared {
                Shared::String(_) => ValueKind::String,
                Shared::Seq(_) => ValueKind::Seq,
                Shared::Map(_) => ValueKind::Map,
            },
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            Repr::Shared(ref shared) => match **shared {
                Shared::String(ref s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Is this value truthy?
    ///
    /// `false`, `0`, the empty string, `null` and `undefined` are falsy.
    /// Sequences and maps are truthy even when empty.
    pub fn is_true(&self) -> bool {
        match &self.0 {
            Repr::Undefined | Repr::Null => false,
            Repr::Bool(val) => *val,
            Repr::I64(val) => *val != 0,
            Repr::F64(val) => *val != 0.0 && !val.is_nan(),
            Repr::Shared(shared) => match &**shared {
                Shared::String(s) => !s.is_empty(),
                Shared::Seq(_) | Shared::Map(_) => true,
            },
        }
    }

    /// Returns `true` if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, Repr::Undefined)
    }

    /// Returns `true` if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.0, Repr::Null)
    }

    /// Returns the length of the contained value.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> Option<usize> {
        if let Repr::Shared(ref shared) = self.0 {
            match **shared {
                Shared::String(ref s) => Some(s.chars().count()),
                Shared::Seq(ref items) => Some(items.len()),
                Shared::Map(ref items) => Some(items.len()),
            }
        } else {
            None
        }
    }

    /// Looks up an attribute by attribute name.
    ///
    /// Maps resolve their keys; everything with a length answers `length`.
    /// A missing attribute is `undefined`, but attribute access on
    /// `undefined` or `null` itself is an error.
    pub fn get_attr(&self, key: &str) -> Result<Value, Error> {
        match self.0 {
            Repr::Undefined | Repr::Null => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("tried to look up attribute {} on an empty value", key),
            )),
            Repr::Shared(ref shared) => match **shared {
                Shared::Map(ref items) => {
                    if let Some(value) = items.get(key) {
                        Ok(value.clone())
                    } else if key == "length" {
                        Ok(Value::from(items.len()))
                    } else {
                        Ok(Value::UNDEFINED)
                    }
                }
                _ if key == "length" => Ok(self.len().map(Value::from).unwrap_or(Value::UNDEFINED)),
                _ => Ok(Value::UNDEFINED),
            },
            _ => Ok(Value::UNDEFINED),
        }
    }

    /// Looks up an item by a subscript value.
    pub fn get_item(&self, key: &Value) -> Result<Value, Error> {
        match self.0 {
            Repr::Undefined | Repr::Null => Err(Error::new(
                ErrorKind::InvalidOperation,
                "tried to index an empty value",
            )),
            Repr::Shared(ref shared) => match **shared {
                Shared::Seq(ref items) => match key.0 {
                    Repr::I64(idx) => Ok(usize::try_from(idx)
                        .ok()
                        .and_then(|idx| items.get(idx))
                        .cloned()
                        .unwrap_or(Value::UNDEFINED)),
                    _ => Ok(Value::UNDEFINED),
                },
                Shared::Map(ref items) => {
                    if let Some(k) = key.as_str() {
                        Ok(items.get(k).cloned().unwrap_or(Value::UNDEFINED))
                    } else {
                        Ok(Value::UNDEFINED)
                    }
                }
                Shared::String(ref s) => match key.0 {
                    Repr::I64(idx) => Ok(usize::try_from(idx)
                        .ok()
                        .and_then(|idx| s.chars().nth(idx))
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or(Value::UNDEFINED)),
                    _ => Ok(Value::UNDEFINED),
                },
            },
            _ => Ok(Value::UNDEFINED),
        }
    }

    /// Iterates over the value.
    ///
    /// Sequences yield their items, strings their characters.  With
    /// `over_keys` maps yield their keys and sequences their indexes.
    pub(crate) fn iter_values(&self, over_keys: bool) -> Result<ValueIterator, Error> {
        let items: Vec<Value> = match self.0 {
            Repr::Shared(ref shared) => match **shared {
                Shared::Seq(ref items) => {
                    if over_keys {
                        (0..items.len()).map(Value::from).collect()
                    } else {
                        items.clone()
                    }
                }
                Shared::Map(ref items) => {
                    if over_keys {
                        items.keys().map(|k| Value::from(k.as_str())).collect()
                    } else {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            "maps are not iterable, iterate their keys instead",
                        ));
                    }
                }
                Shared::String(ref s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            },
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("value of type {:?} is not iterable", self.kind()),
                ))
            }
        };
        Ok(ValueIterator { items, idx: 0 })
    }

    /// Converts the value into a vector of values if it is a sequence.
    pub(crate) fn try_into_vec(self) -> Result<Vec<Value>, Error> {
        match self.0 {
            Repr::Shared(ref shared) => match **shared {
                Shared::Seq(ref items) => Ok(items.clone()),
                _ => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "cannot convert value into list",
                )),
            },
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                "cannot convert value into list",
            )),
        }
    }

    /// Returns the keys of a map context, if the value is a map.
    pub(crate) fn map_keys(&self) -> Option<Vec<String>> {
        match self.0 {
            Repr::Shared(ref shared) => match **shared {
                Shared::Map(ref items) => Some(items.keys().cloned().collect()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Iterates over a value.
pub(crate) struct ValueIterator {
    items: Vec<Value>,
    idx: usize,
}

impl Iterator for ValueIterator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let rv = self.items.get(self.idx).cloned();
        self.idx += 1;
        rv
    }
}

fn float_as_value(val: f64) -> Value {
    if val.fract() == 0.0 && val.is_finite() && val.abs() < 9007199254740992.0 {
        Value(Repr::I64(val as i64))
    } else {
        Value(Repr::F64(val))
    }
}

/// Implements the binary `+` operation on values.
///
/// Mirrors the semantics the templates were authored against: if either
/// operand is a string the operation concatenates, otherwise it adds.
pub(crate) fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if lhs.as_str().is_some() || rhs.as_str().is_some() {
        let mut rv = String::new();
        write!(rv, "{}{}", lhs, rhs).ok();
        return Ok(Value::from(rv));
    }
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => Ok(Value(Repr::I64(a.wrapping_add(b)))),
        Some(CoerceResult::F64(a, b)) => Ok(float_as_value(a + b)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            "tried to use + operator on unsupported types",
        )),
    }
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub(crate) fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => Ok(Value(Repr::I64(a.$int(b)))),
                Some(CoerceResult::F64(a, b)) => Ok(float_as_value(a $float b)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    concat!(
                        "tried to use ",
                        stringify!($float),
                        " operator on unsupported types"
                    ),
                )),
            }
        }
    };
}

math_binop!(sub, wrapping_sub, -);
math_binop!(mul, wrapping_mul, *);

/// Implements the binary `/` operation on values (always fractional).
pub(crate) fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => Ok(float_as_value(a as f64 / b as f64)),
        Some(CoerceResult::F64(a, b)) => Ok(float_as_value(a / b)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            "tried to use / operator on unsupported types",
        )),
    }
}

/// Implements the binary `%` operation on values.
pub(crate) fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => {
            if b == 0 {
                Err(Error::new(ErrorKind::InvalidOperation, "division by zero"))
            } else {
                Ok(Value(Repr::I64(a.wrapping_rem(b))))
            }
        }
        Some(CoerceResult::F64(a, b)) => Ok(float_as_value(a % b)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            "tried to use % operator on unsupported types",
        )),
    }
}

/// Implements an unary `neg` operation on value.
pub(crate) fn neg(val: &Value) -> Result<Value, Error> {
    match val.0 {
        Repr::I64(val) => Ok(Value(Repr::I64(-val))),
        Repr::F64(val) => Ok(Value(Repr::F64(-val))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            "cannot negate this value",
        )),
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.0 {
            Repr::Undefined | Repr::Null => serializer.serialize_unit(),
            Repr::Bool(b) => serializer.serialize_bool(*b),
            Repr::I64(i) => serializer.serialize_i64(*i),
            Repr::F64(f) => serializer.serialize_f64(*f),
            Repr::Shared(shared) => match &**shared {
                Shared::String(s) => serializer.serialize_str(s),
                Shared::Seq(items) => {
                    use serde::ser::SerializeSeq;
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Shared::Map(items) => {
                    use serde::ser::SerializeMap;
                    let mut map = serializer.serialize_map(Some(items.len()))?;
                    for (key, value) in items {
                        map.serialize_entry(key, value)?;
                    }
                    map.end()
                }
            },
        }
    }
}

struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value(Repr::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v)))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, Error> {
        if let Ok(v) = i64::try_from(v) {
            Ok(Value(Repr::I64(v)))
        } else {
            Ok(Value(Repr::F64(v as f64)))
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value(Repr::I64(v as i64)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        if let Ok(v) = i64::try_from(v) {
            Ok(Value(Repr::I64(v)))
        } else {
            Ok(Value(Repr::F64(v as f64)))
        }
    }

    fn serialize_u128(self, v: u128) -> Result<Value, Error> {
        if let Ok(v) = i64::try_from(v) {
            Ok(Value(Repr::I64(v)))
        } else {
            Ok(Value(Repr::F64(v as f64)))
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value(Repr::F64(v as f64)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value(Repr::F64(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v.to_string()))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, _value: &[u8]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::BadSerialization,
            "byte strings cannot be represented in the template context",
        ))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value(Repr::Null))
    }

    fn serialize_some<T: ?Sized>(self, value: &T) -> Result<Value, Error>
    where
        T: Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value(Repr::Null))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value(Repr::Null))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Error>
    where
        T: Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error>
    where
        T: Serialize,
    {
        let mut map = BTreeMap::new();
        map.insert(variant.to_string(), value.serialize(ValueSerializer)?);
        Ok(Value::from(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: BTreeMap::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(SerializeStruct {
            fields: BTreeMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: BTreeMap::new(),
        })
    }
}

struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.elements))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.elements))
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.elements))
    }
}

struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.fields.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut map = BTreeMap::new();
        map.insert(self.name.to_string(), Value::from(self.fields));
        Ok(Value::from(map))
    }
}

struct SerializeMap {
    entries: BTreeMap<String, Value>,
    key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: ?Sized>(&mut self, key: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        let key = key.serialize(ValueSerializer)?;
        match key.as_str() {
            Some(key) => {
                self.key = Some(key.to_string());
                Ok(())
            }
            None => match key.kind() {
                ValueKind::Number | ValueKind::Bool => {
                    self.key = Some(key.to_string());
                    Ok(())
                }
                _ => Err(Error::new(
                    ErrorKind::BadSerialization,
                    "map keys must be strings",
                )),
            },
        }
    }

    fn serialize_value<T: ?Sized>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        let key = self.key.take().expect("serialize_key must be called first");
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.entries))
    }
}

struct SerializeStruct {
    fields: BTreeMap<String, Value>,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.fields
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.fields))
    }
}

struct SerializeStructVariant {
    variant: &'static str,
    map: BTreeMap<String, Value>,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.map
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut rv = BTreeMap::new();
        rv.insert(self.variant.to_string(), Value::from(self.map));
        Ok(Value::from(rv))
    }
}

/// Helper trait representing valid function arguments.
pub trait ArgType: Sized {
    fn from_value(value: Option<Value>) -> Result<Self, Error>;
}

impl ArgType for Value {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        Ok(value.unwrap_or(Value::UNDEFINED))
    }
}

macro_rules! arg_type_try_from {
    ($($ty:ty)*) => {
        $(
            impl ArgType for $ty {
                fn from_value(value: Option<Value>) -> Result<Self, Error> {
                    match value {
                        Some(value) => TryFrom::try_from(value)
                            .map_err(|_| Error::from(ErrorKind::InvalidArguments)),
                        None => Err(Error::from(ErrorKind::InvalidArguments)),
                    }
                }
            }
        )*
    };
}

arg_type_try_from!(bool u8 u32 u64 i32 i64 usize f64 String);

impl<T: ArgType> ArgType for Option<T> {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            None => Ok(None),
            Some(value) if value.is_undefined() || value.is_null() => Ok(None),
            Some(value) => T::from_value(Some(value)).map(Some),
        }
    }
}

/// Helper trait for function arguments passed as tuple.
pub trait FunctionArgs: Sized {
    fn from_values(values: Vec<Value>) -> Result<Self, Error>;
}

impl FunctionArgs for Vec<Value> {
    fn from_values(values: Vec<Value>) -> Result<Self, Error> {
        Ok(values)
    }
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<$($name: ArgType,)*> FunctionArgs for ($($name,)*) {
            fn from_values(values: Vec<Value>) -> Result<Self, Error> {
                #![allow(non_snake_case, unused_mut, unused_variables)]
                let arg_count = 0 $(+ { stringify!($name); 1 })*;
                if values.len() > arg_count {
                    return Err(Error::new(
                        ErrorKind::InvalidArguments,
                        "received too many arguments",
                    ));
                }
                let mut iter = values.into_iter();
                $(let $name = ArgType::from_value(iter.next())?;)*
                Ok(($($name,)*))
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::UNDEFINED.to_string(), "");
        assert_eq!(Value::from(()).to_string(), "");
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(
            Value::from(vec![Value::from("a"), Value::from("b")]).to_string(),
            "a,b"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_true());
        assert!(!Value::from(0).is_true());
        assert!(!Value::UNDEFINED.is_true());
        assert!(Value::from("x").is_true());
        assert!(Value::from(Vec::<Value>::new()).is_true());
    }

    #[test]
    fn test_string_concat_add() {
        let rv = add(&Value::from("a"), &Value::from(1)).unwrap();
        assert_eq!(rv.as_str(), Some("a1"));
        let rv = add(&Value::from(1), &Value::from(2)).unwrap();
        assert_eq!(rv, Value::from(3));
    }

    #[test]
    fn test_division_is_fractional() {
        assert_eq!(div(&Value::from(7), &Value::from(2)).unwrap(), Value::from(3.5));
        assert_eq!(div(&Value::from(6), &Value::from(2)).unwrap(), Value::from(3));
    }

    #[test]
    fn test_from_serializable() {
        #[derive(serde::Serialize)]
        struct Project {
            title: String,
            tags: Vec<String>,
        }

        let value = Value::from_serializable(&Project {
            title: "demo".into(),
            tags: vec!["web".into()],
        })
        .unwrap();
        assert_eq!(value.get_attr("title").unwrap().as_str(), Some("demo"));
        assert_eq!(value.get_attr("tags").unwrap().len(), Some(1));
    }

    #[test]
    fn test_get_attr_on_empty_value_fails() {
        let err = Value::UNDEFINED.get_attr("name").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }
}
