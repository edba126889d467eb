//! Tagged values held by the store.
//!
//! Floats compare with IEEE total ordering, so every value equals itself
//! (including NaN) and diffing never reports a spurious change.

use std::cmp::Ordering;

use im::{OrdSet, Vector};
use serde::{Deserialize, Serialize};

/// Element type for store containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Primitive {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(#[serde(with = "float_repr")] f32),
    String(String),
    Enum(i32),
}

impl Primitive {
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Bool(_) => "Bool",
            Primitive::Int(_) => "Int",
            Primitive::UInt(_) => "UInt",
            Primitive::Float(_) => "Float",
            Primitive::String(_) => "String",
            Primitive::Enum(_) => "Enum",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Primitive::Bool(_) => 0,
            Primitive::Int(_) => 1,
            Primitive::UInt(_) => 2,
            Primitive::Float(_) => 3,
            Primitive::String(_) => 4,
            Primitive::Enum(_) => 5,
        }
    }
}

impl Ord for Primitive {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Primitive::Bool(a), Primitive::Bool(b)) => a.cmp(b),
            (Primitive::Int(a), Primitive::Int(b)) => a.cmp(b),
            (Primitive::UInt(a), Primitive::UInt(b)) => a.cmp(b),
            (Primitive::Float(a), Primitive::Float(b)) => a.total_cmp(b),
            (Primitive::String(a), Primitive::String(b)) => a.cmp(b),
            (Primitive::Enum(a), Primitive::Enum(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Primitive {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Primitive {}

/// Row-major 2-D matrix of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixShape")]
pub struct Matrix {
    pub data: Vector<Primitive>,
    pub row_count: usize,
}

#[derive(Deserialize)]
struct MatrixShape {
    data: Vector<Primitive>,
    row_count: usize,
}

impl TryFrom<MatrixShape> for Matrix {
    type Error = String;

    fn try_from(shape: MatrixShape) -> Result<Self, Self::Error> {
        let cells = shape.data.len();
        let rows = shape.row_count;
        Matrix::new(rows, shape.data)
            .ok_or_else(|| format!("matrix of {cells} cells cannot have {rows} rows"))
    }
}

impl Matrix {
    /// Returns `None` unless `data.len()` is a multiple of `row_count`.
    pub fn new(row_count: usize, data: Vector<Primitive>) -> Option<Self> {
        if row_count == 0 {
            return data.is_empty().then_some(Self { data, row_count });
        }
        (data.len() % row_count == 0).then_some(Self { data, row_count })
    }

    pub fn col_count(&self) -> usize {
        if self.row_count == 0 {
            0
        } else {
            self.data.len() / self.row_count
        }
    }

    /// Flat index of `(row, col)`, if in range.
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.row_count && col < self.col_count()).then(|| row * self.col_count() + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Primitive> {
        self.index_of(row, col).and_then(|i| self.data.get(i))
    }
}

/// JSON has no literal for NaN or the infinities, so non-finite floats are
/// written as the strings `"NaN"`, `"-NaN"`, `"inf"` and `"-inf"`.
mod float_repr {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            return serializer.serialize_f32(*value);
        }
        let text = match (value.is_nan(), value.is_sign_negative()) {
            (true, false) => "NaN",
            (true, true) => "-NaN",
            (false, false) => "inf",
            (false, true) => "-inf",
        };
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f32;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"-NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f32, E> {
            match v {
                "NaN" => Ok(f32::NAN),
                "-NaN" => Ok(-f32::NAN),
                "inf" => Ok(f32::INFINITY),
                "-inf" => Ok(f32::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

/// A tagged store entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(#[serde(with = "float_repr")] f32),
    String(String),
    Enum(i32),
    Vector(Vector<Primitive>),
    Set(OrdSet<Primitive>),
    Matrix(Matrix),
}

impl StoreValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreValue::Bool(_) => "Bool",
            StoreValue::Int(_) => "Int",
            StoreValue::UInt(_) => "UInt",
            StoreValue::Float(_) => "Float",
            StoreValue::String(_) => "String",
            StoreValue::Enum(_) => "Enum",
            StoreValue::Vector(_) => "Vector",
            StoreValue::Set(_) => "Set",
            StoreValue::Matrix(_) => "Matrix",
        }
    }

    /// The scalar held by this entry, or `None` for containers.
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            StoreValue::Bool(v) => Some(Primitive::Bool(*v)),
            StoreValue::Int(v) => Some(Primitive::Int(*v)),
            StoreValue::UInt(v) => Some(Primitive::UInt(*v)),
            StoreValue::Float(v) => Some(Primitive::Float(*v)),
            StoreValue::String(v) => Some(Primitive::String(v.clone())),
            StoreValue::Enum(v) => Some(Primitive::Enum(*v)),
            StoreValue::Vector(_) | StoreValue::Set(_) | StoreValue::Matrix(_) => None,
        }
    }
}

impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StoreValue::Bool(a), StoreValue::Bool(b)) => a == b,
            (StoreValue::Int(a), StoreValue::Int(b)) => a == b,
            (StoreValue::UInt(a), StoreValue::UInt(b)) => a == b,
            (StoreValue::Float(a), StoreValue::Float(b)) => a.total_cmp(b).is_eq(),
            (StoreValue::String(a), StoreValue::String(b)) => a == b,
            (StoreValue::Enum(a), StoreValue::Enum(b)) => a == b,
            (StoreValue::Vector(a), StoreValue::Vector(b)) => a == b,
            (StoreValue::Set(a), StoreValue::Set(b)) => a == b,
            (StoreValue::Matrix(a), StoreValue::Matrix(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Primitive> for StoreValue {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Bool(v) => StoreValue::Bool(v),
            Primitive::Int(v) => StoreValue::Int(v),
            Primitive::UInt(v) => StoreValue::UInt(v),
            Primitive::Float(v) => StoreValue::Float(v),
            Primitive::String(v) => StoreValue::String(v),
            Primitive::Enum(v) => StoreValue::Enum(v),
        }
    }
}

macro_rules! impl_from_scalar {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Primitive {
            fn from(v: $ty) -> Self {
                Primitive::$variant(v)
            }
        }

        impl From<$ty> for StoreValue {
            fn from(v: $ty) -> Self {
                StoreValue::$variant(v)
            }
        }
    };
}

impl_from_scalar!(bool, Bool);
impl_from_scalar!(i32, Int);
impl_from_scalar!(u32, UInt);
impl_from_scalar!(f32, Float);
impl_from_scalar!(String, String);

impl From<&str> for StoreValue {
    fn from(v: &str) -> Self {
        StoreValue::String(v.to_string())
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::String(v.to_string())
    }
}

/// Index of the selected variant of an enum-typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumIndex(pub i32);

/// Typed read of a store entry.
pub trait FromStoreValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_store_value(value: &StoreValue) -> Option<Self>;
}

impl FromStoreValue for bool {
    const TYPE_NAME: &'static str = "Bool";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromStoreValue for i32 {
    const TYPE_NAME: &'static str = "Int";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromStoreValue for u32 {
    const TYPE_NAME: &'static str = "UInt";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::UInt(v) => Some(*v),
            _ => None,
        }
    }
}

/// Integer-tagged entries are accepted for float fields: naive JSON writers
/// emit `1` for `1.0`.
impl FromStoreValue for f32 {
    const TYPE_NAME: &'static str = "Float";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Float(v) => Some(*v),
            StoreValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl FromStoreValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromStoreValue for EnumIndex {
    const TYPE_NAME: &'static str = "Enum";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Enum(v) => Some(EnumIndex(*v)),
            _ => None,
        }
    }
}

impl FromStoreValue for Vector<Primitive> {
    const TYPE_NAME: &'static str = "Vector";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Vector(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromStoreValue for OrdSet<Primitive> {
    const TYPE_NAME: &'static str = "Set";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Set(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromStoreValue for Matrix {
    const TYPE_NAME: &'static str = "Matrix";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        match value {
            StoreValue::Matrix(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromStoreValue for StoreValue {
    const TYPE_NAME: &'static str = "any";

    fn from_store_value(value: &StoreValue) -> Option<Self> {
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_total() {
        assert_eq!(StoreValue::Float(f32::NAN), StoreValue::Float(f32::NAN));
        assert_ne!(StoreValue::Float(0.0), StoreValue::Float(-0.0));
        assert_ne!(StoreValue::Float(1.0), StoreValue::Int(1));
    }

    #[test]
    fn non_finite_floats_survive_json() {
        for v in [f32::NAN, -f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let value = StoreValue::Float(v);
            let json = serde_json::to_string(&value).unwrap();
            let back: StoreValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value, "{json}");

            let item = Primitive::Float(v);
            let json = serde_json::to_string(&item).unwrap();
            assert_eq!(serde_json::from_str::<Primitive>(&json).unwrap(), item);
        }
        assert_eq!(
            serde_json::to_string(&StoreValue::Float(f32::NAN)).unwrap(),
            r#"{"Float":"NaN"}"#
        );
        assert_eq!(
            serde_json::from_str::<StoreValue>(r#"{"Float":0.1}"#).unwrap(),
            StoreValue::Float(0.1)
        );
        assert!(serde_json::from_str::<StoreValue>(r#"{"Float":"nan"}"#).is_err());
        assert!(serde_json::from_str::<StoreValue>(r#"{"Float":null}"#).is_err());
    }

    #[test]
    fn matrix_shape_is_checked_on_load() {
        let ok = r#"{"Matrix":{"data":[{"Int":1},{"Int":2},{"Int":3},{"Int":4}],"row_count":2}}"#;
        let value: StoreValue = serde_json::from_str(ok).unwrap();
        assert!(matches!(&value, StoreValue::Matrix(m) if m.col_count() == 2));

        let ragged = r#"{"Matrix":{"data":[{"Int":1},{"Int":2},{"Int":3}],"row_count":2}}"#;
        let err = serde_json::from_str::<StoreValue>(ragged).unwrap_err();
        assert!(err.to_string().contains("cannot have 2 rows"), "{err}");
    }

    #[test]
    fn primitive_order_groups_by_type() {
        let mut items = vec![
            Primitive::from("b"),
            Primitive::Int(3),
            Primitive::Bool(true),
            Primitive::Int(-1),
        ];
        items.sort();
        assert_eq!(
            items,
            vec![
                Primitive::Bool(true),
                Primitive::Int(-1),
                Primitive::Int(3),
                Primitive::from("b"),
            ]
        );
    }

    #[test]
    fn float_read_accepts_int() {
        assert_eq!(f32::from_store_value(&StoreValue::Int(2)), Some(2.0));
        assert_eq!(f32::from_store_value(&StoreValue::Float(0.25)), Some(0.25));
        assert_eq!(f32::from_store_value(&StoreValue::UInt(2)), None);
        // Leniency is one-way.
        assert_eq!(i32::from_store_value(&StoreValue::Float(2.0)), None);
    }

    #[test]
    fn matrix_shape() {
        let data: Vector<Primitive> = (0..6).map(Primitive::Int).collect();
        let m = Matrix::new(2, data.clone()).unwrap();
        assert_eq!(m.col_count(), 3);
        assert_eq!(m.index_of(1, 2), Some(5));
        assert_eq!(m.get(1, 0), Some(&Primitive::Int(3)));
        assert_eq!(m.index_of(2, 0), None);
        assert!(Matrix::new(4, data).is_none());
    }

    #[test]
    fn serde_is_tagged() {
        let json = serde_json::to_string(&StoreValue::Float(0.5)).unwrap();
        assert_eq!(json, r#"{"Float":0.5}"#);
        let set: OrdSet<Primitive> = [Primitive::Int(2), Primitive::Int(1)].into_iter().collect();
        let value = StoreValue::Set(set);
        let back: StoreValue = serde_json::from_str(&serde_json::to_string(&value).unwrap()).unwrap();
        assert_eq!(back, value);
    }
}
