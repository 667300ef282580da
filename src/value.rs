//! Runtime-agnostic value model
//!
//! Everything the hook engine pulls out of a traced frame is expressed as a
//! [`Value`]. Data categories are recorded, the non-data categories (types,
//! builtins, modules, callables) are skipped by default, and the live
//! categories (open handles, generators, foreign objects) can never be
//! content-addressed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EvalError;

/// A snapshot of a value in the traced runtime
///
/// Values are owned trees, so cloning one produces an independent deep copy
/// that later mutation in the traced program cannot reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Unordered; the addresser normalizes element order before hashing
    Set(Vec<Value>),
    /// Insertion ordered, like the host runtime's mapping type
    Map(Vec<(Value, Value)>),
    /// Dense row-major numeric array
    Array { shape: Vec<usize>, data: Vec<f64> },
    Object {
        class: String,
        module: String,
        fields: BTreeMap<String, Value>,
    },
    Type { name: String, module: String },
    Builtin { name: String },
    Module {
        name: String,
        members: BTreeMap<String, Value>,
    },
    Callable { name: String, module: String },
    Handle { description: String },
    Generator { name: String },
    Foreign { runtime: String, repr: String },
}

/// Coarse classification of a [`Value`], used by skip sets and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueCategory {
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Tuple,
    Set,
    Map,
    Array,
    Object,
    Type,
    Builtin,
    Module,
    Callable,
    Handle,
    Generator,
    Foreign,
}

impl ValueCategory {
    /// Categories that describe program structure rather than computed data
    pub const NON_DATA: [ValueCategory; 4] = [
        ValueCategory::Type,
        ValueCategory::Builtin,
        ValueCategory::Module,
        ValueCategory::Callable,
    ];

    /// Whether values of this category can ever be serialized
    pub fn is_addressable(self) -> bool {
        !matches!(
            self,
            ValueCategory::Handle | ValueCategory::Generator | ValueCategory::Foreign
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueCategory::None => "none",
            ValueCategory::Bool => "bool",
            ValueCategory::Int => "int",
            ValueCategory::Float => "float",
            ValueCategory::Str => "str",
            ValueCategory::Bytes => "bytes",
            ValueCategory::List => "list",
            ValueCategory::Tuple => "tuple",
            ValueCategory::Set => "set",
            ValueCategory::Map => "map",
            ValueCategory::Array => "array",
            ValueCategory::Object => "object",
            ValueCategory::Type => "type",
            ValueCategory::Builtin => "builtin",
            ValueCategory::Module => "module",
            ValueCategory::Callable => "callable",
            ValueCategory::Handle => "handle",
            ValueCategory::Generator => "generator",
            ValueCategory::Foreign => "foreign",
        }
    }
}

impl fmt::Display for ValueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module names that never count as an import of the traced program
const NON_IMPORT_MODULES: [&str; 2] = ["builtins", "__main__"];

impl Value {
    pub fn category(&self) -> ValueCategory {
        match self {
            Value::None => ValueCategory::None,
            Value::Bool(_) => ValueCategory::Bool,
            Value::Int(_) => ValueCategory::Int,
            Value::Float(_) => ValueCategory::Float,
            Value::Str(_) => ValueCategory::Str,
            Value::Bytes(_) => ValueCategory::Bytes,
            Value::List(_) => ValueCategory::List,
            Value::Tuple(_) => ValueCategory::Tuple,
            Value::Set(_) => ValueCategory::Set,
            Value::Map(_) => ValueCategory::Map,
            Value::Array { .. } => ValueCategory::Array,
            Value::Object { .. } => ValueCategory::Object,
            Value::Type { .. } => ValueCategory::Type,
            Value::Builtin { .. } => ValueCategory::Builtin,
            Value::Module { .. } => ValueCategory::Module,
            Value::Callable { .. } => ValueCategory::Callable,
            Value::Handle { .. } => ValueCategory::Handle,
            Value::Generator { .. } => ValueCategory::Generator,
            Value::Foreign { .. } => ValueCategory::Foreign,
        }
    }

    /// Build a dense array, row-major
    pub fn array(shape: impl Into<Vec<usize>>, data: impl Into<Vec<f64>>) -> Self {
        Value::Array {
            shape: shape.into(),
            data: data.into(),
        }
    }

    /// Build an instance of a user or library class
    pub fn object<I, K>(class: &str, module: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object {
            class: class.to_string(),
            module: module.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Build a module value with the given members
    pub fn module<I, K>(name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Module {
            name: name.to_string(),
            members: members.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Name of this value's type as the host runtime would print it
    pub fn type_name(&self) -> &str {
        match self {
            Value::Object { class, .. } => class,
            Value::Foreign { runtime, .. } => runtime,
            other => other.category().as_str(),
        }
    }

    /// First category inside this value (itself included) that cannot be
    /// content-addressed
    pub fn find_unaddressable(&self) -> Option<ValueCategory> {
        match self {
            Value::Handle { .. } | Value::Generator { .. } | Value::Foreign { .. } => {
                Some(self.category())
            }
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                items.iter().find_map(Value::find_unaddressable)
            }
            Value::Map(entries) => entries
                .iter()
                .find_map(|(k, v)| k.find_unaddressable().or_else(|| v.find_unaddressable())),
            Value::Object { fields, .. } => fields.values().find_map(Value::find_unaddressable),
            Value::Module { members, .. } => members.values().find_map(Value::find_unaddressable),
            _ => None,
        }
    }

    /// Root package of the module that defines this value, if it names one
    /// that the traced program must have imported
    pub fn defining_package(&self) -> Option<&str> {
        let module = match self {
            Value::Module { name, .. } => name,
            Value::Type { module, .. }
            | Value::Callable { module, .. }
            | Value::Object { module, .. } => module,
            _ => return None,
        };
        let root = module.split('.').next().unwrap_or(module);
        if root.is_empty() || NON_IMPORT_MODULES.contains(&root) {
            return None;
        }
        Some(root)
    }

    /// Attribute access, `owner.attribute`
    pub fn attribute(&self, attribute: &str) -> Result<Value, EvalError> {
        let found = match (self, attribute) {
            (Value::Object { fields, .. }, name) => fields.get(name).cloned(),
            (Value::Module { members, .. }, name) => members.get(name).cloned(),
            (Value::Array { shape, data }, "T") => transposed(shape, data).map(|(shape, data)| {
                Value::Array { shape, data }
            }),
            (Value::Array { shape, .. }, "shape") => Some(Value::Tuple(
                shape.iter().map(|&d| Value::Int(d as i64)).collect(),
            )),
            (Value::Array { data, .. }, "size") => Some(Value::Int(data.len() as i64)),
            (Value::Array { shape, .. }, "ndim") => Some(Value::Int(shape.len() as i64)),
            (Value::Type { name, .. } | Value::Callable { name, .. }, "__name__") => {
                Some(Value::Str(name.clone()))
            }
            (Value::Type { module, .. } | Value::Callable { module, .. }, "__module__") => {
                Some(Value::Str(module.clone()))
            }
            _ => None,
        };
        found.ok_or_else(|| EvalError::NoAttribute {
            owner: self.type_name().to_string(),
            attribute: attribute.to_string(),
        })
    }
}

/// Reverse the axes of a row-major array; `None` if shape and data disagree
fn transposed(shape: &[usize], data: &[f64]) -> Option<(Vec<usize>, Vec<f64>)> {
    if shape.iter().product::<usize>() != data.len() {
        return None;
    }
    if shape.len() < 2 {
        return Some((shape.to_vec(), data.to_vec()));
    }

    let rank = shape.len();
    let mut strides = vec![1usize; rank];
    for axis in (0..rank - 1).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let out_shape: Vec<usize> = shape.iter().rev().copied().collect();
    let mut index = vec![0usize; rank];
    let mut out = Vec::with_capacity(data.len());
    for _ in 0..data.len() {
        let offset: usize = index
            .iter()
            .enumerate()
            .map(|(k, i)| i * strides[rank - 1 - k])
            .sum();
        out.push(data[offset]);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < out_shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Some((out_shape, out))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_of_non_data_values() {
        let ty = Value::Type {
            name: "int".into(),
            module: "builtins".into(),
        };
        assert_eq!(ty.category(), ValueCategory::Type);
        assert!(ValueCategory::NON_DATA.contains(&ty.category()));
        assert!(!ValueCategory::NON_DATA.contains(&Value::Int(1).category()));
    }

    #[test]
    fn test_find_unaddressable_nested() {
        let handle = Value::Handle {
            description: "<open file 'data.csv'>".into(),
        };
        let nested = Value::Map(vec![(Value::from("f"), Value::List(vec![handle]))]);
        assert_eq!(nested.find_unaddressable(), Some(ValueCategory::Handle));
        assert_eq!(Value::from(vec![Value::Int(1)]).find_unaddressable(), None);
    }

    #[test]
    fn test_transpose_two_by_three() {
        let arr = Value::array(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = arr.attribute("T").unwrap();
        assert_eq!(
            t,
            Value::array(vec![3, 2], vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0])
        );
        assert_eq!(t.attribute("T").unwrap(), arr);
    }

    #[test]
    fn test_transpose_malformed_array_fails() {
        let arr = Value::array(vec![2, 2], vec![1.0]);
        assert!(matches!(
            arr.attribute("T"),
            Err(EvalError::NoAttribute { .. })
        ));
    }

    #[test]
    fn test_array_shape_attributes() {
        let arr = Value::array(vec![2, 3], vec![0.0; 6]);
        assert_eq!(
            arr.attribute("shape").unwrap(),
            Value::Tuple(vec![Value::Int(2), Value::Int(3)])
        );
        assert_eq!(arr.attribute("size").unwrap(), Value::Int(6));
        assert_eq!(arr.attribute("ndim").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_missing_attribute_names_owner() {
        let obj = Value::object("Point", "__main__", [("x", Value::Int(1))]);
        assert_eq!(obj.attribute("x").unwrap(), Value::Int(1));
        assert_eq!(
            obj.attribute("y"),
            Err(EvalError::NoAttribute {
                owner: "Point".into(),
                attribute: "y".into()
            })
        );
    }

    #[test]
    fn test_defining_package() {
        let np = Value::module("numpy.linalg", Vec::<(String, Value)>::new());
        assert_eq!(np.defining_package(), Some("numpy"));

        let local = Value::Type {
            name: "Foo".into(),
            module: "__main__".into(),
        };
        assert_eq!(local.defining_package(), None);
        assert_eq!(Value::Int(3).defining_package(), None);
    }
}
