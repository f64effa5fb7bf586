//! Snapshot model of the persistent interpreter namespace.
//!
//! The interpreter describes every binding as a [`Value`]. Values that cannot
//! be mirrored faithfully (instances of arbitrary classes, huge ints, very
//! large containers) arrive as [`Value::Object`] carrying their MRO, which is
//! enough for nominal and builtin type checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved name holding `completed` or `failed` after a terminal block runs.
pub const STEP_STATUS: &str = "step_status";
/// Reserved name holding the step's answer text after a terminal block runs.
pub const FINAL_ANSWER: &str = "final_answer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    None,
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    Str {
        value: String,
    },
    List {
        items: Vec<Value>,
    },
    Tuple {
        items: Vec<Value>,
    },
    Set {
        items: Vec<Value>,
        #[serde(default)]
        frozen: bool,
    },
    Dict {
        entries: Vec<(Value, Value)>,
    },
    Module {
        name: String,
    },
    /// A class object, e.g. `pandas.core.frame.DataFrame`.
    Type {
        qualname: String,
    },
    Object {
        type_name: String,
        /// Qualified names (`module.QualName`) of the runtime type's MRO.
        #[serde(default)]
        mro: Vec<String>,
        #[serde(default)]
        repr: String,
    },
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str {
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Value::Int { value }
    }

    /// Runtime type name as Python would report it via `type(v).__name__`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool { .. } => "bool",
            Value::Int { .. } => "int",
            Value::Float { .. } => "float",
            Value::Str { .. } => "str",
            Value::List { .. } => "list",
            Value::Tuple { .. } => "tuple",
            Value::Set { frozen: false, .. } => "set",
            Value::Set { frozen: true, .. } => "frozenset",
            Value::Dict { .. } => "dict",
            Value::Module { .. } => "module",
            Value::Type { .. } => "type",
            Value::Object { type_name, .. } => type_name,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str { value } => Some(value),
            _ => None,
        }
    }

    /// Whether the runtime type is, or derives from, `qualname`.
    ///
    /// Mirrored builtins answer for their own builtin class (plus `int` for
    /// `bool`); opaque objects answer from their MRO.
    pub fn is_instance_of(&self, qualname: &str) -> bool {
        if qualname == "builtins.object" {
            return true;
        }
        match self {
            Value::Object { mro, .. } => mro.iter().any(|entry| entry == qualname),
            Value::Bool { .. } => matches!(qualname, "builtins.bool" | "builtins.int"),
            Value::Module { .. } => qualname == "types.ModuleType",
            other => qualname
                .strip_prefix("builtins.")
                .is_some_and(|name| name == other.type_name()),
        }
    }
}

/// Name → value bindings of the persistent interpreter namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    entries: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// String value bound to `name`, if any.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

impl FromIterator<(String, Value)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
