//! Value types carried by nodes and their sub-item families.

use serde::{Deserialize, Serialize};

/// Canvas position of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Name of an input slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputName {
    Primary,
    Secondary,
}

impl InputName {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputName::Primary => "primary",
            InputName::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for InputName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either a reference to a column or a literal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Column(String),
    Constant(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Constant(String::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Utf8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateComputation {
    Count,
    First,
    Group,
    Last,
    Max,
    Mean,
    Median,
    Min,
    Sum,
}

/// One output column of an aggregate node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub column: String,
    pub computation: AggregateComputation,
    pub alias: String,
}

/// One branch of a conditional-case node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub column: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "param", rename_all = "snake_case")]
pub enum ComputeOperation {
    Add(Value),
    Subtract(Value),
    Multiply(Value),
    Divide(Value),
    IsEqualTo(Value),
    IsNotEqualTo(Value),
    IsLessThan(Value),
    IsLessThanEqual(Value),
    IsGreaterThan(Value),
    IsGreaterThanEqual(Value),
    IsNull,
    IsNotNull,
    And(Value),
    Or(Value),
    Xor(Value),
    Mean,
    Median,
    Min,
    Max,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "param", rename_all = "snake_case")]
pub enum FilterPredicate {
    IsEqualTo(Value),
    IsNotEqualTo(Value),
    IsLessThan(Value),
    IsLessThanEqual(Value),
    IsGreaterThan(Value),
    IsGreaterThanEqual(Value),
    IsNull,
    IsNotNull,
    And(Value),
    Or(Value),
    Xor(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Left,
    Right,
    Inner,
    Full,
    Cross,
}

/// A pair of columns matched by a join.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub left: String,
    pub right: String,
}

/// A projected column with an optional alias.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectColumn {
    pub column: String,
    pub alias: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
    pub column: String,
    pub direction: SortDirection,
}
