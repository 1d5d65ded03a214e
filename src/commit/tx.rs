use crate::storage::types::{AttributeValue, Item};
use std::fmt;

/// Predicate over the currently stored item. A missing item behaves like an
/// item with no attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    Equals {
        attribute: String,
        value: AttributeValue,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeExists(attribute.into())
    }

    pub fn not_exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeNotExists(attribute.into())
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Condition::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::All(mut inner) => {
                inner.push(other);
                Condition::All(inner)
            }
            first => Condition::All(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Any(mut inner) => {
                inner.push(other);
                Condition::Any(inner)
            }
            first => Condition::Any(vec![first, other]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    Set(String, AttributeValue),
    Remove(String),
    /// Numeric increment; a missing attribute counts as zero.
    Add(String, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { item: Item },
    Update {
        key: AttributeValue,
        actions: Vec<UpdateAction>,
    },
    Delete { key: AttributeValue },
}

/// One member of a multi-item transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteItem {
    pub table: String,
    pub op: WriteOp,
    pub condition: Option<Condition>,
    /// Report the stored item in the cancellation reason if `condition` fails.
    pub return_old_on_condition_failure: bool,
}

impl WriteItem {
    pub fn put(table: impl Into<String>, item: Item) -> Self {
        Self::new(table, WriteOp::Put { item })
    }

    pub fn update(
        table: impl Into<String>,
        key: impl Into<AttributeValue>,
        actions: Vec<UpdateAction>,
    ) -> Self {
        Self::new(
            table,
            WriteOp::Update {
                key: key.into(),
                actions,
            },
        )
    }

    pub fn delete(table: impl Into<String>, key: impl Into<AttributeValue>) -> Self {
        Self::new(table, WriteOp::Delete { key: key.into() })
    }

    fn new(table: impl Into<String>, op: WriteOp) -> Self {
        Self {
            table: table.into(),
            op,
            condition: None,
            return_old_on_condition_failure: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn returning_old_on_failure(mut self) -> Self {
        self.return_old_on_condition_failure = true;
        self
    }

    /// The primary-key value this write targets, given the table's key attribute.
    pub fn key<'a>(&'a self, key_attribute: &str) -> Option<&'a AttributeValue> {
        match &self.op {
            WriteOp::Put { item } => item.get(key_attribute),
            WriteOp::Update { key, .. } | WriteOp::Delete { key } => Some(key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationCode {
    None,
    ConditionalCheckFailed,
    TransactionConflict,
}

impl CancellationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            CancellationCode::None => "None",
            CancellationCode::ConditionalCheckFailed => "ConditionalCheckFailed",
            CancellationCode::TransactionConflict => "TransactionConflict",
        }
    }
}

impl fmt::Display for CancellationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationReason {
    pub code: CancellationCode,
    pub item: Option<Item>,
}

impl CancellationReason {
    pub fn new(code: CancellationCode, item: Option<Item>) -> Self {
        Self { code, item }
    }

    pub fn none() -> Self {
        Self::new(CancellationCode::None, None)
    }

    pub fn is_condition_failure(&self) -> bool {
        self.code == CancellationCode::ConditionalCheckFailed
    }

    pub fn is_conflict(&self) -> bool {
        self.code == CancellationCode::TransactionConflict
    }
}
