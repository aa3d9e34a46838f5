//! Query conditions
//!
//! A condition set separates key conditions (which drive access-path
//! selection) from filter conditions (applied after the key read). Key
//! conditions are restricted: at most one per attribute, and only
//! comparators a sorted key can serve.

use crate::wire::WireValue;

use super::errors::{PlannerError, PlannerResult};

/// Comparison operators for query conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Inclusive on both bounds
    Between,
    BeginsWith,
    Contains,
    In,
}

impl Comparison {
    /// Returns the operator's wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "EQ",
            Comparison::Ne => "NE",
            Comparison::Lt => "LT",
            Comparison::Le => "LE",
            Comparison::Gt => "GT",
            Comparison::Ge => "GE",
            Comparison::Between => "BETWEEN",
            Comparison::BeginsWith => "BEGINS_WITH",
            Comparison::Contains => "CONTAINS",
            Comparison::In => "IN",
        }
    }

    /// True iff a sorted range key can serve this comparator
    pub fn range_eligible(&self) -> bool {
        matches!(
            self,
            Comparison::Eq
                | Comparison::Lt
                | Comparison::Le
                | Comparison::Gt
                | Comparison::Ge
                | Comparison::Between
                | Comparison::BeginsWith
        )
    }

    /// Number of operand values the comparator takes
    pub fn arity(&self) -> usize {
        match self {
            Comparison::Between => 2,
            // IN takes one or more; arity is the minimum
            _ => 1,
        }
    }
}

/// One condition: attribute, comparator, operands
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Target attribute name
    pub attribute: String,
    /// Comparator
    pub comparison: Comparison,
    /// Operand values in wire form
    pub values: Vec<WireValue>,
}

impl Condition {
    /// Builds a condition, checking operand arity
    pub fn new(
        attribute: impl Into<String>,
        comparison: Comparison,
        values: Vec<WireValue>,
    ) -> PlannerResult<Self> {
        let attribute = attribute.into();
        if values.len() < comparison.arity() {
            return Err(PlannerError::invalid_condition(format!(
                "{} on '{}' takes at least {} operand(s), got {}",
                comparison.as_str(),
                attribute,
                comparison.arity(),
                values.len()
            )));
        }
        if comparison == Comparison::Between && values.len() != 2 {
            return Err(PlannerError::invalid_condition(format!(
                "BETWEEN on '{}' takes exactly 2 operands, got {}",
                attribute,
                values.len()
            )));
        }
        Ok(Self {
            attribute,
            comparison,
            values,
        })
    }

    /// Equality condition
    pub fn eq(attribute: impl Into<String>, value: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Eq,
            values: vec![value],
        }
    }

    /// Less-than condition
    pub fn lt(attribute: impl Into<String>, value: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Lt,
            values: vec![value],
        }
    }

    /// Less-or-equal condition
    pub fn le(attribute: impl Into<String>, value: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Le,
            values: vec![value],
        }
    }

    /// Greater-than condition
    pub fn gt(attribute: impl Into<String>, value: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Gt,
            values: vec![value],
        }
    }

    /// Greater-or-equal condition
    pub fn ge(attribute: impl Into<String>, value: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Ge,
            values: vec![value],
        }
    }

    /// Inclusive between condition
    pub fn between(attribute: impl Into<String>, low: WireValue, high: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::Between,
            values: vec![low, high],
        }
    }

    /// String prefix condition
    pub fn begins_with(attribute: impl Into<String>, prefix: WireValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparison: Comparison::BeginsWith,
            values: vec![prefix],
        }
    }
}

/// Key conditions and filter conditions for one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    key_conditions: Vec<Condition>,
    filters: Vec<Condition>,
}

impl ConditionSet {
    /// Empty condition set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key condition.
    ///
    /// At most one key condition per attribute; a comparator no sorted
    /// key can serve is rejected here rather than at selection time.
    pub fn key(mut self, condition: Condition) -> PlannerResult<Self> {
        if !condition.comparison.range_eligible() {
            return Err(PlannerError::invalid_condition(format!(
                "{} on '{}' cannot drive a key",
                condition.comparison.as_str(),
                condition.attribute
            )));
        }
        if self
            .key_conditions
            .iter()
            .any(|existing| existing.attribute == condition.attribute)
        {
            return Err(PlannerError::invalid_condition(format!(
                "duplicate key condition on '{}'",
                condition.attribute
            )));
        }
        self.key_conditions.push(condition);
        Ok(self)
    }

    /// Adds a filter condition, applied after the key read
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Key conditions in the order added
    pub fn key_conditions(&self) -> &[Condition] {
        &self.key_conditions
    }

    /// Filter conditions in the order added
    pub fn filters(&self) -> &[Condition] {
        &self.filters
    }

    /// Looks up the key condition targeting an attribute
    pub fn key_condition_for(&self, attribute: &str) -> Option<&Condition> {
        self.key_conditions
            .iter()
            .find(|condition| condition.attribute == attribute)
    }
}
