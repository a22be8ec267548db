//! Filter conditions and evaluation types.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::value::{FieldValue, Fields, RowId, int_field, text_field};

/// How the conditions of a filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum EvalType {
    /// Conditions of the same type are or-ed; groups are and-ed.
    #[default]
    AndOr,
    /// All conditions are and-ed.
    And,
    /// All conditions are or-ed.
    Or,
    /// The caller supplies a custom boolean formula.
    Expression,
}

impl EvalType {
    /// Storage code of the evaluation type.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::AndOr => 0,
            Self::And => 1,
            Self::Or => 2,
            Self::Expression => 3,
        }
    }

    /// Whether the filter uses a caller-supplied formula.
    #[must_use]
    pub const fn is_expression(self) -> bool {
        matches!(self, Self::Expression)
    }
}

impl TryFrom<i64> for EvalType {
    type Error = ModelError;

    fn try_from(code: i64) -> ModelResult<Self> {
        match code {
            0 => Ok(Self::AndOr),
            1 => Ok(Self::And),
            2 => Ok(Self::Or),
            3 => Ok(Self::Expression),
            other => Err(ModelError::UnknownEvalType { code: other }),
        }
    }
}

impl From<EvalType> for i64 {
    fn from(value: EvalType) -> Self {
        value.code()
    }
}

/// Condition type code (what attribute the condition inspects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionType(i64);

impl ConditionType {
    /// Host group.
    pub const HOST_GROUP: Self = Self(0);
    /// Host.
    pub const HOST: Self = Self(1);
    /// Trigger.
    pub const TRIGGER: Self = Self(2);
    /// Event name.
    pub const EVENT_NAME: Self = Self(3);
    /// Trigger severity.
    pub const TRIGGER_SEVERITY: Self = Self(4);
    /// Time period.
    pub const TIME_PERIOD: Self = Self(6);
    /// Host template.
    pub const TEMPLATE: Self = Self(13);
    /// Problem is suppressed. Carries no value.
    pub const SUPPRESSED: Self = Self(16);
    /// Event tag.
    pub const EVENT_TAG: Self = Self(25);
    /// Event tag value. The tag name lives in `value2`.
    pub const EVENT_TAG_VALUE: Self = Self(26);

    /// Wrap a raw condition type code.
    #[must_use]
    pub const fn new(code: i64) -> Self {
        Self(code)
    }

    /// Raw condition type code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self.0
    }
}

/// Comparison operator code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operator(i64);

impl Operator {
    /// Equals.
    pub const EQUAL: Self = Self(0);
    /// Does not equal.
    pub const NOT_EQUAL: Self = Self(1);
    /// Contains.
    pub const LIKE: Self = Self(2);
    /// Does not contain.
    pub const NOT_LIKE: Self = Self(3);
    /// Regular expression match.
    pub const REGEXP: Self = Self(8);
    /// Negated regular expression match.
    pub const NOT_REGEXP: Self = Self(9);

    /// Wrap a raw operator code.
    #[must_use]
    pub const fn new(code: i64) -> Self {
        Self(code)
    }

    /// Raw operator code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self.0
    }
}

/// One predicate of a filter.
///
/// `formulaid` is the caller-visible letter label and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Identifier once stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    /// What the condition inspects.
    pub conditiontype: ConditionType,
    /// Comparison operator.
    #[serde(default)]
    pub operator: Operator,
    /// Primary operand.
    #[serde(default)]
    pub value: String,
    /// Secondary operand.
    #[serde(default)]
    pub value2: String,
    /// Letter label referenced by an expression formula.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formulaid: Option<String>,
}

impl Condition {
    /// Stored column holding the condition type.
    pub const CONDITIONTYPE: &'static str = "conditiontype";
    /// Stored column holding the operator.
    pub const OPERATOR: &'static str = "operator";
    /// Stored column holding the primary operand.
    pub const VALUE: &'static str = "value";
    /// Stored column holding the secondary operand.
    pub const VALUE2: &'static str = "value2";

    /// New equality condition without an identifier or label.
    #[must_use]
    pub fn new(conditiontype: ConditionType, value: impl Into<String>) -> Self {
        Self {
            id: None,
            conditiontype,
            operator: Operator::EQUAL,
            value: value.into(),
            value2: String::new(),
            formulaid: None,
        }
    }

    /// Replace the operator.
    #[must_use]
    pub const fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Replace the secondary operand.
    #[must_use]
    pub fn with_value2(mut self, value2: impl Into<String>) -> Self {
        self.value2 = value2.into();
        self
    }

    /// Attach a letter label.
    #[must_use]
    pub fn with_formulaid(mut self, formulaid: impl Into<String>) -> Self {
        self.formulaid = Some(formulaid.into());
        self
    }

    /// Attach a stored identifier.
    #[must_use]
    pub const fn with_id(mut self, id: RowId) -> Self {
        self.id = Some(id);
        self
    }

    /// Stored columns of the condition; the label is excluded.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            Self::CONDITIONTYPE.to_owned(),
            FieldValue::Int(self.conditiontype.code()),
        );
        fields.insert(
            Self::OPERATOR.to_owned(),
            FieldValue::Int(self.operator.code()),
        );
        fields.insert(Self::VALUE.to_owned(), FieldValue::Text(self.value.clone()));
        fields.insert(
            Self::VALUE2.to_owned(),
            FieldValue::Text(self.value2.clone()),
        );
        fields
    }

    /// Rebuild a condition from stored columns.
    ///
    /// # Errors
    ///
    /// Returns an error when `conditiontype` is missing or a column has the wrong type.
    pub fn from_fields(id: Option<RowId>, fields: &Fields) -> ModelResult<Self> {
        let operator = match fields.get(Self::OPERATOR) {
            None | Some(FieldValue::Null) => Operator::EQUAL,
            Some(_) => Operator::new(int_field(fields, Self::OPERATOR)?),
        };
        Ok(Self {
            id,
            conditiontype: ConditionType::new(int_field(fields, Self::CONDITIONTYPE)?),
            operator,
            value: text_field(fields, Self::VALUE)?,
            value2: text_field(fields, Self::VALUE2)?,
            formulaid: None,
        })
    }
}
