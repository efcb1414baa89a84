use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators understood by the query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    In,
    Range,
    Like,
    Search,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Not,
    And,
    Or,
}

/// A single `{field, operator, value}` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl QueryRule {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: Some(field.into()),
            operator,
            value: Some(value.into()),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equals, value)
    }

    /// A bare boolean connective placed between two predicates.
    pub fn connective(operator: Operator) -> Self {
        Self {
            field: None,
            operator,
            value: None,
        }
    }
}

/// An ordered sequence of [`QueryRule`]s. Serializes as the `{"q": [...]}` request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "q")]
    pub rules: Vec<QueryRule>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with_rule(QueryRule::equals(field, value))
    }

    pub fn with_rule(mut self, rule: QueryRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn and(self, rule: QueryRule) -> Self {
        self.with_rule(QueryRule::connective(Operator::And))
            .with_rule(rule)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<QueryRule>> for Query {
    fn from(rules: Vec<QueryRule>) -> Self {
        Self { rules }
    }
}

impl FromIterator<QueryRule> for Query {
    fn from_iter<I: IntoIterator<Item = QueryRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
