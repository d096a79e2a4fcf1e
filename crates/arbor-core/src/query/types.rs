//! Query selection and option types, decoded from request JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// SELECTION
// =============================================================================

/// Which props a selection returns: every prop (`"*"`) or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPropSelection", into = "RawPropSelection")]
pub enum PropSelection {
    #[default]
    All,
    List(Vec<String>),
}

impl PropSelection {
    /// Whether `prop` is selected.
    #[must_use]
    pub fn includes(&self, prop: &str) -> bool {
        match self {
            Self::All => true,
            Self::List(props) => props.iter().any(|p| p == prop),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPropSelection {
    Text(String),
    List(Vec<String>),
}

impl TryFrom<RawPropSelection> for PropSelection {
    type Error = String;

    fn try_from(raw: RawPropSelection) -> Result<Self, Self::Error> {
        match raw {
            RawPropSelection::Text(text) if text == crate::primitives::WILDCARD => Ok(Self::All),
            RawPropSelection::Text(text) => Err(format!("expected \"*\" or a list, got {text:?}")),
            RawPropSelection::List(props) => Ok(Self::List(props)),
        }
    }
}

impl From<PropSelection> for RawPropSelection {
    fn from(selection: PropSelection) -> Self {
        match selection {
            PropSelection::All => Self::Text(crate::primitives::WILDCARD.to_string()),
            PropSelection::List(props) => Self::List(props),
        }
    }
}

/// What a query returns and how it post-processes the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default)]
    pub props: PropSelection,
    /// Prop name -> name in the visible view.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    /// Props of the relationship this selection was reached through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_props: Option<PropSelection>,
    /// Relationship prop name -> nested selection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Selection>,
    #[serde(default)]
    pub options: QueryOptions,
}

// =============================================================================
// OPTIONS
// =============================================================================

/// A prop reference, optionally reached by walking relationship props first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropRef {
    pub prop: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<String>,
}

/// Exact-value lookup through a unique index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueLookup {
    pub prop: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortHow {
    #[default]
    Asc,
    Dsc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub prop: String,
    #[serde(default)]
    pub how: SortHow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Compute a statistic over `compute_prop` and store it as `new_prop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeAs {
    pub compute_prop: String,
    pub new_prop: String,
}

/// Comparison symbol of a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Symbol {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    StartsWith,
    EndsWith,
    Contains,
    DoesNotContain,
    IsoIsBefore,
    IsoIsAfter,
}

/// A predicate operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operand {
    /// A literal.
    Value(Value),
    /// A prop of the row (or of nodes reached from it).
    Prop(PropRef),
    /// A `slot.path` pointer into the response built so far.
    Response(String),
}

/// One comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub left: Operand,
    pub symbol: Symbol,
    pub right: Operand,
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Is(Comparison),
    Defined(PropRef),
    Undefined(PropRef),
}

/// A derived-value expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    Value(Value),
    Prop(PropRef),
    Add(Vec<Expr>),
    Subtract(Vec<Expr>),
    Multiply(Vec<Expr>),
    Divide(Vec<Expr>),
}

/// Post-processing steps, for an explicit `flow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowStep {
    Sort,
    Limit,
    Derived,
    AggregateAsProp,
    AggregateAsResponse,
    Copy,
}

impl FlowStep {
    /// The order used when no `flow` is given.
    pub const DEFAULT: [Self; 6] = [
        Self::Sort,
        Self::Limit,
        Self::Derived,
        Self::AggregateAsProp,
        Self::AggregateAsResponse,
        Self::Copy,
    ];
}

/// Query options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    // candidates
    pub find_by_id: Option<String>,
    pub filter_by_ids: Option<Vec<String>>,
    pub find_by_unique: Option<UniqueLookup>,
    pub filter_by_uniques: Option<Vec<UniqueLookup>>,

    // predicates
    pub find_by: Option<Filter>,
    pub filter_by: Option<Filter>,
    pub public_key: Option<String>,

    // pipeline
    pub sort: Option<Sort>,
    pub limit: Option<Limit>,
    pub derived: BTreeMap<String, Expr>,
    pub count_as_prop: Option<String>,
    pub sum_as_prop: Option<ComputeAs>,
    pub avg_as_prop: Option<ComputeAs>,
    pub min_amount_as_prop: Option<ComputeAs>,
    pub max_amount_as_prop: Option<ComputeAs>,
    pub count_as_response: bool,
    pub sum_as_response: Option<String>,
    pub avg_as_response: Option<String>,
    pub min_amount_as_response: Option<String>,
    pub max_amount_as_response: Option<String>,
    pub min_node_as_response: Option<String>,
    pub max_node_as_response: Option<String>,
    pub copy: BTreeMap<String, PropRef>,
    pub flow: Option<Vec<FlowStep>>,
}

impl QueryOptions {
    /// Whether a find-style option collapses the result to one element.
    #[must_use]
    pub fn finds_one(&self) -> bool {
        self.find_by_id.is_some() || self.find_by_unique.is_some() || self.find_by.is_some()
    }

    /// Whether a result of `rows` rows collapses to its single element.
    ///
    /// Find-style options always collapse; a limited query collapses when
    /// exactly one row survives.
    #[must_use]
    pub fn collapses(&self, rows: usize) -> bool {
        self.finds_one() || (self.limit.is_some() && rows == 1)
    }
}
