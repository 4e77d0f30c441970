use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use searchlight_core::{AppError, AppResult, FieldKind, UiType};
use serde::{Deserialize, Serialize};

/// Maximum nesting depth of a filter tree.
pub const MAX_DEPTH: usize = 8;

/// Every operator a filter condition can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// SQL LIKE pattern match.
    Like,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Inclusive range.
    Between,
    /// Path matches an lquery pattern (`~`).
    MatchesLquery,
    /// Path is an ancestor of the given path (`@>`).
    IsAncestor,
    /// Path is a descendant of the given path (`<@`).
    IsDescendant,
    /// Path equals the given path exactly.
    PathMatch,
    /// Some path of the entity contains the given component.
    HasComponent,
    /// No path of the entity contains the given component.
    NotHasComponent,
}

impl FilterOp {
    /// Returns the stable wire value of the operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Like => "like",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Between => "between",
            Self::MatchesLquery => "matches_lquery",
            Self::IsAncestor => "is_ancestor",
            Self::IsDescendant => "is_descendant",
            Self::PathMatch => "path_match",
            Self::HasComponent => "has_component",
            Self::NotHasComponent => "not_has_component",
        }
    }
}

/// Operators valid for equality-only fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualityOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
}

/// Operators valid for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// LIKE pattern match; the value must contain a wildcard.
    Like,
}

/// Single-value comparison operators for numeric and date fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

impl CompareOp {
    /// Returns the SQL comparison operator.
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// Label-path operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtreeOp {
    /// Path matches an lquery pattern.
    MatchesLquery,
    /// Path is an ancestor of the value.
    IsAncestor,
    /// Path is a descendant of the value.
    IsDescendant,
    /// Path equals the value.
    PathMatch,
    /// Entity has a path containing the component.
    HasComponent,
    /// Entity has no path containing the component.
    NotHasComponent,
}

impl LtreeOp {
    /// Whether the operator consumes the filter path itself rather than a
    /// stored value.
    #[must_use]
    pub fn is_path_only(&self) -> bool {
        matches!(
            self,
            Self::PathMatch | Self::HasComponent | Self::NotHasComponent
        )
    }
}

/// A numeric literal, integer or float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    /// Whole number.
    Int(i64),
    /// Floating point number.
    Float(f64),
}

impl NumericValue {
    /// Whether the value is an integer literal.
    #[must_use]
    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// The value as a float, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(value) => *value as f64,
            Self::Float(value) => *value,
        }
    }
}

/// A validated numeric range with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    /// Inclusive lower bound.
    pub start: NumericValue,
    /// Inclusive upper bound.
    pub end: NumericValue,
}

impl NumericRange {
    /// Creates a range, rejecting `end <= start`.
    pub fn new(start: NumericValue, end: NumericValue) -> AppResult<Self> {
        if end.as_f64() <= start.as_f64() {
            return Err(AppError::Validation(
                "numeric range 'end' must be greater than 'start'".to_owned(),
            ));
        }

        Ok(Self { start, end })
    }
}

/// A validated date range with `end` strictly after `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub start: String,
    /// Exclusive upper bound.
    pub end: String,
}

impl DateRange {
    /// Creates a range, rejecting unparseable bounds and `end <= start`.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> AppResult<Self> {
        let range = Self {
            start: start.into(),
            end: end.into(),
        };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> AppResult<()> {
        let start = parse_date_value(&self.start)?;
        let end = parse_date_value(&self.end)?;
        if end <= start {
            return Err(AppError::Validation(
                "date range 'end' must be after 'start'".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Parses a filter date value: RFC 3339, `YYYY-MM-DD`, or a naive timestamp.
pub fn parse_date_value(value: &str) -> AppResult<NaiveDateTime> {
    if let Ok(parsed) = DateTime::<FixedOffset>::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(parsed);
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }

    Err(AppError::Validation(format!(
        "'{value}' is not a valid date or datetime string"
    )))
}

/// A typed leaf condition applied to one indexed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCondition {
    /// Stringified equality against booleans, UUIDs, enums and markers.
    Equality {
        /// Comparison operator.
        op: EqualityOp,
        /// Stringified comparison value.
        value: String,
    },
    /// String comparison or LIKE pattern.
    String {
        /// Comparison operator.
        op: StringOp,
        /// Comparison value or LIKE pattern.
        value: String,
    },
    /// Numeric comparison after casting the stored text.
    Numeric {
        /// Comparison operator.
        op: CompareOp,
        /// Numeric literal.
        value: NumericValue,
    },
    /// Inclusive numeric range.
    NumericBetween {
        /// Validated range.
        value: NumericRange,
    },
    /// Date comparison after casting the stored text.
    Date {
        /// Comparison operator.
        op: CompareOp,
        /// Date or datetime string.
        value: String,
    },
    /// Half-open date range (`>= start AND < end`).
    DateBetween {
        /// Validated range.
        value: DateRange,
    },
    /// Label-path operation.
    Ltree {
        /// Path operator.
        op: LtreeOp,
        /// Path, pattern, or component.
        value: String,
    },
}

impl FilterCondition {
    /// Creates a LIKE string condition, requiring a wildcard in the value.
    pub fn like(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if !value.contains('%') && !value.contains('_') {
            return Err(AppError::Validation(
                "the value for a 'like' operation must contain a wildcard character ('%' or '_')"
                    .to_owned(),
            ));
        }

        Ok(Self::String {
            op: StringOp::Like,
            value,
        })
    }

    /// Returns the operator carried by this condition.
    #[must_use]
    pub fn op(&self) -> FilterOp {
        match self {
            Self::Equality { op: EqualityOp::Eq, .. } => FilterOp::Eq,
            Self::Equality { op: EqualityOp::Neq, .. } => FilterOp::Neq,
            Self::String { op: StringOp::Eq, .. } => FilterOp::Eq,
            Self::String { op: StringOp::Neq, .. } => FilterOp::Neq,
            Self::String { op: StringOp::Like, .. } => FilterOp::Like,
            Self::Numeric { op, .. } | Self::Date { op, .. } => match op {
                CompareOp::Eq => FilterOp::Eq,
                CompareOp::Neq => FilterOp::Neq,
                CompareOp::Lt => FilterOp::Lt,
                CompareOp::Lte => FilterOp::Lte,
                CompareOp::Gt => FilterOp::Gt,
                CompareOp::Gte => FilterOp::Gte,
            },
            Self::NumericBetween { .. } | Self::DateBetween { .. } => FilterOp::Between,
            Self::Ltree { op, .. } => match op {
                LtreeOp::MatchesLquery => FilterOp::MatchesLquery,
                LtreeOp::IsAncestor => FilterOp::IsAncestor,
                LtreeOp::IsDescendant => FilterOp::IsDescendant,
                LtreeOp::PathMatch => FilterOp::PathMatch,
                LtreeOp::HasComponent => FilterOp::HasComponent,
                LtreeOp::NotHasComponent => FilterOp::NotHasComponent,
            },
        }
    }

    /// Client-facing value kind of this condition.
    #[must_use]
    pub fn value_kind(&self) -> UiType {
        match self {
            Self::Numeric { .. } | Self::NumericBetween { .. } => UiType::Number,
            Self::Date { .. } | Self::DateBetween { .. } => UiType::Datetime,
            Self::Ltree { .. } => UiType::Component,
            Self::Equality { .. } | Self::String { .. } => UiType::String,
        }
    }

    /// Whether this condition may be applied to a field of the given kind.
    #[must_use]
    pub fn is_compatible_with(&self, kind: FieldKind) -> bool {
        match self {
            Self::Ltree { .. } => true,
            Self::Date { .. } | Self::DateBetween { .. } => kind == FieldKind::Datetime,
            Self::Numeric { .. } | Self::NumericBetween { .. } => {
                matches!(kind, FieldKind::Integer | FieldKind::Float)
            }
            Self::String { .. } => kind == FieldKind::String,
            Self::Equality { .. } => matches!(
                kind,
                FieldKind::Boolean
                    | FieldKind::Uuid
                    | FieldKind::Block
                    | FieldKind::ResourceType
                    | FieldKind::String
            ),
        }
    }

    /// Validates invariants that serde deserialization cannot enforce.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::String {
                op: StringOp::Like,
                value,
            } if !value.contains('%') && !value.contains('_') => Err(AppError::Validation(
                "the value for a 'like' operation must contain a wildcard character ('%' or '_')"
                    .to_owned(),
            )),
            Self::NumericBetween { value } => {
                NumericRange::new(value.start, value.end).map(|_| ())
            }
            Self::Date { value, .. } => parse_date_value(value).map(|_| ()),
            Self::DateBetween { value } => value.validate(),
            _ => Ok(()),
        }
    }
}

/// Operators valid for fields of the given kind.
#[must_use]
pub fn operators_for(kind: FieldKind) -> Vec<FilterOp> {
    match kind {
        FieldKind::Integer | FieldKind::Float | FieldKind::Datetime => vec![
            FilterOp::Eq,
            FilterOp::Neq,
            FilterOp::Lt,
            FilterOp::Lte,
            FilterOp::Gt,
            FilterOp::Gte,
            FilterOp::Between,
        ],
        FieldKind::Boolean | FieldKind::Uuid | FieldKind::Block | FieldKind::ResourceType => {
            vec![FilterOp::Eq, FilterOp::Neq]
        }
        FieldKind::String => vec![FilterOp::Eq, FilterOp::Neq, FilterOp::Like],
    }
}

/// A leaf of the filter tree: one condition on one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFilter {
    /// Dotted label path of the filtered field, or `*` for path-only operators.
    pub path: String,
    /// The condition to apply.
    pub condition: FilterCondition,
    /// Client-facing value kind of the condition.
    #[serde(default = "default_value_kind")]
    pub value_kind: UiType,
}

fn default_value_kind() -> UiType {
    UiType::String
}

impl PathFilter {
    /// Creates a normalized path filter.
    #[must_use]
    pub fn new(path: impl Into<String>, condition: FilterCondition) -> Self {
        let value_kind = condition.value_kind();
        let mut filter = Self {
            path: path.into(),
            condition,
            value_kind,
        };
        filter.normalize();
        filter
    }

    /// Moves the path into the condition value for path-only operators
    /// given without an explicit value, leaving a wildcard path behind.
    pub fn normalize(&mut self) {
        if let FilterCondition::Ltree { op, value } = &mut self.condition
            && op.is_path_only()
            && value.is_empty()
        {
            *value = std::mem::take(&mut self.path);
            self.path = "*".to_owned();
        }
        self.value_kind = self.condition.value_kind();
    }
}

/// Boolean combinator for filter groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOp {
    /// All children must match.
    And,
    /// Any child must match.
    Or,
}

impl GroupOp {
    /// SQL keyword joining the children.
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A recursive boolean tree of path filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterTree {
    /// Interior node combining children with AND/OR.
    Group {
        /// Boolean combinator.
        op: GroupOp,
        /// Child trees.
        children: Vec<FilterTree>,
    },
    /// Leaf condition.
    Path(PathFilter),
}

impl FilterTree {
    /// Creates an AND group.
    #[must_use]
    pub fn and(children: Vec<FilterTree>) -> Self {
        Self::Group {
            op: GroupOp::And,
            children,
        }
    }

    /// Creates an OR group.
    #[must_use]
    pub fn or(children: Vec<FilterTree>) -> Self {
        Self::Group {
            op: GroupOp::Or,
            children,
        }
    }

    /// Creates a leaf from a path filter.
    #[must_use]
    pub fn path(filter: PathFilter) -> Self {
        Self::Path(filter)
    }

    /// Collects all leaf filters in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&PathFilter> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, into: &mut Vec<&'a PathFilter>) {
        match self {
            Self::Path(filter) => into.push(filter),
            Self::Group { children, .. } => {
                for child in children {
                    child.collect_leaves(into);
                }
            }
        }
    }

    /// Maximum nesting depth of the tree. A leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Path(_) => 1,
            Self::Group { children, .. } => {
                1 + children.iter().map(FilterTree::depth).max().unwrap_or(0)
            }
        }
    }

    /// Normalizes every leaf in place.
    pub fn normalize(&mut self) {
        match self {
            Self::Path(filter) => filter.normalize(),
            Self::Group { children, .. } => {
                for child in children {
                    child.normalize();
                }
            }
        }
    }

    /// Validates tree depth, group arity and every leaf condition.
    pub fn validate(&self) -> AppResult<()> {
        if self.depth() > MAX_DEPTH {
            return Err(AppError::Validation(format!(
                "filter tree exceeds maximum depth of {MAX_DEPTH}"
            )));
        }
        self.validate_nodes()
    }

    fn validate_nodes(&self) -> AppResult<()> {
        match self {
            Self::Path(filter) => filter.condition.validate(),
            Self::Group { children, .. } => {
                if children.is_empty() {
                    return Err(AppError::Validation(
                        "filter group must have at least one child".to_owned(),
                    ));
                }
                for child in children {
                    child.validate_nodes()?;
                }
                Ok(())
            }
        }
    }
}
