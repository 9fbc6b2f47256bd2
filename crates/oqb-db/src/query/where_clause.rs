//! Where-clause trees.
//!
//! A [`Where`] is a boolean tree of `and`/`or` groups whose leaves compare a
//! column with a value. Columns are either local to the node the predicate is
//! attached to, or reached through a chain of association names:
//!
//! ```
//! use oqb_db::query::where_clause::{ColumnRef, Where};
//!
//! let w = Where::all(vec![
//!     Where::eq("name", "Jordan"),
//!     Where::gt(ColumnRef::related(["orders"], "id"), 3_i64),
//! ]);
//! assert_eq!(w.relationship_paths(), vec![vec!["orders".to_string()]]);
//! ```
//!
//! Trees also parse from the JSON request shape, e.g.
//! `{"or": [{"eq": ["status", "PLACED"]}, {"in": [{"relation": ["orders"], "column": "id"}, [1, 2]]}]}`.
//! An object holding several operators contributes each of them to the
//! enclosing group. Leaves with no recognised operator are dropped.

use serde::{Deserialize, Deserializer};

use super::compiler::{
    ColumnExpr, CompareOp, CompiledStatement, Condition, DatabaseBackendType, Operand, SqlCompiler,
};
use super::ALIAS_SEPARATOR;
use crate::value::Value;

/// A column addressed from the node a predicate or order entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    /// A column of the node itself.
    Local(String),
    /// A column of the node reached by following `relation` from it.
    Related { relation: Vec<String>, column: String },
}

impl ColumnRef {
    pub fn related<I, S>(relation: I, column: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Related {
            relation: relation.into_iter().map(Into::into).collect(),
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Local(column) | Self::Related { column, .. } => column,
        }
    }

    /// The association names to follow; empty for local columns.
    pub fn relation(&self) -> &[String] {
        match self {
            Self::Local(_) => &[],
            Self::Related { relation, .. } => relation,
        }
    }

    /// The alias of the table holding this column, relative to `base`.
    pub fn table_alias(&self, base: &str) -> String {
        let mut alias = base.to_string();
        for name in self.relation() {
            alias.push_str(ALIAS_SEPARATOR);
            alias.push_str(name);
        }
        alias
    }

    pub fn to_expr(&self, base: &str) -> ColumnExpr {
        ColumnExpr::new(self.table_alias(base), self.column())
    }
}

impl From<&str> for ColumnRef {
    fn from(column: &str) -> Self {
        Self::Local(column.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(column: String) -> Self {
        Self::Local(column)
    }
}

/// Leaf comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Neq,
    Like,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    const fn op(self) -> CompareOp {
        match self {
            Self::Eq => CompareOp::Eq,
            Self::Neq => CompareOp::NotEq,
            Self::Like => CompareOp::Like,
            Self::Lt => CompareOp::Lt,
            Self::Lte => CompareOp::Lte,
            Self::Gt => CompareOp::Gt,
            Self::Gte => CompareOp::Gte,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "like" => Self::Like,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            _ => return None,
        })
    }
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    And(Vec<Where>),
    Or(Vec<Where>),
    Compare {
        column: ColumnRef,
        op: Comparison,
        value: Value,
    },
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
}

macro_rules! comparison_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
                Self::Compare {
                    column: column.into(),
                    op: Comparison::$op,
                    value: value.into(),
                }
            }
        )*
    };
}

impl Where {
    comparison_builders! {
        eq => Eq,
        neq => Neq,
        like => Like,
        lt => Lt,
        lte => Lte,
        gt => Gt,
        gte => Gte,
    }

    pub fn is_in<I, V>(column: impl Into<ColumnRef>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// All of `children` hold.
    pub fn all(children: Vec<Self>) -> Self {
        Self::And(children)
    }

    /// At least one of `children` holds.
    pub fn any(children: Vec<Self>) -> Self {
        Self::Or(children)
    }

    /// Conjunction with another tree, flattening nested `and` groups.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut children = self.into_conjuncts();
        children.extend(other.into_conjuncts());
        Self::And(children)
    }

    /// Parses the JSON request shape. Returns `None` when nothing in the
    /// object is a recognised operator.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let mut parts = parse_object(json);
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Self::And(parts)),
        }
    }

    /// The top-level AND conjuncts, with nested `and` groups flattened.
    pub fn conjuncts(&self) -> Vec<&Self> {
        match self {
            Self::And(children) => children.iter().flat_map(Self::conjuncts).collect(),
            other => vec![other],
        }
    }

    fn into_conjuncts(self) -> Vec<Self> {
        match self {
            Self::And(children) => children.into_iter().flat_map(Self::into_conjuncts).collect(),
            other => vec![other],
        }
    }

    /// Every distinct relation path referenced by a leaf, in first-seen order.
    pub fn relationship_paths(&self) -> Vec<Vec<String>> {
        let mut paths: Vec<Vec<String>> = Vec::new();
        self.walk_columns(&mut |column| {
            let relation = column.relation();
            if !relation.is_empty() && !paths.iter().any(|p| p.as_slice() == relation) {
                paths.push(relation.to_vec());
            }
        });
        paths
    }

    /// Every distinct table alias referenced by a leaf, relative to `base`.
    pub fn referenced_aliases(&self, base: &str) -> Vec<String> {
        let mut aliases: Vec<String> = Vec::new();
        self.walk_columns(&mut |column| {
            let alias = column.table_alias(base);
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        });
        aliases
    }

    fn walk_columns(&self, visit: &mut impl FnMut(&ColumnRef)) {
        match self {
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.walk_columns(visit);
                }
            }
            Self::Compare { column, .. } | Self::In { column, .. } => visit(column),
        }
    }

    /// Builds the condition with columns resolved against `alias`. Empty
    /// groups produce no condition.
    pub fn to_condition(&self, alias: &str) -> Option<Condition> {
        match self {
            Self::And(children) => group(children, alias).map(Condition::And),
            Self::Or(children) => group(children, alias).map(Condition::Or),
            Self::Compare { column, op, value } => {
                let column = column.to_expr(alias);
                Some(match (op, value) {
                    (Comparison::Eq, Value::Null) => Condition::IsNull {
                        column,
                        negated: false,
                    },
                    (Comparison::Neq, Value::Null) => Condition::IsNull {
                        column,
                        negated: true,
                    },
                    _ => Condition::Compare {
                        left: column,
                        op: op.op(),
                        right: Operand::Value(value.clone()),
                    },
                })
            }
            Self::In { column, values } => Some(Condition::In {
                column: column.to_expr(alias),
                values: values.clone(),
            }),
        }
    }

    /// Compiles to a SQL fragment and its bound values.
    pub fn compile(&self, alias: &str, backend: DatabaseBackendType) -> CompiledStatement {
        let condition = self
            .to_condition(alias)
            .unwrap_or_else(|| Condition::And(Vec::new()));
        SqlCompiler::new(backend).compile_condition(&condition)
    }
}

fn group(children: &[Where], alias: &str) -> Option<Vec<Condition>> {
    let conditions: Vec<Condition> = children
        .iter()
        .filter_map(|child| child.to_condition(alias))
        .collect();
    (!conditions.is_empty()).then_some(conditions)
}

const LEAF_KEYS: [&str; 8] = ["eq", "neq", "like", "in", "lt", "lte", "gt", "gte"];

/// Parses every recognised operator of one JSON object.
fn parse_object(json: &serde_json::Value) -> Vec<Where> {
    let Some(object) = json.as_object() else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    for key in LEAF_KEYS {
        if let Some(leaf) = object.get(key).and_then(|operand| parse_leaf(key, operand)) {
            parts.push(leaf);
        }
    }
    if let Some(children) = object.get("or").and_then(serde_json::Value::as_array) {
        parts.push(Where::Or(children.iter().flat_map(parse_object).collect()));
    }
    if let Some(children) = object.get("and").and_then(serde_json::Value::as_array) {
        parts.push(Where::And(children.iter().flat_map(parse_object).collect()));
    }
    parts
}

/// Parses `[column, value]`.
fn parse_leaf(key: &str, operand: &serde_json::Value) -> Option<Where> {
    let [column, value] = operand.as_array()?.as_slice() else {
        return None;
    };
    let column = ColumnRef::deserialize(column).ok()?;

    if key == "in" {
        let values = value.as_array()?.iter().map(Value::from_json).collect();
        return Some(Where::In { column, values });
    }

    Some(Where::Compare {
        column,
        op: Comparison::from_key(key)?,
        value: Value::from_json(value),
    })
}

impl<'de> Deserialize<'de> for Where {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&json).unwrap_or_else(|| Self::And(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sqlite(w: &Where, alias: &str) -> CompiledStatement {
        w.compile(alias, DatabaseBackendType::SQLite)
    }

    #[test]
    fn test_eq_local_column() {
        let c = sqlite(&Where::eq("name", "Jordan"), "customer");
        assert_eq!(c.sql, "\"customer\".\"name\" = ?");
        assert_eq!(c.params, vec![Value::from("Jordan")]);
    }

    #[test]
    fn test_null_comparisons_become_is_null() {
        let c = sqlite(&Where::eq("deleted_at", Value::Null), "company");
        assert_eq!(c.sql, "\"company\".\"deleted_at\" IS NULL");
        assert!(c.params.is_empty());

        let c = sqlite(&Where::neq("deleted_at", Value::Null), "company");
        assert_eq!(c.sql, "\"company\".\"deleted_at\" IS NOT NULL");
    }

    #[test]
    fn test_related_column_alias() {
        let col = ColumnRef::related(["orders", "items"], "sku");
        assert_eq!(col.table_alias("customer"), "customer->orders->items");
        let c = sqlite(&Where::like(col, "A%"), "customer");
        assert_eq!(c.sql, "\"customer->orders->items\".\"sku\" LIKE ?");
    }

    #[test]
    fn test_nested_groups() {
        let w = Where::any(vec![
            Where::eq("status", "PLACED"),
            Where::all(vec![Where::gte("id", 3_i64), Where::lt("id", 5_i64)]),
        ]);
        let c = w.compile("order", DatabaseBackendType::PostgreSQL);
        assert_eq!(
            c.sql,
            "(\"order\".\"status\" = $1 OR (\"order\".\"id\" >= $2 AND \"order\".\"id\" < $3))"
        );
        assert_eq!(c.params.len(), 3);
    }

    #[test]
    fn test_empty_group_produces_nothing() {
        assert!(Where::all(vec![]).to_condition("t").is_none());
        assert!(Where::any(vec![Where::all(vec![])]).to_condition("t").is_none());
    }

    #[test]
    fn test_relationship_paths_deduplicated() {
        let w = Where::all(vec![
            Where::eq(ColumnRef::related(["orders"], "status"), "PLACED"),
            Where::any(vec![
                Where::gt(ColumnRef::related(["orders"], "id"), 1_i64),
                Where::eq(ColumnRef::related(["friends"], "name"), "Brendan"),
            ]),
            Where::eq("name", "Jordan"),
        ]);
        assert_eq!(
            w.relationship_paths(),
            vec![vec!["orders".to_string()], vec!["friends".to_string()]]
        );
        assert_eq!(
            w.referenced_aliases("customer"),
            vec!["customer->orders", "customer->friends", "customer"]
        );
    }

    #[test]
    fn test_conjuncts_flatten() {
        let w = Where::eq("a", 1_i64)
            .and(Where::all(vec![Where::eq("b", 2_i64), Where::eq("c", 3_i64)]));
        assert_eq!(w.conjuncts().len(), 3);
        assert_eq!(Where::any(vec![Where::eq("a", 1_i64)]).conjuncts().len(), 1);
    }

    #[test]
    fn test_from_json_leaf() {
        let w = Where::from_json(&json!({"eq": ["name", "Jordan"]})).unwrap();
        assert_eq!(w, Where::eq("name", "Jordan"));
    }

    #[test]
    fn test_from_json_related_and_in() {
        let w = Where::from_json(&json!({
            "in": [{"relation": ["orders"], "column": "status"}, ["PLACED", "SHIPPED"]]
        }))
        .unwrap();
        assert_eq!(
            w,
            Where::is_in(ColumnRef::related(["orders"], "status"), ["PLACED", "SHIPPED"])
        );
    }

    #[test]
    fn test_from_json_multi_key_joins_parent_group() {
        let w = Where::from_json(&json!({
            "or": [{"eq": ["name", "Jordan"], "gt": ["id", 3]}]
        }))
        .unwrap();
        assert_eq!(
            w,
            Where::any(vec![Where::eq("name", "Jordan"), Where::gt("id", 3_i64)])
        );

        let top = Where::from_json(&json!({"eq": ["a", 1], "neq": ["b", 2]})).unwrap();
        assert_eq!(top, Where::all(vec![Where::eq("a", 1_i64), Where::neq("b", 2_i64)]));
    }

    #[test]
    fn test_from_json_ignores_malformed_leaves() {
        assert!(Where::from_json(&json!({"between": ["id", 1, 2]})).is_none());
        assert!(Where::from_json(&json!({"eq": ["id"]})).is_none());
        let w = Where::from_json(&json!({"and": [{"nope": 1}, {"eq": ["id", 2]}]})).unwrap();
        assert_eq!(w, Where::all(vec![Where::eq("id", 2_i64)]));
    }

    #[test]
    fn test_deserialize() {
        let w: Where = serde_json::from_value(json!({"lte": ["id", 4]})).unwrap();
        assert_eq!(w, Where::lte("id", 4_i64));
    }
}
