//! Renders a [`JoinTree`] into row and count statements.
//!
//! Two strategies exist for the row statement:
//!
//! * **Flat**: one statement joins every node, filters, orders and
//!   paginates directly. Used when nothing can multiply root rows before
//!   pagination and no node must be enforced.
//! * **Subquery**: an inner statement selects root rows, joining only the
//!   nodes that filtering and ordering need, and is paginated. The outer
//!   statement joins the full tree against it and orders again.
//!
//! The subquery strategy is chosen when the root is required (a filter or
//! an inner join somewhere), or when a limit is set and the tree fans out.
//!
//! Inside the inner statement a fan-out node reached without crossing
//! another fan-out becomes a correlated `EXISTS`, so root rows are never
//! multiplied. Nodes below it are joined normally inside the `EXISTS`.
//! Every such fan-out gets its own `EXISTS`; this deliberately differs from
//! a design with a single semi-join boundary per query, where only the first
//! fan-out would be demoted and the others joined, multiplying roots again.
//!
//! Filters reading nodes behind an `EXISTS` are split at the smallest
//! `and`/`or` subtree that mentions that boundary, and only that subtree is
//! evaluated inside it: `name = ? OR orders.status = ?` becomes
//! `name = ? OR EXISTS (... status = ?)`. For an optional boundary the
//! result matches the outer LEFT JOIN, including the all-NULL row of roots
//! without children. The count statement reuses the inner shape without
//! ordering or pagination.

use oqb_core::{OqbError, OqbResult};

use super::compiler::{
    ColumnExpr, Condition, Join, JoinType, OrderBy, SelectColumn, SelectStatement,
};
use super::join_tree::{JoinNode, JoinTree, NodeId};
use super::options::{Order, SortDirection};
use super::where_clause::{Comparison, Where};
use crate::value::Value;

/// How the row statement was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Flat,
    Subquery,
}

/// The row statement and the count statement of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub rows: SelectStatement,
    pub count: SelectStatement,
    pub strategy: Strategy,
}

/// Column alias of the count statement.
pub const COUNT_ALIAS: &str = "count";

/// Where a node lives in the inner (paginated) statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Joined into the inner statement.
    Main,
    /// Inside the `EXISTS` rooted at the given node.
    Semi(NodeId),
    /// Not part of the inner statement.
    Excluded,
}

/// Renders the row and count statements.
///
/// `offset` is only applied together with `limit`. Fails with
/// `InvalidQuery` when a filter reading two different `EXISTS` boundaries
/// is AND-ed with another filter on one of them.
pub fn render(
    tree: &JoinTree,
    order: &[Order],
    limit: Option<u64>,
    offset: Option<u64>,
) -> OqbResult<RenderedQuery> {
    let root = tree.root();
    let offset = limit.and(offset);
    let order_by: Vec<OrderBy> = order.iter().map(|o| order_entry(root, o)).collect();

    let strategy = if root.required || (limit.is_some() && tree.meta.has_fan_out) {
        Strategy::Subquery
    } else {
        Strategy::Flat
    };

    let stage = if root.required || tree.meta.has_fan_out {
        Some(InnerStage::build(tree)?)
    } else {
        None
    };

    let rows = match (&stage, strategy) {
        (Some(stage), Strategy::Subquery) => {
            let mut inner = stage.statement.clone();
            inner.select = vec![SelectColumn::AllFrom(root.alias.clone())];
            inner.order_by = order_by
                .iter()
                .filter(|o| stage.is_main_alias(tree, &o.column.table))
                .cloned()
                .collect();
            inner.limit = limit;
            inner.offset = offset;

            let mut outer = SelectStatement::from_derived(inner, root.alias.clone());
            outer.select = select_columns(tree);
            outer.joins = all_joins(tree);
            outer.conditions = flat_conditions(tree);
            outer.order_by = order_by;
            outer
        }
        _ => {
            let mut flat = flat_statement(tree);
            flat.select = select_columns(tree);
            flat.order_by = order_by;
            flat.limit = limit;
            flat.offset = offset;
            flat
        }
    };

    let mut count = match stage {
        Some(stage) => stage.statement,
        None => flat_statement(tree),
    };
    count.select = vec![SelectColumn::CountStar(COUNT_ALIAS.to_string())];

    Ok(RenderedQuery {
        rows,
        count,
        strategy,
    })
}

fn order_entry(root: &JoinNode, order: &Order) -> OrderBy {
    let column = order.column.to_expr(&root.alias);
    match order.direction {
        SortDirection::Asc => OrderBy::asc(column),
        SortDirection::Desc => OrderBy::desc(column),
    }
}

/// Every selected column, aliased `"<alias>.<column>"`.
fn select_columns(tree: &JoinTree) -> Vec<SelectColumn> {
    tree.nodes()
        .iter()
        .flat_map(|node| {
            node.selected.iter().map(|column| {
                let expr = ColumnExpr::new(node.alias.clone(), column.clone());
                let alias = expr.qualified_name();
                SelectColumn::Column { expr, alias }
            })
        })
        .collect()
}

fn parent_alias<'t>(tree: &'t JoinTree, node: &JoinNode) -> &'t str {
    let parent = node.parent.map_or_else(|| tree.root(), |id| tree.node(id));
    &parent.alias
}

/// `parent.k = node.v` for every key pair.
fn correlation(tree: &JoinTree, node: &JoinNode) -> Vec<Condition> {
    let parent = parent_alias(tree, node);
    node.key_map
        .iter()
        .map(|(parent_column, column)| {
            Condition::columns_eq(
                ColumnExpr::new(parent, parent_column.clone()),
                ColumnExpr::new(node.alias.clone(), column.clone()),
            )
        })
        .collect()
}

fn soft_delete(node: &JoinNode) -> Option<Condition> {
    node.soft_delete_filter()
        .map(|column| Condition::not_deleted(ColumnExpr::new(node.alias.clone(), column)))
}

fn predicate(node: &JoinNode) -> Option<Condition> {
    node.where_clause
        .as_ref()
        .and_then(|w| w.to_condition(&node.alias))
}

/// INNER JOIN for required nodes, LEFT JOIN otherwise. The node's
/// soft-delete filter goes in the ON clause.
fn join(tree: &JoinTree, node: &JoinNode) -> Join {
    let mut on = correlation(tree, node);
    on.extend(soft_delete(node));
    Join {
        table: node.table.clone(),
        alias: node.alias.clone(),
        join_type: if node.required {
            JoinType::Inner
        } else {
            JoinType::Left
        },
        on: Condition::And(on),
    }
}

fn all_joins(tree: &JoinTree) -> Vec<Join> {
    tree.nodes()
        .iter()
        .skip(1)
        .map(|node| join(tree, node))
        .collect()
}

/// Root soft-delete filter plus every node's filter.
fn flat_conditions(tree: &JoinTree) -> Vec<Condition> {
    let mut conditions: Vec<Condition> = soft_delete(tree.root()).into_iter().collect();
    conditions.extend(tree.nodes().iter().filter_map(predicate));
    conditions
}

/// The whole tree joined in one statement, without a select list.
fn flat_statement(tree: &JoinTree) -> SelectStatement {
    let root = tree.root();
    let mut statement = SelectStatement::from_table(root.table.clone(), root.alias.clone());
    statement.joins = all_joins(tree);
    statement.conditions = flat_conditions(tree);
    statement
}

/// The inner statement of the subquery strategy, without a select list,
/// ordering or pagination.
struct InnerStage {
    statement: SelectStatement,
    placements: Vec<Placement>,
}

impl InnerStage {
    fn build(tree: &JoinTree) -> OqbResult<Self> {
        let placements = place(tree);
        let root = tree.root();

        let mut statement = SelectStatement::from_table(root.table.clone(), root.alias.clone());
        statement.conditions.extend(soft_delete(root));

        let mut filters: Vec<Filter<'_>> = Vec::new();
        for node in tree.nodes() {
            if placements[node.id] != Placement::Main {
                continue;
            }
            if node.parent.is_some() {
                statement.joins.push(join(tree, node));
            }
            if let Some(where_clause) = &node.where_clause {
                filters.extend(
                    where_clause
                        .conjuncts()
                        .into_iter()
                        .map(|conjunct| (conjunct, node.alias.as_str())),
                );
            }
        }

        let lowering = Lowering {
            tree,
            placements: &placements,
        };
        let (local, mut grouped) = lowering.split(filters)?;
        statement.conditions.extend(local);

        for node in tree.nodes() {
            if placements[node.id] != Placement::Semi(node.id) {
                continue;
            }
            let filters = grouped
                .iter()
                .position(|(boundary, _)| *boundary == node.id)
                .map(|i| grouped.swap_remove(i).1)
                .unwrap_or_default();
            if !node.required && filters.is_empty() {
                continue;
            }
            statement.conditions.push(lowering.exists(node, &filters));
        }

        Ok(Self {
            statement,
            placements,
        })
    }

    fn is_main_alias(&self, tree: &JoinTree, alias: &str) -> bool {
        tree.find_by_alias(alias)
            .is_some_and(|node| self.placements[node.id] == Placement::Main)
    }
}

/// A filter tree and the alias its columns resolve against.
type Filter<'t> = (&'t Where, &'t str);

/// Turns filters into inner-stage conditions. Parts that read nodes behind
/// an `EXISTS` boundary are evaluated inside a correlated `EXISTS` for that
/// boundary. A part mentioning no such node stays outside, so an `or`
/// between a root column and a to-many column still matches roots without
/// children.
struct Lowering<'t> {
    tree: &'t JoinTree,
    placements: &'t [Placement],
}

impl<'t> Lowering<'t> {
    /// The `EXISTS` boundaries `filter` reads from, in first-seen order.
    fn boundaries(&self, (filter, base): Filter<'t>) -> OqbResult<Vec<NodeId>> {
        let mut boundaries: Vec<NodeId> = Vec::new();
        for alias in filter.referenced_aliases(base) {
            let referenced = self.tree.find_by_alias(&alias).ok_or_else(|| {
                OqbError::InvalidQuery(format!("no joined table for alias '{alias}'"))
            })?;
            if let Placement::Semi(boundary) = self.placements[referenced.id] {
                if !boundaries.contains(&boundary) {
                    boundaries.push(boundary);
                }
            }
        }
        Ok(boundaries)
    }

    /// Splits AND-ed filters into conditions that need no `EXISTS` and
    /// filters grouped by the one boundary they read. Filters on the same
    /// boundary must match the same related row, so they stay together.
    #[allow(clippy::type_complexity)]
    fn split(
        &self,
        filters: Vec<Filter<'t>>,
    ) -> OqbResult<(Vec<Condition>, Vec<(NodeId, Vec<Filter<'t>>)>)> {
        let mut local: Vec<Condition> = Vec::new();
        let mut grouped: Vec<(NodeId, Vec<Filter<'t>>)> = Vec::new();
        let mut spanning: Vec<(Filter<'t>, Vec<NodeId>)> = Vec::new();

        for filter in filters {
            let boundaries = self.boundaries(filter)?;
            match boundaries.len() {
                0 => local.extend(filter.0.to_condition(filter.1)),
                1 => {
                    let boundary = boundaries[0];
                    match grouped.iter_mut().find(|(id, _)| *id == boundary) {
                        Some((_, group)) => group.push(filter),
                        None => grouped.push((boundary, vec![filter])),
                    }
                }
                _ => spanning.push((filter, boundaries)),
            }
        }

        for (i, (filter, boundaries)) in spanning.iter().enumerate() {
            let shared = boundaries.iter().any(|boundary| {
                grouped.iter().any(|(id, _)| id == boundary)
                    || spanning
                        .iter()
                        .enumerate()
                        .any(|(j, (_, other))| j != i && other.contains(boundary))
            });
            if shared {
                return Err(self.spanning_error(filter.1, boundaries));
            }
            local.extend(self.lower(*filter)?);
        }

        // A lone `or` distributes over its branches.
        let mut kept = Vec::with_capacity(grouped.len());
        for (boundary, group) in grouped {
            let lone_or = matches!(group.as_slice(), [(Where::Or(_), _)]);
            if lone_or {
                local.extend(self.lower(group[0])?);
            } else {
                kept.push((boundary, group));
            }
        }
        Ok((local, kept))
    }

    fn lower(&self, filter: Filter<'t>) -> OqbResult<Option<Condition>> {
        let (where_clause, base) = filter;
        if let Where::Or(children) = where_clause {
            let mut branches = Vec::new();
            for child in children {
                branches.extend(self.lower((child, base))?);
            }
            return Ok((!branches.is_empty()).then_some(Condition::Or(branches)));
        }

        let conjuncts = where_clause.conjuncts().into_iter().map(|c| (c, base)).collect();
        let (mut parts, grouped) = self.split(conjuncts)?;
        for (boundary, group) in grouped {
            parts.push(self.exists(self.tree.node(boundary), &group));
        }
        Ok(match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Condition::And(parts)),
        })
    }

    /// `EXISTS` over `boundary` with `filters` applied inside. When the
    /// boundary is optional the outer LEFT JOIN also yields one all-NULL row
    /// for roots without children; if the filters can hold on that row, a
    /// `NOT EXISTS` branch keeps those roots.
    fn exists(&self, boundary: &JoinNode, filters: &[Filter<'t>]) -> Condition {
        let conditions = filters
            .iter()
            .filter_map(|(filter, base)| filter.to_condition(base))
            .collect();
        let matching = Condition::Exists(Box::new(semi_join(
            self.tree,
            self.placements,
            boundary,
            conditions,
        )));
        if boundary.required {
            return matching;
        }

        let behind = |alias: &str| {
            self.tree
                .find_by_alias(alias)
                .is_some_and(|node| self.placements[node.id] == Placement::Semi(boundary.id))
        };
        let mut on_empty = vec![Condition::NotExists(Box::new(semi_join(
            self.tree,
            self.placements,
            boundary,
            Vec::new(),
        )))];
        for (filter, base) in filters {
            match null_extended(filter, base, &behind) {
                Truth::False => return matching,
                Truth::True => {}
                Truth::When(condition) => on_empty.push(condition),
            }
        }
        Condition::Or(vec![matching, Condition::And(on_empty)])
    }

    fn spanning_error(&self, base: &str, boundaries: &[NodeId]) -> OqbError {
        OqbError::InvalidQuery(format!(
            "a filter on '{base}' compares columns of separate to-many relations: {}",
            boundaries
                .iter()
                .map(|id| self.tree.node(*id).alias.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

/// A filter evaluated with some columns known to be NULL.
#[derive(Debug, Clone, PartialEq)]
enum Truth {
    True,
    False,
    /// Depends on the remaining columns.
    When(Condition),
}

/// The value of `filter` on a row whose columns of aliases matching
/// `is_null` are all NULL. SQL's unknown counts as false; filters have no
/// negation, so that is exact.
fn null_extended(filter: &Where, base: &str, is_null: &impl Fn(&str) -> bool) -> Truth {
    let live = |children: &[Where]| -> Vec<Truth> {
        children
            .iter()
            .filter(|child| child.to_condition(base).is_some())
            .map(|child| null_extended(child, base, is_null))
            .collect()
    };
    match filter {
        Where::And(children) => {
            let mut parts = Vec::new();
            for truth in live(children) {
                match truth {
                    Truth::False => return Truth::False,
                    Truth::True => {}
                    Truth::When(condition) => parts.push(condition),
                }
            }
            if parts.is_empty() {
                Truth::True
            } else {
                Truth::When(Condition::And(parts))
            }
        }
        Where::Or(children) => {
            let truths = live(children);
            if truths.is_empty() {
                return Truth::True;
            }
            let mut parts = Vec::new();
            for truth in truths {
                match truth {
                    Truth::True => return Truth::True,
                    Truth::False => {}
                    Truth::When(condition) => parts.push(condition),
                }
            }
            if parts.is_empty() {
                Truth::False
            } else {
                Truth::When(Condition::Or(parts))
            }
        }
        Where::Compare { column, .. } | Where::In { column, .. }
            if !is_null(&column.table_alias(base)) =>
        {
            filter.to_condition(base).map_or(Truth::True, Truth::When)
        }
        Where::Compare {
            op: Comparison::Eq,
            value: Value::Null,
            ..
        } => Truth::True,
        Where::Compare { .. } | Where::In { .. } => Truth::False,
    }
}

/// Assigns every node its place in the inner statement. Parents are
/// visited before children.
fn place(tree: &JoinTree) -> Vec<Placement> {
    let mut placements = vec![Placement::Excluded; tree.nodes().len()];
    placements[0] = Placement::Main;
    for node in tree.nodes().iter().skip(1) {
        let Some(parent) = node.parent else {
            continue;
        };
        if !(node.required || node.include_in_subquery) {
            continue;
        }
        placements[node.id] = match placements[parent] {
            Placement::Excluded => Placement::Excluded,
            Placement::Semi(boundary) => Placement::Semi(boundary),
            Placement::Main if node.is_fan_out => Placement::Semi(node.id),
            Placement::Main => Placement::Main,
        };
    }
    placements
}

/// `SELECT 1 FROM boundary ... WHERE <correlation> AND ...` for the
/// `EXISTS` rooted at `boundary`.
fn semi_join(
    tree: &JoinTree,
    placements: &[Placement],
    boundary: &JoinNode,
    deferred: Vec<Condition>,
) -> SelectStatement {
    let mut statement =
        SelectStatement::from_table(boundary.table.clone(), boundary.alias.clone());
    statement.select = vec![SelectColumn::One];
    statement.conditions = correlation(tree, boundary);
    statement.conditions.extend(soft_delete(boundary));

    for node in tree.nodes() {
        if placements[node.id] != Placement::Semi(boundary.id) {
            continue;
        }
        if node.id != boundary.id {
            statement.joins.push(join(tree, node));
        }
        statement.conditions.extend(predicate(node));
    }
    statement.conditions.extend(deferred);
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compiler::{DatabaseBackendType, SqlCompiler};
    use crate::query::include::IncludeOptions;
    use crate::query::options::SelectOptions;
    use crate::query::where_clause::{ColumnRef, Where};
    use crate::test_fixtures::registry;

    fn render_for(root: &str, options: &SelectOptions) -> OqbResult<RenderedQuery> {
        let tree = JoinTree::build(&registry(), root, options)?;
        render(&tree, &options.order, options.limit, options.offset)
    }

    fn sql(statement: &SelectStatement) -> String {
        SqlCompiler::new(DatabaseBackendType::SQLite)
            .compile_select(statement)
            .sql
    }

    const CUSTOMER_COLUMNS: &str = "\"customer\".\"id\" AS \"customer.id\", \
        \"customer\".\"name\" AS \"customer.name\", \
        \"customer\".\"active\" AS \"customer.active\"";

    #[test]
    fn test_flat_root_only() {
        let q = render_for(
            "customer",
            &SelectOptions::new().order(Order::asc("name")),
        )
        .unwrap();
        assert_eq!(q.strategy, Strategy::Flat);
        assert_eq!(
            sql(&q.rows),
            format!(
                "SELECT {CUSTOMER_COLUMNS} FROM \"customer\" AS \"customer\" \
                 ORDER BY \"customer\".\"name\" ASC"
            )
        );
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\""
        );
    }

    #[test]
    fn test_flat_soft_delete_in_join() {
        let q = render_for("customer", &SelectOptions::new().include("companies")).unwrap();
        assert_eq!(q.strategy, Strategy::Flat);
        let rows = sql(&q.rows);
        assert!(rows.contains(
            "LEFT JOIN \"company\" AS \"customer->companies\" ON \
             (\"customer\".\"id\" = \"customer->companies\".\"customer_id\" AND \
             (\"customer->companies\".\"deleted_at\" IS NULL OR \
             \"customer->companies\".\"deleted_at\" > CURRENT_TIMESTAMP))"
        ));
        assert!(rows.contains("\"customer->companies\".\"name\" AS \"customer->companies.name\""));
    }

    #[test]
    fn test_root_soft_delete_in_where() {
        let q = render_for("company", &SelectOptions::new()).unwrap();
        assert!(sql(&q.rows).ends_with(
            "FROM \"company\" AS \"company\" WHERE \
             (\"company\".\"deleted_at\" IS NULL OR \"company\".\"deleted_at\" > CURRENT_TIMESTAMP)"
        ));

        let q = render_for("company", &SelectOptions::new().include_soft_deleted()).unwrap();
        assert!(!sql(&q.rows).contains("WHERE"));
        assert!(!sql(&q.count).contains("WHERE"));
    }

    #[test]
    fn test_required_fan_out_uses_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new().include(IncludeOptions::new("orders").required()),
        )
        .unwrap();
        assert_eq!(q.strategy, Strategy::Subquery);

        let exists = "EXISTS (SELECT 1 FROM \"order\" AS \"customer->orders\" \
                      WHERE \"customer\".\"id\" = \"customer->orders\".\"customer_id\")";
        assert_eq!(
            sql(&q.count),
            format!("SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" WHERE {exists}")
        );
        let rows = sql(&q.rows);
        assert!(rows.contains(&format!(
            "FROM (SELECT \"customer\".* FROM \"customer\" AS \"customer\" WHERE {exists}) AS \"customer\" \
             INNER JOIN \"order\" AS \"customer->orders\" ON \
             (\"customer\".\"id\" = \"customer->orders\".\"customer_id\")"
        )));
        assert!(rows.starts_with(&format!("SELECT {CUSTOMER_COLUMNS}, \"customer->orders\".\"id\"")));
    }

    #[test]
    fn test_limit_with_fan_out_paginates_inner() {
        let q = render_for(
            "customer",
            &SelectOptions::new().include("orders").limit(2).offset(1),
        )
        .unwrap();
        assert_eq!(q.strategy, Strategy::Subquery);
        let rows = sql(&q.rows);
        assert!(rows.contains(
            "FROM (SELECT \"customer\".* FROM \"customer\" AS \"customer\" LIMIT 2 OFFSET 1) AS \"customer\" \
             LEFT JOIN \"order\" AS \"customer->orders\""
        ));
        assert!(!rows.ends_with("OFFSET 1"));
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\""
        );
    }

    #[test]
    fn test_limit_without_fan_out_stays_flat() {
        let q = render_for("customer", &SelectOptions::new().include("value").limit(2)).unwrap();
        assert_eq!(q.strategy, Strategy::Flat);
        assert!(sql(&q.rows).ends_with("LIMIT 2"));
    }

    #[test]
    fn test_offset_requires_limit() {
        let q = render_for("customer", &SelectOptions::new().offset(2)).unwrap();
        assert!(!sql(&q.rows).contains("OFFSET"));
    }

    #[test]
    fn test_order_behind_fan_out_applies_outside_only() {
        let q = render_for(
            "customer",
            &SelectOptions::new()
                .include("orders")
                .order(Order::desc(ColumnRef::related(["orders"], "id")))
                .limit(2),
        )
        .unwrap();
        let rows = sql(&q.rows);
        assert!(rows.contains("(SELECT \"customer\".* FROM \"customer\" AS \"customer\" LIMIT 2)"));
        assert!(rows.ends_with("ORDER BY \"customer->orders\".\"id\" DESC"));
    }

    #[test]
    fn test_root_where_on_many_to_many_is_deferred_into_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(Where::eq(ColumnRef::related(["friends"], "name"), "Brendan")),
        )
        .unwrap();
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" WHERE EXISTS \
             (SELECT 1 FROM \"friend\" AS \"customer->through+friends\" \
             LEFT JOIN \"customer\" AS \"customer->friends\" ON \
             (\"customer->through+friends\".\"second_customer_id\" = \"customer->friends\".\"id\") \
             WHERE \"customer\".\"id\" = \"customer->through+friends\".\"first_customer_id\" \
             AND \"customer->friends\".\"name\" = ?)"
        );
        // The outer statement filters joined rows again.
        assert!(sql(&q.rows).ends_with("WHERE \"customer->friends\".\"name\" = ?"));
    }

    #[test]
    fn test_root_where_local_conjunct_stays_in_main_where() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(
                Where::eq("active", true)
                    .and(Where::eq(ColumnRef::related(["orders"], "status"), "PLACED")),
            ),
        )
        .unwrap();
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" \
             WHERE \"customer\".\"active\" = ? AND EXISTS \
             (SELECT 1 FROM \"order\" AS \"customer->orders\" \
             WHERE \"customer\".\"id\" = \"customer->orders\".\"customer_id\" \
             AND \"customer->orders\".\"status\" = ?)"
        );
    }

    #[test]
    fn test_or_across_two_fan_outs_gets_one_exists_per_branch() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(Where::any(vec![
                Where::eq(ColumnRef::related(["orders"], "status"), "PLACED"),
                Where::eq(ColumnRef::related(["companies"], "name"), "Target"),
            ])),
        )
        .unwrap();
        let count = sql(&q.count);
        assert!(count.starts_with(
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" \
             WHERE (EXISTS (SELECT 1 FROM \"order\" AS \"customer->orders\""
        ));
        assert!(count.contains(" OR EXISTS (SELECT 1 FROM \"company\" AS \"customer->companies\""));
    }

    #[test]
    fn test_filter_tying_two_fan_outs_to_one_row_is_invalid() {
        let err = render_for(
            "customer",
            &SelectOptions::new().filter(Where::all(vec![
                Where::eq(ColumnRef::related(["orders"], "status"), "PLACED"),
                Where::any(vec![
                    Where::gt(ColumnRef::related(["orders"], "id"), 1_i64),
                    Where::eq(ColumnRef::related(["companies"], "name"), "Target"),
                ]),
            ])),
        )
        .unwrap_err();
        assert!(matches!(err, OqbError::InvalidQuery(_)));
    }

    #[test]
    fn test_or_with_root_column_keeps_root_branch_outside_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(Where::any(vec![
                Where::eq("name", "Michael"),
                Where::eq(ColumnRef::related(["orders"], "status"), "PLACED"),
            ])),
        )
        .unwrap();
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" \
             WHERE (\"customer\".\"name\" = ? OR EXISTS \
             (SELECT 1 FROM \"order\" AS \"customer->orders\" \
             WHERE \"customer\".\"id\" = \"customer->orders\".\"customer_id\" \
             AND \"customer->orders\".\"status\" = ?))"
        );
    }

    #[test]
    fn test_same_row_filters_share_one_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(Where::all(vec![
                Where::eq(ColumnRef::related(["orders"], "status"), "PLACED"),
                Where::any(vec![
                    Where::eq("name", "Jordan"),
                    Where::gt(ColumnRef::related(["orders"], "id"), 3_i64),
                ]),
            ])),
        )
        .unwrap();
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" WHERE EXISTS \
             (SELECT 1 FROM \"order\" AS \"customer->orders\" \
             WHERE \"customer\".\"id\" = \"customer->orders\".\"customer_id\" \
             AND \"customer->orders\".\"status\" = ? \
             AND (\"customer\".\"name\" = ? OR \"customer->orders\".\"id\" > ?))"
        );
    }

    #[test]
    fn test_is_null_on_optional_fan_out_also_matches_childless_roots() {
        let q = render_for(
            "customer",
            &SelectOptions::new().filter(Where::eq(ColumnRef::related(["orders"], "id"), Value::Null)),
        )
        .unwrap();
        let correlated = "FROM \"order\" AS \"customer->orders\" \
                          WHERE \"customer\".\"id\" = \"customer->orders\".\"customer_id\"";
        assert_eq!(
            sql(&q.count),
            format!(
                "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" \
                 WHERE (EXISTS (SELECT 1 {correlated} AND \"customer->orders\".\"id\" IS NULL) \
                 OR (NOT EXISTS (SELECT 1 {correlated})))"
            )
        );
    }

    #[test]
    fn test_null_extended_evaluation() {
        let behind = |alias: &str| alias == "customer->orders";
        let status = Where::eq(ColumnRef::related(["orders"], "status"), "PLACED");
        let missing = Where::eq(ColumnRef::related(["orders"], "id"), Value::Null);

        assert_eq!(null_extended(&status, "customer", &behind), Truth::False);
        assert_eq!(null_extended(&missing, "customer", &behind), Truth::True);
        assert_eq!(
            null_extended(
                &Where::neq(ColumnRef::related(["orders"], "id"), Value::Null),
                "customer",
                &behind
            ),
            Truth::False
        );
        assert_eq!(
            null_extended(
                &Where::any(vec![status.clone(), missing.clone()]),
                "customer",
                &behind
            ),
            Truth::True
        );
        assert_eq!(
            null_extended(
                &Where::all(vec![Where::eq("name", "Jordan"), missing]),
                "customer",
                &behind
            ),
            Truth::When(Condition::And(vec![Where::eq("name", "Jordan")
                .to_condition("customer")
                .unwrap()]))
        );
        assert_eq!(
            null_extended(&Where::all(vec![Where::eq("name", "Jordan"), status]), "customer", &behind),
            Truth::False
        );
    }

    #[test]
    fn test_include_where_is_evaluated_inside_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new()
                .include(IncludeOptions::new("companies").filter(Where::eq("name", "Target"))),
        )
        .unwrap();
        assert_eq!(
            sql(&q.count),
            "SELECT COUNT(*) AS \"count\" FROM \"customer\" AS \"customer\" WHERE EXISTS \
             (SELECT 1 FROM \"company\" AS \"customer->companies\" \
             WHERE \"customer\".\"id\" = \"customer->companies\".\"customer_id\" \
             AND (\"customer->companies\".\"deleted_at\" IS NULL OR \
             \"customer->companies\".\"deleted_at\" > CURRENT_TIMESTAMP) \
             AND \"customer->companies\".\"name\" = ?)"
        );
    }

    #[test]
    fn test_each_independent_fan_out_gets_its_own_exists() {
        let q = render_for(
            "customer",
            &SelectOptions::new().include(vec![
                IncludeOptions::new("orders").required(),
                IncludeOptions::new("friends").required(),
            ]),
        )
        .unwrap();
        let count = sql(&q.count);
        assert_eq!(count.matches("EXISTS").count(), 2);
        assert!(count.contains("EXISTS (SELECT 1 FROM \"friend\" AS \"customer->through+friends\" \
             INNER JOIN \"customer\" AS \"customer->friends\""));
    }

    #[test]
    fn test_to_one_order_kept_in_inner() {
        let q = render_for(
            "order",
            &SelectOptions::new()
                .filter(Where::eq("status", "PLACED"))
                .order(Order::asc(ColumnRef::related(["customer"], "name"))),
        )
        .unwrap();
        assert_eq!(q.strategy, Strategy::Subquery);
        let rows = sql(&q.rows);
        assert!(rows.contains(
            "(SELECT \"order\".* FROM \"order\" AS \"order\" \
             LEFT JOIN \"customer\" AS \"order->customer\" ON \
             (\"order\".\"customer_id\" = \"order->customer\".\"id\") \
             WHERE \"order\".\"status\" = ? ORDER BY \"order->customer\".\"name\" ASC) AS \"order\""
        ));
    }

    #[test]
    fn test_hidden_nodes_select_no_columns() {
        let q = render_for(
            "customer",
            &SelectOptions::new().order(Order::desc(ColumnRef::related(["orders"], "id"))),
        )
        .unwrap();
        let rows = sql(&q.rows);
        assert!(rows.starts_with(&format!("SELECT {CUSTOMER_COLUMNS} FROM")));
        assert!(rows.contains("LEFT JOIN \"order\" AS \"customer->orders\""));
    }
}
