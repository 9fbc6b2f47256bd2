//! Join trees and shape descriptors.
//!
//! [`JoinTree::build`] resolves a find request against the [`Registry`]:
//! every included association becomes a [`JoinNode`], and every node that is
//! surfaced in the output contributes a [`Shape`] to the
//! [`ShapeDescriptor`] that drives hydration.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Ids follow a depth-first
//! pre-order walk, so a node's id is always greater than its parent's.
//!
//! Relation paths referenced by the root `where`, by `order`, or by an
//! include-local `where` are forced into the tree. A path that was not
//! included is joined as a hidden node: it takes part in the SQL but has no
//! shape and selects no columns.
//!
//! After construction one reverse pass over the arena ORs each node's
//! `required` and `include_in_subquery` flags into its parent, so a flag set
//! anywhere holds on every ancestor up to the root.

use oqb_core::{OqbError, OqbResult};

use super::include::{normalize, IncludeMap};
use super::options::SelectOptions;
use super::where_clause::Where;
use super::{ALIAS_SEPARATOR, THROUGH_PREFIX};
use crate::association::{AssociationKind, KeyMap};
use crate::entity::{Column, ColumnType, Entity};
use crate::registry::Registry;
use crate::value::Value;

/// Index of a node in a [`JoinTree`].
pub type NodeId = usize;

/// One table occurrence in a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub id: NodeId,
    /// Table name.
    pub table: String,
    pub alias: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// `(parent column, this column)` join pairs. Empty at the root.
    pub key_map: KeyMap,
    /// Inner join, and the paginated stage must enforce it.
    pub required: bool,
    /// Must be present in the paginated stage for filtering or ordering.
    pub include_in_subquery: bool,
    /// Joining this node can multiply parent rows.
    pub is_fan_out: bool,
    pub include_soft_deleted: bool,
    pub soft_delete_column: Option<String>,
    pub where_clause: Option<Where>,
    /// Columns selected for hydration. Empty when the node is not surfaced.
    pub selected: Vec<String>,
}

impl JoinNode {
    /// The soft-delete marker to filter on, if any.
    pub fn soft_delete_filter(&self) -> Option<&str> {
        if self.include_soft_deleted {
            None
        } else {
            self.soft_delete_column.as_deref()
        }
    }
}

/// Tree-wide facts gathered while building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinTreeMeta {
    /// Some joined association can multiply root rows.
    pub has_fan_out: bool,
}

/// Binds one output property to a selected column.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub property: String,
    /// Result column key, `"<alias>.<column>"`.
    pub source: String,
    pub is_identity: bool,
    pub column_type: ColumnType,
    pub default: Option<Value>,
    /// Collect values across rows into a list.
    pub array: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A nested slot of a [`Shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeChild {
    pub slot: String,
    pub cardinality: Cardinality,
    pub shape: Shape,
}

/// Output shape of one entity appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub bindings: Vec<Binding>,
    pub children: Vec<ShapeChild>,
}

impl Shape {
    fn from_columns<'c>(alias: &str, columns: impl IntoIterator<Item = &'c Column>) -> Self {
        Self {
            bindings: columns
                .into_iter()
                .map(|c| Binding {
                    property: c.name.clone(),
                    source: format!("{alias}.{}", c.name),
                    is_identity: c.primary,
                    column_type: c.column_type,
                    default: c.default.clone(),
                    array: c.array,
                })
                .collect(),
            children: Vec::new(),
        }
    }

    /// Looks up a nested slot.
    pub fn child(&self, slot: &str) -> Option<&ShapeChild> {
        self.children.iter().find(|c| c.slot == slot)
    }
}

/// The shape tree plus whether a list or a single object is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDescriptor {
    pub root: Shape,
    pub plural: bool,
}

/// A compiled join tree.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTree {
    nodes: Vec<JoinNode>,
    pub meta: JoinTreeMeta,
    pub shape: ShapeDescriptor,
}

impl JoinTree {
    /// Builds the tree for a find request rooted at `root`.
    ///
    /// Fails with `UnknownEntity` or `UnknownRelationship` for names missing
    /// from the registry, and with `InvalidQuery` when a join-table filter
    /// refers to related columns.
    pub fn build(registry: &Registry, root: &str, options: &SelectOptions) -> OqbResult<Self> {
        let entity = registry.entity(root)?;

        let mut include = options
            .include
            .as_ref()
            .map(normalize)
            .unwrap_or_default();
        force_local_paths(&mut include);
        if let Some(where_clause) = &options.where_clause {
            for path in where_clause.relationship_paths() {
                include.force_path(&path);
            }
        }
        for order in &options.order {
            include.force_path(order.column.relation());
        }

        let projection = Projection {
            attributes: options.attributes.as_deref(),
            exclude: options.exclude_attributes.as_deref(),
        };
        let columns = projection.columns(entity);

        let mut builder = TreeBuilder {
            registry,
            nodes: Vec::new(),
            has_fan_out: false,
        };
        let root_id = builder.push(JoinNode {
            id: 0,
            table: entity.name().to_string(),
            alias: entity.name().to_string(),
            parent: None,
            children: Vec::new(),
            key_map: KeyMap::new(),
            required: options.where_clause.is_some(),
            include_in_subquery: false,
            is_fan_out: false,
            include_soft_deleted: options.include_soft_deleted,
            soft_delete_column: entity.soft_delete_column().map(str::to_string),
            where_clause: options.where_clause.clone(),
            selected: columns.iter().map(|c| c.name.clone()).collect(),
        });

        let mut shape = Shape::from_columns(entity.name(), columns);
        builder.add_children(root_id, entity, &include, projection, Some(&mut shape))?;
        builder.propagate();

        tracing::trace!(
            root,
            nodes = builder.nodes.len(),
            has_fan_out = builder.has_fan_out,
            "join tree built"
        );

        Ok(Self {
            nodes: builder.nodes,
            meta: JoinTreeMeta {
                has_fan_out: builder.has_fan_out,
            },
            shape: ShapeDescriptor {
                root: shape,
                plural: true,
            },
        })
    }

    pub fn root(&self) -> &JoinNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &JoinNode {
        &self.nodes[id]
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<&JoinNode> {
        self.nodes.iter().find(|n| n.alias == alias)
    }
}

/// Forces relation paths of include-local filters, relative to the include.
fn force_local_paths(include: &mut IncludeMap) {
    for entry in include.iter_mut() {
        if let Some(where_clause) = &entry.where_clause {
            for path in where_clause.relationship_paths() {
                entry.include.force_path(&path);
            }
        }
        force_local_paths(&mut entry.include);
    }
}

/// Column and association projection of one node.
#[derive(Debug, Clone, Copy, Default)]
struct Projection<'o> {
    attributes: Option<&'o [String]>,
    exclude: Option<&'o [String]>,
}

impl Projection<'_> {
    /// Columns kept, in entity order. Primary key columns are always kept,
    /// and `attributes` wins over `exclude`.
    fn columns<'e>(&self, entity: &'e Entity) -> Vec<&'e Column> {
        entity
            .columns()
            .iter()
            .filter(|c| {
                c.primary
                    || match (self.attributes, self.exclude) {
                        (Some(attributes), _) => attributes.contains(&c.name),
                        (None, Some(exclude)) => !exclude.contains(&c.name),
                        (None, None) => true,
                    }
            })
            .collect()
    }

    /// Whether a nested association is surfaced.
    fn allows(&self, association: &str) -> bool {
        self.attributes
            .map_or(true, |a| a.iter().any(|n| n == association))
            && !self.exclude.is_some_and(|e| e.iter().any(|n| n == association))
    }
}

struct TreeBuilder<'r> {
    registry: &'r Registry,
    nodes: Vec<JoinNode>,
    has_fan_out: bool,
}

impl<'r> TreeBuilder<'r> {
    fn push(&mut self, mut node: JoinNode) -> NodeId {
        let id = self.nodes.len();
        node.id = id;
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    fn add_children(
        &mut self,
        parent_id: NodeId,
        parent_entity: &'r Entity,
        include: &IncludeMap,
        projection: Projection<'_>,
        mut shape: Option<&mut Shape>,
    ) -> OqbResult<()> {
        let registry = self.registry;
        for entry in include.iter() {
            let name = entry.association.as_str();
            let association = parent_entity.require_association(name)?;
            let target = registry.entity(&association.target)?;
            if association.kind.is_fan_out() {
                self.has_fan_out = true;
            }

            let visible = shape.is_some() && !entry.hidden && projection.allows(name);
            let parent_alias = self.nodes[parent_id].alias.clone();

            let (join_parent, through_shape) = match &association.through {
                Some(through) => {
                    let through_entity = registry.entity(&through.entity)?;
                    let options = entry.through.clone().unwrap_or_default();
                    if let Some(where_clause) = &options.where_clause {
                        if !where_clause.relationship_paths().is_empty() {
                            return Err(OqbError::InvalidQuery(format!(
                                "join table filter of '{name}' may only use columns of '{}'",
                                through_entity.name()
                            )));
                        }
                    }
                    let alias = format!("{parent_alias}{ALIAS_SEPARATOR}{THROUGH_PREFIX}{name}");
                    let through_shape =
                        visible.then(|| Shape::from_columns(&alias, through_entity.columns()));
                    let through_id = self.push(JoinNode {
                        id: 0,
                        table: through_entity.name().to_string(),
                        alias,
                        parent: Some(parent_id),
                        children: Vec::new(),
                        key_map: through.key_map.clone(),
                        required: options.where_clause.is_some(),
                        include_in_subquery: false,
                        is_fan_out: true,
                        include_soft_deleted: options.include_soft_deleted,
                        soft_delete_column: through_entity.soft_delete_column().map(str::to_string),
                        where_clause: options.where_clause,
                        selected: if visible {
                            through_entity
                                .column_names()
                                .into_iter()
                                .map(str::to_string)
                                .collect()
                        } else {
                            Vec::new()
                        },
                    });
                    (through_id, through_shape)
                }
                None => (parent_id, None),
            };

            let child_projection = Projection {
                attributes: entry.attributes.as_deref(),
                exclude: entry.exclude_attributes.as_deref(),
            };
            let columns = child_projection.columns(target);
            let alias = format!("{parent_alias}{ALIAS_SEPARATOR}{name}");
            let mut target_shape = visible.then(|| Shape::from_columns(&alias, columns.iter().copied()));

            let target_id = self.push(JoinNode {
                id: 0,
                table: target.name().to_string(),
                alias,
                parent: Some(join_parent),
                children: Vec::new(),
                key_map: association.key_map.clone(),
                required: entry.required || entry.where_clause.is_some(),
                include_in_subquery: entry.include_in_subquery,
                is_fan_out: association.kind == AssociationKind::OwnsMany,
                include_soft_deleted: entry.include_soft_deleted,
                soft_delete_column: target.soft_delete_column().map(str::to_string),
                where_clause: entry.where_clause.clone(),
                selected: if visible {
                    columns.iter().map(|c| c.name.clone()).collect()
                } else {
                    Vec::new()
                },
            });

            self.add_children(
                target_id,
                target,
                &entry.include,
                child_projection,
                target_shape.as_mut(),
            )?;

            if let (Some(parent_shape), Some(target_shape)) = (shape.as_deref_mut(), target_shape) {
                let child = match through_shape {
                    Some(mut through_shape) => {
                        through_shape.children.push(ShapeChild {
                            slot: association.target_slot_name(),
                            cardinality: Cardinality::One,
                            shape: target_shape,
                        });
                        ShapeChild {
                            slot: name.to_string(),
                            cardinality: Cardinality::Many,
                            shape: through_shape,
                        }
                    }
                    None => ShapeChild {
                        slot: name.to_string(),
                        cardinality: if association.kind.is_to_many() {
                            Cardinality::Many
                        } else {
                            Cardinality::One
                        },
                        shape: target_shape,
                    },
                };
                parent_shape.children.push(child);
            }
        }
        Ok(())
    }

    /// ORs every node's flags into its parent. Children always have larger
    /// ids, so one reverse pass reaches the root.
    fn propagate(&mut self) {
        for id in (1..self.nodes.len()).rev() {
            let (required, include_in_subquery) =
                (self.nodes[id].required, self.nodes[id].include_in_subquery);
            if let Some(parent) = self.nodes[id].parent {
                self.nodes[parent].required |= required;
                self.nodes[parent].include_in_subquery |= include_in_subquery;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::include::{IncludeOptions, ThroughOptions};
    use crate::query::options::Order;
    use crate::query::where_clause::ColumnRef;
    use crate::test_fixtures::registry;

    fn build(options: &SelectOptions) -> JoinTree {
        JoinTree::build(&registry(), "customer", options).unwrap()
    }

    fn aliases(tree: &JoinTree) -> Vec<&str> {
        tree.nodes().iter().map(|n| n.alias.as_str()).collect()
    }

    #[test]
    fn test_root_only() {
        let tree = build(&SelectOptions::new());
        assert_eq!(aliases(&tree), vec!["customer"]);
        assert!(!tree.meta.has_fan_out);
        assert!(!tree.root().required);
        let props: Vec<&str> = tree.shape.root.bindings.iter().map(|b| b.property.as_str()).collect();
        assert_eq!(props, vec!["id", "name", "active"]);
        assert_eq!(tree.shape.root.bindings[0].source, "customer.id");
        assert!(tree.shape.root.bindings[0].is_identity);
        assert!(tree.shape.plural);
    }

    #[test]
    fn test_has_many_is_fan_out() {
        let tree = build(&SelectOptions::new().include("orders"));
        assert_eq!(aliases(&tree), vec!["customer", "customer->orders"]);
        assert!(tree.meta.has_fan_out);
        let orders = tree.node(1);
        assert!(orders.is_fan_out);
        assert_eq!(orders.parent, Some(0));
        assert_eq!(orders.key_map, vec![("id".to_string(), "customer_id".to_string())]);
        let slot = tree.shape.root.child("orders").unwrap();
        assert_eq!(slot.cardinality, Cardinality::Many);
        assert_eq!(slot.shape.bindings[0].source, "customer->orders.id");
    }

    #[test]
    fn test_has_one_is_not_fan_out() {
        let tree = build(&SelectOptions::new().include("value"));
        assert!(!tree.meta.has_fan_out);
        assert!(!tree.node(1).is_fan_out);
        assert_eq!(
            tree.shape.root.child("value").unwrap().cardinality,
            Cardinality::One
        );
    }

    #[test]
    fn test_many_to_many_through_node() {
        let tree = build(&SelectOptions::new().include("friends"));
        assert_eq!(
            aliases(&tree),
            vec!["customer", "customer->through+friends", "customer->friends"]
        );
        let through = tree.node(1);
        assert!(through.is_fan_out);
        assert_eq!(through.table, "friend");
        assert_eq!(
            through.key_map,
            vec![("id".to_string(), "first_customer_id".to_string())]
        );
        let target = tree.node(2);
        assert_eq!(target.parent, Some(1));
        assert!(!target.is_fan_out);
        assert_eq!(
            target.key_map,
            vec![("second_customer_id".to_string(), "id".to_string())]
        );

        let slot = tree.shape.root.child("friends").unwrap();
        assert_eq!(slot.cardinality, Cardinality::Many);
        assert_eq!(slot.shape.bindings.len(), 2);
        assert!(slot.shape.bindings.iter().all(|b| b.is_identity));
        let nested = slot.shape.child("friend").unwrap();
        assert_eq!(nested.cardinality, Cardinality::One);
        assert_eq!(nested.shape.bindings[0].source, "customer->friends.id");
    }

    #[test]
    fn test_required_propagates_to_root() {
        let tree = build(&SelectOptions::new().include(
            IncludeOptions::new("orders").include(IncludeOptions::new("customer").required()),
        ));
        assert!(tree.node(2).required);
        assert!(tree.node(1).required);
        assert!(tree.root().required);
    }

    #[test]
    fn test_include_where_implies_required() {
        let tree = build(
            &SelectOptions::new()
                .include(IncludeOptions::new("orders").filter(Where::eq("status", "PLACED"))),
        );
        assert!(tree.node(1).required);
        assert!(tree.root().required);
    }

    #[test]
    fn test_through_where_requires_through_node() {
        let tree = build(&SelectOptions::new().include(IncludeOptions::new("friends").through(
            ThroughOptions {
                where_clause: Some(Where::gt("second_customer_id", 2_i64)),
                include_soft_deleted: false,
            },
        )));
        assert!(tree.node(1).required);
        assert!(!tree.node(2).required);
        assert!(tree.root().required);
    }

    #[test]
    fn test_through_where_with_relation_is_invalid() {
        let options = SelectOptions::new().include(IncludeOptions::new("friends").through(
            ThroughOptions {
                where_clause: Some(Where::eq(ColumnRef::related(["orders"], "id"), 1_i64)),
                include_soft_deleted: false,
            },
        ));
        let err = JoinTree::build(&registry(), "customer", &options).unwrap_err();
        assert!(matches!(err, OqbError::InvalidQuery(_)));
    }

    #[test]
    fn test_root_where_marks_root_required() {
        let tree = build(&SelectOptions::new().filter(Where::eq("name", "Jordan")));
        assert!(tree.root().required);
        assert_eq!(tree.nodes().len(), 1);
    }

    #[test]
    fn test_order_path_forces_hidden_node() {
        let tree = build(
            &SelectOptions::new().order(Order::desc(ColumnRef::related(["orders"], "id"))),
        );
        assert_eq!(aliases(&tree), vec!["customer", "customer->orders"]);
        let orders = tree.node(1);
        assert!(orders.include_in_subquery);
        assert!(!orders.required);
        assert!(orders.selected.is_empty());
        assert!(tree.root().include_in_subquery);
        assert!(tree.shape.root.children.is_empty());
    }

    #[test]
    fn test_order_path_on_included_node_keeps_shape() {
        let tree = build(
            &SelectOptions::new()
                .include("orders")
                .order(Order::desc(ColumnRef::related(["orders"], "id"))),
        );
        assert_eq!(tree.nodes().len(), 2);
        assert!(tree.node(1).include_in_subquery);
        assert!(tree.shape.root.child("orders").is_some());
    }

    #[test]
    fn test_where_path_through_many_to_many() {
        let tree = build(
            &SelectOptions::new().filter(Where::eq(ColumnRef::related(["friends"], "name"), "Brendan")),
        );
        assert_eq!(
            aliases(&tree),
            vec!["customer", "customer->through+friends", "customer->friends"]
        );
        assert!(tree.node(2).include_in_subquery);
        assert!(tree.node(1).include_in_subquery);
    }

    #[test]
    fn test_include_local_where_path_is_relative() {
        let tree = build(&SelectOptions::new().include(
            IncludeOptions::new("orders")
                .filter(Where::eq(ColumnRef::related(["customer"], "name"), "Jordan")),
        ));
        assert_eq!(
            aliases(&tree),
            vec!["customer", "customer->orders", "customer->orders->customer"]
        );
        assert!(tree.node(2).include_in_subquery);
        assert!(tree.node(2).selected.is_empty());
    }

    #[test]
    fn test_unknown_relationship() {
        let err = JoinTree::build(&registry(), "customer", &SelectOptions::new().include("invoices"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot find association: invoices on entity: customer"
        );

        let err = JoinTree::build(
            &registry(),
            "customer",
            &SelectOptions::new().order(Order::asc(ColumnRef::related(["invoices"], "id"))),
        )
        .unwrap_err();
        assert!(matches!(err, OqbError::UnknownRelationship { .. }));
    }

    #[test]
    fn test_attributes_keep_primary_key() {
        let tree = build(&SelectOptions::new().attributes(["name"]));
        let props: Vec<&str> = tree.shape.root.bindings.iter().map(|b| b.property.as_str()).collect();
        assert_eq!(props, vec!["id", "name"]);
        assert_eq!(tree.root().selected, vec!["id", "name"]);
    }

    #[test]
    fn test_exclude_attributes_never_drops_primary_key() {
        let tree = build(&SelectOptions::new().exclude_attributes(["id", "active"]));
        let props: Vec<&str> = tree.shape.root.bindings.iter().map(|b| b.property.as_str()).collect();
        assert_eq!(props, vec!["id", "name"]);
    }

    #[test]
    fn test_excluded_association_still_joins() {
        let tree = build(
            &SelectOptions::new()
                .include(IncludeOptions::new("orders").include("customer"))
                .exclude_attributes(["orders"]),
        );
        assert_eq!(tree.nodes().len(), 3);
        assert!(tree.shape.root.children.is_empty());
        assert!(tree.node(1).selected.is_empty());
        assert!(tree.node(2).selected.is_empty());
    }

    #[test]
    fn test_soft_delete_filter() {
        let tree = build(&SelectOptions::new().include("companies"));
        assert_eq!(tree.node(1).soft_delete_filter(), Some("deleted_at"));

        let tree = build(
            &SelectOptions::new().include(IncludeOptions::new("companies").include_soft_deleted()),
        );
        assert_eq!(tree.node(1).soft_delete_filter(), None);
    }
}
