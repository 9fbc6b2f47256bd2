//! Nested hydration of flat result rows.
//!
//! [`hydrate`] reads rows whose columns are keyed `"<alias>.<column>"` and
//! rebuilds the nested objects described by a [`ShapeDescriptor`]. Each
//! shape node keeps a cache keyed by its identity columns, so a parent
//! repeated across rows is materialized once, and a linked set guarantees a
//! to-many child is appended to a given parent at most once.
//!
//! Objects are kept in an arena while rows are read and turned into
//! `serde_json::Value`s at the end, so objects linked earlier still see
//! values appended by later rows.

use std::collections::{HashMap, HashSet};

use oqb_core::{OqbError, OqbResult};

use crate::query::compiler::Row;
use crate::query::join_tree::{Binding, Cardinality, Shape, ShapeDescriptor};
use crate::value::Value;

type ObjectId = usize;

/// Hydrates `rows` into a list of root objects, or into the first root
/// object (or `null`) when the descriptor is not plural.
///
/// Row order is preserved: roots appear in the order they are first seen.
///
/// # Examples
///
/// ```
/// use oqb_db::hydrate::hydrate;
/// use oqb_db::query::join_tree::{Binding, Shape, ShapeDescriptor};
/// use oqb_db::entity::ColumnType;
/// use oqb_db::query::compiler::Row;
/// use oqb_db::value::Value;
///
/// let shape = ShapeDescriptor {
///     root: Shape {
///         bindings: vec![Binding {
///             property: "id".into(),
///             source: "customer.id".into(),
///             is_identity: true,
///             column_type: ColumnType::Integer,
///             default: None,
///             array: false,
///         }],
///         children: vec![],
///     },
///     plural: true,
/// };
/// let rows = vec![
///     Row::new(vec!["customer.id".into()], vec![Value::Int(1)]),
///     Row::new(vec!["customer.id".into()], vec![Value::Int(1)]),
/// ];
/// assert_eq!(hydrate(&rows, &shape)?, serde_json::json!([{"id": 1}]));
/// # Ok::<(), oqb_core::OqbError>(())
/// ```
pub fn hydrate(rows: &[Row], descriptor: &ShapeDescriptor) -> OqbResult<serde_json::Value> {
    let Some(first) = rows.first() else {
        return Ok(if descriptor.plural {
            serde_json::Value::Array(Vec::new())
        } else {
            serde_json::Value::Null
        });
    };

    let mut nodes = Vec::new();
    flatten(&descriptor.root, None, &mut nodes);
    let columns = ColumnIndex::new(first, &nodes)?;

    let mut state = Hydration {
        objects: Vec::new(),
        caches: vec![HashMap::new(); nodes.len()],
        linked: HashSet::new(),
        roots: Vec::new(),
    };
    for row in rows {
        state.read_row(row, &nodes, &columns);
    }

    if descriptor.plural {
        Ok(serde_json::Value::Array(
            state
                .roots
                .iter()
                .map(|id| state.materialize(*id, &descriptor.root))
                .collect(),
        ))
    } else {
        Ok(state
            .roots
            .first()
            .map_or(serde_json::Value::Null, |id| {
                state.materialize(*id, &descriptor.root)
            }))
    }
}

/// A shape node with its position in the parent object.
struct FlatNode<'s> {
    shape: &'s Shape,
    parent: Option<usize>,
    /// Index of this node's slot among the parent's fields.
    slot: usize,
    cardinality: Cardinality,
}

fn flatten<'s>(shape: &'s Shape, parent: Option<(usize, usize, Cardinality)>, out: &mut Vec<FlatNode<'s>>) {
    let index = out.len();
    let (parent, slot, cardinality) = match parent {
        Some((p, slot, cardinality)) => (Some(p), slot, cardinality),
        None => (None, 0, Cardinality::Many),
    };
    out.push(FlatNode {
        shape,
        parent,
        slot,
        cardinality,
    });
    for (i, child) in shape.children.iter().enumerate() {
        flatten(
            &child.shape,
            Some((index, shape.bindings.len() + i, child.cardinality)),
            out,
        );
    }
}

/// Row positions of every binding, resolved once from the first row.
struct ColumnIndex {
    positions: Vec<Vec<usize>>,
}

impl ColumnIndex {
    fn new(row: &Row, nodes: &[FlatNode<'_>]) -> OqbResult<Self> {
        let by_name: HashMap<&str, usize> = row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let positions = nodes
            .iter()
            .map(|node| {
                node.shape
                    .bindings
                    .iter()
                    .map(|b| {
                        by_name.get(b.source.as_str()).copied().ok_or_else(|| {
                            OqbError::DatabaseError(format!(
                                "result rows have no column '{}'",
                                b.source
                            ))
                        })
                    })
                    .collect::<OqbResult<Vec<_>>>()
            })
            .collect::<OqbResult<Vec<_>>>()?;
        Ok(Self { positions })
    }
}

#[derive(Debug, Clone)]
enum Field {
    Scalar(serde_json::Value),
    List(Vec<serde_json::Value>),
    One(Option<ObjectId>),
    Many(Vec<ObjectId>),
}

struct Hydration {
    objects: Vec<Vec<Field>>,
    /// Per shape node: identity key to object.
    caches: Vec<HashMap<String, ObjectId>>,
    /// `(shape node, parent key, child key)` links already made.
    linked: HashSet<(usize, String, String)>,
    roots: Vec<ObjectId>,
}

impl Hydration {
    fn read_row(&mut self, row: &Row, nodes: &[FlatNode<'_>], columns: &ColumnIndex) {
        let values = row.values();
        let mut resolved: Vec<Option<(ObjectId, String)>> = vec![None; nodes.len()];

        for (index, node) in nodes.iter().enumerate() {
            let parent = match node.parent {
                Some(p) => match &resolved[p] {
                    Some(parent) => Some(parent.clone()),
                    None => continue,
                },
                None => None,
            };

            let cells: Vec<&Value> = columns.positions[index].iter().map(|i| &values[*i]).collect();
            let Some(key) = identity(node.shape, &cells) else {
                continue;
            };

            let object = match self.caches[index].get(&key) {
                Some(&existing) => {
                    self.append_arrays(existing, node.shape, &cells);
                    existing
                }
                None => {
                    let id = self.create(node.shape, &cells);
                    self.caches[index].insert(key.clone(), id);
                    if node.parent.is_none() {
                        self.roots.push(id);
                    }
                    id
                }
            };

            if let Some((parent_id, parent_key)) = parent {
                match node.cardinality {
                    Cardinality::One => {
                        self.objects[parent_id][node.slot] = Field::One(Some(object));
                    }
                    Cardinality::Many => {
                        if self.linked.insert((index, parent_key, key.clone())) {
                            if let Field::Many(children) = &mut self.objects[parent_id][node.slot] {
                                children.push(object);
                            }
                        }
                    }
                }
            }

            resolved[index] = Some((object, key));
        }
    }

    fn create(&mut self, shape: &Shape, cells: &[&Value]) -> ObjectId {
        let mut fields: Vec<Field> = shape
            .bindings
            .iter()
            .zip(cells)
            .map(|(binding, cell)| {
                let value = cell_json(binding, cell);
                if binding.array {
                    Field::List(vec![value])
                } else {
                    Field::Scalar(value)
                }
            })
            .collect();
        fields.extend(shape.children.iter().map(|child| match child.cardinality {
            Cardinality::One => Field::One(None),
            Cardinality::Many => Field::Many(Vec::new()),
        }));
        self.objects.push(fields);
        self.objects.len() - 1
    }

    fn append_arrays(&mut self, object: ObjectId, shape: &Shape, cells: &[&Value]) {
        for (i, (binding, cell)) in shape.bindings.iter().zip(cells).enumerate() {
            if !binding.array {
                continue;
            }
            if let Field::List(items) = &mut self.objects[object][i] {
                items.push(cell_json(binding, cell));
            }
        }
    }

    fn materialize(&self, id: ObjectId, shape: &Shape) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        let names = shape
            .bindings
            .iter()
            .map(|b| (b.property.as_str(), None))
            .chain(shape.children.iter().map(|c| (c.slot.as_str(), Some(&c.shape))));
        for ((name, child_shape), field) in names.zip(&self.objects[id]) {
            let value = match (field, child_shape) {
                (Field::Scalar(value), _) => value.clone(),
                (Field::List(items), _) => serde_json::Value::Array(items.clone()),
                (Field::One(Some(child)), Some(child_shape)) => self.materialize(*child, child_shape),
                (Field::Many(children), Some(child_shape)) => serde_json::Value::Array(
                    children
                        .iter()
                        .map(|child| self.materialize(*child, child_shape))
                        .collect(),
                ),
                _ => serde_json::Value::Null,
            };
            map.insert(name.to_string(), value);
        }
        serde_json::Value::Object(map)
    }
}

/// The identity key of one shape node in one row, or `None` when an
/// identity column is null without a default.
fn identity(shape: &Shape, cells: &[&Value]) -> Option<String> {
    let has_identity = shape.bindings.iter().any(|b| b.is_identity);
    let mut parts = Vec::new();
    for (binding, cell) in shape.bindings.iter().zip(cells) {
        if has_identity && !binding.is_identity {
            continue;
        }
        let value = match (cell, &binding.default) {
            (Value::Null, Some(default)) => default,
            (Value::Null, None) if has_identity => return None,
            _ => *cell,
        };
        parts.push(value);
    }
    if parts.is_empty() || parts.iter().all(|v| v.is_null()) {
        return None;
    }
    Some(format!("{parts:?}"))
}

/// Coerces one cell to its declared type, substituting the default for null.
fn cell_json(binding: &Binding, cell: &Value) -> serde_json::Value {
    let value = match (cell, &binding.default) {
        (Value::Null, Some(default)) => default.clone(),
        _ => cell.clone(),
    };
    value.coerce(binding.column_type).to_json()
}
