//! Named relationships between entities.
//!
//! Each [`Association`] is a directional edge from its owning entity to a
//! target entity. The key map pairs a column on the parent side of the join
//! with a column on the child side, in that order, so a join condition is
//! always `parent.k = child.v` for each `(k, v)`.
//!
//! | kind | key map | example |
//! |---|---|---|
//! | `OwnsOne` | `owner.pk → target.fk` | customer has one value |
//! | `OwnsMany` | `owner.pk → target.fk` | customer has many orders |
//! | `BelongsToOne` | `owner.fk → target.pk` | order belongs to customer |
//! | `ManyToManyThrough` | `through.to → target.pk`, plus `owner.pk → through.from` | customer has many friends through `friend` |

use oqb_core::utils::text::singularize;

/// Ordered `(parent column, child column)` pairs.
pub type KeyMap = Vec<(String, String)>;

/// The kind of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The target holds a foreign key to the owner; at most one target row.
    OwnsOne,
    /// The target holds a foreign key to the owner; any number of target rows.
    OwnsMany,
    /// The owner holds a foreign key to the target.
    BelongsToOne,
    /// Owner and target are linked by rows of a join entity.
    ManyToManyThrough,
}

impl AssociationKind {
    /// Returns `true` if joining this association can multiply owner rows.
    pub const fn is_fan_out(self) -> bool {
        matches!(self, Self::OwnsMany | Self::ManyToManyThrough)
    }

    /// Returns `true` if the association hydrates into a list.
    pub const fn is_to_many(self) -> bool {
        self.is_fan_out()
    }
}

/// The join entity of a many-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    /// Name of the join entity.
    pub entity: String,
    /// `(owner column, through column)` pairs.
    pub key_map: KeyMap,
}

/// A named relationship from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// The name used in includes, where clauses, and order entries.
    pub name: String,
    pub kind: AssociationKind,
    /// Name of the owning entity.
    pub source: String,
    /// Name of the target entity.
    pub target: String,
    /// Join pairs for the target node. For many-to-many this joins the
    /// through entity to the target.
    pub key_map: KeyMap,
    /// Join entity, for `ManyToManyThrough` only.
    pub through: Option<Through>,
    /// Slot holding the target inside each through record. Defaults to the
    /// singular form of the association name.
    pub target_slot: Option<String>,
}

impl Association {
    /// The slot name of the target inside a through record.
    pub fn target_slot_name(&self) -> String {
        self.target_slot
            .clone()
            .unwrap_or_else(|| singularize(&self.name))
    }
}

/// A foreign key given when defining an association: either one column
/// (resolved against the addressed primary key) or an explicit key map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    Column(String),
    Map(KeyMap),
}

impl From<&str> for ForeignKey {
    fn from(column: &str) -> Self {
        Self::Column(column.to_string())
    }
}

impl From<String> for ForeignKey {
    fn from(column: String) -> Self {
        Self::Column(column)
    }
}

impl From<Vec<(&str, &str)>> for ForeignKey {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl From<KeyMap> for ForeignKey {
    fn from(pairs: KeyMap) -> Self {
        Self::Map(pairs)
    }
}
