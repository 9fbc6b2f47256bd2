//! The association registry.
//!
//! Entities and their associations are registered once through a
//! [`RegistryBuilder`] and frozen into a [`Registry`], which the query
//! compiler only reads. The registry is an explicit value passed to every
//! [`Finder`]; there is no process-wide entity state.
//!
//! # Examples
//!
//! ```
//! use oqb_db::entity::{Column, ColumnType, Entity};
//! use oqb_db::registry::Registry;
//!
//! let mut builder = Registry::builder();
//! builder
//!     .define(Entity::new("customer").column(Column::new("id").of_type(ColumnType::Integer).primary()))?
//!     .define(
//!         Entity::new("order")
//!             .column(Column::new("id").of_type(ColumnType::Integer).primary())
//!             .column(Column::new("customer_id").of_type(ColumnType::Integer)),
//!     )?
//!     .has_many("customer", "orders", "order", "customer_id")?
//!     .belongs_to("order", "customer", "customer", "customer_id")?;
//! let registry = builder.build();
//!
//! assert!(registry.entity("customer")?.association("orders").is_some());
//! # Ok::<(), oqb_core::OqbError>(())
//! ```

use std::collections::HashMap;

use oqb_core::{OqbError, OqbResult};

use crate::association::{Association, AssociationKind, ForeignKey, KeyMap, Through};
use crate::entity::Entity;
use crate::executor::Finder;

/// Collects entity and association definitions.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<Entity>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity.
    ///
    /// Fails with `DuplicateEntity` if the name is taken, and with
    /// `MissingPrimaryKey` if the entity declares no primary key.
    pub fn define(&mut self, entity: Entity) -> OqbResult<&mut Self> {
        if self.entities.iter().any(|e| e.name() == entity.name()) {
            return Err(OqbError::DuplicateEntity(entity.name().to_string()));
        }
        entity.check_definition()?;
        tracing::debug!(entity = entity.name(), "entity registered");
        self.entities.push(entity);
        Ok(self)
    }

    /// `owner` has at most one `target` row whose foreign key points back at it.
    pub fn has_one(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        foreign_key: impl Into<ForeignKey>,
    ) -> OqbResult<&mut Self> {
        let key_map = owner_side_keys(self.get(owner)?, self.get(target)?, name, foreign_key.into())?;
        self.attach(owner, name, AssociationKind::OwnsOne, target, key_map, None)
    }

    /// `owner` has any number of `target` rows whose foreign key points back at it.
    pub fn has_many(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        foreign_key: impl Into<ForeignKey>,
    ) -> OqbResult<&mut Self> {
        let key_map = owner_side_keys(self.get(owner)?, self.get(target)?, name, foreign_key.into())?;
        self.attach(owner, name, AssociationKind::OwnsMany, target, key_map, None)
    }

    /// `owner` holds a foreign key to one `target` row.
    pub fn belongs_to(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        foreign_key: impl Into<ForeignKey>,
    ) -> OqbResult<&mut Self> {
        let key_map =
            target_side_keys(self.get(owner)?, self.get(target)?, name, foreign_key.into())?;
        self.attach(owner, name, AssociationKind::BelongsToOne, target, key_map, None)
    }

    /// `owner` and `target` are linked through rows of `through`.
    ///
    /// `from_key` names the through column(s) pointing at the owner and
    /// `to_key` the through column(s) pointing at the target.
    pub fn belongs_to_many(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        through: &str,
        from_key: impl Into<ForeignKey>,
        to_key: impl Into<ForeignKey>,
    ) -> OqbResult<&mut Self> {
        let owner_entity = self.get(owner)?;
        let through_entity = self.get(through)?;
        let target_entity = self.get(target)?;

        let from_map = owner_side_keys(owner_entity, through_entity, name, from_key.into())?;
        let to_map = target_side_keys(through_entity, target_entity, name, to_key.into())?;

        let through = Through {
            entity: through.to_string(),
            key_map: from_map,
        };
        self.attach(
            owner,
            name,
            AssociationKind::ManyToManyThrough,
            target,
            to_map,
            Some(through),
        )
    }

    /// Renames the slot that holds the target inside each through record of
    /// a many-to-many association.
    pub fn target_slot(&mut self, owner: &str, name: &str, slot: &str) -> OqbResult<&mut Self> {
        let entity = self.get_mut(owner)?;
        let mut association = entity.require_association(name)?.clone();
        association.target_slot = Some(slot.to_string());
        entity.push_association(association);
        Ok(self)
    }

    /// Freezes the definitions.
    pub fn build(self) -> Registry {
        Registry {
            entities: self
                .entities
                .into_iter()
                .map(|e| (e.name().to_string(), e))
                .collect(),
        }
    }

    fn get(&self, name: &str) -> OqbResult<&Entity> {
        self.entities
            .iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| OqbError::UnknownEntity(name.to_string()))
    }

    fn get_mut(&mut self, name: &str) -> OqbResult<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| OqbError::UnknownEntity(name.to_string()))
    }

    fn attach(
        &mut self,
        owner: &str,
        name: &str,
        kind: AssociationKind,
        target: &str,
        key_map: KeyMap,
        through: Option<Through>,
    ) -> OqbResult<&mut Self> {
        let association = Association {
            name: name.to_string(),
            kind,
            source: owner.to_string(),
            target: target.to_string(),
            key_map,
            through,
            target_slot: None,
        };
        tracing::debug!(owner, association = name, ?kind, target, "association registered");
        self.get_mut(owner)?.push_association(association);
        Ok(self)
    }
}

/// Key map `{parent.pk → child.fk}`, where the parent's key is addressed.
fn owner_side_keys(
    parent: &Entity,
    child: &Entity,
    name: &str,
    foreign_key: ForeignKey,
) -> OqbResult<KeyMap> {
    match foreign_key {
        ForeignKey::Column(column) => {
            let pk = single_primary_key(parent, name, &column)?;
            child.require_column(&column)?;
            Ok(vec![(pk, column)])
        }
        ForeignKey::Map(map) => check_map(parent, child, map),
    }
}

/// Key map `{parent.fk → child.pk}`, where the child's key is addressed.
fn target_side_keys(
    parent: &Entity,
    child: &Entity,
    name: &str,
    foreign_key: ForeignKey,
) -> OqbResult<KeyMap> {
    match foreign_key {
        ForeignKey::Column(column) => {
            let pk = single_primary_key(child, name, &column)?;
            parent.require_column(&column)?;
            Ok(vec![(column, pk)])
        }
        ForeignKey::Map(map) => check_map(parent, child, map),
    }
}

fn single_primary_key(addressed: &Entity, name: &str, column: &str) -> OqbResult<String> {
    let pk = addressed.primary_key_names();
    match pk.as_slice() {
        [single] => Ok((*single).to_string()),
        _ => Err(OqbError::AmbiguousCompositeKey(format!(
            "association '{name}' gives foreign key '{column}' but '{}' has primary key ({})",
            addressed.name(),
            pk.join(", ")
        ))),
    }
}

fn check_map(parent: &Entity, child: &Entity, map: KeyMap) -> OqbResult<KeyMap> {
    for (parent_column, child_column) in &map {
        parent.require_column(parent_column)?;
        child.require_column(child_column)?;
    }
    Ok(map)
}

/// Immutable, registered entity metadata.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: HashMap<String, Entity>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up an entity by name.
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Looks up an entity by name, failing with `UnknownEntity`.
    pub fn entity(&self, name: &str) -> OqbResult<&Entity> {
        self.get(name)
            .ok_or_else(|| OqbError::UnknownEntity(name.to_string()))
    }

    /// Registered entity names, sorted.
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns a [`Finder`] for reading and writing rows of one entity.
    pub fn finder(&self, name: &str) -> OqbResult<Finder<'_>> {
        Finder::new(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Column, ColumnType};

    fn int(name: &str) -> Column {
        Column::new(name).of_type(ColumnType::Integer)
    }

    fn builder() -> RegistryBuilder {
        let mut b = Registry::builder();
        b.define(Entity::new("customer").column(int("id").primary()).column(Column::new("name")))
            .unwrap()
            .define(
                Entity::new("order")
                    .column(int("id").primary())
                    .column(int("customer_id")),
            )
            .unwrap()
            .define(
                Entity::new("friend")
                    .column(int("first_customer_id").primary())
                    .column(int("second_customer_id").primary()),
            )
            .unwrap();
        b
    }

    #[test]
    fn test_has_many_key_map() {
        let mut b = builder();
        b.has_many("customer", "orders", "order", "customer_id").unwrap();
        let r = b.build();
        let a = r.entity("customer").unwrap().association("orders").unwrap();
        assert_eq!(a.kind, AssociationKind::OwnsMany);
        assert_eq!(a.key_map, vec![("id".to_string(), "customer_id".to_string())]);
    }

    #[test]
    fn test_belongs_to_key_map() {
        let mut b = builder();
        b.belongs_to("order", "customer", "customer", "customer_id").unwrap();
        let r = b.build();
        let a = r.entity("order").unwrap().association("customer").unwrap();
        assert_eq!(a.key_map, vec![("customer_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_belongs_to_many_key_maps() {
        let mut b = builder();
        b.belongs_to_many(
            "customer",
            "friends",
            "customer",
            "friend",
            "first_customer_id",
            "second_customer_id",
        )
        .unwrap();
        let r = b.build();
        let a = r.entity("customer").unwrap().association("friends").unwrap();
        let through = a.through.as_ref().unwrap();
        assert_eq!(through.entity, "friend");
        assert_eq!(
            through.key_map,
            vec![("id".to_string(), "first_customer_id".to_string())]
        );
        assert_eq!(
            a.key_map,
            vec![("second_customer_id".to_string(), "id".to_string())]
        );
    }

    #[test]
    fn test_has_many_from_composite_key_is_ambiguous() {
        let mut b = builder();
        let err = b
            .has_many("friend", "orders", "order", "customer_id")
            .unwrap_err();
        assert!(matches!(err, OqbError::AmbiguousCompositeKey(_)));
    }

    #[test]
    fn test_belongs_to_composite_target_is_ambiguous() {
        let mut b = builder();
        let err = b
            .belongs_to("order", "friendship", "friend", "customer_id")
            .unwrap_err();
        assert!(matches!(err, OqbError::AmbiguousCompositeKey(_)));
    }

    #[test]
    fn test_explicit_map_allows_composite() {
        let mut b = builder();
        b.belongs_to(
            "order",
            "friendship",
            "friend",
            vec![("customer_id", "first_customer_id"), ("id", "second_customer_id")],
        )
        .unwrap();
        let r = b.build();
        assert_eq!(
            r.entity("order").unwrap().association("friendship").unwrap().key_map.len(),
            2
        );
    }

    #[test]
    fn test_unknown_foreign_key_column() {
        let mut b = builder();
        let err = b
            .has_many("customer", "orders", "order", "buyer_id")
            .unwrap_err();
        assert!(matches!(err, OqbError::UnknownColumn { .. }));
    }

    #[test]
    fn test_unknown_entity() {
        let mut b = builder();
        let err = b
            .has_many("customer", "invoices", "invoice", "customer_id")
            .unwrap_err();
        assert!(matches!(err, OqbError::UnknownEntity(name) if name == "invoice"));
    }

    #[test]
    fn test_duplicate_entity() {
        let mut b = builder();
        let err = b.define(Entity::new("order").column(int("id").primary())).unwrap_err();
        assert!(matches!(err, OqbError::DuplicateEntity(_)));
    }

    #[test]
    fn test_target_slot_rename() {
        let mut b = builder();
        b.belongs_to_many(
            "customer",
            "friends",
            "customer",
            "friend",
            "first_customer_id",
            "second_customer_id",
        )
        .unwrap()
        .target_slot("customer", "friends", "buddy")
        .unwrap();
        let r = b.build();
        let a = r.entity("customer").unwrap().association("friends").unwrap();
        assert_eq!(a.target_slot_name(), "buddy");
    }

    #[test]
    fn test_entity_names_sorted() {
        let r = builder().build();
        assert_eq!(r.entity_names(), vec!["customer", "friend", "order"]);
    }
}
