//! Include requests and their normalized form.
//!
//! Callers may name associations as bare strings, option objects, or lists of
//! either, at any depth. [`normalize`] expands that shorthand into an
//! [`IncludeMap`]: one [`NormalizedInclude`] per association name, each with
//! its own normalized children. Association names are not checked here; the
//! join-tree builder reports unknown names.

use serde::Deserialize;

use super::where_clause::Where;

/// An include request as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Include {
    Name(String),
    List(Vec<Include>),
    Options(Box<IncludeOptions>),
}

impl From<&str> for Include {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Include {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<IncludeOptions> for Include {
    fn from(options: IncludeOptions) -> Self {
        Self::Options(Box::new(options))
    }
}

impl<T: Into<Self>> From<Vec<T>> for Include {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Options for the join table of a many-to-many include.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThroughOptions {
    #[serde(rename = "where")]
    pub where_clause: Option<Where>,
    pub include_soft_deleted: bool,
}

/// Options of one included association.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncludeOptions {
    pub association: String,
    /// Filter on the included rows. Implies `required`.
    #[serde(rename = "where")]
    pub where_clause: Option<Where>,
    /// Inner join instead of left join.
    pub required: bool,
    pub include: Option<Include>,
    /// Columns to surface. Takes priority over `exclude_attributes`.
    pub attributes: Option<Vec<String>>,
    pub exclude_attributes: Option<Vec<String>>,
    pub through: Option<ThroughOptions>,
    pub include_soft_deleted: bool,
}

impl IncludeOptions {
    pub fn new(association: impl Into<String>) -> Self {
        Self {
            association: association.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn filter(mut self, where_clause: Where) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    #[must_use]
    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include = Some(include.into());
        self
    }

    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn exclude_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn through(mut self, through: ThroughOptions) -> Self {
        self.through = Some(through);
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }
}

/// One included association after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedInclude {
    pub association: String,
    pub where_clause: Option<Where>,
    pub required: bool,
    /// The node must be joined in the paginated stage because a filter or
    /// sort key refers to it.
    pub include_in_subquery: bool,
    /// Joined for filtering or ordering only; not surfaced in output.
    pub hidden: bool,
    pub attributes: Option<Vec<String>>,
    pub exclude_attributes: Option<Vec<String>>,
    pub through: Option<ThroughOptions>,
    pub include_soft_deleted: bool,
    pub include: IncludeMap,
}

impl NormalizedInclude {
    fn hidden(association: &str) -> Self {
        Self {
            association: association.to_string(),
            hidden: true,
            ..Self::default()
        }
    }
}

/// Included associations keyed by name, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeMap {
    entries: Vec<NormalizedInclude>,
}

impl IncludeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, association: &str) -> Option<&NormalizedInclude> {
        self.entries.iter().find(|e| e.association == association)
    }

    pub fn get_mut(&mut self, association: &str) -> Option<&mut NormalizedInclude> {
        self.entries.iter_mut().find(|e| e.association == association)
    }

    /// Adds an entry. An entry with the same name is replaced in place.
    pub fn insert(&mut self, entry: NormalizedInclude) {
        match self.get_mut(&entry.association) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedInclude> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NormalizedInclude> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Makes sure `path` is present and marks its last entry as needed in
    /// the paginated stage. Missing entries are added hidden.
    pub fn force_path(&mut self, path: &[String]) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        if self.get(first).is_none() {
            self.entries.push(NormalizedInclude::hidden(first));
        }
        if let Some(entry) = self.get_mut(first) {
            if rest.is_empty() {
                entry.include_in_subquery = true;
            } else {
                entry.include.force_path(rest);
            }
        }
    }
}

/// Expands an include request into its canonical nested form.
///
/// Objects without an association name are skipped.
pub fn normalize(include: &Include) -> IncludeMap {
    let mut map = IncludeMap::new();
    collect(include, &mut map);
    map
}

fn collect(include: &Include, map: &mut IncludeMap) {
    match include {
        Include::Name(name) => map.insert(NormalizedInclude {
            association: name.clone(),
            ..NormalizedInclude::default()
        }),
        Include::List(items) => {
            for item in items {
                collect(item, map);
            }
        }
        Include::Options(options) if options.association.is_empty() => {}
        Include::Options(options) => {
            let options = options.as_ref().clone();
            map.insert(NormalizedInclude {
                include: options.include.as_ref().map(normalize).unwrap_or_default(),
                association: options.association,
                where_clause: options.where_clause,
                required: options.required,
                include_in_subquery: false,
                hidden: false,
                attributes: options.attributes,
                exclude_attributes: options.exclude_attributes,
                through: options.through,
                include_soft_deleted: options.include_soft_deleted,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_bare_name() {
        let map = normalize(&Include::from("orders"));
        assert_eq!(map.len(), 1);
        let orders = map.get("orders").unwrap();
        assert!(!orders.required);
        assert!(orders.include.is_empty());
    }

    #[test]
    fn test_mixed_list_keeps_order() {
        let include = Include::List(vec![
            Include::from("orders"),
            IncludeOptions::new("friends").required().into(),
            Include::from("companies"),
        ]);
        let map = normalize(&include);
        let names: Vec<&str> = map.iter().map(|e| e.association.as_str()).collect();
        assert_eq!(names, vec!["orders", "friends", "companies"]);
        assert!(map.get("friends").unwrap().required);
    }

    #[test]
    fn test_nested_include() {
        let include: Include = IncludeOptions::new("orders")
            .include(vec![Include::from("customer")])
            .into();
        let map = normalize(&include);
        let nested = &map.get("orders").unwrap().include;
        assert!(nested.get("customer").is_some());
    }

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let include = Include::List(vec![
            Include::from("orders"),
            Include::from("friends"),
            IncludeOptions::new("orders").required().into(),
        ]);
        let map = normalize(&include);
        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().next().unwrap().association, "orders");
        assert!(map.get("orders").unwrap().required);
    }

    #[test]
    fn test_object_without_association_is_skipped() {
        let include: Include = serde_json::from_value(json!([{"required": true}, "orders"])).unwrap();
        let map = normalize(&include);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_deserialize_json_shapes() {
        let include: Include = serde_json::from_value(json!([
            "companies",
            {
                "association": "friends",
                "required": true,
                "excludeAttributes": ["name"],
                "through": {"includeSoftDeleted": true},
                "include": {"association": "orders", "where": {"eq": ["status", "PLACED"]}}
            }
        ]))
        .unwrap();
        let map = normalize(&include);
        let friends = map.get("friends").unwrap();
        assert!(friends.required);
        assert_eq!(friends.exclude_attributes, Some(vec!["name".to_string()]));
        assert!(friends.through.as_ref().unwrap().include_soft_deleted);
        let orders = friends.include.get("orders").unwrap();
        assert_eq!(orders.where_clause, Some(Where::eq("status", "PLACED")));
    }

    #[test]
    fn test_force_path_adds_hidden_entries() {
        let mut map = normalize(&Include::from("orders"));
        map.force_path(&["orders".to_string()]);
        map.force_path(&["friends".to_string(), "orders".to_string()]);

        let orders = map.get("orders").unwrap();
        assert!(orders.include_in_subquery);
        assert!(!orders.hidden);

        let friends = map.get("friends").unwrap();
        assert!(friends.hidden);
        assert!(!friends.include_in_subquery);
        let nested = friends.include.get("orders").unwrap();
        assert!(nested.hidden);
        assert!(nested.include_in_subquery);
    }
}
