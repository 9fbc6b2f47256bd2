//! Options accepted by find and count requests.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

use super::include::Include;
use super::where_clause::{ColumnRef, Where};

/// Sort direction of an order entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

/// One ORDER BY entry. Parses from `[column, "ASC" | "DESC"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: ColumnRef,
    pub direction: SortDirection,
}

impl Order {
    pub fn asc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderVisitor;

        impl<'de> Visitor<'de> for OrderVisitor {
            type Value = Order;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a [column, direction] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Order, A::Error> {
                let column = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let direction = seq.next_element()?.unwrap_or_default();
                Ok(Order { column, direction })
            }
        }

        deserializer.deserialize_seq(OrderVisitor)
    }
}

/// Options of a find or count request.
///
/// # Examples
///
/// ```
/// use oqb_db::query::include::IncludeOptions;
/// use oqb_db::query::options::{Order, SelectOptions};
/// use oqb_db::query::where_clause::ColumnRef;
///
/// let options = SelectOptions::new()
///     .include(IncludeOptions::new("orders").required())
///     .order(Order::desc(ColumnRef::related(["orders"], "id")))
///     .limit(2);
/// assert_eq!(options.limit, Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectOptions {
    pub include: Option<Include>,
    /// Filter on root rows. May reference related columns.
    #[serde(rename = "where")]
    pub where_clause: Option<Where>,
    pub order: Vec<Order>,
    pub limit: Option<u64>,
    /// Applied only together with `limit`.
    pub offset: Option<u64>,
    pub include_soft_deleted: bool,
    pub attributes: Option<Vec<String>>,
    pub exclude_attributes: Option<Vec<String>>,
    /// Log compiled statements at info level.
    pub log: bool,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include = Some(include.into());
        self
    }

    /// Sets the root filter, AND-ing with any filter already set.
    #[must_use]
    pub fn filter(mut self, where_clause: Where) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(where_clause),
            None => where_clause,
        });
        self
    }

    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
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
    pub const fn log(mut self) -> Self {
        self.log = true;
        self
    }
}
