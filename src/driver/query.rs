//! Fixed, parameterized query templates.
//!
//! The models only ever ask "documents whose fields equal these values,
//! ordered by one field". `QuerySpec` captures exactly that, renders it to SQL
//! for SQL-speaking backends, and can evaluate itself against a JSON document
//! for backends that filter in process.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use super::PartitionKeyValue;

/// Single ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Named parameter bound into the rendered SQL text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

/// Equality filters plus an optional ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    conditions: Vec<(String, Value)>,
    order_by: Option<OrderBy>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: true,
        });
        self
    }

    pub fn order_by_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: false,
        });
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    /// SQL text with `@p0`, `@p1`, ... placeholders, in condition order.
    pub fn sql(&self) -> String {
        let mut sql = String::from("SELECT * FROM m");
        for (i, (field, _)) in self.conditions.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} = @p{}", property(field), i));
        }
        if let Some(order) = &self.order_by {
            let direction = if order.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!(" ORDER BY {} {}", property(&order.field), direction));
        }
        sql
    }

    pub fn parameters(&self) -> Vec<SqlParameter> {
        self.conditions
            .iter()
            .enumerate()
            .map(|(i, (_, value))| SqlParameter {
                name: format!("@p{}", i),
                value: value.clone(),
            })
            .collect()
    }

    /// Whether a document satisfies every condition.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// Compare two documents by the ordering clause. Equal when unordered.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let Some(order) = &self.order_by else {
            return Ordering::Equal;
        };
        let ordering = compare_values(a.get(&order.field), b.get(&order.field));
        if order.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// `m.field` for plain identifiers, `m["field"]` for anything else
/// (`fiscal-code`, names with spaces or quotes).
fn property(field: &str) -> String {
    let mut chars = field.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_identifier {
        format!("m.{}", field)
    } else {
        format!("m[\"{}\"]", field.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Numbers before strings, missing values first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(_)), Some(Value::String(_))) => Ordering::Less,
        (Some(Value::String(_)), Some(Value::Number(_))) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Scope and paging for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Restrict the query to one partition. `None` means cross-partition.
    pub partition_key: Option<PartitionKeyValue>,
    pub max_item_count: Option<usize>,
}

impl QueryOptions {
    pub fn partition(partition_key: impl Into<PartitionKeyValue>) -> Self {
        Self {
            partition_key: Some(partition_key.into()),
            max_item_count: None,
        }
    }

    pub fn max_items(mut self, max_item_count: usize) -> Self {
        self.max_item_count = Some(max_item_count);
        self
    }
}
