//! Materialized rows.
//!
//! A result set is turned into rows in two steps. First a [`RowFactory`]
//! builds one [`RowShape`] for the whole result: column names, column types
//! and the association slots the eager-load tree will fill. Then every row is
//! materialized as a [`RowRecord`] sharing that shape.
//!
//! Column values never change after materialization. Association slots are
//! write-once: the eager loader fills each slot exactly once before rows are
//! handed back to the caller.
//!
//! ```rust
//! use std::sync::Arc;
//! use leanrow_query::{ColumnType, RowShape, Value};
//!
//! let shape = Arc::new(RowShape::new(
//!     vec!["id".into(), "name".into()],
//!     vec![ColumnType::Int, ColumnType::Text],
//!     vec!["category".into()],
//! ));
//! let row = shape.row(vec![Value::Int(1), Value::from("bolt")]).unwrap();
//!
//! assert_eq!(row.get_i64("id"), Some(1));
//! assert_eq!(row.get_str("name"), Some("bolt"));
//! assert!(!row.is_loaded("category"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Shared handle to a materialized row.
///
/// Rows are shared because a belongs-to target can be attached to several
/// parents at once.
pub type RowRef = Arc<RowRecord>;

/// Declared type of a result column, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
    /// The driver did not report a type (expressions, untyped columns).
    #[default]
    Unknown,
}

/// How many rows an association attaches to each parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one row.
    Single,
    /// An ordered, possibly empty list of rows.
    Collection,
}

impl Cardinality {
    /// The result attached to a parent with no matches.
    pub fn empty(self) -> AssociationResult {
        match self {
            Self::Single => AssociationResult::Single(None),
            Self::Collection => AssociationResult::Collection(Vec::new()),
        }
    }
}

/// The value held in an association slot.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationResult {
    /// A single related row, or none.
    Single(Option<RowRef>),
    /// All related rows in database order.
    Collection(Vec<RowRef>),
}

impl AssociationResult {
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Self::Single(_) => Cardinality::Single,
            Self::Collection(_) => Cardinality::Collection,
        }
    }

    /// The related rows as a slice: zero or one for `Single`.
    pub fn rows(&self) -> &[RowRef] {
        match self {
            Self::Single(row) => row.as_slice(),
            Self::Collection(rows) => rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

/// The shape shared by every row of one result.
#[derive(Debug, Clone)]
pub struct RowShape {
    columns: Vec<String>,
    column_types: Vec<ColumnType>,
    column_index: HashMap<String, usize>,
    associations: Vec<String>,
    association_index: HashMap<String, usize>,
}

impl RowShape {
    /// Create a shape.
    ///
    /// Missing column types are filled with [`ColumnType::Unknown`]. When a
    /// column name repeats, lookups by name resolve to its first occurrence.
    pub fn new(
        columns: Vec<String>,
        mut column_types: Vec<ColumnType>,
        associations: Vec<String>,
    ) -> Self {
        column_types.resize(columns.len(), ColumnType::Unknown);

        let mut column_index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            column_index.entry(name.clone()).or_insert(i);
        }

        let mut association_index = HashMap::with_capacity(associations.len());
        for (i, name) in associations.iter().enumerate() {
            association_index.entry(name.clone()).or_insert(i);
        }

        Self {
            columns,
            column_types,
            column_index,
            associations,
            association_index,
        }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn associations(&self) -> &[String] {
        &self.associations
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    fn association_slot(&self, name: &str) -> Option<usize> {
        self.association_index.get(name).copied()
    }

    /// Materialize one row of this shape.
    pub fn row(self: &Arc<Self>, values: Vec<Value>) -> QueryResult<RowRef> {
        if values.len() != self.columns.len() {
            return Err(QueryError::invalid_data(format!(
                "Row has {} values but the result declares {} columns",
                values.len(),
                self.columns.len()
            )));
        }

        let slots = (0..self.associations.len())
            .map(|_| OnceLock::new())
            .collect();

        Ok(Arc::new(RowRecord {
            shape: Arc::clone(self),
            values: values.into_boxed_slice(),
            slots,
        }))
    }

    /// Materialize every row of a result with this shape.
    pub fn materialize(self: &Arc<Self>, rows: Vec<Vec<Value>>) -> QueryResult<Vec<RowRef>> {
        rows.into_iter().map(|values| self.row(values)).collect()
    }
}

/// Builds the shape rows of a result are materialized with.
///
/// Called once per result, never per row.
pub trait RowFactory: Send + Sync {
    fn build_row_shape(
        &self,
        columns: &[String],
        column_types: &[ColumnType],
        association_names: &[String],
    ) -> Arc<RowShape>;
}

/// The stock [`RowFactory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRowFactory;

impl RowFactory for DefaultRowFactory {
    fn build_row_shape(
        &self,
        columns: &[String],
        column_types: &[ColumnType],
        association_names: &[String],
    ) -> Arc<RowShape> {
        Arc::new(RowShape::new(
            columns.to_vec(),
            column_types.to_vec(),
            association_names.to_vec(),
        ))
    }
}

/// An immutable materialized row with write-once association slots.
pub struct RowRecord {
    shape: Arc<RowShape>,
    values: Box<[Value]>,
    slots: Box<[OnceLock<AssociationResult>]>,
}

impl RowRecord {
    /// The shape this row shares with the rest of its result.
    pub fn shape(&self) -> &Arc<RowShape> {
        &self.shape
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        self.shape.columns()
    }

    /// Column values in result order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterate over `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.shape
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// The value of a column, or `None` if the row has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.shape.column_index(column).map(|i| &self.values[i])
    }

    /// The value of a column, or an `UnknownColumn` error.
    pub fn try_get(&self, column: &str) -> QueryResult<&Value> {
        self.get(column)
            .ok_or_else(|| QueryError::unknown_column(column))
    }

    /// Whether the row carries `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.shape.column_index(column).is_some()
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    /// Loose truthiness of a column; absent columns are false.
    pub fn is_truthy(&self, column: &str) -> bool {
        self.get(column).is_some_and(Value::is_truthy)
    }

    /// The loaded result of an association, if its slot was filled.
    pub fn association(&self, name: &str) -> Option<&AssociationResult> {
        self.shape
            .association_slot(name)
            .and_then(|i| self.slots[i].get())
    }

    /// Whether the association slot `name` has been populated.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.association(name).is_some()
    }

    /// The single related row of an association.
    ///
    /// `None` when nothing matched or the association was not loaded. For a
    /// collection, the first row.
    pub fn one(&self, name: &str) -> Option<&RowRef> {
        self.association(name).and_then(|r| r.rows().first())
    }

    /// The related rows of an association; empty when not loaded.
    pub fn many(&self, name: &str) -> &[RowRef] {
        self.association(name).map(AssociationResult::rows).unwrap_or(&[])
    }

    /// Fill an association slot. A slot can be written once.
    pub(crate) fn attach(&self, name: &str, result: AssociationResult) -> QueryResult<()> {
        let slot = self.shape.association_slot(name).ok_or_else(|| {
            QueryError::internal(format!(
                "row shape declares no association slot named '{}'",
                name
            ))
        })?;
        self.slots[slot]
            .set(result)
            .map_err(|_| QueryError::already_loaded(name))
    }

    /// Columns and loaded associations as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        for (i, name) in self.shape.associations.iter().enumerate() {
            match self.slots[i].get() {
                Some(AssociationResult::Single(row)) => map.serialize_entry(name, row)?,
                Some(AssociationResult::Collection(rows)) => map.serialize_entry(name, rows)?,
                None => {}
            }
        }
        map.end()
    }
}

impl PartialEq for RowRecord {
    fn eq(&self, other: &Self) -> bool {
        self.shape.columns == other.shape.columns && self.values == other.values
    }
}

impl fmt::Debug for RowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entries(self.iter());
        for (i, name) in self.shape.associations.iter().enumerate() {
            if let Some(result) = self.slots[i].get() {
                map.entry(name, result);
            }
        }
        map.finish()
    }
}
