//! In-memory columnar tables.
//!
//! Choosers, alternatives, and interaction datasets are all `Table`s: an
//! integer index (chooser id, alternative id, ...) plus named, equally long
//! columns. Tables are read-only inputs to the engine; only the scheduler's
//! result writer and the chooser preprocessor add columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ChoiceError, Result};

/// A typed column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// Numeric values. Integer ids are stored here too.
    Num(Vec<f64>),
    /// Boolean flags.
    Bool(Vec<bool>),
    /// Categorical string values.
    Str(Vec<String>),
}

impl Column {
    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Column::Num(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    /// Whether the column has no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gathers values at the given row positions.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Num(v) => Column::Num(rows.iter().map(|&r| v[r]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&r| v[r]).collect()),
            Column::Str(v) => Column::Str(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    /// Numeric view (booleans as 0/1). `None` for string columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Num(v) => Some(v.clone()),
            Column::Bool(v) => Some(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()),
            Column::Str(_) => None,
        }
    }

    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Num(_) => "numeric",
            Column::Bool(_) => "boolean",
            Column::Str(_) => "string",
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Num(v)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Num(v.into_iter().map(|x| x as f64).collect())
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::Bool(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Str(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Str(v)
    }
}

/// A columnar table keyed by a unique integer index.
///
/// # Examples
///
/// ```
/// use u_choice::models::Table;
///
/// let tours = Table::new("tour_id", vec![10, 11])
///     .unwrap()
///     .with_column("income", vec![52_000.0, 31_000.0])
///     .unwrap()
///     .with_column("tour_type", vec!["shopping", "eatout"])
///     .unwrap();
/// assert_eq!(tours.len(), 2);
/// assert_eq!(tours.position_of(11), Some(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    index_name: String,
    index: Vec<i64>,
    columns: Vec<(String, Column)>,
    #[serde(skip)]
    positions: HashMap<i64, usize>,
}

/// Serialized form of a [`Table`], checked on the way in.
#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    index_name: String,
    index: Vec<i64>,
    #[serde(default)]
    columns: Vec<(String, Column)>,
}

impl TryFrom<RawTable> for Table {
    type Error = ChoiceError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = Table::new(raw.index_name, raw.index)?;
        for (name, column) in raw.columns {
            if table.has_column(&name) {
                return Err(ChoiceError::table(format!("duplicate column '{name}'")));
            }
            table.insert_column(name, column)?;
        }
        Ok(table)
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.index_name == other.index_name
            && self.index == other.index
            && self.columns == other.columns
    }
}

impl Table {
    /// Creates a table with an index and no columns.
    ///
    /// Fails if the index contains duplicates.
    pub fn new(index_name: impl Into<String>, index: Vec<i64>) -> Result<Self> {
        let index_name = index_name.into();
        let mut positions = HashMap::with_capacity(index.len());
        for (pos, &id) in index.iter().enumerate() {
            if positions.insert(id, pos).is_some() {
                return Err(ChoiceError::table(format!(
                    "duplicate {index_name} value {id}"
                )));
            }
        }
        Ok(Self {
            index_name,
            index,
            columns: Vec::new(),
            positions,
        })
    }

    /// Adds a column (builder form of [`Table::insert_column`]).
    pub fn with_column(mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<Self> {
        self.insert_column(name, column)?;
        Ok(self)
    }

    /// Inserts a column, replacing any column with the same name.
    pub fn insert_column(&mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<()> {
        let name = name.into();
        let column = column.into();
        if column.len() != self.index.len() {
            return Err(ChoiceError::table(format!(
                "column '{name}' has {} values, table has {} rows",
                column.len(),
                self.index.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    /// Name of the index (e.g. `tour_id`).
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Index values in row order.
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Looks up a column, failing with a table error if absent.
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| ChoiceError::table(format!("unknown column '{name}'")))
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Columns in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Row position of an index value.
    pub fn position_of(&self, id: i64) -> Option<usize> {
        if self.positions.len() != self.index.len() {
            // Interaction tables repeat their index and keep no lookup map.
            return self.index.iter().position(|&x| x == id);
        }
        self.positions.get(&id).copied()
    }

    /// Gathers the given rows into a new table.
    ///
    /// Rows may repeat only if the resulting index stays unique, which the
    /// interaction builder avoids by re-indexing.
    pub fn take(&self, rows: &[usize]) -> Result<Table> {
        let index = rows.iter().map(|&r| self.index[r]).collect();
        let mut out = Table::new(self.index_name.clone(), index)?;
        out.columns = self
            .columns
            .iter()
            .map(|(n, c)| (n.clone(), c.take(rows)))
            .collect();
        Ok(out)
    }

    /// Builds a table whose index may repeat (interaction rows).
    pub(crate) fn from_parts_unchecked(
        index_name: String,
        index: Vec<i64>,
        columns: Vec<(String, Column)>,
    ) -> Table {
        Table {
            index_name,
            index,
            columns,
            positions: HashMap::new(),
        }
    }
}
