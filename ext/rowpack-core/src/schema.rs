use crate::{Result, RowpackError};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Unset statistical field
pub const UNSET: OrderedFloat<f64> = OrderedFloat(f64::NAN);

/// Declared column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Int,
    Float,
    String,
    Text,
    Date,
    Time,
    DateTime,
}

impl DeclaredType {
    pub fn type_name(&self) -> &'static str {
        match self {
            DeclaredType::Int => "int",
            DeclaredType::Float => "float",
            DeclaredType::String => "string",
            DeclaredType::Text => "text",
            DeclaredType::Date => "date",
            DeclaredType::Time => "time",
            DeclaredType::DateTime => "datetime",
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for DeclaredType {
    type Err = RowpackError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "int" => DeclaredType::Int,
            "float" => DeclaredType::Float,
            "string" | "str" | "unicode" => DeclaredType::String,
            "text" => DeclaredType::Text,
            "date" => DeclaredType::Date,
            "time" => DeclaredType::Time,
            "datetime" => DeclaredType::DateTime,
            other => {
                return Err(RowpackError::format(format!(
                    "Unknown column type: {}",
                    other
                )))
            }
        })
    }
}

/// Per-type counters reported by a type intuiter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeCounts {
    pub ints: u64,
    pub floats: u64,
    pub strings: u64,
    pub dates: u64,
    pub times: u64,
    pub datetimes: u64,
    pub nulls: u64,
    pub has_codes: bool,
}

/// One data column with its statistics
///
/// Statistical fields start out as NaN so "not computed" is distinct from zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub position: usize,
    pub name: String,
    pub description: Option<String>,
    pub declared_type: Option<DeclaredType>,
    pub count: OrderedFloat<f64>,
    pub distinct_count: OrderedFloat<f64>,
    pub min: OrderedFloat<f64>,
    pub mean: OrderedFloat<f64>,
    pub median: OrderedFloat<f64>,
    pub max: OrderedFloat<f64>,
    pub std_dev: OrderedFloat<f64>,
    pub sample_values: Option<serde_json::Value>,
    pub type_counts: Option<TypeCounts>,
}

impl Column {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            position: 0,
            name: name.into(),
            description: None,
            declared_type: None,
            count: UNSET,
            distinct_count: UNSET,
            min: UNSET,
            mean: UNSET,
            median: UNSET,
            max: UNSET,
            std_dev: UNSET,
            sample_values: None,
            type_counts: None,
        }
    }

    pub fn with_type(mut self, declared_type: DeclaredType) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy computed statistics onto the column
    pub fn apply_stats(&mut self, stats: &ColumnStats) {
        self.count = stats.count;
        self.distinct_count = stats.distinct_count;
        self.min = stats.min;
        self.mean = stats.mean;
        self.median = stats.median;
        self.max = stats.max;
        self.std_dev = stats.std_dev;
        self.sample_values = stats.sample_values.clone();
    }

    pub fn has_stats(&self) -> bool {
        !self.count.0.is_nan()
    }
}

/// Statistics produced by an external stats engine for one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub count: OrderedFloat<f64>,
    pub distinct_count: OrderedFloat<f64>,
    pub min: OrderedFloat<f64>,
    pub mean: OrderedFloat<f64>,
    pub median: OrderedFloat<f64>,
    pub max: OrderedFloat<f64>,
    pub std_dev: OrderedFloat<f64>,
    pub sample_values: Option<serde_json::Value>,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self {
            count: UNSET,
            distinct_count: UNSET,
            min: UNSET,
            mean: UNSET,
            median: UNSET,
            max: UNSET,
            std_dev: UNSET,
            sample_values: None,
        }
    }
}

/// Type intuition result for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypeInfo {
    pub position: usize,
    pub header: String,
    pub resolved_type: DeclaredType,
    #[serde(default)]
    pub counts: TypeCounts,
}

/// Flat record form of a [`Column`], as stored in the trailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub pos: usize,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default = "unset")]
    pub count: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub nuniques: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub min: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub mean: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub median: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub max: OrderedFloat<f64>,
    #[serde(default = "unset")]
    pub std: OrderedFloat<f64>,
    #[serde(default)]
    pub uvalues: Option<serde_json::Value>,
    #[serde(default)]
    pub type_counts: Option<TypeCounts>,
}

fn unset() -> OrderedFloat<f64> {
    UNSET
}

impl From<&Column> for ColumnRecord {
    fn from(c: &Column) -> Self {
        Self {
            pos: c.position,
            name: c.name.clone(),
            description: c.description.clone(),
            datatype: c.declared_type.map(|t| t.type_name().to_string()),
            count: c.count,
            nuniques: c.distinct_count,
            min: c.min,
            mean: c.mean,
            median: c.median,
            max: c.max,
            std: c.std_dev,
            uvalues: c.sample_values.clone(),
            type_counts: c.type_counts.clone(),
        }
    }
}

impl TryFrom<ColumnRecord> for Column {
    type Error = RowpackError;

    fn try_from(r: ColumnRecord) -> Result<Self> {
        Ok(Self {
            position: r.pos,
            name: r.name,
            description: r.description,
            declared_type: r.datatype.as_deref().map(str::parse::<DeclaredType>).transpose()?,
            count: r.count,
            distinct_count: r.nuniques,
            min: r.min,
            mean: r.mean,
            median: r.median,
            max: r.max,
            std_dev: r.std,
            sample_values: r.uvalues,
            type_counts: r.type_counts,
        })
    }
}

/// Key for [`Schema::column`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKey<'a> {
    Name(&'a str),
    Position(usize),
}

impl<'a> From<&'a str> for ColumnKey<'a> {
    fn from(name: &'a str) -> Self {
        ColumnKey::Name(name)
    }
}

impl From<usize> for ColumnKey<'_> {
    fn from(position: usize) -> Self {
        ColumnKey::Position(position)
    }
}

impl fmt::Display for ColumnKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Name(name) => write!(f, "'{}'", name),
            ColumnKey::Position(pos) => write!(f, "#{}", pos),
        }
    }
}

/// Ordered column list
///
/// `append` is the only way to add a column and renumbers every position to
/// its index, so positions never have gaps or duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column and return its position
    pub fn append(&mut self, column: Column) -> usize {
        self.columns.push(column);
        for (idx, c) in self.columns.iter_mut().enumerate() {
            c.position = idx;
        }
        self.columns.len() - 1
    }

    /// Append a column built from a name and optional type
    pub fn add_column<S: Into<String>>(&mut self, name: S, declared_type: Option<DeclaredType>) -> usize {
        let mut column = Column::new(name);
        column.declared_type = declared_type;
        self.append(column)
    }

    pub fn column<'a, K: Into<ColumnKey<'a>>>(&self, key: K) -> Result<&Column> {
        let key = key.into();
        self.position_of(key)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| RowpackError::not_found(format!("No column {}", key)))
    }

    pub fn column_mut<'a, K: Into<ColumnKey<'a>>>(&mut self, key: K) -> Result<&mut Column> {
        let key = key.into();
        match self.position_of(key) {
            Some(idx) => Ok(&mut self.columns[idx]),
            None => Err(RowpackError::not_found(format!("No column {}", key))),
        }
    }

    fn position_of(&self, key: ColumnKey<'_>) -> Option<usize> {
        match key {
            ColumnKey::Name(name) => self.columns.iter().position(|c| c.name == name),
            ColumnKey::Position(pos) => (pos < self.columns.len()).then_some(pos),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in column order
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Widen the schema to at least `n` columns with `col{i}` placeholders
    pub fn ensure_column_count(&mut self, n: usize) {
        while self.columns.len() < n {
            let name = format!("col{}", self.columns.len());
            self.append(Column::new(name));
        }
    }

    pub fn to_rows(&self) -> Vec<ColumnRecord> {
        self.columns.iter().map(ColumnRecord::from).collect()
    }

    pub fn from_rows(rows: Vec<ColumnRecord>) -> Result<Self> {
        let mut schema = Schema::new();
        for row in rows {
            schema.append(Column::try_from(row)?);
        }
        Ok(schema)
    }

    /// Persist type intuition results, matching by header name, then position
    pub fn apply_type_intuition(&mut self, infos: &[ColumnTypeInfo]) {
        for info in infos {
            let key = if self.position_of(ColumnKey::Name(&info.header)).is_some() {
                ColumnKey::Name(&info.header)
            } else {
                ColumnKey::Position(info.position)
            };

            match self.column_mut(key) {
                Ok(column) => {
                    column.declared_type = Some(info.resolved_type);
                    column.type_counts = Some(info.counts.clone());
                }
                Err(_) => {
                    log::warn!(
                        "Type intuition reported column {} ({}) that is not in the schema",
                        info.position,
                        info.header
                    );
                }
            }
        }
    }

    /// Persist statistics keyed by column name
    pub fn apply_stats(&mut self, stats: &IndexMap<String, ColumnStats>) {
        for column in &mut self.columns {
            if let Some(s) = stats.get(&column.name) {
                column.apply_stats(s);
            }
        }
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

/// Canonical column name for a raw header string
///
/// Strip, collapse runs of non-word characters to `_`, lowercase, drop
/// trailing underscores.
pub fn normalize_header(raw: &str) -> String {
    let replaced = NON_WORD.replace_all(raw.trim(), "_");
    replaced.to_lowercase().trim_end_matches('_').to_string()
}
