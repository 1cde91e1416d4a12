//! Row intuition
//!
//! Guesses which leading rows are headers or comments, where the data
//! starts, and whether trailing rows form a footer. Each row is reduced to a
//! structural signature (the kind of each cell), and the data is taken to
//! begin at the first row whose signature repeats through most of the rest of
//! the sample.
//!
//! ```text
//! row  cells                      kinds      role
//!  0   "Population by county"     T          C
//!  1   "county", "year", "pop"    T T T      H
//!  2   "Adams", 2010, 1201        T N N      D
//!  ..
//! 40   "Total", "", 98012         T _ N      E
//! ```

use crate::schema::normalize_header;
use crate::{Reader, Result, Row, RowEdit, RowRole, RowSpec, RowValue, RowpackError};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::io::{Read, Seek};

// Default configuration constants
const DEFAULT_SAMPLE_SIZE: usize = 1000;
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;
const DEFAULT_MAJORITY: f64 = 0.5;
const DEFAULT_MIN_DATA_ROWS: usize = 2;

/// Structural kind of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Blank,
    Number,
    Temporal,
    Text,
}

impl CellKind {
    pub fn of(value: &RowValue) -> Self {
        match value {
            RowValue::Null => CellKind::Blank,
            RowValue::Boolean(_) | RowValue::Int(_) | RowValue::Float(_) => CellKind::Number,
            RowValue::Date(_) | RowValue::Time(_) | RowValue::DateTime(_) => CellKind::Temporal,
            RowValue::String(s) => classify_text(s),
        }
    }
}

fn classify_text(s: &str) -> CellKind {
    let s = s.trim();
    if s.is_empty() {
        return CellKind::Blank;
    }

    let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '$' | '%')).collect();
    if cleaned.chars().any(|c| c.is_ascii_digit()) && cleaned.parse::<f64>().is_ok() {
        return CellKind::Number;
    }

    if s.parse::<jiff::civil::DateTime>().is_ok()
        || s.parse::<jiff::civil::Date>().is_ok()
        || s.parse::<jiff::civil::Time>().is_ok()
    {
        return CellKind::Temporal;
    }

    CellKind::Text
}

/// Cell kinds of a row with trailing blanks removed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<CellKind>);

impl Signature {
    pub fn of(row: &[RowValue]) -> Self {
        let mut kinds: Vec<CellKind> = row.iter().map(CellKind::of).collect();
        while kinds.last() == Some(&CellKind::Blank) {
            kinds.pop();
        }
        Signature(kinds)
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    pub fn non_blank_cells(&self) -> usize {
        self.0.iter().filter(|k| **k != CellKind::Blank).count()
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Share of positions that agree, over the longer signature
    ///
    /// A blank facing a non-blank cell counts half.
    pub fn similarity(&self, other: &Signature) -> f64 {
        let len = self.0.len().max(other.0.len());
        if len == 0 {
            return 1.0;
        }

        let score: f64 = (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(CellKind::Blank);
                let b = other.0.get(i).copied().unwrap_or(CellKind::Blank);
                if a == b {
                    1.0
                } else if a == CellKind::Blank || b == CellKind::Blank {
                    0.5
                } else {
                    0.0
                }
            })
            .sum();

        score / len as f64
    }
}

fn is_comment_shaped(row: &[RowValue], signature: &Signature) -> bool {
    let hash_prefixed = row
        .first()
        .and_then(RowValue::as_str)
        .is_some_and(|s| s.trim_start().starts_with('#'));
    hash_prefixed || signature.non_blank_cells() <= 1
}

/// Builder for a configured RowIntuiter
pub struct RowIntuiterBuilder {
    sample_size: usize,
    similarity_threshold: f64,
    majority: f64,
    min_data_rows: usize,
}

impl Default for RowIntuiterBuilder {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            majority: DEFAULT_MAJORITY,
            min_data_rows: DEFAULT_MIN_DATA_ROWS,
        }
    }
}

impl RowIntuiterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows sampled from each end of the file
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Minimum signature similarity for two rows to count as the same shape
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Share of later rows that must match a candidate first data row
    pub fn with_majority(mut self, majority: f64) -> Self {
        self.majority = majority.clamp(0.0, 1.0);
        self
    }

    /// Fewest data rows, the first one included, that form a pattern
    pub fn with_min_data_rows(mut self, rows: usize) -> Self {
        self.min_data_rows = rows.max(1);
        self
    }

    pub fn build(self) -> RowIntuiter {
        RowIntuiter {
            sample_size: self.sample_size,
            similarity_threshold: self.similarity_threshold,
            majority: self.majority,
            min_data_rows: self.min_data_rows,
        }
    }
}

/// Classifies sampled rows and derives a [`RowSpec`]
#[derive(Debug, Clone)]
pub struct RowIntuiter {
    sample_size: usize,
    similarity_threshold: f64,
    majority: f64,
    min_data_rows: usize,
}

impl Default for RowIntuiter {
    fn default() -> Self {
        RowIntuiterBuilder::default().build()
    }
}

impl RowIntuiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RowIntuiterBuilder {
        RowIntuiterBuilder::new()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Sample a file and run intuition over it
    ///
    /// A file of up to twice the sample size is sampled whole. Larger files
    /// get a separate tail sample; reaching it means decoding every row.
    pub fn run_reader<R: Read + Seek>(&self, reader: &mut Reader<R>) -> Result<RowIntuition> {
        let row_count = reader.row_count();
        let head_size = if row_count > 2 * self.sample_size {
            self.sample_size
        } else {
            row_count
        };

        let head: Vec<Row> = reader
            .raw_rows()?
            .take(head_size)
            .collect::<Result<_>>()?;

        let mut tail: VecDeque<Row> = VecDeque::with_capacity(self.sample_size);
        if row_count > 2 * self.sample_size {
            let tail_start = row_count - self.sample_size;
            for (index, row) in reader.raw_rows()?.enumerate() {
                let row = row?;
                if index >= tail_start {
                    tail.push_back(row);
                }
            }
        }

        self.run(&head, tail.make_contiguous(), row_count)
    }

    /// Run intuition over sampled rows
    ///
    /// `head` holds the first rows of the file and `tail` its last rows (empty
    /// when the head covers the whole file). Fails with
    /// [`RowpackError::RowIntuit`] when no row starts a stable pattern.
    pub fn run(&self, head: &[Row], tail: &[Row], row_count: usize) -> Result<RowIntuition> {
        if head.is_empty() {
            return Err(RowpackError::row_intuit("No rows to sample"));
        }

        let signatures: Vec<Signature> = head.iter().map(|r| Signature::of(r)).collect();
        let non_blank: Vec<usize> = (0..head.len())
            .filter(|&i| !signatures[i].is_blank())
            .collect();
        let max_width = signatures.iter().map(Signature::width).max().unwrap_or(0);

        let start_row = self.find_start(head, &signatures, &non_blank, max_width)?;
        let pattern = self.dominant_pattern(&signatures, &non_blank, start_row);

        let mut row_spec = RowSpec::default();
        let mut roles = Vec::with_capacity(head.len() + tail.len());

        for i in 0..start_row {
            let role = if signatures[i].is_blank() {
                RowRole::Blank
            } else if is_comment_shaped(&head[i], &signatures[i]) {
                row_spec.comment_rows.insert(i);
                RowRole::Comment
            } else {
                row_spec.header_rows.insert(i);
                RowRole::Header
            };
            roles.push((i, role));
        }
        row_spec.start_row = Some(start_row);

        // Footer scan, backwards from the last sampled row
        let tail_start = row_count.saturating_sub(tail.len());
        let footer_sample: Vec<(usize, &Row)> = if tail.is_empty() {
            head.iter().enumerate().skip(start_row + 1).collect()
        } else {
            tail.iter()
                .enumerate()
                .map(|(k, r)| (tail_start + k, r))
                .filter(|(i, _)| *i > start_row)
                .collect()
        };

        let mut footer = Vec::new();
        for (i, row) in footer_sample.iter().rev() {
            let signature = Signature::of(row);
            if signature.is_blank() {
                footer.push((*i, RowRole::Blank));
            } else if signature.similarity(&pattern) < self.similarity_threshold {
                footer.push((*i, RowRole::End));
            } else {
                break;
            }
        }
        if let Some(&(first_footer, _)) = footer.last() {
            row_spec.end_row = Some(first_footer - 1);
        }

        let end_row = row_spec.end_row.unwrap_or(row_count.saturating_sub(1));
        let sampled_data = head
            .len()
            .min(end_row + 1)
            .saturating_sub(start_row)
            .max(1);
        roles.extend((start_row..start_row + sampled_data).map(|i| (i, RowRole::Data)));
        if !tail.is_empty() {
            roles.extend(
                (tail_start.max(start_row)..=end_row)
                    .filter(|i| *i >= head.len())
                    .map(|i| (i, RowRole::Data)),
            );
        }
        roles.extend(footer.into_iter().rev());

        log::info!(
            "Row intuition: header_rows={:?} comment_rows={:?} start_row={} end_row={:?}",
            row_spec.header_rows,
            row_spec.comment_rows,
            start_row,
            row_spec.end_row
        );

        let headers = derive_headers(head, &row_spec);
        Ok(RowIntuition {
            row_spec,
            roles,
            headers,
        })
    }

    fn find_start(
        &self,
        head: &[Row],
        signatures: &[Signature],
        non_blank: &[usize],
        max_width: usize,
    ) -> Result<usize> {
        for (k, &i) in non_blank.iter().enumerate() {
            if max_width > 1 && is_comment_shaped(&head[i], &signatures[i]) {
                continue;
            }

            let later = &non_blank[k + 1..];
            if later.is_empty() {
                break;
            }

            let matches = later
                .iter()
                .filter(|&&j| signatures[i].similarity(&signatures[j]) >= self.similarity_threshold)
                .count();

            let share = matches as f64 / later.len() as f64;
            if share > self.majority && matches + 1 >= self.min_data_rows {
                return Ok(i);
            }
        }

        Err(RowpackError::row_intuit(format!(
            "No stable data pattern in {} sampled rows",
            head.len()
        )))
    }

    /// Most common signature among the rows shaped like `start_row`
    fn dominant_pattern(
        &self,
        signatures: &[Signature],
        non_blank: &[usize],
        start_row: usize,
    ) -> Signature {
        let start = &signatures[start_row];
        let mut counts: IndexMap<&Signature, usize> = IndexMap::new();
        for &i in non_blank.iter().filter(|&&i| i >= start_row) {
            if start.similarity(&signatures[i]) >= self.similarity_threshold {
                *counts.entry(&signatures[i]).or_insert(0) += 1;
            }
        }

        let mut best: Option<(&Signature, usize)> = None;
        for (signature, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((signature, count));
            }
        }
        best.map_or_else(|| start.clone(), |(s, _)| s.clone())
    }
}

/// Per column, header cells joined top to bottom, then normalized
fn derive_headers(head: &[Row], row_spec: &RowSpec) -> Vec<String> {
    let header_rows: Vec<&Row> = row_spec
        .header_rows
        .iter()
        .filter_map(|&i| head.get(i))
        .collect();
    let width = header_rows.iter().map(|r| r.len()).max().unwrap_or(0);

    (0..width)
        .map(|col| {
            let parts: Vec<String> = header_rows
                .iter()
                .filter_map(|r| r.get(col))
                .map(|v| v.to_string().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            normalize_header(&parts.join(" "))
        })
        .collect()
}

/// Outcome of a row intuition run
#[derive(Debug, Clone, PartialEq)]
pub struct RowIntuition {
    row_spec: RowSpec,
    roles: Vec<(usize, RowRole)>,
    headers: Vec<String>,
}

impl RowIntuition {
    pub fn row_spec(&self) -> &RowSpec {
        &self.row_spec
    }

    pub fn into_row_spec(self) -> RowSpec {
        self.row_spec
    }

    /// Roles of the sampled rows, in physical order
    pub fn roles(&self) -> &[(usize, RowRole)] {
        &self.roles
    }

    pub fn role_of(&self, row: usize) -> Option<RowRole> {
        self.roles
            .iter()
            .find(|(i, _)| *i == row)
            .map(|(_, role)| *role)
    }

    /// Column names built from the header rows
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Apply a manual correction; sampled roles follow the new row spec
    pub fn apply_edit(&mut self, edit: RowEdit, row_count: usize) -> Result<()> {
        self.row_spec.apply(edit)?;
        for (i, role) in &mut self.roles {
            *role = self.row_spec.role_of(*i, row_count);
        }
        Ok(())
    }

    /// One role label per sampled row, e.g. `CHDDDDE`
    pub fn role_string(&self) -> String {
        self.roles.iter().map(|(_, role)| role.label()).collect()
    }
}
