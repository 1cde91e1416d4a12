//! Test utilities for rowpack-core

#[cfg(test)]
pub mod test {
    use crate::{DeclaredType, Metadata, Row, RowValue, Schema, Writer};
    use jiff::civil::{date, time};
    use ordered_float::OrderedFloat;
    use std::io::Cursor;

    /// Create a simple schema for testing
    pub fn sample_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_column("id", Some(DeclaredType::Int));
        schema.add_column("name", Some(DeclaredType::String));
        schema.add_column("age", Some(DeclaredType::Int));
        schema.add_column("salary", Some(DeclaredType::Float));
        schema
    }

    /// Create multiple sample rows matching the simple schema
    pub fn sample_rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| {
                vec![
                    RowValue::Int(i as i64),
                    RowValue::from(format!("Person{}", i)),
                    RowValue::Int((20 + i % 50) as i64),
                    RowValue::Float(OrderedFloat(50000.0 + (i as f64 * 1000.0))),
                ]
            })
            .collect()
    }

    /// Create sample values with nulls
    pub fn sample_values_with_nulls() -> Row {
        vec![
            RowValue::Int(2),
            RowValue::Null,
            RowValue::Int(25),
            RowValue::Null,
        ]
    }

    /// One value of every kind, temporal ones included
    pub fn all_kinds_row() -> Row {
        vec![
            RowValue::Null,
            RowValue::Boolean(true),
            RowValue::Int(-42),
            RowValue::Float(OrderedFloat(2.625)),
            RowValue::from("test string"),
            RowValue::Date(date(2021, 1, 1)),
            RowValue::Time(time(12, 30, 15, 250_000_000)),
            RowValue::DateTime(date(2021, 1, 1).at(0, 0, 0, 0)),
        ]
    }

    /// Write `rows` with the sample schema into an in-memory file
    pub fn memory_file(rows: &[Row], metadata: Metadata) -> Cursor<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new())).unwrap();
        writer.set_schema(sample_schema()).unwrap();
        writer.set_metadata(metadata).unwrap();
        writer.append_rows(rows).unwrap();
        writer.finalize().unwrap();
        writer.into_inner().unwrap()
    }

    /// Create a temporary file path for testing
    pub fn temp_file_path() -> String {
        std::env::temp_dir()
            .join(format!("rowpack_test_{}.rp", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod test_utils_tests {
    use super::test::*;

    #[test]
    fn test_sample_schema() {
        let schema = sample_schema();
        assert_eq!(schema.headers(), vec!["id", "name", "age", "salary"]);
        assert_eq!(schema.column(3).unwrap().position, 3);
    }

    #[test]
    fn test_sample_rows() {
        let rows = sample_rows(3);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 4));
        assert!(matches!(&rows[1][1], crate::RowValue::String(s) if s.as_ref() == "Person1"));
        assert!(sample_values_with_nulls()[1].is_null());
    }

    #[test]
    fn test_memory_file_opens() {
        let cursor = memory_file(&sample_rows(2), crate::Metadata::default());
        let reader = crate::Reader::new(cursor).unwrap();
        assert_eq!(reader.row_count(), 2);
        assert!(reader.is_finalized());
    }

    #[test]
    fn test_temp_file_paths_differ() {
        assert_ne!(temp_file_path(), temp_file_path());
    }
}
