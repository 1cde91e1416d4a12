use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use rowpack_core::ingest::{intuit_rows, intuit_types, load_file, run_stats};
use rowpack_core::schema::{ColumnTypeInfo, TypeCounts};
use rowpack_core::traits::{ColumnMeta, StatsEngine, TypeIntuiter};
use rowpack_core::*;

use test_helpers::*;

/// Resolves a column to Int when every sampled value is an integer
struct CountingTypeIntuiter {
    sampled_rows: usize,
}

impl TypeIntuiter for CountingTypeIntuiter {
    fn intuit(&mut self, headers: &[String], rows: &[Row]) -> Result<Vec<ColumnTypeInfo>> {
        self.sampled_rows = rows.len();

        Ok(headers
            .iter()
            .enumerate()
            .map(|(position, header)| {
                let mut counts = TypeCounts::default();
                for row in rows {
                    match row.get(position) {
                        Some(RowValue::Int(_)) => counts.ints += 1,
                        Some(RowValue::Float(_)) => counts.floats += 1,
                        Some(RowValue::Null) | None => counts.nulls += 1,
                        Some(_) => counts.strings += 1,
                    }
                }
                let resolved_type = if counts.strings > 0 {
                    DeclaredType::String
                } else if counts.floats > 0 {
                    DeclaredType::Float
                } else {
                    DeclaredType::Int
                };
                ColumnTypeInfo {
                    position,
                    header: header.clone(),
                    resolved_type,
                    counts,
                }
            })
            .collect())
    }
}

/// Count and mean of numeric columns
struct MeanStatsEngine;

impl StatsEngine for MeanStatsEngine {
    fn compute(
        &mut self,
        columns: &[(String, Option<DeclaredType>)],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<IndexMap<String, ColumnStats>> {
        let mut sums = vec![(0.0, 0usize); columns.len()];
        for row in rows {
            let row = row?;
            for (i, value) in row.iter().enumerate().take(columns.len()) {
                if let Some(v) = value.as_f64() {
                    sums[i].0 += v;
                    sums[i].1 += 1;
                }
            }
        }

        Ok(columns
            .iter()
            .zip(sums)
            .filter(|((_, declared), _)| {
                matches!(declared, Some(DeclaredType::Int | DeclaredType::Float))
            })
            .map(|((name, _), (sum, n))| {
                let stats = ColumnStats {
                    count: OrderedFloat(n as f64),
                    mean: OrderedFloat(sum / n as f64),
                    ..ColumnStats::default()
                };
                (name.clone(), stats)
            })
            .collect())
    }
}

fn census_rows() -> Vec<Row> {
    let mut rows = vec![text_row(&["Population by county, 2010"])];
    rows.push(text_row(&["County", "Pop.", "Area (sq mi)"]));
    rows.extend((0..40).map(|i| {
        vec![
            RowValue::from(format!("County {}", i)),
            RowValue::Int(1000 + i),
            RowValue::from(10.0 + i as f64),
        ]
    }));
    rows
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_load_file_with_headers_and_column_meta() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.rp");

    let source = VecSource::new(generate_test_rows(120))
        .with_headers(&["ID", "Full Name", "Value", "Is Active?"])
        .with_columns(vec![ColumnMeta {
            position: 1,
            name: "full name".to_string(),
            description: Some("Given and family name".to_string()),
        }]);

    let report = load_file(&path, source).unwrap();
    assert_eq!(report.rows, 120);
    assert_eq!(report.columns, 4);

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.headers(), vec!["id", "full_name", "value", "is_active"]);
    assert_eq!(
        reader.schema().column("full_name").unwrap().description.as_deref(),
        Some("Given and family name")
    );
    assert!(reader.is_finalized());
    assert!(reader.metadata().about.create_time.is_some());
    assert!(reader.metadata().about.load_time.unwrap() >= 0.0);
    assert_eq!(read_raw(&mut reader).unwrap(), generate_test_rows(120));
}

#[test]
fn test_load_file_without_headers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.rp");

    load_file(&path, VecSource::new(generate_test_rows(3))).unwrap();

    let reader = Reader::open(&path).unwrap();
    assert_eq!(reader.headers(), vec!["col0", "col1", "col2", "col3"]);
}

#[test]
fn test_misaligned_column_meta_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.rp");

    let source = VecSource::new(generate_test_rows(5))
        .with_headers(&["id", "name"])
        .with_columns(vec![ColumnMeta {
            position: 0,
            name: "name".to_string(),
            description: None,
        }]);

    let err = load_file(&path, source).unwrap_err();
    assert!(matches!(err.root_cause(), RowpackError::DataValidation(_)));
    assert!(!path.exists());
}

#[test]
fn test_source_error_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.rp");

    let source = VecSource::failing(
        generate_test_rows(50),
        RowpackError::data_validation("unterminated quote"),
    );

    let err = load_file(&path, source).unwrap_err();
    assert!(err.to_string().contains("Reading source row 50"));
    assert!(matches!(err.root_cause(), RowpackError::DataValidation(_)));
    assert!(!path.exists());
}

// =============================================================================
// Post-processing Tests
// =============================================================================

#[test]
fn test_intuit_types_stores_resolved_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.rp");
    load_file(
        &path,
        VecSource::new(generate_test_rows(30)).with_headers(&["id", "name", "value", "active"]),
    )
    .unwrap();

    let mut intuiter = CountingTypeIntuiter { sampled_rows: 0 };
    let infos = intuit_types(&path, &mut intuiter).unwrap();
    assert_eq!(intuiter.sampled_rows, 30);
    assert_eq!(infos.len(), 4);

    let reader = Reader::open(&path).unwrap();
    let schema = reader.schema();
    assert_eq!(schema.column("id").unwrap().declared_type, Some(DeclaredType::Int));
    assert_eq!(schema.column("name").unwrap().declared_type, Some(DeclaredType::String));
    assert_eq!(schema.column("value").unwrap().declared_type, Some(DeclaredType::Float));
    assert_eq!(
        schema.column("id").unwrap().type_counts.as_ref().unwrap().ints,
        30
    );
    assert_eq!(reader.metadata().types, infos);
}

#[test]
fn test_run_stats_stores_column_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.rp");

    let mut schema = Schema::new();
    schema.add_column("n", Some(DeclaredType::Int));
    schema.add_column("label", Some(DeclaredType::String));
    let mut writer = WriterBuilder::new().with_schema(schema).create(&path).unwrap();
    for i in 1..=4 {
        writer
            .append_row(vec![RowValue::Int(i), RowValue::from(format!("l{}", i))])
            .unwrap();
    }
    writer.close().unwrap();

    let stats = run_stats(&path, &mut MeanStatsEngine).unwrap();
    assert_eq!(stats.len(), 1);

    let reader = Reader::open(&path).unwrap();
    let n = reader.schema().column("n").unwrap();
    assert!(n.has_stats());
    assert_eq!(n.count, OrderedFloat(4.0));
    assert_eq!(n.mean, OrderedFloat(2.5));
    assert!(n.max.0.is_nan());
    assert!(!reader.schema().column("label").unwrap().has_stats());
}

#[test]
fn test_full_pipeline() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("census.rp");

    let report = load_file(&path, VecSource::new(census_rows())).unwrap();
    assert_eq!(report.rows, 42);

    let intuition = intuit_rows(&path, &RowIntuiter::new()).unwrap();
    assert_eq!(intuition.role_string().chars().take(3).collect::<String>(), "CHD");

    let mut intuiter = CountingTypeIntuiter { sampled_rows: 0 };
    intuit_types(&path, &mut intuiter).unwrap();
    assert_eq!(intuiter.sampled_rows, 40, "only windowed rows are sampled");

    run_stats(&path, &mut MeanStatsEngine).unwrap();

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.headers(), vec!["county", "pop", "area_sq_mi"]);
    assert_eq!(reader.data_window(), Some((2, 41)));
    assert!(reader.is_finalized());

    let pop = reader.schema().column("pop").unwrap();
    assert_eq!(pop.declared_type, Some(DeclaredType::Int));
    assert_eq!(pop.mean, OrderedFloat(1019.5));

    let area = reader.schema().column(2).unwrap();
    assert_eq!(area.declared_type, Some(DeclaredType::Float));
    assert_eq!(area.count, OrderedFloat(40.0));

    let rows = read_windowed(&mut reader).unwrap();
    assert_eq!(rows.len(), 40);
    assert_eq!(rows[0][0], RowValue::from("County 0"));
    assert_eq!(read_raw(&mut reader).unwrap(), census_rows());
}
