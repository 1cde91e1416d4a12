use rowpack_core::*;
use std::io::Cursor;
use tempfile::NamedTempFile;

use test_helpers::*;

fn data_section(bytes: &[u8]) -> Vec<u8> {
    let header = Header::decode(bytes).unwrap();
    bytes[header.data_start as usize..header.data_end as usize].to_vec()
}

fn finalized_file(rows: usize) -> Vec<u8> {
    write_to_memory(
        &generate_test_rows(rows),
        create_test_schema(),
        Metadata::default(),
        None,
    )
    .unwrap()
}

// =============================================================================
// Amendment Isolation Tests
// =============================================================================

#[test]
fn test_amend_metadata_leaves_data_untouched() {
    init_logger();
    let original = finalized_file(500);
    let original_data = data_section(&original);

    let mut writer = Writer::amend_handle(Cursor::new(original.clone())).unwrap();
    writer
        .merge_metadata([("note", serde_json::json!("amended"))])
        .unwrap();
    let amended = writer.into_inner().unwrap().into_inner();

    assert_eq!(data_section(&amended), original_data);
    assert!(amended.len() > original.len());

    let mut reader = Reader::new(Cursor::new(amended)).unwrap();
    assert_eq!(reader.row_count(), 500);
    assert_eq!(reader.metadata().extra["note"], serde_json::json!("amended"));
    assert_eq!(read_raw(&mut reader).unwrap(), generate_test_rows(500));
}

#[test]
fn test_amend_schema_on_disk() {
    let temp_file = NamedTempFile::new().unwrap();
    let rows = generate_test_rows(40);
    write_to_path(temp_file.path(), &rows, create_test_schema(), Metadata::default()).unwrap();
    let before = std::fs::read(temp_file.path()).unwrap();

    {
        let mut writer = Writer::amend(temp_file.path()).unwrap();
        let mut schema = writer.schema().clone();
        schema.column_mut("value").unwrap().description = Some("Scaled id".to_string());
        schema.column_mut(3).unwrap().declared_type = Some(DeclaredType::Int);
        writer.set_schema(schema).unwrap();
        writer.close().unwrap();
    }

    let after = std::fs::read(temp_file.path()).unwrap();
    assert_eq!(data_section(&after), data_section(&before));

    let mut reader = Reader::open(temp_file.path()).unwrap();
    let column = reader.schema().column("value").unwrap();
    assert_eq!(column.description.as_deref(), Some("Scaled id"));
    assert_eq!(
        reader.schema().column("active").unwrap().declared_type,
        Some(DeclaredType::Int)
    );
    assert_eq!(read_raw(&mut reader).unwrap(), rows);
}

#[test]
fn test_amend_persists_immediately() {
    let temp_file = NamedTempFile::new().unwrap();
    write_to_path(
        temp_file.path(),
        &generate_test_rows(5),
        create_test_schema(),
        Metadata::default(),
    )
    .unwrap();

    let mut writer = Writer::amend(temp_file.path()).unwrap();
    writer
        .merge_metadata([("step", serde_json::json!(1))])
        .unwrap();

    // Visible before close
    let reader = Reader::open(temp_file.path()).unwrap();
    assert_eq!(reader.metadata().extra["step"], serde_json::json!(1));
    drop(reader);

    writer.close().unwrap();
}

#[test]
fn test_trailer_can_shrink_and_grow() {
    let mut metadata = Metadata::default();
    metadata.merge([("blob", serde_json::json!("x".repeat(5_000)))]);
    let original = write_to_memory(
        &generate_test_rows(20),
        create_test_schema(),
        metadata,
        None,
    )
    .unwrap();
    let original_data = data_section(&original);

    // Shrink
    let mut writer = Writer::amend_handle(Cursor::new(original.clone())).unwrap();
    writer.metadata_mut().unwrap().extra.shift_remove("blob");
    let shrunk = writer.into_inner().unwrap().into_inner();
    assert!(shrunk.len() < original.len());
    assert_eq!(data_section(&shrunk), original_data);

    let reader = Reader::new(Cursor::new(shrunk.clone())).unwrap();
    assert!(!reader.metadata().extra.contains_key("blob"));
    assert_eq!(reader.header().trailer_end, shrunk.len() as u64);

    // Grow
    let mut writer = Writer::amend_handle(Cursor::new(shrunk)).unwrap();
    writer
        .merge_metadata([("blob", serde_json::json!("y".repeat(20_000)))])
        .unwrap();
    let grown = writer.into_inner().unwrap().into_inner();
    assert!(grown.len() > original.len());
    assert_eq!(data_section(&grown), original_data);

    let mut reader = Reader::new(Cursor::new(grown)).unwrap();
    assert_eq!(read_raw(&mut reader).unwrap(), generate_test_rows(20));
}

#[test]
fn test_header_counts_survive_amendment() {
    let original = finalized_file(77);
    let before = Header::decode(&original).unwrap();

    let mut writer = Writer::amend_handle(Cursor::new(original)).unwrap();
    writer.finalize().unwrap();
    let after_bytes = writer.into_inner().unwrap().into_inner();
    let after = Header::decode(&after_bytes).unwrap();

    assert_eq!(after.row_count, before.row_count);
    assert_eq!(after.column_count, before.column_count);
    assert_eq!(after.data_start, before.data_start);
    assert_eq!(after.data_end, before.data_end);
}

// =============================================================================
// Amending Session Rules
// =============================================================================

#[test]
fn test_amend_rejects_row_appends() {
    let mut writer = Writer::amend_handle(Cursor::new(finalized_file(3))).unwrap();

    let err = writer.append_row(vec![RowValue::Int(1)]).unwrap_err();
    assert!(matches!(err, RowpackError::NotWritable(_)));
    let err = writer.append_rows(&[vec![RowValue::Int(1)]]).unwrap_err();
    assert!(matches!(err, RowpackError::NotWritable(_)));
    assert!(!writer.is_writable());

    let bytes = writer.into_inner().unwrap().into_inner();
    assert_eq!(Reader::new(Cursor::new(bytes)).unwrap().row_count(), 3);
}

#[test]
fn test_amend_after_close_is_closed() {
    let mut writer = Writer::amend_handle(Cursor::new(finalized_file(3))).unwrap();
    writer.close().unwrap();

    assert!(matches!(writer.finalize(), Err(RowpackError::Closed)));
    assert!(matches!(
        writer.merge_metadata([("a", serde_json::json!(1))]),
        Err(RowpackError::Closed)
    ));
    assert!(matches!(writer.schema_mut(), Err(RowpackError::Closed)));
}

#[test]
fn test_amend_incomplete_file_fails() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let mut writer = Writer::create(temp_file.path()).unwrap();
        writer.append_rows(&generate_test_rows(3)).unwrap();
    }

    let err = Writer::amend(temp_file.path()).err().unwrap();
    assert!(matches!(err, RowpackError::Format(_)));
}

#[test]
fn test_amend_unfinalized_file() {
    init_logger();
    let temp_file = NamedTempFile::new().unwrap();
    {
        let mut writer = Writer::create(temp_file.path()).unwrap();
        writer.append_rows(&generate_test_rows(4)).unwrap();
        writer.close().unwrap();
    }
    let before = std::fs::read(temp_file.path()).unwrap();

    {
        let mut writer = Writer::amend(temp_file.path()).unwrap();
        assert!(!writer.metadata().is_finalized());
        writer.finalize().unwrap();
        writer.close().unwrap();
    }

    let after = std::fs::read(temp_file.path()).unwrap();
    assert_eq!(data_section(&after), data_section(&before));

    let mut reader = Reader::open(temp_file.path()).unwrap();
    assert!(reader.is_finalized());
    assert_eq!(read_raw(&mut reader).unwrap(), generate_test_rows(4));
}
