use super::*;
use arrow::array::{Array, AsArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use serde_json::json;
use std::sync::Arc;

fn sample_records() -> RecordFrame {
    RecordFrame::from_json_str(
        r#"[
            {"a": 1.5, "b": "x", "flag": true},
            {"a": 2, "b": "y"},
            {"b": "x", "a": null, "flag": false}
        ]"#,
    )
    .unwrap()
}

#[test]
fn test_records_normalize_in_first_seen_order() {
    let table = TableInput::from(sample_records()).normalize().unwrap();

    assert_eq!(table.kind(), TableKind::Records);
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column_names(), vec!["a", "b", "flag"]);

    let a = table.column("a").unwrap();
    assert_eq!(a.data_type(), &DataType::Float64);
    let a_values = a.chunks()[0].as_primitive::<Float64Type>();
    assert_eq!(a_values.value(0), 1.5);
    assert_eq!(a_values.value(1), 2.0);
    assert!(a_values.is_null(2));

    // A missing attribute becomes a null, not a shorter column.
    let flag = table.column("flag").unwrap();
    assert_eq!(flag.data_type(), &DataType::Boolean);
    assert!(flag.chunks()[0].is_null(1));
}

#[test]
fn test_records_explicit_column_order_wins() {
    let frame = sample_records().with_columns(vec!["b".into(), "a".into()]);
    let table = TableInput::from(frame).normalize().unwrap();
    assert_eq!(table.column_names(), vec!["b", "a"]);
}

#[test]
fn test_records_mixed_scalars_become_strings() {
    let frame = RecordFrame::new(vec![
        json!({"v": 1}).as_object().unwrap().clone(),
        json!({"v": "two"}).as_object().unwrap().clone(),
    ]);
    let table = TableInput::from(frame).normalize().unwrap();
    let v = table.column("v").unwrap();
    assert_eq!(v.data_type(), &DataType::Utf8);
    let strings = v.chunks()[0].as_string::<i32>();
    assert_eq!(strings.value(0), "1");
    assert_eq!(strings.value(1), "two");
}

#[test]
fn test_records_numbers_mixed_with_bools_become_strings() {
    let frame = RecordFrame::from_json_str(r#"[{"v": 1}, {"v": true}, {"v": 2.5}]"#).unwrap();
    let table = TableInput::from(frame).normalize().unwrap();
    let v = table.column("v").unwrap();
    assert_eq!(v.data_type(), &DataType::Utf8);
    let strings: Vec<_> = v.chunks()[0].as_string::<i32>().iter().flatten().collect();
    assert_eq!(strings, vec!["1", "true", "2.5"]);
}

#[test]
fn test_records_reject_nested_values() {
    let frame = RecordFrame::from_json_str(r#"[{"v": [1, 2]}]"#).unwrap();
    let result = TableInput::from(frame).normalize();
    assert!(matches!(
        result,
        Err(TabulaError::UnsupportedValue { ref column, .. }) if column == "v"
    ));
}

#[test]
fn test_records_duplicate_explicit_columns_rejected() {
    let frame = sample_records().with_columns(vec!["a".into(), "a".into()]);
    let result = TableInput::from(frame).normalize();
    assert!(matches!(result, Err(TabulaError::DuplicateColumn(ref name)) if name == "a"));
}

#[test]
fn test_chunked_columns_with_different_chunking() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("n", DataType::Int64, false),
        Field::new("s", DataType::Utf8, true),
    ]));
    let n_chunks: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(vec![1, 2])),
        Arc::new(Int64Array::from(vec![3])),
    ];
    let s_chunks: Vec<ArrayRef> = vec![Arc::new(StringArray::from(vec!["a", "b", "c"]))];
    let chunked = ChunkedTable::try_new(schema, vec![n_chunks, s_chunks]).unwrap();

    let table = TableInput::from(chunked).normalize().unwrap();
    assert_eq!(table.kind(), TableKind::Chunked);
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column("n").unwrap().chunks().len(), 2);
}

#[test]
fn test_chunked_length_mismatch_detected() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("n", DataType::Int64, false),
        Field::new("f", DataType::Float64, false),
    ]));
    let chunked = ChunkedTable::try_new(
        schema,
        vec![
            vec![Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef],
            vec![Arc::new(Float64Array::from(vec![1.0, 2.0])) as ArrayRef],
        ],
    )
    .unwrap();

    let result = TableInput::from(chunked).normalize();
    assert!(matches!(
        result,
        Err(TabulaError::ColumnLengthMismatch { ref column, expected: 3, found: 2 }) if column == "f"
    ));
}

#[test]
fn test_chunked_chunk_type_mismatch_detected() {
    let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
    let chunked = ChunkedTable::try_new(
        schema,
        vec![vec![Arc::new(Float64Array::from(vec![1.0])) as ArrayRef]],
    )
    .unwrap();
    assert!(matches!(
        TableInput::from(chunked).normalize(),
        Err(TabulaError::ChunkTypeMismatch { .. })
    ));
}

#[test]
fn test_from_batches_keeps_batches_as_chunks() {
    let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
    let batch1 = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(Int64Array::from(vec![1, 2]))],
    )
    .unwrap();
    let batch2 =
        RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![3]))]).unwrap();

    let chunked = ChunkedTable::from_batches(schema, &[batch1, batch2]).unwrap();
    assert_eq!(chunked.chunks(0).unwrap().len(), 2);
    let table = TableInput::from(chunked).normalize().unwrap();
    assert_eq!(table.row_count(), 3);
}

#[test]
fn test_foreign_train_table_is_unsupported() {
    let train = TableInput::foreign("builtins.dict");
    let result = resolve_tables(&train, None);
    assert!(matches!(
        result,
        Err(TabulaError::UnsupportedTableKind { ref found }) if found == "builtins.dict"
    ));
}

#[test]
fn test_foreign_test_table_is_inconsistent() {
    let train = TableInput::from(sample_records());
    let test = TableInput::foreign("builtins.list");
    let result = resolve_tables(&train, Some(&test));
    assert!(matches!(result, Err(TabulaError::InconsistentTableKinds { .. })));
}

#[test]
fn test_train_and_test_may_use_different_families() {
    let train = TableInput::from(sample_records());
    let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Float64, true)]));
    let batch =
        RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![1.0]))]).unwrap();
    let test = TableInput::from(batch);

    let (train_table, test_table) = resolve_tables(&train, Some(&test)).unwrap();
    assert_eq!(train_table.kind(), TableKind::Records);
    assert_eq!(test_table.unwrap().kind(), TableKind::Chunked);
}

#[test]
fn test_normalize_does_not_mutate_input() {
    let input = TableInput::from(sample_records());
    let before = format!("{:?}", input);
    let _ = input.normalize().unwrap();
    assert_eq!(before, format!("{:?}", input));
}
