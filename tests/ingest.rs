mod common;

use common::TestWorkspace;
use encoding_rs::{UTF_8, WINDOWS_1252};
use star_loader::config::PipelineConfig;
use star_loader::data::{ColumnType, Value};
use star_loader::ingest::{ReadOptions, read_frame, write_frame};

#[test]
fn read_frame_infers_integer_float_and_text() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "stores.csv",
        "StoreKey,Square Meters,Country,Ratio\n1,,Germany,0.5\n2,1200,Online,2\n",
    );
    let frame = read_frame(&path, &ReadOptions::new(b',', UTF_8)).unwrap();

    assert_eq!(frame.row_count(), 2);
    assert_eq!(frame.column("StoreKey").unwrap().datatype, ColumnType::Integer);
    let area = frame.column("Square Meters").unwrap();
    assert_eq!(area.datatype, ColumnType::Float);
    assert_eq!(area.values, vec![None, Some(Value::Float(1200.0))]);
    assert_eq!(frame.column("Country").unwrap().datatype, ColumnType::String);
    assert_eq!(frame.column("Ratio").unwrap().datatype, ColumnType::Float);
}

#[test]
fn read_frame_decodes_latin1_and_custom_na_tokens() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("customers.csv");
    let mut bytes = b"CustomerKey,City,State Code\n1,M".to_vec();
    bytes.push(0xfc);
    bytes.extend_from_slice(b"nchen,BY\n2,Napoli,NA\n3,Oslo,?\n");
    std::fs::write(&path, bytes).unwrap();

    let options = ReadOptions {
        na_values: vec!["?".to_string()],
        ..ReadOptions::new(b',', WINDOWS_1252)
    };
    let frame = read_frame(&path, &options).unwrap();
    let city = frame.column("City").unwrap();
    assert_eq!(city.values[0], Some(Value::String("München".into())));
    let state = frame.column("State Code").unwrap();
    assert_eq!(state.values[1], Some(Value::String("NA".into())));
    assert_eq!(state.values[2], None);
}

#[test]
fn write_frame_emits_empty_fields_for_missing_cells() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("in.csv", "a,b\n1,x\n2,\n");
    let output = workspace.path().join("out.csv");
    let frame = read_frame(&input, &ReadOptions::new(b',', UTF_8)).unwrap();
    let rows = write_frame(&frame, Some(&output), b',').unwrap();
    assert_eq!(rows, 2);
    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written, "a,b\n1,x\n2,\n");
}

#[test]
fn write_frame_keeps_large_integral_floats_intact() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("amounts.csv");
    let frame = common::frame(vec![(
        "Amount",
        ColumnType::Float,
        common::floats(&[1e20, 3e19, 42.0]),
    )]);
    write_frame(&frame, Some(&output), b',').unwrap();
    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
        written,
        "Amount\n100000000000000000000\n30000000000000000000\n42\n"
    );
}

#[test]
fn default_pipeline_treats_null_tokens_as_missing_in_stores() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "Stores.csv",
        "StoreKey,Square Meters,Country\n1,NULL,Germany\n2,1200,N/A\n",
    );
    let config = PipelineConfig::default();
    let stores = config
        .tables
        .iter()
        .find(|t| t.name == "dim_stores")
        .unwrap();
    let options = ReadOptions {
        na_values: stores.na_values.clone(),
        ..ReadOptions::new(b',', UTF_8)
    };
    let frame = read_frame(&path, &options).unwrap();
    let area = frame.column("Square Meters").unwrap();
    assert_eq!(area.datatype, ColumnType::Float);
    assert_eq!(area.values, vec![None, Some(Value::Float(1200.0))]);
    assert_eq!(frame.column("Country").unwrap().values[1], None);
}
