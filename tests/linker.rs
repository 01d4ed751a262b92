mod common;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{floats, frame, ints, texts};
use star_loader::data::{ColumnType, Value};
use star_loader::database::scoped;
use star_loader::frame::Frame;
use star_loader::keys::KeySpec;
use star_loader::linker::materialize;
use star_loader::memory::MemoryDatabase;
use star_loader::sql::{ForeignKeyDef, SqlType, Statement, TableDef};
use star_loader::LoadError;

fn day(d: u32) -> Option<Value> {
    Some(Value::DateTime(
        NaiveDate::from_ymd_opt(2016, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    ))
}

fn sales() -> Frame {
    frame(vec![
        ("Order Number", ColumnType::Integer, ints(&[1, 2, 3])),
        ("Order Date", ColumnType::DateTime, vec![day(1), day(1), day(2)]),
        ("CustomerKey", ColumnType::Integer, ints(&[100, 200, 100])),
        ("StoreKey", ColumnType::Integer, ints(&[1, 2, 2])),
        ("ProductKey", ColumnType::Integer, ints(&[10, 11, 10])),
        ("Currency Code", ColumnType::String, texts(&["USD", "EUR", "USD"])),
    ])
}

fn customers() -> Frame {
    frame(vec![
        ("CustomerKey", ColumnType::Integer, ints(&[100, 200])),
        ("Name", ColumnType::String, texts(&["Ada", "Lin"])),
    ])
}

fn stores() -> Frame {
    frame(vec![
        ("StoreKey", ColumnType::Integer, ints(&[1, 2])),
        ("Square Meters", ColumnType::Float, floats(&[1200.0, 0.0])),
        ("Open Date", ColumnType::DateTime, vec![day(3), day(4)]),
    ])
}

fn products() -> Frame {
    frame(vec![
        ("ProductKey", ColumnType::Integer, ints(&[10, 11])),
        ("Unit Price USD", ColumnType::Float, floats(&[129.99, 2199.0])),
    ])
}

fn exchange_rates() -> Frame {
    frame(vec![
        ("Date", ColumnType::DateTime, vec![day(1), day(1), day(2), day(2)]),
        ("Currency", ColumnType::String, texts(&["USD", "EUR", "USD", "EUR"])),
        ("Exchange", ColumnType::Float, floats(&[1.0, 0.92, 1.0, 0.91])),
    ])
}

fn table_names() -> Vec<String> {
    [
        "fact_sales",
        "dim_customers",
        "dim_stores",
        "dim_products",
        "dim_exchange_rates",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn key_specs() -> BTreeMap<usize, KeySpec> {
    BTreeMap::from([
        (1, KeySpec::columns(["CustomerKey"])),
        (2, KeySpec::columns(["StoreKey"])),
        (3, KeySpec::columns(["ProductKey"])),
        (
            4,
            KeySpec::renamed([("Order Date", "Date"), ("Currency Code", "Currency")]),
        ),
    ])
}

fn dataset() -> Vec<Frame> {
    vec![sales(), customers(), stores(), products(), exchange_rates()]
}

#[test]
fn plain_key_spec_becomes_not_null_primary_key() {
    let db = MemoryDatabase::new();
    let schema = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();

    let stores = schema.dimension("dim_stores").expect("dim_stores");
    assert_eq!(stores.definition.primary_key, vec!["StoreKey"]);
    assert_eq!(stores.rows, 2);
    let key = stores.definition.column("StoreKey").unwrap();
    assert_eq!(key.sql_type, SqlType::BigInt);
    assert!(!key.nullable);
    assert!(stores.definition.column("SquareMeters").unwrap().nullable);
    assert_eq!(
        stores.definition.column("OpenDate").unwrap().sql_type,
        SqlType::DateTime
    );
    assert_eq!(db.row_count("dim_stores"), Some(2));
}

#[test]
fn rename_map_renames_dimension_columns_to_fact_names() {
    let db = MemoryDatabase::new();
    let schema = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();

    let rates = schema.dimension("dim_exchange_rates").unwrap();
    assert_eq!(
        rates.definition.column_names(),
        vec!["OrderDate", "CurrencyCode", "Exchange"]
    );
    assert_eq!(rates.definition.primary_key, vec!["OrderDate", "CurrencyCode"]);
    assert!(rates
        .definition
        .columns
        .iter()
        .filter(|c| rates.definition.primary_key.contains(&c.name))
        .all(|c| !c.nullable));
    assert_eq!(
        rates.definition.column("Exchange").unwrap().sql_type,
        SqlType::Double
    );
}

#[test]
fn fact_table_gets_not_null_foreign_keys_indexes_and_constraints() {
    let db = MemoryDatabase::new();
    let schema = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();

    let fact = &schema.fact.definition;
    assert_eq!(fact.name, "fact_sales");
    assert!(fact.primary_key.is_empty());
    for column in ["CustomerKey", "StoreKey", "ProductKey", "OrderDate", "CurrencyCode"] {
        assert!(!fact.column(column).unwrap().nullable, "{column} nullable");
    }
    assert!(fact.column("OrderNumber").unwrap().nullable);

    let stored = db.table("fact_sales").unwrap();
    let index_names = stored.indexes.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        index_names,
        vec![
            "idx_CustomerKey",
            "idx_StoreKey",
            "idx_ProductKey",
            "idx_OrderDate",
            "idx_CurrencyCode"
        ]
    );
    let fk_names = stored
        .foreign_keys
        .iter()
        .map(|fk| fk.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        fk_names,
        vec![
            "fk_fact_sales_dim_customers",
            "fk_fact_sales_dim_stores",
            "fk_fact_sales_dim_products",
            "fk_fact_sales_dim_exchange_rates"
        ]
    );
    let rates_fk = &schema.relationships[3].foreign_key;
    assert_eq!(rates_fk.referenced_table, "dim_exchange_rates");
    assert_eq!(rates_fk.referenced_columns, vec!["OrderDate", "CurrencyCode"]);
    assert_eq!(schema.fact.rows, 3);
}

#[test]
fn statements_follow_dependency_order() {
    let db = MemoryDatabase::new();
    materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();
    let journal = db.journal();

    let position = |needle: &str| {
        journal
            .iter()
            .position(|s| s.starts_with(needle))
            .unwrap_or_else(|| panic!("missing `{needle}` in {journal:#?}"))
    };
    assert_eq!(position("DROP TABLE IF EXISTS `fact_sales`"), 0);
    let fact_created = position("CREATE TABLE `fact_sales`");
    let fact_loaded = position("INSERT INTO `fact_sales`");
    for dim in ["dim_customers", "dim_stores", "dim_products", "dim_exchange_rates"] {
        assert!(position(&format!("INSERT INTO `{dim}`")) < fact_created);
    }
    let first_constraint = position("ALTER TABLE `fact_sales` ADD CONSTRAINT");
    let first_index = position("CREATE INDEX");
    assert!(fact_loaded < first_index);
    assert!(first_index < first_constraint);
}

#[test]
fn materialize_twice_overwrites_instead_of_appending() {
    let db = MemoryDatabase::new();
    let first = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();
    let rows_before = db.table("fact_sales").unwrap().rows;
    let second = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap();

    assert_eq!(first, second);
    assert_eq!(db.table("fact_sales").unwrap().rows, rows_before);
    assert_eq!(db.row_count("dim_exchange_rates"), Some(4));
    assert_eq!(db.table_names().len(), 5);
}

#[test]
fn dimension_failure_names_table_and_skips_fact() {
    let db = MemoryDatabase::new();
    let mut tables = dataset();
    tables[3] = frame(vec![
        ("ProductKey", ColumnType::Integer, vec![Some(Value::Integer(10)), None]),
        ("Unit Price USD", ColumnType::Float, floats(&[1.0, 2.0])),
    ]);

    let err = materialize(&tables, &table_names(), &key_specs(), 0, &db).unwrap_err();
    assert!(matches!(&err, LoadError::Dimension { table, .. } if table == "dim_products"));
    assert!(err.to_string().contains("dim_products"));
    assert_eq!(err.table(), Some("dim_products"));

    assert!(db.table("fact_sales").is_none());
    assert_eq!(db.row_count("dim_products"), Some(0));
    assert!(db.table("dim_stores").is_some());
    assert!(db.table("dim_exchange_rates").is_none());
}

#[test]
fn orphan_fact_rows_fail_constraint_creation() {
    let db = MemoryDatabase::new();
    let mut tables = dataset();
    tables[2] = frame(vec![
        ("StoreKey", ColumnType::Integer, ints(&[1])),
        ("Square Meters", ColumnType::Float, floats(&[10.0])),
        ("Open Date", ColumnType::DateTime, vec![day(3)]),
    ]);

    let err = materialize(&tables, &table_names(), &key_specs(), 0, &db).unwrap_err();
    match &err {
        LoadError::Constraint {
            table, dimension, ..
        } => {
            assert_eq!(table, "fact_sales");
            assert_eq!(dimension, "dim_stores");
        }
        other => panic!("unexpected error {other:?}"),
    }
    let fact = db.table("fact_sales").unwrap();
    assert_eq!(fact.foreign_keys.len(), 1);
}

#[test]
fn missing_rename_source_is_a_dimension_error() {
    let db = MemoryDatabase::new();
    let mut specs = key_specs();
    specs.insert(4, KeySpec::renamed([("Order Date", "Day")]));
    let err = materialize(&dataset(), &table_names(), &specs, 0, &db).unwrap_err();
    assert!(matches!(&err, LoadError::Dimension { table, .. } if table == "dim_exchange_rates"));
    let source = std::error::Error::source(&err).expect("source").to_string();
    assert!(source.contains("'Day'"), "{source}");
    assert!(db.table("fact_sales").is_none());
}

#[test]
fn preconditions_are_checked_before_any_statement() {
    let db = MemoryDatabase::new();
    let mut specs = key_specs();
    specs.remove(&2);
    let err = materialize(&dataset(), &table_names(), &specs, 0, &db).unwrap_err();
    assert!(matches!(err, LoadError::InvalidInput(_)));

    let err = materialize(&dataset(), &table_names()[..4], &key_specs(), 0, &db).unwrap_err();
    assert!(matches!(err, LoadError::InvalidInput(_)));

    let err = materialize(&dataset(), &table_names(), &key_specs(), 9, &db).unwrap_err();
    assert!(matches!(err, LoadError::InvalidInput(_)));
    assert!(db.journal().is_empty());
}

#[test]
fn sanitized_table_name_collisions_are_rejected_up_front() {
    let db = MemoryDatabase::new();
    let tables = vec![
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2]))]),
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2]))]),
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1]))]),
    ];
    let specs = BTreeMap::from([
        (1, KeySpec::columns(["StoreKey"])),
        (2, KeySpec::columns(["StoreKey"])),
    ]);
    let names = ["fact", "dim_stores", "dim-stores"].map(String::from).to_vec();
    let err = materialize(&tables, &names, &specs, 0, &db).unwrap_err();
    assert!(matches!(&err, LoadError::InvalidInput(msg) if msg.contains("`dim_stores`")));

    let names = ["fact_sales", "fact-sales", "dim_stores"].map(String::from).to_vec();
    let err = materialize(&tables, &names, &specs, 0, &db).unwrap_err();
    assert!(matches!(err, LoadError::InvalidInput(_)));
    assert!(db.journal().is_empty());
    assert!(db.table_names().is_empty());
}

#[test]
fn referenced_fact_table_fails_the_initial_drop() {
    let db = MemoryDatabase::new();
    let keys = vec!["StoreKey".to_string()];
    let orders = frame(vec![("StoreKey", ColumnType::Integer, ints(&[1]))]);
    let existing_fact = TableDef::from_frame("fact_sales", &orders, &keys, &keys);
    let returns = TableDef::from_frame("returns", &orders, &keys, &[]);
    scoped(&db, "seed", |session| {
        session.execute(&Statement::CreateTable(existing_fact.clone()))?;
        session.insert(&existing_fact, &orders)?;
        session.execute(&Statement::CreateTable(returns.clone()))?;
        session.insert(&returns, &orders)?;
        session.execute(&Statement::AddForeignKey(ForeignKeyDef::linking(
            "returns",
            "fact_sales",
            &keys,
        )))
    })
    .unwrap();
    let seeded = db.journal().len();

    let err = materialize(&dataset(), &table_names(), &key_specs(), 0, &db).unwrap_err();
    match &err {
        LoadError::DropFact { table, source } => {
            assert_eq!(table, "fact_sales");
            assert!(format!("{source:#}").contains("referenced by foreign key"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(db.journal().len(), seeded);
    assert_eq!(db.row_count("fact_sales"), Some(1));
    assert!(db.table("dim_customers").is_none());
}

#[test]
fn missing_fact_foreign_key_column_is_a_fact_error() {
    let db = MemoryDatabase::new();
    let mut tables = dataset();
    tables[0] = frame(vec![
        ("Order Number", ColumnType::Integer, ints(&[1, 2, 3])),
        ("Order Date", ColumnType::DateTime, vec![day(1), day(1), day(2)]),
        ("CustomerKey", ColumnType::Integer, ints(&[100, 200, 100])),
        ("ProductKey", ColumnType::Integer, ints(&[10, 11, 10])),
        ("Currency Code", ColumnType::String, texts(&["USD", "EUR", "USD"])),
    ]);

    let err = materialize(&tables, &table_names(), &key_specs(), 0, &db).unwrap_err();
    match &err {
        LoadError::Fact { table, source } => {
            assert_eq!(table, "fact_sales");
            assert!(format!("{source:#}").contains("'StoreKey'"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.table(), Some("fact_sales"));
    assert!(db.table("fact_sales").is_none());
    assert_eq!(db.row_count("dim_stores"), Some(2));
    assert_eq!(db.row_count("dim_exchange_rates"), Some(4));
}

#[test]
fn shared_key_column_fails_on_duplicate_index() {
    let db = MemoryDatabase::new();
    let tables = vec![
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2]))]),
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2]))]),
        frame(vec![
            ("StoreKey", ColumnType::Integer, ints(&[1, 2])),
            ("Region", ColumnType::String, texts(&["EU", "Online"])),
        ]),
    ];
    let names = ["fact_sales", "dim_stores", "dim_regions"]
        .map(String::from)
        .to_vec();
    let specs = BTreeMap::from([
        (1, KeySpec::columns(["StoreKey"])),
        (2, KeySpec::columns(["StoreKey"])),
    ]);

    let err = materialize(&tables, &names, &specs, 0, &db).unwrap_err();
    match &err {
        LoadError::Constraint {
            table,
            dimension,
            source,
        } => {
            assert_eq!(table, "fact_sales");
            assert_eq!(dimension, "dim_regions");
            let chain = format!("{source:#}");
            assert!(chain.contains("Duplicate key name `idx_StoreKey`"), "{chain}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    let fact = db.table("fact_sales").unwrap();
    assert_eq!(fact.indexes.len(), 1);
    assert_eq!(fact.foreign_keys.len(), 1);
}

#[test]
fn large_integral_float_keys_stay_distinct() {
    let db = MemoryDatabase::new();
    let amounts = || frame(vec![("Amount", ColumnType::Float, floats(&[1e20, 3e19]))]);
    let tables = vec![amounts(), amounts()];
    let names = ["fact", "dim_amounts"].map(String::from).to_vec();
    let specs = BTreeMap::from([(1, KeySpec::columns(["Amount"]))]);

    let schema = materialize(&tables, &names, &specs, 0, &db).unwrap();
    assert_eq!(schema.dimensions[0].rows, 2);
    assert_eq!(db.row_count("dim_amounts"), Some(2));
    assert_eq!(db.table("fact").unwrap().foreign_keys.len(), 1);
}

#[test]
fn two_store_rows_yield_single_bigint_key() {
    let db = MemoryDatabase::new();
    let tables = vec![
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2, 1]))]),
        frame(vec![("StoreKey", ColumnType::Integer, ints(&[1, 2]))]),
    ];
    let names = vec!["fact_sales".to_string(), "dim_stores".to_string()];
    let specs = BTreeMap::from([(1, KeySpec::columns(["StoreKey"]))]);
    let schema = materialize(&tables, &names, &specs, 0, &db).unwrap();

    let stores = &schema.dimensions[0];
    assert_eq!(stores.definition.primary_key, vec!["StoreKey"]);
    assert_eq!(stores.definition.columns.len(), 1);
    assert_eq!(stores.definition.columns[0].sql_type, SqlType::BigInt);
    assert!(!stores.definition.columns[0].nullable);
    assert_eq!(db.row_count("dim_stores"), Some(2));
    assert_eq!(db.row_count("fact_sales"), Some(3));
}
