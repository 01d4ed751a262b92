//! SQL type inference, table definitions and MySQL statement rendering.

use std::fmt;

use crate::{
    data::{ColumnType, sanitize_identifier},
    frame::Frame,
};

/// Column name that always maps to `DOUBLE` unless it holds integers.
pub const EXCHANGE_COLUMN: &str = "Exchange";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Double,
    Decimal { precision: u8, scale: u8 },
    DateTime,
    VarChar(u16),
}

impl SqlType {
    pub const MONEY: SqlType = SqlType::Decimal {
        precision: 10,
        scale: 2,
    };
    pub const TEXT: SqlType = SqlType::VarChar(255);
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Double => f.write_str("DOUBLE"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            SqlType::DateTime => f.write_str("DATETIME"),
            SqlType::VarChar(len) => write!(f, "VARCHAR({len})"),
        }
    }
}

/// Maps an in-memory column type to its SQL column type. Integer wins over
/// the `Exchange` override, which wins over the remaining kinds.
pub fn infer_sql_type(datatype: ColumnType, column_name: &str) -> SqlType {
    match datatype {
        ColumnType::Integer => SqlType::BigInt,
        _ if column_name == EXCHANGE_COLUMN => SqlType::Double,
        ColumnType::Float => SqlType::MONEY,
        ColumnType::DateTime => SqlType::DateTime,
        ColumnType::String => SqlType::TEXT,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Empty for tables without a declared primary key.
    pub primary_key: Vec<String>,
}

impl TableDef {
    /// Derives a definition from a frame whose column names are already
    /// sanitized. Columns listed in `not_null` are declared `NOT NULL`.
    pub fn from_frame(name: &str, frame: &Frame, not_null: &[String], primary_key: &[String]) -> Self {
        let columns = frame
            .columns
            .iter()
            .map(|column| ColumnDef {
                name: column.name.clone(),
                sql_type: infer_sql_type(column.datatype, &column.name),
                nullable: !not_null.contains(&column.name),
            })
            .collect();
        Self {
            name: sanitize_identifier(name),
            columns,
            primary_key: primary_key.to_vec(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    /// Single-column index named `idx_<column>`.
    pub fn for_column(table: &str, column: &str) -> Self {
        let column = sanitize_identifier(column);
        Self {
            name: format!("idx_{column}"),
            table: sanitize_identifier(table),
            columns: vec![column],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl ForeignKeyDef {
    /// Constraint `fk_<table>_<referenced>` over identically named columns.
    pub fn linking(table: &str, referenced_table: &str, columns: &[String]) -> Self {
        let table = sanitize_identifier(table);
        let referenced_table = sanitize_identifier(referenced_table);
        let columns = columns.iter().map(|c| sanitize_identifier(c)).collect::<Vec<_>>();
        Self {
            name: format!("fk_{table}_{referenced_table}"),
            table,
            referenced_columns: columns.clone(),
            columns,
            referenced_table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    DropTable(String),
    CreateTable(TableDef),
    CreateIndex(IndexDef),
    AddForeignKey(ForeignKeyDef),
}

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT INTO t (cols) VALUES` prefix shared by the backends.
pub fn insert_prefix(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES",
        quote_ident(table),
        quote_list(columns)
    )
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::DropTable(name) => write!(f, "DROP TABLE IF EXISTS {}", quote_ident(name)),
            Statement::CreateTable(table) => {
                let mut lines = table
                    .columns
                    .iter()
                    .map(|column| {
                        let null = if column.nullable { "" } else { " NOT NULL" };
                        format!("    {} {}{null}", quote_ident(&column.name), column.sql_type)
                    })
                    .collect::<Vec<_>>();
                if !table.primary_key.is_empty() {
                    lines.push(format!("    PRIMARY KEY ({})", quote_list(&table.primary_key)));
                }
                write!(
                    f,
                    "CREATE TABLE {} (\n{}\n)",
                    quote_ident(&table.name),
                    lines.join(",\n")
                )
            }
            Statement::CreateIndex(index) => write!(
                f,
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&index.name),
                quote_ident(&index.table),
                quote_list(&index.columns)
            ),
            Statement::AddForeignKey(fk) => write!(
                f,
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&fk.table),
                quote_ident(&fk.name),
                quote_list(&fk.columns),
                quote_ident(&fk.referenced_table),
                quote_list(&fk.referenced_columns)
            ),
        }
    }
}
