#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use star_loader::data::{ColumnType, Value};
use star_loader::frame::Frame;
use tempfile::{tempdir, TempDir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a miniature Global Electronics dataset under the default names.
    pub fn write_dataset(&self) {
        self.write(
            "Sales.csv",
            "Order Number,Line Item,Order Date,Delivery Date,CustomerKey,StoreKey,ProductKey,Quantity,Currency Code\n\
             366000,1,1/1/2016,,1,1,10,1,USD\n\
             366001,1,1/1/2016,1/13/2016,2,2,11,2,EUR\n\
             366002,1,1/2/2016,,1,2,10,3,USD\n",
        );
        self.write(
            "Customers.csv",
            "CustomerKey,Gender,Name,City,State Code,Birthday\n\
             1,Male,Ada Park,Berlin,BE,7/3/1939\n\
             2,,Lin Zhou,Toronto,NA,9/27/1979\n",
        );
        self.write(
            "Stores.csv",
            "StoreKey,Country,State,Square Meters,Open Date\n\
             1,Germany,Berlin,1200,1/1/2008\n\
             2,Online,Online,,1/1/2010\n",
        );
        self.write(
            "Products.csv",
            "ProductKey,Product Name,Brand,Unit Cost USD,Unit Price USD\n\
             10,Phone,Contoso,$60.00 ,$129.99 \n\
             11,\"Laptop, 15in\",Contoso,\"$1,010.50 \",\"$2,199.00 \"\n",
        );
        self.write(
            "Exchange_Rates.csv",
            "Date,Currency,Exchange\n\
             1/1/2016,USD,1.0\n\
             1/1/2016,EUR,0.9185\n\
             1/2/2016,USD,1.0\n\
             1/2/2016,EUR,0.9200\n",
        );
    }
}

pub fn ints(values: &[i64]) -> Vec<Option<Value>> {
    values.iter().map(|v| Some(Value::Integer(*v))).collect()
}

pub fn texts(values: &[&str]) -> Vec<Option<Value>> {
    values
        .iter()
        .map(|v| Some(Value::String(v.to_string())))
        .collect()
}

pub fn floats(values: &[f64]) -> Vec<Option<Value>> {
    values.iter().map(|v| Some(Value::Float(*v))).collect()
}

pub fn frame(columns: Vec<(&str, ColumnType, Vec<Option<Value>>)>) -> Frame {
    columns
        .into_iter()
        .fold(Frame::new(), |frame, (name, datatype, values)| {
            frame.with_column(name, datatype, values).expect("column")
        })
}
