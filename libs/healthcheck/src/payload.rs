//! Wire shape of the health-check document served by the robot.
//!
//! A document has two top-level frames, `meta` and `data`. Each frame is either
//! a list of records or a column map (`{"column": {"row": value}}`), which is
//! what the robot's dataframe export produces. `data` may also arrive split into
//! one frame per case.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// One configured test case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunCase {
    pub case: i64,
    pub case_uuid: String,
    pub name: String,
    #[serde(alias = "talon")]
    pub controller: i64,
    #[serde(rename = "type")]
    pub test_type: String,
    pub output: f64,
    pub duration: i64,
}

/// One measurement tick for one controller within a case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub case: i64,
    pub msec_elapsed: i64,
    #[serde(alias = "talon")]
    pub controller: i64,
    pub voltage: f64,
    pub position: f64,
    pub speed: f64,
    pub supply_current: f64,
    pub stator_current: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame<T> {
    Records(Vec<T>),
    Columns(BTreeMap<String, BTreeMap<String, Value>>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleData {
    Chunked(Vec<Frame<Sample>>),
    Single(Frame<Sample>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payload {
    pub meta: Frame<RunCase>,
    pub data: SampleData,
}

impl Payload {
    pub fn from_records(meta: Vec<RunCase>, data: Vec<Sample>) -> Self {
        Payload {
            meta: Frame::Records(meta),
            data: SampleData::Single(Frame::Records(data)),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn into_parts(self) -> Result<(Vec<RunCase>, Vec<Sample>), Error> {
        let meta = self.meta.into_rows()?;
        let data = self.data.into_rows()?;
        Ok((meta, data))
    }
}

impl SampleData {
    /// Flattens per-case chunks into a single list, keeping chunk order.
    pub fn into_rows(self) -> Result<Vec<Sample>, Error> {
        match self {
            SampleData::Single(frame) => frame.into_rows(),
            SampleData::Chunked(chunks) => {
                let mut rows = Vec::new();
                for chunk in chunks {
                    rows.extend(chunk.into_rows()?);
                }
                Ok(rows)
            }
        }
    }
}

impl<T: DeserializeOwned> Frame<T> {
    pub fn into_rows(self) -> Result<Vec<T>, Error> {
        match self {
            Frame::Records(rows) => Ok(rows),
            Frame::Columns(columns) => columns_to_rows(columns),
        }
    }
}

fn columns_to_rows<T: DeserializeOwned>(
    columns: BTreeMap<String, BTreeMap<String, Value>>,
) -> Result<Vec<T>, Error> {
    // Row labels are usually stringified integers; order numerically when they are.
    let mut labels: Vec<&String> = columns
        .values()
        .flat_map(|column| column.keys())
        .collect();
    labels.sort_by(|a, b| match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    });
    labels.dedup();

    let mut rows = Vec::with_capacity(labels.len());
    for label in labels {
        let mut record = Map::new();
        for (name, column) in &columns {
            let Some(value) = column.get(label) else {
                return Err(Error::MalformedFrame(format!(
                    "column {name} has no value for row {label}"
                )));
            };
            record.insert(name.clone(), value.clone());
        }
        rows.push(serde_json::from_value(Value::Object(record))?);
    }
    Ok(rows)
}
