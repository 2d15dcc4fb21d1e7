//! Merged health-check table.
//!
//! Run metadata and measurement samples are inner-joined on `case` into a single
//! Arrow [`RecordBatch`]. Rows are kept sorted by the composite index
//! `(controller_measured, case)`; the index maps each key to its contiguous row
//! range.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, DictionaryArray, Float64Array, Int64Array, RecordBatch,
    StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int32Type, Int64Type, Schema, SchemaRef, TimeUnit,
    TimestampMicrosecondType,
};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::payload::{RunCase, Sample};
use crate::{Error, Metric};

pub const CASE: &str = "case";
pub const CASE_UUID: &str = "case_uuid";
pub const NAME: &str = "name";
pub const CONTROLLER_SET: &str = "controller_set";
pub const TYPE: &str = "type";
pub const OUTPUT: &str = "output";
pub const DURATION: &str = "duration";
pub const DATETIME: &str = "datetime";
pub const MSEC_ELAPSED: &str = "msec_elapsed";
pub const CONTROLLER_MEASURED: &str = "controller_measured";

fn categorical() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

/// Schema of the merged table. Metadata columns come first, in payload order,
/// followed by the sample columns.
pub fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(CASE, DataType::Int64, false),
        Field::new(CASE_UUID, categorical(), false),
        Field::new(NAME, categorical(), false),
        Field::new(CONTROLLER_SET, DataType::Int64, false),
        Field::new(TYPE, categorical(), false),
        Field::new(OUTPUT, DataType::Float64, false),
        Field::new(DURATION, DataType::Int64, false),
        Field::new(
            DATETIME,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new(MSEC_ELAPSED, DataType::Int64, false),
        Field::new(CONTROLLER_MEASURED, DataType::Int64, false),
        Field::new(Metric::Voltage.column(), DataType::Float64, false),
        Field::new(Metric::Position.column(), DataType::Float64, false),
        Field::new(Metric::Speed.column(), DataType::Float64, false),
        Field::new(Metric::SupplyCurrent.column(), DataType::Float64, false),
        Field::new(Metric::StatorCurrent.column(), DataType::Float64, false),
    ]))
}

/// Rows lost by the inner join.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Samples whose case id has no metadata row.
    pub dropped_samples: usize,
    /// Metadata cases that have no samples.
    pub cases_without_samples: Vec<i64>,
}

impl JoinReport {
    pub fn is_lossless(&self) -> bool {
        self.dropped_samples == 0 && self.cases_without_samples.is_empty()
    }
}

/// `(controller_measured, case)` → contiguous row range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeIndex {
    groups: BTreeMap<(i64, i64), Range<usize>>,
}

impl CompositeIndex {
    fn build(controllers: &Int64Array, cases: &Int64Array) -> Self {
        let mut groups: BTreeMap<(i64, i64), Range<usize>> = BTreeMap::new();
        for row in 0..controllers.len() {
            let key = (controllers.value(row), cases.value(row));
            groups
                .entry(key)
                .and_modify(|range| range.end = row + 1)
                .or_insert(row..row + 1);
        }
        CompositeIndex { groups }
    }

    pub fn get(&self, controller: i64, case: i64) -> Option<Range<usize>> {
        self.groups.get(&(controller, case)).cloned()
    }

    /// Row ranges for every case the controller was measured in, ordered by case.
    pub fn controller_rows(&self, controller: i64) -> impl Iterator<Item = Range<usize>> + '_ {
        self.groups
            .range((controller, i64::MIN)..=(controller, i64::MAX))
            .map(|(_, range)| range.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.groups.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Dictionary-encoded string columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Categorical {
    CaseUuid,
    Name,
    Type,
}

impl Categorical {
    pub const fn column(self) -> &'static str {
        match self {
            Categorical::CaseUuid => CASE_UUID,
            Categorical::Name => NAME,
            Categorical::Type => TYPE,
        }
    }

    const fn position(self) -> usize {
        match self {
            Categorical::CaseUuid => 1,
            Categorical::Name => 2,
            Categorical::Type => 4,
        }
    }
}

const CASE_POS: usize = 0;
const CONTROLLER_SET_POS: usize = 3;
const OUTPUT_POS: usize = 5;
const DURATION_POS: usize = 6;
const DATETIME_POS: usize = 7;
const MSEC_ELAPSED_POS: usize = 8;
const CONTROLLER_MEASURED_POS: usize = 9;

const fn metric_position(metric: Metric) -> usize {
    match metric {
        Metric::Voltage => 10,
        Metric::Position => 11,
        Metric::Speed => 12,
        Metric::SupplyCurrent => 13,
        Metric::StatorCurrent => 14,
    }
}

/// The merged, index-sorted table.
///
/// Column layout is fixed by [`schema()`]; every constructor rebinds its batch to
/// that schema, so the typed accessors below cannot fail.
#[derive(Clone, Debug)]
pub struct MergedTable {
    batch: RecordBatch,
    index: CompositeIndex,
    created: Option<NaiveDateTime>,
    join_report: JoinReport,
}

impl MergedTable {
    /// Inner-joins `meta` and `samples` on case id, stamping `created` onto every row.
    pub fn build(
        meta: &[RunCase],
        samples: &[Sample],
        created: NaiveDateTime,
    ) -> Result<Self, Error> {
        let mut samples_by_case: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, sample) in samples.iter().enumerate() {
            samples_by_case.entry(sample.case).or_default().push(i);
        }

        let mut seen_cases: HashMap<i64, usize> = HashMap::new();
        let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(samples.len());
        let mut join_report = JoinReport::default();
        for (i, run_case) in meta.iter().enumerate() {
            *seen_cases.entry(run_case.case).or_default() += 1;
            match samples_by_case.get(&run_case.case) {
                Some(rows) => pairs.extend(rows.iter().map(|&j| (i, j))),
                None => join_report.cases_without_samples.push(run_case.case),
            }
        }
        for (case, count) in &seen_cases {
            if *count > 1 {
                warn!(case, count, "duplicate case id in run metadata");
            }
        }
        join_report.dropped_samples = samples
            .iter()
            .filter(|s| !seen_cases.contains_key(&s.case))
            .count();
        if join_report.dropped_samples > 0 {
            warn!(
                dropped = join_report.dropped_samples,
                "samples without run metadata dropped by join"
            );
        }
        if !join_report.cases_without_samples.is_empty() {
            warn!(cases = ?join_report.cases_without_samples, "cases without samples dropped by join");
        }

        // stored at microsecond precision
        let created_micros = created.and_utc().timestamp_micros();
        let created = chrono::DateTime::from_timestamp_micros(created_micros)
            .ok_or(Error::InvalidTimestamp(created_micros))?
            .naive_utc();
        let meta_i64 = |f: fn(&RunCase) -> i64| -> ArrayRef {
            Arc::new(Int64Array::from_iter_values(
                pairs.iter().map(|&(i, _)| f(&meta[i])),
            ))
        };
        let meta_str = |f: fn(&RunCase) -> &str| -> ArrayRef {
            let array: DictionaryArray<Int32Type> =
                pairs.iter().map(|&(i, _)| f(&meta[i])).collect();
            Arc::new(array)
        };
        let sample_i64 = |f: fn(&Sample) -> i64| -> ArrayRef {
            Arc::new(Int64Array::from_iter_values(
                pairs.iter().map(|&(_, j)| f(&samples[j])),
            ))
        };
        let sample_f64 = |f: fn(&Sample) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from_iter_values(
                pairs.iter().map(|&(_, j)| f(&samples[j])),
            ))
        };

        let columns: Vec<ArrayRef> = vec![
            meta_i64(|m| m.case),
            meta_str(|m| m.case_uuid.as_str()),
            meta_str(|m| m.name.as_str()),
            meta_i64(|m| m.controller),
            meta_str(|m| m.test_type.as_str()),
            Arc::new(Float64Array::from_iter_values(
                pairs.iter().map(|&(i, _)| meta[i].output),
            )),
            meta_i64(|m| m.duration),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                std::iter::repeat_n(created_micros, pairs.len()),
            )),
            sample_i64(|s| s.msec_elapsed),
            sample_i64(|s| s.controller),
            sample_f64(|s| s.voltage),
            sample_f64(|s| s.position),
            sample_f64(|s| s.speed),
            sample_f64(|s| s.supply_current),
            sample_f64(|s| s.stator_current),
        ];
        let batch = RecordBatch::try_new(schema(), columns)?;
        Ok(Self::from_batch(batch)?
            .with_created(created)
            .with_join_report(join_report))
    }

    /// Adopts an existing batch, re-sorting it by the composite index.
    ///
    /// The batch is rebound to [`schema()`], so a batch read back from a snapshot
    /// must carry the same column types.
    pub fn from_batch(batch: RecordBatch) -> Result<Self, Error> {
        let batch = RecordBatch::try_new(schema(), batch.columns().to_vec())?;
        let batch = sort_by_index(&batch)?;
        let index = CompositeIndex::build(
            batch.column(CONTROLLER_MEASURED_POS).as_primitive::<Int64Type>(),
            batch.column(CASE_POS).as_primitive::<Int64Type>(),
        );
        debug!(rows = batch.num_rows(), groups = index.len(), "indexed table");
        let mut table = MergedTable {
            batch,
            index,
            created: None,
            join_report: JoinReport::default(),
        };
        if !table.is_empty() {
            let micros = table.datetimes().value(0);
            let created = chrono::DateTime::from_timestamp_micros(micros)
                .ok_or(Error::InvalidTimestamp(micros))?;
            table.created = Some(created.naive_utc());
        }
        Ok(table)
    }

    pub fn with_created(mut self, created: NaiveDateTime) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_join_report(mut self, join_report: JoinReport) -> Self {
        self.join_report = join_report;
        self
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn index(&self) -> &CompositeIndex {
        &self.index
    }

    pub fn join_report(&self) -> &JoinReport {
        &self.join_report
    }

    /// Load timestamp shared by every row.
    pub fn created(&self) -> Option<NaiveDateTime> {
        self.created
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn case_ids(&self) -> &Int64Array {
        self.batch.column(CASE_POS).as_primitive::<Int64Type>()
    }

    pub fn controllers_set(&self) -> &Int64Array {
        self.batch
            .column(CONTROLLER_SET_POS)
            .as_primitive::<Int64Type>()
    }

    pub fn controllers_measured(&self) -> &Int64Array {
        self.batch
            .column(CONTROLLER_MEASURED_POS)
            .as_primitive::<Int64Type>()
    }

    pub fn outputs(&self) -> &Float64Array {
        self.batch.column(OUTPUT_POS).as_primitive::<Float64Type>()
    }

    pub fn durations(&self) -> &Int64Array {
        self.batch.column(DURATION_POS).as_primitive::<Int64Type>()
    }

    pub fn datetimes(&self) -> &TimestampMicrosecondArray {
        self.batch
            .column(DATETIME_POS)
            .as_primitive::<TimestampMicrosecondType>()
    }

    pub fn msec_elapsed(&self) -> &Int64Array {
        self.batch
            .column(MSEC_ELAPSED_POS)
            .as_primitive::<Int64Type>()
    }

    pub fn metric(&self, metric: Metric) -> &Float64Array {
        self.batch
            .column(metric_position(metric))
            .as_primitive::<Float64Type>()
    }

    pub fn categorical_column(&self, column: Categorical) -> &DictionaryArray<Int32Type> {
        self.batch
            .column(column.position())
            .as_dictionary::<Int32Type>()
    }

    /// Value of a categorical column at `row`.
    pub fn categorical(&self, column: Categorical, row: usize) -> Result<&str, Error> {
        self.check_row(row)?;
        Ok(dictionary_value(self.categorical_column(column), row))
    }

    /// Subsystem name at `row`. Panics if `row` is out of bounds.
    pub(crate) fn name_at(&self, row: usize) -> &str {
        dictionary_value(self.categorical_column(Categorical::Name), row)
    }

    pub(crate) fn test_type_at(&self, row: usize) -> &str {
        dictionary_value(self.categorical_column(Categorical::Type), row)
    }

    /// Replaces one cell of a categorical column.
    pub fn set_categorical(
        &mut self,
        column: Categorical,
        row: usize,
        value: &str,
    ) -> Result<(), Error> {
        self.check_row(row)?;
        let current = self.categorical_column(column);
        let updated: DictionaryArray<Int32Type> = (0..current.len())
            .map(|i| {
                if i == row {
                    value
                } else {
                    dictionary_value(current, i)
                }
            })
            .collect();
        self.replace_column(column.position(), Arc::new(updated))
    }

    /// Replaces one cell of a metric column.
    pub fn set_metric(&mut self, metric: Metric, row: usize, value: f64) -> Result<(), Error> {
        self.check_row(row)?;
        let mut values = self.metric(metric).values().to_vec();
        values[row] = value;
        self.replace_column(metric_position(metric), Arc::new(Float64Array::from(values)))
    }

    fn replace_column(&mut self, position: usize, array: ArrayRef) -> Result<(), Error> {
        let mut columns = self.batch.columns().to_vec();
        columns[position] = array;
        self.batch = RecordBatch::try_new(self.batch.schema(), columns)?;
        Ok(())
    }

    fn check_row(&self, row: usize) -> Result<(), Error> {
        let len = self.num_rows();
        if row >= len {
            return Err(Error::RowOutOfBounds { row, len });
        }
        Ok(())
    }
}

fn dictionary_value(array: &DictionaryArray<Int32Type>, row: usize) -> &str {
    let key = array.keys().value(row) as usize;
    array
        .values()
        .as_any()
        .downcast_ref::<StringArray>()
        .map_or("", |values| values.value(key))
}

/// Stable sort by `(controller_measured, case)`.
fn sort_by_index(batch: &RecordBatch) -> Result<RecordBatch, Error> {
    let cases = batch.column(CASE_POS).as_primitive::<Int64Type>();
    let controllers = batch
        .column(CONTROLLER_MEASURED_POS)
        .as_primitive::<Int64Type>();
    let mut order: Vec<u64> = (0..batch.num_rows() as u64).collect();
    order.sort_by_key(|&row| {
        let row = row as usize;
        (controllers.value(row), cases.value(row))
    });
    if order.iter().enumerate().all(|(i, &row)| i == row as usize) {
        return Ok(batch.clone());
    }
    let indices = UInt64Array::from(order);
    Ok(arrow::compute::take_record_batch(batch, &indices)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn run_case(case: i64, name: &str, controller: i64) -> RunCase {
        RunCase {
            case,
            case_uuid: format!("uuid-{case}"),
            name: name.to_string(),
            controller,
            test_type: "time".to_string(),
            output: 0.25,
            duration: 5_000_000,
        }
    }

    pub fn sample(case: i64, controller: i64, msec_elapsed: i64, value: f64) -> Sample {
        Sample {
            case,
            msec_elapsed,
            controller,
            voltage: value,
            position: value,
            speed: value,
            supply_current: value,
            stator_current: value,
        }
    }

    pub fn created() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2023-02-28 10:57:12", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_build_sorts_by_controller_then_case() {
        let meta = vec![
            run_case(0, "DriveSubsystem", 2),
            run_case(1, "IntakeSubsystem", 1),
        ];
        let samples = vec![
            sample(0, 2, 0, 0.0),
            sample(0, 2, 10, 0.0),
            sample(1, 1, 0, 0.0),
            sample(0, 1, 0, 0.0),
        ];
        let table = MergedTable::build(&meta, &samples, created()).unwrap();
        assert_eq!(table.num_rows(), 4);

        let controllers = table.controllers_measured();
        let cases = table.case_ids();
        let keys: Vec<(i64, i64)> = (0..4)
            .map(|i| (controllers.value(i), cases.value(i)))
            .collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (2, 0), (2, 0)]);

        let elapsed = table.msec_elapsed();
        assert_eq!(elapsed.value(2), 0);
        assert_eq!(elapsed.value(3), 10);

        assert_eq!(table.index().get(2, 0), Some(2..4));
        assert_eq!(table.index().get(3, 0), None);
        let rows: Vec<_> = table.index().controller_rows(1).collect();
        assert_eq!(rows, vec![0..1, 1..2]);
    }

    #[test]
    fn test_build_suffixes_controller_columns() {
        let meta = vec![run_case(0, "DriveSubsystem", 7)];
        let samples = vec![sample(0, 8, 0, 1.0)];
        let table = MergedTable::build(&meta, &samples, created()).unwrap();
        assert_eq!(table.controllers_set().value(0), 7);
        assert_eq!(table.controllers_measured().value(0), 8);
        let names: Vec<String> = table
            .batch()
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names[3], CONTROLLER_SET);
        assert_eq!(names[7], DATETIME);
        assert_eq!(names[9], CONTROLLER_MEASURED);
        assert!(!names.iter().any(|n| n == "controller"));
    }

    #[test]
    fn test_categorical_columns_are_dictionary_encoded() {
        let meta = vec![
            run_case(0, "DriveSubsystem", 1),
            run_case(1, "DriveSubsystem", 2),
        ];
        let samples = vec![sample(0, 1, 0, 0.0), sample(1, 2, 0, 0.0)];
        let table = MergedTable::build(&meta, &samples, created()).unwrap();
        for name in [CASE_UUID, NAME, TYPE] {
            let column = table.batch().column_by_name(name).unwrap();
            assert!(matches!(column.data_type(), DataType::Dictionary(_, _)));
        }
        assert_eq!(
            table.categorical_column(Categorical::Name).values().len(),
            1
        );
        assert_eq!(
            table.categorical(Categorical::Name, 1).unwrap(),
            "DriveSubsystem"
        );
        assert_eq!(table.categorical(Categorical::CaseUuid, 1).unwrap(), "uuid-1");
    }

    #[test]
    fn test_created_timestamp_is_constant() {
        let meta = vec![run_case(0, "A", 1), run_case(1, "B", 2)];
        let samples = vec![
            sample(0, 1, 0, 0.0),
            sample(1, 2, 0, 0.0),
            sample(1, 2, 5, 0.0),
        ];
        let table = MergedTable::build(&meta, &samples, created()).unwrap();
        let datetimes = table.datetimes();
        assert!(datetimes.values().iter().all(|&t| t == datetimes.value(0)));
        assert_eq!(table.created(), Some(created()));

        let adopted = MergedTable::from_batch(table.batch().clone()).unwrap();
        assert_eq!(adopted.created(), Some(created()));
    }

    #[test]
    fn test_join_report_counts_unmatched_rows() {
        let meta = vec![run_case(0, "A", 1), run_case(5, "B", 2)];
        let samples = vec![
            sample(0, 1, 0, 0.0),
            sample(9, 1, 0, 0.0),
            sample(9, 1, 5, 0.0),
        ];
        let table = MergedTable::build(&meta, &samples, created()).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.join_report(),
            &JoinReport {
                dropped_samples: 2,
                cases_without_samples: vec![5],
            }
        );
        assert!(!table.join_report().is_lossless());
    }

    #[test]
    fn test_set_categorical_and_metric() {
        let meta = vec![run_case(0, "DriveSubsystem", 1)];
        let samples = vec![sample(0, 1, 0, 1.0), sample(0, 1, 5, 2.0)];
        let mut table = MergedTable::build(&meta, &samples, created()).unwrap();

        table
            .set_categorical(Categorical::Name, 1, "IntakeSubsystem")
            .unwrap();
        assert_eq!(table.name_at(0), "DriveSubsystem");
        assert_eq!(table.name_at(1), "IntakeSubsystem");

        table.set_metric(Metric::Speed, 0, -4.0).unwrap();
        assert_eq!(table.metric(Metric::Speed).value(0), -4.0);
        assert_eq!(table.metric(Metric::Voltage).value(0), 1.0);

        let err = table.set_metric(Metric::Speed, 2, 0.0).unwrap_err();
        assert!(matches!(err, Error::RowOutOfBounds { row: 2, len: 2 }));
    }

    #[test]
    fn test_from_batch_rejects_foreign_schema() {
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(CASE, DataType::Int64, false)])),
            vec![Arc::new(Int64Array::from(vec![0]))],
        )
        .unwrap();
        assert!(matches!(
            MergedTable::from_batch(batch),
            Err(Error::Arrow(_))
        ));
    }

    #[test]
    fn test_empty_table() {
        let table = MergedTable::build(&[], &[], created()).unwrap();
        assert!(table.is_empty());
        assert!(table.index().is_empty());
        assert_eq!(table.created(), Some(created()));
    }
}
