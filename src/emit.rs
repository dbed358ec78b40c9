//! Maps closed windows plus series labels onto output rows and hands them to
//! a [`RecordSink`] in emission order.

use std::io::Write;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::aggregate::Aggregation;
use crate::store::Label;
use crate::utils::label_value;

pub const NAME_LABEL: &str = "__name__";
pub const TARGET_LABEL: &str = "__blockgen_target__";
pub const CLUSTER_LABEL: &str = "cluster";
pub const REPLICA_LABEL: &str = "replica";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink already finished")]
    Finished,
}

/// The fixed label columns of an output row. Labels the series does not
/// carry are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SeriesLabels {
    #[serde(rename = "__name__")]
    pub name: String,
    #[serde(rename = "__blockgen_target__")]
    pub target: String,
    pub cluster: String,
    pub replica: String,
}

impl SeriesLabels {
    pub fn from_labels(labels: &[Label]) -> Self {
        let get = |name| label_value(labels, name).unwrap_or_default().to_string();
        SeriesLabels {
            name: get(NAME_LABEL),
            target: get(TARGET_LABEL),
            cluster: get(CLUSTER_LABEL),
            replica: get(REPLICA_LABEL),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    labels: &'a SeriesLabels,
    #[serde(rename = "_timestamp_millis")]
    timestamp: i64,
    #[serde(rename = "_count")]
    count: i64,
    #[serde(rename = "_sum")]
    sum: f64,
    #[serde(rename = "_min")]
    min: f64,
    #[serde(rename = "_max")]
    max: f64,
}

impl<'a> Row<'a> {
    fn new(labels: &'a SeriesLabels, aggr: &Aggregation) -> Self {
        Row {
            labels,
            timestamp: aggr.timestamp,
            count: aggr.count,
            sum: aggr.sum,
            min: aggr.min,
            max: aggr.max,
        }
    }
}

/// Destination for output rows. Rows must be written in call order.
pub trait RecordSink {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError>;

    /// Called after the last row of each series.
    fn end_series(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Flush and close the output. No rows may be written afterwards.
    fn finish(&mut self) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        (**self).write(labels, aggr)
    }

    fn end_series(&mut self) -> Result<(), SinkError> {
        (**self).end_series()
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        (**self).write(labels, aggr)
    }

    fn end_series(&mut self) -> Result<(), SinkError> {
        (**self).end_series()
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Collects rows in memory.
impl RecordSink for Vec<(SeriesLabels, Aggregation)> {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        self.push((labels.clone(), *aggr));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub fn aggregation_schema() -> Schema {
    Schema::new(vec![
        Field::new(NAME_LABEL, DataType::Utf8, false),
        Field::new(TARGET_LABEL, DataType::Utf8, false),
        Field::new(CLUSTER_LABEL, DataType::Utf8, false),
        Field::new(REPLICA_LABEL, DataType::Utf8, false),
        Field::new(
            "_timestamp_millis",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("_count", DataType::Int64, false),
        Field::new("_sum", DataType::Float64, false),
        Field::new("_min", DataType::Float64, false),
        Field::new("_max", DataType::Float64, false),
    ])
}

/// Parquet output. Rows are buffered per series and handed to the writer as
/// one record batch; the writer cuts row groups in order.
pub struct ParquetSink<W: Write + Send> {
    writer: Option<ArrowWriter<W>>,
    schema: SchemaRef,
    name: StringBuilder,
    target: StringBuilder,
    cluster: StringBuilder,
    replica: StringBuilder,
    timestamp: TimestampMillisecondBuilder,
    count: Int64Builder,
    sum: Float64Builder,
    min: Float64Builder,
    max: Float64Builder,
    buffered: usize,
}

impl<W: Write + Send> ParquetSink<W> {
    pub fn try_new(writer: W) -> Result<Self, SinkError> {
        let schema = Arc::new(aggregation_schema());
        let writer = ArrowWriter::try_new(writer, schema.clone(), None)?;
        Ok(ParquetSink {
            writer: Some(writer),
            schema,
            name: StringBuilder::new(),
            target: StringBuilder::new(),
            cluster: StringBuilder::new(),
            replica: StringBuilder::new(),
            timestamp: TimestampMillisecondBuilder::new(),
            count: Int64Builder::new(),
            sum: Float64Builder::new(),
            min: Float64Builder::new(),
            max: Float64Builder::new(),
            buffered: 0,
        })
    }

    fn write_batch(&mut self) -> Result<(), SinkError> {
        if self.buffered == 0 {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.name.finish()),
            Arc::new(self.target.finish()),
            Arc::new(self.cluster.finish()),
            Arc::new(self.replica.finish()),
            Arc::new(self.timestamp.finish()),
            Arc::new(self.count.finish()),
            Arc::new(self.sum.finish()),
            Arc::new(self.min.finish()),
            Arc::new(self.max.finish()),
        ];
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer
            .as_mut()
            .ok_or(SinkError::Finished)?
            .write(&batch)?;
        self.buffered = 0;
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for ParquetSink<W> {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Err(SinkError::Finished);
        }
        self.name.append_value(&labels.name);
        self.target.append_value(&labels.target);
        self.cluster.append_value(&labels.cluster);
        self.replica.append_value(&labels.replica);
        self.timestamp.append_value(aggr.timestamp);
        self.count.append_value(aggr.count);
        self.sum.append_value(aggr.sum);
        self.min.append_value(aggr.min);
        self.max.append_value(aggr.max);
        self.buffered += 1;
        Ok(())
    }

    fn end_series(&mut self) -> Result<(), SinkError> {
        self.write_batch()
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.write_batch()?;
        let writer = self.writer.take().ok_or(SinkError::Finished)?;
        let metadata = writer.close()?;
        debug!(
            "parquet closed: {} rows in {} row groups",
            metadata.num_rows,
            metadata.row_groups.len()
        );
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink { writer }
    }
}

impl<W: Write> RecordSink for JsonSink<W> {
    fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &Row::new(labels, aggr))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(self.writer.flush()?)
    }
}

/// Writes rows for one series at a time and counts them.
pub struct Emitter<S> {
    sink: S,
    rows: u64,
}

impl<S: RecordSink> Emitter<S> {
    pub fn new(sink: S) -> Self {
        Emitter { sink, rows: 0 }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn emit(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
        self.sink.write(labels, aggr)?;
        self.rows += 1;
        Ok(())
    }

    pub fn end_series(&mut self) -> Result<(), SinkError> {
        self.sink.end_series()
    }

    /// Close the sink, returning the rows written and the sink itself.
    pub fn finish(mut self) -> Result<(u64, S), SinkError> {
        self.sink.finish()?;
        Ok((self.rows, self.sink))
    }
}

#[cfg(test)]
fn test_labels() -> Vec<Label> {
    [
        ("__blockgen_target__", "1"),
        ("__name__", "continuous_app_metric0"),
        ("cluster", "eu-1"),
        ("replica", "0"),
    ]
    .iter()
    .map(|(name, value)| Label {
        name: name.to_string(),
        value: value.to_string(),
    })
    .collect()
}

#[test]
fn test_series_labels() {
    let labels = SeriesLabels::from_labels(&test_labels());
    assert_eq!(labels.name, "continuous_app_metric0");
    assert_eq!(labels.target, "1");
    assert_eq!(labels.cluster, "eu-1");
    assert_eq!(labels.replica, "0");

    let partial = SeriesLabels::from_labels(&test_labels()[1..2]);
    assert_eq!(partial.name, "continuous_app_metric0");
    assert_eq!(partial.replica, "");
}

#[test]
fn test_json_sink() {
    let labels = SeriesLabels::from_labels(&test_labels());
    let aggr = Aggregation {
        timestamp: 300_000,
        count: 3,
        sum: -1.,
        min: -10.,
        max: 10.,
    };
    let mut emitter = Emitter::new(JsonSink::new(Vec::new()));
    emitter.emit(&labels, &aggr).unwrap();
    emitter.emit(&labels, &aggr).unwrap();
    emitter.end_series().unwrap();
    let (rows, sink) = emitter.finish().unwrap();
    assert_eq!(rows, 2);

    let out = String::from_utf8(sink.writer).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    let row: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(
        row,
        serde_json::json!({
            "__name__": "continuous_app_metric0",
            "__blockgen_target__": "1",
            "cluster": "eu-1",
            "replica": "0",
            "_timestamp_millis": 300000,
            "_count": 3,
            "_sum": -1.0,
            "_min": -10.0,
            "_max": 10.0,
        })
    );
}

#[test]
fn test_parquet_sink() {
    use arrow::array::{Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let labels = SeriesLabels::from_labels(&test_labels());
    let mut buf = Vec::new();
    {
        let mut sink = ParquetSink::try_new(&mut buf).unwrap();
        for (i, ts) in [300_000, 720_000].iter().enumerate() {
            let aggr = Aggregation {
                timestamp: *ts,
                count: i as i64 + 1,
                sum: 1.5,
                min: -1.,
                max: 2.,
            };
            sink.write(&labels, &aggr).unwrap();
        }
        sink.end_series().unwrap();
        sink.end_series().unwrap();
        sink.finish().unwrap();
        assert!(matches!(sink.finish(), Err(SinkError::Finished)));
        let late = Aggregation {
            timestamp: 0,
            count: 1,
            sum: 0.,
            min: 0.,
            max: 0.,
        };
        assert!(matches!(sink.write(&labels, &late), Err(SinkError::Finished)));
    }

    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(buf))
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    let batch = &batches[0];
    assert_eq!(batch.schema().fields().len(), 9);

    let column = |name: &str| batch.column_by_name(name).unwrap().clone();
    let names = column("__name__");
    let names = names.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(names.value(1), "continuous_app_metric0");
    let ts = column("_timestamp_millis");
    let ts = ts.as_any().downcast_ref::<TimestampMillisecondArray>().unwrap();
    assert_eq!(ts.values().to_vec(), vec![300_000, 720_000]);
    let counts = column("_count");
    let counts = counts.as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(counts.values().to_vec(), vec![1, 2]);
    let sums = column("_sum");
    let sums = sums.as_any().downcast_ref::<Float64Array>().unwrap();
    assert_eq!(sums.len(), 2);
    assert_eq!(sums.value(0), 1.5);
}
