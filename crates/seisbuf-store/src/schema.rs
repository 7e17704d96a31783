//! Arrow layout of one sampling-interval group: one row per trace

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, ListArray, ListBuilder, StringArray,
    StringBuilder, UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use seisbuf_metadata::{ChannelKey, ChannelMetadata};
use seisbuf_tracebuf::Trace;

use crate::error::StoreError;

fn list_of(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", item, true)))
}

pub fn trace_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("network", DataType::Utf8, false),
        Field::new("station", DataType::Utf8, false),
        Field::new("channel", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, false),
        Field::new("latitude", DataType::Float64, false),
        Field::new("longitude", DataType::Float64, false),
        Field::new("elevation", DataType::Float64, false),
        Field::new("gain", DataType::Float64, false),
        Field::new("dt", DataType::Float64, false),
        Field::new("times", list_of(DataType::Float64), false),
        Field::new("data", list_of(DataType::Float64), false),
        Field::new("chunk_ptr", list_of(DataType::UInt64), false),
    ]))
}

/// Build one batch from traces sharing a sampling interval.
pub fn traces_to_batch(traces: &[&Trace], dt: f64) -> Result<RecordBatch, StoreError> {
    let mut network = StringBuilder::new();
    let mut station = StringBuilder::new();
    let mut channel = StringBuilder::new();
    let mut location = StringBuilder::new();
    let mut latitude = Float64Builder::new();
    let mut longitude = Float64Builder::new();
    let mut elevation = Float64Builder::new();
    let mut gain = Float64Builder::new();
    let mut dt_col = Float64Builder::new();
    let mut times = ListBuilder::new(Float64Builder::new());
    let mut data = ListBuilder::new(Float64Builder::new());
    let mut chunk_ptr = ListBuilder::new(UInt64Builder::new());

    for trace in traces {
        network.append_value(trace.key.network());
        station.append_value(trace.key.station());
        channel.append_value(trace.key.channel());
        location.append_value(trace.key.location());
        latitude.append_value(trace.metadata.latitude);
        longitude.append_value(trace.metadata.longitude);
        elevation.append_value(trace.metadata.elevation);
        gain.append_value(trace.metadata.gain);
        dt_col.append_value(trace.dt.unwrap_or(dt));

        times.values().append_slice(&trace.times);
        times.append(true);
        data.values().append_slice(&trace.data);
        data.append(true);
        for &p in &trace.chunk_ptr {
            chunk_ptr.values().append_value(p as u64);
        }
        chunk_ptr.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(network.finish()),
        Arc::new(station.finish()),
        Arc::new(channel.finish()),
        Arc::new(location.finish()),
        Arc::new(latitude.finish()),
        Arc::new(longitude.finish()),
        Arc::new(elevation.finish()),
        Arc::new(gain.finish()),
        Arc::new(dt_col.finish()),
        Arc::new(times.finish()),
        Arc::new(data.finish()),
        Arc::new(chunk_ptr.finish()),
    ];
    Ok(RecordBatch::try_new(trace_schema(), columns)?)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| StoreError::Schema(format!("missing or mistyped column '{}'", name)))
}

fn list_values<T: Array + 'static>(list: &ListArray, row: usize, name: &str) -> Result<T, StoreError>
where
    T: Clone,
{
    list.value(row)
        .as_any()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| StoreError::Schema(format!("list column '{}' has wrong item type", name)))
}

/// Rebuild traces from a stored batch.
pub fn batch_to_traces(batch: &RecordBatch) -> Result<Vec<Trace>, StoreError> {
    let network = column::<StringArray>(batch, "network")?;
    let station = column::<StringArray>(batch, "station")?;
    let channel = column::<StringArray>(batch, "channel")?;
    let location = column::<StringArray>(batch, "location")?;
    let latitude = column::<Float64Array>(batch, "latitude")?;
    let longitude = column::<Float64Array>(batch, "longitude")?;
    let elevation = column::<Float64Array>(batch, "elevation")?;
    let gain = column::<Float64Array>(batch, "gain")?;
    let dt = column::<Float64Array>(batch, "dt")?;
    let times = column::<ListArray>(batch, "times")?;
    let data = column::<ListArray>(batch, "data")?;
    let chunk_ptr = column::<ListArray>(batch, "chunk_ptr")?;

    let mut traces = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let key = ChannelKey::new(
            station.value(row),
            network.value(row),
            channel.value(row),
            location.value(row),
        )?;
        let metadata = ChannelMetadata {
            latitude: latitude.value(row),
            longitude: longitude.value(row),
            elevation: elevation.value(row),
            gain: gain.value(row),
        };
        let mut trace = Trace::new(key, metadata);
        trace.dt = Some(dt.value(row));
        trace.times = list_values::<Float64Array>(times, row, "times")?.values().to_vec();
        trace.data = list_values::<Float64Array>(data, row, "data")?.values().to_vec();
        trace.chunk_ptr = list_values::<UInt64Array>(chunk_ptr, row, "chunk_ptr")?
            .values()
            .iter()
            .map(|&p| p as usize)
            .collect();
        check_layout(&trace)?;
        traces.push(trace);
    }
    Ok(traces)
}

/// A stored row must describe a valid trace: matching array lengths and
/// chunk pointers running from 0 to `npts`, strictly increasing.
fn check_layout(trace: &Trace) -> Result<(), StoreError> {
    let bad = |detail: String| StoreError::Schema(format!("{}: {}", trace.key, detail));
    if trace.times.len() != trace.data.len() {
        return Err(bad(format!(
            "{} times for {} samples",
            trace.times.len(),
            trace.data.len()
        )));
    }
    match trace.dt {
        Some(dt) if dt.is_finite() && dt > 0.0 => {}
        other => return Err(bad(format!("invalid dt {:?}", other))),
    }
    let npts = trace.npts();
    match (trace.chunk_ptr.first(), trace.chunk_ptr.last()) {
        (Some(0), Some(&last)) if last == npts => {}
        _ => {
            return Err(bad(format!(
                "chunk_ptr {:?} does not span 0..{}",
                trace.chunk_ptr, npts
            )))
        }
    }
    if npts > 0 && trace.chunk_ptr.windows(2).any(|w| w[0] >= w[1]) {
        return Err(bad(format!(
            "chunk_ptr {:?} is not strictly increasing",
            trace.chunk_ptr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(sta: &str, data: Vec<f64>, chunk_ptr: Vec<usize>) -> Trace {
        let mut t = Trace::new(
            ChannelKey::new(sta, "PW", "LYZ", "00").unwrap(),
            ChannelMetadata {
                latitude: 45.0,
                longitude: -122.0,
                elevation: 10.0,
                gain: 2.0,
            },
        );
        t.dt = Some(1.0);
        t.times = (0..data.len()).map(|i| 100.0 + i as f64).collect();
        t.data = data;
        t.chunk_ptr = chunk_ptr;
        t
    }

    #[test]
    fn test_batch_preserves_arrays() {
        let a = trace("P373", vec![1.0, 2.0, 3.0], vec![0, 2, 3]);
        let b = trace("P395", vec![9.0], vec![0, 1]);

        let batch = traces_to_batch(&[&a, &b], 1.0).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 12);

        let restored = batch_to_traces(&batch).unwrap();
        assert_eq!(restored, vec![a, b]);
    }

    #[test]
    fn test_inconsistent_rows_rejected() {
        let cases = [
            trace("P373", vec![1.0, 2.0, 3.0], vec![0, 2]),
            trace("P373", vec![1.0, 2.0, 3.0], vec![1, 3]),
            trace("P373", vec![1.0, 2.0, 3.0], vec![0, 2, 2, 3]),
            trace("P373", vec![1.0, 2.0], vec![]),
        ];
        for bad in &cases {
            let batch = traces_to_batch(&[bad], 1.0).unwrap();
            assert!(
                matches!(batch_to_traces(&batch), Err(StoreError::Schema(_))),
                "accepted chunk_ptr {:?}",
                bad.chunk_ptr
            );
        }

        let mut short_times = trace("P373", vec![1.0, 2.0], vec![0, 2]);
        short_times.times.pop();
        let batch = traces_to_batch(&[&short_times], 1.0).unwrap();
        assert!(matches!(batch_to_traces(&batch), Err(StoreError::Schema(_))));
    }

    #[test]
    fn test_missing_column_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("network", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["PW"])) as ArrayRef],
        )
        .unwrap();
        assert!(matches!(
            batch_to_traces(&batch),
            Err(StoreError::Schema(_))
        ));
    }
}
