//! Arrow IPC stream framing for tables carried as bytes.
//!
//! Layout: one schema message followed by record batch messages. Multiple
//! batches on read are concatenated into one.

use std::io::Cursor;

use arrow::compute::concat_batches;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_core::error::{Error, Result};

pub fn write_stream(batch: &RecordBatch) -> Result<Bytes> {
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &batch.schema())
            .map_err(|e| Error::conversion("columnar table", "ipc stream", e.to_string()))?;
        writer
            .write(batch)
            .map_err(|e| Error::conversion("columnar table", "ipc stream", e.to_string()))?;
        writer
            .finish()
            .map_err(|e| Error::conversion("columnar table", "ipc stream", e.to_string()))?;
    }
    Ok(Bytes::from(buf))
}

pub fn read_stream(bytes: &[u8]) -> Result<RecordBatch> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| Error::conversion("bytes", "columnar table", format!("not an Arrow IPC stream: {e}")))?;
    let schema = reader.schema();
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::conversion("bytes", "columnar table", e.to_string()))?;
    concat_batches(&schema, &batches)
        .map_err(|e| Error::conversion("bytes", "columnar table", e.to_string()))
}
