use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{fs, fs::File, path::Path, sync::Arc};

use crate::error::{Result, ScrapeError};
use crate::process::CleanTable;

/// Narrowest Arrow type holding every non-empty value: Int64, then Float64,
/// then Utf8. A column with no values is Utf8.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> DataType {
    let mut seen = false;
    let mut dtype = DataType::Int64;
    for v in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
        seen = true;
        if dtype == DataType::Int64 && v.parse::<i64>().is_ok() {
            continue;
        }
        if v.parse::<f64>().is_ok() {
            dtype = DataType::Float64;
        } else {
            return DataType::Utf8;
        }
    }
    if seen {
        dtype
    } else {
        DataType::Utf8
    }
}

fn column_array(values: &[&str], dtype: &DataType) -> ArrayRef {
    let cleaned = values.iter().map(|v| Some(v.trim()).filter(|v| !v.is_empty()));
    match dtype {
        DataType::Int64 => Arc::new(
            cleaned
                .map(|v| v.and_then(|v| v.parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            cleaned
                .map(|v| v.and_then(|v| v.parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        _ => Arc::new(
            values
                .iter()
                .map(|v| Some(*v).filter(|v| !v.is_empty()))
                .collect::<StringArray>(),
        ),
    }
}

/// Convert the table into a single record batch with inferred column types.
pub fn to_record_batch(table: &CleanTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.headers.len());
    let mut arrays = Vec::with_capacity(table.headers.len());
    for (idx, name) in table.headers.iter().enumerate() {
        let values: Vec<&str> = table
            .rows
            .iter()
            .map(|r| r.get(idx).map(String::as_str).unwrap_or(""))
            .collect();
        let dtype = infer_column_type(values.iter().copied());
        arrays.push(column_array(&values, &dtype));
        fields.push(Field::new(name, dtype, true));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Write `table` as Snappy-compressed Parquet via a temporary sibling file.
pub fn write_parquet(table: &CleanTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;
    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).map_err(|e| ScrapeError::io(&tmp, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let written = ArrowWriter::try_new(file, batch.schema(), Some(props)).and_then(|mut writer| {
        writer.write(&batch)?;
        writer.close().map(|_| ())
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ScrapeError::io(path, e)
    })
}
