//! Safetensors container I/O.
//!
//! Layout: 8-byte little-endian header length, JSON header (padded with
//! spaces to a multiple of 8), then the raw little-endian tensor bytes.
//! Each header entry is `{"dtype", "shape", "data_offsets": [start, end]}`;
//! the optional `__metadata__` entry maps strings to strings.
//!
//! Recordings and cached corpus tables are both stored in this format.
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde_json::{json, Map, Value};

use crate::error::{PipelineError, Result};
use crate::table::{Column, DataTable};

const METADATA_KEY: &str = "__metadata__";

fn malformed(msg: impl Into<String>) -> PipelineError {
    PipelineError::Format(msg.into())
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// A parsed safetensors file held in memory.
pub struct StReader {
    bytes: Vec<u8>,
    header: Map<String, Value>,
    data_start: usize,
}

impl StReader {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(malformed("safetensors file too small"));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        let end = 8usize
            .checked_add(n)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| malformed("safetensors header exceeds file"))?;
        let header: Map<String, Value> = serde_json::from_slice(&bytes[8..end])?;
        Ok(Self { bytes, header, data_start: end })
    }

    /// String-valued metadata entry.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get(METADATA_KEY)?.get(key)?.as_str()
    }

    /// Metadata entry holding JSON text, decoded.
    pub fn metadata_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let text = self
            .metadata(key)
            .ok_or_else(|| malformed(format!("missing metadata '{key}'")))?;
        Ok(serde_json::from_str(text)?)
    }

    fn entry(&self, name: &str, dtype: &str) -> Result<(&[u8], Vec<usize>)> {
        let entry = self
            .header
            .get(name)
            .ok_or_else(|| malformed(format!("missing tensor '{name}'")))?;
        let found = entry["dtype"].as_str().unwrap_or("");
        if found != dtype {
            return Err(malformed(format!("tensor '{name}' is {found}, expected {dtype}")));
        }
        let shape = entry["shape"]
            .as_array()
            .ok_or_else(|| malformed(format!("tensor '{name}' has no shape")))?
            .iter()
            .map(|v| v.as_u64().map(|x| x as usize))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| malformed(format!("tensor '{name}' has a bad shape")))?;
        let offsets = entry["data_offsets"]
            .as_array()
            .and_then(|o| Some((o.first()?.as_u64()? as usize, o.get(1)?.as_u64()? as usize)))
            .ok_or_else(|| malformed(format!("tensor '{name}' has bad offsets")))?;
        let exceeds = || malformed(format!("tensor '{name}' exceeds file"));
        let s = self.data_start.checked_add(offsets.0).ok_or_else(exceeds)?;
        let e = self.data_start.checked_add(offsets.1).ok_or_else(exceeds)?;
        if s > e || e > self.bytes.len() {
            return Err(exceeds());
        }
        let width: usize = match dtype {
            "F64" | "I64" => 8,
            _ => 4,
        };
        let expected = shape
            .iter()
            .try_fold(width, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| malformed(format!("tensor '{name}' shape {shape:?} overflows")))?;
        if e - s != expected {
            return Err(malformed(format!(
                "tensor '{name}': {} bytes for shape {shape:?}",
                e - s
            )));
        }
        Ok((&self.bytes[s..e], shape))
    }

    pub fn f32(&self, name: &str) -> Result<ArrayD<f32>> {
        let (raw, shape) = self.entry(name, "F32")?;
        let vals = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        ArrayD::from_shape_vec(IxDyn(&shape), vals).map_err(|e| malformed(e.to_string()))
    }

    pub fn f64(&self, name: &str) -> Result<Vec<f64>> {
        let (raw, _) = self.entry(name, "F64")?;
        Ok(raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    pub fn i64(&self, name: &str) -> Result<Vec<i64>> {
        let (raw, _) = self.entry(name, "I64")?;
        Ok(raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Safetensors writer for F32, F64 and I64 tensors plus string metadata.
///
/// ```rust,no_run
/// use ergpipe::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f32("signal", &[1.0f32, 2.0, 3.0], &[1, 3]);
/// w.add_i64("count", &[3], &[1]);
/// w.set_metadata("note", "three samples");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    /// Add an array of any dimensionality, in logical (row-major) order.
    pub fn add_f32_nd(&mut self, name: &str, arr: &ArrayD<f32>) {
        let data: Vec<f32> = arr.iter().copied().collect();
        self.add_f32(name, &data, arr.shape());
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn set_metadata_json<T: serde::Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.set_metadata(key, serde_json::to_string(value)?);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = Map::new();
        if !self.metadata.is_empty() {
            header_map.insert(METADATA_KEY.into(), json!(self.metadata));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;

        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut f = std::fs::File::create(path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        Ok(())
    }
}

// ── Tables ───────────────────────────────────────────────────────────────────

/// Serialise a [`DataTable`]: one tensor per numeric column (rows on axis 0),
/// text columns as JSON arrays in the metadata, column order and kinds under
/// the `columns` metadata key.
pub fn table_to_writer(table: &DataTable) -> Result<StWriter> {
    let mut w = StWriter::new();
    let mut layout: Vec<(String, String)> = Vec::new();
    for (name, column) in table.columns() {
        match column {
            Column::Int(v) => w.add_i64(name, v, &[v.len()]),
            Column::Float(v) => w.add_f64(name, v, &[v.len()]),
            Column::Series(a) => w.add_f32_nd(name, a),
            Column::Text(v) => w.set_metadata_json(&format!("text:{name}"), v)?,
        }
        layout.push((name.to_string(), column.kind().to_string()));
    }
    w.set_metadata_json("columns", &layout)?;
    w.set_metadata("n_rows", table.len().to_string());
    Ok(w)
}

pub fn write_table(table: &DataTable, path: &Path) -> Result<()> {
    table_to_writer(table)?.write(path)
}

pub fn table_from_reader(r: &StReader) -> Result<DataTable> {
    let layout: Vec<(String, String)> = r.metadata_json("columns")?;
    let n_rows: usize = r
        .metadata("n_rows")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("missing row count"))?;
    let mut table = DataTable::new();
    for (name, kind) in layout {
        let column = match kind.as_str() {
            "int" => Column::Int(r.i64(&name)?),
            "float" => Column::Float(r.f64(&name)?),
            "series" => Column::Series(r.f32(&name)?),
            "text" => Column::Text(r.metadata_json(&format!("text:{name}"))?),
            other => return Err(malformed(format!("column {name}: unknown kind {other}"))),
        };
        table.insert(&name, column)?;
    }
    if table.len() != n_rows {
        return Err(malformed(format!("expected {n_rows} rows, found {}", table.len())));
    }
    Ok(table)
}

pub fn read_table(path: &Path) -> Result<DataTable> {
    table_from_reader(&StReader::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn header_is_padded_to_eight_bytes() {
        let mut w = StWriter::new();
        w.add_f32("x", &[1.0, 2.0, 3.0], &[3]);
        let bytes = w.to_bytes().unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);
        assert_eq!(bytes.len(), 8 + n + 12);
    }

    #[test]
    fn reader_checks_dtype() {
        let mut w = StWriter::new();
        w.add_f64("x", &[1.0], &[1]);
        let r = StReader::from_bytes(w.to_bytes().unwrap()).unwrap();
        assert!(r.f32("x").is_err());
        assert_eq!(r.f64("x").unwrap(), vec![1.0]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut w = StWriter::new();
        w.add_f32("x", &[1.0; 16], &[16]);
        let mut bytes = w.to_bytes().unwrap();
        bytes.truncate(bytes.len() - 4);
        let r = StReader::from_bytes(bytes).unwrap();
        assert!(r.f32("x").is_err());
    }

    /// A file whose single tensor entry carries the given JSON fields.
    fn with_entry(entry: Value) -> StReader {
        let header = serde_json::to_vec(&json!({ "x": entry })).unwrap();
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&[0u8; 16]);
        StReader::from_bytes(bytes).unwrap()
    }

    #[test]
    fn overflowing_header_values_are_malformed() {
        let huge = u64::MAX;
        let r = with_entry(json!({ "dtype": "F32", "shape": [4], "data_offsets": [huge - 1, huge] }));
        assert!(matches!(r.f32("x"), Err(PipelineError::Format(_))));
        let r = with_entry(json!({ "dtype": "F64", "shape": [huge, huge], "data_offsets": [0, 16] }));
        assert!(matches!(r.f64("x"), Err(PipelineError::Format(_))));
    }

    #[test]
    fn table_keeps_column_order_and_shapes() {
        let mut t = DataTable::new();
        t.insert("z", Column::Float(vec![0.1, f64::NAN])).unwrap();
        t.insert("a", Column::Text(vec!["left".into(), String::new()])).unwrap();
        let s = Array3::from_shape_fn((2, 4, 3), |(i, c, k)| (i * 100 + c * 10 + k) as f32);
        t.insert("eog", Column::Series(s.into_dyn())).unwrap();
        t.insert("n", Column::Int(vec![-1, 7])).unwrap();

        let bytes = table_to_writer(&t).unwrap().to_bytes().unwrap();
        let back = table_from_reader(&StReader::from_bytes(bytes).unwrap()).unwrap();

        let names: Vec<&str> = back.column_names().collect();
        assert_eq!(names, ["z", "a", "eog", "n"]);
        assert_eq!(back.texts("a").unwrap()[1], "");
        assert_eq!(back.series("eog").unwrap(), t.series("eog").unwrap());
        assert!(back.floats("z").unwrap()[1].is_nan());
    }
}
