//! Reader for FAISS flat index files.
//!
//! Only the exact (flat) index family is supported, which is what the
//! catalog index is built as. All fields are little-endian.
//!
//! Layout:
//! - fourcc: [u8; 4] ("IxFI" inner product, "IxF2" L2, "IxFl" legacy)
//! - d: i32 (dimensions)
//! - ntotal: i64 (vector count)
//! - dummy: i64, dummy: i64 (unused)
//! - is_trained: u8
//! - metric_type: i32 (0 inner product, 1 L2)
//! - metric_arg: f32 (present only when metric_type > 1)
//! - code_count: u64 (number of f32 values that follow)
//! - codes: [f32; code_count] (row-major, `d * ntotal` values)

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use crate::semantic::index::{IndexError, Metric, VectorIndex};

const FOURCC_FLAT_IP: &[u8; 4] = b"IxFI";
const FOURCC_FLAT_L2: &[u8; 4] = b"IxF2";
const FOURCC_FLAT_LEGACY: &[u8; 4] = b"IxFl";

const METRIC_INNER_PRODUCT: i32 = 0;
const METRIC_L2: i32 = 1;

/// Errors that can occur while reading a FAISS file.
#[derive(Debug, thiserror::Error)]
pub enum FaissError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported index type {0:?}, only flat indexes can be read")]
    UnsupportedIndex(String),

    #[error("Unsupported metric type {0}")]
    UnsupportedMetric(i32),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Reader for a FAISS flat index on disk.
pub struct FaissIndexFile {
    path: PathBuf,
}

impl FaissIndexFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the whole index into memory. The header's vector count is
    /// checked against the file size before anything is allocated.
    pub fn load(&self) -> Result<VectorIndex, FaissError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        read_index(&mut BufReader::new(file), Some(file_len))
    }
}

/// Parse a flat index from any reader.
pub fn read_flat_index<R: Read>(reader: &mut R) -> Result<VectorIndex, FaissError> {
    read_index(reader, None)
}

/// Largest read buffer grown ahead of the data actually arriving.
const READ_CHUNK: usize = 1 << 20;

fn read_index<R: Read>(reader: &mut R, file_len: Option<u64>) -> Result<VectorIndex, FaissError> {
    let header = read_header(reader)?;

    let expected = header
        .dimensions
        .checked_mul(header.entry_count)
        .ok_or_else(|| FaissError::InvalidFormat("vector count overflows".to_string()))?;
    let byte_len = expected
        .checked_mul(4)
        .ok_or_else(|| FaissError::InvalidFormat("vector data size overflows".to_string()))?;

    let code_count = read_u64(reader)?;
    if code_count != expected as u64 {
        return Err(FaissError::InvalidFormat(format!(
            "expected {} values for {} vectors of {} dimensions, found {}",
            expected, header.entry_count, header.dimensions, code_count
        )));
    }

    if let Some(file_len) = file_len {
        if byte_len as u64 > file_len {
            return Err(FaissError::InvalidFormat(format!(
                "header declares {byte_len} bytes of vectors but the file holds {file_len}"
            )));
        }
    }

    // grow with the data so a lying header cannot force a huge allocation
    let mut bytes = Vec::with_capacity(byte_len.min(READ_CHUNK));
    let read = reader.by_ref().take(byte_len as u64).read_to_end(&mut bytes)?;
    if read != byte_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("vector data ends after {read} of {byte_len} bytes"),
        )
        .into());
    }

    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(VectorIndex::from_flat(header.dimensions, header.metric, data)?)
}

/// Parsed header fields.
#[derive(Debug)]
struct Header {
    dimensions: usize,
    entry_count: usize,
    metric: Metric,
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, FaissError> {
    let mut fourcc = [0u8; 4];
    reader.read_exact(&mut fourcc)?;

    let declared_metric = match &fourcc {
        FOURCC_FLAT_IP => Some(Metric::InnerProduct),
        FOURCC_FLAT_L2 => Some(Metric::L2),
        FOURCC_FLAT_LEGACY => None,
        other => {
            return Err(FaissError::UnsupportedIndex(
                String::from_utf8_lossy(other).into_owned(),
            ))
        }
    };

    let dimensions = read_i32(reader)?;
    let entry_count = read_i64(reader)?;
    let _dummy = read_i64(reader)?;
    let _dummy = read_i64(reader)?;
    let _is_trained = read_u8(reader)?;
    let metric_type = read_i32(reader)?;
    if metric_type > 1 {
        let _metric_arg = read_f32(reader)?;
    }

    if dimensions <= 0 {
        return Err(FaissError::InvalidFormat(format!(
            "dimensions must be positive, got {}",
            dimensions
        )));
    }
    if entry_count < 0 {
        return Err(FaissError::InvalidFormat(format!(
            "negative vector count {}",
            entry_count
        )));
    }

    let metric = match metric_type {
        METRIC_INNER_PRODUCT => Metric::InnerProduct,
        METRIC_L2 => Metric::L2,
        other => return Err(FaissError::UnsupportedMetric(other)),
    };
    if declared_metric.is_some_and(|declared| declared != metric) {
        return Err(FaissError::InvalidFormat(format!(
            "fourcc {:?} disagrees with metric type {}",
            String::from_utf8_lossy(&fourcc),
            metric_type
        )));
    }

    let entry_count = usize::try_from(entry_count).map_err(|_| {
        FaissError::InvalidFormat(format!("vector count {entry_count} does not fit in memory"))
    })?;

    Ok(Header {
        dimensions: dimensions as usize,
        entry_count,
        metric,
    })
}

fn read_u8<R: Read>(reader: &mut R) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Serialize vectors the way `faiss.write_index` lays out a flat index.
#[cfg(test)]
pub fn encode_flat_index(fourcc: &[u8; 4], metric_type: i32, rows: &[Vec<f32>]) -> Vec<u8> {
    let dimensions = rows.first().map(|r| r.len()).unwrap_or(1);
    let mut out = Vec::new();
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(dimensions as i32).to_le_bytes());
    out.extend_from_slice(&(rows.len() as i64).to_le_bytes());
    out.extend_from_slice(&(1i64 << 20).to_le_bytes());
    out.extend_from_slice(&(1i64 << 20).to_le_bytes());
    out.push(1);
    out.extend_from_slice(&metric_type.to_le_bytes());
    if metric_type > 1 {
        out.extend_from_slice(&0f32.to_le_bytes());
    }
    out.extend_from_slice(&((dimensions * rows.len()) as u64).to_le_bytes());
    for row in rows {
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn rows() -> Vec<Vec<f32>> {
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]
    }

    #[test]
    fn test_reads_inner_product_index() {
        let bytes = encode_flat_index(FOURCC_FLAT_IP, METRIC_INNER_PRODUCT, &rows());
        let index = read_flat_index(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.dimensions(), 3);
        assert_eq!(index.metric(), Metric::InnerProduct);
        assert_eq!(index.get(1), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn test_reads_l2_index() {
        let bytes = encode_flat_index(FOURCC_FLAT_L2, METRIC_L2, &rows());
        let index = read_flat_index(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(index.metric(), Metric::L2);
    }

    #[test]
    fn test_legacy_fourcc_takes_metric_from_header() {
        let bytes = encode_flat_index(FOURCC_FLAT_LEGACY, METRIC_INNER_PRODUCT, &rows());
        let index = read_flat_index(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(index.metric(), Metric::InnerProduct);
    }

    #[test]
    fn test_rejects_non_flat_index() {
        let bytes = encode_flat_index(b"IwFl", METRIC_L2, &rows());
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::UnsupportedIndex(_))));
    }

    #[test]
    fn test_rejects_unknown_metric() {
        let bytes = encode_flat_index(FOURCC_FLAT_LEGACY, 23, &rows());
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::UnsupportedMetric(23))));
    }

    #[test]
    fn test_rejects_fourcc_metric_disagreement() {
        let bytes = encode_flat_index(FOURCC_FLAT_IP, METRIC_L2, &rows());
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let mut bytes = encode_flat_index(FOURCC_FLAT_IP, METRIC_INNER_PRODUCT, &rows());
        bytes.truncate(bytes.len() - 3);
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::Io(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie_plots_index.faiss");
        let mut file = File::create(&path).unwrap();
        file.write_all(&encode_flat_index(
            FOURCC_FLAT_IP,
            METRIC_INNER_PRODUCT,
            &rows(),
        ))
        .unwrap();

        let index_file = FaissIndexFile::new(path);
        assert_eq!(index_file.load().unwrap().len(), 2);
    }

    /// Header with one dimension and `count` vectors, followed by `data`.
    fn oversized_header(count: i64, data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(FOURCC_FLAT_IP);
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&METRIC_INNER_PRODUCT.to_le_bytes());
        bytes.extend_from_slice(&(count as u64).to_le_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn test_overflowing_vector_count_is_invalid_format() {
        let bytes = oversized_header(1 << 62, &[0u8; 8]);
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::InvalidFormat(_))));
    }

    #[test]
    fn test_huge_vector_count_does_not_preallocate() {
        // 2^40 floats would be 4 TiB; the reader must stop at end of input
        let bytes = oversized_header(1 << 40, &[0u8; 16]);
        let result = read_flat_index(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FaissError::Io(_))));
    }

    #[test]
    fn test_load_rejects_count_larger_than_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie_plots_index.faiss");
        std::fs::write(&path, oversized_header(1 << 40, &[0u8; 16])).unwrap();

        let result = FaissIndexFile::new(path).load();
        assert!(matches!(result, Err(FaissError::InvalidFormat(_))));
    }
}
