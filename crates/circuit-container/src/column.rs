// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory column of dataset rows
//!
//! A `Column` is what a window read returns and what an append consumes.
//! Values are stored flat; a row is `width` consecutive values, so vector
//! attributes (orientations, positions packed as one dataset) share the
//! same filtering and appending paths as scalars.

use crate::{ContainerError, DType, Result};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

/// Typed flat values of a column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

/// Evaluate `$body` with `$values` bound to the inner vector, whatever its type
macro_rules! with_values {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Int8($values) => $body,
            ColumnData::Int16($values) => $body,
            ColumnData::Int32($values) => $body,
            ColumnData::Int64($values) => $body,
            ColumnData::UInt8($values) => $body,
            ColumnData::UInt16($values) => $body,
            ColumnData::UInt32($values) => $body,
            ColumnData::UInt64($values) => $body,
            ColumnData::Float32($values) => $body,
            ColumnData::Float64($values) => $body,
            ColumnData::Utf8($values) => $body,
        }
    };
}

/// Like `with_values!`, rewrapping the result in the same variant
macro_rules! map_values {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Int8($values) => ColumnData::Int8($body),
            ColumnData::Int16($values) => ColumnData::Int16($body),
            ColumnData::Int32($values) => ColumnData::Int32($body),
            ColumnData::Int64($values) => ColumnData::Int64($body),
            ColumnData::UInt8($values) => ColumnData::UInt8($body),
            ColumnData::UInt16($values) => ColumnData::UInt16($body),
            ColumnData::UInt32($values) => ColumnData::UInt32($body),
            ColumnData::UInt64($values) => ColumnData::UInt64($body),
            ColumnData::Float32($values) => ColumnData::Float32($body),
            ColumnData::Float64($values) => ColumnData::Float64($body),
            ColumnData::Utf8($values) => ColumnData::Utf8($body),
        }
    };
}

impl ColumnData {
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Int8 => ColumnData::Int8(Vec::new()),
            DType::Int16 => ColumnData::Int16(Vec::new()),
            DType::Int32 => ColumnData::Int32(Vec::new()),
            DType::Int64 => ColumnData::Int64(Vec::new()),
            DType::UInt8 => ColumnData::UInt8(Vec::new()),
            DType::UInt16 => ColumnData::UInt16(Vec::new()),
            DType::UInt32 => ColumnData::UInt32(Vec::new()),
            DType::UInt64 => ColumnData::UInt64(Vec::new()),
            DType::Float32 => ColumnData::Float32(Vec::new()),
            DType::Float64 => ColumnData::Float64(Vec::new()),
            DType::Utf8 => ColumnData::Utf8(Vec::new()),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::Int8(_) => DType::Int8,
            ColumnData::Int16(_) => DType::Int16,
            ColumnData::Int32(_) => DType::Int32,
            ColumnData::Int64(_) => DType::Int64,
            ColumnData::UInt8(_) => DType::UInt8,
            ColumnData::UInt16(_) => DType::UInt16,
            ColumnData::UInt32(_) => DType::UInt32,
            ColumnData::UInt64(_) => DType::UInt64,
            ColumnData::Float32(_) => DType::Float32,
            ColumnData::Float64(_) => DType::Float64,
            ColumnData::Utf8(_) => DType::Utf8,
        }
    }

    /// Number of flat values (not rows)
    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Borrowed view of a single value, used for grouping and predicate matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(&'a str),
}

impl Scalar<'_> {
    /// Total order: numbers compare numerically with each other, strings
    /// lexicographically, and every number sorts before every string.
    pub fn total_cmp(&self, other: &Scalar<'_>) -> Ordering {
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Str(_), _) => Ordering::Greater,
            (_, Scalar::Str(_)) => Ordering::Less,
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::UInt(a), Scalar::UInt(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
            Scalar::Str(_) => f64::NAN,
        }
    }
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Str(v) => f.write_str(v),
        }
    }
}

/// Rows of one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    data: ColumnData,
    width: usize,
}

impl Column {
    /// Build a column, checking that the values split evenly into rows
    pub fn new(data: ColumnData, width: usize) -> Result<Self> {
        if width == 0 || data.len() % width != 0 {
            return Err(ContainerError::WidthMismatch {
                expected: width,
                actual: data.len(),
            });
        }
        Ok(Self { data, width })
    }

    /// One value per row
    pub fn scalar(data: ColumnData) -> Self {
        Self { data, width: 1 }
    }

    pub fn empty(dtype: DType, width: usize) -> Self {
        Self {
            data: ColumnData::empty(dtype),
            width: width.max(1),
        }
    }

    pub fn filled_i64(value: i64, rows: usize) -> Self {
        Self::scalar(ColumnData::Int64(vec![value; rows]))
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn into_data(self) -> ColumnData {
        self.data
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keep the rows whose mask entry is `true`
    pub fn filter(&self, mask: &[bool]) -> Result<Column> {
        if mask.len() != self.rows() {
            return Err(ContainerError::OutOfBounds(format!(
                "mask of length {} applied to {} rows",
                mask.len(),
                self.rows()
            )));
        }
        let width = self.width;
        let data = map_values!(&self.data, values => filter_rows(values, width, mask));
        Ok(Column { data, width })
    }

    /// Gather rows by position, in the given order
    pub fn take(&self, rows: &[usize]) -> Result<Column> {
        let total = self.rows();
        if let Some(&bad) = rows.iter().find(|&&r| r >= total) {
            return Err(ContainerError::OutOfBounds(format!(
                "row {} requested from a column of {} rows",
                bad, total
            )));
        }
        let width = self.width;
        let data = map_values!(&self.data, values => take_rows(values, width, rows));
        Ok(Column { data, width })
    }

    /// Copy of a contiguous row range, clamped to the column length
    pub fn slice_rows(&self, range: Range<usize>) -> Column {
        let end = range.end.min(self.rows());
        let start = range.start.min(end);
        let width = self.width;
        let data = map_values!(&self.data, values => values[start * width..end * width].to_vec());
        Column { data, width }
    }

    /// Append the rows of `other`; types and widths must agree
    pub fn extend(&mut self, other: &Column) -> Result<()> {
        if self.width != other.width {
            return Err(ContainerError::WidthMismatch {
                expected: self.width,
                actual: other.width,
            });
        }
        match (&mut self.data, &other.data) {
            (ColumnData::Int8(a), ColumnData::Int8(b)) => a.extend_from_slice(b),
            (ColumnData::Int16(a), ColumnData::Int16(b)) => a.extend_from_slice(b),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend_from_slice(b),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend_from_slice(b),
            (ColumnData::UInt8(a), ColumnData::UInt8(b)) => a.extend_from_slice(b),
            (ColumnData::UInt16(a), ColumnData::UInt16(b)) => a.extend_from_slice(b),
            (ColumnData::UInt32(a), ColumnData::UInt32(b)) => a.extend_from_slice(b),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend_from_slice(b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.extend_from_slice(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(b),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(ContainerError::DTypeMismatch {
                    context: "extend".to_string(),
                    expected: a.dtype(),
                    actual: b.dtype(),
                })
            }
        }
        Ok(())
    }

    /// Integer values widened to u64; negative values and non-integer types are errors
    pub fn to_u64_vec(&self) -> Result<Vec<u64>> {
        fn signed<T: Copy + Into<i64>>(values: &[T]) -> Result<Vec<u64>> {
            values
                .iter()
                .map(|&v| {
                    let v: i64 = v.into();
                    u64::try_from(v).map_err(|_| ContainerError::NegativeValue(v))
                })
                .collect()
        }
        fn unsigned<T: Copy + Into<u64>>(values: &[T]) -> Vec<u64> {
            values.iter().map(|&v| v.into()).collect()
        }

        match &self.data {
            ColumnData::Int8(v) => signed(v),
            ColumnData::Int16(v) => signed(v),
            ColumnData::Int32(v) => signed(v),
            ColumnData::Int64(v) => signed(v),
            ColumnData::UInt8(v) => Ok(unsigned(v)),
            ColumnData::UInt16(v) => Ok(unsigned(v)),
            ColumnData::UInt32(v) => Ok(unsigned(v)),
            ColumnData::UInt64(v) => Ok(v.clone()),
            other => Err(ContainerError::DTypeMismatch {
                context: "integer conversion".to_string(),
                expected: DType::UInt64,
                actual: other.dtype(),
            }),
        }
    }

    /// Value of a scalar column at `row`; `None` for vector columns or out of range
    pub fn scalar_at(&self, row: usize) -> Option<Scalar<'_>> {
        if self.width != 1 || row >= self.rows() {
            return None;
        }
        Some(match &self.data {
            ColumnData::Int8(v) => Scalar::Int(v[row].into()),
            ColumnData::Int16(v) => Scalar::Int(v[row].into()),
            ColumnData::Int32(v) => Scalar::Int(v[row].into()),
            ColumnData::Int64(v) => Scalar::Int(v[row]),
            ColumnData::UInt8(v) => Scalar::UInt(v[row].into()),
            ColumnData::UInt16(v) => Scalar::UInt(v[row].into()),
            ColumnData::UInt32(v) => Scalar::UInt(v[row].into()),
            ColumnData::UInt64(v) => Scalar::UInt(v[row]),
            ColumnData::Float32(v) => Scalar::Float(v[row].into()),
            ColumnData::Float64(v) => Scalar::Float(v[row]),
            ColumnData::Utf8(v) => Scalar::Str(v[row].as_str()),
        })
    }

    pub(crate) fn utf8_values(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Utf8(values) => Some(values),
            _ => None,
        }
    }

    /// Little-endian bytes of a fixed-size column (empty for `Utf8`)
    pub(crate) fn to_le_bytes(&self) -> Vec<u8> {
        match &self.data {
            ColumnData::Int8(v) => encode(v, i8::to_le_bytes),
            ColumnData::Int16(v) => encode(v, i16::to_le_bytes),
            ColumnData::Int32(v) => encode(v, i32::to_le_bytes),
            ColumnData::Int64(v) => encode(v, i64::to_le_bytes),
            ColumnData::UInt8(v) => v.clone(),
            ColumnData::UInt16(v) => encode(v, u16::to_le_bytes),
            ColumnData::UInt32(v) => encode(v, u32::to_le_bytes),
            ColumnData::UInt64(v) => encode(v, u64::to_le_bytes),
            ColumnData::Float32(v) => encode(v, f32::to_le_bytes),
            ColumnData::Float64(v) => encode(v, f64::to_le_bytes),
            ColumnData::Utf8(_) => Vec::new(),
        }
    }

    /// Decode raw little-endian bytes of a fixed-size dtype
    pub(crate) fn from_le_bytes(dtype: DType, width: usize, bytes: &[u8]) -> Result<Column> {
        let item = dtype.item_size().ok_or_else(|| ContainerError::DTypeMismatch {
            context: "fixed-size decode".to_string(),
            expected: DType::UInt8,
            actual: dtype,
        })?;
        if bytes.len() % item != 0 {
            return Err(ContainerError::Corrupted(format!(
                "{} bytes do not hold whole {} values",
                bytes.len(),
                dtype
            )));
        }
        let data = match dtype {
            DType::Int8 => ColumnData::Int8(decode(bytes, i8::from_le_bytes)),
            DType::Int16 => ColumnData::Int16(decode(bytes, i16::from_le_bytes)),
            DType::Int32 => ColumnData::Int32(decode(bytes, i32::from_le_bytes)),
            DType::Int64 => ColumnData::Int64(decode(bytes, i64::from_le_bytes)),
            DType::UInt8 => ColumnData::UInt8(bytes.to_vec()),
            DType::UInt16 => ColumnData::UInt16(decode(bytes, u16::from_le_bytes)),
            DType::UInt32 => ColumnData::UInt32(decode(bytes, u32::from_le_bytes)),
            DType::UInt64 => ColumnData::UInt64(decode(bytes, u64::from_le_bytes)),
            DType::Float32 => ColumnData::Float32(decode(bytes, f32::from_le_bytes)),
            DType::Float64 => ColumnData::Float64(decode(bytes, f64::from_le_bytes)),
            DType::Utf8 => unreachable!("item_size is None for Utf8"),
        };
        Column::new(data, width)
    }
}

fn filter_rows<T: Clone>(values: &[T], width: usize, mask: &[bool]) -> Vec<T> {
    values
        .chunks(width)
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .flat_map(|(row, _)| row.iter().cloned())
        .collect()
}

fn take_rows<T: Clone>(values: &[T], width: usize, rows: &[usize]) -> Vec<T> {
    rows.iter()
        .flat_map(|&r| values[r * width..(r + 1) * width].iter().cloned())
        .collect()
}

fn encode<T: Copy, const N: usize>(values: &[T], to_bytes: fn(T) -> [u8; N]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * N);
    for &v in values {
        out.extend_from_slice(&to_bytes(v));
    }
    out
}

fn decode<T, const N: usize>(bytes: &[u8], from_bytes: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            from_bytes(raw)
        })
        .collect()
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for Column {
                fn from(values: Vec<$ty>) -> Self {
                    Column::scalar(ColumnData::$variant(values))
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
);

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Column::scalar(ColumnData::Utf8(
            values.into_iter().map(str::to_string).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_scalar_and_vector() {
        let ids = Column::from(vec![10u64, 11, 12, 13]);
        let kept = ids.filter(&[true, false, false, true]).unwrap();
        assert_eq!(kept.to_u64_vec().unwrap(), vec![10, 13]);

        let quats =
            Column::new(ColumnData::Float32(vec![1.0, 0.0, 2.0, 0.5, 3.0, 0.25]), 2).unwrap();
        let kept = quats.filter(&[false, true, true]).unwrap();
        assert_eq!(kept.rows(), 2);
        assert_eq!(kept.data(), &ColumnData::Float32(vec![2.0, 0.5, 3.0, 0.25]));
    }

    #[test]
    fn test_filter_rejects_wrong_mask_length() {
        let ids = Column::from(vec![1u64, 2]);
        assert!(matches!(ids.filter(&[true]), Err(ContainerError::OutOfBounds(_))));
    }

    #[test]
    fn test_take_preserves_requested_order() {
        let names = Column::from(vec!["a", "b", "c"]);
        let taken = names.take(&[2, 0]).unwrap();
        assert_eq!(taken.data(), &ColumnData::Utf8(vec!["c".into(), "a".into()]));
        assert!(names.take(&[3]).is_err());
    }

    #[test]
    fn test_extend_type_checked() {
        let mut a = Column::from(vec![1i32, 2]);
        a.extend(&Column::from(vec![3i32])).unwrap();
        assert_eq!(a.rows(), 3);
        assert!(matches!(
            a.extend(&Column::from(vec![1.0f64])),
            Err(ContainerError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_to_u64_rejects_negative() {
        assert_eq!(Column::from(vec![0i64, 7]).to_u64_vec().unwrap(), vec![0, 7]);
        assert!(matches!(
            Column::from(vec![-1i64]).to_u64_vec(),
            Err(ContainerError::NegativeValue(-1))
        ));
        assert!(Column::from(vec!["x"]).to_u64_vec().is_err());
    }

    #[test]
    fn test_byte_roundtrip_fixed() {
        let col = Column::new(ColumnData::Int16(vec![-3, 4, 5, -6]), 2).unwrap();
        let bytes = col.to_le_bytes();
        let back = Column::from_le_bytes(DType::Int16, 2, &bytes).unwrap();
        assert_eq!(back, col);
    }

    #[test]
    fn test_scalar_ordering() {
        assert_eq!(Scalar::Int(-1).total_cmp(&Scalar::UInt(0)), Ordering::Less);
        assert_eq!(Scalar::Float(2.5).total_cmp(&Scalar::Int(2)), Ordering::Greater);
        assert_eq!(Scalar::Str("a").total_cmp(&Scalar::UInt(99)), Ordering::Greater);
        assert_eq!(Scalar::Str("L2").total_cmp(&Scalar::Str("L6")), Ordering::Less);
    }

    #[test]
    fn test_slice_rows_clamped() {
        let col = Column::from(vec![1u8, 2, 3, 4]);
        assert_eq!(col.slice_rows(1..3).data(), &ColumnData::UInt8(vec![2, 3]));
        assert_eq!(col.slice_rows(3..10).rows(), 1);
        assert!(col.slice_rows(8..10).is_empty());
    }
}
