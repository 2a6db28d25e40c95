//! Paired activation batches used to fit alignment matrices.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::error::VectorError;

/// Row-major `rows x cols` matrix of activations (one sample per row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActivationBatch")]
pub struct ActivationBatch {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// Unchecked wire shape; every deserialised batch goes through [`ActivationBatch::new`].
#[derive(Deserialize)]
struct RawActivationBatch {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl TryFrom<RawActivationBatch> for ActivationBatch {
    type Error = VectorError;

    fn try_from(raw: RawActivationBatch) -> Result<Self, Self::Error> {
        Self::new(raw.rows, raw.cols, raw.data)
    }
}

impl ActivationBatch {
    /// # Errors
    /// - `VectorError::InvalidBatch` if either dimension is 0 or `data.len() != rows * cols`
    /// - `VectorError::NonFinite` if any value is NaN/Inf
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, VectorError> {
        if rows == 0 || cols == 0 {
            return Err(VectorError::InvalidBatch(format!(
                "shape {}x{} has a zero dimension",
                rows, cols
            )));
        }
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            VectorError::InvalidBatch(format!("shape {}x{} overflows", rows, cols))
        })?;
        if data.len() != expected {
            return Err(VectorError::InvalidBatch(format!(
                "expected {} values for {}x{}, got {}",
                expected,
                rows,
                cols,
                data.len()
            )));
        }
        if let Some((index, value)) = data
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(i, v)| (i, *v))
        {
            return Err(VectorError::NonFinite { index, value });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from a slice of equal-length rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, VectorError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(VectorError::InvalidBatch(format!(
                "ragged rows: expected {} columns, found a row with {}",
                cols,
                bad.len()
            )));
        }
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(rows.len(), cols, data)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Borrow sample `i`. Panics if `i >= rows` like slice indexing.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.cols)
    }

    /// xxHash64 over shape and raw bits, used to key cached alignments.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        self.feed(&mut hasher);
        hasher.digest()
    }

    pub(crate) fn feed(&self, hasher: &mut Xxh64) {
        hasher.update(&(self.rows as u64).to_le_bytes());
        hasher.update(&(self.cols as u64).to_le_bytes());
        for v in &self.data {
            hasher.update(&v.to_bits().to_le_bytes());
        }
    }

    /// Combined hash of a (source, target) training pair.
    pub fn pair_hash(source: &ActivationBatch, target: &ActivationBatch) -> u64 {
        let mut hasher = Xxh64::new(0);
        source.feed(&mut hasher);
        target.feed(&mut hasher);
        hasher.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_validation() {
        assert!(ActivationBatch::new(2, 2, vec![1.0; 4]).is_ok());
        assert!(ActivationBatch::new(2, 2, vec![1.0; 3]).is_err());
        assert!(ActivationBatch::new(0, 2, vec![]).is_err());
        assert!(matches!(
            ActivationBatch::new(1, 2, vec![1.0, f32::NAN]),
            Err(VectorError::NonFinite { index: 1, .. })
        ));
        assert!(ActivationBatch::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(matches!(
            ActivationBatch::new(usize::MAX, 3, vec![1.0; 3]),
            Err(VectorError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_deserialisation_revalidates_shape() {
        let ok: ActivationBatch =
            serde_json::from_str(r#"{"rows":1,"cols":2,"data":[1.0,2.0]}"#).unwrap();
        assert_eq!(ok.row(0), &[1.0, 2.0]);
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(serde_json::from_str::<ActivationBatch>(&json).unwrap(), ok);

        for bad in [
            r#"{"rows":2,"cols":2,"data":[1.0,2.0]}"#,
            r#"{"rows":0,"cols":2,"data":[]}"#,
            r#"{"rows":18446744073709551615,"cols":2,"data":[1.0,2.0]}"#,
        ] {
            let err = serde_json::from_str::<ActivationBatch>(bad).unwrap_err();
            println!("AFTER: {}", err);
        }
    }

    #[test]
    fn test_rows_and_hash() {
        let b = ActivationBatch::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(b.row(1), &[3.0, 4.0]);
        assert_eq!(b.iter_rows().count(), 2);

        let same = ActivationBatch::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let reshaped = ActivationBatch::new(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(b.content_hash(), same.content_hash());
        assert_ne!(b.content_hash(), reshaped.content_hash());
        assert_ne!(
            ActivationBatch::pair_hash(&b, &reshaped),
            ActivationBatch::pair_hash(&reshaped, &b)
        );
    }
}
