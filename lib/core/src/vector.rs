use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a vector is unit length
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// A dense image embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn norm(&self) -> f32 {
        crate::simd::norm_simd(&self.data)
    }

    #[inline]
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }

    /// Dot product; equals cosine similarity when both sides are unit length
    #[inline]
    pub fn dot(&self, other: &Vector) -> Result<f32> {
        if self.dim() != other.dim() {
            return Err(Error::InvalidDimension {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        Ok(crate::simd::dot_product_simd(&self.data, &other.data))
    }

    /// Scale to unit length. Fails for an all-zero vector.
    pub fn normalize(&mut self) -> Result<()> {
        let norm = self.norm();
        if norm <= f32::EPSILON {
            return Err(Error::ZeroVector);
        }
        let inv_norm = 1.0 / norm;
        for x in &mut self.data {
            *x *= inv_norm;
        }
        Ok(())
    }

    pub fn normalized(mut self) -> Result<Self> {
        self.normalize()?;
        Ok(self)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Vector::new(data)
    }
}
