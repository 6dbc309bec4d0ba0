use serde::{Deserialize, Serialize};

/// A dense feature vector
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
    pub fn zeros(dim: usize) -> Self {
        Self { data: vec![0.0; dim] }
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
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Euclidean norm
    #[inline]
    pub fn norm(&self) -> f32 {
        dot(&self.data, &self.data).sqrt()
    }

    /// Squared L2 distance; infinite when dimensions differ
    #[inline]
    pub fn squared_l2(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return f32::INFINITY;
        }
        squared_l2(&self.data, &other.data)
    }

    /// Normalize the vector to unit length. Zero vectors are left untouched.
    #[inline]
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > f32::EPSILON {
            let inv_norm = 1.0 / norm;
            for x in &mut self.data {
                *x *= inv_norm;
            }
        }
    }

    /// Get normalized copy
    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = self.clone();
        v.normalize();
        v
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

/// Dot product with two accumulators for better pipelining
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;
    let mut i = 0;
    while i + 1 < n {
        sum0 += a[i] * b[i];
        sum1 += a[i + 1] * b[i + 1];
        i += 2;
    }
    if i < n {
        sum0 += a[i] * b[i];
    }
    sum0 + sum1
}

/// Squared euclidean distance over the common prefix of both slices
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;
    let mut i = 0;
    while i + 1 < n {
        let d0 = a[i] - b[i];
        let d1 = a[i + 1] - b[i + 1];
        sum0 += d0 * d0;
        sum1 += d1 * d1;
        i += 2;
    }
    if i < n {
        let d = a[i] - b[i];
        sum0 += d * d;
    }
    sum0 + sum1
}
