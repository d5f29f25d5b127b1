//! Distance metrics over typed vector slices.
//!
//! The element type and metric are fixed once at open time; the hot kernels
//! are monomorphized over the element type through [`Element`], and
//! [`Distance`] is the per-(metric, element) dispatcher the engine carries.
//!
//! All kernels follow the smaller-is-closer convention: inner product
//! returns the negated dot product, and cosine over f32 is `1 + ip(a, b)`
//! for L2-normalized operands.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::simd;

/// Distance metric selected at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance.
    L2,
    /// Negated dot product (maximum inner product search).
    InnerProduct,
    /// Cosine distance; assumes L2-normalized base vectors for f32.
    Cosine,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for i8 {}
    impl Sealed for u8 {}
}

/// Vector element type stored in a disk index: f32, i8, or u8.
///
/// Carries the per-type distance kernels so that the f32 path can use the
/// SIMD implementations in [`crate::simd`] while the integer paths stay in
/// widening scalar arithmetic.
pub trait Element: Pod + Send + Sync + Default + 'static + sealed::Sealed {
    /// Chunked-array dtype string for this element type.
    const ZARR_DTYPE: &'static str;
    /// True only for f32.
    const IS_FLOAT: bool;

    /// Widens the element to f32.
    fn to_f32(self) -> f32;

    /// Squared L2 distance.
    fn l2(a: &[Self], b: &[Self]) -> f32;

    /// Negated dot product.
    fn inner_product(a: &[Self], b: &[Self]) -> f32;

    /// Cosine distance.
    fn cosine(a: &[Self], b: &[Self]) -> f32;
}

impl Element for f32 {
    const ZARR_DTYPE: &'static str = "<f4";
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn l2(a: &[Self], b: &[Self]) -> f32 {
        simd::squared_l2(a, b)
    }

    #[inline]
    fn inner_product(a: &[Self], b: &[Self]) -> f32 {
        -simd::dot_product(a, b)
    }

    /// `1 + ip(a, b)`; both operands are expected L2-normalized, which the
    /// engine guarantees by normalizing the query for cosine indices.
    #[inline]
    fn cosine(a: &[Self], b: &[Self]) -> f32 {
        1.0 + Self::inner_product(a, b)
    }
}

macro_rules! int_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const ZARR_DTYPE: &'static str = $dtype;
            const IS_FLOAT: bool = false;

            #[inline]
            fn to_f32(self) -> f32 {
                f32::from(self)
            }

            #[inline]
            fn l2(a: &[Self], b: &[Self]) -> f32 {
                debug_assert_eq!(a.len(), b.len());
                let mut acc: u64 = 0;
                for i in 0..a.len() {
                    let diff = i32::from(a[i]) - i32::from(b[i]);
                    acc += (diff * diff) as u64;
                }
                acc as f32
            }

            #[inline]
            fn inner_product(a: &[Self], b: &[Self]) -> f32 {
                debug_assert_eq!(a.len(), b.len());
                let mut acc: i64 = 0;
                for i in 0..a.len() {
                    acc += i64::from(a[i]) * i64::from(b[i]);
                }
                -(acc as f32)
            }

            #[inline]
            fn cosine(a: &[Self], b: &[Self]) -> f32 {
                debug_assert_eq!(a.len(), b.len());
                let mut dot: i64 = 0;
                let mut norm_a: i64 = 0;
                let mut norm_b: i64 = 0;
                for i in 0..a.len() {
                    let x = i64::from(a[i]);
                    let y = i64::from(b[i]);
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                if norm_a == 0 || norm_b == 0 {
                    return 1.0;
                }
                1.0 - (dot as f32) / ((norm_a as f32).sqrt() * (norm_b as f32).sqrt())
            }
        }
    };
}

int_element!(i8, "|i1");
int_element!(u8, "|u1");

/// Per-(metric, element) distance dispatcher.
///
/// Constructed once at open time and invoked for full-precision reranking
/// and range filtering.
#[derive(Debug, Clone, Copy)]
pub struct Distance<E: Element> {
    metric: Metric,
    _marker: std::marker::PhantomData<E>,
}

impl<E: Element> Distance<E> {
    /// Builds the dispatcher for a metric.
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            _marker: std::marker::PhantomData,
        }
    }

    /// The metric this dispatcher was built for.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Compares two vectors of equal length.
    #[inline]
    #[must_use]
    pub fn compare(&self, a: &[E], b: &[E]) -> f32 {
        match self.metric {
            Metric::L2 => E::l2(a, b),
            Metric::InnerProduct => E::inner_product(a, b),
            Metric::Cosine => E::cosine(a, b),
        }
    }
}

/// Precomputed squared norm for [`fast_l2`].
#[inline]
#[must_use]
pub fn norm(a: &[f32]) -> f32 {
    simd::squared_norm(a)
}

/// L2 comparison with the first operand's squared norm precomputed:
/// `norm_a - 2 * dot(a, b)`.
///
/// Ranks identically to squared L2 for a fixed `b`; the `|b|^2` term is
/// constant per query and dropped.
#[inline]
#[must_use]
pub fn fast_l2(a: &[f32], b: &[f32], norm_a: f32) -> f32 {
    norm_a - 2.0 * simd::dot_product(a, b)
}
