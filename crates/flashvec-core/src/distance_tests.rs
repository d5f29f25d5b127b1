//! Tests for `distance` module

use super::distance::*;

#[test]
fn test_l2_f32() {
    let a = vec![0.0f32, 0.0, 0.0, 0.0];
    let b = vec![3.0f32, 4.0, 0.0, 0.0];
    let dist = Distance::<f32>::new(Metric::L2);
    assert!((dist.compare(&a, &b) - 25.0).abs() < 1e-6);
}

#[test]
fn test_l2_i8() {
    let a: Vec<i8> = vec![-128, 0, 127];
    let b: Vec<i8> = vec![-128, 3, 123];
    let dist = Distance::<i8>::new(Metric::L2);
    assert!((dist.compare(&a, &b) - 25.0).abs() < 1e-6);
}

#[test]
fn test_l2_u8() {
    let a: Vec<u8> = vec![255, 0, 10];
    let b: Vec<u8> = vec![250, 0, 10];
    let dist = Distance::<u8>::new(Metric::L2);
    assert!((dist.compare(&a, &b) - 25.0).abs() < 1e-6);
}

#[test]
fn test_inner_product_is_negated() {
    let a = vec![1.0f32, 2.0, 3.0];
    let b = vec![4.0f32, 5.0, 6.0];
    let dist = Distance::<f32>::new(Metric::InnerProduct);
    // smaller-is-closer: a larger dot product gives a smaller distance
    assert!((dist.compare(&a, &b) + 32.0).abs() < 1e-6);
}

#[test]
fn test_cosine_f32_identical_unit_vectors() {
    let a = vec![1.0f32, 0.0, 0.0, 0.0];
    let dist = Distance::<f32>::new(Metric::Cosine);
    assert!(dist.compare(&a, &a).abs() < 1e-6);
}

#[test]
fn test_cosine_f32_orthogonal_unit_vectors() {
    let a = vec![1.0f32, 0.0];
    let b = vec![0.0f32, 1.0];
    let dist = Distance::<f32>::new(Metric::Cosine);
    assert!((dist.compare(&a, &b) - 1.0).abs() < 1e-6);
}

#[test]
fn test_cosine_u8() {
    let a: Vec<u8> = vec![2, 0, 0];
    let b: Vec<u8> = vec![7, 0, 0];
    let dist = Distance::<u8>::new(Metric::Cosine);
    assert!(dist.compare(&a, &b).abs() < 1e-6);
}

#[test]
fn test_fast_l2_ranks_like_l2() {
    let q = vec![0.25f32, -1.0, 0.5, 2.0];
    let a = vec![0.0f32, -1.0, 0.5, 2.0];
    let b = vec![3.0f32, 1.0, 0.0, 0.0];

    let plain = Distance::<f32>::new(Metric::L2);
    let fast_a = fast_l2(&a, &q, norm(&a));
    let fast_b = fast_l2(&b, &q, norm(&b));
    assert_eq!(
        plain.compare(&a, &q) < plain.compare(&b, &q),
        fast_a < fast_b
    );
}

#[test]
fn test_metric_serde_round_trip() {
    for metric in [Metric::L2, Metric::InnerProduct, Metric::Cosine] {
        let json = serde_json::to_string(&metric).unwrap();
        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(metric, back);
    }
    assert_eq!(serde_json::to_string(&Metric::L2).unwrap(), "\"l2\"");
}

#[test]
fn test_element_dtype_tags() {
    assert_eq!(<f32 as Element>::ZARR_DTYPE, "<f4");
    assert_eq!(<i8 as Element>::ZARR_DTYPE, "|i1");
    assert_eq!(<u8 as Element>::ZARR_DTYPE, "|u1");
    assert!(<f32 as Element>::IS_FLOAT);
    assert!(!<u8 as Element>::IS_FLOAT);
}
