//! Per-channel summary statistics of a raster.
//!
//! Order statistics use in-place Floyd–Rivest selection, so computing them
//! reorders the input.

use std::cmp::Ordering;

use serde::Serialize;

use crate::dtype::PixelBuffer;

/// Fraction of positive samples below the lower and above the upper
/// contrast limit.
pub const CONTRAST_CUTOFF: f64 = 0.0005;

/// Ranges above this size are narrowed with a sample first.
const SAMPLE_THRESHOLD: isize = 600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f64,
    /// Population standard deviation
    pub sd: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// `[min, max]`
    pub domain: [f64; 2],
    /// Values at the 0.05th and 99.95th percentile of the positive samples,
    /// 0 when there are none
    pub contrast_limits: [f64; 2],
}

/// Statistics of `values`, `None` when empty.
pub fn compute_stats<T>(values: &mut [T]) -> Option<ChannelStats>
where
    T: Copy + PartialOrd + Into<f64>,
{
    let n = values.len();
    if n == 0 {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values.iter() {
        let v: f64 = v.into();
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let mean = sum / n as f64;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v.into() - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    let mid = n / 2;
    let last = n - 1;
    select(values, mid, 0, last);
    let median = values[mid].into();
    let q1_at = n / 4;
    select(values, q1_at, 0, mid);
    let q1 = values[q1_at].into();
    let q3_at = 3 * (n / 4);
    select(values, q3_at, mid, last);
    let q3 = values[q3_at].into();

    Some(ChannelStats {
        mean,
        sd: variance.sqrt(),
        q1,
        median,
        q3,
        domain: [min, max],
        contrast_limits: contrast_limits(values),
    })
}

/// [`compute_stats`] over any typed buffer.
pub fn buffer_stats(buffer: &mut PixelBuffer) -> Option<ChannelStats> {
    match buffer {
        PixelBuffer::Uint8(v) => compute_stats(v),
        PixelBuffer::Uint16(v) => compute_stats(v),
        PixelBuffer::Uint32(v) => compute_stats(v),
        PixelBuffer::Int8(v) => compute_stats(v),
        PixelBuffer::Int16(v) => compute_stats(v),
        PixelBuffer::Int32(v) => compute_stats(v),
        PixelBuffer::Float32(v) => compute_stats(v),
        PixelBuffer::Float64(v) => compute_stats(v),
    }
}

fn contrast_limits<T>(values: &[T]) -> [f64; 2]
where
    T: Copy + PartialOrd + Into<f64>,
{
    let mut positive: Vec<T> = values.iter().copied().filter(|&v| v.into() > 0.0).collect();
    if positive.is_empty() {
        return [0.0, 0.0];
    }
    let len = positive.len() as f64;
    let last = positive.len() - 1;
    let top = ((len * (1.0 - CONTRAST_CUTOFF)).floor() as usize).min(last);
    select(&mut positive, top, 0, last);
    let bottom = ((len * CONTRAST_CUTOFF).floor() as usize).min(top);
    select(&mut positive, bottom, 0, top);

    [
        positive.get(bottom).map(|&v| v.into()).unwrap_or(0.0),
        positive.get(top).map(|&v| v.into()).unwrap_or(0.0),
    ]
}

/// Incomparable pairs (NaN) count as equal.
fn compare<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Reorder `values[left..=right]` so that `values[k]` holds the element of
/// rank `k` within that range, smaller elements before it and larger after.
pub fn select<T: Copy + PartialOrd>(values: &mut [T], k: usize, left: usize, right: usize) {
    if values.is_empty() || k < left || k > right || right >= values.len() {
        return;
    }
    select_range(values, k as isize, left as isize, right as isize);
}

fn select_range<T: Copy + PartialOrd>(values: &mut [T], k: isize, mut left: isize, mut right: isize) {
    while right > left {
        if right - left > SAMPLE_THRESHOLD {
            let n = (right - left + 1) as f64;
            let m = (k - left + 1) as f64;
            let z = n.ln();
            let s = 0.5 * (2.0 * z / 3.0).exp();
            let sign = if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 };
            let sd = 0.5 * (z * s * (n - s) / n).sqrt() * sign;
            let new_left = left.max((k as f64 - m * s / n + sd).floor() as isize);
            let new_right = right.min((k as f64 + (n - m) * s / n + sd).floor() as isize);
            select_range(values, k, new_left, new_right);
        }

        let pivot = values[k as usize];
        let mut i = left;
        let mut j = right;
        values.swap(left as usize, k as usize);
        if compare(&values[right as usize], &pivot) == Ordering::Greater {
            values.swap(left as usize, right as usize);
        }
        while i < j {
            values.swap(i as usize, j as usize);
            i += 1;
            j -= 1;
            while compare(&values[i as usize], &pivot) == Ordering::Less {
                i += 1;
            }
            while compare(&values[j as usize], &pivot) == Ordering::Greater {
                j -= 1;
            }
        }

        if compare(&values[left as usize], &pivot) == Ordering::Equal {
            values.swap(left as usize, j as usize);
        } else {
            j += 1;
            values.swap(j as usize, right as usize);
        }
        if j <= k {
            left = j + 1;
        }
        if k <= j {
            right = j - 1;
        }
    }
}
