//! Small numeric helpers shared by the checks: percentile bucketing,
//! greatest common divisor and fraction reduction.

/// Euclidean gcd with sign-normalized inputs. `gcd(0, 0)` is 0 by
/// convention.
pub fn gcd(a: i64, b: i64) -> i64 {
    let mut a = a.abs();
    let mut b = b.abs();
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

pub fn pct(part: i64, whole: i64) -> f64 {
    part as f64 / whole as f64 * 100.0
}

/// Reduces `part/whole` by its gcd, also returning the percentage.
pub fn fraction(part: i64, whole: i64) -> (i64, i64, f64) {
    let g = gcd(part, whole);
    if g == 0 {
        return (part, whole, pct(part, whole));
    }
    (part / g, whole / g, pct(part, whole))
}

/// Calculates percentile cut points for a sequence. The returned vector
/// has `buckets + 1` entries: index 0 is the minimum (p0), index
/// `buckets` is the maximum (p100) and interior index `i` is the sorted
/// value at position `floor(i / buckets * len)`. A copy of the input is
/// sorted; the input itself is never mutated.
///
/// With `buckets = 10` index 1 is p10 and index 5 is p50; with
/// `buckets = 100` index 50 is p50, and so on.
///
/// Returns `None` for an empty input or `buckets < 1`.
pub fn percentiles(values: &[i64], buckets: usize) -> Option<Vec<i64>> {
    if values.is_empty() || buckets < 1 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mut result = Vec::with_capacity(buckets + 1);
    for i in 0..buckets {
        result.push(sorted[percentile_idx(i, buckets, sorted.len())]);
    }
    result.push(sorted[sorted.len() - 1]);
    Some(result)
}

/// Same as [`percentiles`], for floats.
pub fn percentiles_f64(values: &[f64], buckets: usize) -> Option<Vec<f64>> {
    if values.is_empty() || buckets < 1 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let mut result = Vec::with_capacity(buckets + 1);
    for i in 0..buckets {
        result.push(sorted[percentile_idx(i, buckets, sorted.len())]);
    }
    result.push(sorted[sorted.len() - 1]);
    Some(result)
}

fn percentile_idx(idx: usize, buckets: usize, len: usize) -> usize {
    (idx as f64 / buckets as f64 * len as f64) as usize
}
