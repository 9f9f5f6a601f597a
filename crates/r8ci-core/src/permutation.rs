//! Midpoint-first visitation order over a commit range.
//!
//! Visiting the middle first, then the middles of both halves, gives a
//! bisection-friendly picture of a range after only a few runs.

/// Returns every index in `start..=end` exactly once, midpoint first.
///
/// Returns an empty order when `start > end`.
pub fn permutate_range(start: usize, end: usize) -> Vec<usize> {
    if start > end {
        return Vec::new();
    }
    let span = end - start;
    if span == 0 {
        return vec![start];
    }
    if span == 1 {
        return vec![start, end];
    }

    let half = end - span / 2;
    let lower = permutate_range(start, half - 1);
    let upper = permutate_range(half + 1, end);

    let mut result = Vec::with_capacity(span + 1);
    result.push(half);
    let mut lower = lower.into_iter();
    let mut upper = upper.into_iter();
    loop {
        match (lower.next(), upper.next()) {
            (None, None) => break,
            (a, b) => {
                result.extend(a);
                result.extend(b);
            }
        }
    }
    result
}

/// Visitation order over a list of `len` elements.
pub fn permutation_order(len: usize) -> Vec<usize> {
    match len {
        0 => Vec::new(),
        n => permutate_range(0, n - 1),
    }
}
