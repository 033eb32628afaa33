use std::ops::Range;


/// Splits `range` into `k` contiguous chunks of near-equal width.
///
/// With `n = range.end - range.start` and `s, r = (n / k, n % k)`,
/// the first `r` chunks have width `s + 1` and the remaining `k - r`
/// have width `s`. The result is always an exact partition of `range`.
pub fn partition(range: Range<u64>, k: usize) -> Result<Vec<Range<u64>>, &'static str> {
    if range.end <= range.start {
        return Err("range must not be empty")
    }
    let n = range.end - range.start;
    if k == 0 {
        return Err("chunk count must be positive")
    }
    if k as u64 > n {
        return Err("chunk count exceeds range width")
    }

    let s = n / k as u64;
    let r = (n % k as u64) as usize;

    let mut chunks = Vec::with_capacity(k);
    let mut start = range.start;
    for i in 0..k {
        let width = if i < r { s + 1 } else { s };
        chunks.push(start..start + width);
        start += width;
    }
    debug_assert_eq!(start, range.end);

    Ok(chunks)
}
