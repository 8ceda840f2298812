//! Ordered partitioning for bulk-capable remote operations.

/// Splits `items` into consecutive groups of `size` elements, preserving order.
///
/// The final group holds the remainder. A `size` of zero is treated as one,
/// and empty input yields no groups.
///
/// # Examples
///
/// ```
/// use foodflow_core::batch::chunk;
///
/// let groups = chunk(&[1, 2, 3, 4, 5], 2);
/// assert_eq!(groups, vec![vec![1, 2], vec![3, 4], vec![5]]);
/// ```
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}
