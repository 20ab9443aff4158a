/// Rounds `value` up to the next multiple of `unit`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use segalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    (($value) + ($unit) - 1) & !(($unit) - 1)
  };
}

/// Rounds `value` up to the heap's alignment unit (two machine words).
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(24), 32);
/// assert_eq!(align!(48), 48);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::encoding::ALIGNMENT)
  };
}
