#![forbid(unsafe_code)]

//! Post-processing applied to every resolved value before it is cached.

use std::rc::Rc;

/// Pure transform from a resolved value to the published value.
pub type Processor<T> = Rc<dyn Fn(T) -> T>;

/// Pass values through unchanged.
#[must_use]
pub fn identity<T: 'static>() -> Processor<T> {
    Rc::new(|value| value)
}

/// Clamp values into `[min, max]`.
///
/// Values that compare to neither bound (float NaN) pass through.
///
/// # Panics
///
/// Panics if `min > max`.
#[must_use]
pub fn clamp<T: PartialOrd + Clone + 'static>(min: T, max: T) -> Processor<T> {
    assert!(
        min.partial_cmp(&max) != Some(std::cmp::Ordering::Greater),
        "clamp: min must not exceed max"
    );
    Rc::new(move |value: T| {
        if value < min {
            min.clone()
        } else if value > max {
            max.clone()
        } else {
            value
        }
    })
}
