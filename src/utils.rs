//! Shared utility functions and traits

use std::time::Duration;

/// Extension trait for tracking running extremes in `Option<T>`.
///
/// # Example
///
/// ```
/// use keystroke_harness::utils::MinMaxExt;
/// use std::time::Duration;
///
/// let mut fastest: Option<Duration> = None;
/// let mut slowest: Option<Duration> = None;
///
/// for ms in [12, 4, 30] {
///     fastest.update_min(Duration::from_millis(ms));
///     slowest.update_max(Duration::from_millis(ms));
/// }
/// assert_eq!(fastest, Some(Duration::from_millis(4)));
/// assert_eq!(slowest, Some(Duration::from_millis(30)));
/// ```
pub trait MinMaxExt<T: Ord + Copy> {
    /// Store `value` if it is below the current minimum or none is set
    fn update_min(&mut self, value: T);

    /// Store `value` if it is above the current maximum or none is set
    fn update_max(&mut self, value: T);
}

impl<T: Ord + Copy> MinMaxExt<T> for Option<T> {
    fn update_min(&mut self, value: T) {
        *self = Some(self.map_or(value, |m| m.min(value)));
    }

    fn update_max(&mut self, value: T) {
        *self = Some(self.map_or(value, |m| m.max(value)));
    }
}

/// Format a duration as `H:MM:SS`
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Duration in fractional milliseconds
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
