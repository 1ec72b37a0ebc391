//! Rate limiters.
//!
//! - [`Throttle`]: leading edge, at most one run per interval, excess calls dropped
//! - [`Debouncer`]: trailing edge, one run after a quiet period, last call wins
//!
//! Both are plain structs owning their timer state, meant to be created
//! once and shared by every caller they limit.

mod clock;
mod debounce;
mod throttle;

pub use clock::{Clock, ManualClock, TokioClock};
pub use debounce::{debounce, DebounceError, Debouncer};
pub use throttle::{throttle, Throttle};
