//! Pure domain services.

pub mod ordering;
pub mod precision;
pub mod stats;

pub use ordering::{dedupe_by_key, merge_newest_first, sort_newest_first, Timeline};
pub use precision::{PrecisionCheck, PrecisionError, PrecisionPolicy};
pub use stats::alert_stats;
