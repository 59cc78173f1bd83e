//! Utility modules for the scouting core
//!
//! Contains shared functionality used across the aggregators:
//! - Versioned: compare-and-swap wrapper for mutable records
//! - ISO week: Monday-start week and month arithmetic

pub mod versioned;
pub mod iso_week;

// Re-export commonly used types
pub use versioned::{compare_and_swap, Versioned, INITIAL_VERSION};
pub use iso_week::{month_bounds, weeks_overlapping_month, IsoWeekPeriod};
