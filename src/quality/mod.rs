//! Quality ranking of video files.
//!
//! [`QualityFilter::compare`] ranks files claiming the same episode over the
//! configured criteria, and [`QualityFilter::should_keep`] is the independent
//! gate a file must pass to be kept at all.

mod filter;
mod policy;
mod resolution;

pub use filter::QualityFilter;
pub use policy::{
    ConfigError, CountRule, FilterOperator, QualityCriterion, QualityPolicy, ResolutionRule,
    SetRule,
};
pub use resolution::Resolution;
