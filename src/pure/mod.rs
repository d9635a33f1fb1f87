// Pure Functions
// Statistics and report rendering: deterministic, no I/O, no clocks.

pub mod render;
pub mod stats;

pub use render::render;
pub use stats::{
    average, maximum, percent_worse, percentile, relative_ratios, summarize_metric,
    summarize_resources,
};
