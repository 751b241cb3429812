mod delta;
mod summary;
mod trend;

pub use delta::{CategoryCoverage, CoverageReport, UNCATEGORIZED, category_of, compare, compare_inventories, percentage};
pub use summary::{BatchSummary, CategorySummary};
pub use trend::{CategoryTrend, CoverageTrend};
