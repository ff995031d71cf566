//! RFM (Recency, Frequency, Monetary) customer segmentation.
//!
//! Orders and payments are loaded from CSV, aggregated into one scored row
//! per customer, labelled with a segment and rendered as a filterable
//! terminal report.

pub mod config;
pub mod error;
pub mod loader;
pub mod output;
pub mod reports;
pub mod rfm;
pub mod segment;
pub mod types;
pub mod util;

pub use config::{AppConfig, BinningPolicy};
pub use error::{Result, RfmError};
pub use loader::{load_dataset, DataCache, LoadReport};
pub use reports::{build_report, filter_by_segments, segment_counts, Report};
pub use rfm::{compute_rfm, compute_rfm_with, JoinReport, Metric, RfmTable};
pub use segment::{SegmentRule, SegmentTable};
pub use types::{CustomerRfm, Dataset, Order, Payment};
