use crate::error::{Result, RfmError};
use crate::rfm::RfmTable;
use crate::types::{ColumnStats, CustomerRfm, ReportSummary, SegmentCountRow};
use crate::util::{average, quantile_sorted, sample_std, sort_floats};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use tracing::debug;

/// Numeric columns summarised by `describe`, in display order.
pub const NUMERIC_COLUMNS: [&str; 7] = [
    "Recency",
    "Frequency",
    "Monetary",
    "R_Score",
    "F_Score",
    "M_Score",
    "RFM_Score",
];

fn numeric_value(row: &CustomerRfm, column: &str) -> f64 {
    match column {
        "Recency" => row.recency as f64,
        "Frequency" => row.frequency as f64,
        "Monetary" => row.monetary,
        "R_Score" => row.r_score as f64,
        "F_Score" => row.f_score as f64,
        "M_Score" => row.m_score as f64,
        _ => row.rfm_score as f64,
    }
}

pub fn filter_by_segments(rows: &[CustomerRfm], selected: &[String]) -> Vec<CustomerRfm> {
    let wanted: HashSet<&str> = selected.iter().map(String::as_str).collect();
    rows.iter()
        .filter(|r| wanted.contains(r.segment.as_str()))
        .cloned()
        .collect()
}

pub fn column_stats(column: &str, values: &[f64]) -> ColumnStats {
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    let q = |p: f64| quantile_sorted(&sorted, p).unwrap_or(f64::NAN);
    ColumnStats {
        column: column.to_string(),
        count: values.len(),
        mean: if values.is_empty() {
            f64::NAN
        } else {
            average(values)
        },
        std: sample_std(values),
        min: q(0.0),
        q25: q(0.25),
        q50: q(0.5),
        q75: q(0.75),
        max: q(1.0),
    }
}

/// Count, mean, std, min, quartiles and max for every numeric column.
pub fn describe(rows: &[CustomerRfm]) -> Vec<ColumnStats> {
    NUMERIC_COLUMNS
        .iter()
        .map(|col| {
            let values: Vec<f64> = rows.iter().map(|r| numeric_value(r, col)).collect();
            column_stats(col, &values)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub metric: String,
    /// `counts.len() + 1` bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Kernel density at each bin center, scaled to counts. `None` when the
    /// sample has fewer than two values or no spread.
    pub density: Option<Vec<f64>>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

pub fn histogram(metric: &str, values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    if values.is_empty() {
        return Histogram {
            metric: metric.to_string(),
            edges: Vec::new(),
            counts: Vec::new(),
            density: None,
        };
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0usize; bins];
    for x in values {
        // The last bin is closed on the right.
        let idx = (((x - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let centers: Vec<f64> = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let density = gaussian_kde(values, &centers).map(|d| {
        let scale = values.len() as f64 * width;
        d.into_iter().map(|v| v * scale).collect()
    });

    Histogram {
        metric: metric.to_string(),
        edges,
        counts,
        density,
    }
}

/// Gaussian kernel density estimate with Scott's rule bandwidth.
pub fn gaussian_kde(values: &[f64], points: &[f64]) -> Option<Vec<f64>> {
    let n = values.len();
    let std = sample_std(values)?;
    if std <= 0.0 {
        return None;
    }
    let h = (n as f64).powf(-0.2) * std;
    let norm = 1.0 / (n as f64 * h * (2.0 * PI).sqrt());
    Some(
        points
            .iter()
            .map(|p| {
                let s: f64 = values
                    .iter()
                    .map(|x| {
                        let z = (p - x) / h;
                        (-0.5 * z * z).exp()
                    })
                    .sum();
                s * norm
            })
            .collect(),
    )
}

/// Rows per segment, largest first.
pub fn segment_counts(rows: &[CustomerRfm]) -> Vec<SegmentCountRow> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in rows {
        *counts.entry(r.segment.as_str()).or_default() += 1;
    }
    let mut out: Vec<SegmentCountRow> = counts
        .into_iter()
        .map(|(segment, customers)| SegmentCountRow {
            segment: segment.to_string(),
            customers,
        })
        .collect();
    out.sort_by(|a, b| {
        b.customers
            .cmp(&a.customers)
            .then_with(|| a.segment.cmp(&b.segment))
    });
    out
}

/// Parse a menu selection such as `1,3` against the listed labels.
///
/// Empty input or `all` selects every label.
pub fn parse_selection(input: &str, available: &[String]) -> Result<Vec<String>> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("all") {
        return Ok(available.to_vec());
    }
    let mut picked: Vec<usize> = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let n: usize = part
            .parse()
            .map_err(|_| RfmError::InvalidSelection(format!("`{}` is not a number", part)))?;
        if n == 0 || n > available.len() {
            return Err(RfmError::InvalidSelection(format!(
                "{} is out of range 1..={}",
                n,
                available.len()
            )));
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    if picked.is_empty() {
        return Err(RfmError::InvalidSelection("no segment chosen".to_string()));
    }
    picked.sort_unstable();
    Ok(picked.into_iter().map(|i| available[i].clone()).collect())
}

pub fn page_count(rows: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    rows.div_ceil(page_size).max(1)
}

/// Rows of the zero-based `page`; empty past the end.
pub fn page<T>(rows: &[T], page: usize, page_size: usize) -> &[T] {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(rows.len());
    let end = (start + page_size).min(rows.len());
    &rows[start..end]
}

/// Everything shown for one filter selection.
#[derive(Debug, Clone)]
pub struct Report {
    pub selected: Vec<String>,
    pub total_customers: usize,
    pub rows: Vec<CustomerRfm>,
    pub statistics: Vec<ColumnStats>,
    pub histograms: Vec<Histogram>,
    pub segment_counts: Vec<SegmentCountRow>,
}

pub fn build_report(table: &RfmTable, selected: &[String], histogram_bins: usize) -> Report {
    let rows = filter_by_segments(&table.rows, selected);
    debug!(
        selected = selected.len(),
        rows = rows.len(),
        "Applied segment filter"
    );
    let statistics = describe(&rows);
    let histograms = ["Recency", "Frequency", "Monetary"]
        .iter()
        .map(|m| {
            let values: Vec<f64> = rows.iter().map(|r| numeric_value(r, m)).collect();
            histogram(m, &values, histogram_bins)
        })
        .collect();
    let segment_counts = segment_counts(&rows);
    Report {
        selected: selected.to_vec(),
        total_customers: table.rows.len(),
        rows,
        statistics,
        histograms,
        segment_counts,
    }
}

pub fn generate_summary(table: &RfmTable, report: &Report) -> ReportSummary {
    ReportSummary {
        max_date: table.max_date.to_string(),
        selected_segments: report.selected.clone(),
        total_customers: report.total_customers,
        filtered_customers: report.rows.len(),
        statistics: report.statistics.clone(),
        segment_counts: report.segment_counts.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, recency: i64, frequency: usize, monetary: f64, segment: &str) -> CustomerRfm {
        CustomerRfm {
            customer_id: id.to_string(),
            recency,
            frequency,
            monetary,
            r_score: 2,
            f_score: 2,
            m_score: 2,
            rfm_score: 6,
            segment: segment.to_string(),
        }
    }

    fn rows() -> Vec<CustomerRfm> {
        vec![
            row("a", 1, 1, 10.0, "Best Customers"),
            row("b", 5, 2, 20.0, "At Risk"),
            row("c", 9, 1, 30.0, "At Risk"),
            row("d", 40, 3, 40.0, "Lost Customers"),
        ]
    }

    #[test]
    fn filter_keeps_selected_segments() {
        let selected = vec!["At Risk".to_string(), "Best Customers".to_string()];
        let filtered = filter_by_segments(&rows(), &selected);
        let ids: Vec<&str> = filtered.iter().map(|r| r.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(filter_by_segments(&rows(), &[]).is_empty());
    }

    #[test]
    fn describe_matches_hand_computed_values() {
        let stats = describe(&rows());
        let monetary = stats.iter().find(|s| s.column == "Monetary").unwrap();
        assert_eq!(monetary.count, 4);
        assert_eq!(monetary.mean, 25.0);
        assert!((monetary.std.unwrap() - 12.909_944).abs() < 1e-6);
        assert_eq!(monetary.min, 10.0);
        assert_eq!(monetary.q25, 17.5);
        assert_eq!(monetary.q50, 25.0);
        assert_eq!(monetary.q75, 32.5);
        assert_eq!(monetary.max, 40.0);
        assert_eq!(stats.len(), NUMERIC_COLUMNS.len());
    }

    #[test]
    fn describe_empty_selection() {
        let stats = describe(&[]);
        assert_eq!(stats[0].count, 0);
        assert!(stats[0].mean.is_nan());
        assert!(stats[0].std.is_none());
    }

    #[test]
    fn histogram_counts_every_value() {
        let values = [1.0, 2.0, 2.0, 3.0, 10.0];
        let h = histogram("Recency", &values, 3);
        assert_eq!(h.edges.len(), 4);
        assert_eq!(h.counts, vec![4, 0, 1]);
        assert_eq!(h.total(), values.len());
        let density = h.density.unwrap();
        assert!(density[0] > density[2]);
    }

    #[test]
    fn histogram_of_constant_values() {
        let h = histogram("Frequency", &[1.0, 1.0, 1.0], 30);
        assert_eq!(h.edges[0], 0.5);
        assert!((h.edges[30] - 1.5).abs() < 1e-9);
        assert_eq!(h.total(), 3);
        assert!(h.density.is_none());
    }

    #[test]
    fn kde_is_symmetric_around_single_cluster() {
        let d = gaussian_kde(&[-1.0, 1.0], &[-0.5, 0.5]).unwrap();
        assert!((d[0] - d[1]).abs() < 1e-12);
        assert!(gaussian_kde(&[3.0], &[3.0]).is_none());
    }

    #[test]
    fn segment_counts_sorted_and_sum() {
        let counts = segment_counts(&rows());
        assert_eq!(counts[0].segment, "At Risk");
        assert_eq!(counts[0].customers, 2);
        assert_eq!(counts[1].segment, "Best Customers");
        let total: usize = counts.iter().map(|c| c.customers).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn selection_parsing() {
        let available: Vec<String> = ["Best Customers", "At Risk", "Lost Customers"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_selection("", &available).unwrap(), available);
        assert_eq!(parse_selection("ALL", &available).unwrap(), available);
        assert_eq!(
            parse_selection(" 3, 1,3 ", &available).unwrap(),
            vec!["Best Customers".to_string(), "Lost Customers".to_string()]
        );
        assert!(parse_selection("4", &available).is_err());
        assert!(parse_selection("0", &available).is_err());
        assert!(parse_selection("x", &available).is_err());
        assert!(parse_selection(",", &available).is_err());
    }

    #[test]
    fn paging() {
        let data: Vec<usize> = (0..45).collect();
        assert_eq!(page_count(data.len(), 20), 3);
        assert_eq!(page_count(0, 20), 1);
        assert_eq!(page(&data, 0, 20).len(), 20);
        assert_eq!(page(&data, 2, 20), &data[40..45]);
        assert!(page(&data, 3, 20).is_empty());
    }
}
