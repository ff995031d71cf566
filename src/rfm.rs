//! Recency / Frequency / Monetary aggregation and quartile scoring.
//!
//! One row is produced per customer that has both orders and payments.
//! Customers seen on only one side are listed in the [`JoinReport`] instead
//! of disappearing silently. Rows are ordered by `customer_id`, which is also
//! the "first-seen" order used to break ties when ranking.

use crate::config::{AppConfig, BinningPolicy};
use crate::error::{Result, RfmError};
use crate::segment::SegmentTable;
use crate::types::{CustomerRfm, Dataset};
use crate::util::{days_between, quantile_sorted, sort_floats};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

const QUARTILES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Recency,
    Frequency,
    Monetary,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Recency => "Recency",
            Metric::Frequency => "Frequency",
            Metric::Monetary => "Monetary",
        };
        f.write_str(name)
    }
}

/// Customers dropped because one side of the join had no rows for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinReport {
    pub orders_without_payments: Vec<String>,
    pub payments_without_orders: Vec<String>,
}

impl JoinReport {
    pub fn dropped(&self) -> usize {
        self.orders_without_payments.len() + self.payments_without_orders.len()
    }

    pub fn is_complete(&self) -> bool {
        self.dropped() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RfmTable {
    pub rows: Vec<CustomerRfm>,
    pub max_date: NaiveDateTime,
    pub join: JoinReport,
    /// Metrics that were scored on their rank because their raw quartile
    /// edges collapsed.
    pub rank_fallbacks: Vec<Metric>,
}

impl RfmTable {
    /// Distinct segment labels in order of first appearance.
    pub fn segments_present(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.segment.as_str()))
            .map(|r| r.segment.clone())
            .collect()
    }
}

struct OrderAgg<'a> {
    last_purchase: NaiveDateTime,
    orders: HashSet<&'a str>,
}

pub fn compute_rfm(dataset: &Dataset, config: &AppConfig) -> Result<RfmTable> {
    let segments = config.segment_table()?;
    compute_rfm_with(dataset, &segments, config.scoring.binning_policy)
}

pub fn compute_rfm_with(
    dataset: &Dataset,
    segments: &SegmentTable,
    policy: BinningPolicy,
) -> Result<RfmTable> {
    let max_date = dataset
        .orders
        .iter()
        .map(|o| o.purchased_at)
        .max()
        .ok_or_else(|| RfmError::EmptyInput("orders table has no rows".to_string()))?;

    let mut order_side: BTreeMap<&str, OrderAgg> = BTreeMap::new();
    for o in &dataset.orders {
        let e = order_side
            .entry(o.customer_id.as_str())
            .or_insert_with(|| OrderAgg {
                last_purchase: o.purchased_at,
                orders: HashSet::new(),
            });
        e.last_purchase = e.last_purchase.max(o.purchased_at);
        e.orders.insert(o.order_id.as_str());
    }

    let mut monetary: BTreeMap<&str, f64> = BTreeMap::new();
    for p in &dataset.payments {
        *monetary.entry(p.customer_id.as_str()).or_insert(0.0) += p.payment_value;
    }

    // Outer join, then keep only customers present on both sides.
    let all_ids: BTreeSet<&str> = order_side
        .keys()
        .chain(monetary.keys())
        .copied()
        .collect();
    let mut join = JoinReport::default();
    let mut joined: Vec<(&str, i64, usize, f64)> = Vec::new();
    for id in all_ids {
        match (order_side.get(id), monetary.get(id)) {
            (Some(agg), Some(total)) => joined.push((
                id,
                days_between(agg.last_purchase, max_date),
                agg.orders.len(),
                *total,
            )),
            (Some(_), None) => join.orders_without_payments.push(id.to_string()),
            (None, Some(_)) => join.payments_without_orders.push(id.to_string()),
            (None, None) => {}
        }
    }
    if !join.is_complete() {
        warn!(
            orders_only = join.orders_without_payments.len(),
            payments_only = join.payments_without_orders.len(),
            "Dropped customers missing from one side of the orders/payments join"
        );
    }
    if joined.is_empty() {
        return Err(RfmError::EmptyInput(
            "no customer has both orders and payments".to_string(),
        ));
    }

    let recency: Vec<f64> = joined.iter().map(|r| r.1 as f64).collect();
    let frequency_rank = first_seen_rank(&joined.iter().map(|r| r.2 as f64).collect::<Vec<_>>());
    let money: Vec<f64> = joined.iter().map(|r| r.3).collect();

    let mut rank_fallbacks = Vec::new();
    let r_bins = quartile_bins(&recency, Metric::Recency, policy, &mut rank_fallbacks)?;
    let f_bins = quartile_bins(&frequency_rank, Metric::Frequency, policy, &mut rank_fallbacks)?;
    let m_bins = quartile_bins(&money, Metric::Monetary, policy, &mut rank_fallbacks)?;

    let rows: Vec<CustomerRfm> = joined
        .iter()
        .enumerate()
        .map(|(i, (id, recency, frequency, monetary))| {
            // Lower recency is better, so the first bin scores highest.
            let r_score = (QUARTILES - r_bins[i]) as u8;
            let f_score = (f_bins[i] + 1) as u8;
            let m_score = (m_bins[i] + 1) as u8;
            let rfm_score = r_score + f_score + m_score;
            CustomerRfm {
                customer_id: id.to_string(),
                recency: *recency,
                frequency: *frequency,
                monetary: *monetary,
                r_score,
                f_score,
                m_score,
                rfm_score,
                segment: segments.label_for(rfm_score).to_string(),
            }
        })
        .collect();

    info!(
        customers = rows.len(),
        max_date = %max_date,
        "Computed RFM table"
    );
    Ok(RfmTable {
        rows,
        max_date,
        join,
        rank_fallbacks,
    })
}

/// 1-based rank of each value, ties broken by position.
pub fn first_seen_rank(values: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    // `sort_by` is stable, so equal values keep their original order.
    idx.sort_by(|a, b| {
        values[*a]
            .partial_cmp(&values[*b])
            .unwrap_or(Ordering::Equal)
    });
    let mut ranks = vec![0.0; values.len()];
    for (pos, i) in idx.into_iter().enumerate() {
        ranks[i] = (pos + 1) as f64;
    }
    ranks
}

/// Quantile edges at 0, 1/4, 1/2, 3/4 and 1.
pub fn quartile_edges(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    (0..=QUARTILES)
        .filter_map(|k| quantile_sorted(&sorted, k as f64 / QUARTILES as f64))
        .collect()
}

fn strictly_increasing(edges: &[f64]) -> bool {
    edges.len() == QUARTILES + 1 && edges.windows(2).all(|w| w[0] < w[1])
}

/// Zero-based bin for `x`. Bins are right-closed; the first also takes the
/// minimum.
fn assign_bin(x: f64, edges: &[f64]) -> usize {
    edges[1..QUARTILES]
        .partition_point(|e| *e < x)
        .min(QUARTILES - 1)
}

/// Zero-based quartile bin for every value.
pub fn quartile_bins(
    values: &[f64],
    metric: Metric,
    policy: BinningPolicy,
    fallbacks: &mut Vec<Metric>,
) -> Result<Vec<usize>> {
    let edges = quartile_edges(values);
    if strictly_increasing(&edges) {
        debug!(%metric, ?edges, "Quartile edges");
        return Ok(values.iter().map(|x| assign_bin(*x, &edges)).collect());
    }

    match policy {
        BinningPolicy::Strict => Err(RfmError::DegenerateBins {
            metric: metric.to_string(),
            edges,
        }),
        BinningPolicy::RankFallback => {
            let ranks = first_seen_rank(values);
            let rank_edges = quartile_edges(&ranks);
            if !fallbacks.contains(&metric) {
                fallbacks.push(metric);
            }
            if strictly_increasing(&rank_edges) {
                warn!(
                    %metric,
                    ?edges,
                    "Quartile edges collapse on tied values, scoring on first-seen rank"
                );
                Ok(ranks.iter().map(|x| assign_bin(*x, &rank_edges)).collect())
            } else {
                warn!(%metric, "Single-customer population, every row goes to the first bin");
                Ok(vec![0; values.len()])
            }
        }
    }
}
