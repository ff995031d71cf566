use crate::error::{Result, RfmError};
use crate::loader::LoadReport;
use crate::reports::{page, page_count, Histogram, Report};
use crate::rfm::RfmTable;
use crate::types::{ColumnStats, SegmentCountRow};
use crate::util::{format_int, format_number};
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

const BAR_WIDTH: usize = 40;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(|e| RfmError::io(path, e))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(|e| RfmError::io(path, e))?;
    Ok(())
}

pub fn render_table<T>(rows: &[T]) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

/// Statistics as a grid: one row per statistic, one column per metric.
pub fn render_statistics(stats: &[ColumnStats]) -> String {
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend(stats.iter().map(|s| s.column.clone()));
    builder.push_record(header);

    let lines: [(&str, fn(&ColumnStats) -> String); 8] = [
        ("count", |s: &ColumnStats| format_int(s.count)),
        ("mean", |s: &ColumnStats| format_number(s.mean, 2)),
        ("std", |s: &ColumnStats| {
            s.std
                .map(|v| format_number(v, 2))
                .unwrap_or_else(|| "-".to_string())
        }),
        ("min", |s: &ColumnStats| format_number(s.min, 2)),
        ("25%", |s: &ColumnStats| format_number(s.q25, 2)),
        ("50%", |s: &ColumnStats| format_number(s.q50, 2)),
        ("75%", |s: &ColumnStats| format_number(s.q75, 2)),
        ("max", |s: &ColumnStats| format_number(s.max, 2)),
    ];
    for (name, cell) in lines {
        let mut record = vec![name.to_string()];
        record.extend(stats.iter().map(cell));
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}

fn scaled(value: f64, max: f64) -> usize {
    if max <= 0.0 || !value.is_finite() {
        return 0;
    }
    ((value / max) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize
}

/// Horizontal text histogram. `*` marks the density curve.
pub fn render_histogram(h: &Histogram) -> String {
    if h.counts.is_empty() {
        return "(no rows)".to_string();
    }
    let max_count = h.counts.iter().copied().max().unwrap_or(0) as f64;
    let max_density = h
        .density
        .as_ref()
        .map(|d| d.iter().copied().fold(0.0, f64::max))
        .unwrap_or(0.0);
    let max = max_count.max(max_density);

    let labels: Vec<String> = h
        .edges
        .windows(2)
        .map(|w| format!("{} - {}", format_number(w[0], 1), format_number(w[1], 1)))
        .collect();
    let label_width = labels.iter().map(|l| l.len()).max().unwrap_or(0);

    let mut out = String::new();
    for (i, (label, count)) in labels.iter().zip(&h.counts).enumerate() {
        let mut bar: Vec<char> = vec![' '; BAR_WIDTH + 1];
        for c in bar.iter_mut().take(scaled(*count as f64, max)) {
            *c = '#';
        }
        if let Some(d) = h.density.as_ref().and_then(|d| d.get(i)) {
            bar[scaled(*d, max)] = '*';
        }
        let bar: String = bar.into_iter().collect();
        out.push_str(&format!(
            "{:>width$} | {} {}\n",
            label,
            bar.trim_end(),
            format_int(*count),
            width = label_width
        ));
    }
    out
}

pub fn render_bar_chart(counts: &[SegmentCountRow]) -> String {
    if counts.is_empty() {
        return "(no rows)".to_string();
    }
    let max = counts.iter().map(|c| c.customers).max().unwrap_or(0) as f64;
    let label_width = counts.iter().map(|c| c.segment.len()).max().unwrap_or(0);
    let mut out = String::new();
    for c in counts {
        out.push_str(&format!(
            "{:<width$} | {} {}\n",
            c.segment,
            "#".repeat(scaled(c.customers as f64, max).max(1)),
            format_int(c.customers),
            width = label_width
        ));
    }
    out
}

pub fn print_load_report(report: &LoadReport) {
    println!(
        "Processing dataset... ({} orders, {} payments loaded)",
        format_int(report.order_rows),
        format_int(report.payment_rows)
    );
    if report.unresolved_payments > 0 {
        println!(
            "Note: {} payment rows skipped, their orders are not in the orders file.",
            format_int(report.unresolved_payments)
        );
    }
    println!();
}

/// Print the whole report: statistics, distributions, segment counts and
/// the first page of customers.
pub fn print_report(table: &RfmTable, report: &Report, page_size: usize) {
    println!("RFM Analysis Report");
    println!(
        "(Reference date {}, {} of {} customers in: {})\n",
        table.max_date,
        format_int(report.rows.len()),
        format_int(report.total_customers),
        report.selected.join(", ")
    );
    if !table.join.is_complete() {
        println!(
            "Warning: {} customers with orders but no payments and {} with payments but no orders were left out.\n",
            format_int(table.join.orders_without_payments.len()),
            format_int(table.join.payments_without_orders.len())
        );
    }
    for metric in &table.rank_fallbacks {
        println!(
            "Note: {} has too many tied values for quartiles; scored on first-seen rank.",
            metric
        );
    }
    if !table.rank_fallbacks.is_empty() {
        println!();
    }

    println!("RFM Summary\n");
    println!("{}\n", render_statistics(&report.statistics));

    for h in &report.histograms {
        println!("Distribution of {}\n", h.metric);
        println!("{}", render_histogram(h));
    }

    println!("Customer Segments\n");
    println!("{}", render_bar_chart(&report.segment_counts));
    println!("{}\n", render_table(&report.segment_counts));

    println!("Customer Data\n");
    print_page(report, 0, page_size);
}

pub fn print_page(report: &Report, page_no: usize, page_size: usize) {
    let pages = page_count(report.rows.len(), page_size);
    let rows = page(&report.rows, page_no, page_size);
    println!("{}\n", render_table(rows));
    println!(
        "(Page {} of {}, {} rows)\n",
        (page_no + 1).min(pages),
        pages,
        format_int(report.rows.len())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{describe, histogram, segment_counts};
    use crate::types::CustomerRfm;

    fn customers() -> Vec<CustomerRfm> {
        (0..3)
            .map(|i| CustomerRfm {
                customer_id: format!("c{i}"),
                recency: i * 10,
                frequency: 1,
                monetary: 1500.0 + i as f64,
                r_score: 1,
                f_score: 1,
                m_score: 1,
                rfm_score: 3,
                segment: "Lost Customers".to_string(),
            })
            .collect()
    }

    #[test]
    fn customer_table_uses_column_names() {
        let text = render_table(&customers());
        assert!(text.contains("RFM_Score"));
        assert!(text.contains("1,501.00"));
        assert_eq!(render_table::<CustomerRfm>(&[]), "(no rows)");
    }

    #[test]
    fn statistics_grid_has_every_statistic() {
        let text = render_statistics(&describe(&customers()));
        for name in ["count", "mean", "std", "min", "25%", "50%", "75%", "max"] {
            assert!(text.contains(name), "missing {name}");
        }
        assert!(text.contains("Monetary"));
    }

    #[test]
    fn histogram_has_one_line_per_bin() {
        let h = histogram("Recency", &[0.0, 10.0, 20.0], 4);
        let text = render_histogram(&h);
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains('*'));
    }

    #[test]
    fn bar_chart_lists_segments() {
        let text = render_bar_chart(&segment_counts(&customers()));
        assert!(text.starts_with("Lost Customers | "));
        assert!(text.trim_end().ends_with('3'));
    }

    #[test]
    fn exports_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("customers.csv");
        write_csv(&csv_path, &customers()).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with(
            "customer_id,Recency,Frequency,Monetary,R_Score,F_Score,M_Score,RFM_Score,Segment"
        ));
        assert_eq!(text.lines().count(), 4);

        let json_path = dir.path().join("counts.json");
        write_json(&json_path, &segment_counts(&customers())).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value[0]["Customers"], 3);
    }
}
