use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

pub const COL_CUSTOMER_ID: &str = "customer_id";
pub const COL_ORDER_ID: &str = "order_id";
pub const COL_PURCHASE_TIMESTAMP: &str = "order_purchase_timestamp";
pub const COL_PAYMENT_VALUE: &str = "payment_value";

#[derive(Debug, Deserialize)]
pub struct RawOrderRow {
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub order_purchase_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPaymentRow {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    pub payment_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub customer_id: String,
    pub order_id: String,
    pub purchased_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub customer_id: String,
    pub payment_value: f64,
}

/// Both input tables, parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub orders: Vec<Order>,
    pub payments: Vec<Payment>,
}

/// One scored customer.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CustomerRfm {
    #[serde(rename = "customer_id")]
    #[tabled(rename = "customer_id")]
    pub customer_id: String,
    #[serde(rename = "Recency")]
    #[tabled(rename = "Recency")]
    pub recency: i64,
    #[serde(rename = "Frequency")]
    #[tabled(rename = "Frequency")]
    pub frequency: usize,
    #[serde(rename = "Monetary")]
    #[tabled(rename = "Monetary", display_with = "display_money")]
    pub monetary: f64,
    #[serde(rename = "R_Score")]
    #[tabled(rename = "R_Score")]
    pub r_score: u8,
    #[serde(rename = "F_Score")]
    #[tabled(rename = "F_Score")]
    pub f_score: u8,
    #[serde(rename = "M_Score")]
    #[tabled(rename = "M_Score")]
    pub m_score: u8,
    #[serde(rename = "RFM_Score")]
    #[tabled(rename = "RFM_Score")]
    pub rfm_score: u8,
    #[serde(rename = "Segment")]
    #[tabled(rename = "Segment")]
    pub segment: String,
}

fn display_money(v: &f64) -> String {
    crate::util::format_number(*v, 2)
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SegmentCountRow {
    #[serde(rename = "Segment")]
    #[tabled(rename = "Segment")]
    pub segment: String,
    #[serde(rename = "Customers")]
    #[tabled(rename = "Customers")]
    pub customers: usize,
}

/// `describe()`-style statistics for one numeric column.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ColumnStats {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

/// Machine-readable companion to the rendered report.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub max_date: String,
    pub selected_segments: Vec<String>,
    pub total_customers: usize,
    pub filtered_customers: usize,
    pub statistics: Vec<ColumnStats>,
    pub segment_counts: Vec<SegmentCountRow>,
}
