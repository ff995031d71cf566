use crate::error::{Result, RfmError};
use crate::types::{
    Dataset, Order, Payment, RawOrderRow, RawPaymentRow, COL_CUSTOMER_ID, COL_ORDER_ID,
    COL_PAYMENT_VALUE, COL_PURCHASE_TIMESTAMP,
};
use crate::util::{non_empty, parse_f64_safe, parse_timestamp_safe};
use csv::{ReaderBuilder, StringRecord};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub order_rows: usize,
    pub payment_rows: usize,
    pub unresolved_payments: usize,
}

fn require_columns(path: &Path, headers: &StringRecord, columns: &[&str]) -> Result<()> {
    for column in columns {
        if !headers.iter().any(|h| h.trim() == *column) {
            return Err(RfmError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn has_column(headers: &StringRecord, column: &str) -> bool {
    headers.iter().any(|h| h.trim() == column)
}

fn trimmed_headers(headers: &StringRecord) -> StringRecord {
    headers.iter().map(str::trim).collect()
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn malformed(path: &Path, line: u64, reason: impl Into<String>) -> RfmError {
    RfmError::Malformed {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Parse the orders table. `path` is only used in error messages.
pub fn parse_orders<R: Read>(reader: R, path: &Path) -> Result<Vec<Order>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = trimmed_headers(rdr.headers()?);
    require_columns(
        path,
        &headers,
        &[COL_CUSTOMER_ID, COL_ORDER_ID, COL_PURCHASE_TIMESTAMP],
    )?;

    let mut orders = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = line_of(&record);
        let row: RawOrderRow = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(path, line, e.to_string()))?;

        let customer_id = non_empty(row.customer_id.as_deref())
            .ok_or_else(|| malformed(path, line, "empty customer_id"))?;
        let order_id = non_empty(row.order_id.as_deref())
            .ok_or_else(|| malformed(path, line, "empty order_id"))?;
        let purchased_at = parse_timestamp_safe(row.order_purchase_timestamp.as_deref())
            .ok_or_else(|| {
                malformed(
                    path,
                    line,
                    format!(
                        "unparseable order_purchase_timestamp {:?}",
                        row.order_purchase_timestamp.unwrap_or_default()
                    ),
                )
            })?;

        orders.push(Order {
            customer_id,
            order_id,
            purchased_at,
        });
    }
    Ok(orders)
}

/// Parse the payments table.
///
/// Rows carry their customer directly, or are resolved through `orders` by
/// `order_id` when the file has no `customer_id` column. Returns the number
/// of rows that could not be resolved alongside the payments.
pub fn parse_payments<R: Read>(
    reader: R,
    path: &Path,
    orders: &[Order],
) -> Result<(Vec<Payment>, usize)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = trimmed_headers(rdr.headers()?);
    require_columns(path, &headers, &[COL_PAYMENT_VALUE])?;

    let by_customer = has_column(&headers, COL_CUSTOMER_ID);
    let order_owner: HashMap<&str, &str> = if by_customer {
        HashMap::new()
    } else if has_column(&headers, COL_ORDER_ID) {
        debug!(
            "{} has no customer_id column; resolving payments through order_id",
            path.display()
        );
        orders
            .iter()
            .map(|o| (o.order_id.as_str(), o.customer_id.as_str()))
            .collect()
    } else {
        return Err(RfmError::MissingColumn {
            path: path.to_path_buf(),
            column: COL_CUSTOMER_ID.to_string(),
        });
    };

    let mut payments = Vec::new();
    let mut unresolved = 0usize;
    for result in rdr.records() {
        let record = result?;
        let line = line_of(&record);
        let row: RawPaymentRow = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(path, line, e.to_string()))?;

        let payment_value = parse_f64_safe(row.payment_value.as_deref()).ok_or_else(|| {
            malformed(
                path,
                line,
                format!(
                    "unparseable payment_value {:?}",
                    row.payment_value.clone().unwrap_or_default()
                ),
            )
        })?;

        let customer_id = if by_customer {
            non_empty(row.customer_id.as_deref())
                .ok_or_else(|| malformed(path, line, "empty customer_id"))?
        } else {
            let order_id = non_empty(row.order_id.as_deref())
                .ok_or_else(|| malformed(path, line, "empty order_id"))?;
            match order_owner.get(order_id.as_str()) {
                Some(c) => c.to_string(),
                None => {
                    unresolved += 1;
                    continue;
                }
            }
        };

        payments.push(Payment {
            customer_id,
            payment_value,
        });
    }
    Ok((payments, unresolved))
}

pub fn load_orders(path: &Path) -> Result<Vec<Order>> {
    let bytes = std::fs::read(path).map_err(|e| RfmError::io(path, e))?;
    parse_orders(bytes.as_slice(), path)
}

/// Load both tables from disk.
pub fn load_dataset(orders_path: &Path, payments_path: &Path) -> Result<(Dataset, LoadReport)> {
    let orders_bytes = std::fs::read(orders_path).map_err(|e| RfmError::io(orders_path, e))?;
    let payments_bytes =
        std::fs::read(payments_path).map_err(|e| RfmError::io(payments_path, e))?;
    parse_dataset(&orders_bytes, orders_path, &payments_bytes, payments_path)
}

fn parse_dataset(
    orders_bytes: &[u8],
    orders_path: &Path,
    payments_bytes: &[u8],
    payments_path: &Path,
) -> Result<(Dataset, LoadReport)> {
    let orders = parse_orders(orders_bytes, orders_path)?;
    let (payments, unresolved_payments) = parse_payments(payments_bytes, payments_path, &orders)?;
    let report = LoadReport {
        order_rows: orders.len(),
        payment_rows: payments.len(),
        unresolved_payments,
    };
    info!(
        orders = report.order_rows,
        payments = report.payment_rows,
        "Loaded {} and {}",
        orders_path.display(),
        payments_path.display()
    );
    if unresolved_payments > 0 {
        warn!(
            "{} payment rows reference orders not present in {}",
            unresolved_payments,
            orders_path.display()
        );
    }
    Ok((Dataset { orders, payments }, report))
}

/// SHA-256 over both paths and both files' contents.
fn fingerprint(
    orders_path: &Path,
    orders_bytes: &[u8],
    payments_path: &Path,
    payments_bytes: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    for (path, bytes) in [(orders_path, orders_bytes), (payments_path, payments_bytes)] {
        let p = path.to_string_lossy();
        hasher.update((p.len() as u64).to_le_bytes());
        hasher.update(p.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

struct CacheEntry {
    key: String,
    orders_path: PathBuf,
    payments_path: PathBuf,
    dataset: Dataset,
    report: LoadReport,
}

/// Load-once cache for the two input tables.
///
/// The cached tables are reused for as long as both files keep the same
/// paths and contents. `invalidate` drops the entry unconditionally.
#[derive(Default)]
pub struct DataCache {
    entry: Option<CacheEntry>,
    misses: usize,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &mut self,
        orders_path: &Path,
        payments_path: &Path,
    ) -> Result<(&Dataset, &LoadReport)> {
        let orders_bytes =
            std::fs::read(orders_path).map_err(|e| RfmError::io(orders_path, e))?;
        let payments_bytes =
            std::fs::read(payments_path).map_err(|e| RfmError::io(payments_path, e))?;
        let key = fingerprint(orders_path, &orders_bytes, payments_path, &payments_bytes);

        let fresh = matches!(&self.entry, Some(e) if e.key == key);
        if fresh {
            debug!("Input cache hit ({})", &key[..12]);
        } else {
            info!("Input cache miss, parsing input files");
            // A failed parse leaves nothing cached.
            self.entry = None;
            let (dataset, report) =
                parse_dataset(&orders_bytes, orders_path, &payments_bytes, payments_path)?;
            self.misses += 1;
            self.entry = Some(CacheEntry {
                key,
                orders_path: orders_path.to_path_buf(),
                payments_path: payments_path.to_path_buf(),
                dataset,
                report,
            });
        }

        match &self.entry {
            Some(e) => Ok((&e.dataset, &e.report)),
            None => Err(RfmError::EmptyInput("input cache is empty".to_string())),
        }
    }

    /// The cached tables, if any, without touching the files.
    pub fn current(&self) -> Option<(&Dataset, &LoadReport)> {
        self.entry.as_ref().map(|e| (&e.dataset, &e.report))
    }

    pub fn cached_paths(&self) -> Option<(&Path, &Path)> {
        self.entry
            .as_ref()
            .map(|e| (e.orders_path.as_path(), e.payments_path.as_path()))
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            info!("Input cache invalidated");
        }
    }

    /// Number of times the files were actually parsed.
    pub fn misses(&self) -> usize {
        self.misses
    }
}
