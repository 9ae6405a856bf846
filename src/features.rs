//! Per-customer Recency, Frequency and MonetaryValue features
//!
//! Each feature is aggregated independently from the same transaction table and
//! then inner-joined onto the distinct customer set. A customer missing from any
//! single aggregation is therefore dropped from the feature table.

use crate::data::{require_columns, CUSTOMER_ID, INVOICE_DATE, QUANTITY, UNIT_PRICE};
use crate::error::RfmError;
use polars::prelude::*;
use tracing::debug;

pub const RECENCY: &str = "Recency";
pub const FREQUENCY: &str = "Frequency";
pub const MONETARY_VALUE: &str = "MonetaryValue";

const SECONDS_PER_DAY: i64 = 86_400;
const LAST_INVOICE: &str = "LastInvoiceDate";
const REVENUE: &str = "Revenue";

/// Compute the feature table from a filtered transaction table
///
/// # Arguments
/// * `transactions` - Table with `CustomerID`, `InvoiceDate`, `UnitPrice` and `Quantity`
///
/// # Returns
/// * One row per customer with `CustomerID`, `Recency`, `Frequency`, `MonetaryValue`
pub fn extract_features(transactions: &DataFrame) -> crate::Result<DataFrame> {
    require_columns(transactions, &[CUSTOMER_ID, INVOICE_DATE, UNIT_PRICE, QUANTITY])?;

    let customers = transactions
        .clone()
        .lazy()
        .select([col(CUSTOMER_ID).unique_stable()]);

    let features = customers
        .inner_join(recency(transactions)?.lazy(), col(CUSTOMER_ID), col(CUSTOMER_ID))
        .inner_join(frequency(transactions)?.lazy(), col(CUSTOMER_ID), col(CUSTOMER_ID))
        .inner_join(monetary_value(transactions)?.lazy(), col(CUSTOMER_ID), col(CUSTOMER_ID))
        .select([col(CUSTOMER_ID), col(RECENCY), col(FREQUENCY), col(MONETARY_VALUE)])
        .collect()?;

    debug!(customers = features.height(), "Extracted RFM features");
    Ok(features)
}

/// Recency = days between the dataset's last invoice and the customer's last invoice, plus one
///
/// `InvoiceDate` may be a `Datetime` of any unit, a `Date`, or integer unix seconds.
pub fn recency(transactions: &DataFrame) -> crate::Result<DataFrame> {
    require_columns(transactions, &[CUSTOMER_ID, INVOICE_DATE])?;

    let seconds = invoice_seconds(transactions.column(INVOICE_DATE)?)?;
    let closing = match seconds.i64()?.max() {
        Some(closing) => closing,
        None => return empty_feature(RECENCY, DataType::Int64),
    };

    let last_purchase = DataFrame::new(vec![transactions.column(CUSTOMER_ID)?.clone(), seconds])?
        .lazy()
        .group_by_stable([col(CUSTOMER_ID)])
        .agg([col(INVOICE_DATE).max().alias(LAST_INVOICE)])
        .collect()?;

    let days: Vec<Option<i64>> = last_purchase
        .column(LAST_INVOICE)?
        .i64()?
        .into_iter()
        .map(|last| last.map(|last| (closing - last).div_euclid(SECONDS_PER_DAY) + 1))
        .collect();

    let df = DataFrame::new(vec![
        last_purchase.column(CUSTOMER_ID)?.clone(),
        Series::new(RECENCY, days),
    ])?;

    Ok(df)
}

/// Invoice dates as Int64 unix seconds
fn invoice_seconds(dates: &Series) -> crate::Result<Series> {
    match dates.dtype() {
        DataType::Datetime(unit, _) => {
            let per_second = match unit {
                TimeUnit::Milliseconds => 1_000,
                TimeUnit::Microseconds => 1_000_000,
                TimeUnit::Nanoseconds => 1_000_000_000,
            };
            let raw = dates.cast(&DataType::Int64)?;
            Ok(raw.i64()?.apply_values(|v| v.div_euclid(per_second)).into_series())
        }
        DataType::Date => {
            let days = dates.cast(&DataType::Int64)?;
            Ok(days.i64()?.apply_values(|d| d * SECONDS_PER_DAY).into_series())
        }
        dtype if dtype.is_integer() => Ok(dates.cast(&DataType::Int64)?),
        dtype => Err(RfmError::InvalidColumnType {
            column: INVOICE_DATE.to_string(),
            dtype: dtype.to_string(),
        }),
    }
}

/// Frequency = number of transactions per customer
pub fn frequency(transactions: &DataFrame) -> crate::Result<DataFrame> {
    require_columns(transactions, &[CUSTOMER_ID, INVOICE_DATE])?;

    let df = transactions
        .clone()
        .lazy()
        .group_by_stable([col(CUSTOMER_ID)])
        .agg([col(INVOICE_DATE).count().cast(DataType::Int64).alias(FREQUENCY)])
        .collect()?;

    Ok(df)
}

/// MonetaryValue = mean of `UnitPrice * Quantity` over the customer's transactions
pub fn monetary_value(transactions: &DataFrame) -> crate::Result<DataFrame> {
    require_columns(transactions, &[CUSTOMER_ID, UNIT_PRICE, QUANTITY])?;

    let df = transactions
        .clone()
        .lazy()
        .with_column(
            (col(UNIT_PRICE).cast(DataType::Float64) * col(QUANTITY).cast(DataType::Float64))
                .alias(REVENUE),
        )
        .group_by_stable([col(CUSTOMER_ID)])
        .agg([col(REVENUE).mean().alias(MONETARY_VALUE)])
        .collect()?;

    Ok(df)
}

fn empty_feature(name: &str, dtype: DataType) -> crate::Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new_empty(CUSTOMER_ID, &DataType::Int64),
        Series::new_empty(name, &dtype),
    ])?;
    Ok(df)
}
