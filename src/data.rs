//! Transaction loading and filtering using Polars

use crate::error::RfmError;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

pub const CUSTOMER_ID: &str = "CustomerID";
/// Invoice time as a `Datetime` in microseconds
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const UNIT_PRICE: &str = "UnitPrice";
pub const QUANTITY: &str = "Quantity";
pub const COUNTRY: &str = "Country";

/// Columns every transaction table carries
pub const TRANSACTION_COLUMNS: [&str; 5] = [CUSTOMER_ID, INVOICE_DATE, UNIT_PRICE, QUANTITY, COUNTRY];

/// Date layouts seen in retail exports, tried in order
pub const DATE_FORMATS: [&str; 5] = [
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M",
];

const PARSED_DATE: &str = "ParsedInvoiceDate";

/// A single invoice line
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub customer_id: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub quantity: i64,
    pub country: String,
}

/// Row filters applied while loading a raw export
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    /// Keep only this country; `None` keeps every country
    pub country: Option<String>,
    /// Keep only invoices from this calendar year; `None` keeps every year
    pub year: Option<i32>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            country: Some("United Kingdom".to_string()),
            year: Some(2011),
        }
    }
}

/// Build the canonical transaction table from typed records
pub fn transactions_to_frame(transactions: &[Transaction]) -> crate::Result<DataFrame> {
    let customer_ids: Vec<i64> = transactions.iter().map(|t| t.customer_id).collect();
    let invoice_dates: Vec<i64> = transactions
        .iter()
        .map(|t| t.invoice_date.and_utc().timestamp_micros())
        .collect();
    let unit_prices: Vec<f64> = transactions.iter().map(|t| t.unit_price).collect();
    let quantities: Vec<i64> = transactions.iter().map(|t| t.quantity).collect();
    let countries: Vec<String> = transactions.iter().map(|t| t.country.clone()).collect();

    let df = DataFrame::new(vec![
        Series::new(CUSTOMER_ID, customer_ids),
        Series::new(INVOICE_DATE, invoice_dates)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        Series::new(UNIT_PRICE, unit_prices),
        Series::new(QUANTITY, quantities),
        Series::new(COUNTRY, countries),
    ])?;

    Ok(df)
}

/// Load a retail CSV export and reduce it to the canonical transaction table
///
/// # Arguments
/// * `path` - Path to the CSV file
/// * `filter` - Country and year restrictions
///
/// # Returns
/// * Transaction table with nulls and negative prices removed
pub fn load_transactions(path: impl AsRef<Path>, filter: &FilterOptions) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    let raw = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_encoding(CsvEncoding::LossyUtf8)
        .finish()?
        .collect()?;

    require_columns(&raw, &TRANSACTION_COLUMNS)?;
    debug!(rows = raw.height(), path = %path.display(), "Read raw transactions");

    let mut lazy = raw
        .clone()
        .lazy()
        .select(TRANSACTION_COLUMNS.map(col))
        .drop_nulls(None)
        .filter(col(UNIT_PRICE).gt_eq(lit(0.0)));

    if let Some(country) = &filter.country {
        lazy = lazy.filter(col(COUNTRY).eq(lit(country.as_str())));
    }

    let parsed = lazy
        .with_column(parse_invoice_dates().alias(PARSED_DATE))
        .collect()?;
    reject_unparsed_dates(&parsed)?;

    let mut lazy = parsed.lazy();
    if let Some(year) = filter.year {
        lazy = lazy.filter(col(PARSED_DATE).dt().year().eq(lit(year)));
    }

    let df = lazy
        .select([
            col(CUSTOMER_ID).cast(DataType::Int64),
            col(PARSED_DATE).alias(INVOICE_DATE),
            col(UNIT_PRICE).cast(DataType::Float64),
            col(QUANTITY).cast(DataType::Int64),
            col(COUNTRY).cast(DataType::String),
        ])
        .collect()?;

    info!(raw_rows = raw.height(), kept = df.height(), "Loaded transactions");
    Ok(df)
}

/// First layout in `DATE_FORMATS` that parses each value, null when none does
fn parse_invoice_dates() -> Expr {
    let candidates: Vec<Expr> = DATE_FORMATS
        .iter()
        .map(|format| {
            col(INVOICE_DATE).cast(DataType::String).str().to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions {
                    format: Some(format.to_string()),
                    strict: false,
                    ..Default::default()
                },
                lit("raise"),
            )
        })
        .collect();
    coalesce(&candidates)
}

fn reject_unparsed_dates(df: &DataFrame) -> crate::Result<()> {
    let parsed = df.column(PARSED_DATE)?;
    if parsed.null_count() == 0 {
        return Ok(());
    }

    let row = parsed
        .is_null()
        .into_iter()
        .position(|missing| missing == Some(true))
        .unwrap_or_default();
    let raw = df.column(INVOICE_DATE)?.cast(&DataType::String)?;
    let value = raw.str()?.get(row).unwrap_or_default().to_string();

    Err(RfmError::InvalidTimestamp { row, value })
}

/// Fail with `MissingColumn` for the first absent column
pub(crate) fn require_columns(df: &DataFrame, columns: &[&str]) -> crate::Result<()> {
    let present = df.get_column_names();
    match columns.iter().find(|name| !present.contains(*name)) {
        Some(missing) => Err(RfmError::MissingColumn(missing.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom").unwrap();
        writeln!(file, "540001,71053,WHITE METAL LANTERN,6,1/4/2011 10:00,3.39,17850,United Kingdom").unwrap();
        writeln!(file, "540002,22633,HAND WARMER UNION JACK,6,3/15/2011 12:30,1.85,13047,United Kingdom").unwrap();
        writeln!(file, "540003,84406B,CREAM CUPID HEARTS COAT HANGER,8,5/2/2011 9:15,2.75,,United Kingdom").unwrap();
        writeln!(file, "540004,22752,SET 7 BABUSHKA NESTING BOXES,2,6/7/2011 11:00,-7.65,13047,United Kingdom").unwrap();
        writeln!(file, "540005,21730,GLASS STAR FROSTED T-LIGHT HOLDER,12,7/8/2011 14:45,1.25,12583,France").unwrap();
        file
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn invoice_micros(df: &DataFrame) -> Vec<i64> {
        df.column(INVOICE_DATE)
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn test_date_formats_agree() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceDate,UnitPrice,Quantity,CustomerID,Country").unwrap();
        writeln!(file, "12/1/2010 8:26,1.0,1,1,United Kingdom").unwrap();
        writeln!(file, "2010-12-01 08:26:00,1.0,1,2,United Kingdom").unwrap();
        writeln!(file, "2010-12-01T08:26:00,1.0,1,3,United Kingdom").unwrap();
        writeln!(file, "2010-12-01T08:26:00Z,1.0,1,4,United Kingdom").unwrap();
        writeln!(file, "2010-12-01 08:26,1.0,1,5,United Kingdom").unwrap();

        let filter = FilterOptions { country: None, year: None };
        let df = load_transactions(file.path(), &filter).unwrap();
        assert_eq!(
            df.column(INVOICE_DATE).unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );

        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap()
            .and_utc()
            .timestamp_micros();
        assert_eq!(invoice_micros(&df), vec![expected; 5]);
    }

    #[test]
    fn test_load_with_default_filters() {
        let file = create_test_csv();
        let df = load_transactions(file.path(), &FilterOptions::default()).unwrap();

        // 2010 row, missing customer, negative price and French row are dropped
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names(), TRANSACTION_COLUMNS.to_vec());

        let ids: Vec<i64> = df.column(CUSTOMER_ID).unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec![17850, 13047]);
    }

    #[test]
    fn test_load_without_filters() {
        let file = create_test_csv();
        let filter = FilterOptions { country: None, year: None };
        let df = load_transactions(file.path(), &filter).unwrap();

        // Only the null customer and the negative price are removed
        assert_eq!(df.height(), 4);
    }

    #[test]
    fn test_load_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,Quantity,InvoiceDate,CustomerID,Country").unwrap();
        writeln!(file, "536365,6,12/1/2010 8:26,17850,United Kingdom").unwrap();

        let result = load_transactions(file.path(), &FilterOptions::default());
        assert!(matches!(result, Err(RfmError::MissingColumn(ref c)) if c == UNIT_PRICE));
    }

    #[test]
    fn test_load_invalid_date() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "6,yesterday,2.55,17850,United Kingdom").unwrap();

        let result = load_transactions(file.path(), &FilterOptions::default());
        assert!(matches!(result, Err(RfmError::InvalidTimestamp { row: 0, ref value }) if value == "yesterday"));
    }

    #[test]
    fn test_transactions_to_frame() {
        let transactions = vec![
            Transaction {
                customer_id: 1,
                invoice_date: date(2011, 1, 1),
                unit_price: 2.5,
                quantity: 4,
                country: "United Kingdom".to_string(),
            },
            Transaction {
                customer_id: 2,
                invoice_date: date(2011, 1, 2),
                unit_price: 1.0,
                quantity: 1,
                country: "United Kingdom".to_string(),
            },
        ];

        let df = transactions_to_frame(&transactions).unwrap();
        assert_eq!(df.shape(), (2, 5));

        let dates = invoice_micros(&df);
        assert_eq!(dates[1] - dates[0], 86_400_000_000);
    }
}
