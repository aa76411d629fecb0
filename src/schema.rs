use crate::error::{KpiEngineError, Result};
use crate::utils::parse_amount;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column names the engine knows about, as they appear in common exports
/// and in the canonical transaction schema.
pub mod columns {
    pub const DATE: &str = "Date";
    pub const ACCOUNT: &str = "Account";
    pub const AMOUNT: &str = "Amount";
    pub const TOTAL: &str = "Total";
    pub const CUSTOMER_JOB: &str = "Customer:Job";

    pub const CLIENT_ID: &str = "client_id";
    pub const TRANSACTION_DATE: &str = "transaction_date";
    pub const TRANSACTION_AMOUNT: &str = "transaction_amount";
}

/// A single decoded cell.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    #[default]
    Blank,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Scalar {
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Blank => true,
            Scalar::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text is parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Text(s) => parse_amount(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Scalar::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Blank => 0,
            Scalar::Number(_) => 1,
            Scalar::Date(_) => 2,
            Scalar::Text(_) => 3,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Blank => Ok(()),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

// Numbers compare by `total_cmp` so that Scalar can key ordered maps and
// exact-duplicate detection is bitwise.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.total_cmp(b),
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Scalar::Blank => {}
            Scalar::Number(n) => n.to_bits().hash(state),
            Scalar::Date(d) => d.hash(state),
            Scalar::Text(s) => s.hash(state),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Blank)
    }
}

/// A decoded table as handed over by whatever parsed the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct RawTable {
    /// Free-form name for reporting (usually the uploaded file name).
    /// Never consulted when classifying.
    pub label: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl RawTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            label: None,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Scalar>>,
    ) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(KpiEngineError::RowWidthMismatch {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed table>")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Scalar>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Appends a column populated from an existing one.
    pub(crate) fn copy_column(&mut self, source_idx: usize, name: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            let value = row[source_idx].clone();
            row.push(value);
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    GeneralLedger,
    ProfitAndLoss,
    BalanceSheet,
    Unrecognized,
}

impl StatementKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::GeneralLedger => "General Ledger",
            StatementKind::ProfitAndLoss => "Profit & Loss",
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::Unrecognized => "Unrecognized",
        }
    }
}

/// One accounting line after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalRow {
    #[schemars(description = "Posting date. Only General Ledger rows carry one.")]
    pub date: Option<NaiveDate>,

    #[schemars(description = "Account name as written in the export, e.g. 'Income:Sales'")]
    pub account: String,

    #[schemars(
        description = "Signed amount. Expenses and cost of goods sold are expected to be negative already."
    )]
    pub amount: f64,
}

impl CanonicalRow {
    pub fn new(account: impl Into<String>, amount: f64) -> Self {
        Self {
            date: None,
            account: account.into(),
            amount,
        }
    }

    pub fn dated(date: NaiveDate, account: impl Into<String>, amount: f64) -> Self {
        Self {
            date: Some(date),
            account: account.into(),
            amount,
        }
    }
}

/// One client transaction read from a normalized transaction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionRecord {
    pub client_id: Scalar,
    pub date: Option<NaiveDate>,
    pub amount: f64,
}

impl TransactionRecord {
    pub fn new(client_id: impl Into<Scalar>, date: Option<NaiveDate>, amount: f64) -> Self {
        Self {
            client_id: client_id.into(),
            date,
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = RawTable::new(["Account", "Amount"]);
        assert!(table.push_row(vec!["Cash".into(), 10.0.into()]).is_ok());

        let err = table.push_row(vec!["Cash".into()]).unwrap_err();
        assert!(matches!(
            err,
            KpiEngineError::RowWidthMismatch {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_scalar_ordering_puts_numbers_before_text() {
        let set: BTreeSet<Scalar> = [
            Scalar::from("ACME"),
            Scalar::from(102i64),
            Scalar::from(101i64),
            Scalar::Blank,
        ]
        .into_iter()
        .collect();

        let ordered: Vec<Scalar> = set.into_iter().collect();
        assert_eq!(
            ordered,
            vec![
                Scalar::Blank,
                Scalar::Number(101.0),
                Scalar::Number(102.0),
                Scalar::Text("ACME".to_string())
            ]
        );
    }

    #[test]
    fn test_scalar_hash_matches_equality() {
        let mut seen = HashSet::new();
        assert!(seen.insert(Scalar::Number(1000.0)));
        assert!(!seen.insert(Scalar::Number(1000.0)));
        assert!(seen.insert(Scalar::Text("1000".to_string())));
    }

    #[test]
    fn test_scalar_numeric_view() {
        assert_eq!(Scalar::from("$1,000").as_f64(), Some(1000.0));
        assert_eq!(Scalar::Number(f64::NAN).as_f64(), None);
        assert!(Scalar::from("   ").is_blank());
        assert_eq!(Scalar::from(None::<f64>), Scalar::Blank);
    }

    #[test]
    fn test_column_values() {
        let table = RawTable::from_rows(
            ["Account", "Amount"],
            vec![
                vec!["Cash".into(), 10.0.into()],
                vec!["Loan".into(), 5.0.into()],
            ],
        )
        .unwrap();

        let amounts: Vec<f64> = table
            .column_values("Amount")
            .unwrap()
            .filter_map(Scalar::as_f64)
            .collect();
        assert_eq!(amounts, vec![10.0, 5.0]);
        assert!(table.column_values("Total").is_none());
    }
}
