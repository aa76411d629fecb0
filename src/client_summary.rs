use crate::anomaly::AnomalyTag;
use crate::error::{KpiEngineError, Result};
use crate::normalizer::{normalize, NormalizerConfig};
use crate::schema::{columns, RawTable, Scalar, TransactionRecord};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClientSummaryRow {
    pub client_id: Scalar,
    pub total_amount: f64,
    pub last_transaction_date: Option<NaiveDate>,
    #[schemars(description = "Transactions of this client tagged as anomalies; 0 when no tags were supplied")]
    pub anomaly_count: usize,
}

/// Restricts a set of transactions. Every bound is inclusive and an unset
/// bound matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TransactionFilter {
    pub clients: Option<BTreeSet<Scalar>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

impl TransactionFilter {
    pub fn with_clients<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        self.clients = Some(clients.into_iter().map(Into::into).collect());
        self
    }

    pub fn between_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn amount_between(mut self, min: f64, max: f64) -> Self {
        self.min_amount = Some(min);
        self.max_amount = Some(max);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &TransactionFilter::default()
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(clients) = &self.clients {
            if !clients.contains(&record.client_id) {
                return false;
            }
        }

        if self.start_date.is_some() || self.end_date.is_some() {
            // An undated row cannot satisfy a date bound.
            let Some(date) = record.date else {
                return false;
            };
            if self.start_date.is_some_and(|start| date < start)
                || self.end_date.is_some_and(|end| date > end)
            {
                return false;
            }
        }

        !(self.min_amount.is_some_and(|min| record.amount < min)
            || self.max_amount.is_some_and(|max| record.amount > max))
    }

    pub fn apply(&self, records: &[TransactionRecord]) -> Vec<TransactionRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Headline figures over a set of transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionOverview {
    pub transaction_count: usize,
    pub total_amount: f64,
    pub client_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl TransactionOverview {
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        let clients: BTreeSet<&Scalar> = records.iter().map(|r| &r.client_id).collect();
        let dates = records.iter().filter_map(|r| r.date);

        Self {
            transaction_count: records.len(),
            total_amount: records.iter().map(|r| r.amount).sum(),
            client_count: clients.len(),
            first_date: dates.clone().min(),
            last_date: dates.max(),
        }
    }
}

fn required_column(table: &RawTable, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| KpiEngineError::MissingColumn(name.to_string()))
}

/// Reads transactions from an already normalized table.
///
/// Rows with a blank client id or no usable amount are skipped. Rows whose
/// date could not be parsed are kept undated.
pub fn transaction_records(table: &RawTable) -> Result<Vec<TransactionRecord>> {
    let client_idx = required_column(table, columns::CLIENT_ID)?;
    let amount_idx = required_column(table, columns::TRANSACTION_AMOUNT)?;
    let date_idx = required_column(table, columns::TRANSACTION_DATE)?;

    let records: Vec<TransactionRecord> = table
        .rows
        .iter()
        .filter_map(|row| {
            let client = &row[client_idx];
            if client.is_blank() {
                return None;
            }
            Some(TransactionRecord {
                client_id: client.clone(),
                date: row[date_idx].as_date(),
                amount: row[amount_idx].as_f64()?,
            })
        })
        .collect();

    if records.len() < table.len() {
        debug!(
            "Skipped {} rows of '{}' without a client id or amount",
            table.len() - records.len(),
            table.display_name()
        );
    }

    Ok(records)
}

/// Rolls records up per client, ascending by client id.
///
/// `tags`, when given, is aligned with `records`; a record without a
/// matching tag counts as not anomalous.
pub fn summarize_records(
    records: &[TransactionRecord],
    tags: Option<&[AnomalyTag]>,
) -> Vec<ClientSummaryRow> {
    let mut groups: BTreeMap<&Scalar, ClientSummaryRow> = BTreeMap::new();

    for (i, record) in records.iter().enumerate() {
        let entry = groups
            .entry(&record.client_id)
            .or_insert_with(|| ClientSummaryRow {
                client_id: record.client_id.clone(),
                total_amount: 0.0,
                last_transaction_date: None,
                anomaly_count: 0,
            });

        entry.total_amount += record.amount;
        entry.last_transaction_date = entry.last_transaction_date.max(record.date);
        if tags.and_then(|t| t.get(i)) == Some(&AnomalyTag::Anomaly) {
            entry.anomaly_count += 1;
        }
    }

    groups.into_values().collect()
}

/// Summed amount per calendar day, ascending. Undated records are skipped.
pub fn daily_totals(records: &[TransactionRecord]) -> Vec<(NaiveDate, f64)> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        if let Some(date) = record.date {
            *days.entry(date).or_insert(0.0) += record.amount;
        }
    }
    days.into_iter().collect()
}

/// Normalizes a transaction table and reads its records.
pub fn load_transactions(
    table: &RawTable,
    config: &NormalizerConfig,
) -> Result<Vec<TransactionRecord>> {
    let normalized = normalize(table, config);
    let working = &normalized.table;

    // Checked on the column itself: an alias of a failed source column is
    // reported under the source's name.
    if let Some(idx) = working.column_index(columns::TRANSACTION_AMOUNT) {
        if !working.is_empty() && working.rows.iter().all(|row| row[idx].as_f64().is_none()) {
            return Err(KpiEngineError::AllValuesMissing {
                column: columns::TRANSACTION_AMOUNT.to_string(),
            });
        }
    }

    transaction_records(working)
}

/// Normalizes a transaction table and returns one summary row per client.
pub fn summarize(table: &RawTable, config: &NormalizerConfig) -> Result<Vec<ClientSummaryRow>> {
    let records = load_transactions(table, config)?;
    let summary = summarize_records(&records, None);

    debug!(
        "Summarized {} transactions of '{}' into {} clients",
        records.len(),
        table.display_name(),
        summary.len()
    );

    Ok(summary)
}
