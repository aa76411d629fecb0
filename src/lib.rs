//! # Financial KPI Engine
//!
//! Turns loosely-structured accounting exports (General Ledger, Profit &
//! Loss and Balance Sheet tables) into a fixed set of financial KPIs, and
//! tags client transactions with an isolation-forest anomaly detector.
//!
//! ## Core Concepts
//!
//! - **Raw Table**: a decoded upload with arbitrary column names. The engine
//!   never mutates it.
//! - **Normalization**: trimmed column names, canonical aliases, permissive
//!   dates, mean-imputed amounts and exact-duplicate removal.
//! - **Classification**: a table is a General Ledger by its columns, or a
//!   Profit & Loss / Balance Sheet by the account keywords it contains.
//! - **Accumulation**: classified rows are folded into three buckets.
//! - **KPIs**: 13 metrics with an explicit marker for undefined ratios.
//!
//! ## Example
//!
//! ```rust
//! use financial_kpi_engine::*;
//!
//! let gl = RawTable::from_rows(
//!     ["Date", "Account", "Amount"],
//!     vec![
//!         vec!["2025-01-05".into(), "Income:Sales".into(), 1000.0.into()],
//!         vec!["2025-01-06".into(), "Expense:Rent".into(), (-200.0).into()],
//!     ],
//! )
//! .unwrap()
//! .with_label("gl.csv");
//!
//! let report = KpiPipeline::default().process([&gl]).unwrap();
//! assert_eq!(report.kpis.get(KpiName::NetIncome), 800.0);
//! assert_eq!(report.kpis.get(KpiName::NetMargin), 0.8);
//! ```

pub mod accumulator;
pub mod anomaly;
pub mod chart_of_accounts;
pub mod classifier;
pub mod client_summary;
pub mod config;
pub mod error;
pub mod kpi;
pub mod normalizer;
pub mod schema;
pub mod utils;

pub use accumulator::{
    accumulate_statements, AcceptedTable, AccumulationOutcome, ColumnWarning, StatementAccumulator,
    StatementBuckets, TableRejection,
};
pub use anomaly::{
    count_anomalies, detect_anomalies, AnomalyConfig, AnomalyDetector, AnomalyTag,
    IsolationForest,
};
pub use chart_of_accounts::{
    AccountCategory, AccountEntry, CategoryRule, ChartOfAccounts, KeywordRuleSet,
    StatementKeywords,
};
pub use classifier::{classify, classify_table, extract_rows, ClassifiedTable};
pub use client_summary::{
    daily_totals, load_transactions, summarize, summarize_records, transaction_records,
    ClientSummaryRow, TransactionFilter, TransactionOverview,
};
pub use config::EngineConfig;
pub use error::{KpiEngineError, Result};
pub use kpi::{compute_kpis, KpiEngine, KpiName, KpiSet, KpiValue, RevenueSource, ValueStatus};
pub use normalizer::{normalize, ColumnAlias, Normalized, NormalizerConfig};
pub use schema::*;

use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of one pipeline run over a batch of statement tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiReport {
    pub kpis: KpiSet,

    #[schemars(description = "Tables that contributed rows, in input order")]
    pub accepted: Vec<AcceptedTable>,

    #[schemars(description = "Tables skipped because no statement shape matched")]
    pub rejected: Vec<TableRejection>,

    pub column_warnings: Vec<ColumnWarning>,

    pub chart_of_accounts: ChartOfAccounts,
}

impl KpiReport {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(KpiReport)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::generate_json_schema())?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Filtered transactions of one client table with their anomaly tags and
/// rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionAnalysis {
    pub records: Vec<TransactionRecord>,
    #[schemars(description = "One tag per entry of `records`")]
    pub tags: Vec<AnomalyTag>,
    pub overview: TransactionOverview,
    pub clients: Vec<ClientSummaryRow>,
    #[schemars(description = "Summed amount per day, ascending; undated records are left out")]
    pub daily_totals: Vec<(chrono::NaiveDate, f64)>,
}

impl TransactionAnalysis {
    pub fn anomaly_count(&self) -> usize {
        count_anomalies(&self.tags)
    }

    /// Records tagged as anomalies, in input order.
    pub fn anomalies(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records
            .iter()
            .zip(&self.tags)
            .filter(|(_, tag)| **tag == AnomalyTag::Anomaly)
            .map(|(record, _)| record)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KpiPipeline {
    config: EngineConfig,
}

impl KpiPipeline {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn accumulate<'t>(
        &self,
        tables: impl IntoIterator<Item = &'t RawTable>,
    ) -> AccumulationOutcome {
        StatementAccumulator::new(&self.config.rules, &self.config.normalizer).accumulate(tables)
    }

    /// Runs normalize, classify, accumulate and compute over a batch.
    ///
    /// Unrecognized tables are reported and skipped. Fails with
    /// [`KpiEngineError::EmptyInputSet`] when no table contributed a row.
    pub fn process<'t>(&self, tables: impl IntoIterator<Item = &'t RawTable>) -> Result<KpiReport> {
        let outcome = self.accumulate(tables);

        info!(
            "Accumulated {} tables ({} rejected): GL={} P&L={} BS={}",
            outcome.accepted.len(),
            outcome.rejected.len(),
            outcome.buckets.general_ledger.len(),
            outcome.buckets.profit_and_loss.len(),
            outcome.buckets.balance_sheet.len()
        );

        let kpis = KpiEngine::new(&self.config.rules).compute(&outcome.buckets)?;
        let chart_of_accounts =
            ChartOfAccounts::from_statements(outcome.buckets.statements(), &self.config.rules);

        let undefined = kpis.undefined_metrics();
        if !undefined.is_empty() {
            debug!("Undefined ratios defaulted to 0: {:?}", undefined);
        }
        info!(
            "Computed KPIs from {:?} revenue over {} accounts",
            kpis.revenue_source,
            chart_of_accounts.total_accounts()
        );

        Ok(KpiReport {
            kpis,
            accepted: outcome.accepted,
            rejected: outcome.rejected,
            column_warnings: outcome.column_warnings,
            chart_of_accounts,
        })
    }

    /// Normalizes a client transaction table, applies `filter`, tags the
    /// remaining amounts and rolls them up per client.
    pub fn analyze_transactions(
        &self,
        table: &RawTable,
        filter: &TransactionFilter,
    ) -> Result<TransactionAnalysis> {
        let all = load_transactions(table, &self.config.normalizer)?;
        let records = filter.apply(&all);

        let tags = AnomalyDetector::new(self.config.anomaly.clone())?.detect_records(&records)?;
        let clients = summarize_records(&records, Some(&tags));
        let overview = TransactionOverview::from_records(&records);
        let daily_totals = daily_totals(&records);

        info!(
            "Analyzed {} of {} transactions in '{}': {} clients, {} anomalies",
            records.len(),
            all.len(),
            table.display_name(),
            clients.len(),
            count_anomalies(&tags)
        );

        Ok(TransactionAnalysis {
            records,
            tags,
            overview,
            clients,
            daily_totals,
        })
    }
}

pub fn process_statements<'t>(
    tables: impl IntoIterator<Item = &'t RawTable>,
    config: &EngineConfig,
) -> Result<KpiReport> {
    KpiPipeline::new(config.clone())?.process(tables)
}

pub fn analyze_transactions(
    table: &RawTable,
    filter: &TransactionFilter,
    config: &EngineConfig,
) -> Result<TransactionAnalysis> {
    KpiPipeline::new(config.clone())?.analyze_transactions(table, filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(label: &str, rows: Vec<(&str, f64)>) -> RawTable {
        RawTable::from_rows(
            ["Account", "Amount"],
            rows.into_iter()
                .map(|(a, v)| vec![Scalar::from(a), Scalar::from(v)])
                .collect(),
        )
        .unwrap()
        .with_label(label)
    }

    #[test]
    fn test_process_reports_rejections_and_kpis() {
        let pnl = summary(
            "pnl.csv",
            vec![("Sales Income", 1000.0), ("COGS", -400.0), ("Office Expense", -100.0)],
        );
        let bs = summary(
            "bs.csv",
            vec![
                ("Current Assets", 800.0),
                ("Current Liabilities", 400.0),
                ("Total Equity", 1000.0),
            ],
        );
        let junk = summary("notes.csv", vec![("Memo", 1.0)]);

        let report = KpiPipeline::default().process([&pnl, &junk, &bs]).unwrap();

        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].table, "notes.csv");
        assert_eq!(report.kpis.revenue_source, RevenueSource::ProfitAndLoss);
        assert_eq!(report.kpis.get(KpiName::TotalRevenue), 1000.0);
        assert_eq!(report.kpis.get(KpiName::CurrentRatio), 2.0);
        assert!(report.chart_of_accounts.total_accounts() >= 6);
    }

    #[test]
    fn test_process_with_nothing_usable_fails() {
        let junk = summary("notes.csv", vec![("Memo", 1.0)]);
        let err = KpiPipeline::default().process([&junk]).unwrap_err();
        assert!(matches!(err, KpiEngineError::EmptyInputSet));

        let none: Vec<RawTable> = Vec::new();
        assert!(process_statements(&none, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let mut config = EngineConfig::default();
        config.anomaly.n_estimators = 0;
        assert!(KpiPipeline::new(config).is_err());
    }

    #[test]
    fn test_report_schema_and_json() {
        let schema = KpiReport::schema_as_json().unwrap();
        assert!(schema.contains("chart_of_accounts"));
        assert!(schema.contains("rejected"));

        let pnl = summary("pnl.csv", vec![("Income", 10.0)]);
        let report = KpiPipeline::default().process([&pnl]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["kpis"]["revenue_source"], "profit_and_loss");
    }

    #[test]
    fn test_analyze_transactions_filters_before_tagging() {
        let mut table = RawTable::new(["client_id", "transaction_amount", "transaction_date"]);
        for i in 0..12i64 {
            table
                .push_row(vec![
                    Scalar::from(i % 3),
                    Scalar::from(100.0 + i as f64),
                    Scalar::from(format!("2025-01-{:02}", i + 1)),
                ])
                .unwrap();
        }

        let pipeline = KpiPipeline::default();
        let all = pipeline
            .analyze_transactions(&table, &TransactionFilter::default())
            .unwrap();
        assert_eq!(all.records.len(), 12);
        assert_eq!(all.tags.len(), 12);
        assert_eq!(all.clients.len(), 3);
        assert_eq!(all.daily_totals.len(), 12);
        assert_eq!(
            all.daily_totals[0],
            (chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 100.0)
        );
        assert!(all.tags.iter().all(|t| *t != AnomalyTag::InsufficientData));

        let client_zero = pipeline
            .analyze_transactions(&table, &TransactionFilter::default().with_clients([0i64]))
            .unwrap();
        assert_eq!(client_zero.records.len(), 4);
        assert!(client_zero
            .tags
            .iter()
            .all(|t| *t == AnomalyTag::InsufficientData));
        assert_eq!(client_zero.anomaly_count(), 0);
        assert_eq!(client_zero.anomalies().count(), 0);
    }
}
