use crate::chart_of_accounts::KeywordRuleSet;
use crate::classifier::{classify_table, ClassifiedTable};
use crate::error::KpiEngineError;
use crate::normalizer::{normalize, NormalizerConfig};
use crate::schema::{CanonicalRow, RawTable, StatementKind};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The three statement buckets. Rows are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementBuckets {
    pub general_ledger: Vec<CanonicalRow>,
    pub profit_and_loss: Vec<CanonicalRow>,
    pub balance_sheet: Vec<CanonicalRow>,
}

impl StatementBuckets {
    pub fn is_empty(&self) -> bool {
        self.general_ledger.is_empty()
            && self.profit_and_loss.is_empty()
            && self.balance_sheet.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.general_ledger.len() + self.profit_and_loss.len() + self.balance_sheet.len()
    }

    pub fn bucket(&self, kind: StatementKind) -> &[CanonicalRow] {
        match kind {
            StatementKind::GeneralLedger => &self.general_ledger,
            StatementKind::ProfitAndLoss => &self.profit_and_loss,
            StatementKind::BalanceSheet => &self.balance_sheet,
            StatementKind::Unrecognized => &[],
        }
    }

    /// Appends rows to the bucket for `kind`. Unrecognized rows go nowhere.
    pub fn append(&mut self, kind: StatementKind, rows: impl IntoIterator<Item = CanonicalRow>) {
        let bucket = match kind {
            StatementKind::GeneralLedger => &mut self.general_ledger,
            StatementKind::ProfitAndLoss => &mut self.profit_and_loss,
            StatementKind::BalanceSheet => &mut self.balance_sheet,
            StatementKind::Unrecognized => return,
        };
        bucket.extend(rows);
    }

    /// Concatenates `other` after `self`, bucket by bucket. Used to combine
    /// partial results accumulated independently.
    pub fn merge(mut self, other: StatementBuckets) -> StatementBuckets {
        self.general_ledger.extend(other.general_ledger);
        self.profit_and_loss.extend(other.profit_and_loss);
        self.balance_sheet.extend(other.balance_sheet);
        self
    }

    pub fn statements(&self) -> [(StatementKind, &[CanonicalRow]); 3] {
        [
            (StatementKind::GeneralLedger, self.general_ledger.as_slice()),
            (StatementKind::ProfitAndLoss, self.profit_and_loss.as_slice()),
            (StatementKind::BalanceSheet, self.balance_sheet.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AcceptedTable {
    pub table: String,
    pub kind: StatementKind,
    pub rows: usize,
    pub dropped_rows: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableRejection {
    pub table: String,
    pub reason: String,
}

/// An amount column whose imputation was skipped because it had no values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnWarning {
    pub table: String,
    pub column: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccumulationOutcome {
    pub buckets: StatementBuckets,
    pub accepted: Vec<AcceptedTable>,
    pub rejected: Vec<TableRejection>,
    pub column_warnings: Vec<ColumnWarning>,
}

impl AccumulationOutcome {
    pub fn merge(mut self, other: AccumulationOutcome) -> AccumulationOutcome {
        self.buckets = self.buckets.merge(other.buckets);
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
        self.column_warnings.extend(other.column_warnings);
        self
    }
}

pub struct StatementAccumulator<'a> {
    rules: &'a KeywordRuleSet,
    normalizer: &'a NormalizerConfig,
}

impl<'a> StatementAccumulator<'a> {
    pub fn new(rules: &'a KeywordRuleSet, normalizer: &'a NormalizerConfig) -> Self {
        Self { rules, normalizer }
    }

    /// Folds every table into a fresh outcome. A rejected table never stops
    /// the remaining ones.
    pub fn accumulate<'t>(
        &self,
        tables: impl IntoIterator<Item = &'t RawTable>,
    ) -> AccumulationOutcome {
        tables
            .into_iter()
            .fold(AccumulationOutcome::default(), |outcome, table| {
                self.absorb(outcome, table)
            })
    }

    /// Normalizes, classifies and appends one table, returning the new outcome.
    pub fn absorb(&self, mut outcome: AccumulationOutcome, table: &RawTable) -> AccumulationOutcome {
        let normalized = normalize(table, self.normalizer);
        let label = normalized.table.display_name().to_string();

        for err in &normalized.column_errors {
            if let KpiEngineError::AllValuesMissing { column } = err {
                outcome.column_warnings.push(ColumnWarning {
                    table: label.clone(),
                    column: column.clone(),
                    message: err.to_string(),
                });
            }
        }

        match classify_table(&normalized.table, self.rules) {
            Ok(ClassifiedTable {
                kind,
                rows,
                dropped_rows,
                ..
            }) => {
                outcome.accepted.push(AcceptedTable {
                    table: label,
                    kind,
                    rows: rows.len(),
                    dropped_rows,
                    duplicates_removed: normalized.duplicates_removed,
                });
                outcome.buckets.append(kind, rows);
            }
            Err(KpiEngineError::UnrecognizedStatementShape { table, reason }) => {
                warn!("Skipping '{}': {}", table, reason);
                outcome.rejected.push(TableRejection { table, reason });
            }
            Err(other) => {
                warn!("Skipping '{}': {}", label, other);
                outcome.rejected.push(TableRejection {
                    table: label,
                    reason: other.to_string(),
                });
            }
        }

        debug!(
            "Buckets now GL={} P&L={} BS={}",
            outcome.buckets.general_ledger.len(),
            outcome.buckets.profit_and_loss.len(),
            outcome.buckets.balance_sheet.len()
        );

        outcome
    }
}

pub fn accumulate_statements<'t>(
    tables: impl IntoIterator<Item = &'t RawTable>,
    rules: &KeywordRuleSet,
    normalizer: &NormalizerConfig,
) -> AccumulationOutcome {
    StatementAccumulator::new(rules, normalizer).accumulate(tables)
}
