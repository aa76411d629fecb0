use crate::chart_of_accounts::KeywordRuleSet;
use crate::error::{KpiEngineError, Result};
use crate::schema::{columns, CanonicalRow, RawTable, Scalar, StatementKind};
use log::debug;

/// A table that passed classification, reduced to canonical rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTable {
    pub label: String,
    pub kind: StatementKind,
    pub rows: Vec<CanonicalRow>,
    /// Rows dropped for a blank account, an amount that is not a number, or
    /// (General Ledger only) a missing date.
    pub dropped_rows: usize,
}

const GL_DATE_COLUMNS: &[&str] = &[columns::DATE, columns::TRANSACTION_DATE];
const GL_AMOUNT_COLUMNS: &[&str] = &[columns::AMOUNT, columns::TRANSACTION_AMOUNT];
const SUMMARY_AMOUNT_COLUMNS: &[&str] = &[
    columns::AMOUNT,
    columns::TOTAL,
    columns::TRANSACTION_AMOUNT,
];

fn first_present<'a>(table: &RawTable, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| table.has_column(c))
}

fn any_account_matches(table: &RawTable, predicate: impl Fn(&str) -> bool) -> bool {
    table
        .column_values(columns::ACCOUNT)
        .map(|mut values| values.any(|v| account_text(v).is_some_and(|a| predicate(a.as_str()))))
        .unwrap_or(false)
}

fn account_text(value: &Scalar) -> Option<String> {
    if value.is_blank() {
        return None;
    }
    Some(value.to_string().trim().to_string())
}

/// Decides which statement a normalized table is, with the reason when it
/// is none of them.
fn classify_with_reason(table: &RawTable, rules: &KeywordRuleSet) -> (StatementKind, Option<String>) {
    let has_account = table.has_column(columns::ACCOUNT);
    let has_date = first_present(table, GL_DATE_COLUMNS).is_some();
    let has_gl_amount = first_present(table, GL_AMOUNT_COLUMNS).is_some();

    if has_date && has_account && has_gl_amount {
        return (StatementKind::GeneralLedger, None);
    }

    if !has_account || first_present(table, SUMMARY_AMOUNT_COLUMNS).is_none() {
        return (
            StatementKind::Unrecognized,
            Some(format!(
                "expected 'Date', 'Account' and 'Amount' columns, or 'Account' with 'Amount'/'Total'; found {:?}",
                table.columns
            )),
        );
    }

    // Profit & Loss keywords win when a table carries both kinds.
    if any_account_matches(table, |a| rules.is_profit_and_loss_account(a)) {
        return (StatementKind::ProfitAndLoss, None);
    }
    if any_account_matches(table, |a| rules.is_balance_sheet_account(a)) {
        return (StatementKind::BalanceSheet, None);
    }

    (
        StatementKind::Unrecognized,
        Some(format!(
            "no account matched rule set v{} keywords {:?} or {:?}",
            rules.version,
            rules.statement_keywords.profit_and_loss,
            rules.statement_keywords.balance_sheet
        )),
    )
}

/// Pure function of the table's columns and cell contents; the label is
/// never consulted.
pub fn classify(table: &RawTable, rules: &KeywordRuleSet) -> StatementKind {
    classify_with_reason(table, rules).0
}

/// Converts a classified table into canonical rows.
///
/// The amount comes from `Amount` when present, otherwise `Total`, otherwise
/// `transaction_amount`. Only General Ledger rows keep a date, and a General
/// Ledger row whose date is blank or unparseable is dropped.
pub fn extract_rows(table: &RawTable, kind: StatementKind) -> (Vec<CanonicalRow>, usize) {
    let (amount_candidates, date_column) = match kind {
        StatementKind::GeneralLedger => (GL_AMOUNT_COLUMNS, first_present(table, GL_DATE_COLUMNS)),
        StatementKind::ProfitAndLoss | StatementKind::BalanceSheet => (SUMMARY_AMOUNT_COLUMNS, None),
        StatementKind::Unrecognized => return (Vec::new(), table.len()),
    };

    let account_idx = table.column_index(columns::ACCOUNT);
    let amount_idx = first_present(table, amount_candidates).and_then(|c| table.column_index(c));
    let date_idx = date_column.and_then(|c| table.column_index(c));

    let (Some(account_idx), Some(amount_idx)) = (account_idx, amount_idx) else {
        return (Vec::new(), table.len());
    };

    let mut rows = Vec::with_capacity(table.len());
    let mut dropped = 0;

    for row in &table.rows {
        let account = account_text(&row[account_idx]);
        let amount = row[amount_idx].as_f64();
        let date = date_idx.and_then(|i| row[i].as_date());

        // A ledger line without a usable posting date is not counted.
        if date_idx.is_some() && date.is_none() {
            dropped += 1;
            continue;
        }

        match (account, amount) {
            (Some(account), Some(amount)) => rows.push(CanonicalRow {
                date,
                account,
                amount,
            }),
            _ => dropped += 1,
        }
    }

    (rows, dropped)
}

/// Classifies and extracts, rejecting tables that match no statement shape.
pub fn classify_table(table: &RawTable, rules: &KeywordRuleSet) -> Result<ClassifiedTable> {
    let (kind, reason) = classify_with_reason(table, rules);

    if kind == StatementKind::Unrecognized {
        return Err(KpiEngineError::UnrecognizedStatementShape {
            table: table.display_name().to_string(),
            reason: reason.unwrap_or_else(|| "unknown shape".to_string()),
        });
    }

    let (rows, dropped_rows) = extract_rows(table, kind);
    debug!(
        "Classified '{}' as {} ({} rows, {} dropped)",
        table.display_name(),
        kind.label(),
        rows.len(),
        dropped_rows
    );

    Ok(ClassifiedTable {
        label: table.display_name().to_string(),
        kind,
        rows,
        dropped_rows,
    })
}
