use crate::error::{KpiEngineError, Result};
use crate::schema::{columns, RawTable, Scalar};
use crate::utils::{mean, parse_date_permissive};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `canonical` is populated from `source` when the table has `source` but
/// not `canonical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnAlias {
    pub canonical: String,
    pub source: String,
}

impl ColumnAlias {
    pub fn new(canonical: &str, source: &str) -> Self {
        Self {
            canonical: canonical.to_string(),
            source: source.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NormalizerConfig {
    #[schemars(description = "Aliases applied in order after column names are trimmed")]
    pub aliases: Vec<ColumnAlias>,

    #[schemars(description = "Columns parsed as dates; unparseable cells become blank")]
    pub date_columns: Vec<String>,

    #[schemars(description = "Columns coerced to numbers and mean-imputed")]
    pub amount_columns: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            aliases: vec![
                ColumnAlias::new(columns::CLIENT_ID, columns::CUSTOMER_JOB),
                ColumnAlias::new(columns::TRANSACTION_DATE, columns::DATE),
                ColumnAlias::new(columns::TRANSACTION_AMOUNT, columns::AMOUNT),
            ],
            date_columns: vec![
                columns::DATE.to_string(),
                columns::TRANSACTION_DATE.to_string(),
            ],
            amount_columns: vec![
                columns::TRANSACTION_AMOUNT.to_string(),
                columns::AMOUNT.to_string(),
                columns::TOTAL.to_string(),
            ],
        }
    }
}

/// A normalized copy of a caller's table.
#[derive(Debug)]
pub struct Normalized {
    pub table: RawTable,
    /// One `AllValuesMissing` per amount column that could not be imputed.
    pub column_errors: Vec<KpiEngineError>,
    pub imputed_cells: usize,
    pub duplicates_removed: usize,
}

impl Normalized {
    pub fn has_column_errors(&self) -> bool {
        !self.column_errors.is_empty()
    }
}

pub fn normalize(table: &RawTable, config: &NormalizerConfig) -> Normalized {
    let mut working = table.clone();

    trim_column_names(&mut working);
    let aliased = apply_aliases(&mut working, &config.aliases);

    for column in &config.date_columns {
        parse_date_column(&mut working, column);
    }

    let mut failed = Vec::new();
    let mut imputed_cells = 0;
    for column in &config.amount_columns {
        if !working.has_column(column) {
            continue;
        }
        match impute_column_mean(&mut working, column) {
            Ok(count) => imputed_cells += count,
            Err(err) => failed.push((column.as_str(), err)),
        }
    }

    // An alias copy of a failed column is the same failure.
    let failed_names: HashSet<&str> = failed.iter().map(|(name, _)| *name).collect();
    let column_errors: Vec<KpiEngineError> = failed
        .into_iter()
        .filter(|(name, _)| {
            !aliased
                .iter()
                .any(|a| a.canonical == *name && failed_names.contains(a.source.as_str()))
        })
        .map(|(_, err)| {
            warn!("{}: {}", working.display_name(), err);
            err
        })
        .collect();

    let duplicates_removed = drop_duplicate_rows(&mut working);

    debug!(
        "Normalized '{}': {} rows kept, {} duplicates removed, {} cells imputed",
        working.display_name(),
        working.len(),
        duplicates_removed,
        imputed_cells
    );

    Normalized {
        table: working,
        column_errors,
        imputed_cells,
        duplicates_removed,
    }
}

pub fn trim_column_names(table: &mut RawTable) {
    for column in &mut table.columns {
        let trimmed = column.trim();
        if trimmed.len() != column.len() {
            *column = trimmed.to_string();
        }
    }
}

/// Returns the aliases that added a column.
pub fn apply_aliases<'a>(
    table: &mut RawTable,
    aliases: &'a [ColumnAlias],
) -> Vec<&'a ColumnAlias> {
    let mut applied = Vec::new();
    for alias in aliases {
        if table.has_column(&alias.canonical) {
            continue;
        }
        if let Some(source_idx) = table.column_index(&alias.source) {
            debug!(
                "Aliasing '{}' <- '{}' in '{}'",
                alias.canonical,
                alias.source,
                table.display_name()
            );
            table.copy_column(source_idx, &alias.canonical);
            applied.push(alias);
        }
    }
    applied
}

/// Returns how many non-blank cells could not be read as a date.
pub fn parse_date_column(table: &mut RawTable, column: &str) -> usize {
    let Some(idx) = table.column_index(column) else {
        return 0;
    };

    let mut coerced = 0;
    for row in &mut table.rows {
        let parsed = match &row[idx] {
            Scalar::Date(d) => Some(*d),
            Scalar::Text(s) => parse_date_permissive(s),
            _ => None,
        };
        if parsed.is_none() && !row[idx].is_blank() {
            coerced += 1;
        }
        row[idx] = Scalar::from(parsed);
    }

    if coerced > 0 {
        debug!(
            "{} unparseable values in '{}' of '{}' set to blank",
            coerced,
            column,
            table.display_name()
        );
    }
    coerced
}

/// Coerces a column to numbers and fills missing cells with the mean of
/// the present ones. Returns the number of cells filled.
pub fn impute_column_mean(table: &mut RawTable, column: &str) -> Result<usize> {
    let idx = table
        .column_index(column)
        .ok_or_else(|| KpiEngineError::MissingColumn(column.to_string()))?;

    let parsed: Vec<Option<f64>> = table.rows.iter().map(|row| row[idx].as_f64()).collect();
    let present: Vec<f64> = parsed.iter().flatten().copied().collect();
    let missing = parsed.len() - present.len();

    let fill = match mean(&present) {
        Some(value) => value,
        None if missing == 0 => return Ok(0),
        None => {
            return Err(KpiEngineError::AllValuesMissing {
                column: column.to_string(),
            })
        }
    };

    for (row, value) in table.rows.iter_mut().zip(parsed) {
        let value = value.unwrap_or(fill);
        // -0.0 and 0.0 must compare equal for deduplication.
        row[idx] = Scalar::Number(if value == 0.0 { 0.0 } else { value });
    }

    Ok(missing)
}

/// Removes rows identical across all columns, keeping first occurrences in
/// their original order. Returns the number removed.
pub fn drop_duplicate_rows(table: &mut RawTable) -> usize {
    let before = table.rows.len();
    let mut seen: HashSet<Vec<Scalar>> = HashSet::with_capacity(before);
    table.rows.retain(|row| seen.insert(row.clone()));
    before - table.rows.len()
}
