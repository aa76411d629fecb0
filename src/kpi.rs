use crate::accumulator::StatementBuckets;
use crate::chart_of_accounts::{AccountCategory, KeywordRuleSet};
use crate::error::{KpiEngineError, Result};
use crate::schema::CanonicalRow;
use crate::utils::checked_ratio;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum KpiName {
    TotalRevenue,
    TotalExpenses,
    NetIncome,
    GrossMargin,
    NetMargin,
    TotalAssets,
    TotalEquity,
    TotalLiabilities,
    CurrentRatio,
    DebtToEquity,
    DebtRatio,
    Roe,
    Roa,
}

impl KpiName {
    pub const ALL: [KpiName; 13] = [
        KpiName::TotalRevenue,
        KpiName::TotalExpenses,
        KpiName::NetIncome,
        KpiName::GrossMargin,
        KpiName::NetMargin,
        KpiName::TotalAssets,
        KpiName::TotalEquity,
        KpiName::TotalLiabilities,
        KpiName::CurrentRatio,
        KpiName::DebtToEquity,
        KpiName::DebtRatio,
        KpiName::Roe,
        KpiName::Roa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiName::TotalRevenue => "total_revenue",
            KpiName::TotalExpenses => "total_expenses",
            KpiName::NetIncome => "net_income",
            KpiName::GrossMargin => "gross_margin",
            KpiName::NetMargin => "net_margin",
            KpiName::TotalAssets => "total_assets",
            KpiName::TotalEquity => "total_equity",
            KpiName::TotalLiabilities => "total_liabilities",
            KpiName::CurrentRatio => "current_ratio",
            KpiName::DebtToEquity => "debt_to_equity",
            KpiName::DebtRatio => "debt_ratio",
            KpiName::Roe => "roe",
            KpiName::Roa => "roa",
        }
    }

    /// Human-readable metric name. Value formatting is left to the caller.
    pub fn label(&self) -> &'static str {
        match self {
            KpiName::TotalRevenue => "Total Revenue",
            KpiName::TotalExpenses => "Total Expenses",
            KpiName::NetIncome => "Net Income",
            KpiName::GrossMargin => "Gross Margin",
            KpiName::NetMargin => "Net Margin",
            KpiName::TotalAssets => "Total Assets",
            KpiName::TotalEquity => "Total Equity",
            KpiName::TotalLiabilities => "Total Liabilities",
            KpiName::CurrentRatio => "Current Ratio",
            KpiName::DebtToEquity => "Debt-to-Equity Ratio",
            KpiName::DebtRatio => "Debt Ratio",
            KpiName::Roe => "Return on Equity (ROE)",
            KpiName::Roa => "Return on Assets (ROA)",
        }
    }

    /// Whether the metric is a quotient rather than a money amount.
    pub fn is_ratio(&self) -> bool {
        matches!(
            self,
            KpiName::GrossMargin
                | KpiName::NetMargin
                | KpiName::CurrentRatio
                | KpiName::DebtToEquity
                | KpiName::DebtRatio
                | KpiName::Roe
                | KpiName::Roa
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueStatus {
    Computed,
    #[schemars(
        description = "The ratio's denominator was zero (or its inputs were absent); the value was reported as 0"
    )]
    UndefinedDefaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiValue {
    pub value: f64,
    pub status: ValueStatus,
}

impl KpiValue {
    pub fn computed(value: f64) -> Self {
        Self {
            value,
            status: ValueStatus::Computed,
        }
    }

    pub fn undefined() -> Self {
        Self {
            value: 0.0,
            status: ValueStatus::UndefinedDefaulted,
        }
    }

    pub fn from_ratio(ratio: Option<f64>) -> Self {
        ratio.map(Self::computed).unwrap_or_else(Self::undefined)
    }

    pub fn is_defined(&self) -> bool {
        self.status == ValueStatus::Computed
    }
}

/// Which bucket the revenue and expense figures were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RevenueSource {
    GeneralLedger,
    ProfitAndLoss,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiSet {
    pub values: BTreeMap<KpiName, KpiValue>,
    pub revenue_source: RevenueSource,
    pub cogs: f64,
    pub gross_profit: f64,
}

impl KpiSet {
    /// The plain number for a metric; undefined ratios read as 0.
    pub fn get(&self, name: KpiName) -> f64 {
        self.values.get(&name).map(|v| v.value).unwrap_or(0.0)
    }

    pub fn value(&self, name: KpiName) -> Option<&KpiValue> {
        self.values.get(&name)
    }

    pub fn is_defined(&self, name: KpiName) -> bool {
        self.values.get(&name).is_some_and(KpiValue::is_defined)
    }

    pub fn undefined_metrics(&self) -> Vec<KpiName> {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_defined())
            .map(|(k, _)| *k)
            .collect()
    }

    /// `metric name -> value` keyed by the snake_case names.
    pub fn to_named_map(&self) -> BTreeMap<&'static str, f64> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.value))
            .collect()
    }
}

/// Sums amounts of the rows whose account falls in any of `categories`.
/// Returns the sum and how many rows matched; a row counts once even when
/// it matches several categories.
fn sum_matching(
    rules: &KeywordRuleSet,
    rows: &[CanonicalRow],
    categories: &[AccountCategory],
) -> (f64, usize) {
    rows.iter()
        .filter(|row| rules.matches_any(categories, &row.account))
        .fold((0.0, 0), |(sum, count), row| (sum + row.amount, count + 1))
}

pub struct KpiEngine<'a> {
    rules: &'a KeywordRuleSet,
}

impl<'a> KpiEngine<'a> {
    pub fn new(rules: &'a KeywordRuleSet) -> Self {
        Self { rules }
    }

    fn sum(&self, rows: &[CanonicalRow], category: AccountCategory) -> (f64, usize) {
        sum_matching(self.rules, rows, &[category])
    }

    /// Computes all 13 metrics.
    ///
    /// Revenue and expenses come from the General Ledger when it has rows,
    /// otherwise from the Profit & Loss bucket; the two are never added
    /// together. Amounts are taken as signed: expenses and COGS are expected
    /// to be negative already and are added, not subtracted.
    pub fn compute(&self, buckets: &StatementBuckets) -> Result<KpiSet> {
        if buckets.is_empty() {
            return Err(KpiEngineError::EmptyInputSet);
        }

        let (flow_rows, revenue_source): (&[CanonicalRow], RevenueSource) =
            if !buckets.general_ledger.is_empty() {
                (buckets.general_ledger.as_slice(), RevenueSource::GeneralLedger)
            } else if !buckets.profit_and_loss.is_empty() {
                (buckets.profit_and_loss.as_slice(), RevenueSource::ProfitAndLoss)
            } else {
                (&[] as &[CanonicalRow], RevenueSource::None)
            };

        let (total_revenue, _) = self.sum(flow_rows, AccountCategory::Revenue);
        let (total_expenses, _) = sum_matching(
            self.rules,
            flow_rows,
            &[AccountCategory::Expense, AccountCategory::CostOfGoodsSold],
        );
        let (cogs, cogs_rows) = self.sum(flow_rows, AccountCategory::CostOfGoodsSold);

        let net_income = total_revenue + total_expenses;
        let gross_profit = total_revenue + cogs;

        // Without any cost-of-sales line a gross margin cannot be stated.
        let gross_margin = if cogs_rows == 0 {
            KpiValue::undefined()
        } else {
            KpiValue::from_ratio(checked_ratio(gross_profit, total_revenue))
        };
        let net_margin = KpiValue::from_ratio(checked_ratio(net_income, total_revenue));

        let bs = buckets.balance_sheet.as_slice();
        let (total_assets, _) = self.sum(bs, AccountCategory::Assets);
        let (total_equity, _) = self.sum(bs, AccountCategory::Equity);
        let (total_liabilities, _) = self.sum(bs, AccountCategory::Liabilities);
        let (current_assets, _) = self.sum(bs, AccountCategory::CurrentAssets);
        let (current_liabilities, _) = self.sum(bs, AccountCategory::CurrentLiabilities);

        let values = BTreeMap::from([
            (KpiName::TotalRevenue, KpiValue::computed(total_revenue)),
            (KpiName::TotalExpenses, KpiValue::computed(total_expenses)),
            (KpiName::NetIncome, KpiValue::computed(net_income)),
            (KpiName::GrossMargin, gross_margin),
            (KpiName::NetMargin, net_margin),
            (KpiName::TotalAssets, KpiValue::computed(total_assets)),
            (KpiName::TotalEquity, KpiValue::computed(total_equity)),
            (KpiName::TotalLiabilities, KpiValue::computed(total_liabilities)),
            (
                KpiName::CurrentRatio,
                KpiValue::from_ratio(checked_ratio(current_assets, current_liabilities)),
            ),
            (
                KpiName::DebtToEquity,
                KpiValue::from_ratio(checked_ratio(total_liabilities, total_equity)),
            ),
            (
                KpiName::DebtRatio,
                KpiValue::from_ratio(checked_ratio(total_liabilities, total_assets)),
            ),
            (
                KpiName::Roe,
                KpiValue::from_ratio(checked_ratio(net_income, total_equity)),
            ),
            (
                KpiName::Roa,
                KpiValue::from_ratio(checked_ratio(net_income, total_assets)),
            ),
        ]);

        let kpis = KpiSet {
            values,
            revenue_source,
            cogs,
            gross_profit,
        };

        debug!(
            "KPIs from {:?}: revenue={} net_income={} undefined={:?}",
            revenue_source,
            total_revenue,
            net_income,
            kpis.undefined_metrics()
        );

        Ok(kpis)
    }
}

pub fn compute_kpis(buckets: &StatementBuckets, rules: &KeywordRuleSet) -> Result<KpiSet> {
    KpiEngine::new(rules).compute(buckets)
}
