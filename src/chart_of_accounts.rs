use crate::error::{KpiEngineError, Result};
use crate::schema::{CanonicalRow, StatementKind};
use crate::utils::contains_ignore_case;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_RULE_SET_VERSION: u32 = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    #[schemars(description = "Operating and other income (P&L, credit)")]
    Revenue,

    #[schemars(description = "Any expense line (P&L, debit)")]
    Expense,

    #[schemars(description = "Direct costs of goods sold, a subset of expenses")]
    CostOfGoodsSold,

    #[schemars(description = "All asset lines (Balance Sheet)")]
    Assets,

    #[schemars(description = "Assets expected to turn into cash within a year")]
    CurrentAssets,

    #[schemars(description = "All liability lines (Balance Sheet)")]
    Liabilities,

    #[schemars(description = "Obligations due within a year")]
    CurrentLiabilities,

    #[schemars(description = "Owner's residual interest")]
    Equity,
}

impl AccountCategory {
    pub const ALL: [AccountCategory; 8] = [
        AccountCategory::Revenue,
        AccountCategory::Expense,
        AccountCategory::CostOfGoodsSold,
        AccountCategory::Assets,
        AccountCategory::CurrentAssets,
        AccountCategory::Liabilities,
        AccountCategory::CurrentLiabilities,
        AccountCategory::Equity,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryRule {
    pub category: AccountCategory,
    #[schemars(description = "Case-insensitive substrings; an account matching any of them belongs to the category")]
    pub keywords: Vec<String>,
}

/// Keywords that decide which statement a summary-shaped table is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementKeywords {
    pub profit_and_loss: Vec<String>,
    pub balance_sheet: Vec<String>,
}

/// Versioned keyword table standing in for a real chart of accounts.
///
/// Categories overlap on purpose: "Current Assets" is both
/// [`AccountCategory::CurrentAssets`] and [`AccountCategory::Assets`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordRuleSet {
    pub version: u32,
    pub statement_keywords: StatementKeywords,
    pub categories: Vec<CategoryRule>,
}

impl Default for KeywordRuleSet {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|w| w.to_string()).collect()
        }

        Self {
            version: DEFAULT_RULE_SET_VERSION,
            statement_keywords: StatementKeywords {
                profit_and_loss: words(&["Income", "Expense", "COGS"]),
                balance_sheet: words(&["Assets", "Liabilities", "Equity"]),
            },
            categories: vec![
                CategoryRule {
                    category: AccountCategory::Revenue,
                    keywords: words(&["Income"]),
                },
                CategoryRule {
                    category: AccountCategory::Expense,
                    keywords: words(&["Expense"]),
                },
                CategoryRule {
                    category: AccountCategory::CostOfGoodsSold,
                    keywords: words(&["Cost of Goods Sold"]),
                },
                CategoryRule {
                    category: AccountCategory::Assets,
                    keywords: words(&["Assets"]),
                },
                CategoryRule {
                    category: AccountCategory::CurrentAssets,
                    keywords: words(&["Current Assets"]),
                },
                CategoryRule {
                    category: AccountCategory::Liabilities,
                    keywords: words(&["Liabilities"]),
                },
                CategoryRule {
                    category: AccountCategory::CurrentLiabilities,
                    keywords: words(&["Current Liabilities"]),
                },
                CategoryRule {
                    category: AccountCategory::Equity,
                    keywords: words(&["Equity"]),
                },
            ],
        }
    }
}

impl KeywordRuleSet {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Self = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every category needs at least one non-blank keyword, and so does each
    /// statement rule. An empty keyword would match every account.
    pub fn validate(&self) -> Result<()> {
        for category in AccountCategory::ALL {
            let keywords = self.keywords_for(category);
            if keywords.is_empty() {
                return Err(KpiEngineError::InvalidRuleSet(format!(
                    "rule set v{} has no keywords for {:?}",
                    self.version, category
                )));
            }
        }

        let all_keywords = self
            .categories
            .iter()
            .flat_map(|rule| rule.keywords.iter())
            .chain(self.statement_keywords.profit_and_loss.iter())
            .chain(self.statement_keywords.balance_sheet.iter());

        for keyword in all_keywords {
            if keyword.trim().is_empty() {
                return Err(KpiEngineError::InvalidRuleSet(format!(
                    "rule set v{} contains a blank keyword",
                    self.version
                )));
            }
        }

        if self.statement_keywords.profit_and_loss.is_empty()
            || self.statement_keywords.balance_sheet.is_empty()
        {
            return Err(KpiEngineError::InvalidRuleSet(format!(
                "rule set v{} needs keywords for both statement kinds",
                self.version
            )));
        }

        Ok(())
    }

    pub fn keywords_for(&self, category: AccountCategory) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|rule| rule.category == category)
            .flat_map(|rule| rule.keywords.iter().map(String::as_str))
            .collect()
    }

    pub fn matches(&self, category: AccountCategory, account: &str) -> bool {
        self.keywords_for(category)
            .into_iter()
            .any(|keyword| contains_ignore_case(account, keyword))
    }

    pub fn matches_any(&self, categories: &[AccountCategory], account: &str) -> bool {
        categories.iter().any(|&c| self.matches(c, account))
    }

    /// All categories an account falls under, in declaration order.
    pub fn categories_for(&self, account: &str) -> Vec<AccountCategory> {
        AccountCategory::ALL
            .into_iter()
            .filter(|&c| self.matches(c, account))
            .collect()
    }

    pub fn is_profit_and_loss_account(&self, account: &str) -> bool {
        self.statement_keywords
            .profit_and_loss
            .iter()
            .any(|keyword| contains_ignore_case(account, keyword))
    }

    pub fn is_balance_sheet_account(&self, account: &str) -> bool {
        self.statement_keywords
            .balance_sheet
            .iter()
            .any(|keyword| contains_ignore_case(account, keyword))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccountEntry {
    pub name: String,
    pub statement: StatementKind,
    pub categories: Vec<AccountCategory>,
    pub total: f64,
    pub row_count: usize,
}

/// Distinct accounts seen in the accumulated statements, tagged with the
/// categories the active rule set assigns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChartOfAccounts {
    pub rule_set_version: u32,
    pub accounts: Vec<AccountEntry>,
}

impl ChartOfAccounts {
    pub fn from_statements<'a>(
        statements: impl IntoIterator<Item = (StatementKind, &'a [CanonicalRow])>,
        rules: &KeywordRuleSet,
    ) -> Self {
        let mut by_key: BTreeMap<(StatementKind, String), AccountEntry> = BTreeMap::new();

        for (statement, rows) in statements {
            for row in rows {
                let entry = by_key
                    .entry((statement, row.account.clone()))
                    .or_insert_with(|| AccountEntry {
                        name: row.account.clone(),
                        statement,
                        categories: rules.categories_for(&row.account),
                        total: 0.0,
                        row_count: 0,
                    });
                entry.total += row.amount;
                entry.row_count += 1;
            }
        }

        Self {
            rule_set_version: rules.version,
            accounts: by_key.into_values().collect(),
        }
    }

    pub fn accounts_in(&self, category: AccountCategory) -> Vec<&AccountEntry> {
        self.accounts
            .iter()
            .filter(|a| a.categories.contains(&category))
            .collect()
    }

    /// Accounts no category keyword matched.
    pub fn uncategorized(&self) -> Vec<&AccountEntry> {
        self.accounts
            .iter()
            .filter(|a| a.categories.is_empty())
            .collect()
    }

    pub fn total_accounts(&self) -> usize {
        self.accounts.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
