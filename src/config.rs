use crate::anomaly::AnomalyConfig;
use crate::chart_of_accounts::KeywordRuleSet;
use crate::error::Result;
use crate::normalizer::NormalizerConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything the pipeline can be tuned with. Missing sections fall back to
/// their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "Versioned keyword table used for classification and KPI sums")]
    pub rules: KeywordRuleSet,

    pub normalizer: NormalizerConfig,

    #[schemars(description = "Isolation forest parameters for transaction anomaly tagging")]
    pub anomaly: AnomalyConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        self.anomaly.validate()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }
}
