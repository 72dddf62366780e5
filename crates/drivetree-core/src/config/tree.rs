//! Tree engine configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Tree metadata and mutation engine configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Node store backend: `"postgres"` or `"memory"`.
    #[serde(default = "default_store")]
    pub store: String,
    /// How many times an operation recomputes its lock plan when the node
    /// moved between planning and acquisition.
    #[serde(default = "default_max_plan_attempts")]
    #[validate(range(min = 1, max = 32))]
    pub max_plan_attempts: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            max_plan_attempts: default_max_plan_attempts(),
        }
    }
}

fn default_store() -> String {
    "postgres".to_string()
}

fn default_max_plan_attempts() -> u32 {
    3
}
