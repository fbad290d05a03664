//! Target branches of the run-script pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PilotError;

/// The fixed set of branches a pipeline may be created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Development,
    Production,
    Test,
    Uat,
}

impl Branch {
    pub const ALL: [Branch; 4] = [
        Branch::Development,
        Branch::Production,
        Branch::Test,
        Branch::Uat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Development => "development",
            Branch::Production => "production",
            Branch::Test => "test",
            Branch::Uat => "uat",
        }
    }
}

impl Default for Branch {
    fn default() -> Self {
        Branch::Production
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Branch::Development),
            "production" => Ok(Branch::Production),
            "test" => Ok(Branch::Test),
            "uat" => Ok(Branch::Uat),
            _ => Err(PilotError::InvalidBranch(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_branches() {
        assert_eq!("production".parse::<Branch>().unwrap(), Branch::Production);
        assert_eq!("Development".parse::<Branch>().unwrap(), Branch::Development);
        assert_eq!(" UAT ".parse::<Branch>().unwrap(), Branch::Uat);
        assert_eq!("test".parse::<Branch>().unwrap(), Branch::Test);
    }

    #[test]
    fn test_parse_unknown_branch_is_configuration_error() {
        let err = "staging".parse::<Branch>().unwrap_err();
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_default_is_production() {
        assert_eq!(Branch::default(), Branch::Production);
        assert_eq!(Branch::default().to_string(), "production");
    }
}
