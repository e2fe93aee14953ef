//! Application scopes. Identities, roles and permissions are partitioned by scope.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Header the caller uses to declare which application it is acting in.
pub const SCOPE_HEADER: &str = "x-app-scope";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[serde(alias = "utc")]
    Consumer,
    #[serde(alias = "utb")]
    Merchant,
    #[serde(alias = "utd")]
    Delivery,
    #[serde(alias = "uta")]
    Admin,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Consumer, Scope::Merchant, Scope::Delivery, Scope::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Consumer => "consumer",
            Scope::Merchant => "merchant",
            Scope::Delivery => "delivery",
            Scope::Admin => "admin",
        }
    }

    /// The admin scope is gated by human approval.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Scope::Admin)
    }

    /// Role granted to a freshly activated identity in this scope.
    pub fn default_role(&self) -> &'static str {
        match self {
            Scope::Consumer => "customer",
            Scope::Merchant => "business_owner",
            Scope::Delivery => "rider",
            Scope::Admin => "staff",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "consumer" | "utc" => Ok(Scope::Consumer),
            "merchant" | "utb" => Ok(Scope::Merchant),
            "delivery" | "utd" => Ok(Scope::Delivery),
            "admin" | "uta" => Ok(Scope::Admin),
            other => Err(format!("Invalid scope: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_short_codes() {
        assert_eq!("merchant".parse::<Scope>(), Ok(Scope::Merchant));
        assert_eq!("UTD".parse::<Scope>(), Ok(Scope::Delivery));
        assert_eq!(" uta ".parse::<Scope>(), Ok(Scope::Admin));
        assert!("tenant".parse::<Scope>().is_err());
    }

    #[test]
    fn only_admin_is_privileged() {
        let privileged: Vec<_> = Scope::ALL.iter().filter(|s| s.is_privileged()).collect();
        assert_eq!(privileged, vec![&Scope::Admin]);
    }

    #[test]
    fn serde_accepts_short_codes() {
        let scope: Scope = serde_json::from_str("\"utb\"").unwrap();
        assert_eq!(scope, Scope::Merchant);
        assert_eq!(serde_json::to_string(&Scope::Consumer).unwrap(), "\"consumer\"");
    }
}
