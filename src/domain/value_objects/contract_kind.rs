use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 契約区分。継続契約か発注書ベースか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    #[serde(rename = "contract")]
    Contract,
    #[serde(rename = "po")]
    PurchaseOrder,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::Contract => "contract",
            ContractKind::PurchaseOrder => "po",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContractKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contract" => Ok(ContractKind::Contract),
            "po" | "purchase_order" => Ok(ContractKind::PurchaseOrder),
            other => Err(format!("Unknown contract kind: {other}")),
        }
    }
}
