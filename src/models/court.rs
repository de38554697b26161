use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_per_hour: Decimal,
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_per_hour: Decimal,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourtUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_per_hour: Option<Decimal>,
    pub is_available: Option<bool>,
}

fn default_true() -> bool {
    true
}
