//! Account records and balance arithmetic

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const USD: &str = "USD";

/// USD credited to every new account, once.
pub const SEED_USD_BALANCE: f64 = 10_000.0;

/// Fractional digits kept for crypto quantities.
pub const CRYPTO_DECIMALS: i32 = 8;

/// Currency code to quantity. `USD` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<String, f64>);

impl Balances {
    pub fn seeded() -> Self {
        let mut map = BTreeMap::new();
        map.insert(USD.to_string(), SEED_USD_BALANCE);
        Balances(map)
    }

    pub fn usd(&self) -> f64 {
        self.get(USD)
    }

    /// Zero for codes the account never held.
    pub fn get(&self, code: &str) -> f64 {
        self.0.get(code).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, code: &str, quantity: f64) {
        self.0.insert(code.to_string(), quantity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(code, qty)| (code.as_str(), *qty))
    }

    /// Non-USD codes with a positive quantity.
    pub fn assets(&self) -> impl Iterator<Item = (&str, f64)> {
        self.iter().filter(|(code, qty)| *code != USD && *qty > 0.0)
    }
}

impl Default for Balances {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(USD.to_string(), 0.0);
        Balances(map)
    }
}

impl FromIterator<(String, f64)> for Balances {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut balances = Balances::default();
        for (code, qty) in iter {
            balances.set(&code, qty);
        }
        balances
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub balances: Balances,
    #[serde(default)]
    pub is_admin: bool,
}

impl Account {
    pub fn new(id: &str, email: &str) -> Self {
        Account {
            id: id.to_string(),
            email: email.to_string(),
            balances: Balances::seeded(),
            is_admin: false,
        }
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round_crypto(value: f64) -> f64 {
    round_to(value, CRYPTO_DECIMALS)
}
