//! Transaction log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Asset label used for gift card redemptions.
pub const GIFT_CARD_ASSET: &str = "Gift Card";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
    Redeem,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TransactionKind::Buy => "Buy",
                TransactionKind::Sell => "Sell",
                TransactionKind::Redeem => "Redeem",
            }
        )
    }
}

/// An immutable fact in an account's history. `timestamp` is `None` until the
/// store has acknowledged the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_crypto: Option<f64>,
    #[serde(rename = "amountUSD")]
    pub amount_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_at_transaction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn buy(asset: &str, amount_crypto: f64, amount_usd: f64, unit_price: f64) -> Self {
        Transaction {
            id: String::new(),
            kind: TransactionKind::Buy,
            asset: asset.to_string(),
            amount_crypto: Some(amount_crypto),
            amount_usd,
            price_at_transaction: Some(unit_price),
            details: None,
            timestamp: None,
        }
    }

    pub fn redeem(card_type: &str, amount_usd: f64) -> Self {
        Transaction {
            id: String::new(),
            kind: TransactionKind::Redeem,
            asset: GIFT_CARD_ASSET.to_string(),
            amount_crypto: None,
            amount_usd,
            price_at_transaction: None,
            details: Some(format!("{card_type} ${amount_usd}")),
            timestamp: None,
        }
    }
}

/// Newest first. Unacknowledged entries sort as the oldest; ties keep their
/// insertion order.
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
