//! Portfolio valuation against the latest market snapshot.

use crate::core::account::{Balances, SEED_USD_BALANCE, USD};
use crate::core::market::{CoinSnapshot, find_by_symbol};

/// One wallet row: a balance and what it is worth in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub value_usd: f64,
    pub image: Option<String>,
}

/// USD balance plus every priced asset. Assets without a matching snapshot
/// count as zero.
pub fn net_worth(balances: &Balances, snapshots: &[CoinSnapshot]) -> f64 {
    balances.usd()
        + balances
            .assets()
            .filter_map(|(symbol, quantity)| {
                find_by_symbol(snapshots, symbol).map(|coin| quantity * coin.price_usd)
            })
            .sum::<f64>()
}

/// [`net_worth`] for display. A non-positive total (typically prices not
/// loaded yet) shows the seed balance instead. This is a presentation guard
/// only; use [`net_worth`] for anything that needs the real number.
pub fn display_net_worth(balances: &Balances, snapshots: &[CoinSnapshot]) -> f64 {
    let total = net_worth(balances, snapshots);
    if total > 0.0 { total } else { SEED_USD_BALANCE }
}

/// USD first, then every priced asset with a positive balance.
pub fn holdings(balances: &Balances, snapshots: &[CoinSnapshot]) -> Vec<Holding> {
    let usd = balances.usd();
    let mut rows = vec![Holding {
        symbol: USD.to_string(),
        name: "US Dollar".to_string(),
        quantity: usd,
        value_usd: usd,
        image: None,
    }];

    rows.extend(balances.assets().filter_map(|(symbol, quantity)| {
        find_by_symbol(snapshots, symbol).map(|coin| Holding {
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            quantity,
            value_usd: quantity * coin.price_usd,
            image: Some(coin.image.clone()),
        })
    }));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(symbol: &str, price_usd: f64) -> CoinSnapshot {
        CoinSnapshot {
            id: symbol.to_lowercase(),
            symbol: symbol.to_string(),
            name: format!("{symbol} coin"),
            image: format!("https://img.example/{symbol}.png"),
            price_usd,
            change: Some(1.5),
            sparkline: vec![],
        }
    }

    fn balances(entries: &[(&str, f64)]) -> Balances {
        entries
            .iter()
            .map(|(code, qty)| (code.to_string(), *qty))
            .collect()
    }

    #[test]
    fn test_net_worth_sums_priced_assets() {
        let b = balances(&[("USD", 500.0), ("BTC", 0.1)]);
        let market = vec![coin("BTC", 60_000.0), coin("ETH", 3_000.0)];
        assert_eq!(net_worth(&b, &market), 6_500.0);
        assert_eq!(display_net_worth(&b, &market), 6_500.0);
    }

    #[test]
    fn test_unpriced_assets_are_ignored() {
        let b = balances(&[("USD", 500.0), ("BTC", 0.1), ("DOGE", 1_000.0)]);
        let market = vec![coin("BTC", 60_000.0)];
        assert_eq!(net_worth(&b, &market), 6_500.0);

        let rows = holdings(&b, &market);
        let symbols: Vec<_> = rows.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["USD", "BTC"]);
        assert_eq!(rows[1].value_usd, 6_000.0);
        assert_eq!(rows[1].name, "BTC coin");
    }

    #[test]
    fn test_display_falls_back_to_seed_value() {
        let empty = balances(&[("USD", 0.0), ("BTC", 1.0)]);
        assert_eq!(net_worth(&empty, &[]), 0.0);
        assert_eq!(display_net_worth(&empty, &[]), 10_000.0);
    }

    #[test]
    fn test_valuation_is_deterministic() {
        let b = balances(&[("USD", 1.25), ("ETH", 2.0), ("SOL", 3.0)]);
        let market = vec![coin("ETH", 3_000.0), coin("SOL", 150.0)];
        let first = net_worth(&b, &market);
        assert_eq!(first, net_worth(&b, &market));
        assert_eq!(first, 1.25 + 6_000.0 + 450.0);
    }
}
