use std::collections::BTreeMap;

pub const NO_ADDRESS_NOTICE: &str = "No address configured for this coin.";

/// Asset symbol to the external address that receives out-of-band transfers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositAddresses(BTreeMap<String, String>);

impl DepositAddresses {
    pub fn new(addresses: BTreeMap<String, String>) -> Self {
        DepositAddresses(
            addresses
                .into_iter()
                .map(|(symbol, address)| (symbol.to_uppercase(), address))
                .collect(),
        )
    }

    pub fn address(&self, symbol: &str) -> Option<&str> {
        self.0
            .get(&symbol.to_uppercase())
            .map(String::as_str)
            .filter(|address| !address.trim().is_empty())
    }
}
