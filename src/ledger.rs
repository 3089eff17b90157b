//! Account ledger: balances and the append-only transaction log.
//!
//! Balance changes are read-modify-write cycles guarded by the account
//! document's version, so two operations racing on one account can never both
//! spend the same dollars. A losing writer re-reads and re-checks its
//! precondition before trying again.

use crate::core::account::{Account, Balances, USD, round_crypto};
use crate::core::store::{DocumentStore, Precondition, Snapshot, StoreError, Subscription};
use crate::core::transaction::{Transaction, sort_newest_first};
use crate::core::{Error, Result};
use crate::deposit::{DepositAddresses, NO_ADDRESS_NOTICE};
use crate::identity::Identity;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at a conditional balance write before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

pub const GIFT_CARDS: [&str; 5] = ["Amazon", "iTunes", "Google Play", "Steam", "Vanilla"];

pub fn account_path(account_id: &str) -> String {
    format!("users/{account_id}")
}

pub fn transactions_path(account_id: &str) -> String {
    format!("users/{account_id}/transactions")
}

/// Parses user input into a positive, finite amount.
pub fn parse_amount(input: &str) -> Result<f64> {
    let value: f64 = input.trim().parse().map_err(|_| Error::InvalidAmount)?;
    validate_amount(value)
}

fn validate_amount(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidAmount)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(StoreError::from)?)
}

fn decode_account(account_id: &str, snapshot: &Snapshot) -> Result<Account> {
    let mut account: Account = snapshot.decode()?;
    account.id = account_id.to_string();
    let usd = account.balances.usd();
    account.balances.set(USD, usd);
    Ok(account)
}

/// Outcome of a successful balance mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub transaction: Transaction,
    pub balances: Balances,
    pub message: String,
}

impl Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the user must do to sell: transfer the asset to an external address.
/// Nothing is recorded on the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SellInstructions {
    pub asset: String,
    pub address: Option<String>,
}

impl SellInstructions {
    pub fn address_or_notice(&self) -> &str {
        self.address.as_deref().unwrap_or(NO_ADDRESS_NOTICE)
    }

    pub fn warning(&self) -> String {
        format!(
            "Only send {0} to this address. Sending any other coin may result in the permanent loss of your funds.",
            self.asset
        )
    }
}

/// An account together with its history, newest transaction first.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountView {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    deposit_addresses: DepositAddresses,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>, deposit_addresses: DepositAddresses) -> Self {
        Self {
            store,
            deposit_addresses,
        }
    }

    /// Fetches the account for `identity`, creating the seeded default on first
    /// sight. Creation is conditional, so racing first sessions agree on one
    /// record.
    pub async fn ensure_account(&self, identity: &Identity) -> Result<Account> {
        let path = account_path(&identity.uid);
        if let Some(snapshot) = self.store.get(&path).await? {
            return decode_account(&identity.uid, &snapshot);
        }

        let account = Account::new(&identity.uid, &identity.email);
        match self.store.create(&path, encode(&account)?).await? {
            Some(_) => {
                info!(uid = %identity.uid, "Created account with seed balance");
                Ok(account)
            }
            None => {
                debug!(uid = %identity.uid, "Account created concurrently, re-reading");
                self.account(&identity.uid).await
            }
        }
    }

    pub async fn account(&self, account_id: &str) -> Result<Account> {
        let snapshot = self
            .store
            .get(&account_path(account_id))
            .await?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
        decode_account(account_id, &snapshot)
    }

    /// Every account on record, ordered by id.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.store
            .list("users")
            .await?
            .iter()
            .map(|snapshot| decode_account(snapshot.id(), snapshot))
            .collect()
    }

    /// Spends `usd_amount` on `asset_symbol` at `unit_price`.
    pub async fn execute_buy(
        &self,
        account_id: &str,
        asset_symbol: &str,
        usd_amount: f64,
        unit_price: f64,
    ) -> Result<Receipt> {
        let usd_amount = validate_amount(usd_amount)?;
        if !(unit_price.is_finite() && unit_price > 0.0) {
            return Err(Error::InvalidPrice);
        }
        let symbol = asset_symbol.trim().to_uppercase();
        if symbol.is_empty() || symbol == USD {
            return Err(Error::InvalidPrice);
        }
        let quantity = round_crypto(usd_amount / unit_price);
        if quantity <= 0.0 {
            return Err(Error::InvalidAmount);
        }

        let balances = self
            .apply(account_id, |balances| {
                let available = balances.usd();
                if available < usd_amount {
                    return Err(Error::InsufficientBalance {
                        required: usd_amount,
                        available,
                    });
                }
                Ok(vec![
                    (USD.to_string(), available - usd_amount),
                    (symbol.clone(), round_crypto(balances.get(&symbol) + quantity)),
                ])
            })
            .await?;

        let transaction = self
            .append_transaction(
                account_id,
                Transaction::buy(&symbol, quantity, usd_amount, unit_price),
            )
            .await?;
        info!(account_id, %symbol, quantity, usd_amount, unit_price, "Executed buy");

        Ok(Receipt {
            transaction,
            balances,
            message: format!("Successfully bought {quantity:.8} {symbol}!"),
        })
    }

    /// Credits a gift card's face value in USD. The code is trusted input.
    pub async fn execute_redeem(
        &self,
        account_id: &str,
        card_type: &str,
        usd_amount: f64,
        code: &str,
    ) -> Result<Receipt> {
        let usd_amount = validate_amount(usd_amount)?;
        if code.trim().is_empty() {
            return Err(Error::MissingCode);
        }
        let card_type = card_type.trim();

        let balances = self
            .apply(account_id, |balances| {
                Ok(vec![(USD.to_string(), balances.usd() + usd_amount)])
            })
            .await?;

        let transaction = self
            .append_transaction(account_id, Transaction::redeem(card_type, usd_amount))
            .await?;
        info!(account_id, card_type, usd_amount, "Redeemed gift card");

        Ok(Receipt {
            transaction,
            balances,
            message: format!("Successfully redeemed {card_type} card for ${usd_amount:.2}!"),
        })
    }

    /// Sells settle outside the platform: the user is pointed at a deposit
    /// address and the ledger is left untouched.
    pub fn initiate_sell(&self, asset_symbol: &str) -> SellInstructions {
        let asset = asset_symbol.trim().to_uppercase();
        let address = self.deposit_addresses.address(&asset).map(str::to_string);
        info!(%asset, has_address = address.is_some(), "Sell requested");
        SellInstructions { asset, address }
    }

    pub async fn transactions(&self, account_id: &str) -> Result<Vec<Transaction>> {
        let docs = self.store.list(&transactions_path(account_id)).await?;
        let mut transactions: Vec<Transaction> = docs
            .iter()
            .filter_map(|snapshot| match snapshot.decode::<Transaction>() {
                Ok(mut tx) => {
                    tx.id = snapshot.id().to_string();
                    Some(tx)
                }
                Err(e) => {
                    warn!(path = %snapshot.path, error = %e, "Skipping malformed transaction");
                    None
                }
            })
            .collect();
        sort_newest_first(&mut transactions);
        Ok(transactions)
    }

    pub async fn view(&self, account_id: &str) -> Result<AccountView> {
        let (account, transactions) =
            futures::try_join!(self.account(account_id), self.transactions(account_id))?;
        Ok(AccountView {
            account,
            transactions,
        })
    }

    /// Live view of one account, covering both balances and history.
    pub fn watch(&self, account_id: &str) -> AccountWatch {
        AccountWatch {
            ledger: self.clone(),
            account_id: account_id.to_string(),
            subscription: self.store.subscribe(&account_path(account_id)),
        }
    }

    async fn apply<F>(&self, account_id: &str, mut change: F) -> Result<Balances>
    where
        F: FnMut(&Balances) -> Result<Vec<(String, f64)>>,
    {
        let path = account_path(account_id);
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let snapshot = self
                .store
                .get(&path)
                .await?
                .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
            let account = decode_account(account_id, &snapshot)?;

            let mut fields = Map::new();
            for (code, quantity) in change(&account.balances)? {
                fields.insert(code, json!(quantity));
            }

            match self
                .store
                .update(
                    &path,
                    json!({ "balances": fields }),
                    Precondition::Version(snapshot.version),
                )
                .await
            {
                Ok(updated) => return Ok(decode_account(account_id, &updated)?.balances),
                Err(StoreError::Conflict(_)) => {
                    debug!(account_id, attempt, "Balance changed underneath us, retrying");
                }
                Err(StoreError::NotFound(_)) => {
                    return Err(Error::AccountNotFound(account_id.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(account_id, "Giving up after {MAX_WRITE_ATTEMPTS} conflicting writes");
        Err(Error::WriteConflict)
    }

    async fn append_transaction(
        &self,
        account_id: &str,
        transaction: Transaction,
    ) -> Result<Transaction> {
        let snapshot = self
            .store
            .append(&transactions_path(account_id), encode(&transaction)?)
            .await?;
        let mut stored: Transaction = snapshot.decode()?;
        stored.id = snapshot.id().to_string();
        Ok(stored)
    }
}

/// Subscription handle returned by [`Ledger::watch`]. Dropping it unsubscribes.
pub struct AccountWatch {
    ledger: Ledger,
    account_id: String,
    subscription: Subscription,
}

impl AccountWatch {
    pub async fn current(&self) -> Result<AccountView> {
        self.ledger.view(&self.account_id).await
    }

    /// Waits for the next change and returns the refreshed view. Read failures
    /// are logged and the watch keeps listening. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<AccountView> {
        loop {
            self.subscription.changed().await?;
            match self.current().await {
                Ok(view) => return Some(view),
                Err(e) => warn!(account_id = %self.account_id, error = %e, "Account refresh failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionKind;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
        }
    }

    fn ledger_with(store: Arc<dyn DocumentStore>) -> Ledger {
        let addresses = DepositAddresses::new(BTreeMap::from([(
            "BTC".to_string(),
            "bc1qexample".to_string(),
        )]));
        Ledger::new(store, addresses)
    }

    fn ledger() -> Ledger {
        ledger_with(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_ensure_account_seeds_once() {
        let ledger = ledger();
        let user = identity("u1");

        let account = ledger.ensure_account(&user).await.unwrap();
        assert_eq!(account.balances, Balances::seeded());
        assert!(!account.is_admin);
        assert_eq!(account.email, "u1@example.com");

        ledger.execute_redeem("u1", "Amazon", 5.0, "CODE").await.unwrap();
        let again = ledger.ensure_account(&user).await.unwrap();
        assert_eq!(again.balances.usd(), 10_005.0);
    }

    /// Store whose first `create` loses to a concurrent writer.
    struct LosingCreateStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for LosingCreateStore {
        async fn get(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
            self.inner.get(path).await
        }
        async fn set(&self, path: &str, data: Value) -> Result<Snapshot, StoreError> {
            self.inner.set(path, data).await
        }
        async fn create(&self, path: &str, _data: Value) -> Result<Option<Snapshot>, StoreError> {
            let winner = json!({"email": "winner@example.com", "balances": {"USD": 10000.0}, "isAdmin": false});
            self.inner.create(path, winner).await?;
            Ok(None)
        }
        async fn update(
            &self,
            path: &str,
            patch: Value,
            precondition: Precondition,
        ) -> Result<Snapshot, StoreError> {
            self.inner.update(path, patch, precondition).await
        }
        async fn append(&self, collection: &str, data: Value) -> Result<Snapshot, StoreError> {
            self.inner.append(collection, data).await
        }
        async fn list(&self, collection: &str) -> Result<Vec<Snapshot>, StoreError> {
            self.inner.list(collection).await
        }
        fn subscribe(&self, path: &str) -> Subscription {
            self.inner.subscribe(path)
        }
    }

    #[tokio::test]
    async fn test_accounts_lists_every_user() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u2")).await.unwrap();
        ledger.ensure_account(&identity("u1")).await.unwrap();
        ledger.execute_redeem("u1", "Steam", 15.0, "CODE").await.unwrap();

        let accounts = ledger.accounts().await.unwrap();
        let ids: Vec<_> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(accounts[0].balances.usd(), 10_015.0);
    }

    #[tokio::test]
    async fn test_ensure_account_lost_race_returns_winner() {
        let ledger = ledger_with(Arc::new(LosingCreateStore {
            inner: MemoryStore::new(),
        }));
        let account = ledger.ensure_account(&identity("u1")).await.unwrap();
        assert_eq!(account.email, "winner@example.com");
        assert_eq!(account.id, "u1");
    }

    #[tokio::test]
    async fn test_buy_moves_usd_into_asset() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        let receipt = ledger.execute_buy("u1", "btc", 500.0, 60_000.0).await.unwrap();
        assert_eq!(receipt.message, "Successfully bought 0.00833333 BTC!");
        assert_eq!(receipt.balances.usd(), 9_500.0);
        assert_eq!(receipt.balances.get("BTC"), 0.00833333);

        let tx = &receipt.transaction;
        assert_eq!(tx.kind, TransactionKind::Buy);
        assert_eq!(tx.asset, "BTC");
        assert_eq!(tx.amount_usd, 500.0);
        assert_eq!(tx.amount_crypto, Some(0.00833333));
        assert_eq!(tx.price_at_transaction, Some(60_000.0));
        assert!(tx.timestamp.is_some());
        assert!(!tx.id.is_empty());

        let account = ledger.account("u1").await.unwrap();
        assert_eq!(account.balances, receipt.balances);
        assert_eq!(ledger.transactions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_accumulates_quantity() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();
        ledger.execute_buy("u1", "ETH", 100.0, 3_000.0).await.unwrap();
        let receipt = ledger.execute_buy("u1", "ETH", 200.0, 4_000.0).await.unwrap();

        let expected = 0.03333333 + 0.05;
        assert!((receipt.balances.get("ETH") - expected).abs() < 1e-8);
        assert_eq!(receipt.balances.usd(), 9_700.0);
    }

    #[tokio::test]
    async fn test_buy_with_insufficient_balance_changes_nothing() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        let result = ledger.execute_buy("u1", "BTC", 10_000.01, 60_000.0).await;
        assert_eq!(
            result,
            Err(Error::InsufficientBalance {
                required: 10_000.01,
                available: 10_000.0
            })
        );
        assert_eq!(ledger.account("u1").await.unwrap().balances, Balances::seeded());
        assert!(ledger.transactions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buy_rejects_bad_amounts_and_prices() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                ledger.execute_buy("u1", "BTC", amount, 100.0).await,
                Err(Error::InvalidAmount)
            );
        }
        assert_eq!(
            ledger.execute_buy("u1", "BTC", 10.0, 0.0).await,
            Err(Error::InvalidPrice)
        );
        assert_eq!(
            ledger.execute_buy("u1", "USD", 10.0, 1.0).await,
            Err(Error::InvalidPrice)
        );
        assert_eq!(
            ledger.execute_buy("nobody", "BTC", 10.0, 100.0).await,
            Err(Error::AccountNotFound("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_buys_cannot_overspend() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        let (first, second) = tokio::join!(
            ledger.execute_buy("u1", "BTC", 6_000.0, 60_000.0),
            ledger.execute_buy("u1", "ETH", 6_000.0, 3_000.0),
        );
        let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);

        let account = ledger.account("u1").await.unwrap();
        assert_eq!(account.balances.usd(), 4_000.0);
        assert_eq!(ledger.transactions("u1").await.unwrap().len(), 1);
    }

    /// Store that lets another writer sneak in before the first update.
    struct InterleavingStore {
        inner: MemoryStore,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for InterleavingStore {
        async fn get(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
            self.inner.get(path).await
        }
        async fn set(&self, path: &str, data: Value) -> Result<Snapshot, StoreError> {
            self.inner.set(path, data).await
        }
        async fn create(&self, path: &str, data: Value) -> Result<Option<Snapshot>, StoreError> {
            self.inner.create(path, data).await
        }
        async fn update(
            &self,
            path: &str,
            patch: Value,
            precondition: Precondition,
        ) -> Result<Snapshot, StoreError> {
            if self.updates.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner
                    .update(path, json!({"balances": {"USD": 7_000.0}}), Precondition::Exists)
                    .await?;
            }
            self.inner.update(path, patch, precondition).await
        }
        async fn append(&self, collection: &str, data: Value) -> Result<Snapshot, StoreError> {
            self.inner.append(collection, data).await
        }
        async fn list(&self, collection: &str) -> Result<Vec<Snapshot>, StoreError> {
            self.inner.list(collection).await
        }
        fn subscribe(&self, path: &str) -> Subscription {
            self.inner.subscribe(path)
        }
    }

    #[tokio::test]
    async fn test_buy_retries_against_fresh_balance() {
        let ledger = ledger_with(Arc::new(InterleavingStore {
            inner: MemoryStore::new(),
            updates: AtomicUsize::new(0),
        }));
        ledger.ensure_account(&identity("u1")).await.unwrap();

        let receipt = ledger.execute_buy("u1", "BTC", 1_000.0, 50_000.0).await.unwrap();
        assert_eq!(receipt.balances.usd(), 6_000.0);
        assert_eq!(receipt.balances.get("BTC"), 0.02);
    }

    #[tokio::test]
    async fn test_redeem_credits_usd() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        let receipt = ledger
            .execute_redeem("u1", "Amazon", 100.0, "ABCD-1234")
            .await
            .unwrap();
        assert_eq!(receipt.balances.usd(), 10_100.0);
        assert_eq!(receipt.message, "Successfully redeemed Amazon card for $100.00!");

        let txs = ledger.transactions("u1").await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::Redeem);
        assert_eq!(txs[0].asset, "Gift Card");
        assert_eq!(txs[0].details.as_deref(), Some("Amazon $100"));
        assert_eq!(txs[0].amount_crypto, None);
    }

    #[tokio::test]
    async fn test_redeem_validation() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();

        assert_eq!(
            ledger.execute_redeem("u1", "Amazon", 0.0, "CODE").await,
            Err(Error::InvalidAmount)
        );
        assert_eq!(
            ledger.execute_redeem("u1", "Amazon", 50.0, "   ").await,
            Err(Error::MissingCode)
        );
        assert_eq!(ledger.account("u1").await.unwrap().balances.usd(), 10_000.0);
    }

    #[tokio::test]
    async fn test_sell_never_touches_ledger() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();
        ledger.execute_buy("u1", "BTC", 600.0, 60_000.0).await.unwrap();
        let before = ledger.view("u1").await.unwrap();

        let btc = ledger.initiate_sell("btc");
        assert_eq!(btc.asset, "BTC");
        assert_eq!(btc.address_or_notice(), "bc1qexample");
        assert!(btc.warning().starts_with("Only send BTC"));

        let sol = ledger.initiate_sell("SOL");
        assert_eq!(sol.address, None);
        assert_eq!(sol.address_or_notice(), NO_ADDRESS_NOTICE);

        assert_eq!(ledger.view("u1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_transactions_newest_first() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();
        ledger.execute_redeem("u1", "Steam", 10.0, "C1").await.unwrap();
        ledger.execute_redeem("u1", "Steam", 20.0, "C2").await.unwrap();
        ledger.execute_redeem("u1", "Steam", 30.0, "C3").await.unwrap();

        let amounts: Vec<_> = ledger
            .transactions("u1")
            .await
            .unwrap()
            .iter()
            .map(|tx| tx.amount_usd)
            .collect();
        assert_eq!(amounts, vec![30.0, 20.0, 10.0]);
    }

    #[tokio::test]
    async fn test_watch_delivers_updates() {
        let ledger = ledger();
        ledger.ensure_account(&identity("u1")).await.unwrap();
        let mut watch = ledger.watch("u1");

        ledger.execute_redeem("u1", "iTunes", 25.0, "CODE").await.unwrap();

        let view = watch.next().await.unwrap();
        assert_eq!(view.account.balances.usd(), 10_025.0);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 100.5 "), Ok(100.5));
        assert_eq!(parse_amount("abc"), Err(Error::InvalidAmount));
        assert_eq!(parse_amount(""), Err(Error::InvalidAmount));
        assert_eq!(parse_amount("0"), Err(Error::InvalidAmount));
        assert_eq!(parse_amount("-1"), Err(Error::InvalidAmount));
        assert_eq!(parse_amount("inf"), Err(Error::InvalidAmount));
    }
}
