pub mod cli;
pub mod core;
pub mod deposit;
pub mod feed;
pub mod identity;
pub mod ledger;
pub mod providers;
pub mod router;
pub mod store;
pub mod support;
pub mod valuation;

pub use crate::core::Error;
pub use crate::core::config;

use crate::core::account::Account;
use crate::core::config::AppConfig;
use crate::core::market::MarketDataProvider;
use crate::core::store::DocumentStore;
use crate::deposit::DepositAddresses;
use crate::feed::MarketFeed;
use crate::identity::{IdentityProvider, LocalIdentityProvider};
use crate::ledger::Ledger;
use crate::providers::coingecko::CoinGeckoProvider;
use crate::router::{AdminPage, Page, View};
use crate::store::DiskStore;
use crate::support::SupportChannel;
use anyhow::{Result, bail};
use std::sync::Arc;
use tracing::{debug, info};

pub const NOT_SIGNED_IN: &str = "You are not signed in. Run `xtrade login` or `xtrade signup` first.";

/// How much of a coin to buy: a USD amount to spend, or a coin quantity
/// priced at the current market rate.
#[derive(Debug, Clone, PartialEq)]
pub enum BuyAmount {
    Usd(String),
    Quantity(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Signup { email: String, password: String },
    Login { email: String, password: String },
    Logout,
    Dashboard,
    Market,
    Buy { symbol: String, amount: BuyAmount },
    Sell { symbol: String },
    Redeem { card: String, amount: String, code: String },
    Wallet,
    ChatSend { text: String },
    ChatShow,
    Watch,
    AdminUsers,
    AdminChats { account_id: Option<String> },
    AdminReply { account_id: String, text: String },
}

impl AppCommand {
    /// Page the command renders on. Session commands have none.
    fn page(&self) -> Option<Page> {
        match self {
            AppCommand::Signup { .. } | AppCommand::Login { .. } | AppCommand::Logout => None,
            AppCommand::Dashboard | AppCommand::Watch => Some(Page::Dashboard),
            AppCommand::Market | AppCommand::Buy { .. } | AppCommand::Sell { .. } => {
                Some(Page::Crypto)
            }
            AppCommand::Redeem { .. } => Some(Page::GiftCards),
            AppCommand::Wallet => Some(Page::Wallet),
            AppCommand::ChatSend { .. } | AppCommand::ChatShow => Some(Page::Chat),
            AppCommand::AdminUsers => Some(Page::Users),
            AppCommand::AdminChats { .. } | AppCommand::AdminReply { .. } => Some(Page::Chats),
        }
    }
}

/// Everything a command handler needs, built once per invocation.
pub struct App {
    pub config: AppConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Ledger,
    pub support: SupportChannel,
    pub feed: Arc<MarketFeed>,
}

impl App {
    pub async fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        market: Arc<dyn MarketDataProvider>,
    ) -> Result<Self> {
        let identity = LocalIdentityProvider::open(Arc::clone(&store)).await?;
        let ledger = Ledger::new(
            Arc::clone(&store),
            DepositAddresses::new(config.deposit_addresses.clone()),
        );
        let support = SupportChannel::new(Arc::clone(&store));
        let feed = Arc::new(MarketFeed::new(market, config.market.coins.clone()));

        Ok(App {
            config,
            identity: Arc::new(identity),
            ledger,
            support,
            feed,
        })
    }

    /// Opens the on-disk store and the configured market data provider.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let store = Arc::new(DiskStore::open(&data_dir)?);
        let market = Arc::new(CoinGeckoProvider::new(config.coingecko_base_url())?);
        Self::new(config, store, market).await
    }

    /// The signed-in account, created with the seed balance on first sight.
    pub async fn session(&self) -> Result<Option<Account>> {
        match self.identity.current().await? {
            Some(identity) => Ok(Some(self.ledger.ensure_account(&identity).await?)),
            None => Ok(None),
        }
    }

    pub async fn execute(&self, command: AppCommand) -> Result<()> {
        let Some(page) = command.page() else {
            return cli::auth::run(self, command).await;
        };

        let account = self.session().await?;
        let view = router::route(account.as_ref(), page);
        debug!(?page, %view, "Routed command");

        let Some(account) = account else {
            bail!(NOT_SIGNED_IN);
        };
        if view.page() != Some(page) {
            bail!("This command is not available for your account. Showing the {view} page instead.");
        }

        match (view, command) {
            (View::Admin(AdminPage::Dashboard), _) => cli::admin::dashboard(self).await,
            (View::Admin(AdminPage::Users), _) => cli::admin::users(self).await,
            (View::Admin(AdminPage::Chats), AppCommand::AdminReply { account_id, text }) => {
                cli::admin::reply(self, &account, &account_id, &text).await
            }
            (View::Admin(AdminPage::Chats), AppCommand::AdminChats { account_id }) => {
                cli::admin::chats(self, account_id.as_deref()).await
            }
            (View::User(_), AppCommand::Dashboard) => cli::market::dashboard(self, &account).await,
            (View::User(_), AppCommand::Watch) => cli::market::watch(self, &account).await,
            (View::User(_), AppCommand::Market) => cli::market::market(self).await,
            (View::User(_), AppCommand::Buy { symbol, amount }) => {
                cli::trade::buy(self, &account, &symbol, &amount).await
            }
            (View::User(_), AppCommand::Sell { symbol }) => cli::trade::sell(self, &symbol),
            (View::User(_), AppCommand::Redeem { card, amount, code }) => {
                cli::trade::redeem(self, &account, &card, &amount, &code).await
            }
            (View::User(_), AppCommand::Wallet) => cli::wallet::run(self, &account).await,
            (View::User(_), AppCommand::ChatSend { text }) => {
                cli::chat::send(self, &account, &text).await
            }
            (View::User(_), AppCommand::ChatShow) => cli::chat::show(self, &account).await,
            (view, command) => bail!("Cannot run {command:?} on the {view} page."),
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xtrade starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::open(config).await?;
    app.execute(command).await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::market::CoinSnapshot;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    pub struct StaticMarket(pub Vec<CoinSnapshot>);

    #[async_trait]
    impl MarketDataProvider for StaticMarket {
        async fn fetch_markets(&self, _coin_ids: &[String]) -> anyhow::Result<Vec<CoinSnapshot>> {
            Ok(self.0.clone())
        }
    }

    pub struct OfflineMarket;

    #[async_trait]
    impl MarketDataProvider for OfflineMarket {
        async fn fetch_markets(&self, _coin_ids: &[String]) -> anyhow::Result<Vec<CoinSnapshot>> {
            Err(anyhow::anyhow!("network unreachable"))
        }
    }

    pub fn coin(symbol: &str, name: &str, price_usd: f64) -> CoinSnapshot {
        CoinSnapshot {
            id: name.to_lowercase(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            image: String::new(),
            price_usd,
            change: Some(2.5),
            sparkline: vec![price_usd * 0.9, price_usd * 1.1, price_usd],
        }
    }

    pub async fn app_with(market: Arc<dyn MarketDataProvider>) -> App {
        App::new(AppConfig::default(), Arc::new(MemoryStore::new()), market)
            .await
            .unwrap()
    }

    /// App with a signed-in user and a small market.
    pub async fn signed_in_app() -> (App, Account) {
        let app = app_with(Arc::new(StaticMarket(vec![
            coin("BTC", "Bitcoin", 60_000.0),
            coin("ETH", "Ethereum", 3_000.0),
        ])))
        .await;
        app.execute(AppCommand::Signup {
            email: "user@example.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();
        let account = app.session().await.unwrap().unwrap();
        (app, account)
    }
}
