use super::ui;
use crate::App;
use crate::core::account::Account;
use crate::core::market::CoinSnapshot;
use crate::core::transaction::Transaction;
use crate::ledger::{AccountView, AccountWatch};
use crate::valuation;
use anyhow::Result;
use comfy_table::Cell;
use tracing::{debug, info, warn};

const SPARKLINE_WIDTH: usize = 24;
const RECENT_TRANSACTIONS: usize = 5;

/// Refreshes the feed behind a spinner. A failed refresh is reported and the
/// last known snapshot (possibly empty) is used.
pub async fn load_market(app: &App) -> Vec<CoinSnapshot> {
    let pb = ui::new_spinner("Loading market data...");
    let result = app.feed.refresh().await;
    pb.finish_and_clear();

    if let Err(e) = result {
        print_feed_error(&e.to_string());
    }
    app.feed.snapshots().await
}

fn print_feed_error(message: &str) {
    println!(
        "{} {}",
        ui::style_text(message, ui::StyleType::Error),
        ui::style_text("Run `xtrade market` to retry.", ui::StyleType::Subtle)
    );
}

pub fn market_table(snapshots: &[CoinSnapshot]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Coin"),
        ui::header_cell("Symbol"),
        ui::header_cell("Price"),
        ui::header_cell("24h"),
        ui::header_cell("7d"),
    ]);

    for (rank, coin) in snapshots.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(&coin.name),
            Cell::new(&coin.symbol),
            ui::right_cell(ui::price(coin.price_usd)),
            ui::change_cell(coin.change),
            Cell::new(ui::sparkline(&coin.sparkline, SPARKLINE_WIDTH)),
        ]);
    }
    table.to_string()
}

pub async fn market(app: &App) -> Result<()> {
    let snapshots = load_market(app).await;
    if snapshots.is_empty() {
        println!("No market data available.");
        return Ok(());
    }
    println!("\n{}", ui::style_text("Market", ui::StyleType::Title));
    println!("{}", market_table(&snapshots));
    Ok(())
}

pub fn recent_transactions_table(transactions: &[Transaction]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("When"),
        ui::header_cell("Type"),
        ui::header_cell("Asset"),
        ui::header_cell("USD"),
    ]);
    for tx in transactions {
        table.add_row(vec![
            Cell::new(
                tx.timestamp
                    .map_or_else(|| "Pending".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
            ),
            Cell::new(tx.kind),
            Cell::new(&tx.asset),
            ui::right_cell(ui::usd(tx.amount_usd)),
        ]);
    }
    table.to_string()
}

fn render_dashboard(view: &AccountView, snapshots: &[CoinSnapshot], feed_error: Option<&str>) {
    let balances = &view.account.balances;
    println!(
        "\n{} {}",
        ui::style_text("Welcome back,", ui::StyleType::TotalLabel),
        view.account.email
    );
    println!(
        "{} {}",
        ui::style_text("Total balance:", ui::StyleType::TotalLabel),
        ui::style_text(
            &ui::usd(valuation::display_net_worth(balances, snapshots)),
            ui::StyleType::TotalValue
        )
    );
    println!(
        "{} {}",
        ui::style_text("Cash:", ui::StyleType::TotalLabel),
        ui::usd(balances.usd())
    );
    if let Some(message) = feed_error {
        print_feed_error(message);
    }

    if view.transactions.is_empty() {
        println!(
            "\n{}",
            ui::style_text("No transactions yet.", ui::StyleType::Subtle)
        );
    } else {
        println!(
            "\n{}",
            ui::style_text("Recent activity", ui::StyleType::Title)
        );
        let recent = &view.transactions[..view.transactions.len().min(RECENT_TRANSACTIONS)];
        println!("{}", recent_transactions_table(recent));
    }
}

pub async fn dashboard(app: &App, account: &Account) -> Result<()> {
    let (view, snapshots) = futures::join!(app.ledger.view(&account.id), load_market(app));
    let view = view?;
    render_dashboard(&view, &snapshots, None);
    Ok(())
}

/// Reads the account again so a redraw never shows balances older than the
/// store. Keeps the last view if the read fails.
async fn reread_view(account_watch: &AccountWatch, last: AccountView) -> AccountView {
    match account_watch.current().await {
        Ok(view) => view,
        Err(e) => {
            warn!(error = %e, "Could not re-read account, showing last known balances");
            last
        }
    }
}

/// Keeps the dashboard on screen, redrawing on every account change and feed
/// refresh until interrupted.
pub async fn watch(app: &App, account: &Account) -> Result<()> {
    let mut ticks = app.feed.subscribe();
    let mut account_watch = app.ledger.watch(&account.id);
    let _feed = app.feed.start(app.config.refresh_interval());
    info!(interval = ?app.config.refresh_interval(), "Watching dashboard, press Ctrl-C to stop");

    let mut view = account_watch.current().await?;
    loop {
        tokio::select! {
            changed = ticks.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("Market refreshed");
                view = reread_view(&account_watch, view).await;
            }
            next = account_watch.next() => match next {
                Some(updated) => view = updated,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        let snapshots = app.feed.snapshots().await;
        let feed_error = app.feed.error().await;
        ui::print_separator();
        render_dashboard(&view, &snapshots, feed_error.as_deref());
    }
    Ok(())
}
