use super::market::load_market;
use super::ui;
use crate::App;
use crate::core::account::{Account, USD};
use crate::core::transaction::Transaction;
use crate::valuation::{self, Holding};
use anyhow::Result;
use comfy_table::Cell;

pub fn holdings_table(holdings: &[Holding]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Name"),
        ui::header_cell("Quantity"),
        ui::header_cell("Value"),
    ]);
    for holding in holdings {
        let quantity = if holding.symbol == USD {
            ui::usd(holding.quantity)
        } else {
            format!("{:.8}", holding.quantity)
        };
        table.add_row(vec![
            Cell::new(&holding.symbol),
            Cell::new(&holding.name),
            ui::right_cell(quantity),
            ui::right_cell(ui::usd(holding.value_usd)),
        ]);
    }
    table.to_string()
}

pub fn history_table(transactions: &[Transaction]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Type"),
        ui::header_cell("Asset"),
        ui::header_cell("Quantity"),
        ui::header_cell("USD"),
        ui::header_cell("Price"),
        ui::header_cell("Details"),
    ]);
    for tx in transactions {
        table.add_row(vec![
            Cell::new(
                tx.timestamp
                    .map_or_else(|| "Pending".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            Cell::new(tx.kind),
            Cell::new(&tx.asset),
            ui::format_optional_cell(tx.amount_crypto, |q| format!("{q:.8}")),
            ui::right_cell(ui::usd(tx.amount_usd)),
            ui::format_optional_cell(tx.price_at_transaction, ui::price),
            Cell::new(tx.details.as_deref().unwrap_or("")),
        ]);
    }
    table.to_string()
}

pub async fn run(app: &App, account: &Account) -> Result<()> {
    let (view, snapshots) = futures::join!(app.ledger.view(&account.id), load_market(app));
    let view = view?;
    let balances = &view.account.balances;

    println!("\n{}", ui::style_text("Wallet", ui::StyleType::Title));
    println!("{}", holdings_table(&valuation::holdings(balances, &snapshots)));
    println!(
        "{} {}",
        ui::style_text("Total value:", ui::StyleType::TotalLabel),
        ui::style_text(
            &ui::usd(valuation::net_worth(balances, &snapshots)),
            ui::StyleType::TotalValue
        )
    );

    println!("\n{}", ui::style_text("Transaction history", ui::StyleType::Title));
    if view.transactions.is_empty() {
        println!("{}", ui::style_text("No transactions yet.", ui::StyleType::Subtle));
    } else {
        println!("{}", history_table(&view.transactions));
    }
    Ok(())
}
