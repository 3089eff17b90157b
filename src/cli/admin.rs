use super::chat::print_transcript;
use super::ui;
use crate::App;
use crate::core::account::Account;
use crate::support::ChannelSummary;
use anyhow::Result;
use comfy_table::Cell;

pub fn users_table(accounts: &[Account]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Email"),
        ui::header_cell("Account"),
        ui::header_cell("Cash"),
        ui::header_cell("Assets"),
        ui::header_cell("Role"),
    ]);
    for account in accounts {
        let assets: Vec<String> = account
            .balances
            .assets()
            .map(|(code, qty)| format!("{qty:.8} {code}"))
            .collect();
        table.add_row(vec![
            Cell::new(&account.email),
            Cell::new(&account.id),
            ui::right_cell(ui::usd(account.balances.usd())),
            Cell::new(assets.join("\n")),
            Cell::new(if account.is_admin { "admin" } else { "user" }),
        ]);
    }
    table.to_string()
}

pub fn channels_table(channels: &[ChannelSummary], accounts: &[Account]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Email"),
        ui::header_cell("Last message"),
    ]);
    for channel in channels {
        let email = accounts
            .iter()
            .find(|a| a.id == channel.account_id)
            .map_or("unknown", |a| a.email.as_str());
        table.add_row(vec![
            Cell::new(&channel.account_id),
            Cell::new(email),
            ui::format_optional_cell(channel.updated_at, |t| {
                t.format("%Y-%m-%d %H:%M").to_string()
            }),
        ]);
    }
    table.to_string()
}

pub async fn dashboard(app: &App) -> Result<()> {
    let (accounts, channels) = futures::try_join!(app.ledger.accounts(), app.support.channels())?;
    let total_cash: f64 = accounts.iter().map(|a| a.balances.usd()).sum();

    println!("\n{}", ui::style_text("Admin dashboard", ui::StyleType::Title));
    println!(
        "{} {}",
        ui::style_text("Users:", ui::StyleType::TotalLabel),
        accounts.len()
    );
    println!(
        "{} {}",
        ui::style_text("Cash held:", ui::StyleType::TotalLabel),
        ui::usd(total_cash)
    );
    println!(
        "{} {}",
        ui::style_text("Support chats:", ui::StyleType::TotalLabel),
        channels.len()
    );
    Ok(())
}

pub async fn users(app: &App) -> Result<()> {
    let accounts = app.ledger.accounts().await?;
    println!("\n{}", ui::style_text("Users", ui::StyleType::Title));
    println!("{}", users_table(&accounts));
    Ok(())
}

/// Lists every chat, or prints one account's transcript.
pub async fn chats(app: &App, account_id: Option<&str>) -> Result<()> {
    if let Some(account_id) = account_id {
        let messages = app.support.messages(account_id).await?;
        println!(
            "\n{}",
            ui::style_text(&format!("Chat with {account_id}"), ui::StyleType::Title)
        );
        print_transcript(&messages, account_id);
        return Ok(());
    }

    let (channels, accounts) = futures::try_join!(app.support.channels(), app.ledger.accounts())?;
    println!("\n{}", ui::style_text("Support chats", ui::StyleType::Title));
    println!("{}", channels_table(&channels, &accounts));
    Ok(())
}

pub async fn reply(app: &App, admin: &Account, account_id: &str, text: &str) -> Result<()> {
    app.ledger.account(account_id).await?;
    app.support.send_message(account_id, &admin.id, text).await?;
    println!(
        "{}",
        ui::style_text(&format!("Reply sent to {account_id}."), ui::StyleType::Success)
    );
    Ok(())
}
