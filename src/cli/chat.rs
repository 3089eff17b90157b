use super::ui;
use crate::App;
use crate::core::account::Account;
use crate::support::ChatMessage;
use anyhow::Result;

/// One transcript line, labelled from the point of view of `account_id`.
pub fn format_message(message: &ChatMessage, account_id: &str) -> String {
    let who = if message.is_from_support(account_id) {
        ui::style_text("Support", ui::StyleType::TotalLabel)
    } else {
        ui::style_text("You", ui::StyleType::Success)
    };
    let when = message
        .timestamp
        .map_or_else(|| "sending".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    format!("{} {}: {}", ui::style_text(&when, ui::StyleType::Subtle), who, message.text)
}

pub fn print_transcript(messages: &[ChatMessage], account_id: &str) {
    if messages.is_empty() {
        println!("{}", ui::style_text("No messages yet.", ui::StyleType::Subtle));
    }
    for message in messages {
        println!("{}", format_message(message, account_id));
    }
}

pub async fn send(app: &App, account: &Account, text: &str) -> Result<()> {
    let message = app.support.send_message(&account.id, &account.id, text).await?;
    println!("{}", format_message(&message, &account.id));
    Ok(())
}

pub async fn show(app: &App, account: &Account) -> Result<()> {
    let messages = app.support.messages(&account.id).await?;
    println!("\n{}", ui::style_text("Support chat", ui::StyleType::Title));
    print_transcript(&messages, &account.id);
    Ok(())
}
