use super::market::load_market;
use super::ui;
use crate::core::Error;
use crate::core::account::{Account, round_to};
use crate::core::market::find_by_symbol;
use crate::ledger::{GIFT_CARDS, parse_amount};
use crate::{App, BuyAmount};
use anyhow::{Result, bail};

/// USD to spend for `amount` at `price_usd`. A quantity is priced to the cent
/// and must still come to at least one cent.
pub fn usd_to_spend(amount: &BuyAmount, price_usd: f64) -> Result<f64, Error> {
    match amount {
        BuyAmount::Usd(usd) => parse_amount(usd),
        BuyAmount::Quantity(quantity) => {
            let usd = round_to(parse_amount(quantity)? * price_usd, 2);
            if usd.is_finite() && usd > 0.0 {
                Ok(usd)
            } else {
                Err(Error::InvalidAmount)
            }
        }
    }
}

pub async fn buy(app: &App, account: &Account, symbol: &str, amount: &BuyAmount) -> Result<()> {
    // Malformed input fails before the market is loaded.
    let (BuyAmount::Usd(input) | BuyAmount::Quantity(input)) = amount;
    parse_amount(input)?;
    let snapshots = load_market(app).await;
    let coin = find_by_symbol(&snapshots, symbol).ok_or(Error::InvalidPrice)?;
    let usd_amount = usd_to_spend(amount, coin.price_usd)?;

    let receipt = app
        .ledger
        .execute_buy(&account.id, &coin.symbol, usd_amount, coin.price_usd)
        .await?;

    println!("{}", ui::style_text(&receipt.message, ui::StyleType::Success));
    println!(
        "{} {} at {} per {}",
        ui::style_text("Paid", ui::StyleType::Subtle),
        ui::usd(usd_amount),
        ui::price(coin.price_usd),
        coin.symbol
    );
    println!(
        "{} {}",
        ui::style_text("Remaining cash:", ui::StyleType::TotalLabel),
        ui::usd(receipt.balances.usd())
    );
    Ok(())
}

/// Prints where to send the asset. Nothing is recorded.
pub fn sell(app: &App, symbol: &str) -> Result<()> {
    let instructions = app.ledger.initiate_sell(symbol);

    println!(
        "\n{}",
        ui::style_text(&format!("Sell {}", instructions.asset), ui::StyleType::Title)
    );
    println!(
        "Send your {} to this address:\n\n  {}\n",
        instructions.asset,
        ui::style_text(instructions.address_or_notice(), ui::StyleType::TotalLabel)
    );
    println!("{}", ui::style_text(&instructions.warning(), ui::StyleType::Error));
    Ok(())
}

/// Canonical gift card name for user input, if it is one we accept.
pub fn gift_card(input: &str) -> Option<&'static str> {
    GIFT_CARDS
        .iter()
        .find(|card| card.eq_ignore_ascii_case(input.trim()))
        .copied()
}

pub async fn redeem(
    app: &App,
    account: &Account,
    card: &str,
    amount: &str,
    code: &str,
) -> Result<()> {
    let Some(card) = gift_card(card) else {
        bail!("Unknown gift card. Choose one of: {}", GIFT_CARDS.join(", "));
    };
    let usd_amount = parse_amount(amount)?;

    let receipt = app
        .ledger
        .execute_redeem(&account.id, card, usd_amount, code)
        .await?;

    println!("{}", ui::style_text(&receipt.message, ui::StyleType::Success));
    println!(
        "{} {}",
        ui::style_text("Cash balance:", ui::StyleType::TotalLabel),
        ui::usd(receipt.balances.usd())
    );
    Ok(())
}
