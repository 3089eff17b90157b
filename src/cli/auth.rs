use super::ui;
use crate::core::account::SEED_USD_BALANCE;
use crate::{App, AppCommand};
use anyhow::{Result, bail};

/// Session commands: sign up, sign in and sign out.
pub async fn run(app: &App, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Signup { email, password } => {
            let identity = app.identity.create_account(&email, &password).await?;
            let account = app.ledger.ensure_account(&identity).await?;
            println!(
                "{} Your account starts with {}.",
                ui::style_text(&format!("Welcome, {}!", account.email), ui::StyleType::Success),
                ui::usd(SEED_USD_BALANCE)
            );
        }
        AppCommand::Login { email, password } => {
            let identity = app.identity.authenticate(&email, &password).await?;
            let account = app.ledger.ensure_account(&identity).await?;
            println!(
                "{}",
                ui::style_text(&format!("Signed in as {}.", account.email), ui::StyleType::Success)
            );
        }
        AppCommand::Logout => {
            app.identity.end_session().await?;
            println!("Signed out.");
        }
        other => bail!("{other:?} is not a session command"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::testing::{OfflineMarket, app_with};
    use std::sync::Arc;

    fn login(email: &str, password: &str) -> AppCommand {
        AppCommand::Login {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_logout_login() {
        let app = app_with(Arc::new(OfflineMarket)).await;
        run(
            &app,
            AppCommand::Signup {
                email: "new@example.com".to_string(),
                password: "secret1".to_string(),
            },
        )
        .await
        .unwrap();
        let account = app.session().await.unwrap().unwrap();
        assert_eq!(account.balances.usd(), SEED_USD_BALANCE);

        run(&app, AppCommand::Logout).await.unwrap();
        assert!(app.session().await.unwrap().is_none());

        let err = run(&app, login("new@example.com", "wrong1")).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::AuthFailure("Invalid email or password.".to_string()))
        );

        run(&app, login("new@example.com", "secret1")).await.unwrap();
        assert_eq!(app.session().await.unwrap().unwrap().id, account.id);
    }
}
