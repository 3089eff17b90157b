use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xtrade::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in to an existing account
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show balance and recent activity
    Dashboard,
    /// Show current coin prices
    Market,
    /// Buy a coin with USD
    Buy {
        /// Coin symbol, e.g. BTC
        symbol: String,
        /// USD to spend
        #[arg(required_unless_present = "quantity")]
        amount: Option<String>,
        /// Coin quantity to buy instead of a USD amount
        #[arg(long, conflicts_with = "amount")]
        quantity: Option<String>,
    },
    /// Show where to send a coin to sell it
    Sell {
        /// Coin symbol, e.g. BTC
        symbol: String,
    },
    /// Redeem a gift card for USD
    Redeem {
        /// Card type, e.g. Amazon
        #[arg(long)]
        card: String,
        /// Face value in USD
        #[arg(long)]
        amount: String,
        /// Card code
        #[arg(long)]
        code: String,
    },
    /// Show holdings and transaction history
    Wallet,
    /// Talk to support
    #[command(subcommand)]
    Chat(ChatCommands),
    /// Keep the dashboard open with live updates
    Watch,
    /// Admin views
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Send a message
    Send { text: String },
    /// Show the conversation
    Show,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List all users
    Users,
    /// List support chats, or show one
    Chats {
        /// Account id whose chat to show
        #[arg(long)]
        account: Option<String>,
    },
    /// Reply in a user's support chat
    Reply { account: String, text: String },
}

impl From<Commands> for xtrade::AppCommand {
    fn from(cmd: Commands) -> xtrade::AppCommand {
        match cmd {
            Commands::Signup { email, password } => xtrade::AppCommand::Signup { email, password },
            Commands::Login { email, password } => xtrade::AppCommand::Login { email, password },
            Commands::Logout => xtrade::AppCommand::Logout,
            Commands::Dashboard => xtrade::AppCommand::Dashboard,
            Commands::Market => xtrade::AppCommand::Market,
            Commands::Buy {
                symbol,
                amount,
                quantity,
            } => xtrade::AppCommand::Buy {
                symbol,
                amount: match (amount, quantity) {
                    (_, Some(quantity)) => xtrade::BuyAmount::Quantity(quantity),
                    (amount, None) => xtrade::BuyAmount::Usd(amount.unwrap_or_default()),
                },
            },
            Commands::Sell { symbol } => xtrade::AppCommand::Sell { symbol },
            Commands::Redeem { card, amount, code } => {
                xtrade::AppCommand::Redeem { card, amount, code }
            }
            Commands::Wallet => xtrade::AppCommand::Wallet,
            Commands::Chat(ChatCommands::Send { text }) => xtrade::AppCommand::ChatSend { text },
            Commands::Chat(ChatCommands::Show) => xtrade::AppCommand::ChatShow,
            Commands::Watch => xtrade::AppCommand::Watch,
            Commands::Admin(AdminCommands::Users) => xtrade::AppCommand::AdminUsers,
            Commands::Admin(AdminCommands::Chats { account }) => {
                xtrade::AppCommand::AdminChats { account_id: account }
            }
            Commands::Admin(AdminCommands::Reply { account, text }) => {
                xtrade::AppCommand::AdminReply {
                    account_id: account,
                    text,
                }
            }
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => xtrade::cli::setup::setup_at_path(path),
            None => xtrade::cli::setup::setup(),
        },
        Some(cmd) => xtrade::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
