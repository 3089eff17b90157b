//! Picks the screen to show from the session and the requested page.

use crate::core::account::Account;
use std::fmt::Display;

/// Page names a user can ask for, regardless of role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Crypto,
    GiftCards,
    Wallet,
    Chat,
    Users,
    Chats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPage {
    Dashboard,
    Crypto,
    GiftCards,
    Wallet,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPage {
    Dashboard,
    Users,
    Chats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Auth,
    User(UserPage),
    Admin(AdminPage),
}

impl View {
    /// The page this view renders; `None` for the sign-in screen.
    pub fn page(&self) -> Option<Page> {
        match self {
            View::Auth => None,
            View::User(UserPage::Dashboard) | View::Admin(AdminPage::Dashboard) => {
                Some(Page::Dashboard)
            }
            View::User(UserPage::Crypto) => Some(Page::Crypto),
            View::User(UserPage::GiftCards) => Some(Page::GiftCards),
            View::User(UserPage::Wallet) => Some(Page::Wallet),
            View::User(UserPage::Chat) => Some(Page::Chat),
            View::Admin(AdminPage::Users) => Some(Page::Users),
            View::Admin(AdminPage::Chats) => Some(Page::Chats),
        }
    }
}

impl Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::Auth => write!(f, "sign in"),
            View::User(page) => write!(f, "{page:?}"),
            View::Admin(page) => write!(f, "admin {page:?}"),
        }
    }
}

/// Admins only ever see admin pages and users only user pages. A request
/// outside the caller's role lands on that role's dashboard.
pub fn route(session: Option<&Account>, requested: Page) -> View {
    let Some(account) = session else {
        return View::Auth;
    };

    if account.is_admin {
        View::Admin(match requested {
            Page::Users => AdminPage::Users,
            Page::Chats => AdminPage::Chats,
            _ => AdminPage::Dashboard,
        })
    } else {
        View::User(match requested {
            Page::Crypto => UserPage::Crypto,
            Page::GiftCards => UserPage::GiftCards,
            Page::Wallet => UserPage::Wallet,
            Page::Chat => UserPage::Chat,
            _ => UserPage::Dashboard,
        })
    }
}
