//! Terminal rendering for each command.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod market;
pub mod setup;
pub mod trade;
pub mod ui;
pub mod wallet;
