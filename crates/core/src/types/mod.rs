//! Core types for Depot.
//!
//! This module provides type-safe wrappers and plain records for the
//! storefront domain.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod id;
pub mod money;

pub use account::*;
pub use cart::{Cart, CartLine, CartLineUpdate, NewCartLine, StockConflict};
pub use catalog::*;
pub use checkout::*;
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money};
