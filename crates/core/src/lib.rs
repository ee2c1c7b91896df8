//! Depot Core - Shared types library.
//!
//! This crate provides the records exchanged between the Depot components:
//! - `gateway` - API layer in front of the ERP connector
//! - `client` - Storefront client SDK (HTTP wrapper, location, cart sync)
//! - `cli` - Terminal storefront and maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients. Records mirror the ERP contracts closely; the gateway normalizes
//! ERP JSON into these shapes and the client consumes them verbatim.
//!
//! # Modules
//!
//! - [`types`] - IDs, money, email, cart, catalog, account and checkout records
//! - [`image`] - CDN image URL building

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod image;
pub mod types;

pub use image::{ImageSize, image_url};
pub use types::*;
