//! Configuration loading and representation.
//!
//! Values come from environment variables; anything missing or unparsable falls back
//! to its default with a warning.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockledger_inventory::{ActingUser, DEFAULT_LOW_STOCK_THRESHOLD};

use crate::serial::DEFAULT_SERIAL_ATTEMPTS;
use crate::store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// `INVENTORY_LOW_STOCK_THRESHOLD`
    pub low_stock_threshold: i64,
    /// `INVENTORY_DEFAULT_ACTOR`: recorded when a request carries no acting user.
    pub default_actor: String,
    /// `INVENTORY_PAGE_SIZE`
    pub page_size: i64,
    /// `INVENTORY_MAX_PAGE_SIZE`
    pub max_page_size: i64,
    /// `INVENTORY_SERIAL_ATTEMPTS`
    pub serial_attempts: u32,
    /// `DATABASE_URL`
    pub database_url: Option<String>,
    /// `USE_PERSISTENT_STORES`
    pub use_persistent_stores: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            default_actor: ActingUser::ANONYMOUS.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            serial_attempts: DEFAULT_SERIAL_ATTEMPTS,
            database_url: None,
            use_persistent_stores: false,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, fallback = %default, "ignoring unparsable setting");
                default
            }
        },
    }
}

impl InventoryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut page_size = parse_or(&lookup, "INVENTORY_PAGE_SIZE", defaults.page_size);
        let max_page_size = parse_or(&lookup, "INVENTORY_MAX_PAGE_SIZE", defaults.max_page_size)
            .max(1);
        if page_size <= 0 || page_size > max_page_size {
            tracing::warn!(page_size, max_page_size, "page size out of range; using default");
            page_size = defaults.page_size.min(max_page_size);
        }

        let default_actor = lookup("INVENTORY_DEFAULT_ACTOR")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or(defaults.default_actor);

        let database_url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty());
        let use_persistent_stores = parse_or(&lookup, "USE_PERSISTENT_STORES", false);
        if use_persistent_stores && database_url.is_none() {
            tracing::warn!("USE_PERSISTENT_STORES=true but DATABASE_URL not set; using in-memory stores");
        }

        Self {
            low_stock_threshold: parse_or(
                &lookup,
                "INVENTORY_LOW_STOCK_THRESHOLD",
                defaults.low_stock_threshold,
            ),
            default_actor,
            page_size,
            max_page_size,
            serial_attempts: parse_or(&lookup, "INVENTORY_SERIAL_ATTEMPTS", defaults.serial_attempts)
                .max(1),
            use_persistent_stores: use_persistent_stores && database_url.is_some(),
            database_url,
        }
    }

    pub fn default_actor(&self) -> ActingUser {
        ActingUser::new(self.default_actor.clone())
    }
}
