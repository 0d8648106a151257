//! Ledger configuration, read from the environment
use super::store::SledStore;
use anyhow::Context;
use std::path::PathBuf;

pub const DEFAULT_CREDIT_THRESHOLD: i64 = 50_000;
pub const DEFAULT_REFERENCE_HRP: &str = "cbr";
pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    /// Requests with a credit amount below this are created cancelled.
    pub credit_threshold: i64,
    /// bech32 human readable part of carrier booking references.
    pub reference_hrp: String,
    pub default_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./booking-ledger.db"),
            credit_threshold: DEFAULT_CREDIT_THRESHOLD,
            reference_hrp: DEFAULT_REFERENCE_HRP.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("BOOKING_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BOOKING_LEDGER_CREDIT_THRESHOLD") {
            config.credit_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("BOOKING_LEDGER_CREDIT_THRESHOLD={raw:?} is not an integer"))?;
            anyhow::ensure!(
                config.credit_threshold >= 0,
                "BOOKING_LEDGER_CREDIT_THRESHOLD must not be negative"
            );
        }
        if let Some(hrp) = lookup("BOOKING_LEDGER_REFERENCE_HRP") {
            bech32::Hrp::parse(&hrp)
                .with_context(|| format!("BOOKING_LEDGER_REFERENCE_HRP={hrp:?} is not a valid bech32 prefix"))?;
            config.reference_hrp = hrp;
        }
        if let Some(raw) = lookup("BOOKING_LEDGER_PAGE_SIZE") {
            config.default_page_size = raw
                .trim()
                .parse()
                .with_context(|| format!("BOOKING_LEDGER_PAGE_SIZE={raw:?} is not a positive integer"))?;
            anyhow::ensure!(
                config.default_page_size > 0,
                "BOOKING_LEDGER_PAGE_SIZE must be greater than zero"
            );
        }

        Ok(config)
    }

    pub fn open_store(&self) -> anyhow::Result<SledStore> {
        SledStore::open(&self.data_dir)
            .with_context(|| format!("failed to open ledger at {}", self.data_dir.display()))
    }
}
