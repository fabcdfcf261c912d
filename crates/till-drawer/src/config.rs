//! # Drawer Configuration
//!
//! Configuration management for a cash drawer terminal.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_DEVICE_ID=pos-01                                              │
//! │     TILL_TIP_PERCENT=10                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/till.toml (Linux)                                    │
//! │     ~/Library/Application Support/com.till.pos/till.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     COP drawer, 10% suggested tip, auto-generated device id            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # till.toml
//! [device]
//! id = "pos-01"
//! name = "Bar register"
//!
//! [currency]
//! code = "COP"
//! symbol = "$"
//! decimals = 0
//! bills = [100000, 50000, 20000, 10000, 5000, 2000]
//! coins = [1000, 500]
//!
//! [settlement]
//! default_tip_bps = 1000
//! max_split_parts = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use till_core::denomination::DenominationSet;
use till_core::validation::validate_tip_bps;
use till_core::{Money, TipRate, MAX_SPLIT_PARTS};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DrawerError, DrawerResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier. Auto-generated when missing.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable name printed on tickets.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Register 1".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Currency Configuration
// =============================================================================

/// Currency and the bills/coins the drawer holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// ISO 4217 code.
    #[serde(default = "default_currency_code")]
    pub code: String,

    /// Display symbol.
    #[serde(default = "default_currency_symbol")]
    pub symbol: String,

    /// Decimal places of the smallest unit (0 for COP, 2 for USD).
    #[serde(default)]
    pub decimals: u8,

    /// Bill face values in smallest units.
    #[serde(default = "default_bills")]
    pub bills: Vec<i64>,

    /// Coin face values in smallest units.
    #[serde(default = "default_coins")]
    pub coins: Vec<i64>,
}

fn default_currency_code() -> String {
    "COP".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_bills() -> Vec<i64> {
    DenominationSet::cop().bills
}

fn default_coins() -> Vec<i64> {
    DenominationSet::cop().coins
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig {
            code: default_currency_code(),
            symbol: default_currency_symbol(),
            decimals: 0,
            bills: default_bills(),
            coins: default_coins(),
        }
    }
}

// =============================================================================
// Settlement Settings
// =============================================================================

/// Bill-splitting and tip behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Tip suggested when a settlement starts, in basis points.
    #[serde(default = "default_tip_bps")]
    pub default_tip_bps: u32,

    /// Largest split this terminal accepts (never above the core limit).
    #[serde(default = "default_max_split_parts")]
    pub max_split_parts: u32,
}

fn default_tip_bps() -> u32 {
    1000 // 10%
}

fn default_max_split_parts() -> u32 {
    20
}

impl Default for SettlementSettings {
    fn default() -> Self {
        SettlementSettings {
            default_tip_bps: default_tip_bps(),
            max_split_parts: default_max_split_parts(),
        }
    }
}

// =============================================================================
// Main Drawer Configuration
// =============================================================================

/// Complete drawer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawerConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub currency: CurrencyConfig,

    #[serde(default)]
    pub settlement: SettlementSettings,
}

impl DrawerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (till.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DrawerResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading drawer config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load drawer config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(contents: &str) -> DrawerResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DrawerResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(DrawerError::InvalidConfig("device id must not be empty".into()));
        }

        let code = &self.currency.code;
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DrawerError::InvalidConfig(format!(
                "currency code must be 3 uppercase letters, got: {}",
                code
            )));
        }

        if self.currency.decimals > 4 {
            return Err(DrawerError::InvalidConfig(format!(
                "currency decimals must be at most 4, got: {}",
                self.currency.decimals
            )));
        }

        if self.currency.bills.is_empty() && self.currency.coins.is_empty() {
            return Err(DrawerError::InvalidConfig(
                "at least one bill or coin is required".into(),
            ));
        }
        self.denomination_set()?;

        validate_tip_bps(self.settlement.default_tip_bps)
            .map_err(|e| DrawerError::InvalidConfig(e.to_string()))?;

        let parts = self.settlement.max_split_parts;
        if !(2..=MAX_SPLIT_PARTS).contains(&parts) {
            return Err(DrawerError::InvalidConfig(format!(
                "max_split_parts must be between 2 and {}, got: {}",
                MAX_SPLIT_PARTS, parts
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("TILL_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = var("TILL_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(code) = var("TILL_CURRENCY") {
            debug!(currency = %code, "Overriding currency code from environment");
            self.currency.code = code.to_uppercase();
        }

        if let Some(pct) = var("TILL_TIP_PERCENT") {
            match pct.trim().parse::<u32>() {
                Ok(p) if p <= 100 => self.settlement.default_tip_bps = TipRate::from_percent(p).bps(),
                _ => warn!(value = %pct, "Ignoring invalid TILL_TIP_PERCENT"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("till.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// The configured bills and coins as a validated set.
    pub fn denomination_set(&self) -> DrawerResult<DenominationSet> {
        DenominationSet::new(
            self.currency.code.clone(),
            self.currency.bills.clone(),
            self.currency.coins.clone(),
        )
        .map_err(|e| DrawerError::InvalidConfig(e.to_string()))
    }

    /// Suggested tip rate for new settlements.
    pub fn default_tip_rate(&self) -> TipRate {
        TipRate::from_bps(self.settlement.default_tip_bps)
    }

    /// Formats an amount for display, e.g. `$170,000` or `-$12.34`.
    pub fn format_currency(&self, amount: Money) -> String {
        let units = amount.units();
        let divisor = 10_i64.pow(self.currency.decimals as u32);
        let whole = group_thousands((units / divisor).abs());
        let sign = if units < 0 { "-" } else { "" };

        if self.currency.decimals == 0 {
            format!("{}{}{}", sign, self.currency.symbol, whole)
        } else {
            format!(
                "{}{}{}.{:0width$}",
                sign,
                self.currency.symbol,
                whole,
                (units % divisor).abs(),
                width = self.currency.decimals as usize
            )
        }
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
