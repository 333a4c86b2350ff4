//! Application settings: company identity, bank details and invoice options
//!
//! Settings are loaded once at startup and handed to the managers that need
//! them. They only change through [`SettingsStore::update`], which writes the
//! file and reloads it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::tax::gst::state_code;
use crate::types::{BillingError, BillingResult};

/// Invoice prefix used when none is configured
pub const DEFAULT_INVOICE_PREFIX: &str = "INV-";

/// Seller details printed on every invoice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyInfo {
    pub name: String,
    /// Seller GSTIN; its state code decides intra- vs inter-state supply
    pub gstin: String,
    pub pan: String,
    pub address_line1: String,
    pub address_line2: String,
    pub phone: String,
    pub email: String,
    pub website: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_no: String,
    pub ifsc_code: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    pub invoice_prefix: String,
    pub terms_and_conditions: String,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            terms_and_conditions: String::new(),
        }
    }
}

/// Complete settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub company_info: CompanyInfo,
    pub bank_details: BankDetails,
    pub invoice_settings: InvoiceSettings,
}

impl Settings {
    /// Read settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> BillingResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            BillingError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_json(&raw)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> BillingResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| BillingError::Config(format!("settings are corrupted: {}", e)))
    }

    /// Write settings as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> BillingResult<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| BillingError::Config(e.to_string()))?;
        fs::write(path, raw).map_err(|e| {
            BillingError::Config(format!("cannot write {}: {}", path.display(), e))
        })
    }

    pub fn seller_gstin(&self) -> &str {
        self.company_info.gstin.trim()
    }

    pub fn seller_state_code(&self) -> &str {
        state_code(&self.company_info.gstin)
    }

    /// Configured invoice prefix, falling back to `INV-` when blank
    pub fn invoice_prefix(&self) -> &str {
        let prefix = self.invoice_settings.invoice_prefix.trim();
        if prefix.is_empty() {
            DEFAULT_INVOICE_PREFIX
        } else {
            prefix
        }
    }

    /// Terms and conditions, one entry per line
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.invoice_settings
            .terms_and_conditions
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }
}

/// Settings bound to the file they were loaded from
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    current: Settings,
}

impl SettingsStore {
    /// Load the settings file at startup
    pub fn open(path: impl Into<PathBuf>) -> BillingResult<Self> {
        let path = path.into();
        let current = Settings::load(&path)?;
        info!("Settings loaded from {}", path.display());
        Ok(Self { path, current })
    }

    pub fn settings(&self) -> &Settings {
        &self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist new settings and reload them from disk
    pub fn update(&mut self, settings: Settings) -> BillingResult<&Settings> {
        settings.save(&self.path)?;
        self.current = Settings::load(&self.path)?;
        info!("Settings saved to {}", self.path.display());
        Ok(&self.current)
    }
}
