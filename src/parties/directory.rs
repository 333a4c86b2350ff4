//! Buyer and vendor master records

use tracing::info;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_name, validate_optional_gstin};

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Directory of the parties the business trades with
pub struct PartyDirectory<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> PartyDirectory<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Add a buyer with a unique name
    pub async fn create_buyer(&mut self, buyer: NewBuyer) -> BillingResult<Buyer> {
        validate_name("Buyer", &buyer.name)?;
        validate_optional_gstin(buyer.gstin.as_deref())?;

        let buyer = NewBuyer {
            name: buyer.name.trim().to_string(),
            gstin: trimmed(buyer.gstin),
            address: trimmed(buyer.address),
            phone: trimmed(buyer.phone),
            email: trimmed(buyer.email),
            state: trimmed(buyer.state),
        };

        if self.storage.find_buyer_by_name(&buyer.name).await?.is_some() {
            return Err(BillingError::Validation(format!(
                "Buyer '{}' already exists",
                buyer.name
            )));
        }

        let id = self.storage.insert_buyer(&buyer).await?;
        info!("Created buyer '{}' ({})", buyer.name, id);
        Ok(buyer.into_buyer(id))
    }

    pub async fn update_buyer(&mut self, buyer: Buyer) -> BillingResult<Buyer> {
        validate_name("Buyer", &buyer.name)?;
        validate_optional_gstin(buyer.gstin.as_deref())?;

        let buyer = Buyer {
            name: buyer.name.trim().to_string(),
            gstin: trimmed(buyer.gstin),
            address: trimmed(buyer.address),
            phone: trimmed(buyer.phone),
            email: trimmed(buyer.email),
            state: trimmed(buyer.state),
            ..buyer
        };

        if let Some(other) = self.storage.find_buyer_by_name(&buyer.name).await? {
            if other.id != buyer.id {
                return Err(BillingError::Validation(format!(
                    "Buyer '{}' already exists",
                    buyer.name
                )));
            }
        }

        self.storage.update_buyer(&buyer).await?;
        info!("Updated buyer '{}' ({})", buyer.name, buyer.id);
        Ok(buyer)
    }

    pub async fn get_buyer(&self, buyer_id: RecordId) -> BillingResult<Option<Buyer>> {
        self.storage.get_buyer(buyer_id).await
    }

    pub async fn find_buyer(&self, name: &str) -> BillingResult<Option<Buyer>> {
        self.storage.find_buyer_by_name(name.trim()).await
    }

    pub async fn list_buyers(&self) -> BillingResult<Vec<Buyer>> {
        self.storage.list_buyers().await
    }

    /// Delete a buyer that has never been invoiced
    pub async fn delete_buyer(&mut self, buyer_id: RecordId) -> BillingResult<()> {
        self.storage.delete_buyer(buyer_id).await?;
        info!("Deleted buyer {}", buyer_id);
        Ok(())
    }

    /// Add a vendor with a unique name
    pub async fn create_vendor(&mut self, vendor: NewVendor) -> BillingResult<Vendor> {
        validate_name("Vendor", &vendor.name)?;
        validate_optional_gstin(vendor.gstin.as_deref())?;

        let vendor = NewVendor {
            name: vendor.name.trim().to_string(),
            gstin: trimmed(vendor.gstin),
            address: trimmed(vendor.address),
            phone: trimmed(vendor.phone),
            email: trimmed(vendor.email),
        };

        if self
            .storage
            .find_vendor_by_name(&vendor.name)
            .await?
            .is_some()
        {
            return Err(BillingError::Validation(format!(
                "Vendor '{}' already exists",
                vendor.name
            )));
        }

        let id = self.storage.insert_vendor(&vendor).await?;
        info!("Created vendor '{}' ({})", vendor.name, id);
        Ok(vendor.into_vendor(id))
    }

    pub async fn update_vendor(&mut self, vendor: Vendor) -> BillingResult<Vendor> {
        validate_name("Vendor", &vendor.name)?;
        validate_optional_gstin(vendor.gstin.as_deref())?;

        let vendor = Vendor {
            name: vendor.name.trim().to_string(),
            gstin: trimmed(vendor.gstin),
            address: trimmed(vendor.address),
            phone: trimmed(vendor.phone),
            email: trimmed(vendor.email),
            ..vendor
        };

        if let Some(other) = self.storage.find_vendor_by_name(&vendor.name).await? {
            if other.id != vendor.id {
                return Err(BillingError::Validation(format!(
                    "Vendor '{}' already exists",
                    vendor.name
                )));
            }
        }

        self.storage.update_vendor(&vendor).await?;
        info!("Updated vendor '{}' ({})", vendor.name, vendor.id);
        Ok(vendor)
    }

    pub async fn get_vendor(&self, vendor_id: RecordId) -> BillingResult<Option<Vendor>> {
        self.storage.get_vendor(vendor_id).await
    }

    pub async fn find_vendor(&self, name: &str) -> BillingResult<Option<Vendor>> {
        self.storage.find_vendor_by_name(name.trim()).await
    }

    pub async fn list_vendors(&self) -> BillingResult<Vec<Vendor>> {
        self.storage.list_vendors().await
    }

    /// Delete a vendor with no purchase bills
    pub async fn delete_vendor(&mut self, vendor_id: RecordId) -> BillingResult<()> {
        self.storage.delete_vendor(vendor_id).await?;
        info!("Deleted vendor {}", vendor_id);
        Ok(())
    }
}
