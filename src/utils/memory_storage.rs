//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone)]
struct Table<T> {
    last_id: RecordId,
    rows: BTreeMap<RecordId, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn insert(&mut self, build: impl FnOnce(RecordId) -> T) -> RecordId {
        self.last_id += 1;
        let id = self.last_id;
        self.rows.insert(id, build(id));
        id
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    products: Table<Product>,
    buyers: Table<Buyer>,
    vendors: Table<Vendor>,
    invoices: Table<Invoice>,
    invoice_items: Table<InvoiceItem>,
    purchases: Table<Purchase>,
    purchase_payments: Table<PurchasePayment>,
}

impl State {
    fn insert_invoice(
        &mut self,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        if self.buyers.rows.get(&invoice.buyer_id).is_none() {
            return Err(BillingError::BuyerNotFound(invoice.buyer_id.to_string()));
        }
        if self
            .invoices
            .rows
            .values()
            .any(|existing| existing.invoice_no == invoice.invoice_no)
        {
            return Err(BillingError::Validation(format!(
                "Invoice number '{}' already exists",
                invoice.invoice_no
            )));
        }

        let invoice_id = self
            .invoices
            .insert(|id| invoice.clone().into_invoice(id));

        for item in items {
            let product = self
                .products
                .rows
                .get_mut(&item.product_id)
                .ok_or_else(|| BillingError::ProductNotFound(item.product_id.to_string()))?;
            product.stock_qty -= &item.quantity;

            self.invoice_items
                .insert(|id| item.clone().into_item(id, invoice_id));
        }

        Ok(invoice_id)
    }

    fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        let invoice = self
            .invoices
            .rows
            .get_mut(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        if invoice.is_cancelled() {
            return Err(BillingError::InvoiceAlreadyCancelled(
                invoice.invoice_no.clone(),
            ));
        }
        invoice.mark_cancelled();
        let invoice = invoice.clone();

        for item in self
            .invoice_items
            .rows
            .values()
            .filter(|item| item.invoice_id == invoice_id)
        {
            let product = self
                .products
                .rows
                .get_mut(&item.product_id)
                .ok_or_else(|| BillingError::ProductNotFound(item.product_id.to_string()))?;
            product.stock_qty += &item.quantity;
        }

        Ok(invoice)
    }

    fn refresh_purchase(&mut self, purchase_id: RecordId) -> BillingResult<Purchase> {
        let payments = &self.purchase_payments.rows;
        let purchase = self
            .purchases
            .rows
            .get_mut(&purchase_id)
            .ok_or(BillingError::PurchaseNotFound(purchase_id))?;
        purchase.apply_payments(
            payments
                .values()
                .filter(|payment| payment.purchase_id == purchase_id)
                .map(|payment| &payment.amount),
        );
        Ok(purchase.clone())
    }
}

fn duplicate_name(kind: &str, name: &str) -> BillingError {
    BillingError::Validation(format!("{} '{}' already exists", kind, name))
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same data. Every write is applied to a copy of the
/// state that only replaces the shared state once the whole operation has
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> BillingResult<()> {
        self.write(|state| {
            *state = State::default();
            Ok(())
        })
    }

    fn read(&self) -> BillingResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| BillingError::Storage("memory storage lock poisoned".to_string()))
    }

    fn write<T>(&self, apply: impl FnOnce(&mut State) -> BillingResult<T>) -> BillingResult<T> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| BillingError::Storage("memory storage lock poisoned".to_string()))?;
        let mut staged = guard.clone();
        let result = apply(&mut staged)?;
        *guard = staged;
        Ok(result)
    }
}

#[async_trait]
impl BillingStorage for MemoryStorage {
    async fn insert_product(&mut self, product: &NewProduct) -> BillingResult<RecordId> {
        self.write(|state| {
            if state.products.rows.values().any(|p| p.name == product.name) {
                return Err(duplicate_name("Product", &product.name));
            }
            Ok(state.products.insert(|id| product.clone().into_product(id)))
        })
    }

    async fn get_product(&self, product_id: RecordId) -> BillingResult<Option<Product>> {
        Ok(self.read()?.products.rows.get(&product_id).cloned())
    }

    async fn find_product_by_name(&self, name: &str) -> BillingResult<Option<Product>> {
        Ok(self
            .read()?
            .products
            .rows
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_products(&self) -> BillingResult<Vec<Product>> {
        let mut products: Vec<Product> = self.read()?.products.rows.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn update_product(&mut self, product: &Product) -> BillingResult<()> {
        self.write(|state| {
            if state
                .products
                .rows
                .values()
                .any(|p| p.name == product.name && p.id != product.id)
            {
                return Err(duplicate_name("Product", &product.name));
            }
            let existing = state
                .products
                .rows
                .get_mut(&product.id)
                .ok_or_else(|| BillingError::ProductNotFound(product.id.to_string()))?;
            *existing = product.clone();
            Ok(())
        })
    }

    async fn delete_product(&mut self, product_id: RecordId) -> BillingResult<()> {
        self.write(|state| {
            if state
                .invoice_items
                .rows
                .values()
                .any(|item| item.product_id == product_id)
            {
                return Err(BillingError::Validation(
                    "Product is used on saved invoices and cannot be deleted".to_string(),
                ));
            }
            state
                .products
                .rows
                .remove(&product_id)
                .map(|_| ())
                .ok_or_else(|| BillingError::ProductNotFound(product_id.to_string()))
        })
    }

    async fn insert_buyer(&mut self, buyer: &NewBuyer) -> BillingResult<RecordId> {
        self.write(|state| {
            if state.buyers.rows.values().any(|b| b.name == buyer.name) {
                return Err(duplicate_name("Buyer", &buyer.name));
            }
            Ok(state.buyers.insert(|id| buyer.clone().into_buyer(id)))
        })
    }

    async fn get_buyer(&self, buyer_id: RecordId) -> BillingResult<Option<Buyer>> {
        Ok(self.read()?.buyers.rows.get(&buyer_id).cloned())
    }

    async fn find_buyer_by_name(&self, name: &str) -> BillingResult<Option<Buyer>> {
        Ok(self
            .read()?
            .buyers
            .rows
            .values()
            .find(|b| b.name == name)
            .cloned())
    }

    async fn list_buyers(&self) -> BillingResult<Vec<Buyer>> {
        let mut buyers: Vec<Buyer> = self.read()?.buyers.rows.values().cloned().collect();
        buyers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buyers)
    }

    async fn update_buyer(&mut self, buyer: &Buyer) -> BillingResult<()> {
        self.write(|state| {
            if state
                .buyers
                .rows
                .values()
                .any(|b| b.name == buyer.name && b.id != buyer.id)
            {
                return Err(duplicate_name("Buyer", &buyer.name));
            }
            let existing = state
                .buyers
                .rows
                .get_mut(&buyer.id)
                .ok_or_else(|| BillingError::BuyerNotFound(buyer.id.to_string()))?;
            *existing = buyer.clone();
            Ok(())
        })
    }

    async fn delete_buyer(&mut self, buyer_id: RecordId) -> BillingResult<()> {
        self.write(|state| {
            if state
                .invoices
                .rows
                .values()
                .any(|invoice| invoice.buyer_id == buyer_id)
            {
                return Err(BillingError::Validation(
                    "Buyer has saved invoices and cannot be deleted".to_string(),
                ));
            }
            state
                .buyers
                .rows
                .remove(&buyer_id)
                .map(|_| ())
                .ok_or_else(|| BillingError::BuyerNotFound(buyer_id.to_string()))
        })
    }

    async fn insert_vendor(&mut self, vendor: &NewVendor) -> BillingResult<RecordId> {
        self.write(|state| {
            if state.vendors.rows.values().any(|v| v.name == vendor.name) {
                return Err(duplicate_name("Vendor", &vendor.name));
            }
            Ok(state.vendors.insert(|id| vendor.clone().into_vendor(id)))
        })
    }

    async fn get_vendor(&self, vendor_id: RecordId) -> BillingResult<Option<Vendor>> {
        Ok(self.read()?.vendors.rows.get(&vendor_id).cloned())
    }

    async fn find_vendor_by_name(&self, name: &str) -> BillingResult<Option<Vendor>> {
        Ok(self
            .read()?
            .vendors
            .rows
            .values()
            .find(|v| v.name == name)
            .cloned())
    }

    async fn list_vendors(&self) -> BillingResult<Vec<Vendor>> {
        let mut vendors: Vec<Vendor> = self.read()?.vendors.rows.values().cloned().collect();
        vendors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vendors)
    }

    async fn update_vendor(&mut self, vendor: &Vendor) -> BillingResult<()> {
        self.write(|state| {
            if state
                .vendors
                .rows
                .values()
                .any(|v| v.name == vendor.name && v.id != vendor.id)
            {
                return Err(duplicate_name("Vendor", &vendor.name));
            }
            let existing = state
                .vendors
                .rows
                .get_mut(&vendor.id)
                .ok_or_else(|| BillingError::VendorNotFound(vendor.id.to_string()))?;
            *existing = vendor.clone();
            Ok(())
        })
    }

    async fn delete_vendor(&mut self, vendor_id: RecordId) -> BillingResult<()> {
        self.write(|state| {
            if state
                .purchases
                .rows
                .values()
                .any(|purchase| purchase.vendor_id == vendor_id)
            {
                return Err(BillingError::Validation(
                    "Vendor has purchase bills and cannot be deleted".to_string(),
                ));
            }
            state
                .vendors
                .rows
                .remove(&vendor_id)
                .map(|_| ())
                .ok_or_else(|| BillingError::VendorNotFound(vendor_id.to_string()))
        })
    }

    async fn invoice_numbers_with_prefix(&self, prefix: &str) -> BillingResult<Vec<String>> {
        Ok(self
            .read()?
            .invoices
            .rows
            .values()
            .filter(|invoice| invoice.invoice_no.starts_with(prefix))
            .map(|invoice| invoice.invoice_no.clone())
            .collect())
    }

    async fn save_invoice(
        &mut self,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        self.write(|state| state.insert_invoice(invoice, items))
    }

    async fn get_invoice(&self, invoice_id: RecordId) -> BillingResult<Option<Invoice>> {
        Ok(self.read()?.invoices.rows.get(&invoice_id).cloned())
    }

    async fn get_invoice_items(&self, invoice_id: RecordId) -> BillingResult<Vec<InvoiceItem>> {
        Ok(self
            .read()?
            .invoice_items
            .rows
            .values()
            .filter(|item| item.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        self.write(|state| state.cancel_invoice(invoice_id))
    }

    async fn replace_invoice(
        &mut self,
        cancelled_id: RecordId,
        replacement: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        self.write(|state| {
            state.cancel_invoice(cancelled_id)?;
            state.insert_invoice(replacement, items)
        })
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .read()?
            .invoices
            .rows
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| (invoice.invoice_date, invoice.id));
        Ok(invoices)
    }

    async fn save_purchase(
        &mut self,
        purchase: &NewPurchase,
        initial_payment: Option<&NewPurchasePayment>,
    ) -> BillingResult<RecordId> {
        self.write(|state| {
            if state.vendors.rows.get(&purchase.vendor_id).is_none() {
                return Err(BillingError::VendorNotFound(
                    purchase.vendor_id.to_string(),
                ));
            }

            let purchase_id = state.purchases.insert(|id| Purchase {
                id,
                vendor_id: purchase.vendor_id,
                bill_no: purchase.bill_no.clone(),
                purchase_date: purchase.purchase_date,
                total_amount: purchase.total_amount.clone(),
                amount_paid: 0.into(),
                payment_status: PaymentStatus::Unpaid,
                notes: purchase.notes.clone(),
            });

            if let Some(payment) = initial_payment {
                state
                    .purchase_payments
                    .insert(|id| payment.clone().into_payment(id, purchase_id));
            }
            state.refresh_purchase(purchase_id)?;
            Ok(purchase_id)
        })
    }

    async fn get_purchase(&self, purchase_id: RecordId) -> BillingResult<Option<Purchase>> {
        Ok(self.read()?.purchases.rows.get(&purchase_id).cloned())
    }

    async fn list_purchases(&self) -> BillingResult<Vec<Purchase>> {
        let mut purchases: Vec<Purchase> =
            self.read()?.purchases.rows.values().cloned().collect();
        purchases.sort_by(|a, b| {
            b.purchase_date
                .cmp(&a.purchase_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(purchases)
    }

    async fn add_purchase_payment(
        &mut self,
        purchase_id: RecordId,
        payment: &NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        self.write(|state| {
            if state.purchases.rows.get(&purchase_id).is_none() {
                return Err(BillingError::PurchaseNotFound(purchase_id));
            }
            state
                .purchase_payments
                .insert(|id| payment.clone().into_payment(id, purchase_id));
            state.refresh_purchase(purchase_id)
        })
    }

    async fn get_purchase_payments(
        &self,
        purchase_id: RecordId,
    ) -> BillingResult<Vec<PurchasePayment>> {
        let mut payments: Vec<PurchasePayment> = self
            .read()?
            .purchase_payments
            .rows
            .values()
            .filter(|payment| payment.purchase_id == purchase_id)
            .cloned()
            .collect();
        payments.sort_by_key(|payment| (payment.payment_date, payment.id));
        Ok(payments)
    }
}
