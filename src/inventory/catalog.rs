//! Product master management

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::inventory::stock::{add_stock, StockAddition};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_name, validate_non_negative_amount};

/// Product fields the operator may edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub hsn: Option<String>,
    pub gst_rate: BigDecimal,
    pub selling_price: BigDecimal,
    pub unit: Option<String>,
    /// Stock received with this edit, valued into the average cost
    pub stock_addition: Option<StockAddition>,
}

impl ProductUpdate {
    /// Update that keeps every field of `product` and adds no stock
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            hsn: product.hsn.clone(),
            gst_rate: product.gst_rate.clone(),
            selling_price: product.selling_price.clone(),
            unit: product.unit.clone(),
            stock_addition: None,
        }
    }

    pub fn with_stock(mut self, quantity: BigDecimal, purchase_rate: BigDecimal) -> Self {
        self.stock_addition = Some(StockAddition {
            quantity,
            purchase_rate,
        });
        self
    }
}

/// Product catalog for the product master and stock levels
pub struct ProductCatalog<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> ProductCatalog<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    fn validate(name: &str, gst_rate: &BigDecimal, selling_price: &BigDecimal) -> BillingResult<()> {
        validate_name("Product", name)?;
        validate_non_negative_amount("GST rate", gst_rate)?;
        validate_non_negative_amount("Selling price", selling_price)?;
        Ok(())
    }

    /// Create a product; its opening stock is valued at the product's `rate`
    pub async fn create_product(&mut self, product: NewProduct) -> BillingResult<Product> {
        Self::validate(&product.name, &product.gst_rate, &product.selling_price)?;
        validate_non_negative_amount("Purchase rate", &product.rate)?;
        validate_non_negative_amount("Opening stock", &product.stock_qty)?;

        let product = NewProduct {
            name: product.name.trim().to_string(),
            ..product
        };

        if self
            .storage
            .find_product_by_name(&product.name)
            .await?
            .is_some()
        {
            return Err(BillingError::Validation(format!(
                "Product '{}' already exists",
                product.name
            )));
        }

        let id = self.storage.insert_product(&product).await?;
        info!("Created product '{}' ({})", product.name, id);
        Ok(product.into_product(id))
    }

    /// Edit a product. Received stock is added to the quantity on hand and
    /// re-values the average cost.
    pub async fn update_product(
        &mut self,
        product_id: RecordId,
        update: ProductUpdate,
    ) -> BillingResult<Product> {
        Self::validate(&update.name, &update.gst_rate, &update.selling_price)?;
        if let Some(addition) = &update.stock_addition {
            validate_non_negative_amount("Added stock", &addition.quantity)?;
            validate_non_negative_amount("Purchase rate", &addition.purchase_rate)?;
        }

        let current = self.get_product_required(product_id).await?;
        let name = update.name.trim().to_string();

        if name != current.name {
            if let Some(other) = self.storage.find_product_by_name(&name).await? {
                if other.id != product_id {
                    return Err(BillingError::Validation(format!(
                        "Product '{}' already exists",
                        name
                    )));
                }
            }
        }

        let (stock_qty, rate) = match &update.stock_addition {
            Some(addition) => {
                let valuation = add_stock(
                    &current.stock_qty,
                    &current.rate,
                    &addition.quantity,
                    &addition.purchase_rate,
                );
                debug!(
                    "Product {} stock {} -> {}, cost {} -> {}",
                    product_id,
                    current.stock_qty,
                    valuation.stock_qty,
                    current.rate,
                    valuation.average_cost
                );
                (valuation.stock_qty, valuation.average_cost)
            }
            None => (current.stock_qty, current.rate),
        };

        let product = Product {
            id: product_id,
            name,
            hsn: update.hsn,
            gst_rate: update.gst_rate,
            rate,
            selling_price: update.selling_price,
            stock_qty,
            unit: update.unit,
        };

        self.storage.update_product(&product).await?;
        info!("Updated product '{}' ({})", product.name, product_id);
        Ok(product)
    }

    pub async fn get_product(&self, product_id: RecordId) -> BillingResult<Option<Product>> {
        self.storage.get_product(product_id).await
    }

    /// Get a product by ID, returning an error if not found
    pub async fn get_product_required(&self, product_id: RecordId) -> BillingResult<Product> {
        self.storage
            .get_product(product_id)
            .await?
            .ok_or_else(|| BillingError::ProductNotFound(product_id.to_string()))
    }

    pub async fn find_product(&self, name: &str) -> BillingResult<Option<Product>> {
        self.storage.find_product_by_name(name.trim()).await
    }

    /// All products, by name
    pub async fn list_products(&self) -> BillingResult<Vec<Product>> {
        self.storage.list_products().await
    }

    /// Products at or below the low-stock threshold
    pub async fn low_stock_products(&self) -> BillingResult<Vec<Product>> {
        let products = self.storage.list_products().await?;
        Ok(products.into_iter().filter(Product::is_low_stock).collect())
    }

    /// Delete a product no invoice line refers to
    pub async fn delete_product(&mut self, product_id: RecordId) -> BillingResult<()> {
        self.storage.delete_product(product_id).await?;
        info!("Deleted product {}", product_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    fn yarn(stock: i64) -> NewProduct {
        NewProduct {
            name: "Cotton Yarn 40s".to_string(),
            hsn: Some("5205".to_string()),
            gst_rate: BigDecimal::from(5),
            rate: BigDecimal::from(100),
            selling_price: BigDecimal::from(130),
            stock_qty: BigDecimal::from(stock),
            unit: Some("kg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_names() {
        let mut catalog = ProductCatalog::new(MemoryStorage::new());
        catalog.create_product(yarn(10)).await.unwrap();

        let mut duplicate = yarn(5);
        duplicate.name = " Cotton Yarn 40s ".to_string();
        assert!(matches!(
            catalog.create_product(duplicate).await,
            Err(BillingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_restock_updates_average_cost() {
        let mut catalog = ProductCatalog::new(MemoryStorage::new());
        let product = catalog.create_product(yarn(10)).await.unwrap();

        let update = ProductUpdate::from_product(&product)
            .with_stock(BigDecimal::from(30), BigDecimal::from(120));
        let updated = catalog.update_product(product.id, update).await.unwrap();

        assert_eq!(updated.stock_qty, BigDecimal::from(40));
        assert_eq!(updated.rate, BigDecimal::from(115));

        let stored = catalog.get_product_required(product.id).await.unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_plain_edit_keeps_stock_and_cost() {
        let mut catalog = ProductCatalog::new(MemoryStorage::new());
        let product = catalog.create_product(yarn(10)).await.unwrap();

        let mut update = ProductUpdate::from_product(&product);
        update.selling_price = BigDecimal::from(140);
        let updated = catalog.update_product(product.id, update).await.unwrap();

        assert_eq!(updated.stock_qty, BigDecimal::from(10));
        assert_eq!(updated.rate, BigDecimal::from(100));
        assert_eq!(updated.selling_price, BigDecimal::from(140));
    }

    #[tokio::test]
    async fn test_low_stock_threshold_is_inclusive() {
        let mut catalog = ProductCatalog::new(MemoryStorage::new());
        catalog.create_product(yarn(10)).await.unwrap();

        let mut plenty = yarn(11);
        plenty.name = "Polyester Thread".to_string();
        catalog.create_product(plenty).await.unwrap();

        let low = catalog.low_stock_products().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Cotton Yarn 40s");
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let mut catalog = ProductCatalog::new(MemoryStorage::new());
        let product = yarn(1).into_product(42);
        let result = catalog
            .update_product(42, ProductUpdate::from_product(&product))
            .await;
        assert!(matches!(result, Err(BillingError::ProductNotFound(_))));
    }
}
