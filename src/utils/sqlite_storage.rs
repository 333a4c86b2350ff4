//! SQLite storage backed by a `sqlx` connection pool

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::tax::gst::{InvoiceTotals, SupplyType};
use crate::traits::*;
use crate::types::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

const PRODUCT_COLUMNS: &str = "id, name, hsn, gst_rate, rate, stock_qty, unit, selling_price";
const BUYER_COLUMNS: &str = "id, name, gstin, address, phone, email, state";
const VENDOR_COLUMNS: &str = "id, name, gstin, address, phone, email";
const INVOICE_COLUMNS: &str = "id, invoice_no, invoice_date, buyer_id, payment_mode, order_ref, \
     dispatch_info, supply_type, subtotal, total_discount, taxable_value, total_cgst, total_sgst, \
     total_igst, total_gst, freight, round_off, grand_total, status";
const ITEM_COLUMNS: &str = "id, invoice_id, product_id, description, hsn, gst_rate, quantity, \
     rate, discount_percent, amount";
const PURCHASE_COLUMNS: &str = "id, vendor_id, bill_no, purchase_date, total_amount, amount_paid, \
     payment_status, notes";
const PAYMENT_COLUMNS: &str = "id, purchase_id, payment_date, amount, payment_mode, reference_no";

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return BillingError::Validation(format!(
                    "A record with the same unique value already exists ({})",
                    db_err.message()
                ));
            }
            if db_err.is_foreign_key_violation() {
                return BillingError::Validation(
                    "The record is referenced by other records".to_string(),
                );
            }
        }
        BillingError::Storage(err.to_string())
    }
}

fn decimal(row: &SqliteRow, column: &str) -> BillingResult<BigDecimal> {
    let text: String = row.try_get(column)?;
    BigDecimal::from_str(&text).map_err(|e| {
        BillingError::Storage(format!("Invalid decimal '{}' in {}: {}", text, column, e))
    })
}

fn date(row: &SqliteRow, column: &str) -> BillingResult<NaiveDate> {
    let text: String = row.try_get(column)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| BillingError::Storage(format!("Invalid date '{}' in {}: {}", text, column, e)))
}

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn product_from_row(row: &SqliteRow) -> BillingResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        hsn: row.try_get("hsn")?,
        gst_rate: decimal(row, "gst_rate")?,
        rate: decimal(row, "rate")?,
        selling_price: decimal(row, "selling_price")?,
        stock_qty: decimal(row, "stock_qty")?,
        unit: row.try_get("unit")?,
    })
}

fn buyer_from_row(row: &SqliteRow) -> BillingResult<Buyer> {
    Ok(Buyer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        gstin: row.try_get("gstin")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        state: row.try_get("state")?,
    })
}

fn vendor_from_row(row: &SqliteRow) -> BillingResult<Vendor> {
    Ok(Vendor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        gstin: row.try_get("gstin")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
    })
}

fn invoice_from_row(row: &SqliteRow) -> BillingResult<Invoice> {
    let status: String = row.try_get("status")?;
    let supply_type: String = row.try_get("supply_type")?;
    Ok(Invoice {
        id: row.try_get("id")?,
        invoice_no: row.try_get("invoice_no")?,
        invoice_date: date(row, "invoice_date")?,
        buyer_id: row.try_get("buyer_id")?,
        payment_mode: row.try_get("payment_mode")?,
        order_ref: row.try_get("order_ref")?,
        dispatch_info: row.try_get("dispatch_info")?,
        supply_type: supply_type
            .parse::<SupplyType>()
            .map_err(BillingError::Storage)?,
        totals: InvoiceTotals {
            subtotal: decimal(row, "subtotal")?,
            total_discount: decimal(row, "total_discount")?,
            taxable_value: decimal(row, "taxable_value")?,
            total_cgst: decimal(row, "total_cgst")?,
            total_sgst: decimal(row, "total_sgst")?,
            total_igst: decimal(row, "total_igst")?,
            total_gst: decimal(row, "total_gst")?,
            freight: decimal(row, "freight")?,
            round_off: decimal(row, "round_off")?,
            grand_total: decimal(row, "grand_total")?,
        },
        status: status.parse()?,
    })
}

fn item_from_row(row: &SqliteRow) -> BillingResult<InvoiceItem> {
    Ok(InvoiceItem {
        id: row.try_get("id")?,
        invoice_id: row.try_get("invoice_id")?,
        product_id: row.try_get("product_id")?,
        description: row.try_get("description")?,
        hsn: row.try_get("hsn")?,
        gst_rate: decimal(row, "gst_rate")?,
        quantity: decimal(row, "quantity")?,
        rate: decimal(row, "rate")?,
        discount_percent: decimal(row, "discount_percent")?,
        amount: decimal(row, "amount")?,
    })
}

fn purchase_from_row(row: &SqliteRow) -> BillingResult<Purchase> {
    let status: String = row.try_get("payment_status")?;
    Ok(Purchase {
        id: row.try_get("id")?,
        vendor_id: row.try_get("vendor_id")?,
        bill_no: row.try_get("bill_no")?,
        purchase_date: date(row, "purchase_date")?,
        total_amount: decimal(row, "total_amount")?,
        amount_paid: decimal(row, "amount_paid")?,
        payment_status: status.parse()?,
        notes: row.try_get("notes")?,
    })
}

fn payment_from_row(row: &SqliteRow) -> BillingResult<PurchasePayment> {
    Ok(PurchasePayment {
        id: row.try_get("id")?,
        purchase_id: row.try_get("purchase_id")?,
        payment_date: date(row, "payment_date")?,
        amount: decimal(row, "amount")?,
        payment_mode: row.try_get("payment_mode")?,
        reference_no: row.try_get("reference_no")?,
    })
}

/// SQLite storage implementation
///
/// Clones share the connection pool. Operations spanning several rows run
/// inside a single database transaction.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file at `path` and run migrations
    pub async fn new(path: impl AsRef<Path>) -> BillingResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        info!("Opening billing database at {:?}", db_path);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BillingError::Storage(format!("Cannot create {:?}: {}", parent, e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self { pool, db_path })
    }

    /// Private in-memory database, for tests
    pub async fn new_in_memory() -> BillingResult<Self> {
        debug!("Opening in-memory billing database");

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single connection that never closes keeps the database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    async fn migrate(pool: &SqlitePool) -> BillingResult<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| BillingError::Storage(format!("Migration failed: {}", e)))
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn adjust_stock(
        tx: &mut Transaction<'_, Sqlite>,
        product_id: RecordId,
        delta: &BigDecimal,
    ) -> BillingResult<()> {
        let row = sqlx::query("SELECT stock_qty FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| BillingError::ProductNotFound(product_id.to_string()))?;
        let stock_qty = decimal(&row, "stock_qty")? + delta;

        sqlx::query("UPDATE products SET stock_qty = ?1 WHERE id = ?2")
            .bind(stock_qty.to_string())
            .bind(product_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn insert_invoice(
        tx: &mut Transaction<'_, Sqlite>,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        let totals = &invoice.totals;
        let invoice_id = sqlx::query(
            r#"
            INSERT INTO invoices (invoice_no, invoice_date, buyer_id, payment_mode, order_ref,
                                  dispatch_info, supply_type, subtotal, total_discount,
                                  taxable_value, total_cgst, total_sgst, total_igst, total_gst,
                                  freight, round_off, grand_total, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&invoice.invoice_no)
        .bind(date_text(invoice.invoice_date))
        .bind(invoice.buyer_id)
        .bind(&invoice.payment_mode)
        .bind(&invoice.order_ref)
        .bind(&invoice.dispatch_info)
        .bind(invoice.supply_type.as_str())
        .bind(totals.subtotal.to_string())
        .bind(totals.total_discount.to_string())
        .bind(totals.taxable_value.to_string())
        .bind(totals.total_cgst.to_string())
        .bind(totals.total_sgst.to_string())
        .bind(totals.total_igst.to_string())
        .bind(totals.total_gst.to_string())
        .bind(totals.freight.to_string())
        .bind(totals.round_off.to_string())
        .bind(totals.grand_total.to_string())
        .bind(InvoiceStatus::Active.as_str())
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, product_id, description, hsn, gst_rate,
                                           quantity, rate, discount_percent, amount)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(invoice_id)
            .bind(item.product_id)
            .bind(&item.description)
            .bind(&item.hsn)
            .bind(item.gst_rate.to_string())
            .bind(item.quantity.to_string())
            .bind(item.rate.to_string())
            .bind(item.discount_percent.to_string())
            .bind(item.amount.to_string())
            .execute(&mut **tx)
            .await?;

            let deduction = -item.quantity.clone();
            Self::adjust_stock(tx, item.product_id, &deduction).await?;
        }

        Ok(invoice_id)
    }

    async fn cancel_in(
        tx: &mut Transaction<'_, Sqlite>,
        invoice_id: RecordId,
    ) -> BillingResult<Invoice> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(invoice_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        let mut invoice = invoice_from_row(&row)?;
        if invoice.is_cancelled() {
            return Err(BillingError::InvoiceAlreadyCancelled(invoice.invoice_no));
        }

        let rows = sqlx::query("SELECT product_id, quantity FROM invoice_items WHERE invoice_id = ?1")
            .bind(invoice_id)
            .fetch_all(&mut **tx)
            .await?;
        for row in &rows {
            let product_id: RecordId = row.try_get("product_id")?;
            let quantity = decimal(row, "quantity")?;
            Self::adjust_stock(tx, product_id, &quantity).await?;
        }

        invoice.mark_cancelled();
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = ?1, grand_total = ?2, taxable_value = ?3, total_gst = ?4
            WHERE id = ?5
            "#,
        )
        .bind(invoice.status.as_str())
        .bind(invoice.totals.grand_total.to_string())
        .bind(invoice.totals.taxable_value.to_string())
        .bind(invoice.totals.total_gst.to_string())
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;

        Ok(invoice)
    }

    async fn refresh_purchase(
        tx: &mut Transaction<'_, Sqlite>,
        purchase_id: RecordId,
    ) -> BillingResult<Purchase> {
        let sql = format!("SELECT {} FROM purchases WHERE id = ?1", PURCHASE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(purchase_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BillingError::PurchaseNotFound(purchase_id))?;
        let mut purchase = purchase_from_row(&row)?;

        let amounts = sqlx::query("SELECT amount FROM purchase_payments WHERE purchase_id = ?1")
            .bind(purchase_id)
            .fetch_all(&mut **tx)
            .await?
            .iter()
            .map(|row| decimal(row, "amount"))
            .collect::<BillingResult<Vec<_>>>()?;
        purchase.apply_payments(amounts.iter());

        sqlx::query("UPDATE purchases SET amount_paid = ?1, payment_status = ?2 WHERE id = ?3")
            .bind(purchase.amount_paid.to_string())
            .bind(purchase.payment_status.as_str())
            .bind(purchase_id)
            .execute(&mut **tx)
            .await?;

        Ok(purchase)
    }

    async fn insert_payment(
        tx: &mut Transaction<'_, Sqlite>,
        purchase_id: RecordId,
        payment: &NewPurchasePayment,
    ) -> BillingResult<RecordId> {
        let id = sqlx::query(
            r#"
            INSERT INTO purchase_payments (purchase_id, payment_date, amount, payment_mode, reference_no)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(purchase_id)
        .bind(date_text(payment.payment_date))
        .bind(payment.amount.to_string())
        .bind(&payment.payment_mode)
        .bind(&payment.reference_no)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn fetch_one_by_id<T>(
        &self,
        table: &str,
        columns: &str,
        id: RecordId,
        map: fn(&SqliteRow) -> BillingResult<T>,
    ) -> BillingResult<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns, table);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map)
            .transpose()
    }

    async fn fetch_one_by_name<T>(
        &self,
        table: &str,
        columns: &str,
        name: &str,
        map: fn(&SqliteRow) -> BillingResult<T>,
    ) -> BillingResult<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE name = ?1", columns, table);
        sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map)
            .transpose()
    }

    async fn fetch_all_by_name<T>(
        &self,
        table: &str,
        columns: &str,
        map: fn(&SqliteRow) -> BillingResult<T>,
    ) -> BillingResult<Vec<T>> {
        let sql = format!("SELECT {} FROM {} ORDER BY name", columns, table);
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map)
            .collect()
    }

    async fn delete_by_id(&self, table: &str, id: RecordId) -> BillingResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BillingStorage for SqliteStorage {
    async fn insert_product(&mut self, product: &NewProduct) -> BillingResult<RecordId> {
        let id = sqlx::query(
            r#"
            INSERT INTO products (name, hsn, gst_rate, rate, stock_qty, unit, selling_price)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.name)
        .bind(&product.hsn)
        .bind(product.gst_rate.to_string())
        .bind(product.rate.to_string())
        .bind(product.stock_qty.to_string())
        .bind(&product.unit)
        .bind(product.selling_price.to_string())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn get_product(&self, product_id: RecordId) -> BillingResult<Option<Product>> {
        self.fetch_one_by_id("products", PRODUCT_COLUMNS, product_id, product_from_row)
            .await
    }

    async fn find_product_by_name(&self, name: &str) -> BillingResult<Option<Product>> {
        self.fetch_one_by_name("products", PRODUCT_COLUMNS, name, product_from_row)
            .await
    }

    async fn list_products(&self) -> BillingResult<Vec<Product>> {
        self.fetch_all_by_name("products", PRODUCT_COLUMNS, product_from_row)
            .await
    }

    async fn update_product(&mut self, product: &Product) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?1, hsn = ?2, gst_rate = ?3, rate = ?4, stock_qty = ?5, unit = ?6,
                selling_price = ?7
            WHERE id = ?8
            "#,
        )
        .bind(&product.name)
        .bind(&product.hsn)
        .bind(product.gst_rate.to_string())
        .bind(product.rate.to_string())
        .bind(product.stock_qty.to_string())
        .bind(&product.unit)
        .bind(product.selling_price.to_string())
        .bind(product.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::ProductNotFound(product.id.to_string()));
        }
        Ok(())
    }

    async fn delete_product(&mut self, product_id: RecordId) -> BillingResult<()> {
        if self.delete_by_id("products", product_id).await? {
            Ok(())
        } else {
            Err(BillingError::ProductNotFound(product_id.to_string()))
        }
    }

    async fn insert_buyer(&mut self, buyer: &NewBuyer) -> BillingResult<RecordId> {
        let id = sqlx::query(
            r#"
            INSERT INTO buyers (name, gstin, address, phone, email, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&buyer.name)
        .bind(&buyer.gstin)
        .bind(&buyer.address)
        .bind(&buyer.phone)
        .bind(&buyer.email)
        .bind(&buyer.state)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn get_buyer(&self, buyer_id: RecordId) -> BillingResult<Option<Buyer>> {
        self.fetch_one_by_id("buyers", BUYER_COLUMNS, buyer_id, buyer_from_row)
            .await
    }

    async fn find_buyer_by_name(&self, name: &str) -> BillingResult<Option<Buyer>> {
        self.fetch_one_by_name("buyers", BUYER_COLUMNS, name, buyer_from_row)
            .await
    }

    async fn list_buyers(&self) -> BillingResult<Vec<Buyer>> {
        self.fetch_all_by_name("buyers", BUYER_COLUMNS, buyer_from_row)
            .await
    }

    async fn update_buyer(&mut self, buyer: &Buyer) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE buyers
            SET name = ?1, gstin = ?2, address = ?3, phone = ?4, email = ?5, state = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&buyer.name)
        .bind(&buyer.gstin)
        .bind(&buyer.address)
        .bind(&buyer.phone)
        .bind(&buyer.email)
        .bind(&buyer.state)
        .bind(buyer.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::BuyerNotFound(buyer.id.to_string()));
        }
        Ok(())
    }

    async fn delete_buyer(&mut self, buyer_id: RecordId) -> BillingResult<()> {
        if self.delete_by_id("buyers", buyer_id).await? {
            Ok(())
        } else {
            Err(BillingError::BuyerNotFound(buyer_id.to_string()))
        }
    }

    async fn insert_vendor(&mut self, vendor: &NewVendor) -> BillingResult<RecordId> {
        let id = sqlx::query(
            r#"
            INSERT INTO vendors (name, gstin, address, phone, email)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&vendor.name)
        .bind(&vendor.gstin)
        .bind(&vendor.address)
        .bind(&vendor.phone)
        .bind(&vendor.email)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn get_vendor(&self, vendor_id: RecordId) -> BillingResult<Option<Vendor>> {
        self.fetch_one_by_id("vendors", VENDOR_COLUMNS, vendor_id, vendor_from_row)
            .await
    }

    async fn find_vendor_by_name(&self, name: &str) -> BillingResult<Option<Vendor>> {
        self.fetch_one_by_name("vendors", VENDOR_COLUMNS, name, vendor_from_row)
            .await
    }

    async fn list_vendors(&self) -> BillingResult<Vec<Vendor>> {
        self.fetch_all_by_name("vendors", VENDOR_COLUMNS, vendor_from_row)
            .await
    }

    async fn update_vendor(&mut self, vendor: &Vendor) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE vendors
            SET name = ?1, gstin = ?2, address = ?3, phone = ?4, email = ?5
            WHERE id = ?6
            "#,
        )
        .bind(&vendor.name)
        .bind(&vendor.gstin)
        .bind(&vendor.address)
        .bind(&vendor.phone)
        .bind(&vendor.email)
        .bind(vendor.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::VendorNotFound(vendor.id.to_string()));
        }
        Ok(())
    }

    async fn delete_vendor(&mut self, vendor_id: RecordId) -> BillingResult<()> {
        if self.delete_by_id("vendors", vendor_id).await? {
            Ok(())
        } else {
            Err(BillingError::VendorNotFound(vendor_id.to_string()))
        }
    }

    async fn invoice_numbers_with_prefix(&self, prefix: &str) -> BillingResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT invoice_no FROM invoices WHERE substr(invoice_no, 1, length(?1)) = ?1",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("invoice_no").map_err(BillingError::from))
            .collect()
    }

    async fn save_invoice(
        &mut self,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        let mut tx = self.pool.begin().await?;
        let invoice_id = Self::insert_invoice(&mut tx, invoice, items).await?;
        tx.commit().await?;

        debug!("Committed invoice {} ({})", invoice.invoice_no, invoice_id);
        Ok(invoice_id)
    }

    async fn get_invoice(&self, invoice_id: RecordId) -> BillingResult<Option<Invoice>> {
        self.fetch_one_by_id("invoices", INVOICE_COLUMNS, invoice_id, invoice_from_row)
            .await
    }

    async fn get_invoice_items(&self, invoice_id: RecordId) -> BillingResult<Vec<InvoiceItem>> {
        let sql = format!(
            "SELECT {} FROM invoice_items WHERE invoice_id = ?1 ORDER BY id",
            ITEM_COLUMNS
        );
        sqlx::query(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(item_from_row)
            .collect()
    }

    async fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        let mut tx = self.pool.begin().await?;
        let invoice = Self::cancel_in(&mut tx, invoice_id).await?;
        tx.commit().await?;
        Ok(invoice)
    }

    async fn replace_invoice(
        &mut self,
        cancelled_id: RecordId,
        replacement: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        let mut tx = self.pool.begin().await?;
        Self::cancel_in(&mut tx, cancelled_id).await?;
        let invoice_id = Self::insert_invoice(&mut tx, replacement, items).await?;
        tx.commit().await?;
        Ok(invoice_id)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        let sql = format!(
            r#"
            SELECT {} FROM invoices
            WHERE invoice_date >= ?1 AND invoice_date <= ?2 AND (?3 IS NULL OR buyer_id = ?3)
            ORDER BY invoice_date, id
            "#,
            INVOICE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(date_text(filter.start_date))
            .bind(date_text(filter.end_date))
            .bind(filter.buyer_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(invoice_from_row)
            .collect()
    }

    async fn save_purchase(
        &mut self,
        purchase: &NewPurchase,
        initial_payment: Option<&NewPurchasePayment>,
    ) -> BillingResult<RecordId> {
        if self.get_vendor(purchase.vendor_id).await?.is_none() {
            return Err(BillingError::VendorNotFound(purchase.vendor_id.to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let purchase_id = sqlx::query(
            r#"
            INSERT INTO purchases (vendor_id, bill_no, purchase_date, total_amount, amount_paid,
                                   payment_status, notes)
            VALUES (?1, ?2, ?3, ?4, '0', ?5, ?6)
            "#,
        )
        .bind(purchase.vendor_id)
        .bind(&purchase.bill_no)
        .bind(date_text(purchase.purchase_date))
        .bind(purchase.total_amount.to_string())
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(&purchase.notes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(payment) = initial_payment {
            Self::insert_payment(&mut tx, purchase_id, payment).await?;
        }
        Self::refresh_purchase(&mut tx, purchase_id).await?;
        tx.commit().await?;

        Ok(purchase_id)
    }

    async fn get_purchase(&self, purchase_id: RecordId) -> BillingResult<Option<Purchase>> {
        self.fetch_one_by_id("purchases", PURCHASE_COLUMNS, purchase_id, purchase_from_row)
            .await
    }

    async fn list_purchases(&self) -> BillingResult<Vec<Purchase>> {
        let sql = format!(
            "SELECT {} FROM purchases ORDER BY purchase_date DESC, id DESC",
            PURCHASE_COLUMNS
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(purchase_from_row)
            .collect()
    }

    async fn add_purchase_payment(
        &mut self,
        purchase_id: RecordId,
        payment: &NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM purchases WHERE id = ?1")
            .bind(purchase_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(BillingError::PurchaseNotFound(purchase_id));
        }

        Self::insert_payment(&mut tx, purchase_id, payment).await?;
        let purchase = Self::refresh_purchase(&mut tx, purchase_id).await?;
        tx.commit().await?;

        Ok(purchase)
    }

    async fn get_purchase_payments(
        &self,
        purchase_id: RecordId,
    ) -> BillingResult<Vec<PurchasePayment>> {
        let sql = format!(
            "SELECT {} FROM purchase_payments WHERE purchase_id = ?1 ORDER BY payment_date, id",
            PAYMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(purchase_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(payment_from_row)
            .collect()
    }
}
