//! PostgreSQL backend.
//!
//! Owns `location_stock`, `settings` and `user_meta`; reads the host
//! platform's `products`, `orders`, `order_items`, `users` and `cart_items`
//! tables. Schema lives in `migrations/`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::access::{Actor, OrderFilter, Role};
use crate::domain::aggregates::{Address, LineItem, Location, Order, OrderLocationBinding, OrderStatus, Product, ProductKind, Registry};
use crate::domain::value_objects::{ActorId, LocationId, OrderId, ProductId, Quantity};
use crate::store::{ActorStore, CartStore, CatalogStore, LedgerStore, OrderStore, SettingsStore, StockRecord};
use crate::{Result, StockError};

const LOCATIONS_KEY: &str = "wcmls_locations";
const DEFAULT_LOCATION_KEY: &str = "wcmls_default_location";
const PREFERENCE_KEY: &str = "wcmls_selected_location";

fn db_err(op: &'static str) -> impl Fn(sqlx::Error) -> StockError {
    move |e| StockError::Persistence(format!("{op}: {e}"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await.map_err(db_err("connect"))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StockError::Persistence(format!("Migration failed: {e}")))
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<LineItem>> {
        let rows: Vec<(i64, String, i32)> = sqlx::query_as("SELECT product_id, name, quantity FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(id.value()).fetch_all(&self.pool).await.map_err(db_err("load order items"))?;
        Ok(rows.into_iter().filter_map(|(product_id, name, quantity)| {
            Some(LineItem { product_id: ProductId::new(product_id)?, name, quantity: u32::try_from(quantity).ok()? })
        }).collect())
    }

    async fn hydrate(&self, row: OrderRow) -> Result<Option<Order>> {
        let Some(id) = OrderId::new(row.id) else { return Ok(None) };
        let items = self.order_items(id).await?;
        let binding = OrderLocationBinding {
            location_id: row.location_id.as_deref().and_then(|l| LocationId::new(l).ok()),
            stock_processed: row.stock_processed,
        };
        let address = Address { city: row.billing_city, ..Default::default() };
        Ok(Some(Order::restore(id, OrderStatus::parse(&row.status), address, items, binding, row.created_at, row.updated_at)))
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: i64, name: String, product_type: String, manage_stock: bool, stock_quantity: Option<i64>, updated_at: DateTime<Utc> }

impl ProductRow {
    fn into_product(self) -> Option<Product> {
        Some(Product::restore(
            ProductId::new(self.id)?, self.name, ProductKind::parse(&self.product_type),
            self.manage_stock, self.stock_quantity.map(Quantity::clamped), self.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow { id: i64, status: String, billing_city: String, location_id: Option<String>, stock_processed: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

const ORDER_COLUMNS: &str = "id, status, billing_city, wcmls_location_id AS location_id, wcmls_stock_processed AS stock_processed, created_at, updated_at";

impl LedgerStore for PgStore {
    async fn quantity(&self, product: ProductId, location: &LocationId) -> Result<Option<Quantity>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT stock_quantity FROM location_stock WHERE product_id = $1 AND location_id = $2")
            .bind(product.value()).bind(location.as_str())
            .fetch_optional(&self.pool).await.map_err(db_err("read stock"))?;
        Ok(row.map(|(q,)| Quantity::clamped(q)))
    }

    async fn upsert(&self, product: ProductId, location: &LocationId, quantity: Quantity) -> Result<()> {
        sqlx::query("INSERT INTO location_stock (product_id, location_id, stock_quantity, updated_at) VALUES ($1, $2, $3, NOW()) ON CONFLICT (product_id, location_id) DO UPDATE SET stock_quantity = EXCLUDED.stock_quantity, updated_at = NOW()")
            .bind(product.value()).bind(location.as_str()).bind(i64::from(quantity.value()))
            .execute(&self.pool).await.map_err(db_err("write stock"))?;
        Ok(())
    }

    async fn insert_if_absent(&self, product: ProductId, location: &LocationId) -> Result<bool> {
        let res = sqlx::query("INSERT INTO location_stock (product_id, location_id, stock_quantity, updated_at) VALUES ($1, $2, 0, NOW()) ON CONFLICT (product_id, location_id) DO NOTHING")
            .bind(product.value()).bind(location.as_str())
            .execute(&self.pool).await.map_err(db_err("initialize stock"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_location(&self, location: &LocationId) -> Result<u64> {
        let res = sqlx::query("DELETE FROM location_stock WHERE location_id = $1")
            .bind(location.as_str()).execute(&self.pool).await.map_err(db_err("purge location"))?;
        Ok(res.rows_affected())
    }

    async fn records_for_product(&self, product: ProductId) -> Result<Vec<StockRecord>> {
        let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as("SELECT location_id, stock_quantity, updated_at FROM location_stock WHERE product_id = $1 ORDER BY location_id")
            .bind(product.value()).fetch_all(&self.pool).await.map_err(db_err("list stock"))?;
        Ok(rows.into_iter().filter_map(|(location, q, updated_at)| {
            Some(StockRecord { product_id: product, location_id: LocationId::new(location).ok()?, quantity: Quantity::clamped(q), updated_at })
        }).collect())
    }
}

impl SettingsStore for PgStore {
    async fn load_registry(&self) -> Result<Registry> {
        let locations: Option<(Json<Vec<Location>>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = $1")
            .bind(LOCATIONS_KEY).fetch_optional(&self.pool).await.map_err(db_err("load locations"))?;
        let default: Option<(Json<Option<LocationId>>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = $1")
            .bind(DEFAULT_LOCATION_KEY).fetch_optional(&self.pool).await.map_err(db_err("load default location"))?;
        Ok(Registry::from_parts(
            locations.map(|(Json(l),)| l).unwrap_or_default(),
            default.and_then(|(Json(d),)| d),
        ))
    }

    async fn save_registry(&self, registry: &Registry) -> Result<()> {
        let upsert = "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";
        sqlx::query(upsert).bind(LOCATIONS_KEY).bind(Json(registry.locations()))
            .execute(&self.pool).await.map_err(db_err("save locations"))?;
        sqlx::query(upsert).bind(DEFAULT_LOCATION_KEY).bind(Json(registry.default_location()))
            .execute(&self.pool).await.map_err(db_err("save default location"))?;
        Ok(())
    }

    async fn location_preference(&self, actor: ActorId) -> Result<Option<LocationId>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT meta_value FROM user_meta WHERE user_id = $1 AND meta_key = $2")
            .bind(actor.value() as i64).bind(PREFERENCE_KEY)
            .fetch_optional(&self.pool).await.map_err(db_err("load preference"))?;
        Ok(row.and_then(|(v,)| LocationId::new(v).ok()))
    }

    async fn set_location_preference(&self, actor: ActorId, location: &LocationId) -> Result<()> {
        sqlx::query("INSERT INTO user_meta (user_id, meta_key, meta_value) VALUES ($1, $2, $3) ON CONFLICT (user_id, meta_key) DO UPDATE SET meta_value = EXCLUDED.meta_value")
            .bind(actor.value() as i64).bind(PREFERENCE_KEY).bind(location.as_str())
            .execute(&self.pool).await.map_err(db_err("save preference"))?;
        Ok(())
    }
}

impl CatalogStore for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, product_type, manage_stock, stock_quantity, updated_at FROM products WHERE id = $1")
            .bind(id.value()).fetch_optional(&self.pool).await.map_err(db_err("load product"))?;
        Ok(row.and_then(ProductRow::into_product))
    }

    async fn save_stock(&self, product: &Product) -> Result<()> {
        let res = sqlx::query("UPDATE products SET manage_stock = $2, stock_quantity = $3, updated_at = NOW() WHERE id = $1")
            .bind(product.id().value()).bind(product.manages_stock())
            .bind(product.stock_quantity().map(|q| i64::from(q.value())))
            .execute(&self.pool).await.map_err(db_err("save product stock"))?;
        if res.rows_affected() == 0 { return Err(StockError::ProductNotFound); }
        Ok(())
    }

    async fn products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT id, name, product_type, manage_stock, stock_quantity, updated_at FROM products WHERE status <> 'deleted' ORDER BY name ASC")
            .fetch_all(&self.pool).await.map_err(db_err("list products"))?;
        Ok(rows.into_iter().filter_map(ProductRow::into_product).collect())
    }
}

impl OrderStore for PgStore {
    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.value()).fetch_optional(&self.pool).await.map_err(db_err("load order"))?;
        match row {
            Some(row) => self.hydrate(row).await,
            None => Ok(None),
        }
    }

    async fn save_binding(&self, id: OrderId, binding: &OrderLocationBinding) -> Result<()> {
        let res = sqlx::query("UPDATE orders SET wcmls_location_id = $2, wcmls_stock_processed = $3, updated_at = NOW() WHERE id = $1")
            .bind(id.value()).bind(binding.location_id.as_ref().map(LocationId::as_str)).bind(binding.stock_processed)
            .execute(&self.pool).await.map_err(db_err("save order binding"))?;
        if res.rows_affected() == 0 { return Err(StockError::OrderNotFound); }
        Ok(())
    }

    async fn set_billing_city(&self, id: OrderId, city: &str) -> Result<()> {
        sqlx::query("UPDATE orders SET billing_city = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.value()).bind(city).execute(&self.pool).await.map_err(db_err("save billing city"))?;
        Ok(())
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let rows = match filter {
            OrderFilter::Nothing => return Ok(vec![]),
            OrderFilter::All => sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT 100"))
                .fetch_all(&self.pool).await,
            OrderFilter::BillingCity(city) => sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE billing_city = $1 ORDER BY created_at DESC LIMIT 100"))
                .bind(city).fetch_all(&self.pool).await,
        }.map_err(db_err("list orders"))?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(order) = self.hydrate(row).await? { orders.push(order); }
        }
        Ok(orders)
    }
}

impl ActorStore for PgStore {
    async fn actor(&self, id: ActorId) -> Result<Option<Actor>> {
        let row: Option<(String, String)> = sqlx::query_as("SELECT display_name, role FROM users WHERE id = $1")
            .bind(id.value() as i64).fetch_optional(&self.pool).await.map_err(db_err("load user"))?;
        Ok(row.map(|(name, role)| Actor::new(id, name, Role::parse(&role))))
    }
}

impl CartStore for PgStore {
    async fn clear_cart(&self, session: &str) -> Result<usize> {
        let res = sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
            .bind(session).execute(&self.pool).await.map_err(db_err("clear cart"))?;
        Ok(res.rows_affected() as usize)
    }
}
