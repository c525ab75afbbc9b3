mod from_row;
mod schema;
pub mod queries;

pub use from_row::FromRow;
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::providers::{MpesaClient, PaystackClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, provider clients, and the
/// configuration the engine needs at request time.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub mpesa: MpesaClient,
    pub paystack: PaystackClient,
    /// Shared secret for operator endpoints, compared constant-time.
    pub operator_token: String,
    /// VAT rate in basis points for invoice line splits.
    pub vat_rate_bps: i64,
    /// One-time registration fee charged on signup intents.
    pub signup_fee_cents: i64,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        // Webhook and confirm handlers write concurrently; WAL plus a busy
        // timeout lets IMMEDIATE transactions queue instead of erroring.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });
    Pool::builder().max_size(10).build(manager)
}
