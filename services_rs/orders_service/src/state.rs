use crate::catalog::Catalog;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub db_schema: Option<String>,
    pub env_name: String,
    pub catalog: Arc<Catalog>,
    pub payment_expiry: Duration,
    pub business_tz: FixedOffset,
    pub recipient_name: String,
}

impl AppState {
    pub fn table(&self, name: &str) -> String {
        match &self.db_schema {
            Some(s) => format!("{s}.{name}"),
            None => name.to_string(),
        }
    }

    /// Wall clock in the business time zone; order codes and idempotency
    /// months are cut on this calendar.
    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.business_tz)
    }
}
