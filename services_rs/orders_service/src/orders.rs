//! Order rows, order codes and idempotency keys.

use crate::models::{OrderInitOut, OrderStatusOut};
use crate::payment::PaymentMethod;
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

pub const FLIGHT_TICKET_PRODUCT_ID: i32 = 2;
const CODE_PREFIX: &str = "ORD-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Cancel,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancel => "CANCEL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PAID" => Some(PaymentStatus::Paid),
            "CANCEL" => Some(PaymentStatus::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: i64,
    pub code: String,
    pub total: i64,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub payment_channel: String,
    pub payment_reference: String,
    pub payment_expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

const ORDER_COLUMNS: &str = "id,code,total,payment_method,payment_status,payment_channel,\
                             payment_reference,payment_expires_at,paid_at";

impl OrderRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("payment_status")?;
        let payment_status =
            PaymentStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "payment_status".to_string(),
                source: format!("unknown payment status {status:?}").into(),
            })?;
        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            total: row.try_get("total")?,
            payment_method: row.try_get("payment_method")?,
            payment_status,
            payment_channel: row.try_get("payment_channel")?,
            payment_reference: row.try_get("payment_reference")?,
            payment_expires_at: row.try_get("payment_expires_at")?,
            paid_at: row.try_get("paid_at")?,
        })
    }

    /// UNPAID with the payment window already closed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.payment_status == PaymentStatus::Unpaid && self.payment_expires_at <= now
    }

    pub fn status_view(&self) -> OrderStatusOut {
        OrderStatusOut {
            order_id: self.id,
            code: self.code.clone(),
            payment_status: self.payment_status.as_str().to_string(),
            payment_method: self.payment_method.clone(),
            payment_channel: self.payment_channel.clone(),
            payment_reference: self.payment_reference.clone(),
            payment_expires_at: self.payment_expires_at,
            paid_at: self.paid_at,
            amount: self.total,
        }
    }

    pub fn init_view(&self, recipient_name: &str) -> OrderInitOut {
        OrderInitOut {
            order_id: self.id,
            code: self.code.clone(),
            payment_method: self.payment_method.clone(),
            payment_channel: self.payment_channel.clone(),
            payment_reference: self.payment_reference.clone(),
            payment_expires_at: self.payment_expires_at,
            amount: self.total,
            payment_status: self.payment_status.as_str().to_string(),
            recipient_name: recipient_name.to_string(),
        }
    }
}

/// `ORD-YYMM` for the given local month.
pub fn order_code_prefix(local: DateTime<FixedOffset>) -> String {
    format!("{CODE_PREFIX}{:02}{:02}", local.year() % 100, local.month())
}

/// Successor of `last` within `prefix`, starting at `0001`. Past 9999 the
/// sequence simply grows a digit.
pub fn next_order_code(prefix: &str, last: Option<&str>) -> String {
    let seq = last
        .and_then(|code| code.strip_prefix(prefix))
        .and_then(|tail| tail.parse::<u64>().ok())
        .map_or(1, |n| n + 1);
    format!("{prefix}{seq:04}")
}

/// The request fields that make two order attempts "the same order".
#[derive(Debug, Clone)]
pub struct IdempotencyFingerprint<'a> {
    pub flight_id: &'a str,
    pub cabin: &'a str,
    pub fare_code: &'a str,
    pub pax: i32,
    pub method: PaymentMethod,
    pub channel: &'a str,
    pub email: &'a str,
    pub local_now: DateTime<FixedOffset>,
}

impl IdempotencyFingerprint<'_> {
    /// `flight|cabin|fare|pax|method|channel|email|YYYY-MM`
    pub fn key(&self) -> String {
        let month = format!("{:04}-{:02}", self.local_now.year(), self.local_now.month());
        [
            self.flight_id,
            self.cabin,
            self.fare_code,
            &self.pax.to_string(),
            self.method.as_str(),
            self.channel,
            &self.email.to_ascii_lowercase(),
            &month,
        ]
        .join("|")
    }
}

/// Partial unique index that keeps one UNPAID order per idempotency key.
pub const UNPAID_KEY_CONSTRAINT: &str = "uq_orders_unpaid_idempotency";

/// True only when the insert lost the race for an idempotency key; other
/// unique violations (such as a duplicate code) are plain database errors.
pub fn is_idempotency_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && db.constraint() == Some(UNPAID_KEY_CONSTRAINT)
    })
}

/// Next code for the month. The advisory lock serializes allocators for the
/// same prefix even when no row for the month exists yet to lock.
pub async fn allocate_order_code(
    conn: &mut PgConnection,
    table: &str,
    prefix: &str,
) -> Result<String, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('order-code:' || $1)::bigint)")
        .bind(prefix)
        .execute(&mut *conn)
        .await?;

    let last: Option<String> = sqlx::query_scalar(&format!(
        "SELECT code FROM {table} WHERE code LIKE $1 \
         ORDER BY LENGTH(code) DESC, code DESC LIMIT 1 FOR UPDATE"
    ))
    .bind(format!("{prefix}%"))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(next_order_code(prefix, last.as_deref()))
}

pub async fn find_unpaid_by_key(
    conn: &mut PgConnection,
    table: &str,
    key: &str,
    for_update: bool,
) -> Result<Option<OrderRow>, sqlx::Error> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM {table} \
         WHERE idempotency_key=$1 AND payment_status='UNPAID' LIMIT 1{lock}"
    ))
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(OrderRow::from_row).transpose()
}

pub async fn fetch_order(
    conn: &mut PgConnection,
    table: &str,
    id: i64,
    for_update: bool,
) -> Result<Option<OrderRow>, sqlx::Error> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM {table} WHERE id=$1{lock}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(OrderRow::from_row).transpose()
}

/// Flips an UNPAID order whose window has closed to CANCEL. Returns whether
/// a row changed; the status predicate keeps this safe against a concurrent
/// payment confirmation.
pub async fn cancel_if_overdue(
    conn: &mut PgConnection,
    table: &str,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(&format!(
        "UPDATE {table} SET payment_status='CANCEL', status='CANCELLED', updated_at=NOW() \
         WHERE id=$1 AND payment_status='UNPAID' AND payment_expires_at <= $2"
    ))
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let cancelled = res.rows_affected() > 0;
    if cancelled {
        tracing::info!(order_id = id, "unpaid order expired");
    }
    Ok(cancelled)
}

#[derive(Debug)]
pub struct NewOrder<'a> {
    pub code: &'a str,
    pub customer_id: i64,
    pub unit_price: i64,
    pub qty: i32,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub method: PaymentMethod,
    pub channel: &'a str,
    pub reference: &'a str,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: &'a str,
    pub notes: &'a str,
}

pub async fn insert_order(
    conn: &mut PgConnection,
    table: &str,
    order: &NewOrder<'_>,
) -> Result<OrderRow, sqlx::Error> {
    let row = sqlx::query(&format!(
        "INSERT INTO {table} (\
         code,customer_id,product_id,unit_price,qty,subtotal,discount,total,\
         payment_method,payment_status,payment_channel,payment_reference,payment_expires_at,\
         status,idempotency_key,notes,pax_count\
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,'UNPAID',$10,$11,$12,'CREATED',$13,$14,$5) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.code)
    .bind(order.customer_id)
    .bind(FLIGHT_TICKET_PRODUCT_ID)
    .bind(order.unit_price)
    .bind(order.qty)
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(order.total)
    .bind(order.method.label())
    .bind(order.channel)
    .bind(order.reference)
    .bind(order.expires_at)
    .bind(order.idempotency_key)
    .bind(order.notes)
    .fetch_one(&mut *conn)
    .await?;
    OrderRow::from_row(&row)
}

pub async fn update_payment_method(
    conn: &mut PgConnection,
    table: &str,
    id: i64,
    method: PaymentMethod,
    channel: &str,
    reference: &str,
    expires_at: DateTime<Utc>,
) -> Result<OrderRow, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE {table} SET payment_method=$1, payment_channel=$2, payment_reference=$3, \
         payment_expires_at=$4, updated_at=NOW() WHERE id=$5 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(method.label())
    .bind(channel)
    .bind(reference)
    .bind(expires_at)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    OrderRow::from_row(&row)
}

pub async fn mark_paid(
    conn: &mut PgConnection,
    table: &str,
    id: i64,
    now: DateTime<Utc>,
) -> Result<OrderRow, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE {table} SET payment_status='PAID', status='PAID', paid_at=$1, updated_at=NOW() \
         WHERE id=$2 AND payment_status='UNPAID' RETURNING {ORDER_COLUMNS}"
    ))
    .bind(now)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    OrderRow::from_row(&row)
}
