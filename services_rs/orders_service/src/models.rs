use crate::payment::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ContactIn {
    pub first_middle: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct PassengerIn {
    pub title: Option<String>,
    pub first_middle: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub id_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitOrderReq {
    pub flight_id: String,
    pub fare_code: Option<String>,
    pub cabin: Option<String>,
    #[serde(default = "default_pax")]
    pub pax: i32,
    pub from: Option<String>,
    pub to: Option<String>,
    pub depart: Option<String>,
    pub return_date: Option<String>,
    pub method: PaymentMethod,
    pub channel: Option<String>,
    #[serde(default)]
    pub contact: ContactIn,
    #[serde(default)]
    pub passengers: Vec<PassengerIn>,
}

fn default_pax() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct OrderInitOut {
    pub order_id: i64,
    pub code: String,
    pub payment_method: String,
    pub payment_channel: String,
    pub payment_reference: String,
    pub payment_expires_at: DateTime<Utc>,
    pub amount: i64,
    pub payment_status: String,
    pub recipient_name: String,
}

#[derive(Debug, Deserialize)]
pub struct MethodChangeReq {
    pub method: PaymentMethod,
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MethodChangeOut {
    pub order_id: i64,
    pub payment_method: String,
    pub payment_channel: String,
    pub payment_reference: String,
    pub payment_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusOut {
    pub order_id: i64,
    pub code: String,
    pub payment_status: String,
    pub payment_method: String,
    pub payment_channel: String,
    pub payment_reference: String,
    pub payment_expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchFlightsParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub depart: Option<String>,
    pub stops: Option<String>,
    pub airline: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub env: String,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DbPingOut {
    pub ok: bool,
    pub version: Option<String>,
    pub pong: Option<i32>,
}
