use crate::catalog::{Flight, FlightQuery, SortKey, StopsFilter, DEFAULT_PRICE_MAX};
use crate::customers::{self, CustomerContact};
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::orders::{self, IdempotencyFingerprint, NewOrder, PaymentStatus};
use crate::payment::{build_payment_reference, PaymentMethod, ReferenceSource};
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MAX_PAX: i32 = 9;
const MAX_CHANNEL_LEN: usize = 64;
const PLACEHOLDER_CUSTOMER_NAME: &str = "Customer";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        env: state.env_name.clone(),
        service: "Skyfare Orders API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn db_ping(State(state): State<AppState>) -> (StatusCode, Json<DbPingOut>) {
    let version = sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(&state.pool)
        .await;
    let pong = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await;
    match (version, pong) {
        (Ok(version), Ok(pong)) => (
            StatusCode::OK,
            Json(DbPingOut {
                ok: true,
                version: Some(version),
                pong: Some(pong),
            }),
        ),
        (version, pong) => {
            if let Some(e) = version.as_ref().err().or(pong.as_ref().err()) {
                tracing::error!(error = %e, "db ping failed");
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DbPingOut {
                    ok: false,
                    version: version.ok(),
                    pong: pong.ok(),
                }),
            )
        }
    }
}

fn parse_date(raw: &str, field: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("{field} must be YYYY-MM-DD")))
}

fn flight_query(params: SearchFlightsParams) -> ApiResult<FlightQuery> {
    let depart = match params.depart.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => Some(parse_date(d, "depart")?),
        _ => None,
    };
    let stops = StopsFilter::parse(params.stops.as_deref().unwrap_or(""))
        .ok_or_else(|| ApiError::bad_request("stops must be any, nonstop or transit"))?;
    let sort = SortKey::parse(params.sort.as_deref().unwrap_or(""))
        .ok_or_else(|| ApiError::bad_request("unsupported sort"))?;
    let airlines = params
        .airline
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(ToString::to_string)
        .collect();
    Ok(FlightQuery {
        from: params.from.unwrap_or_default(),
        to: params.to.unwrap_or_default(),
        depart,
        stops,
        airlines,
        price_min: params.price_min.unwrap_or(0),
        price_max: params.price_max.unwrap_or(DEFAULT_PRICE_MAX),
        sort,
    })
}

pub async fn search_flights(
    State(state): State<AppState>,
    params: Result<Query<SearchFlightsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Flight>>> {
    let Query(params) = params?;
    let query = flight_query(params)?;
    let found = state.catalog.search(&query);
    Ok(Json(found.into_iter().cloned().collect()))
}

pub async fn get_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> ApiResult<Json<Flight>> {
    state
        .catalog
        .flight(&flight_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("flight not found"))
}

fn parse_order_id(raw: &str) -> ApiResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("invalid order id")),
    }
}

fn resolve_channel(method: PaymentMethod, raw: Option<&str>) -> ApiResult<String> {
    let channel = raw.map(str::trim).unwrap_or("");
    if channel.chars().count() > MAX_CHANNEL_LEN {
        return Err(ApiError::bad_request("channel too long"));
    }
    if channel.is_empty() {
        return Ok(method.default_channel().to_string());
    }
    Ok(channel.to_string())
}

fn contact_from(body: &InitOrderReq) -> ApiResult<CustomerContact> {
    let trimmed = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();

    let email = trimmed(&body.contact.email).to_ascii_lowercase();
    if email.is_empty() {
        return Err(ApiError::bad_request("contact email required"));
    }
    if !email_re().is_match(&email) {
        return Err(ApiError::bad_request("invalid contact email"));
    }

    // Names fall back to the lead passenger when the contact block omits them.
    let lead = body.passengers.first();
    let name_part = |contact: &Option<String>, passenger: Option<&Option<String>>| {
        let own = trimmed(contact);
        if own.is_empty() {
            passenger.map(trimmed).unwrap_or_default()
        } else {
            own
        }
    };
    let first_name = name_part(&body.contact.first_middle, lead.map(|p| &p.first_middle));
    let last_name = name_part(&body.contact.last_name, lead.map(|p| &p.last_name));
    let full_name = match format!("{first_name} {last_name}").trim() {
        "" => PLACEHOLDER_CUSTOMER_NAME.to_string(),
        name => name.to_string(),
    };

    let identity_number = lead.map(|p| trimmed(&p.id_number)).unwrap_or_default();
    let birth_date = match lead.map(|p| trimmed(&p.birth_date)) {
        Some(d) if !d.is_empty() => Some(parse_date(&d, "birth_date")?),
        _ => None,
    };

    Ok(CustomerContact {
        first_name,
        last_name,
        full_name,
        email,
        phone: trimmed(&body.contact.phone),
        identity_number,
        birth_date,
    })
}

/// Everything an order insert needs, validated and priced, before any
/// database work starts.
#[derive(Debug)]
pub struct OrderDraft {
    pub contact: CustomerContact,
    pub method: PaymentMethod,
    pub channel: String,
    pub pax: i32,
    pub unit_price: i64,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub idempotency_key: String,
    pub notes: String,
}

pub fn prepare_order(
    state: &AppState,
    body: &InitOrderReq,
    now: DateTime<Utc>,
) -> ApiResult<OrderDraft> {
    let flight_id = body.flight_id.trim();
    if flight_id.is_empty() {
        return Err(ApiError::bad_request("flight_id required"));
    }
    let flight = state
        .catalog
        .flight(flight_id)
        .ok_or_else(|| ApiError::not_found("flight not found"))?;

    if body.pax > MAX_PAX {
        return Err(ApiError::bad_request(format!(
            "pax must be between 1 and {MAX_PAX}"
        )));
    }
    let pax = body.pax.max(1);

    let offering = flight
        .offering(body.cabin.as_deref().unwrap_or("economy"))
        .ok_or_else(|| ApiError::bad_request("fare not found"))?;
    let fare = offering
        .fare(body.fare_code.as_deref())
        .ok_or_else(|| ApiError::bad_request("fare not found"))?;

    let contact = contact_from(body)?;
    let channel = resolve_channel(body.method, body.channel.as_deref())?;

    let idempotency_key = IdempotencyFingerprint {
        flight_id: &flight.id,
        cabin: offering.cabin_class.as_str(),
        fare_code: &fare.code,
        pax,
        method: body.method,
        channel: &channel,
        email: &contact.email,
        local_now: state.local_time(now),
    }
    .key();

    let pick = |over: &Option<String>, fallback: String| {
        over.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .unwrap_or(fallback)
    };
    let notes = serde_json::json!({
        "flight_id": flight.id,
        "airline": flight.airline,
        "flight_code": flight.code,
        "from": pick(&body.from, flight.from.to_string()),
        "to": pick(&body.to, flight.to.to_string()),
        "depart": pick(&body.depart, flight.depart_date.to_string()),
        "return": body.return_date,
        "cabin": offering.cabin_class.as_str(),
        "fare_code": fare.code,
        "passengers": body.passengers,
    })
    .to_string();

    let unit_price = fare.price;
    let subtotal = unit_price * i64::from(pax);
    let discount = 0;
    Ok(OrderDraft {
        contact,
        method: body.method,
        channel,
        pax,
        unit_price,
        subtotal,
        discount,
        total: subtotal - discount,
        idempotency_key,
        notes,
    })
}

pub async fn init_order(
    State(state): State<AppState>,
    body: Result<Json<InitOrderReq>, JsonRejection>,
) -> ApiResult<Json<OrderInitOut>> {
    let Json(body) = body?;
    let now = Utc::now();
    let draft = prepare_order(&state, &body, now)?;
    let orders_table = state.table("orders");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::database("begin init", e))?;

    let customer_id =
        customers::resolve_customer(&mut tx, &state.table("customers"), &draft.contact)
            .await
            .map_err(|e| ApiError::database("resolve customer", e))?;

    let existing = orders::find_unpaid_by_key(&mut tx, &orders_table, &draft.idempotency_key, true)
        .await
        .map_err(|e| ApiError::database("find order by key", e))?;
    if let Some(existing) = existing {
        if !existing.is_overdue(now) {
            tx.commit()
                .await
                .map_err(|e| ApiError::database("commit init", e))?;
            tracing::info!(order_id = existing.id, code = %existing.code, "idempotent order replay");
            return Ok(Json(existing.init_view(&state.recipient_name)));
        }
        orders::cancel_if_overdue(&mut tx, &orders_table, existing.id, now)
            .await
            .map_err(|e| ApiError::database("expire order", e))?;
    }

    let prefix = orders::order_code_prefix(state.local_time(now));
    let code = orders::allocate_order_code(&mut tx, &orders_table, &prefix)
        .await
        .map_err(|e| ApiError::database("allocate order code", e))?;
    let reference = build_payment_reference(
        draft.method,
        &draft.channel,
        ReferenceSource::order(&code, draft.total),
    );

    let new_order = NewOrder {
        code: &code,
        customer_id,
        unit_price: draft.unit_price,
        qty: draft.pax,
        subtotal: draft.subtotal,
        discount: draft.discount,
        total: draft.total,
        method: draft.method,
        channel: &draft.channel,
        reference: &reference,
        expires_at: now + state.payment_expiry,
        idempotency_key: &draft.idempotency_key,
        notes: &draft.notes,
    };

    match orders::insert_order(&mut tx, &orders_table, &new_order).await {
        Ok(order) => {
            tx.commit()
                .await
                .map_err(|e| ApiError::database("commit init", e))?;
            tracing::info!(
                order_id = order.id,
                code = %order.code,
                customer_id,
                amount = order.total,
                method = draft.method.as_str(),
                "order created"
            );
            Ok(Json(order.init_view(&state.recipient_name)))
        }
        Err(e) if orders::is_idempotency_conflict(&e) => {
            // A concurrent request with the same key won the insert.
            tx.rollback().await.ok();
            let mut conn = state
                .pool
                .acquire()
                .await
                .map_err(|e| ApiError::database("acquire", e))?;
            let winner =
                orders::find_unpaid_by_key(&mut conn, &orders_table, &draft.idempotency_key, false)
                    .await
                    .map_err(|e| ApiError::database("find order by key", e))?;
            match winner {
                Some(order) => {
                    tracing::info!(order_id = order.id, code = %order.code, "idempotent order replay");
                    Ok(Json(order.init_view(&state.recipient_name)))
                }
                None => {
                    tracing::error!(key = %draft.idempotency_key, "unique violation without a visible order");
                    Err(ApiError::internal("database error"))
                }
            }
        }
        Err(e) => {
            tx.rollback().await.ok();
            Err(ApiError::database("insert order", e))
        }
    }
}

pub async fn order_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<OrderStatusOut>> {
    let id = parse_order_id(&raw_id)?;
    let table = state.table("orders");
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| ApiError::database("acquire", e))?;

    orders::cancel_if_overdue(&mut conn, &table, id, Utc::now())
        .await
        .map_err(|e| ApiError::database("expire order", e))?;
    let order = orders::fetch_order(&mut conn, &table, id, false)
        .await
        .map_err(|e| ApiError::database("fetch order", e))?
        .ok_or_else(|| ApiError::not_found("order not found"))?;
    Ok(Json(order.status_view()))
}

pub async fn change_method(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<MethodChangeReq>, JsonRejection>,
) -> ApiResult<Json<MethodChangeOut>> {
    let id = parse_order_id(&raw_id)?;
    let Json(body) = body?;
    let channel = resolve_channel(body.method, body.channel.as_deref())?;
    let now = Utc::now();
    let table = state.table("orders");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::database("begin method change", e))?;
    let order = orders::fetch_order(&mut tx, &table, id, true)
        .await
        .map_err(|e| ApiError::database("fetch order", e))?
        .ok_or_else(|| ApiError::not_found("order not found"))?;

    if order.payment_status != PaymentStatus::Unpaid {
        return Err(ApiError::conflict("order is not awaiting payment"));
    }
    if order.is_overdue(now) {
        orders::cancel_if_overdue(&mut tx, &table, id, now)
            .await
            .map_err(|e| ApiError::database("expire order", e))?;
        tx.commit()
            .await
            .map_err(|e| ApiError::database("commit method change", e))?;
        return Err(ApiError::conflict("order expired"));
    }

    let reference = build_payment_reference(
        body.method,
        &channel,
        ReferenceSource::order(&order.code, order.total),
    );
    let updated = orders::update_payment_method(
        &mut tx,
        &table,
        id,
        body.method,
        &channel,
        &reference,
        now + state.payment_expiry,
    )
    .await
    .map_err(|e| ApiError::database("update payment method", e))?;
    tx.commit()
        .await
        .map_err(|e| ApiError::database("commit method change", e))?;

    tracing::info!(
        order_id = id,
        method = body.method.as_str(),
        channel = %updated.payment_channel,
        "payment method changed"
    );
    Ok(Json(MethodChangeOut {
        order_id: updated.id,
        payment_method: updated.payment_method,
        payment_channel: updated.payment_channel,
        payment_reference: updated.payment_reference,
        payment_expires_at: updated.payment_expires_at,
    }))
}

/// Called by the payment side once money has arrived.
pub async fn confirm_paid(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<OrderStatusOut>> {
    let id = parse_order_id(&raw_id)?;
    let now = Utc::now();
    let table = state.table("orders");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::database("begin confirm", e))?;
    let order = orders::fetch_order(&mut tx, &table, id, true)
        .await
        .map_err(|e| ApiError::database("fetch order", e))?
        .ok_or_else(|| ApiError::not_found("order not found"))?;

    match order.payment_status {
        PaymentStatus::Paid => return Ok(Json(order.status_view())),
        PaymentStatus::Cancel => return Err(ApiError::conflict("order cancelled")),
        PaymentStatus::Unpaid => {}
    }
    if order.is_overdue(now) {
        orders::cancel_if_overdue(&mut tx, &table, id, now)
            .await
            .map_err(|e| ApiError::database("expire order", e))?;
        tx.commit()
            .await
            .map_err(|e| ApiError::database("commit confirm", e))?;
        return Err(ApiError::conflict("order expired"));
    }

    let paid = orders::mark_paid(&mut tx, &table, id, now)
        .await
        .map_err(|e| ApiError::database("mark paid", e))?;
    tx.commit()
        .await
        .map_err(|e| ApiError::database("commit confirm", e))?;
    tracing::info!(order_id = id, code = %paid.code, amount = paid.total, "order paid");
    Ok(Json(paid.status_view()))
}
