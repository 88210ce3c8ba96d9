use sqlx::postgres::{PgPool, PgPoolOptions};

fn table_name(schema: &Option<String>, name: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

pub async fn connect(db_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool, db_schema: &Option<String>) -> Result<(), sqlx::Error> {
    if let Some(schema) = db_schema {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(pool)
            .await?;
    }

    let customers = table_name(db_schema, "customers");
    let orders = table_name(db_schema, "orders");

    let ddls = [
        format!(
            "CREATE TABLE IF NOT EXISTS {customers} (\
             id BIGSERIAL PRIMARY KEY,\
             first_name VARCHAR(120) NOT NULL,\
             last_name VARCHAR(120) NOT NULL DEFAULT '',\
             full_name VARCHAR(255) NOT NULL,\
             identity_type VARCHAR(16) NOT NULL DEFAULT 'KTP',\
             identity_number VARCHAR(64) NOT NULL DEFAULT '',\
             birth_date DATE,\
             phone VARCHAR(32) NOT NULL DEFAULT '',\
             email VARCHAR(255) NOT NULL DEFAULT '',\
             active BOOLEAN NOT NULL DEFAULT TRUE,\
             created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\
             updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {orders} (\
             id BIGSERIAL PRIMARY KEY,\
             code VARCHAR(32) NOT NULL UNIQUE,\
             customer_id BIGINT NOT NULL REFERENCES {customers}(id),\
             product_id INTEGER NOT NULL,\
             unit_price BIGINT NOT NULL,\
             qty INTEGER NOT NULL,\
             subtotal BIGINT NOT NULL,\
             discount BIGINT NOT NULL DEFAULT 0,\
             total BIGINT NOT NULL,\
             payment_method VARCHAR(32) NOT NULL,\
             payment_status VARCHAR(16) NOT NULL DEFAULT 'UNPAID',\
             payment_channel VARCHAR(64) NOT NULL,\
             payment_reference VARCHAR(64) NOT NULL,\
             payment_expires_at TIMESTAMPTZ NOT NULL,\
             paid_at TIMESTAMPTZ,\
             status VARCHAR(16) NOT NULL DEFAULT 'CREATED',\
             idempotency_key VARCHAR(512) NOT NULL,\
             notes TEXT,\
             pax_count INTEGER NOT NULL,\
             created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\
             updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
             )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_customers_email ON {customers}(LOWER(email))"),
        format!("CREATE INDEX IF NOT EXISTS idx_customers_identity ON {customers}(identity_number)"),
        // One UNPAID order per idempotency key; paid and cancelled orders keep
        // their key for audit without blocking a fresh attempt.
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} \
             ON {orders}(idempotency_key) WHERE payment_status = 'UNPAID'",
            crate::orders::UNPAID_KEY_CONSTRAINT
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_orders_customer ON {orders}(customer_id)"),
    ];

    for ddl in ddls {
        sqlx::query(&ddl).execute(pool).await?;
    }
    Ok(())
}
