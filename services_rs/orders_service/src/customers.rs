use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

pub const IDENTITY_TYPE: &str = "KTP";

/// Contact data for the person paying for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContact {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    /// Lowercased.
    pub email: String,
    pub phone: String,
    pub identity_number: String,
    pub birth_date: Option<NaiveDate>,
}

impl CustomerContact {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            identity_number: row.try_get("identity_number")?,
            birth_date: row.try_get("birth_date")?,
        })
    }

    fn has_name(&self) -> bool {
        !self.first_name.is_empty() || !self.last_name.is_empty()
    }

    /// The stored record overlaid with every non-empty field of `incoming`,
    /// or `None` when that changes nothing.
    pub fn merged_with(&self, incoming: &CustomerContact) -> Option<CustomerContact> {
        fn pick(current: &str, new: &str) -> String {
            let value = if new.is_empty() { current } else { new };
            value.to_string()
        }

        let mut merged = CustomerContact {
            first_name: pick(&self.first_name, &incoming.first_name),
            last_name: pick(&self.last_name, &incoming.last_name),
            full_name: self.full_name.clone(),
            email: pick(&self.email, &incoming.email),
            phone: pick(&self.phone, &incoming.phone),
            identity_number: pick(&self.identity_number, &incoming.identity_number),
            birth_date: incoming.birth_date.or(self.birth_date),
        };
        if incoming.has_name() {
            merged.full_name = incoming.full_name.clone();
        }
        (merged != *self).then_some(merged)
    }
}

const CUSTOMER_COLUMNS: &str =
    "id,first_name,last_name,full_name,email,phone,identity_number,birth_date";

/// Finds the customer by email, falling back to the identity number for
/// older rows, then creates or refreshes it. Must run inside a transaction:
/// a per-email advisory lock keeps concurrent first orders from creating
/// duplicate customers.
pub async fn resolve_customer(
    conn: &mut PgConnection,
    table: &str,
    contact: &CustomerContact,
) -> Result<i64, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('customer:' || $1)::bigint)")
        .bind(&contact.email)
        .execute(&mut *conn)
        .await?;

    let mut found = sqlx::query(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM {table} WHERE LOWER(email)=$1 ORDER BY id ASC LIMIT 1 FOR UPDATE"
    ))
    .bind(&contact.email)
    .fetch_optional(&mut *conn)
    .await?;

    if found.is_none() && !contact.identity_number.is_empty() {
        found = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM {table} WHERE identity_number=$1 ORDER BY id ASC LIMIT 1 FOR UPDATE"
        ))
        .bind(&contact.identity_number)
        .fetch_optional(&mut *conn)
        .await?;
    }

    let Some(row) = found else {
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {table} (first_name,last_name,full_name,identity_type,identity_number,birth_date,phone,email,active) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,TRUE) RETURNING id"
        ))
        .bind(if contact.first_name.is_empty() {
            &contact.full_name
        } else {
            &contact.first_name
        })
        .bind(&contact.last_name)
        .bind(&contact.full_name)
        .bind(IDENTITY_TYPE)
        .bind(&contact.identity_number)
        .bind(contact.birth_date)
        .bind(&contact.phone)
        .bind(&contact.email)
        .fetch_one(&mut *conn)
        .await?;
        tracing::info!(customer_id = id, "customer created");
        return Ok(id);
    };

    let id: i64 = row.try_get("id")?;
    let stored = CustomerContact::from_row(&row)?;
    if let Some(updated) = stored.merged_with(contact) {
        sqlx::query(&format!(
            "UPDATE {table} SET first_name=$1,last_name=$2,full_name=$3,email=$4,phone=$5,\
             identity_number=$6,birth_date=$7,updated_at=NOW() WHERE id=$8"
        ))
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(&updated.full_name)
        .bind(&updated.email)
        .bind(&updated.phone)
        .bind(&updated.identity_number)
        .bind(updated.birth_date)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        tracing::info!(customer_id = id, "customer contact updated");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> CustomerContact {
        CustomerContact {
            first_name: "Sari".to_string(),
            last_name: "Wulandari".to_string(),
            full_name: "Sari Wulandari".to_string(),
            email: "sari@example.id".to_string(),
            phone: "0811000".to_string(),
            identity_number: String::new(),
            birth_date: None,
        }
    }

    #[test]
    fn identical_contact_needs_no_update() {
        assert_eq!(stored().merged_with(&stored()), None);
    }

    #[test]
    fn empty_incoming_fields_keep_stored_values() {
        let incoming = CustomerContact {
            first_name: String::new(),
            last_name: String::new(),
            full_name: "Customer".to_string(),
            phone: String::new(),
            ..stored()
        };
        assert_eq!(stored().merged_with(&incoming), None);
    }

    #[test]
    fn changed_fields_are_overlaid() {
        let incoming = CustomerContact {
            phone: "0822999".to_string(),
            identity_number: "3171000000000001".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
            ..stored()
        };
        let merged = stored().merged_with(&incoming).expect("changes");
        assert_eq!(merged.phone, "0822999");
        assert_eq!(merged.identity_number, "3171000000000001");
        assert_eq!(merged.first_name, "Sari");
        assert_eq!(merged.birth_date, NaiveDate::from_ymd_opt(1990, 4, 2));
    }

    #[test]
    fn renamed_contact_updates_full_name() {
        let incoming = CustomerContact {
            last_name: "Putri".to_string(),
            full_name: "Sari Putri".to_string(),
            ..stored()
        };
        let merged = stored().merged_with(&incoming).expect("changes");
        assert_eq!(merged.full_name, "Sari Putri");
        assert_eq!(merged.last_name, "Putri");
    }
}
