use chrono::{FixedOffset, NaiveDate};
use regex::Regex;
use skyfare_common::secret_policy;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub env_name: String,

    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,

    pub db_url: String,
    pub db_schema: Option<String>,
    pub db_max_connections: u32,

    pub payment_expiry_minutes: i64,
    pub business_tz: FixedOffset,
    pub mock_base_date: NaiveDate,
    pub recipient_name: String,

    pub require_internal_secret: bool,
    pub internal_secret: Option<String>,
    pub internal_allowed_callers: Vec<String>,

    pub allowed_hosts: Vec<String>,
    pub allowed_origins: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_db_url(raw: &str) -> String {
    // "postgresql+asyncpg://..." style URLs: drop the "+driver" part.
    if let Some((scheme, rest)) = raw.split_once(':') {
        if let Some((base, _driver)) = scheme.split_once('+') {
            return format!("{base}:{rest}");
        }
    }
    raw.to_string()
}

fn validate_postgres_url(url: &str) -> Result<(), String> {
    let scheme = url
        .split_once(':')
        .map(|(s, _)| s.trim().to_lowercase())
        .unwrap_or_default();
    match scheme.as_str() {
        "postgres" | "postgresql" => Ok(()),
        _ => Err("ORDERS_DB_URL (or DB_URL) must be a postgres URL".to_string()),
    }
}

fn parse_bool_like(raw: &str) -> Option<bool> {
    let v = raw.trim().to_lowercase();
    if v.is_empty() {
        return None;
    }
    Some(!matches!(v.as_str(), "0" | "false" | "no" | "off"))
}

fn parse_clamped<T>(key: &str, default: &str, min: T, max: T) -> Result<T, String>
where
    T: std::str::FromStr + Ord,
{
    let v: T = env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| format!("{key} must be an integer"))?;
    Ok(v.clamp(min, max))
}

/// `+07:00` / `-03:30` style UTC offsets.
fn parse_tz_offset(raw: &str) -> Result<FixedOffset, String> {
    let err = || "ORDERS_TZ_OFFSET must look like +07:00".to_string();
    let re = Regex::new(r"^([+-])(\d{2}):(\d{2})$").map_err(|e| e.to_string())?;
    let caps = re.captures(raw.trim()).ok_or_else(err)?;
    let hours: i32 = caps[2].parse().map_err(|_| err())?;
    let minutes: i32 = caps[3].parse().map_err(|_| err())?;
    if hours > 14 || minutes > 59 {
        return Err(err());
    }
    let secs = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(secs).ok_or_else(err)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_name = env_or("ENV", "dev");
        let env_lower = env_name.trim().to_lowercase();
        let prod_like = matches!(env_lower.as_str(), "prod" | "production" | "staging");
        let dev_like = matches!(env_lower.as_str(), "dev" | "test");

        let host = env_or("APP_HOST", "0.0.0.0");
        let port: u16 = env_or("APP_PORT", "8080")
            .parse()
            .map_err(|_| "APP_PORT must be a valid u16".to_string())?;

        let db_raw = env_opt("ORDERS_DB_URL")
            .or_else(|| env_opt("DB_URL"))
            .unwrap_or_else(|| "postgresql://skyfare:skyfare@db:5432/skyfare".to_string());
        let db_url = normalize_db_url(&db_raw);
        validate_postgres_url(&db_url)?;

        let db_schema = env_opt("DB_SCHEMA");
        if let Some(s) = &db_schema {
            let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| e.to_string())?;
            if !re.is_match(s) {
                return Err("DB_SCHEMA must match ^[A-Za-z_][A-Za-z0-9_]*$".to_string());
            }
        }
        let db_max_connections = parse_clamped("ORDERS_DB_MAX_CONNECTIONS", "10", 1u32, 100)?;

        let payment_expiry_minutes =
            parse_clamped("ORDERS_PAYMENT_EXPIRY_MINUTES", "30", 1i64, 24 * 60)?;
        let business_tz = parse_tz_offset(&env_or("ORDERS_TZ_OFFSET", "+07:00"))?;
        let mock_base_date = NaiveDate::parse_from_str(
            env_or("MOCK_BASE_DATE", "2025-09-26").trim(),
            "%Y-%m-%d",
        )
        .map_err(|_| "MOCK_BASE_DATE must be YYYY-MM-DD".to_string())?;
        let recipient_name = env_opt("ORDERS_RECIPIENT_NAME")
            .unwrap_or_else(|| "PT Jenovac Infinity Royal".to_string());

        let require_internal_secret =
            parse_bool_like(&env_or("ORDERS_REQUIRE_INTERNAL_SECRET", "")).unwrap_or(prod_like);
        if prod_like && !require_internal_secret {
            return Err("ORDERS_REQUIRE_INTERNAL_SECRET must be true in prod/staging".to_string());
        }
        let internal_secret = env_opt("ORDERS_INTERNAL_SECRET");
        if require_internal_secret && internal_secret.is_none() {
            return Err(
                "ORDERS_INTERNAL_SECRET must be set when ORDERS_REQUIRE_INTERNAL_SECRET is enabled"
                    .to_string(),
            );
        }
        secret_policy::enforce_secret_policy(
            &env_name,
            "ORDERS_INTERNAL_SECRET",
            internal_secret.as_deref(),
            require_internal_secret,
        )?;
        let mut internal_allowed_callers: Vec<String> =
            parse_csv(&env_or("ORDERS_INTERNAL_ALLOWED_CALLERS", ""))
                .into_iter()
                .map(|c| c.to_ascii_lowercase())
                .collect();
        if internal_allowed_callers.is_empty() && prod_like {
            internal_allowed_callers = vec!["payments".to_string()];
        }

        let mut allowed_hosts = parse_csv(&env_or("ALLOWED_HOSTS", ""));
        if dev_like {
            for extra in ["localhost", "127.0.0.1"] {
                if !allowed_hosts.iter().any(|h| h == extra) {
                    allowed_hosts.push(extra.to_string());
                }
            }
        }
        if prod_like && allowed_hosts.is_empty() {
            return Err("ALLOWED_HOSTS must be set in prod/staging".to_string());
        }
        if prod_like && allowed_hosts.iter().any(|h| h == "*") {
            return Err("ALLOWED_HOSTS must not contain '*' in prod/staging".to_string());
        }

        let mut allowed_origins = parse_csv(&env_or("ALLOWED_ORIGINS", ""));
        if allowed_origins.is_empty() {
            allowed_origins = vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ];
        }
        if prod_like && allowed_origins.iter().any(|o| o == "*") {
            return Err("ALLOWED_ORIGINS must not contain '*' in prod/staging".to_string());
        }
        if prod_like && allowed_origins.iter().any(|o| !o.starts_with("https://")) {
            return Err("ALLOWED_ORIGINS must use https:// origins in prod/staging".to_string());
        }

        let max_body_bytes =
            parse_clamped("ORDERS_MAX_BODY_BYTES", "1048576", 16 * 1024usize, 10 * 1024 * 1024)?;

        Ok(Self {
            env_name,
            host,
            port,
            max_body_bytes,
            db_url,
            db_schema,
            db_max_connections,
            payment_expiry_minutes,
            business_tz,
            mock_base_date,
            recipient_name,
            require_internal_secret,
            internal_secret,
            internal_allowed_callers,
            allowed_hosts,
            allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const KEYS: &[&str] = &[
        "ENV",
        "APP_PORT",
        "ORDERS_DB_URL",
        "DB_URL",
        "DB_SCHEMA",
        "ORDERS_DB_MAX_CONNECTIONS",
        "ORDERS_MAX_BODY_BYTES",
        "ORDERS_PAYMENT_EXPIRY_MINUTES",
        "ORDERS_TZ_OFFSET",
        "MOCK_BASE_DATE",
        "ORDERS_RECIPIENT_NAME",
        "ORDERS_REQUIRE_INTERNAL_SECRET",
        "ORDERS_INTERNAL_SECRET",
        "ORDERS_INTERNAL_ALLOWED_CALLERS",
        "ALLOWED_HOSTS",
        "ALLOWED_ORIGINS",
    ];

    /// Clears every config key for the test and restores the old values on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK
                .get_or_init(|| Mutex::new(()))
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let saved = KEYS
                .iter()
                .map(|k| {
                    let old = env::var(k).ok();
                    env::remove_var(k);
                    (*k, old)
                })
                .collect();
            Self {
                saved,
                _lock: lock,
            }
        }

        fn set_prod_baseline(&self) {
            env::set_var("ENV", "prod");
            env::set_var("ORDERS_DB_URL", "postgresql://u:p@localhost:5432/orders");
            env::set_var("ORDERS_INTERNAL_SECRET", "Zq8t-4vWm_2rLx9PkE3n");
            env::set_var("ALLOWED_HOSTS", "api.skyfare.id");
            env::set_var("ALLOWED_ORIGINS", "https://skyfare.id");
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in self.saved.drain(..) {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn dev_defaults() {
        let _env = EnvGuard::new();
        let cfg = Config::from_env().expect("dev config");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.payment_expiry_minutes, 30);
        assert_eq!(cfg.business_tz.local_minus_utc(), 7 * 3600);
        assert_eq!(cfg.mock_base_date, NaiveDate::from_ymd_opt(2025, 9, 26).unwrap());
        assert!(!cfg.require_internal_secret);
        assert!(cfg.allowed_hosts.contains(&"localhost".to_string()));
        assert_eq!(cfg.recipient_name, "PT Jenovac Infinity Royal");
    }

    #[test]
    fn driver_suffix_is_stripped_and_non_postgres_rejected() {
        let _env = EnvGuard::new();
        env::set_var("DB_URL", "postgresql+asyncpg://u:p@db:5432/orders");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.db_url, "postgresql://u:p@db:5432/orders");

        env::set_var("ORDERS_DB_URL", "mysql://root@localhost/orders");
        let err = Config::from_env().expect_err("mysql must be rejected");
        assert!(err.contains("postgres"));
    }

    #[test]
    fn rejects_bad_schema_and_tz() {
        let _env = EnvGuard::new();
        env::set_var("DB_SCHEMA", "orders;drop");
        assert!(Config::from_env().is_err());
        env::remove_var("DB_SCHEMA");

        env::set_var("ORDERS_TZ_OFFSET", "Asia/Jakarta");
        assert!(Config::from_env().is_err());
        env::set_var("ORDERS_TZ_OFFSET", "-03:30");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.business_tz.local_minus_utc(), -(3 * 3600 + 30 * 60));
    }

    #[test]
    fn numeric_settings_are_clamped() {
        let _env = EnvGuard::new();
        env::set_var("ORDERS_MAX_BODY_BYTES", "1");
        env::set_var("ORDERS_PAYMENT_EXPIRY_MINUTES", "0");
        env::set_var("ORDERS_DB_MAX_CONNECTIONS", "5000");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.max_body_bytes, 16 * 1024);
        assert_eq!(cfg.payment_expiry_minutes, 1);
        assert_eq!(cfg.db_max_connections, 100);

        env::set_var("ORDERS_PAYMENT_EXPIRY_MINUTES", "soon");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn prod_baseline_is_accepted() {
        let env = EnvGuard::new();
        env.set_prod_baseline();
        let cfg = Config::from_env().expect("prod config");
        assert!(cfg.require_internal_secret);
        assert_eq!(cfg.internal_allowed_callers, vec!["payments".to_string()]);
    }

    #[test]
    fn prod_rejects_internal_secret_toggle_off() {
        let env = EnvGuard::new();
        env.set_prod_baseline();
        env::set_var("ORDERS_REQUIRE_INTERNAL_SECRET", "false");
        let err = Config::from_env().expect_err("must be rejected");
        assert!(err.contains("ORDERS_REQUIRE_INTERNAL_SECRET must be true"));
    }

    #[test]
    fn prod_rejects_weak_internal_secret() {
        let env = EnvGuard::new();
        env.set_prod_baseline();
        env::set_var("ORDERS_INTERNAL_SECRET", "change-me-orders-secret");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn prod_rejects_wildcards_and_plain_http_origins() {
        let env = EnvGuard::new();
        env.set_prod_baseline();
        env::set_var("ALLOWED_HOSTS", "*");
        let err = Config::from_env().expect_err("wildcard host");
        assert!(err.contains("ALLOWED_HOSTS"));

        env::set_var("ALLOWED_HOSTS", "api.skyfare.id");
        env::set_var("ALLOWED_ORIGINS", "http://skyfare.id");
        let err = Config::from_env().expect_err("http origin");
        assert!(err.contains("https://"));
    }
}
