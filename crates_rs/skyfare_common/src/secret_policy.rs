use crate::is_production_like;

const PLACEHOLDERS: &[&str] = &[
    "changeme",
    "change-me",
    "secret",
    "password",
    "default",
    "example",
    "internal",
    "orders",
    "skyfare",
    "test",
];

const PLACEHOLDER_FRAGMENTS: &[&str] = &[
    "change-me",
    "change_me",
    "replace-me",
    "replace_me",
    "set-me",
    "your-secret",
    "your_secret",
    "dev-secret",
    "dev_secret",
];

const MIN_PROD_SECRET_LEN: usize = 16;

/// Rejects missing, short or placeholder-looking secrets when running in a
/// production-like environment. Dev and test accept anything.
pub fn enforce_secret_policy(
    env_name: &str,
    key: &str,
    value: Option<&str>,
    required_in_prod: bool,
) -> Result<(), String> {
    if !is_production_like(env_name) {
        return Ok(());
    }

    let secret = value.map(str::trim).unwrap_or("");
    if secret.is_empty() {
        return if required_in_prod {
            Err(format!("{key} must be set in prod/staging"))
        } else {
            Ok(())
        };
    }

    if secret.len() < MIN_PROD_SECRET_LEN {
        return Err(format!(
            "{key} must be at least {MIN_PROD_SECRET_LEN} characters in prod/staging"
        ));
    }
    if looks_like_placeholder(secret) {
        return Err(format!(
            "{key} looks like a placeholder value; use a strong random secret"
        ));
    }
    Ok(())
}

fn looks_like_placeholder(secret: &str) -> bool {
    let s = secret.to_ascii_lowercase();
    PLACEHOLDERS.contains(&s.as_str()) || PLACEHOLDER_FRAGMENTS.iter().any(|f| s.contains(f))
}
