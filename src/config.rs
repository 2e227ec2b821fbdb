//! Deployment configuration loaded from the environment.

use std::collections::HashMap;

use anyhow::{Context, Result};

/// Static per-deployment settings. Read once at startup; read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    /// Document store (the ERP's relational database).
    pub database_url: String,
    /// Automation bridge transport.
    pub nats_url: String,
    pub erp_subject_prefix: String,
    pub company_db: String,
    pub license_server: String,
    pub locale: String,
    pub use_trusted: bool,
    pub jwt_secret: String,
    /// Storefront API credentials, fixed at process start.
    pub api_users: HashMap<String, String>,
    pub funding: FundingAccounts,
    /// Item code used for the synthetic tax line on orders.
    pub tax_item_code: String,
    /// Partner group new storefront customers are filed under.
    pub partner_group_code: i64,
}

/// Transfer accounts keyed by funding source, kept out of the workflow
/// logic so deployments can remap them.
#[derive(Debug, Clone)]
pub struct FundingAccounts {
    pub cash_account: String,
    pub giftcard_account: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_port: optional("PORT", "8084").parse().context("PORT must be a port number")?,
            database_url: required("DATABASE_URL")?,
            nats_url: required("NATS_URL")?,
            erp_subject_prefix: optional("ERP_SUBJECT_PREFIX", "sapb1"),
            company_db: required("COMPANY_DB")?,
            license_server: optional("LICENSE_SERVER", ""),
            locale: optional("ERP_LOCALE", "ln_English"),
            use_trusted: optional("USE_TRUSTED", "false") == "true",
            jwt_secret: required("JWT_SECRET")?,
            api_users: parse_users(&required("API_USERS")?)?,
            funding: FundingAccounts {
                cash_account: required("CASH_TRANSFER_ACCOUNT")?,
                giftcard_account: required("GIFTCARD_TRANSFER_ACCOUNT")?,
            },
            tax_item_code: optional("TAX_ITEM_CODE", "TAX"),
            partner_group_code: optional("PARTNER_GROUP_CODE", "100")
                .parse()
                .context("PARTNER_GROUP_CODE must be an integer")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// `API_USERS` holds `user:password` pairs separated by commas.
fn parse_users(raw: &str) -> Result<HashMap<String, String>> {
    let mut users = HashMap::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let (user, pass) = pair
            .split_once(':')
            .with_context(|| format!("API_USERS entry '{pair}' is not user:password"))?;
        users.insert(user.trim().to_string(), pass.to_string());
    }
    anyhow::ensure!(!users.is_empty(), "API_USERS defined no credentials");
    Ok(users)
}
