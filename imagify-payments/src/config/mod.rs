use anyhow::{Context, Result};
use chrono::FixedOffset;
use dotenvy::dotenv;
use imagify_core::middleware::auth::AuthConfig;
use secrecy::Secret;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub vnpay: VnpayConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Merchant-side VNPay settings shared by the signer and the verifier.
#[derive(Clone)]
pub struct VnpayConfig {
    /// Terminal (merchant) code issued by VNPay.
    pub tmn_code: String,
    /// Shared HMAC secret, known only to us and the gateway.
    pub hash_secret: Secret<String>,
    /// Gateway pay-page base URL.
    pub payment_url: String,
    /// URL the gateway redirects the customer back to.
    pub return_url: String,
    /// Timezone the gateway expects vnp_CreateDate in (Indochina Time).
    pub tz_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("PAYMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PAYMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .context("PAYMENT_SERVICE_PORT must be a valid port")?;

        let db_url =
            env::var("PAYMENT_DATABASE_URL").context("PAYMENT_DATABASE_URL must be set")?;
        let db_name = env::var("PAYMENT_DATABASE_NAME")
            .unwrap_or_else(|_| "imagify_payments".to_string());

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        // An incomplete VNPay block would produce unsigned or mis-signed
        // URLs, so every value is required up front.
        let tmn_code = env::var("VNPAY_TMN_CODE").context("VNPAY_TMN_CODE must be set")?;
        let hash_secret = env::var("VNPAY_HASH_SECRET").context("VNPAY_HASH_SECRET must be set")?;
        let payment_url = env::var("VNPAY_URL").context("VNPAY_URL must be set")?;
        let return_url = env::var("VNPAY_RETURN_URL").context("VNPAY_RETURN_URL must be set")?;

        let tz_offset_hours: i32 = env::var("VNPAY_TZ_OFFSET_HOURS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .context("VNPAY_TZ_OFFSET_HOURS must be an integer")?;
        let tz_offset = FixedOffset::east_opt(tz_offset_hours * 3600)
            .context("VNPAY_TZ_OFFSET_HOURS is out of range")?;

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(jwt_secret),
            },
            vnpay: VnpayConfig {
                tmn_code,
                hash_secret: Secret::new(hash_secret),
                payment_url,
                return_url,
                tz_offset,
            },
            service_name: "imagify-payments".to_string(),
        })
    }
}
