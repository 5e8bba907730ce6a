//! VNPay payment gateway integration.
//!
//! Builds signed redirect URLs for payment initiation and verifies the
//! signature on return callbacks, per VNPay's pay API (version 2.1.0).
//! Both directions sign an HMAC-SHA512 over a canonical serialization of
//! the request parameters, and the serialization must match the gateway's
//! byte for byte: percent-encode first, render spaces as `+`, sort by the
//! encoded key, join with `&`.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::config::VnpayConfig;

type HmacSha512 = Hmac<Sha512>;

const VNP_VERSION: &str = "2.1.0";
const VNP_COMMAND: &str = "pay";
const VNP_LOCALE: &str = "vn";
const VNP_CURR_CODE: &str = "VND";
const VNP_ORDER_TYPE: &str = "other";

/// Response code the gateway sends on a successful payment.
pub const VNP_RESPONSE_SUCCESS: &str = "00";

pub const SECURE_HASH_KEY: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE_KEY: &str = "vnp_SecureHashType";

/// A payment attempt to be signed into a redirect URL.
#[derive(Debug)]
pub struct PaymentRequest {
    /// Transaction reference, unique per pending payment.
    pub txn_ref: String,
    /// Amount in VND major units. The wire format carries amount x 100.
    pub amount: u64,
    /// Human-readable order description, may contain Vietnamese text.
    pub order_info: String,
    /// Client IP the payment was initiated from.
    pub ip_addr: String,
}

/// VNPay client owning the merchant configuration.
#[derive(Clone)]
pub struct VnpayClient {
    config: VnpayConfig,
}

impl VnpayClient {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    /// Check if VNPay is configured (merchant credentials and URLs are set).
    pub fn is_configured(&self) -> bool {
        !self.config.tmn_code.is_empty()
            && !self.config.hash_secret.expose_secret().is_empty()
            && !self.config.payment_url.is_empty()
            && !self.config.return_url.is_empty()
    }

    /// Build the signed redirect URL for a payment attempt.
    ///
    /// `now` is the wall-clock instant of the attempt; `vnp_CreateDate` is
    /// rendered from it in the gateway's timezone.
    pub fn payment_url(&self, request: &PaymentRequest, now: DateTime<Utc>) -> Result<String> {
        if !self.is_configured() {
            return Err(anyhow!("VNPay credentials not configured"));
        }
        if request.txn_ref.is_empty() {
            return Err(anyhow!("Transaction reference must not be empty"));
        }
        if request.amount == 0 {
            return Err(anyhow!("Amount must be positive"));
        }
        let wire_amount = request
            .amount
            .checked_mul(100)
            .ok_or_else(|| anyhow!("Amount out of range"))?;

        let create_date = format_create_date(now, self.config.tz_offset);

        let mut params = HashMap::new();
        params.insert("vnp_Version".to_string(), VNP_VERSION.to_string());
        params.insert("vnp_Command".to_string(), VNP_COMMAND.to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert("vnp_Locale".to_string(), VNP_LOCALE.to_string());
        params.insert("vnp_CurrCode".to_string(), VNP_CURR_CODE.to_string());
        params.insert("vnp_TxnRef".to_string(), request.txn_ref.clone());
        params.insert("vnp_OrderInfo".to_string(), request.order_info.clone());
        params.insert("vnp_OrderType".to_string(), VNP_ORDER_TYPE.to_string());
        params.insert("vnp_Amount".to_string(), wire_amount.to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), request.ip_addr.clone());
        params.insert("vnp_CreateDate".to_string(), create_date);

        let sign_data = canonical_query(&params);
        let secure_hash = self.compute_signature(&sign_data)?;

        Ok(format!(
            "{}?{}&{}={}",
            self.config.payment_url, sign_data, SECURE_HASH_KEY, secure_hash
        ))
    }

    /// Verify the signature on a gateway callback.
    ///
    /// Works on a copy: the caller's mapping keeps `vnp_ResponseCode` and
    /// `vnp_TxnRef` readable after verification. A callback without
    /// `vnp_SecureHash` verifies as false rather than erroring.
    pub fn verify_callback(&self, params: &HashMap<String, String>) -> Result<bool> {
        let mut params = params.clone();
        let supplied = match params.remove(SECURE_HASH_KEY) {
            Some(hash) => hash,
            None => {
                tracing::warn!("VNPay callback missing {}", SECURE_HASH_KEY);
                return Ok(false);
            }
        };
        params.remove(SECURE_HASH_TYPE_KEY);

        let sign_data = canonical_query(&params);
        let expected = self.compute_signature(&sign_data)?;

        if expected.len() != supplied.len() {
            return Ok(false);
        }
        Ok(expected.as_bytes().ct_eq(supplied.as_bytes()).into())
    }

    /// Compute the lowercase hex HMAC-SHA512 over the canonical query.
    fn compute_signature(&self, sign_data: &str) -> Result<String> {
        let mut mac =
            HmacSha512::new_from_slice(self.config.hash_secret.expose_secret().as_bytes())
                .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(sign_data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Render `vnp_CreateDate` (YYYYMMDDHHmmss) in the gateway's timezone.
fn format_create_date(at: DateTime<Utc>, tz_offset: FixedOffset) -> String {
    at.with_timezone(&tz_offset)
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Percent-encode one key or value, with space rendered as `+`.
///
/// Unreserved characters (letters, digits, `-` `_` `.` `~`) pass through;
/// everything else, including non-ASCII UTF-8 bytes, is escaped.
fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

/// Serialize parameters into the canonical form the gateway signs.
///
/// Pairs are encoded first and sorted by the encoded key in plain byte
/// order; the joined result is not encoded again. The input map has
/// already collapsed duplicate keys (last write wins).
fn canonical_query(params: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (encode_component(key), encode_component(value)))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use secrecy::Secret;

    // Canonical string and digest for the fixed scenario below, pinned at
    // implementation time against an independent HMAC-SHA512 implementation.
    const PINNED_CANONICAL: &str = "vnp_Amount=1000000&vnp_Command=pay&vnp_CreateDate=20240101120000&vnp_CurrCode=VND&vnp_IpAddr=127.0.0.1&vnp_Locale=vn&vnp_OrderInfo=Test+payment&vnp_OrderType=other&vnp_ReturnUrl=http%3A%2F%2Flocalhost%3A5173%2Fpayment-result&vnp_TmnCode=TESTCODE&vnp_TxnRef=abc123&vnp_Version=2.1.0";
    const PINNED_SIGNATURE: &str = "61e6af98e12ab8ac31347741cc77f45336d25742bd6f6f90255e268664701f17eec1bce1297e680adad3773fe17e166705e8f480d365a2e468cf8b89243e90bd";

    fn test_config() -> VnpayConfig {
        VnpayConfig {
            tmn_code: "TESTCODE".to_string(),
            hash_secret: Secret::new("SECRETKEY".to_string()),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:5173/payment-result".to_string(),
            tz_offset: FixedOffset::east_opt(7 * 3600).unwrap(),
        }
    }

    fn test_client() -> VnpayClient {
        VnpayClient::new(test_config())
    }

    // 05:00 UTC renders as 12:00 in Indochina Time.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()
    }

    fn test_request() -> PaymentRequest {
        PaymentRequest {
            txn_ref: "abc123".to_string(),
            amount: 10_000,
            order_info: "Test payment".to_string(),
            ip_addr: "127.0.0.1".to_string(),
        }
    }

    fn callback_params(url: &str) -> HashMap<String, String> {
        let (_, query) = url.split_once('?').expect("URL has a query string");
        serde_urlencoded::from_str(query).expect("query string parses")
    }

    #[test]
    fn canonical_query_matches_pinned_fixture() {
        let url = test_client().payment_url(&test_request(), fixed_now()).unwrap();
        let (_, query) = url.split_once('?').unwrap();
        let sign_data = query.rsplit_once('&').unwrap().0;
        assert_eq!(sign_data, PINNED_CANONICAL);
    }

    #[test]
    fn signature_matches_pinned_fixture() {
        let url = test_client().payment_url(&test_request(), fixed_now()).unwrap();
        assert_eq!(
            url,
            format!(
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?{}&vnp_SecureHash={}",
                PINNED_CANONICAL, PINNED_SIGNATURE
            )
        );
        assert_eq!(PINNED_SIGNATURE.len(), 128);
    }

    #[test]
    fn signing_is_deterministic() {
        let client = test_client();
        let first = client.payment_url(&test_request(), fixed_now()).unwrap();
        let second = client.payment_url(&test_request(), fixed_now()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_query_is_insertion_order_independent() {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        let entries = [
            ("vnp_Version", "2.1.0"),
            ("vnp_TmnCode", "TESTCODE"),
            ("vnp_OrderInfo", "Thanh toan goi Basic"),
            ("vnp_Amount", "1000000"),
        ];
        for (key, value) in entries {
            forward.insert(key.to_string(), value.to_string());
        }
        for (key, value) in entries.iter().rev() {
            reverse.insert(key.to_string(), value.to_string());
        }

        assert_eq!(canonical_query(&forward), canonical_query(&reverse));
        assert_eq!(
            canonical_query(&forward),
            "vnp_Amount=1000000&vnp_OrderInfo=Thanh+toan+goi+Basic&vnp_TmnCode=TESTCODE&vnp_Version=2.1.0"
        );
    }

    #[test]
    fn space_encodes_as_plus_not_percent20() {
        let encoded = encode_component("Thanh toan goi Basic");
        assert_eq!(encoded, "Thanh+toan+goi+Basic");
        assert!(!encoded.contains("%20"));
    }

    #[test]
    fn vietnamese_text_percent_encodes() {
        assert_eq!(
            encode_component("Mua gói nâng cao"),
            "Mua+g%C3%B3i+n%C3%A2ng+cao"
        );
    }

    #[test]
    fn amount_is_scaled_to_minor_units() {
        let url = test_client().payment_url(&test_request(), fixed_now()).unwrap();
        assert!(url.contains("vnp_Amount=1000000"));
    }

    #[test]
    fn create_date_renders_in_gateway_timezone() {
        let ict = FixedOffset::east_opt(7 * 3600).unwrap();
        assert_eq!(format_create_date(fixed_now(), ict), "20240101120000");

        // 18:30 UTC on New Year's Eve is already past midnight in ICT.
        let before_midnight = Utc.with_ymd_and_hms(2023, 12, 31, 18, 30, 0).unwrap();
        assert_eq!(format_create_date(before_midnight, ict), "20240101013000");
    }

    #[test]
    fn issued_url_round_trips_through_verification() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();

        let params = callback_params(&url);
        assert!(client.verify_callback(&params).unwrap());
    }

    #[test]
    fn any_single_character_mutation_breaks_verification() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();
        let params = callback_params(&url);

        for key in params.keys().filter(|k| k.as_str() != SECURE_HASH_KEY) {
            let mut tampered = params.clone();
            let value = tampered.get_mut(key).unwrap();
            let original = value.remove(0);
            value.insert(0, if original == 'Z' { 'z' } else { 'Z' });

            assert!(
                !client.verify_callback(&tampered).unwrap(),
                "mutation of {} went undetected",
                key
            );
        }
    }

    #[test]
    fn missing_secure_hash_verifies_as_false() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();

        let mut params = callback_params(&url);
        params.remove(SECURE_HASH_KEY);

        assert!(!client.verify_callback(&params).unwrap());
    }

    #[test]
    fn secure_hash_type_is_ignored_by_verification() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();

        let mut params = callback_params(&url);
        params.insert("vnp_SecureHashType".to_string(), "HmacSHA512".to_string());

        assert!(client.verify_callback(&params).unwrap());
    }

    #[test]
    fn verification_leaves_the_callers_map_intact() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();
        let params = callback_params(&url);
        let before = params.clone();

        client.verify_callback(&params).unwrap();

        assert_eq!(params, before);
        assert!(params.contains_key(SECURE_HASH_KEY));
    }

    #[test]
    fn uppercased_hash_is_rejected() {
        let client = test_client();
        let url = client.payment_url(&test_request(), fixed_now()).unwrap();

        let mut params = callback_params(&url);
        let hash = params.get(SECURE_HASH_KEY).unwrap().to_uppercase();
        params.insert(SECURE_HASH_KEY.to_string(), hash);

        assert!(!client.verify_callback(&params).unwrap());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut request = test_request();
        request.amount = 0;
        assert!(test_client().payment_url(&request, fixed_now()).is_err());
    }

    #[test]
    fn oversized_amount_is_rejected() {
        let mut request = test_request();
        request.amount = u64::MAX;
        assert!(test_client().payment_url(&request, fixed_now()).is_err());
    }

    #[test]
    fn empty_txn_ref_is_rejected() {
        let mut request = test_request();
        request.txn_ref = String::new();
        assert!(test_client().payment_url(&request, fixed_now()).is_err());
    }

    #[test]
    fn missing_credentials_fail_loudly() {
        let mut config = test_config();
        config.hash_secret = Secret::new(String::new());
        let client = VnpayClient::new(config);

        assert!(!client.is_configured());
        assert!(client.payment_url(&test_request(), fixed_now()).is_err());
    }
}
