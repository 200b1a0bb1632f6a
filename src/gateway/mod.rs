//! Adapter for the third-party hosted-redirect card-payment gateway.
//!
//! Stateless: builds signed outbound payment requests and verifies and
//! parses inbound callbacks. Card data never touches this system; the
//! payer is redirected to the gateway's hosted page.

pub mod signing;

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MarketError, Result};

pub const FIELD_ORDER_ID: &str = "orderid";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_CURRENCY: &str = "currency";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_RETURN_URL: &str = "returnurl";
pub const FIELD_CALLBACK_URL: &str = "callbackurl";
pub const FIELD_RESPONSE_CODE: &str = "responsecode";
pub const FIELD_STATUS: &str = "status";

/// Primary return code the gateway sends for an approved payment.
pub const APPROVED_RESPONSE_CODE: &str = "000";
/// Secondary status codes that count as settled.
pub const SETTLED_STATUS_CODES: [&str; 2] = ["02", "04"];

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Pre-shared symmetric secret. Never appears in any payload.
    pub secret: String,
    /// Base URL of the gateway's hosted payment page.
    pub payment_page_url: String,
    pub currency: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret: "dev-secret".to_string(),
            payment_page_url: "https://pay.gateway.example/checkout".to_string(),
            currency: "USD".to_string(),
        }
    }
}

/// What the engine asks the gateway to collect.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub booking_id: Uuid,
    pub description: String,
    pub return_url: String,
    pub callback_url: String,
}

/// A prepared hosted-page payment session.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment_url: String,
    pub order_id: String,
    /// Signed form fields the front-end posts to the hosted page.
    pub fields: BTreeMap<String, String>,
}

/// A verified, parsed inbound callback.
#[derive(Debug, Clone)]
pub struct CallbackNotice {
    pub order_id: String,
    pub success: bool,
    pub amount: Decimal,
    pub raw: BTreeMap<String, String>,
}

/// The gateway cannot move money back; refunds are queued for manual
/// processing and acknowledged with a pending reference.
#[derive(Debug, Clone)]
pub struct RefundTicket {
    pub success: bool,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Builds a signed payment session for the hosted page.
    ///
    /// The order id combines the booking id with a millisecond timestamp,
    /// so retried initiations never reuse an id.
    pub fn initiate(&self, request: PaymentRequest) -> Result<PaymentSession> {
        let order_id = format!(
            "{}{}",
            request.booking_id.simple(),
            Utc::now().timestamp_millis()
        );

        let mut fields = BTreeMap::new();
        fields.insert(FIELD_ORDER_ID.to_string(), order_id.clone());
        fields.insert(
            FIELD_AMOUNT.to_string(),
            format!("{:.2}", request.amount),
        );
        fields.insert(FIELD_CURRENCY.to_string(), self.config.currency.clone());
        fields.insert(FIELD_DESCRIPTION.to_string(), request.description);
        fields.insert(FIELD_RETURN_URL.to_string(), request.return_url);
        fields.insert(FIELD_CALLBACK_URL.to_string(), request.callback_url);

        let signature = signing::sign(&self.config.secret, &fields)?;
        fields.insert(signing::SIGNATURE_FIELD.to_string(), signature);

        let payment_url = format!("{}?order={}", self.config.payment_page_url, order_id);

        Ok(PaymentSession {
            payment_url,
            order_id,
            fields,
        })
    }

    /// Verifies and parses an inbound callback field map.
    ///
    /// A signature mismatch is a hard rejection; no field of an unsigned
    /// payload is trusted. Success requires the approved return code and a
    /// settled status code.
    pub fn parse_callback(&self, fields: BTreeMap<String, String>) -> Result<CallbackNotice> {
        signing::verify(&self.config.secret, &fields)?;

        let order_id = fields
            .get(FIELD_ORDER_ID)
            .ok_or_else(|| {
                MarketError::IntegrityViolation("callback is missing the order id".to_string())
            })?
            .clone();

        let amount_raw = fields.get(FIELD_AMOUNT).ok_or_else(|| {
            MarketError::IntegrityViolation("callback is missing the amount".to_string())
        })?;
        let amount = Decimal::from_str(amount_raw).map_err(|_| {
            MarketError::IntegrityViolation(format!("unparsable callback amount: {amount_raw}"))
        })?;

        let approved = fields.get(FIELD_RESPONSE_CODE).map(String::as_str)
            == Some(APPROVED_RESPONSE_CODE);
        let settled = fields
            .get(FIELD_STATUS)
            .is_some_and(|status| SETTLED_STATUS_CODES.contains(&status.as_str()));

        Ok(CallbackNotice {
            order_id,
            success: approved && settled,
            amount,
            raw: fields,
        })
    }

    /// Records that a refund needs manual processing at the gateway.
    ///
    /// The hosted-redirect API has no refund endpoint, so this never moves
    /// money; operations staff settle it out-of-band using the reference.
    pub fn refund(&self, order_id: &str, amount: Decimal) -> RefundTicket {
        tracing::info!(order_id, %amount, "refund queued for manual gateway processing");
        RefundTicket {
            success: false,
            reference: format!("manual-{order_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client() -> GatewayClient {
        GatewayClient::new(GatewayConfig::default())
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            amount: dec!(200),
            booking_id: Uuid::new_v4(),
            description: "Deep cleaning".to_string(),
            return_url: "https://app.example/return".to_string(),
            callback_url: "https://app.example/callback".to_string(),
        }
    }

    /// Builds the signed callback a real gateway would POST back.
    pub(crate) fn signed_callback(
        client: &GatewayClient,
        order_id: &str,
        amount: &str,
        response_code: &str,
        status: &str,
    ) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_ORDER_ID.to_string(), order_id.to_string());
        fields.insert(FIELD_AMOUNT.to_string(), amount.to_string());
        fields.insert(FIELD_RESPONSE_CODE.to_string(), response_code.to_string());
        fields.insert(FIELD_STATUS.to_string(), status.to_string());
        let signature = signing::sign(&client.config.secret, &fields).unwrap();
        fields.insert(signing::SIGNATURE_FIELD.to_string(), signature);
        fields
    }

    #[test]
    fn test_initiate_signs_fields_and_omits_secret() {
        let client = client();
        let session = client.initiate(request()).unwrap();

        assert!(session.fields.contains_key(signing::SIGNATURE_FIELD));
        assert!(session.payment_url.contains(&session.order_id));
        for value in session.fields.values() {
            assert_ne!(value, &client.config.secret);
        }
        assert!(signing::verify(&client.config.secret, &session.fields).is_ok());
    }

    #[test]
    fn test_initiate_order_ids_are_unique_across_retries() {
        let client = client();
        let booking_id = Uuid::new_v4();
        let make = |client: &GatewayClient| {
            let mut req = request();
            req.booking_id = booking_id;
            client.initiate(req).unwrap().order_id
        };
        let first = make(&client);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = make(&client);
        assert_ne!(first, second);
    }

    #[test]
    fn test_parse_callback_success() {
        let client = client();
        let fields = signed_callback(&client, "ord1", "200.00", "000", "02");
        let notice = client.parse_callback(fields).unwrap();
        assert!(notice.success);
        assert_eq!(notice.order_id, "ord1");
        assert_eq!(notice.amount, dec!(200.00));
    }

    #[test]
    fn test_parse_callback_declined_code() {
        let client = client();
        let fields = signed_callback(&client, "ord1", "200.00", "051", "02");
        let notice = client.parse_callback(fields).unwrap();
        assert!(!notice.success);
    }

    #[test]
    fn test_parse_callback_unsettled_status() {
        let client = client();
        let fields = signed_callback(&client, "ord1", "200.00", "000", "09");
        let notice = client.parse_callback(fields).unwrap();
        assert!(!notice.success);
    }

    #[test]
    fn test_parse_callback_rejects_bad_signature() {
        let client = client();
        let mut fields = signed_callback(&client, "ord1", "200.00", "000", "02");
        fields.insert(FIELD_AMOUNT.to_string(), "999.00".to_string());

        assert!(matches!(
            client.parse_callback(fields),
            Err(MarketError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_refund_is_manual_and_pending() {
        let ticket = client().refund("ord1", dec!(200));
        assert!(!ticket.success);
        assert_eq!(ticket.reference, "manual-ord1");
    }
}
