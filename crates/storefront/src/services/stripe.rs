//! Stripe API client.
//!
//! Covers the three interactions checkout and finalization need: creating a
//! Checkout session (form-encoded bracket params), fetching a completed
//! session with expanded line items, and verifying webhook signatures.
//!
//! Tax and shipping ride along as synthetic line items named
//! [`TAX_LINE_DESCRIPTION`] and [`SHIPPING_LINE_DESCRIPTION`]; finalization
//! filters them back out by name. Each real line carries its catalog
//! `product_id` in the price's product metadata so finalization can decrement
//! the right stock counters.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use orchard_core::{ProductId, SessionId, decimal_to_cents};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::StripeConfig;
use crate::db::orders::ShippingAddress;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Description of the synthetic tax line item.
pub const TAX_LINE_DESCRIPTION: &str = "Sales Tax";
/// Description of the synthetic shipping line item.
pub const SHIPPING_LINE_DESCRIPTION: &str = "Shipping";

/// Webhook timestamp tolerance to prevent replay (seconds).
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Errors from the Stripe API client.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// Transport-level failure.
    #[error("Stripe request failed: {0}")]
    Request(String),

    /// Stripe rejected the call.
    #[error("Stripe API error ({status}): {message}")]
    Api {
        /// HTTP status from Stripe.
        status: u16,
        /// Stripe's error message.
        message: String,
    },

    /// Response body was not the shape we expected.
    #[error("failed to parse Stripe response: {0}")]
    Parse(String),

    /// Webhook signature did not verify.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),
}

/// A product line to charge for.
#[derive(Debug, Clone)]
pub struct PaymentLine {
    pub product_id: ProductId,
    pub title: String,
    pub image: Option<String>,
    pub unit_amount: Decimal,
    pub quantity: u32,
}

/// Inputs for creating a Checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionArgs {
    pub cart_session_id: SessionId,
    pub customer_email: Option<String>,
    pub lines: Vec<PaymentLine>,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created Checkout session: the id to correlate on and the URL to send
/// the shopper to.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Parsed webhook event envelope.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Event type, e.g. `checkout.session.completed`.
    pub event_type: String,
    /// Id of the event's subject (the checkout session).
    pub object_id: String,
    /// Metadata attached to the subject.
    pub metadata: HashMap<String, String>,
}

/// A completed session's line item as Stripe reports it.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub description: String,
    pub quantity: u32,
    /// Line total in cents.
    pub amount_total: i64,
    /// Catalog product id recovered from price metadata, when present.
    pub product_id: Option<ProductId>,
}

/// Full detail of a completed session, as needed for order creation.
#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub id: String,
    /// Captured grand total in cents.
    pub amount_total: i64,
    pub customer_email: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub line_items: Vec<SessionLineItem>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeClient {
    /// Build a client from Stripe credentials.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a Checkout session.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError`] on transport failure, an API error, or a
    /// session created without a redirect URL.
    pub async fn create_checkout_session(
        &self,
        args: &CheckoutSessionArgs,
    ) -> Result<CheckoutSession, StripeError> {
        let params = session_params(args);
        let response = self
            .client
            .post(format!("{API_BASE}/checkout/sessions"))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        #[derive(Deserialize)]
        struct Created {
            id: String,
            url: Option<String>,
        }
        let created: Created =
            serde_json::from_str(&body).map_err(|e| StripeError::Parse(e.to_string()))?;
        let url = created
            .url
            .ok_or_else(|| StripeError::Parse("session has no redirect url".to_owned()))?;
        Ok(CheckoutSession {
            id: created.id,
            url,
        })
    }

    /// Fetch a session with expanded line items and product metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError`] on transport failure, an API error, or an
    /// unparseable response.
    pub async fn get_session_detail(&self, session_id: &str) -> Result<SessionDetail, StripeError> {
        let response = self
            .client
            .get(format!("{API_BASE}/checkout/sessions/{session_id}"))
            .bearer_auth(self.secret_key.expose_secret())
            .query(&[
                ("expand[]", "line_items"),
                ("expand[]", "line_items.data.price.product"),
            ])
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        parse_session_detail(&body)
    }

    /// Verify a webhook payload against its `stripe-signature` header and
    /// return the parsed event.
    ///
    /// The header carries `t=<unix seconds>,v1=<hex hmac>` entries; the
    /// signed message is `"{t}.{payload}"`. Timestamps older or newer than
    /// five minutes are rejected to prevent replay.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError::InvalidSignature`] on any verification failure
    /// and [`StripeError::Parse`] if the verified payload is not an event.
    pub fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, StripeError> {
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp
            .ok_or_else(|| StripeError::InvalidSignature("missing timestamp".to_owned()))?;
        if candidates.is_empty() {
            return Err(StripeError::InvalidSignature(
                "missing v1 signature".to_owned(),
            ));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| StripeError::InvalidSignature("invalid timestamp".to_owned()))?;
        let now_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| StripeError::InvalidSignature(e.to_string()))?
            .as_secs();
        let now = i64::try_from(now_secs)
            .map_err(|_| StripeError::InvalidSignature("system time overflow".to_owned()))?;
        if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
            return Err(StripeError::InvalidSignature(
                "timestamp outside tolerance".to_owned(),
            ));
        }

        let mut mac =
            Hmac::<Sha256>::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
                .map_err(|e| StripeError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !candidates
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(StripeError::InvalidSignature(
                "signature mismatch".to_owned(),
            ));
        }

        parse_event(payload)
    }
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

fn api_error(status: u16, body: &str) -> StripeError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| "unknown error".to_owned());
    StripeError::Api { status, message }
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, StripeError> {
    #[derive(Deserialize)]
    struct RawEvent {
        #[serde(rename = "type")]
        event_type: String,
        data: RawEventData,
    }
    #[derive(Deserialize)]
    struct RawEventData {
        object: RawEventObject,
    }
    #[derive(Deserialize)]
    struct RawEventObject {
        id: String,
        #[serde(default)]
        metadata: HashMap<String, String>,
    }

    let event: RawEvent =
        serde_json::from_slice(payload).map_err(|e| StripeError::Parse(e.to_string()))?;
    Ok(WebhookEvent {
        event_type: event.event_type,
        object_id: event.data.object.id,
        metadata: event.data.object.metadata,
    })
}

/// Build the bracket-keyed form parameters for session creation.
pub(crate) fn session_params(args: &CheckoutSessionArgs) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("success_url".to_owned(), args.success_url.clone()),
        ("cancel_url".to_owned(), args.cancel_url.clone()),
        (
            "metadata[cart_session_id]".to_owned(),
            args.cart_session_id.to_string(),
        ),
        ("billing_address_collection".to_owned(), "required".to_owned()),
        (
            "shipping_address_collection[allowed_countries][0]".to_owned(),
            "US".to_owned(),
        ),
    ];
    if let Some(email) = &args.customer_email {
        params.push(("customer_email".to_owned(), email.clone()));
    }

    for (idx, line) in args.lines.iter().enumerate() {
        push_line(
            &mut params,
            idx,
            &line.title,
            decimal_to_cents(line.unit_amount),
            line.quantity,
        );
        params.push((
            format!("line_items[{idx}][price_data][product_data][metadata][product_id]"),
            line.product_id.to_string(),
        ));
        if let Some(image) = &line.image {
            params.push((
                format!("line_items[{idx}][price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
    }
    let mut idx = args.lines.len();
    if args.tax_amount > Decimal::ZERO {
        push_line(
            &mut params,
            idx,
            TAX_LINE_DESCRIPTION,
            decimal_to_cents(args.tax_amount),
            1,
        );
        idx += 1;
    }
    if args.shipping_amount > Decimal::ZERO {
        push_line(
            &mut params,
            idx,
            SHIPPING_LINE_DESCRIPTION,
            decimal_to_cents(args.shipping_amount),
            1,
        );
    }
    params
}

fn push_line(params: &mut Vec<(String, String)>, idx: usize, name: &str, cents: i64, qty: u32) {
    params.push((
        format!("line_items[{idx}][price_data][currency]"),
        "usd".to_owned(),
    ));
    params.push((
        format!("line_items[{idx}][price_data][product_data][name]"),
        name.to_owned(),
    ));
    params.push((
        format!("line_items[{idx}][price_data][unit_amount]"),
        cents.to_string(),
    ));
    params.push((format!("line_items[{idx}][quantity]"), qty.to_string()));
}

/// Parse an expanded session payload into [`SessionDetail`].
pub(crate) fn parse_session_detail(body: &str) -> Result<SessionDetail, StripeError> {
    #[derive(Deserialize)]
    struct RawSession {
        id: String,
        amount_total: Option<i64>,
        customer_email: Option<String>,
        customer_details: Option<RawCustomerDetails>,
        shipping_details: Option<RawShippingDetails>,
        line_items: Option<RawList>,
    }
    #[derive(Deserialize)]
    struct RawCustomerDetails {
        email: Option<String>,
    }
    #[derive(Deserialize)]
    struct RawShippingDetails {
        name: Option<String>,
        address: Option<RawAddress>,
    }
    #[derive(Deserialize)]
    struct RawAddress {
        line1: Option<String>,
        line2: Option<String>,
        city: Option<String>,
        state: Option<String>,
        postal_code: Option<String>,
        country: Option<String>,
    }
    #[derive(Deserialize)]
    struct RawList {
        #[serde(default)]
        data: Vec<RawLineItem>,
    }
    #[derive(Deserialize)]
    struct RawLineItem {
        description: Option<String>,
        quantity: Option<u32>,
        amount_total: Option<i64>,
        price: Option<RawPrice>,
    }
    #[derive(Deserialize)]
    struct RawPrice {
        product: Option<RawProduct>,
    }
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawProduct {
        Expanded {
            #[serde(default)]
            metadata: HashMap<String, String>,
        },
        Id(String),
    }

    let session: RawSession =
        serde_json::from_str(body).map_err(|e| StripeError::Parse(e.to_string()))?;

    let customer_email = session
        .customer_details
        .and_then(|d| d.email)
        .or(session.customer_email);

    let shipping_address = session.shipping_details.and_then(|details| {
        let address = details.address?;
        Some(ShippingAddress {
            name: details.name.unwrap_or_default(),
            line1: address.line1.unwrap_or_default(),
            line2: address.line2,
            city: address.city.unwrap_or_default(),
            state: address.state.unwrap_or_default(),
            postal_code: address.postal_code.unwrap_or_default(),
            country: address.country.unwrap_or_default(),
        })
    });

    let line_items = session
        .line_items
        .map(|list| list.data)
        .unwrap_or_default()
        .into_iter()
        .map(|item| {
            let product_id = item.price.and_then(|price| match price.product {
                Some(RawProduct::Expanded { metadata }) => {
                    metadata.get("product_id").map(|id| ProductId::new(id.clone()))
                }
                _ => None,
            });
            SessionLineItem {
                description: item.description.unwrap_or_default(),
                quantity: item.quantity.unwrap_or(1),
                amount_total: item.amount_total.unwrap_or(0),
                product_id,
            }
        })
        .collect();

    Ok(SessionDetail {
        id: session.id,
        amount_total: session.amount_total.unwrap_or(0),
        customer_email,
        shipping_address,
        line_items,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> StripeClient {
        StripeClient::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_123".to_owned()),
            webhook_secret: SecretString::from("whsec_test_secret".to_owned()),
        })
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn now() -> i64 {
        i64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        )
        .unwrap()
    }

    const EVENT_PAYLOAD: &[u8] = br#"{
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc",
                "metadata": {"cart_session_id": "sess_123"}
            }
        }
    }"#;

    #[test]
    fn test_verify_webhook_roundtrip() {
        let client = client();
        let header = sign("whsec_test_secret", now(), EVENT_PAYLOAD);
        let event = client.verify_webhook(EVENT_PAYLOAD, &header).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.object_id, "cs_test_abc");
        assert_eq!(
            event.metadata.get("cart_session_id").map(String::as_str),
            Some("sess_123")
        );
    }

    #[test]
    fn test_verify_webhook_rejects_tampered_payload() {
        let client = client();
        let header = sign("whsec_test_secret", now(), EVENT_PAYLOAD);
        let tampered = EVENT_PAYLOAD
            .to_vec()
            .iter()
            .map(|&b| if b == b'1' { b'2' } else { b })
            .collect::<Vec<u8>>();
        let result = client.verify_webhook(&tampered, &header);
        assert!(matches!(result, Err(StripeError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_webhook_rejects_wrong_secret() {
        let client = client();
        let header = sign("whsec_other_secret", now(), EVENT_PAYLOAD);
        assert!(client.verify_webhook(EVENT_PAYLOAD, &header).is_err());
    }

    #[test]
    fn test_verify_webhook_rejects_stale_timestamp() {
        let client = client();
        let header = sign("whsec_test_secret", now() - 600, EVENT_PAYLOAD);
        let result = client.verify_webhook(EVENT_PAYLOAD, &header);
        assert!(matches!(result, Err(StripeError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_webhook_rejects_malformed_header() {
        let client = client();
        for header in ["", "t=notanumber,v1=abc", "v1=abc", "t=12345"] {
            assert!(client.verify_webhook(EVENT_PAYLOAD, header).is_err(), "{header}");
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_session_params_layout() {
        let args = CheckoutSessionArgs {
            cart_session_id: SessionId::new("sess_123"),
            customer_email: Some("shopper@example.com".to_owned()),
            lines: vec![PaymentLine {
                product_id: ProductId::new("prod_001"),
                title: "Wireless Earbuds Pro".to_owned(),
                image: None,
                unit_amount: Decimal::new(7999, 2),
                quantity: 2,
            }],
            tax_amount: Decimal::new(1160, 2),
            shipping_amount: Decimal::ZERO,
            success_url: "https://shop.example/success".to_owned(),
            cancel_url: "https://shop.example/cart".to_owned(),
        };
        let params = session_params(&args);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("metadata[cart_session_id]"), Some("sess_123"));
        assert_eq!(
            get("line_items[0][price_data][unit_amount]"),
            Some("7999")
        );
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(
            get("line_items[0][price_data][product_data][metadata][product_id]"),
            Some("prod_001")
        );
        // Tax becomes its own line; zero shipping adds none.
        assert_eq!(
            get("line_items[1][price_data][product_data][name]"),
            Some(TAX_LINE_DESCRIPTION)
        );
        assert_eq!(get("line_items[1][price_data][unit_amount]"), Some("1160"));
        assert_eq!(get("line_items[2][price_data][currency]"), None);
    }

    #[test]
    fn test_parse_session_detail_fixture() {
        let body = r#"{
            "id": "cs_test_abc",
            "amount_total": 17158,
            "amount_subtotal": 15998,
            "customer_email": null,
            "customer_details": {"email": "shopper@example.com"},
            "shipping_details": {
                "name": "Pat Shopper",
                "address": {
                    "line1": "1 Main St",
                    "line2": null,
                    "city": "San Francisco",
                    "state": "CA",
                    "postal_code": "94105",
                    "country": "US"
                }
            },
            "line_items": {
                "data": [
                    {
                        "description": "Wireless Earbuds Pro",
                        "quantity": 2,
                        "amount_total": 15998,
                        "price": {"product": {"metadata": {"product_id": "prod_001"}}}
                    },
                    {
                        "description": "Sales Tax",
                        "quantity": 1,
                        "amount_total": 1160,
                        "price": {"product": {"metadata": {}}}
                    }
                ]
            }
        }"#;
        let detail = parse_session_detail(body).unwrap();
        assert_eq!(detail.id, "cs_test_abc");
        assert_eq!(detail.amount_total, 17158);
        assert_eq!(detail.customer_email.as_deref(), Some("shopper@example.com"));
        assert_eq!(detail.shipping_address.as_ref().unwrap().state, "CA");
        assert_eq!(detail.line_items.len(), 2);
        assert_eq!(
            detail.line_items[0].product_id,
            Some(ProductId::new("prod_001"))
        );
        assert_eq!(detail.line_items[1].product_id, None);
    }

    #[test]
    fn test_parse_session_detail_unexpanded_product() {
        // Without expansion the product is a bare id string; no metadata.
        let body = r#"{
            "id": "cs_test_min",
            "amount_total": 500,
            "line_items": {
                "data": [
                    {"description": "Thing", "quantity": 1, "amount_total": 500,
                     "price": {"product": "prod_live_1"}}
                ]
            }
        }"#;
        let detail = parse_session_detail(body).unwrap();
        assert_eq!(detail.line_items[0].product_id, None);
        assert!(detail.shipping_address.is_none());
    }
}
