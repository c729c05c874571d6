//! Payment Authorization
//!
//! Abstraction over whoever actually charges the card: a bank, a gateway,
//! or the mock used in development.

use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::card::EffectiveCard;
use crate::error::{CheckoutError, Result};

/// Opaque token confirming a successful charge
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalCode(String);

impl ApprovalCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generate a new approval code
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.simple().to_string()[..12].to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApprovalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment authorizer trait (Strategy pattern)
///
/// `Err(CheckoutError::Declined)` means the card was refused;
/// `Err(CheckoutError::AuthorizerUnavailable)` means nobody answered;
/// `Err(CheckoutError::GatewayResponse)` means the outcome is unknown.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Charge `amount` to `card`
    async fn charge_card(&self, card: &EffectiveCard, amount: Decimal) -> Result<ApprovalCode>;

    /// Authorizer name
    fn name(&self) -> &str;
}

/// A charge the mock authorizer approved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCharge {
    pub last_four: String,
    pub amount: Decimal,
    pub approval_code: ApprovalCode,
}

/// Mock authorizer: approves everything except configured card endings
pub struct MockAuthorizer {
    declined_endings: HashSet<String>,
    charges: RwLock<Vec<RecordedCharge>>,
    attempts: RwLock<u32>,
}

impl Default for MockAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthorizer {
    pub fn new() -> Self {
        Self {
            declined_endings: HashSet::new(),
            charges: RwLock::new(Vec::new()),
            attempts: RwLock::new(0),
        }
    }

    /// Decline any card whose last four digits are `ending`
    pub fn declining(mut self, ending: impl Into<String>) -> Self {
        self.declined_endings.insert(ending.into());
        self
    }

    /// Approved charges so far
    pub fn charges(&self) -> Vec<RecordedCharge> {
        self.charges.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every charge attempt, approved or not
    pub fn attempts(&self) -> u32 {
        self.attempts.read().map(|a| *a).unwrap_or_default()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn charge_card(&self, card: &EffectiveCard, amount: Decimal) -> Result<ApprovalCode> {
        if let Ok(mut attempts) = self.attempts.write() {
            *attempts += 1;
        }

        if amount <= Decimal::ZERO {
            return Err(CheckoutError::Declined("amount must be positive".into()));
        }
        if self.declined_endings.contains(card.last_four()) {
            return Err(CheckoutError::Declined("card refused by issuer".into()));
        }

        let approval_code = ApprovalCode::generate();
        let mut charges = self
            .charges
            .write()
            .map_err(|_| CheckoutError::Other("mock authorizer lock poisoned".into()))?;
        charges.push(RecordedCharge {
            last_four: card.last_four().to_string(),
            amount,
            approval_code: approval_code.clone(),
        });
        Ok(approval_code)
    }

    fn name(&self) -> &str {
        "MockAuthorizer"
    }
}

/// Gateway request body
#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    card_number: &'a str,
    expiry_month: u32,
    expiry_year: i32,
    amount: Decimal,
}

/// Gateway response body
#[derive(Debug, Deserialize)]
struct ChargeResponse {
    approved: bool,
    #[serde(default)]
    approval_code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Authorizer backed by a JSON payment gateway
pub struct HttpAuthorizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAuthorizer {
    /// Create a new gateway client
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("payment gateway client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn charge_card(&self, card: &EffectiveCard, amount: Decimal) -> Result<ApprovalCode> {
        let body = ChargeRequest {
            card_number: &card.number,
            expiry_month: card.expiry.month,
            expiry_year: card.expiry.year,
            amount,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CheckoutError::AuthorizerUnavailable(format!(
                "gateway returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(CheckoutError::Declined(format!("gateway returned {}", status)));
        }

        // Past this point the gateway took the request, so the charge may exist
        let parsed: ChargeResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::GatewayResponse(e.to_string()))?;
        match (parsed.approved, parsed.approval_code) {
            (true, Some(code)) => Ok(ApprovalCode::new(code)),
            (true, None) => Err(CheckoutError::GatewayResponse(
                "approval without approval code".into(),
            )),
            (false, _) => Err(CheckoutError::Declined(
                parsed.reason.unwrap_or_else(|| "declined".into()),
            )),
        }
    }

    fn name(&self) -> &str {
        "HttpAuthorizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Expiry;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_approves_and_records() {
        let authorizer = MockAuthorizer::new();
        let card = EffectiveCard::new("4111111111111111", Expiry::new(12, 2030));

        let code = authorizer.charge_card(&card, dec!(41.00)).await.unwrap();
        assert_eq!(code.as_str().len(), 12);

        let charges = authorizer.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].last_four, "1111");
        assert_eq!(charges[0].amount, dec!(41.00));
    }

    #[tokio::test]
    async fn test_mock_declines_configured_ending() {
        let authorizer = MockAuthorizer::new().declining("0002");
        let card = EffectiveCard::new("4000000000000002", Expiry::new(12, 2030));

        let err = authorizer.charge_card(&card, dec!(10)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Declined(_)));
        assert!(authorizer.charges().is_empty());
        assert_eq!(authorizer.attempts(), 1);
    }

    #[test]
    fn test_http_authorizer_builds() {
        let authorizer =
            HttpAuthorizer::new("http://localhost:9/charge", None, Duration::from_secs(5)).unwrap();
        assert_eq!(authorizer.endpoint(), "http://localhost:9/charge");
        assert_eq!(authorizer.name(), "HttpAuthorizer");
    }

    fn gateway_card() -> EffectiveCard {
        EffectiveCard::new("4111111111111111", Expiry::new(12, 2030))
    }

    fn gateway(base_url: &str) -> HttpAuthorizer {
        HttpAuthorizer::new(
            format!("{base_url}/charge"),
            Some("test-key".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_approved_returns_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/charge")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "card_number": "4111111111111111",
                "expiry_month": 12,
                "expiry_year": 2030
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"approved": true, "approval_code": "AUTH123"}"#)
            .expect(1)
            .create_async()
            .await;

        let code = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap();

        assert_eq!(code.as_str(), "AUTH123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_not_approved_is_declined() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/charge")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"approved": false, "reason": "insufficient funds"}"#)
            .create_async()
            .await;

        let err = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap_err();

        match err {
            CheckoutError::Declined(reason) => assert_eq!(reason, "insufficient funds"),
            other => panic!("expected decline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_client_error_is_declined() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/charge").with_status(402).create_async().await;

        let err = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Declined(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/charge").with_status(503).create_async().await;

        let err = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap_err();

        assert!(matches!(err, CheckoutError::AuthorizerUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_approval_without_code_is_unreadable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/charge")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"approved": true}"#)
            .create_async()
            .await;

        let err = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap_err();

        assert!(matches!(err, CheckoutError::GatewayResponse(_)));
    }

    #[tokio::test]
    async fn test_http_garbled_success_is_unreadable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/charge")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>charged</html>")
            .create_async()
            .await;

        let err = gateway(&server.url()).charge_card(&gateway_card(), dec!(41.00)).await.unwrap_err();

        assert!(matches!(err, CheckoutError::GatewayResponse(_)));
        assert!(!err.is_retryable());
    }
}
