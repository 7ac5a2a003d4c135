use std::time::Duration;

use bigdecimal::BigDecimal;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CURRENCY: &str = "ETB";

#[derive(Debug, thiserror::Error)]
pub enum ChapaError {
    #[error("request to payment gateway failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("could not decode gateway response: {0}")]
    Decode(String),
    #[error("gateway reported unrecognised transaction status: {0}")]
    UnknownStatus(String),
}

/// Transaction outcome as reported by the gateway. `Pending` means the
/// transaction has not settled yet and no local transition should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

impl GatewayStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "success" => Some(GatewayStatus::Success),
            "failed" | "failure" => Some(GatewayStatus::Failed),
            "pending" => Some(GatewayStatus::Pending),
            _ => None,
        }
    }
}

/// Checkout handle returned by a successful initialization; the caller
/// redirects the payer to `checkout_url`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    tx_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    message: Option<String>,
}

/// HTTP client for the Chapa payment gateway. Owns the transport details:
/// bearer auth, request serialisation, timeout, and error mapping.
#[derive(Clone)]
pub struct ChapaClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl ChapaClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    /// Registers a transaction with the gateway and returns the hosted
    /// checkout handle for the payer.
    pub async fn initialize_payment(
        &self,
        amount: &BigDecimal,
        email: &str,
        tx_ref: &str,
    ) -> Result<CheckoutSession, ChapaError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let body = InitializeRequest {
            amount: amount.to_string(),
            currency: CURRENCY,
            email,
            tx_ref,
        };
        info!("initializing gateway transaction {}", tx_ref);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(rejection(status, &bytes));
        }

        let decoded: InitializeResponse =
            serde_json::from_slice(&bytes).map_err(|e| ChapaError::Decode(e.to_string()))?;
        let data = decoded
            .data
            .ok_or_else(|| ChapaError::Decode("initialize response missing data".to_string()))?;
        Ok(CheckoutSession {
            checkout_url: data.checkout_url,
            tx_ref: tx_ref.to_string(),
        })
    }

    /// Asks the gateway for the current status of a transaction.
    pub async fn verify_payment(&self, tx_ref: &str) -> Result<GatewayStatus, ChapaError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, tx_ref);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(rejection(status, &bytes));
        }

        let decoded: VerifyResponse =
            serde_json::from_slice(&bytes).map_err(|e| ChapaError::Decode(e.to_string()))?;
        let data = decoded
            .data
            .ok_or_else(|| ChapaError::Decode("verify response missing data".to_string()))?;
        GatewayStatus::parse(&data.status).ok_or(ChapaError::UnknownStatus(data.status))
    }
}

fn rejection(status: StatusCode, body: &[u8]) -> ChapaError {
    let message = serde_json::from_slice::<GatewayErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    ChapaError::Rejected { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn initialize_returns_checkout_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transaction/initialize")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"currency": "ETB", "tx_ref": "tx-1"}"#);
            then.status(200).json_body(json!({
                "message": "Hosted Link",
                "status": "success",
                "data": { "checkout_url": "https://checkout.chapa.co/checkout/payment/abc" }
            }));
        });

        let client = ChapaClient::new(server.base_url(), "test-key").unwrap();
        let session = client
            .initialize_payment(&BigDecimal::from(120), "guest@example.com", "tx-1")
            .await
            .unwrap();

        assert_eq!(
            session.checkout_url,
            "https://checkout.chapa.co/checkout/payment/abc"
        );
        assert_eq!(session.tx_ref, "tx-1");
        mock.assert();
    }

    #[tokio::test]
    async fn initialize_surfaces_gateway_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(400)
                .json_body(json!({ "message": "Invalid currency", "status": "failed" }));
        });

        let client = ChapaClient::new(server.base_url(), "test-key").unwrap();
        let err = client
            .initialize_payment(&BigDecimal::from(120), "guest@example.com", "tx-2")
            .await
            .unwrap_err();

        match err {
            ChapaError::Rejected { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Invalid currency");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_decodes_transaction_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/tx-3");
            then.status(200).json_body(json!({
                "message": "Payment details",
                "status": "success",
                "data": { "status": "success", "tx_ref": "tx-3" }
            }));
        });

        let client = ChapaClient::new(server.base_url(), "test-key").unwrap();
        let status = client.verify_payment("tx-3").await.unwrap();
        assert_eq!(status, GatewayStatus::Success);
        mock.assert();
    }

    #[tokio::test]
    async fn verify_rejects_unknown_status_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/tx-4");
            then.status(200).json_body(json!({
                "data": { "status": "reversed" }
            }));
        });

        let client = ChapaClient::new(server.base_url(), "test-key").unwrap();
        let err = client.verify_payment("tx-4").await.unwrap_err();
        assert!(matches!(err, ChapaError::UnknownStatus(s) if s == "reversed"));
    }

    #[test]
    fn gateway_status_parses_known_values() {
        assert_eq!(GatewayStatus::parse("success"), Some(GatewayStatus::Success));
        assert_eq!(GatewayStatus::parse("SUCCESS"), Some(GatewayStatus::Success));
        assert_eq!(GatewayStatus::parse("failed"), Some(GatewayStatus::Failed));
        assert_eq!(GatewayStatus::parse("pending"), Some(GatewayStatus::Pending));
        assert_eq!(GatewayStatus::parse("reversed"), None);
    }
}
