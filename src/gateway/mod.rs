//! JSON action gateway for the token-based reset path.
//!
//! Distinct from the HTML-form-driven OTP flow: when the caller already holds
//! a reset link (token + key in the query string), the password change is a
//! single named action against the provider's JSON endpoint, authenticated by
//! a per-client anti-forgery token scraped from a known page's metadata.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

use crate::flow::core::executor::{FormHttpClient, FormHttpClientError};
use crate::flow::core::scrape::meta_content;

/// `<meta>` tag the anti-forgery token is read from.
const CSRF_META_NAME: &str = "csrf_token";

/// Named action performing the token-based password reset.
const RESET_ACTION: &str = "resetPasswordSubmitForm";

/// API segment the reset action is served under.
const RESET_API: &str = "resetpassword";

/// Failure states surfaced by the gateway.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("http client error during {step}: {source}")]
    Client {
        step: &'static str,
        #[source]
        source: FormHttpClientError,
    },
    #[error("unexpected status {status} while fetching anti-forgery token")]
    TokenStatus { status: u16 },
    #[error("anti-forgery token missing from token page metadata")]
    TokenMissing,
    #[error("invalid action endpoint '{0}': {1}")]
    InvalidEndpoint(String, #[source] url::ParseError),
    #[error("unexpected status {status} for action {action}")]
    UnexpectedStatus { action: String, status: u16 },
    #[error("malformed response for action {action}: {source}")]
    Json {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed action {action}: {message}")]
    Rejected { action: String, message: String },
    #[error("invalid reset link: {0}")]
    InvalidResetLink(#[source] url::ParseError),
    #[error("reset link missing '{0}' parameter")]
    MalformedResetLink(&'static str),
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    state: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

/// Invokes named remote actions against the provider's JSON action endpoint.
///
/// The anti-forgery token is fetched lazily on first use and cached for the
/// gateway's lifetime behind a single-initialization cell, so concurrent
/// first use performs exactly one fetch. Token expiry is a hard failure; the
/// provider offers no refresh contract.
pub struct ActionGateway {
    client: Arc<dyn FormHttpClient>,
    token_page: Url,
    action_base: Url,
    csrf: OnceCell<String>,
}

impl ActionGateway {
    pub fn new(client: Arc<dyn FormHttpClient>, token_page: Url, action_base: Url) -> Self {
        Self {
            client,
            token_page,
            action_base,
            csrf: OnceCell::new(),
        }
    }

    async fn csrf_token(&self) -> Result<&str, ActionError> {
        self.csrf
            .get_or_try_init(|| async {
                let document = self
                    .client
                    .get(&self.token_page)
                    .await
                    .map_err(|source| ActionError::Client {
                        step: "anti-forgery token fetch",
                        source,
                    })?;

                if !document.is_success() {
                    return Err(ActionError::TokenStatus {
                        status: document.status,
                    });
                }

                meta_content(&document.body, CSRF_META_NAME).ok_or(ActionError::TokenMissing)
            })
            .await
            .map(String::as_str)
    }

    /// Invoke a named action under the given API segment.
    ///
    /// Returns the `properties` payload on success. A `state` other than
    /// `success` is surfaced with the provider's `Message` when available.
    pub async fn action(
        &self,
        api: &str,
        name: &str,
        params: HashMap<String, String>,
    ) -> Result<Map<String, Value>, ActionError> {
        let csrf = self.csrf_token().await?.to_string();

        let mut fields = params;
        fields.insert("action".to_string(), name.to_string());
        fields.insert("csrf".to_string(), csrf);

        let endpoint = self
            .action_base
            .join(api)
            .map_err(|err| ActionError::InvalidEndpoint(api.to_string(), err))?;

        let document = self
            .client
            .post_form(&endpoint, &fields)
            .await
            .map_err(|source| ActionError::Client {
                step: "action invoke",
                source,
            })?;

        if !document.is_success() {
            return Err(ActionError::UnexpectedStatus {
                action: name.to_string(),
                status: document.status,
            });
        }

        let envelope: ActionEnvelope =
            serde_json::from_str(&document.body).map_err(|source| ActionError::Json {
                action: name.to_string(),
                source,
            })?;

        if envelope.state.eq_ignore_ascii_case("success") {
            return Ok(envelope.properties);
        }

        let message = envelope
            .properties
            .get("Message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("provider returned state '{}'", envelope.state));

        Err(ActionError::Rejected {
            action: name.to_string(),
            message,
        })
    }

    /// Perform a password reset from a direct reset link.
    ///
    /// The link's `token` and `key` query parameters identify the reset
    /// grant; a link missing either is a caller error surfaced before any
    /// network call.
    pub async fn reset_password(
        &self,
        reset_link: &str,
        new_password: &str,
    ) -> Result<Map<String, Value>, ActionError> {
        let link = Url::parse(reset_link).map_err(ActionError::InvalidResetLink)?;
        let token = query_param(&link, "token").ok_or(ActionError::MalformedResetLink("token"))?;
        let key = query_param(&link, "key").ok_or(ActionError::MalformedResetLink("key"))?;

        let params = HashMap::from([
            ("token".to_string(), token),
            ("key".to_string(), key),
            ("newpassword".to_string(), new_password.to_string()),
            ("confirmpassword".to_string(), new_password.to_string()),
        ]);

        self.action(RESET_API, RESET_ACTION, params).await
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
