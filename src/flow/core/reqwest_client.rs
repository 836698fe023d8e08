//! Reqwest-based implementation of the `FormHttpClient` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that converts between the
//! page representation used by the flow core and the concrete transport.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::executor::{FormHttpClient, FormHttpClientError};
use super::types::PageDocument;

/// Reqwest-backed HTTP client used by the recovery flow.
pub struct ReqwestFormHttpClient {
    client: Client,
}

impl ReqwestFormHttpClient {
    /// Creates a new client with an enabled cookie store. Redirects are
    /// followed; the final URL after redirects is recorded on the returned
    /// document so later steps can re-fetch it.
    pub fn new() -> Result<Self, FormHttpClientError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| FormHttpClientError::Transport(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client. The client should have its cookie
    /// store enabled; the provider threads session state through cookies.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FormHttpClient for ReqwestFormHttpClient {
    async fn get(&self, url: &Url) -> Result<PageDocument, FormHttpClientError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| FormHttpClientError::Transport(err.to_string()))?;

        to_page_document(response).await
    }

    async fn post_form(
        &self,
        url: &Url,
        fields: &HashMap<String, String>,
    ) -> Result<PageDocument, FormHttpClientError> {
        let response = self
            .client
            .post(url.as_str())
            .form(fields)
            .send()
            .await
            .map_err(|err| FormHttpClientError::Transport(err.to_string()))?;

        to_page_document(response).await
    }
}

async fn to_page_document(response: reqwest::Response) -> Result<PageDocument, FormHttpClientError> {
    let status = response.status().as_u16();
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|err| FormHttpClientError::Transport(err.to_string()))?;

    Ok(PageDocument::new(url, status, body))
}
