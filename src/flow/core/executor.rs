//! Form submission execution utilities.
//!
//! Handles one HTML-form-shaped exchange at a time: regenerate the
//! anti-forgery metadata value, merge it into the field set, perform the
//! exchange through the transport abstraction, and surface meaningful errors
//! naming the step that failed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::types::{FormSubmission, PageDocument};
use crate::external_deps::metadata::AntiForgeryMetadataGenerator;

/// Field name under which the anti-forgery metadata value travels.
pub const METADATA_FIELD: &str = "metadata1";

/// Contract that abstracts the underlying HTTP transport.
///
/// Implementations must preserve cookies between calls so the recovery
/// session behaves consistently, and must follow redirects, reporting the
/// final URL in the returned document.
#[async_trait]
pub trait FormHttpClient: Send + Sync {
    async fn get(&self, url: &Url) -> Result<PageDocument, FormHttpClientError>;

    async fn post_form(
        &self,
        url: &Url,
        fields: &HashMap<String, String>,
    ) -> Result<PageDocument, FormHttpClientError>;
}

#[derive(Debug, Error)]
pub enum FormHttpClientError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Failure states for a single form step.
#[derive(Debug, Error)]
pub enum FormStepError {
    #[error("http client error during {step}: {source}")]
    Client {
        step: &'static str,
        #[source]
        source: FormHttpClientError,
    },
    #[error("unexpected status {status} during {step}")]
    UnexpectedStatus { step: &'static str, status: u16 },
}

/// Executes form steps against the transport, stamping each submission with a
/// freshly generated anti-forgery value.
pub struct FormStepExecutor {
    client: Arc<dyn FormHttpClient>,
    metadata: Arc<dyn AntiForgeryMetadataGenerator>,
}

impl FormStepExecutor {
    pub fn new(
        client: Arc<dyn FormHttpClient>,
        metadata: Arc<dyn AntiForgeryMetadataGenerator>,
    ) -> Self {
        Self { client, metadata }
    }

    /// Fetch a page. Non-2xx is a hard failure for the step.
    pub async fn fetch(&self, step: &'static str, url: &Url) -> Result<PageDocument, FormStepError> {
        let document = self
            .client
            .get(url)
            .await
            .map_err(|source| FormStepError::Client { step, source })?;
        ensure_success(step, document)
    }

    /// Submit a planned form exchange and return the resulting document.
    ///
    /// The anti-forgery value is one-shot per request: it is regenerated here
    /// for every submission rather than carried over from a previous step.
    pub async fn submit(
        &self,
        step: &'static str,
        submission: FormSubmission,
    ) -> Result<PageDocument, FormStepError> {
        let FormSubmission { action, mut fields } = submission;
        fields.insert(METADATA_FIELD.to_string(), self.metadata.generate());

        let document = self
            .client
            .post_form(&action, &fields)
            .await
            .map_err(|source| FormStepError::Client { step, source })?;
        ensure_success(step, document)
    }
}

fn ensure_success(
    step: &'static str,
    document: PageDocument,
) -> Result<PageDocument, FormStepError> {
    if !document.is_success() {
        return Err(FormStepError::UnexpectedStatus {
            step,
            status: document.status,
        });
    }
    Ok(document)
}
