//! Core data structures shared across the scraping, execution, and workflow layers.

use std::collections::HashMap;

use url::Url;

/// Snapshot of one fetched page: final URL after redirects, HTTP status, and
/// the raw markup body.
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl PageDocument {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            body: body.into(),
        }
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Planned submission of one HTML-form-shaped request.
///
/// Field sets are rebuilt from the most recent response document before every
/// submission; hidden tokens regenerate per render and must never be reused
/// across steps.
#[derive(Debug, Clone)]
pub struct FormSubmission {
    pub action: Url,
    pub fields: HashMap<String, String>,
}

impl FormSubmission {
    pub fn new(action: Url, fields: HashMap<String, String>) -> Self {
        Self { action, fields }
    }

    pub fn insert_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// The landing page retained after a successful captcha pass.
///
/// Created by `request_otp`, consumed by `commit_password`. Threading the
/// value through the caller keeps the two steps sequenced by ownership
/// instead of shared mutable workflow state.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    document: PageDocument,
}

impl RecoveryContext {
    pub fn new(document: PageDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &PageDocument {
        &self.document
    }

    pub fn into_document(self) -> PageDocument {
        self.document
    }
}

impl From<PageDocument> for RecoveryContext {
    fn from(document: PageDocument) -> Self {
        Self::new(document)
    }
}
