//! High level recovery orchestration.
//!
//! Wires together the document scraper, the form-step executor, and the
//! captcha oracle to drive the provider's multi-step recovery flow:
//! request an OTP for an e-mail address, clear the interposed image
//! challenge (restarting the cycle on a wrong guess, within a configurable
//! budget), then commit the new password with the OTP retrieved from the
//! verification e-mail.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::external_deps::captcha::{
    CaptchaConfig, CaptchaError, CaptchaOracle, await_answer,
};
use crate::external_deps::metadata::{AntiForgeryMetadataGenerator, RandomMetadataGenerator};
use crate::flow::captcha::{
    CaptchaStepError, build_verification_submission, extract_challenge_image, is_rejected,
};
use crate::flow::core::executor::{
    FormHttpClient, FormHttpClientError, FormStepError, FormStepExecutor,
};
use crate::flow::core::reqwest_client::ReqwestFormHttpClient;
use crate::flow::core::scrape::{
    FormLocator, ScrapeError, element_text, email_otp, scrape_form,
};
use crate::flow::core::types::{FormSubmission, PageDocument, RecoveryContext};

const ENTRY_FORM_ID: &str = "ap_fpp_1a_form";
const PASSWORD_FORM_ID: &str = "ap_fpp_1d_form";
const CODE_FORM_ID: &str = "verification-code-form";
const ERROR_BANNER_ID: &str = "message_error";
const SUCCESS_BANNER_ID: &str = "message_success";

const EMAIL_FIELD: &str = "email";
const CODE_FIELD: &str = "code";
const PASSWORD_FIELD: &str = "password";
const PASSWORD_CHECK_FIELD: &str = "passwordCheck";

/// Result alias used across the orchestration layer.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// High-level error surfaced by the workflow.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("usage error: {0}")]
    Usage(String),
    #[error("provider rejected {step}: {message}")]
    Provider { step: &'static str, message: String },
    #[error("transport initialisation failed: {0}")]
    TransportInit(#[from] FormHttpClientError),
    #[error(transparent)]
    Step(#[from] FormStepError),
    #[error("unexpected page shape: {0}")]
    Page(#[from] ScrapeError),
    #[error(transparent)]
    CaptchaStep(#[from] CaptchaStepError),
    #[error("captcha oracle error: {0}")]
    Captcha(#[from] CaptchaError),
    #[error("captcha attempts exhausted after {0} challenges")]
    CaptchaAttemptsExhausted(usize),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

/// Provider URL surface the flow operates against.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Forgot-password entry page; the e-mail rides along as a query
    /// parameter on the initial fetch.
    pub forgot_password: Url,
    /// Fixed verification endpoint both the captcha answer and the e-mail
    /// OTP are posted to.
    pub verify: Url,
    /// Page whose `<meta>` tags carry the gateway's anti-forgery token.
    pub token_page: Url,
    /// Base URL the JSON action APIs hang off.
    pub action_base: Url,
}

impl ProviderEndpoints {
    /// Derive the conventional endpoint layout from a signin base URL.
    pub fn for_base(signin: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            forgot_password: signin.join("ap/forgotpassword")?,
            verify: signin.join("ap/cvf/verify")?,
            token_page: signin.join("resetpassword")?,
            action_base: signin.clone(),
        })
    }

    fn forgot_password_url(&self, email: &str) -> Url {
        let mut url = self.forgot_password.clone();
        url.query_pairs_mut().append_pair(EMAIL_FIELD, email);
        url
    }
}

/// Workflow configuration used by the builder.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Poll interval and overall wait bound for the captcha answer.
    pub captcha: CaptchaConfig,
    /// How many full challenge cycles to run before giving up. Each wrong
    /// guess restarts from the entry page with a fresh challenge image.
    pub max_captcha_attempts: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            captcha: CaptchaConfig::default(),
            max_captcha_attempts: 3,
        }
    }
}

/// Fluent builder for [`RecoveryWorkflow`].
pub struct RecoveryWorkflowBuilder {
    endpoints: Option<ProviderEndpoints>,
    transport: Option<Arc<dyn FormHttpClient>>,
    oracle: Option<Arc<dyn CaptchaOracle>>,
    metadata: Option<Arc<dyn AntiForgeryMetadataGenerator>>,
    config: RecoveryConfig,
}

impl RecoveryWorkflowBuilder {
    pub fn new() -> Self {
        Self {
            endpoints: None,
            transport: None,
            oracle: None,
            metadata: None,
            config: RecoveryConfig::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn FormHttpClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn CaptchaOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_metadata_generator(
        mut self,
        generator: Arc<dyn AntiForgeryMetadataGenerator>,
    ) -> Self {
        self.metadata = Some(generator);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.captcha.poll_interval = interval;
        self
    }

    pub fn with_solve_timeout(mut self, timeout: Duration) -> Self {
        self.config.captcha.solve_timeout = timeout;
        self
    }

    pub fn with_max_captcha_attempts(mut self, attempts: usize) -> Self {
        self.config.max_captcha_attempts = attempts.max(1);
        self
    }

    pub fn build(self) -> RecoveryResult<RecoveryWorkflow> {
        let endpoints = self
            .endpoints
            .ok_or_else(|| RecoveryError::Usage("provider endpoints are required".into()))?;
        let oracle = self
            .oracle
            .ok_or_else(|| RecoveryError::Usage("a captcha oracle is required".into()))?;

        let transport: Arc<dyn FormHttpClient> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestFormHttpClient::new()?),
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(RandomMetadataGenerator::default()));

        Ok(RecoveryWorkflow {
            executor: FormStepExecutor::new(transport, metadata),
            oracle,
            endpoints,
            config: self.config,
        })
    }
}

impl Default for RecoveryWorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the provider's multi-step recovery flow.
///
/// One instance corresponds to one provider session (one cookie jar). The
/// cross-step state, the landing page produced by a successful challenge
/// pass, is returned to the caller as a [`RecoveryContext`] and handed back
/// to [`RecoveryWorkflow::commit_password`], so two interleaved recoveries
/// on distinct instances can never trample each other's state.
pub struct RecoveryWorkflow {
    executor: FormStepExecutor,
    oracle: Arc<dyn CaptchaOracle>,
    endpoints: ProviderEndpoints,
    config: RecoveryConfig,
}

impl RecoveryWorkflow {
    /// Obtain a builder to customise the workflow instance.
    pub fn builder() -> RecoveryWorkflowBuilder {
        RecoveryWorkflowBuilder::new()
    }

    /// Request an OTP to be sent to the account's e-mail address.
    ///
    /// Fetches the forgot-password entry page, submits the entry form, and
    /// clears the interposed image challenge. A wrong oracle guess is
    /// reported back (best effort) and restarts the whole cycle (entry
    /// page, fresh challenge image, new answer) up to the configured
    /// attempt budget. On success the provider e-mails the OTP and the
    /// returned context carries the landing page the final commit needs.
    pub async fn request_otp(&self, email: &str) -> RecoveryResult<RecoveryContext> {
        let entry_url = self.endpoints.forgot_password_url(email);

        for attempt in 1..=self.config.max_captcha_attempts {
            let entry = self.executor.fetch("request-otp entry", &entry_url).await?;
            if let Some(message) = element_text(&entry.body, ERROR_BANNER_ID) {
                return Err(RecoveryError::Provider {
                    step: "request-otp entry",
                    message,
                });
            }

            let form = scrape_form(&entry.body, &FormLocator::Id(ENTRY_FORM_ID))?;
            let action = resolve_action(&entry, form.action.as_deref())?;
            let submission =
                FormSubmission::new(action, form.fields).insert_field(EMAIL_FIELD, email);
            let challenge = self.executor.submit("request-otp submit", submission).await?;

            let image = extract_challenge_image(&challenge)?;
            let handle = self.oracle.solve(&image).await?;
            let answer =
                await_answer(self.oracle.as_ref(), &handle, &self.config.captcha).await?;

            let verification =
                build_verification_submission(&challenge, &self.endpoints.verify, &answer)?;
            let response = self.executor.submit("captcha-verify", verification).await?;

            if is_rejected(&response) {
                if let Err(err) = self.oracle.report_incorrect(&handle).await {
                    log::warn!("failed to report incorrect captcha guess: {err}");
                }
                log::debug!("captcha answer rejected on attempt {attempt}, restarting cycle");
                continue;
            }

            let landing_url = response.url.clone();
            let landing = self.executor.fetch("recovery landing", &landing_url).await?;
            return Ok(RecoveryContext::new(landing));
        }

        Err(RecoveryError::CaptchaAttemptsExhausted(
            self.config.max_captcha_attempts,
        ))
    }

    /// Commit a new password using the OTP from the verification e-mail.
    ///
    /// Consumes the context produced by [`RecoveryWorkflow::request_otp`]:
    /// submits the OTP through the verification-code form, then posts the
    /// new password through the password-entry form the provider renders in
    /// response. Returns `true` only when the final page carries the success
    /// banner; a recognised "did not succeed" page is reported as `false`,
    /// not raised as an error.
    pub async fn commit_password(
        &self,
        context: RecoveryContext,
        new_password: &str,
        otp: &str,
    ) -> RecoveryResult<bool> {
        let document = context.into_document();
        if document.body.trim().is_empty() {
            return Err(RecoveryError::Usage(
                "recovery context is empty; run request_otp first".into(),
            ));
        }

        let code_form = scrape_form(&document.body, &FormLocator::Id(CODE_FORM_ID))?;
        let submission = FormSubmission::new(self.endpoints.verify.clone(), code_form.fields)
            .insert_field(CODE_FIELD, otp);
        let password_page = self.executor.submit("otp-verify", submission).await?;

        let password_form = scrape_form(&password_page.body, &FormLocator::Id(PASSWORD_FORM_ID))?;
        let action = resolve_action(&password_page, password_form.action.as_deref())?;
        let submission = FormSubmission::new(action, password_form.fields)
            .insert_field(PASSWORD_FIELD, new_password)
            .insert_field(PASSWORD_CHECK_FIELD, new_password);
        let outcome = self.executor.submit("password-commit", submission).await?;

        Ok(element_text(&outcome.body, SUCCESS_BANNER_ID).is_some())
    }
}

/// Parse the verification e-mail and return the OTP it carries.
///
/// The OTP arrives through an out-of-band channel this crate does not fetch.
/// Stateless: independent of call order and of any workflow instance.
pub fn retrieve_email_otp(email_body: &str) -> RecoveryResult<String> {
    Ok(email_otp(email_body)?)
}

fn resolve_action(document: &PageDocument, action: Option<&str>) -> RecoveryResult<Url> {
    match action {
        Some(action) if !action.is_empty() => Ok(document.url.join(action)?),
        _ => Ok(document.url.clone()),
    }
}
