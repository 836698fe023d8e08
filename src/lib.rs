//! # pwreset-rs
//!
//! Automated account-recovery flow driver for browser-oriented identity
//! providers that expose no stable API contract: pages are scraped for
//! hidden form tokens, and the flow clears the image-based verification
//! challenge interposed mid-way by delegating it to an external solving
//! oracle.
//!
//! The crate drives two distinct recovery paths:
//!
//! - the **OTP flow** ([`RecoveryWorkflow`]): request an OTP for an e-mail
//!   address, solve the image challenge (restarting on wrong guesses within
//!   a configurable budget), then commit the new password with the OTP
//!   retrieved from the verification e-mail;
//! - the **token-reset path** ([`ActionGateway`]): when the caller already
//!   holds a direct reset link, a single named JSON action performs the
//!   reset, authenticated by a cached anti-forgery token.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pwreset_rs::{ProviderEndpoints, RecoveryWorkflow, TwoCaptchaOracle, retrieve_email_otp};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoints = ProviderEndpoints::for_base(&Url::parse("https://signin.example.com/")?)?;
//!     let workflow = RecoveryWorkflow::builder()
//!         .with_endpoints(endpoints)
//!         .with_oracle(Arc::new(TwoCaptchaOracle::new("api-key")?))
//!         .build()?;
//!
//!     let context = workflow.request_otp("user@example.com").await?;
//!     // ... fetch the verification e-mail out of band ...
//!     let otp = retrieve_email_otp("<html>...</html>")?;
//!     let changed = workflow.commit_password(context, "N3wPassword!", &otp).await?;
//!     println!("password changed: {changed}");
//!     Ok(())
//! }
//! ```

mod workflow;

pub mod external_deps;
pub mod flow;
pub mod gateway;

pub use crate::workflow::{
    ProviderEndpoints,
    RecoveryConfig,
    RecoveryError,
    RecoveryResult,
    RecoveryWorkflow,
    RecoveryWorkflowBuilder,
    retrieve_email_otp,
};

pub use crate::flow::core::{
    FormHttpClient,
    FormHttpClientError,
    FormLocator,
    FormStepError,
    FormStepExecutor,
    FormSubmission,
    PageDocument,
    RecoveryContext,
    ReqwestFormHttpClient,
    ScrapeError,
    ScrapedForm,
};

pub use crate::flow::captcha::{
    CAPTCHA_ANSWER_FIELD,
    CaptchaStepError,
    build_verification_submission,
    extract_challenge_image,
    is_rejected,
};

pub use crate::external_deps::captcha::{
    CaptchaConfig,
    CaptchaError,
    CaptchaOracle,
    CaptchaPoll,
    CaptchaResult,
    ChallengeHandle,
    TwoCaptchaOracle,
    await_answer,
};

pub use crate::external_deps::metadata::{AntiForgeryMetadataGenerator, RandomMetadataGenerator};

pub use crate::gateway::{ActionError, ActionGateway};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
