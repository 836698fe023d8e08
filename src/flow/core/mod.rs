//! Core utilities shared by the scraping, execution, and workflow layers.

pub mod executor;
pub mod reqwest_client;
pub mod scrape;
pub mod types;

pub use executor::{
    FormHttpClient, FormHttpClientError, FormStepError, FormStepExecutor, METADATA_FIELD,
};
pub use reqwest_client::ReqwestFormHttpClient;
pub use scrape::{FormLocator, ScrapeError, ScrapedForm, element_text, email_otp, meta_content, scrape_form};
pub use types::{FormSubmission, PageDocument, RecoveryContext};
