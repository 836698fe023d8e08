//! Markup extraction helpers.
//!
//! Pure functions over raw HTML: form-field enumeration, banner lookup, and
//! OTP extraction from verification e-mails. These are the workflow's defence
//! against the provider's change-prone UI surface, so a missing form or
//! element is surfaced as a typed error naming what was expected.

use std::collections::HashMap;
use std::fmt;

use scraper::{Html, Selector};
use thiserror::Error;

/// How to locate a form inside a response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormLocator {
    Id(&'static str),
    Class(&'static str),
}

impl FormLocator {
    fn selector(&self) -> String {
        match self {
            FormLocator::Id(id) => format!("#{id}"),
            FormLocator::Class(class) => format!("form.{class}"),
        }
    }
}

impl fmt::Display for FormLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormLocator::Id(id) => write!(f, "form id '{id}'"),
            FormLocator::Class(class) => write!(f, "form class '{class}'"),
        }
    }
}

/// Form snapshot: declared action (if any) and the `{name: value}` field set.
#[derive(Debug, Clone)]
pub struct ScrapedForm {
    pub action: Option<String>,
    pub fields: HashMap<String, String>,
}

/// Outcomes when an expected element is absent from a document.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unable to locate {0}")]
    FormNotFound(FormLocator),
    #[error("verification message does not contain an OTP")]
    OtpNotFound,
    #[error("invalid selector '{0}'")]
    Selector(String),
}

fn parse_selector(raw: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(raw).map_err(|_| ScrapeError::Selector(raw.to_string()))
}

/// Extract a form's action and input fields.
///
/// Every `<input>` descendant with a non-empty `name` attribute contributes a
/// field; nameless inputs are skipped, and a missing `value` becomes the empty
/// string. The form itself being absent is a hard failure: the page shape no
/// longer matches what the flow expects.
pub fn scrape_form(html: &str, locator: &FormLocator) -> Result<ScrapedForm, ScrapeError> {
    let document = Html::parse_document(html);
    let form_selector = parse_selector(&locator.selector())?;
    let input_selector = parse_selector("input")?;

    let form = document
        .select(&form_selector)
        .next()
        .ok_or_else(|| ScrapeError::FormNotFound(locator.clone()))?;

    let mut fields = HashMap::new();
    for input in form.select(&input_selector) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let value = input.value().attr("value").unwrap_or_default();
        fields.insert(name.to_string(), value.to_string());
    }

    Ok(ScrapedForm {
        action: form.value().attr("action").map(str::to_string),
        fields,
    })
}

/// Text content of the element with the given id, if present.
///
/// Used for the provider's error and success banners.
pub fn element_text(html: &str, id: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&format!("#{id}")).ok()?;
    let element = document.select(&selector).next()?;
    let text: String = element.text().collect();
    Some(text.trim().to_string())
}

/// Content of a named `<meta>` tag, if present.
pub fn meta_content(html: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&format!(r#"meta[name="{name}"]"#)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
}

/// Pull the one-time password out of a verification e-mail body.
///
/// The OTP arrives through an out-of-band channel this crate does not fetch;
/// callers hand the raw message markup in. Pure function: same input, same
/// token, independent of any workflow state.
pub fn email_otp(html: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let selector = parse_selector("#verificationMsg .otp")?;
    let otp = document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(ScrapeError::OtpNotFound)?;
    Ok(otp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_FORM: &str = r#"
        <html><body>
          <form id="fpp-entry-form" action="/ap/forgotpassword/submit" method="POST">
            <input type="hidden" name="appActionToken" value="tok-123" />
            <input type="hidden" name="openid.return_to" value="https://idp.example.com/done" />
            <input type="hidden" value="orphan" />
            <input type="text" name="email" />
            <input type="submit" name="" value="Continue" />
          </form>
        </body></html>
    "#;

    #[test]
    fn scrape_form_collects_named_inputs() {
        let form = scrape_form(ENTRY_FORM, &FormLocator::Id("fpp-entry-form")).unwrap();
        assert_eq!(form.action.as_deref(), Some("/ap/forgotpassword/submit"));
        assert_eq!(form.fields.get("appActionToken"), Some(&"tok-123".to_string()));
        assert_eq!(
            form.fields.get("openid.return_to"),
            Some(&"https://idp.example.com/done".to_string())
        );
        // missing value attribute becomes an empty string
        assert_eq!(form.fields.get("email"), Some(&String::new()));
        // nameless and empty-name inputs are skipped, not errors
        assert_eq!(form.fields.len(), 3);
    }

    #[test]
    fn scrape_form_missing_form_is_hard_failure() {
        let err = scrape_form(ENTRY_FORM, &FormLocator::Id("does-not-exist")).unwrap_err();
        assert!(matches!(err, ScrapeError::FormNotFound(_)));
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn scrape_form_by_class() {
        let html = r#"
            <form class="cvf-widget-form-captcha" action="verify">
              <input name="cvf_context" value="ctx" />
            </form>
        "#;
        let form = scrape_form(html, &FormLocator::Class("cvf-widget-form-captcha")).unwrap();
        assert_eq!(form.fields.get("cvf_context"), Some(&"ctx".to_string()));
    }

    #[test]
    fn element_text_reads_banner() {
        let html = r#"<div id="message_error">  Enter the characters as shown  </div>"#;
        assert_eq!(
            element_text(html, "message_error").as_deref(),
            Some("Enter the characters as shown")
        );
        assert_eq!(element_text(html, "message_success"), None);
    }

    #[test]
    fn meta_content_reads_named_tag() {
        let html = r#"<head><meta name="csrf_token" content="abc123" /></head>"#;
        assert_eq!(meta_content(html, "csrf_token").as_deref(), Some("abc123"));
        assert_eq!(meta_content(html, "other"), None);
    }

    #[test]
    fn email_otp_extracts_token() {
        let html = r#"
            <div id="verificationMsg">
              Your verification code is <span class="otp">918273</span>.
            </div>
        "#;
        assert_eq!(email_otp(html).unwrap(), "918273");
    }

    #[test]
    fn email_otp_is_pure() {
        let html = r#"<div id="verificationMsg"><b class="otp">42AB</b></div>"#;
        let first = email_otp(html).unwrap();
        let second = email_otp(html).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn email_otp_missing_marker_errors() {
        let err = email_otp("<html><body>nothing here</body></html>").unwrap_err();
        assert!(matches!(err, ScrapeError::OtpNotFound));
    }
}
