//! Image-captcha challenge step.
//!
//! Extracts the challenge image reference and the verification form from a
//! challenge page, attaches the oracle's answer under the challenge field
//! name, and plans the verification submission consumed by the executor.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

use html_escape::decode_html_entities;

use crate::flow::core::scrape::{FormLocator, ScrapeError, scrape_form};
use crate::flow::core::types::{FormSubmission, PageDocument};

/// Field name under which the captcha answer is submitted.
pub const CAPTCHA_ANSWER_FIELD: &str = "cvf_captcha_input";

const CAPTCHA_FORM_CLASS: &str = "cvf-widget-form-captcha";

/// Failure states while preparing the captcha verification step.
#[derive(Debug, Error)]
pub enum CaptchaStepError {
    #[error("challenge page does not contain a captcha image")]
    MissingChallengeImage,
    #[error("invalid challenge image reference '{0}': {1}")]
    InvalidImageUrl(String, url::ParseError),
    #[error(transparent)]
    Form(#[from] ScrapeError),
}

/// Extract the challenge image reference from a challenge page.
///
/// Relative references are resolved against the page URL.
pub fn extract_challenge_image(document: &PageDocument) -> Result<Url, CaptchaStepError> {
    let raw = CAPTCHA_IMG_RE
        .captures(&document.body)
        .and_then(|caps| caps.name("src"))
        .map(|m| decode_html_entities(m.as_str()).into_owned())
        .ok_or(CaptchaStepError::MissingChallengeImage)?;

    document
        .url
        .join(&raw)
        .map_err(|err| CaptchaStepError::InvalidImageUrl(raw, err))
}

/// Build the verification submission from the *original* challenge page.
///
/// The hidden field set must come from the page that presented the image, not
/// a fresh fetch: the challenge context tokens are bound to that render. The
/// submission posts to the provider's fixed verify endpoint.
pub fn build_verification_submission(
    challenge_page: &PageDocument,
    verify_url: &Url,
    answer: &str,
) -> Result<FormSubmission, CaptchaStepError> {
    let form = scrape_form(&challenge_page.body, &FormLocator::Class(CAPTCHA_FORM_CLASS))?;
    let submission = FormSubmission::new(verify_url.clone(), form.fields)
        .insert_field(CAPTCHA_ANSWER_FIELD, answer);
    Ok(submission)
}

/// `true` when the verification response carries the captcha-rejection
/// indicator, i.e. the oracle's answer was wrong.
pub fn is_rejected(document: &PageDocument) -> bool {
    CAPTCHA_ERROR_RE.is_match(&document.body)
}

static CAPTCHA_IMG_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r#"class=['"][^'"]*cvf-captcha-img[^'"]*['"][^>]*>.*?<img[^>]*src=['"](?P<src>[^'"]+)['"]"#,
    )
    .case_insensitive(true)
    .dot_matches_new_line(true)
    .build()
    .expect("invalid captcha image regex")
});

static CAPTCHA_ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"class=['"][^'"]*cvf-widget-alert-id-cvf-captcha-error[^'"]*['"]"#)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("invalid captcha error regex")
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn challenge_page(body: &str) -> PageDocument {
        PageDocument::new(
            Url::parse("https://idp.example.com/ap/cvf/request").unwrap(),
            200,
            body,
        )
    }

    fn sample_challenge_html() -> &'static str {
        r#"
        <html><body>
          <div class="cvf-captcha-img">
            <img alt="captcha" src="/captcha/image?id=77&amp;variant=2" />
          </div>
          <form class="cvf-widget-form-captcha" action="verify" method="POST">
            <input type="hidden" name="cvf_context" value="ctx-0099" />
            <input type="hidden" name="clientContext" value="cc-1" />
            <input type="text" name="cvf_captcha_input" value="" />
          </form>
        </body></html>
        "#
    }

    #[test]
    fn extracts_and_resolves_image_reference() {
        let page = challenge_page(sample_challenge_html());
        let image = extract_challenge_image(&page).unwrap();
        assert_eq!(
            image.as_str(),
            "https://idp.example.com/captcha/image?id=77&variant=2"
        );
    }

    #[test]
    fn missing_image_is_an_error() {
        let page = challenge_page("<html><body>no challenge</body></html>");
        let err = extract_challenge_image(&page).unwrap_err();
        assert!(matches!(err, CaptchaStepError::MissingChallengeImage));
    }

    #[test]
    fn verification_submission_carries_context_and_answer() {
        let page = challenge_page(sample_challenge_html());
        let verify = Url::parse("https://idp.example.com/ap/cvf/verify").unwrap();

        let submission = build_verification_submission(&page, &verify, "AB12").unwrap();
        assert_eq!(submission.action, verify);
        assert_eq!(
            submission.fields.get(CAPTCHA_ANSWER_FIELD),
            Some(&"AB12".to_string())
        );
        assert_eq!(
            submission.fields.get("cvf_context"),
            Some(&"ctx-0099".to_string())
        );
        assert_eq!(submission.fields.get("clientContext"), Some(&"cc-1".to_string()));
    }

    #[test]
    fn verification_form_missing_is_an_error() {
        let page = challenge_page("<html><body><div class='cvf-captcha-img'><img src='x.png'/></div></body></html>");
        let verify = Url::parse("https://idp.example.com/ap/cvf/verify").unwrap();
        let err = build_verification_submission(&page, &verify, "AB12").unwrap_err();
        assert!(matches!(err, CaptchaStepError::Form(ScrapeError::FormNotFound(_))));
    }

    #[test]
    fn rejection_indicator_is_detected() {
        let rejected = challenge_page(
            r#"<div class="cvf-widget-alert cvf-widget-alert-id-cvf-captcha-error">wrong</div>"#,
        );
        assert!(is_rejected(&rejected));

        let clean = challenge_page("<html><body>continue</body></html>");
        assert!(!is_rejected(&clean));
    }

    #[test]
    fn submission_fields_are_rebuilt_not_shared() {
        let page = challenge_page(sample_challenge_html());
        let verify = Url::parse("https://idp.example.com/ap/cvf/verify").unwrap();

        let first = build_verification_submission(&page, &verify, "AB12").unwrap();
        let second = build_verification_submission(&page, &verify, "XY99").unwrap();

        let mut expected: HashMap<String, String> = first.fields.clone();
        expected.insert(CAPTCHA_ANSWER_FIELD.to_string(), "XY99".to_string());
        assert_eq!(second.fields, expected);
    }
}
