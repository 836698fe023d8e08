//! 2Captcha-compatible oracle adapter.
//!
//! Speaks the classic `in.php`/`res.php` plain-text protocol shared by
//! 2Captcha and its API-compatible competitors: the challenge image is
//! downloaded and uploaded base64-encoded, the answer is polled with
//! `action=get`, and wrong guesses are fed back with `action=reportbad`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use url::Url;

use async_trait::async_trait;

use super::{CaptchaError, CaptchaOracle, CaptchaPoll, CaptchaResult, ChallengeHandle};

const DEFAULT_BASE: &str = "https://2captcha.com/";

/// Adapter for 2Captcha-compatible image-solving services.
pub struct TwoCaptchaOracle {
    api_key: String,
    base: Url,
    client: Client,
}

impl TwoCaptchaOracle {
    pub fn new(api_key: impl Into<String>) -> CaptchaResult<Self> {
        let base = Url::parse(DEFAULT_BASE)
            .map_err(|err| CaptchaError::Configuration(err.to_string()))?;
        Self::with_base(api_key, base)
    }

    /// Point the adapter at an API-compatible service.
    pub fn with_base(api_key: impl Into<String>, base: Url) -> CaptchaResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|err| CaptchaError::Configuration(err.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            base,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> CaptchaResult<Url> {
        self.base
            .join(path)
            .map_err(|err| CaptchaError::Configuration(err.to_string()))
    }

    async fn fetch_image(&self, image: &Url) -> CaptchaResult<Vec<u8>> {
        let response = self
            .client
            .get(image.as_str())
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptchaError::Provider(format!(
                "challenge image fetch returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CaptchaOracle for TwoCaptchaOracle {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, image: &Url) -> CaptchaResult<ChallengeHandle> {
        let image_bytes = self.fetch_image(image).await?;
        let encoded = STANDARD.encode(&image_bytes);

        let endpoint = self.endpoint("in.php")?;
        let response = self
            .client
            .post(endpoint.as_str())
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", "base64"),
                ("body", encoded.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        parse_submit_response(&text)
    }

    async fn poll(&self, handle: &ChallengeHandle) -> CaptchaResult<CaptchaPoll> {
        let endpoint = self.endpoint("res.php")?;
        let response = self
            .client
            .get(endpoint.as_str())
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", handle.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        parse_poll_response(&text)
    }

    async fn report_incorrect(&self, handle: &ChallengeHandle) -> CaptchaResult<()> {
        let endpoint = self.endpoint("res.php")?;
        let response = self
            .client
            .get(endpoint.as_str())
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "reportbad"),
                ("id", handle.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        if text.starts_with("ERROR") {
            return Err(CaptchaError::Provider(text));
        }
        Ok(())
    }
}

fn parse_submit_response(text: &str) -> CaptchaResult<ChallengeHandle> {
    match text.trim().split_once('|') {
        Some(("OK", id)) if !id.is_empty() => Ok(ChallengeHandle::new(id)),
        _ => Err(CaptchaError::Provider(text.trim().to_string())),
    }
}

fn parse_poll_response(text: &str) -> CaptchaResult<CaptchaPoll> {
    let text = text.trim();
    if text == "CAPCHA_NOT_READY" {
        return Ok(CaptchaPoll::Pending);
    }
    match text.split_once('|') {
        Some(("OK", answer)) => Ok(CaptchaPoll::Ready(answer.to_string())),
        _ => Err(CaptchaError::Provider(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_response_parses_id() {
        let handle = parse_submit_response("OK|2122988149").unwrap();
        assert_eq!(handle.as_str(), "2122988149");
    }

    #[test]
    fn submit_response_surfaces_vendor_error() {
        let err = parse_submit_response("ERROR_WRONG_USER_KEY").unwrap_err();
        assert!(matches!(err, CaptchaError::Provider(ref msg) if msg == "ERROR_WRONG_USER_KEY"));
    }

    #[test]
    fn poll_response_not_ready_is_pending() {
        assert_eq!(
            parse_poll_response("CAPCHA_NOT_READY").unwrap(),
            CaptchaPoll::Pending
        );
    }

    #[test]
    fn poll_response_parses_answer() {
        assert_eq!(
            parse_poll_response("OK|AB12").unwrap(),
            CaptchaPoll::Ready("AB12".to_string())
        );
    }

    #[test]
    fn poll_response_surfaces_vendor_error() {
        let err = parse_poll_response("ERROR_CAPTCHA_UNSOLVABLE").unwrap_err();
        assert!(matches!(err, CaptchaError::Provider(_)));
    }
}
