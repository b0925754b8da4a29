//! 2Captcha adapter.
//!
//! Speaks the classic `in.php` / `res.php` API: parameters go in the query
//! string, image payloads as multipart, and every answer is plain text of the
//! form `OK|<value>` or a bare error code.

use async_trait::async_trait;
use rquest::multipart::{Form, Part};
use rquest::Client;

use crate::config::{FromConfig, ProviderBuilder, ProviderConfig};
use crate::error::{lookup, CaptchaError, ErrorKind, Result, VendorCode, UNKNOWN_MESSAGE};
use crate::models::{Captcha, RecaptchaVersion, TaskHandle, Vendor};
use crate::providers::{Provider, Reporter};
use crate::proxy::ProxySpec;

const SUBMIT_URL: &str = "https://2captcha.com/in.php";
const RESULT_URL: &str = "https://2captcha.com/res.php";

/// Every code 2Captcha is documented to answer with.
pub const ERROR_CODES: &[VendorCode] = &[
    VendorCode {
        code: "CAPCHA_NOT_READY",
        kind: ErrorKind::NotReady,
        message: "captcha not ready",
    },
    VendorCode {
        code: "ERROR_WRONG_USER_KEY",
        kind: ErrorKind::InvalidCredentials,
        message: "provided key parameter value in incorrect format",
    },
    VendorCode {
        code: "ERROR_KEY_DOES_NOT_EXIST",
        kind: ErrorKind::InvalidCredentials,
        message: "provided key does not exist",
    },
    VendorCode {
        code: "ERROR_IP_NOT_ALLOWED",
        kind: ErrorKind::InvalidCredentials,
        message: "request is sent from IP not on list of your allowed IPs",
    },
    VendorCode {
        code: "ERROR_IP_ADDRES",
        kind: ErrorKind::InvalidCredentials,
        message: "request is coming from an IP address that doesn't match the pingback IP or domain",
    },
    VendorCode {
        code: "ERROR_ZERO_BALANCE",
        kind: ErrorKind::InsufficientBalance,
        message: "insufficient funds in account",
    },
    VendorCode {
        code: "ERROR_PAGEURL",
        kind: ErrorKind::InvalidRequestParameters,
        message: "pageurl parameter is missing",
    },
    VendorCode {
        code: "ERROR_ZERO_CAPTCHA_FILESIZE",
        kind: ErrorKind::InvalidRequestParameters,
        message: "image size is less than 100 bytes",
    },
    VendorCode {
        code: "ERROR_UPLOAD",
        kind: ErrorKind::InvalidRequestParameters,
        message: "server couldn't get image from POST request",
    },
    VendorCode {
        code: "ERROR_BAD_TOKEN_OR_PAGEURL",
        kind: ErrorKind::InvalidRequestParameters,
        message: "page URL and sitekey are mismatched",
    },
    VendorCode {
        code: "ERROR_GOOGLEKEY",
        kind: ErrorKind::InvalidRequestParameters,
        message: "googlekey parameter is missing from request",
    },
    VendorCode {
        code: "ERROR_WRONG_GOOGLEKEY",
        kind: ErrorKind::InvalidRequestParameters,
        message: "googlekey parameter is missing from request",
    },
    VendorCode {
        code: "ERROR_BAD_PARAMETERS",
        kind: ErrorKind::InvalidRequestParameters,
        message: "required parameters are missing in request, or in incorrect format",
    },
    VendorCode {
        code: "ERROR_BAD_PROXY",
        kind: ErrorKind::InvalidRequestParameters,
        message: "service could not connect to proxy",
    },
    VendorCode {
        code: "ERROR_PROXY_CONNECTION_FAILED",
        kind: ErrorKind::InvalidRequestParameters,
        message: "service could not connect to proxy",
    },
    VendorCode {
        code: "ERROR_WRONG_ID_FORMAT",
        kind: ErrorKind::InvalidRequestParameters,
        message: "provided captcha ID in wrong format",
    },
    VendorCode {
        code: "ERROR_WRONG_CAPTCHA_ID",
        kind: ErrorKind::InvalidRequestParameters,
        message: "provided incorrect captcha ID",
    },
    VendorCode {
        code: "ERROR_TOKEN_EXPIRED",
        kind: ErrorKind::InvalidRequestParameters,
        message: "GeeTest challenge value provided is expired",
    },
    VendorCode {
        code: "ERROR_EMPTY_ACTION",
        kind: ErrorKind::InvalidRequestParameters,
        message: "action parameter is missing or no value is provided",
    },
    VendorCode {
        code: "REPORT_NOT_RECORDED",
        kind: ErrorKind::InvalidRequestParameters,
        message: "too many complaints or more than 15 minutes passed since the captcha was solved",
    },
    VendorCode {
        code: "ERROR_DUPLICATE_REPORT",
        kind: ErrorKind::InvalidRequestParameters,
        message: "reported the same captcha more than once",
    },
    VendorCode {
        code: "ERROR_TOO_BIG_CAPTCHA_FILESIZE",
        kind: ErrorKind::ContentTooLarge,
        message: "image file size exceeds 100kB",
    },
    VendorCode {
        code: "ERROR_WRONG_FILE_EXTENSION",
        kind: ErrorKind::UnsupportedContentType,
        message: "image file has unsupported extension, accepted: jpg, jpeg, gif, png",
    },
    VendorCode {
        code: "ERROR_IMAGE_TYPE_NOT_SUPPORTED",
        kind: ErrorKind::UnsupportedContentType,
        message: "server can't recognize image file type",
    },
    VendorCode {
        code: "ERROR_NO_SLOT_AVAILABLE",
        kind: ErrorKind::RateLimited,
        message: "queue of undistributed captchas is too long or rate is below the current server rate",
    },
    VendorCode {
        code: "IP_BANNED",
        kind: ErrorKind::RateLimited,
        message: "IP banned from service",
    },
    VendorCode {
        code: "TOO_MANY_BAD_IMAGES",
        kind: ErrorKind::RateLimited,
        message: "sent too many unrecognizable images",
    },
    VendorCode {
        code: "MAX_USER_TURN",
        kind: ErrorKind::RateLimited,
        message: "submitted too many captchas to service",
    },
    VendorCode {
        code: "ERROR_CAPTCHA_UNSOLVABLE",
        kind: ErrorKind::Unsolvable,
        message: "captcha not solvable",
    },
    VendorCode {
        code: "ERROR_CAPTCHAIMAGE_BLOCKED",
        kind: ErrorKind::Unsolvable,
        message: "sent image that is marked unrecognizable in service database",
    },
    VendorCode {
        code: "ERROR_BAD_DUPLICATES",
        kind: ErrorKind::Unsolvable,
        message: "max number of tries reached but min number of matches not found",
    },
];

const SUSPENDED_MESSAGE: &str = "account is temporarily suspended, too many requests";

/// `ERROR: 1001` and friends: temporary suspensions with a numeric reason.
fn is_suspension(code: &str) -> bool {
    code.strip_prefix("ERROR: ")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn classify(code: &str) -> (ErrorKind, &'static str) {
    if let Some(entry) = lookup(ERROR_CODES, code) {
        return (entry.kind, entry.message);
    }
    if is_suspension(code) {
        return (ErrorKind::RateLimited, SUSPENDED_MESSAGE);
    }
    (ErrorKind::Unknown, UNKNOWN_MESSAGE)
}

/// Map a 2Captcha response code onto [`ErrorKind`].
pub fn map_error(code: &str) -> ErrorKind {
    classify(code).0
}

fn vendor_error(code: &str) -> CaptchaError {
    let (kind, message) = classify(code);
    CaptchaError::Vendor {
        vendor: Vendor::TwoCaptcha,
        code: code.to_string(),
        kind,
        message,
    }
}

/// Encoded `in.php` request.
#[derive(Debug)]
struct Submission {
    params: Vec<(&'static str, String)>,
    file: Option<(String, Vec<u8>)>,
}

/// 2Captcha client.
///
/// # Example
/// ```ignore
/// use captcha_aio::{ReCaptcha, Solver, TwoCaptcha};
///
/// let provider = TwoCaptcha::builder("your_api_key").build()?;
/// let solver = Solver::new(provider);
/// let captcha = ReCaptcha::v2("site_key", "https://example.com/login");
/// let solution = solver.solve(&captcha.into(), None).await?;
/// ```
pub struct TwoCaptcha {
    client: Client,
    config: ProviderConfig,
}

impl FromConfig for TwoCaptcha {
    fn from_config(config: ProviderConfig, client: Client) -> Self {
        Self { client, config }
    }
}

impl TwoCaptcha {
    /// Create a builder for the 2Captcha client.
    pub fn builder(api_key: impl Into<String>) -> ProviderBuilder<Self> {
        ProviderBuilder::new(api_key)
    }

    fn submission(&self, captcha: &Captcha, proxy: Option<&ProxySpec>) -> Submission {
        let mut params = vec![("key", self.config.api_key.clone())];
        let mut file = None;

        match captcha {
            Captcha::ReCaptcha(c) => {
                params.push(("method", "userrecaptcha".into()));
                params.push(("googlekey", c.site_key.clone()));
                params.push(("pageurl", c.page_url.clone()));
                if c.invisible {
                    params.push(("invisible", "1".into()));
                }
                if c.version == RecaptchaVersion::V3 {
                    params.push(("version", "v3".into()));
                }
                if let Some(action) = &c.action {
                    params.push(("action", action.clone()));
                }
                if let Some(score) = c.min_score {
                    params.push(("min_score", score.to_string()));
                }
                if let Some(ua) = &c.user_agent {
                    params.push(("userAgent", ua.clone()));
                }
            }
            Captcha::HCaptcha(c) => {
                params.push(("method", "hcaptcha".into()));
                params.push(("sitekey", c.site_key.clone()));
                params.push(("pageurl", c.page_url.clone()));
                if let Some(ua) = &c.user_agent {
                    params.push(("userAgent", ua.clone()));
                }
            }
            Captcha::Image(c) => {
                params.push(("method", "post".into()));
                if c.phrase {
                    params.push(("phrase", "1".into()));
                }
                if c.case_sensitive {
                    params.push(("regsense", "1".into()));
                }
                if c.calc {
                    params.push(("calc", "1".into()));
                }
                if let Some(numeric) = c.numeric {
                    params.push(("numeric", numeric.to_string()));
                }
                if let Some(min) = c.min_len {
                    params.push(("min_len", min.to_string()));
                }
                if let Some(max) = c.max_len {
                    params.push(("max_len", max.to_string()));
                }
                if let Some(lang) = &c.lang {
                    params.push(("lang", lang.clone()));
                }
                if let Some(hint) = &c.hint_text {
                    params.push(("textinstructions", hint.clone()));
                }
                file = Some((c.file_name.clone(), c.image.clone()));
            }
        }

        if let Some(soft_id) = &self.config.soft_id {
            params.push(("soft_id", soft_id.clone()));
        }

        if let Some(proxy) = proxy {
            params.push(("proxytype", proxy.scheme().to_uppercase()));
            params.push(("proxy", proxy.authority()));
        }

        Submission { params, file }
    }

    async fn get_result(&self, params: &[(&str, &str)]) -> Result<String> {
        let body = self
            .client
            .get(RESULT_URL)
            .query(params)
            .send()
            .await?
            .text()
            .await?;
        if self.config.debug {
            tracing::debug!("2captcha res.php response: {}", body);
        }
        Ok(body)
    }
}

fn parse_submit(body: &str) -> Result<TaskHandle> {
    let body = body.trim();
    match body.strip_prefix("OK|") {
        Some(id) if !id.is_empty() => Ok(TaskHandle::new(id)),
        _ => Err(vendor_error(body)),
    }
}

fn parse_poll(body: &str) -> Result<String> {
    let body = body.trim();
    match body.strip_prefix("OK|") {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        Some(_) => Err(CaptchaError::InvalidResponse(
            "solved task carried an empty answer".to_string(),
        )),
        None => Err(vendor_error(body)),
    }
}

fn parse_balance(body: &str) -> Result<f64> {
    let body = body.trim();
    if body.starts_with("ERROR") || map_error(body) != ErrorKind::Unknown {
        return Err(vendor_error(body));
    }
    match body.parse::<f64>() {
        Ok(balance) if balance.is_finite() => Ok(balance),
        _ => Err(CaptchaError::InvalidResponse(format!(
            "2captcha balance is not a number: {body:?}"
        ))),
    }
}

fn parse_report(body: &str) -> Result<()> {
    match body.trim() {
        "OK_REPORT_RECORDED" => Ok(()),
        other => Err(vendor_error(other)),
    }
}

#[async_trait]
impl Provider for TwoCaptcha {
    fn vendor(&self) -> Vendor {
        Vendor::TwoCaptcha
    }

    async fn submit(&self, captcha: &Captcha, proxy: Option<&ProxySpec>) -> Result<TaskHandle> {
        let Submission { params, file } = self.submission(captcha, proxy);

        let request = match file {
            Some((file_name, bytes)) => {
                let mut form = Form::new();
                for (name, value) in params {
                    form = form.text(name, value);
                }
                form = form.part("file", Part::bytes(bytes).file_name(file_name));
                self.client.post(SUBMIT_URL).multipart(form)
            }
            None => self.client.post(SUBMIT_URL).query(&params),
        };

        let body = request.send().await?.text().await?;
        if self.config.debug {
            tracing::debug!("2captcha in.php response: {}", body);
        }
        parse_submit(&body)
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<String> {
        let body = self
            .get_result(&[
                ("key", self.config.api_key.as_str()),
                ("action", "get"),
                ("id", handle.id()),
            ])
            .await?;
        parse_poll(&body)
    }

    async fn balance(&self) -> Result<f64> {
        let body = self
            .get_result(&[("key", self.config.api_key.as_str()), ("action", "getbalance")])
            .await?;
        parse_balance(&body)
    }
}

#[async_trait]
impl Reporter for TwoCaptcha {
    async fn report(&self, handle: &TaskHandle, correct: bool) -> Result<()> {
        let action = if correct { "reportgood" } else { "reportbad" };
        let body = self
            .get_result(&[
                ("key", self.config.api_key.as_str()),
                ("action", action),
                ("id", handle.id()),
            ])
            .await?;
        parse_report(&body)
    }
}
