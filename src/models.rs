//! Data models for captcha tasks.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Supported solving services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// 2captcha.com
    TwoCaptcha,
    /// capmonster.cloud
    CapMonster,
}

impl Vendor {
    /// Returns the string representation used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::TwoCaptcha => "2captcha",
            Vendor::CapMonster => "capmonster",
        }
    }

    /// How long the vendor needs at minimum before a result can exist.
    pub fn initial_delay(&self) -> Duration {
        match self {
            Vendor::TwoCaptcha => Duration::from_secs(20),
            Vendor::CapMonster => Duration::from_secs(5),
        }
    }

    /// Parse a vendor name, accepting the common spellings.
    pub fn parse(s: &str) -> Option<Vendor> {
        match s.to_lowercase().as_str() {
            "2captcha" | "twocaptcha" => Some(Vendor::TwoCaptcha),
            "capmonster" | "capmonster.cloud" => Some(Vendor::CapMonster),
            _ => None,
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A captcha to be solved.
///
/// Adapters match on this exhaustively, so adding a kind here forces every
/// vendor to decide how to encode it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Captcha {
    #[serde(rename = "recaptcha")]
    ReCaptcha(ReCaptcha),
    #[serde(rename = "hcaptcha")]
    HCaptcha(HCaptcha),
    #[serde(rename = "image")]
    Image(ImageCaptcha),
}

impl Captcha {
    /// Returns the tag used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Captcha::ReCaptcha(_) => "recaptcha",
            Captcha::HCaptcha(_) => "hcaptcha",
            Captcha::Image(_) => "image",
        }
    }
}

impl From<ReCaptcha> for Captcha {
    fn from(c: ReCaptcha) -> Self {
        Captcha::ReCaptcha(c)
    }
}

impl From<HCaptcha> for Captcha {
    fn from(c: HCaptcha) -> Self {
        Captcha::HCaptcha(c)
    }
}

impl From<ImageCaptcha> for Captcha {
    fn from(c: ImageCaptcha) -> Self {
        Captcha::Image(c)
    }
}

/// reCAPTCHA generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecaptchaVersion {
    #[default]
    V2,
    V3,
}

/// Google reCAPTCHA v2 / v3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReCaptcha {
    pub site_key: String,
    pub page_url: String,
    #[serde(default)]
    pub version: RecaptchaVersion,
    /// v2 invisible widget
    #[serde(default)]
    pub invisible: bool,
    /// v3 action name
    #[serde(default)]
    pub action: Option<String>,
    /// v3 minimum score
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ReCaptcha {
    pub fn v2(site_key: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            page_url: page_url.into(),
            version: RecaptchaVersion::V2,
            invisible: false,
            action: None,
            min_score: None,
            user_agent: None,
        }
    }

    pub fn v3(
        site_key: impl Into<String>,
        page_url: impl Into<String>,
        action: impl Into<String>,
        min_score: f64,
    ) -> Self {
        Self {
            version: RecaptchaVersion::V3,
            action: Some(action.into()),
            min_score: Some(min_score),
            ..Self::v2(site_key, page_url)
        }
    }

    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// hCaptcha widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HCaptcha {
    pub site_key: String,
    pub page_url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl HCaptcha {
    pub fn new(site_key: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            page_url: page_url.into(),
            user_agent: None,
        }
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Classic distorted-text image captcha.
///
/// In JSON the image travels as standard base64 under `body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCaptcha {
    #[serde(rename = "body", with = "base64_bytes")]
    pub image: Vec<u8>,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Answer contains more than one word
    #[serde(default)]
    pub phrase: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Answer is the result of an arithmetic expression
    #[serde(default)]
    pub calc: bool,
    /// 0 = any, 1 = digits only, 2 = letters only, 3 = either, 4 = both
    #[serde(default)]
    pub numeric: Option<u8>,
    #[serde(default)]
    pub min_len: Option<u32>,
    #[serde(default)]
    pub max_len: Option<u32>,
    #[serde(default)]
    pub lang: Option<String>,
    /// Instructions shown to the worker
    #[serde(default)]
    pub hint_text: Option<String>,
}

fn default_file_name() -> String {
    "captcha.png".to_string()
}

impl ImageCaptcha {
    pub fn from_bytes(image: impl Into<Vec<u8>>) -> Self {
        Self {
            image: image.into(),
            file_name: default_file_name(),
            phrase: false,
            case_sensitive: false,
            calc: false,
            numeric: None,
            min_len: None,
            max_len: None,
            lang: None,
            hint_text: None,
        }
    }

    /// Read the image from disk, keeping its file name for the upload.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = tokio::fs::read(path).await?;
        let mut captcha = Self::from_bytes(image);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            captcha.file_name = name.to_string();
        }
        Ok(captcha)
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn hint_text(mut self, hint: impl Into<String>) -> Self {
        self.hint_text = Some(hint.into());
        self
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Vendor-issued identifier for one in-flight task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A solved captcha.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Handle the answer came from, needed for reporting
    pub handle: TaskHandle,
    /// The answer: a response token or recognized text
    pub token: String,
}
