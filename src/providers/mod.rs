//! Vendor adapters.
//!
//! Each adapter speaks one vendor's HTTP dialect and maps its failure codes
//! onto [`ErrorKind`](crate::ErrorKind) through a single table.

pub mod capmonster;
pub mod two_captcha;

pub use capmonster::CapMonster;
pub use two_captcha::TwoCaptcha;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Captcha, TaskHandle, Vendor};
use crate::proxy::ProxySpec;

/// A captcha solving service.
///
/// Every method performs exactly one outbound HTTP call. Implementations
/// hold only read-only configuration, so one instance can serve many
/// concurrent solves.
#[async_trait]
pub trait Provider: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Wait before the first poll.
    fn initial_delay(&self) -> Duration {
        self.vendor().initial_delay()
    }

    /// Submit a task and return the vendor's handle for it.
    async fn submit(&self, captcha: &Captcha, proxy: Option<&ProxySpec>) -> Result<TaskHandle>;

    /// Fetch the answer. A task still in progress yields a retryable
    /// `NotReady` vendor error.
    async fn poll(&self, handle: &TaskHandle) -> Result<String>;

    /// Remaining account credit.
    async fn balance(&self) -> Result<f64>;
}

/// Vendors that accept feedback on answers they returned.
#[async_trait]
pub trait Reporter: Provider {
    async fn report(&self, handle: &TaskHandle, correct: bool) -> Result<()>;
}
