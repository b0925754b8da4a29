//! Solve orchestration: submit, wait, poll until a terminal answer.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};

use crate::error::{CaptchaError, PollLimit, Result};
use crate::models::{Captcha, Solution, TaskHandle};
use crate::providers::{Provider, Reporter};
use crate::proxy::ProxySpec;

/// Limits and pacing for [`Solver::solve`].
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Wait before the first poll; `None` uses the provider's own delay.
    pub initial_delay: Option<Duration>,
    /// Wait between polls that come back not ready.
    pub poll_interval: Duration,
    /// Stop after this many polls. At least one poll is always made.
    pub max_polls: Option<u32>,
    /// Deadline for the whole solve, measured from submission.
    pub timeout: Option<Duration>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            initial_delay: None,
            poll_interval: Duration::from_secs(5),
            max_polls: None,
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl SolveOptions {
    /// Poll until the vendor gives a terminal answer, however long it takes.
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }

    /// Cap the number of polls; `0` is treated as `1`.
    pub fn max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls.max(1));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Drives a [`Provider`] through submit and poll.
///
/// # Example
/// ```ignore
/// use captcha_aio::{HCaptcha, CapMonster, Solver};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let solver = Solver::new(CapMonster::builder("your_api_key").build()?);
///
///     let captcha = HCaptcha::new("site_key", "https://example.com");
///     let solution = solver.solve(&captcha.into(), None).await?;
///     println!("Solved: {}", solution.token);
///     Ok(())
/// }
/// ```
pub struct Solver<P> {
    provider: P,
    options: SolveOptions,
}

impl<P: Provider> Solver<P> {
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, SolveOptions::default())
    }

    pub fn with_options(provider: P, options: SolveOptions) -> Self {
        Self { provider, options }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Submit the captcha and poll until it is solved or fails.
    ///
    /// Only not-ready answers are retried. Any other error ends the solve
    /// and the handle is never polled again. With a timeout set, submission
    /// and every poll run under the deadline, and a wait that would end past
    /// it gives up immediately instead of sleeping.
    pub async fn solve(&self, captcha: &Captcha, proxy: Option<&ProxySpec>) -> Result<Solution> {
        let vendor = self.provider.vendor();
        let deadline = self.options.timeout.map(|timeout| Deadline {
            at: Instant::now() + timeout,
            timeout,
        });

        let handle = bounded(deadline, None, 0, self.provider.submit(captcha, proxy)).await?;
        tracing::debug!(
            "Submitted {} captcha to {}: task {}",
            captcha.as_str(),
            vendor,
            handle
        );

        let initial_delay = self
            .options
            .initial_delay
            .unwrap_or_else(|| self.provider.initial_delay());
        wait(deadline, initial_delay, &handle, 0).await?;

        let mut polls: u32 = 0;
        loop {
            polls += 1;
            let answer = bounded(deadline, Some(&handle), polls, self.provider.poll(&handle)).await;
            match answer {
                Ok(token) => {
                    tracing::debug!("Task {} solved after {} polls", handle, polls);
                    return Ok(Solution { handle, token });
                }
                Err(e) if e.is_retryable() => {
                    if let Some(max) = self.options.max_polls.filter(|max| polls >= *max) {
                        tracing::debug!("Task {} gave up after {} polls", handle, polls);
                        return Err(CaptchaError::PollLimitExceeded {
                            task_id: Some(handle.id().to_string()),
                            polls,
                            limit: PollLimit::MaxPolls(max),
                        });
                    }
                    tracing::debug!(
                        "Task {} not ready, waiting {:?}",
                        handle,
                        self.options.poll_interval
                    );
                    wait(deadline, self.options.poll_interval, &handle, polls).await?;
                }
                Err(e) => {
                    tracing::debug!("Task {} failed: {}", handle, e);
                    return Err(e);
                }
            }
        }
    }

    /// Remaining account credit.
    pub async fn balance(&self) -> Result<f64> {
        self.provider.balance().await
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn exceeded(&self, handle: Option<&TaskHandle>, polls: u32) -> CaptchaError {
        CaptchaError::PollLimitExceeded {
            task_id: handle.map(|h| h.id().to_string()),
            polls,
            limit: PollLimit::Timeout(self.timeout),
        }
    }
}

/// Run a vendor call, cut off at the deadline if there is one.
async fn bounded<T, F>(
    deadline: Option<Deadline>,
    handle: Option<&TaskHandle>,
    polls: u32,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => timeout_at(deadline.at, call)
            .await
            .unwrap_or_else(|_| Err(deadline.exceeded(handle, polls))),
        None => call.await,
    }
}

/// Sleep before the next poll, unless waking would already be too late.
async fn wait(
    deadline: Option<Deadline>,
    delay: Duration,
    handle: &TaskHandle,
    polls: u32,
) -> Result<()> {
    if let Some(deadline) = deadline {
        if Instant::now() + delay > deadline.at {
            tracing::debug!("Task {} would outlive its deadline, giving up", handle);
            return Err(deadline.exceeded(Some(handle), polls));
        }
    }
    sleep(delay).await;
    Ok(())
}

impl<P: Reporter> Solver<P> {
    /// Tell the vendor whether a returned answer was accepted.
    pub async fn report(&self, handle: &TaskHandle, correct: bool) -> Result<()> {
        self.provider.report(handle, correct).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{HCaptcha, Vendor};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Step {
        NotReady,
        Token(&'static str),
        Fail(ErrorKind),
        Stall,
    }

    /// Provider that replays a fixed script of poll answers.
    struct ScriptedProvider {
        vendor: Vendor,
        steps: Mutex<VecDeque<Step>>,
        polls: AtomicUsize,
        reports: Mutex<Vec<(String, bool)>>,
        stall_submit: bool,
    }

    impl ScriptedProvider {
        fn new(vendor: Vendor, steps: Vec<Step>) -> Self {
            Self {
                vendor,
                steps: Mutex::new(steps.into()),
                polls: AtomicUsize::new(0),
                reports: Mutex::new(Vec::new()),
                stall_submit: false,
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    fn vendor_error(kind: ErrorKind) -> CaptchaError {
        CaptchaError::Vendor {
            vendor: Vendor::TwoCaptcha,
            code: kind.as_str().to_uppercase(),
            kind,
            message: "scripted",
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn vendor(&self) -> Vendor {
            self.vendor
        }

        async fn submit(&self, _captcha: &Captcha, _proxy: Option<&ProxySpec>) -> Result<TaskHandle> {
            if self.stall_submit {
                std::future::pending::<()>().await;
            }
            Ok(TaskHandle::new("42"))
        }

        async fn poll(&self, handle: &TaskHandle) -> Result<String> {
            assert_eq!(handle.id(), "42");
            self.polls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Token(token)) => Ok(token.to_string()),
                Some(Step::Stall) => std::future::pending().await,
                Some(Step::Fail(kind)) => Err(vendor_error(kind)),
                Some(Step::NotReady) | None => Err(vendor_error(ErrorKind::NotReady)),
            }
        }

        async fn balance(&self) -> Result<f64> {
            Ok(12.5)
        }
    }

    #[async_trait]
    impl Reporter for ScriptedProvider {
        async fn report(&self, handle: &TaskHandle, correct: bool) -> Result<()> {
            self.reports
                .lock()
                .unwrap()
                .push((handle.id().to_string(), correct));
            Ok(())
        }
    }

    fn captcha() -> Captcha {
        HCaptcha::new("site", "https://example.com").into()
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_token() {
        let provider = ScriptedProvider::new(
            Vendor::TwoCaptcha,
            vec![
                Step::NotReady,
                Step::NotReady,
                Step::NotReady,
                Step::Token("03AGdBq"),
            ],
        );
        let solver = Solver::with_options(provider, SolveOptions::unbounded());

        let start = Instant::now();
        let solution = solver.solve(&captcha(), None).await.unwrap();

        assert_eq!(solution.token, "03AGdBq");
        assert_eq!(solution.handle.id(), "42");
        assert_eq!(solver.provider().polls(), 4);
        // 20s initial wait, then three 5s retries
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_follows_vendor() {
        let provider = ScriptedProvider::new(Vendor::CapMonster, vec![Step::Token("ok")]);
        let solver = Solver::new(provider);

        let start = Instant::now();
        solver.solve(&captcha(), None).await.unwrap();

        assert_eq!(solver.provider().polls(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_stops_polling() {
        let provider = ScriptedProvider::new(
            Vendor::TwoCaptcha,
            vec![Step::Fail(ErrorKind::Unsolvable), Step::Token("never")],
        );
        let solver = Solver::new(provider);

        let err = solver.solve(&captcha(), None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unsolvable);
        assert_eq!(solver.provider().polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_after_not_ready() {
        let provider = ScriptedProvider::new(
            Vendor::TwoCaptcha,
            vec![Step::NotReady, Step::Fail(ErrorKind::InsufficientBalance)],
        );
        let solver = Solver::new(provider);

        let err = solver.solve(&captcha(), None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(solver.provider().polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_polls_caps_the_loop() {
        let provider = ScriptedProvider::new(Vendor::CapMonster, vec![]);
        let solver = Solver::with_options(provider, SolveOptions::unbounded().max_polls(3));

        let err = solver.solve(&captcha(), None).await.unwrap_err();

        assert!(matches!(
            err,
            CaptchaError::PollLimitExceeded {
                polls: 3,
                limit: PollLimit::MaxPolls(3),
                ..
            }
        ));
        assert_eq!(solver.provider().polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_caps_the_loop() {
        let provider = ScriptedProvider::new(Vendor::CapMonster, vec![]);
        let options = SolveOptions::unbounded().timeout(Duration::from_secs(30));
        let solver = Solver::with_options(provider, options);

        let start = Instant::now();
        let err = solver.solve(&captcha(), None).await.unwrap_err();

        // polls at 5s, 10s, ... 30s; a seventh would land past the deadline
        assert_eq!(solver.provider().polls(), 6);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_shorter_than_initial_delay() {
        let provider = ScriptedProvider::new(Vendor::TwoCaptcha, vec![Step::Token("late")]);
        let options = SolveOptions::unbounded().timeout(Duration::from_secs(10));
        let solver = Solver::with_options(provider, options);

        let start = Instant::now();
        let err = solver.solve(&captcha(), None).await.unwrap_err();

        // the 20s vendor delay cannot fit, so nothing is slept or polled
        assert!(start.elapsed() <= Duration::from_secs(10));
        assert_eq!(solver.provider().polls(), 0);
        match err {
            CaptchaError::PollLimitExceeded {
                task_id,
                polls,
                limit,
            } => {
                assert_eq!(task_id.as_deref(), Some("42"));
                assert_eq!(polls, 0);
                assert_eq!(limit, PollLimit::Timeout(Duration::from_secs(10)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_poll_is_cut_off_at_deadline() {
        let provider = ScriptedProvider::new(Vendor::CapMonster, vec![Step::NotReady, Step::Stall]);
        let options = SolveOptions::unbounded().timeout(Duration::from_secs(30));
        let solver = Solver::with_options(provider, options);

        let start = Instant::now();
        let err = solver.solve(&captcha(), None).await.unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(solver.provider().polls(), 2);
        assert!(matches!(
            err,
            CaptchaError::PollLimitExceeded {
                polls: 2,
                limit: PollLimit::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_submit_is_cut_off_by_default() {
        let mut provider = ScriptedProvider::new(Vendor::TwoCaptcha, vec![]);
        provider.stall_submit = true;
        let solver = Solver::new(provider);

        let start = Instant::now();
        let err = solver.solve(&captcha(), None).await.unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(300));
        assert_eq!(solver.provider().polls(), 0);
        assert!(matches!(
            err,
            CaptchaError::PollLimitExceeded {
                task_id: None,
                polls: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_max_polls_still_polls_once() {
        assert_eq!(SolveOptions::default().max_polls(0).max_polls, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_initial_delay() {
        let provider = ScriptedProvider::new(Vendor::TwoCaptcha, vec![Step::Token("t")]);
        let options = SolveOptions {
            initial_delay: Some(Duration::from_secs(1)),
            ..SolveOptions::default()
        };
        let solver = Solver::with_options(provider, options);

        let start = Instant::now();
        solver.solve(&captcha(), None).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_balance_and_report_pass_through() {
        let solver = Solver::new(ScriptedProvider::new(Vendor::TwoCaptcha, vec![]));

        assert_eq!(solver.balance().await.unwrap(), 12.5);

        solver.report(&TaskHandle::new("42"), false).await.unwrap();
        let reports = solver.provider().reports.lock().unwrap().clone();
        assert_eq!(reports, vec![("42".to_string(), false)]);
    }

    #[test]
    fn test_default_options_are_bounded() {
        let options = SolveOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(5));
        assert_eq!(options.timeout, Some(Duration::from_secs(300)));
        assert!(SolveOptions::unbounded().timeout.is_none());
    }
}
