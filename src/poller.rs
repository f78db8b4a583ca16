//! Waiting for a freshly deployed host to become resolvable.
//!
//! A poll runs as a single tokio task: one lookup immediately, then one per
//! interval until a lookup succeeds or the attempt budget runs out. The
//! outcome is delivered exactly once through a oneshot channel, so callers
//! awaiting [`PollHandle::wait`] observe the real result.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::PollConfig;
use crate::error::{Error, Result};

/// Resolves host names.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Attempts to resolve `host`. An `Ok` means at least one address was found.
    async fn lookup(&self, host: &str) -> io::Result<()>;
}

/// Resolves through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> io::Result<()> {
        let found = if has_port(host) {
            tokio::net::lookup_host(host).await?.next().is_some()
        } else {
            tokio::net::lookup_host((host, 0)).await?.next().is_some()
        };

        if found {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            ))
        }
    }
}

fn has_port(authority: &str) -> bool {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.contains("]:");
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Extracts the host (and port, if any) a URL points at.
///
/// Accepts bare host names as well as full URLs. An IPv6 literal without a
/// port comes back without its brackets.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    // A bracketed IPv6 literal only keeps its brackets when a port follows.
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Polls a URL's host until it resolves.
pub struct AvailabilityPoller<R: HostResolver> {
    resolver: Arc<R>,
    config: PollConfig,
}

impl AvailabilityPoller<DnsResolver> {
    /// Creates a poller using the system resolver.
    pub fn system(config: PollConfig) -> Self {
        Self::new(DnsResolver, config)
    }
}

impl<R: HostResolver + 'static> AvailabilityPoller<R> {
    /// Creates a poller using `resolver`.
    pub fn new(resolver: R, config: PollConfig) -> Self {
        Self {
            resolver: Arc::new(resolver),
            config,
        }
    }

    /// Starts polling `url` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, url: impl Into<String>) -> PollHandle {
        let url = url.into();
        let (done_tx, done_rx) = oneshot::channel();

        let resolver = Arc::clone(&self.resolver);
        let interval = self.config.interval();
        let attempts = self.config.attempts;
        let task_url = url.clone();

        let task = tokio::spawn(async move {
            let outcome = poll_until_up(resolver.as_ref(), &task_url, interval, attempts).await;
            // The receiver is gone only if the caller dropped the handle.
            let _ = done_tx.send(outcome);
        });

        PollHandle {
            url,
            done: done_rx,
            task,
        }
    }

    /// Polls `url` and waits for the outcome.
    pub async fn check_up(&self, url: impl Into<String>) -> Result<()> {
        self.start(url).wait().await
    }
}

/// Polls `url` with the system resolver and waits for the outcome.
pub async fn check_up(url: &str, config: &PollConfig) -> Result<()> {
    AvailabilityPoller::system(config.clone()).check_up(url).await
}

/// A running poll.
///
/// Dropping the handle stops the poll.
pub struct PollHandle {
    url: String,
    done: oneshot::Receiver<Result<()>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Returns the URL being polled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits until the host resolves or the attempt budget is spent.
    ///
    /// The poll keeps running only as long as this future is alive.
    pub async fn wait(mut self) -> Result<()> {
        match (&mut self.done).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::PollCancelled(self.url.clone())),
        }
    }

    /// Stops polling. No further lookups are made.
    pub fn cancel(&self) {
        tracing::debug!(url = %self.url, "cancelling availability check");
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_until_up<R: HostResolver + ?Sized>(
    resolver: &R,
    url: &str,
    interval: Duration,
    attempts: u32,
) -> Result<()> {
    let host = host_of(url);
    // tokio rejects a zero period
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut retries_left = attempts;

    loop {
        // The first tick completes immediately.
        ticker.tick().await;

        match resolver.lookup(host).await {
            Ok(()) => {
                tracing::info!(url = %url, "host is up");
                return Ok(());
            }
            Err(e) => {
                retries_left = retries_left.saturating_sub(1);
                if retries_left == 0 {
                    tracing::error!(url = %url, error = %e, attempts, "host never came up");
                    return Err(Error::ResolutionTimeout {
                        url: url.to_string(),
                        attempts,
                    });
                }
                tracing::info!(
                    url = %url,
                    error = %e,
                    "{} is down, trying again, {} retries left",
                    url,
                    retries_left
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` lookups, then succeeds.
    struct FlakyResolver {
        failures: u32,
        calls: AtomicU32,
        hosts: Mutex<Vec<String>>,
    }

    impl FlakyResolver {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                hosts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HostResolver for Arc<FlakyResolver> {
        async fn lookup(&self, host: &str) -> io::Result<()> {
            self.hosts.lock().unwrap().push(host.to_string());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(io::Error::new(io::ErrorKind::NotFound, "nxdomain"))
            } else {
                Ok(())
            }
        }
    }

    fn poller(resolver: &Arc<FlakyResolver>) -> AvailabilityPoller<Arc<FlakyResolver>> {
        AvailabilityPoller::new(Arc::clone(resolver), PollConfig::default())
    }

    #[test]
    fn host_of_strips_url_parts() {
        assert_eq!(host_of("https://remix-deploy.fly.dev/"), "remix-deploy.fly.dev");
        assert_eq!(host_of("http://localhost:3000/jokes?x=1"), "localhost:3000");
        assert_eq!(host_of("https://user:pw@example.com/a"), "example.com");
        assert_eq!(host_of("example.com"), "example.com");
    }

    #[test]
    fn host_of_unwraps_bare_ipv6() {
        assert_eq!(host_of("http://[::1]/"), "::1");
        assert_eq!(host_of("http://[::1]:3000/"), "[::1]:3000");
    }

    #[test]
    fn has_port_detects_ports() {
        assert!(has_port("localhost:3000"));
        assert!(has_port("[::1]:8080"));
        assert!(!has_port("example.com"));
        assert!(!has_port("::1"));
        assert!(!has_port("[::1]"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_attempt() {
        let started = tokio::time::Instant::now();
        let resolver = Arc::new(FlakyResolver::new(0));
        poller(&resolver)
            .check_up("https://remix-deploy-abc1234-beef.fly.dev")
            .await
            .unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            resolver.hosts.lock().unwrap()[0],
            "remix-deploy-abc1234-beef.fly.dev"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retries() {
        let started = tokio::time::Instant::now();
        let resolver = Arc::new(FlakyResolver::new(3));
        poller(&resolver).check_up("example.com").await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_budget_reports_url() {
        let started = tokio::time::Instant::now();
        let resolver = Arc::new(FlakyResolver::new(u32::MAX));
        let err = poller(&resolver)
            .check_up("https://never.invalid")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResolutionTimeout { attempts: 10, .. }));
        assert!(err.to_string().contains("https://never.invalid"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 10);
        assert!(started.elapsed() >= Duration::from_secs(540));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_last_attempt_counts() {
        let resolver = Arc::new(FlakyResolver::new(9));
        poller(&resolver).check_up("example.com").await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_resolves_wait_with_cancelled() {
        let resolver = Arc::new(FlakyResolver::new(u32::MAX));
        let poller = AvailabilityPoller::new(
            Arc::clone(&resolver),
            PollConfig {
                interval_secs: 3600,
                attempts: 10,
            },
        );

        let handle = poller.start("https://slow.invalid");
        assert_eq!(handle.url(), "https://slow.invalid");
        handle.cancel();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, Error::PollCancelled(ref url) if url == "https://slow.invalid"));
        assert!(resolver.calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_panic() {
        let resolver = Arc::new(FlakyResolver::new(2));
        let poller = AvailabilityPoller::new(
            Arc::clone(&resolver),
            PollConfig {
                interval_secs: 0,
                attempts: 3,
            },
        );
        poller.check_up("example.com").await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_stops_polling() {
        let resolver = Arc::new(FlakyResolver::new(u32::MAX));
        let waited = tokio::time::timeout(
            Duration::from_secs(1),
            poller(&resolver).start("https://example.invalid").wait(),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn logs_retries_left_after_each_failure() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let resolver = Arc::new(FlakyResolver::new(u32::MAX));
        let poller = AvailabilityPoller::new(
            Arc::clone(&resolver),
            PollConfig {
                interval_secs: 60,
                attempts: 4,
            },
        );
        assert!(poller.check_up("example.invalid").await.is_err());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let progress: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("is down, trying again"))
            .collect();

        assert_eq!(progress.len(), 3);
        for (line, left) in progress.iter().zip([3, 2, 1]) {
            let expected = format!("example.invalid is down, trying again, {} retries left", left);
            assert!(line.contains(&expected), "unexpected log line: {}", line);
        }
        assert!(!output.contains("0 retries left"));
    }

    #[tokio::test]
    async fn dns_resolver_resolves_localhost() {
        tokio_test::assert_ok!(DnsResolver.lookup("localhost").await);
    }

    #[tokio::test]
    async fn dns_resolver_resolves_ipv6_url_without_port() {
        tokio_test::assert_ok!(DnsResolver.lookup(host_of("http://[::1]/")).await);
        tokio_test::assert_ok!(DnsResolver.lookup(host_of("http://[::1]:3000/")).await);
    }
}
