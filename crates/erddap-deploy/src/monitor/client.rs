//! Monitoring service client interface and its decorators.

use std::time::Duration;

use serde_json::Value;

use super::error::MonitorError;
use super::planner::{Monitor, MonitorSpec, StatusPage};

/// Result type for monitoring service calls.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// Operations consumed from the uptime monitoring service.
///
/// The service is not transactional; callers must tolerate partial application.
pub trait MonitorClient {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>>;

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor>;

    /// Creates a monitor and returns its id.
    fn add_monitor(&self, spec: &MonitorSpec) -> MonitorResult<u64>;

    fn pause_monitor(&self, id: u64) -> MonitorResult<()>;

    fn resume_monitor(&self, id: u64) -> MonitorResult<()>;

    fn delete_monitor(&self, id: u64) -> MonitorResult<()>;

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>>;

    fn add_status_page(&self, slug: &str, title: &str) -> MonitorResult<()>;

    fn save_status_page(&self, slug: &str, page: &Value) -> MonitorResult<()>;
}

impl<C: MonitorClient + ?Sized> MonitorClient for Box<C> {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>> {
        (**self).list_monitors()
    }

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor> {
        (**self).get_monitor(id)
    }

    fn add_monitor(&self, spec: &MonitorSpec) -> MonitorResult<u64> {
        (**self).add_monitor(spec)
    }

    fn pause_monitor(&self, id: u64) -> MonitorResult<()> {
        (**self).pause_monitor(id)
    }

    fn resume_monitor(&self, id: u64) -> MonitorResult<()> {
        (**self).resume_monitor(id)
    }

    fn delete_monitor(&self, id: u64) -> MonitorResult<()> {
        (**self).delete_monitor(id)
    }

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>> {
        (**self).list_status_pages()
    }

    fn add_status_page(&self, slug: &str, title: &str) -> MonitorResult<()> {
        (**self).add_status_page(slug, title)
    }

    fn save_status_page(&self, slug: &str, page: &Value) -> MonitorResult<()> {
        (**self).save_status_page(slug, page)
    }
}

/// Passes reads through and logs mutations instead of performing them.
///
/// `add_monitor` returns id 0.
#[derive(Debug, Clone)]
pub struct DryRunClient<C> {
    inner: C,
}

impl<C: MonitorClient> DryRunClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: MonitorClient> MonitorClient for DryRunClient<C> {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>> {
        self.inner.list_monitors()
    }

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor> {
        self.inner.get_monitor(id)
    }

    fn add_monitor(&self, spec: &MonitorSpec) -> MonitorResult<u64> {
        log::info!("Would add monitor {}", spec.path_name);
        Ok(0)
    }

    fn pause_monitor(&self, id: u64) -> MonitorResult<()> {
        log::info!("Would pause monitor {}", id);
        Ok(())
    }

    fn resume_monitor(&self, id: u64) -> MonitorResult<()> {
        log::info!("Would resume monitor {}", id);
        Ok(())
    }

    fn delete_monitor(&self, id: u64) -> MonitorResult<()> {
        log::info!("Would delete monitor {}", id);
        Ok(())
    }

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>> {
        self.inner.list_status_pages()
    }

    fn add_status_page(&self, slug: &str, title: &str) -> MonitorResult<()> {
        log::info!("Would add status page {} with title {}", slug, title);
        Ok(())
    }

    fn save_status_page(&self, slug: &str, _page: &Value) -> MonitorResult<()> {
        log::info!("Would update status page {}", slug);
        Ok(())
    }
}

/// Maximum number of retries on timeouts.
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Retries calls that time out, with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    base_delay: Duration,
}

impl<C: MonitorClient> RetryingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            base_delay: RETRY_BASE_DELAY,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn retry<T>(&self, operation: &str, call: impl Fn(&C) -> MonitorResult<T>) -> MonitorResult<T> {
        let mut attempt = 0;
        loop {
            match call(&self.inner) {
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = self.base_delay * (1 << (attempt - 1));
                    log::warn!(
                        "{} failed: {}; retrying (attempt {}/{}) after {:?}",
                        operation,
                        e,
                        attempt + 1,
                        MAX_RETRIES + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}

impl<C: MonitorClient> MonitorClient for RetryingClient<C> {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>> {
        self.retry("list_monitors", |c| c.list_monitors())
    }

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor> {
        self.retry("get_monitor", |c| c.get_monitor(id))
    }

    fn add_monitor(&self, spec: &MonitorSpec) -> MonitorResult<u64> {
        self.retry("add_monitor", |c| c.add_monitor(spec))
    }

    fn pause_monitor(&self, id: u64) -> MonitorResult<()> {
        self.retry("pause_monitor", |c| c.pause_monitor(id))
    }

    fn resume_monitor(&self, id: u64) -> MonitorResult<()> {
        self.retry("resume_monitor", |c| c.resume_monitor(id))
    }

    fn delete_monitor(&self, id: u64) -> MonitorResult<()> {
        self.retry("delete_monitor", |c| c.delete_monitor(id))
    }

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>> {
        self.retry("list_status_pages", |c| c.list_status_pages())
    }

    fn add_status_page(&self, slug: &str, title: &str) -> MonitorResult<()> {
        self.retry("add_status_page", |c| c.add_status_page(slug, title))
    }

    fn save_status_page(&self, slug: &str, page: &Value) -> MonitorResult<()> {
        self.retry("save_status_page", |c| c.save_status_page(slug, page))
    }
}
