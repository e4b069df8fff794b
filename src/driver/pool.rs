//! Connection pool for graph backends
//!
//! Each connection is checked out for exactly one transaction or one-shot
//! query and returned when the `PooledConnection` drops.
//!
//! - Checkout waits up to `acquire_timeout`, then fails with
//!   `PoolError::Exhausted`; the caller decides what to do, nothing retries.
//! - A connection idle for longer than `idle_threshold` is pinged before
//!   reuse. A failed ping disposes it and a fresh one is opened instead.
//! - Connections marked broken (network errors) are disposed on return.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};

use super::capabilities::DriverCapabilities;
use super::errors::{DriverError, PoolError};
use super::{ConnectionConfig, DriverFactory, GraphDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max: usize,
    pub min: usize,
    pub acquire_timeout: Duration,
    pub idle_threshold: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max: 10,
            min: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(30),
        }
    }
}

struct IdleConnection {
    driver: Arc<dyn GraphDriver>,
    since: Instant,
}

struct PoolInner {
    factory: Arc<dyn DriverFactory>,
    config: ConnectionConfig,
    settings: PoolSettings,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection>>,
    capabilities: OnceCell<DriverCapabilities>,
    opened: AtomicUsize,
    disposed: AtomicUsize,
}

impl PoolInner {
    fn push_idle(&self, driver: Arc<dyn GraphDriver>) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(IdleConnection {
                driver,
                since: Instant::now(),
            });
    }

    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    async fn open(&self) -> Result<Arc<dyn GraphDriver>, DriverError> {
        let driver = self.factory.connect(&self.config).await?;
        let total = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "Opened {} connection to {} ({} opened so far)",
            self.config.backend_type,
            self.config.address(),
            total
        );
        Ok(driver)
    }

    async fn dispose(&self, driver: Arc<dyn GraphDriver>, reason: &str) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
        log::debug!("Disposing connection to {}: {}", self.config.address(), reason);
        driver.close().await;
    }
}

/// Cheap to clone; all clones share the same connections
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn DriverFactory>, config: ConnectionConfig, settings: PoolSettings) -> Self {
        let max = settings.max.max(1);
        ConnectionPool {
            inner: Arc::new(PoolInner {
                factory,
                config,
                settings: PoolSettings { max, ..settings },
                permits: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(Vec::new()),
                capabilities: OnceCell::new(),
                opened: AtomicUsize::new(0),
                disposed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Open connections until `min` are idle
    pub async fn warm_up(&self) -> Result<(), PoolError> {
        let idle = self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner).len();
        for _ in idle..self.inner.settings.min.min(self.inner.settings.max) {
            let driver = self.inner.open().await?;
            self.inner.push_idle(driver);
        }
        Ok(())
    }

    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let settings = &self.inner.settings;
        let permit = tokio::time::timeout(
            settings.acquire_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::Exhausted {
            max: settings.max,
            waited_ms: settings.acquire_timeout.as_millis() as u64,
        })?
        .map_err(|_| PoolError::Closed)?;

        while let Some(idle) = self.inner.pop_idle() {
            if idle.since.elapsed() < settings.idle_threshold {
                return Ok(self.checked_out(idle.driver, permit));
            }
            if idle.driver.ping().await {
                return Ok(self.checked_out(idle.driver, permit));
            }
            self.inner.dispose(idle.driver, "failed health check").await;
        }

        let driver = self.inner.open().await?;
        Ok(self.checked_out(driver, permit))
    }

    fn checked_out(&self, driver: Arc<dyn GraphDriver>, permit: OwnedSemaphorePermit) -> PooledConnection {
        PooledConnection {
            driver,
            pool: self.inner.clone(),
            broken: false,
            _permit: permit,
        }
    }

    /// Backend capabilities, fetched through the first connection and cached
    pub async fn capabilities(&self) -> Result<DriverCapabilities, PoolError> {
        let caps = self
            .inner
            .capabilities
            .get_or_try_init(|| async {
                let conn = self.acquire().await?;
                conn.capabilities().await.map_err(PoolError::from)
            })
            .await?;
        Ok(caps.clone())
    }

    /// Connections checked out right now
    pub fn in_use(&self) -> usize {
        self.inner.settings.max - self.inner.permits.available_permits()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max: self.inner.settings.max,
            in_use: self.in_use(),
            idle: self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
            opened: self.inner.opened.load(Ordering::Relaxed),
            disposed: self.inner.disposed.load(Ordering::Relaxed),
        }
    }

    /// Refuse new checkouts and close idle connections
    pub async fn close(&self) {
        self.inner.permits.close();
        while let Some(idle) = self.inner.pop_idle() {
            self.inner.dispose(idle.driver, "pool closed").await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max: usize,
    pub in_use: usize,
    pub idle: usize,
    pub opened: usize,
    pub disposed: usize,
}

pub struct PooledConnection {
    driver: Arc<dyn GraphDriver>,
    pool: Arc<PoolInner>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Dispose instead of returning to the pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn driver(&self) -> Arc<dyn GraphDriver> {
        self.driver.clone()
    }
}

impl Deref for PooledConnection {
    type Target = dyn GraphDriver;

    fn deref(&self) -> &Self::Target {
        self.driver.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let driver = self.driver.clone();
        if self.broken || self.pool.permits.is_closed() {
            self.pool.disposed.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Dropping broken connection to {}",
                self.pool.config.address()
            );
            // close() is async; spawn only when a runtime is around to run it
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { driver.close().await });
            }
        } else {
            self.pool.push_idle(driver);
        }
    }
}
