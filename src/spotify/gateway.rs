use std::{fmt, future::Future, marker::PhantomData, sync::Arc, time::Duration};

use super::client::ApiError;
use crate::{
    config,
    status::{NullSink, StatusSink},
    types::Page,
    utils::{Sleeper, TokioSleeper},
};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The server asked for a wait beyond the configured ceiling.
    ExtremeRateLimit { retry_after: u64 },
    /// Still rate limited after every retry.
    RateLimited { retry_after: Option<u64> },
    Remote(ApiError),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Remote(ApiError::Status { status: 404, .. }))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::ExtremeRateLimit { retry_after } => {
                write!(f, "Spotify API Extreme Rate Limit: {}s", retry_after)
            }
            GatewayError::RateLimited { .. } => {
                write!(f, "Spotify API rate limit persisted after all retries")
            }
            GatewayError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Every catalog call goes through here: bounded retries on HTTP 429,
/// waiting exactly `Retry-After + 1` seconds, and an immediate abort when
/// the requested wait exceeds the ceiling.
pub struct RemoteGateway {
    max_retries: u32,
    extreme_limit_secs: u64,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn StatusSink>,
}

impl Default for RemoteGateway {
    fn default() -> Self {
        Self::new(
            config::DEFAULT_API_RETRIES,
            config::DEFAULT_EXTREME_RATE_LIMIT_SECS,
        )
    }
}

impl RemoteGateway {
    pub fn new(max_retries: u32, extreme_limit_secs: u64) -> Self {
        Self {
            max_retries,
            extreme_limit_secs,
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retries = 0;
        let mut waited = false;

        loop {
            let err = match op().await {
                Ok(value) => {
                    if waited {
                        self.sink.set_status(None);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let retry_after = match err {
                ApiError::RateLimited { retry_after } => retry_after,
                other => {
                    if waited {
                        self.sink.set_status(None);
                    }
                    return Err(GatewayError::Remote(other));
                }
            };

            let hint = retry_after.unwrap_or(1);
            if hint > self.extreme_limit_secs {
                self.sink.set_status(None);
                return Err(GatewayError::ExtremeRateLimit { retry_after: hint });
            }

            if retries >= self.max_retries {
                self.sink.set_status(None);
                return Err(GatewayError::RateLimited { retry_after });
            }

            let wait = hint + 1;
            self.sink
                .set_status(Some(&format!("Rate Limited: waiting {}s", wait)));
            self.sleeper.sleep(Duration::from_secs(wait)).await;
            waited = true;
            retries += 1;
        }
    }

    /// Lazily walks a cursor-paginated listing. `fetch` receives `None` for
    /// the first page and the previous page's `next` afterwards.
    pub fn paginate<T, F, Fut>(&self, fetch: F) -> Paginated<'_, T, F>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        Paginated {
            gateway: self,
            fetch,
            cursor: None,
            done: false,
            _item: PhantomData,
        }
    }
}

pub struct Paginated<'g, T, F> {
    gateway: &'g RemoteGateway,
    fetch: F,
    cursor: Option<String>,
    done: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T, F, Fut> Paginated<'_, T, F>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    pub async fn next_page(&mut self) -> Option<Result<Vec<T>, GatewayError>> {
        if self.done {
            return None;
        }

        let cursor = self.cursor.take();
        let fetch = &mut self.fetch;
        match self.gateway.call(|| fetch(cursor.clone())).await {
            Ok(page) => {
                self.cursor = page.next.filter(|next| !next.is_empty());
                self.done = self.cursor.is_none();
                Some(Ok(page.items))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    pub async fn collect_all(mut self) -> Result<Vec<T>, GatewayError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?);
        }
        Ok(items)
    }
}
