use crate::config::Config;
use crate::error::ExtractError;
use crate::models::{decode_envelope, Extraction, Project, User};
use crate::rate_limit::{parse_retry_after, RateLimitState};
use crate::shutdown::{deadline_after, Shutdown, StopCause};
use crate::transport::Transport;
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const PROJECTS_PATH: &str = "projects";
pub const USERS_PATH: &str = "users";

/// Append a single path segment to `base`, keeping the base path intact
/// (`https://host/api/1.0` + `projects` gives `https://host/api/1.0/projects`).
///
/// # Errors
///
/// Returns `ExtractError::Endpoint` if `base` is not an absolute URL that can
/// carry a path.
pub fn join_endpoint(base: &str, path: &str) -> Result<Url, ExtractError> {
    let endpoint_error = |reason: String| ExtractError::Endpoint {
        path: path.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| endpoint_error(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| endpoint_error(format!("`{base}` cannot be a base URL")))?
        .pop_if_empty()
        .push(path);
    Ok(url)
}

/// Result of a single extraction tick
#[derive(Debug)]
pub enum TickOutcome {
    Extracted(Extraction),
    RateLimited { retry_after: Option<Duration> },
    Failed(ExtractError),
}

impl From<ExtractError> for TickOutcome {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            other => Self::Failed(other),
        }
    }
}

/// Why the run loop terminated
#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    DeadlineExceeded,
    RateLimited { retry_after: Option<Duration> },
    Failed(ExtractError),
}

impl From<StopCause> for StopReason {
    fn from(cause: StopCause) -> Self {
        match cause {
            StopCause::Cancelled => Self::Cancelled,
            StopCause::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    /// Ticks that extracted both collections
    pub ticks_completed: u64,
    /// Ticks skipped while waiting out a rate limit
    pub ticks_rate_limited: u64,
    pub stop_reason: StopReason,
}

/// Polls the Asana API for projects and users.
///
/// Outbound requests pass through a request gate (`api.max_in_flight`
/// permits, one by default) so concurrent fetches queue instead of
/// overlapping. The rate-limit latch sits behind its own lock, which is never
/// held across a network call.
#[derive(Debug)]
pub struct Extractor {
    transport: Arc<dyn Transport>,
    token: String,
    projects_endpoint: Url,
    users_endpoint: Url,
    request_gate: Semaphore,
    state: Mutex<RateLimitState>,
    resume_after_retry: bool,
}

impl Extractor {
    /// Create an extractor for the configured API
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Endpoint` if the projects or users endpoint
    /// cannot be built from `api.base_url`.
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, ExtractError> {
        let projects_endpoint =
            join_endpoint(&config.api.base_url, PROJECTS_PATH).inspect_err(|e| {
                error!(error = %e, "failed to construct full endpoint API for projects");
            })?;
        let users_endpoint = join_endpoint(&config.api.base_url, USERS_PATH).inspect_err(|e| {
            error!(error = %e, "failed to construct full endpoint API for users");
        })?;

        info!(endpoint = %projects_endpoint, "full endpoint projects path");
        info!(endpoint = %users_endpoint, "full endpoint users path");

        Ok(Self {
            transport,
            token: config.api.token.clone().unwrap_or_default(),
            projects_endpoint,
            users_endpoint,
            request_gate: Semaphore::new(config.api.max_in_flight.max(1)),
            state: Mutex::new(RateLimitState::new(&config.rate_limit)),
            resume_after_retry: config.rate_limit.resume_after_retry,
        })
    }

    #[must_use]
    pub const fn projects_endpoint(&self) -> &Url {
        &self.projects_endpoint
    }

    #[must_use]
    pub const fn users_endpoint(&self) -> &Url {
        &self.users_endpoint
    }

    fn lock_state(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.lock_state().is_limited(Instant::now())
    }

    /// Clear the rate-limit latch so the next fetch goes out again
    pub fn reset_rate_limit(&self) {
        self.lock_state().reset();
        info!("rate limit state reset");
    }

    /// Fetch the project collection from `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The API is rate limited, or answers 429 (`RateLimited`)
    /// - The request cannot be built or sent (`RequestConstruction`, `Transport`)
    /// - The API answers with another non-success status (`UnexpectedStatus`)
    /// - The body is not a valid project envelope (`Parse`)
    pub async fn fetch_projects(&self, endpoint: &Url) -> Result<Vec<Project>, ExtractError> {
        self.fetch_collection(PROJECTS_PATH, endpoint).await
    }

    /// Fetch the user collection from `endpoint`
    ///
    /// # Errors
    ///
    /// Same conditions as [`fetch_projects`](Self::fetch_projects).
    pub async fn fetch_users(&self, endpoint: &Url) -> Result<Vec<User>, ExtractError> {
        self.fetch_collection(USERS_PATH, endpoint).await
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        endpoint: &Url,
    ) -> Result<Vec<T>, ExtractError> {
        // Held until the response is fully read and classified.
        let _permit = self
            .request_gate
            .acquire()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        {
            let mut state = self.lock_state();
            if state.is_limited(Instant::now()) {
                debug!(resource, "skipping request while rate limited");
                return Err(ExtractError::RateLimited {
                    retry_after: state.retry_after(),
                });
            }
        }

        let response = match self.transport.get(endpoint, &self.token).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ExtractError::RequestConstruction(_) => {
                        error!(resource, error = %e, "failed to construct HTTP request");
                    }
                    _ => error!(resource, %endpoint, error = %e, "failed to get response from the endpoint"),
                }
                return Err(e);
            }
        };

        let retry_after_header = response.header(RETRY_AFTER.as_str());

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_header.and_then(parse_retry_after);
            self.lock_state().trip(retry_after, Instant::now());
            warn!(resource, %endpoint, ?retry_after, "got a rate limiting");
            return Err(ExtractError::RateLimited { retry_after });
        }

        debug!(
            resource,
            retry_after = retry_after_header.unwrap_or_default(),
            status = response.status.as_u16(),
            "rate-limiting data"
        );

        if !response.status.is_success() {
            error!(resource, status = response.status.as_u16(), "unexpected response status");
            return Err(ExtractError::UnexpectedStatus {
                status: response.status.as_u16(),
                body: response.body,
            });
        }

        let records = decode_envelope(&response.body).map_err(|e| {
            error!(resource, error = %e, "failed to unmarshal json");
            ExtractError::from(e)
        })?;
        debug!(resource, count = records.len(), "fetched collection");
        Ok(records)
    }

    /// Run one extraction tick: projects first, then users. The first failure
    /// ends the tick.
    pub async fn extract_once(&self) -> TickOutcome {
        let projects = match self.fetch_projects(&self.projects_endpoint).await {
            Ok(projects) => projects,
            Err(e) => return e.into(),
        };
        let users = match self.fetch_users(&self.users_endpoint).await {
            Ok(users) => users,
            Err(e) => return e.into(),
        };
        TickOutcome::Extracted(Extraction { projects, users })
    }

    /// Poll every `interval` until `shutdown` fires or a tick fails.
    ///
    /// The first tick happens one full interval after the call. The stop
    /// signal is only observed between ticks; an in-flight fetch always runs
    /// to completion.
    pub async fn run(&self, shutdown: &Shutdown, interval: Duration) -> RunSummary {
        let mut ticker = tokio::time::interval_at(deadline_after(interval), interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks_completed = 0;
        let mut ticks_rate_limited = 0;

        info!(interval_secs = interval.as_secs_f64(), "Asana extractor started");

        let stop_reason = loop {
            let stop = tokio::select! {
                biased;
                cause = shutdown.wait() => Some(Self::on_stop_signal(cause)),
                _ = ticker.tick() => match self.extract_once().await {
                    TickOutcome::Extracted(extraction) => {
                        ticks_completed += 1;
                        info!(count = extraction.projects.len(), projects = ?extraction.projects, "projects extracted");
                        info!(count = extraction.users.len(), users = ?extraction.users, "users extracted");
                        None
                    }
                    TickOutcome::RateLimited { retry_after } if self.resume_after_retry => {
                        ticks_rate_limited += 1;
                        warn!(?retry_after, "rate limited, skipping tick until the window elapses");
                        None
                    }
                    TickOutcome::RateLimited { retry_after } => {
                        error!(?retry_after, "extraction stopped: rate limited by upstream API");
                        Some(StopReason::RateLimited { retry_after })
                    }
                    TickOutcome::Failed(e) => {
                        error!(error = %e, "extraction stopped");
                        Some(StopReason::Failed(e))
                    }
                },
            };

            if let Some(reason) = stop {
                break reason;
            }
        };

        info!(ticks_completed, "Asana extractor finished execution");
        RunSummary {
            ticks_completed,
            ticks_rate_limited,
            stop_reason,
        }
    }

    fn on_stop_signal(cause: StopCause) -> StopReason {
        match cause {
            StopCause::Cancelled => info!("extraction cancelled"),
            StopCause::DeadlineExceeded => {
                error!("extraction loop was not finished by cancel: run deadline exceeded");
            }
        }
        cause.into()
    }

    /// Fire `count` concurrent user fetches and wait for all of them.
    ///
    /// Diagnostic helper for observing rate-limit behavior under load.
    pub async fn burst_users(self: &Arc<Self>, count: usize) -> Vec<Result<Vec<User>, ExtractError>> {
        let mut tasks = JoinSet::new();
        for _ in 0..count {
            let extractor = Arc::clone(self);
            tasks.spawn(async move { extractor.fetch_users(&extractor.users_endpoint).await });
        }

        let mut results = Vec::with_capacity(count);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "burst fetch task failed"),
            }
        }
        results
    }
}
