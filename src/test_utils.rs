// This module is only compiled when running tests
#![cfg(any(test, feature = "testing"))]

use crate::config::Config;
use crate::error::ExtractError;
use crate::models::{Envelope, Project, User};
use crate::transport::{HttpResponse, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct EnvGuard {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    #[must_use]
    pub fn new(vars: Vec<&'static str>) -> Self {
        let vars = vars
            .into_iter()
            .map(|var| (var, env::var(var).ok()))
            .collect();
        Self { vars }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // Restore original environment state
        for (var, original_value) in &self.vars {
            match original_value {
                Some(value) => env::set_var(var, value),
                None => env::remove_var(var),
            }
        }
    }
}

/// Config pointing at `base_url` with a dummy token
#[must_use]
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.api.token = Some("123456".to_string());
    config
}

/// The four projects served by the scenario mock
#[must_use]
pub fn sample_projects() -> Vec<Project> {
    (1..=4)
        .map(|i| Project {
            id: i.to_string(),
            name: format!("projname{i}"),
            resource_type: format!("resource-type-{i}"),
        })
        .collect()
}

/// The three users served by the scenario mock
#[must_use]
pub fn sample_users() -> Vec<User> {
    [("1", 1), ("100", 2), ("200", 3)]
        .into_iter()
        .map(|(gid, i)| User {
            id: gid.to_string(),
            name: format!("username{i}"),
            resource_type: format!("resource-type-{i}"),
        })
        .collect()
}

/// # Panics
///
/// Will panic if serialization fails
#[must_use]
pub fn projects_body() -> String {
    serde_json::to_string(&Envelope {
        data: sample_projects(),
    })
    .unwrap()
}

/// # Panics
///
/// Will panic if serialization fails
#[must_use]
pub fn users_body() -> String {
    serde_json::to_string(&Envelope {
        data: sample_users(),
    })
    .unwrap()
}

/// # Panics
///
/// Will panic if `status` is not a valid HTTP status code
#[must_use]
pub fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: body.to_string(),
    }
}

impl HttpResponse {
    /// # Panics
    ///
    /// Will panic if the header name or value is invalid
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }
}

/// Scripted in-memory transport.
///
/// Responses are keyed by URL path. One-shot responses queued with
/// [`push_response`](Self::push_response) are served before the fixed one.
/// Unknown paths get a 400, like a real server would for an unknown route.
#[derive(Debug, Default)]
pub struct MockTransport {
    fixed: HashMap<String, HttpResponse>,
    queued: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_response(mut self, path: &str, response: HttpResponse) -> Self {
        self.fixed.insert(path.to_string(), response);
        self
    }

    /// # Panics
    ///
    /// Will panic if the mutex is poisoned
    #[must_use]
    pub fn push_response(self, path: &str, response: HttpResponse) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Hold every request for `delay` before answering
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths requested so far, in order
    ///
    /// # Panics
    ///
    /// Will panic if the mutex is poisoned
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// # Panics
    ///
    /// Will panic if the mutex is poisoned
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Bearer tokens sent so far, in order
    ///
    /// # Panics
    ///
    /// Will panic if the mutex is poisoned
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    /// Highest number of requests observed in flight at the same time
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url, bearer_token: &str) -> Result<HttpResponse, ExtractError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let path = url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());
        self.tokens.lock().unwrap().push(bearer_token.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front);
        let response = queued
            .or_else(|| self.fixed.get(&path).cloned())
            .unwrap_or_else(|| json_response(400, r#"{"message": "error"}"#));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}
