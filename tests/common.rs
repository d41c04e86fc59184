#![allow(dead_code)]

use asana_extractor::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_TOKEN: &str = "123456";
pub const TEST_AUTHORIZATION: &str = "Bearer 123456";

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

pub struct DirGuard {
    original_dir: PathBuf,
}

impl DirGuard {
    /// Creates a new `DirGuard` that will restore the current directory when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> anyhow::Result<Self> {
        let original_dir = env::current_dir()?;
        Ok(Self { original_dir })
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        // Only try to restore the directory if it still exists
        if self.original_dir.exists() {
            if let Err(e) = env::set_current_dir(&self.original_dir) {
                eprintln!("Error restoring original directory: {e}");
            }
        }
    }
}

pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.token = Some(TEST_TOKEN.to_string());
    config
}

pub fn projects_envelope() -> Value {
    json!({
        "data": [
            {"gid": "1", "name": "projname1", "resource_type": "resource-type-1"},
            {"gid": "2", "name": "projname2", "resource_type": "resource-type-2"},
            {"gid": "3", "name": "projname3", "resource_type": "resource-type-3"},
            {"gid": "4", "name": "projname4", "resource_type": "resource-type-4"},
        ]
    })
}

pub fn users_envelope() -> Value {
    json!({
        "data": [
            {"gid": "1", "name": "username1", "resource_type": "resource-type-1"},
            {"gid": "100", "name": "username2", "resource_type": "resource-type-2"},
            {"gid": "200", "name": "username3", "resource_type": "resource-type-3"},
        ]
    })
}

/// Serve the four-project / three-user scenario on `server`
pub async fn mount_scenario(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/projects"))
        .and(header("authorization", TEST_AUTHORIZATION))
        .respond_with(ResponseTemplate::new(200).set_body_json(projects_envelope()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("authorization", TEST_AUTHORIZATION))
        .respond_with(ResponseTemplate::new(200).set_body_json(users_envelope()))
        .mount(server)
        .await;
}

/// One tracing event, with every field rendered through `Debug`
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    #[must_use]
    pub fn message(&self) -> &str {
        self.fields.get("message").map_or("", String::as_str)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct FieldRecorder(HashMap<String, String>);

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Layer that keeps every event it sees for later assertions
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    #[must_use]
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message() == message)
            .collect()
    }

    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: recorder.0,
        });
    }
}

/// Route this thread's events into a fresh capture until the guard drops
#[must_use]
pub fn capture_events() -> (EventCapture, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let capture = EventCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
