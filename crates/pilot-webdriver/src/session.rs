//! WebDriver session client
//!
//! Speaks the W3C WebDriver protocol over HTTP to chromedriver, geckodriver
//! or a Selenium server, and implements [`UiDriver`] on top of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pilot_core::{Locator, PilotError, UiDriver, WebDriverSettings};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::WebDriverError;

/// Key of a web element reference in W3C responses.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

type WdResult<T> = std::result::Result<T, WebDriverError>;

/// `capabilities` payload of a new-session request.
pub fn capabilities(browser: &str, debugger_address: Option<&str>) -> Value {
    let mut always_match = json!({ "browserName": browser });
    if browser == "chrome" {
        if let Some(address) = debugger_address {
            always_match["goog:chromeOptions"] = json!({ "debuggerAddress": address });
        }
    }
    json!({ "capabilities": { "alwaysMatch": always_match } })
}

/// Element ids from a find-elements response value.
pub fn element_ids(value: &Value) -> WdResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| WebDriverError::UnexpectedResponse(format!("expected element list, got {}", value)))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| WebDriverError::UnexpectedResponse(format!("not an element reference: {}", item)))
        })
        .collect()
}

/// Number of lookups that fit in `timeout` at one lookup per `poll`.
pub fn poll_attempts(timeout: Duration, poll: Duration) -> u32 {
    if poll.is_zero() {
        return 1;
    }
    let attempts = timeout.as_millis() / poll.as_millis().max(1);
    (attempts as u32).max(1)
}

async fn decode(response: reqwest::Response) -> WdResult<Value> {
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        Ok(value)
    } else {
        Err(WebDriverError::from_wire(status.as_u16(), &value))
    }
}

async fn new_session(http: &reqwest::Client, server_url: &str, capabilities: &Value) -> WdResult<String> {
    let response = http
        .post(format!("{}/session", server_url))
        .json(capabilities)
        .send()
        .await?;
    let value = decode(response).await.map_err(|e| match e {
        WebDriverError::Protocol { message, .. } => WebDriverError::SessionNotCreated(message),
        other => other,
    })?;

    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebDriverError::UnexpectedResponse(format!("no sessionId in {}", value)))
}

/// An open browser session.
pub struct WebDriverSession {
    http: reqwest::Client,
    server_url: String,
    session_id: String,
    element_poll: Duration,
    closed: AtomicBool,
}

impl WebDriverSession {
    /// Open a session with the primary browser, falling back to the
    /// configured fallback browser when that fails.
    pub async fn connect(settings: &WebDriverSettings) -> WdResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pipeline-pilot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.command_timeout_secs))
            .build()?;
        let server_url = settings.server_url.trim_end_matches('/').to_string();

        let primary = capabilities(&settings.browser, settings.debugger_address.as_deref());
        let session_id = match new_session(&http, &server_url, &primary).await {
            Ok(id) => {
                info!(browser = %settings.browser, session = %id, "Connected to browser");
                id
            }
            Err(err) => match &settings.fallback_browser {
                Some(fallback) => {
                    warn!(browser = %settings.browser, error = %err, fallback = %fallback, "Could not connect, trying fallback browser");
                    let id = new_session(&http, &server_url, &capabilities(fallback, None)).await?;
                    info!(browser = %fallback, session = %id, "Connected to fallback browser");
                    id
                }
                None => return Err(err),
            },
        };

        Ok(Self {
            http,
            server_url,
            session_id,
            element_poll: Duration::from_millis(settings.element_poll_ms),
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> WdResult<Value> {
        let url = format!("{}/session/{}{}", self.server_url, self.session_id, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        decode(request.send().await?).await
    }

    async fn find_all(&self, scope: Option<&str>, css: &str) -> WdResult<Vec<String>> {
        let path = match scope {
            Some(parent) => format!("/element/{}/elements", parent),
            None => "/elements".to_string(),
        };
        let value = self
            .command(Method::POST, &path, Some(json!({ "using": "css selector", "value": css })))
            .await?;
        element_ids(&value)
    }

    /// Element id the locator points at, if it currently resolves.
    async fn resolve(&self, locator: &Locator) -> WdResult<Option<String>> {
        let mut scope: Option<String> = None;
        for step in locator.steps() {
            let found = self.find_all(scope.as_deref(), &step.css).await?;
            match found.into_iter().nth(step.nth.unwrap_or(0)) {
                Some(id) => scope = Some(id),
                None => return Ok(None),
            }
        }
        Ok(scope)
    }

    async fn require(&self, locator: &Locator) -> pilot_core::Result<String> {
        self.resolve(locator)
            .await?
            .ok_or_else(|| PilotError::ElementNotFound {
                locator: locator.to_string(),
                waited_ms: 0,
            })
    }
}

#[async_trait]
impl UiDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> pilot_core::Result<()> {
        debug!(url = %url, "Navigate");
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn reload(&self) -> pilot_core::Result<()> {
        self.command(Method::POST, "/refresh", Some(json!({}))).await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> pilot_core::Result<()> {
        let id = self.require(locator).await?;
        self.command(Method::POST, &format!("/element/{}/click", id), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> pilot_core::Result<()> {
        let id = self.require(locator).await?;
        self.command(Method::POST, &format!("/element/{}/clear", id), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", id),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_element(&self, locator: &Locator, timeout: Duration) -> pilot_core::Result<()> {
        let attempts = poll_attempts(timeout, self.element_poll);
        for attempt in 1..=attempts {
            match self.resolve(locator).await {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    debug!(locator = %locator, error = %err, "Element lookup failed, polling again");
                }
                Err(err) => return Err(err.into()),
            }
            if attempt < attempts {
                tokio::time::sleep(self.element_poll).await;
            }
        }
        Err(PilotError::ElementNotFound {
            locator: locator.to_string(),
            waited_ms: timeout.as_millis() as u64,
        })
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> pilot_core::Result<Option<String>> {
        let id = self.require(locator).await?;
        let value = self
            .command(Method::GET, &format!("/element/{}/attribute/{}", id, name), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn current_url(&self) -> pilot_core::Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(format!("url is not a string: {}", value)).into())
    }

    async fn count(&self, locator: &Locator) -> pilot_core::Result<usize> {
        let steps = locator.steps();
        let Some((last, parents)) = steps.split_last() else {
            return Ok(0);
        };

        let mut scope: Option<String> = None;
        for step in parents {
            let found = self.find_all(scope.as_deref(), &step.css).await?;
            match found.into_iter().nth(step.nth.unwrap_or(0)) {
                Some(id) => scope = Some(id),
                None => return Ok(0),
            }
        }
        Ok(self.find_all(scope.as_deref(), &last.css).await?.len())
    }

    async fn close(&self) -> pilot_core::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let url = format!("{}/session/{}", self.server_url, self.session_id);
        let response = self.http.delete(&url).send().await.map_err(WebDriverError::from)?;
        decode(response).await?;
        info!(session = %self.session_id, "Browser session closed");
        Ok(())
    }
}
