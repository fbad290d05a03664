//! In-memory, scriptable [`UiDriver`] (testing only).
//!
//! `FakeDriver` models the page as a set of locator keys with attribute
//! sequences. Every read of an attribute advances its sequence; the last
//! value sticks. Clicks can mutate the page through [`ClickEffect`]s, and
//! every call is appended to a log that tests assert on.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{PilotError, Result};
use crate::driver::{Locator, UiDriver};

/// A recorded driver call. Locators are stored in their display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Navigate(String),
    Reload,
    Click(String),
    Fill(String, String),
    WaitFor(String),
    ReadAttribute(String, String),
    CurrentUrl,
    Count(String),
    Close,
}

/// Page mutation applied when a locator is clicked.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Replace the value sequence of an attribute.
    SetAttribute {
        locator: Locator,
        name: String,
        values: Vec<String>,
    },
    /// Replace the queue of URLs returned by `current_url`.
    SetUrls(Vec<String>),
    AddElement(Locator),
    RemoveElement(Locator),
}

#[derive(Debug, Default)]
struct FakeState {
    elements: HashSet<String>,
    attributes: HashMap<(String, String), VecDeque<String>>,
    counts: HashMap<String, usize>,
    urls: VecDeque<String>,
    click_effects: HashMap<String, Vec<ClickEffect>>,
    click_failures: HashMap<String, u32>,
    reload_failures: u32,
    close_fails: bool,
    calls: Vec<DriverCall>,
    closed: bool,
}

impl FakeState {
    /// An element exists when registered itself or through a nested locator.
    fn has(&self, key: &str) -> bool {
        let nested = format!("{} >> ", key);
        let matches = |k: &str| k == key || k.starts_with(&nested);

        self.elements.iter().any(|k| matches(k.as_str()))
            || self.counts.iter().any(|(k, n)| *n > 0 && matches(k.as_str()))
            || self.attributes.keys().any(|(k, _)| matches(k.as_str()))
    }

    fn require(&self, key: &str) -> Result<()> {
        if self.has(key) {
            Ok(())
        } else {
            Err(PilotError::ElementNotFound {
                locator: key.to_string(),
                waited_ms: 0,
            })
        }
    }

    fn apply(&mut self, effect: ClickEffect) {
        match effect {
            ClickEffect::SetAttribute {
                locator,
                name,
                values,
            } => {
                self.attributes
                    .insert((locator.to_string(), name), values.into_iter().collect());
            }
            ClickEffect::SetUrls(urls) => self.urls = urls.into_iter().collect(),
            ClickEffect::AddElement(locator) => {
                self.elements.insert(locator.to_string());
            }
            ClickEffect::RemoveElement(locator) => {
                let key = locator.to_string();
                self.elements.remove(&key);
                self.counts.remove(&key);
                self.attributes.retain(|(k, _), _| *k != key);
            }
        }
    }
}

/// Pop the front of a sequence unless it is the last value.
fn advance(queue: &mut VecDeque<String>) -> Option<String> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Scriptable in-memory driver.
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_element(&self, locator: &Locator) {
        self.state().elements.insert(locator.to_string());
    }

    pub fn remove_element(&self, locator: &Locator) {
        self.state().apply(ClickEffect::RemoveElement(locator.clone()));
    }

    pub fn set_attribute(&self, locator: &Locator, name: &str, value: &str) {
        self.set_attribute_sequence(locator, name, &[value]);
    }

    /// Values returned by successive reads; the last one repeats.
    pub fn set_attribute_sequence(&self, locator: &Locator, name: &str, values: &[&str]) {
        self.state().attributes.insert(
            (locator.to_string(), name.to_string()),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    pub fn set_count(&self, locator: &Locator, count: usize) {
        self.state().counts.insert(locator.to_string(), count);
    }

    /// Register a list: `count(base)` returns `labels.len()` and
    /// `base.nth(i)` carries `labels[i]` in `attribute`.
    pub fn add_list(&self, base: &Locator, attribute: &str, labels: &[&str]) {
        self.set_count(base, labels.len());
        for (i, label) in labels.iter().enumerate() {
            self.set_attribute(&base.clone().nth(i), attribute, label);
        }
    }

    /// URLs returned by successive `current_url` calls; the last one repeats.
    pub fn set_urls(&self, urls: &[&str]) {
        self.state().urls = urls.iter().map(|u| u.to_string()).collect();
    }

    pub fn on_click(&self, locator: &Locator, effect: ClickEffect) {
        self.state()
            .click_effects
            .entry(locator.to_string())
            .or_default()
            .push(effect);
    }

    /// Make the next `times` clicks on `locator` fail with a transient error.
    pub fn fail_clicks(&self, locator: &Locator, times: u32) {
        self.state()
            .click_failures
            .insert(locator.to_string(), times);
    }

    /// Make the next `times` reloads fail with a driver error.
    pub fn fail_reloads(&self, times: u32) {
        self.state().reload_failures = times;
    }

    /// Make `close` fail. The session still counts as closed.
    pub fn fail_close(&self) {
        self.state().close_fails = true;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    /// Successful and failed clicks issued on `locator`.
    pub fn clicks_on(&self, locator: &Locator) -> usize {
        let key = locator.to_string();
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Click(k) if *k == key))
            .count()
    }

    /// Last text typed into `locator`.
    pub fn filled(&self, locator: &Locator) -> Option<String> {
        let key = locator.to_string();
        self.state().calls.iter().rev().find_map(|c| match c {
            DriverCall::Fill(k, text) if *k == key => Some(text.clone()),
            _ => None,
        })
    }

    pub fn navigations(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Navigate(_)))
            .count()
    }

    pub fn reloads(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Reload))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::Navigate(url.to_string()));
        state.urls = VecDeque::from([url.to_string()]);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::Reload);
        if state.reload_failures > 0 {
            state.reload_failures -= 1;
            return Err(PilotError::Driver("refresh: target window already closed".to_string()));
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let key = locator.to_string();
        let mut state = self.state();
        state.calls.push(DriverCall::Click(key.clone()));
        state.require(&key)?;

        if let Some(remaining) = state.click_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PilotError::TransientUi(format!(
                    "element click intercepted: {}",
                    key
                )));
            }
        }

        let effects = state.click_effects.get(&key).cloned().unwrap_or_default();
        for effect in effects {
            state.apply(effect);
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<()> {
        let key = locator.to_string();
        let mut state = self.state();
        state.calls.push(DriverCall::Fill(key.clone(), text.to_string()));
        state.require(&key)
    }

    async fn wait_for_element(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let key = locator.to_string();
        let mut state = self.state();
        state.calls.push(DriverCall::WaitFor(key.clone()));
        if state.has(&key) {
            Ok(())
        } else {
            Err(PilotError::ElementNotFound {
                locator: key,
                waited_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        let key = locator.to_string();
        let mut state = self.state();
        state
            .calls
            .push(DriverCall::ReadAttribute(key.clone(), name.to_string()));
        state.require(&key)?;
        Ok(state
            .attributes
            .get_mut(&(key, name.to_string()))
            .and_then(advance))
    }

    async fn current_url(&self) -> Result<String> {
        let mut state = self.state();
        state.calls.push(DriverCall::CurrentUrl);
        Ok(advance(&mut state.urls).unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        let key = locator.to_string();
        let mut state = self.state();
        state.calls.push(DriverCall::Count(key.clone()));
        Ok(state.counts.get(&key).copied().unwrap_or(0))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::Close);
        state.closed = true;
        if state.close_fails {
            return Err(PilotError::Driver("delete session: connection refused".to_string()));
        }
        Ok(())
    }
}
