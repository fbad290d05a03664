//! UI automation abstraction.
//!
//! The stage watcher, variable injector and orchestrator are written against
//! [`UiDriver`] only. Concrete automation backends (WebDriver, in-memory
//! fakes) implement it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

/// One hop of a [`Locator`]: a CSS selector and an optional match index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorStep {
    pub css: String,
    pub nth: Option<usize>,
}

/// Chain of CSS selectors, each resolved inside the element matched by the
/// previous step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    steps: Vec<LocatorStep>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            steps: vec![LocatorStep {
                css: selector.into(),
                nth: None,
            }],
        }
    }

    /// Select the `index`-th match (zero based) of the last step.
    pub fn nth(mut self, index: usize) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.nth = Some(index);
        }
        self
    }

    /// Locator for `selector` scoped inside the element this locator matches.
    pub fn child(&self, selector: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(LocatorStep {
            css: selector.into(),
            nth: None,
        });
        Self { steps }
    }

    pub fn steps(&self) -> &[LocatorStep] {
        &self.steps
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            f.write_str(&step.css)?;
            if let Some(nth) = step.nth {
                write!(f, " @{}", nth)?;
            }
        }
        Ok(())
    }
}

/// Capabilities a UI automation backend must provide.
///
/// All methods take `&self`; backends that need mutable state keep it behind
/// interior mutability. Calls are issued strictly sequentially.
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Clear the field and type `text` into it.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<()>;

    /// Wait until `locator` resolves, failing with
    /// [`PilotError::ElementNotFound`](crate::PilotError::ElementNotFound).
    async fn wait_for_element(&self, locator: &Locator, timeout: Duration) -> Result<()>;

    /// Read an attribute. `Ok(None)` when the element lacks it.
    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

    async fn current_url(&self) -> Result<String>;

    /// Number of elements the locator's last step matches.
    async fn count(&self, locator: &Locator) -> Result<usize>;

    /// Release the automation session.
    async fn close(&self) -> Result<()>;
}

/// Shared drivers, so a caller can keep inspecting a driver it handed over.
#[async_trait]
impl<T: UiDriver + ?Sized> UiDriver for Arc<T> {
    async fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url).await
    }

    async fn reload(&self) -> Result<()> {
        (**self).reload().await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        (**self).click(locator).await
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<()> {
        (**self).fill(locator, text).await
    }

    async fn wait_for_element(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        (**self).wait_for_element(locator, timeout).await
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        (**self).read_attribute(locator, name).await
    }

    async fn current_url(&self) -> Result<String> {
        (**self).current_url().await
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        (**self).count(locator).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
