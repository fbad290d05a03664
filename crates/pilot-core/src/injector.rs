//! Filling the CI variable form and triggering the pipeline.

use tracing::{debug, info, warn};

use crate::config::{PilotConfig, PipelineSettings, SelectorMap, ServiceSettings};
use crate::domain::{CiVariable, PilotError, Result, VariableSlot};
use crate::driver::{Locator, UiDriver};

/// Which service option was clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelection {
    /// Option label with the listbox prefix stripped, or `option #<index>`
    /// when the clicked option carries no label.
    pub label: String,
    pub index: usize,
    /// False when the configured fallback option was used.
    pub matched: bool,
}

/// Variables submitted with the run, in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injected {
    pub variables: Vec<CiVariable>,
    pub service: ServiceSelection,
}

/// Writes description, service and script body into the three variable rows,
/// then clicks the run button.
#[derive(Debug, Clone)]
pub struct VariableInjector {
    selectors: SelectorMap,
    services: ServiceSettings,
    timings: PipelineSettings,
}

impl VariableInjector {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            services: config.services.clone(),
            timings: config.pipeline.clone(),
        }
    }

    fn display_label(&self, raw: &str) -> String {
        raw.strip_prefix(self.services.option_label_prefix.as_str())
            .unwrap_or(raw)
            .to_string()
    }

    /// Locator of the value element of a variable slot.
    fn slot_field(&self, slot: VariableSlot, selector: &str) -> Locator {
        Locator::css(&self.selectors.variable_rows)
            .nth(slot.ordinal())
            .child(selector)
    }

    pub async fn inject<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        description: &str,
        service: &str,
        script: &str,
    ) -> Result<Injected> {
        let rows = Locator::css(&self.selectors.variable_rows);
        driver
            .wait_for_element(&rows, self.timings.page_ready_timeout())
            .await
            .map_err(|e| setup("CI variable rows", e))?;

        let found = driver.count(&rows).await?;
        if found < VariableSlot::ORDERED.len() {
            return Err(PilotError::Setup(format!(
                "expected {} CI variable rows, found {}",
                VariableSlot::ORDERED.len(),
                found
            )));
        }

        driver
            .fill(&self.slot_field(VariableSlot::Description, &self.selectors.value_field), description)
            .await?;
        debug!(slot = VariableSlot::Description.as_str(), "Variable filled");

        let selection = self.select_service(driver, service).await?;

        driver
            .fill(&self.slot_field(VariableSlot::ScriptBody, &self.selectors.value_field), script)
            .await?;
        debug!(slot = VariableSlot::ScriptBody.as_str(), bytes = script.len(), "Variable filled");

        driver.click(&Locator::css(&self.selectors.run_button)).await?;
        info!(service = %selection.label, matched = selection.matched, "CI variables set, pipeline triggered");

        Ok(Injected {
            variables: vec![
                CiVariable::new(VariableSlot::Description, description),
                CiVariable::new(VariableSlot::Service, selection.label.clone()),
                CiVariable::new(VariableSlot::ScriptBody, script),
            ],
            service: selection,
        })
    }

    /// Open the service dropdown and click the first option whose label
    /// contains `service` (case-insensitive), else the fallback option.
    async fn select_service<D: UiDriver + ?Sized>(&self, driver: &D, service: &str) -> Result<ServiceSelection> {
        driver
            .click(&self.slot_field(VariableSlot::Service, &self.selectors.value_dropdown))
            .await?;
        tokio::time::sleep(self.timings.dropdown_settle()).await;

        let options = Locator::css(&self.selectors.service_options);
        driver
            .wait_for_element(&options, self.timings.page_ready_timeout())
            .await
            .map_err(|e| setup("service options", e))?;
        let total = driver.count(&options).await?;

        let wanted = service.to_lowercase();
        let mut chosen = None;
        for index in 0..total {
            let label = driver
                .read_attribute(&options.clone().nth(index), &self.services.option_attribute)
                .await?;
            if let Some(label) = label {
                if label.to_lowercase().contains(&wanted) {
                    chosen = Some((index, label, true));
                    break;
                }
            }
        }

        let (index, raw_label, matched) = match chosen {
            Some(found) => found,
            None => {
                let index = self.services.fallback_index;
                if index >= total {
                    return Err(PilotError::Setup(format!(
                        "no service option matches '{}' and fallback index {} is out of range ({} options)",
                        service, index, total
                    )));
                }
                let label = driver
                    .read_attribute(&options.clone().nth(index), &self.services.option_attribute)
                    .await?
                    .unwrap_or_default();
                warn!(
                    degraded = true,
                    service = %service,
                    fallback_index = index,
                    fallback_label = %label,
                    "No service option matched, selecting fallback option"
                );
                (index, label, false)
            }
        };

        driver.click(&options.nth(index)).await?;
        tokio::time::sleep(self.timings.selection_settle()).await;

        let label = self.display_label(&raw_label);
        Ok(ServiceSelection {
            label: if label.is_empty() {
                format!("option #{}", index)
            } else {
                label
            },
            index,
            matched,
        })
    }
}

fn setup(what: &str, err: PilotError) -> PilotError {
    match err {
        PilotError::ElementNotFound { locator, waited_ms } => PilotError::Setup(format!(
            "{} not found ({}) after {}ms",
            what, locator, waited_ms
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICES: &[&str] = &[
        "listbox-item-ejar3-core-app",
        "listbox-item-ejar3-frontend",
        "listbox-item-ejar3-contract",
        "listbox-item-ejar3-sec",
        "listbox-item-ejar3-payments",
    ];

    fn form(driver: &crate::fakes::FakeDriver, config: &PilotConfig) {
        let rows = Locator::css(&config.selectors.variable_rows);
        driver.set_count(&rows, 3);
        let injector = VariableInjector::new(config);
        for slot in VariableSlot::ORDERED {
            driver.add_element(&injector.slot_field(slot, &config.selectors.value_field));
        }
        driver.add_element(&injector.slot_field(VariableSlot::Service, &config.selectors.value_dropdown));
        driver.add_list(&Locator::css(&config.selectors.service_options), "data-testid", SERVICES);
        driver.add_element(&Locator::css(&config.selectors.run_button));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injects_three_variables_in_order() {
        let driver = crate::fakes::FakeDriver::new();
        let config = PilotConfig::default();
        form(&driver, &config);
        let injector = VariableInjector::new(&config);

        let injected = injector
            .inject(&driver, "ES-100", "EJAR3-SEC", "pp 1\n")
            .await
            .unwrap();

        assert_eq!(
            injected.service,
            ServiceSelection {
                label: "ejar3-sec".to_string(),
                index: 3,
                matched: true
            }
        );
        let values: Vec<&str> = injected.variables.iter().map(|v| v.value()).collect();
        assert_eq!(values, vec!["ES-100", "ejar3-sec", "pp 1\n"]);

        let description = injector.slot_field(VariableSlot::Description, &config.selectors.value_field);
        let script = injector.slot_field(VariableSlot::ScriptBody, &config.selectors.value_field);
        assert_eq!(driver.filled(&description).as_deref(), Some("ES-100"));
        assert_eq!(driver.filled(&script).as_deref(), Some("pp 1\n"));
        assert_eq!(driver.clicks_on(&Locator::css(&config.selectors.run_button)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_service_uses_fallback() {
        let driver = crate::fakes::FakeDriver::new();
        let config = PilotConfig::default();
        form(&driver, &config);

        let injected = VariableInjector::new(&config)
            .inject(&driver, "ES-7", "billing", "pp 2")
            .await
            .unwrap();

        assert!(!injected.service.matched);
        assert_eq!(injected.service.index, 4);
        assert_eq!(injected.service.label, "ejar3-payments");
        let options = Locator::css(&config.selectors.service_options);
        assert_eq!(driver.clicks_on(&options.nth(4)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlabelled_fallback_records_clicked_position() {
        let driver = crate::fakes::FakeDriver::new();
        let config = PilotConfig::default();
        form(&driver, &config);
        let fallback = Locator::css(&config.selectors.service_options).nth(4);
        driver.remove_element(&fallback);
        driver.add_element(&fallback);

        let injected = VariableInjector::new(&config)
            .inject(&driver, "ES-7", "billing", "pp 2")
            .await
            .unwrap();

        assert_eq!(injected.service.label, "option #4");
        assert_eq!(injected.variables[1].value(), "option #4");
        assert_eq!(driver.clicks_on(&fallback), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_out_of_range_is_setup_error() {
        let driver = crate::fakes::FakeDriver::new();
        let mut config = PilotConfig::default();
        config.services.fallback_index = 9;
        form(&driver, &config);

        let err = VariableInjector::new(&config)
            .inject(&driver, "ES-7", "billing", "pp 2")
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Setup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_rows_is_setup_error() {
        let driver = crate::fakes::FakeDriver::new();
        let config = PilotConfig::default();

        let err = VariableInjector::new(&config)
            .inject(&driver, "ES-100", "ejar3-sec", "pp 1")
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Setup(_)));
        assert!(err.is_retryable());
    }
}
