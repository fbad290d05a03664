//! Effective ticket description for a run.
//!
//! Sensitive services take their description from the rake task declared in
//! the script instead of the ticket supplied on the command line.

use std::sync::OnceLock;

use regex::Regex;

/// `task <name>: :environment do` or `task <name> :environment do`.
fn task_declaration() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\btask\s+([A-Za-z0-9_]+)\s*:?\s*:environment\s+do\b")
            .unwrap_or_else(|e| unreachable!("task declaration pattern is valid: {e}"))
    })
}

/// Where the effective description came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionSource {
    /// Service is not sensitive; the ticket is used verbatim.
    Ticket,
    /// Task name extracted from the script.
    ScriptTask,
    /// Service is sensitive but the script declares no task. The ticket is
    /// kept and the caller should warn.
    ExtractionMissing,
}

/// Result of resolving a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDescription {
    pub value: String,
    pub source: DescriptionSource,
}

impl ResolvedDescription {
    pub fn needs_warning(&self) -> bool {
        self.source == DescriptionSource::ExtractionMissing
    }
}

/// Pure resolver over a configured set of sensitive-service markers.
#[derive(Debug, Clone)]
pub struct TicketDescriptionResolver {
    markers: Vec<String>,
}

impl TicketDescriptionResolver {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring match against the marker set.
    pub fn is_sensitive(&self, service: &str) -> bool {
        let service = service.to_lowercase();
        self.markers.iter().any(|m| service.contains(m.as_str()))
    }

    pub fn resolve(&self, ticket: &str, script: &str, service: &str) -> ResolvedDescription {
        if !self.is_sensitive(service) {
            return ResolvedDescription {
                value: ticket.to_string(),
                source: DescriptionSource::Ticket,
            };
        }

        match extract_task_name(script) {
            Some(task) => ResolvedDescription {
                value: task.to_string(),
                source: DescriptionSource::ScriptTask,
            },
            None => ResolvedDescription {
                value: ticket.to_string(),
                source: DescriptionSource::ExtractionMissing,
            },
        }
    }
}

/// First task name declared in `script`, if any.
pub fn extract_task_name(script: &str) -> Option<&str> {
    task_declaration()
        .captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
