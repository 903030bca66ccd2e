//! Statutory resolution windows per procedure category.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Window applied to categories missing from the table (general 30-day petition term).
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Upper bound for any window, whether built in code or read from overrides.
pub const MAX_WINDOW_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineEntry {
    pub flow_type: String,
    pub label: String,
    pub window_days: u32,
}

/// Result of a registry lookup. `was_default` marks a fallback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeadlineLookup {
    pub days: u32,
    pub was_default: bool,
}

/// Due date stamped on a freshly filed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDate {
    pub due: DateTime<Utc>,
    pub lookup: DeadlineLookup,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read deadline overrides: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid deadline CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("deadline override row {row} has an empty flow_type")]
    EmptyFlowType { row: usize },
    #[error("deadline window for '{flow_type}' must be between 1 and 3650 days (found {value})")]
    InvalidWindow { flow_type: String, value: i64 },
}

/// Immutable category -> window table, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct DeadlineRegistry {
    entries: BTreeMap<String, DeadlineEntry>,
    aliases: BTreeMap<String, String>,
    default_days: u32,
}

impl DeadlineRegistry {
    pub fn new<I>(entries: I, default_days: u32) -> Self
    where
        I: IntoIterator<Item = DeadlineEntry>,
    {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let key = normalize_key(&entry.flow_type);
                let entry = DeadlineEntry {
                    flow_type: key.clone(),
                    label: entry.label,
                    window_days: clamp_window(entry.window_days),
                };
                (key, entry)
            })
            .collect();

        Self {
            entries,
            aliases: BTreeMap::new(),
            default_days: clamp_window(default_days),
        }
    }

    /// Urbanism procedures handled by the city hall, keyed by their store names.
    pub fn standard() -> Self {
        let table = [
            ("certificat_urbanism", "Certificat de urbanism", 30),
            ("autorizatie_construire", "Autorizație de construire", 30),
            ("autorizatie_desfiintare", "Autorizație de desființare", 30),
            ("informare_urbanism", "Informare de urbanism", 15),
            ("racord_utilitati", "Racord utilități", 15),
        ];

        let entries = table
            .into_iter()
            .map(|(flow_type, label, window_days)| DeadlineEntry {
                flow_type: flow_type.to_string(),
                label: label.to_string(),
                window_days,
            });

        Self::new(entries, DEFAULT_WINDOW_DAYS)
            .with_alias("urbanism_certificate", "certificat_urbanism")
            .with_alias("building_permit", "autorizatie_construire")
            .with_alias("demolition_permit", "autorizatie_desfiintare")
    }

    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases
            .insert(normalize_key(alias), normalize_key(canonical));
        self
    }

    /// Window for `flow_type`, falling back to the default instead of failing.
    pub fn lookup(&self, flow_type: &str) -> DeadlineLookup {
        match self.resolve(flow_type) {
            Some(entry) => DeadlineLookup {
                days: entry.window_days,
                was_default: false,
            },
            None => DeadlineLookup {
                days: self.default_days,
                was_default: true,
            },
        }
    }

    pub fn resolve(&self, flow_type: &str) -> Option<&DeadlineEntry> {
        let key = normalize_key(flow_type);
        if key.is_empty() {
            return None;
        }

        let canonical = self.aliases.get(&key).unwrap_or(&key);
        self.entries.get(canonical)
    }

    pub fn is_recognized(&self, flow_type: &str) -> bool {
        self.resolve(flow_type).is_some()
    }

    /// `submitted_at + window`, as stamped by the request-creation path.
    /// Saturates at the latest representable instant.
    pub fn due_date_for(&self, flow_type: Option<&str>, submitted_at: DateTime<Utc>) -> DueDate {
        let lookup = self.lookup(flow_type.unwrap_or_default());
        DueDate {
            due: add_window(submitted_at, lookup.days).unwrap_or(DateTime::<Utc>::MAX_UTC),
            lookup,
        }
    }

    pub fn default_days(&self) -> u32 {
        self.default_days
    }

    pub fn entries(&self) -> impl Iterator<Item = &DeadlineEntry> {
        self.entries.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
    }

    pub fn with_overrides_from_path<P: AsRef<Path>>(self, path: P) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path)?;
        self.with_overrides(file)
    }

    /// Merges `flow_type,window_days[,label]` rows over the current table.
    pub fn with_overrides<R: Read>(mut self, reader: R) -> Result<Self, RegistryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        for (index, row) in csv_reader.deserialize::<OverrideRow>().enumerate() {
            let row = row?;
            let key = normalize_key(&row.flow_type);
            if key.is_empty() {
                return Err(RegistryError::EmptyFlowType { row: index + 1 });
            }
            if !(1..=i64::from(MAX_WINDOW_DAYS)).contains(&row.window_days) {
                return Err(RegistryError::InvalidWindow {
                    flow_type: row.flow_type,
                    value: row.window_days,
                });
            }

            let canonical = self.aliases.get(&key).cloned().unwrap_or(key);
            let label = row
                .label
                .filter(|label| !label.is_empty())
                .or_else(|| self.entries.get(&canonical).map(|entry| entry.label.clone()))
                .unwrap_or_else(|| canonical.clone());

            self.entries.insert(
                canonical.clone(),
                DeadlineEntry {
                    flow_type: canonical,
                    label,
                    window_days: row.window_days as u32,
                },
            );
        }

        Ok(self)
    }
}

impl Default for DeadlineRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Deserialize)]
struct OverrideRow {
    flow_type: String,
    window_days: i64,
    #[serde(default)]
    label: Option<String>,
}

/// `start + days`, or `None` when the sum leaves chrono's range.
pub(crate) fn add_window(start: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|window| start.checked_add_signed(window))
}

fn clamp_window(days: u32) -> u32 {
    days.clamp(1, MAX_WINDOW_DAYS)
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
