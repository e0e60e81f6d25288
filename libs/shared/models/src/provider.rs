use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A schedulable provider with its own calendar in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub calendar_key: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("provider table is empty")]
    Empty,

    #[error("duplicate provider name: {0}")]
    DuplicateName(String),

    #[error("calendar key {key} is shared by {first} and {second}")]
    DuplicateCalendarKey {
        key: String,
        first: String,
        second: String,
    },
}

/// Fixed provider→calendar-key table, loaded once at startup.
///
/// Lookups must be consistent in both directions, so construction rejects
/// any table where two providers share a name or a calendar key.
#[derive(Debug, Clone)]
pub struct ProviderDirectory {
    providers: Vec<Provider>,
}

impl ProviderDirectory {
    pub fn new(entries: Vec<(String, String)>) -> Result<Self, DirectoryError> {
        if entries.is_empty() {
            return Err(DirectoryError::Empty);
        }

        let mut providers: Vec<Provider> = Vec::with_capacity(entries.len());
        for (name, calendar_key) in entries {
            if providers.iter().any(|p| p.name == name) {
                return Err(DirectoryError::DuplicateName(name));
            }
            if let Some(existing) = providers.iter().find(|p| p.calendar_key == calendar_key) {
                return Err(DirectoryError::DuplicateCalendarKey {
                    key: calendar_key,
                    first: existing.name.clone(),
                    second: name,
                });
            }
            providers.push(Provider { name, calendar_key });
        }

        Ok(Self { providers })
    }

    pub fn by_name(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn by_calendar_key(&self, key: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.calendar_key == key)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, key: &str) -> (String, String) {
        (name.to_string(), key.to_string())
    }

    #[test]
    fn lookups_are_consistent_in_both_directions() {
        let dir = ProviderDirectory::new(vec![
            entry("Dra. Gómez", "gomez@calendars.example"),
            entry("Dr. Pérez", "perez@calendars.example"),
        ])
        .unwrap();

        let p = dir.by_name("Dra. Gómez").unwrap();
        assert_eq!(p.calendar_key, "gomez@calendars.example");
        let back = dir.by_calendar_key(&p.calendar_key).unwrap();
        assert_eq!(back.name, "Dra. Gómez");
    }

    #[test]
    fn rejects_shared_calendar_key() {
        let err = ProviderDirectory::new(vec![
            entry("Dr. Pérez", "shared@calendars.example"),
            entry("Dra. Gómez", "shared@calendars.example"),
        ])
        .unwrap_err();

        assert!(matches!(err, DirectoryError::DuplicateCalendarKey { .. }));
    }

    #[test]
    fn rejects_duplicate_name() {
        let err = ProviderDirectory::new(vec![
            entry("Dr. Pérez", "a@calendars.example"),
            entry("Dr. Pérez", "b@calendars.example"),
        ])
        .unwrap_err();

        assert_eq!(err, DirectoryError::DuplicateName("Dr. Pérez".to_string()));
    }

    #[test]
    fn rejects_empty_table() {
        assert_eq!(
            ProviderDirectory::new(vec![]).unwrap_err(),
            DirectoryError::Empty
        );
    }
}
