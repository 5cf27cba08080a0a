use crate::config::CheckoutConfig;
use reqwest::Url;
use std::sync::{Mutex, PoisonError};

/// Read/replace access to the app's current location
pub trait Navigator: Send + Sync {
    fn current_location(&self) -> String;

    /// Replace the current location without adding a history entry
    fn replace_location(&self, location: String);
}

/// Navigator backed by a single in-memory location
pub struct InMemoryNavigator {
    location: Mutex<String>,
}

impl InMemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(location.into()),
        }
    }
}

impl Navigator for InMemoryNavigator {
    fn current_location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_location(&self, location: String) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = location;
    }
}

/// The one-shot query parameter appended by the checkout provider on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMarker {
    param: String,
    value: String,
}

impl CheckoutMarker {
    pub fn new(param: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            value: value.into(),
        }
    }

    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self::new(&config.marker_param, &config.marker_value)
    }

    /// Return `location` without the marker, or `None` when the marker is absent.
    ///
    /// Relative locations ("/space?checkout=success") stay relative; other query
    /// parameters and the fragment are preserved.
    pub fn strip(&self, location: &str) -> Option<String> {
        let (mut url, absolute) = match Url::parse(location) {
            Ok(url) => (url, true),
            Err(_) => {
                let base = Url::parse("http://localhost/").ok()?;
                (base.join(location).ok()?, false)
            }
        };

        let mut found = false;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, value)| {
                let is_marker = *key == self.param.as_str() && *value == self.value.as_str();
                found |= is_marker;
                !is_marker
            })
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if !found {
            return None;
        }

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        if absolute {
            return Some(url.to_string());
        }

        let mut stripped = url.path().to_string();
        if let Some(query) = url.query() {
            stripped.push('?');
            stripped.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            stripped.push('#');
            stripped.push_str(fragment);
        }
        Some(stripped)
    }
}
