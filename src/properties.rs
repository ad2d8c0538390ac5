// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed storage-properties option table.
// Port of `internal/newcontext.py`'s `StorageProperties`
// (`__PROPERTIES__`, `_check_key`, `_check_val`).

use std::collections::HashMap;

use crate::error::Error;

/// Recognized option name → allowed values.
fn allowed_values(key: &str) -> Option<&'static [&'static str]> {
    match key {
        "encoding" => Some(&["utf-8"]),
        _ => None,
    }
}

/// The fixed-schema options table attached to a session.
#[derive(Debug, Clone, Default)]
pub struct StorageProperties {
    values: HashMap<String, String>,
}

impl StorageProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Validate and set a single property. Unknown key or unsupported value
    /// is rejected with [`Error::Property`] and leaves the table unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let options = match allowed_values(key) {
            Some(opts) => opts,
            None => {
                return Err(Error::Property {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                    options: None,
                })
            }
        };
        if !options.contains(&value) {
            return Err(Error::Property {
                key: key.to_string(),
                value: Some(value.to_string()),
                options: Some(options.to_vec()),
            });
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Set several properties, stopping at the first rejected one. Properties
    /// set before the failing one remain applied, matching the original's
    /// per-key `set_properties` loop.
    pub fn set_all<'a, I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in items {
            self.set(k, v)?;
        }
        Ok(())
    }
}
