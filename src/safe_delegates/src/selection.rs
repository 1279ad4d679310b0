use crate::errors::DelegateError;

/// Configured Safes and the one currently selected.
///
/// Selection is not validated against the configured list: an unknown
/// address surfaces later as a failed registry query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeSelection {
    safes: Vec<String>,
    active: Option<String>,
}

impl SafeSelection {
    /// Parses a single address or a comma-separated list
    pub fn from_setting(setting: Option<&str>) -> Self {
        let safes = setting
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            safes,
            active: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.safes.is_empty()
    }

    pub fn selectable_safes(&self) -> &[String] {
        &self.safes
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn select(&mut self, address: impl Into<String>) {
        self.active = Some(address.into());
    }

    /// Active Safe, defaulting to the first configured one
    pub fn ensure_active(&mut self) -> Result<&str, DelegateError> {
        if self.active.is_none() {
            let first = self.safes.first().ok_or(DelegateError::NotConfigured)?;
            self.active = Some(first.clone());
        }
        self.active.as_deref().ok_or(DelegateError::NotConfigured)
    }
}
