//! Disable gate resolution
//!
//! A resource may point at a ConfigMap key holding "true"/"false". A
//! missing ConfigMap or key means "enabled": watching when it was not
//! wanted beats silently not watching because a dependency has not been
//! created yet. Any other lookup failure is an error for the caller to
//! retry.

use crate::error::ReconcileError;
use chrono::Utc;
use filewatch_core::{DisableSource, DisableStatus, ResourceStore};
use std::sync::Arc;

/// Resolved gate value plus a human-readable explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub disabled: bool,
    pub reason: String,
}

impl Resolution {
    fn enabled(reason: String) -> Self {
        Self {
            disabled: false,
            reason,
        }
    }
}

/// Looks up gate objects in the store
#[derive(Clone)]
pub struct DisableResolver {
    store: Arc<dyn ResourceStore>,
}

impl DisableResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Resolve a single disable source
    pub async fn resolve(&self, source: &DisableSource) -> Result<Resolution, ReconcileError> {
        match source {
            DisableSource::ConfigMap(cm_ref) => {
                let cm = match self.store.get_config_map(&cm_ref.name).await {
                    Ok(cm) => cm,
                    Err(e) if e.is_not_found() => {
                        return Ok(Resolution::enabled(format!(
                            "ConfigMap {:?} not found",
                            cm_ref.name
                        )));
                    }
                    Err(e) => {
                        return Err(ReconcileError::DisableLookup {
                            name: cm_ref.name.clone(),
                            source: e,
                        });
                    }
                };

                let value = match cm.data.get(&cm_ref.key) {
                    Some(value) => value.trim(),
                    None => {
                        return Ok(Resolution::enabled(format!(
                            "ConfigMap {:?} has no key {:?}",
                            cm_ref.name, cm_ref.key
                        )));
                    }
                };

                let disabled = if value.eq_ignore_ascii_case("true") {
                    true
                } else if value.eq_ignore_ascii_case("false") {
                    false
                } else {
                    return Ok(Resolution::enabled(format!(
                        "ConfigMap {:?} key {:?} has unrecognized value {:?}",
                        cm_ref.name, cm_ref.key, value
                    )));
                };

                Ok(Resolution {
                    disabled,
                    reason: format!(
                        "ConfigMap {:?} key {:?} is {}",
                        cm_ref.name, cm_ref.key, disabled
                    ),
                })
            }
        }
    }

    /// Build the status entry for a resource's (optional) disable source
    ///
    /// Keeps `previous.last_update_time` when nothing observable changed, so
    /// repeated passes do not rewrite status.
    pub async fn disable_status(
        &self,
        source: Option<&DisableSource>,
        previous: Option<&DisableStatus>,
    ) -> Result<DisableStatus, ReconcileError> {
        let resolution = match source {
            Some(source) => self.resolve(source).await?,
            None => Resolution::enabled("no disable source".to_string()),
        };

        let last_update_time = match previous {
            Some(prev)
                if prev.disabled == resolution.disabled
                    && prev.reason == resolution.reason
                    && prev.source.as_ref() == source =>
            {
                prev.last_update_time
            }
            _ => Utc::now(),
        };

        Ok(DisableStatus {
            disabled: resolution.disabled,
            last_update_time,
            reason: resolution.reason,
            source: source.cloned(),
        })
    }
}
