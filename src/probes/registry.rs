//! Data-driven probe catalog
//!
//! The registry maps probe ids to a descriptor and the handler that runs
//! it. It is filled once at startup; duplicate registrations follow an
//! explicit [`DuplicatePolicy`] instead of depending on registration order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProbeError;
use crate::probes::descriptor::ProbeDescriptor;
use crate::probes::params::{Parameters, ProbeInvocation};

/// A runnable probe
#[async_trait]
pub trait ProbeHandler: Send + Sync {
    /// Catalog entry for this probe; its id is the registry key
    fn descriptor(&self) -> ProbeDescriptor;

    /// Runs the probe against already validated parameters
    async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError>;
}

/// How the registry treats a second registration under an existing id
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The newer registration replaces the older one
    #[default]
    Overwrite,
    /// The newer registration fails with `DuplicateProbe`
    Reject,
}

/// Common envelope around a probe's own result mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_id: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock execution time in seconds
    pub duration_secs: f64,
    pub result: Value,
}

struct RegisteredProbe {
    descriptor: ProbeDescriptor,
    handler: Arc<dyn ProbeHandler>,
}

/// Catalog of registered probes keyed by id
pub struct ProbeRegistry {
    probes: HashMap<String, RegisteredProbe>,
    policy: DuplicatePolicy,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.probes.keys().collect();
        ids.sort();
        f.debug_struct("ProbeRegistry")
            .field("policy", &self.policy)
            .field("probes", &ids)
            .finish()
    }
}

impl ProbeRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            probes: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Adds a probe; returns the descriptor it replaced, if any
    pub fn register(
        &mut self,
        handler: Arc<dyn ProbeHandler>,
    ) -> Result<Option<ProbeDescriptor>, ProbeError> {
        let descriptor = handler.descriptor();
        let id = descriptor.id.clone();

        if self.probes.contains_key(&id) && self.policy == DuplicatePolicy::Reject {
            warn!("Rejected duplicate registration for probe '{}'", id);
            return Err(ProbeError::DuplicateProbe { id });
        }

        let previous = self
            .probes
            .insert(id.clone(), RegisteredProbe { descriptor, handler })
            .map(|replaced| replaced.descriptor);

        match &previous {
            Some(_) => warn!("Probe '{}' re-registered, previous handler replaced", id),
            None => debug!("Registered probe '{}'", id),
        }
        Ok(previous)
    }

    pub fn get(&self, id: &str) -> Result<&ProbeDescriptor, ProbeError> {
        self.probes
            .get(id)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| ProbeError::ProbeNotFound { id: id.to_string() })
    }

    /// All descriptors, sorted by id for stable output
    pub fn list(&self) -> Vec<&ProbeDescriptor> {
        let mut descriptors: Vec<&ProbeDescriptor> =
            self.probes.values().map(|entry| &entry.descriptor).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Checks that every required parameter is present
    ///
    /// Unknown parameters are ignored so older probes accept newer callers.
    pub fn validate(&self, id: &str, params: &Parameters) -> Result<(), ProbeError> {
        let descriptor = self.get(id)?;
        let missing: Vec<String> = descriptor
            .required_parameters()
            .filter(|required| !params.contains(required))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProbeError::MissingParameters {
                probe: id.to_string(),
                missing,
            })
        }
    }

    /// Validates, applies declared defaults and executes the probe
    pub async fn run(&self, invocation: ProbeInvocation) -> Result<ProbeResult, ProbeError> {
        let ProbeInvocation {
            probe_id,
            parameters,
        } = invocation;

        let entry = self
            .probes
            .get(&probe_id)
            .ok_or_else(|| ProbeError::ProbeNotFound { id: probe_id.clone() })?;
        self.validate(&probe_id, &parameters)?;

        let params = with_defaults(&entry.descriptor, parameters);
        let handler = Arc::clone(&entry.handler);

        info!(
            "Running probe '{}' with {} parameters",
            probe_id,
            params.len()
        );
        let started = Instant::now();
        let outcome = handler.execute(&params).await;
        let duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                info!("Probe '{}' finished in {:.3}s", probe_id, duration_secs);
                Ok(ProbeResult {
                    probe_id,
                    timestamp: Utc::now(),
                    duration_secs,
                    result,
                })
            }
            Err(e) => {
                warn!(
                    "Probe '{}' failed after {:.3}s: {}",
                    probe_id, duration_secs, e
                );
                Err(e)
            }
        }
    }
}

/// Fills absent optional parameters with the descriptor's declared defaults
fn with_defaults(descriptor: &ProbeDescriptor, mut params: Parameters) -> Parameters {
    for spec in &descriptor.parameters {
        if let Some(default) = &spec.default {
            if !params.contains(&spec.id) {
                params.insert(&spec.id, default.clone());
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::descriptor::ParameterSpec;
    use serde_json::json;

    struct EchoProbe {
        id: &'static str,
        label: &'static str,
    }

    #[async_trait]
    impl ProbeHandler for EchoProbe {
        fn descriptor(&self) -> ProbeDescriptor {
            ProbeDescriptor::new(self.id, self.label, "Echoes its parameters")
                .parameter(ParameterSpec::string("host", "Host", "Target host").required())
                .parameter(ParameterSpec::number("count", "Count", "Repetitions").default_value(4))
        }

        async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError> {
            Ok(serde_json::to_value(params.as_map()).map_err(anyhow::Error::from)?)
        }
    }

    fn echo(id: &'static str, label: &'static str) -> Arc<dyn ProbeHandler> {
        Arc::new(EchoProbe { id, label })
    }

    #[test]
    fn test_overwrite_policy_replaces_descriptor() {
        let mut registry = ProbeRegistry::new(DuplicatePolicy::Overwrite);
        assert!(registry.register(echo("echo", "First")).unwrap().is_none());
        let replaced = registry.register(echo("echo", "Second")).unwrap();

        assert_eq!(replaced.unwrap().name, "First");
        assert_eq!(registry.get("echo").unwrap().name, "Second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reject_policy_keeps_first_registration() {
        let mut registry = ProbeRegistry::new(DuplicatePolicy::Reject);
        registry.register(echo("echo", "First")).unwrap();
        let result = registry.register(echo("echo", "Second"));

        assert!(matches!(result, Err(ProbeError::DuplicateProbe { .. })));
        assert_eq!(registry.get("echo").unwrap().name, "First");
    }

    #[test]
    fn test_get_unknown_probe() {
        let registry = ProbeRegistry::default();
        let error = registry.get("nope").unwrap_err();
        assert_eq!(error.to_string(), "probe not found: nope");
    }

    #[test]
    fn test_validate_ignores_extra_parameters_and_is_idempotent() {
        let mut registry = ProbeRegistry::default();
        registry.register(echo("echo", "Echo")).unwrap();

        let params = Parameters::new().with("host", "10.0.0.1").with("future_flag", true);
        for _ in 0..3 {
            assert!(registry.validate("echo", &params).is_ok());
        }

        let empty = Parameters::new();
        let first = registry.validate("echo", &empty).unwrap_err().to_string();
        let second = registry.validate("echo", &empty).unwrap_err().to_string();
        assert_eq!(first, "missing required parameter: host");
        assert_eq!(first, second);
    }

    #[test]
    fn test_list_is_sorted() {
        let mut registry = ProbeRegistry::default();
        registry.register(echo("zeta", "Z")).unwrap();
        registry.register(echo("alpha", "A")).unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_run_applies_defaults() {
        let mut registry = ProbeRegistry::default();
        registry.register(echo("echo", "Echo")).unwrap();

        let invocation = ProbeInvocation::new("echo", Parameters::new().with("host", "h"));
        let result = registry.run(invocation).await.unwrap();

        assert_eq!(result.probe_id, "echo");
        assert_eq!(result.result, json!({"host": "h", "count": 4}));
    }

    #[tokio::test]
    async fn test_run_rejects_before_execution() {
        let mut registry = ProbeRegistry::default();
        registry.register(echo("echo", "Echo")).unwrap();

        let result = registry
            .run(ProbeInvocation::new("echo", Parameters::new()))
            .await;
        assert!(matches!(result, Err(ProbeError::MissingParameters { .. })));

        let result = registry
            .run(ProbeInvocation::new("missing", Parameters::new()))
            .await;
        assert!(matches!(result, Err(ProbeError::ProbeNotFound { .. })));
    }
}
