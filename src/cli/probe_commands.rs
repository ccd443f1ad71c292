use anyhow::{Context, Result, bail};
use log::debug;
use serde_json::{Map, Value};

use netscout::probes::{Parameters, ProbeDescriptor, ProbeInvocation, ProbeRegistry};

pub struct ProbeCommandHandler {
    registry: ProbeRegistry,
}

impl ProbeCommandHandler {
    pub fn new(registry: ProbeRegistry) -> Self {
        Self { registry }
    }

    pub fn handle_probes_command(&self, json: bool) -> Result<()> {
        let descriptors = self.registry.list();
        if json {
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
            return Ok(());
        }

        println!("Available Probes");
        println!("================");
        for descriptor in descriptors {
            println!("  {:<20} {}", descriptor.id, descriptor.description);
        }
        Ok(())
    }

    pub fn handle_describe_command(&self, id: &str) -> Result<()> {
        let descriptor = self.registry.get(id)?;
        print_descriptor(descriptor);
        Ok(())
    }

    pub async fn handle_run_command(
        &self,
        id: &str,
        pairs: Vec<(String, String)>,
        params_json: Option<String>,
        compact: bool,
    ) -> Result<()> {
        let parameters = build_parameters(pairs, params_json.as_deref())?;
        debug!("Invoking '{}' with {:?}", id, parameters);

        let result = self
            .registry
            .run(ProbeInvocation::new(id, parameters))
            .await
            .with_context(|| format!("Probe '{}' failed", id))?;

        let rendered = if compact {
            serde_json::to_string(&result)?
        } else {
            serde_json::to_string_pretty(&result)?
        };
        println!("{}", rendered);
        Ok(())
    }
}

/// Merges `--params-json` with `-p key=value` pairs; pairs override JSON keys
pub fn build_parameters(pairs: Vec<(String, String)>, params_json: Option<&str>) -> Result<Parameters> {
    let mut map = match params_json {
        Some(text) => match serde_json::from_str::<Value>(text).context("Invalid --params-json")? {
            Value::Object(map) => map,
            other => bail!("--params-json must be a JSON object, got {}", other),
        },
        None => Map::new(),
    };
    for (key, value) in pairs {
        map.insert(key, Value::String(value));
    }
    Ok(Parameters::from(map))
}

fn print_descriptor(descriptor: &ProbeDescriptor) {
    println!("{} ({})", descriptor.name, descriptor.id);
    println!("{}", descriptor.description);
    if descriptor.parameters.is_empty() {
        println!("\nNo parameters.");
        return;
    }

    println!("\nParameters:");
    for spec in &descriptor.parameters {
        let mut line = format!(
            "  {:<20} {:<8} {}",
            spec.id,
            format!("{:?}", spec.param_type).to_lowercase(),
            spec.description
        );
        if spec.required {
            line.push_str(" [required]");
        }
        if let Some(default) = &spec.default {
            line.push_str(&format!(" [default: {}]", default));
        }
        if let (Some(min), Some(max)) = (spec.min, spec.max) {
            line.push_str(&format!(" [{}..={}]", min, max));
        }
        println!("{}", line);
    }
}
