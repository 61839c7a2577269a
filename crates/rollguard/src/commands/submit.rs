use std::collections::HashMap;

use rollguard_rollout::{DeploymentRequest, Reconciler};

/// Parse a `--meta key=value` argument.
pub fn parse_meta(arg: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{arg}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{arg}'"));
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

pub fn request(
    id: String,
    namespace: String,
    app: String,
    version: String,
    meta: Vec<(String, serde_json::Value)>,
) -> DeploymentRequest {
    DeploymentRequest {
        deployment_id: id,
        namespace,
        app_name: app,
        version,
        metadata: meta.into_iter().collect::<HashMap<_, _>>(),
    }
}

pub fn submit(reconciler: &Reconciler, request: DeploymentRequest) -> anyhow::Result<()> {
    match reconciler.submit(request) {
        Ok(record) => {
            println!(
                "✓ Submitted {} ({}/{} → {})",
                record.deployment_id, record.namespace, record.app_name, record.version
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Submit failed: {e}");
            Err(e.into())
        }
    }
}
