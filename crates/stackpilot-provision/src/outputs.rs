//! Parsing of `terraform output -json`.

use serde::Deserialize;
use tracing::warn;

use stackpilot_state::StackOutputs;

#[derive(Debug, Deserialize)]
struct OutputValue<T> {
    value: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutputs {
    instance_ids: Option<OutputValue<Vec<Option<String>>>>,
    instance_public_ip: Option<OutputValue<Vec<Option<String>>>>,
    instance_dns: Option<OutputValue<Vec<Option<String>>>>,
    nlb_dns_name: Option<OutputValue<Option<String>>>,
}

fn list(v: Option<OutputValue<Vec<Option<String>>>>) -> Vec<String> {
    v.map(|o| o.value.into_iter().map(Option::unwrap_or_default).collect())
        .unwrap_or_default()
}

/// Parse the tool's structured output. Malformed input yields empty outputs.
pub fn parse_outputs(raw: &str) -> StackOutputs {
    let parsed: RawOutputs = match serde_json::from_str(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "unparseable provisioning outputs");
            return StackOutputs::default();
        }
    };
    StackOutputs {
        instance_ids: list(parsed.instance_ids),
        instance_public_ips: list(parsed.instance_public_ip),
        instance_dns: list(parsed.instance_dns),
        nlb_dns_name: parsed
            .nlb_dns_name
            .and_then(|o| o.value)
            .filter(|s| !s.is_empty()),
    }
}
