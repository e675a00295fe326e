use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::error;

use jobrelay_core::RelayError;

use crate::api::AgentApi;

/// Invokes `flow_name` and decodes the first result's output values as `T`.
///
/// An empty result array, `isSuccess: false`, a transport failure and
/// undecodable outputs are all flow execution errors.
pub async fn run_flow<T: DeserializeOwned>(
    api: &dyn AgentApi,
    token: &str,
    flow_name: &str,
    inputs: Value,
) -> Result<T, RelayError> {
    let failed = |message: String| {
        error!(event_name = "crm.flow.failed", flow = flow_name, error = %message, "crm flow failed");
        RelayError::FlowExecution { flow: flow_name.to_string(), message }
    };

    let results = api.invoke_flow(token, flow_name, inputs).await.map_err(|e| failed(e.to_string()))?;
    let Some(first) = results.into_iter().next() else {
        return Err(failed("flow returned no results".to_string()));
    };
    if !first.is_success {
        return Err(failed(first.error_summary()));
    }

    serde_json::from_value(Value::Object(first.output_values))
        .map_err(|error| failed(format!("unexpected flow outputs: {error}")))
}

/// Flow inputs are a single object of named values.
pub fn flow_inputs<const N: usize>(pairs: [(&str, &str); N]) -> Value {
    let inputs: Map<String, Value> = pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(inputs)
}
