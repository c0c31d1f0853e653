//! Recognising and executing function calls.
//!
//! A model asks for functions either natively (structured calls on the
//! response) or, when the provider has no native support, by filling the
//! text-mode output fields [`FUNCTION_NAME_FIELD`] and
//! [`FUNCTION_ARGUMENTS_FIELD`]. [`parse_function_calls`] normalises both
//! into [`FunctionCall`]s and [`process_functions`] runs them, writing each
//! result back into memory.

use serde_json::{Map, Value};
use sigil_core::identifier::generate_function_call_id;
use sigil_core::memory::Memory;
use sigil_core::messages::{ChatMessage, FunctionCall, FunctionCallArgs};
use std::collections::HashSet;

use crate::context::FunctionContext;
use crate::error::{FunctionError, FunctionResult};
use crate::registry::FunctionRegistry;

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::{debug, warn};

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug { ($($arg:tt)*) => {} }
#[cfg(not(feature = "tracing-integration"))]
macro_rules! warn { ($($arg:tt)*) => {} }

/// Output field carrying the function name in text mode.
pub const FUNCTION_NAME_FIELD: &str = "functionName";

/// Output field carrying the function arguments in text mode.
pub const FUNCTION_ARGUMENTS_FIELD: &str = "functionArguments";

/// Collect the function calls requested by a model turn.
///
/// Native calls win when present; missing ids are generated. Otherwise, if
/// the provider lacks native support and `values` holds a text-mode
/// function name, the two text-mode entries are removed from `values` and
/// turned into a single call. Returns `None` when nothing was requested.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use sigil_functions::parse_function_calls;
///
/// let mut values = json!({
///     "functionName": "get_weather",
///     "functionArguments": {"city": "Paris"}
/// })
/// .as_object()
/// .cloned()
/// .unwrap();
///
/// let calls = parse_function_calls(&[], &mut values, false).unwrap();
/// assert_eq!(calls[0].name, "get_weather");
/// assert!(values.is_empty());
/// ```
pub fn parse_function_calls(
    native_calls: &[FunctionCall],
    values: &mut Map<String, Value>,
    native_supported: bool,
) -> Option<Vec<FunctionCall>> {
    if !native_calls.is_empty() {
        let calls = native_calls
            .iter()
            .cloned()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = generate_function_call_id();
                }
                call
            })
            .collect();
        return Some(calls);
    }

    if native_supported {
        return None;
    }

    let name = match values.get(FUNCTION_NAME_FIELD)? {
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    values.remove(FUNCTION_NAME_FIELD);
    let args = match values.remove(FUNCTION_ARGUMENTS_FIELD) {
        Some(Value::String(s)) => FunctionCallArgs::String(s),
        Some(Value::Null) | None => FunctionCallArgs::default(),
        Some(other) => FunctionCallArgs::Json(other),
    };

    debug!(function = %name, "Parsed text-mode function call");
    Some(vec![FunctionCall::new(generate_function_call_id(), name, args)])
}

/// Execute `calls` in order and append their results to memory.
///
/// Each result becomes a function-role message carrying the call id:
/// strings are stored verbatim, other values as pretty-printed JSON.
/// Returns the lower-cased names of the functions that ran.
///
/// Any failure stops processing: an unknown name is
/// [`FunctionError::NotFound`], unparsable arguments are
/// [`FunctionError::InvalidArguments`], handler failures are attributed to
/// the function, and cancellation yields [`FunctionError::Aborted`].
pub async fn process_functions(
    registry: &FunctionRegistry,
    calls: &[FunctionCall],
    memory: &Memory,
    session_id: Option<&str>,
    ctx: &FunctionContext,
) -> FunctionResult<HashSet<String>> {
    let mut executed = HashSet::new();

    for call in calls {
        if ctx.is_cancelled() {
            return Err(FunctionError::Aborted);
        }

        let function = registry.get(&call.name).ok_or_else(|| {
            warn!(function = %call.name, "Model requested an unknown function");
            FunctionError::not_found(&call.name)
        })?;

        let args = call
            .args
            .parse()
            .map_err(|e| FunctionError::InvalidArguments {
                name: call.name.clone(),
                message: e.to_string(),
            })?;

        debug!(function = %call.name, call_id = %call.id, "Executing function");
        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(FunctionError::Aborted),
            result = function.handler.call(ctx, args) => result,
        }
        .map_err(|e| e.in_function(&call.name))?;

        memory.add(
            ChatMessage::function_result(call.id.clone(), render_result(&result)),
            session_id,
        );
        executed.insert(call.name.to_lowercase());
    }

    Ok(executed)
}

fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
