//! The handler trait and its closure adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;

use crate::context::FunctionContext;
use crate::error::FunctionResult;

/// Executes one function.
///
/// The returned value is stored in the conversation: strings verbatim,
/// anything else as pretty-printed JSON.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use sigil_functions::{FunctionContext, FunctionHandler, FunctionResult};
///
/// struct Clock;
///
/// #[async_trait]
/// impl FunctionHandler for Clock {
///     async fn call(&self, _ctx: &FunctionContext, _args: Value) -> FunctionResult<Value> {
///         Ok(json!({"time": "12:00"}))
///     }
/// }
/// ```
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Run the function with parsed arguments.
    async fn call(&self, ctx: &FunctionContext, args: Value) -> FunctionResult<Value>;
}

/// Handler backed by an async closure. Created by [`function_fn`].
pub struct FnHandler<F> {
    func: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(FunctionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = FunctionResult<Value>> + Send,
{
    async fn call(&self, ctx: &FunctionContext, args: Value) -> FunctionResult<Value> {
        (self.func)(ctx.clone(), args).await
    }
}

/// Wrap an async closure as a [`FunctionHandler`].
///
/// The closure receives an owned copy of the context.
///
/// ```rust
/// use serde_json::json;
/// use sigil_functions::function_fn;
///
/// let add = function_fn(|_ctx, args| async move {
///     let a = args["a"].as_f64().unwrap_or(0.0);
///     let b = args["b"].as_f64().unwrap_or(0.0);
///     Ok(json!(a + b))
/// });
/// # let _ = add;
/// ```
#[must_use]
pub fn function_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(FunctionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = FunctionResult<Value>> + Send,
{
    FnHandler { func }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FunctionError;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = function_fn(|ctx: FunctionContext, args: Value| async move {
            Ok(json!({"echo": args, "session": ctx.session_id}))
        });
        let ctx = FunctionContext::new().with_session("s1");
        let out = handler.call(&ctx, json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"echo": {"x": 1}, "session": "s1"}));
    }

    #[tokio::test]
    async fn test_closure_handler_error() {
        let handler = function_fn(|_ctx, _args| async move {
            Err::<Value, _>(FunctionError::failed("nope"))
        });
        let err = handler
            .call(&FunctionContext::new(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Function '' failed: nope");
    }
}
