//! Named collection of callable functions.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::FunctionContext;
use crate::definition::FunctionDefinition;
use crate::error::{FunctionError, FunctionResult};
use crate::handler::FunctionHandler;

/// A definition paired with the handler that executes it.
#[derive(Clone)]
pub struct Function {
    /// What the model sees.
    pub definition: FunctionDefinition,
    /// What runs when the model calls it.
    pub handler: Arc<dyn FunctionHandler>,
}

impl Function {
    /// Pair a definition with a handler.
    pub fn new(definition: FunctionDefinition, handler: impl FunctionHandler + 'static) -> Self {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Functions available to a generator, in registration order.
///
/// Registering a name that already exists replaces the earlier entry in
/// place.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use sigil_functions::{function_fn, FunctionDefinition, FunctionRegistry};
///
/// let mut registry = FunctionRegistry::new();
/// registry
///     .register(
///         FunctionDefinition::new("now", "Current time"),
///         function_fn(|_ctx, _args| async move { Ok(json!("12:00")) }),
///     )
///     .unwrap();
///
/// assert!(registry.contains("now"));
/// assert_eq!(registry.definitions()[0].name, "now");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Function>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a function.
    pub fn register(
        &mut self,
        definition: FunctionDefinition,
        handler: impl FunctionHandler + 'static,
    ) -> FunctionResult<&mut Self> {
        self.insert(Function::new(definition, handler))
    }

    /// Validate and register an already paired function.
    pub fn insert(&mut self, function: Function) -> FunctionResult<&mut Self> {
        function.definition.validate()?;
        self.functions
            .insert(function.definition.name.clone(), function);
        Ok(self)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        definition: FunctionDefinition,
        handler: impl FunctionHandler + 'static,
    ) -> FunctionResult<Self> {
        self.register(definition, handler)?;
        Ok(self)
    }

    /// Remove a function by name.
    pub fn unregister(&mut self, name: &str) -> Option<Function> {
        self.functions.shift_remove(name)
    }

    /// Look up a function by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions
            .values()
            .map(|f| f.definition.clone())
            .collect()
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Check if a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Iterate over registered functions.
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Call a function by name.
    ///
    /// Handler errors are attributed to `name`.
    pub async fn call(&self, name: &str, ctx: &FunctionContext, args: Value) -> FunctionResult<Value> {
        let function = self.get(name).ok_or_else(|| FunctionError::not_found(name))?;
        function
            .handler
            .call(ctx, args)
            .await
            .map_err(|e| e.in_function(name))
    }
}
