//! Typed task handlers behind an object-safe registry.
//!
//! A [`TaskKind`] ties a task type string to its payload struct and result.
//! [`Handler<T>`] implementations stay fully typed; [`TypedHandler`] erases
//! them to [`DynHandler`] so the registry can map type strings to handlers.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{RegistryError, TaskError};
use crate::bridge::{GcBridge, ReplyRoute};

/// Payload type for one task type string.
pub trait TaskKind: DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    /// Written to the task's `result` column as JSON.
    type Output: Serialize + Send;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: i64,
    pub task_type: String,
}

#[async_trait]
pub trait Handler<T: TaskKind>: Send + Sync + 'static {
    async fn handle(&self, task: T, ctx: &TaskContext) -> Result<T::Output, TaskError>;

    /// Reply routes the bridge needs for this handler's requests.
    fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
        Vec::new()
    }
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    /// Decode and validate `payload`, then run the handler.
    ///
    /// A payload that fails to decode or validate never reaches the typed
    /// handler.
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<serde_json::Value, TaskError>;

    fn task_type(&self) -> &'static str;

    fn reply_routes(&self) -> Vec<(u32, ReplyRoute)>;
}

pub struct TypedHandler<T: TaskKind, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TaskKind, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskKind, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<serde_json::Value, TaskError> {
        let task: T =
            serde_json::from_value(payload).map_err(|e| TaskError::Validation(e.to_string()))?;
        task.validate().map_err(TaskError::Validation)?;

        let output = self.handler.handle(task, ctx).await?;
        serde_json::to_value(output)
            .map_err(|e| TaskError::Handler(format!("could not encode result: {e}")))
    }

    fn task_type(&self) -> &'static str {
        T::TYPE
    }

    fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
        self.handler.reply_routes()
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<&'static str, Arc<dyn DynHandler>>,
    routes: HashMap<u32, (ReplyRoute, &'static str)>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TaskKind, H: Handler<T>>(&mut self, handler: H) -> Result<(), RegistryError> {
        if self.handlers.contains_key(T::TYPE) {
            return Err(RegistryError::AlreadyRegistered(T::TYPE));
        }

        let routes = handler.reply_routes();
        for (msg_type, route) in &routes {
            if let Some((existing, owner)) = self.routes.get(msg_type)
                && !existing.compatible_with(route)
            {
                return Err(RegistryError::RouteConflict {
                    msg_type: *msg_type,
                    existing: *owner,
                    task_type: T::TYPE,
                });
            }
        }

        for (msg_type, route) in routes {
            self.routes.entry(msg_type).or_insert((route, T::TYPE));
        }
        self.handlers
            .insert(T::TYPE, Arc::new(TypedHandler::<T, H>::new(handler)));
        tracing::debug!(task_type = T::TYPE, "Registered task handler");
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Install every handler's reply routes on `bridge`.
    pub fn install_routes(&self, bridge: &GcBridge) -> Result<(), RegistryError> {
        for (msg_type, (route, owner)) in &self.routes {
            if !bridge.install_route(*msg_type, *route) {
                return Err(RegistryError::RouteConflict {
                    msg_type: *msg_type,
                    existing: "bridge",
                    task_type: *owner,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Echo {
        value: i64,
    }

    impl TaskKind for Echo {
        const TYPE: &'static str = "ECHO";
        type Output = serde_json::Value;

        fn validate(&self) -> Result<(), String> {
            if self.value < 0 {
                return Err("value must be non-negative".into());
            }
            Ok(())
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl Handler<Echo> for EchoHandler {
        async fn handle(&self, task: Echo, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
            Ok(json!({ "value": task.value, "task": ctx.task_id }))
        }

        fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
            vec![(1, ReplyRoute::Fifo)]
        }
    }

    #[derive(Debug, Deserialize)]
    struct Other;

    impl TaskKind for Other {
        const TYPE: &'static str = "OTHER";
        type Output = ();
    }

    struct KeyedOnOne;

    #[async_trait]
    impl Handler<Other> for KeyedOnOne {
        async fn handle(&self, _task: Other, _ctx: &TaskContext) -> Result<(), TaskError> {
            Ok(())
        }

        fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
            vec![(1, ReplyRoute::Keyed(|_| Ok(Vec::new())))]
        }
    }

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: 7,
            task_type: "ECHO".into(),
        }
    }

    #[tokio::test]
    async fn dispatches_typed_payload() {
        let mut registry = TaskRegistry::new();
        registry.register::<Echo, _>(EchoHandler).unwrap();

        let handler = registry.get("ECHO").unwrap();
        assert_eq!(handler.task_type(), "ECHO");
        let out = handler.handle_dyn(json!({ "value": 3 }), &ctx()).await.unwrap();
        assert_eq!(out, json!({ "value": 3, "task": 7 }));
    }

    #[tokio::test]
    async fn malformed_payload_is_validation_error() {
        let mut registry = TaskRegistry::new();
        registry.register::<Echo, _>(EchoHandler).unwrap();
        let handler = registry.get("ECHO").unwrap();

        let err = handler
            .handle_dyn(json!({ "value": "three" }), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));

        let err = handler
            .handle_dyn(json!({ "value": -1 }), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "validation failed: value must be non-negative");
    }

    #[test]
    fn duplicate_registration() {
        let mut registry = TaskRegistry::new();
        registry.register::<Echo, _>(EchoHandler).unwrap();
        assert_eq!(
            registry.register::<Echo, _>(EchoHandler),
            Err(RegistryError::AlreadyRegistered("ECHO"))
        );
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn conflicting_routes_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register::<Echo, _>(EchoHandler).unwrap();
        assert_eq!(
            registry.register::<Other, _>(KeyedOnOne),
            Err(RegistryError::RouteConflict {
                msg_type: 1,
                existing: "ECHO",
                task_type: "OTHER",
            })
        );
        assert_eq!(registry.task_types(), vec!["ECHO"]);
    }
}
