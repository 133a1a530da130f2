//! Control modules: the targets of directives

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use warden_bus::HandlerError;

/// A component the command center can direct
#[async_trait]
pub trait ControlModule: Send + Sync + 'static {
    /// Run `command` and return its result
    async fn handle(&self, command: &str, payload: Value) -> Result<Value, HandlerError>;

    async fn health_check(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Commands this module understands; empty means "do not check"
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }
}

type CommandHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;
type HealthProbe = Arc<dyn Fn() -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A module assembled from named async handlers
///
/// ```no_run
/// use serde_json::{json, Value};
/// use warden_bus::HandlerError;
/// use warden_command::FnModule;
///
/// let module = FnModule::new()
///     .on("ping", |payload: Value| async move { Ok::<Value, HandlerError>(json!({"pong": payload})) });
/// ```
#[derive(Clone, Default)]
pub struct FnModule {
    handlers: BTreeMap<String, CommandHandler>,
    health: Option<HealthProbe>,
}

impl FnModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the handler for `command`
    pub fn on<F, Fut>(mut self, command: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let handler: CommandHandler = Arc::new(move |payload: Value| handler(payload).boxed());
        self.handlers.insert(command.into(), handler);
        self
    }

    pub fn with_health<F, Fut>(mut self, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let probe: HealthProbe = Arc::new(move || probe().boxed());
        self.health = Some(probe);
        self
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for FnModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModule")
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("health", &self.health.is_some())
            .finish()
    }
}

#[async_trait]
impl ControlModule for FnModule {
    async fn handle(&self, command: &str, payload: Value) -> Result<Value, HandlerError> {
        match self.handlers.get(command) {
            Some(handler) => handler(payload).await,
            None => Err(HandlerError(format!("unknown command '{}'", command))),
        }
    }

    async fn health_check(&self) -> Result<(), HandlerError> {
        match &self.health {
            Some(probe) => probe().await,
            None => Ok(()),
        }
    }

    fn capabilities(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_by_command() {
        let module = FnModule::new()
            .on("ping", |_| async { Ok::<Value, HandlerError>(json!("pong")) })
            .on("echo", |payload| async move { Ok::<Value, HandlerError>(payload) });

        assert_eq!(module.handle("ping", Value::Null).await.unwrap(), json!("pong"));
        assert_eq!(
            module.handle("echo", json!({"n": 1})).await.unwrap(),
            json!({"n": 1})
        );
        let err = module.handle("reboot", Value::Null).await.unwrap_err();
        assert_eq!(err.0, "unknown command 'reboot'");
        assert_eq!(module.capabilities(), vec!["echo", "ping"]);
    }

    #[tokio::test]
    async fn test_health_probe() {
        let module = FnModule::new();
        assert!(module.health_check().await.is_ok());

        let module = module.with_health(|| async { Err::<(), _>(HandlerError::new("disk full")) });
        assert_eq!(module.health_check().await.unwrap_err().0, "disk full");
    }
}
