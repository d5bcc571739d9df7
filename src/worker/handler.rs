//! Operation Handlers
//!
//! A handler performs the actual work behind one task type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::tasks::{Options, Parameters, TaskError, TaskId};

/// Snapshot handed to a handler when a task runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub task_id: TaskId,
    pub task_type: String,
    pub options: Options,
    pub parameters: Parameters,
}

impl OperationRequest {
    /// Look up a parameter by key
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Look up a string parameter by key
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Performs the operation for one task type
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, request: OperationRequest) -> Result<Value, TaskError>;
}

/// Adapts an async closure into an [`OperationHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(OperationRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn handle(&self, request: OperationRequest) -> Result<Value, TaskError> {
        (self.f)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(parameters: Value) -> OperationRequest {
        OperationRequest {
            task_id: TaskId::new(),
            task_type: "codeholders/create".to_string(),
            options: Options::new(),
            parameters: match parameters {
                Value::Object(map) => map,
                _ => Parameters::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(|req: OperationRequest| async move {
            match req.param_str("name") {
                Some(name) if !name.is_empty() => Ok(json!({ "created": name })),
                _ => Err(TaskError::new("validation", "name is required")),
            }
        });

        let ok = handler.handle(request(json!({ "name": "Zamenhof" }))).await;
        assert_eq!(ok.unwrap(), json!({ "created": "Zamenhof" }));

        let err = handler.handle(request(json!({}))).await.unwrap_err();
        assert_eq!(err.code, "validation");
    }
}
