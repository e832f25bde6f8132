use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::RpcError;

pub type CapabilityFuture = BoxFuture<'static, Result<Value, RpcError>>;

/// A named operation one context exposes to the other.
pub trait Capability: Send + Sync {
    fn invoke(&self, args: Value) -> CapabilityFuture;
}

impl<F, Fut> Capability for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    fn invoke(&self, args: Value) -> CapabilityFuture {
        Box::pin((self)(args))
    }
}

/// Method name → handler. Built once per endpoint and handed to
/// [`RpcEndpoint::serve`](super::RpcEndpoint::serve).
#[derive(Clone)]
pub struct CapabilityTable {
    label: &'static str,
    handlers: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityTable {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handlers: HashMap::new(),
        }
    }

    pub fn with<C>(mut self, method: impl Into<String>, handler: C) -> Self
    where
        C: Capability + 'static,
    {
        self.insert(method, handler);
        self
    }

    /// Registers `handler`, replacing any previous handler for `method`.
    pub fn insert<C>(&mut self, method: impl Into<String>, handler: C)
    where
        C: Capability + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Capability>> {
        self.handlers.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Adapts `handler(state, args)` into a capability that hands every
/// invocation its own clone of `state`.
pub fn bind<S, F, Fut>(state: S, handler: F) -> impl Fn(Value) -> Fut + Send + Sync
where
    S: Clone + Send + Sync,
    F: Fn(S, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    move |args| handler(state.clone(), args)
}

/// Decode handler arguments, mapping failures to `InvalidParams`.
pub fn params<T: DeserializeOwned>(args: Value) -> Result<T, RpcError> {
    serde_json::from_value(args).map_err(|err| RpcError::InvalidParams(err.to_string()))
}

pub fn reply<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::Handler(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Echo {
        text: String,
    }

    #[tokio::test]
    async fn closures_are_capabilities() {
        let table = CapabilityTable::new("test")
            .with("echo", |args: Value| async move {
                let Echo { text } = params(args)?;
                reply(&text)
            })
            .with("nothing", |_args: Value| async move { Ok::<_, RpcError>(Value::Null) });

        assert_eq!(table.methods(), vec!["echo", "nothing"]);
        let handler = table.get("echo").expect("registered");
        assert_eq!(
            handler.invoke(json!({"text": "hi"})).await.unwrap(),
            json!("hi")
        );
        assert!(matches!(
            handler.invoke(json!({"wrong": 1})).await,
            Err(RpcError::InvalidParams(_))
        ));
        assert!(table.get("missing").is_none());
    }

    async fn greet(prefix: Arc<String>, args: Value) -> Result<Value, RpcError> {
        let name: String = params(args)?;
        reply(&format!("{prefix} {name}"))
    }

    #[tokio::test]
    async fn bound_handlers_share_state() {
        let table =
            CapabilityTable::new("test").with("greet", bind(Arc::new("hello".to_string()), greet));
        assert!(table.contains("greet"));
        let handler = table.get("greet").unwrap();
        assert_eq!(
            handler.invoke(json!("ada")).await.unwrap(),
            json!("hello ada")
        );
    }
}
