//! The view contract and the topic → view factory table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flare_pubsub::Broadcast;
use flare_render::Renderable;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::context::ViewContext;
use crate::errors::ViewError;

/// Join parameters as sent by the client.
pub type Params = Map<String, Value>;

/// Application state behind one joined topic.
///
/// Every callback runs on the owning connection's event loop, one at a time.
/// A slow callback stalls only its own connection; there is no per-call
/// timeout.
#[async_trait]
pub trait LiveView: Send {
    /// Initialize state from the join parameters.
    async fn mount(&mut self, params: &Params, ctx: &ViewContext) -> Result<(), ViewError>;

    /// Called right after a successful [`mount`](Self::mount) with the same
    /// parameters. A failure aborts the join.
    async fn handle_params(
        &mut self,
        _params: &Params,
        _ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        Ok(())
    }

    /// React to a client event.
    async fn handle_event(
        &mut self,
        event: &str,
        value: &Value,
        ctx: &ViewContext,
    ) -> Result<(), ViewError>;

    /// React to a message on a topic subscribed through the context.
    async fn handle_info(
        &mut self,
        _message: &Broadcast,
        _ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        Ok(())
    }

    /// Produce the current markup or tree.
    fn render(&self) -> Renderable;
}

/// Builds a fresh view for each join.
pub type ViewFactory = Arc<dyn Fn() -> Box<dyn LiveView> + Send + Sync>;

/// Joinable topics and the views behind them.
#[derive(Default)]
pub struct ViewRegistry {
    factories: RwLock<HashMap<String, ViewFactory>>,
}

impl ViewRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `topic` with views built by `factory`, replacing any previous
    /// registration.
    pub fn register<F, V>(&self, topic: impl Into<String>, factory: F)
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: LiveView + 'static,
    {
        let factory: ViewFactory = Arc::new(move || Box::new(factory()));
        let _ = self.factories.write().insert(topic.into(), factory);
    }

    /// Instantiate the view for `topic`.
    pub fn build(&self, topic: &str) -> Option<Box<dyn LiveView>> {
        let factory = self.factories.read().get(topic).cloned()?;
        Some(factory())
    }

    /// Whether `topic` can be joined.
    pub fn contains(&self, topic: &str) -> bool {
        self.factories.read().contains_key(topic)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.factories.read().keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

/// Checks the signed session token carried by a join.
pub trait SessionVerifier: Send + Sync {
    /// Accept or reject `token` for a join on `topic`. The error text is
    /// sent to the client.
    fn verify(&self, topic: &str, token: &str) -> Result<(), String>;
}

/// Verifier that accepts every token.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SessionVerifier for AcceptAll {
    fn verify(&self, _topic: &str, _token: &str) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Static(&'static str);

    #[async_trait]
    impl LiveView for Static {
        async fn mount(&mut self, _: &Params, _: &ViewContext) -> Result<(), ViewError> {
            Ok(())
        }

        async fn handle_event(
            &mut self,
            _: &str,
            _: &Value,
            _: &ViewContext,
        ) -> Result<(), ViewError> {
            Ok(())
        }

        fn render(&self) -> Renderable {
            self.0.into()
        }
    }

    #[test]
    fn build_registered_topic() {
        let registry = ViewRegistry::new();
        registry.register("hello", || Static("<p>hi</p>"));
        let view = registry.build("hello").unwrap();
        assert_eq!(view.render().into_node().render(), "<p>hi</p>");
    }

    #[test]
    fn unknown_topic_builds_nothing() {
        let registry = ViewRegistry::new();
        assert!(registry.build("nope").is_none());
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn register_replaces() {
        let registry = ViewRegistry::new();
        registry.register("t", || Static("a"));
        registry.register("t", || Static("b"));
        assert_eq!(registry.topics(), vec!["t".to_string()]);
        assert_eq!(registry.build("t").unwrap().render().into_node().render(), "b");
    }

    #[test]
    fn accept_all_accepts() {
        assert!(AcceptAll.verify("any", "").is_ok());
    }
}
