//! Registry of effect controllers keyed by id
//!
//! Each id maps to at most one controller for the registry's lifetime (until
//! removed). Controllers are created lazily through the registry's factory.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use crate::pipeline::EffectController;

type ControllerFactory = dyn Fn(&str) -> EffectController + Send + Sync;

pub struct ControllerRegistry {
    factory: Box<ControllerFactory>,
    controllers: Mutex<HashMap<String, Arc<EffectController>>>,
}

impl ControllerRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> EffectController + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// The controller for `id`, created on first use
    pub async fn get_or_create(&self, id: &str) -> Arc<EffectController> {
        let mut controllers = self.controllers.lock().await;
        if let Some(controller) = controllers.get(id) {
            return controller.clone();
        }
        info!("Creating effect controller '{id}'");
        let controller = Arc::new((self.factory)(id));
        controllers.insert(id.to_string(), controller.clone());
        controller
    }

    pub async fn get(&self, id: &str) -> Option<Arc<EffectController>> {
        self.controllers.lock().await.get(id).cloned()
    }

    /// Disable and forget the controller for `id`
    pub async fn remove(&self, id: &str) -> Option<Arc<EffectController>> {
        let removed = self.controllers.lock().await.remove(id);
        if let Some(controller) = &removed {
            controller.disable().await;
        }
        removed
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Disable every controller, keeping the registrations
    pub async fn shutdown_all(&self) {
        let controllers: Vec<_> = self.controllers.lock().await.values().cloned().collect();
        for controller in controllers {
            controller.disable().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StaticSource;
    use crate::config::Settings;
    use crate::effects::{BlurLevel, EffectConfig};
    use crate::pipeline::VideoFrame;
    use crate::segmentation::testing::FakeFactory;

    fn registry() -> ControllerRegistry {
        ControllerRegistry::new(|_| {
            let settings = Settings::default().with_tick_interval(std::time::Duration::from_secs(3600));
            EffectController::new(Arc::new(FakeFactory::new()), settings)
        })
    }

    #[tokio::test]
    async fn test_one_controller_per_id() {
        let registry = registry();
        let a = registry.get_or_create("local").await;
        let b = registry.get_or_create("local").await;
        let c = registry.get_or_create("remote").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.ids().await, vec!["local", "remote"]);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_shutdown_disable_controllers() {
        let registry = registry();
        let source = Arc::new(StaticSource::new(VideoFrame::solid(8, 8, [0, 0, 0, 255])));

        let a = registry.get_or_create("a").await;
        let b = registry.get_or_create("b").await;
        let config = EffectConfig::blur(source, 8, 8, BlurLevel::Low);
        a.reconfigure(config.clone()).await.unwrap();
        b.reconfigure(config).await.unwrap();

        registry.shutdown_all().await;
        assert!(a.state().await.is_idle());
        assert!(b.state().await.is_idle());
        assert_eq!(registry.ids().await.len(), 2);

        let removed = registry.remove("a").await.unwrap();
        assert!(Arc::ptr_eq(&removed, &a));
        assert_eq!(registry.ids().await, vec!["b"]);
        let fresh = registry.get_or_create("a").await;
        assert!(!Arc::ptr_eq(&fresh, &a));
    }
}
