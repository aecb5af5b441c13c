use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use scheduler_domain::JobHandler;

/// 按作业类型名查找处理器
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册处理器，同名处理器会被替换
    pub async fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let mut registry = self.handlers.write().await;
        if registry.insert(job_type.clone(), handler).is_some() {
            warn!("作业类型 {} 的处理器已被替换", job_type);
        } else {
            debug!("注册作业类型处理器: {}", job_type);
        }
    }

    pub async fn register_batch(&self, handlers: Vec<(String, Arc<dyn JobHandler>)>) {
        let mut registry = self.handlers.write().await;
        for (job_type, handler) in handlers {
            registry.insert(job_type, handler);
        }
    }

    pub async fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        let registry = self.handlers.read().await;
        registry.get(job_type).cloned()
    }

    pub async fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().await.contains_key(job_type)
    }

    pub async fn list_job_types(&self) -> Vec<String> {
        let registry = self.handlers.read().await;
        let mut types: Vec<String> = registry.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn unregister(&self, job_type: &str) -> bool {
        let mut registry = self.handlers.write().await;
        registry.remove(job_type).is_some()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
