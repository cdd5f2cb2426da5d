use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::executor::JobExecutor;

/// Job-type → executor table, populated at process start.
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn JobExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, executor: Arc<dyn JobExecutor>) {
        let mut registry = self.executors.write().await;
        registry.insert(executor.job_type().to_string(), executor);
    }

    pub async fn register_batch(&self, executors: Vec<Arc<dyn JobExecutor>>) {
        let mut registry = self.executors.write().await;
        for executor in executors {
            registry.insert(executor.job_type().to_string(), executor);
        }
    }

    pub async fn get(&self, job_type: &str) -> Option<Arc<dyn JobExecutor>> {
        let registry = self.executors.read().await;
        registry.get(job_type).cloned()
    }

    pub async fn contains(&self, job_type: &str) -> bool {
        let registry = self.executors.read().await;
        registry.contains_key(job_type)
    }

    pub async fn job_types(&self) -> Vec<String> {
        let registry = self.executors.read().await;
        let mut types: Vec<String> = registry.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn count(&self) -> usize {
        let registry = self.executors.read().await;
        registry.len()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
