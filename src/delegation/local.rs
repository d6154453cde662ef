//! In-process dialer
//!
//! Resolves registry addresses to adapters living in the same process. Used
//! when the core and adapters share a runtime, and by the tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::{AdapterDialer, EngineAdapter};

#[derive(Clone, Default)]
pub struct LocalDialer {
    adapters: HashMap<String, Arc<dyn EngineAdapter>>,
}

impl LocalDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under `address`
    pub fn with_adapter(mut self, address: impl Into<String>, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.adapters.insert(address.into(), adapter);
        self
    }
}

impl AdapterDialer for LocalDialer {
    fn dial(&self, address: &str) -> Result<Arc<dyn EngineAdapter>> {
        self.adapters
            .get(address.trim())
            .cloned()
            .ok_or_else(|| Error::delegation(format!("no adapter listening at {}", address)))
    }
}
