//! Round-robin endpoint pool for judge requests.
//!
//! Escalation workloads usually run against several replicas of the same
//! judge model (multiple vLLM ports, or several gateway URLs). The pool owns
//! the rotation state behind one lock so that concurrent workers still get
//! strict round-robin dispatch. It is passed explicitly to the client rather
//! than held as process-wide state.

use std::sync::Mutex;

use tracing::info;

use crate::error::{Error, Result};

/// A host with one or more judge ports, expanded into per-port endpoints.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub host: String,
    pub ports: Vec<u16>,
}

impl ServerSpec {
    pub fn new(host: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            host: host.into(),
            ports,
        }
    }
}

/// Rotating set of judge base URLs.
pub struct EndpointPool {
    endpoints: Vec<String>,
    next: Mutex<usize>,
}

impl EndpointPool {
    /// Build a pool from explicit base URLs (e.g. `https://api.example.com/v1`).
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::config("endpoint pool requires at least one endpoint"));
        }
        info!("Initialized endpoint pool with {} endpoints", endpoints.len());
        for (idx, endpoint) in endpoints.iter().enumerate() {
            info!("  [{}] {}", idx, endpoint);
        }
        Ok(Self {
            endpoints,
            next: Mutex::new(0),
        })
    }

    /// Build a pool by fanning out `host:port` pairs into `http://host:port/v1`
    /// base URLs.
    pub fn from_servers(servers: &[ServerSpec]) -> Result<Self> {
        let endpoints: Vec<String> = servers
            .iter()
            .flat_map(|server| {
                server
                    .ports
                    .iter()
                    .map(|port| format!("http://{}:{}/v1", server.host, port))
                    .collect::<Vec<_>>()
            })
            .collect();
        Self::new(endpoints)
    }

    /// Next base URL, strictly round-robin even under concurrent callers.
    pub fn next_endpoint(&self) -> String {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let endpoint = self.endpoints[*next].clone();
        *next = (*next + 1) % self.endpoints.len();
        endpoint
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
