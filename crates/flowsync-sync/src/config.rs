//! Configuration for replicas, clients and the document server.

/// Client-side reconciliation settings.
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Coalesce repeated edits of one field while a batch is in flight.
    pub compact_batches: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            compact_batches: true,
        }
    }
}

/// Configuration for a [`crate::SyncClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Document to open on start.
    pub path: String,
    pub replica: ReplicaConfig,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: "untitled".to_string(),
            replica: ReplicaConfig::default(),
            event_capacity: 64,
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn compact_batches(mut self, enabled: bool) -> Self {
        self.config.replica.compact_batches = enabled;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the document server.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Number of accepted batches kept per document for rebasing stale
    /// submissions. Older clients must resync.
    pub history_limit: usize,
    /// Start newly opened documents from the starter pipeline instead of
    /// an empty graph.
    pub seed_demo: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            history_limit: 1024,
            seed_demo: true,
        }
    }
}

/// Builder for server configuration.
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
        }
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn seed_demo(mut self, enabled: bool) -> Self {
        self.config.seed_demo = enabled;
        self
    }

    pub fn build(self) -> HostConfig {
        self.config
    }
}

impl Default for HostConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
