/// Entity store configuration.
///
/// Controls the namespace used for keys built by fetch operations and how
/// binaries install their tracing subscriber.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Namespace applied to keys built from bare identifiers. `None` is the
    /// store's default namespace.
    pub namespace: Option<String>,
    /// `tracing-subscriber` env-filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Emit logs as JSON lines instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

impl StoreConfig {
    /// Returns a copy of this config scoped to `namespace`.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}
