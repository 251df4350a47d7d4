use std::path::Path;

use tracing::{info, warn};

use crate::error::{ConfigError, RegistryError};
use crate::types::EndpointId;

/// Key prefix marking a channel entry in an env file.
pub const CHANNEL_PREFIX: &str = "CHANNEL_";

/// Channels to deliver to, with the message for each.
///
/// Iteration follows insertion order, which is the order sends are
/// attempted in. Inserting an id that is already present replaces its
/// message without moving it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(EndpointId, String)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(id, message)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut registry = Self::new();
        for (id, message) in pairs {
            registry.insert(EndpointId(id.into()), message)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, endpoint_id: EndpointId, message: impl Into<String>) -> Result<(), RegistryError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(RegistryError::EmptyMessage { endpoint_id: endpoint_id.0 });
        }

        match self.entries.iter_mut().find(|(id, _)| id == &endpoint_id) {
            Some((_, existing)) => *existing = message,
            None => self.entries.push((endpoint_id, message)),
        }
        Ok(())
    }

    pub fn get(&self, endpoint_id: &EndpointId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| id == endpoint_id)
            .map(|(_, message)| message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointId, &str)> {
        self.entries.iter().map(|(id, message)| (id, message.as_str()))
    }

    pub fn ids(&self) -> Vec<EndpointId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a registry from `CHANNEL_<id>=<message>` variables.
///
/// Keys without the prefix are ignored. Entries with an empty id or an
/// empty message are skipped with a warning instead of failing the load,
/// so one bad line does not block every other channel.
pub fn from_env_vars<I, K, V>(vars: I) -> Registry
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut registry = Registry::new();
    for (key, value) in vars {
        let Some(id) = key.as_ref().strip_prefix(CHANNEL_PREFIX) else {
            continue;
        };
        if id.is_empty() {
            warn!(key = key.as_ref(), "skipping channel entry without an id");
            continue;
        }
        if let Err(err) = registry.insert(EndpointId::new(id), value) {
            warn!(error = %err, "skipping channel entry");
        }
    }
    registry
}

/// Load a registry from a dotenv file, preserving the file's order.
pub fn load_from_env_file(path: impl AsRef<Path>) -> Result<Registry, ConfigError> {
    let path = path.as_ref();
    let env_file_error = |err: dotenvy::Error| ConfigError::EnvFile {
        path: path.display().to_string(),
        message: err.to_string(),
    };

    let mut vars = Vec::new();
    for item in dotenvy::from_path_iter(path).map_err(env_file_error)? {
        vars.push(item.map_err(env_file_error)?);
    }

    let registry = from_env_vars(vars);
    info!(
        path = %path.display(),
        channels = ?registry.ids().iter().map(EndpointId::as_str).collect::<Vec<_>>(),
        "loaded channel registry"
    );
    Ok(registry)
}
