use crate::dispatcher::EventHandler;
use crate::error::RegistryError;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Routing key a path resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKey {
    /// The entry registered under the null/empty key.
    Default,
    /// A registered path prefix, e.g. `/foo/bar` or `bar`. Case-sensitive.
    Prefix(Arc<str>),
}

impl CommandKey {
    #[must_use]
    pub fn prefix(prefix: &str) -> Self {
        CommandKey::Prefix(Arc::from(prefix))
    }

    /// Map a registration key to a command key. `None` and `""` both name
    /// the default entry.
    #[must_use]
    pub fn from_registration(key: Option<&str>) -> Self {
        match key {
            None | Some("") => CommandKey::Default,
            Some(prefix) => CommandKey::prefix(prefix),
        }
    }

    /// The prefix text, `None` for the default key.
    #[must_use]
    pub fn as_prefix(&self) -> Option<&str> {
        match self {
            CommandKey::Default => None,
            CommandKey::Prefix(p) => Some(p),
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, CommandKey::Default)
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKey::Default => f.write_str("<default>"),
            CommandKey::Prefix(p) => f.write_str(p),
        }
    }
}

impl Serialize for CommandKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CommandKey::Default => serializer.serialize_none(),
            CommandKey::Prefix(p) => serializer.serialize_some(p.as_ref()),
        }
    }
}

/// Immutable table of path-prefix → handler bindings.
///
/// A registry always has a default entry; [`RegistryBuilder::build`]
/// refuses to produce one without it.
#[derive(Clone)]
pub struct Registry {
    prefixes: HashMap<Arc<str>, Arc<dyn EventHandler>>,
    default: Arc<dyn EventHandler>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Key for `prefix` if it is registered. Reuses the stored key so the
    /// lookup does not allocate.
    pub(crate) fn prefix_key(&self, prefix: &str) -> Option<CommandKey> {
        self.prefixes
            .get_key_value(prefix)
            .map(|(k, _)| CommandKey::Prefix(Arc::clone(k)))
    }

    #[must_use]
    pub fn contains(&self, key: &CommandKey) -> bool {
        match key {
            CommandKey::Default => true,
            CommandKey::Prefix(p) => self.prefixes.contains_key(p.as_ref()),
        }
    }

    /// Handler registered under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CommandKey) -> Option<&Arc<dyn EventHandler>> {
        match key {
            CommandKey::Default => Some(&self.default),
            CommandKey::Prefix(p) => self.prefixes.get(p.as_ref()),
        }
    }

    /// Handler registered under `key`, falling back to the default entry.
    #[must_use]
    pub fn resolve(&self, key: &CommandKey) -> &Arc<dyn EventHandler> {
        self.get(key).unwrap_or(&self.default)
    }

    #[must_use]
    pub fn default_handler(&self) -> &Arc<dyn EventHandler> {
        &self.default
    }

    /// Number of entries, default included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len() + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Registered keys, sorted with the default first.
    #[must_use]
    pub fn keys(&self) -> Vec<CommandKey> {
        let mut prefixes: Vec<&Arc<str>> = self.prefixes.keys().collect();
        prefixes.sort();
        std::iter::once(CommandKey::Default)
            .chain(prefixes.into_iter().map(|p| CommandKey::Prefix(Arc::clone(p))))
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<(String, &str)> = self
            .keys()
            .into_iter()
            .map(|k| {
                let name = self.resolve(&k).name();
                (k.to_string(), name)
            })
            .collect();
        f.debug_struct("Registry").field("entries", &entries).finish()
    }
}

/// Collects bindings before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    prefixes: HashMap<Arc<str>, Arc<dyn EventHandler>>,
    default: Option<Arc<dyn EventHandler>>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    /// Register the default handler.
    #[must_use]
    pub fn default_handler<H: EventHandler + 'static>(self, handler: H) -> Self {
        self.route_shared(None, Arc::new(handler))
    }

    /// Register `handler` under `prefix`. An empty prefix registers the default.
    #[must_use]
    pub fn route<H: EventHandler + 'static>(self, prefix: &str, handler: H) -> Self {
        self.route_shared(Some(prefix), Arc::new(handler))
    }

    /// Register a shared handler under an optional key (`None` is the default).
    #[must_use]
    pub fn route_shared(mut self, key: Option<&str>, handler: Arc<dyn EventHandler>) -> Self {
        match CommandKey::from_registration(key) {
            CommandKey::Default => {
                if self.default.replace(handler).is_some() {
                    self.duplicates.push(CommandKey::Default.to_string());
                }
            }
            CommandKey::Prefix(prefix) => {
                if self.prefixes.contains_key(&prefix) {
                    self.duplicates.push(prefix.to_string());
                }
                self.prefixes.insert(prefix, handler);
            }
        }
        self
    }

    /// Freeze the bindings.
    ///
    /// # Errors
    ///
    /// [`RegistryError::MissingDefault`] without a default entry and
    /// [`RegistryError::Duplicate`] if a key was registered twice.
    pub fn build(self) -> Result<Registry, RegistryError> {
        if let Some(dup) = self.duplicates.into_iter().next() {
            return Err(RegistryError::Duplicate(dup));
        }
        let default = self.default.ok_or(RegistryError::MissingDefault)?;
        info!(
            entries = self.prefixes.len() + 1,
            default_handler = default.name(),
            "Registry built"
        );
        Ok(Registry {
            prefixes: self.prefixes,
            default,
        })
    }
}
