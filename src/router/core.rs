//! Router core module - hot path for command resolution.
//!
//! Every inbound request passes through [`CommandRouter::identify_command`].
//! A resolution is computed once per distinct raw path and then served from
//! the concurrent cache.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]

use super::registry::{CommandKey, Registry};
use crate::dispatcher::EventHandler;
use crate::message::Request;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, trace};

/// Path segments held inline before spilling to the heap.
pub const MAX_INLINE_SEGMENTS: usize = 8;

const DELIMITER: char = '/';
const ROOT: &str = "/";

/// Resolves raw request paths to registered handlers by segment-wise
/// longest-prefix match.
///
/// The registry is read-only; only the resolution cache mutates. Two threads
/// missing the cache for the same path both compute the same key and both
/// insert it, which is harmless.
pub struct CommandRouter {
    registry: Registry,
    cache: DashMap<String, CommandKey>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        debug!(entries = registry.len(), "Command router created");
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of memoized resolutions.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a raw path to a registry key.
    ///
    /// - `None` resolves to [`CommandKey::Default`].
    /// - Otherwise the path is split on `/` with empty segments dropped, and
    ///   prefixes are tried from longest to shortest, keeping the input's
    ///   leading delimiter (or lack of one). A delimited path finally tries
    ///   the root `/`.
    /// - Nothing matching resolves to [`CommandKey::Default`].
    ///
    /// Matching is on whole segments: `/foo` never matches `/foobar`.
    #[must_use]
    pub fn identify_command(&self, path: Option<&str>) -> CommandKey {
        let Some(path) = path else {
            return CommandKey::Default;
        };

        if let Some(hit) = self.cache.get(path) {
            trace!(path = %path, command = %hit.value(), "Command cache hit");
            return hit.value().clone();
        }

        let key = self.resolve_uncached(path);
        debug!(path = %path, command = %key, "Command resolved");
        self.cache.insert(path.to_owned(), key.clone());
        key
    }

    /// Handler for a raw path. Never fails: unmatched paths get the default.
    #[must_use]
    pub fn get_event(&self, path: Option<&str>) -> Arc<dyn EventHandler> {
        let key = self.identify_command(path);
        Arc::clone(self.registry.resolve(&key))
    }

    /// Attach the resolved command to `request` and return its handler.
    #[must_use]
    pub fn route(&self, request: Request) -> (Request, Arc<dyn EventHandler>) {
        let key = self.identify_command(request.command_line());
        let handler = Arc::clone(self.registry.resolve(&key));
        (request.with_command(key), handler)
    }

    fn resolve_uncached(&self, path: &str) -> CommandKey {
        let delimited = path.starts_with(DELIMITER);
        let segments: SmallVec<[&str; MAX_INLINE_SEGMENTS]> = path
            .split(DELIMITER)
            .filter(|segment| !segment.is_empty())
            .collect();

        // For undelimited input the last candidate is the bare first segment,
        // which is how registrations such as `bar` are reached.
        let mut candidate = String::with_capacity(path.len() + 1);
        for len in (1..=segments.len()).rev() {
            candidate.clear();
            for (i, segment) in segments[..len].iter().enumerate() {
                if delimited || i > 0 {
                    candidate.push(DELIMITER);
                }
                candidate.push_str(segment);
            }
            if let Some(key) = self.registry.prefix_key(&candidate) {
                return key;
            }
        }

        if delimited {
            if let Some(key) = self.registry.prefix_key(ROOT) {
                return key;
            }
        }

        CommandKey::Default
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("registry", &self.registry)
            .field("cached", &self.cache.len())
            .finish()
    }
}
