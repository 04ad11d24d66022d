//! Leaf handlers wired by the `brrtdispatch` binary.
//!
//! | prefix      | handler             |
//! |-------------|---------------------|
//! | `/version`  | [`VersionHandler`]  |
//! | `/login`    | [`LoginHandler`]    |
//! | default     | [`NotFoundHandler`] |

mod login;
mod not_found;
mod version;

pub use login::{LoginHandler, SESSIONS_TABLE, USERS_TABLE};
pub use not_found::NotFoundHandler;
pub use version::VersionHandler;

use crate::datastore::Datastore;
use crate::error::RegistryError;
use crate::router::Registry;
use std::sync::Arc;

/// Registry with the standard leaf handlers.
pub fn standard_registry(store: Arc<dyn Datastore>) -> Result<Registry, RegistryError> {
    Registry::builder()
        .default_handler(NotFoundHandler)
        .route("/version", VersionHandler::default())
        .route("/login", LoginHandler::new(store))
        .build()
}
