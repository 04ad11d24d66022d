use crate::datastore::{ColumnKind, ColumnSpec, Datastore, Row};
use crate::dispatcher::EventHandler;
use crate::error::DatastoreError;
use crate::message::{DataType, EventResult, Request, Response};
use anyhow::Context;
use http::HeaderValue;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use ulid::Ulid;

pub const USERS_TABLE: &str = "users";
pub const SESSIONS_TABLE: &str = "sessions";

/// Checks `user`/`password` parameters against the users table and issues
/// an opaque session token.
///
/// With a `redirect` parameter a successful login answers with a redirect
/// to that location instead of the token body.
pub struct LoginHandler {
    store: Arc<dyn Datastore>,
}

impl LoginHandler {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Create the users and sessions tables if missing.
    pub fn ensure_schema(store: &dyn Datastore) -> Result<(), DatastoreError> {
        if !store.table_exists(USERS_TABLE) {
            store.create_table(
                USERS_TABLE,
                &["user"],
                &[
                    ColumnSpec::new("user", ColumnKind::Text),
                    ColumnSpec::new("password", ColumnKind::Text),
                ],
            )?;
        }
        if !store.table_exists(SESSIONS_TABLE) {
            store.create_table(
                SESSIONS_TABLE,
                &["token"],
                &[
                    ColumnSpec::new("token", ColumnKind::Text),
                    ColumnSpec::new("user", ColumnKind::Text),
                    ColumnSpec::new("issued_ms", ColumnKind::Integer),
                ],
            )?;
        }
        Ok(())
    }

    pub fn register_user(
        store: &dyn Datastore,
        user: &str,
        password: &str,
    ) -> Result<(), DatastoreError> {
        store.add_row(
            USERS_TABLE,
            Row::from([
                ("user".to_string(), json!(user)),
                ("password".to_string(), json!(password)),
            ]),
        )?;
        info!(user, "User registered");
        Ok(())
    }

    fn issue_token(&self, user: &str) -> anyhow::Result<String> {
        let token = Ulid::new().to_string();
        let issued_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.store
            .add_row(
                SESSIONS_TABLE,
                Row::from([
                    ("token".to_string(), json!(token)),
                    ("user".to_string(), json!(user)),
                    ("issued_ms".to_string(), json!(issued_ms)),
                ]),
            )
            .context("failed to store session")?;
        Ok(token)
    }
}

impl EventHandler for LoginHandler {
    fn handle(&self, request: &Request) -> anyhow::Result<EventResult> {
        let (Some(user), Some(password)) = (
            request.single_parameter("user"),
            request.single_parameter("password"),
        ) else {
            return Ok(EventResult::failed("user and password are required"));
        };

        let stored = self
            .store
            .get_row(
                USERS_TABLE,
                &["password"],
                &Row::from([("user".to_string(), json!(user))]),
            )
            .context("failed to look up user")?;

        let matches = stored
            .as_ref()
            .and_then(|row| row.get("password"))
            .and_then(Value::as_str)
            == Some(password);
        if !matches {
            debug!(request_id = %request.request_id(), user, "Login rejected");
            return Ok(EventResult::failed("invalid credentials"));
        }

        // Becomes a Location header on HTTP transports.
        let redirect = request.single_parameter("redirect");
        if let Some(target) = redirect.filter(|t| HeaderValue::from_str(t).is_err()) {
            debug!(request_id = %request.request_id(), target, "Redirect target refused");
            return Ok(EventResult::failed("invalid redirect target"));
        }

        let token = self.issue_token(user)?;
        info!(request_id = %request.request_id(), user, "Login accepted");

        if let Some(target) = redirect {
            return Ok(Response::redirect(target).into());
        }
        Ok(Response::ok(DataType::Json)
            .with_body(json!({ "user": user, "token": token }).to_string())
            .into())
    }

    fn name(&self) -> &str {
        "login"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Protocol;
    use crate::datastore::MemoryDatastore;
    use crate::message::{RequestBuilder, Status};

    fn handler() -> LoginHandler {
        let store = Arc::new(MemoryDatastore::new());
        store.start().unwrap();
        LoginHandler::ensure_schema(store.as_ref()).unwrap();
        LoginHandler::register_user(store.as_ref(), "ann", "s3cret").unwrap();
        LoginHandler::new(store)
    }

    fn login(user: &str, password: &str) -> Request {
        RequestBuilder::new(Protocol::Post)
            .command_line("/login")
            .parameter("user", user)
            .parameter("password", password)
            .build()
    }

    #[test]
    fn test_login_issues_token() {
        let EventResult::Response(response) = handler().handle(&login("ann", "s3cret")).unwrap()
        else {
            panic!("expected a response");
        };
        let body: Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["user"], "ann");
        assert_eq!(body["token"].as_str().map(str::len), Some(26));
    }

    #[test]
    fn test_wrong_password_fails() {
        let result = handler().handle(&login("ann", "nope")).unwrap();
        assert_eq!(result, EventResult::failed("invalid credentials"));
        let result = handler().handle(&login("zed", "s3cret")).unwrap();
        assert_eq!(result, EventResult::failed("invalid credentials"));
    }

    #[test]
    fn test_missing_parameters_fail() {
        let req = RequestBuilder::new(Protocol::Post).parameter("user", "ann").build();
        assert!(matches!(handler().handle(&req).unwrap(), EventResult::Failed(_)));
    }

    #[test]
    fn test_redirect_after_login() {
        let req = RequestBuilder::new(Protocol::Post)
            .parameter("user", "ann")
            .parameter("password", "s3cret")
            .parameter("redirect", "/home")
            .build();
        let EventResult::Response(response) = handler().handle(&req).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(response.status(), Status::Redirect);
        assert_eq!(response.body(), "/home");
    }

    #[test]
    fn test_redirect_with_line_break_is_refused() {
        let req = RequestBuilder::new(Protocol::Get)
            .parameter("user", "ann")
            .parameter("password", "s3cret")
            .parameter("redirect", "/home\r\nSet-Cookie: session=evil")
            .build();
        assert_eq!(
            handler().handle(&req).unwrap(),
            EventResult::failed("invalid redirect target")
        );
    }

    #[test]
    fn test_schema_is_idempotent() {
        let store = MemoryDatastore::new();
        store.start().unwrap();
        LoginHandler::ensure_schema(&store).unwrap();
        LoginHandler::ensure_schema(&store).unwrap();
        assert!(store.table_exists(SESSIONS_TABLE));
    }
}
