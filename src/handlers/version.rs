use crate::dispatcher::EventHandler;
use crate::message::{DataType, EventResult, Request, Response};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// Reports the crate name and version as JSON.
#[derive(Debug)]
pub struct VersionHandler {
    body: String,
}

impl Default for VersionHandler {
    fn default() -> Self {
        let info = VersionInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        };
        // Two string fields; serializing cannot fail.
        let body = serde_json::to_string(&info).unwrap_or_default();
        Self { body }
    }
}

impl EventHandler for VersionHandler {
    fn handle(&self, _request: &Request) -> anyhow::Result<EventResult> {
        Ok(Response::ok(DataType::Json).with_body(self.body.clone()).into())
    }

    fn name(&self) -> &str {
        "version"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Protocol;
    use crate::message::RequestBuilder;

    #[test]
    fn test_version_body() {
        let result = VersionHandler::default()
            .handle(&RequestBuilder::new(Protocol::Get).build())
            .unwrap();
        let EventResult::Response(response) = result else {
            panic!("expected a response");
        };
        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["name"], "brrtdispatch");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
