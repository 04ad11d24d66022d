use crate::dispatcher::EventHandler;
use crate::message::{DataType, EventResult, Request, Response};

/// Default entry: answers every unmatched path with 404 and a JSON error list.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFoundHandler;

impl EventHandler for NotFoundHandler {
    fn handle(&self, request: &Request) -> anyhow::Result<EventResult> {
        let path = request.command_line().unwrap_or("<none>");
        let body = serde_json::json!([format!("no handler for {path}")]).to_string();
        Ok(Response::not_found()
            .with_data_type(DataType::Json)
            .with_body(body)
            .into())
    }

    fn name(&self) -> &str {
        "not_found"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Protocol;
    use crate::message::{RequestBuilder, Status};

    #[test]
    fn test_not_found_names_path() {
        let req = RequestBuilder::new(Protocol::Get).command_line("/nope").build();
        let EventResult::Response(response) = NotFoundHandler.handle(&req).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.body(), r#"["no handler for /nope"]"#);
        assert_eq!(response.data_type(), Some(DataType::Json));
    }
}
