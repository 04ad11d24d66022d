use crate::channel::Protocol;
use crate::ids::RequestId;
use crate::router::CommandKey;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, HashSet};

/// Request parameters: name → set of values. Value order is irrelevant.
pub type Parameters = HashMap<String, HashSet<String>>;

/// An inbound request.
///
/// Built with [`RequestBuilder`] while the transport ingests the call. Once
/// built it is read-only; the router is the only component that attaches
/// anything afterwards (the resolved [`CommandKey`]), and it does so before
/// the request is published to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    request_id: RequestId,
    source: String,
    command: Option<CommandKey>,
    command_line: Option<String>,
    protocol: Protocol,
    headers: HeaderMap,
    parameters: Parameters,
}

impl Request {
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Origin address, e.g. `127.0.0.1:53412`.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolved routing key, `None` until the router has seen the request.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Option<&CommandKey> {
        self.command.as_ref()
    }

    /// Raw path as received, before routing.
    #[inline]
    #[must_use]
    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[inline]
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// First value of a header (case-insensitive), if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header in arrival order.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// All values of a parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&HashSet<String>> {
        self.parameters.get(name)
    }

    /// A single parameter value. With several values the lexically smallest
    /// one is returned so that the choice is stable.
    #[must_use]
    pub fn single_parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.iter().min())
            .map(String::as_str)
    }

    pub(crate) fn with_command(mut self, command: CommandKey) -> Self {
        self.command = Some(command);
        self
    }
}

/// Accumulates request fields during ingestion.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    #[must_use]
    pub fn new(protocol: Protocol) -> Self {
        Self {
            request: Request {
                request_id: RequestId::new(),
                source: String::new(),
                command: None,
                command_line: None,
                protocol,
                headers: HeaderMap::new(),
                parameters: Parameters::new(),
            },
        }
    }

    #[must_use]
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request.request_id = id;
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.request.source = source.into();
        self
    }

    #[must_use]
    pub fn command(mut self, command: CommandKey) -> Self {
        self.request.command = Some(command);
        self
    }

    #[must_use]
    pub fn command_line(mut self, path: impl Into<String>) -> Self {
        self.request.command_line = Some(path.into());
        self
    }

    /// Append a header value; earlier values for the same name are kept.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.headers.append(name, value);
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.request.headers = headers;
        self
    }

    /// Add one value to a parameter's value set.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .parameters
            .entry(name.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Replace all parameters.
    #[must_use]
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.request.parameters = parameters;
        self
    }

    #[must_use]
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, HOST};

    #[test]
    fn test_header_values_keep_arrival_order() {
        let req = RequestBuilder::new(Protocol::Get)
            .header(ACCEPT, HeaderValue::from_static("text/html"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(HOST, HeaderValue::from_static("example.org"))
            .build();

        let accept: Vec<&str> = req.header_values("accept").collect();
        assert_eq!(accept, vec!["text/html", "application/json"]);
        assert_eq!(req.header("Host"), Some("example.org"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn test_parameters_are_sets() {
        let req = RequestBuilder::new(Protocol::Post)
            .parameter("tag", "b")
            .parameter("tag", "a")
            .parameter("tag", "b")
            .build();

        assert_eq!(req.parameter("tag").map(HashSet::len), Some(2));
        assert_eq!(req.single_parameter("tag"), Some("a"));
        assert_eq!(req.single_parameter("nope"), None);
    }

    #[test]
    fn test_command_is_unset_until_routed() {
        let req = RequestBuilder::new(Protocol::Get).command_line("/a").build();
        assert!(req.command().is_none());
        let routed = req.with_command(CommandKey::prefix("/a"));
        assert_eq!(routed.command(), Some(&CommandKey::prefix("/a")));
    }
}
