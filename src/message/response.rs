use crate::error::MappingError;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Abstract reply status. Each variant selects one of the reply modes of
/// [`Output`](crate::channel::Output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Redirect,
    Proxy,
    NotFound,
}

impl Status {
    /// Protocol status code. Total over the enum.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Redirect => 307,
            Status::Proxy => 305,
            Status::NotFound => 404,
        }
    }

    /// Reason phrase written on the status line.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Redirect => "Temporary Redirect",
            Status::Proxy => "Use Proxy",
            Status::NotFound => "Not Found",
        }
    }
}

impl TryFrom<u16> for Status {
    type Error = MappingError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(Status::Ok),
            307 => Ok(Status::Redirect),
            305 => Ok(Status::Proxy),
            404 => Ok(Status::NotFound),
            other => Err(MappingError::Status(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Body media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Json,
    Html,
    Css,
    Png,
    Javascript,
}

impl DataType {
    /// The `content-type` value this data type contributes.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            DataType::Json => "application/json; charset=utf-8",
            DataType::Html => "text/html; charset=utf-8",
            DataType::Css => "text/css; charset=utf-8",
            DataType::Png => "image/png",
            DataType::Javascript => "text/javascript; charset=utf-8",
        }
    }

    /// Fixed header set implied by this data type.
    #[must_use]
    pub fn headers(self) -> [(HeaderName, HeaderValue); 1] {
        [(CONTENT_TYPE, HeaderValue::from_static(self.content_type()))]
    }
}

impl FromStr for DataType {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DataType::Json),
            "html" => Ok(DataType::Html),
            "css" => Ok(DataType::Css),
            "png" => Ok(DataType::Png),
            "javascript" | "js" => Ok(DataType::Javascript),
            _ => Err(MappingError::DataType(s.to_string())),
        }
    }
}

/// A handler's reply.
///
/// The protocol status code and headers are pure functions of the declared
/// [`Status`] and [`DataType`]s, computed when the value is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: Status,
    data_type: Option<DataType>,
    headers: HeaderMap,
    body: Option<String>,
}

impl Response {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            data_type: None,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn ok(data_type: DataType) -> Self {
        Self::new(Status::Ok).with_data_type(data_type)
    }

    /// Redirect to `location`.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(Status::Redirect).with_body(location)
    }

    /// Ask the client to go through the proxy at `location`.
    #[must_use]
    pub fn proxy(location: impl Into<String>) -> Self {
        Self::new(Status::Proxy).with_body(location)
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(Status::NotFound)
    }

    /// An OK JSON reply carrying a list of error messages.
    #[must_use]
    pub fn error_list<S: AsRef<str>>(errors: &[S]) -> Self {
        let list: Vec<&str> = errors.iter().map(AsRef::as_ref).collect();
        let body = serde_json::Value::from(list).to_string();
        Self::ok(DataType::Json).with_body(body)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Declare a data type. Its headers are added to the existing set, so
    /// several data-type declarations accumulate instead of replacing each
    /// other.
    #[must_use]
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        for (name, value) in data_type.headers() {
            self.headers.append(name, value);
        }
        self.data_type = Some(data_type);
        self
    }

    /// Append an extra header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.code()
    }

    /// Most recently declared data type.
    #[inline]
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    #[inline]
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body text; empty when none was set.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    #[inline]
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// What a handler produced, tagged by kind.
///
/// The listener dispatches on this tag; there is no runtime type inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// A protocol response to deliver.
    Response(Response),
    /// The handler failed; the messages are reported to the client.
    Failed(Vec<String>),
    /// A result kind the receiving listener is not wired for.
    Unsupported(String),
}

impl From<Response> for EventResult {
    fn from(response: Response) -> Self {
        EventResult::Response(response)
    }
}

impl EventResult {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        EventResult::Failed(vec![message.into()])
    }

    /// Short kind name for logs.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            EventResult::Response(_) => "response",
            EventResult::Failed(_) => "failed",
            EventResult::Unsupported(kind) => kind,
        }
    }
}
