//! # Message Module
//!
//! Value types that travel through the dispatch core: the inbound
//! [`Request`], the handler's [`Response`] and the tagged [`EventResult`] a
//! handler hands to the result listener.
//!
//! Protocol status codes and headers are derived from the abstract
//! [`Status`] and [`DataType`] through pure mapping functions:
//!
//! | Status     | Code |
//! |------------|------|
//! | `Ok`       | 200  |
//! | `Redirect` | 307  |
//! | `Proxy`    | 305  |
//! | `NotFound` | 404  |

mod request;
mod response;

pub use request::{Parameters, Request, RequestBuilder};
pub use response::{DataType, EventResult, Response, Status};
