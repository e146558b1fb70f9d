//! `pagefetch-http` is a resilient "fetch a page" layer on top of `reqwest`.
//!
//! A [`FetchClient`] runs each logical call as a bounded attempt loop with
//! optional request-rate admission control, then normalizes the response body
//! to UTF-8:
//! - [`FetchClient::get`]
//! - [`FetchClient::head`]
//! - [`FetchClient::post`], [`FetchClient::put`], [`FetchClient::delete`]
//!
//! Every call returns a [`Fetched`] record; failures are reported in it
//! instead of escaping as panics.

mod client;
mod error;
mod headers;
mod log;
mod options;
mod payload;
mod rate_limit;
mod recode;
mod transport;
mod types;

pub use client::FetchClient;
pub use error::FetchError;
pub use headers::{parse_headers, HeaderEntry, ParsedHeaders, STATUS_KEY};
pub use options::{ClientOptions, RequestOptions};
pub use payload::{data_to_s, IntoPayload, Payload};
pub use rate_limit::RateLimiter;
pub use recode::recode;
pub use types::{Content, Fetched, Method, Page};

pub type Result<T> = std::result::Result<T, FetchError>;
