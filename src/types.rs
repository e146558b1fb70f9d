use std::{fmt, time::Duration};

use crate::FetchError;

/// Request methods supported by [`crate::FetchClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a content-type override applies to this method.
    pub(crate) fn takes_content_type(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Response content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// UTF-8 text: the recoded body, or the raw header block of a HEAD call.
    Text(String),
    /// Original body bytes, kept when recoding failed.
    Raw(Vec<u8>),
}

impl Content {
    /// Returns the text, if the content was recoded.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw(bytes) => bytes,
        }
    }
}

/// Successful response of a logical call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub content_type: Option<String>,
    pub content: Content,
}

/// Result of one logical call.
///
/// `outcome` holds either the page or the last error; the effective URL and
/// elapsed time are reported in both cases.
#[derive(Debug)]
pub struct Fetched {
    pub outcome: Result<Page, FetchError>,
    /// Final URL after redirects, or the last known one. `None` if no
    /// transport call was made.
    pub url: Option<String>,
    pub elapsed: Duration,
    /// Attempts consumed, interrupted re-issues excluded.
    pub attempts: u32,
}

impl Fetched {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn page(&self) -> Option<&Page> {
        self.outcome.as_ref().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.page()?.content_type.as_deref()
    }

    /// Body text of a successful, recoded response.
    pub fn text(&self) -> Option<&str> {
        self.page()?.content.as_text()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }

    /// Error message of a failed call.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// Elapsed time formatted as seconds with microsecond precision.
    pub fn elapsed_secs(&self) -> String {
        format!("{:.6}", self.elapsed.as_secs_f64())
    }
}
