use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;

/// Client-level defaults for transport setup, retries and rate limiting.
///
/// Deserializable with every field optional, so an embedding application can
/// keep these in its own JSON/TOML configuration. Durations are whole seconds.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Emit diagnostics through `tracing`; otherwise only warnings and errors
    /// are written to stderr.
    pub logging: bool,
    /// User agent string; `None` keeps the transport default.
    pub user_agent: Option<String>,
    /// HTTP proxy URL for every request of this client.
    pub http_proxy: Option<String>,
    /// Keep a cookie jar across calls.
    pub cookies: bool,
    /// Follow `Location` on 3xx responses.
    pub follow_redirects: bool,
    /// Verify TLS certificates.
    pub verify_tls: bool,
    /// Connection establishment timeout in seconds.
    pub connect_timeout: u64,
    /// Overall per-attempt timeout in seconds.
    pub timeout: u64,
    /// Number of attempts per logical call.
    pub attempts: u32,
    /// Upper bound in seconds of the random pause between attempts; 0 disables it.
    pub retry_wait: u64,
    /// Successful requests allowed per `req_time_range`.
    pub req_limit: Option<u32>,
    /// Rate limit window in seconds.
    pub req_time_range: Option<u64>,
    /// Retry on 4xx/5xx responses.
    pub retry_45: bool,
    /// Reinitialize the transport and retry after an interrupted transfer.
    pub ignore_interrupt: bool,
    /// Headers sent with every request unless a call supplies its own set.
    pub headers: BTreeMap<String, String>,
    /// Forced response encoding.
    pub encoding: Option<String>,
    /// Replace undecodable bytes instead of failing the recode.
    pub force_ignore: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            logging: true,
            user_agent: None,
            http_proxy: None,
            cookies: false,
            follow_redirects: true,
            verify_tls: true,
            connect_timeout: 10,
            timeout: 20,
            attempts: 3,
            retry_wait: 0,
            req_limit: None,
            req_time_range: None,
            retry_45: true,
            ignore_interrupt: false,
            headers: BTreeMap::new(),
            encoding: None,
            force_ignore: false,
        }
    }
}

/// Per-call overrides; unset fields fall back to [`ClientOptions`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestOptions {
    /// Replaces the client header set for this call.
    pub headers: Option<BTreeMap<String, String>>,
    /// Raw `Cookie` header value; replaces the jar for this call.
    pub cookies: Option<String>,
    /// Basic auth user name.
    pub user: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Content type for POST/PUT/DELETE bodies.
    pub content_type: Option<String>,
    pub follow_redirects: Option<bool>,
    pub verify_tls: Option<bool>,
    pub connect_timeout: Option<u64>,
    pub timeout: Option<u64>,
    pub attempts: Option<u32>,
    pub retry_wait: Option<u64>,
    pub encoding: Option<String>,
    pub force_ignore: Option<bool>,
    pub retry_45: Option<bool>,
    pub ignore_interrupt: Option<bool>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = Some(verify);
        self
    }

    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn retry_wait(mut self, seconds: u64) -> Self {
        self.retry_wait = Some(seconds);
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn force_ignore(mut self, ignore: bool) -> Self {
        self.force_ignore = Some(ignore);
        self
    }

    pub fn retry_45(mut self, retry: bool) -> Self {
        self.retry_45 = Some(retry);
        self
    }

    pub fn ignore_interrupt(mut self, ignore: bool) -> Self {
        self.ignore_interrupt = Some(ignore);
        self
    }

    /// Merges these overrides over `defaults` without touching either.
    pub(crate) fn resolve(&self, defaults: &ClientOptions) -> Resolved {
        Resolved {
            headers: self
                .headers
                .clone()
                .unwrap_or_else(|| defaults.headers.clone()),
            cookies: self.cookies.clone(),
            credentials: self
                .user
                .clone()
                .map(|user| (user, self.password.clone())),
            content_type: self.content_type.clone(),
            transport: TransportSettings {
                follow_redirects: self.follow_redirects.unwrap_or(defaults.follow_redirects),
                verify_tls: self.verify_tls.unwrap_or(defaults.verify_tls),
                connect_timeout: Duration::from_secs(
                    self.connect_timeout.unwrap_or(defaults.connect_timeout),
                ),
            },
            timeout: Duration::from_secs(self.timeout.unwrap_or(defaults.timeout)),
            attempts: self.attempts.unwrap_or(defaults.attempts).max(1),
            retry_wait: self.retry_wait.unwrap_or(defaults.retry_wait),
            encoding: self.encoding.clone().or_else(|| defaults.encoding.clone()),
            force_ignore: self.force_ignore.unwrap_or(defaults.force_ignore),
            retry_45: self.retry_45.unwrap_or(defaults.retry_45),
            ignore_interrupt: self.ignore_interrupt.unwrap_or(defaults.ignore_interrupt),
        }
    }
}

/// Settings fixed when a `reqwest::Client` is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct TransportSettings {
    pub follow_redirects: bool,
    pub verify_tls: bool,
    pub connect_timeout: Duration,
}

/// Effective options of one logical call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Resolved {
    pub headers: BTreeMap<String, String>,
    pub cookies: Option<String>,
    pub credentials: Option<(String, Option<String>)>,
    pub content_type: Option<String>,
    pub transport: TransportSettings,
    pub timeout: Duration,
    pub attempts: u32,
    pub retry_wait: u64,
    pub encoding: Option<String>,
    pub force_ignore: bool,
    pub retry_45: bool,
    pub ignore_interrupt: bool,
}
