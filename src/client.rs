use std::{fmt, io, time::Duration};

use rand::Rng;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    StatusCode,
};
use tokio::time::{sleep, Instant};

use crate::{
    headers::header_block,
    log,
    options::Resolved,
    payload::{data_to_s, IntoPayload},
    recode,
    transport::Transport,
    ClientOptions, Content, FetchError, Fetched, Method, Page, Payload, RateLimiter,
    RequestOptions,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Retrying HTTP client that recodes response bodies to UTF-8.
///
/// Calls take `&mut self`: one instance owns its transport and its rate
/// window, and serves one caller at a time. Use several clients for
/// parallel work.
pub struct FetchClient {
    options: ClientOptions,
    transport: Transport,
    limiter: Option<RateLimiter>,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("options", &self.options)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Request parts shared by every attempt of a logical call.
struct Prepared {
    headers: HeaderMap,
    body: Option<String>,
}

/// Failed attempt with the URL known at the time of failure.
struct Failure {
    error: FetchError,
    url: Option<String>,
}

impl Failure {
    fn new(error: FetchError, url: Option<String>) -> Self {
        Self { error, url }
    }
}

impl FetchClient {
    /// Creates a client with default options.
    pub fn new() -> Self {
        Self::with_client_options(ClientOptions::default())
    }

    /// Applies client options such as timeouts, retries and rate limiting.
    ///
    /// Rebuilds the transport, so cookies and the rate window start over.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.transport = Transport::new(&opts);
        self.limiter = RateLimiter::from_options(&opts);
        self.options = opts;
        self
    }

    fn with_client_options(options: ClientOptions) -> Self {
        Self {
            transport: Transport::new(&options),
            limiter: RateLimiter::from_options(&options),
            options,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether diagnostics go through `tracing`.
    pub fn log(&self) -> bool {
        self.options.logging
    }

    /// The admission gate, when `req_limit` and `req_time_range` are set.
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub async fn get(&mut self, url: &str, options: &RequestOptions) -> Fetched {
        self.execute(Method::Get, url, None, options, None).await
    }

    /// Like [`FetchClient::get`], running `hook` before blocking on the rate limit.
    pub async fn get_with_hook(
        &mut self,
        url: &str,
        options: &RequestOptions,
        hook: &mut (dyn FnMut() + Send),
    ) -> Fetched {
        self.execute(Method::Get, url, None, options, Some(hook)).await
    }

    /// Fetches headers only; the content is the raw header block.
    pub async fn head(&mut self, url: &str, options: &RequestOptions) -> Fetched {
        self.execute(Method::Head, url, None, options, None).await
    }

    pub async fn post(
        &mut self,
        url: &str,
        body: impl IntoPayload,
        options: &RequestOptions,
    ) -> Fetched {
        let body = body.into_payload();
        self.execute(Method::Post, url, Some(body), options, None).await
    }

    /// Like [`FetchClient::post`], running `hook` before blocking on the rate limit.
    pub async fn post_with_hook(
        &mut self,
        url: &str,
        body: impl IntoPayload,
        options: &RequestOptions,
        hook: &mut (dyn FnMut() + Send),
    ) -> Fetched {
        let body = body.into_payload();
        self.execute(Method::Post, url, Some(body), options, Some(hook)).await
    }

    pub async fn put(
        &mut self,
        url: &str,
        body: impl IntoPayload,
        options: &RequestOptions,
    ) -> Fetched {
        let body = body.into_payload();
        self.execute(Method::Put, url, Some(body), options, None).await
    }

    /// Sends a DELETE without a body.
    pub async fn delete(&mut self, url: &str, options: &RequestOptions) -> Fetched {
        self.execute(Method::Delete, url, None, options, None).await
    }

    pub async fn delete_with_body(
        &mut self,
        url: &str,
        body: impl IntoPayload,
        options: &RequestOptions,
    ) -> Fetched {
        let body = body.into_payload();
        self.execute(Method::Delete, url, Some(body), options, None).await
    }

    /// Runs one logical call of any supported method.
    pub async fn request<'h>(
        &mut self,
        method: Method,
        url: &str,
        body: Option<Payload>,
        options: &RequestOptions,
        hook: Option<&mut (dyn FnMut() + Send + 'h)>,
    ) -> Fetched {
        self.execute(method, url, body.map(Ok), options, hook).await
    }

    async fn execute<'h>(
        &mut self,
        method: Method,
        url: &str,
        body: Option<Result<Payload, FetchError>>,
        options: &RequestOptions,
        mut hook: Option<&mut (dyn FnMut() + Send + 'h)>,
    ) -> Fetched {
        let started = Instant::now();
        let resolved = options.resolve(&self.options);
        let logging = self.options.logging;

        let prepared = match body.transpose().and_then(|body| prepare(method, body, &resolved)) {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error(
                    logging,
                    &format!("{method} {url}: request not sent: {err}"),
                );
                return Fetched {
                    outcome: Err(err),
                    url: None,
                    elapsed: started.elapsed(),
                    attempts: 0,
                };
            }
        };

        let mut attempt = 0u32;
        let mut last_url = None;

        loop {
            attempt += 1;
            if let Some(limiter) = self.limiter.as_mut() {
                limiter.admit(hook.as_deref_mut()).await;
            }

            let failure = match self.attempt(method, url, &prepared, &resolved).await {
                Ok((page, final_url)) => {
                    if let Some(limiter) = self.limiter.as_mut() {
                        limiter.record();
                    }
                    log::debug(
                        logging,
                        &format!(
                            "{method} {url}: done in {:.6} secs ({attempt}/{} attempt{}, {}s/{}s connect/timeout)",
                            started.elapsed().as_secs_f64(),
                            resolved.attempts,
                            plural(attempt),
                            resolved.transport.connect_timeout.as_secs(),
                            resolved.timeout.as_secs(),
                        ),
                    );
                    return Fetched {
                        outcome: Ok(page),
                        url: Some(final_url),
                        elapsed: started.elapsed(),
                        attempts: attempt,
                    };
                }
                Err(failure) => failure,
            };

            if failure.url.is_some() {
                last_url = failure.url;
            }
            let err = failure.error;

            if matches!(err, FetchError::Interrupted(_)) {
                if resolved.ignore_interrupt {
                    log::info(
                        logging,
                        &format!("{method} {url}: {err}, reinitializing transport"),
                    );
                    self.transport.reset();
                    attempt -= 1;
                    continue;
                }
                log::error(logging, &format!("{method} {url}: aborted: {err}"));
                return Fetched {
                    outcome: Err(err),
                    url: last_url,
                    elapsed: started.elapsed(),
                    attempts: attempt,
                };
            }

            log::info(
                logging,
                &format!(
                    "{method} {url}: attempt {attempt}/{} failed: {err}",
                    resolved.attempts
                ),
            );

            let stop = err.is_usage_error()
                || (!resolved.retry_45 && err.is_client_or_server_status());
            if stop || attempt >= resolved.attempts {
                log::error(
                    logging,
                    &format!(
                        "{method} {url}: failed in {:.6} secs ({attempt} attempt{}, {}s/{}s connect/timeout), last error: {err}",
                        started.elapsed().as_secs_f64(),
                        plural(attempt),
                        resolved.transport.connect_timeout.as_secs(),
                        resolved.timeout.as_secs(),
                    ),
                );
                return Fetched {
                    outcome: Err(err),
                    url: last_url,
                    elapsed: started.elapsed(),
                    attempts: attempt,
                };
            }

            if resolved.retry_wait > 0 {
                sleep(retry_delay(resolved.retry_wait)).await;
            }
        }
    }

    /// Performs one transport call and classifies its outcome.
    async fn attempt(
        &mut self,
        method: Method,
        url: &str,
        prepared: &Prepared,
        resolved: &Resolved,
    ) -> Result<(Page, String), Failure> {
        let client = self
            .transport
            .client(resolved.transport)
            .map_err(|error| Failure::new(error, None))?;

        let mut request = client
            .request(method.into(), url)
            .headers(prepared.headers.clone())
            .timeout(resolved.timeout);
        if let Some((user, password)) = &resolved.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(body) = &prepared.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|err| {
            let url = err.url().map(ToString::to_string);
            Failure::new(classify_transport_error(err), url)
        })?;

        let final_url = response.url().to_string();
        let status = response.status();
        if !is_success_status(status) {
            return Err(Failure::new(
                FetchError::Status {
                    code: status.as_u16(),
                    line: status_line(status),
                },
                Some(final_url),
            ));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        if method == Method::Head {
            let page = Page {
                content_type,
                content: Content::Text(header_block(&response)),
            };
            return Ok((page, final_url));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) if err.is_timeout() || is_corrupt_body(&err) => {
                return Err(Failure::new(FetchError::Transport(err), Some(final_url)))
            }
            // Status line received but the body stream broke off.
            Err(err) => {
                return Err(Failure::new(
                    FetchError::Interrupted(err.to_string()),
                    Some(final_url),
                ))
            }
        };

        let mut content = body.to_vec();
        let recoded = recode(
            self.options.logging,
            content_type.as_deref(),
            &mut content,
            resolved.force_ignore,
            resolved.encoding.as_deref(),
        );
        let content = if recoded {
            match String::from_utf8(content) {
                Ok(text) => Content::Text(text),
                Err(err) => Content::Raw(err.into_bytes()),
            }
        } else {
            Content::Raw(content)
        };

        Ok((
            Page {
                content_type,
                content,
            },
            final_url,
        ))
    }
}

/// Builds the headers and body used by every attempt.
fn prepare(
    method: Method,
    body: Option<Payload>,
    resolved: &Resolved,
) -> Result<Prepared, FetchError> {
    let mut headers = HeaderMap::with_capacity(resolved.headers.len() + 2);
    for (name, value) in &resolved.headers {
        headers.insert(header_name(name)?, header_value(name, value)?);
    }

    if method.takes_content_type() {
        let content_type = resolved.content_type.as_deref().or_else(|| {
            body.as_ref()
                .filter(|body| body.is_form())
                .map(|_| FORM_CONTENT_TYPE)
        });
        if let Some(content_type) = content_type {
            headers.insert(
                header::CONTENT_TYPE,
                header_value(header::CONTENT_TYPE.as_str(), content_type)?,
            );
        }
    }

    // An explicit Cookie header keeps the jar out of this call.
    if let Some(cookies) = &resolved.cookies {
        headers.insert(header::COOKIE, header_value(header::COOKIE.as_str(), cookies)?);
    }

    let body = body.as_ref().map(data_to_s);
    let body = match method {
        Method::Post | Method::Put => Some(body.unwrap_or_default()),
        Method::Delete => body,
        Method::Get | Method::Head => None,
    };

    Ok(Prepared { headers, body })
}

fn header_name(name: &str) -> Result<HeaderName, FetchError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| FetchError::InvalidHeader {
        name: name.to_owned(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader {
        name: name.to_owned(),
    })
}

/// Codes starting with `20` or `30` succeed.
fn is_success_status(status: StatusCode) -> bool {
    matches!(status.as_u16() / 10, 20 | 30)
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_str()),
        None => status.as_str().to_owned(),
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if is_interrupted(&err) {
        FetchError::Interrupted(err.to_string())
    } else {
        FetchError::Transport(err)
    }
}

/// Looks for an interrupted or aborted I/O operation in the source chain.
fn is_interrupted(err: &(dyn std::error::Error + 'static)) -> bool {
    chain_has_io_error(err, |kind| {
        matches!(
            kind,
            io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
        )
    })
}

/// A body that arrived but could not be decoded, e.g. a corrupt gzip stream.
fn is_corrupt_body(err: &reqwest::Error) -> bool {
    err.is_decode() && chain_has_io_error(err, |kind| kind == io::ErrorKind::InvalidData)
}

fn chain_has_io_error(
    err: &(dyn std::error::Error + 'static),
    matches_kind: impl Fn(io::ErrorKind) -> bool,
) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        source = match current.downcast_ref::<io::Error>() {
            Some(io_err) => {
                if matches_kind(io_err.kind()) {
                    return true;
                }
                // io::Error::source skips the wrapped error itself.
                io_err
                    .get_ref()
                    .map(|inner| inner as &(dyn std::error::Error + 'static))
            }
            None => current.source(),
        };
    }
    false
}

/// Uniformly random whole seconds in `[1, bound]`.
fn retry_delay(bound: u64) -> Duration {
    Duration::from_secs(rand::rng().random_range(1..=bound))
}

fn plural(count: u32) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
