use std::{collections::HashMap, sync::Arc};

use reqwest::{cookie::Jar, redirect, Proxy};

use crate::{options::TransportSettings, ClientOptions, FetchError};

/// Owns the `reqwest` clients of one [`crate::FetchClient`].
///
/// Redirect policy, certificate verification and connect timeout are fixed
/// when a `reqwest::Client` is built, so one client is kept per combination
/// in use. All of them share the cookie jar.
pub(crate) struct Transport {
    user_agent: Option<String>,
    proxy: Option<String>,
    jar: Option<Arc<Jar>>,
    clients: HashMap<TransportSettings, reqwest::Client>,
}

impl Transport {
    pub(crate) fn new(options: &ClientOptions) -> Self {
        Self {
            user_agent: options.user_agent.clone(),
            proxy: options.http_proxy.clone(),
            jar: options.cookies.then(|| Arc::new(Jar::default())),
            clients: HashMap::new(),
        }
    }

    /// Returns the client for `settings`, building it on first use.
    pub(crate) fn client(
        &mut self,
        settings: TransportSettings,
    ) -> Result<reqwest::Client, FetchError> {
        if let Some(client) = self.clients.get(&settings) {
            return Ok(client.clone());
        }
        let client = self.build(settings).map_err(FetchError::Transport)?;
        self.clients.insert(settings, client.clone());
        Ok(client)
    }

    /// Drops every client so the next attempt starts on fresh connections.
    pub(crate) fn reset(&mut self) {
        self.clients.clear();
    }

    fn build(&self, settings: TransportSettings) -> reqwest::Result<reqwest::Client> {
        let redirect = if settings.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .redirect(redirect);

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }
        if let Some(jar) = &self.jar {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        builder.build()
    }
}
