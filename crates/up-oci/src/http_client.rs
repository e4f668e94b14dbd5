use std::{
    sync::{LazyLock, PoisonError, RwLock},
    time::Duration,
};

use ureq::{
    http::{self, HeaderMap, Uri},
    typestate::{WithBody, WithoutBody},
    Agent, RequestBuilder,
};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub headers: Option<HeaderMap>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// User agent `upbound/up`, no extra headers and no timeout.
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("upbound/up ", env!("CARGO_PKG_VERSION")).into()),
            headers: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an agent that reports HTTP error statuses as responses so the
    /// registry client can inspect them (401 challenges, 404 on HEAD).
    pub fn build(&self) -> Agent {
        let mut config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

struct SharedClient {
    agent: Agent,
    config: ClientConfig,
}

static SHARED_CLIENT_STATE: LazyLock<RwLock<SharedClient>> = LazyLock::new(|| {
    let config = ClientConfig::default();
    RwLock::new(SharedClient {
        agent: config.build(),
        config,
    })
});

/// Handle to the process-wide HTTP agent.
#[derive(Clone, Default)]
pub struct SharedAgent;

macro_rules! request {
    ($name:ident, $body:ty) => {
        pub fn $name<T>(&self, uri: T) -> RequestBuilder<$body>
        where
            Uri: TryFrom<T>,
            <Uri as TryFrom<T>>::Error: Into<http::Error>,
        {
            let state = SHARED_CLIENT_STATE
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let req = state.agent.$name(uri);
            apply_headers(req, &state.config.headers)
        }
    };
}

impl SharedAgent {
    pub fn new() -> Self {
        Self
    }

    request!(head, WithoutBody);
    request!(get, WithoutBody);
    request!(post, WithBody);
    request!(put, WithBody);
}

fn apply_headers<B>(mut req: RequestBuilder<B>, headers: &Option<HeaderMap>) -> RequestBuilder<B> {
    if let Some(headers) = headers {
        for (key, value) in headers.iter() {
            req = req.header(key, value);
        }
    }
    req
}

pub static SHARED_AGENT: LazyLock<SharedAgent> = LazyLock::new(SharedAgent::new);

/// Updates the shared client configuration and rebuilds the agent.
///
/// ```
/// use std::time::Duration;
///
/// use up_oci::http_client::configure_http_client;
///
/// configure_http_client(|cfg| cfg.timeout = Some(Duration::from_secs(30)));
/// ```
pub fn configure_http_client<F>(updater: F)
where
    F: FnOnce(&mut ClientConfig),
{
    let mut state = SHARED_CLIENT_STATE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let mut new_config = state.config.clone();
    updater(&mut new_config);
    state.agent = new_config.build();
    state.config = new_config;
}
