//! etcd v2 keys API implementation.
//!
//! Maps the [`RemoteStore`] contract onto `/v2/keys` requests:
//!
//! - read: `GET {endpoint}/v2/keys{prefix}?recursive=true`
//! - write: `PUT {endpoint}/v2/keys{key}` with a `value` form field
//! - watch: `GET {endpoint}/v2/keys{prefix}?wait=true&recursive=true&waitIndex=N`
//!
//! Requests go to the last endpoint that answered; on a transport failure
//! the next endpoint is tried, and only when every endpoint fails is the
//! request reported as [`StoreError::Unavailable`].

use crate::backend::{RemoteStore, Watcher};
use crate::error::{StoreError, StoreResult, CODE_EVENT_INDEX_CLEARED};
use crate::http::{Credentials, HttpClient, HttpRequest, HttpResponse, Method};
use crate::types::{ChangeAction, ChangeEvent, Entry, Subtree, WriteResponse};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Time allowed for a non-watch request to answer.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(60);

const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";

/// Configuration for an etcd v2 cluster connection.
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// Cluster endpoints (e.g., `http://127.0.0.1:2379`).
    pub endpoints: Vec<String>,
    /// Basic-auth credentials.
    pub credentials: Option<Credentials>,
    /// Time allowed for a read or write to answer. Watches are unbounded.
    pub header_timeout: Duration,
}

impl EtcdConfig {
    /// Creates a configuration for the given endpoints.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(Into::into)
                .map(|endpoint: String| endpoint.trim().trim_end_matches('/').to_string())
                .filter(|endpoint| !endpoint.is_empty())
                .collect(),
            credentials: None,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }

    /// Sets basic-auth credentials. An empty user name disables auth.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = if username.is_empty() {
            None
        } else {
            Some(Credentials::new(username, password))
        };
        self
    }

    /// Sets the per-request header timeout.
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }
}

/// Body of a successful keys response.
#[derive(Debug, Deserialize)]
struct KeysResponse {
    action: String,
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(rename = "modifiedIndex", default)]
    modified_index: u64,
}

/// Body of an error response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorCode")]
    error_code: u32,
    message: String,
    #[serde(default)]
    index: u64,
}

/// Builds the `/v2/keys` URL for `key`, percent-encoding each segment.
fn keys_url(endpoint: &str, key: &str) -> String {
    let segments = key.split('/').filter(|segment| !segment.is_empty());
    match Url::parse(endpoint) {
        Ok(mut url) if !url.cannot_be_a_base() => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(["v2", "keys"]).extend(segments);
            }
            url.into()
        }
        // Unparseable endpoint: the transport reports it.
        _ => format!("{}/v2/keys/{}", endpoint, key.trim_start_matches('/')),
    }
}

fn decode(response: &HttpResponse, key: &str) -> StoreResult<KeysResponse> {
    if response.is_success() {
        return serde_json::from_slice(&response.body)
            .map_err(|e| StoreError::Decode(format!("invalid keys response: {}", e)));
    }

    if let Ok(body) = serde_json::from_slice::<ErrorBody>(&response.body) {
        return Err(StoreError::from_code(
            body.error_code,
            body.message,
            key,
            body.index,
        ));
    }

    match response.status {
        401 | 403 => Err(StoreError::Unauthorized(format!(
            "HTTP {}",
            response.status
        ))),
        status => Err(StoreError::Http { status }),
    }
}

fn collect_leaves(node: Node, out: &mut Vec<Entry>) {
    if node.dir {
        for child in node.nodes {
            collect_leaves(child, out);
        }
    } else if let Some(value) = node.value {
        out.push(Entry::new(node.key, value));
    }
}

fn max_modified_index(node: &Node) -> u64 {
    node.nodes
        .iter()
        .map(max_modified_index)
        .fold(node.modified_index, u64::max)
}

/// An etcd v2 store reached through an [`HttpClient`].
///
/// Cloning is cheap; clones share the client and the endpoint cursor.
pub struct EtcdStore<C> {
    shared: Arc<EtcdShared<C>>,
}

struct EtcdShared<C> {
    config: EtcdConfig,
    client: C,
    /// Index of the endpoint that answered last.
    current: AtomicUsize,
}

impl<C> Clone for EtcdStore<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: HttpClient> EtcdStore<C> {
    /// Creates a store.
    pub fn new(config: EtcdConfig, client: C) -> Self {
        Self {
            shared: Arc::new(EtcdShared {
                config,
                client,
                current: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EtcdConfig {
        &self.shared.config
    }

    /// Returns the endpoint requests currently go to.
    pub fn current_endpoint(&self) -> Option<&str> {
        let endpoints = &self.shared.config.endpoints;
        if endpoints.is_empty() {
            return None;
        }
        let index = self.shared.current.load(Ordering::SeqCst) % endpoints.len();
        Some(endpoints[index].as_str())
    }

    async fn send<F>(&self, build: F) -> StoreResult<HttpResponse>
    where
        F: Fn(&str) -> HttpRequest + Send + Sync,
    {
        let endpoints = &self.shared.config.endpoints;
        if endpoints.is_empty() {
            return Err(StoreError::Unavailable {
                endpoints: 0,
                last_error: "no endpoints configured".into(),
            });
        }

        let start = self.shared.current.load(Ordering::SeqCst);
        let mut last_error = String::new();

        for offset in 0..endpoints.len() {
            let index = (start + offset) % endpoints.len();
            let endpoint = &endpoints[index];

            let mut request = build(endpoint);
            request.credentials = self.shared.config.credentials.clone();

            match self.shared.client.execute(request).await {
                Ok(response) => {
                    self.shared.current.store(index, Ordering::SeqCst);
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable");
                    last_error = e.message;
                }
            }
        }

        Err(StoreError::Unavailable {
            endpoints: endpoints.len(),
            last_error,
        })
    }
}

impl<C: HttpClient> RemoteStore for EtcdStore<C> {
    type Watcher = EtcdWatcher<C>;

    async fn write(&self, key: &str, value: &str) -> StoreResult<WriteResponse> {
        let timeout = self.shared.config.header_timeout;
        let response = self
            .send(|endpoint| {
                let mut request =
                    HttpRequest::new(Method::Put, keys_url(endpoint, key)).with_form("value", value);
                request.timeout = Some(timeout);
                request
            })
            .await?;

        let body = decode(&response, key)?;
        Ok(WriteResponse {
            action: ChangeAction::from_wire(&body.action),
            key: body.node.key,
            value: body.node.value.unwrap_or_default(),
            modified_index: body.node.modified_index,
        })
    }

    async fn read_subtree(&self, prefix: &str) -> StoreResult<Subtree> {
        let timeout = self.shared.config.header_timeout;
        let response = self
            .send(|endpoint| {
                let mut request = HttpRequest::new(Method::Get, keys_url(endpoint, prefix))
                    .with_query("recursive", "true");
                request.timeout = Some(timeout);
                request
            })
            .await?;

        let header_index = response
            .header(ETCD_INDEX_HEADER)
            .and_then(|value| value.trim().parse::<u64>().ok());

        let body = decode(&response, prefix)?;
        let index = header_index.unwrap_or_else(|| max_modified_index(&body.node));

        let mut entries = Vec::new();
        collect_leaves(body.node, &mut entries);

        tracing::debug!(prefix = %prefix, entries = entries.len(), index, "read etcd subtree");
        Ok(Subtree { entries, index })
    }

    fn watch(&self, prefix: &str, after_index: u64) -> EtcdWatcher<C> {
        EtcdWatcher {
            store: self.clone(),
            prefix: prefix.to_string(),
            wait_index: after_index + 1,
        }
    }
}

/// Long-poll watcher over an etcd v2 prefix.
pub struct EtcdWatcher<C> {
    store: EtcdStore<C>,
    prefix: String,
    wait_index: u64,
}

impl<C> EtcdWatcher<C> {
    /// Returns the index the next request waits for.
    pub fn wait_index(&self) -> u64 {
        self.wait_index
    }
}

impl<C: HttpClient> Watcher for EtcdWatcher<C> {
    async fn next(&mut self) -> StoreResult<ChangeEvent> {
        loop {
            let prefix = self.prefix.as_str();
            let wait_index = self.wait_index.to_string();
            let response = self
                .store
                .send(|endpoint| {
                    HttpRequest::new(Method::Get, keys_url(endpoint, prefix))
                        .with_query("wait", "true")
                        .with_query("recursive", "true")
                        .with_query("waitIndex", wait_index.as_str())
                })
                .await?;

            // The server may end a long poll with an empty body.
            if response.is_success() && response.body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return match decode(&response, prefix) {
                Ok(body) => {
                    self.wait_index = body.node.modified_index + 1;
                    Ok(ChangeEvent {
                        action: ChangeAction::from_wire(&body.action),
                        key: body.node.key,
                        value: body.node.value,
                        modified_index: body.node.modified_index,
                    })
                }
                Err(err) => {
                    // The requested position was compacted away; resume at the
                    // cluster's current index instead of asking again forever.
                    if let StoreError::Cluster {
                        code: CODE_EVENT_INDEX_CLEARED,
                        index,
                        ..
                    } = &err
                    {
                        tracing::debug!(prefix = %self.prefix, from = self.wait_index, to = index + 1, "watch index cleared");
                        self.wait_index = index + 1;
                    }
                    Err(err)
                }
            };
        }
    }
}
