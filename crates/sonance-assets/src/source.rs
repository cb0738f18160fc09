use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use reqwest::Client;
use tracing::debug;

use crate::error::AssetError;

/// Body of a fetched asset plus the content type the source declared for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl Fetched {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, mime: None }
    }
}

/// Byte transport consumed by the [`AssetCache`](crate::AssetCache).
///
/// `probe` is a lightweight existence check that runs before every full
/// `fetch`. A failing probe means the asset does not exist.
pub trait AssetSource: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), AssetError>>;

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Fetched, AssetError>>;
}

/// Fetches assets over HTTP(S). Relative URLs are joined onto `base_url`.
pub struct HttpSource {
    client: Client,
    base_url: Option<String>,
}

impl HttpSource {
    pub fn new(base_url: Option<String>) -> Result<Self, AssetError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssetError::Fetch("<client>".into(), e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}

fn fetch_error(url: &str, err: reqwest::Error) -> AssetError {
    if err.is_timeout() {
        AssetError::Fetch(url.to_string(), "request timed out".into())
    } else if err.is_connect() {
        AssetError::Fetch(url.to_string(), "server is offline or unreachable".into())
    } else {
        AssetError::Fetch(url.to_string(), err.to_string())
    }
}

impl AssetSource for HttpSource {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), AssetError>> {
        async move {
            let full = self.resolve(url);
            let response = self
                .client
                .head(&full)
                .send()
                .await
                .map_err(|_| AssetError::NotFound(url.to_string()))?;
            if !response.status().is_success() {
                debug!("Probe for {} returned {}", full, response.status());
                return Err(AssetError::NotFound(url.to_string()));
            }
            Ok(())
        }
        .boxed()
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Fetched, AssetError>> {
        async move {
            let full = self.resolve(url);
            let response = self
                .client
                .get(&full)
                .send()
                .await
                .map_err(|e| fetch_error(url, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(AssetError::Fetch(
                    url.to_string(),
                    format!("server responded with {}", status.as_u16()),
                ));
            }
            let mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await.map_err(|e| fetch_error(url, e))?;
            Ok(Fetched {
                bytes: bytes.to_vec(),
                mime,
            })
        }
        .boxed()
    }
}

/// Reads assets from disk. URLs are resolved against `base_path`; a leading
/// `/` is site-root relative, and `file://` URLs are taken as absolute paths.
pub struct FileSource {
    base_path: PathBuf,
}

impl FileSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        if let Some(absolute) = url.strip_prefix("file://") {
            return PathBuf::from(absolute);
        }
        self.base_path.join(url.trim_start_matches('/'))
    }

    /// The base path this source resolves relative URLs against.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl AssetSource for FileSource {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), AssetError>> {
        async move {
            match tokio::fs::metadata(self.resolve(url)).await {
                Ok(meta) if meta.is_file() => Ok(()),
                _ => Err(AssetError::NotFound(url.to_string())),
            }
        }
        .boxed()
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Fetched, AssetError>> {
        async move {
            let path = self.resolve(url);
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Fetched::new(bytes)),
                Err(e) => Err(AssetError::Io(path, e)),
            }
        }
        .boxed()
    }
}

/// Serves assets from memory, e.g. sounds embedded with `include_bytes!`.
#[derive(Default)]
pub struct MemorySource {
    assets: RwLock<HashMap<String, (Arc<[u8]>, Option<String>)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(url, bytes);
        self
    }

    /// Builder-style insert with a declared content type.
    pub fn with_mime(
        self,
        url: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        self.assets
            .write()
            .insert(url.into(), (bytes.into(), Some(mime.into())));
        self
    }

    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.assets.write().insert(url.into(), (bytes.into(), None));
    }
}

impl AssetSource for MemorySource {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), AssetError>> {
        let found = self.assets.read().contains_key(url);
        async move {
            if found {
                Ok(())
            } else {
                Err(AssetError::NotFound(url.to_string()))
            }
        }
        .boxed()
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Fetched, AssetError>> {
        let fetched = self.assets.read().get(url).map(|(bytes, mime)| Fetched {
            bytes: bytes.to_vec(),
            mime: mime.clone(),
        });
        async move {
            fetched.ok_or_else(|| AssetError::Fetch(url.to_string(), "asset vanished".into()))
        }
        .boxed()
    }
}
