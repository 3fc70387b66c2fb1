//! `reqwest`-backed [`ContentFetcher`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lectern_config::FetchSettings;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use lectern_core::{ContentFetcher, FetchError, FetchResult, FetchedArtifact};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{FetcherSetupError, FetcherSetupResult};

/// User agent sent with every download request.
pub const USER_AGENT: &str = concat!("lectern/", env!("CARGO_PKG_VERSION"));

const IDENTITY_TOKEN: &str = "{identity}";
const PARTIAL_EXTENSION: &str = "part";

/// Bytes escaped when an identity is substituted into the template. Covers
/// the URL path-segment set plus the query delimiters.
const IDENTITY_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'|');

/// Downloads content by expanding a URL template and streaming the body into
/// the staging directory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    url_template: String,
    credentials: Option<(String, Option<String>)>,
    staging_dir: PathBuf,
}

impl HttpFetcher {
    /// Build a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Fails when no URL template is configured or the client cannot be built.
    pub fn from_settings(
        settings: &FetchSettings,
        staging_dir: impl Into<PathBuf>,
    ) -> FetcherSetupResult<Self> {
        let url_template = settings
            .url_template
            .clone()
            .ok_or(FetcherSetupError::NotConfigured)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|source| FetcherSetupError::Client { source })?;
        Ok(Self {
            client,
            url_template,
            credentials: settings
                .username
                .clone()
                .map(|user| (user, settings.password.clone())),
            staging_dir: staging_dir.into(),
        })
    }

    /// Directory that receives partial downloads.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn url_for(&self, identity: &str) -> FetchResult<Url> {
        if matches!(identity, "" | "." | "..") {
            return Err(FetchError::permanent(identity, "identity is not a usable url segment"));
        }
        let encoded = utf8_percent_encode(identity, IDENTITY_ESCAPES).to_string();
        let raw = self.url_template.replace(IDENTITY_TOKEN, &encoded);
        Url::parse(&raw)
            .map_err(|err| FetchError::permanent(identity, format!("invalid download url: {err}")))
    }

    async fn ensure_staging_dir(&self, identity: &str) -> FetchResult<()> {
        fs::create_dir_all(&self.staging_dir).await.map_err(|err| {
            FetchError::permanent(
                identity,
                format!(
                    "staging directory {} unavailable: {err}",
                    self.staging_dir.display()
                ),
            )
        })
    }

    /// Confirms the staging directory, or its nearest existing ancestor, is a
    /// writable directory. Creates nothing.
    async fn probe_staging_dir(&self) -> Result<(), String> {
        let mut dir = self.staging_dir.clone();
        loop {
            match fs::metadata(&dir).await {
                Ok(metadata) if !metadata.is_dir() => {
                    return Err(format!("{} is not a directory", dir.display()));
                }
                Ok(metadata) if metadata.permissions().readonly() => {
                    return Err(format!("{} is read-only", dir.display()));
                }
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    if !dir.pop() || dir.as_os_str().is_empty() {
                        return Err(format!(
                            "staging directory {} has no existing ancestor",
                            self.staging_dir.display()
                        ));
                    }
                }
                Err(err) => return Err(format!("{}: {err}", dir.display())),
            }
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, identity: &str) -> FetchResult<FetchedArtifact> {
        let url = self.url_for(identity)?;
        self.ensure_staging_dir(identity).await?;

        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        debug!(identity, url = %url, "requesting content");
        let response = request
            .send()
            .await
            .map_err(|err| classify_transport(identity, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(identity, status));
        }

        let suggested_name = filename_from_headers(response.headers())
            .or_else(|| filename_from_url(response.url()));
        let temp_path = self
            .staging_dir
            .join(format!("{}.{PARTIAL_EXTENSION}", Uuid::new_v4()));

        let bytes = match stream_to_file(identity, response, &temp_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                discard_partial(&temp_path).await;
                return Err(err);
            }
        };
        if bytes == 0 {
            discard_partial(&temp_path).await;
            return Err(FetchError::permanent(identity, "server returned an empty body"));
        }

        debug!(identity, bytes, path = %temp_path.display(), "content staged");
        Ok(FetchedArtifact {
            temp_path,
            suggested_name,
            bytes,
        })
    }

    async fn preflight(&self) -> FetchResult<()> {
        self.url_for("preflight")?;
        self.probe_staging_dir()
            .await
            .map_err(|detail| FetchError::permanent("preflight", detail))
    }
}

async fn stream_to_file(identity: &str, mut response: Response, path: &Path) -> FetchResult<u64> {
    let io_failure = |err: std::io::Error| {
        FetchError::permanent(identity, format!("writing {}: {err}", path.display()))
    };
    let mut file = fs::File::create(path).await.map_err(io_failure)?;
    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| classify_transport(identity, &err))?
    {
        file.write_all(&chunk).await.map_err(io_failure)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_failure)?;
    file.sync_all().await.map_err(io_failure)?;
    Ok(written)
}

async fn discard_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(error = %err, path = %path.display(), "failed to remove partial download"),
    }
}

fn classify_status(identity: &str, status: StatusCode) -> FetchError {
    let detail = format!("server responded with {status}");
    let transient = status.is_server_error()
        || matches!(status.as_u16(), 408 | 425 | 429);
    if transient {
        FetchError::transient(identity, detail)
    } else {
        FetchError::permanent(identity, detail)
    }
}

fn classify_transport(identity: &str, err: &reqwest::Error) -> FetchError {
    if err.is_builder() || err.is_redirect() || err.is_decode() {
        FetchError::permanent(identity, err.to_string())
    } else {
        FetchError::transient(identity, err.to_string())
    }
}

fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches(|c| c == '"' || c == '\''))
        .filter(|name| !name.is_empty())
        .map(sanitize_name)
}

fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(sanitize_name)
}

fn sanitize_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).to_string()
}
