use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::debug;
use url::Url;

use super::{AssetSource, LoadProgress};
use crate::fetch::{HttpClient, HttpRequest, TransportError};
use crate::refs::MemoryRefStore;

const READ_CHUNK: usize = 64 * 1024;

/// Blocking HTTP client for native builds.
#[derive(Debug, Clone, Default)]
pub struct UreqClient;

impl UreqClient {
    fn request(request: &HttpRequest) -> ureq::Request {
        let call = ureq::get(&request.url);
        match &request.bearer {
            Some(token) => call.set("Authorization", &format!("Bearer {token}")),
            None => call,
        }
    }
}

impl HttpClient for UreqClient {
    async fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, TransportError> {
        let response = Self::request(request).call().map_err(convert_error)?;
        let total = content_length(&response);
        read_with_progress(response.into_reader(), total, &mut |_| {})
            .map_err(|err| TransportError::Network(format!("{err:#}")))
    }
}

fn convert_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::Status(code),
        other => TransportError::Network(other.to_string()),
    }
}

fn content_length(response: &ureq::Response) -> Option<u64> {
    response
        .header("Content-Length")
        .and_then(|value| value.trim().parse().ok())
}

/// Reads local references, filesystem paths, `file://` URLs, and plain HTTP(S).
pub struct NativeSource {
    refs: Arc<MemoryRefStore>,
}

impl NativeSource {
    pub fn new(refs: Arc<MemoryRefStore>) -> Self {
        Self { refs }
    }

    fn read_file(path: PathBuf, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>> {
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let total = file.metadata().ok().map(|meta| meta.len());
        read_with_progress(file, total, progress)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    fn read_http(url: &str, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>> {
        let response = ureq::get(url)
            .call()
            .map_err(|err| anyhow!("request for {url} failed: {}", convert_error(err)))?;
        let total = content_length(&response);
        read_with_progress(response.into_reader(), total, progress)
    }
}

impl AssetSource for NativeSource {
    async fn read(&self, url: &str, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>> {
        if MemoryRefStore::is_local_ref(url) {
            let bytes = self
                .refs
                .get(url)
                .ok_or_else(|| anyhow!("local reference {url} was already released"))?;
            let len = bytes.len() as u64;
            progress(LoadProgress::new(len, Some(len)));
            return Ok(bytes.to_vec());
        }

        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                debug!("reading {url} over HTTP");
                Self::read_http(url, progress)
            }
            Ok(parsed) if parsed.scheme() == "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| anyhow!("invalid file URL {url}"))?;
                Self::read_file(path, progress)
            }
            // Drive letters parse as one-letter schemes.
            Ok(parsed) if parsed.scheme().len() > 1 => {
                Err(anyhow!("unsupported URL scheme '{}'", parsed.scheme()))
            }
            _ => Self::read_file(PathBuf::from(url), progress),
        }
    }
}

/// Drains `reader`, reporting after every chunk.
fn read_with_progress(
    mut reader: impl Read,
    total: Option<u64>,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        progress(LoadProgress::new(bytes.len() as u64, total));
    }
    Ok(bytes)
}
