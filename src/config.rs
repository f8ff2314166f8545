use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 600;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 400;
pub const DEFAULT_PROXY_ENDPOINT: &str = "/api/storage/proxy";

/// File formats the viewer knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
}

impl ModelFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }

    /// Guesses the format from the extension of the URL path, ignoring any
    /// query string or fragment.
    pub fn infer(source_url: &str) -> Option<Self> {
        let path = source_url
            .split(['?', '#'])
            .next()
            .unwrap_or(source_url);
        let file_name = path.rsplit('/').next()?;
        let (_, extension) = file_name.rsplit_once('.')?;
        Self::from_name(extension)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gltf => "GLTF",
            Self::Glb => "GLB",
            Self::Obj => "OBJ",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Gltf => "model/gltf+json",
            Self::Glb => "model/gltf-binary",
            Self::Obj => "text/plain",
        }
    }
}

/// Per-mount viewer inputs. Any change to these triggers a full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format: Option<ModelFormat>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_true")]
    pub auto_rotate: bool,
    #[serde(default = "default_true")]
    pub interactive: bool,
}

impl ViewerConfig {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            model_format: None,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            auto_rotate: true,
            interactive: true,
        }
    }

    /// Explicit format, else the one inferred from the URL, else GLB.
    pub fn format(&self) -> ModelFormat {
        self.model_format
            .or_else(|| ModelFormat::infer(&self.source_url))
            .unwrap_or(ModelFormat::Glb)
    }

    pub fn aspect(&self) -> f32 {
        if self.viewport_height == 0 {
            1.0
        } else {
            self.viewport_width as f32 / self.viewport_height as f32
        }
    }
}

/// Where cross-origin model bytes may be routed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchPolicy {
    /// Origin the viewer is served from, e.g. `https://app.example.com`.
    #[serde(default)]
    pub app_origin: Option<String>,
    /// Object-storage hosts; subdomains match too.
    #[serde(default = "default_storage_hosts")]
    pub storage_hosts: Vec<String>,
    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: Option<String>,
}

impl FetchPolicy {
    /// Replaces the proxy and storage hosts. The origin is kept when `app_origin` is `None`.
    /// An empty host list disables cross-origin routing.
    pub fn with_overrides(
        mut self,
        app_origin: Option<String>,
        proxy_endpoint: Option<String>,
        storage_hosts: Vec<String>,
    ) -> Self {
        if app_origin.is_some() {
            self.app_origin = app_origin;
        }
        self.proxy_endpoint = proxy_endpoint;
        self.storage_hosts = storage_hosts;
        self
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            app_origin: None,
            storage_hosts: default_storage_hosts(),
            proxy_endpoint: default_proxy_endpoint(),
        }
    }
}

/// Contents of a RON settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub viewer: Option<ViewerConfig>,
    #[serde(default)]
    pub fetch: FetchPolicy,
}

impl Settings {
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).context("invalid viewer settings")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read settings {}", path.display()))?;
        Self::from_ron(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

fn default_viewport_width() -> u32 {
    DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> u32 {
    DEFAULT_VIEWPORT_HEIGHT
}

fn default_true() -> bool {
    true
}

fn default_proxy_endpoint() -> Option<String> {
    Some(DEFAULT_PROXY_ENDPOINT.to_string())
}

fn default_storage_hosts() -> Vec<String> {
    [
        "amazonaws.com",
        "storage.googleapis.com",
        "blob.core.windows.net",
        "r2.cloudflarestorage.com",
        "digitaloceanspaces.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_format_from_extension() {
        assert_eq!(
            ModelFormat::infer("https://cdn.example.com/a/b/model.OBJ?sig=1#x"),
            Some(ModelFormat::Obj)
        );
        assert_eq!(ModelFormat::infer("scene.gltf"), Some(ModelFormat::Gltf));
        assert_eq!(ModelFormat::infer("https://example.com/download"), None);
        assert_eq!(ModelFormat::infer("https://example.com/v1.2/file"), None);
    }

    #[test]
    fn unknown_extension_defaults_to_glb() {
        let config = ViewerConfig::new("https://example.com/artifacts/42");
        assert_eq!(config.format(), ModelFormat::Glb);

        let mut explicit = ViewerConfig::new("model.obj");
        assert_eq!(explicit.format(), ModelFormat::Obj);
        explicit.model_format = Some(ModelFormat::Gltf);
        assert_eq!(explicit.format(), ModelFormat::Gltf);
    }

    #[test]
    fn settings_fill_in_defaults() {
        let settings = Settings::from_ron(
            r#"(
                viewer: Some((source_url: "https://bucket.s3.amazonaws.com/m.glb", auto_rotate: false)),
                fetch: (app_origin: Some("https://app.example.com")),
            )"#,
        )
        .unwrap();
        let viewer = settings.viewer.unwrap();
        assert_eq!(viewer.viewport_width, DEFAULT_VIEWPORT_WIDTH);
        assert_eq!(viewer.viewport_height, DEFAULT_VIEWPORT_HEIGHT);
        assert!(!viewer.auto_rotate);
        assert!(viewer.interactive);
        assert_eq!(
            settings.fetch.proxy_endpoint.as_deref(),
            Some(DEFAULT_PROXY_ENDPOINT)
        );
        assert!(settings
            .fetch
            .storage_hosts
            .iter()
            .any(|host| host == "amazonaws.com"));
    }

    #[test]
    fn format_names_round_trip_through_ron() {
        let settings = Settings::from_ron(
            r#"(viewer: Some((source_url: "x", model_format: Some(OBJ))))"#,
        )
        .unwrap();
        assert_eq!(settings.viewer.unwrap().model_format, Some(ModelFormat::Obj));
    }

    #[test]
    fn overrides_replace_hosts_and_keep_origin() {
        let base = FetchPolicy {
            app_origin: Some("https://app.example.com".into()),
            ..FetchPolicy::default()
        };
        let policy = base.clone().with_overrides(
            None,
            Some("/proxy".into()),
            vec!["storage.example.net".into()],
        );
        assert_eq!(policy.app_origin, base.app_origin);
        assert_eq!(policy.proxy_endpoint.as_deref(), Some("/proxy"));
        assert_eq!(policy.storage_hosts, vec!["storage.example.net".to_string()]);

        let cleared = policy.with_overrides(Some("https://other.example.com".into()), None, Vec::new());
        assert_eq!(cleared.app_origin.as_deref(), Some("https://other.example.com"));
        assert!(cleared.proxy_endpoint.is_none());
        assert!(cleared.storage_hosts.is_empty());
    }
}
