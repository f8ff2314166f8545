//! Fetch, read, decode and normalize one model for a given viewer generation.

use anyhow::Context;
use log::{debug, info};

use crate::config::ViewerConfig;
use crate::decode;
use crate::error::ViewerError;
use crate::fetch::{HttpClient, ResourceFetcher};
use crate::refs::FetchedResource;
use crate::scene::ModelNode;
use crate::source::{AssetSource, LoadProgress};

/// A load scheduled by the viewer. `generation` identifies the mount it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub generation: u64,
    pub config: ViewerConfig,
}

/// Result of a load, handed back to [`crate::Viewer::finish_load`].
#[derive(Debug)]
pub struct LoadCompletion {
    pub generation: u64,
    /// Carries any minted local reference; the viewer releases it.
    pub resource: FetchedResource,
    pub outcome: Result<ModelNode, ViewerError>,
}

pub struct LoadPipeline<C, S> {
    fetcher: ResourceFetcher<C>,
    source: S,
}

impl<C: HttpClient, S: AssetSource> LoadPipeline<C, S> {
    pub fn new(fetcher: ResourceFetcher<C>, source: S) -> Self {
        Self { fetcher, source }
    }

    pub fn fetcher(&self) -> &ResourceFetcher<C> {
        &self.fetcher
    }

    /// Runs a load to completion. Never fails outright; failures travel in
    /// [`LoadCompletion::outcome`] already classified.
    pub async fn load(
        &self,
        request: &LoadRequest,
        on_progress: &mut dyn FnMut(LoadProgress),
    ) -> LoadCompletion {
        let config = &request.config;
        let format = config.format();
        let resource = self.fetcher.fetch(&config.source_url, format).await;
        debug!(
            "load #{} reading {} as {}",
            request.generation,
            resource.load_url,
            format.name()
        );

        let outcome = self
            .read_model(&resource, config, on_progress)
            .await
            .map_err(|err| ViewerError::from_load_failure(format!("{err:#}"), resource.degraded));

        if let Ok(model) = &outcome {
            info!(
                "load #{} decoded {} ({} vertices, {} triangles)",
                request.generation,
                config.source_url,
                model.mesh.vertex_count(),
                model.mesh.triangle_count()
            );
        }

        LoadCompletion {
            generation: request.generation,
            resource,
            outcome,
        }
    }

    async fn read_model(
        &self,
        resource: &FetchedResource,
        config: &ViewerConfig,
        on_progress: &mut dyn FnMut(LoadProgress),
    ) -> anyhow::Result<ModelNode> {
        let bytes = self
            .source
            .read(&resource.load_url, on_progress)
            .await
            .with_context(|| format!("unable to read {}", config.source_url))?;
        let mesh = decode::decode(config.format(), &bytes)?;
        ModelNode::normalized(mesh)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;
    use pollster::block_on;

    use super::*;
    use crate::config::{FetchPolicy, ModelFormat};
    use crate::fetch::tests::ScriptedClient;
    use crate::fetch::TransportError;
    use crate::refs::MemoryRefStore;
    use crate::test_support::{glb_box, obj_box, StubSource};

    const STORAGE_URL: &str = "https://scans.s3.amazonaws.com/box.glb";

    fn pipeline(
        responses: Vec<Result<Vec<u8>, TransportError>>,
        source: impl FnOnce(Arc<MemoryRefStore>) -> StubSource,
    ) -> (LoadPipeline<Arc<ScriptedClient>, StubSource>, Arc<MemoryRefStore>) {
        let refs = Arc::new(MemoryRefStore::new());
        let policy = FetchPolicy {
            app_origin: Some("https://app.example.com".into()),
            ..FetchPolicy::default()
        };
        let fetcher =
            ResourceFetcher::new(Arc::new(ScriptedClient::new(responses)), refs.clone(), policy);
        (LoadPipeline::new(fetcher, source(refs.clone())), refs)
    }

    fn request(url: &str) -> LoadRequest {
        LoadRequest {
            generation: 3,
            config: ViewerConfig::new(url),
        }
    }

    #[test]
    fn proxied_glb_is_normalized() {
        let glb = glb_box(Vec3::ZERO, Vec3::new(10.0, 4.0, 6.0), Some(Vec3::splat(5.0)));
        let (pipeline, refs) = pipeline(vec![Ok(glb)], StubSource::new);
        let completion = block_on(pipeline.load(&request(STORAGE_URL), &mut |_| {}));

        assert_eq!(completion.generation, 3);
        assert!(completion.resource.owns_lifetime);
        assert_eq!(refs.live_count(), 1);
        let model = completion.outcome.unwrap();
        assert!((model.scale - 0.2).abs() < 1e-5);
        assert!(model.normalized_bounds().center().abs_diff_eq(Vec3::ZERO, 1e-4));
    }

    #[test]
    fn progress_is_forwarded() {
        let obj = obj_box(Vec3::ZERO, Vec3::ONE).into_bytes();
        let (pipeline, _) = pipeline(vec![], |refs| StubSource::new(refs).with("/box.obj", obj));
        let mut seen = Vec::new();
        let completion = block_on(pipeline.load(&request("/box.obj"), &mut |p| seen.push(p)));
        assert!(completion.outcome.is_ok());
        assert!(!completion.resource.owns_lifetime);
        assert_eq!(seen.last().and_then(LoadProgress::percent), Some(100));
    }

    #[test]
    fn non_model_bytes_fail_to_decode() {
        let html = b"<html><body>Sign in</body></html>".to_vec();
        let (pipeline, _) = pipeline(vec![], |refs| StubSource::new(refs).with("/a.glb", html));
        let completion = block_on(pipeline.load(&request("/a.glb"), &mut |_| {}));
        assert!(matches!(
            completion.outcome,
            Err(ViewerError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn degraded_storage_load_is_cross_origin() {
        let (pipeline, refs) = pipeline(
            vec![
                Err(TransportError::Status(500)),
                Err(TransportError::Network("refused".into())),
            ],
            |refs| StubSource::new(refs).failing(STORAGE_URL, "HTTP status 403"),
        );
        let completion = block_on(pipeline.load(&request(STORAGE_URL), &mut |_| {}));
        assert!(completion.resource.degraded);
        assert!(completion.outcome.unwrap_err().is_cross_origin());
        assert_eq!(refs.minted_count(), 0);
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let obj = obj_box(Vec3::ZERO, Vec3::ONE).into_bytes();
        let (pipeline, _) = pipeline(vec![], |refs| StubSource::new(refs).with("/download", obj));
        let mut request = request("/download");
        request.config.model_format = Some(ModelFormat::Obj);
        let completion = block_on(pipeline.load(&request, &mut |_| {}));
        assert_eq!(completion.outcome.unwrap().mesh.triangle_count(), 12);
    }
}
