//! Browser entry point: a `WebViewer` class bound to a container element.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info, warn};
use parking_lot::Mutex;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Blob, BlobPropertyBag, Document, Headers, HtmlCanvasElement, HtmlElement, Request,
    RequestCredentials, RequestInit, RequestMode, Response, Url,
};

use crate::config::{FetchPolicy, ModelFormat, ViewerConfig};
use crate::error::ViewerError;
use crate::fetch::{CredentialsMode, HttpClient, HttpRequest, ResourceFetcher, StaticCredentials, TransportError};
use crate::input::wasm::{DomInputBinding, InputQueue};
use crate::input::InputEvent;
use crate::pipeline::LoadPipeline;
use crate::refs::LocalRefStore;
use crate::render::CanvasRenderer;
use crate::source::{AssetSource, LoadProgress};
use crate::viewer::{FrameHandle, Overlay, Viewer, ViewerHost};

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn js_err(value: JsValue) -> anyhow::Error {
    anyhow!("{value:?}")
}

fn browser_window() -> anyhow::Result<web_sys::Window> {
    web_sys::window().ok_or_else(|| anyhow!("window not available"))
}

async fn send(request: &HttpRequest) -> anyhow::Result<Response> {
    let init = RequestInit::new();
    init.set_method("GET");
    init.set_mode(RequestMode::Cors);
    init.set_credentials(match request.credentials {
        CredentialsMode::SameOrigin => RequestCredentials::SameOrigin,
        CredentialsMode::Omit => RequestCredentials::Omit,
    });
    if let Some(token) = &request.bearer {
        let headers = Headers::new().map_err(js_err)?;
        headers
            .set("Authorization", &format!("Bearer {token}"))
            .map_err(js_err)?;
        init.set_headers(&headers);
    }
    let js_request = Request::new_with_str_and_init(&request.url, &init).map_err(js_err)?;
    let value = JsFuture::from(browser_window()?.fetch_with_request(&js_request))
        .await
        .map_err(js_err)?;
    value.dyn_into::<Response>().map_err(js_err)
}

async fn body_bytes(response: &Response) -> anyhow::Result<Vec<u8>> {
    let buffer = JsFuture::from(response.array_buffer().map_err(js_err)?)
        .await
        .map_err(js_err)?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

/// `fetch()` based client.
#[derive(Debug, Clone, Default)]
pub struct BrowserClient;

impl HttpClient for BrowserClient {
    async fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, TransportError> {
        let response = send(request)
            .await
            .map_err(|err| TransportError::Network(format!("{err:#}")))?;
        if !response.ok() {
            return Err(TransportError::Status(response.status()));
        }
        body_bytes(&response)
            .await
            .map_err(|err| TransportError::Network(format!("{err:#}")))
    }
}

/// Reads resolved load URLs, including minted object URLs, with `fetch()`.
#[derive(Debug, Clone, Default)]
pub struct BrowserSource;

impl AssetSource for BrowserSource {
    async fn read(
        &self,
        url: &str,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> anyhow::Result<Vec<u8>> {
        let response = send(&HttpRequest::get(url)).await?;
        if !response.ok() {
            return Err(anyhow!(
                "HTTP {} {} for {url}",
                response.status(),
                response.status_text()
            ));
        }
        let total = response
            .headers()
            .get("Content-Length")
            .ok()
            .flatten()
            .and_then(|value| value.parse().ok());
        progress(LoadProgress::new(0, total));
        let bytes = body_bytes(&response).await?;
        let len = bytes.len() as u64;
        progress(LoadProgress::new(len, total.or(Some(len))));
        Ok(bytes)
    }
}

/// Mints `blob:` object URLs and revokes them on release.
#[derive(Debug, Default)]
pub struct ObjectUrlStore {
    live: Mutex<HashSet<String>>,
}

impl LocalRefStore for ObjectUrlStore {
    fn mint(&self, bytes: Vec<u8>, mime_type: &str) -> anyhow::Result<String> {
        let array = js_sys::Uint8Array::from(bytes.as_slice());
        let parts = js_sys::Array::new();
        parts.push(&array.buffer());
        let options = BlobPropertyBag::new();
        options.set_type(mime_type);
        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options).map_err(js_err)?;
        let url = Url::create_object_url_with_blob(&blob).map_err(js_err)?;
        self.live.lock().insert(url.clone());
        debug!("minted {url} ({} bytes)", bytes.len());
        Ok(url)
    }

    fn release(&self, url: &str) {
        if !self.live.lock().remove(url) {
            warn!("release of unknown object URL {url}");
            return;
        }
        if let Err(err) = Url::revoke_object_url(url) {
            warn!("failed to revoke {url}: {err:?}");
        }
    }
}

type BrowserPipeline = LoadPipeline<BrowserClient, BrowserSource>;
type SharedViewer = Rc<RefCell<Viewer<WebHost>>>;

/// [`ViewerHost`] that renders into a canvas inside a container element.
pub struct WebHost {
    window: web_sys::Window,
    document: Document,
    container: HtmlElement,
    overlay: HtmlElement,
    canvas: Option<HtmlCanvasElement>,
    frame_callback: Closure<dyn FnMut()>,
    pending: Rc<Cell<Option<(FrameHandle, i32)>>>,
    next_frame: u64,
    input: InputQueue,
    binding: Option<DomInputBinding>,
}

impl WebHost {
    fn new(
        window: web_sys::Window,
        document: Document,
        container: HtmlElement,
        overlay: HtmlElement,
        viewer: Weak<RefCell<Viewer<WebHost>>>,
    ) -> Self {
        let pending: Rc<Cell<Option<(FrameHandle, i32)>>> = Rc::new(Cell::new(None));
        let frame_pending = Rc::clone(&pending);
        let frame_callback = Closure::<dyn FnMut()>::new(move || {
            let Some((handle, _)) = frame_pending.take() else {
                return;
            };
            if let Some(viewer) = viewer.upgrade() {
                viewer.borrow_mut().on_frame(handle);
            }
        });
        Self {
            window,
            document,
            container,
            overlay,
            canvas: None,
            frame_callback,
            pending,
            next_frame: 0,
            input: Rc::new(RefCell::new(Vec::new())),
            binding: None,
        }
    }

    fn create_canvas(&mut self, width: u32, height: u32) -> anyhow::Result<HtmlCanvasElement> {
        let canvas = self
            .document
            .create_element("canvas")
            .map_err(js_err)?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| anyhow!("failed to create canvas element"))?;
        canvas.set_width(width);
        canvas.set_height(height);
        let style = canvas.style();
        style.set_property("touch-action", "none").map_err(js_err)?;
        style.set_property("display", "block").map_err(js_err)?;
        self.container
            .insert_before(&canvas, Some(&self.overlay))
            .map_err(js_err)?;
        Ok(canvas)
    }
}

impl ViewerHost for WebHost {
    type Renderer = CanvasRenderer;

    fn create_renderer(&mut self, width: u32, height: u32) -> Result<CanvasRenderer, ViewerError> {
        let unavailable = |err: anyhow::Error| ViewerError::RendererUnavailable {
            message: format!("{err:#}"),
        };
        let canvas = self.create_canvas(width, height).map_err(unavailable)?;
        let renderer = CanvasRenderer::new(canvas.clone(), width, height);
        match renderer {
            Ok(renderer) => {
                self.canvas = Some(canvas);
                Ok(renderer)
            }
            Err(err) => {
                canvas.remove();
                Err(unavailable(err))
            }
        }
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.next_frame += 1;
        let handle = FrameHandle(self.next_frame);
        match self
            .window
            .request_animation_frame(self.frame_callback.as_ref().unchecked_ref())
        {
            Ok(id) => self.pending.set(Some((handle, id))),
            Err(err) => warn!("requestAnimationFrame failed: {err:?}"),
        }
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some((pending, id)) = self.pending.get() {
            if pending == handle {
                self.pending.set(None);
                if let Err(err) = self.window.cancel_animation_frame(id) {
                    warn!("cancelAnimationFrame failed: {err:?}");
                }
            }
        }
    }

    fn bind_input(&mut self) {
        let Some(canvas) = &self.canvas else {
            warn!("no canvas to bind input to");
            return;
        };
        let binding = DomInputBinding::attach(canvas, &self.window, Rc::clone(&self.input));
        debug!("bound {} input listeners", binding.listener_count());
        self.binding = Some(binding);
    }

    fn unbind_input(&mut self) {
        self.binding = None;
        self.input.borrow_mut().clear();
    }

    fn drain_input(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.input.borrow_mut())
    }

    fn clear_output(&mut self) {
        if let Some(canvas) = self.canvas.take() {
            canvas.remove();
        }
        self.overlay.set_text_content(None);
        let _ = self.overlay.style().set_property("display", "none");
    }

    fn present_overlay(&mut self, overlay: &Overlay) {
        let (text, class) = match overlay {
            Overlay::None => (None, "artifact-viewer-overlay"),
            Overlay::Loading { percent: Some(percent) } => {
                (Some(format!("Loading model... {percent}%")), "artifact-viewer-overlay loading")
            }
            Overlay::Loading { percent: None } => {
                (Some("Loading model...".to_string()), "artifact-viewer-overlay loading")
            }
            Overlay::Error {
                message,
                cross_origin: true,
            } => (Some(message.clone()), "artifact-viewer-overlay error cross-origin"),
            Overlay::Error { message, .. } => (Some(message.clone()), "artifact-viewer-overlay error"),
            Overlay::Hint(hint) => (Some(hint.to_string()), "artifact-viewer-overlay hint"),
        };
        self.overlay.set_class_name(class);
        let display = if text.is_some() { "block" } else { "none" };
        self.overlay.set_text_content(text.as_deref());
        let _ = self.overlay.style().set_property("display", display);
    }
}

impl Drop for WebHost {
    fn drop(&mut self) {
        if let Some(canvas) = self.canvas.take() {
            canvas.remove();
        }
        self.overlay.remove();
    }
}

/// Interactive 3D model viewer mounted in a container element.
#[wasm_bindgen]
pub struct WebViewer {
    viewer: SharedViewer,
    refs: Arc<ObjectUrlStore>,
    credentials: Arc<StaticCredentials>,
    pipeline: Rc<BrowserPipeline>,
}

#[wasm_bindgen]
impl WebViewer {
    #[wasm_bindgen(constructor)]
    pub fn new(container_id: &str) -> Result<WebViewer, JsValue> {
        Self::mount(container_id).map_err(|err| JsValue::from_str(&format!("{err:#}")))
    }

    fn mount(container_id: &str) -> anyhow::Result<WebViewer> {
        let window = browser_window()?;
        let document = window
            .document()
            .ok_or_else(|| anyhow!("document not available"))?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(|| anyhow!("element #{container_id} not found"))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| anyhow!("#{container_id} is not an HTML element"))?;
        let overlay = document
            .create_element("div")
            .map_err(js_err)?
            .dyn_into::<HtmlElement>()
            .map_err(|_| anyhow!("failed to create overlay element"))?;
        overlay.set_class_name("artifact-viewer-overlay");
        let _ = overlay.style().set_property("display", "none");
        container.append_child(&overlay).map_err(js_err)?;

        let refs = Arc::new(ObjectUrlStore::default());
        let store: Arc<dyn LocalRefStore> = refs.clone();
        let viewer = Rc::new_cyclic(|weak| {
            let host = WebHost::new(window, document, container, overlay, weak.clone());
            RefCell::new(Viewer::new(host, store))
        });

        let credentials = Arc::new(StaticCredentials::default());
        let policy = FetchPolicy {
            app_origin: web_sys::window().and_then(|window| window.location().origin().ok()),
            ..FetchPolicy::default()
        };
        let pipeline = Rc::new(build_pipeline(&refs, &credentials, policy));
        info!("viewer mounted in #{container_id}");
        Ok(WebViewer {
            viewer,
            refs,
            credentials,
            pipeline,
        })
    }

    /// Shows the model at `url`. Changing any argument rebuilds the view.
    pub fn load(
        &mut self,
        url: String,
        format: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        auto_rotate: Option<bool>,
        interactive: Option<bool>,
    ) -> Result<(), JsValue> {
        let model_format = match format.as_deref() {
            Some(name) => Some(
                ModelFormat::from_name(name)
                    .ok_or_else(|| JsValue::from_str(&format!("unknown model format {name:?}")))?,
            ),
            None => None,
        };
        let defaults = ViewerConfig::new(url);
        let config = ViewerConfig {
            model_format,
            viewport_width: width.unwrap_or(defaults.viewport_width),
            viewport_height: height.unwrap_or(defaults.viewport_height),
            auto_rotate: auto_rotate.unwrap_or(defaults.auto_rotate),
            interactive: interactive.unwrap_or(defaults.interactive),
            ..defaults
        };

        let Some(request) = self.viewer.borrow_mut().configure(config) else {
            return Ok(());
        };
        let weak = Rc::downgrade(&self.viewer);
        let pipeline = Rc::clone(&self.pipeline);
        let refs = Arc::clone(&self.refs);
        spawn_local(async move {
            let generation = request.generation;
            let progress_target = weak.clone();
            let mut report = move |progress: LoadProgress| {
                if let Some(viewer) = progress_target.upgrade() {
                    if let Ok(mut viewer) = viewer.try_borrow_mut() {
                        viewer.report_progress(generation, progress);
                    }
                }
            };
            let mut completion = pipeline.load(&request, &mut report).await;
            match weak.upgrade() {
                Some(viewer) => {
                    viewer.borrow_mut().finish_load(completion);
                }
                None => {
                    completion.resource.release(&*refs);
                }
            }
        });
        Ok(())
    }

    pub fn unmount(&self) {
        self.viewer.borrow_mut().unmount();
    }

    #[wasm_bindgen(js_name = setBearerToken)]
    pub fn set_bearer_token(&self, token: Option<String>) {
        self.credentials.set(token);
    }

    /// Replaces the cross-origin routing rules used by later loads.
    /// An empty `hosts` list turns cross-origin routing off.
    #[wasm_bindgen(js_name = setFetchPolicy)]
    pub fn set_fetch_policy(&mut self, origin: Option<String>, proxy: Option<String>, hosts: Vec<String>) {
        let policy = self
            .pipeline
            .fetcher()
            .policy()
            .clone()
            .with_overrides(origin, proxy, hosts);
        debug!("fetch policy now {policy:?}");
        self.pipeline = Rc::new(build_pipeline(&self.refs, &self.credentials, policy));
    }

    /// `idle`, `loading`, `ready` or `failed`.
    pub fn status(&self) -> String {
        use crate::viewer::ViewerStatus;
        match self.viewer.borrow().status() {
            ViewerStatus::Idle => "idle",
            ViewerStatus::Loading { .. } => "loading",
            ViewerStatus::Ready => "ready",
            ViewerStatus::Failed(_) => "failed",
        }
        .to_string()
    }
}

fn build_pipeline(
    refs: &Arc<ObjectUrlStore>,
    credentials: &Arc<StaticCredentials>,
    policy: FetchPolicy,
) -> BrowserPipeline {
    let fetcher = ResourceFetcher::new(BrowserClient, refs.clone(), policy)
        .with_credentials(credentials.clone());
    LoadPipeline::new(fetcher, BrowserSource)
}
