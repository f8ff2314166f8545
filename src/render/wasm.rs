use anyhow::{anyhow, Result};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::common::{project_triangles, RenderBackend, CLEAR_COLOR};
use crate::decode::MeshData;
use crate::scene::SceneState;

/// Renderer backed by a 2D canvas. Projects on the CPU and paints back to front.
pub struct CanvasRenderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
    has_model: bool,
    disposed: bool,
}

impl CanvasRenderer {
    pub fn new(canvas: HtmlCanvasElement, width: u32, height: u32) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        canvas.set_width(width);
        canvas.set_height(height);
        Ok(Self {
            canvas,
            context,
            size: (width, height),
            has_model: false,
            disposed: false,
        })
    }

    fn clear_background(&self) {
        let [r, g, b, _] = CLEAR_COLOR.map(|c| (c * 255.0).round() as u8);
        self.context
            .set_fill_style_str(&format!("rgb({r}, {g}, {b})"));
        self.context
            .fill_rect(0.0, 0.0, self.size.0 as f64, self.size.1 as f64);
    }
}

impl RenderBackend for CanvasRenderer {
    fn upload_model(&mut self, _mesh: &MeshData) -> Result<()> {
        if self.disposed {
            return Err(anyhow!("renderer already disposed"));
        }
        self.has_model = true;
        Ok(())
    }

    fn release_model(&mut self) {
        self.has_model = false;
    }

    fn render(&mut self, scene: &SceneState) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.clear_background();
        if !self.has_model {
            return Ok(());
        }

        for triangle in project_triangles(scene, self.size.0, self.size.1) {
            let rgb = (triangle.color * 255.0).round();
            let fill = format!("rgb({}, {}, {})", rgb.x, rgb.y, rgb.z);
            self.context.set_fill_style_str(&fill);
            self.context.set_stroke_style_str(&fill);
            let [a, b, c] = triangle.points;
            self.context.begin_path();
            self.context.move_to(a.x as f64, a.y as f64);
            self.context.line_to(b.x as f64, b.y as f64);
            self.context.line_to(c.x as f64, c.y as f64);
            self.context.close_path();
            self.context.fill();
            // Hides hairline seams between neighbouring triangles.
            self.context.stroke();
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.disposed {
            return;
        }
        self.size = (width, height);
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.has_model = false;
        // Frees the backing store.
        self.canvas.set_width(0);
        self.canvas.set_height(0);
        self.disposed = true;
    }
}
