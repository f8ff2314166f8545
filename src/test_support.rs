//! Fixtures shared by unit tests.

use glam::Vec3;

const BOX_INDICES: [u16; 36] = [
    0, 2, 1, 0, 3, 2, // -z
    4, 5, 6, 4, 6, 7, // +z
    0, 1, 5, 0, 5, 4, // -y
    3, 7, 6, 3, 6, 2, // +y
    0, 4, 7, 0, 7, 3, // -x
    1, 2, 6, 1, 6, 5, // +x
];

fn box_corners(min: Vec3, max: Vec3) -> [Vec3; 8] {
    [
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(min.x, min.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(max.x, max.y, max.z),
        Vec3::new(min.x, max.y, max.z),
    ]
}

/// Builds a binary glTF containing one axis-aligned box without normals.
pub(crate) fn glb_box(min: Vec3, max: Vec3, translation: Option<Vec3>) -> Vec<u8> {
    let mut bin = Vec::new();
    for corner in box_corners(min, max) {
        for component in corner.to_array() {
            bin.extend_from_slice(&component.to_le_bytes());
        }
    }
    let positions_len = bin.len();
    for index in BOX_INDICES {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    let indices_len = bin.len() - positions_len;
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let node = match translation {
        Some(t) => format!(r#"{{"mesh":0,"translation":[{},{},{}]}}"#, t.x, t.y, t.z),
        None => r#"{"mesh":0}"#.to_string(),
    };
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{node}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":8,"type":"VEC3","min":[{},{},{}],"max":[{},{},{}]}},{{"bufferView":1,"componentType":5123,"count":36,"type":"SCALAR"}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":{positions_len}}},{{"buffer":0,"byteOffset":{positions_len},"byteLength":{indices_len}}}],"buffers":[{{"byteLength":{}}}]}}"#,
        min.x,
        min.y,
        min.z,
        max.x,
        max.y,
        max.z,
        positions_len + indices_len,
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

/// OBJ text for an axis-aligned box.
pub(crate) fn obj_box(min: Vec3, max: Vec3) -> String {
    let mut text = String::new();
    for corner in box_corners(min, max) {
        text.push_str(&format!("v {} {} {}\n", corner.x, corner.y, corner.z));
    }
    for triangle in BOX_INDICES.chunks_exact(3) {
        text.push_str(&format!(
            "f {} {} {}\n",
            triangle[0] + 1,
            triangle[1] + 1,
            triangle[2] + 1
        ));
    }
    text
}

/// Source that serves fixed bytes by URL and anything minted into `refs`.
pub(crate) struct StubSource {
    pub refs: std::sync::Arc<crate::refs::MemoryRefStore>,
    pub files: std::collections::HashMap<String, Result<Vec<u8>, String>>,
}

impl StubSource {
    pub fn new(refs: std::sync::Arc<crate::refs::MemoryRefStore>) -> Self {
        Self {
            refs,
            files: Default::default(),
        }
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), Ok(bytes));
        self
    }

    pub fn failing(mut self, url: &str, message: &str) -> Self {
        self.files.insert(url.to_string(), Err(message.to_string()));
        self
    }
}

impl crate::source::AssetSource for StubSource {
    async fn read(
        &self,
        url: &str,
        progress: &mut dyn FnMut(crate::source::LoadProgress),
    ) -> anyhow::Result<Vec<u8>> {
        let bytes = match self.refs.get(url) {
            Some(bytes) => bytes.to_vec(),
            None => match self.files.get(url) {
                Some(Ok(bytes)) => bytes.clone(),
                Some(Err(message)) => return Err(anyhow::anyhow!("{message}")),
                None => return Err(anyhow::anyhow!("404 not found: {url}")),
            },
        };
        let len = bytes.len() as u64;
        progress(crate::source::LoadProgress::new(len / 2, Some(len)));
        progress(crate::source::LoadProgress::new(len, Some(len)));
        Ok(bytes)
    }
}
