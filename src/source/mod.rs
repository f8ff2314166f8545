//! Byte sources the load pipeline reads resolved URLs from.

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::{NativeSource, UreqClient};

/// Bytes received so far for the model being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadProgress {
    pub loaded: u64,
    /// Unknown when the server sends no length.
    pub total: Option<u64>,
}

impl LoadProgress {
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        Self { loaded, total }
    }

    /// Whole percentage, capped at 100. `None` while the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|total| *total > 0)?;
        let percent = self.loaded.saturating_mul(100) / total;
        Some(percent.min(100) as u8)
    }
}

/// Reads the bytes behind a resolved load URL, reporting progress as they arrive.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn read(&self, url: &str, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>>;
}

impl<T: AssetSource> AssetSource for std::sync::Arc<T> {
    async fn read(&self, url: &str, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>> {
        (**self).read(url, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_requires_known_total() {
        assert_eq!(LoadProgress::new(10, None).percent(), None);
        assert_eq!(LoadProgress::new(10, Some(0)).percent(), None);
        assert_eq!(LoadProgress::new(25, Some(200)).percent(), Some(12));
        assert_eq!(LoadProgress::new(300, Some(200)).percent(), Some(100));
    }
}
