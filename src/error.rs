use thiserror::Error;

/// Failures raised while resolving, decoding, or mounting a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    /// The cross-origin workaround failed; the viewer falls back to a direct load.
    #[error("cross-origin fetch of {url} degraded: {reason}")]
    FetchDegraded { url: String, reason: String },
    #[error("failed to load model: {message}")]
    DecodeFailed { message: String },
    #[error("model host blocked cross-origin access: {message}")]
    CrossOriginBlocked { message: String },
    /// A load finished after a newer request replaced it.
    #[error("discarded completion of superseded load #{generation}")]
    StaleCompletion { generation: u64 },
    #[error("renderer unavailable: {message}")]
    RendererUnavailable { message: String },
}

const CROSS_ORIGIN_MARKERS: &[&str] = &[
    "cors",
    "cross-origin",
    "cross origin",
    "access-control",
    "failed to fetch",
    "networkerror",
];

impl ViewerError {
    /// Classifies a load failure. `degraded` is set when the source sits on a
    /// cross-origin storage host and every workaround already failed.
    pub fn from_load_failure(message: impl Into<String>, degraded: bool) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if degraded
            || CROSS_ORIGIN_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker))
        {
            Self::CrossOriginBlocked { message }
        } else {
            Self::DecodeFailed { message }
        }
    }

    pub fn is_cross_origin(&self) -> bool {
        matches!(self, Self::CrossOriginBlocked { .. })
    }

    /// Whether the error should reach the error panel.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailed { .. }
                | Self::CrossOriginBlocked { .. }
                | Self::RendererUnavailable { .. }
        )
    }

    /// Text shown in the error panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::CrossOriginBlocked { .. } => "The model could not be loaded because its storage \
                 host does not allow cross-origin access. Ask an administrator to enable CORS \
                 for this bucket or to configure the storage proxy."
                .to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_text_is_classified_as_cross_origin() {
        let err = ViewerError::from_load_failure("TypeError: Failed to fetch", false);
        assert!(err.is_cross_origin());
        let err = ViewerError::from_load_failure("No 'Access-Control-Allow-Origin' header", false);
        assert!(err.is_cross_origin());
    }

    #[test]
    fn degraded_fetch_is_classified_as_cross_origin() {
        let err = ViewerError::from_load_failure("HTTP 403", true);
        assert!(err.is_cross_origin());
        assert!(err.user_message().contains("cross-origin"));
    }

    #[test]
    fn parse_errors_are_decode_failures() {
        let err = ViewerError::from_load_failure("invalid vertex on line 3", false);
        assert_eq!(
            err,
            ViewerError::DecodeFailed {
                message: "invalid vertex on line 3".into()
            }
        );
        assert!(err.is_user_visible());
        assert_eq!(err.user_message(), "failed to load model: invalid vertex on line 3");
    }

    #[test]
    fn internal_variants_stay_hidden() {
        assert!(!ViewerError::StaleCompletion { generation: 3 }.is_user_visible());
        assert!(!ViewerError::FetchDegraded {
            url: "u".into(),
            reason: "r".into()
        }
        .is_user_visible());
    }
}
