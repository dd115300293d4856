//! Version information for shelfsort.

/// shelfsort version from Cargo.toml
pub const SHELFSORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub shelfsort: &'static str,
    /// Inference service endpoint this server talks to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_service: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            shelfsort: SHELFSORT_VERSION,
            prediction_service: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prediction_service(mut self, url: String) -> Self {
        self.prediction_service = Some(url);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.shelfsort, SHELFSORT_VERSION);
        assert!(info.prediction_service.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            shelfsort: "0.1.0",
            prediction_service: None,
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "shelfsort": "0.1.0"
        }
        "#);
    }

    #[test]
    fn version_info_serializes_full() {
        let info = VersionInfo {
            shelfsort: "0.1.0",
            prediction_service: None,
        }
        .with_prediction_service("http://ml:8000/predict".to_string());
        insta::assert_json_snapshot!(info, @r#"
        {
          "shelfsort": "0.1.0",
          "prediction_service": "http://ml:8000/predict"
        }
        "#);
    }
}
