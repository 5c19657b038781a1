//! Detector backed by an HTTP detection service (e.g. a Grounding DINO sidecar).
//!
//! `POST {endpoint}/detect` with `{"image": <base64 PNG>, "labels": [...], "text_threshold": f}`;
//! the service answers `{"detections": [{"box": [x1, y1, x2, y2], "score": f, "label": s}]}`.

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{encode_png_base64, Detection, Detector};
use crate::config::DetectionConfig;

#[derive(Serialize)]
struct DetectRequest<'a> {
    image: String,
    labels: &'a [String],
    text_threshold: f32,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct HttpDetector {
    url: String,
    text_threshold: f32,
    http_client: reqwest::blocking::Client,
}

impl HttpDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build detector HTTP client")?;
        tracing::info!(endpoint = %config.endpoint, "HTTP detector ready");
        Ok(Self {
            url: format!("{}/detect", config.endpoint.trim_end_matches('/')),
            text_threshold: config.text_threshold,
            http_client,
        })
    }
}

impl Detector for HttpDetector {
    fn detect(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<Detection>> {
        let body = DetectRequest {
            image: encode_png_base64(image)?,
            labels,
            text_threshold: self.text_threshold,
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .with_context(|| format!("detection request to {} failed", self.url))?;

        let status = response.status();
        anyhow::ensure!(status.is_success(), "detection service returned HTTP {status}");

        let parsed: DetectResponse = response
            .json()
            .context("failed to parse detection response")?;
        Ok(parsed.detections)
    }
}
