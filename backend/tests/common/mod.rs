//! Shared helpers for the integration tests
//!
//! Each test binary only uses part of this module.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared::Coordinate;

use field_health_backend::error::{AppError, AppResult};
use field_health_backend::external::remote_sensing::{
    BandValues, CompositeRequest, CompositeSummary, DatasetRequest, RegionStats, RemoteSensing,
    TileVisualization,
};
use field_health_backend::external::{Clock, ServiceAccount};
use field_health_backend::services::moisture::{
    ERA5_DATASET, ERA5_DEW_POINT_BAND, ERA5_SOIL_WATER_BAND, ERA5_TEMPERATURE_BAND,
    SMAP_DATASET, SMAP_ROOT_ZONE_BAND, SMAP_SURFACE_BAND,
};

pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_service_account.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/test_service_account.pub.pem");

/// Address nothing listens on; connections are refused immediately
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub fn test_account() -> ServiceAccount {
    ServiceAccount {
        client_email: "analysis@farm-test.iam.gserviceaccount.com".to_string(),
        private_key: TEST_PRIVATE_KEY.to_string(),
    }
}

/// Serve a router on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{}", addr)
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// A clock the test moves by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn square_polygon() -> Vec<Coordinate> {
    vec![
        Coordinate::new(100.50, 13.70),
        Coordinate::new(100.51, 13.70),
        Coordinate::new(100.51, 13.71),
        Coordinate::new(100.50, 13.71),
    ]
}

pub fn square_polygon_json() -> Value {
    json!([[100.50, 13.70], [100.51, 13.70], [100.51, 13.71], [100.50, 13.71]])
}

/// Scripted remote sensing backend that counts every call it receives
pub struct FakeRemoteSensing {
    pub configured: bool,
    pub scene_count: u32,
    pub latest_scene_millis: Option<i64>,
    pub stats: RegionStats,
    /// `None` makes the SMAP query fail
    pub smap: Option<(Option<f64>, Option<f64>)>,
    /// `None` makes the ERA5-Land query fail
    pub era5: Option<(Option<f64>, Option<f64>, Option<f64>)>,
    pub delay: Duration,
    pub summarize_calls: AtomicUsize,
    pub tile_calls: AtomicUsize,
    pub reduce_calls: AtomicUsize,
    pub dataset_calls: AtomicUsize,
}

impl Default for FakeRemoteSensing {
    fn default() -> Self {
        Self {
            configured: true,
            scene_count: 7,
            // 2024-06-20T03:25:00Z
            latest_scene_millis: Some(1_718_853_900_000),
            stats: RegionStats {
                mean: Some(0.62),
                min: Some(0.18),
                max: Some(0.84),
            },
            smap: Some((Some(0.21), Some(0.27))),
            era5: Some((Some(0.33), Some(298.15), Some(288.15))),
            delay: Duration::ZERO,
            summarize_calls: AtomicUsize::new(0),
            tile_calls: AtomicUsize::new(0),
            reduce_calls: AtomicUsize::new(0),
            dataset_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRemoteSensing {
    pub fn total_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
            + self.tile_calls.load(Ordering::SeqCst)
            + self.reduce_calls.load(Ordering::SeqCst)
            + self.dataset_calls.load(Ordering::SeqCst)
    }

    pub fn into_backend(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl RemoteSensing for FakeRemoteSensing {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn connect(&self) -> AppResult<()> {
        if self.configured {
            Ok(())
        } else {
            Err(AppError::NotConfigured("no service account".to_string()))
        }
    }

    async fn summarize_composite(&self, _request: &CompositeRequest) -> AppResult<CompositeSummary> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(CompositeSummary {
            scene_count: self.scene_count,
            latest_scene_millis: self.latest_scene_millis,
        })
    }

    async fn composite_tiles(
        &self,
        _request: &CompositeRequest,
        _visualization: &TileVisualization,
    ) -> AppResult<String> {
        self.tile_calls.fetch_add(1, Ordering::SeqCst);
        Ok("https://tiles.test/v1/projects/p/maps/abc/tiles/{z}/{x}/{y}".to_string())
    }

    async fn reduce_composite(
        &self,
        _request: &CompositeRequest,
        _scale_meters: f64,
        _max_pixels: f64,
    ) -> AppResult<RegionStats> {
        self.reduce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stats)
    }

    async fn reduce_dataset(&self, request: &DatasetRequest) -> AppResult<BandValues> {
        self.dataset_calls.fetch_add(1, Ordering::SeqCst);
        let mut values = BandValues::new();
        match request.dataset.as_str() {
            SMAP_DATASET => {
                let (surface, root) = self
                    .smap
                    .ok_or_else(|| AppError::Upstream("SMAP unavailable".to_string()))?;
                values.insert(SMAP_SURFACE_BAND.to_string(), surface);
                values.insert(SMAP_ROOT_ZONE_BAND.to_string(), root);
            }
            ERA5_DATASET => {
                let (soil, temperature, dew_point) = self
                    .era5
                    .ok_or_else(|| AppError::Upstream("ERA5-Land unavailable".to_string()))?;
                values.insert(ERA5_SOIL_WATER_BAND.to_string(), soil);
                values.insert(ERA5_TEMPERATURE_BAND.to_string(), temperature);
                values.insert(ERA5_DEW_POINT_BAND.to_string(), dew_point);
            }
            other => return Err(AppError::Upstream(format!("unknown dataset {}", other))),
        }
        Ok(values)
    }
}
