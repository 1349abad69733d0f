//! Earth Engine REST client
//!
//! Owns the authenticated session (through [`TokenAcquirer`]) and translates
//! the typed [`RemoteSensing`] operations into expression graphs sent to
//! `value:compute` and `maps`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Days;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use shared::{DateRange, FieldPolygon, ValidationError};

use super::clock::ClockSkewProbe;
use super::expression::{Expression, Node};
use super::remote_sensing::{
    BandValues, CompositeRequest, CompositeSummary, DatasetRequest, RegionStats, RemoteSensing,
    SampleGeometry, TileVisualization, CLOUD_COVER_PROPERTY, NDVI_BAND,
};
use super::token::{TokenAcquirer, TokenAcquirerConfig};
use crate::config::EarthEngineConfig;
use crate::error::{AppError, AppResult};

const MAPPING_VAR: &str = "_MAPPING_VAR_0_0";
const TIME_START: &str = "system:time_start";
const DATASET_MAX_PIXELS: f64 = 1e9;

/// Earth Engine REST API client
#[derive(Clone)]
pub struct EarthEngineClient {
    http_client: Client,
    base_url: String,
    project: String,
    tokens: Arc<TokenAcquirer>,
}

enum Attempt {
    Done(Value),
    Unauthorized { token: String, detail: String },
}

impl EarthEngineClient {
    /// Create a new client around an existing token acquirer
    pub fn new(http_client: Client, base_url: String, project: String, tokens: Arc<TokenAcquirer>) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project,
            tokens,
        }
    }

    /// Build the client, its token acquirer and clock probe from configuration
    pub fn from_config(config: &EarthEngineConfig) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let probe = ClockSkewProbe::new(
            http_client.clone(),
            config.clock_probe_url.clone(),
            config.clock_probe_timeout(),
        );
        let tokens = TokenAcquirer::new(
            http_client.clone(),
            config.service_account(),
            TokenAcquirerConfig {
                token_url: config.token_url.clone(),
                scope: config.scope.clone(),
            },
            probe,
        );

        Ok(Self::new(
            http_client,
            config.api_base_url.clone(),
            config.project.clone(),
            Arc::new(tokens),
        ))
    }

    pub fn tokens(&self) -> &Arc<TokenAcquirer> {
        &self.tokens
    }

    fn project_url(&self, method: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project, method)
    }

    /// POST with a bearer token. A 401 invalidates the cached credential and
    /// the request is retried once with a freshly exchanged token.
    async fn post_authorized(&self, url: &str, body: &Value) -> AppResult<Value> {
        match self.send(url, body).await? {
            Attempt::Done(value) => Ok(value),
            Attempt::Unauthorized { token, detail } => {
                tracing::warn!("Remote sensing backend rejected token, re-authenticating: {}", detail);
                self.tokens.invalidate(&token).await;
                match self.send(url, body).await? {
                    Attempt::Done(value) => Ok(value),
                    Attempt::Unauthorized { detail, .. } => Err(AppError::Authentication(detail)),
                }
            }
        }
    }

    async fn send(&self, url: &str, body: &Value) -> AppResult<Attempt> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Ok(Attempt::Unauthorized {
                token,
                detail: truncate_body(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Earth Engine returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Earth Engine response: {}", e)))?;
        Ok(Attempt::Done(value))
    }

    async fn compute(&self, expression: Value) -> AppResult<Value> {
        let url = self.project_url("value:compute");
        let mut response = self
            .post_authorized(&url, &json!({ "expression": expression }))
            .await?;
        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RemoteSensing for EarthEngineClient {
    fn is_configured(&self) -> bool {
        self.tokens.is_configured()
    }

    async fn connect(&self) -> AppResult<()> {
        self.tokens.access_token().await.map(|_| ())
    }

    async fn summarize_composite(&self, request: &CompositeRequest) -> AppResult<CompositeSummary> {
        let mut expr = Expression::new();
        let geometry = polygon_node(&mut expr, &request.polygon);
        let scenes = filtered_scenes(&mut expr, request, geometry)?;
        let size = expr.call("Collection.size", [("collection", scenes.clone())]);
        let latest = expr.call(
            "AggregateFeatureCollection.max",
            [("collection", scenes), ("property", Node::constant(TIME_START))],
        );

        let result = self.compute(expr.into_json(Node::array(vec![size, latest]))).await?;
        parse_summary(&result)
    }

    async fn composite_tiles(
        &self,
        request: &CompositeRequest,
        visualization: &TileVisualization,
    ) -> AppResult<String> {
        let mut expr = Expression::new();
        let geometry = polygon_node(&mut expr, &request.polygon);
        let scenes = filtered_scenes(&mut expr, request, geometry.clone())?;
        let composite = ndvi_composite(&mut expr, request, scenes, geometry);

        let body = json!({
            "expression": expr.into_json(composite),
            "fileFormat": "PNG",
            "bandIds": [visualization.band],
            "visualizationOptions": {
                "ranges": [{ "min": visualization.min, "max": visualization.max }],
                "paletteColors": visualization.palette,
            },
        });

        let response = self.post_authorized(&self.project_url("maps"), &body).await?;
        let name = response
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Upstream("Map response did not include a name".to_string()))?;

        Ok(format!("{}/{}/tiles/{{z}}/{{x}}/{{y}}", self.base_url, name))
    }

    async fn reduce_composite(
        &self,
        request: &CompositeRequest,
        scale_meters: f64,
        max_pixels: f64,
    ) -> AppResult<RegionStats> {
        let mut expr = Expression::new();
        let geometry = polygon_node(&mut expr, &request.polygon);
        let scenes = filtered_scenes(&mut expr, request, geometry.clone())?;
        let composite = ndvi_composite(&mut expr, request, scenes, geometry.clone());

        let mean = expr.call0("Reducer.mean");
        let min = expr.call0("Reducer.min");
        let max = expr.call0("Reducer.max");
        let min_max = expr.call(
            "Reducer.combine",
            [("reducer1", min), ("reducer2", max), ("sharedInputs", Node::constant(true))],
        );
        let reducer = expr.call(
            "Reducer.combine",
            [("reducer1", mean), ("reducer2", min_max), ("sharedInputs", Node::constant(true))],
        );
        let reduced = expr.call(
            "Image.reduceRegion",
            [
                ("image", composite),
                ("reducer", reducer),
                ("geometry", geometry),
                ("scale", Node::constant(scale_meters)),
                ("maxPixels", Node::constant(max_pixels)),
            ],
        );

        let result = self.compute(expr.into_json(reduced)).await?;
        Ok(RegionStats {
            mean: number(&result, &format!("{}_mean", NDVI_BAND)),
            min: number(&result, &format!("{}_min", NDVI_BAND)),
            max: number(&result, &format!("{}_max", NDVI_BAND)),
        })
    }

    async fn reduce_dataset(&self, request: &DatasetRequest) -> AppResult<BandValues> {
        let mut expr = Expression::new();
        let geometry = match &request.geometry {
            SampleGeometry::Point(c) => expr.call(
                "GeometryConstructors.Point",
                [("coordinates", Node::constant(json!([c.longitude, c.latitude])))],
            ),
            SampleGeometry::Region(polygon) => polygon_node(&mut expr, polygon),
        };

        let collection = expr.call(
            "ImageCollection.load",
            [("id", Node::constant(request.dataset.as_str()))],
        );
        let date_filter = date_filter(&mut expr, &request.date_range)?;
        let filtered = expr.call(
            "Collection.filter",
            [("collection", collection), ("filter", date_filter)],
        );
        let mean_image = expr.call("reduce.mean", [("collection", filtered)]);
        let selected = expr.call(
            "Image.select",
            [
                ("input", mean_image),
                ("bandSelectors", Node::constant(json!(request.bands))),
            ],
        );
        let reducer = expr.call0("Reducer.mean");
        let reduced = expr.call(
            "Image.reduceRegion",
            [
                ("image", selected),
                ("reducer", reducer),
                ("geometry", geometry),
                ("scale", Node::constant(request.scale_meters)),
                ("maxPixels", Node::constant(DATASET_MAX_PIXELS)),
            ],
        );

        let result = self.compute(expr.into_json(reduced)).await?;
        Ok(request
            .bands
            .iter()
            .map(|band| (band.clone(), number(&result, band)))
            .collect())
    }
}

fn polygon_node(expr: &mut Expression, polygon: &FieldPolygon) -> Node {
    expr.call(
        "GeometryConstructors.Polygon",
        [
            ("coordinates", Node::constant(json!([polygon.closed_ring()]))),
            ("evenOdd", Node::constant(true)),
        ],
    )
}

/// Date filter over `system:time_start`; the backend's range end is
/// exclusive, so the last day is included by extending it by one day
fn date_filter(expr: &mut Expression, range: &DateRange) -> AppResult<Node> {
    let end = range.end_date.checked_add_days(Days::new(1)).ok_or_else(|| {
        AppError::Validation(ValidationError::InvalidDate {
            field: "endDate",
            value: range.end_iso(),
        })
    })?;
    let window = expr.call(
        "DateRange",
        [
            ("start", Node::constant(range.start_iso())),
            ("end", Node::constant(end.format("%Y-%m-%d").to_string())),
        ],
    );
    Ok(expr.call(
        "Filter.dateRangeContains",
        [("leftValue", window), ("rightField", Node::constant(TIME_START))],
    ))
}

/// Scenes intersecting the field, inside the window, under the cloud ceiling,
/// least cloudy first
fn filtered_scenes(expr: &mut Expression, request: &CompositeRequest, geometry: Node) -> AppResult<Node> {
    let collection = expr.call(
        "ImageCollection.load",
        [("id", Node::constant(request.collection.as_str()))],
    );

    let bounds = expr.call(
        "Filter.intersects",
        [("leftField", Node::constant(".all")), ("rightValue", geometry)],
    );
    let in_bounds = expr.call(
        "Collection.filter",
        [("collection", collection), ("filter", bounds)],
    );

    let dates = date_filter(expr, &request.date_range)?;
    let in_window = expr.call(
        "Collection.filter",
        [("collection", in_bounds), ("filter", dates)],
    );

    let cloud = expr.call(
        "Filter.lessThan",
        [
            ("leftField", Node::constant(CLOUD_COVER_PROPERTY)),
            ("rightValue", Node::constant(request.cloud_cover_ceiling)),
        ],
    );
    let clear = expr.call(
        "Collection.filter",
        [("collection", in_window), ("filter", cloud)],
    );

    Ok(expr.call(
        "Collection.limit",
        [
            ("collection", clear),
            ("key", Node::constant(CLOUD_COVER_PROPERTY)),
            ("ascending", Node::constant(true)),
        ],
    ))
}

/// Per-scene cloud masking and NDVI, median across scenes, clipped to the field
fn ndvi_composite(expr: &mut Expression, request: &CompositeRequest, scenes: Node, geometry: Node) -> Node {
    let scene = Node::argument(MAPPING_VAR);

    let classification = expr.call(
        "Image.select",
        [
            ("input", scene.clone()),
            ("bandSelectors", Node::constant(json!([request.classification_band]))),
        ],
    );

    let mut mask: Option<Node> = None;
    for class in &request.masked_classes {
        let constant = expr.call("Image.constant", [("value", Node::constant(*class))]);
        let keep = expr.call(
            "Image.neq",
            [("image1", classification.clone()), ("image2", constant)],
        );
        mask = Some(match mask {
            Some(acc) => expr.call("Image.and", [("image1", acc), ("image2", keep)]),
            None => keep,
        });
    }

    let usable = match mask {
        Some(mask) => expr.call("Image.updateMask", [("image", scene), ("mask", mask)]),
        None => scene,
    };

    let ndvi = expr.call(
        "Image.normalizedDifference",
        [
            ("input", usable),
            ("bandNames", Node::constant(json!([request.nir_band, request.red_band]))),
        ],
    );
    let named = expr.call(
        "Image.rename",
        [("input", ndvi), ("names", Node::constant(json!([NDVI_BAND])))],
    );
    let per_scene = expr.lambda(&[MAPPING_VAR], named);

    let mapped = expr.call(
        "Collection.map",
        [("collection", scenes), ("baseAlgorithm", per_scene)],
    );
    let median_reducer = expr.call0("Reducer.median");
    let median = expr.call(
        "ImageCollection.reduce",
        [("collection", mapped), ("reducer", median_reducer)],
    );
    // The median reducer suffixes band names with `_median`
    let renamed = expr.call(
        "Image.rename",
        [("input", median), ("names", Node::constant(json!([NDVI_BAND])))],
    );

    expr.call("Image.clip", [("input", renamed), ("geometry", geometry)])
}

fn parse_summary(result: &Value) -> AppResult<CompositeSummary> {
    let items = result
        .as_array()
        .ok_or_else(|| AppError::Upstream(format!("Unexpected composite summary: {}", result)))?;

    let scene_count = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| AppError::Upstream(format!("Composite summary missing scene count: {}", result)))?;

    Ok(CompositeSummary {
        scene_count: u32::try_from(scene_count).unwrap_or(u32::MAX),
        latest_scene_millis: items.get(1).and_then(Value::as_f64).map(|ms| ms as i64),
    })
}

fn number(result: &Value, key: &str) -> Option<f64> {
    result.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
