/// USGS M2M API client module
use crate::domain::Satellite;
use crate::errors::{SweepError, SweepResult};
use crate::utils::deserialize_usgs_datetime;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Collection 2 Level-2 dataset queried for scene history.
pub const DATASET_LANDSAT_C2_L2: &str = "landsat_ot_c2_l2";

// Well-known M2M metadata filter ids for the landsat_ot_c2_l2 dataset.
pub const FILTER_ID_WRS_PATH: &str = "5e83d14fb9436d88";
pub const FILTER_ID_WRS_ROW: &str = "5e83d14ff1eda1b8";
pub const FILTER_ID_SATELLITE: &str = "61af9273566bb9a8";

// Well-known metadata ids carrying the acquisition timestamps on each scene.
pub const METADATA_ID_ACQUISITION_START: &str = "5e83d150f3ba8369";
pub const METADATA_ID_ACQUISITION_END: &str = "5e83d1506939e64b";

/// Scene search capability consumed by the history fetcher. The production
/// implementation is [`UsgsClient`]; tests substitute stubs.
pub trait SceneSearch {
    fn scene_search(
        &self,
        path: i32,
        row: i32,
        satellite: Satellite,
        max_results: usize,
    ) -> impl Future<Output = SweepResult<Vec<Scene>>> + Send;
}

/// Response envelope shared by every M2M endpoint. The `data` payload differs
/// per endpoint; errors come back in-band as `errorCode`/`errorMessage`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsgsResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error_code: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginTokenRequest<'a> {
    username: &'a str,
    token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneSearchRequest {
    dataset_name: &'static str,
    max_results: usize,
    use_customization: bool,
    scene_filter: SceneFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneFilter {
    metadata_filter: MetadataFilter,
}

/// M2M metadata filter expression. Only the shapes the scene queries need.
#[derive(Debug, Serialize)]
#[serde(tag = "filterType", rename_all = "camelCase")]
enum MetadataFilter {
    #[serde(rename_all = "camelCase")]
    And { child_filters: Vec<MetadataFilter> },
    #[serde(rename_all = "camelCase")]
    Value {
        filter_id: &'static str,
        value: String,
        operand: &'static str,
    },
}

impl MetadataFilter {
    fn equals(filter_id: &'static str, value: impl ToString) -> Self {
        MetadataFilter::Value {
            filter_id,
            value: value.to_string(),
            operand: "=",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSearchResponse {
    pub results: Vec<Scene>,
    #[serde(default)]
    pub records_returned: i32,
    #[serde(default)]
    pub total_hits: i32,
}

/// One scene record, reduced to the fields the predictor pipeline reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub entity_id: String,
    #[serde(default)]
    pub display_id: String,
    #[serde(default)]
    pub cloud_cover: Option<i32>,
    #[serde(deserialize_with = "deserialize_usgs_datetime")]
    pub publish_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Vec<SceneMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    pub id: String,
    #[serde(default)]
    pub field_name: String,
    pub value: String,
}

/// Authenticated USGS M2M client. Logging in exchanges the application token
/// for a session token sent as `X-Auth-Token` on every subsequent request.
#[derive(Clone)]
pub struct UsgsClient {
    http: Client,
    base_url: String,
    auth_token: String,
}

impl UsgsClient {
    pub async fn login(
        base_url: impl Into<String>,
        username: &str,
        token: &str,
    ) -> SweepResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("landsat-notify/0.1")
            .build()?;

        let mut client = Self {
            http,
            base_url: base_url.into(),
            auth_token: String::new(),
        };

        let auth_token: String = client
            .query("login-token", &LoginTokenRequest { username, token })
            .await?;
        client.auth_token = auth_token;

        tracing::info!("authenticated against USGS M2M API");
        Ok(client)
    }

    async fn query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: &impl Serialize,
    ) -> SweepResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.http.post(&url).json(request);
        if !self.auth_token.is_empty() {
            req = req.header("X-Auth-Token", &self.auth_token);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(SweepError::Upstream(format!(
                "{endpoint} returned HTTP {}",
                response.status()
            )));
        }

        let envelope: UsgsResponse<T> = response.json().await?;
        if let Some(code) = envelope.error_code {
            let message = envelope.error_message.unwrap_or_default();
            return Err(SweepError::Upstream(format!(
                "{endpoint} failed with code {code}: {message}"
            )));
        }

        envelope
            .data
            .ok_or_else(|| SweepError::Upstream(format!("{endpoint} returned no data payload")))
    }
}

fn scene_search_request(
    path: i32,
    row: i32,
    satellite: Satellite,
    max_results: usize,
) -> SceneSearchRequest {
    SceneSearchRequest {
        dataset_name: DATASET_LANDSAT_C2_L2,
        max_results,
        use_customization: false,
        scene_filter: SceneFilter {
            metadata_filter: MetadataFilter::And {
                child_filters: vec![
                    MetadataFilter::equals(FILTER_ID_WRS_PATH, path),
                    MetadataFilter::equals(FILTER_ID_WRS_ROW, row),
                    MetadataFilter::equals(FILTER_ID_SATELLITE, satellite.number()),
                ],
            },
        },
    }
}

impl SceneSearch for UsgsClient {
    async fn scene_search(
        &self,
        path: i32,
        row: i32,
        satellite: Satellite,
        max_results: usize,
    ) -> SweepResult<Vec<Scene>> {
        let request = scene_search_request(path, row, satellite, max_results);
        let response: SceneSearchResponse = self.query("scene-search", &request).await?;
        tracing::debug!(
            path,
            row,
            satellite = %satellite,
            returned = response.results.len(),
            "scene search completed"
        );
        Ok(response.results)
    }
}
