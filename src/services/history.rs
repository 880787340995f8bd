//! Scene history fetcher.
//!
//! Turns a path/row into the two per-satellite scene queries and reduces the
//! raw provider records into the date samples the predictor consumes.
use crate::clients::{
    Scene, SceneSearch, METADATA_ID_ACQUISITION_END, METADATA_ID_ACQUISITION_START,
};
use crate::domain::{Satellite, SceneDateInfo};
use crate::errors::{SweepError, SweepResult};
use crate::utils::parse_usgs_datetime;
use std::future::Future;

/// Per-satellite date samples for one path/row (Landsat 8, Landsat 9), in
/// provider order (newest first).
pub type SceneHistoryPair = (Vec<SceneDateInfo>, Vec<SceneDateInfo>);

/// History capability consumed by the sweeper; tests substitute stubs.
pub trait SceneHistorySource {
    fn fetch(
        &self,
        path: i32,
        row: i32,
        sample_count: usize,
    ) -> impl Future<Output = SweepResult<SceneHistoryPair>> + Send;
}

#[derive(Clone)]
pub struct SceneHistory<C> {
    client: C,
}

impl<C> SceneHistory<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: SceneSearch + Send + Sync> SceneHistorySource for SceneHistory<C> {
    async fn fetch(
        &self,
        path: i32,
        row: i32,
        sample_count: usize,
    ) -> SweepResult<SceneHistoryPair> {
        // The two queries run concurrently; a failure in either fails the
        // pair immediately.
        let (landsat8, landsat9) = tokio::try_join!(
            self.client
                .scene_search(path, row, Satellite::Landsat8, sample_count),
            self.client
                .scene_search(path, row, Satellite::Landsat9, sample_count),
        )?;

        Ok((reduce_scenes(&landsat8)?, reduce_scenes(&landsat9)?))
    }
}

/// Reduce raw scenes to date samples, preserving provider order. The fetcher
/// does not re-sort; callers treat the result as newest first.
fn reduce_scenes(scenes: &[Scene]) -> SweepResult<Vec<SceneDateInfo>> {
    scenes.iter().map(to_scene_date_info).collect()
}

fn to_scene_date_info(scene: &Scene) -> SweepResult<SceneDateInfo> {
    let mut acquisition_start = None;
    let mut acquisition_end = None;

    for metadata in &scene.metadata {
        if metadata.id == METADATA_ID_ACQUISITION_START {
            acquisition_start = parse_usgs_datetime(&metadata.value);
        }
        if metadata.id == METADATA_ID_ACQUISITION_END {
            acquisition_end = parse_usgs_datetime(&metadata.value);
        }
    }

    let acquisition_start = acquisition_start.ok_or_else(|| SweepError::MissingMetadata {
        entity_id: scene.entity_id.clone(),
        field: "Start Time",
    })?;
    let acquisition_end = acquisition_end.ok_or_else(|| SweepError::MissingMetadata {
        entity_id: scene.entity_id.clone(),
        field: "End Time",
    })?;

    Ok(SceneDateInfo {
        publish_date: scene.publish_date,
        acquisition_start,
        acquisition_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::SceneMetadata;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn scene(entity_id: &str, acquired: &str, published: DateTime<Utc>) -> Scene {
        Scene {
            entity_id: entity_id.to_string(),
            display_id: String::new(),
            cloud_cover: Some(10),
            publish_date: published,
            metadata: vec![
                SceneMetadata {
                    id: METADATA_ID_ACQUISITION_START.to_string(),
                    field_name: "Start Time".to_string(),
                    value: acquired.to_string(),
                },
                SceneMetadata {
                    id: METADATA_ID_ACQUISITION_END.to_string(),
                    field_name: "End Time".to_string(),
                    value: acquired.to_string(),
                },
            ],
        }
    }

    /// Stub client returning canned scenes, optionally failing one satellite.
    struct StubSearch {
        scenes: Vec<Scene>,
        fail_satellite: Option<Satellite>,
        calls: Mutex<Vec<Satellite>>,
    }

    impl SceneSearch for StubSearch {
        async fn scene_search(
            &self,
            _path: i32,
            _row: i32,
            satellite: Satellite,
            _max_results: usize,
        ) -> SweepResult<Vec<Scene>> {
            self.calls.lock().unwrap().push(satellite);
            if self.fail_satellite == Some(satellite) {
                return Err(SweepError::Upstream("scene-search returned HTTP 503".into()));
            }
            Ok(self.scenes.clone())
        }
    }

    #[tokio::test]
    async fn test_fetch_reduces_both_satellites() {
        let stub = StubSearch {
            scenes: vec![
                scene("SCENE-A", "2024-01-10 15:24:46", date(2024, 1, 12)),
                scene("SCENE-B", "2024-01-02 15:24:40", date(2024, 1, 4)),
            ],
            fail_satellite: None,
            calls: Mutex::new(Vec::new()),
        };
        let history = SceneHistory::new(stub);

        let (landsat8, landsat9) = history.fetch(14, 28, 10).await.unwrap();

        assert_eq!(landsat8.len(), 2);
        assert_eq!(landsat9.len(), 2);
        assert_eq!(
            landsat8[0].acquisition_start,
            Utc.with_ymd_and_hms(2024, 1, 10, 15, 24, 46).unwrap()
        );
        assert_eq!(landsat8[0].publish_date, date(2024, 1, 12));
        // Provider order is preserved, not re-sorted.
        assert!(landsat8[0].acquisition_start > landsat8[1].acquisition_start);
        assert_eq!(
            history.client.calls.lock().unwrap().as_slice(),
            &[Satellite::Landsat8, Satellite::Landsat9]
        );
    }

    #[tokio::test]
    async fn test_missing_start_time_names_the_scene() {
        let mut bad = scene("LC80140282024002LGN00", "2024-01-02 15:24:40", date(2024, 1, 4));
        bad.metadata.retain(|m| m.id != METADATA_ID_ACQUISITION_START);

        let stub = StubSearch {
            scenes: vec![bad],
            fail_satellite: None,
            calls: Mutex::new(Vec::new()),
        };
        let history = SceneHistory::new(stub);

        let err = history.fetch(14, 28, 10).await.unwrap_err();
        match err {
            SweepError::MissingMetadata { entity_id, field } => {
                assert_eq!(entity_id, "LC80140282024002LGN00");
                assert_eq!(field, "Start Time");
            }
            other => panic!("expected MissingMetadata, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_one_failed_query_fails_the_pair() {
        let stub = StubSearch {
            scenes: vec![scene("SCENE-A", "2024-01-10 15:24:46", date(2024, 1, 12))],
            fail_satellite: Some(Satellite::Landsat9),
            calls: Mutex::new(Vec::new()),
        };
        let history = SceneHistory::new(stub);

        let err = history.fetch(14, 28, 10).await.unwrap_err();
        assert!(matches!(err, SweepError::Upstream(_)));
    }
}
