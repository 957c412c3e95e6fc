//! Request orchestration: validate, consult the cache, fetch events, build
//! the grid, score it, optionally reduce to zones, and store the result.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use risk_map_cache::{CacheKey, ResultCache};
use risk_map_event_models::Event;
use risk_map_risk_models::{AggregationMode, CellRisk, PredictRequest, RiskSurface};

use crate::RiskError;
use crate::aggregate::aggregate;
use crate::config::RiskConfig;
use crate::grid::{build_grid, cell_count};
use crate::store::{BoundarySource, EventStore};
use crate::zonal::reduce_by_zone;

/// Name reported by `/api/meta` and mixed into every cache key.
pub const MODEL_NAME: &str = "kernel-decay";

/// Computes risk surfaces for prediction requests.
pub struct RiskService {
    config: RiskConfig,
    events: Arc<dyn EventStore>,
    cache: Arc<dyn ResultCache>,
    boundaries: Option<Arc<dyn BoundarySource>>,
}

impl RiskService {
    /// Creates a service without a boundary source; zonal requests fall
    /// back to cells until one is attached with [`Self::with_boundaries`].
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        config: RiskConfig,
        events: Arc<dyn EventStore>,
        cache: Arc<dyn ResultCache>,
    ) -> Result<Self, RiskError> {
        config.validate()?;

        Ok(Self {
            config,
            events,
            cache,
            boundaries: None,
        })
    }

    /// Attaches the zone polygons used for `agg = country`.
    #[must_use]
    pub fn with_boundaries(mut self, boundaries: Arc<dyn BoundarySource>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// The cache key for `request` under the current configuration.
    ///
    /// Covers every request parameter plus the decay constants and event
    /// cap.
    #[must_use]
    pub fn cache_key(&self, request: &PredictRequest) -> CacheKey {
        CacheKey::from_params(
            MODEL_NAME,
            [
                ("bbox", request.bbox.canonical()),
                ("horizon_days", request.horizon_days.to_string()),
                ("cell_size_deg", request.cell_size_deg.to_string()),
                ("agg", request.agg.to_string()),
                ("lookback_days", request.lookback_days.to_string()),
                ("timescale_days", self.config.timescale_days.to_string()),
                ("lengthscale_km", self.config.lengthscale_km.to_string()),
                ("max_events", self.config.max_events.to_string()),
            ],
        )
    }

    /// Computes (or recalls) the surface for `request` as of now.
    ///
    /// # Errors
    ///
    /// See [`Self::predict_risk_at`].
    pub fn predict_risk(&self, request: &PredictRequest) -> Result<RiskSurface, RiskError> {
        self.predict_risk_at(request, Utc::now())
    }

    /// Computes (or recalls) the surface for `request`, decaying events
    /// relative to `now`.
    ///
    /// Store and cache failures never fail the request: an unreachable
    /// event store scores against no events and a failed cache write is
    /// only logged. Surfaces computed without the event store are not
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidCellSize`] for a non-positive cell size
    /// and [`RiskError::GridTooLarge`] when the grid exceeds
    /// `max_grid_cells`.
    pub fn predict_risk_at(
        &self,
        request: &PredictRequest,
        now: DateTime<Utc>,
    ) -> Result<RiskSurface, RiskError> {
        let cells_needed = cell_count(&request.bbox, request.cell_size_deg)?;
        if cells_needed > self.config.max_grid_cells {
            return Err(RiskError::GridTooLarge {
                cells: cells_needed,
                max: self.config.max_grid_cells,
            });
        }

        let key = self.cache_key(request);
        if let Some(surface) = self.cache.get(&key) {
            log::debug!("Cache hit for {key}");
            return Ok(surface);
        }

        log::info!(
            "Cache miss for {key}, computing {cells_needed} cells: bbox={} cell={} agg={} lookback={}d horizon={}d",
            request.bbox.canonical(),
            request.cell_size_deg,
            request.agg,
            request.lookback_days,
            request.horizon_days,
        );

        let grid = build_grid(&request.bbox, request.cell_size_deg)?;
        let (events, events_ok) = self.fetch_events(request.lookback_days, now);
        let cells = aggregate(&grid, &events, now, &self.config.decay_params());

        let (surface, zones_ok) = match request.agg {
            AggregationMode::Cell => (RiskSurface::Cells { cells }, true),
            AggregationMode::Country => self.zonal_surface(cells),
        };
        let cacheable = events_ok && zones_ok;

        log::info!(
            "Computed {} features from {} events",
            surface.len(),
            events.len()
        );

        if cacheable && let Err(e) = self.cache.put(&key, &surface) {
            log::warn!("Failed to cache risk surface {key}: {e}");
        }

        Ok(surface)
    }

    /// Reads the lookback window. The flag is `false` when the store failed
    /// and the events are a stand-in empty list.
    fn fetch_events(&self, lookback_days: u32, now: DateTime<Utc>) -> (Vec<Event>, bool) {
        let since = now - Duration::days(i64::from(lookback_days));
        let limit = self.config.max_events;

        match self.events.recent_events(since, now, limit) {
            Ok(events) => {
                if limit > 0 && events.len() >= limit {
                    log::warn!("Event window truncated to the newest {limit} events");
                }
                (events, true)
            }
            Err(e) => {
                log::error!("Failed to read events, scoring without them: {e}");
                (Vec::new(), false)
            }
        }
    }

    /// Reduces to zones, or hands the cells back when no usable zone index
    /// is available. The fallback is never cached.
    fn zonal_surface(&self, cells: Vec<CellRisk>) -> (RiskSurface, bool) {
        let Some(source) = &self.boundaries else {
            log::warn!("No boundary source configured, returning cells");
            return (RiskSurface::Cells { cells }, false);
        };

        match source.zone_index() {
            Ok(index) if !index.is_empty() => (
                RiskSurface::Zones {
                    zones: reduce_by_zone(&cells, &index),
                },
                true,
            ),
            Ok(_) => {
                log::warn!("Zone index is empty, returning cells");
                (RiskSurface::Cells { cells }, false)
            }
            Err(e) => {
                log::warn!("Failed to load zones, returning cells: {e}");
                (RiskSurface::Cells { cells }, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StaticZones, StoreError};
    use chrono::TimeZone as _;
    use risk_map_cache::MemoryCache;
    use risk_map_risk_models::BoundingBox;
    use risk_map_spatial::{Zone, ZoneIndex};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockEvents {
        events: Vec<Event>,
        failures: usize,
        calls: AtomicUsize,
        last_window: Mutex<Option<(DateTime<Utc>, DateTime<Utc>, usize)>>,
    }

    impl MockEvents {
        fn with(events: Vec<Event>) -> Arc<Self> {
            Self::flaky(events, 0)
        }

        fn failing() -> Arc<Self> {
            Self::flaky(Vec::new(), usize::MAX)
        }

        /// Fails the first `failures` reads, then serves `events`.
        fn flaky(events: Vec<Event>, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                events,
                failures,
                calls: AtomicUsize::new(0),
                last_window: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventStore for MockEvents {
        fn recent_events(
            &self,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<Event>, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_window.lock().unwrap() = Some((since, until, limit));
            if call < self.failures {
                return Err("store offline".into());
            }
            Ok(self.events.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenBoundaries;

    impl BoundarySource for BrokenBoundaries {
        fn zone_index(&self) -> Result<Arc<ZoneIndex>, StoreError> {
            Err("no boundaries".into())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn request(bbox: BoundingBox, cell_size_deg: f64, agg: AggregationMode) -> PredictRequest {
        PredictRequest {
            bbox,
            cell_size_deg,
            agg,
            ..PredictRequest::default()
        }
    }

    fn square(name: &str, west: f64, south: f64, east: f64, north: f64) -> Zone {
        let value = geojson::Value::Polygon(vec![vec![
            vec![west, south],
            vec![east, south],
            vec![east, north],
            vec![west, north],
            vec![west, south],
        ]]);
        Zone::new(name, geojson::Geometry::new(value)).unwrap()
    }

    fn service(events: Arc<MockEvents>, cache: Arc<MemoryCache>) -> RiskService {
        RiskService::new(RiskConfig::default(), events, cache).unwrap()
    }

    fn small_box() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 20.0, 20.0)
    }

    #[test]
    fn scores_two_by_two_grid() {
        let events = MockEvents::with(vec![Event::new("e", Some(now()), 10.0, 10.0, Some(5.0))]);
        let svc = service(events, Arc::new(MemoryCache::new()));

        let surface = svc
            .predict_risk_at(&request(small_box(), 10.0, AggregationMode::Cell), now())
            .unwrap();

        let risks = surface.risks();
        assert_eq!(risks.len(), 4);
        let max = risks.iter().copied().fold(0.0, f64::max);
        assert!((max - 1.0).abs() < f64::EPSILON);
        assert!(risks.iter().all(|r| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn cache_hit_skips_event_store() {
        let events = MockEvents::with(vec![Event::new("e", Some(now()), 3.0, 3.0, None)]);
        let cache = Arc::new(MemoryCache::new());
        let svc = service(events.clone(), cache.clone());
        let req = request(small_box(), 5.0, AggregationMode::Cell);

        let first = svc.predict_risk_at(&req, now()).unwrap();
        let second = svc.predict_risk_at(&req, now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(events.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn store_failure_scores_zero_everywhere() {
        let svc = service(MockEvents::failing(), Arc::new(MemoryCache::new()));

        let surface = svc
            .predict_risk_at(&request(small_box(), 10.0, AggregationMode::Cell), now())
            .unwrap();

        assert_eq!(surface.len(), 4);
        assert!(surface.risks().iter().all(|r| *r == 0.0));
    }

    #[test]
    fn store_failure_is_not_cached() {
        let event = Event::new("e", Some(now()), 5.0, 5.0, Some(1.0));
        let events = MockEvents::flaky(vec![event], 1);
        let cache = Arc::new(MemoryCache::new());
        let svc = service(events.clone(), cache.clone());
        let req = request(small_box(), 10.0, AggregationMode::Cell);

        let degraded = svc.predict_risk_at(&req, now()).unwrap();
        assert!(degraded.risks().iter().all(|r| *r == 0.0));
        assert!(cache.is_empty());

        let recovered = svc.predict_risk_at(&req, now()).unwrap();
        assert!((recovered.risks()[0] - 1.0).abs() < f64::EPSILON);
        assert_eq!(events.calls(), 2);
        assert_eq!(cache.len(), 1);

        assert_eq!(svc.predict_risk_at(&req, now()).unwrap(), recovered);
        assert_eq!(events.calls(), 2);
    }

    #[test]
    fn no_events_still_returns_full_grid() {
        let svc = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()));

        let surface = svc
            .predict_risk_at(
                &request(BoundingBox::new(-10.0, -10.0, 10.0, 10.0), 2.0, AggregationMode::Cell),
                now(),
            )
            .unwrap();

        assert_eq!(surface.len(), 100);
        assert!(surface.risks().iter().all(|r| *r == 0.0));
    }

    #[test]
    fn invalid_cell_size_fails_before_touching_the_store() {
        let events = MockEvents::with(Vec::new());
        let svc = service(events.clone(), Arc::new(MemoryCache::new()));

        for size in [0.0, -1.0, f64::NAN] {
            let result = svc.predict_risk_at(&request(small_box(), size, AggregationMode::Cell), now());
            assert!(matches!(result, Err(RiskError::InvalidCellSize(_))));
        }
        assert_eq!(events.calls(), 0);
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let events = MockEvents::with(Vec::new());
        let svc = service(events.clone(), Arc::new(MemoryCache::new()));

        let result = svc.predict_risk_at(&request(BoundingBox::WORLD, 0.1, AggregationMode::Cell), now());
        assert!(matches!(
            result,
            Err(RiskError::GridTooLarge { cells: 6_480_000, max: 250_000 })
        ));
        assert_eq!(events.calls(), 0);
    }

    #[test]
    fn reads_the_lookback_window_ending_now() {
        let events = MockEvents::with(Vec::new());
        let svc = service(events.clone(), Arc::new(MemoryCache::new()));
        let req = PredictRequest {
            lookback_days: 30,
            ..request(small_box(), 10.0, AggregationMode::Cell)
        };

        svc.predict_risk_at(&req, now()).unwrap();

        let window = *events.last_window.lock().unwrap();
        let (since, until, limit) = window.unwrap();
        assert_eq!(until, now());
        assert_eq!(since, now() - Duration::days(30));
        assert_eq!(limit, 100_000);
    }

    #[test]
    fn horizon_keys_the_cache_but_not_the_values() {
        let events = MockEvents::with(vec![Event::new("e", Some(now()), 4.0, 12.0, Some(2.0))]);
        let cache = Arc::new(MemoryCache::new());
        let svc = service(events.clone(), cache.clone());

        let short = PredictRequest {
            horizon_days: 7,
            ..request(small_box(), 10.0, AggregationMode::Cell)
        };
        let long = PredictRequest {
            horizon_days: 365,
            ..short
        };

        assert_ne!(svc.cache_key(&short), svc.cache_key(&long));
        let a = svc.predict_risk_at(&short, now()).unwrap();
        let b = svc.predict_risk_at(&long, now()).unwrap();
        assert_eq!(a, b);
        assert_eq!(events.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_key_tracks_decay_constants() {
        let req = request(small_box(), 10.0, AggregationMode::Cell);
        let base = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()));
        let tuned = RiskService::new(
            RiskConfig {
                lengthscale_km: 50.0,
                ..RiskConfig::default()
            },
            MockEvents::with(Vec::new()),
            Arc::new(MemoryCache::new()),
        )
        .unwrap();

        assert_eq!(base.cache_key(&req), base.cache_key(&req));
        assert_ne!(base.cache_key(&req), tuned.cache_key(&req));
    }

    #[test]
    fn cache_key_covers_every_parameter() {
        let base_req = PredictRequest {
            horizon_days: 90,
            lookback_days: 365,
            ..request(small_box(), 10.0, AggregationMode::Cell)
        };
        let base_svc = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()));
        let base_key = base_svc.cache_key(&base_req);

        let requests = [
            ("bbox", PredictRequest { bbox: BoundingBox::new(0.0, 0.0, 20.0, 10.0), ..base_req }),
            ("horizon_days", PredictRequest { horizon_days: 30, ..base_req }),
            ("cell_size_deg", PredictRequest { cell_size_deg: 5.0, ..base_req }),
            ("agg", PredictRequest { agg: AggregationMode::Country, ..base_req }),
            ("lookback_days", PredictRequest { lookback_days: 30, ..base_req }),
        ];
        for (field, req) in requests {
            assert_ne!(base_svc.cache_key(&req), base_key, "{field} not keyed");
        }

        let configs = [
            ("timescale_days", RiskConfig { timescale_days: 7.0, ..RiskConfig::default() }),
            ("lengthscale_km", RiskConfig { lengthscale_km: 50.0, ..RiskConfig::default() }),
            ("max_events", RiskConfig { max_events: 10, ..RiskConfig::default() }),
        ];
        for (field, config) in configs {
            let svc = RiskService::new(
                config,
                MockEvents::with(Vec::new()),
                Arc::new(MemoryCache::new()),
            )
            .unwrap();
            assert_ne!(svc.cache_key(&base_req), base_key, "{field} not keyed");
        }

        let unkeyed = RiskService::new(
            RiskConfig {
                max_grid_cells: 10,
                ..RiskConfig::default()
            },
            MockEvents::with(Vec::new()),
            Arc::new(MemoryCache::new()),
        )
        .unwrap();
        assert_eq!(unkeyed.cache_key(&base_req), base_key);
    }

    #[test]
    fn rejects_invalid_config() {
        let result = RiskService::new(
            RiskConfig {
                timescale_days: 0.0,
                ..RiskConfig::default()
            },
            MockEvents::with(Vec::new()),
            Arc::new(MemoryCache::new()),
        );
        assert!(matches!(result, Err(RiskError::InvalidConfig(_))));
    }

    #[test]
    fn zonal_mode_averages_and_omits_empty_zones() {
        let events = MockEvents::with(vec![Event::new("e", Some(now()), 5.0, 5.0, Some(8.0))]);
        let zones = ZoneIndex::from_zones(vec![
            square("West", 0.0, 0.0, 10.0, 20.0),
            square("East", 10.0, 0.0, 20.0, 20.0),
            square("Elsewhere", 100.0, 0.0, 110.0, 10.0),
        ]);
        let svc = service(events, Arc::new(MemoryCache::new()))
            .with_boundaries(Arc::new(StaticZones::new(zones)));

        let surface = svc
            .predict_risk_at(&request(small_box(), 5.0, AggregationMode::Country), now())
            .unwrap();

        let RiskSurface::Zones { zones } = surface else {
            panic!("expected a zonal surface");
        };
        let names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["East", "West"]);
        assert!(zones[1].risk > zones[0].risk);
        assert!(zones.iter().all(|z| (0.0..=1.0).contains(&z.risk)));
    }

    #[test]
    fn zonal_mode_without_boundaries_falls_back_to_cells() {
        let cache = Arc::new(MemoryCache::new());
        let svc = service(MockEvents::with(Vec::new()), cache.clone());

        let surface = svc
            .predict_risk_at(&request(small_box(), 10.0, AggregationMode::Country), now())
            .unwrap();

        assert!(matches!(surface, RiskSurface::Cells { ref cells } if cells.len() == 4));
        assert!(cache.is_empty());
    }

    #[test]
    fn zonal_mode_with_broken_boundaries_falls_back_to_cells() {
        let svc = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()))
            .with_boundaries(Arc::new(BrokenBoundaries));

        let surface = svc
            .predict_risk_at(&request(small_box(), 10.0, AggregationMode::Country), now())
            .unwrap();
        assert!(matches!(surface, RiskSurface::Cells { .. }));

        let empty = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()))
            .with_boundaries(Arc::new(StaticZones::new(ZoneIndex::from_zones(Vec::new()))));
        let surface = empty
            .predict_risk_at(&request(small_box(), 10.0, AggregationMode::Country), now())
            .unwrap();
        assert!(matches!(surface, RiskSurface::Cells { .. }));
    }

    #[test]
    fn degenerate_box_yields_empty_surface() {
        let svc = service(MockEvents::with(Vec::new()), Arc::new(MemoryCache::new()));
        let surface = svc
            .predict_risk_at(
                &request(BoundingBox::new(5.0, 0.0, 5.0, 10.0), 1.0, AggregationMode::Cell),
                now(),
            )
            .unwrap();
        assert!(surface.is_empty());
    }
}
