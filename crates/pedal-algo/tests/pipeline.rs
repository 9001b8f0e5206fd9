use chrono::{Duration, NaiveDate, NaiveDateTime};
use pedal_algo::analysis::{by_model_bucket, by_station_bucket, covariate_scatter};
use pedal_algo::{
    build_panel, cross_validate, holdout_split, kfold_splits, validate_folds, FeatureGroup,
    FeatureLayout, HoldoutEvaluator, ModelRegistry, ModelSpec, Panel, TimeOfDay,
};
use pedal_core::{
    Coordinates, CvConfig, Diagnostics, ExclusionCause, ExclusionReport, FaerSolver,
    HoldoutWindows, Interval, RecordId, Station, StationId, StationRegistry, TripEvent, Weather,
    WeatherObservation, WeatherPolicy, WeekKey,
};
use pedal_io::{load_inputs, InputPaths};
use pedal_ts::{LagFeatureEngine, TimeGrid};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

// Monday of ISO week 18
fn week18(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 4, 30)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn weeks(first: &str, last: &str) -> [WeekKey; 2] {
    [first.parse().unwrap(), last.parse().unwrap()]
}

fn registry(ids: &[&str]) -> StationRegistry {
    let stations = ids
        .iter()
        .map(|id| Station::new(StationId::new(*id), Coordinates::new(39.95, -75.16)));
    StationRegistry::from_stations(stations, &mut Diagnostics::new())
}

#[test]
fn two_stations_four_hours_zero_fill() {
    let registry = registry(&["A", "B"]);
    let grid = TimeGrid::new(week18(0), week18(4), Duration::hours(1)).unwrap();
    let mut trips = vec![TripEvent::new(StationId::new("A"), week18(1)); 3];
    trips.push(TripEvent::new(StationId::new("B"), week18(3)));

    let (panel, _) = build_panel(&registry, &grid, &trips, &[], &WeatherPolicy::default());
    assert_eq!(panel.len(), registry.len() * grid.len());
    assert_eq!(panel.len(), 8);
    assert_eq!(panel.records().iter().filter(|r| r.trip_count == 0).count(), 6);
    assert_eq!(panel.total_trips(), 4);
}

#[test]
fn lag_matches_shifted_counts_for_every_station() {
    let registry = registry(&["A", "B", "C"]);
    let grid = TimeGrid::new(week18(0), week18(0) + Duration::days(3), Duration::hours(1)).unwrap();
    let trips: Vec<TripEvent> = (0..grid.len())
        .flat_map(|i| {
            let station = ["A", "B", "C"][i % 3];
            let start = grid.interval(i).unwrap().start();
            (0..(i % 4)).map(move |_| TripEvent::new(StationId::new(station), start))
        })
        .collect();
    let (mut panel, _) = build_panel(&registry, &grid, &trips, &[], &WeatherPolicy::default());
    let offsets = vec![1, 2, 3, 4, 12, 24];
    panel
        .apply_lag_features(&LagFeatureEngine::new(offsets.clone(), Vec::new(), 3))
        .unwrap();

    for station in 0..registry.len() {
        let partition = panel.partition(station);
        for (i, record) in partition.iter().enumerate() {
            for &k in &offsets {
                let expected = i.checked_sub(k).map(|j| partition[j].trip_count);
                assert_eq!(record.lag(k), expected, "station {station} index {i} lag {k}");
            }
        }
    }
}

fn weekly_panel(weeks: i64, temperature: f64) -> Panel {
    let registry = registry(&["A", "B"]);
    let grid = TimeGrid::new(week18(0), week18(0) + Duration::weeks(weeks), Duration::hours(1))
        .unwrap();
    let trips: Vec<TripEvent> = grid
        .intervals()
        .iter()
        .enumerate()
        .flat_map(|(i, interval)| {
            let busy = match interval.hour() {
                7..=9 | 16..=18 => 3 + (i % 3),
                _ => i % 2,
            };
            (0..busy).map(move |_| TripEvent::new(StationId::new("A"), interval.start()))
        })
        .collect();
    let weather: Vec<WeatherObservation> = grid
        .intervals()
        .iter()
        .map(|interval| WeatherObservation {
            interval: *interval,
            weather: Weather {
                temperature,
                precipitation: 0.0,
                wind_speed: 5.0,
            },
        })
        .collect();
    let (mut panel, _) = build_panel(&registry, &grid, &trips, &weather, &WeatherPolicy::default());
    panel
        .apply_lag_features(&LagFeatureEngine::new(vec![1, 24], Vec::new(), 3))
        .unwrap();
    panel
}

#[test]
fn temporal_holdout_is_finite_and_reproducible() {
    let panel = weekly_panel(4, 65.0);
    let registry =
        ModelRegistry::new(vec![ModelSpec::new("temporal", vec![FeatureGroup::Temporal])])
            .unwrap();
    let windows = HoldoutWindows {
        train_weeks: weeks("2018-W18", "2018-W20"),
        test_weeks: weeks("2018-W21", "2018-W21"),
    };
    let run = || {
        let mut evaluator = HoldoutEvaluator::new(
            windows,
            FeatureLayout::for_panel(&panel, 3),
            Arc::new(FaerSolver),
        );
        evaluator.run(&panel, &registry).unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.weekly.len(), 1);
    let mae = first.weekly[0].metrics.mae.unwrap();
    assert!(mae.is_finite() && mae >= 0.0);
    assert_eq!(first.weekly[0].metrics.failed, 0);
    assert_eq!(first.weekly, second.weekly);
}

#[test]
fn constant_weather_does_not_break_weather_models() {
    let panel = weekly_panel(4, 65.0);
    let windows = HoldoutWindows {
        train_weeks: weeks("2018-W18", "2018-W20"),
        test_weeks: weeks("2018-W21", "2018-W21"),
    };
    let mut evaluator = HoldoutEvaluator::new(
        windows,
        FeatureLayout::for_panel(&panel, 3),
        Arc::new(FaerSolver),
    );
    let outcome = evaluator
        .run(&panel, &ModelRegistry::default_registry())
        .unwrap();
    let weather_model = outcome
        .weekly
        .iter()
        .find(|w| w.model == "temporal_spatial_weather")
        .unwrap();
    assert!(weather_model.metrics.mae.unwrap() >= 0.0);
    assert_eq!(weather_model.metrics.failed, 0);
    // no station has demographics: demographic models see no rows at all
    assert_eq!(
        outcome
            .exclusions
            .count("full", ExclusionCause::JoinGapDemographics),
        2 * 24 * 28
    );

    let buckets = by_model_bucket(&outcome.predictions);
    assert!(buckets
        .iter()
        .filter_map(|b| b.metrics.mae)
        .all(|mae| mae >= 0.0));
    let stations = by_station_bucket(&outcome.predictions, panel.stations(), "temporal_spatial");
    assert!(!stations.is_empty());
    assert!(covariate_scatter(
        &outcome.predictions,
        panel.stations(),
        "temporal_spatial",
        TimeOfDay::AmRush
    )
    .is_empty());
}

#[test]
fn holdout_never_trains_on_a_later_year() {
    let registry = registry(&["A"]);
    let start = NaiveDate::from_ymd_opt(2018, 5, 14)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let end = NaiveDate::from_ymd_opt(2019, 5, 28)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let grid = TimeGrid::new(start, end, Duration::hours(1)).unwrap();
    let trips: Vec<TripEvent> = grid
        .intervals()
        .iter()
        .filter(|interval| interval.hour() == 8)
        .map(|interval| TripEvent::new(StationId::new("A"), interval.start()))
        .collect();
    let (panel, _) = build_panel(&registry, &grid, &trips, &[], &WeatherPolicy::default());
    let windows = HoldoutWindows {
        train_weeks: weeks("2018-W20", "2018-W20"),
        test_weeks: weeks("2018-W21", "2018-W21"),
    };

    let split = holdout_split(panel.records(), &windows).unwrap();
    assert_eq!(split.train.len(), 7 * 24);
    assert_eq!(split.test.len(), 7 * 24);
    let start_of = |id: &RecordId| panel.record(*id).unwrap().interval.start();
    let last_train = split.train.iter().map(start_of).max().unwrap();
    let first_test = split.test.iter().map(start_of).min().unwrap();
    assert!(last_train < first_test, "{last_train} trains after {first_test}");
    assert!(split
        .train
        .iter()
        .chain(&split.test)
        .all(|id| start_of(id) < end - Duration::weeks(4)));

    let registry =
        ModelRegistry::new(vec![ModelSpec::new("temporal", vec![FeatureGroup::Temporal])])
            .unwrap();
    let mut evaluator = HoldoutEvaluator::new(
        windows,
        FeatureLayout::for_panel(&panel, 3),
        Arc::new(FaerSolver),
    );
    let outcome = evaluator.run(&panel, &registry).unwrap();
    assert_eq!(outcome.splits[0].train_rows, 7 * 24);
    let tested: Vec<String> = outcome.weekly.iter().map(|w| w.week.to_string()).collect();
    assert_eq!(tested, vec!["2018-W21"]);
}

#[test]
fn hundred_ids_five_folds() {
    let universe: Vec<RecordId> = (0..100).map(RecordId).collect();
    let splits = kfold_splits(&universe, 5, 2018).unwrap();
    assert_eq!(splits.len(), 5);
    let folds: Vec<Vec<RecordId>> = splits.iter().map(|s| s.test.clone()).collect();
    assert!(folds.iter().all(|f| f.len() == 20));
    validate_folds(&folds, &universe).unwrap();

    let mut seen = HashSet::new();
    for fold in &folds {
        for id in fold {
            assert!(seen.insert(*id));
        }
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(kfold_splits(&universe, 5, 2018).unwrap(), splits);
}

#[test]
fn cross_validation_over_eligible_panel() {
    let panel = weekly_panel(2, 65.0);
    let registry = ModelRegistry::new(vec![
        ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
        ModelSpec::new(
            "temporal_spatial_weather",
            vec![FeatureGroup::Temporal, FeatureGroup::Spatial, FeatureGroup::Weather],
        ),
        ModelSpec::new(
            "lagged",
            vec![FeatureGroup::Temporal, FeatureGroup::Spatial, FeatureGroup::Lag],
        ),
    ])
    .unwrap();
    let cv = CvConfig { folds: 5, seed: 42 };
    let outcome = cross_validate(
        &panel,
        &registry,
        &FeatureLayout::for_panel(&panel, 3),
        &cv,
        &FaerSolver,
    )
    .unwrap();
    assert_eq!(outcome.universe, panel.len() - 2 * 24);
    assert_eq!(outcome.folds.len(), 15);
    for row in &outcome.summary {
        let (mae, rmse) = (row.mae_mean.unwrap(), row.rmse_mean.unwrap());
        assert!(mae >= 0.0 && rmse >= 0.0);
        assert!(rmse >= mae);
    }
}

#[test]
fn csv_inputs_to_panel() {
    let dir = tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    };
    let paths = InputPaths {
        stations: write(
            "stations.csv",
            "station_id,lat,lon,tract_id\n3010,39.95,-75.16,t1\n3021,39.96,-75.17,t2\n",
        ),
        demographics: write(
            "demographics.csv",
            "tract_id,total_pop,median_income,median_age,white_pop,travel_time_total,commuters,transit_commuters\n\
             t1,4000,52000,34,2000,56000,2000,600\n",
        ),
        weather: write(
            "weather.csv",
            "timestamp,temperature,precipitation,wind_speed\n\
             2018-04-30 00:10:00,0,0,4\n2018-04-30 01:10:00,55,0,4\n",
        ),
        trips: write(
            "trips.csv",
            "station_id,start_time\n\
             3010,2018-04-30 00:15:00\n\
             3010,2018-04-30 00:45:00\n\
             3021,2018-04-30 02:05:00\n\
             9999,2018-04-30 02:05:00\n\
             3021,2018-06-30 02:05:00\n\
             3010,not-a-time\n\
             ,2018-04-30 01:30:00\n",
        ),
    };
    let inputs = load_inputs(&paths, Duration::hours(1)).unwrap();
    let grid = TimeGrid::new(week18(0), week18(4), Duration::hours(1)).unwrap();
    let (panel, mut report) = build_panel(
        &inputs.registry,
        &grid,
        &inputs.trips,
        &inputs.weather,
        &WeatherPolicy::default(),
    );
    report.record_malformed(inputs.malformed_rows());

    assert_eq!(panel.len(), 8);
    // only events at known stations inside the study period are counted
    assert_eq!(panel.total_trips(), 3);
    assert_eq!(report.unknown_station, 1);
    assert_eq!(report.outside_period, 1);
    // unknown station, out of period, bad timestamp and missing station
    assert_eq!(report.malformed_rows, 2);
    assert_eq!(
        report
            .exclusions
            .count(ExclusionReport::PANEL_SCOPE, ExclusionCause::SchemaViolation),
        4
    );
    assert_eq!(report.zero_temperature_replaced, 1);
    assert_eq!(panel.partition(0)[0].weather.unwrap().temperature, 42.0);
    assert_eq!(panel.partition(0)[0].trip_count, 2);
    assert!(panel.partition(1)[0].demographics.is_none());
    assert_eq!(panel.partition(1)[2].interval, Interval::from_start(week18(2)));
}
