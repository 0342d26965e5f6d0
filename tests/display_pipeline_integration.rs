//! Integration tests for the display pipeline: modes, smoothing, layout

mod common;

use common::builders::ScopeConfigBuilder;
use common::scope_helpers::{create_test_scope, TestScope};
use common::{assert_float_eq, ts};
use pvscope::analysis::SeriesKind;
use pvscope::config::{DisplayConfig, DisplayMode};
use pvscope::display::AxisLayout;
use pvscope::sim::{SimSignal, SimulatedSource, WavePattern};
use pvscope::{RefreshCommand, SampleEvent, Timestamp};

/// 200 samples of a unit 50 Hz sine at 1 kHz, with `w.t` as X axis
fn sine_scope(mode: DisplayMode) -> TestScope {
    let config = ScopeConfigBuilder::new()
        .field_channel("w", "y")
        .capacity(200)
        .x_axis("w.t")
        .mode(mode)
        .build();
    let scope = create_test_scope(config);

    let mut source = SimulatedSource::new(200, 1000.0, Timestamp::new(100, 0))
        .with_signal(SimSignal::array(
            "w",
            "y",
            WavePattern::Sine {
                frequency: 50.0,
                amplitude: 1.0,
                offset: 0.0,
            },
        ))
        .with_time_field("w", "t");
    for event in source.next_events() {
        scope.engine.ingest(event).unwrap();
    }
    scope
}

fn points(scope: &mut TestScope) -> Vec<[f64; 2]> {
    let frame = scope.frame().unwrap();
    frame.channel(1).unwrap().series.points.clone()
}

#[test]
fn test_normal_mode_uses_x_axis() {
    let mut scope = sine_scope(DisplayMode::Normal);
    let pts = points(&mut scope);
    assert_eq!(pts.len(), 200);
    assert_float_eq(pts[0][0], 0.0, 1e-12);
    assert_float_eq(pts[199][0], 0.199, 1e-9);
}

#[test]
fn test_fft_peak_at_signal_frequency() {
    let mut scope = sine_scope(DisplayMode::Fft);
    let frame = scope.frame().unwrap();
    let series = &frame.channel(1).unwrap().series;
    assert_eq!(series.kind, SeriesKind::Spectrum);
    assert_eq!(series.len(), 101);

    let peak = series.points[1..]
        .iter()
        .copied()
        .fold([0.0, f64::MIN], |best, p| if p[1] > best[1] { p } else { best });
    assert_float_eq(peak[0], 50.0, 1e-6);
    assert_float_eq(peak[1], 1.0, 1e-6);
    assert!(frame.trigger_marker.is_none());
}

#[test]
fn test_psd_integrates_to_mean_square() {
    let mut scope = sine_scope(DisplayMode::Psd);
    let pts = points(&mut scope);
    let df = pts[1][0] - pts[0][0];
    let power: f64 = pts.iter().map(|p| p[1]).sum::<f64>() * df;
    assert_float_eq(power, 0.5, 1e-6);
}

#[test]
fn test_autocorrelation_lag_zero() {
    let mut scope = sine_scope(DisplayMode::AutocorrelateFft);
    let pts = points(&mut scope);
    assert_eq!(pts.len(), 200);
    assert_float_eq(pts[0][1], 0.5, 1e-9);
}

#[test]
fn test_diff_mode() {
    let config = ScopeConfigBuilder::new()
        .channel("a")
        .mode(DisplayMode::Diff)
        .build();
    let mut scope = create_test_scope(config);
    scope
        .engine
        .ingest(SampleEvent::new("a", vec![1.0, 4.0, 9.0, 16.0], ts(1)))
        .unwrap();
    assert_eq!(scope.channel_values(1).unwrap(), vec![3.0, 5.0, 7.0]);
}

#[test]
fn test_single_sample_too_short_for_fft() {
    let config = ScopeConfigBuilder::new()
        .channel("a")
        .mode(DisplayMode::Fft)
        .build();
    let mut scope = create_test_scope(config);
    scope.engine.ingest(SampleEvent::new("a", 1.0, ts(1))).unwrap();

    let frame = scope.frame().unwrap();
    assert!(frame.is_empty());
    assert!(frame.axis_bounds.is_none());
}

#[test]
fn test_histogram_of_square_wave() {
    let config = ScopeConfigBuilder::new()
        .channel("a")
        .capacity(100)
        .histogram(10)
        .build();
    let mut scope = create_test_scope(config);
    let square: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    scope.engine.ingest(SampleEvent::new("a", square, ts(1))).unwrap();

    let frame = scope.frame().unwrap();
    let series = &frame.channel(1).unwrap().series;
    assert!(matches!(series.kind, SeriesKind::Histogram { .. }));
    assert_eq!(series.len(), 10);
    let counts: Vec<f64> = series.ys().collect();
    assert_eq!(counts[0], 50.0);
    assert_eq!(counts[9], 50.0);
    assert_eq!(counts.iter().sum::<f64>(), 100.0);
}

#[test]
fn test_dc_offset_and_smoothing_across_ticks() {
    let mut config = ScopeConfigBuilder::new().channel("a").capacity(2).build();
    config.display.ema_factor = 3;
    let mut scope = create_test_scope(config);
    scope.engine.set_dc_offset(1, 10.0).unwrap();

    scope
        .engine
        .ingest(SampleEvent::new("a", vec![0.0, 0.0], ts(1)))
        .unwrap();
    assert_eq!(scope.channel_values(1).unwrap(), vec![10.0, 10.0]);

    scope
        .engine
        .ingest(SampleEvent::new("a", vec![2.0, 2.0], ts(2)))
        .unwrap();
    assert_eq!(scope.channel_values(1).unwrap(), vec![11.0, 11.0]);
}

#[test]
fn test_multi_axis_layout_via_command() {
    let config = ScopeConfigBuilder::new().channel("a").channel("b").build();
    let mut scope = create_test_scope(config);
    scope
        .engine
        .ingest(SampleEvent::new("a", vec![0.0, 1.0], ts(1)))
        .unwrap();
    scope
        .engine
        .ingest(SampleEvent::new("b", vec![100.0, 300.0], ts(1)))
        .unwrap();

    let frame = scope.frame().unwrap();
    assert_eq!(frame.layout, AxisLayout::Single);
    assert_eq!(frame.channel(2).unwrap().y_bounds, Some((0.0, 300.0)));

    scope
        .commands
        .send(RefreshCommand::SetDisplay(DisplayConfig {
            single_axis: false,
            ..Default::default()
        }))
        .unwrap();
    // A running loop drains commands before each tick
    scope.commands.send(RefreshCommand::Shutdown).unwrap();
    scope.refresh.run();

    let frame = scope.frame().unwrap();
    assert_eq!(frame.layout, AxisLayout::Multi);
    assert_eq!(frame.channel(1).unwrap().y_bounds, Some((0.0, 1.0)));
    assert_eq!(frame.channel(2).unwrap().y_bounds, Some((100.0, 300.0)));
}
