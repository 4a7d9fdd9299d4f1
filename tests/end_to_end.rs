use lumispec::config::AppConfig;
use lumispec::library::{Metric, SearchOutcome};
use lumispec::processing::{PreprocessingConfig, Stage};
use lumispec::protocol::frame::encode_spectrum_reply;
use lumispec::protocol::{ScriptedTransport, SessionConfig, PIXEL_COUNT};
use lumispec::{AxisUnit, SpectrometerContext};
use lumispec::cancel::NoProgress;

fn context(replies: Vec<Vec<u8>>) -> SpectrometerContext {
    let mut config = AppConfig::default();
    config.device.session = SessionConfig {
        reply_timeout_ms: 50,
        read_timeout_ms: 50,
        settle_ms: 0,
        average: 1,
    };
    config.search.min_overlap = 100.0;
    config.search.metric = Metric::Sad;
    let mut ctx = SpectrometerContext::new(&config).unwrap();
    ctx.session.attach(Box::new(ScriptedTransport::with_replies(replies)));
    ctx
}

#[test]
fn device_reply_to_ranked_match() {
    let mut samples = vec![0u16; PIXEL_COUNT];
    samples[1024] = 1000;
    let mut ctx = context(vec![encode_spectrum_reply(&samples)]);

    let spectrum = ctx.acquire_single().unwrap();
    assert_eq!(spectrum.unit(), AxisUnit::WavelengthNm);
    assert_eq!(spectrum.len(), PIXEL_COUNT);
    assert_eq!(spectrum.axis()[0], 796.0);
    assert_eq!(spectrum.axis()[PIXEL_COUNT - 1], 1119.0);
    assert_eq!(spectrum.intensity()[1024], 1000.0);

    ctx.set_processing(PreprocessingConfig::enabled([Stage::Crop { min: 796.0, max: 1119.0 }]).unwrap())
        .unwrap();
    let processed = ctx.apply_processing().unwrap().clone();
    assert_eq!(processed.len(), PIXEL_COUNT);

    let key = ctx.add_current_to_library("reference").unwrap();
    let outcome = ctx.search(&mut NoProgress).unwrap();
    let SearchOutcome::Completed(rows) = outcome else {
        panic!("search was not expected to be cancelled");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, key);
    assert_eq!(rows[0].metric, "sad");
    assert!(rows[0].distance_score.abs() < 1e-6);
    assert_eq!(ctx.results().len(), 1);
}

#[test]
fn missing_device_reply_yields_zero_spectrum() {
    let mut ctx = context(vec![]);
    let spectrum = ctx.acquire_single().unwrap();
    assert_eq!(spectrum.len(), PIXEL_COUNT);
    assert!(spectrum.intensity().iter().all(|v| *v == 0.0));
}
