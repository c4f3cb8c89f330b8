//! Integration tests for audren-config.
//!
//! These tests cover the file layer and drive a renderer from a scenario.

use audren_config::{ConfigError, EngineConfig, Scenario, ValidationError};
use audren_core::{AudioRenderer, PoolMapper};
use tempfile::TempDir;

#[test]
fn save_creates_parent_directories_and_reloads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("engine.toml");

    let mut config = EngineConfig::default();
    config.renderer.sub_mix_count = 12;
    config.driver.device = Some("Speakers".into());
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn load_validated_rejects_bad_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "[renderer]\nsample_rate = 44100\n").unwrap();

    let err = EngineConfig::load_validated(&path).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Validation(ValidationError::Unsupported {
            field: "renderer.sample_rate",
            ..
        })
    ));
}

#[test]
fn missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = EngineConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

// ---------------------------------------------------------------------------
// Scenario to renderer
// ---------------------------------------------------------------------------

const CHAIN: &str = r#"
[config.renderer]
sub_mix_count = 3
effect_count = 2
sink_count = 1

[[pools]]
cpu_address = 0x10000
dsp_address = 0x900000
size = 0x10000

[[frames]]
repeat = 2

[[frames.mixes]]
id = 0

[[frames.mixes]]
id = 1
destination = 0

[[frames.mixes]]
id = 2
destination = 1

[[frames.mixes]]
id = 3
destination = 2

[[frames.effects]]
slot = 0
kind = "delay"
mix = 2
order = 0
work_buffer = { address = 0x10000, size = 0x4000 }

[[frames.effects]]
slot = 1
kind = "reverb"
mix = 2
order = 1
work_buffer = { address = 0x200000, size = 0x100 }

[[frames.sinks]]
slot = 0
kind = "device"
name = "MainAudioOut"
"#;

#[test]
fn scenario_drives_renderer() {
    let scenario = Scenario::from_toml(CHAIN).unwrap();
    scenario.config.validate().unwrap();

    let mut mapper = PoolMapper::new();
    for pool in &scenario.pools {
        mapper.register(pool.cpu_address, pool.dsp_address, pool.size);
    }
    let mut renderer =
        AudioRenderer::new(&scenario.config.renderer.to_parameters(), mapper).unwrap();
    renderer.start();

    let frames = scenario.frames().unwrap();
    assert_eq!(frames.len(), 2);

    let first = renderer.update(&frames[0].input()).unwrap();
    assert!(first.resorted);
    // The reverb work buffer lies outside every pool.
    assert_eq!(first.errors.len(), 1);

    let plan = renderer.generate_plan();
    assert_eq!(plan.sub_mix_order(), vec![3, 2, 1]);
    assert_eq!(plan.sink_order(), vec![0]);

    let second = renderer.update(&frames[1].input()).unwrap();
    assert!(!second.resorted);
    assert_eq!(second.elapsed_frame_count, 1);
}
