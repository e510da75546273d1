use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = PipelineConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.slot_grid().unwrap().slots_per_day(), 96);
    assert_eq!(cfg.canvas_size(), (1920, 1440));
}

#[test]
fn partial_json_overlays_defaults() {
    let cfg: PipelineConfig =
        serde_json::from_str(r#"{ "grid": { "slot_minutes": 60 }, "store": { "root": "/tmp/x" } }"#)
            .unwrap();
    assert_eq!(cfg.grid.slot_minutes, 60);
    assert_eq!(cfg.store.root, PathBuf::from("/tmp/x"));
    assert_eq!(cfg.store.jpeg_quality, 92);
    assert_eq!(cfg.scheduler.batch_size, 8);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = serde_json::from_str::<PipelineConfig>(r#"{ "grid": { "slots": 4 } }"#);
    assert!(err.is_err());
}

#[test]
fn offsets_must_start_at_zero_and_be_unique() {
    let mut cfg = PipelineConfig::default();
    cfg.fallback.offsets_minutes = vec![1, 0];
    assert!(cfg.validate().is_err());

    cfg.fallback.offsets_minutes = vec![0, 1, 1];
    assert!(cfg.validate().is_err());

    cfg.fallback.offsets_minutes = vec![];
    assert!(cfg.validate().is_err());
}

#[test]
fn crop_must_fit_canvas() {
    let mut cfg = PipelineConfig::default();
    cfg.composite.crop = CropRect {
        x: 1000,
        y: 0,
        width: 1000,
        height: 100,
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn batch_timeout_is_derived_unless_set() {
    let mut cfg = PipelineConfig::default();
    // (30s * 3 attempts + 2s * 2 delays) per offset, 9 offsets, 2 layers
    assert_eq!(cfg.batch_timeout(), Duration::from_secs((30 * 3 + 2 * 2) * 9 * 2));

    cfg.scheduler.batch_timeout_secs = Some(5);
    assert_eq!(cfg.batch_timeout(), Duration::from_secs(5));
}

#[test]
fn load_reads_and_validates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    std::fs::write(&path, r#"{ "grid": { "slot_minutes": 7 } }"#).unwrap();
    assert!(PipelineConfig::load(&path).is_err());

    std::fs::write(&path, r#"{ "grid": { "slot_minutes": 30 } }"#).unwrap();
    let cfg = PipelineConfig::load(&path).unwrap();
    assert_eq!(cfg.slot_grid().unwrap().slots_per_day(), 48);
}
