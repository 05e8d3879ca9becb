use rstest::rstest;
use spectrod_config::load_toml;

#[test]
fn empty_config_uses_defaults_and_validates() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should pass validation");
    assert_eq!(cfg.defaults.acquisition_mode, 1);
    assert_eq!(cfg.defaults.series_length, 5);
    assert!((cfg.defaults.exposure_secs - 0.01).abs() < f64::EPSILON);
    assert_eq!(cfg.publish.period_ms, 1000);
    assert_eq!(cfg.exposure_loop.attempt_limit, 5);
}

#[test]
fn rejects_nonpositive_exposure() {
    let cfg = load_toml("[defaults]\nexposure_secs = 0.0\n").expect("parse TOML");
    let err = cfg.validate().expect_err("should reject exposure 0");
    assert!(format!("{err}").contains("exposure_secs"));
}

#[test]
fn rejects_negative_interval() {
    let cfg = load_toml("[defaults]\ninterval_secs = -0.5\n").expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[rstest]
#[case(0)]
#[case(6)]
fn rejects_acquisition_mode_out_of_range(#[case] mode: u32) {
    let toml = format!("[defaults]\nacquisition_mode = {mode}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("mode outside 1..=5 must fail");
    assert!(format!("{err}").contains("acquisition_mode"));
}

#[rstest]
#[case(-121)]
#[case(21)]
fn rejects_target_temperature_out_of_range(#[case] t: i32) {
    let toml = format!("[defaults]\ntarget_temperature_c = {t}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_full_custom_config() {
    let toml = r#"
[hardware]
driver_path = "/opt/andor/etc"
data_dir = "/var/lib/spectrod"

[defaults]
exposure_secs = 0.05
interval_secs = 2.0
acquisition_mode = 3
series_length = 10
accumulation_count = 4
target_temperature_c = -80
target_intensity = 40000

[publish]
period_ms = 500

[exposure_loop]
attempt_limit = 8

[logging]
file = "spectrod.log"
level = "debug"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.defaults.series_length, 10);
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
}

#[test]
fn rejects_zero_publish_period() {
    let cfg = load_toml("[publish]\nperiod_ms = 0\n").expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn load_reports_missing_file() {
    let err = spectrod_config::load(std::path::Path::new("/nonexistent/spectrod.toml"))
        .expect_err("missing file must fail");
    assert!(format!("{err}").contains("/nonexistent/spectrod.toml"));
}
