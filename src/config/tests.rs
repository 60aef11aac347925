use serial_test::serial;

use super::*;

#[test]
fn defaults_match_shipping_configuration() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.ttl_hours, DEFAULT_TTL_HOURS);
    assert!(settings.cache.exclude.is_empty());
    assert!(settings.cache.device_variants);
    assert!(!settings.cache.disabled);
    assert_eq!(settings.cache.max_body_bytes.get(), DEFAULT_MAX_BODY_BYTES);
    assert_eq!(
        settings.storage.directory,
        std::path::Path::new(DEFAULT_CACHE_DIR)
    );
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn ttl_hours_clamps_to_supported_range() {
    let raw = RawSettings {
        cache: RawCacheSettings {
            ttl_hours: Some(5000),
            ..Default::default()
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl_hours, MAX_TTL_HOURS);
}

#[test]
fn zero_body_limit_is_rejected() {
    let raw = RawSettings {
        cache: RawCacheSettings {
            max_body_bytes: Some(0),
            ..Default::default()
        },
        ..Default::default()
    };

    let error = Settings::from_raw(raw).expect_err("zero limit must fail");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "cache.max_body_bytes",
            ..
        }
    ));
}

#[test]
fn unknown_log_level_is_rejected() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: Some("shouty".to_string()),
            json: None,
        },
        ..Default::default()
    };

    let error = Settings::from_raw(raw).expect_err("unknown level must fail");
    assert!(matches!(error, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn json_flag_selects_json_format() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: Some("debug".to_string()),
            json: Some(true),
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
#[serial]
fn environment_outranks_files() {
    // SAFETY: `serial` guarantees no other test observes the process
    // environment while these variables are set.
    unsafe {
        std::env::set_var("SCATTO__CACHE__DISABLED", "true");
        std::env::set_var("SCATTO__CACHE__TTL_HOURS", "12");
    }

    let settings = load(None).expect("valid settings");

    unsafe {
        std::env::remove_var("SCATTO__CACHE__DISABLED");
        std::env::remove_var("SCATTO__CACHE__TTL_HOURS");
    }

    assert!(settings.cache.disabled);
    assert_eq!(settings.cache.ttl_hours, 12);
}
