//! Environment overrides mutate process-wide state, so they live in their own
//! test binary with a single test.

use std::io::Write;
use tempfile::NamedTempFile;

use zenb_ppg::{ConfigError, PpgConfig};

#[test]
fn test_env_overrides_apply_and_validate() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[ensemble]\nchannel_count = 4\n\n[channel]\nwindow_sec = 6.0").unwrap();

    std::env::set_var("ZENB_PPG_CHANNEL_COUNT", "8");
    std::env::set_var("ZENB_PPG_FRAMES_TO_LOSE", "30");
    std::env::set_var("ZENB_PPG_MAX_SAMPLE_RATE", "120");
    let config = PpgConfig::from_file_with_env(file.path()).unwrap();
    assert_eq!(config.ensemble.channel_count, 8);
    assert_eq!(config.ensemble.hysteresis.frames_to_lose, 30);
    assert_eq!(config.channel.window_sec, 6.0);
    assert_eq!(config.channel.max_sample_rate, 120.0);
    // 6 s at 120 fps with 1.5x headroom
    assert_eq!(config.channel.buffer_capacity(), 1080);

    // Plain loading ignores the environment
    let plain = PpgConfig::from_file(file.path()).unwrap();
    assert_eq!(plain.ensemble.channel_count, 4);

    std::env::set_var("ZENB_PPG_CHANNEL_COUNT", "lots");
    let err = PpgConfig::from_file_with_env(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    std::env::set_var("ZENB_PPG_CHANNEL_COUNT", "0");
    assert!(PpgConfig::from_file_with_env(file.path()).is_err());

    std::env::remove_var("ZENB_PPG_CHANNEL_COUNT");
    std::env::remove_var("ZENB_PPG_FRAMES_TO_LOSE");
    std::env::remove_var("ZENB_PPG_MAX_SAMPLE_RATE");
}
