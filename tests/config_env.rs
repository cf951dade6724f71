// tests/config_env.rs
//
// BotConfig::from_env reads the process environment and the optional TOML
// file named by BOT_CONFIG_PATH. Env mutation is process-wide, hence #[serial].

use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use trading_edu_bot::config::BotConfig;

const KEYS: &[&str] = &[
    "BOT_CONFIG_PATH",
    "LLM_MODEL",
    "LLM_TIMEOUT_SECS",
    "POST_INTERVAL_SECS",
    "TELEGRAM_CHAT_ID",
];

fn clear_env() {
    for k in KEYS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn toml_file_supplies_defaults_and_env_overrides() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
telegram_chat_id = "@from_toml"
llm_model = "toml-model"
llm_timeout_secs = 12
post_interval_secs = 3600
"#
    )
    .unwrap();

    std::env::set_var("BOT_CONFIG_PATH", file.path());
    std::env::set_var("LLM_MODEL", "env-model");

    let cfg = BotConfig::from_env().expect("config");
    assert_eq!(cfg.telegram_chat_id.as_deref(), Some("@from_toml"));
    assert_eq!(cfg.llm_model, "env-model");
    assert_eq!(cfg.llm_timeout, Duration::from_secs(12));
    assert_eq!(cfg.post_interval, Duration::from_secs(3600));
    clear_env();
}

#[test]
#[serial]
fn broken_toml_is_an_error() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "llm_timeout_secs = \"not a number").unwrap();
    std::env::set_var("BOT_CONFIG_PATH", file.path());

    assert!(BotConfig::from_env().is_err());
    clear_env();
}

#[test]
#[serial]
fn missing_file_falls_back_to_builtin_defaults() {
    clear_env();
    std::env::set_var("BOT_CONFIG_PATH", "/definitely/not/here/bot.toml");
    let cfg = BotConfig::from_env().expect("config");
    assert_eq!(cfg.llm_timeout, Duration::from_secs(30));
    assert_eq!(cfg.post_interval, Duration::from_secs(21600));
    clear_env();
}
