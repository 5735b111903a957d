use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub sweep_interval_seconds: u64,
    pub otp_validity_minutes: u32,
    pub otp_window_tolerance: i64,
    pub gmail_username: String,
    pub gmail_app_password: String,
    pub email_from_name: String,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name = env::var("PROJECT_NAME").unwrap_or_else(|_| "rollcall-api".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/api.log".into());
            let log_to_stdout =
                env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true";
            let database_path = env::var("DATABASE_PATH").expect("DATABASE_PATH must be set");

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            let sweep_interval_seconds = env::var("SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            let otp_validity_minutes = env::var("OTP_VALIDITY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            let otp_window_tolerance = env::var("OTP_WINDOW_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);

            let gmail_username = env::var("GMAIL_USERNAME").unwrap_or_default();
            let gmail_app_password = env::var("GMAIL_APP_PASSWORD").unwrap_or_default();
            let email_from_name =
                env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Rollcall".into());

            Config {
                project_name,
                log_level,
                log_file,
                log_to_stdout,
                database_path,
                sweep_interval_seconds,
                otp_validity_minutes,
                otp_window_tolerance,
                gmail_username,
                gmail_app_password,
                email_from_name,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}
