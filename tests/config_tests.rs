//! Configuration loading behavior. Environment variables are process-global,
//! so every test here is serialized.

use serial_test::serial;
use sfru_portal::config::{AppConfig, Env};
use std::env;
use uuid::Uuid;

fn clear_config_env() {
    for key in [
        "APP_ENV",
        "DATABASE_URL",
        "SUPABASE_JWT_SECRET",
        "STRIPE_SECRET_KEY",
        "RESEND_API_KEY",
        "ADMIN_EMAILS",
        "ADMIN_USER_IDS",
        "SITE_BASE_URL",
    ] {
        unsafe { env::remove_var(key) };
    }
}

#[test]
#[serial]
fn defaults_to_local_with_dev_secrets() {
    clear_config_env();
    unsafe { env::set_var("DATABASE_URL", "postgres://localhost/test") };

    let config = AppConfig::load();

    assert_eq!(config.env, Env::Local);
    assert!(!config.jwt_secret.is_empty());
    assert!(config.admins.is_empty());
    assert_eq!(config.site_base_url, "https://securityfortherestofus.com");
}

#[test]
#[serial]
fn parses_the_admin_allow_list() {
    clear_config_env();
    let id = Uuid::new_v4();
    unsafe {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("ADMIN_EMAILS", " Owner@Example.com , second@example.com ");
        env::set_var("ADMIN_USER_IDS", id.to_string());
    }

    let config = AppConfig::load();

    assert!(config.admins.matches(Uuid::new_v4(), "owner@example.com"));
    assert!(config.admins.matches(Uuid::new_v4(), "SECOND@EXAMPLE.COM"));
    assert!(config.admins.matches(id, "whoever@example.com"));
    assert!(!config.admins.matches(Uuid::new_v4(), "stranger@example.com"));

    clear_config_env();
}

#[test]
#[serial]
fn production_requires_the_jwt_secret() {
    clear_config_env();
    unsafe {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("APP_ENV", "production");
    }

    let result = std::panic::catch_unwind(AppConfig::load);
    assert!(result.is_err());

    clear_config_env();
}

#[test]
#[serial]
fn production_requires_the_stripe_secret() {
    clear_config_env();
    unsafe {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("APP_ENV", "production");
        env::set_var("SUPABASE_JWT_SECRET", "a-real-production-secret");
    }

    let result = std::panic::catch_unwind(AppConfig::load);
    assert!(result.is_err());

    clear_config_env();
}

#[test]
#[serial]
fn production_requires_the_resend_key() {
    clear_config_env();
    unsafe {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("APP_ENV", "production");
        env::set_var("SUPABASE_JWT_SECRET", "a-real-production-secret");
        env::set_var("STRIPE_SECRET_KEY", "sk_live_secret");
    }

    let result = std::panic::catch_unwind(AppConfig::load);
    assert!(result.is_err());

    clear_config_env();
}

#[test]
#[serial]
fn malformed_admin_id_aborts_startup() {
    clear_config_env();
    unsafe {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("ADMIN_USER_IDS", "not-a-uuid");
    }

    let result = std::panic::catch_unwind(AppConfig::load);
    assert!(result.is_err());

    clear_config_env();
}

#[test]
#[serial]
fn missing_database_url_aborts_startup() {
    clear_config_env();

    let result = std::panic::catch_unwind(AppConfig::load);
    assert!(result.is_err());
}
