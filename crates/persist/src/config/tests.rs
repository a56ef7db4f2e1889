use super::*;
use std::io::Write;

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_toml_environments() {
    let file = write_file(
        ".toml",
        r#"
[test]
driver = "sqlite3"
filename = ":memory:"

[production]
driver = "postgres"
url = "postgres://app@localhost/app"
trace = true
pooling = { max = 4, min = 1, idleTimeoutMillis = 30000 }
"#,
    );
    let config = DatabaseConfig::load(file.path()).unwrap();
    assert_eq!(config.environments().collect::<Vec<_>>(), vec!["production", "test"]);

    let test = config.environment("test").unwrap();
    assert_eq!(test.driver, DriverKind::Sqlite);
    assert_eq!(test.filename.as_deref(), Some(":memory:"));
    assert!(!test.trace);

    let prod = config.environment("production").unwrap();
    assert_eq!(prod.driver, DriverKind::Postgres);
    assert!(prod.trace);
    assert_eq!(
        prod.pooling,
        Some(PoolOptions {
            max: 4,
            min: 1,
            idle_timeout_millis: Some(30000),
        })
    );
}

#[test]
fn loads_json_by_extension() {
    let file = write_file(
        ".json",
        r#"{ "development": { "driver": "sqlite3", "filename": "dev.db" } }"#,
    );
    let config = DatabaseConfig::load(file.path()).unwrap();
    let dev = config.environment("development").unwrap();
    assert_eq!(dev.filename.as_deref(), Some("dev.db"));
    assert!(dev.pooling.is_none());
}

#[test]
fn missing_environment_is_a_config_error() {
    let config = DatabaseConfig::parse_toml("[test]\ndriver = \"sqlite3\"\nfilename = \"a.db\"\n")
        .unwrap();
    let err = config.environment("staging").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: no environment named 'staging' in configuration"
    );
}

#[test]
fn unknown_driver_is_rejected() {
    let err = DatabaseConfig::parse_toml("[test]\ndriver = \"mssql\"\n").unwrap_err();
    assert!(matches!(err, OrmError::Config(_)));
    assert!("mssql".parse::<DriverKind>().is_err());
    assert_eq!("PostgreSQL".parse::<DriverKind>().unwrap(), DriverKind::Postgres);
}

#[test]
fn validation_names_the_environment() {
    let err = DatabaseConfig::parse_toml("[ci]\ndriver = \"sqlite3\"\n").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: environment 'ci': sqlite3 requires a filename"
    );

    let err = DatabaseConfig::parse_toml("[ci]\ndriver = \"pg\"\nhost = \"db\"\n").unwrap_err();
    assert!(err.to_string().contains("requires a url or host and database"));
}

#[test]
fn pool_bounds_are_checked() {
    let options = ConnectOptions::new(DriverKind::Postgres)
        .url("postgres://localhost/app")
        .pooling(PoolOptions {
            max: 2,
            min: 3,
            idle_timeout_millis: None,
        });
    assert!(options.validate().unwrap_err().to_string().contains("must not exceed"));

    let options = options.pooling(PoolOptions {
        max: 0,
        ..PoolOptions::default()
    });
    assert!(options.validate().is_err());
}

#[test]
fn expands_environment_variables() {
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var("PERSIST_TEST_DB_FILE", "expanded.db") };
    let config = DatabaseConfig::parse_toml(
        "[test]\ndriver = \"sqlite3\"\nfilename = \"/tmp/${PERSIST_TEST_DB_FILE}\"\n",
    )
    .unwrap();
    assert_eq!(
        config.environment("test").unwrap().filename.as_deref(),
        Some("/tmp/expanded.db")
    );

    let err = expand_env_vars("${PERSIST_TEST_SURELY_UNSET}").unwrap_err();
    assert!(err.to_string().contains("PERSIST_TEST_SURELY_UNSET"));
    assert!(expand_env_vars("${OPEN").is_err());
    assert!(expand_env_vars("${}").is_err());
    assert_eq!(expand_env_vars("plain $HOME text").unwrap(), "plain $HOME text");
}

#[test]
fn postgres_config_from_discrete_fields() {
    let mut options = ConnectOptions::new(DriverKind::Postgres);
    options.host = Some("db.internal".into());
    options.port = Some(6543);
    options.database = Some("app".into());
    options.user = Some("svc".into());
    options.validate().unwrap();

    let config = options.postgres_config().unwrap();
    assert_eq!(config.get_dbname(), Some("app"));
    assert_eq!(config.get_user(), Some("svc"));
    assert_eq!(config.get_ports(), &[6543]);
}

#[test]
fn sqlite_memory_shortcut() {
    let options = ConnectOptions::sqlite_memory().trace(true);
    assert_eq!(options.driver.dialect(), Dialect::Sqlite);
    assert!(options.validate().is_ok());
    assert!(options.trace);
}
