use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE dashboard_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_json TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    expires_at TEXT,
    is_stale INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE csv_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE NOT NULL,
    filename TEXT NOT NULL,
    local_path TEXT NOT NULL,
    remote_last_modified TEXT,
    remote_etag TEXT,
    local_file_hash TEXT NOT NULL,
    download_count INTEGER NOT NULL DEFAULT 1,
    last_checked TEXT NOT NULL,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_type TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,
    status TEXT NOT NULL,
    records_processed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    duration_ms INTEGER,
    triggered_by TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE manual_refresh_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT UNIQUE NOT NULL,
    source_ip TEXT NOT NULL,
    user_id TEXT,
    request_time TEXT NOT NULL,
    scheduled_for TEXT NOT NULL,
    executed INTEGER NOT NULL DEFAULT 0,
    notification_sent INTEGER NOT NULL DEFAULT 0
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE rate_limit_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hour_window TEXT NOT NULL,
    source_ip TEXT NOT NULL,
    request_count INTEGER NOT NULL DEFAULT 1,
    last_request_time TEXT NOT NULL,
    UNIQUE(hour_window, source_ip)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE vaccination_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    region TEXT NOT NULL,
    vaccine_name TEXT NOT NULL,
    current_year REAL NOT NULL DEFAULT 0,
    five_years_ago REAL NOT NULL DEFAULT 0,
    ten_years_ago REAL NOT NULL DEFAULT 0,
    last_available_rate REAL,
    last_available_date TEXT,
    collection_method TEXT,
    source_url TEXT,
    calculation_details TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE disease_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    current_count INTEGER NOT NULL DEFAULT 0,
    week_ago_count INTEGER NOT NULL DEFAULT 0,
    month_ago_count INTEGER NOT NULL DEFAULT 0,
    two_months_ago_count INTEGER NOT NULL DEFAULT 0,
    year_ago_count INTEGER NOT NULL DEFAULT 0,
    unit TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    data_source TEXT NOT NULL,
    source_url TEXT NOT NULL,
    region TEXT NOT NULL DEFAULT 'nyc',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE wastewater_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_date TEXT NOT NULL,
    location TEXT NOT NULL,
    concentration REAL NOT NULL DEFAULT 0,
    trend TEXT NOT NULL,
    pathogen TEXT NOT NULL,
    average_concentration REAL NOT NULL DEFAULT 0,
    alert_level TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    pathogens TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE news_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    date TEXT NOT NULL,
    severity TEXT NOT NULL,
    source TEXT NOT NULL,
    url TEXT,
    region TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_csv_cache_url ON csv_cache(url)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_sync_log_started_at ON sync_log(started_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_manual_refresh_request_time ON manual_refresh_requests(request_time)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_rate_limit_hour_window ON rate_limit_tracking(hour_window, source_ip)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_vaccination_data_region ON vaccination_data(region)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_disease_stats_region ON disease_stats(region)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_wastewater_sample_date ON wastewater_data(sample_date)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_news_data_region ON news_data(region)",
        ))
}
