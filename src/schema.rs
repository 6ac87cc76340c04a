// Diesel table definitions matching the migrations in src/migrations/.

diesel::table! {
    dashboard_cache (id) {
        id -> Integer,
        data_json -> Text,
        last_updated -> Text,
        expires_at -> Nullable<Text>,
        is_stale -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    csv_cache (id) {
        id -> Integer,
        url -> Text,
        filename -> Text,
        local_path -> Text,
        remote_last_modified -> Nullable<Text>,
        remote_etag -> Nullable<Text>,
        local_file_hash -> Text,
        download_count -> Integer,
        last_checked -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    sync_log (id) {
        id -> Integer,
        sync_type -> Text,
        trigger_kind -> Text,
        status -> Text,
        records_processed -> Integer,
        error_message -> Nullable<Text>,
        duration_ms -> Nullable<Integer>,
        triggered_by -> Text,
        started_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    manual_refresh_requests (id) {
        id -> Integer,
        request_id -> Text,
        source_ip -> Text,
        user_id -> Nullable<Text>,
        request_time -> Text,
        scheduled_for -> Text,
        executed -> Integer,
        notification_sent -> Integer,
    }
}

diesel::table! {
    rate_limit_tracking (id) {
        id -> Integer,
        hour_window -> Text,
        source_ip -> Text,
        request_count -> Integer,
        last_request_time -> Text,
    }
}

diesel::table! {
    vaccination_data (id) {
        id -> Integer,
        region -> Text,
        vaccine_name -> Text,
        current_year -> Double,
        five_years_ago -> Double,
        ten_years_ago -> Double,
        last_available_rate -> Nullable<Double>,
        last_available_date -> Nullable<Text>,
        collection_method -> Nullable<Text>,
        source_url -> Nullable<Text>,
        calculation_details -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    disease_stats (id) {
        id -> Integer,
        name -> Text,
        current_count -> Integer,
        week_ago_count -> Integer,
        month_ago_count -> Integer,
        two_months_ago_count -> Integer,
        year_ago_count -> Integer,
        unit -> Text,
        last_updated -> Text,
        data_source -> Text,
        source_url -> Text,
        region -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    wastewater_data (id) {
        id -> Integer,
        sample_date -> Text,
        location -> Text,
        concentration -> Double,
        trend -> Text,
        pathogen -> Text,
        average_concentration -> Double,
        alert_level -> Text,
        last_updated -> Text,
        pathogens -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    news_data (id) {
        id -> Integer,
        alert_id -> Text,
        title -> Text,
        summary -> Text,
        date -> Text,
        severity -> Text,
        source -> Text,
        url -> Nullable<Text>,
        region -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    dashboard_cache,
    csv_cache,
    sync_log,
    manual_refresh_requests,
    rate_limit_tracking,
    vaccination_data,
    disease_stats,
    wastewater_data,
    news_data,
);
