//! Endpoint layout of the migration backend

/// Default backend location used when no configuration overrides it
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("table-migrate/", env!("CARGO_PKG_VERSION"));

pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const CONTENT_TYPE_JSON: &str = "application/json";
}

/// HTTP methods, used for request logging
pub mod methods {
    pub const GET: &str = "GET";
    pub const POST: &str = "POST";
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// `POST /database/connect/{role}`
pub fn connect_endpoint(base_url: &str, role_segment: &str) -> String {
    format!("{}/database/connect/{}", trim_base(base_url), role_segment)
}

/// `GET /database/tables/{role}`
pub fn tables_endpoint(base_url: &str, role_segment: &str) -> String {
    format!("{}/database/tables/{}", trim_base(base_url), role_segment)
}

/// `GET /database/preview/{role}/{tableName}`, table name percent-encoded
pub fn preview_endpoint(base_url: &str, role_segment: &str, table: &str) -> String {
    format!(
        "{}/database/preview/{}/{}",
        trim_base(base_url),
        role_segment,
        urlencoding::encode(table)
    )
}

/// `POST /database/migrate`
pub fn migrate_endpoint(base_url: &str) -> String {
    format!("{}/database/migrate", trim_base(base_url))
}

/// `GET /database/migration-progress`
pub fn progress_endpoint(base_url: &str) -> String {
    format!("{}/database/migration-progress", trim_base(base_url))
}
