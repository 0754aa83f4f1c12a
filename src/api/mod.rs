//! Migration backend access
//!
//! The orchestration core never talks HTTP directly; it goes through
//! [`MigrationBackend`]. [`HttpBackend`] is the production implementation
//! against the JSON API:
//!
//! | Operation       | Request                                  |
//! |-----------------|------------------------------------------|
//! | connect         | `POST /database/connect/{role}`          |
//! | list tables     | `GET /database/tables/{role}`            |
//! | preview table   | `GET /database/preview/{role}/{table}`   |
//! | start migration | `POST /database/migrate`                 |
//! | poll progress   | `GET /database/migration-progress`       |

pub mod client;
pub mod constants;
pub mod models;
pub mod resilience;

use crate::connection::Role;
use crate::error::ApiError;
use async_trait::async_trait;

pub use client::HttpBackend;
pub use models::{
    ConnectionResponse, MigrationRequest, MigrationResponse, ProgressResponse, TablePreviewResponse,
    TablesResponse,
};
pub use resilience::{RateLimitConfig, RateLimiter, ResilienceConfig, RetryConfig, RetryPolicy};

#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Ask the backend to open a connection for `role`
    async fn connect(
        &self,
        role: Role,
        connection_string: &str,
    ) -> Result<ConnectionResponse, ApiError>;

    async fn list_tables(&self, role: Role) -> Result<TablesResponse, ApiError>;

    /// A bounded sample of rows of `table`
    async fn preview_table(
        &self,
        role: Role,
        table: &str,
    ) -> Result<TablePreviewResponse, ApiError>;

    /// Run the transfer; resolves once the backend has finished or given up
    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationResponse, ApiError>;

    async fn migration_progress(&self) -> Result<ProgressResponse, ApiError>;
}
