//! Structured request logging with correlation tracking
//!
//! Each backend call gets a correlation id; start, response, and completion
//! are logged as single-line JSON documents so that one call can be followed
//! across retries.

use serde_json::json;
use std::time::{Duration, Instant};
use log::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ApiLogger {
    enabled: bool,
}

/// Context for a single backend call
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub correlation_id: String,
    /// connect, list_tables, preview, migrate, progress
    pub operation_type: String,
    /// Role segment or table the call is about
    pub resource: String,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl ApiLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn start_operation(&self, operation_type: &str, resource: &str) -> OperationContext {
        let context = OperationContext {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            operation_type: operation_type.to_string(),
            resource: resource.to_string(),
            start_time: Instant::now(),
        };

        if self.enabled {
            let log_data = json!({
                "event": "operation_started",
                "correlation_id": context.correlation_id,
                "operation_type": context.operation_type,
                "resource": context.resource,
                "timestamp": chrono::Utc::now().to_rfc3339()
            });
            debug!("Backend operation started: {}", log_data);
        }

        context
    }

    pub fn log_request(&self, context: &OperationContext, method: &str, url: &str) {
        if !self.enabled {
            return;
        }

        let log_data = json!({
            "event": "http_request",
            "correlation_id": context.correlation_id,
            "method": method,
            "url": url,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        debug!("HTTP Request: {}", log_data);
    }

    pub fn log_response(&self, context: &OperationContext, status_code: u16) {
        if !self.enabled {
            return;
        }

        let log_data = json!({
            "event": "http_response",
            "correlation_id": context.correlation_id,
            "operation_type": context.operation_type,
            "status_code": status_code,
            "duration_ms": context.elapsed().as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if status_code >= 400 {
            warn!("HTTP Response (Error): {}", log_data);
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    pub fn complete_operation(&self, context: &OperationContext, error: Option<&str>) {
        if !self.enabled {
            return;
        }

        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": context.correlation_id,
            "operation_type": context.operation_type,
            "resource": context.resource,
            "success": error.is_none(),
            "error": error,
            "duration_ms": context.elapsed().as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        match error {
            None => info!("Backend operation completed: {}", log_data),
            Some(_) => warn!("Backend operation failed: {}", log_data),
        }
    }
}
