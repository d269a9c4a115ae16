/// Standardized logging macros so every layer emits the same field names.
///
/// Field conventions:
/// - `operation` names the handler or service method
/// - `user_id`, `chapter_id`, `topic_id` identify the resources involved
/// - `component` marks database and client-core events

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, chapter_id = $chapter_id:expr) => {
        tracing::debug!(
            operation = $operation,
            chapter_id = %$chapter_id,
            "API operation started"
        );
    };
    ($operation:expr, topic_id = $topic_id:expr) => {
        tracing::debug!(
            operation = $operation,
            topic_id = %$topic_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, chapter_id = $chapter_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            chapter_id = %$chapter_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, topic_id = $topic_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            topic_id = %$topic_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(operation = $operation, "API operation completed: {}", $msg);
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, chapter_id = $chapter_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            chapter_id = %$chapter_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, topic_id = $topic_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            topic_id = %$topic_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, chapter_id = $chapter_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            chapter_id = %$chapter_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, topic_id = $topic_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            topic_id = %$topic_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, "API operation warning: {}", $msg);
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            user_id = %$user_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, user_id = $user_id:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            user_id = %$user_id,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

/// Log database operation performance and results
#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// Client Core Logging Macros
// ============================================================================

/// Log card-session events: resume decisions, dispatched saves, rollbacks
#[macro_export]
macro_rules! log_client_event {
    (debug, $event:expr, chapter_id = $chapter_id:expr, $msg:expr) => {
        tracing::debug!(
            component = "card_session",
            event = $event,
            chapter_id = %$chapter_id,
            "Client event: {}", $msg
        );
    };
    (debug, $event:expr, topic_id = $topic_id:expr, $msg:expr) => {
        tracing::debug!(
            component = "card_session",
            event = $event,
            topic_id = %$topic_id,
            "Client event: {}", $msg
        );
    };
    (debug, $event:expr, $msg:expr) => {
        tracing::debug!(
            component = "card_session",
            event = $event,
            "Client event: {}", $msg
        );
    };
    (failed, $event:expr, error = $error:expr) => {
        tracing::debug!(
            component = "card_session",
            event = $event,
            error = %$error,
            "Client event failed silently"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
