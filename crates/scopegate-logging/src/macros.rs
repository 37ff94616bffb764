//! ---
//! sg_section: "05-logging"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Context-enriched logging macros."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
#[doc(hidden)]
#[macro_export]
macro_rules! __sg_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            principal = ctx.principal.unwrap_or(""),
            permission = ctx.permission.unwrap_or(""),
            request_id = ctx.request_id.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::__sg_event!($level, context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an informational log enriched with request context.
#[macro_export]
macro_rules! sg_info {
    ($($arg:tt)+) => { $crate::__sg_event!(tracing::Level::INFO, $($arg)+) };
}

/// Emit a debug log enriched with request context.
#[macro_export]
macro_rules! sg_debug {
    ($($arg:tt)+) => { $crate::__sg_event!(tracing::Level::DEBUG, $($arg)+) };
}

/// Emit a warning enriched with request context.
#[macro_export]
macro_rules! sg_warn {
    ($($arg:tt)+) => { $crate::__sg_event!(tracing::Level::WARN, $($arg)+) };
}

/// Emit an error log enriched with request context.
#[macro_export]
macro_rules! sg_error {
    ($($arg:tt)+) => { $crate::__sg_event!(tracing::Level::ERROR, $($arg)+) };
}
