//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Structured logging context, macros, and throttling."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Leveled logging macros carrying a [`crate::LogContext`].

#[doc(hidden)]
#[macro_export]
macro_rules! __mtce_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx: $crate::LogContext = $ctx;
        $crate::__tracing::event!(
            $level,
            host = ctx.host.unwrap_or(""),
            network = ctx.network.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with maintenance context.
#[macro_export]
macro_rules! mtce_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::INFO, $crate::LogContext::new(), $($arg)+)
    };
}

/// Emit a warning enriched with maintenance context.
#[macro_export]
macro_rules! mtce_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::WARN, $crate::LogContext::new(), $($arg)+)
    };
}

/// Emit a debug log enriched with maintenance context.
#[macro_export]
macro_rules! mtce_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::DEBUG, $crate::LogContext::new(), $($arg)+)
    };
}

/// Emit an error log enriched with maintenance context.
#[macro_export]
macro_rules! mtce_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mtce_event!($crate::__tracing::Level::ERROR, $crate::LogContext::new(), $($arg)+)
    };
}

/// Report an internal invariant violation.
///
/// Logged at ERROR with `severity = "software-error"`; callers clamp to a
/// safe value and carry on.
#[macro_export]
macro_rules! slog {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx: $crate::LogContext = $ctx;
        $crate::__tracing::event!(
            $crate::__tracing::Level::ERROR,
            severity = "software-error",
            host = ctx.host.unwrap_or(""),
            network = ctx.network.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {
        $crate::slog!(context = $crate::LogContext::new(), $($arg)+)
    };
}
