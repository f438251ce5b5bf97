//! Macros for generating log messages.

#[macro_export]
macro_rules! error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::ERROR,
                message = format_args!($fmt $(, $arg)*)
            );
        }
    };
    ($category:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::ERROR,
                category = $category,
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! warning {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::WARN,
                message = format_args!($fmt $(, $arg)*)
            );
        }
    };
    ($category:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::WARN,
                category = $category,
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::INFO,
                message = format_args!($fmt $(, $arg)*)
            );
        }
    };
    ($category:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::INFO,
                category = $category,
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! debug {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::DEBUG,
                message = format_args!($fmt $(, $arg)*)
            );
        }
    };
    ($category:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::DEBUG,
                category = $category,
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! trace {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::TRACE,
                message = format_args!($fmt $(, $arg)*)
            );
        }
    };
    ($category:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            tracing::event!(
                tracing::Level::TRACE,
                category = $category,
                message = format_args!($($arg)+)
            );
        }
    };
}


// The following makes the macros importable directly from the `log` module.
pub use {debug, error, info, trace, warning};
