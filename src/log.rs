//! Minimal levelled logging for the `red_stack` category, gated by the
//! configured verbosity. Mirrors the category/level split the rest of the
//! daemon uses rather than pulling in a logging framework for one subsystem.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_verbosity(v: u8) -> LogLevel {
        match v {
            0 => LogLevel::None,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_level(level: LogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> u8 {
    CURRENT_LEVEL.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log_at {
    ($lvl:expr, $( $arg:tt )*) => {{
        let lvl = $lvl as u8;
        if lvl <= $crate::log::level() {
            eprintln!("red_stack {:?}: {}", $lvl, format!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($( $arg:tt )*) => { $crate::log_at!($crate::log::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($( $arg:tt )*) => { $crate::log_at!($crate::log::LogLevel::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($( $arg:tt )*) => { $crate::log_at!($crate::log::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($( $arg:tt )*) => { $crate::log_at!($crate::log::LogLevel::Debug, $($arg)*) };
}
