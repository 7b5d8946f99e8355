//! debug — logging kernel
//!
//! `klog!`, `kwarn!`, `kerror!` menulis satu baris ke COM1.
//! Di build test (host), baris yang sama masuk ke stderr.

pub mod serial;

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Level::Info  => write!(f, "INFO"),
            Level::Warn  => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

#[doc(hidden)]
pub fn _log(level: Level, args: fmt::Arguments) {
    #[cfg(not(test))]
    serial::_print(format_args!("[{}] {}\n", level, args));

    #[cfg(test)]
    std::eprintln!("[{}] {}", level, args);
}

#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::sys::debug::_log($crate::sys::debug::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::sys::debug::_log($crate::sys::debug::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::sys::debug::_log($crate::sys::debug::Level::Error, format_args!($($arg)*))
    };
}
