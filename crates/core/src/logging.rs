//! Centralized logging configuration for the recompiler.
//!
//! A small structured logging layer shared by the IR core, the lifter and
//! the drivers:
//!
//! - **LogConfig**: thread-safe global configuration using atomic operations
//! - **LogLevel**: hierarchical levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: per-subsystem channels (Cpu, Bus, Ir, Dispatch)
//! - **log()**: the single output function; takes the message as a closure so
//!   disabled logging costs two atomic loads and nothing else
//!
//! # Usage
//!
//! ```rust
//! use rec_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("block finalized at PC={:04X}", 0xC000)
//! });
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// Log category for the recompiler subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Guest CPU execution (block boundaries, register read-back)
    Cpu,
    /// Bus/memory access (ROM mapping, device state)
    Bus,
    /// IR construction and interpretation
    Ir,
    /// Opcode dispatch (unimplemented slots, lift failures)
    Dispatch,
}

impl LogCategory {
    fn label(self) -> &'static str {
        match self {
            LogCategory::Cpu => "CPU",
            LogCategory::Bus => "BUS",
            LogCategory::Ir => "IR",
            LogCategory::Dispatch => "DISPATCH",
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Global log level (applies to all categories unless overridden)
    global_level: AtomicU8,
    cpu_level: AtomicU8,
    bus_level: AtomicU8,
    ir_level: AtomicU8,
    dispatch_level: AtomicU8,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            cpu_level: AtomicU8::new(LogLevel::Off as u8),
            bus_level: AtomicU8::new(LogLevel::Off as u8),
            ir_level: AtomicU8::new(LogLevel::Off as u8),
            dispatch_level: AtomicU8::new(LogLevel::Off as u8),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    fn slot(&self, category: LogCategory) -> &AtomicU8 {
        match category {
            LogCategory::Cpu => &self.cpu_level,
            LogCategory::Bus => &self.bus_level,
            LogCategory::Ir => &self.ir_level,
            LogCategory::Dispatch => &self.dispatch_level,
        }
    }

    /// Set the global log level (applies to all categories unless overridden)
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level.to_u8(), Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.slot(category).store(level.to_u8(), Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.slot(category).load(Ordering::Relaxed))
    }

    /// Check if a message should be logged for the given category and level.
    ///
    /// A category-specific level takes precedence; when it is Off the global
    /// level decides.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in [
            LogCategory::Cpu,
            LogCategory::Bus,
            LogCategory::Ir,
            LogCategory::Dispatch,
        ] {
            self.set_level(category, LogLevel::Off);
        }
    }
}

/// Log a message. The closure only runs when the category/level combination
/// is enabled, so callers can format freely in hot paths.
pub fn log<F>(category: LogCategory, level: LogLevel, message: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }
    eprintln!("[{}][{}] {}", level.label(), category.label(), message());
}
