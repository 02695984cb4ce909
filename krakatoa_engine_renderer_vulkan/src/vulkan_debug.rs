/// Vulkan debug messenger - validation layer messages with colored output
///
/// Messages are filtered by severity and category, counted, grouped by
/// repetition, and written to the console, a file, or both. With
/// `break_on_error` the first validation error aborts the process so a
/// debugger can catch it.

use ash::vk;
use colored::*;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::vulkan_config::{DebugConfig, DebugOutput};
use crate::vulkan_context::lock;

/// Active messenger configuration (None once the device is gone)
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrences per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Validation message counts since the device was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, level: MessageLevel) {
        let counter = match level {
            MessageLevel::Error => &self.errors,
            MessageLevel::Warning => &self.warnings,
            MessageLevel::Info => &self.info,
            MessageLevel::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl MessageLevel {
    fn from_flags(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            MessageLevel::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            MessageLevel::Warning
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            MessageLevel::Info
        } else {
            MessageLevel::Verbose
        }
    }

    fn label(self) -> &'static str {
        match self {
            MessageLevel::Error => "ERROR",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Info => "INFO",
            MessageLevel::Verbose => "VERBOSE",
        }
    }

    fn colored_label(self) -> ColoredString {
        match self {
            MessageLevel::Error => self.label().red().bold(),
            MessageLevel::Warning => self.label().yellow().bold(),
            MessageLevel::Info => self.label().cyan(),
            MessageLevel::Verbose => self.label().bright_black(),
        }
    }
}

fn type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Install the configuration and clear counters
pub fn init_debug_config(config: DebugConfig) {
    VALIDATION_STATS.reset();
    *lock(&MESSAGE_TRACKER) = Some(FxHashMap::default());
    *lock(&DEBUG_CONFIG) = Some(config);
}

/// Silence the callback before the messenger is destroyed
pub fn cleanup_debug_config() {
    *lock(&DEBUG_CONFIG) = None;
}

pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

/// Print counts per severity and how many messages repeated
pub fn print_validation_stats_report() {
    let stats = validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Some(tracker) = lock(&MESSAGE_TRACKER).as_ref() {
        let repeated = tracker.values().filter(|&&count| count > 1).count();
        if repeated > 0 {
            println!("\n  {} message(s) appeared multiple times", repeated);
        }
    }
    println!("{}\n", "====================================".bright_blue().bold());
}

/// Count one more occurrence of `message`, returning the new count
fn track_message(message: &str) -> u32 {
    let mut tracker = lock(&MESSAGE_TRACKER);
    let count = tracker
        .get_or_insert_with(FxHashMap::default)
        .entry(message.to_string())
        .or_insert(0);
    *count += 1;
    *count
}

/// Uncolored rendering used for file output
fn format_plain(level: MessageLevel, type_str: &str, repeat: u32, message_id: &str, message: &str) -> String {
    let repeat_indicator = if repeat > 1 { format!(" [x{}]", repeat) } else { String::new() };
    format!(
        "[VULKAN {}] [{}]{}\n  |- Message ID: {}\n  `- {}\n",
        level.label(),
        type_str,
        repeat_indicator,
        message_id,
        message
    )
}

fn format_colored(level: MessageLevel, type_str: &str, repeat: u32, message_id: &str, message: &str) -> String {
    let repeat_indicator = if repeat > 1 { format!(" [x{}]", repeat) } else { String::new() };
    format!(
        "{} {} [{}]{}\n  |- {}: {}\n  `- {}\n",
        "[VULKAN".bright_blue().bold(),
        format!("{}]", level.colored_label()).bright_blue().bold(),
        type_str.bright_black(),
        repeat_indicator.yellow(),
        "Message ID".bright_black(),
        message_id.white(),
        message.white()
    )
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> &'a str {
    if ptr.is_null() {
        fallback
    } else {
        CStr::from_ptr(ptr).to_str().unwrap_or("Invalid UTF-8")
    }
}

/// Debug messenger callback registered with `VK_EXT_debug_utils`
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");

    let Some(config) = lock(&DEBUG_CONFIG).clone() else {
        return vk::FALSE;
    };

    if !config.severity.allows(message_severity) || !config.message_filter.allows(message_type) {
        return vk::FALSE;
    }

    let level = MessageLevel::from_flags(message_severity);
    let type_str = type_label(message_type);
    let repeat = if config.enable_stats {
        VALIDATION_STATS.record(level);
        track_message(message)
    } else {
        1
    };

    match &config.output {
        DebugOutput::Console => {
            eprint!("{}", format_colored(level, type_str, repeat, message_id, message));
        }
        DebugOutput::File(path) => {
            write_to_file(path, &format_plain(level, type_str, repeat, message_id, message));
        }
        DebugOutput::Both(path) => {
            eprint!("{}", format_colored(level, type_str, repeat, message_id, message));
            write_to_file(path, &format_plain(level, type_str, repeat, message_id, message));
        }
    }

    if config.break_on_error && level == MessageLevel::Error {
        eprintln!(
            "\n{}\n  Context: {} [{}]\n",
            "BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
            message_id.yellow(),
            type_str.cyan()
        );
        std::process::abort();
    }

    vk::FALSE
}

fn write_to_file(path: &str, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", message);
    }
}

#[cfg(test)]
#[path = "vulkan_debug_tests.rs"]
mod tests;
