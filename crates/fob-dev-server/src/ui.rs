//! Status lines printed to stderr.

use owo_colors::OwoColorize;

/// Print a success message to stderr.
pub fn success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Initialize color support based on environment and terminal capabilities.
pub fn init_colors(no_color: bool) {
    if no_color || !crate::logger::should_use_colors() {
        owo_colors::set_override(false);
    }
}

/// Print the startup banner: URL, targets and WebSocket namespaces.
pub fn print_server_banner(url: &str, targets: &[String], namespaces: &[String]) {
    success(&format!("Development server running at {}", url.cyan()));
    eprintln!("  {} {}", "targets:".dimmed(), targets.join(", ").bold());
    eprintln!("  {} {}", "websocket:".dimmed(), namespaces.join(" "));
}
