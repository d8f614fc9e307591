//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

use crate::error::{classify_error, Error, ErrorClass};

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = error.to_string();
    let typist_error = error.chain().find_map(|cause| cause.downcast_ref::<Error>());

    match typist_error {
        Some(Error::TargetUnavailable(_)) => format_target_error(&mut output),
        Some(Error::Connection(_)) | Some(Error::Timeout(_)) => {
            format_connection_error(&mut output)
        }
        Some(e) if classify_error(e) == ErrorClass::Recoverable => {
            format_transport_error(&mut output)
        }
        _ if error_msg.contains("connect") || error_msg.contains("WebSocket") => {
            format_connection_error(&mut output)
        }
        _ if error_msg.contains("config") => format_config_error(&mut output),
        _ => format_generic_error(&mut output, &error_msg),
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: cdp-typist -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Try without a browser first: cdp-typist --dry-run type 'hello'"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_target_error(output: &mut String) {
    writeln!(output, "Browser Tab Not Found").ok();
    writeln!(output).ok();
    writeln!(output, "No page target matched the requested tab.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. The tab was closed or navigated away").ok();
    writeln!(output, "     → List open tabs: cdp-typist targets").ok();
    writeln!(output, "     → Pass one of the listed ids with --target").ok();
    writeln!(output).ok();
    writeln!(output, "  2. The browser has no open pages").ok();
    writeln!(output, "     → Open a tab and focus the input field").ok();
}

fn format_connection_error(output: &mut String) {
    writeln!(output, "DevTools Connection Error").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "Could not talk to the browser over the remote debugging protocol."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Browser started without remote debugging").ok();
    writeln!(
        output,
        "     → Start it with: chromium --remote-debugging-port=9222"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Wrong endpoint").ok();
    writeln!(
        output,
        "     → Find it: curl http://127.0.0.1:9222/json/version"
    )
    .ok();
    writeln!(
        output,
        "     → Use webSocketDebuggerUrl with --endpoint or [cdp].endpoint"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  3. Browser is busy or frozen").ok();
    writeln!(output, "     → Raise [cdp].command_timeout_ms").ok();
}

fn format_transport_error(output: &mut String) {
    writeln!(output, "Input Delivery Error").ok();
    writeln!(output).ok();
    writeln!(output, "The browser stopped accepting key events.").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "Typing was paused where it stopped; nothing already typed is repeated."
    )
    .ok();
    writeln!(output, "     → Check that the tab is still open").ok();
    writeln!(output, "     → Resume through the RESUME request in serve mode").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Out-of-range values").ok();
    writeln!(output, "     → endpoint must start with ws:// or wss://").ok();
    writeln!(output, "     → default_rate must be between 1 and 200").ok();
    writeln!(
        output,
        "     → Or specify another file: cdp-typist -c /path/to/config.toml"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Typist Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_formatting() {
        let error = anyhow::Error::new(Error::TargetUnavailable("first".into()));
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("cdp-typist targets"));
    }

    #[test]
    fn test_connection_error_through_context() {
        let error = anyhow::Error::new(Error::Connection("refused".into()))
            .context("Failed to open DevTools session");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("remote-debugging-port"));
    }

    #[test]
    fn test_config_error_formatting() {
        let error = anyhow::anyhow!("Failed to parse config file");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Configuration Error"));
    }
}
