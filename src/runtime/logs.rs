// Log tail helpers: line-count clamping and text cleanup.
//
// Both backends hand over payload bytes only. bollard decodes the
// multiplexed stream into `LogOutput` chunks and `docker logs` writes the
// two streams to separate pipes, so no frame headers reach this module.

pub const DEFAULT_LOG_LINES: u32 = 100;
pub const MAX_LOG_LINES: u32 = 1000;

/// Effective tail length: `<= 0` means the default, anything above the
/// maximum is silently capped.
pub fn clamp_log_lines(lines: i64) -> u32 {
    if lines <= 0 {
        DEFAULT_LOG_LINES
    } else {
        lines.min(i64::from(MAX_LOG_LINES)) as u32
    }
}

/// Payload bytes to display text. Invalid UTF-8 is replaced, every other
/// byte is kept as the container wrote it.
pub fn log_text(bytes: &[u8]) -> String {
    tidy_log_text(&String::from_utf8_lossy(bytes))
}

/// Drop blank trailing lines and normalise CRLF.
pub fn tidy_log_text(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .collect();
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(0, |i| i + 1);
    lines[..end].join("\n")
}
