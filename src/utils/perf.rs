//! Memory measurements for the experiment binaries.
//!
//! Solver scratch is allocated once per solve and grows with `n * ncv`, so the
//! peak resident set size of a run is the number the binaries report next to
//! the iteration count.

/// Peak virtual memory (`VmPeak`) of the process in kilobytes, read from
/// `/proc/self/status`. Returns 0 if the value cannot be read.
#[cfg(target_os = "linux")]
pub fn get_peak_rss_kb() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("VmPeak:"))
                .and_then(|value| value.split_whitespace().next())
                .and_then(|kb| kb.parse().ok())
        })
        .unwrap_or(0)
}

/// Not available outside Linux; always 0.
#[cfg(not(target_os = "linux"))]
pub fn get_peak_rss_kb() -> u64 {
    use std::sync::Once;
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        log::warn!("Peak memory measurement is only supported on Linux; reporting 0.");
    });
    0
}
