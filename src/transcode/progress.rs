use std::io::Write;

use tracing::debug;

const OUT_TIME_KEY: &str = "out_time_ms=";

/// Receives elapsed output time, at most once per distinct second.
pub(crate) trait ProgressSink {
    fn report(&mut self, seconds: u64);

    fn finish(&mut self) {}
}

/// Redraws a single status line on stderr.
#[derive(Debug, Default)]
pub(crate) struct ConsoleProgress {
    drawn: bool,
}

impl ProgressSink for ConsoleProgress {
    fn report(&mut self, seconds: u64) {
        debug!(seconds, "transcode progress");
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r⏳ Downloaded: {seconds:>6}s");
        let _ = stderr.flush();
        self.drawn = true;
    }

    fn finish(&mut self) {
        if std::mem::take(&mut self.drawn) {
            eprintln!();
        }
    }
}

/// `out_time_ms` carries microseconds despite its name.
pub(crate) fn parse_out_time_us(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix(OUT_TIME_KEY)?
        .trim()
        .parse::<u64>()
        .ok()
}

#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    last_second: Option<u64>,
}

impl ProgressTracker {
    /// Returns the whole second for a progress line when it differs from the
    /// last one returned.
    pub(crate) fn observe(&mut self, line: &str) -> Option<u64> {
        let seconds = parse_out_time_us(line)? / 1_000_000;
        if self.last_second == Some(seconds) {
            return None;
        }
        self.last_second = Some(seconds);
        Some(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_microsecond_field() {
        assert_eq!(parse_out_time_us("out_time_ms=1500000"), Some(1_500_000));
        assert_eq!(parse_out_time_us("out_time_ms=N/A"), None);
        assert_eq!(parse_out_time_us("out_time_ms=-5"), None);
        assert_eq!(parse_out_time_us("out_time=00:00:01.500000"), None);
        assert_eq!(parse_out_time_us("total_size=1024"), None);
    }

    #[test]
    fn reports_each_second_once() {
        let mut tracker = ProgressTracker::default();
        let lines = [
            "frame=1",
            "out_time_ms=0",
            "out_time_ms=400000",
            "out_time_ms=999999",
            "out_time_ms=1000000",
            "progress=continue",
            "out_time_ms=1900000",
            "out_time_ms=3000001",
        ];

        let reported: Vec<u64> = lines
            .iter()
            .filter_map(|line| tracker.observe(line))
            .collect();

        assert_eq!(reported, vec![0, 1, 3]);
    }
}
