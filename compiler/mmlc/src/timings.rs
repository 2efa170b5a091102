//! Per-phase wall-clock timings.

use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct Timings {
    entries: Vec<(String, Duration)>,
}

impl Timings {
    pub fn new() -> Self {
        Timings::default()
    }

    /// Run `f`, recording its wall-clock duration under `name`.
    pub fn time<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.entries.push((name.to_string(), start.elapsed()));
        result
    }

    pub fn entries(&self) -> &[(String, Duration)] {
        &self.entries
    }

    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    /// Two-column table for `--timings`.
    pub fn render(&self) -> String {
        let width = self
            .entries
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("total".len());
        let mut out = String::new();
        for (name, duration) in &self.entries {
            out.push_str(&format!("{name:width$}  {duration:>10.1?}\n"));
        }
        out.push_str(&format!("{:width$}  {:>10.1?}\n", "total", self.total()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut timings = Timings::new();
        let value = timings.time("parse", || 41 + 1);
        assert_eq!(value, 42);
        timings.time("check", || {});
        let names: Vec<&str> = timings.entries().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["parse", "check"]);
        assert!(timings.render().contains("total"));
    }
}
