// Prometheus counters for runs served by the API
use gradebox_common::types::{ExecutionResult, RunStatus};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    runs_total: IntCounterVec,
    run_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = IntCounterVec::new(
            Opts::new("gradebox_runs_total", "Runs by terminal status"),
            &["status"],
        )?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new(
                "gradebox_run_duration_seconds",
                "Wall-clock duration of runs that reached a sandbox",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            run_duration,
        })
    }

    pub fn record(&self, result: &ExecutionResult) {
        self.runs_total
            .with_label_values(&[status_label(result.status)])
            .inc();
        if let Some(ms) = result.execution_time_ms {
            self.run_duration.observe(ms as f64 / 1000.0);
        }
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "completed",
        RunStatus::Faulted => "faulted",
        RunStatus::TimedOut => "timedOut",
        RunStatus::EngineError => "engineError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record(&ExecutionResult::completed(String::new(), Vec::new(), 120));
        metrics.record(&ExecutionResult::timed_out("Run cancelled", None));

        let text = metrics.render().unwrap();
        assert!(text.contains("gradebox_runs_total{status=\"completed\"} 1"));
        assert!(text.contains("gradebox_runs_total{status=\"timedOut\"} 1"));
        assert!(text.contains("gradebox_run_duration_seconds_count 1"));
    }
}
