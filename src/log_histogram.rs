use std::fmt;
use std::time::Instant;

use log::{debug, log_enabled, Level};

/// Latency histogram with power-of-two nanosecond bins.
pub struct LogHistogram {
    min: u64,
    max: u64,
    sum: u64,
    hist: [u64; 64],
}

const BARS: &[char; 9] = &['_', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const BARS_MAX: usize = 8;

fn format_nanos(t: f32) -> String {
    if t < 500.0 {
        format!("{:0.3}ns", t)
    } else if t < 500_000.0 {
        format!("{:0.3}us", t / 1000.0)
    } else if t < 500_000_000.0 {
        format!("{:0.3}ms", t / 1_000_000.0)
    } else {
        format!("{:0.3}s", t / 1_000_000_000.0)
    }
}

impl Default for LogHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LogHistogram {
    pub fn new() -> Self {
        LogHistogram {
            min: u64::MAX,
            max: 0,
            sum: 0,
            hist: [0; 64],
        }
    }

    pub fn add_sample_ns(&mut self, value: u64) {
        self.sum = self.sum.saturating_add(value);
        self.max = value.max(self.max);
        self.min = value.min(self.min);
        let bin = (64 - value.leading_zeros() as usize).min(63);
        self.hist[bin] += 1;
    }

    pub fn sample_now(&mut self, ref_time: &Instant) {
        let difference = ref_time.elapsed().as_nanos() as u64;
        self.add_sample_ns(difference);
    }

    fn sparkline(&self) -> String {
        let f_max = self.hist.iter().max().copied().unwrap_or(0);
        let log_f_max = 64 - f_max.leading_zeros() as i32;
        let mut spark_line = String::with_capacity(64);
        for (i, &f) in self.hist.iter().enumerate() {
            let bin_time = 1u64 << i;
            if self.min > bin_time || self.max.saturating_mul(2) < bin_time {
                continue;
            }

            let log_f = 64 - f.leading_zeros() as i32;
            let b = if log_f_max > BARS_MAX as i32 {
                log_f - (log_f_max - BARS_MAX as i32)
            } else {
                log_f
            };
            if b < 0 {
                spark_line.push(if f > 0 { '.' } else { ' ' });
            } else {
                spark_line.push(BARS[b as usize]);
            }
        }
        spark_line
    }

    /// Writes a one-record summary to the debug log.
    pub fn log_stats(&self, name: &str) {
        if self.size() == 0 || !log_enabled!(Level::Debug) {
            return;
        }
        debug!(
            "[{}] ops: {} acc_time:{} mean_time:{} 5%:{} med:{} 95%:{} min: {} |{}| max: {}",
            name,
            self.size(),
            format_nanos(self.sum as f32),
            format_nanos(self.sum as f32 / self.size() as f32),
            format_nanos(self.percentile(0.05)),
            format_nanos(self.percentile(0.5)),
            format_nanos(self.percentile(0.95)),
            format_nanos(self.min as f32),
            self.sparkline(),
            format_nanos(self.max as f32)
        );
    }

    pub fn size(&self) -> u64 {
        self.hist.iter().sum()
    }

    // log-interpolated within a bin, coarse for narrow distributions
    pub fn percentile(&self, p: f32) -> f32 {
        assert!((0.0..=1.0).contains(&p));

        let p_count = (self.size() as f32) * p;
        let mut samples: u64 = 0;
        for (i, &c_bin) in self.hist.iter().enumerate() {
            let samples_incl = samples + c_bin;
            if samples_incl > p_count as u64 {
                if i == 0 {
                    return 0.0;
                }
                let d_bin = (p_count - samples as f32) / c_bin as f32;
                let log_val = (i - 1) as f32 + d_bin;
                return log_val.exp2();
            }
            samples = samples_incl;
        }
        self.max as f32
    }
}

impl fmt::Debug for LogHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHistogram")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("sum", &self.sum)
            .field("hist", &format_args!("{}", self.sparkline()))
            .finish()
    }
}
