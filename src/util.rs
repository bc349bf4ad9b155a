use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use argparse::{ArgumentParser, Collect, Print, Store, StoreOption, StoreTrue};
use libc::{getrusage, rusage, RUSAGE_SELF};
use log::LevelFilter;

use crate::aggregator::FailurePolicy;
use crate::error::RunError;
use crate::pipeline::{PipelineConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_SUFFIXES, DEFAULT_TOP_K};
use crate::record::DEFAULT_FIELD;
use crate::worker::{Transport, DEFAULT_CHUNK_SIZE};

pub const TOP_K_VAR: &str = "TOP_K";

pub fn get_cputime_usecs() -> (u64, u64) {
    // all-zero is a valid rusage
    let mut usage: rusage = unsafe { std::mem::zeroed() };

    unsafe {
        getrusage(RUSAGE_SELF, (&mut usage) as *mut rusage);
    }

    let u_secs = usage.ru_utime.tv_sec as u64;
    let u_usecs = usage.ru_utime.tv_usec as u64;
    let s_secs = usage.ru_stime.tv_sec as u64;
    let s_usecs = usage.ru_stime.tv_usec as u64;

    let u_time = (u_secs * 1_000_000) + u_usecs;
    let s_time = (s_secs * 1_000_000) + s_usecs;

    (u_time, s_time)
}

/// Input subset, each one a subdirectory of the input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Easy,
    Medium,
    Hard,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Easy, Level::Medium, Level::Hard];

    pub fn dir_name(self) -> &'static str {
        match self {
            Level::Easy => "easy",
            Level::Medium => "medium",
            Level::Hard => "hard",
        }
    }

    /// Worker bound used when no thread count is given
    pub fn default_workers(self) -> usize {
        match self {
            Level::Easy => 1,
            Level::Medium => 2,
            Level::Hard => 4,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "easy" => Ok(Level::Easy),
            "2" | "medium" => Ok(Level::Medium),
            "3" | "hard" => Ok(Level::Hard),
            other => Err(format!("unknown level \"{}\"", other)),
        }
    }
}

/// Asks for a level until a valid answer is read.
pub fn prompt_level<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<Level> {
    let mut answer = String::new();
    loop {
        write!(output, "Select a level")?;
        for (i, level) in Level::ALL.iter().enumerate() {
            write!(output, " [{}] {}", i + 1, level)?;
        }
        write!(output, ": ")?;
        output.flush()?;

        answer.clear();
        if input.read_line(&mut answer)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no level selected"));
        }
        match answer.parse() {
            Ok(level) => return Ok(level),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

pub struct Config {
    pub input: Option<String>,
    pub top_k: Option<usize>,
    pub level: Level,
    pub interactive: bool,
    pub flat: bool,
    pub threads: usize,
    pub field: String,
    pub suffixes: Vec<String>,
    pub whole_file: bool,
    pub chunk_size: usize,
    pub channel_capacity: usize,
    pub wait_all: bool,
    pub no_color: bool,
    pub log_stream: String,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: None,
            top_k: None,
            level: Level::Easy,
            interactive: false,
            flat: false,
            threads: 0,
            field: DEFAULT_FIELD.to_owned(),
            suffixes: Vec::new(),
            whole_file: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            wait_all: false,
            no_color: false,
            log_stream: "-".to_owned(),
            log_level: LevelFilter::Info,
        }
    }
}

pub fn parse_args(description: &str) -> Config {
    let args: Vec<String> = std::env::args().collect();
    match parse_args_from(description, args, &mut io::stdout(), &mut io::stderr()) {
        Ok(conf) => conf,
        Err(code) => std::process::exit(code),
    }
}

/// Parses `args` (program name first); `Err` carries the exit code.
pub fn parse_args_from(
    description: &str,
    args: Vec<String>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<Config, i32> {
    let mut conf = Config::default();

    {
        // this block limits scope of borrows by ap.refer() method
        let mut ap = ArgumentParser::new();

        ap.set_description(description);
        ap.add_option(
            &["-V", "--version"],
            Print(env!("CARGO_PKG_VERSION").to_string()),
            "Show version",
        );

        ap.refer(&mut conf.input)
            .add_argument("input", StoreOption, "input directory - default: data");

        ap.refer(&mut conf.top_k).add_option(
            &["-k", "--top-k"],
            StoreOption,
            "number of ranked entries - default: $TOP_K or 10",
        );

        ap.refer(&mut conf.level).add_option(
            &["-l", "--level"],
            Store,
            "input subset: easy, medium or hard - default: easy",
        );

        ap.refer(&mut conf.interactive).add_option(
            &["-i", "--interactive"],
            StoreTrue,
            "ask for the level on stdin",
        );

        ap.refer(&mut conf.flat).add_option(
            &["--flat"],
            StoreTrue,
            "read the input directory itself, not a level subdirectory",
        );

        ap.refer(&mut conf.threads).add_option(
            &["-t", "--threads"],
            Store,
            "max concurrent workers - default: per level",
        );

        ap.refer(&mut conf.field).add_option(
            &["--field"],
            Store,
            "JSON field holding the identifier - default: artist",
        );

        ap.refer(&mut conf.suffixes).add_option(
            &["--suffix"],
            Collect,
            "accepted file suffix, repeatable - default: .jsonl .jsonl.gz .json.gz .ndjson",
        );

        ap.refer(&mut conf.whole_file).add_option(
            &["--whole-file"],
            StoreTrue,
            "send one table per file instead of chunks",
        );

        ap.refer(&mut conf.chunk_size).add_option(
            &["--chunk-size"],
            Store,
            "counted lines per chunk - default: 100000",
        );

        ap.refer(&mut conf.channel_capacity).add_option(
            &["--channel-capacity"],
            Store,
            "chunks in flight to the aggregator - default: 16",
        );

        ap.refer(&mut conf.wait_all).add_option(
            &["--wait-all"],
            StoreTrue,
            "on failure, wait for all files and report partial counts",
        );

        ap.refer(&mut conf.no_color)
            .add_option(&["--no-color"], StoreTrue, "plain output");

        ap.refer(&mut conf.log_stream)
            .add_option(&["--log"], Store, "log file, - for stderr - default: -");

        ap.refer(&mut conf.log_level)
            .add_option(&["--log-level"], Store, "log level - default: info");

        ap.parse(args, stdout, stderr)?;
    }

    Ok(conf)
}

/// An explicit flag wins over the environment value.
pub fn resolve_top_k(flag: Option<usize>, env: Option<&str>) -> Result<usize, RunError> {
    match (flag, env) {
        (Some(k), _) => Ok(k),
        (None, Some(value)) => value
            .trim()
            .parse()
            .map_err(|_| RunError::Config(format!("{} is not a number: \"{}\"", TOP_K_VAR, value))),
        (None, None) => Ok(DEFAULT_TOP_K),
    }
}

impl Config {
    pub fn pipeline_config(&self, level: Level, top_k_env: Option<&str>) -> Result<PipelineConfig, RunError> {
        let base = PathBuf::from(self.input.as_deref().unwrap_or("data"));
        let input_dir = if self.flat { base } else { base.join(level.dir_name()) };
        let suffixes = if self.suffixes.is_empty() {
            DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect()
        } else {
            self.suffixes.clone()
        };

        let config = PipelineConfig {
            input_dir,
            suffixes,
            field: self.field.clone(),
            top_k: resolve_top_k(self.top_k, top_k_env)?,
            transport: if self.whole_file {
                Transport::WholeFile
            } else {
                Transport::Chunked(self.chunk_size)
            },
            max_workers: if self.threads == 0 {
                level.default_workers()
            } else {
                self.threads
            },
            channel_capacity: self.channel_capacity,
            failure_policy: if self.wait_all {
                FailurePolicy::WaitAll
            } else {
                FailurePolicy::FailFast
            },
        };
        config.validate()?;
        Ok(config)
    }
}
