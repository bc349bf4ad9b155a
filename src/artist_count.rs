use std::io;
use std::process::exit;
use std::time::Instant;

use log::{error, info};

use artist_count::logging::set_logger_or_exit;
use artist_count::report::{render_elapsed, render_ranking};
use artist_count::util::*;
use artist_count::{Pipeline, RunError};

fn main() {
    let conf = parse_args("count the most frequent artists in JSON-lines files");
    set_logger_or_exit(&conf.log_stream, conf.log_level);

    let level = if conf.interactive {
        let stdin = io::stdin();
        match prompt_level(stdin.lock(), io::stderr()) {
            Ok(level) => level,
            Err(e) => {
                error!("can't read level: {}", e);
                exit(1);
            }
        }
    } else {
        conf.level
    };

    let top_k_env = std::env::var(TOP_K_VAR).ok();
    let (start_usr_time, start_sys_time) = get_cputime_usecs();
    let start_time = Instant::now();

    let result = conf
        .pipeline_config(level, top_k_env.as_deref())
        .and_then(Pipeline::new)
        .and_then(|pipeline| {
            info!("level {}, input {}", level, pipeline.config().input_dir.display());
            pipeline.run_blocking().map(|report| (pipeline.config().top_k, report))
        });

    let (top_k, report) = match result {
        Ok(done) => done,
        Err(e) => {
            error!("{}", e);
            if let RunError::Failed { partial, .. } = &e {
                error!("{} identifiers counted in files that succeeded", partial.len());
            }
            exit(1);
        }
    };

    let color = !conf.no_color;
    println!("{}", render_ranking(&report.ranked, top_k, color));
    println!("{}", render_elapsed(start_time.elapsed(), color));

    let (end_usr_time, end_sys_time) = get_cputime_usecs();
    let usr_time = (end_usr_time - start_usr_time) as f64 / 1_000_000.0;
    let sys_time = (end_sys_time - start_sys_time) as f64 / 1_000_000.0;
    eprintln!(
        "files: {} lines: {} malformed: {} walltime: {:?} (usr: {:.3}s sys: {:.3}s)",
        report.files,
        report.lines,
        report.malformed,
        start_time.elapsed(),
        usr_time,
        sys_time
    );
}
