use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use artist_count::{
    CountError, FailurePolicy, Pipeline, PipelineConfig, RankedEntry, RunError, Transport,
};
use flate2::write::GzEncoder;
use flate2::Compression;

const ARTISTS: &[&str] = &[
    "Radiohead",
    "Arctic Monkeys",
    "Muse",
    "The Killers",
    "Nirvana",
    "Foo Fighters",
    "Placebo",
    "Coldplay",
    "Blur",
    "Oasis",
    "R.E.M.",
    "Panic! At The Disco",
];

fn write_lines(dir: &Path, name: &str, lines: &[String]) {
    let path = dir.join(name);
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    if name.ends_with(".gz") {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    } else {
        fs::write(path, text).unwrap();
    }
}

fn records(field: &str, ids: &[(&str, usize)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (id, n) in ids {
        for _ in 0..*n {
            lines.push(format!(r#"{{"{}":"{}"}}"#, field, id));
        }
    }
    lines
}

/// Deterministic artist lines, with a malformed line every `bad_every`
/// lines when given.
fn generated(lines: usize, seed: u64, bad_every: Option<usize>) -> Vec<String> {
    let mut state = seed;
    (0..lines)
        .map(|i| {
            if bad_every.map_or(false, |n| i % n == n - 1) {
                return r#"{"artist": 17}"#.to_owned();
            }
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let artist = ARTISTS[(state >> 33) as usize % ARTISTS.len()];
            format!(r#"{{"artist":"{}","plays":{}}}"#, artist, i)
        })
        .collect()
}

fn config(dir: &Path, field: &str, top_k: usize) -> PipelineConfig {
    let mut config = PipelineConfig::new(dir);
    config.field = field.to_owned();
    config.top_k = top_k;
    config
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = records("id", &[("A", 3), ("B", 2)]);
    lines.insert(2, "not json".to_owned());
    write_lines(dir.path(), "a.jsonl", &lines);

    let report = Pipeline::new(config(dir.path(), "id", 10)).unwrap().run().await.unwrap();

    assert_eq!(report.ranked, vec![RankedEntry::new("A", 3), RankedEntry::new("B", 2)]);
    assert_eq!(report.lines, 6);
    assert_eq!(report.parsed, 5);
    assert_eq!(report.malformed, 1);
}

#[tokio::test]
async fn test_two_files_top_two() {
    let dir = tempfile::tempdir().unwrap();
    write_lines(dir.path(), "one.jsonl", &records("id", &[("A", 5), ("B", 1)]));
    write_lines(dir.path(), "two.jsonl.gz", &records("id", &[("A", 1), ("C", 4)]));

    let report = Pipeline::new(config(dir.path(), "id", 2)).unwrap().run().await.unwrap();

    assert_eq!(report.ranked, vec![RankedEntry::new("A", 6), RankedEntry::new("C", 4)]);
    assert_eq!(report.files, 2);
    assert_eq!(report.distinct, 3);
}

#[tokio::test]
async fn test_corrupt_file_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    write_lines(dir.path(), "good.jsonl", &records("id", &[("A", 5)]));
    fs::write(dir.path().join("bad.jsonl.gz"), b"definitely not gzip").unwrap();
    write_lines(dir.path(), "more.jsonl.gz", &records("id", &[("B", 5)]));

    let err = Pipeline::new(config(dir.path(), "id", 3)).unwrap().run().await.unwrap_err();

    match err {
        RunError::Worker(CountError::Decompression { path, .. }) => {
            assert_eq!(path, dir.path().join("bad.jsonl.gz"))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_wait_all_reports_partial_counts() {
    let dir = tempfile::tempdir().unwrap();
    write_lines(dir.path(), "good.jsonl", &records("id", &[("A", 5), ("B", 2)]));
    fs::write(dir.path().join("bad.jsonl.gz"), b"definitely not gzip").unwrap();
    write_lines(dir.path(), "more.jsonl.gz", &records("id", &[("B", 5)]));

    let mut config = config(dir.path(), "id", 3);
    config.failure_policy = FailurePolicy::WaitAll;
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();

    match err {
        RunError::Failed {
            files,
            failures,
            partial,
        } => {
            assert_eq!(files, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].path(), &dir.path().join("bad.jsonl.gz"));
            assert_eq!(partial.get("A"), Some(&5));
            assert_eq!(partial.get("B"), Some(&7));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_file_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_lines(dir.path(), "data.jsonl", &records("id", &[("A", 2), ("B", 1)]));
    write_lines(dir.path(), "empty.jsonl", &[]);
    write_lines(dir.path(), "empty.jsonl.gz", &[]);

    let report = Pipeline::new(config(dir.path(), "id", 5)).unwrap().run().await.unwrap();

    assert_eq!(report.files, 3);
    assert_eq!(report.ranked, vec![RankedEntry::new("A", 2), RankedEntry::new("B", 1)]);
}

#[tokio::test]
async fn test_no_inputs_is_empty_ranking() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), "{\"id\":\"A\"}\n").unwrap();

    let report = Pipeline::new(config(dir.path(), "id", 5)).unwrap().run().await.unwrap();

    assert_eq!(report.files, 0);
    assert!(report.ranked.is_empty());
}

#[tokio::test]
async fn test_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let result = Pipeline::new(config(&dir.path().join("absent"), "id", 5))
        .unwrap()
        .run()
        .await;
    assert!(matches!(result, Err(RunError::Discovery { .. })));
}

#[tokio::test]
async fn test_transports_agree() {
    let dir = tempfile::tempdir().unwrap();
    for (i, seed) in [11u64, 23, 37, 41].iter().enumerate() {
        write_lines(dir.path(), &format!("part-{}.jsonl.gz", i), &generated(5_000, *seed, Some(97)));
    }

    let mut rankings = Vec::new();
    for transport in &[
        Transport::WholeFile,
        Transport::Chunked(1),
        Transport::Chunked(7),
        Transport::Chunked(1_000),
        Transport::Chunked(100_000),
    ] {
        let mut config = config(dir.path(), "artist", ARTISTS.len());
        config.transport = *transport;
        let report = Pipeline::new(config).unwrap().run().await.unwrap();
        assert_eq!(report.parsed + report.malformed, 20_000);
        rankings.push(report.ranked);
    }

    let total: u64 = rankings[0].iter().map(|e| e.count).sum();
    assert_eq!(total, 20_000 - 4 * (5_000 / 97) as u64);
    for ranking in &rankings[1..] {
        assert_eq!(ranking, &rankings[0]);
    }
}

#[tokio::test]
async fn test_malformed_lines_do_not_shift_counts() {
    let clean_dir = tempfile::tempdir().unwrap();
    let dirty_dir = tempfile::tempdir().unwrap();
    let clean = generated(3_000, 5, None);
    let mut dirty = Vec::new();
    for (i, line) in clean.iter().enumerate() {
        if i % 13 == 0 {
            dirty.push("{broken".to_owned());
        }
        if i % 29 == 0 {
            dirty.push(String::new());
        }
        dirty.push(line.clone());
    }
    dirty.push(r#"{"name":"Muse"}"#.to_owned());
    write_lines(clean_dir.path(), "f.jsonl", &clean);
    write_lines(dirty_dir.path(), "f.jsonl.gz", &dirty);

    let clean_report = Pipeline::new(config(clean_dir.path(), "artist", 100))
        .unwrap()
        .run()
        .await
        .unwrap();
    let dirty_report = Pipeline::new(config(dirty_dir.path(), "artist", 100))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(clean_report.ranked, dirty_report.ranked);
    assert_eq!(dirty_report.parsed, 3_000);
    assert_eq!(dirty_report.malformed, (dirty.len() - 3_000) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_worker_and_tight_channel() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..6 {
        write_lines(dir.path(), &format!("f{}.jsonl", i), &records("id", &[("A", i + 1), ("B", 3)]));
    }

    let mut config = config(dir.path(), "id", 2);
    config.max_workers = 1;
    config.channel_capacity = 1;
    config.transport = Transport::Chunked(1);
    let report = Pipeline::new(config).unwrap().run().await.unwrap();

    assert_eq!(report.ranked, vec![RankedEntry::new("A", 21), RankedEntry::new("B", 18)]);
}

#[test]
fn test_run_blocking() {
    let dir = tempfile::tempdir().unwrap();
    write_lines(dir.path(), "x.ndjson", &records("artist", &[("Muse", 2), ("Blur", 2), ("Oasis", 1)]));

    let report = Pipeline::new(config(dir.path(), "artist", 2)).unwrap().run_blocking().unwrap();

    assert_eq!(report.ranked, vec![RankedEntry::new("Blur", 2), RankedEntry::new("Muse", 2)]);
}
