//! Highlighting and segmentation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ircpush_core::{segment, RuleSet, RuleSpec};

const LINE: &str = "Oct 16 12:00:01 fw01 sshd[4242]: Failed password for root from 10.0.0.1:52211 port 22 ssh2";

fn rules() -> RuleSet {
    RuleSet::build(&[
        RuleSpec::word("CRITICAL", "red").bold().whole_line(),
        RuleSpec::regex(r"\b\d{1,3}(?:\.\d{1,3}){3}\b", "cyan"),
        RuleSpec::regex(r"(?P<ip>(?:\d{1,3}\.){3}\d{1,3}):(?P<port>\d{1,5})", "yellow")
            .with_groups(["port"]),
        RuleSpec::word("failed", "red").case_insensitive(),
        RuleSpec::word("sshd", "green").in_channels(["#sec*"]),
    ])
}

fn bench_highlight(c: &mut Criterion) {
    let rules = rules();

    let mut group = c.benchmark_group("highlight");
    group.throughput(Throughput::Bytes(LINE.len() as u64));
    group.bench_function("broadcast", |b| {
        b.iter(|| rules.apply_for(black_box(""), black_box(LINE)))
    });
    group.bench_function("scoped", |b| {
        b.iter(|| rules.apply_for(black_box("#security"), black_box(LINE)))
    });
    group.bench_function("whole_line", |b| {
        let line = format!("CRITICAL {LINE}");
        b.iter(|| rules.apply_for(black_box(""), black_box(&line)))
    });
    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let long = LINE.repeat(8);

    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Bytes(long.len() as u64));
    group.bench_function("truncate", |b| {
        b.iter(|| segment(black_box(&long), 400, false))
    });
    group.bench_function("split", |b| b.iter(|| segment(black_box(&long), 400, true)));
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_rule_set", |b| {
        b.iter(|| black_box(rules()))
    });
}

criterion_group!(benches, bench_highlight, bench_segment, bench_compile);
criterion_main!(benches);
