//! Routing performance benchmarks
//!
//! Measures the non-I/O hot paths: chain resolution (run on every config
//! load), health-key derivation (every probe and every failed attempt),
//! NDJSON stream decoding and the prompt security screen (every request).
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::str::FromStr;
use tailgate::config::{Config, RoutingConfig, SecurityConfig};
use tailgate::providers::ndjson::NdjsonAccumulator;
use tailgate::routing::resolve;
use tailgate::security::SecurityPipeline;

/// Config with `groups` instance groups of four members each, all referenced
/// from the chain, followed by one literal cloud candidate
fn routing_config(groups: usize) -> String {
    let mut toml = String::from("[server]\nhost = \"127.0.0.1\"\nport = 3000\n");

    for g in 0..groups {
        for m in 0..4 {
            toml.push_str(&format!(
                "\n[[routing.models]]\nid = \"m{g}-{m}\"\nprovider = \"ollama\"\nmodel = \"llama3\"\napi_url = \"http://10.0.{g}.{m}:11434/api/generate\"\n"
            ));
        }
        toml.push_str(&format!(
            "\n[[routing.instance_groups]]\nid = \"g{g}\"\nmodels = [\"m{g}-0\", \"m{g}-1\", \"m{g}-2\", \"m{g}-3\"]\n"
        ));
    }
    for g in 0..groups {
        toml.push_str(&format!(
            "\n[[routing.fallback_chain]]\nref = \"g{g}\"\ntype = \"instance_group\"\n"
        ));
    }
    toml.push_str("\n[[routing.fallback_chain]]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\n");
    toml
}

/// Benchmark fallback chain resolution
///
/// Linear in the number of chain entries plus group members.
fn bench_chain_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_resolution");

    for groups in [1usize, 8, 32] {
        let config = Config::from_str(&routing_config(groups)).unwrap();
        let routing: RoutingConfig = config.routing;
        group.bench_with_input(BenchmarkId::from_parameter(groups), &routing, |b, r| {
            b.iter(|| resolve(black_box(r)));
        });
    }

    group.finish();
}

/// Benchmark configuration parsing and validation
///
/// Runs once at startup and once per reload.
fn bench_config_parsing(c: &mut Criterion) {
    let toml_str = routing_config(4);

    c.bench_function("config_parsing", |b| {
        b.iter(|| Config::from_str(black_box(&toml_str)).unwrap());
    });
}

/// Benchmark instance-qualified health key derivation
fn bench_health_keys(c: &mut Criterion) {
    let config = Config::from_str(&routing_config(8)).unwrap();
    let chain = resolve(&config.routing);

    c.bench_function("health_keys", |b| {
        b.iter(|| {
            chain
                .iter()
                .map(|candidate| candidate.health_key())
                .collect::<Vec<_>>()
        });
    });
}

/// Benchmark NDJSON accumulation with lines split across chunks
fn bench_ndjson_stream(c: &mut Criterion) {
    let mut body = String::new();
    for i in 0..256 {
        body.push_str(&format!("{{\"response\":\"token{} \",\"done\":false}}\n", i));
    }
    body.push_str("{\"response\":\"\",\"done\":true}\n");
    let bytes = body.into_bytes();

    let mut group = c.benchmark_group("ndjson_stream");
    for chunk_size in [64usize, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, size| {
                b.iter(|| {
                    let mut acc = NdjsonAccumulator::new();
                    for chunk in bytes.chunks(*size) {
                        acc.push(chunk);
                    }
                    acc.finish().unwrap()
                });
            },
        );
    }
    group.finish();
}

/// Benchmark the prompt security screen
fn bench_security_screen(c: &mut Criterion) {
    let pipeline = SecurityPipeline::from_config(&SecurityConfig {
        blocked_phrases: vec![
            "ignore previous instructions".to_string(),
            "system prompt".to_string(),
            "developer mode".to_string(),
        ],
        max_prompt_chars: 32_000,
    });

    let prompts = [
        ("short", "What is Rust?"),
        (
            "long",
            "Write a comprehensive tutorial on async programming in Rust, covering futures, tokio, async/await syntax, pinning, and common patterns. Include code examples and explain the relationship between Future, Poll, and Waker.",
        ),
    ];

    let mut group = c.benchmark_group("security_screen");
    for (name, prompt) in prompts {
        group.bench_with_input(BenchmarkId::from_parameter(name), &prompt, |b, p| {
            b.iter(|| pipeline.check_prompt(black_box(p)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_resolution,
    bench_config_parsing,
    bench_health_keys,
    bench_ndjson_stream,
    bench_security_screen,
);
criterion_main!(benches);
