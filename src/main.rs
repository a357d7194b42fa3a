//! Relay Queue command line entry point.
//!
//! ## CLI Subcommands
//!
//! - `relay-queue run` - Drive a simulated workload through the queue (default)
//! - `relay-queue config` - Print the effective configuration as JSON
//! - `relay-queue version` - Print the version

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use relay_queue::config;
use relay_queue::delivery;
use relay_queue::fetch::{MemoryCache, NetworkResponse, Response, StaticNetwork};
use relay_queue::telemetry::init_logging;
use relay_queue::{FetchError, Priority, Request, RequestListener, RequestQueue, Tag};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => {
            let code = run_simulation(&args).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let cfg = config::load();
            match serde_json::to_string_pretty(&cfg.effective_config()) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize configuration: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("relay-queue {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "relay-queue - Prioritized request dispatch queue v{}

USAGE:
    relay-queue [COMMAND] [OPTIONS]

COMMANDS:
    run          Run a simulated workload (default when no command given)
    config       Print the effective configuration as JSON
    version      Show version information
    help         Show this help message

RUN OPTIONS:
    --requests N      Requests to submit (default: 200)
    --keys N          Distinct cache keys to spread them over (default: 20)
    --latency-ms N    Simulated network latency per call (default: 5)
    --cancel-every N  Tag every Nth request and cancel the tag (default: 0, off)

ENVIRONMENT:
    RELAY_QUEUE_NETWORK_THREADS       Network dispatcher threads (default: 4)
    RELAY_QUEUE_THREAD_PREFIX         Dispatcher thread name prefix (default: relay)
    RELAY_QUEUE_NOTIFY_CANCELLED      Post cancel notifications (default: false)
    RELAY_QUEUE_LOCAL_MISS_TO_NETWORK Forward local-only misses (default: false)
    RELAY_LOG_FORMAT                  json or pretty (default: json)
    RELAY_LOG_LEVEL                   Log filter directive (default: info)
    RELAY_LOG_FILE                    Log to this file instead of stderr

EXIT CODES:
    0  Success
    1  Failure",
        version
    );
}

struct RunOptions {
    requests: usize,
    keys: usize,
    latency_ms: u64,
    cancel_every: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            requests: 200,
            keys: 20,
            latency_ms: 5,
            cancel_every: 0,
        }
    }
}

fn parse_run_options(args: &[String]) -> Result<RunOptions, String> {
    let mut opts = RunOptions::default();
    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args
            .get(i + 1)
            .ok_or_else(|| format!("Missing value for {}", flag))?;
        let parsed: u64 = value
            .parse()
            .map_err(|_| format!("Invalid value for {}: {}", flag, value))?;
        match flag {
            "--requests" => opts.requests = parsed as usize,
            "--keys" => opts.keys = (parsed as usize).max(1),
            "--latency-ms" => opts.latency_ms = parsed,
            "--cancel-every" => opts.cancel_every = parsed as usize,
            _ => return Err(format!("Unknown argument: {}", flag)),
        }
        i += 2;
    }
    Ok(opts)
}

/// Counts listener callbacks.
#[derive(Default)]
struct Tally {
    responses: AtomicU64,
    errors: AtomicU64,
    cancelled: AtomicU64,
}

impl RequestListener for Tally {
    fn on_response(&self, _request: &Request, response: &Response) {
        if !response.intermediate {
            self.responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_error(&self, _request: &Request, _error: &FetchError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn on_cancel(&self, _request: &Request) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    requests: usize,
    cancel_requested: usize,
    responses: u64,
    errors: u64,
    cancel_notifications: u64,
    callbacks_dispatched: u64,
    network_calls: u64,
    cache_hits: u64,
    cache_misses: u64,
    elapsed_ms: u128,
}

async fn run_simulation(args: &[String]) -> i32 {
    let opts = match parse_run_options(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let cfg = config::load();
    if let Err(e) = init_logging(&cfg.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return 1;
    }

    let cache = Arc::new(MemoryCache::new());
    let network = Arc::new(StaticNetwork::with_latency(Duration::from_millis(opts.latency_ms)));
    for key in 0..opts.keys {
        let url = item_url(key);
        network.route(url.clone(), NetworkResponse::ok(url.into_bytes()));
    }

    let (channel_delivery, context) = delivery::channel();
    let completions = tokio::spawn(context.run());
    let queue = RequestQueue::with_config(
        cache.clone(),
        network.clone(),
        Arc::new(channel_delivery),
        cfg.request_queue,
    );
    if let Err(e) = queue.start() {
        eprintln!("Failed to start request queue: {}", e);
        return 1;
    }

    let started = Instant::now();
    let tally = Arc::new(Tally::default());
    let doomed: Tag = Arc::new("cancel-every");
    let mut cancel_requested = 0;

    for i in 0..opts.requests {
        let mut builder = Request::builder(item_url(i % opts.keys))
            .priority(Priority::from((i % 4) as u8))
            .listener(tally.clone());
        if opts.cancel_every > 0 && i % opts.cancel_every == 0 {
            builder = builder.tag(doomed.clone());
            cancel_requested += 1;
        }
        if let Err(e) = queue.add(builder.build()) {
            eprintln!("Failed to add request: {}", e);
            return 1;
        }
    }
    if cancel_requested > 0 {
        queue.cancel_all_tagged(&doomed);
    }

    let deadline = Instant::now() + Duration::from_secs(60);
    while queue.in_flight_count() > 0 {
        if Instant::now() > deadline {
            eprintln!("Timed out with {} requests in flight", queue.in_flight_count());
            return 1;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let elapsed = started.elapsed();

    queue.stop();
    drop(queue);
    let callbacks_dispatched = match completions.await {
        Ok(count) => count,
        Err(e) => {
            eprintln!("Completion context failed: {}", e);
            return 1;
        }
    };

    let summary = RunSummary {
        requests: opts.requests,
        cancel_requested,
        responses: tally.responses.load(Ordering::Relaxed),
        errors: tally.errors.load(Ordering::Relaxed),
        cancel_notifications: tally.cancelled.load(Ordering::Relaxed),
        callbacks_dispatched,
        network_calls: network.total_calls(),
        cache_hits: cache.hits(),
        cache_misses: cache.misses(),
        elapsed_ms: elapsed.as_millis(),
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Failed to serialize summary: {}", e);
            1
        }
    }
}

fn item_url(key: usize) -> String {
    format!("https://relay.local/items/{}", key)
}
