use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use relations_core::{
    EntityType, IndexedEntity, MemorySource, NullProgress, SearchConfig, SearchQuery,
    SearchService, SystemClock,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_INDEX_DIR: &str = "/tmp/relations-index";
const DEFAULT_LIMIT: usize = 50;
const BENCH_RUNS: usize = 5;

#[derive(Debug)]
struct Args {
    index_dir: PathBuf,
    entities: Option<PathBuf>,
    languages: Vec<String>,
    queries: Vec<String>,
    item_types: Vec<EntityType>,
    limit: usize,
    reindex: bool,
    writer_threads: usize,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            entities: None,
            languages: Vec::new(),
            queries: Vec::new(),
            item_types: Vec::new(),
            limit: DEFAULT_LIMIT,
            reindex: false,
            writer_threads: 1,
        }
    }
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = env::args_os();
        let _program = args.next();
        let mut config = Args::default();

        while let Some(arg) = args.next() {
            let arg_str = arg.to_string_lossy();
            match arg_str.as_ref() {
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                "--index-dir" => config.index_dir = flag_value(&mut args, "--index-dir")?.into(),
                "--entities" => config.entities = Some(flag_value(&mut args, "--entities")?.into()),
                "--lang" => config.languages.push(flag_value(&mut args, "--lang")?),
                "--q" => config.queries.push(flag_value(&mut args, "--q")?),
                "--type" => config.item_types.push(parsed_flag(&mut args, "--type")?),
                "--limit" => config.limit = parsed_flag(&mut args, "--limit")?,
                "--threads" => config.writer_threads = parsed_flag(&mut args, "--threads")?,
                "--reindex" => {
                    config.reindex = true;
                }
                unknown => bail!("unknown argument: {}", unknown),
            }
        }

        if config.languages.is_empty() {
            config.languages.push("en".to_string());
        }
        if config.limit == 0 {
            bail!("--limit must be greater than 0");
        }

        Ok(config)
    }
}

/// The argument following `flag`, lossily decoded.
fn flag_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String> {
    let value = args
        .next()
        .with_context(|| format!("{flag} needs a value"))?;
    Ok(value.to_string_lossy().into_owned())
}

fn parsed_flag<T>(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = flag_value(args, flag)?;
    raw.parse()
        .map_err(|err| anyhow!("{flag}: cannot parse {raw:?}: {err}"))
}

fn print_usage() {
    eprintln!("relations-core smoke test");
    eprintln!("\nUsage:");
    eprintln!("  cargo run -p relations-core --bin smoke -- --entities <file.json> [options]\n");
    eprintln!("Options:");
    eprintln!("  --index-dir <path>        Index root (default: /tmp/relations-index)");
    eprintln!("  --entities <path>         JSON array of items to index");
    eprintln!("  --lang <code>             Analyzer language (repeatable, default en)");
    eprintln!("  --q <query>               Query to benchmark (repeatable)");
    eprintln!("  --type <term|text|person> Restrict hits to an item type (repeatable)");
    eprintln!("  --threads <N>             Tantivy writer threads, 0 for num_cpus (default 1)");
    eprintln!("  --limit <N>               Max hits per query (default 50)");
    eprintln!("  --reindex                 Rebuild every language index from scratch");
    eprintln!("  --help                    Show this message");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse().unwrap_or_else(|err| {
        eprintln!("error: {err:#}");
        eprintln!("Use --help to see available options.");
        std::process::exit(1);
    });

    run(args)
}

fn run(args: Args) -> Result<()> {
    let source = Arc::new(MemorySource::new(Arc::new(SystemClock)));
    if let Some(path) = &args.entities {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let entities: Vec<IndexedEntity> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        for entity in entities {
            source.insert(entity);
        }
    }

    let mut config = SearchConfig::on_disk(args.index_dir.clone(), &[]);
    config.languages = args.languages.clone();
    config.writer.writer_threads = args.writer_threads;
    config.default_limit = args.limit;

    println!(
        "[CONFIG] index_dir={} languages={:?} threads={} limit={} items={}",
        args.index_dir.display(),
        args.languages,
        config.writer.threads(),
        args.limit,
        source.len()
    );

    let service = SearchService::new(&config, source)?;

    let start = Instant::now();
    let indexed = if args.reindex {
        service.initialize_index(&NullProgress)?
    } else {
        service.refresh_index(&NullProgress)?
    };
    println!(
        "[INFO] indexed={} reindex={} total={:.2} s",
        indexed,
        args.reindex,
        start.elapsed().as_secs_f64()
    );
    for stats in service.stats()? {
        println!("[INFO] language={} documents={}", stats.language, stats.documents);
    }

    if args.queries.is_empty() {
        return Ok(());
    }

    println!("[INFO] running query benchmarks (limit {})", args.limit);
    for language in &args.languages {
        for query in &args.queries {
            let search_query = SearchQuery::new(query.as_str(), language.as_str())
                .with_types(&args.item_types)
                .with_limit(args.limit);

            let mut durations = Vec::with_capacity(BENCH_RUNS);
            let mut last_results = Vec::new();
            for _ in 0..BENCH_RUNS {
                let query_start = Instant::now();
                let results = service.search_with(&search_query)?;
                durations.push(query_start.elapsed());
                if last_results.is_empty() {
                    last_results = results;
                }
            }

            durations.sort_unstable();
            let p50 = nearest_rank_ms(&durations, 50);
            let p95 = nearest_rank_ms(&durations, 95);
            println!(
                "lang={} query=\"{}\" hits={} p50={:.2}ms p95={:.2}ms",
                language,
                query,
                last_results.len(),
                p50,
                p95
            );

            for hit in last_results.iter().take(5) {
                println!("  • [{}:{}] {} ({:.3})", hit.item_type, hit.id, hit.title, hit.score);
            }
        }
    }

    Ok(())
}

/// Nearest-rank percentile of already sorted samples, in milliseconds.
fn nearest_rank_ms(sorted: &[Duration], pct: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.min(100) * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1].as_secs_f64() * 1_000.0
}
