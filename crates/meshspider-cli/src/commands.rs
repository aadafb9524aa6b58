//! Subcommand implementations.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use meshspider::config::parse_node_spec;
use meshspider::report::{write_interface_info, write_listing, write_version_statistics};
use meshspider::topology::load_candidates;
use meshspider::{
    Classifier, Dispatcher, DumpReader, DumpWriter, Fetch, HttpFetcher, LocalFetcher,
    NodeAddress, Reconciler, ResultMap, ResultStats, ResultStore, RunPlan, RunSummary,
    SpiderError, SpiderResult,
};

use crate::cli::ProbeArgs;
use crate::config::{resolve_dump_path, spider_config};

/// What a probe invocation produced.
#[derive(Debug)]
pub struct ProbeReport {
    /// `None` when nothing was probed.
    pub summary: Option<RunSummary>,
    pub results: ResultMap,
    pub dump_path: String,
    /// Merge sources that could not be read.
    pub failed_sources: Vec<String>,
}

/// True when `err` stems from bad invocation rather than a failed run.
pub fn is_usage_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SpiderError>(), Some(SpiderError::Usage(_)))
}

fn fetcher(
    args: &ProbeArgs,
    request_timeout: Duration,
    retries: u32,
) -> SpiderResult<Arc<dyn Fetch>> {
    Ok(match &args.local {
        Some(dir) => Arc::new(LocalFetcher::new(dir)),
        None => Arc::new(HttpFetcher::new(request_timeout, retries)?),
    })
}

/// Probe, merge and write every requested output.
pub async fn probe(args: &ProbeArgs, cancel: CancellationToken) -> anyhow::Result<ProbeReport> {
    let mut config = spider_config(args)?;

    let mut explicit = BTreeSet::new();
    for spec in &args.nodes {
        let (node, port) = parse_node_spec(spec)?;
        if let Some(port) = port {
            config.port_overrides.insert(node, port);
        }
        explicit.insert(node);
    }

    let fetch = fetcher(args, config.request_timeout, config.retries)
        .context("failed to set up page fetcher")?;

    let mut candidates: BTreeSet<NodeAddress> = BTreeSet::new();
    if let Some(source) = &args.topology {
        candidates = load_candidates(source, fetch.as_ref(), args.limit)
            .await
            .with_context(|| format!("failed to read topology from {source}"))?;
    }
    candidates.extend(explicit);

    let plan = RunPlan::new(candidates, args.read_dump.clone())?;

    let mut reconciler = Reconciler::new();
    for source in &plan.merge_sources {
        match DumpReader::read_from_path(source) {
            Ok(dump) => reconciler.fold(source, dump.results),
            Err(e) => reconciler.source_failed(source, e),
        }
    }

    let store = match &args.resume {
        Some(path) => {
            let dump = DumpReader::read_from_path(path)
                .with_context(|| format!("failed to resume from {path}"))?;
            info!("resuming with {} recorded nodes from {path}", dump.results.len());
            ResultStore::from(dump.results)
        }
        None => ResultStore::new(),
    };

    let summary = if plan.nodes.is_empty() {
        None
    } else {
        let dispatcher = Dispatcher::new(Arc::new(Classifier::new(fetch)), config);
        Some(dispatcher.run(plan.nodes, &store, &cancel).await)
    };

    let failed_sources = reconciler
        .errors()
        .iter()
        .map(|(source, _)| source.clone())
        .collect();

    // results of this run, resumed ones included, override merged dumps
    let mut results = reconciler.finish();
    for (node, outcome) in store.into_results() {
        if let Some(previous) = results.insert(node, outcome) {
            debug!("{node}: merged {previous} replaced by this run");
        }
    }

    let dump_path = resolve_dump_path(args.output.as_deref());
    DumpWriter::write_to_file(&results, Path::new(&dump_path))
        .with_context(|| format!("failed to write dump {dump_path}"))?;
    info!("wrote {} results to {dump_path}", results.len());

    if let Some(target) = &args.version_statistics {
        write_to(target, |out| write_version_statistics(&results, out))
            .with_context(|| format!("failed to write version statistics to {target}"))?;
    }
    if let Some(target) = &args.interface_info {
        write_to(target, |out| write_interface_info(&results, out))
            .with_context(|| format!("failed to write interface info to {target}"))?;
    }
    if args.verbose > 0 {
        write_to("-", |out| write_listing(&results, args.verbose, out))?;
    }

    Ok(ProbeReport {
        summary,
        results,
        dump_path,
        failed_sources,
    })
}

/// Load a dump and count its outcomes.
pub fn validate(path: &str) -> anyhow::Result<ResultStats> {
    let dump = DumpReader::read_from_path(path)
        .with_context(|| format!("failed to read dump {path}"))?;
    Ok(ResultStats::collect(&dump.results))
}

/// Run `write` against a file, or stdout for `-`.
fn write_to<F>(target: &str, write: F) -> SpiderResult<()>
where
    F: FnOnce(&mut dyn Write) -> SpiderResult<()>,
{
    if target == "-" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write(&mut out)?;
        out.flush()?;
    } else {
        let mut out = BufWriter::new(File::create(target)?);
        write(&mut out)?;
        out.flush()?;
    }
    Ok(())
}
