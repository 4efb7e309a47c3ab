/*
 * This software is Copyright (c) 2021 The Regents of the University of
 * California. All Rights Reserved. Permission to copy, modify, and distribute this
 * software and its documentation for academic research and education purposes,
 * without fee, and without a written agreement is hereby granted, provided that
 * the above copyright notice, this paragraph and the following three paragraphs
 * appear in all copies. Permission to make use of this software for other than
 * academic research and education purposes may be obtained by contacting:
 *
 * Office of Innovation and Commercialization
 * 9500 Gilman Drive, Mail Code 0910
 * University of California
 * La Jolla, CA 92093-0910
 * (858) 534-5815
 * invent@ucsd.edu
 *
 * This software program and documentation are copyrighted by The Regents of the
 * University of California. The software program and documentation are supplied
 * "as is", without any accompanying services from The Regents. The Regents does
 * not warrant that the operation of the program will be uninterrupted or
 * error-free. The end-user understands that the program was developed for research
 * purposes and is advised not to rely exclusively on the program for any reason.
 *
 * IN NO EVENT SHALL THE UNIVERSITY OF CALIFORNIA BE LIABLE TO ANY PARTY FOR
 * DIRECT, INDIRECT, SPECIAL, INCIDENTAL, OR CONSEQUENTIAL DAMAGES, INCLUDING LOST
 * PROFITS, ARISING OUT OF THE USE OF THIS SOFTWARE AND ITS DOCUMENTATION, EVEN IF
 * THE UNIVERSITY OF CALIFORNIA HAS BEEN ADVISED OF THE POSSIBILITY OF SUCH
 * DAMAGE. THE UNIVERSITY OF CALIFORNIA SPECIFICALLY DISCLAIMS ANY WARRANTIES,
 * INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND
 * FITNESS FOR A PARTICULAR PURPOSE. THE SOFTWARE PROVIDED HEREUNDER IS ON AN "AS
 * IS" BASIS, AND THE UNIVERSITY OF CALIFORNIA HAS NO OBLIGATIONS TO PROVIDE
 * MAINTENANCE, SUPPORT, UPDATES, ENHANCEMENTS, OR MODIFICATIONS.
 *
 */

use cc_locator::{Config, IndexBootstrapper, Pipeline, PipelineObservers, Store, UrlPattern};
use clap::Parser;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io::Write;
use std::sync::mpsc::channel;
use std::thread;

#[derive(Parser)]
#[command(about = "Locates Common Crawl WARC captures for a set of URL patterns")]
struct Opts {
    /// Crawl label to scan, e.g. CC-MAIN-2024-51. Prompted interactively if omitted.
    #[arg(short, long)]
    crawl: Option<String>,

    /// URL pattern as tld,domain[,subdomain[,path]]. Repeatable; at least one required.
    #[arg(short, long = "pattern")]
    patterns: Vec<String>,

    /// Path to the sqlite store file, overriding CC_STORE_PATH.
    #[arg(long)]
    store: Option<String>,

    /// Local cache directory for downloaded shards, overriding CC_CACHE_DIR.
    #[arg(long)]
    cache_dir: Option<String>,

    /// Number of rayon worker threads used for the shard-directory bootstrap.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Debug aid: bootstrap the named crawl's boundary directory and dump
    /// it to a CSV file instead of scanning for any pattern.
    #[arg(long)]
    dump_boundaries: Option<String>,
}

#[derive(Deserialize, Clone)]
struct CollectionInfo {
    id: String,
    name: String,
}

fn parse_pattern(spec: &str) -> Result<UrlPattern, String> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(format!(
            "pattern '{spec}' must be at least 'tld,domain' (got {} fields)",
            parts.len()
        ));
    }
    let mut pattern = UrlPattern::new(parts[0], parts[1]);
    if let Some(subdomain) = parts.get(2).filter(|s| !s.is_empty()) {
        pattern = pattern.with_subdomain(*subdomain);
    }
    if let Some(path) = parts.get(3).filter(|s| !s.is_empty()) {
        pattern = pattern.with_path(*path);
    }
    Ok(pattern)
}

fn resolve_crawl_label(config: &Config, requested: Option<String>) -> String {
    if let Some(label) = requested {
        return label;
    }

    let collections: Vec<CollectionInfo> = reqwest::blocking::get(config.collinfo_url())
        .and_then(|resp| resp.json())
        .unwrap_or_else(|err| {
            eprintln!("failed to fetch {}: {err}", config.collinfo_url());
            std::process::exit(1);
        });

    let newest = collections
        .first()
        .unwrap_or_else(|| {
            eprintln!("collinfo.json returned no crawls");
            std::process::exit(1);
        })
        .clone();

    if Confirm::new()
        .with_prompt(format!("Scan crawl {} ({})?", newest.id, newest.name))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        return newest.id;
    }

    let ids = collections
        .iter()
        .map(|c| c.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let input: String = Input::new()
        .with_prompt(format!("Select from the following crawl labels:\n{ids}"))
        .interact_text()
        .unwrap_or(newest.id);
    input
}

/// `--dump-boundaries CRAWL`: bootstrap the shard directory for `crawl`
/// (fetching it if not already cached in the store) and write it out as
/// CSV, mirroring the teacher's `--dump-cluster-idx` debug flag.
fn dump_boundaries(config: Config, crawl_label: &str) {
    let store = Store::open(&config.store_path).unwrap_or_else(|err| {
        eprintln!("failed to open store: {err}");
        std::process::exit(1);
    });
    let fetcher = cc_locator::http::HttpFetcher::new(config.user_agent.clone());

    let bootstrapper = IndexBootstrapper::new(&store, &fetcher, &config);
    if let Err(err) = bootstrapper.run(crawl_label) {
        eprintln!("failed to bootstrap {crawl_label}: {err}");
        std::process::exit(1);
    }

    let crawl = store
        .get_crawl_by_label(crawl_label)
        .ok()
        .flatten()
        .unwrap_or_else(|| {
            eprintln!("crawl {crawl_label} not found after bootstrap");
            std::process::exit(1);
        });

    let out_name = format!("boundaries-{}.csv", crawl_label.to_lowercase());
    let mut file = std::fs::File::create(&out_name).unwrap_or_else(|err| {
        eprintln!("failed to create {out_name}: {err}");
        std::process::exit(1);
    });

    let boundaries = store.list_boundaries(crawl.id).unwrap_or_else(|err| {
        eprintln!("failed to read boundary directory: {err}");
        std::process::exit(1);
    });
    for record in &boundaries {
        writeln!(file, "{}", record.to_csv()).unwrap();
    }
    println!("wrote {} boundary rows to {out_name}", boundaries.len());
}

fn main() {
    env_logger::init();
    let opts: Opts = Opts::parse();

    if let Some(n) = opts.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .expect("failed to initialize rayon threadpool");
    }

    let mut config = Config::from_env();
    if let Some(store) = &opts.store {
        config.store_path = store.into();
    }
    if let Some(cache_dir) = &opts.cache_dir {
        config.cache_dir = cache_dir.into();
    }

    if let Some(label) = opts.dump_boundaries {
        dump_boundaries(config, &label);
        return;
    }

    let patterns: Vec<UrlPattern> = opts
        .patterns
        .iter()
        .map(|spec| {
            parse_pattern(spec).unwrap_or_else(|err| {
                eprintln!("{err}");
                std::process::exit(1);
            })
        })
        .collect();
    if patterns.is_empty() {
        eprintln!("at least one --pattern tld,domain[,subdomain[,path]] is required");
        std::process::exit(1);
    }

    let crawl_label = resolve_crawl_label(&config, opts.crawl);
    println!("Locating captures in {crawl_label}...");

    let pipeline = Pipeline::new(config).unwrap_or_else(|err| {
        eprintln!("failed to open store: {err}");
        std::process::exit(1);
    });

    let (index_tx, index_rx) = channel();
    let (scan_tx, scan_rx) = channel();

    let index_bar = ProgressBar::new(1);
    index_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] index {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .expect("invalid progress bar template")
            .progress_chars("##-"),
    );
    let index_bar_handle = index_bar.clone();
    let index_thread = thread::spawn(move || {
        for event in index_rx.iter() {
            index_bar_handle.set_length(event.indices_total.max(1) as u64);
            index_bar_handle.set_position(event.indices_done as u64);
            index_bar_handle.set_message(event.status_msg);
            if event.complete {
                break;
            }
        }
    });

    let scan_bar = ProgressBar::new(100);
    scan_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] scan  {bar:40.green/blue} {pos:>3}% {msg}")
            .expect("invalid progress bar template")
            .progress_chars("##-"),
    );
    let scan_bar_handle = scan_bar.clone();
    let scan_thread = thread::spawn(move || {
        for event in scan_rx.iter() {
            if let Some(percent) = event.percent {
                scan_bar_handle.set_position(percent as u64);
            }
            scan_bar_handle.set_message(event.status_msg);
        }
    });

    let observers = PipelineObservers {
        index_status: Some(index_tx),
        scan_progress: Some(scan_tx),
    };

    let result = pipeline.run(&crawl_label, &patterns, observers);

    index_thread.join().ok();
    scan_thread.join().ok();
    index_bar.finish_and_clear();
    scan_bar.finish_and_clear();

    match result {
        Ok(summary) => {
            println!(
                "bootstrap: {} shards total, {} boundary rows added",
                summary.bootstrap.shards_total, summary.bootstrap.rows_added
            );
            println!("candidate shards scanned: {}", summary.candidate_shards);
            println!(
                "matched {} lines across {} shards ({} skipped)",
                summary.scan.lines_matched, summary.scan.shards_scanned, summary.scan.lines_skipped
            );
            println!(
                "persisted {} new WARC resources ({} already known)",
                summary.sink.inserted, summary.sink.duplicates
            );
        }
        Err(err) => {
            eprintln!("run failed: {err}");
            std::process::exit(1);
        }
    }
}
