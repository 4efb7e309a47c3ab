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

//! Locates the Common Crawl WARC captures matching a set of URL patterns
//! without downloading the full CDX index for a crawl.
//!
//! A [`pipeline::Pipeline`] bootstraps a crawl's shard directory into a
//! local [`store::Store`] (fetching only each shard's first row), narrows
//! that directory down to the handful of shards that could contain a match
//! for the caller's [`model::UrlPattern`]s, and streams only those shards
//! looking for matches. Matches are persisted as WARC resource locations,
//! ready for a downstream fetch step.
//!
//! It is designed to run with a small number of coarse-grained concurrent
//! tasks: per-shard directory fetches run on a bounded `rayon` pool, and
//! the shard scan runs alongside a dedicated persistence thread, connected
//! by a channel instead of shared mutable state.

pub mod bootstrap;
pub mod cached_stream;
pub mod config;
pub mod error;
pub mod gzip_partial;
pub mod http;
pub mod model;
pub mod observer;
pub mod pattern_regex;
pub mod pipeline;
pub mod retry;
pub mod scanner;
pub mod sink;
pub mod store;

pub use bootstrap::{BootstrapSummary, IndexBootstrapper};
pub use config::Config;
pub use error::{AppError, Result};
pub use model::{BoundaryRecord, Capture, Crawl, ShardId, UrlPattern, WarcResourceRow};
pub use pipeline::{Pipeline, PipelineObservers, PipelineSummary};
pub use scanner::{ScanSummary, ShardScanner};
pub use sink::{CaptureSink, SinkSnapshot};
pub use store::Store;
