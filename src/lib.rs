//! A blocking Rust client for the MAAP (Multi-Mission Algorithm and Analysis
//! Platform) APIs.
//!
//! It covers catalog search over granules and collections, downloads,
//! job submission and polling on the Data Processing System (DPS),
//! short-lived AWS credentials, user secrets, the member profile and
//! uploads to the shared user bucket.
//!
//! ## Quick start
//! - Configure the platform host and your token via environment variables
//!   (`MAAP_API_HOST`, `MAAP_API_TOKEN`) or a `.maaprc` file (current
//!   directory or home directory, or the path in `MAAP_RC`).
//! - Search with a [`SearchQuery`], or submit a [`JobRequest`] and wait on the
//!   returned [`Job`].
//!
//! ```no_run
//! use maap::{Client, JobRequest, SearchQuery, WaitOptions};
//! use std::time::Duration;
//!
//! fn main() -> maap::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     let granules = client.search_granules(
//!         &SearchQuery::new().short_name("GEDI02_A").limit(5),
//!     )?;
//!     for granule in &granules {
//!         println!("{}", granule.description());
//!     }
//!
//!     let request = JobRequest::new("demo-run", "hello_world", "main", "maap-dps-worker-8gb")
//!         .input("input_file", "s3://bucket/input.tif");
//!     let mut job = client.submit_job(&request)?;
//!     let status = job.wait_for_completion(
//!         &WaitOptions::default().with_timeout(Duration::from_secs(3600)),
//!     )?;
//!     println!("{} finished {}: {:?}", job.id(), status, job.outputs());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod algorithm;
mod client;
mod config;
mod credentials;
mod download;
mod dps;
mod error;
mod job;
mod poll;
mod profile;
mod result;
mod search;
mod secrets;
mod upload;
mod util;
mod xml;

pub use client::Client;
pub use config::{ClientConfig, Endpoints};
pub use credentials::{Aws, CredentialBundle, DEFAULT_EXPIRATION_SECS, SignedUrl};
pub use error::{Error, Result};
pub use job::{Job, JobMetrics, JobRequest, JobStatus, ListJobs};
pub use poll::WaitOptions;
pub use profile::{AccountInfo, Profile};
pub use result::{Collection, Granule};
pub use search::SearchQuery;
pub use secrets::{Secret, Secrets};
pub use upload::{Upload, UploadConfig};
