//! DPS job submission and the job handle.

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{Client, XML};
use crate::dps::{self, RESERVED_INPUTS};
use crate::error::{Error, Result};
use crate::poll::{WaitOptions, poll_until_terminal};
use crate::util::{require_non_empty, urljoin};

const JOB_STATUS: &str = "status";
const JOB_METRICS: &str = "metrics";
const JOB_CANCEL: &str = "cancel";
const JOB_LIST: &str = "list";

/// Job status as reported by DPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum JobStatus {
    /// Queued; the job has been submitted but not started.
    Accepted,
    Running,
    Succeeded,
    Failed,
    /// Cancelled.
    Dismissed,
    /// An identical job already ran; its results are reused.
    Deduped,
    /// The worker went offline. DPS may still resume the job.
    Offline,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        Self::Accepted,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Dismissed,
        Self::Deduped,
        Self::Offline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Dismissed => "Dismissed",
            Self::Deduped => "Deduped",
            Self::Offline => "Offline",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Dismissed | Self::Deduped
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Deduped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "accepted" | "submitted" | "job-queued" => Self::Accepted,
            "running" | "job-started" => Self::Running,
            "succeeded" | "successful" | "job-completed" => Self::Succeeded,
            "failed" | "job-failed" => Self::Failed,
            "dismissed" | "cancelled" | "canceled" | "job-revoked" => Self::Dismissed,
            "deduped" | "job-deduped" => Self::Deduped,
            "offline" | "job-offline" => Self::Offline,
            _ => {
                let valid: Vec<&str> = Self::ALL.iter().map(JobStatus::as_str).collect();
                return Err(Error::Parse(format!(
                    "job status {:?}; expected one of: {}",
                    s,
                    valid.join(", ")
                )));
            }
        };
        Ok(status)
    }
}

/// Resource usage reported for a finished job, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobMetrics {
    entries: Vec<(String, Option<String>)>,
}

impl JobMetrics {
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn machine_type(&self) -> Option<&str> {
        self.get("machine_type")
    }

    pub fn job_start_time(&self) -> Option<&str> {
        self.get("job_start_time")
    }

    pub fn job_end_time(&self) -> Option<&str> {
        self.get("job_end_time")
    }

    pub fn job_duration_seconds(&self) -> Option<f64> {
        self.get("job_duration_seconds")?.trim().parse().ok()
    }

    pub fn max_mem_usage(&self) -> Option<u64> {
        self.get("max_mem_usage")?.trim().parse().ok()
    }

    pub fn directory_size(&self) -> Option<u64> {
        self.get("directory_size")?.trim().parse().ok()
    }
}

/// A request to run a registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    identifier: String,
    algo_id: String,
    version: String,
    queue: String,
    inputs: Vec<(String, String)>,
    retrieve_attributes: bool,
}

impl JobRequest {
    /// `identifier` is a free-form tag, `queue` the worker resource
    /// (see [`Client::list_queues`]).
    pub fn new(
        identifier: impl Into<String>,
        algo_id: impl Into<String>,
        version: impl Into<String>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            algo_id: algo_id.into(),
            version: version.into(),
            queue: queue.into(),
            inputs: Vec::new(),
            retrieve_attributes: false,
        }
    }

    /// Adds an algorithm input; names must match the algorithm registration.
    pub fn input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push((name.into(), value.into()));
        self
    }

    /// Fetch status right after submission.
    pub fn retrieve_attributes(mut self, retrieve: bool) -> Self {
        self.retrieve_attributes = retrieve;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("identifier", &self.identifier)?;
        require_non_empty("algo_id", &self.algo_id)?;
        require_non_empty("version", &self.version)?;
        require_non_empty("queue", &self.queue)?;
        for (name, _) in &self.inputs {
            require_non_empty("input name", name)?;
            if RESERVED_INPUTS.contains(&name.as_str()) {
                return Err(Error::validation(format!(
                    "input name {:?} is reserved",
                    name
                )));
            }
        }
        Ok(())
    }

    fn encode(&self, username: &str) -> Result<String> {
        let mut inputs: Vec<(&str, &str)> = vec![
            ("identifier", self.identifier.as_str()),
            ("queue", self.queue.as_str()),
            ("username", username),
        ];
        inputs.extend(self.inputs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        dps::encode_execute(&self.algo_id, &self.version, &inputs)
    }
}

/// Filters for [`Client::list_jobs`]. Unset filters are not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListJobs {
    pub algo_id: Option<String>,
    pub version: Option<String>,
    pub status: Option<String>,
    pub queue: Option<String>,
    pub tag: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub get_job_details: bool,
    pub offset: usize,
    pub page_size: usize,
}

impl Default for ListJobs {
    fn default() -> Self {
        Self {
            algo_id: None,
            version: None,
            status: None,
            queue: None,
            tag: None,
            start_time: None,
            end_time: None,
            get_job_details: true,
            offset: 0,
            page_size: 10,
        }
    }
}

impl ListJobs {
    pub(crate) fn to_params(&self) -> Result<Vec<(&'static str, String)>> {
        let algo = self.algo_id.as_deref().filter(|s| !s.is_empty());
        let version = self.version.as_deref().filter(|s| !s.is_empty());

        let mut params = Vec::new();
        match (algo, version) {
            (Some(a), Some(v)) => params.push(("job_type", format!("{}:{}", a, v))),
            (None, None) => {}
            _ => {
                return Err(Error::validation(
                    "either supply non-empty strings for both algo_id and version, or supply neither",
                ));
            }
        }
        if let Some(end) = &self.end_time {
            params.push(("end_time", end.clone()));
        }
        params.push(("get_job_details", self.get_job_details.to_string()));
        params.push(("offset", self.offset.to_string()));
        params.push(("page_size", self.page_size.to_string()));
        if let Some(queue) = &self.queue {
            params.push(("queue", queue.clone()));
        }
        if let Some(start) = &self.start_time {
            params.push(("start_time", start.clone()));
        }
        if let Some(status) = &self.status {
            // Rejects unknown statuses, then sends the canonical spelling.
            let status: JobStatus = status
                .parse()
                .map_err(|_| Error::validation(format!("invalid job status {:?}", status)))?;
            params.push(("status", status.to_string()));
        }
        if let Some(tag) = &self.tag {
            params.push(("tag", tag.clone()));
        }
        Ok(params)
    }
}

/// Client-side handle to one DPS job.
///
/// State changes only by re-querying DPS.
#[derive(Debug, Clone)]
pub struct Job {
    client: Client,
    id: String,
    status: JobStatus,
    outputs: Vec<String>,
    traceback: Vec<String>,
    metrics: JobMetrics,
    response_code: Option<u16>,
}

impl Job {
    pub(crate) fn new(client: Client, id: String) -> Self {
        Self {
            client,
            id,
            status: JobStatus::Accepted,
            outputs: Vec::new(),
            traceback: Vec::new(),
            metrics: JobMetrics::default(),
            response_code: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last status observed; `Accepted` until the first refresh.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn traceback(&self) -> &[String] {
        &self.traceback
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    /// HTTP status of the submission response, for jobs created by [`Client::submit_job`].
    pub fn response_code(&self) -> Option<u16> {
        self.response_code
    }

    fn url(&self, suffix: Option<&str>) -> String {
        let base = urljoin(&self.client.config().endpoints.dps_job, &self.segment());
        match suffix {
            Some(s) => urljoin(&base, s),
            None => base,
        }
    }

    /// The id as a single path segment, whatever characters it holds.
    fn segment(&self) -> String {
        urlencoding::encode(&self.id).into_owned()
    }

    /// One status request.
    pub fn refresh_status(&mut self) -> Result<JobStatus> {
        self.status = fetch_status(&self.client, &self.url(Some(JOB_STATUS)), None)?;
        Ok(self.status)
    }

    pub fn retrieve_result(&mut self) -> Result<&[String]> {
        let body = self.client.get_text(&self.url(None), XML)?;
        let (outputs, traceback) = dps::parse_result(&body)?;
        self.outputs = outputs;
        self.traceback = traceback;
        Ok(&self.outputs)
    }

    pub fn retrieve_metrics(&mut self) -> Result<&JobMetrics> {
        let body = self.client.get_text(&self.url(Some(JOB_METRICS)), XML)?;
        self.metrics = dps::parse_metrics(&body)?;
        Ok(&self.metrics)
    }

    /// Refreshes status, and for finished jobs also outputs and metrics.
    ///
    /// Failures fetching outputs or metrics are logged, not returned.
    pub fn retrieve_attributes(&mut self) -> Result<&Self> {
        self.refresh_status()?;
        if matches!(self.status, JobStatus::Succeeded | JobStatus::Failed) {
            self.retrieve_outputs_and_metrics();
        }
        Ok(self)
    }

    fn retrieve_outputs_and_metrics(&mut self) {
        if let Err(e) = self.retrieve_result() {
            warn!(job_id = %self.id, error = %e, "unable to retrieve job result");
        }
        if let Err(e) = self.retrieve_metrics() {
            warn!(job_id = %self.id, error = %e, "unable to retrieve job metrics");
        }
    }

    /// Asks DPS to dismiss the job. Returns the raw DPS response.
    pub fn cancel(&self) -> Result<String> {
        let url = urljoin(
            &urljoin(&self.client.config().endpoints.dps_job, JOB_CANCEL),
            &self.segment(),
        );
        info!(job_id = %self.id, "cancelling job");
        let req = self.client.request(Method::POST, &url, XML);
        self.client.send(req, &url)
    }

    /// Polls until the job reaches a terminal status or `options.timeout` elapses.
    ///
    /// `Failed` and `Dismissed` are returned as normal results. A missed
    /// deadline is [`Error::Timeout`]. On a terminal status, outputs and
    /// metrics are fetched as well.
    pub fn wait_for_completion(&mut self, options: &WaitOptions) -> Result<JobStatus> {
        let url = self.url(Some(JOB_STATUS));
        let client = &self.client;
        let outcome =
            poll_until_terminal(&self.id, options, |left| fetch_status(client, &url, left))?;

        self.status = outcome.status;
        debug!(job_id = %self.id, polls = outcome.polls, status = %self.status, "job finished");
        if self.status.is_terminal() {
            self.retrieve_outputs_and_metrics();
        }
        Ok(self.status)
    }
}

/// `left` caps the request timeout so a stalled server cannot hold the
/// caller past its deadline.
fn fetch_status(client: &Client, url: &str, left: Option<Duration>) -> Result<JobStatus> {
    let mut req = client.request(Method::GET, url, XML);
    if let Some(left) = left {
        req = req.timeout(client.timeout().min(left));
    }
    let body = client.send(req, url)?;
    dps::parse_status(&body)
}

impl Client {
    /// Submits a job to DPS and returns its handle.
    pub fn submit_job(&self, request: &JobRequest) -> Result<Job> {
        request.validate()?;

        let username = match self.profile().account_info() {
            Ok(Some(info)) => info.username,
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "unable to read account info; submitting as anonymous");
                None
            }
        };
        let body = request.encode(username.as_deref().unwrap_or("anonymous"))?;

        let url = &self.config().endpoints.dps_job;
        debug!(url = %url, algo_id = %request.algo_id, version = %request.version, "submitting job");
        let resp = self
            .request(Method::POST, url, XML)
            .header(CONTENT_TYPE, XML)
            .body(body)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::api(status, url, body));
        }
        let text = resp.text()?;

        let job_id = dps::parse_submit_response(&text)?;
        info!(job_id = %job_id, "job submitted");

        let mut job = Job::new(self.clone(), job_id);
        job.response_code = Some(status.as_u16());
        if request.retrieve_attributes {
            if let Err(e) = job.retrieve_attributes() {
                warn!(job_id = %job.id, error = %e, "unable to retrieve attributes for job");
            }
        }
        Ok(job)
    }

    /// Handle for an existing job with its current attributes.
    pub fn job(&self, job_id: &str) -> Result<Job> {
        require_non_empty("job id", job_id)?;
        let mut job = Job::new(self.clone(), job_id.to_string());
        job.retrieve_attributes()?;
        Ok(job)
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        require_non_empty("job id", job_id)?;
        Job::new(self.clone(), job_id.to_string()).refresh_status()
    }

    pub fn get_job_result(&self, job_id: &str) -> Result<Vec<String>> {
        require_non_empty("job id", job_id)?;
        let mut job = Job::new(self.clone(), job_id.to_string());
        job.retrieve_result()?;
        Ok(job.outputs)
    }

    pub fn get_job_metrics(&self, job_id: &str) -> Result<JobMetrics> {
        require_non_empty("job id", job_id)?;
        let mut job = Job::new(self.clone(), job_id.to_string());
        job.retrieve_metrics()?;
        Ok(job.metrics)
    }

    pub fn cancel_job(&self, job_id: &str) -> Result<String> {
        require_non_empty("job id", job_id)?;
        Job::new(self.clone(), job_id.to_string()).cancel()
    }

    /// Lists jobs matching `filter`.
    pub fn list_jobs(&self, filter: &ListJobs) -> Result<Value> {
        let params = filter.to_params()?;
        let url = urljoin(&self.config().endpoints.dps_job, JOB_LIST);
        self.get_json(&url, &params)
    }
}
