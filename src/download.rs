use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::Response;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONNECTION};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::client::{Client, JSON};
use crate::error::{Error, Result};
use crate::util::{double_encode, guess_filename_from_url, urljoin};

const DPS_JOB_FILE: &str = "_job.json";
const DPS_TOKEN_FILE: &str = "_maap_dps_token.txt";

/// Identity of the DPS job this process runs inside, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DpsContext {
    pub(crate) machine_token: String,
    pub(crate) job_id: String,
}

impl DpsContext {
    /// Reads `_job.json` and `_maap_dps_token.txt` from `dir`.
    pub(crate) fn detect(dir: &Path) -> Option<Self> {
        let job = std::fs::read_to_string(dir.join(DPS_JOB_FILE)).ok()?;
        let token = std::fs::read_to_string(dir.join(DPS_TOKEN_FILE)).ok()?;
        let job: serde_json::Value = serde_json::from_str(&job).ok()?;
        let job_id = job
            .pointer("/job_info/job_payload/payload_task_id")?
            .as_str()?
            .to_string();
        Some(Self {
            machine_token: token.replace('\n', "").trim().to_string(),
            job_id,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct DpsTokens {
    user_token: String,
    app_token: String,
}

impl Client {
    /// Downloads an HTTP(S) URL into `destination_dir`, naming the file after
    /// the last path segment.
    ///
    /// Protected resources are retried through the platform proxy.
    pub fn download_granule(
        &self,
        online_access_url: &str,
        destination_dir: &Path,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let name = guess_filename_from_url(online_access_url).ok_or_else(|| {
            Error::validation(format!("cannot derive a file name from {}", online_access_url))
        })?;
        self.download_http(online_access_url, &destination_dir.join(name), overwrite)
    }

    pub(crate) fn download_http(&self, url: &str, target: &Path, overwrite: bool) -> Result<PathBuf> {
        if !overwrite && target.exists() {
            debug!(path = %target.display(), "keeping existing file");
            return Ok(target.to_path_buf());
        }

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut resp = self.http().get(url).send()?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            resp = self.authorized_retry(url)?;
        }
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::api(status, url, body));
        }

        self.write_body(resp, target)?;
        info!(url, path = %target.display(), "downloaded");
        Ok(target.to_path_buf())
    }

    fn authorized_retry(&self, url: &str) -> Result<Response> {
        let cwd = std::env::current_dir()?;
        if let Some(ctx) = DpsContext::detect(&cwd) {
            debug!(job_id = %ctx.job_id, "exchanging DPS machine token");
            let token_url = &self.config().endpoints.member_dps_token;
            let resp = self
                .http()
                .get(token_url)
                .header("dps-machine-token", &ctx.machine_token)
                .header("dps-job-id", &ctx.job_id)
                .header(ACCEPT, JSON)
                .send()?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().unwrap_or_default();
                return Err(Error::api(status, token_url, body));
            }
            let tokens: DpsTokens = serde_json::from_str(&resp.text()?)?;
            return Ok(self
                .http()
                .get(url)
                .header(
                    AUTHORIZATION,
                    format!("Bearer {},Basic {}", tokens.user_token, tokens.app_token),
                )
                .header(CONNECTION, "close")
                .send()?);
        }

        let proxy = urljoin(
            &self.config().endpoints.search_granule_url,
            &format!("{}/data", double_encode(url)),
        );
        warn!(url, "unauthorized; retrying through the MAAP proxy");
        let req = self.request(reqwest::Method::GET, &proxy, &self.config().content_type);
        Ok(req.timeout(std::time::Duration::from_secs(60 * 60 * 6)).send()?)
    }

    fn write_body(&self, mut resp: Response, target: &Path) -> Result<()> {
        let pb = if self.progress() {
            let pb = match resp.content_length() {
                Some(len) => ProgressBar::new(len),
                None => ProgressBar::new_spinner(),
            };
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(pb)
        } else {
            None
        };

        // Stream into a sibling file so an interrupted transfer never looks complete.
        let mut partial = target.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let written = copy_body(&mut resp, &partial, pb.as_ref())
            .and_then(|()| std::fs::rename(&partial, target).map_err(Error::from));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            if let Some(pb) = &pb {
                pb.abandon();
            }
            warn!(path = %target.display(), error = %e, "download failed; partial file removed");
            return Err(e);
        }
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        Ok(())
    }
}

fn copy_body(resp: &mut Response, partial: &Path, pb: Option<&ProgressBar>) -> Result<()> {
    let mut out = File::create(partial)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match resp.read(&mut buf)? {
            0 => break,
            n => n,
        };
        out.write_all(&buf[..n])?;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dps_context() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(DpsContext::detect(dir.path()), None);

        std::fs::write(
            dir.path().join(DPS_JOB_FILE),
            r#"{"job_info": {"job_payload": {"payload_task_id": "task-42"}}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(DPS_TOKEN_FILE), "machine\ntoken\n").unwrap();

        let ctx = DpsContext::detect(dir.path()).unwrap();
        assert_eq!(ctx.job_id, "task-42");
        assert_eq!(ctx.machine_token, "machinetoken");
    }
}
