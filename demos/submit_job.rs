use anyhow::Result;
use maap::{Client, JobRequest, WaitOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::from_env()?;

    let request = JobRequest::new("demo-run", "hello_world", "main", "maap-dps-worker-8gb")
        .input("input_file", "s3://maap-ops-workspace/shared/demo/input.tif");
    let mut job = client.submit_job(&request)?;
    println!("submitted {}", job.id());

    let options = WaitOptions::default()
        .with_interval(Duration::from_secs(10))
        .with_timeout(Duration::from_secs(60 * 60));
    let status = job.wait_for_completion(&options)?;

    println!("{} finished: {}", job.id(), status);
    for output in job.outputs() {
        println!("  output {}", output);
    }
    for line in job.traceback() {
        eprintln!("  {}", line);
    }
    if let Some(seconds) = job.metrics().job_duration_seconds() {
        println!("  ran for {:.0}s", seconds);
    }
    Ok(())
}
