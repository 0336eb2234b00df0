//! Client-side handle for a server-side async job.
//!
//! Server contract (`/_api/job/{id}`):
//!
//! | call                  | answer                                               |
//! |-----------------------|------------------------------------------------------|
//! | `GET`                 | 200 done, 204 pending, 404 unknown                   |
//! | `PUT`                 | stored response (with `x-arango-async-id`), 204 pending, 404 unknown |
//! | `PUT .../cancel`      | 200 cancelled, 404 unknown or no longer pending      |
//! | `DELETE`              | 200 removed, 404 unknown                             |
//!
//! A successful `PUT` makes the server drop the stored result, so the
//! handle remembers that it was consumed and answers later calls with
//! [`StateError::JobCleared`] instead of asking the server again.

use adb_domain::config::JobConfig;
use adb_domain::error::{Error, Result, StateError};
use adb_domain::http::{Request, Response};
use adb_domain::trace::TraceEvent;

use crate::connection::Connection;
use crate::executor::ResponseHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One async job. Owned by a single caller; methods take `&mut self`.
pub struct AsyncJob<T> {
    conn: Connection,
    id: String,
    handler: ResponseHandler<T>,
    polling: JobConfig,
    status: Option<JobStatus>,
    consumed: bool,
    cleared: bool,
}

impl<T> AsyncJob<T> {
    /// Wrap an existing job id. `handler` turns the stored response into `T`.
    pub fn new(conn: Connection, id: impl Into<String>, handler: ResponseHandler<T>, polling: JobConfig) -> Self {
        Self {
            conn,
            id: id.into(),
            handler,
            polling,
            status: None,
            consumed: false,
            cleared: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Status seen by the last server round-trip, if any.
    pub fn last_status(&self) -> Option<JobStatus> {
        self.status
    }

    fn endpoint(&self) -> String {
        format!("/_api/job/{}", self.id)
    }

    fn gone(&self) -> Option<Error> {
        (self.consumed || self.cleared).then(|| StateError::JobCleared(self.id.clone()).into())
    }

    pub async fn status(&mut self) -> Result<JobStatus> {
        if let Some(e) = self.gone() {
            return Err(e);
        }
        let request = Request::get(self.endpoint());
        let response = self.conn.send_request(request.clone()).await?;
        let status = match response.status_code {
            200 => JobStatus::Done,
            204 => JobStatus::Pending,
            404 => return Err(StateError::JobNotFound(self.id.clone()).into()),
            _ => return Err(Error::server(&request, response, "failed to fetch job status")),
        };
        self.observe(status, response.status_code);
        Ok(status)
    }

    /// Poll until the job is done. Suspends between polls, backing off
    /// from `poll_interval_ms` up to `max_poll_interval_ms`.
    pub async fn wait(&mut self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.status().await? {
                JobStatus::Done => return Ok(()),
                JobStatus::Pending => {
                    let delay = self.polling.delay_for_attempt(attempt);
                    tracing::debug!(job_id = %self.id, delay_ms = delay.as_millis() as u64, "job pending");
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Wait for completion, then fetch the result once.
    ///
    /// If the job's own request failed, the handler reports that failure
    /// here with its original classification.
    pub async fn result(&mut self) -> Result<T> {
        if let Some(e) = self.gone() {
            return Err(e);
        }
        self.wait().await?;
        self.try_result().await
    }

    /// Fetch the result without waiting; [`StateError::JobPending`] if the
    /// job has not finished.
    pub async fn try_result(&mut self) -> Result<T> {
        if let Some(e) = self.gone() {
            return Err(e);
        }
        let request = Request::put(self.endpoint());
        let response = self.conn.send_request(request.clone()).await?;

        if is_stored_result(&response) {
            self.observe(JobStatus::Done, response.status_code);
            self.consumed = true;
            return (self.handler)(response);
        }
        match response.status_code {
            204 => {
                self.status = Some(JobStatus::Pending);
                Err(StateError::JobPending(self.id.clone()).into())
            }
            404 => Err(StateError::JobNotFound(self.id.clone()).into()),
            _ => Err(Error::server(&request, response, "failed to fetch job result")),
        }
    }

    /// Cancel a pending job. Returns `false` when the server does not know
    /// the job and `ignore_missing` is set.
    pub async fn cancel(&mut self, ignore_missing: bool) -> Result<bool> {
        if self.consumed || self.cleared || self.status == Some(JobStatus::Done) {
            return Err(StateError::NothingToCancel(self.id.clone()).into());
        }
        match self.status().await {
            Ok(JobStatus::Pending) => {}
            Ok(JobStatus::Done) => return Err(StateError::NothingToCancel(self.id.clone()).into()),
            Err(Error::State(StateError::JobNotFound(_))) if ignore_missing => return Ok(false),
            Err(e) => return Err(e),
        }

        let request = Request::put(format!("{}/cancel", self.endpoint()));
        let response = self.conn.send_request(request.clone()).await?;
        match response.status_code {
            200..=299 => {
                tracing::debug!(job_id = %self.id, "job cancelled");
                Ok(true)
            }
            // Finished (or vanished) between the status check and the cancel.
            404 if ignore_missing => Ok(false),
            404 => Err(StateError::NothingToCancel(self.id.clone()).into()),
            _ => Err(Error::server(&request, response, "failed to cancel job")),
        }
    }

    /// Delete the job's stored result on the server.
    pub async fn clear(&mut self, ignore_missing: bool) -> Result<bool> {
        if let Some(e) = self.gone() {
            return Err(e);
        }
        let request = Request::delete(self.endpoint());
        let response = self.conn.send_request(request.clone()).await?;
        match response.status_code {
            200..=299 => {
                self.cleared = true;
                Ok(true)
            }
            404 if ignore_missing => Ok(false),
            404 => Err(StateError::JobNotFound(self.id.clone()).into()),
            _ => Err(Error::server(&request, response, "failed to clear job")),
        }
    }

    fn observe(&mut self, status: JobStatus, http_status: u16) {
        if status == JobStatus::Done && self.status != Some(JobStatus::Done) {
            TraceEvent::JobFinished {
                job_id: self.id.clone(),
                status: http_status,
            }
            .emit();
        }
        self.status = Some(status);
    }
}

/// Stored job responses echo the job id; a bare 204/404 does not.
fn is_stored_result(response: &Response) -> bool {
    response.header("x-arango-async-id").is_some()
        || (response.is_success() && response.status_code != 204)
}

impl<T> std::fmt::Debug for AsyncJob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncJob")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("consumed", &self.consumed)
            .field("cleared", &self.cleared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adb_domain::http::Method;

    #[test]
    fn stored_result_detection() {
        let mut stored_failure = Response::new(Method::Put, "u", 404);
        stored_failure.headers.insert("x-arango-async-id", "7");
        assert!(is_stored_result(&stored_failure));

        assert!(!is_stored_result(&Response::new(Method::Put, "u", 404)));
        assert!(!is_stored_result(&Response::new(Method::Put, "u", 204)));
        assert!(is_stored_result(&Response::new(Method::Put, "u", 200)));
    }

    #[test]
    fn status_renders_lowercase() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Done.as_str(), "done");
    }
}
