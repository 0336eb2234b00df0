//! API executors: how a surface's request is run.
//!
//! Every surface builds a [`Request`] plus a response handler. The direct
//! [`ApiExecutor`] runs both immediately; the [`AsyncApiExecutor`] submits
//! the request as a server-side job and hands the handler to the resulting
//! [`AsyncJob`] so it runs when the result is fetched.

use std::sync::Arc;

use adb_domain::config::JobConfig;
use adb_domain::error::{Error, Result};
use adb_domain::http::{Request, Response};
use adb_domain::trace::TraceEvent;

use crate::connection::Connection;
use crate::job::AsyncJob;

/// Turns a raw response into the caller's value. Shared with async jobs,
/// which may invoke it later.
pub type ResponseHandler<T> = Arc<dyn Fn(Response) -> Result<T> + Send + Sync>;

/// Pass 2xx responses through, wrap everything else as a server error.
pub fn ensure_success(request: &Request, response: Response, what: &str) -> Result<Response> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Error::server(request, response, what))
    }
}

#[derive(Debug, Clone)]
pub struct ApiExecutor {
    conn: Connection,
}

impl ApiExecutor {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn db_name(&self) -> &str {
        self.conn.db_name()
    }

    pub async fn execute<T, H>(&self, request: Request, handler: H) -> Result<T>
    where
        H: FnOnce(Response) -> Result<T>,
    {
        let response = self.conn.send_request(request).await?;
        handler(response)
    }
}

/// Submits requests with `x-arango-async`.
///
/// With `return_result` the server keeps the result (`store`) and the call
/// yields an [`AsyncJob`]; without it the request is fire-and-forget and
/// the call yields `None`.
#[derive(Debug, Clone)]
pub struct AsyncApiExecutor {
    conn: Connection,
    return_result: bool,
    polling: JobConfig,
}

impl AsyncApiExecutor {
    pub fn new(conn: Connection, return_result: bool, polling: JobConfig) -> Self {
        Self {
            conn,
            return_result,
            polling,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn return_result(&self) -> bool {
        self.return_result
    }

    pub async fn execute<T, H>(&self, request: Request, handler: H) -> Result<Option<AsyncJob<T>>>
    where
        H: Fn(Response) -> Result<T> + Send + Sync + 'static,
    {
        let mode = if self.return_result { "store" } else { "true" };
        let request = request.header("x-arango-async", mode);
        let response = self.conn.send_request(request.clone()).await?;

        if response.status_code != 202 {
            return Err(Error::server(&request, response, "async job submission failed"));
        }
        if !self.return_result {
            return Ok(None);
        }

        let job_id = response
            .header("x-arango-async-id")
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::Deserialization("202 response carried no x-arango-async-id header".into())
            })?;
        TraceEvent::JobSubmitted {
            job_id: job_id.clone(),
        }
        .emit();

        Ok(Some(AsyncJob::new(
            self.conn.clone(),
            job_id,
            Arc::new(handler),
            self.polling.clone(),
        )))
    }
}
