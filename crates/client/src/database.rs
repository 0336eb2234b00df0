//! Database handles.
//!
//! [`Database`] runs requests directly; [`AsyncDatabase`] submits the same
//! requests as server-side async jobs. Both share the request builders and
//! response handlers below so a job's result is interpreted exactly like a
//! direct call would be.

use adb_domain::config::JobConfig;
use adb_domain::error::{Error, Result};
use adb_domain::http::{Request, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::aql::QueryRequest;
use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::executor::{ensure_success, ApiExecutor, AsyncApiExecutor};
use crate::job::{AsyncJob, JobStatus};

#[derive(Debug, Clone)]
pub struct Database {
    executor: ApiExecutor,
    polling: JobConfig,
}

impl Database {
    pub fn new(conn: Connection, polling: JobConfig) -> Self {
        Self {
            executor: ApiExecutor::new(conn),
            polling,
        }
    }

    pub fn name(&self) -> &str {
        self.executor.db_name()
    }

    pub fn connection(&self) -> &Connection {
        self.executor.connection()
    }

    pub async fn ping(&self) -> Result<u16> {
        self.connection().ping().await
    }

    /// Server version string.
    pub async fn version(&self) -> Result<String> {
        let request = version_request(false);
        let handler = version_handler(self.connection().clone(), request.clone());
        self.executor.execute(request, handler).await
    }

    /// Full `/_api/version?details=1` document.
    pub async fn version_details(&self) -> Result<Value> {
        let request = version_request(true);
        let conn = self.connection().clone();
        self.executor
            .execute(request.clone(), move |resp| {
                let resp = ensure_success(&request, resp, "failed to retrieve server version")?;
                conn.deserialize(&resp.raw_body)
            })
            .await
    }

    /// Run a query and return a cursor over its results.
    pub async fn query<T>(&self, query: &QueryRequest) -> Result<Cursor<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = query.to_request(self.connection())?;
        let handler = cursor_handler::<T>(self.executor.clone(), request.clone(), query.retry_enabled());
        self.executor.execute(request, handler).await
    }

    /// Ids of async jobs in the given state.
    pub async fn async_jobs(&self, status: JobStatus, count: Option<u32>) -> Result<Vec<String>> {
        let mut request = Request::get(format!("/_api/job/{}", status.as_str()));
        if let Some(count) = count {
            request = request.param("count", count);
        }
        let conn = self.connection().clone();
        self.executor
            .execute(request.clone(), move |resp| {
                let resp = ensure_success(&request, resp, "failed to list async jobs")?;
                conn.deserialize(&resp.raw_body)
            })
            .await
    }

    /// Drop stored async job results: all of them, or only those older
    /// than `threshold` (a unix timestamp in seconds).
    pub async fn clear_async_jobs(&self, threshold: Option<f64>) -> Result<()> {
        let request = match threshold {
            None => Request::delete("/_api/job/all"),
            Some(stamp) => Request::delete("/_api/job/expired").param("stamp", stamp),
        };
        self.executor
            .execute(request.clone(), |resp| {
                ensure_success(&request, resp, "failed to clear async jobs").map(|_| ())
            })
            .await
    }

    /// Attach to an existing job by id. The result is the raw JSON body.
    pub fn job(&self, id: impl Into<String>) -> AsyncJob<Value> {
        let id = id.into();
        let request = Request::put(format!("/_api/job/{id}"));
        let conn = self.connection().clone();
        let handler = move |resp: Response| -> Result<Value> {
            let resp = ensure_success(&request, resp, "async job failed")?;
            conn.codec().decode(&resp.raw_body)
        };
        AsyncJob::new(
            self.connection().clone(),
            id,
            std::sync::Arc::new(handler),
            self.polling.clone(),
        )
    }

    /// Same database, but every call is submitted as an async job.
    /// Without `return_result` the server discards results and calls
    /// return `None`.
    pub fn begin_async_execution(&self, return_result: bool) -> AsyncDatabase {
        AsyncDatabase {
            executor: AsyncApiExecutor::new(
                self.connection().clone(),
                return_result,
                self.polling.clone(),
            ),
            direct: self.executor.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncDatabase {
    executor: AsyncApiExecutor,
    /// Cursors produced by async queries page through this one.
    direct: ApiExecutor,
}

impl AsyncDatabase {
    pub fn name(&self) -> &str {
        self.direct.db_name()
    }

    pub fn return_result(&self) -> bool {
        self.executor.return_result()
    }

    pub async fn version(&self) -> Result<Option<AsyncJob<String>>> {
        let request = version_request(false);
        let handler = version_handler(self.direct.connection().clone(), request.clone());
        self.executor.execute(request, handler).await
    }

    pub async fn query<T>(&self, query: &QueryRequest) -> Result<Option<AsyncJob<Cursor<T>>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = query.to_request(self.direct.connection())?;
        let handler = cursor_handler::<T>(self.direct.clone(), request.clone(), query.retry_enabled());
        self.executor.execute(request, handler).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared request builders / response handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn version_request(details: bool) -> Request {
    Request::get("/_api/version").param_bool("details", details)
}

fn version_handler(
    conn: Connection,
    request: Request,
) -> impl Fn(Response) -> Result<String> + Send + Sync + 'static {
    move |resp| {
        let resp = ensure_success(&request, resp, "failed to retrieve server version")?;
        let body: Value = conn.deserialize(&resp.raw_body)?;
        body.get("version")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::Deserialization("version response has no 'version'".into()))
    }
}

fn cursor_handler<T>(
    executor: ApiExecutor,
    request: Request,
    allow_retry: bool,
) -> impl Fn(Response) -> Result<Cursor<T>> + Send + Sync + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    move |resp| {
        let resp = ensure_success(&request, resp, "query failed")?;
        let body = executor.connection().codec().decode(&resp.raw_body)?;
        Cursor::from_body(executor.clone(), body, allow_retry)
    }
}
