use std::io::Write;

use adb_client::{Database, QueryRequest};
use futures_util::{pin_mut, StreamExt};
use serde_json::Value;

use super::QueryArgs;

pub fn build_request(args: &QueryArgs) -> QueryRequest {
    let mut request = QueryRequest::new(&args.query);
    for (name, value) in &args.bind {
        request = request.bind_var(name.clone(), value.clone());
    }
    if let Some(size) = args.batch_size {
        request = request.batch_size(size);
    }
    if args.count {
        request = request.count(true);
    }
    if args.allow_retry {
        request = request.allow_retry(true);
    }
    if args.stream {
        request = request.stream(true);
    }
    request
}

/// Run the query and print each result as one JSON line.
pub async fn run(db: &Database, args: &QueryArgs) -> anyhow::Result<()> {
    let cursor = db.query::<Value>(&build_request(args)).await?;
    if let Some(count) = cursor.count() {
        tracing::info!(count, "query matched");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let stream = cursor.into_stream();
    pin_mut!(stream);
    let mut printed = 0usize;
    while let Some(item) = stream.next().await {
        writeln!(out, "{}", serde_json::to_string(&item?)?)?;
        printed += 1;
    }
    tracing::debug!(printed, "query done");
    Ok(())
}

/// Submit the query as an async job; prints the job id when one is kept.
pub async fn submit(db: &Database, args: &QueryArgs, keep_result: bool) -> anyhow::Result<()> {
    let adb = db.begin_async_execution(keep_result);
    match adb.query::<Value>(&build_request(args)).await? {
        Some(job) => println!("{}", job.id()),
        None => eprintln!("submitted (result discarded)"),
    }
    Ok(())
}
