use adb_client::{Database, JobStatus};

use super::JobsCommand;

pub async fn run(db: &Database, command: JobsCommand) -> anyhow::Result<()> {
    match command {
        JobsCommand::List { done, count } => {
            let status = if done { JobStatus::Done } else { JobStatus::Pending };
            for id in db.async_jobs(status, count).await? {
                println!("{id}");
            }
        }
        JobsCommand::Status { id } => {
            let status = db.job(id).status().await?;
            println!("{status}");
        }
        JobsCommand::Result { id, wait } => {
            let mut job = db.job(id);
            let value = if wait {
                job.result().await?
            } else {
                job.try_result().await?
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        JobsCommand::Cancel { id } => {
            let mut job = db.job(id.as_str());
            if job.cancel(false).await? {
                println!("cancelled {id}");
            }
        }
        JobsCommand::Clear { id: Some(id), .. } => {
            db.job(id.as_str()).clear(false).await?;
            println!("cleared {id}");
        }
        JobsCommand::Clear { id: None, all, expired } => match (all, expired) {
            (_, Some(stamp)) => {
                db.clear_async_jobs(Some(stamp)).await?;
                println!("cleared jobs older than {stamp}");
            }
            (true, None) => {
                db.clear_async_jobs(None).await?;
                println!("cleared all jobs");
            }
            (false, None) => anyhow::bail!("pass a job id, --all or --expired <timestamp>"),
        },
    }
    Ok(())
}
