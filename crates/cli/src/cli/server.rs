use adb_client::Database;

pub async fn ping(db: &Database) -> anyhow::Result<()> {
    let status = db.ping().await?;
    println!("OK ({status}) {}", db.name());
    Ok(())
}

pub async fn version(db: &Database, details: bool) -> anyhow::Result<()> {
    if details {
        let doc = db.version_details().await?;
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("{}", db.version().await?);
    }
    Ok(())
}
