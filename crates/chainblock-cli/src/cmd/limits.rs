use crate::output::{print_json, print_table};
use crate::settings::{connect, load_config};
use chrono::{DateTime, Local};
use graph_client::Limit;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct LimitRow {
    resource: String,
    endpoint: String,
    #[serde(flatten)]
    limit: Limit,
}

pub fn run(config_path: &Path, filter: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rt = super::runtime()?;
    let status = rt.block_on(async {
        let (primary, _) = connect(&config).await?;
        Ok::<_, anyhow::Error>(primary.api.rate_limit_status().await?)
    })?;

    let mut rows: Vec<LimitRow> = status
        .into_iter()
        .flat_map(|(resource, endpoints)| {
            endpoints.into_iter().map(move |(endpoint, limit)| LimitRow {
                resource: resource.clone(),
                endpoint,
                limit,
            })
        })
        .filter(|row| filter.map_or(true, |f| row.endpoint.contains(f)))
        .collect();
    rows.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No matching endpoints.");
        return Ok(());
    }
    let table = rows
        .iter()
        .map(|r| {
            vec![
                r.endpoint.clone(),
                format!("{}/{}", r.limit.remaining, r.limit.limit),
                format_reset(r.limit.reset),
            ]
        })
        .collect();
    print_table(&["ENDPOINT", "REMAINING", "RESETS"], table);
    Ok(())
}

fn format_reset(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into())
}
