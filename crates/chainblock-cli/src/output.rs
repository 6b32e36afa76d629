use chainblock_core::SessionReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// Two-column summary of one session.
pub fn print_report(report: &SessionReport) {
    let c = &report.counters;
    let mut rows = vec![
        vec!["session".into(), report.id.to_string()],
        vec!["purpose".into(), report.purpose.to_string()],
        vec!["target".into(), report.target.clone()],
        vec!["state".into(), report.state.to_string()],
        vec!["cursor".into(), report.cursor.clone()],
        vec!["processed".into(), c.processed().to_string()],
        vec!["succeeded".into(), c.succeeded.to_string()],
        vec!["  blocked".into(), c.blocked.to_string()],
        vec!["  muted".into(), c.muted.to_string()],
        vec!["  unblocked".into(), c.unblocked.to_string()],
        vec!["already".into(), c.already.to_string()],
        vec!["skipped".into(), c.skipped.to_string()],
        vec!["failed".into(), c.failed.to_string()],
    ];
    if c.exported > 0 {
        rows.push(vec!["exported".into(), c.exported.to_string()]);
    }
    if let Some(retriever) = &report.retriever {
        rows.insert(3, vec!["retriever".into(), retriever.clone()]);
    }
    if let Some(err) = &report.last_error {
        rows.push(vec!["last error".into(), err.clone()]);
    }
    print_table(&["FIELD", "VALUE"], rows);
}
