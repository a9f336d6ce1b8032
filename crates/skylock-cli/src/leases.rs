use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use skylock_core::Lease;

/// One row of `skylock leases`.
#[derive(Debug, Serialize)]
pub struct LeaseView<'a> {
    pub name: &'a str,
    pub locked_by: &'a str,
    pub locked_at: DateTime<Utc>,
    pub lock_until: DateTime<Utc>,
    pub held: bool,
}

fn views(rows: &[Lease], now: DateTime<Utc>) -> Vec<LeaseView<'_>> {
    rows.iter()
        .map(|lease| LeaseView {
            name: &lease.name,
            locked_by: &lease.locked_by,
            locked_at: lease.locked_at,
            lock_until: lease.lock_until,
            held: lease.is_held_at(now),
        })
        .collect()
}

pub fn render_json(rows: &[Lease], now: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&views(rows, now))
}

pub fn render_table(rows: &[Lease], now: DateTime<Utc>) -> String {
    if rows.is_empty() {
        return "no leases".to_string();
    }
    let width = rows.iter().map(|l| l.name.len()).max().unwrap_or(0).max(4);
    let mut out = format!("{:<width$}  {:<6}  {:<24}  {:<24}  LOCKED_BY", "NAME", "STATE", "LOCKED_AT", "LOCK_UNTIL");
    for view in views(rows, now) {
        out.push('\n');
        out.push_str(&format!(
            "{:<width$}  {:<6}  {:<24}  {:<24}  {}",
            view.name,
            if view.held { "held" } else { "free" },
            view.locked_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            view.lock_until.to_rfc3339_opts(SecondsFormat::Millis, true),
            view.locked_by,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn lease(name: &str, until_secs: i64) -> Lease {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Lease {
            name: name.to_string(),
            locked_by: "node-a".to_string(),
            locked_at: at,
            lock_until: at + Duration::seconds(until_secs),
        }
    }

    #[test]
    fn table_marks_held_and_free() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let out = render_table(&[lease("nightly", 30), lease("hourly", 5)], now);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("nightly") && lines[1].contains("held"));
        assert!(lines[2].starts_with("hourly") && lines[2].contains("free"));
    }

    #[test]
    fn json_carries_held_flag() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let json = render_json(&[lease("nightly", 30)], now).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "nightly");
        assert_eq!(value[0]["held"], true);
        assert_eq!(value[0]["locked_by"], "node-a");
    }

    #[test]
    fn empty_table() {
        assert_eq!(render_table(&[], Utc::now()), "no leases");
    }
}
