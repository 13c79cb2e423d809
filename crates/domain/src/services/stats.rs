//! Alert counters for a group dashboard.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::models::{Alert, AlertStats};

/// Counts alerts relative to `now`.
///
/// `total` counts every alert. The remaining counters skip alerts whose
/// timestamp could not be read. "Today" and "this month" start at UTC
/// midnight and the first of the month; "this week" is the last 7 days.
pub fn alert_stats(alerts: &[Alert], now: DateTime<Utc>) -> AlertStats {
    let today = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    let week = now - Duration::days(7);
    let month = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);

    let mut stats = AlertStats {
        total: alerts.len(),
        ..AlertStats::default()
    };

    for alert in alerts {
        let Some(at) = alert.timestamp else {
            continue;
        };
        if alert.resolved {
            stats.resolved += 1;
        } else {
            stats.active += 1;
        }
        if at >= today {
            stats.today += 1;
        }
        if at >= week {
            stats.this_week += 1;
        }
        if at >= month {
            stats.this_month += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSource};

    fn alert(id: &str, at: Option<DateTime<Utc>>, resolved: bool) -> Alert {
        Alert {
            id: id.to_string(),
            user_id: "u1".to_string(),
            user_email: "ana@x.com".to_string(),
            user_name: "Ana".to_string(),
            message: String::new(),
            location: String::new(),
            coordinates: None,
            timestamp: at,
            kind: AlertKind::Panic,
            resolved,
            group_ids: vec![],
            group_id: None,
            phone: None,
            recipients: vec![],
            device_id: None,
            metadata: None,
            source: AlertSource::Circle,
        }
    }

    #[test]
    fn test_alert_stats() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap();
        let alerts = vec![
            alert("a", Some(now - Duration::hours(1)), false),
            alert("b", Some(now - Duration::days(3)), true),
            alert("c", Some(now - Duration::days(10)), false),
            alert("d", Some(now - Duration::days(40)), true),
            alert("e", None, false),
        ];

        let stats = alert_stats(&alerts, now);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.this_week, 2);
        assert_eq!(stats.this_month, 3);
    }

    #[test]
    fn test_alert_stats_empty() {
        assert_eq!(alert_stats(&[], Utc::now()), AlertStats::default());
    }
}
