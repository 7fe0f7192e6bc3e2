use super::user::{date_range, list_lines};
use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

/// Datacube report behind each action: endpoint, title and the widest date span WeChat allows.
struct Report {
    path: &'static str,
    title: &'static str,
    max_days: i64,
}

fn report(action: &str) -> Option<Report> {
    let (path, title, max_days) = match action {
        "get_article_summary" => ("/datacube/getarticlesummary", "Article daily summary", 1),
        "get_article_total" => ("/datacube/getarticletotal", "Article totals", 1),
        "get_user_read" => ("/datacube/getuserread", "Article reads", 3),
        "get_user_share" => ("/datacube/getusershare", "Article shares", 7),
        "get_upstream_message" => ("/datacube/getupstreammsg", "Upstream messages", 7),
        "get_interface_summary" => ("/datacube/getinterfacesummary", "API calls", 30),
        "get_interface_summary_hour" => ("/datacube/getinterfacesummaryhour", "API calls by hour", 1),
        _ => return None,
    };
    Some(Report {
        path,
        title,
        max_days,
    })
}

/// Datacube analytics.
pub struct StatisticsTool;

#[async_trait]
impl Tool for StatisticsTool {
    fn name(&self) -> &str {
        "wechat_statistics"
    }

    fn description(&self) -> &str {
        "Analytics: article reads and shares, upstream messages and API call statistics for a date range"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "get_article_summary",
                        "get_article_total",
                        "get_user_read",
                        "get_user_share",
                        "get_upstream_message",
                        "get_interface_summary",
                        "get_interface_summary_hour"
                    ]
                },
                "beginDate": {"type": "string", "format": "date"},
                "endDate": {"type": "string", "format": "date"}
            },
            "required": ["action", "beginDate", "endDate"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        let Some(report) = report(&action) else {
            bail!("Unknown action: {}", action);
        };
        let (begin, end) = date_range(args, &action)?;
        check_span(&begin, &end, report.max_days)?;

        let response = ctx
            .client
            .post(report.path, &json!({"begin_date": begin, "end_date": end}))
            .await?;
        let lines = list_lines(&response, format_row);
        Ok(ToolResult::success(format!(
            "{} ({} to {}):\n{}",
            report.title, begin, end, lines
        )))
    }
}

fn check_span(begin: &str, end: &str, max_days: i64) -> Result<()> {
    let parse = |raw: &str| NaiveDate::parse_from_str(raw, "%Y-%m-%d");
    let (Ok(begin_date), Ok(end_date)) = (parse(begin), parse(end)) else {
        bail!("beginDate and endDate must be dates in YYYY-MM-DD format");
    };
    let days = (end_date - begin_date).num_days() + 1;
    if days > max_days {
        bail!(
            "This report covers at most {} day(s), the range {} to {} spans {}",
            max_days,
            begin,
            end,
            days
        );
    }
    Ok(())
}

/// Renders one datacube row: `ref_date` (and `ref_hour`) followed by every numeric field.
fn format_row(item: &Value) -> String {
    let Some(fields) = item.as_object() else {
        return item.to_string();
    };
    let mut label = args::str_field(item, "ref_date").to_string();
    if let Some(hour) = item.get("ref_hour").and_then(Value::as_i64) {
        label.push_str(&format!(" {:02}:00", hour / 100));
    }
    let title = args::str_field(item, "title");
    if !title.is_empty() {
        label.push_str(&format!(" \"{}\"", title));
    }

    let metrics: Vec<String> = fields
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "ref_date" | "ref_hour" | "title" | "msgid"))
        .filter_map(|(key, value)| match value {
            Value::Number(n) => Some(format!("{}={}", key, n)),
            Value::Array(items) => Some(format!("{}=[{} entries]", key, items.len())),
            _ => None,
        })
        .collect();
    format!("{}: {}", label, metrics.join(", "))
}
