//! Markdown and JSON report generation.
//!
//! This module renders the outcome of a guard run: the API key check,
//! every ticker's validation and quota decisions, and the security
//! events the guard emitted.

use crate::audit::{denial_rate, most_limited_callers, rejections};
use crate::models::{
    ApiKeyCheck, EventOutcome, EventSummary, GuardReport, ReportMetadata, SecurityEvent,
    TickerCheck,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &GuardReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# ResearchGuard Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_api_key_section(&report.api_key));

    if let Some(ref prompt) = report.sanitized_prompt {
        output.push_str(&generate_prompt_section(prompt));
    }

    output.push_str(&generate_summary_section(&report.summary, &report.events));
    output.push_str(&generate_tickers_section(&report.checks));
    output.push_str(&generate_events_section(&report.events));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Caller:** {}\n", inline_code(&metadata.caller_id)));
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if metadata.rate_limiting_enabled {
        section.push_str(&format!(
            "- **Rate Limit:** {} requests/minute\n",
            metadata.max_requests_per_minute
        ));
    } else {
        section.push_str("- **Rate Limit:** disabled\n");
    }
    section.push_str(&format!(
        "- **Token Budget:** {} tokens/request (not enforced)\n",
        metadata.max_tokens_per_request
    ));
    section.push_str(&format!(
        "- **Tickers Checked:** {}\n",
        metadata.tickers_checked
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the API key section.
fn generate_api_key_section(check: &ApiKeyCheck) -> String {
    let mut section = String::new();

    section.push_str("## API Key\n\n");
    match (&check.fingerprint, &check.error) {
        (_, Some(error)) => {
            section.push_str(&format!(
                "{} **{}** key rejected: {}\n\n",
                EventOutcome::Rejected.emoji(),
                check.provider,
                error
            ));
        }
        (Some(fingerprint), None) => {
            section.push_str(&format!(
                "{} **{}** key accepted (fingerprint `{}`)\n\n",
                EventOutcome::Allowed.emoji(),
                check.provider,
                fingerprint
            ));
        }
        (None, None) => {
            section.push_str(&format!("**{}** key accepted\n\n", check.provider));
        }
    }

    section
}

/// Generate the sanitized prompt section.
fn generate_prompt_section(prompt: &str) -> String {
    let mut section = String::new();

    let fence = "`".repeat(longest_backtick_run(prompt).max(2) + 1);

    section.push_str("## Sanitized Prompt\n\n");
    section.push_str(&format!("{}text\n", fence));
    section.push_str(prompt);
    section.push_str(&format!("\n{}\n\n", fence));

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &EventSummary, events: &[SecurityEvent]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    section.push_str(&format!(
        "| {} Allowed | {} Rejected | {} Denied | **Total** |\n",
        EventOutcome::Allowed.emoji(),
        EventOutcome::Rejected.emoji(),
        EventOutcome::Denied.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.allowed, summary.rejected, summary.denied, summary.total
    ));

    if !summary.by_kind.is_empty() {
        section.push_str("### Events by Kind\n\n");
        section.push_str("| Kind | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut kinds: Vec<_> = summary.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (kind, count) in kinds {
            section.push_str(&format!("| {} | {} |\n", kind, count));
        }
        section.push('\n');
    }

    if summary.denied > 0 {
        section.push_str(&format!(
            "**Quota denial rate:** {:.0}%\n\n",
            denial_rate(events) * 100.0
        ));

        let limited = most_limited_callers(events, 5);
        if !limited.is_empty() {
            section.push_str("### Most Limited Callers\n\n");
            section.push_str("| Caller | Denials |\n");
            section.push_str("|:---|:---:|\n");
            for (caller, count) in limited {
                section.push_str(&format!("| {} | {} |\n", table_code(&caller), count));
            }
            section.push('\n');
        }
    }

    section
}

/// Generate the per-ticker section.
fn generate_tickers_section(checks: &[TickerCheck]) -> String {
    let mut section = String::new();

    section.push_str("## Tickers\n\n");

    if checks.is_empty() {
        section.push_str("No tickers were checked.\n\n");
        return section;
    }

    for check in checks {
        section.push_str(&generate_ticker_block(check));
    }

    section
}

/// Generate a single ticker block.
fn generate_ticker_block(check: &TickerCheck) -> String {
    let mut block = String::new();

    let (badge, title) = match check.symbol {
        Some(ref symbol) if check.passed() => ("✅ **PASSED**", symbol.to_string()),
        Some(ref symbol) => ("⛔ **RATE LIMITED**", symbol.to_string()),
        None => ("❌ **INVALID**", inline_code(&check.input)),
    };

    block.push_str(&format!("### {} {}\n\n", badge, title));

    if let Some(ref error) = check.error {
        block.push_str(&format!("**Error:** {}\n\n", error));
    }

    if !check.requests.is_empty() {
        block.push_str("| Request | Decision | Retry After | Waited |\n");
        block.push_str("|:---:|:---|:---:|:---:|\n");
        for request in &check.requests {
            let decision = if request.allowed { "allowed" } else { "denied" };
            let retry = request
                .retry_after_secs
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "-".to_string());
            let waited = if request.waited { "yes" } else { "no" };
            block.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                request.attempt, decision, retry, waited
            ));
        }
        block.push('\n');
    }

    block.push_str("---\n\n");

    block
}

/// Generate the rejected events section.
fn generate_events_section(events: &[SecurityEvent]) -> String {
    let rejected = rejections(events);
    if rejected.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Security Events\n\n");
    section.push_str("| Time | Caller | Kind | Outcome | Detail |\n");
    section.push_str("|:---|:---|:---|:---|:---|\n");

    for event in rejected {
        section.push_str(&format!(
            "| {} | {} | {} | {} {} | {} |\n",
            event.timestamp.format("%H:%M:%S%.3f"),
            table_code(&event.caller_id),
            event.kind,
            event.outcome.emoji(),
            event.outcome,
            event.detail.replace('|', "\\|")
        ));
    }
    section.push('\n');

    section
}

/// Length of the longest run of backticks in `text`.
fn longest_backtick_run(text: &str) -> usize {
    text.split(|ch| ch != '`').map(str::len).max().unwrap_or(0)
}

/// Render untrusted text as a single-line code span.
///
/// Control characters are shown escaped and the delimiter is longer than
/// any backtick run inside the text.
fn inline_code(text: &str) -> String {
    let mut shown = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_control() {
            shown.extend(ch.escape_default());
        } else {
            shown.push(ch);
        }
    }

    if shown.is_empty() {
        return "*(empty)*".to_string();
    }

    let ticks = "`".repeat(longest_backtick_run(&shown) + 1);
    if shown.starts_with('`') || shown.ends_with('`') {
        format!("{} {} {}", ticks, shown, ticks)
    } else {
        format!("{}{}{}", ticks, shown, ticks)
    }
}

/// [`inline_code`] for a table cell.
fn table_code(text: &str) -> String {
    inline_code(text).replace('|', "\\|")
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by ResearchGuard*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &GuardReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
