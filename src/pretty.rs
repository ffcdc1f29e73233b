//! Console rendering of verdicts and health checks.

use crate::api::types::HealthResponse;
use crate::harness::Verdict;

/// Human-readable lines for a verdict.
pub fn render_verdict(verdict: &Verdict) -> Vec<String> {
    let mut lines = Vec::new();
    let job = verdict.job_id.as_deref().unwrap_or("-");
    let checked_at = verdict.checked_at.format("%Y-%m-%d %H:%M:%S UTC");

    if let Some(report) = &verdict.report {
        let mut head = format!("✅ PASS {} {}", verdict.command, job);
        if let (Some(polls), Some(ms)) = (report.polls, report.elapsed_ms) {
            head.push_str(&format!(" ({} polls, {:.1}s)", polls, ms as f64 / 1000.0));
        }
        lines.push(head);

        let result = &report.result;
        lines.push(format!(
            "   {} {:.4}  (ipTM {:.4}, pTM {:.4})",
            result.primary_score_name.as_deref().unwrap_or("primary_score"),
            result.primary_score,
            result.iptm,
            result.ptm
        ));
        lines.push(format!("   pLDDT {:.2}", result.plddt));
        if let Some(ms) = report.api_succeeded_after_ms {
            lines.push(format!("   API succeeded after {:.1}s", ms as f64 / 1000.0));
        }
        let names: Vec<&str> = result
            .artifacts
            .iter()
            .filter_map(|a| a.name.as_deref())
            .collect();
        lines.push(format!(
            "   {} artifacts: {}",
            result.artifacts.len(),
            names.join(", ")
        ));
        if let Some(artifact) = &report.artifact {
            lines.push(format!(
                "   artifact link ok: {} ({} bytes)",
                artifact.url, artifact.size_bytes
            ));
        }
    } else if let Some(failure) = &verdict.failure {
        lines.push(format!(
            "❌ FAIL {} {} [{}]",
            verdict.command, job, failure.kind
        ));
        lines.push(format!("   {}", failure.message));
        if let Some(details) = &failure.details {
            lines.extend(details.lines().map(|l| format!("   {}", l)));
        }
    }
    lines.push(format!("   checked at {}", checked_at));
    lines
}

pub fn render_health(api_base: &str, health: &HealthResponse) -> Vec<String> {
    let icon = if health.status == "ok" { "✅" } else { "⚠️" };
    let mut line = format!("{} {} status={}", icon, api_base, health.status);
    if let Some(version) = &health.version {
        line.push_str(&format!(" version={}", version));
    }
    if let Some(time) = &health.time {
        line.push_str(&format!(" time={}", time));
    }
    vec![line]
}
