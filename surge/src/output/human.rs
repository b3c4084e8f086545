use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use surge_core::runner::{Profile, ProgressFn, RunReport, ScenarioSpec};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, source: &Path, spec: &ScenarioSpec) {
        println!("scenario: {}", source.display());
        match &spec.profile {
            Profile::OpenModel(m) => {
                let total: Duration = m
                    .stages
                    .iter()
                    .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
                println!(
                    "{}: open-model startRate={} stages={} duration={} preAllocatedVUs={} maxVUs={}",
                    spec.name,
                    m.start_rate,
                    m.stages.len(),
                    format_duration(total),
                    m.pre_allocated_vus,
                    m.max_vus
                );
            }
            Profile::Smoke(s) => {
                println!(
                    "{}: smoke vus={} duration={} sleepBetween={}",
                    spec.name,
                    s.vus,
                    format_duration(s.duration),
                    format_duration(s.sleep_between)
                );
            }
        }
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(|u| {
            let mut line = format!(
                "[{}] t={} iters={} dropped={} vus={}/{}",
                u.phase,
                format_duration(u.elapsed),
                u.iterations_total,
                u.dropped_total,
                u.in_use_vus,
                u.live_vus
            );
            if let Some(stage) = &u.stage {
                line.push_str(&format!(
                    " stage={}/{} rate={:.1}/s remaining={}",
                    stage.index + 1,
                    stage.count,
                    stage.current_rate,
                    format_duration(stage.stage_remaining)
                ));
            }
            if let (Some(p50), Some(p95)) = (u.window_p50_ms, u.window_p95_ms) {
                line.push_str(&format!(" p50={p50:.1}ms p95={p95:.1}ms"));
            }
            eprintln!("{line}");
        }))
    }

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        print!("{}", render(report));

        if !report.violations.is_empty() {
            eprintln!("gates failed:");
            for v in &report.violations {
                match v.observed {
                    Some(obs) => eprintln!("  {} <= {} (observed {obs:.4})", v.gate, v.limit),
                    None => eprintln!("  {} <= {} (no samples)", v.gate, v.limit),
                }
            }
        }

        Ok(())
    }
}

fn render(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    out.push_str(&format!("scenario {} ", report.scenario));
    out.push_str(if report.interrupted {
        "(interrupted)\n"
    } else {
        "\n"
    });

    out.push_str(&format!(
        "  iterations .... {} ({:.1}/s over {})\n",
        s.iterations_total,
        s.iterations_per_sec,
        format_duration(s.run_duration)
    ));
    out.push_str(&format!("  dropped ....... {}\n", s.dropped_iterations_total));
    out.push_str(&format!(
        "  status ........ 2xx={} 3xx={} 4xx={} 5xx={}\n",
        s.status_2xx, s.status_3xx, s.status_4xx, s.status_5xx
    ));
    out.push_str(&format!(
        "  errors ........ transport={} timeouts={} cancelled={}\n",
        s.transport_errors_total, s.timeouts_total, s.cancelled_total
    ));

    let l = &s.latency;
    if l.count > 0 {
        out.push_str(&format!(
            "  latency ....... p50={} p95={} p99={} max={} mean={} (n={})\n",
            fmt_ms(l.p50_ms),
            fmt_ms(l.p95_ms),
            fmt_ms(l.p99_ms),
            l.max_ms.map_or("-".to_string(), |v| format!("{v}ms")),
            fmt_ms(l.mean_ms),
            l.count
        ));
    }

    if s.checks_total > 0 {
        out.push_str(&format!(
            "  checks ........ {}/{} passed\n",
            s.checks_total - s.checks_failed,
            s.checks_total
        ));
        for check in &s.checks_by_name {
            out.push_str(&format!(
                "    {} {}: {}/{}\n",
                if check.failed == 0 { "ok" } else { "FAIL" },
                check.name,
                check.total - check.failed,
                check.total
            ));
        }
    }

    out
}

fn fmt_ms(v: Option<f64>) -> String {
    v.map_or("-".to_string(), |v| format!("{v:.1}ms"))
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    if total >= 60 {
        let mins = total / 60;
        let secs = total % 60;
        if secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m{secs}s")
        }
    } else if d.subsec_millis() != 0 && total < 10 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{total}s")
    }
}
