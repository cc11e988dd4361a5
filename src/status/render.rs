use super::{Dashboard, PhasedReleaseSection};
use crate::output::{markdown_string, or_na, table_string};

const BAR_WIDTH: i64 = 10;
const PHASE_DAYS: i64 = 7;

/// `[####------] 3/7` style bar for a phased release.
pub fn phased_release_progress_bar(phased: Option<&PhasedReleaseSection>) -> String {
    let Some(phased) = phased else {
        return "n/a".to_string();
    };
    if !phased.configured {
        return "not configured".to_string();
    }

    let day = phased.current_day_number.unwrap_or(0).clamp(0, PHASE_DAYS);
    let mut filled = (day * BAR_WIDTH) / PHASE_DAYS;
    if day > 0 && filled == 0 {
        filled = 1;
    }
    let filled = filled.clamp(0, BAR_WIDTH) as usize;
    format!(
        "[{}{}] {day}/{PHASE_DAYS}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH as usize - filled)
    )
}

pub fn render_table(dash: &Dashboard) {
    print!("{}", render(dash, false));
}

pub fn render_markdown(dash: &Dashboard) {
    print!("{}", render(dash, true));
}

fn render(dash: &Dashboard, markdown: bool) -> String {
    let mut out = String::new();
    let mut section = |title: &str, rows: Vec<Vec<String>>| {
        if markdown {
            out.push_str(&format!("### {title}\n\n"));
            out.push_str(&markdown_string(&["field", "value"], &rows));
        } else {
            out.push_str(&format!("{}\n", title.to_uppercase()));
            out.push_str(&table_string(&["field", "value"], &rows));
        }
        out.push('\n');
    };
    let row = |k: &str, v: String| vec![k.to_string(), v];

    section(
        "App",
        vec![
            row("id", dash.app.id.clone()),
            row("name", dash.app.name.clone()),
            row("bundleId", dash.app.bundle_id.clone()),
        ],
    );

    let summary = &dash.summary;
    section(
        "Status",
        vec![
            row("health", summary.health.as_str().to_string()),
            row("nextAction", summary.next_action.clone()),
            row("blockerCount", summary.blockers.len().to_string()),
            row(
                "phasedReleaseProgress",
                phased_release_progress_bar(dash.phased_release.as_ref()),
            ),
        ],
    );

    let latest_build = match dash.builds.as_ref().and_then(|b| b.latest.as_ref()) {
        Some(latest) => format!(
            "{} ({})",
            or_na(latest.version.as_deref()),
            or_na(Some(latest.build_number.as_str()))
        ),
        None => "none".to_string(),
    };
    let testflight = dash
        .testflight
        .as_ref()
        .map(|tf| {
            let external = tf.external_build_state.as_deref().filter(|s| !s.trim().is_empty());
            or_na(external.or(tf.beta_review_state.as_deref()))
        })
        .unwrap_or_else(|| or_na(None));
    section(
        "Pipeline",
        vec![
            row("latestBuild", latest_build),
            row("testflight", testflight),
            row(
                "appstore",
                or_na(dash.appstore.as_ref().and_then(|a| a.state.as_deref())),
            ),
            row("review", or_na(dash.review.as_ref().and_then(|r| r.state.as_deref()))),
        ],
    );

    let blockers = if summary.blockers.is_empty() {
        vec![row("none", "none".to_string())]
    } else {
        summary
            .blockers
            .iter()
            .enumerate()
            .map(|(i, b)| row(&format!("blocker_{}", i + 1), b.clone()))
            .collect()
    };
    section("Blockers", blockers);
    out
}
