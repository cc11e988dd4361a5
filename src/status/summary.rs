use super::{Dashboard, Health, Summary};
use crate::client::normalize_enum;

/// Derive health, blockers and the suggested next action from the merged
/// dashboard.
pub fn build_summary(dash: &Dashboard) -> Summary {
    let blockers = collect_blockers(dash);
    Summary {
        health: resolve_health(dash, &blockers),
        next_action: resolve_next_action(dash, &blockers),
        blockers,
    }
}

fn state_of(value: Option<&String>) -> String {
    value.map(|s| normalize_enum(s)).unwrap_or_default()
}

fn review_state(dash: &Dashboard) -> Option<String> {
    dash.review.as_ref().map(|r| state_of(r.state.as_ref()))
}

fn appstore_state(dash: &Dashboard) -> Option<String> {
    dash.appstore.as_ref().map(|a| state_of(a.state.as_ref()))
}

fn missing_latest_build(dash: &Dashboard) -> bool {
    dash.builds.as_ref().is_some_and(|b| b.latest.is_none())
}

fn in_flight(dash: &Dashboard) -> bool {
    dash.submission.as_ref().is_some_and(|s| s.in_flight)
}

fn collect_blockers(dash: &Dashboard) -> Vec<String> {
    let mut blockers = Vec::new();

    if let Some(submission) = &dash.submission {
        blockers.extend(submission.blocking_issues.iter().cloned());
    }

    match review_state(dash).as_deref() {
        Some("UNRESOLVED_ISSUES") => blockers.push("App Store review has unresolved issues".to_string()),
        Some("DEVELOPER_REJECTED" | "REJECTED") => blockers.push("App Store review is rejected".to_string()),
        _ => {}
    }

    if let Some(state) = appstore_state(dash) {
        if matches!(
            state.as_str(),
            "DEVELOPER_REJECTED" | "REJECTED" | "METADATA_REJECTED" | "INVALID_BINARY"
        ) {
            blockers.push(format!("App Store version is in blocking state {state}"));
        }
    }

    if missing_latest_build(dash) {
        blockers.push("No builds found for this app".to_string());
    }

    blockers.sort();
    blockers.dedup();
    blockers
}

fn is_review_in_progress(state: &str) -> bool {
    matches!(state, "WAITING_FOR_REVIEW" | "IN_REVIEW")
}

fn is_appstore_in_progress(state: &str) -> bool {
    matches!(
        state,
        "PREPARE_FOR_SUBMISSION"
            | "WAITING_FOR_REVIEW"
            | "IN_REVIEW"
            | "PENDING_DEVELOPER_RELEASE"
            | "PENDING_APPLE_RELEASE"
            | "PROCESSING_FOR_DISTRIBUTION"
    )
}

fn resolve_health(dash: &Dashboard, blockers: &[String]) -> Health {
    if !blockers.is_empty() {
        return Health::Red;
    }
    let busy = in_flight(dash)
        || review_state(dash).is_some_and(|s| is_review_in_progress(&s))
        || appstore_state(dash).is_some_and(|s| is_appstore_in_progress(&s));
    if busy {
        Health::Yellow
    } else {
        Health::Green
    }
}

fn resolve_next_action(dash: &Dashboard, blockers: &[String]) -> String {
    if let Some(first) = blockers.first() {
        return first.clone();
    }
    let action = if in_flight(dash) {
        "Wait for App Store review outcome."
    } else if review_state(dash).is_some_and(|s| is_review_in_progress(&s)) {
        "Monitor App Store review progress."
    } else if appstore_state(dash).as_deref() == Some("PREPARE_FOR_SUBMISSION") {
        "Prepare metadata and submit for review."
    } else if appstore_state(dash).as_deref() == Some("READY_FOR_SALE") {
        "No action needed."
    } else if missing_latest_build(dash) {
        "Upload a build to App Store Connect."
    } else if dash.testflight.as_ref().is_some_and(|tf| {
        blank(tf.external_build_state.as_deref()) && blank(tf.beta_review_state.as_deref())
    }) {
        "Decide whether to submit a build for external TestFlight."
    } else {
        "Review release status."
    };
    action.to_string()
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::*;

    fn with_latest_build() -> Dashboard {
        Dashboard {
            builds: Some(BuildsSection {
                latest: Some(LatestBuild {
                    id: "b1".into(),
                    build_number: "1".into(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn blocking_issues_are_red() {
        let mut dash = with_latest_build();
        dash.submission = Some(SubmissionSection {
            in_flight: true,
            blocking_issues: vec!["submission s1 has unresolved issues".into()],
        });
        let summary = build_summary(&dash);
        assert_eq!(summary.health, Health::Red);
        assert_eq!(summary.next_action, "submission s1 has unresolved issues");
    }

    #[test]
    fn waiting_for_review_is_yellow() {
        let mut dash = with_latest_build();
        dash.review = Some(ReviewSection {
            state: Some("WAITING_FOR_REVIEW".into()),
            ..Default::default()
        });
        let summary = build_summary(&dash);
        assert_eq!(summary.health, Health::Yellow);
        assert_eq!(summary.next_action, "Monitor App Store review progress.");
        assert!(summary.blockers.is_empty());
    }

    #[test]
    fn ready_for_sale_is_green() {
        let mut dash = with_latest_build();
        dash.appstore = Some(AppStoreSection {
            state: Some("READY_FOR_SALE".into()),
            ..Default::default()
        });
        let summary = build_summary(&dash);
        assert_eq!(summary.health, Health::Green);
        assert_eq!(summary.next_action, "No action needed.");
    }

    #[test]
    fn blockers_are_sorted_and_unique() {
        let dash = Dashboard {
            builds: Some(BuildsSection::default()),
            appstore: Some(AppStoreSection {
                state: Some("metadata_rejected".into()),
                ..Default::default()
            }),
            review: Some(ReviewSection {
                state: Some("REJECTED".into()),
                ..Default::default()
            }),
            submission: Some(SubmissionSection {
                in_flight: false,
                blocking_issues: vec!["No builds found for this app".into()],
            }),
            ..Default::default()
        };
        let summary = build_summary(&dash);
        assert_eq!(
            summary.blockers,
            vec![
                "App Store review is rejected",
                "App Store version is in blocking state METADATA_REJECTED",
                "No builds found for this app",
            ]
        );
    }

    #[test]
    fn missing_build_asks_for_upload() {
        let dash = Dashboard {
            builds: Some(BuildsSection::default()),
            ..Default::default()
        };
        let summary = build_summary(&dash);
        assert_eq!(summary.next_action, "No builds found for this app");

        let dash = Dashboard {
            testflight: Some(TestFlightSection::default()),
            ..with_latest_build()
        };
        assert_eq!(
            build_summary(&dash).next_action,
            "Decide whether to submit a build for external TestFlight."
        );
    }

    #[test]
    fn empty_dashboard_falls_back() {
        let summary = build_summary(&Dashboard::default());
        assert_eq!(summary.health, Health::Green);
        assert_eq!(summary.next_action, "Review release status.");
    }
}
