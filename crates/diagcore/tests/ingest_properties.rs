//! Exercises the dedup-key and priority-score primitives the way an ingest
//! service actually uses them: grouping a batch of reports and ranking the
//! resulting groups, not just calling each function in isolation (that's
//! already covered by the unit tests next to their definitions).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use diagcore::domain::report::{
    AnomalyReport, BuildInfo, CheckType, CompilerId, CompilerName, Location, OptLevelToken,
};
use diagcore::domain::report::priority_score;

fn report(id: &str, line: u32, flags: Vec<&str>) -> AnomalyReport {
    AnomalyReport {
        report_id: id.to_string(),
        timestamp: Utc::now(),
        check_type: CheckType::ArithmeticOverflow,
        location: Location {
            file: "math.c".to_string(),
            line,
            function: "add".to_string(),
        },
        compiler: CompilerId {
            name: CompilerName::Clang,
            version: "17.0.6".to_string(),
            target: None,
        },
        build_info: BuildInfo {
            optimization_level: OptLevelToken::O2,
            flags: Some(flags.into_iter().map(String::from).collect()),
            source_hash: None,
            binary_checksum: None,
        },
        pc: None,
        stacktrace: None,
        check_details: None,
        system_info: None,
    }
}

fn group_by_dedup_key(reports: &[AnomalyReport]) -> HashMap<String, Vec<&AnomalyReport>> {
    let mut groups: HashMap<String, Vec<&AnomalyReport>> = HashMap::new();
    for r in reports {
        groups.entry(r.dedup_key()).or_default().push(r);
    }
    groups
}

#[test]
fn a_batch_with_shuffled_flags_and_arrival_order_collapses_to_one_group_per_distinct_bug() {
    // Same underlying bug (file/line/function/check/compiler), reported
    // three times by different collectors with flags in different orders,
    // interleaved with a second, genuinely distinct bug at another line.
    let batch = vec![
        report("r1", 42, vec!["-O2", "-Wall"]),
        report("r2", 99, vec!["-O2"]),
        report("r3", 42, vec!["-Wall", "-O2"]),
        report("r4", 42, vec!["-O2", "-Wall"]),
    ];

    let groups = group_by_dedup_key(&batch);

    assert_eq!(groups.len(), 2, "expected exactly two distinct bugs, got groups: {:?}", groups.keys().collect::<Vec<_>>());
    let line_42_key = batch[0].dedup_key();
    assert_eq!(groups[&line_42_key].len(), 3);
    let line_99_key = batch[1].dedup_key();
    assert_eq!(groups[&line_99_key].len(), 1);
}

#[test]
fn a_frequent_recent_bug_outranks_a_rare_stale_one_of_equal_severity() {
    let buckets = vec![
        (Duration::from_secs(24 * 3600), 1.0),
        (Duration::from_secs(72 * 3600), 0.9),
        (Duration::from_secs(168 * 3600), 0.7),
    ];
    let severity_weight = 5.0;

    let frequent_and_fresh = priority_score(6, severity_weight, Duration::from_secs(3600), &buckets, 0.5);
    let rare_and_stale = priority_score(1, severity_weight, Duration::from_secs(1000 * 3600), &buckets, 0.5);

    assert!(
        frequent_and_fresh > rare_and_stale,
        "frequent_and_fresh={frequent_and_fresh} should outrank rare_and_stale={rare_and_stale}"
    );
}
