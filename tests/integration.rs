//! Integration tests for Keystroke Harness
//!
//! These tests run whole campaigns against a scripted device: input
//! generation, verification, statistics and report export together.

use keystroke_harness::campaign::{
    CampaignSettings, CampaignState, CancelFlag, FuzzCampaign, StopCondition,
};
use keystroke_harness::config::Config;
use keystroke_harness::keys::{
    malformed_pool, Category, FamilyWeights, KeyFamily, KeystrokeEncoder, KeystrokeGenerator,
    ModifierSet, UniformCrossProduct, WeightedFamilies, WeightedFamily, CATALOG, ESC,
};
use keystroke_harness::report::{FailureLog, RunInfo, RunReport};
use keystroke_harness::stats::RunStatistics;
use keystroke_harness::transport::{Reply, ScriptedTransport};
use keystroke_harness::verify::{Outcome, TransactionVerifier, VerifierSettings};
use std::collections::HashSet;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn verifier(deadline_ms: u64) -> TransactionVerifier {
    TransactionVerifier::new(VerifierSettings {
        deadline: Duration::from_millis(deadline_ms),
        settle: Duration::ZERO,
        ..VerifierSettings::default()
    })
}

fn weighted_generator(seed: u64) -> KeystrokeGenerator {
    let strategy = Box::new(WeightedFamilies::new(&FamilyWeights::default()).unwrap());
    KeystrokeGenerator::new(KeystrokeEncoder::default(), strategy, Some(seed))
}

fn uniform_generator(seed: u64, malformed_share: f64) -> KeystrokeGenerator {
    let strategy = Box::new(UniformCrossProduct::new(malformed_share));
    KeystrokeGenerator::new(KeystrokeEncoder::default(), strategy, Some(seed))
}

fn campaign(generator: KeystrokeGenerator, stop: StopCondition, deadline_ms: u64) -> FuzzCampaign {
    FuzzCampaign::new(CampaignSettings::new(stop), generator, verifier(deadline_ms))
}

/// Answers every structured input quickly and ignores the malformed pool
fn ignores_malformed() -> ScriptedTransport {
    let malformed: HashSet<Vec<u8>> = malformed_pool().into_iter().map(|m| m.bytes).collect();
    ScriptedTransport::new(move |bytes| {
        if malformed.contains(bytes) {
            Reply::Silence
        } else {
            Reply::line_after("SCANCODE: 0x1E", Duration::from_millis(1))
        }
    })
}

fn assert_consistent(stats: &RunStatistics) {
    assert_eq!(stats.total(), stats.categories().total());
    assert_eq!(stats.total(), stats.successes() + stats.failures());
    for (category, c) in stats.categories().iter() {
        assert_eq!(c.total, c.successes + c.failures, "category {}", category);
    }
    assert_eq!(stats.failure_log().len() as u64, stats.failures());
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("keystroke-harness-{}-{}.json", name, std::process::id()))
}

// ---------------------------------------------------------------------------
// Campaign scenarios
// ---------------------------------------------------------------------------

#[test]
fn responsive_ascii_and_silent_malformed() {
    let mut c = campaign(weighted_generator(2024), StopCondition::count(1000), 200);
    let mut device = ignores_malformed();
    let mut stats = RunStatistics::new();

    assert_eq!(c.run(&mut device, &mut stats), CampaignState::Completed);
    assert_eq!(stats.total(), 1000);
    assert_consistent(&stats);

    let ascii = Category::Weighted(WeightedFamily::Ascii);
    assert!(stats.categories().get(&ascii).total > 0);
    assert_eq!(stats.category_success_rate(&ascii), 100.0);

    let malformed = stats.categories().get(&Category::Malformed);
    assert!(malformed.total > 0);
    assert_eq!(stats.category_success_rate(&Category::Malformed), 0.0);

    let malformed_failures: Vec<_> = stats
        .failure_log()
        .iter()
        .filter(|f| f.category == "malformed")
        .collect();
    assert_eq!(malformed_failures.len() as u64, malformed.total);
    assert!(malformed_failures.iter().all(|f| f.outcome == Outcome::Timeout));
}

#[test]
fn zero_duration_campaign_terminates() {
    let mut c = campaign(weighted_generator(1), StopCondition::duration(Duration::ZERO), 50);
    let mut device = ScriptedTransport::echo_scancode();
    let mut stats = RunStatistics::new();

    let started = Instant::now();
    let state = c.run(&mut device, &mut stats);
    assert_eq!(state, CampaignState::Completed);
    assert!(stats.total() <= 1);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn missing_bounds_rejected_before_any_transaction() {
    assert!(StopCondition::new(None, None).is_err());
}

#[test]
fn uniform_campaign_only_produces_known_categories() {
    let mut c = campaign(uniform_generator(9, 0.1), StopCondition::count(400), 50);
    let mut device = ScriptedTransport::echo_scancode();
    let mut stats = RunStatistics::new();
    c.run(&mut device, &mut stats);

    let mut known: HashSet<Category> = Category::cross_product().into_iter().collect();
    known.insert(Category::Malformed);
    for (category, _) in stats.categories().iter() {
        assert!(known.contains(category), "unexpected category {}", category);
    }
    assert_eq!(stats.success_rate(), 100.0);
    assert_consistent(&stats);
}

#[test]
fn same_seed_replays_same_bytes() {
    let run = |seed: u64| {
        let mut c = campaign(weighted_generator(seed), StopCondition::count(200), 20);
        let mut device = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        c.run(&mut device, &mut stats);
        device.written().to_vec()
    };
    assert_eq!(run(77), run(77));
    assert_ne!(run(77), run(78));
}

#[test]
fn interrupted_campaign_reports_interrupted() {
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let mut c = campaign(weighted_generator(5), StopCondition::count(100_000), 20)
        .with_cancel_flag(cancel)
        .on_progress(move |stats| {
            if stats.total() >= 50 {
                trigger.cancel();
            }
        });
    let mut device = ScriptedTransport::echo_scancode();
    let mut stats = RunStatistics::new();

    let state = c.execute(&mut device, &mut stats);
    assert_eq!(state, CampaignState::Interrupted);
    assert!(device.is_closed());
    assert_eq!(stats.total(), 50);
    assert_consistent(&stats);

    let report = RunReport::new(
        &stats,
        &RunInfo {
            strategy: "weighted".into(),
            seed: c.seed(),
            final_state: state,
        },
        100,
    );
    assert_eq!(report.summary.total_inputs, 50);
    assert!(report.to_json().unwrap().contains("\"interrupted\""));
}

#[test]
fn transport_faults_do_not_abort_campaign() {
    let mut writes = 0u32;
    let mut device = ScriptedTransport::new(move |_| {
        writes += 1;
        if writes % 4 == 0 {
            Reply::Fault("link dropped".into())
        } else {
            Reply::line("SCANCODE: 0x1C")
        }
    });
    let mut c = campaign(weighted_generator(3), StopCondition::count(40), 20);
    let mut stats = RunStatistics::new();
    c.run(&mut device, &mut stats);

    assert_eq!(stats.total(), 40);
    assert_eq!(stats.transport_exceptions(), 10);
    assert!(stats
        .failure_log()
        .iter()
        .all(|f| f.outcome == Outcome::TransportException && f.actual == "link dropped"));
}

// ---------------------------------------------------------------------------
// Encoding coverage
// ---------------------------------------------------------------------------

#[test]
fn every_cross_product_cell_is_reachable() {
    let encoder = KeystrokeEncoder::default();
    let mut seen = HashSet::new();
    for key in CATALOG {
        for mods in ModifierSet::ALL {
            seen.insert(encoder.encode(key, mods).category);
        }
    }
    let expected: HashSet<Category> = Category::cross_product().into_iter().collect();
    assert_eq!(seen, expected);
}

#[test]
fn escape_keys_under_modifiers_use_parameterized_csi() {
    let encoder = KeystrokeEncoder::default();
    let escape_families = [KeyFamily::Function, KeyFamily::Navigation];
    for key in CATALOG.iter().filter(|k| escape_families.contains(&k.family)) {
        for mods in ModifierSet::ALL.iter().filter(|m| !m.is_empty()) {
            let bytes = encoder.encode_bytes(key, *mods);
            assert_eq!(&bytes[..2], &[ESC, b'['], "{} {}", key.name, mods);
            let text = String::from_utf8_lossy(&bytes).to_string();
            let param: u16 = text
                .split(';')
                .nth(1)
                .map(|rest| rest.trim_end_matches(|c: char| !c.is_ascii_digit()))
                .and_then(|digits| digits.parse().ok())
                .unwrap();
            let expected = 1 + mods.shift as u16 + 2 * mods.alt as u16 + 4 * mods.ctrl as u16;
            assert_eq!(param, expected, "{} {}", key.name, mods);
            assert!((1..=8).contains(&param));
        }
    }
}

// ---------------------------------------------------------------------------
// Reports and configuration
// ---------------------------------------------------------------------------

#[test]
fn exported_failure_log_replays_raw_bytes() {
    let mut c = campaign(weighted_generator(11), StopCondition::count(300), 30);
    let mut device = ignores_malformed();
    let mut stats = RunStatistics::new();
    c.run(&mut device, &mut stats);
    assert!(stats.failures() > 0);

    let path = temp_path("failure-log");
    FailureLog::new(&stats).export_json(&path).expect("export failed");
    let loaded: FailureLog = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.failures.len() as u64, stats.failures());
    let pool: HashSet<Vec<u8>> = malformed_pool().into_iter().map(|m| m.bytes).collect();
    for f in &loaded.failures {
        assert_eq!(hex::encode(&f.input_bytes), f.input_hex);
        assert!(pool.contains(&f.input_bytes));
    }
}

#[test]
fn exported_run_report_has_all_sections() {
    let mut c = campaign(uniform_generator(4, 0.0), StopCondition::count(100), 20);
    let mut device = ScriptedTransport::echo_scancode();
    let mut stats = RunStatistics::new();
    let state = c.run(&mut device, &mut stats);

    let report = RunReport::new(
        &stats,
        &RunInfo {
            strategy: "uniform".into(),
            seed: 4,
            final_state: state,
        },
        100,
    );
    let path = temp_path("run-report");
    report.export_json(&path).expect("export failed");
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let _ = std::fs::remove_file(&path);

    for section in ["metadata", "summary", "performance", "errors", "categories", "recent_failures"] {
        assert!(value.get(section).is_some(), "missing {}", section);
    }
    assert_eq!(value["summary"]["total_inputs"], 100);
    assert_eq!(value["errors"]["total_failures"], 0);
    let category_total: u64 = value["categories"]
        .as_object()
        .unwrap()
        .values()
        .map(|c| c["total"].as_u64().unwrap())
        .sum();
    assert_eq!(category_total, 100);
}

#[test]
fn config_file_drives_verifier_settings() {
    let path = std::env::temp_dir().join(format!("keystroke-harness-it-{}.toml", std::process::id()));
    std::fs::write(&path, "[verify]\ntimeout_ms = 40\nsettle_ms = 0\n").unwrap();
    let config = Config::load_from(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let verifier = TransactionVerifier::new(config.verifier_settings());
    let mut device = ScriptedTransport::silent();
    let input = KeystrokeEncoder::default().encode(&CATALOG[0], ModifierSet::NONE);
    let tx = verifier.verify(&mut device, input);

    assert_eq!(tx.outcome, Outcome::Timeout);
    assert!(tx.elapsed >= Duration::from_millis(40));
    assert!(tx.elapsed < Duration::from_millis(1000));
}
