//! Ship/no-ship simulation tests

mod common;

use common::{synthetic_table, GAMED_PROXY, GOOD_PROXY, OUTCOME};
use proxima::{simulate_decisions, DecisionConfig, Error, ORACLE_NAME};

#[test]
fn test_oracle_is_always_perfect() {
    common::init_tracing();
    let table = synthetic_table(10, 200, 23);
    let config = DecisionConfig::new(OUTCOME);

    let results = simulate_decisions(&table, &[GOOD_PROXY, GAMED_PROXY], &config).unwrap();
    let oracle = results.iter().find(|r| r.metric == ORACLE_NAME).unwrap();

    assert_eq!(oracle.win_rate, 1.0);
    assert_eq!(oracle.avg_regret, 0.0);
    assert_eq!(oracle.incorrect_ships, 0);
    assert_eq!(oracle.missed_opportunities, 0);
    // Nothing can sort above a perfect win rate
    assert_eq!(results[0].win_rate, 1.0);
}

#[test]
fn test_oracle_ignores_caller_threshold() {
    // The oracle decides at its own threshold of zero; a caller threshold
    // that would hold back every proxy cannot dent its win rate
    let table = synthetic_table(8, 200, 23);
    let config = DecisionConfig::new(OUTCOME).threshold(10.0);

    let results = simulate_decisions(&table, &[GOOD_PROXY], &config).unwrap();
    let oracle = results.iter().find(|r| r.metric == ORACLE_NAME).unwrap();
    assert_eq!(oracle.win_rate, 1.0);

    // Every proxy decision is HOLD at that threshold
    let proxy = results.iter().find(|r| r.metric == GOOD_PROXY).unwrap();
    assert_eq!(proxy.total_shipped, 0);
    assert_eq!(proxy.correct_ships, 0);
}

#[test]
fn test_good_proxy_decides_better_than_gamed() {
    let table = synthetic_table(14, 400, 31);
    let config = DecisionConfig::new(OUTCOME);

    let results = simulate_decisions(&table, &[GOOD_PROXY, GAMED_PROXY], &config).unwrap();
    let good = results.iter().find(|r| r.metric == GOOD_PROXY).unwrap();
    let gamed = results.iter().find(|r| r.metric == GAMED_PROXY).unwrap();

    assert!(good.win_rate > gamed.win_rate);
    assert!(good.avg_regret < gamed.avg_regret);
    // The gamed proxy lifts on every experiment and ships everything
    assert_eq!(gamed.total_shipped, gamed.n_experiments);
}

#[test]
fn test_counts_are_consistent() {
    let table = synthetic_table(12, 200, 47);
    let config = DecisionConfig::new(OUTCOME);

    let results = simulate_decisions(&table, &[GOOD_PROXY, GAMED_PROXY], &config).unwrap();
    for result in &results {
        let total = result.correct_ships
            + result.correct_holds
            + result.incorrect_ships
            + result.missed_opportunities;
        assert_eq!(total, result.n_experiments);
        assert_eq!(
            result.total_shipped,
            result.correct_ships + result.incorrect_ships
        );
        assert!((0.0..=1.0).contains(&result.win_rate));
        assert!(result.avg_regret >= 0.0);
    }
}

#[test]
fn test_non_finite_threshold_rejected() {
    let table = synthetic_table(4, 100, 1);
    let config = DecisionConfig::new(OUTCOME).threshold(f64::NAN);
    let err = simulate_decisions(&table, &[GOOD_PROXY], &config).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_unknown_outcome_rejected() {
    let table = synthetic_table(4, 100, 1);
    let config = DecisionConfig::new("no_such_column");
    let err = simulate_decisions(&table, &[GOOD_PROXY], &config).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_results_serde_round_trip() {
    let table = synthetic_table(6, 150, 9);
    let config = DecisionConfig::new(OUTCOME);

    let results = simulate_decisions(&table, &[GOOD_PROXY], &config).unwrap();
    let json = serde_json::to_string(&results).unwrap();
    let back: Vec<proxima::DecisionSimResult> = serde_json::from_str(&json).unwrap();
    assert_eq!(results, back);
}
