use portfolio_opt_core::config::{SolverSettings, WeightBounds, DEFAULT_COVARIANCE_RIDGE};
use portfolio_opt_core::optimization::cleaning::clean_weights;
use portfolio_opt_core::optimization::mean_variance::{
    optimize_portfolio, portfolio_performance, MeanVarianceInput, MeanVarianceOptimizer, Objective,
};
use portfolio_opt_core::PortfolioError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Helpers
// ===========================================================================

fn random_decimal(rng: &mut StdRng, lo: i64, hi: i64, scale: u32) -> Decimal {
    Decimal::new(rng.gen_range(lo..=hi), scale)
}

/// Random positive definite covariance: A A' + 0.01 I with small entries.
fn random_covariance(rng: &mut StdRng, n: usize) -> Vec<Vec<Decimal>> {
    let a: Vec<Vec<Decimal>> = (0..n)
        .map(|_| (0..n).map(|_| random_decimal(rng, -25, 25, 2)).collect())
        .collect();
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let dot: Decimal = (0..n).map(|k| a[i][k] * a[j][k]).sum();
                    if i == j {
                        dot + dec!(0.01)
                    } else {
                        dot
                    }
                })
                .collect()
        })
        .collect()
}

fn sharpe(w: &[Decimal], mu: &[Decimal], sigma: &[Vec<Decimal>], rf: Decimal) -> Decimal {
    portfolio_performance(w, mu, sigma, rf).unwrap().sharpe_ratio
}

// ===========================================================================
// Max-Sharpe invariants
// ===========================================================================

#[test]
fn test_random_long_only_max_sharpe_invariants() {
    let mut rng = StdRng::seed_from_u64(42);
    let rf = dec!(0.02);
    for _ in 0..5 {
        let n = rng.gen_range(2..=5);
        let mu: Vec<Decimal> = (0..n).map(|_| random_decimal(&mut rng, 3, 25, 2)).collect();
        let sigma = random_covariance(&mut rng, n);

        let opt = MeanVarianceOptimizer::new(
            &mu,
            &sigma,
            &WeightBounds::long_only(),
            DEFAULT_COVARIANCE_RIDGE,
            &SolverSettings::default(),
        )
        .unwrap();
        let w = opt.max_sharpe(rf).unwrap();

        let total: Decimal = w.iter().sum();
        assert!((total - Decimal::ONE).abs() <= dec!(0.0001), "sum {}", total);
        for wi in &w {
            assert!(*wi >= Decimal::ZERO && *wi <= Decimal::ONE, "weight {}", wi);
        }

        // No single asset and not the equal-weight portfolio beats it
        let best = sharpe(&w, &mu, &sigma, rf);
        let equal = vec![Decimal::ONE / Decimal::from(n as u64); n];
        assert!(best >= sharpe(&equal, &mu, &sigma, rf) - dec!(0.00001));
        for i in 0..n {
            let mut vertex = vec![Decimal::ZERO; n];
            vertex[i] = Decimal::ONE;
            assert!(best >= sharpe(&vertex, &mu, &sigma, rf) - dec!(0.00001));
        }

        // Cleaning keeps the sum within tolerance of the raw weights
        let cleaned = clean_weights(&w, &Default::default());
        let cleaned_total: Decimal = cleaned.iter().sum();
        assert!((cleaned_total - Decimal::ONE).abs() <= dec!(0.0001) * Decimal::from(n as u64));
    }
}

#[test]
fn test_random_wide_max_sharpe_near_risk_free() {
    let mut rng = StdRng::seed_from_u64(4242);
    let rf = dec!(0.02);
    for case in 0..4 {
        let n = rng.gen_range(10..=16);
        // The first asset always clears the risk-free rate, by at most 3 bp
        let mu: Vec<Decimal> = (0..n)
            .map(|i| {
                if i == 0 || rng.gen_bool(0.5) {
                    rf + random_decimal(&mut rng, 1, 300, 6)
                } else {
                    random_decimal(&mut rng, -5, 25, 2)
                }
            })
            .collect();
        let sigma = random_covariance(&mut rng, n);

        let opt = MeanVarianceOptimizer::new(
            &mu,
            &sigma,
            &WeightBounds::long_only(),
            DEFAULT_COVARIANCE_RIDGE,
            &SolverSettings::default(),
        )
        .unwrap();
        let w = opt.max_sharpe(rf).unwrap();

        let total: Decimal = w.iter().sum();
        assert!((total - Decimal::ONE).abs() <= dec!(0.0001), "case {case} sum {total}");
        for wi in &w {
            assert!(*wi >= Decimal::ZERO && *wi <= Decimal::ONE, "case {case} weight {wi}");
        }

        let best = sharpe(&w, &mu, &sigma, rf);
        let equal = vec![Decimal::ONE / Decimal::from(n as u64); n];
        assert!(best >= sharpe(&equal, &mu, &sigma, rf) - dec!(0.00001), "case {case}");
        for i in 0..n {
            let mut vertex = vec![Decimal::ZERO; n];
            vertex[i] = Decimal::ONE;
            assert!(best >= sharpe(&vertex, &mu, &sigma, rf) - dec!(0.00001), "case {case} asset {i}");
        }
    }
}

#[test]
fn test_all_assets_barely_above_risk_free() {
    let mut rng = StdRng::seed_from_u64(99);
    let rf = dec!(0.02);
    let n = 12;
    let mu: Vec<Decimal> = (0..n).map(|_| rf + random_decimal(&mut rng, 1, 50, 7)).collect();
    let sigma = random_covariance(&mut rng, n);
    let opt = MeanVarianceOptimizer::new(
        &mu,
        &sigma,
        &WeightBounds::long_only(),
        DEFAULT_COVARIANCE_RIDGE,
        &SolverSettings::default(),
    )
    .unwrap();
    let w = opt.max_sharpe(rf).unwrap();
    let total: Decimal = w.iter().sum();
    assert!((total - Decimal::ONE).abs() <= dec!(0.0001), "sum {total}");
    let best = sharpe(&w, &mu, &sigma, rf);
    let equal = vec![Decimal::ONE / Decimal::from(n as u64); n];
    assert!(best >= sharpe(&equal, &mu, &sigma, rf) - dec!(0.000001));
}

#[test]
fn test_bounded_max_sharpe_respects_caps() {
    let mut rng = StdRng::seed_from_u64(7);
    let rf = dec!(0.02);
    let bounds = WeightBounds::uniform(Decimal::ZERO, dec!(0.4));
    for _ in 0..3 {
        let n = 4;
        let mu: Vec<Decimal> = (0..n).map(|_| random_decimal(&mut rng, 3, 25, 2)).collect();
        let sigma = random_covariance(&mut rng, n);
        let opt = MeanVarianceOptimizer::new(
            &mu,
            &sigma,
            &bounds,
            DEFAULT_COVARIANCE_RIDGE,
            &SolverSettings::default(),
        )
        .unwrap();
        let w = opt.max_sharpe(rf).unwrap();
        let total: Decimal = w.iter().sum();
        assert!((total - Decimal::ONE).abs() <= dec!(0.0000001));
        for wi in &w {
            assert!(*wi >= Decimal::ZERO && *wi <= dec!(0.4));
        }
    }
}

// ===========================================================================
// Frontier
// ===========================================================================

#[test]
fn test_frontier_points_dominate_min_volatility() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 4;
    let mu: Vec<Decimal> = (0..n).map(|_| random_decimal(&mut rng, 3, 25, 2)).collect();
    let sigma = random_covariance(&mut rng, n);
    let opt = MeanVarianceOptimizer::new(
        &mu,
        &sigma,
        &WeightBounds::long_only(),
        DEFAULT_COVARIANCE_RIDGE,
        &SolverSettings::default(),
    )
    .unwrap();

    let frontier = opt.efficient_frontier(10, dec!(0.02)).unwrap();
    let min_vol = frontier[0].volatility;
    for pair in frontier.windows(2) {
        assert!(pair[1].expected_return > pair[0].expected_return);
    }
    for p in &frontier {
        assert!(p.volatility >= min_vol - dec!(0.000001));
        let total: Decimal = p.weights.iter().sum();
        assert!((total - Decimal::ONE).abs() <= dec!(0.0001));
    }
}

// ===========================================================================
// JSON entry point
// ===========================================================================

#[test]
fn test_optimize_from_json_min_volatility() {
    let json = r#"{
        "asset_names": ["A", "B"],
        "expected_returns": ["0.30", "0.10"],
        "covariance_matrix": [["0.04", "0.01"], ["0.01", "0.02"]],
        "objective": {"type": "min_volatility"}
    }"#;
    let input: MeanVarianceInput = serde_json::from_str(json).unwrap();
    assert_eq!(input.risk_free_rate, dec!(0.02));
    let out = optimize_portfolio(&input).unwrap();
    assert_eq!(out.result.objective, Objective::MinVolatility);
    assert!((out.result.weights[0].weight - dec!(0.25)).abs() < dec!(0.000001));
    assert!(out.result.efficient_frontier.is_none());
}

#[test]
fn test_optimize_rejects_infeasible_bounds() {
    let input = MeanVarianceInput {
        asset_names: vec!["A".into(), "B".into()],
        expected_returns: vec![dec!(0.1), dec!(0.2)],
        covariance_matrix: vec![vec![dec!(0.04), dec!(0)], vec![dec!(0), dec!(0.09)]],
        risk_free_rate: dec!(0.02),
        bounds: WeightBounds::uniform(Decimal::ZERO, dec!(0.3)),
        objective: Objective::MaxSharpe,
        frontier_points: None,
        covariance_ridge: DEFAULT_COVARIANCE_RIDGE,
        solver: SolverSettings::default(),
    };
    assert!(matches!(
        optimize_portfolio(&input),
        Err(PortfolioError::InvalidInput { .. })
    ));
}
