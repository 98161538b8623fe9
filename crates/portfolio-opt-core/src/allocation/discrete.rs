use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{AllocationMethod, AllocationSettings};
use crate::error::PortfolioError;
use crate::linalg::sqrt_decimal;
use crate::types::{with_metadata, AssetWeight, ComputationOutput, Money, PriceSnapshot, Weight};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to discrete share allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscreteAllocationInput {
    /// Cleaned target weights.
    pub weights: Vec<AssetWeight>,
    /// Latest price per share for every asset with positive weight.
    #[serde(default)]
    pub prices: PriceSnapshot,
    /// Cash available; a missing budget is rejected as non-positive.
    #[serde(default)]
    pub budget: Money,
    #[serde(default)]
    pub settings: AllocationSettings,
}

/// Integer holding of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatedPosition {
    pub asset: String,
    pub shares: u64,
    pub price: Money,
    /// shares × price
    pub value: Money,
    /// Target weight, normalized over positive weights.
    pub target_weight: Weight,
    /// value / total spent
    pub realized_weight: Weight,
}

/// Share counts and leftover cash.
///
/// `spent + leftover == budget` holds exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub method: AllocationMethod,
    pub positions: Vec<AllocatedPosition>,
    pub budget: Money,
    pub spent: Money,
    pub leftover: Money,
    /// sqrt(mean((realized - target)²)) over the allocated assets.
    pub rmse: Decimal,
}

impl AllocationResult {
    /// Shares for `asset`, zero when it received none or is unknown.
    pub fn shares_of(&self, asset: &str) -> u64 {
        self.positions
            .iter()
            .find(|p| p.asset == asset)
            .map(|p| p.shares)
            .unwrap_or(0)
    }
}

/// Working state for one positive-weight asset.
#[derive(Debug, Clone)]
struct Holding {
    asset: String,
    target_weight: Weight,
    target_value: Money,
    price: Money,
    shares: u64,
}

impl Holding {
    fn value(&self) -> Money {
        self.price * Decimal::from(self.shares)
    }

    /// Cash still missing to reach the target; negative when overweight.
    fn deficit(&self) -> Money {
        self.target_value - self.value()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Convert target weights into whole shares within `budget`.
pub fn allocate(
    weights: &[AssetWeight],
    prices: &PriceSnapshot,
    budget: Money,
    settings: &AllocationSettings,
) -> PortfolioResult<AllocationResult> {
    let mut holdings = build_holdings(weights, prices, budget)?;

    floor_allocation(&mut holdings, budget)?;
    let mut leftover = budget - total_value(&holdings);

    if settings.method == AllocationMethod::IntegerProgram {
        let extra = knapsack_extras(&holdings, leftover, settings.max_nodes);
        for idx in extra {
            holdings[idx].shares += 1;
            leftover -= holdings[idx].price;
        }
    }

    let bought = top_up(&mut holdings, &mut leftover);
    debug!(method = ?settings.method, top_up = bought, %leftover, "allocation complete");

    Ok(finish(holdings, budget, settings.method))
}

/// Discrete allocation wrapped in the standard output envelope.
pub fn allocate_shares(
    input: &DiscreteAllocationInput,
) -> PortfolioResult<ComputationOutput<AllocationResult>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let result = allocate(&input.weights, &input.prices, input.budget, &input.settings)?;

    for p in &result.positions {
        if p.shares == 0 {
            warnings.push(format!(
                "{} has target weight {} but received no shares at price {}",
                p.asset,
                p.target_weight.round_dp(4),
                p.price
            ));
        }
    }

    let methodology = match input.settings.method {
        AllocationMethod::IntegerProgram => {
            "Discrete allocation: floor, branch-and-bound residual knapsack, greedy top-up"
        }
        AllocationMethod::Greedy => "Discrete allocation: floor, greedy top-up",
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "budget": input.budget.to_string(),
            "n_assets": input.weights.len(),
            "method": input.settings.method,
            "max_nodes": input.settings.max_nodes,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn build_holdings(
    weights: &[AssetWeight],
    prices: &PriceSnapshot,
    budget: Money,
) -> PortfolioResult<Vec<Holding>> {
    if budget <= Decimal::ZERO {
        return Err(PortfolioError::InvalidInput {
            field: "budget".into(),
            reason: format!("must be positive, got {}", budget),
        });
    }

    let mut seen = BTreeSet::new();
    for w in weights {
        if !seen.insert(w.asset.as_str()) {
            return Err(PortfolioError::InvalidInput {
                field: "weights".into(),
                reason: format!("duplicate asset {}", w.asset),
            });
        }
        if w.weight < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: format!("weights[{}]", w.asset),
                reason: format!("negative weight {} (short positions are not supported)", w.weight),
            });
        }
    }

    let positive: Vec<&AssetWeight> = weights.iter().filter(|w| w.weight > Decimal::ZERO).collect();
    if positive.is_empty() {
        return Err(PortfolioError::EmptyAllocation);
    }
    let weight_sum: Decimal = positive.iter().map(|w| w.weight).sum();

    let mut holdings = Vec::with_capacity(positive.len());
    for w in positive {
        let price = match prices.get(&w.asset) {
            Some(p) if *p > Decimal::ZERO => *p,
            Some(p) => {
                return Err(PortfolioError::InvalidPrice {
                    asset: w.asset.clone(),
                    at: "latest".into(),
                    price: *p,
                })
            }
            None => {
                return Err(PortfolioError::InvalidPrice {
                    asset: w.asset.clone(),
                    at: "latest (missing)".into(),
                    price: Decimal::ZERO,
                })
            }
        };
        let target_weight = w.weight / weight_sum;
        holdings.push(Holding {
            asset: w.asset.clone(),
            target_weight,
            target_value: budget * target_weight,
            price,
            shares: 0,
        });
    }

    if let Some(cheapest) = holdings.iter().min_by(|a, b| a.price.cmp(&b.price)) {
        if cheapest.price > budget {
            return Err(PortfolioError::BudgetTooSmall {
                budget,
                asset: cheapest.asset.clone(),
                cheapest_price: cheapest.price,
            });
        }
    }

    Ok(holdings)
}

/// `floor(target / price)` shares each, then shave the most overweight
/// position while rounding has pushed spend above the budget.
fn floor_allocation(holdings: &mut [Holding], budget: Money) -> PortfolioResult<()> {
    for h in holdings.iter_mut() {
        let units = (h.target_value / h.price).floor();
        h.shares = units.to_u64().ok_or_else(|| PortfolioError::InvalidInput {
            field: format!("prices[{}]", h.asset),
            reason: format!("share count {} out of range", units),
        })?;
    }

    while total_value(holdings) > budget {
        let over = holdings
            .iter_mut()
            .filter(|h| h.shares > 0)
            .min_by(|a, b| a.deficit().cmp(&b.deficit()));
        match over {
            Some(h) => h.shares -= 1,
            None => break,
        }
    }

    debug!(
        spent = %total_value(holdings),
        %budget,
        "floor allocation"
    );
    Ok(())
}

/// While cash remains for any asset, buy one share of the affordable asset
/// furthest below its target. Returns the number of shares bought.
fn top_up(holdings: &mut [Holding], leftover: &mut Money) -> u64 {
    let mut bought = 0;
    loop {
        let pick = holdings
            .iter()
            .enumerate()
            .filter(|(_, h)| h.price <= *leftover)
            .max_by(|(ia, a), (ib, b)| {
                a.deficit()
                    .cmp(&b.deficit())
                    .then_with(|| b.price.cmp(&a.price))
                    .then_with(|| ib.cmp(ia))
            })
            .map(|(i, _)| i);
        match pick {
            Some(i) => {
                holdings[i].shares += 1;
                *leftover -= holdings[i].price;
                bought += 1;
            }
            None => return bought,
        }
    }
}

fn total_value(holdings: &[Holding]) -> Money {
    holdings.iter().map(Holding::value).sum()
}

fn finish(holdings: Vec<Holding>, budget: Money, method: AllocationMethod) -> AllocationResult {
    let spent = total_value(&holdings);
    let leftover = budget - spent;

    let positions: Vec<AllocatedPosition> = holdings
        .into_iter()
        .map(|h| {
            let value = h.value();
            let realized_weight = if spent.is_zero() {
                Decimal::ZERO
            } else {
                value / spent
            };
            AllocatedPosition {
                asset: h.asset,
                shares: h.shares,
                price: h.price,
                value,
                target_weight: h.target_weight,
                realized_weight,
            }
        })
        .collect();

    let sse: Decimal = positions
        .iter()
        .map(|p| {
            let e = p.realized_weight - p.target_weight;
            e * e
        })
        .sum();
    let rmse = sqrt_decimal(sse / Decimal::from(positions.len() as u64));

    AllocationResult {
        method,
        positions,
        budget,
        spent,
        leftover,
        rmse,
    }
}

// ---------------------------------------------------------------------------
// Branch and bound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Item {
    holding: usize,
    value: Money,
    cost: Money,
}

/// Exact 0/1 knapsack over the residual deficits: pick at most one extra
/// share per asset maximizing the deficit covered within `capacity`.
///
/// Items with the same deficit and price are interchangeable, so within such
/// a run only index-order prefixes are explored. When the node budget runs
/// out the best selection recorded so far is kept.
struct Knapsack {
    items: Vec<Item>,
    /// `same_as_prev[k]`: item `k` has the value and cost of item `k - 1`.
    same_as_prev: Vec<bool>,
    capacity: Money,
    max_nodes: u64,
    nodes: u64,
    truncated: bool,
    current: Vec<bool>,
    best: Vec<bool>,
    best_value: Money,
    best_cost: Money,
}

impl Knapsack {
    fn new(mut items: Vec<Item>, capacity: Money, max_nodes: u64) -> Self {
        // Best value density first; ties on the documented order.
        items.sort_by(|a, b| {
            (b.value / b.cost)
                .cmp(&(a.value / a.cost))
                .then_with(|| a.cost.cmp(&b.cost))
                .then_with(|| a.holding.cmp(&b.holding))
        });
        let same_as_prev = items
            .iter()
            .enumerate()
            .map(|(k, item)| {
                k > 0 && items[k - 1].value == item.value && items[k - 1].cost == item.cost
            })
            .collect();
        let len = items.len();
        Self {
            items,
            same_as_prev,
            capacity,
            max_nodes,
            nodes: 0,
            truncated: false,
            current: vec![false; len],
            best: vec![false; len],
            best_value: Decimal::ZERO,
            best_cost: Decimal::ZERO,
        }
    }

    /// LP relaxation: fill greedily by density, taking a fraction of the
    /// first item that does not fit.
    fn bound(&self, from: usize, mut value: Money, mut room: Money) -> Money {
        for item in &self.items[from..] {
            if item.cost <= room {
                room -= item.cost;
                value += item.value;
            } else {
                return value + item.value * room / item.cost;
            }
        }
        value
    }

    /// `prev_taken`: whether item `k - 1` is in the current selection.
    fn search(&mut self, k: usize, value: Money, cost: Money, prev_taken: bool) {
        if self.nodes >= self.max_nodes {
            self.truncated = true;
            return;
        }
        self.nodes += 1;

        if value > self.best_value || (value == self.best_value && cost < self.best_cost) {
            self.best_value = value;
            self.best_cost = cost;
            self.best.clone_from(&self.current);
        }
        if k == self.items.len() {
            return;
        }
        // Adding items never lowers cost, so an equal bound only matters
        // while a cheaper tie is still possible.
        let bound = self.bound(k, value, self.capacity - cost);
        if bound < self.best_value || (bound == self.best_value && cost >= self.best_cost) {
            return;
        }

        let item = self.items[k];
        let may_take = prev_taken || !self.same_as_prev[k];
        if may_take && cost + item.cost <= self.capacity {
            self.current[k] = true;
            self.search(k + 1, value + item.value, cost + item.cost, true);
            self.current[k] = false;
        }
        self.search(k + 1, value, cost, false)
    }
}

/// Holdings that receive one extra share.
fn knapsack_extras(holdings: &[Holding], capacity: Money, max_nodes: u64) -> Vec<usize> {
    let items: Vec<Item> = holdings
        .iter()
        .enumerate()
        .filter(|(_, h)| h.deficit() > Decimal::ZERO && h.price <= capacity)
        .map(|(i, h)| Item {
            holding: i,
            value: h.deficit(),
            cost: h.price,
        })
        .collect();
    if items.is_empty() {
        return Vec::new();
    }

    let mut ks = Knapsack::new(items, capacity, max_nodes);
    ks.search(0, Decimal::ZERO, Decimal::ZERO, true);
    if ks.truncated {
        warn!(
            max_nodes,
            covered = %ks.best_value,
            "branch and bound hit its node limit; keeping the best selection found"
        );
    } else {
        debug!(
            nodes = ks.nodes,
            covered = %ks.best_value,
            spend = %ks.best_cost,
            "branch and bound finished"
        );
    }

    ks.items
        .iter()
        .zip(ks.best.iter())
        .filter(|(_, chosen)| **chosen)
        .map(|(item, _)| item.holding)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn weights(pairs: &[(&str, Decimal)]) -> Vec<AssetWeight> {
        pairs.iter().map(|(a, w)| AssetWeight::new(*a, *w)).collect()
    }

    fn prices(pairs: &[(&str, Decimal)]) -> PriceSnapshot {
        pairs.iter().map(|(a, p)| (a.to_string(), *p)).collect()
    }

    fn settings(method: AllocationMethod) -> AllocationSettings {
        AllocationSettings {
            method,
            ..Default::default()
        }
    }

    fn assert_budget_identity(r: &AllocationResult) {
        let spent: Decimal = r
            .positions
            .iter()
            .map(|p| p.price * Decimal::from(p.shares))
            .sum();
        assert_eq!(spent + r.leftover, r.budget);
    }

    #[test]
    fn test_locked_two_asset_allocation() {
        let w = weights(&[("A", dec!(0.6)), ("B", dec!(0.4))]);
        let p = prices(&[("A", dec!(100)), ("B", dec!(50))]);
        for method in [AllocationMethod::IntegerProgram, AllocationMethod::Greedy] {
            let r = allocate(&w, &p, dec!(1000), &settings(method)).unwrap();
            assert_eq!(r.shares_of("A"), 6);
            assert_eq!(r.shares_of("B"), 8);
            assert_eq!(r.leftover, Decimal::ZERO);
            assert_eq!(r.rmse, Decimal::ZERO);
        }
    }

    #[test]
    fn test_leftover_below_cheapest_price() {
        let w = weights(&[("A", dec!(0.5)), ("B", dec!(0.3)), ("C", dec!(0.2))]);
        let p = prices(&[("A", dec!(137.21)), ("B", dec!(58.9)), ("C", dec!(23.45))]);
        for method in [AllocationMethod::IntegerProgram, AllocationMethod::Greedy] {
            let r = allocate(&w, &p, dec!(2500), &settings(method)).unwrap();
            assert_budget_identity(&r);
            assert!(r.leftover >= Decimal::ZERO);
            assert!(r.leftover < dec!(23.45));
        }
    }

    #[test]
    fn test_knapsack_beats_naive_top_up() {
        // Floor buys nothing; deficits 50/30/20 at prices 60/45/45.
        // A alone and B + C both cover 50, A spends less.
        let w = weights(&[("A", dec!(0.5)), ("B", dec!(0.3)), ("C", dec!(0.2))]);
        let p = prices(&[("A", dec!(60)), ("B", dec!(45)), ("C", dec!(45))]);
        let r = allocate(&w, &p, dec!(100), &settings(AllocationMethod::IntegerProgram)).unwrap();
        assert_eq!(r.shares_of("A"), 1);
        assert_eq!(r.leftover, dec!(40));
        assert_budget_identity(&r);
    }

    #[test]
    fn test_knapsack_prefers_higher_total_deficit() {
        // Targets 45/40/15. Greedy buys the largest deficit (A at 90);
        // the knapsack covers 40 + 15 with B and C.
        let w = weights(&[("A", dec!(0.45)), ("B", dec!(0.40)), ("C", dec!(0.15))]);
        let p = prices(&[("A", dec!(90)), ("B", dec!(50)), ("C", dec!(50))]);
        let ilp = allocate(&w, &p, dec!(100), &settings(AllocationMethod::IntegerProgram)).unwrap();
        let greedy = allocate(&w, &p, dec!(100), &settings(AllocationMethod::Greedy)).unwrap();
        assert_eq!(greedy.shares_of("A"), 1);
        assert_eq!(ilp.shares_of("B"), 1);
        assert_eq!(ilp.shares_of("C"), 1);
        assert_eq!(ilp.leftover, Decimal::ZERO);
        assert_budget_identity(&ilp);
        assert_budget_identity(&greedy);
    }

    #[test]
    fn test_tie_break_earliest_position_on_equal_price() {
        // targets 30 each: floor gives A1 B1 C2 D1, spend 90, deficits 10/10/0/10
        let w = weights(&[("A", dec!(0.25)), ("B", dec!(0.25)), ("C", dec!(0.25)), ("D", dec!(0.25))]);
        let p = prices(&[("A", dec!(20)), ("B", dec!(20)), ("C", dec!(15)), ("D", dec!(20))]);
        let r = allocate(&w, &p, dec!(120), &settings(AllocationMethod::Greedy)).unwrap();
        // A, B and D tie on deficit and price; A comes first, then 10 is left
        assert_eq!(r.shares_of("A"), 2);
        assert_eq!(r.shares_of("B"), 1);
        assert_eq!(r.shares_of("C"), 2);
        assert_eq!(r.shares_of("D"), 1);
        assert_eq!(r.leftover, dec!(10));
    }

    #[test]
    fn test_tie_break_lowest_price_on_equal_deficit() {
        // targets 25/25/50: floor gives A1 B2 C1, spend 75, deficits 5/5/15.
        // C is out of reach at 35; A and B tie at 5 and B is cheaper.
        let w = weights(&[("A", dec!(0.25)), ("B", dec!(0.25)), ("C", dec!(0.5))]);
        let p = prices(&[("A", dec!(20)), ("B", dec!(10)), ("C", dec!(35))]);
        for method in [AllocationMethod::Greedy, AllocationMethod::IntegerProgram] {
            let r = allocate(&w, &p, dec!(100), &settings(method)).unwrap();
            // Buying A first would leave 5 and stop at A2 B2
            assert_eq!(r.shares_of("A"), 1, "{method:?}");
            assert_eq!(r.shares_of("B"), 4, "{method:?}");
            assert_eq!(r.shares_of("C"), 1, "{method:?}");
            assert_eq!(r.leftover, dec!(5), "{method:?}");
            assert_budget_identity(&r);
        }
    }

    #[test]
    fn test_equal_weights_many_identical_assets() {
        // Every asset targets 25.5 at price 7: floor buys 3 each and the
        // residual 4.5n funds floor(4.5n / 7) extra shares.
        for (n, extra) in [(30usize, 19usize), (40, 25), (60, 38)] {
            let names: Vec<String> = (0..n).map(|i| format!("A{i:02}")).collect();
            let weight = Decimal::ONE / Decimal::from(n as u64);
            let w: Vec<AssetWeight> = names.iter().map(|a| AssetWeight::new(a.as_str(), weight)).collect();
            let p: PriceSnapshot = names.iter().map(|a| (a.clone(), dec!(7))).collect();
            let budget = dec!(25.5) * Decimal::from(n as u64);

            let r = allocate(&w, &p, budget, &settings(AllocationMethod::IntegerProgram)).unwrap();
            assert_budget_identity(&r);
            assert!(r.leftover < dec!(7), "n={n} leftover {}", r.leftover);
            for (i, a) in names.iter().enumerate() {
                let expected = if i < extra { 4 } else { 3 };
                assert_eq!(r.shares_of(a), expected, "n={n} {a}");
            }
        }
    }

    #[test]
    fn test_equal_weights_twenty_five_assets() {
        // target 600 at 130: floor 4 each (13000), 2000 left buys 15 more
        let names: Vec<String> = (0..25).map(|i| format!("S{i:02}")).collect();
        let w: Vec<AssetWeight> = names.iter().map(|a| AssetWeight::new(a.as_str(), dec!(0.04))).collect();
        let p: PriceSnapshot = names.iter().map(|a| (a.clone(), dec!(130))).collect();
        let r = allocate(&w, &p, dec!(15000), &settings(AllocationMethod::IntegerProgram)).unwrap();
        assert_budget_identity(&r);
        assert_eq!(r.leftover, dec!(50));
        let total: u64 = r.positions.iter().map(|p| p.shares).sum();
        assert_eq!(total, 115);
    }

    #[test]
    fn test_unnormalized_weights_are_rescaled() {
        let w = weights(&[("A", dec!(0.3)), ("B", dec!(0.2)), ("Z", Decimal::ZERO)]);
        let p = prices(&[("A", dec!(10)), ("B", dec!(10))]);
        let r = allocate(&w, &p, dec!(100), &settings(AllocationMethod::IntegerProgram)).unwrap();
        assert_eq!(r.shares_of("A"), 6);
        assert_eq!(r.shares_of("B"), 4);
        assert_eq!(r.positions.len(), 2);
    }

    #[test]
    fn test_budget_too_small() {
        let w = weights(&[("A", dec!(0.5)), ("B", dec!(0.5))]);
        let p = prices(&[("A", dec!(500)), ("B", dec!(300))]);
        match allocate(&w, &p, dec!(100), &AllocationSettings::default()) {
            Err(PortfolioError::BudgetTooSmall {
                asset,
                cheapest_price,
                ..
            }) => {
                assert_eq!(asset, "B");
                assert_eq!(cheapest_price, dec!(300));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_allocation() {
        let w = weights(&[("A", Decimal::ZERO)]);
        let p = prices(&[("A", dec!(10))]);
        assert!(matches!(
            allocate(&w, &p, dec!(100), &AllocationSettings::default()),
            Err(PortfolioError::EmptyAllocation)
        ));
    }

    #[test]
    fn test_missing_price() {
        let w = weights(&[("A", dec!(1))]);
        assert!(matches!(
            allocate(&w, &PriceSnapshot::new(), dec!(100), &AllocationSettings::default()),
            Err(PortfolioError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_negative_weight_and_budget_rejected() {
        let p = prices(&[("A", dec!(10)), ("B", dec!(10))]);
        let short = weights(&[("A", dec!(1.2)), ("B", dec!(-0.2))]);
        assert!(matches!(
            allocate(&short, &p, dec!(100), &AllocationSettings::default()),
            Err(PortfolioError::InvalidInput { .. })
        ));
        let long = weights(&[("A", dec!(1))]);
        assert!(matches!(
            allocate(&long, &p, Decimal::ZERO, &AllocationSettings::default()),
            Err(PortfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_node_limit_keeps_best_so_far() {
        // With one node the search records only the empty selection, so
        // the greedy top-up takes A where the full search picks B and C.
        let w = weights(&[("A", dec!(0.45)), ("B", dec!(0.40)), ("C", dec!(0.15))]);
        let p = prices(&[("A", dec!(90)), ("B", dec!(50)), ("C", dec!(50))]);
        let s = AllocationSettings {
            method: AllocationMethod::IntegerProgram,
            max_nodes: 1,
        };
        let r = allocate(&w, &p, dec!(100), &s).unwrap();
        assert_eq!(r.shares_of("A"), 1);
        assert_eq!(r.shares_of("B"), 0);
        assert_eq!(r.leftover, dec!(10));
        assert_budget_identity(&r);
    }

    #[test]
    fn test_envelope_warns_on_unfilled_asset() {
        let input = DiscreteAllocationInput {
            weights: weights(&[("A", dec!(0.9)), ("B", dec!(0.1))]),
            prices: prices(&[("A", dec!(10)), ("B", dec!(95))]),
            budget: dec!(100),
            settings: AllocationSettings::default(),
        };
        let out = allocate_shares(&input).unwrap();
        // The last 10 buys a tenth share of A since B is out of reach
        assert_eq!(out.result.shares_of("A"), 10);
        assert_eq!(out.result.shares_of("B"), 0);
        assert_eq!(out.result.leftover, Decimal::ZERO);
        assert_eq!(out.warnings.len(), 1);
    }
}
