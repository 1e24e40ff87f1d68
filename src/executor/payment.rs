//! Payment Selector
//!
//! Assembles an exact payment coin out of an owner's fragmented units:
//! merge the smallest units needed into one, then split the exact amount
//! off it. The native gas coin short-circuits to a split from the gas
//! object, which is always a single implicit unit.

use std::collections::HashMap;
use tracing::debug;

use super::transaction::{CoinArg, TransactionBuilder};
use crate::cartographer::{OwnedUnit, VenueAdapter};
use crate::coins::CoinRegistry;
use crate::error::TradeError;

/// Where the payment is drawn from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSource {
    /// Split straight from the gas coin
    Gas,
    /// Merge `merged` into `base`, then split from `base`
    Units { base: String, merged: Vec<String> },
}

/// Merge-then-split plan producing one coin of exactly `amount`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPlan {
    pub asset: String,
    pub amount: u64,
    pub source: PaymentSource,
}

impl PaymentPlan {
    /// Units consumed by the plan (base included)
    pub fn units_touched(&self) -> usize {
        match &self.source {
            PaymentSource::Gas => 0,
            PaymentSource::Units { merged, .. } => merged.len() + 1,
        }
    }

    /// Encode the plan; returns the coin holding exactly `amount`
    pub fn apply(&self, tx: &mut TransactionBuilder) -> CoinArg {
        match &self.source {
            PaymentSource::Gas => tx.split(CoinArg::GasCoin, self.amount),
            PaymentSource::Units { base, merged } => {
                let base_arg = CoinArg::Unit(base.clone());
                if !merged.is_empty() {
                    tx.merge(
                        base_arg.clone(),
                        merged.iter().map(|id| CoinArg::Unit(id.clone())).collect(),
                    );
                }
                tx.split(base_arg, self.amount)
            }
        }
    }
}

/// Pure selection over a unit list.
///
/// Units are stably sorted ascending by balance and the shortest prefix
/// reaching `amount` is selected; when the smallest unit already covers
/// the amount no merge is needed.
pub fn select_units(
    asset: &str,
    amount: u64,
    units: &[OwnedUnit],
) -> Result<PaymentPlan, TradeError> {
    if amount == 0 {
        return Err(TradeError::InvalidAmount {
            asset: asset.to_string(),
            amount: 0.0,
        });
    }

    let mut candidates: Vec<&OwnedUnit> = units
        .iter()
        .filter(|u| u.asset == asset && u.balance > 0)
        .collect();

    let available: u128 = candidates.iter().map(|u| u.balance as u128).sum();
    if available < amount as u128 {
        return Err(TradeError::InsufficientBalance {
            asset: asset.to_string(),
            requested: amount,
            available: u64::try_from(available).unwrap_or(u64::MAX),
        });
    }

    // Stable: equal balances keep their input order
    candidates.sort_by_key(|u| u.balance);

    // A lone unit large enough is not preferred over a shorter ascending
    // prefix: [5, 100] for 50 merges both. The one-unit case is just the
    // prefix of length one, which keeps the merge set minimal by count
    // among ascending prefixes.
    let mut running: u128 = 0;
    let mut selected = Vec::new();
    for unit in candidates {
        running += unit.balance as u128;
        selected.push(unit.unit_id.clone());
        if running >= amount as u128 {
            break;
        }
    }

    let base = selected.remove(0);
    Ok(PaymentPlan {
        asset: asset.to_string(),
        amount,
        source: PaymentSource::Units {
            base,
            merged: selected,
        },
    })
}

/// Batch-scoped selector.
///
/// Units are queried once per asset per batch. A plan only reserves its
/// units once `commit` applies it to the local view, so later orders in
/// the same transaction never pick a unit an earlier included order
/// consumed, and a plan that was dropped leaves the view untouched.
pub struct PaymentSelector<'a> {
    adapter: &'a dyn VenueAdapter,
    registry: &'a CoinRegistry,
    owner: &'a str,
    book: HashMap<String, Vec<OwnedUnit>>,
}

impl<'a> PaymentSelector<'a> {
    pub fn new(adapter: &'a dyn VenueAdapter, registry: &'a CoinRegistry, owner: &'a str) -> Self {
        Self {
            adapter,
            registry,
            owner,
            book: HashMap::new(),
        }
    }

    pub async fn select(&mut self, asset: &str, amount: u64) -> Result<PaymentPlan, TradeError> {
        if self.registry.is_native(asset) {
            return Ok(PaymentPlan {
                asset: asset.to_string(),
                amount,
                source: PaymentSource::Gas,
            });
        }

        if !self.book.contains_key(asset) {
            let units = self.adapter.owned_units(self.owner, asset).await?;
            debug!(
                "Fetched {} units of {} for {}",
                units.len(),
                self.registry.symbol(asset),
                self.owner
            );
            self.book.insert(asset.to_string(), units);
        }

        let units = self.book.get(asset).map(Vec::as_slice).unwrap_or_default();
        select_units(asset, amount, units)
    }

    /// Mark a plan's units as spent for the rest of the batch
    pub fn commit(&mut self, plan: &PaymentPlan) {
        if let Some(units) = self.book.remove(&plan.asset) {
            self.book.insert(plan.asset.clone(), consume(units, plan));
        }
    }
}

/// Apply a plan to a unit list: merged units disappear, the base keeps the remainder
fn consume(units: Vec<OwnedUnit>, plan: &PaymentPlan) -> Vec<OwnedUnit> {
    let PaymentSource::Units { base, merged } = &plan.source else {
        return units;
    };

    let pooled: u64 = units
        .iter()
        .filter(|u| &u.unit_id == base || merged.contains(&u.unit_id))
        .map(|u| u.balance)
        .sum();

    units
        .into_iter()
        .filter(|u| !merged.contains(&u.unit_id))
        .map(|mut u| {
            if &u.unit_id == base {
                u.balance = pooled.saturating_sub(plan.amount);
            }
            u
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::paper::{PaperLedger, PaperVenue};
    use crate::cartographer::Venue;
    use crate::coins::NATIVE_COIN_ID;
    use crate::executor::Command;
    use std::sync::Arc;

    fn units(asset: &str, balances: &[u64]) -> Vec<OwnedUnit> {
        balances
            .iter()
            .enumerate()
            .map(|(i, &balance)| OwnedUnit {
                asset: asset.to_string(),
                unit_id: format!("u{}", i),
                balance,
            })
            .collect()
    }

    #[test]
    fn test_merges_smallest_prefix() {
        // 30 + 45 = 75 >= 70; 80 stays untouched
        let plan = select_units("X", 70, &units("X", &[30, 45, 80])).unwrap();
        assert_eq!(
            plan.source,
            PaymentSource::Units {
                base: "u0".into(),
                merged: vec!["u1".into()],
            }
        );

        let mut tx = TransactionBuilder::new("0xme", 0);
        let coin = plan.apply(&mut tx);
        let tx = tx.finish();
        assert_eq!(coin, CoinArg::Result(1));
        assert_eq!(
            tx.commands,
            vec![
                Command::MergeCoins {
                    target: CoinArg::Unit("u0".into()),
                    sources: vec![CoinArg::Unit("u1".into())],
                },
                Command::SplitCoins {
                    coin: CoinArg::Unit("u0".into()),
                    amount: 70,
                },
            ]
        );

        let left = consume(units("X", &[30, 45, 80]), &plan);
        assert_eq!(left.iter().map(|u| u.balance).collect::<Vec<_>>(), vec![5, 80]);
    }

    #[test]
    fn test_insufficient_balance_reports_totals() {
        let err = select_units("X", 50, &units("X", &[10, 10])).unwrap_err();
        assert_eq!(
            err,
            TradeError::InsufficientBalance {
                asset: "X".into(),
                requested: 50,
                available: 20,
            }
        );
    }

    #[test]
    fn test_single_unit_needs_no_merge() {
        let plan = select_units("X", 10, &units("X", &[50, 12, 90])).unwrap();
        assert_eq!(
            plan.source,
            PaymentSource::Units {
                base: "u1".into(),
                merged: vec![],
            }
        );

        let mut tx = TransactionBuilder::new("0xme", 0);
        plan.apply(&mut tx);
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_selection_is_exact_and_minimal() {
        let pools: [&[u64]; 4] = [&[5, 1, 9, 3, 7], &[100], &[2, 2, 2, 2], &[40, 1, 1, 60]];
        for balances in pools {
            let total: u64 = balances.iter().sum();
            let mut sorted = balances.to_vec();
            sorted.sort();

            for target in 1..=total {
                let plan = select_units("X", target, &units("X", balances)).unwrap();
                assert_eq!(plan.amount, target);

                let expected = sorted
                    .iter()
                    .scan(0u64, |acc, b| {
                        *acc += b;
                        Some(*acc)
                    })
                    .position(|sum| sum >= target)
                    .map(|i| i + 1)
                    .unwrap();
                assert_eq!(plan.units_touched(), expected, "target {} in {:?}", target, balances);
            }

            let err = select_units("X", total + 1, &units("X", balances)).unwrap_err();
            assert!(matches!(err, TradeError::InsufficientBalance { available, .. } if available == total));
        }
    }

    #[test]
    fn test_deterministic_with_equal_balances() {
        let list = units("X", &[20, 10, 20, 10]);
        let first = select_units("X", 35, &list).unwrap();
        let second = select_units("X", 35, &list).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.source,
            PaymentSource::Units {
                base: "u1".into(),
                merged: vec!["u3".into(), "u0".into()],
            }
        );
    }

    #[test]
    fn test_ignores_other_assets_and_empty_units() {
        let mut list = units("X", &[0, 40]);
        list.push(OwnedUnit {
            asset: "Y".into(),
            unit_id: "y0".into(),
            balance: 1_000,
        });
        let err = select_units("X", 100, &list).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { available: 40, .. }));
        assert!(select_units("X", 0, &list).is_err());
    }

    fn paper() -> (Arc<PaperLedger>, PaperVenue, Arc<CoinRegistry>) {
        let registry = Arc::new(CoinRegistry::with_defaults());
        let ledger = Arc::new(PaperLedger::new());
        let venue = Venue::new("xy", "paper", "0xpool", "0xa", "0xb");
        let paper = PaperVenue::new(venue, 1.0, 0.0, registry.clone(), ledger.clone());
        (ledger, paper, registry)
    }

    #[tokio::test]
    async fn test_gas_fast_path_skips_lookup() {
        let (_, paper, registry) = paper();
        let mut selector = PaymentSelector::new(&paper, &registry, "0xme");

        let plan = selector.select(NATIVE_COIN_ID, 1_000).await.unwrap();
        assert_eq!(plan.source, PaymentSource::Gas);
        assert_eq!(paper.unit_queries(), 0);
    }

    #[tokio::test]
    async fn test_batch_never_reuses_consumed_units() {
        let (ledger, paper, registry) = paper();
        for balance in [30, 45, 80] {
            ledger.mint("0xme", "0xa", balance).await;
        }
        let mut selector = PaymentSelector::new(&paper, &registry, "0xme");

        let first = selector.select("0xa", 70).await.unwrap();
        assert_eq!(first.units_touched(), 2);
        selector.commit(&first);

        // Remaining view: 5 (base remainder) and 80
        let second = selector.select("0xa", 85).await.unwrap();
        let PaymentSource::Units { base, merged } = &second.source else {
            panic!("expected unit payment");
        };
        assert_eq!(merged.len(), 1);
        assert_eq!(Some(base), first_base(&first).as_ref());
        selector.commit(&second);

        let err = selector.select("0xa", 1).await.unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { available: 0, .. }));
        assert_eq!(paper.unit_queries(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_plan_keeps_units_available() {
        let (ledger, paper, registry) = paper();
        for balance in [30, 45, 80] {
            ledger.mint("0xme", "0xa", balance).await;
        }
        let mut selector = PaymentSelector::new(&paper, &registry, "0xme");

        // Planned but never included in the transaction
        let dropped = selector.select("0xa", 150).await.unwrap();
        assert_eq!(dropped.units_touched(), 3);

        let plan = selector.select("0xa", 155).await.unwrap();
        assert_eq!(plan.units_touched(), 3);
        selector.commit(&plan);

        let err = selector.select("0xa", 1).await.unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { available: 0, .. }));
        assert_eq!(paper.unit_queries(), 1);
    }

    fn first_base(plan: &PaymentPlan) -> Option<String> {
        match &plan.source {
            PaymentSource::Units { base, .. } => Some(base.clone()),
            PaymentSource::Gas => None,
        }
    }
}
