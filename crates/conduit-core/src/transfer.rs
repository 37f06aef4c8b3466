//! Per-tick flow decisions and their reconciliation.
//!
//! A transfer happens in three steps so the network can hold only one node
//! mutably at a time:
//!
//! 1. [`TransferEngine::plan`] reads the node and its cache and picks one
//!    target and an amount.
//! 2. The network debits the node, offers the units to the target, and
//!    observes what the target actually accepted.
//! 3. [`TransferEngine::settle`] re-credits any shortfall, records stats, and
//!    invalidates the face if the target was gone.
//!
//! The amount debited always equals the amount credited to the target plus
//! the amount re-credited to the node.

use crate::buffer::Action;
use crate::cache::NeighborKey;
use crate::config::NetworkConfig;
use crate::direction::Direction;
use crate::fixed::{Ticks, Units};
use crate::id::EndpointId;
use crate::node::Node;
use crate::policy::IoType;
use crate::selection::{Candidate, SelectionStrategy};

/// What the engine decided to move this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub direction: Direction,
    pub target: NeighborKey,
    /// Units to debit from the node.
    pub amount: Units,
}

/// A recovered problem with a transfer. Never escalated past the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowIssue {
    /// The cached target no longer existed.
    StaleReference,
    /// The target accepted less than it advertised.
    CapacityMismatch { offered: Units, accepted: Units },
}

/// Result of one tick of flow processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowOutcome {
    /// Units that actually left the node.
    pub moved: Units,
    pub direction: Option<Direction>,
    pub issue: Option<FlowIssue>,
}

/// A pull from an input-only face facing an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullPlan {
    pub direction: Direction,
    pub endpoint: EndpointId,
    pub amount: Units,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEngine {
    rate: Units,
    scan_interval: Ticks,
    strategy: SelectionStrategy,
}

impl TransferEngine {
    pub fn new(rate: Units, scan_interval: Ticks, strategy: SelectionStrategy) -> Self {
        Self {
            rate: rate.max(0),
            scan_interval: scan_interval.max(1),
            strategy,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.transfer_rate,
            config.scan_interval,
            SelectionStrategy::new(config.balance_tolerance),
        )
    }

    pub fn rate(&self) -> Units {
        self.rate
    }

    /// Output faces eligible this tick: output-capable, backed by a fresh
    /// entry with headroom, and not the face resource arrived through during
    /// this same tick.
    pub fn candidates(&self, node: &Node, now: Ticks) -> Vec<Candidate> {
        let policy = node.policy();
        node.cache()
            .entries()
            .filter(|(d, _)| policy.io_type(*d).can_output())
            .filter(|(_, e)| e.is_fresh(now, self.scan_interval) && e.available > 0)
            .filter(|(d, _)| !node.stats().received_during(*d, now))
            .map(|(d, e)| Candidate {
                direction: d,
                effective_priority: i64::from(e.priority) + i64::from(policy.priority(d)),
                load: e.load(),
                available: e.available,
            })
            .collect()
    }

    /// Choose this tick's transfer, if any.
    pub fn plan(&self, node: &Node, now: Ticks) -> Option<TransferPlan> {
        let stored = node.buffer().stored();
        if stored == 0 || self.rate == 0 {
            return None;
        }
        let candidates = self.candidates(node, now);
        let chosen = self.strategy.select(&candidates, now)?;
        let target = node.cache().entry(chosen.direction)?.key;
        let amount = stored.min(chosen.available).min(self.rate);
        (amount > 0).then_some(TransferPlan {
            direction: chosen.direction,
            target,
            amount,
        })
    }

    /// Reconcile a debited transfer. `accepted` is `None` if the target
    /// could not be resolved.
    pub fn settle(
        &self,
        node: &mut Node,
        plan: &TransferPlan,
        debited: Units,
        accepted: Option<Units>,
        now: Ticks,
    ) -> FlowOutcome {
        let (delivered, issue) = match accepted {
            None => {
                node.cache_mut().mark_direction_dirty(plan.direction);
                (0, Some(FlowIssue::StaleReference))
            }
            Some(a) => {
                let a = a.clamp(0, debited);
                let issue = (a < plan.amount).then_some(FlowIssue::CapacityMismatch {
                    offered: plan.amount,
                    accepted: a,
                });
                (a, issue)
            }
        };

        let shortfall = debited - delivered;
        if shortfall > 0 {
            let restored = node.buffer_mut().insert(shortfall, Action::Execute).unwrap_or(0);
            if restored < shortfall {
                tracing::warn!(shortfall, restored, "re-credit did not fit back into the buffer");
            }
        }

        if delivered > 0 {
            node.stats_mut().record_transfer(plan.direction, delivered, now);
            node.cache_mut().note_delivery(plan.direction, delivered);
        }
        if matches!(issue, Some(FlowIssue::CapacityMismatch { .. })) {
            // Advertised headroom was wrong; refresh this face on the next tick.
            node.cache_mut().mark_direction_dirty(plan.direction);
        }

        FlowOutcome {
            moved: delivered,
            direction: Some(plan.direction),
            issue,
        }
    }

    /// Pulls for this tick from endpoints behind input-only faces, bounded in
    /// total by the rate and the node's free space.
    pub fn pull_plans(&self, node: &Node, now: Ticks) -> Vec<PullPlan> {
        let mut budget = self.rate.min(node.buffer().free());
        let mut plans = Vec::new();
        for (d, entry) in node.cache().entries() {
            if budget <= 0 {
                break;
            }
            if node.policy().io_type(d) != IoType::Input
                || !entry.is_fresh(now, self.scan_interval)
            {
                continue;
            }
            let NeighborKey::Endpoint(endpoint) = entry.key else {
                continue;
            };
            let amount = budget.min(entry.stored);
            if amount > 0 {
                budget -= amount;
                plans.push(PullPlan {
                    direction: d,
                    endpoint,
                    amount,
                });
            }
        }
        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ResourceBuffer;
    use crate::cache::TargetInfo;
    use crate::direction::DirectionSet;
    use crate::grid::GridPos;
    use crate::id::NodeId;
    use crate::scheduler::TickPhase;
    use slotmap::SlotMap;

    fn engine(rate: Units) -> TransferEngine {
        TransferEngine::new(rate, 20, SelectionStrategy::new(5))
    }

    fn node(capacity: Units, stored: Units) -> Node {
        let mut n = Node::new(
            GridPos::new(0, 0, 0),
            ResourceBuffer::with_stored(capacity, stored),
            TickPhase(0),
            8,
        );
        n.cache_mut().mark_clean(0, DirectionSet::ALL, true);
        n
    }

    fn peers(count: usize) -> Vec<NodeId> {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        (0..count).map(|_| sm.insert(())).collect()
    }

    fn link(n: &mut Node, d: Direction, key: NeighborKey, stored: Units, available: Units) {
        n.cache_mut().set_entry(
            d,
            Some(TargetInfo {
                key,
                stored,
                available,
                priority: 0,
                refreshed_at: 0,
            }),
        );
    }

    #[test]
    fn empty_buffer_plans_nothing() {
        let ids = peers(1);
        let mut n = node(100, 0);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        assert_eq!(engine(10).plan(&n, 1), None);
    }

    #[test]
    fn amount_is_bounded_by_rate_stock_and_headroom() {
        let ids = peers(1);
        let mut n = node(100, 100);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        assert_eq!(engine(10).plan(&n, 1).unwrap().amount, 10);

        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 4);
        assert_eq!(engine(10).plan(&n, 1).unwrap().amount, 4);

        let mut small = node(100, 3);
        link(&mut small, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        assert_eq!(engine(10).plan(&small, 1).unwrap().amount, 3);
    }

    #[test]
    fn input_and_disabled_faces_are_not_candidates() {
        let ids = peers(2);
        let mut n = node(100, 50);
        link(&mut n, Direction::Up, NeighborKey::Peer(ids[0]), 0, 100);
        link(&mut n, Direction::Down, NeighborKey::Peer(ids[1]), 0, 100);
        n.policy_mut().set_type(Direction::Up, IoType::Input);
        n.policy_mut().set_type(Direction::Down, IoType::Disabled);
        assert!(engine(10).candidates(&n, 1).is_empty());
    }

    #[test]
    fn stale_and_full_targets_are_skipped() {
        let ids = peers(2);
        let mut n = node(100, 50);
        link(&mut n, Direction::Up, NeighborKey::Peer(ids[0]), 0, 100);
        link(&mut n, Direction::Down, NeighborKey::Peer(ids[1]), 100, 0);
        assert!(engine(10).candidates(&n, 20).is_empty(), "refreshed at 0, stale at 20");
        assert_eq!(engine(10).candidates(&n, 19).len(), 1);
    }

    #[test]
    fn backflow_face_is_skipped_same_tick() {
        let ids = peers(1);
        let mut n = node(100, 0);
        link(&mut n, Direction::West, NeighborKey::Peer(ids[0]), 90, 10);
        n.receive(10, Action::Execute, Direction::West, 5).unwrap();
        assert!(engine(10).candidates(&n, 5).is_empty());
        assert_eq!(engine(10).candidates(&n, 6).len(), 1);
    }

    #[test]
    fn picks_less_loaded_peer() {
        let ids = peers(2);
        let mut n = node(100, 100);
        link(&mut n, Direction::North, NeighborKey::Peer(ids[0]), 80, 20);
        link(&mut n, Direction::South, NeighborKey::Peer(ids[1]), 10, 90);
        let plan = engine(10).plan(&n, 0).unwrap();
        assert_eq!(plan.direction, Direction::South);
        assert_eq!(plan.target, NeighborKey::Peer(ids[1]));
    }

    #[test]
    fn settle_full_acceptance() {
        let ids = peers(1);
        let eng = engine(10);
        let mut n = node(100, 100);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        let plan = eng.plan(&n, 1).unwrap();
        let debited = n.buffer_mut().extract(plan.amount, Action::Execute).unwrap();

        let outcome = eng.settle(&mut n, &plan, debited, Some(debited), 1);
        assert_eq!(outcome.moved, 10);
        assert_eq!(outcome.issue, None);
        assert_eq!(n.buffer().stored(), 90);
        assert_eq!(n.cache().entry(Direction::East).unwrap().available, 90);
        assert_eq!(n.stats().direction(Direction::East).transfer_count, 1);
    }

    #[test]
    fn settle_partial_acceptance_recredits() {
        let ids = peers(1);
        let eng = engine(10);
        let mut n = node(100, 100);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        let plan = eng.plan(&n, 1).unwrap();
        let debited = n.buffer_mut().extract(plan.amount, Action::Execute).unwrap();

        let outcome = eng.settle(&mut n, &plan, debited, Some(3), 1);
        assert_eq!(outcome.moved, 3);
        assert_eq!(
            outcome.issue,
            Some(FlowIssue::CapacityMismatch { offered: 10, accepted: 3 })
        );
        assert_eq!(n.buffer().stored(), 97);
        assert!(n.cache().dirty_directions().contains(Direction::East));
    }

    #[test]
    fn settle_vanished_target_recredits_everything() {
        let ids = peers(1);
        let eng = engine(10);
        let mut n = node(100, 100);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        let plan = eng.plan(&n, 1).unwrap();
        let debited = n.buffer_mut().extract(plan.amount, Action::Execute).unwrap();

        let outcome = eng.settle(&mut n, &plan, debited, None, 1);
        assert_eq!(outcome.moved, 0);
        assert_eq!(outcome.issue, Some(FlowIssue::StaleReference));
        assert_eq!(n.buffer().stored(), 100);
        assert!(n.cache().entry(Direction::East).is_none());
        assert!(n.cache().needs_refresh());
    }

    #[test]
    fn settle_clamps_overreported_acceptance() {
        let ids = peers(1);
        let eng = engine(10);
        let mut n = node(100, 100);
        link(&mut n, Direction::East, NeighborKey::Peer(ids[0]), 0, 100);
        let plan = eng.plan(&n, 1).unwrap();
        let debited = n.buffer_mut().extract(plan.amount, Action::Execute).unwrap();

        let outcome = eng.settle(&mut n, &plan, debited, Some(500), 1);
        assert_eq!(outcome.moved, 10);
        assert_eq!(n.buffer().stored(), 90);
    }

    #[test]
    fn pulls_only_from_input_faces_facing_endpoints() {
        let mut eps = SlotMap::<EndpointId, ()>::with_key();
        let ep = eps.insert(());
        let ids = peers(1);
        let mut n = node(100, 95);
        link(&mut n, Direction::Down, NeighborKey::Endpoint(ep), 500, 0);
        link(&mut n, Direction::Up, NeighborKey::Peer(ids[0]), 500, 0);
        n.policy_mut().set_type(Direction::Up, IoType::Input);

        assert!(engine(10).pull_plans(&n, 1).is_empty(), "Down is Both, Up is a peer");

        n.policy_mut().set_type(Direction::Down, IoType::Input);
        let plans = engine(10).pull_plans(&n, 1);
        assert_eq!(
            plans,
            vec![PullPlan {
                direction: Direction::Down,
                endpoint: ep,
                amount: 5,
            }]
        );
    }
}
