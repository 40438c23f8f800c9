//! Simulation-wide event bus.
//!
//! Components never call observers directly. They emit [`SimEvent`]s into
//! the [`EventBus`], which queues them. The simulation dispatches the
//! queue once the mutating pass is over (end of a tick, or end of an
//! external command), so listeners only ever observe settled state and
//! cannot re-enter the simulation.
//!
//! Subscriptions are keyed by [`EventKind`]. A subscription may also be
//! bound to one entity; those are dropped automatically when the entity
//! is destroyed so no dangling listeners remain.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, SiteId};
use crate::data::{TurretKind, UnitKind};
use crate::math::{fixed_serde, Fixed};

/// Something observable that happened inside the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimEvent {
    /// Ledger total changed.
    BalanceChanged {
        /// New balance.
        balance: i32,
    },
    /// Currency was granted.
    GoldGained {
        /// Amount granted.
        amount: i32,
    },
    /// Currency was spent.
    GoldSpent {
        /// Amount spent.
        amount: i32,
    },
    /// A unit entered the simulation.
    UnitSpawned {
        /// New unit.
        unit: EntityId,
        /// Unit tier.
        kind: UnitKind,
        /// Index of the spawn point used.
        spawn_point: usize,
    },
    /// A unit's health changed.
    UnitHealthChanged {
        /// Affected unit.
        unit: EntityId,
        /// Health after the change.
        current: i32,
        /// Maximum health.
        max: i32,
    },
    /// A unit died and was removed.
    UnitDied {
        /// Dead unit.
        unit: EntityId,
        /// Bounty credited for the kill.
        bounty: i32,
    },
    /// A unit passed its last waypoint and now attacks the base.
    UnitReachedBase {
        /// Arriving unit.
        unit: EntityId,
    },
    /// A unit was removed without dying (external destroy, lifetime cap).
    UnitDespawned {
        /// Removed unit.
        unit: EntityId,
    },
    /// Base health changed.
    BaseHealthChanged {
        /// Health after the change.
        current: i32,
        /// Maximum health.
        max: i32,
    },
    /// Base health reached zero; the simulation is frozen.
    DefenseFailed,
    /// A wave started spawning.
    WaveStarted {
        /// 1-based wave number.
        wave: u32,
    },
    /// Countdown to the next wave progressed.
    CountdownTick {
        /// Seconds remaining.
        #[serde(with = "fixed_serde")]
        remaining: Fixed,
    },
    /// Every configured wave has been released.
    WavesCompleted,
    /// A turret was built.
    TurretConstructed {
        /// New turret.
        turret: EntityId,
        /// Turret tier.
        kind: TurretKind,
        /// Hosting site.
        site: SiteId,
    },
    /// A turret gained a level.
    TurretUpgraded {
        /// Upgraded turret.
        turret: EntityId,
        /// Level after the upgrade.
        level: u8,
    },
    /// A turret was demolished.
    TurretDestroyed {
        /// Removed turret.
        turret: EntityId,
        /// Site it vacated.
        site: SiteId,
    },
    /// A turret released an engagement effect.
    ProjectileFired {
        /// New projectile.
        projectile: EntityId,
        /// Firing turret.
        turret: EntityId,
        /// Bound target.
        target: EntityId,
    },
    /// An engagement effect reached its target.
    ProjectileHit {
        /// Spent projectile.
        projectile: EntityId,
        /// Unit that was hit.
        target: EntityId,
        /// Damage dealt after defense.
        damage: i32,
    },
    /// An engagement effect lost its target before contact.
    ProjectileFizzled {
        /// Spent projectile.
        projectile: EntityId,
    },
}

/// Discriminant of [`SimEvent`] used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// [`SimEvent::BalanceChanged`]
    BalanceChanged,
    /// [`SimEvent::GoldGained`]
    GoldGained,
    /// [`SimEvent::GoldSpent`]
    GoldSpent,
    /// [`SimEvent::UnitSpawned`]
    UnitSpawned,
    /// [`SimEvent::UnitHealthChanged`]
    UnitHealthChanged,
    /// [`SimEvent::UnitDied`]
    UnitDied,
    /// [`SimEvent::UnitReachedBase`]
    UnitReachedBase,
    /// [`SimEvent::UnitDespawned`]
    UnitDespawned,
    /// [`SimEvent::BaseHealthChanged`]
    BaseHealthChanged,
    /// [`SimEvent::DefenseFailed`]
    DefenseFailed,
    /// [`SimEvent::WaveStarted`]
    WaveStarted,
    /// [`SimEvent::CountdownTick`]
    CountdownTick,
    /// [`SimEvent::WavesCompleted`]
    WavesCompleted,
    /// [`SimEvent::TurretConstructed`]
    TurretConstructed,
    /// [`SimEvent::TurretUpgraded`]
    TurretUpgraded,
    /// [`SimEvent::TurretDestroyed`]
    TurretDestroyed,
    /// [`SimEvent::ProjectileFired`]
    ProjectileFired,
    /// [`SimEvent::ProjectileHit`]
    ProjectileHit,
    /// [`SimEvent::ProjectileFizzled`]
    ProjectileFizzled,
}

impl SimEvent {
    /// The subscription key for this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BalanceChanged { .. } => EventKind::BalanceChanged,
            Self::GoldGained { .. } => EventKind::GoldGained,
            Self::GoldSpent { .. } => EventKind::GoldSpent,
            Self::UnitSpawned { .. } => EventKind::UnitSpawned,
            Self::UnitHealthChanged { .. } => EventKind::UnitHealthChanged,
            Self::UnitDied { .. } => EventKind::UnitDied,
            Self::UnitReachedBase { .. } => EventKind::UnitReachedBase,
            Self::UnitDespawned { .. } => EventKind::UnitDespawned,
            Self::BaseHealthChanged { .. } => EventKind::BaseHealthChanged,
            Self::DefenseFailed => EventKind::DefenseFailed,
            Self::WaveStarted { .. } => EventKind::WaveStarted,
            Self::CountdownTick { .. } => EventKind::CountdownTick,
            Self::WavesCompleted => EventKind::WavesCompleted,
            Self::TurretConstructed { .. } => EventKind::TurretConstructed,
            Self::TurretUpgraded { .. } => EventKind::TurretUpgraded,
            Self::TurretDestroyed { .. } => EventKind::TurretDestroyed,
            Self::ProjectileFired { .. } => EventKind::ProjectileFired,
            Self::ProjectileHit { .. } => EventKind::ProjectileHit,
            Self::ProjectileFizzled { .. } => EventKind::ProjectileFizzled,
        }
    }

    /// The entity this event is about, used by entity-bound subscriptions.
    #[must_use]
    pub const fn entity(&self) -> Option<EntityId> {
        match self {
            Self::UnitSpawned { unit, .. }
            | Self::UnitHealthChanged { unit, .. }
            | Self::UnitDied { unit, .. }
            | Self::UnitReachedBase { unit }
            | Self::UnitDespawned { unit } => Some(*unit),
            Self::TurretConstructed { turret, .. }
            | Self::TurretUpgraded { turret, .. }
            | Self::TurretDestroyed { turret, .. }
            | Self::ProjectileFired { turret, .. } => Some(*turret),
            Self::ProjectileHit { target, .. } => Some(*target),
            Self::ProjectileFizzled { projectile } => Some(*projectile),
            _ => None,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Observer callback.
pub type Listener = Box<dyn FnMut(&SimEvent) + Send>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    entity: Option<EntityId>,
    listener: Listener,
}

impl Subscription {
    fn matches(&self, event: &SimEvent) -> bool {
        self.kind.map_or(true, |kind| kind == event.kind())
            && self.entity.map_or(true, |entity| event.entity() == Some(entity))
    }
}

/// Queue of pending events plus the registered listeners.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscriptions: Vec<Subscription>,
    pending: Vec<SimEvent>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        kind: Option<EventKind>,
        entity: Option<EntityId>,
        listener: Listener,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription {
            id,
            kind,
            entity,
            listener,
        });
        id
    }

    /// Listen for every event of one kind.
    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.register(Some(kind), None, Box::new(listener))
    }

    /// Listen for every event.
    pub fn subscribe_all<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.register(None, None, Box::new(listener))
    }

    /// Listen for events of one kind about one entity.
    ///
    /// The subscription is released when the entity is destroyed.
    pub fn subscribe_entity<F>(
        &mut self,
        entity: EntityId,
        kind: EventKind,
        listener: F,
    ) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.register(Some(kind), Some(entity), Box::new(listener))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    /// Drop every subscription bound to `entity`. Returns how many were removed.
    pub fn release_entity(&mut self, entity: EntityId) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.entity != Some(entity));
        before - self.subscriptions.len()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Queue an event for the next dispatch.
    pub fn emit(&mut self, event: SimEvent) {
        self.pending.push(event);
    }

    /// Events queued since the last dispatch.
    #[must_use]
    pub fn pending(&self) -> &[SimEvent] {
        &self.pending
    }

    /// Deliver queued events to listeners in emission order and return them.
    pub fn dispatch(&mut self) -> Vec<SimEvent> {
        let events = std::mem::take(&mut self.pending);
        for event in &events {
            for sub in &mut self.subscriptions {
                if sub.matches(event) {
                    (sub.listener)(event);
                }
            }
        }
        events
    }
}
