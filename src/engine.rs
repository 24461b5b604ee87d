//! GateEngine – the single owned context behind every gate operation.
//!
//! The engine owns the active-gate registry, the spatial index, in-flight
//! animations and the deferred save queue. Nothing else holds a mutable
//! alias to gate state; every mutation funnels through the methods below and
//! runs on whichever thread calls [`GateEngine::tick`].

use crate::animation::{Animation, Step};
use crate::error::{GateError, GateResult};
use crate::gate::{validate_box, Gate, GateRegistry, GateState};
use crate::index::SpatialIndex;
use crate::integrity;
use crate::links::MechanismLinks;
use crate::obstruction::{first_obstruction, target_footprint};
use crate::protocol::{
    BreakOutcome, ExplosionOutcome, GateCreated, GateRemoved, RemovalReason, TickEvents,
    TransitionCommitted,
};
use crate::scheduler::SaveScheduler;
use crate::store::GateStore;
use crate::types::{
    Actor, BlockPos, BlockState, EngineConfig, EngineStats, GateId, GateType, MechanismLink,
};
use crate::world::BlockWorld;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Decides whether an actor may modify a gate.
pub trait AccessPolicy: Send + Sync {
    fn can_modify(&self, actor: &Actor, gate: &Gate) -> bool;
}

/// Owners and admins may modify a gate; nobody else.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerPolicy;

impl AccessPolicy for OwnerPolicy {
    fn can_modify(&self, actor: &Actor, gate: &Gate) -> bool {
        actor.is_admin || actor.id == gate.owner()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GateEngine {
    config: EngineConfig,
    world: Arc<dyn BlockWorld>,
    store: Arc<dyn GateStore>,
    policy: Box<dyn AccessPolicy>,
    gates: GateRegistry,
    index: SpatialIndex,
    animations: HashMap<GateId, Animation>,
    saves: SaveScheduler,
    links: MechanismLinks,
    tick_count: u64,
}

impl GateEngine {
    pub fn new(config: EngineConfig, world: Arc<dyn BlockWorld>, store: Arc<dyn GateStore>) -> Self {
        let saves = SaveScheduler::new(config.save_delay_ticks);
        let links = MechanismLinks::new(config.link_radius);
        Self {
            config,
            world,
            store,
            policy: Box::new(OwnerPolicy),
            gates: GateRegistry::new(),
            index: SpatialIndex::new(),
            animations: HashMap::new(),
            saves,
            links,
            tick_count: 0,
        }
    }

    /// Replace the default owner-or-admin policy.
    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &Arc<dyn BlockWorld> {
        &self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // -----------------------------------------------------------------------
    // Creation & removal
    // -----------------------------------------------------------------------

    /// Capture the blocks between two corners as a new, closed gate.
    pub fn create_gate(
        &mut self,
        actor: &Actor,
        world: &str,
        corner1: BlockPos,
        corner2: BlockPos,
        gate_type: GateType,
    ) -> GateResult<GateCreated> {
        let bounds = validate_box(corner1, corner2, gate_type)?;
        let volume = bounds.volume();
        if volume > i64::try_from(self.config.max_gate_volume).unwrap_or(i64::MAX) {
            return Err(GateError::TooLarge {
                volume,
                max: self.config.max_gate_volume,
            });
        }
        if let Some(pos) = bounds
            .positions()
            .find(|pos| self.index.gate_at(world, *pos).is_some())
        {
            return Err(GateError::AreaOccupied(pos));
        }

        let blocks: BTreeMap<BlockPos, BlockState> = bounds
            .positions()
            .filter_map(|pos| {
                let state = self.world.block_at(world, pos);
                (!state.is_passable_for_gate()).then_some((pos, state))
            })
            .collect();

        let gate = Gate::new(
            Uuid::new_v4(),
            actor.id,
            world,
            corner1,
            corner2,
            gate_type,
            blocks,
        )?;
        let gate_id = gate.id();
        let blocks_captured = gate.blocks().len();

        self.index
            .replace(gate_id, world, gate.footprint())
            .map_err(|conflict| GateError::AreaOccupied(conflict.pos))?;
        self.gates.insert(gate);
        self.save_now(gate_id);

        info!(
            "Created {} gate {} in '{}' ({} blocks)",
            gate_type, gate_id, world, blocks_captured
        );
        Ok(GateCreated {
            gate_id,
            blocks_captured,
        })
    }

    /// Remove a gate and write its original blocks back to the closed
    /// footprint.
    pub fn remove_gate(&mut self, actor: &Actor, id: GateId) -> GateResult<()> {
        let gate = self.gates.get(id).ok_or(GateError::NotFound(id))?;
        if gate.is_animating() {
            return Err(GateError::Busy);
        }
        if !self.policy.can_modify(actor, gate) {
            return Err(GateError::Unauthorized);
        }
        self.check_integrity(id)?;

        if let Some(gate) = self.teardown(id, RemovalReason::Removed) {
            self.restore_blocks(&gate);
        }
        Ok(())
    }

    /// Unregister a gate without touching the world.
    pub fn force_remove(&mut self, id: GateId) -> GateResult<()> {
        self.teardown(id, RemovalReason::Forced)
            .map(|_| ())
            .ok_or(GateError::NotFound(id))
    }

    // -----------------------------------------------------------------------
    // Toggling
    // -----------------------------------------------------------------------

    /// Start opening or closing a gate on behalf of `actor`.
    ///
    /// Returns the state the gate entered: `Opening`/`Closing` for moving
    /// gates, `Open`/`Closed` for static ones.
    pub fn toggle(&mut self, actor: &Actor, id: GateId) -> GateResult<GateState> {
        self.toggle_gate(id, Some(actor))
    }

    /// Toggle whichever gate occupies `pos`.
    pub fn toggle_at(
        &mut self,
        actor: &Actor,
        world: &str,
        pos: BlockPos,
    ) -> GateResult<(GateId, GateState)> {
        let id = self
            .index
            .gate_at(world, pos)
            .ok_or(GateError::NoGateAt(pos))?;
        self.toggle_gate(id, Some(actor)).map(|state| (id, state))
    }

    /// Toggle the gate a used lever or button is linked to.
    ///
    /// Linked mechanisms operate their gate without an ownership check.
    pub fn mechanism_used(&mut self, world: &str, pos: BlockPos) -> GateResult<(GateId, GateState)> {
        let id = MechanismLinks::find_gate_for(self.gates.iter(), world, pos)
            .ok_or(GateError::NotLinked)?;
        self.toggle_gate(id, None).map(|state| (id, state))
    }

    fn toggle_gate(&mut self, id: GateId, actor: Option<&Actor>) -> GateResult<GateState> {
        let gate = self.gates.get(id).ok_or(GateError::NotFound(id))?;
        if gate.is_animating() {
            debug!("Toggle of gate {} rejected: already moving", id);
            return Err(GateError::Busy);
        }
        if let Some(actor) = actor {
            if !self.policy.can_modify(actor, gate) {
                debug!("Toggle of gate {} rejected: {} is not allowed", id, actor.id);
                return Err(GateError::Unauthorized);
            }
        }

        self.check_integrity(id)?;

        let gate = self.gates.get(id).ok_or(GateError::NotFound(id))?;
        if gate.geometry().is_static() {
            return self.switch_static(id);
        }

        let target = target_footprint(gate);
        let blocked = first_obstruction(gate, self.world.as_ref())
            .or_else(|| {
                self.index
                    .conflict(id, gate.world(), &target)
                    .map(|conflict| conflict.pos)
            })
            .or_else(|| self.inbound_conflict(id, gate.world(), &target));
        if let Some(pos) = blocked {
            debug!("Toggle of gate {} rejected: path blocked at {}", id, pos);
            return Err(GateError::Obstructed(pos));
        }

        let animation = Animation::start(gate, self.world.as_ref(), self.config.animation_ticks);
        let Some(gate) = self.gates.get_mut(id) else {
            animation.discard(self.world.as_ref());
            return Err(GateError::NotFound(id));
        };
        gate.begin_transition();
        let state = gate.state();
        self.animations.insert(id, animation);

        debug!("Gate {} is {:?}", id, state);
        Ok(state)
    }

    /// First position another in-flight swing is about to land on.
    fn inbound_conflict(
        &self,
        id: GateId,
        world: &str,
        positions: &[BlockPos],
    ) -> Option<BlockPos> {
        let inbound: Vec<&Animation> = self
            .animations
            .values()
            .filter(|a| a.gate_id() != id && a.world() == world)
            .collect();
        positions
            .iter()
            .find(|pos| inbound.iter().any(|a| a.lands_on(**pos)))
            .copied()
    }

    fn switch_static(&mut self, id: GateId) -> GateResult<GateState> {
        let gate = self.gates.get_mut(id).ok_or(GateError::NotFound(id))?;
        gate.begin_transition();
        gate.finish_transition();
        let state = gate.state();
        self.saves.enqueue(id, self.tick_count);
        debug!("Static gate {} switched to {:?}", id, state);
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Main tick
    // -----------------------------------------------------------------------

    /// Advance every in-flight animation by one step and run a due flush.
    pub fn tick(&mut self) -> TickEvents {
        self.tick_count += 1;
        let mut events = TickEvents::new(self.tick_count);

        let mut ids: Vec<GateId> = self.animations.keys().copied().collect();
        ids.sort();
        for id in ids {
            let step = match self.animations.get_mut(&id) {
                Some(animation) => animation.step(self.world.as_ref()),
                None => continue,
            };
            match step {
                Step::Moving { .. } => events.moving += 1,
                Step::Landed => self.commit(id, &mut events),
            }
        }

        if self.saves.is_due(self.tick_count) {
            events.saved = self.flush_saves();
        }
        events
    }

    /// Land a finished swing, or tear the gate down if its landing cells
    /// are no longer free.
    fn commit(&mut self, id: GateId, events: &mut TickEvents) {
        let Some(animation) = self.animations.remove(&id) else {
            return;
        };
        let world = Arc::clone(&self.world);
        let Some(gate) = self.gates.get(id) else {
            animation.discard(world.as_ref());
            return;
        };

        // The index is replaced before any block is written, so a conflict
        // leaves both the index and the world untouched.
        let indexed = match animation.collision(world.as_ref()) {
            Some(at) => Err(at),
            None => self
                .index
                .replace(id, gate.world(), gate.footprint())
                .map_err(|conflict| conflict.pos),
        };
        if let Err(at) = indexed {
            warn!("Gate {} collided with a block at {} while moving, removing it", id, at);
            animation.discard(world.as_ref());
            let reason = RemovalReason::Collision { at };
            if self.teardown(id, reason).is_some() {
                events.removed.push(GateRemoved { gate_id: id, reason });
            }
            return;
        }

        animation.land(world.as_ref());
        if let Some(gate) = self.gates.get_mut(id) {
            gate.finish_transition();
            debug!("Gate {} committed (open: {})", id, gate.is_open());
            events.committed.push(TransitionCommitted {
                gate_id: id,
                is_open: gate.is_open(),
            });
        }
        self.saves.enqueue(id, self.tick_count);
    }

    // -----------------------------------------------------------------------
    // Mechanism links
    // -----------------------------------------------------------------------

    pub fn link(&mut self, actor: &Actor, id: GateId, pos: BlockPos) -> GateResult<MechanismLink> {
        let gate = self.gates.get_mut(id).ok_or(GateError::NotFound(id))?;
        if !self.policy.can_modify(actor, gate) {
            return Err(GateError::Unauthorized);
        }
        let link = self.links.link(gate, pos, self.world.as_ref())?;
        MechanismLinks::persist(self.store.as_ref(), gate);
        debug!("Linked {:?} at {} to gate {}", link.kind, pos, id);
        Ok(link)
    }

    pub fn unlink(&mut self, actor: &Actor, id: GateId, pos: BlockPos) -> GateResult<()> {
        let gate = self.gates.get_mut(id).ok_or(GateError::NotFound(id))?;
        if !self.policy.can_modify(actor, gate) {
            return Err(GateError::Unauthorized);
        }
        self.links.unlink(gate, pos)?;
        MechanismLinks::persist(self.store.as_ref(), gate);
        debug!("Unlinked {} from gate {}", pos, id);
        Ok(())
    }

    pub fn links_of(&self, id: GateId) -> GateResult<Vec<MechanismLink>> {
        let gate = self.gates.get(id).ok_or(GateError::NotFound(id))?;
        Ok(gate
            .links()
            .iter()
            .map(|(pos, kind)| MechanismLink {
                pos: *pos,
                kind: *kind,
            })
            .collect())
    }

    /// A linked mechanism was destroyed: open its gate if closed, then drop
    /// the link.
    fn release_mechanism(&mut self, world: &str, pos: BlockPos) -> Option<GateId> {
        let id = MechanismLinks::find_gate_for(self.gates.iter(), world, pos)?;

        let closed = self
            .gates
            .get(id)
            .is_some_and(|gate| !gate.is_open() && !gate.is_animating());
        if closed {
            if let Err(e) = self.toggle_gate(id, None) {
                debug!("Gate {} stayed closed after its mechanism broke: {}", id, e);
            }
        }

        if let Some(gate) = self.gates.get_mut(id) {
            if self.links.unlink(gate, pos).is_ok() {
                MechanismLinks::persist(self.store.as_ref(), gate);
            }
        }
        Some(id)
    }

    // -----------------------------------------------------------------------
    // World events
    // -----------------------------------------------------------------------

    /// React to `actor` breaking the block at `pos`.
    pub fn block_broken(&mut self, actor: &Actor, world: &str, pos: BlockPos) -> BreakOutcome {
        if let Some(gate_id) = self.release_mechanism(world, pos) {
            return BreakOutcome::MechanismReleased { gate_id };
        }

        let Some(gate_id) = self.index.gate_at(world, pos) else {
            return BreakOutcome::Ignored;
        };
        let allowed = self
            .gates
            .get(gate_id)
            .is_some_and(|gate| self.policy.can_modify(actor, gate));
        if !allowed {
            debug!("{} may not break gate {}", actor.id, gate_id);
            return BreakOutcome::Denied { gate_id };
        }

        self.teardown(gate_id, RemovalReason::Broken);
        BreakOutcome::GateDestroyed { gate_id }
    }

    /// React to an explosion destroying every block in `positions`.
    pub fn explosion(&mut self, world: &str, positions: &[BlockPos]) -> ExplosionOutcome {
        let mut outcome = ExplosionOutcome::default();

        for pos in positions {
            if let Some(id) = self.release_mechanism(world, *pos) {
                if !outcome.released.contains(&id) {
                    outcome.released.push(id);
                }
            }
        }

        for pos in positions {
            if let Some(id) = self.index.gate_at(world, *pos) {
                if self.teardown(id, RemovalReason::Exploded).is_some() {
                    outcome.destroyed.push(id);
                }
            }
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Integrity & teardown
    // -----------------------------------------------------------------------

    /// Compare the stored fingerprint with the gate; force-remove on mismatch.
    fn check_integrity(&mut self, id: GateId) -> GateResult<()> {
        // The record is behind the gate until the pending save lands.
        if self.saves.is_pending(id) {
            debug!("Gate {} has a pending save, skipping integrity check", id);
            return Ok(());
        }
        let gate = self.gates.get(id).ok_or(GateError::NotFound(id))?;

        let intact = match self.store.stored_fingerprint(id) {
            Ok(Some(stored)) => integrity::verify(gate, &stored),
            Ok(None) => false,
            Err(e) => {
                error!("Cannot verify gate {}: {}", id, e);
                true
            }
        };
        if intact {
            return Ok(());
        }

        warn!("Gate {} failed integrity check, removing it", id);
        self.teardown(id, RemovalReason::Integrity);
        Err(GateError::IntegrityViolation(id))
    }

    /// Drop every trace of a gate from the engine and the store.
    ///
    /// The world is left as it is; callers restore blocks if they need to.
    fn teardown(&mut self, id: GateId, reason: RemovalReason) -> Option<Gate> {
        if let Some(animation) = self.animations.remove(&id) {
            animation.discard(self.world.as_ref());
        }
        self.index.remove_gate(id);
        self.saves.take(id);
        let gate = self.gates.remove(id)?;

        if let Err(e) = self.store.delete_gate(id) {
            error!("Failed to delete gate {} from store: {}", id, e);
        }
        if reason.restores_blocks() {
            info!("Removed gate {}", id);
        } else {
            info!("Unregistered gate {} ({:?})", id, reason);
        }
        Some(gate)
    }

    fn restore_blocks(&self, gate: &Gate) {
        let world = self.world.as_ref();
        if gate.is_open() {
            for pos in gate.footprint_for(true) {
                world.set_block(gate.world(), pos, BlockState::air());
            }
        }
        for (pos, state) in gate.blocks() {
            world.set_block(gate.world(), *pos, state.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Save one gate right away. A failed save is queued for a retry.
    fn save_now(&mut self, id: GateId) -> bool {
        let Some(gate) = self.gates.get(id) else {
            return false;
        };
        match self.store.save_gate(gate) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save gate {}: {}", id, e);
                self.saves.enqueue(id, self.tick_count);
                false
            }
        }
    }

    /// Save every pending gate once. Returns how many records were written.
    fn flush_saves(&mut self) -> usize {
        self.flush_pending().len()
    }

    /// Save every pending gate once. Returns the ids that were written.
    fn flush_pending(&mut self) -> HashSet<GateId> {
        let mut saved = HashSet::new();
        for id in self.saves.drain() {
            if self.gates.contains(id) && self.save_now(id) {
                saved.insert(id);
            }
        }
        debug!("Flushed {} pending gate saves", saved.len());
        saved
    }

    /// Load every verified record and put the world into the saved state.
    pub fn load_gates(&mut self) -> usize {
        let gates = match self.store.load_all_gates() {
            Ok(gates) => gates,
            Err(e) => {
                error!("Failed to load gates: {}", e);
                return 0;
            }
        };

        let mut loaded = Vec::new();
        for mut gate in gates {
            let id = gate.id();
            if self.gates.contains(id) {
                debug!("Gate {} is already loaded", id);
                continue;
            }
            match self.store.load_links(id) {
                Ok(links) => gate.set_links(links.into_iter().map(|l| (l.pos, l.kind))),
                Err(e) => error!("Failed to load links for gate {}: {}", id, e),
            }
            if let Err(conflict) = self.index.replace(id, gate.world(), gate.footprint()) {
                warn!(
                    "Gate {} overlaps gate {} at {}, skipping",
                    id, conflict.owner, conflict.pos
                );
                continue;
            }
            loaded.push(id);
            self.gates.insert(gate);
        }

        // Every footprint is indexed before any cell is cleared, so one
        // gate never wipes cells another loaded gate owns.
        for id in &loaded {
            if let Some(gate) = self.gates.get(*id) {
                self.place_saved_state(gate);
            }
        }

        info!("Loaded {} gates", loaded.len());
        loaded.len()
    }

    fn place_saved_state(&self, gate: &Gate) {
        let world = self.world.as_ref();
        for pos in gate
            .footprint_for(false)
            .into_iter()
            .chain(gate.footprint_for(true))
        {
            let owner = self.index.gate_at(gate.world(), pos);
            if owner.is_none() || owner == Some(gate.id()) {
                world.set_block(gate.world(), pos, BlockState::air());
            }
        }
        let geometry = gate.geometry();
        for (origin, state) in gate.blocks() {
            let pos = geometry.position_in(*origin, gate.is_open());
            world.set_block(gate.world(), pos, state.clone());
        }
    }

    /// Settle in-flight swings, flush and save everything, then empty the
    /// engine. Returns how many gates were written.
    pub fn shutdown(&mut self) -> usize {
        let mut events = TickEvents::new(self.tick_count);
        let mut ids: Vec<GateId> = self.animations.keys().copied().collect();
        ids.sort();
        for id in ids {
            self.commit(id, &mut events);
        }
        let flushed = self.flush_pending();

        let mut saved = flushed.len();
        for gate in self.gates.iter() {
            if !flushed.contains(&gate.id()) {
                match self.store.save_gate(gate) {
                    Ok(()) => saved += 1,
                    Err(e) => error!("Failed to save gate {} on shutdown: {}", gate.id(), e),
                }
            }
            MechanismLinks::persist(self.store.as_ref(), gate);
        }

        info!(
            "Shutdown: {} swings settled, {} pending saves flushed, {} gates saved",
            events.committed.len() + events.removed.len(),
            flushed.len(),
            saved
        );
        self.clear();
        saved
    }

    /// Remove every gate's blocks from the world and forget all gates.
    ///
    /// Stored records are kept, so a later [`GateEngine::load_gates`]
    /// rebuilds them.
    pub fn purge_world_blocks(&mut self) -> usize {
        self.flush_saves();
        let world = Arc::clone(&self.world);
        for (_, animation) in self.animations.drain() {
            animation.discard(world.as_ref());
        }

        let mut cleared = 0;
        for gate in self.gates.iter() {
            let cells: BTreeSet<BlockPos> = gate
                .footprint_for(false)
                .into_iter()
                .chain(gate.footprint_for(true))
                .collect();
            for pos in cells {
                if !world.block_at(gate.world(), pos).is_air() {
                    world.set_block(gate.world(), pos, BlockState::air());
                    cleared += 1;
                }
            }
        }

        info!("Purged {} gate blocks from {} gates", cleared, self.gates.len());
        self.clear();
        cleared
    }

    fn clear(&mut self) {
        self.gates.clear();
        self.index.clear();
        self.animations.clear();
        self.saves.drain();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn gate(&self, id: GateId) -> Option<&Gate> {
        self.gates.get(id)
    }

    pub fn gate_at(&self, world: &str, pos: BlockPos) -> Option<&Gate> {
        self.index
            .gate_at(world, pos)
            .and_then(|id| self.gates.get(id))
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.iter()
    }

    /// The in-flight swing of a gate, if it is moving.
    pub fn animation(&self, id: GateId) -> Option<&Animation> {
        self.animations.get(&id)
    }

    pub fn is_save_pending(&self, id: GateId) -> bool {
        self.saves.is_pending(id)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_gates: self.gates.len(),
            animating_gates: self.animations.len(),
            indexed_positions: self.index.len(),
            pending_saves: self.saves.len(),
            total_ticks: self.tick_count,
        }
    }
}
