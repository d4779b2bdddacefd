//! Mob entities and AI.
//!
//! Each mob runs a 3-state machine (`Idle -> Chase -> Attack`) advanced on
//! the server's fixed mob tick. Transitions use a hysteresis band: a mob
//! acquires a target at `sight` but only loses it beyond `1.5 * sight`, so
//! the two thresholds can never flap against each other. Movement and attack
//! pacing are gated by a per-mob cooldown independent of the tick rate; mobs
//! move slower than they think.
//!
//! Mobs are transient: not persisted, and removed for good on death.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::tiles;

/// Target passed to the AI when no player is in aggro range. Far enough that
/// every distance check fails, which drives the state machine back to idle.
pub const FAR_AWAY: Vec2 = Vec2::new(-9999.0, -9999.0);

/// Chase entry radius for hostile mobs, in tiles.
pub const DEFAULT_SIGHT_RADIUS: f32 = 8.0;

/// Radius within which the server starts feeding a mob real player targets.
pub const AGGRO_RADIUS: f32 = 24.0;

/// Melee range, in tiles.
pub const MELEE_RADIUS: f32 = 1.5;

/// Chase is abandoned beyond `sight * LEASH_FACTOR`.
pub const LEASH_FACTOR: f32 = 1.5;

/// Chance per mob tick that an idle mob wanders one tile.
const WANDER_CHANCE: f64 = 0.05;

/// AI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobAiState {
    Idle,
    Chase,
    Attack,
}

/// What a mob did during one AI step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobStep {
    None,
    Moved,
    /// Landed a melee swing; the server resolves damage against the target.
    Attacked,
}

/// Static stats for a mob kind.
#[derive(Debug, Clone, Copy)]
pub struct MobTemplate {
    pub name: &'static str,
    pub glyph: char,
    pub color: char,
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub sight_radius: f32,
    /// Seconds between movement steps (and melee swings).
    pub move_delay: f32,
}

/// Hostile dungeon dwellers.
pub const ORC: MobTemplate = MobTemplate {
    name: "Orc",
    glyph: tiles::ORC,
    color: 'R',
    hp: 40,
    attack: 7,
    defense: 2,
    sight_radius: DEFAULT_SIGHT_RADIUS,
    move_delay: 0.8,
};

pub const GOBLIN: MobTemplate = MobTemplate {
    name: "Goblin",
    glyph: tiles::GOBLIN,
    color: 'g',
    hp: 30,
    attack: 5,
    defense: 0,
    sight_radius: DEFAULT_SIGHT_RADIUS,
    move_delay: 0.6,
};

pub const SKELETON: MobTemplate = MobTemplate {
    name: "Skeleton",
    glyph: tiles::SKELETON,
    color: 'w',
    hp: 25,
    attack: 6,
    defense: 1,
    sight_radius: DEFAULT_SIGHT_RADIUS,
    move_delay: 1.0,
};

pub const SPIDER: MobTemplate = MobTemplate {
    name: "Spider",
    glyph: tiles::SPIDER,
    color: 'D',
    hp: 15,
    attack: 4,
    defense: 0,
    sight_radius: DEFAULT_SIGHT_RADIUS,
    move_delay: 0.4,
};

/// Passive wilderness animals: zero sight radius, so the FSM never leaves
/// idle; they just wander.
pub const DEER: MobTemplate = MobTemplate {
    name: "Deer",
    glyph: tiles::DEER,
    color: 'u',
    hp: 10,
    attack: 0,
    defense: 0,
    sight_radius: 0.0,
    move_delay: 1.0,
};

pub const SHEEP: MobTemplate = MobTemplate {
    name: "Sheep",
    glyph: tiles::SHEEP,
    color: 'w',
    hp: 10,
    attack: 0,
    defense: 0,
    sight_radius: 0.0,
    move_delay: 1.2,
};

pub const COW: MobTemplate = MobTemplate {
    name: "Cow",
    glyph: tiles::COW,
    color: 'w',
    hp: 14,
    attack: 0,
    defense: 1,
    sight_radius: 0.0,
    move_delay: 1.5,
};

pub const RABBIT: MobTemplate = MobTemplate {
    name: "Rabbit",
    glyph: tiles::RABBIT,
    color: 'w',
    hp: 5,
    attack: 0,
    defense: 0,
    sight_radius: 0.0,
    move_delay: 0.5,
};

pub const HOSTILE_POOL: [MobTemplate; 4] = [ORC, GOBLIN, SKELETON, SPIDER];
pub const ANIMAL_POOL: [MobTemplate; 4] = [DEER, SHEEP, COW, RABBIT];

/// Wire view of a mob, broadcast in `MobUpdate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MobState {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub glyph: char,
    pub color: char,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub state: MobAiState,
}

/// A live mob.
#[derive(Debug, Clone)]
pub struct Mob {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub glyph: char,
    pub color: char,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub sight_radius: f32,
    pub move_delay: f32,
    pub state: MobAiState,
    since_action: f32,
}

impl Mob {
    pub fn from_template(id: u64, x: i32, y: i32, t: &MobTemplate) -> Self {
        Self {
            id,
            x,
            y,
            glyph: t.glyph,
            color: t.color,
            name: t.name.to_string(),
            hp: t.hp,
            max_hp: t.hp,
            attack: t.attack,
            defense: t.defense,
            sight_radius: t.sight_radius,
            move_delay: t.move_delay,
            state: MobAiState::Idle,
            since_action: 0.0,
        }
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }

    pub fn wire_state(&self) -> MobState {
        MobState {
            id: self.id,
            x: self.x,
            y: self.y,
            glyph: self.glyph,
            color: self.color,
            name: self.name.clone(),
            hp: self.hp,
            max_hp: self.max_hp,
            state: self.state,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    /// Advances the state machine by `dt` seconds against a target position.
    ///
    /// Passing [`FAR_AWAY`] fails every range check and walks the FSM back
    /// to idle over at most two steps.
    pub fn ai_step<W>(&mut self, target: Vec2, dt: f32, walkable: W) -> MobStep
    where
        W: Fn(i32, i32) -> bool,
    {
        self.since_action += dt;
        let dist = self.pos().dist(target);

        match self.state {
            MobAiState::Idle => {
                if self.sight_radius > 0.0 && dist <= self.sight_radius {
                    self.state = MobAiState::Chase;
                }
                MobStep::None
            }
            MobAiState::Chase => {
                if dist > self.sight_radius * LEASH_FACTOR {
                    self.state = MobAiState::Idle;
                    MobStep::None
                } else if dist < MELEE_RADIUS {
                    self.state = MobAiState::Attack;
                    MobStep::None
                } else {
                    self.step_toward(target, walkable)
                }
            }
            MobAiState::Attack => {
                if dist >= MELEE_RADIUS {
                    self.state = MobAiState::Chase;
                    MobStep::None
                } else if self.cooldown_ready() {
                    self.since_action = 0.0;
                    MobStep::Attacked
                } else {
                    MobStep::None
                }
            }
        }
    }

    /// One random wander step for idle mobs. Uses the gameplay RNG; the
    /// terrain stream is never consumed after generation.
    pub fn wander<W, R>(&mut self, rng: &mut R, walkable: W) -> MobStep
    where
        W: Fn(i32, i32) -> bool,
        R: Rng,
    {
        if self.state != MobAiState::Idle || !self.cooldown_ready() {
            return MobStep::None;
        }
        if rng.gen_bool(1.0 - WANDER_CHANCE) {
            return MobStep::None;
        }
        let dx = rng.gen_range(-1..=1);
        let dy = rng.gen_range(-1..=1);
        if (dx, dy) == (0, 0) || !walkable(self.x + dx, self.y + dy) {
            return MobStep::None;
        }
        self.x += dx;
        self.y += dy;
        self.since_action = 0.0;
        MobStep::Moved
    }

    fn cooldown_ready(&self) -> bool {
        self.since_action >= self.move_delay
    }

    fn step_toward<W>(&mut self, target: Vec2, walkable: W) -> MobStep
    where
        W: Fn(i32, i32) -> bool,
    {
        if !self.cooldown_ready() {
            return MobStep::None;
        }

        let dx = (target.x - self.x as f32).signum() as i32;
        let dy = (target.y - self.y as f32).signum() as i32;

        // Diagonal first, then each axis.
        let candidates = [(dx, dy), (dx, 0), (0, dy)];
        for (cx, cy) in candidates {
            if (cx, cy) == (0, 0) {
                continue;
            }
            if walkable(self.x + cx, self.y + cy) {
                self.x += cx;
                self.y += cy;
                self.since_action = 0.0;
                return MobStep::Moved;
            }
        }
        MobStep::None
    }
}

/// Melee damage: attack minus defense, never negative.
pub fn melee_damage(attack: i32, defense: i32) -> i32 {
    (attack - defense).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(_x: i32, _y: i32) -> bool {
        true
    }

    fn goblin_at(x: i32, y: i32) -> Mob {
        Mob::from_template(1, x, y, &GOBLIN)
    }

    #[test]
    fn idle_to_chase_at_sight_radius() {
        let mut m = goblin_at(0, 0);
        // Exactly at the radius: acquires.
        m.ai_step(Vec2::new(DEFAULT_SIGHT_RADIUS, 0.0), 0.1, open);
        assert_eq!(m.state, MobAiState::Chase);
    }

    #[test]
    fn idle_stays_idle_beyond_sight() {
        let mut m = goblin_at(0, 0);
        m.ai_step(Vec2::new(DEFAULT_SIGHT_RADIUS + 0.1, 0.0), 0.1, open);
        assert_eq!(m.state, MobAiState::Idle);
    }

    #[test]
    fn chase_holds_inside_leash_band() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Chase;
        // Inside (sight, 1.5*sight]: keeps chasing, never re-idles.
        let band = DEFAULT_SIGHT_RADIUS * LEASH_FACTOR;
        m.ai_step(Vec2::new(band, 0.0), 0.0, open);
        assert_eq!(m.state, MobAiState::Chase);
    }

    #[test]
    fn chase_to_idle_beyond_leash() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Chase;
        let beyond = DEFAULT_SIGHT_RADIUS * LEASH_FACTOR + 0.1;
        m.ai_step(Vec2::new(beyond, 0.0), 0.0, open);
        assert_eq!(m.state, MobAiState::Idle);
    }

    #[test]
    fn chase_to_attack_in_melee() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Chase;
        m.ai_step(Vec2::new(1.0, 0.0), 0.0, open);
        assert_eq!(m.state, MobAiState::Attack);
    }

    #[test]
    fn attack_back_to_chase_when_target_steps_out() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Attack;
        m.ai_step(Vec2::new(MELEE_RADIUS, 0.0), 0.0, open);
        assert_eq!(m.state, MobAiState::Chase);
    }

    #[test]
    fn far_away_sentinel_forces_idle() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Attack;
        m.ai_step(FAR_AWAY, 0.0, open);
        assert_eq!(m.state, MobAiState::Chase);
        m.ai_step(FAR_AWAY, 0.0, open);
        assert_eq!(m.state, MobAiState::Idle);
    }

    #[test]
    fn movement_waits_for_cooldown() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Chase;
        let target = Vec2::new(5.0, 0.0);

        // Not enough accumulated time: thinks but does not move.
        assert_eq!(m.ai_step(target, 0.1, open), MobStep::None);
        assert_eq!((m.x, m.y), (0, 0));

        // Cooldown elapsed: one step toward the target.
        assert_eq!(m.ai_step(target, m.move_delay, open), MobStep::Moved);
        assert_eq!((m.x, m.y), (1, 0));
    }

    #[test]
    fn blocked_diagonal_falls_back_to_axis() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Chase;
        // Only horizontal moves allowed.
        let walls = |_x: i32, y: i32| y == 0;
        m.ai_step(Vec2::new(5.0, 5.0), 10.0, walls);
        assert_eq!((m.x, m.y), (1, 0));
    }

    #[test]
    fn attack_swing_respects_cooldown() {
        let mut m = goblin_at(0, 0);
        m.state = MobAiState::Attack;
        let target = Vec2::new(1.0, 0.0);

        assert_eq!(m.ai_step(target, 0.0, open), MobStep::None);
        assert_eq!(m.ai_step(target, m.move_delay, open), MobStep::Attacked);
    }

    #[test]
    fn damage_formula_clamps_at_zero() {
        assert_eq!(melee_damage(5, 2), 3);
        assert_eq!(melee_damage(2, 5), 0);
        assert_eq!(melee_damage(4, 4), 0);
    }

    #[test]
    fn animals_never_acquire_targets() {
        let mut m = Mob::from_template(2, 0, 0, &DEER);
        m.ai_step(Vec2::new(1.0, 0.0), 1.0, open);
        assert_eq!(m.state, MobAiState::Idle);
    }
}
