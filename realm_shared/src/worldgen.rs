//! Procedural world generation.
//!
//! Terrain is synthesized from a single seed: a gradient-noise biome field
//! painted per tile, then secondary passes for rivers, chasms, the town
//! (street, plaza, castle with moat, shops, farm, houses), and a bisection
//! dungeon. Every random draw (noise tables, threshold rolls, structure
//! placement, mob spawns) comes from one `StdRng` seeded from the world
//! seed, so the same seed always produces the same world. Runtime gameplay
//! rolls use `thread_rng` elsewhere and never touch this stream.

use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::mob::{Mob, ANIMAL_POOL, HOSTILE_POOL};
use crate::noise::Noise;
use crate::tiles::{self, Tile};

/// Level identifiers generated at boot.
pub const TOWN_LEVEL: &str = "town";
pub const DUNGEON_LEVEL: &str = "dungeon_1";

pub const TOWN_WIDTH: i32 = 400;
pub const TOWN_HEIGHT: i32 = 400;
pub const DUNGEON_WIDTH: i32 = 100;
pub const DUNGEON_HEIGHT: i32 = 100;

/// Bisection depth for the dungeon; leaves under 12 tiles stop splitting.
const DUNGEON_SPLIT_DEPTH: u32 = 4;
const DUNGEON_MIN_LEAF: i32 = 12;

/// Biome classes for the wilderness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Biome {
    Wasteland,
    Temperate,
    Volcanic,
}

/// Three-way threshold classification over the two-octave biome field.
pub fn classify_biome(val: f32) -> Biome {
    if val < -0.3 {
        Biome::Wasteland
    } else if val > 0.4 {
        Biome::Volcanic
    } else {
        Biome::Temperate
    }
}

/// One level's static terrain, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMap {
    pub id: String,
    pub width: i32,
    pub height: i32,
    grid: Vec<Tile>,
}

impl LevelMap {
    pub fn new(id: &str, width: i32, height: i32, fill: Tile) -> Self {
        Self {
            id: id.to_string(),
            width,
            height,
            grid: vec![fill; (width * height) as usize],
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    /// Out-of-bounds reads come back as void.
    pub fn get(&self, x: i32, y: i32) -> Tile {
        if self.in_bounds(x, y) {
            self.grid[(y * self.width + x) as usize]
        } else {
            Tile::VOID
        }
    }

    /// Out-of-bounds writes are dropped.
    pub fn set(&mut self, x: i32, y: i32, tile: Tile) {
        if self.in_bounds(x, y) {
            self.grid[(y * self.width + x) as usize] = tile;
        }
    }

    pub fn walkable(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && tiles::walkable(self.get(x, y).glyph)
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, tile: Tile) {
        for j in y..y + h {
            for i in x..x + w {
                self.set(i, j, tile);
            }
        }
    }

    fn outline_rect(&mut self, x: i32, y: i32, w: i32, h: i32, tile: Tile) {
        for i in 0..w {
            self.set(x + i, y, tile);
            self.set(x + i, y + h - 1, tile);
        }
        for j in 0..h {
            self.set(x, y + j, tile);
            self.set(x + w - 1, y + j, tile);
        }
    }
}

/// Everything generation produces: terrain plus initial mob populations.
pub struct GeneratedWorld {
    pub seed: u64,
    pub levels: HashMap<String, LevelMap>,
    pub mobs: HashMap<String, Vec<Mob>>,
}

impl GeneratedWorld {
    pub fn level(&self, id: &str) -> Option<&LevelMap> {
        self.levels.get(id)
    }

    pub fn walkable(&self, level: &str, x: i32, y: i32) -> bool {
        self.levels.get(level).map_or(false, |l| l.walkable(x, y))
    }
}

/// Generates the full world for a seed.
pub fn generate(seed: u64) -> GeneratedWorld {
    let mut gen = Generator::new(seed);

    let mut levels = HashMap::new();
    let mut mobs = HashMap::new();

    let (town, town_mobs) = gen.generate_town_level();
    levels.insert(TOWN_LEVEL.to_string(), town);
    mobs.insert(TOWN_LEVEL.to_string(), town_mobs);

    let (dungeon, dungeon_mobs) = gen.generate_dungeon_level();
    levels.insert(DUNGEON_LEVEL.to_string(), dungeon);
    mobs.insert(DUNGEON_LEVEL.to_string(), dungeon_mobs);

    GeneratedWorld { seed, levels, mobs }
}

struct Generator {
    rng: StdRng,
    biome_noise: Noise,
    moat_noise: Noise,
    next_mob_id: u64,
}

impl Generator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            biome_noise: Noise::new(seed.wrapping_add(100)),
            moat_noise: Noise::new(seed.wrapping_add(200)),
            next_mob_id: 1,
        }
    }

    fn mob_id(&mut self) -> u64 {
        let id = self.next_mob_id;
        self.next_mob_id += 1;
        id
    }

    fn biome(&self, x: i32, y: i32) -> Biome {
        let scale = 0.05;
        let val = self
            .biome_noise
            .get_2_octaves(x as f32 * scale, y as f32 * scale);
        classify_biome(val)
    }

    // ─── Town level: wilderness + town stamps ───

    fn generate_town_level(&mut self) -> (LevelMap, Vec<Mob>) {
        let mut level = LevelMap::new(TOWN_LEVEL, TOWN_WIDTH, TOWN_HEIGHT, Tile::VOID);

        self.paint_wilderness(&mut level);
        self.carve_rivers(&mut level);
        self.carve_chasms(&mut level);
        self.stamp_town(&mut level);
        let animals = self.spawn_animals(&level);

        (level, animals)
    }

    fn paint_wilderness(&mut self, level: &mut LevelMap) {
        for y in 0..level.height {
            for x in 0..level.width {
                let biome = self.biome(x, y);
                let n: f32 = self.rng.gen();

                let tile = match biome {
                    Biome::Volcanic => {
                        if n > 0.96 {
                            Tile::new(tiles::MOUNTAIN, 'r')
                        } else if n > 0.92 {
                            Tile::new(tiles::LAVA, 'R')
                        } else if n > 0.85 {
                            Tile::new(tiles::BRICK, 'D')
                        } else {
                            Tile::new(tiles::FLOOR, 'D')
                        }
                    }
                    Biome::Wasteland => {
                        if n > 0.98 {
                            Tile::new(tiles::MOUNTAIN, 'y')
                        } else if n > 0.90 {
                            Tile::new(tiles::SAND, 'y')
                        } else if n > 0.80 {
                            Tile::new(tiles::RUBBLE, 'w')
                        } else {
                            Tile::new(tiles::FLOOR, 'y')
                        }
                    }
                    Biome::Temperate => {
                        if n > 0.99 {
                            Tile::new(tiles::MOUNTAIN, 'W')
                        } else if n > 0.95 {
                            Tile::new(tiles::TREE, 'G')
                        } else if n > 0.90 {
                            Tile::new(tiles::GRASS, 'g')
                        } else {
                            Tile::new(tiles::FLOOR, 'D')
                        }
                    }
                };
                level.set(x, y, tile);
            }
        }
    }

    /// Rivers run north to south, drifting on a sine plus a per-river bias.
    fn carve_rivers(&mut self, level: &mut LevelMap) {
        let water = Tile::new(tiles::WATER, 'B');
        for _ in 0..3 {
            let mut cx = self.rng.gen_range(0.0..level.width as f32);
            let drift = (self.rng.gen::<f32>() - 0.5) * 5.0;
            let mut cy = 0.0f32;
            while (cy as i32) < level.height {
                let half_width = 2 + self.rng.gen_range(0..3);
                for dx in -half_width..=half_width {
                    level.set(cx as i32 + dx, cy as i32, water);
                }
                cx += (cy * 0.1).sin() * 2.0 + drift;
                cy += 1.0;
            }
        }
    }

    /// Chasms: short meandering bands of rubble.
    fn carve_chasms(&mut self, level: &mut LevelMap) {
        let rubble = Tile::new(tiles::RUBBLE, 'D');
        for _ in 0..5 {
            let mut cx = self.rng.gen_range(0.0..level.width as f32);
            let mut cy = self.rng.gen_range(0.0..level.height as f32);
            let len = self.rng.gen_range(20..60);
            for _ in 0..len {
                let half_width = 1 + self.rng.gen_range(0..2);
                for dx in -half_width..=half_width {
                    level.set(cx as i32 + dx, cy as i32, rubble);
                }
                cx += (self.rng.gen::<f32>() - 0.5) * 2.0;
                cy += (self.rng.gen::<f32>() - 0.5) * 2.0;
            }
        }
    }

    fn stamp_town(&mut self, level: &mut LevelMap) {
        let cx = level.width / 2;
        let cy = level.height / 2;
        let granite = Tile::new(tiles::GRANITE, 's');

        // Cobblestone main street, east-west with a gentle sway.
        for x in 0..level.width {
            let sway = ((x as f32) * 0.05).sin() * 3.0;
            for y in cy - 4..=cy + 4 {
                if ((y as f32) - (cy as f32 + sway)).abs() < 4.0 {
                    level.set(x, y, granite);
                }
            }
        }

        // Central plaza with the fountain.
        for y in cy - 20..cy + 20 {
            for x in cx - 20..cx + 20 {
                let (dx, dy) = ((x - cx) as f32, (y - cy) as f32);
                if (dx * dx + dy * dy).sqrt() < 20.0 {
                    level.set(x, y, granite);
                }
            }
        }
        level.set(cx, cy, Tile::new(tiles::FOUNTAIN, 'B'));

        // The citadel, north of the plaza.
        self.stamp_castle(level, cx, cy - 80);

        // Trade district, west.
        self.stamp_shop(level, cx - 30, cy - 10, '1', 'U');
        self.fill_farm(level, cx - 40, cy - 25, 8, 6);

        // Magic and war, east.
        self.stamp_shop(level, cx + 30, cy - 10, '2', 's');
        self.stamp_shop(level, cx + 25, cy + 15, '5', 'b');
        self.stamp_shop(level, cx + 45, cy + 15, '6', 'r');

        // Industry, south.
        self.stamp_shop(level, cx, cy + 25, tiles::FORGE, 'y');

        // The bank, in the plaza.
        level.set(cx - 10, cy + 5, Tile::new(tiles::BANK, 'y'));

        // Residential ring: houses scattered on an annulus, skipping water.
        for _ in 0..25 {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let dist = self.rng.gen_range(35.0..95.0);
            let hx = (cx as f32 + angle.cos() * dist) as i32;
            let hy = (cy as f32 + angle.sin() * dist) as i32;
            let at = level.get(hx, hy).glyph;
            if at != tiles::WATER && at != tiles::WALL {
                self.stamp_house(level, hx, hy);
            }
        }

        // Entrance to the dungeon, far south, walled.
        level.outline_rect(cx - 2, cy + 78, 5, 5, Tile::new(tiles::WALL, 'D'));
        level.set(cx, cy + 80, Tile::new(tiles::STAIR_DOWN, 'r'));
    }

    fn stamp_castle(&mut self, level: &mut LevelMap, x: i32, y: i32) {
        // Irregular moat: a noise-perturbed ring.
        let water = Tile::new(tiles::WATER, 'B');
        for dy in -35..=35 {
            for dx in -35..=35 {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                let wobble = self
                    .moat_noise
                    .get((x + dx) as f32 * 0.1, (y + dy) as f32 * 0.1)
                    * 5.0;
                if dist > 28.0 + wobble && dist < 34.0 + wobble {
                    level.set(x + dx, y + dy, water);
                }
            }
        }

        // The keep.
        let (w, h) = (24, 20);
        let (left, top) = (x - w / 2, y - h / 2);
        level.outline_rect(left, top, w, h, Tile::new(tiles::WALL, 'W'));
        level.fill_rect(left + 1, top + 1, w - 2, h - 2, Tile::new(tiles::FLOOR, 'w'));

        // Drawbridge across the moat, south side.
        let door = Tile::new(tiles::DOOR, 'y');
        for i in -2..=2 {
            for j in 0..3 {
                level.set(x + i, top + h + j, door);
            }
        }

        // Throne room and the dining hall.
        level.set(x, top + 5, Tile::new(tiles::KING, 'y'));
        level.set(x - 2, top + 5, Tile::new(tiles::GUARD, 's'));
        level.set(x + 2, top + 5, Tile::new(tiles::GUARD, 's'));
        for i in x - 6..=x + 6 {
            level.set(i, top + 12, Tile::new(tiles::LOG, 'u'));
        }
    }

    fn stamp_shop(&mut self, level: &mut LevelMap, x: i32, y: i32, symbol: char, color: char) {
        level.outline_rect(x - 3, y - 3, 7, 7, Tile::new(tiles::BRICK, 'o'));
        level.fill_rect(x - 2, y - 2, 5, 5, Tile::new(tiles::FLOOR, 'D'));
        level.set(x, y, Tile::new(symbol, color));
        level.set(x, y + 3, Tile::new(tiles::DOOR, 'u'));
    }

    fn stamp_house(&mut self, level: &mut LevelMap, x: i32, y: i32) {
        let w = 6 + self.rng.gen_range(0..4);
        let h = 6 + self.rng.gen_range(0..4);
        level.outline_rect(x - w / 2, y - h / 2, w, h, Tile::new(tiles::LOG, 'u'));
        level.set(x, y + h / 2, Tile::new(tiles::DOOR, 'u'));
    }

    fn fill_farm(&mut self, level: &mut LevelMap, x: i32, y: i32, w: i32, h: i32) {
        level.fill_rect(x, y, w, h, Tile::new(tiles::SOIL, 's'));
    }

    fn spawn_animals(&mut self, level: &LevelMap) -> Vec<Mob> {
        let mut animals = Vec::new();
        for _ in 0..100 {
            let x = self.rng.gen_range(0..level.width);
            let y = self.rng.gen_range(0..level.height);
            let glyph = level.get(x, y).glyph;
            if glyph == tiles::FLOOR || glyph == tiles::GRASS {
                let template = ANIMAL_POOL[self.rng.gen_range(0..ANIMAL_POOL.len())];
                animals.push(Mob::from_template(self.mob_id(), x, y, &template));
            }
        }
        animals
    }

    // ─── Dungeon level: recursive bisection ───

    fn generate_dungeon_level(&mut self) -> (LevelMap, Vec<Mob>) {
        let mut level = LevelMap::new(
            DUNGEON_LEVEL,
            DUNGEON_WIDTH,
            DUNGEON_HEIGHT,
            Tile::new(tiles::WALL, 'D'),
        );

        let mut rooms = Vec::new();
        self.split(
            Rect {
                x: 2,
                y: 2,
                w: DUNGEON_WIDTH - 4,
                h: DUNGEON_HEIGHT - 4,
            },
            DUNGEON_SPLIT_DEPTH,
            &mut rooms,
        );

        let mut mobs = Vec::new();
        let mut centers = Vec::new();

        for (idx, leaf) in rooms.iter().enumerate() {
            // The room occupies 80% of its leaf, centered.
            let rw = (leaf.w * 4) / 5;
            let rh = (leaf.h * 4) / 5;
            let rx = leaf.x + (leaf.w - rw) / 2;
            let ry = leaf.y + (leaf.h - rh) / 2;

            for j in ry..ry + rh {
                for i in rx..rx + rw {
                    let tile = if self.rng.gen::<f32>() > 0.05 {
                        Tile::new(tiles::FLOOR, 'w')
                    } else if self.rng.gen::<f32>() > 0.5 {
                        Tile::new(tiles::GOLD, 'y')
                    } else {
                        Tile::new(tiles::POTION, 'r')
                    };
                    level.set(i, j, tile);
                }
            }

            centers.push((rx + rw / 2, ry + rh / 2));

            // Scatter a hostile in most rooms, away from the walls.
            if idx > 0 && rw > 4 && rh > 4 && self.rng.gen::<f32>() > 0.3 {
                let mx = rx + 2 + self.rng.gen_range(0..rw - 4);
                let my = ry + 2 + self.rng.gen_range(0..rh - 4);
                let template = HOSTILE_POOL[self.rng.gen_range(0..HOSTILE_POOL.len())];
                mobs.push(Mob::from_template(self.mob_id(), mx, my, &template));
            }
        }

        // Connect consecutive rooms with orthogonal corridors.
        for pair in centers.windows(2) {
            self.dig_corridor(&mut level, pair[0], pair[1]);
        }

        // Way back up, in the first room.
        if let Some(&(sx, sy)) = centers.first() {
            level.set(sx, sy, Tile::new(tiles::STAIR_UP, 'b'));
        }

        (level, mobs)
    }

    fn split(&mut self, rect: Rect, depth: u32, out: &mut Vec<Rect>) {
        if depth == 0 || (rect.w < DUNGEON_MIN_LEAF && rect.h < DUNGEON_MIN_LEAF) {
            out.push(rect);
            return;
        }
        if rect.w > rect.h {
            // Split 30-70% along the wide axis.
            let sw = (rect.w as f32 * self.rng.gen_range(0.3..0.7)) as i32;
            self.split(Rect { w: sw, ..rect }, depth - 1, out);
            self.split(
                Rect {
                    x: rect.x + sw,
                    w: rect.w - sw,
                    ..rect
                },
                depth - 1,
                out,
            );
        } else {
            let sh = (rect.h as f32 * self.rng.gen_range(0.3..0.7)) as i32;
            self.split(Rect { h: sh, ..rect }, depth - 1, out);
            self.split(
                Rect {
                    y: rect.y + sh,
                    h: rect.h - sh,
                    ..rect
                },
                depth - 1,
                out,
            );
        }
    }

    fn dig_corridor(&mut self, level: &mut LevelMap, from: (i32, i32), to: (i32, i32)) {
        let floor = Tile::new(tiles::FLOOR, 'D');
        let (mut cx, mut cy) = from;
        while cx != to.0 {
            level.set(cx, cy, floor);
            cx += if to.0 > cx { 1 } else { -1 };
        }
        while cy != to.1 {
            level.set(cx, cy, floor);
            cy += if to.1 > cy { 1 } else { -1 };
        }
        level.set(cx, cy, floor);
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mob::MobAiState;

    #[test]
    fn same_seed_same_world() {
        let a = generate(7);
        let b = generate(7);
        assert_eq!(a.levels[TOWN_LEVEL], b.levels[TOWN_LEVEL]);
        assert_eq!(a.levels[DUNGEON_LEVEL], b.levels[DUNGEON_LEVEL]);

        let spawn = |w: &GeneratedWorld, id: &str| -> Vec<(u64, i32, i32, String)> {
            w.mobs[id]
                .iter()
                .map(|m| (m.id, m.x, m.y, m.name.clone()))
                .collect()
        };
        assert_eq!(spawn(&a, TOWN_LEVEL), spawn(&b, TOWN_LEVEL));
        assert_eq!(spawn(&a, DUNGEON_LEVEL), spawn(&b, DUNGEON_LEVEL));
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(1);
        let b = generate(2);
        assert_ne!(a.levels[TOWN_LEVEL], b.levels[TOWN_LEVEL]);
    }

    #[test]
    fn biome_thresholds() {
        assert_eq!(classify_biome(-0.5), Biome::Wasteland);
        assert_eq!(classify_biome(0.0), Biome::Temperate);
        assert_eq!(classify_biome(0.5), Biome::Volcanic);
    }

    #[test]
    fn town_has_fountain_and_plaza() {
        let world = generate(7);
        let town = &world.levels[TOWN_LEVEL];
        let (cx, cy) = (TOWN_WIDTH / 2, TOWN_HEIGHT / 2);
        assert_eq!(town.get(cx, cy).glyph, tiles::FOUNTAIN);
        // Plaza granite right next to the fountain.
        assert_eq!(town.get(cx + 1, cy).glyph, tiles::GRANITE);
        // Dungeon entrance south of the plaza.
        assert_eq!(town.get(cx, cy + 80).glyph, tiles::STAIR_DOWN);
    }

    #[test]
    fn castle_moat_holds_water() {
        let world = generate(7);
        let town = &world.levels[TOWN_LEVEL];
        let (cx, cy) = (TOWN_WIDTH / 2, TOWN_HEIGHT / 2 - 80);
        let mut water = 0;
        for dy in -35..=35 {
            for dx in -35..=35 {
                if town.get(cx + dx, cy + dy).glyph == tiles::WATER {
                    water += 1;
                }
            }
        }
        assert!(water > 100, "moat too dry: {water} water tiles");
    }

    #[test]
    fn dungeon_rooms_are_connected() {
        let world = generate(7);
        let dungeon = &world.levels[DUNGEON_LEVEL];

        // Find the stair-up, then flood-fill walkable tiles from it.
        let mut start = None;
        for y in 0..dungeon.height {
            for x in 0..dungeon.width {
                if dungeon.get(x, y).glyph == tiles::STAIR_UP {
                    start = Some((x, y));
                }
            }
        }
        let start = start.expect("dungeon has a stair up");

        let mut seen = vec![false; (dungeon.width * dungeon.height) as usize];
        let mut stack = vec![start];
        let mut reached = 0usize;
        while let Some((x, y)) = stack.pop() {
            let idx = (y * dungeon.width + x) as usize;
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            reached += 1;
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, ny) = (x + dx, y + dy);
                if dungeon.walkable(nx, ny) && !seen[(ny * dungeon.width + nx) as usize] {
                    stack.push((nx, ny));
                }
            }
        }

        // Every mob stands on ground reachable from the entrance.
        for mob in &world.mobs[DUNGEON_LEVEL] {
            assert!(
                seen[(mob.y * dungeon.width + mob.x) as usize],
                "mob {} at ({},{}) unreachable",
                mob.name,
                mob.x,
                mob.y
            );
        }
        assert!(reached > 500, "dungeon suspiciously small: {reached}");
    }

    #[test]
    fn spawned_mobs_start_idle_on_walkable_ground() {
        let world = generate(7);
        for (level_id, mobs) in &world.mobs {
            let level = &world.levels[level_id];
            assert!(!mobs.is_empty(), "{level_id} spawned no mobs");
            for mob in mobs {
                assert_eq!(mob.state, MobAiState::Idle);
                assert!(
                    level.walkable(mob.x, mob.y),
                    "{} at ({},{}) on blocked ground",
                    mob.name,
                    mob.x,
                    mob.y
                );
            }
        }
    }

    #[test]
    fn mob_ids_are_unique_across_levels() {
        let world = generate(7);
        let mut ids: Vec<u64> = world.mobs.values().flatten().map(|m| m.id).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
