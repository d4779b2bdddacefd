//! Tile glyph table.
//!
//! One table for every level variant. Each tile is a display glyph plus a
//! single-letter color tag (the palette lives client-side); walkability is
//! derived from the glyph here so client and server agree.

/// Terrain glyphs.
pub const VOID: char = ' ';
pub const FLOOR: char = '.';
pub const WALL: char = '#';
pub const GRANITE: char = 'W';
pub const BRICK: char = '%';
pub const DOOR: char = '+';
pub const STAIR_UP: char = '<';
pub const STAIR_DOWN: char = '>';
pub const TREE: char = 'T';
pub const GRASS: char = '"';
pub const WATER: char = '~';
pub const LAVA: char = '`';
pub const MOUNTAIN: char = '^';
pub const SAND: char = 's';
pub const LOG: char = 'L';
pub const RUBBLE: char = ':';
pub const SOIL: char = ';';

/// Structures and interactables.
pub const FOUNTAIN: char = 'f';
pub const SHOP: char = 'S';
pub const BANK: char = 'B';
pub const FORGE: char = '&';
pub const KING: char = 'K';
pub const GUARD: char = 'k';
pub const SIGN: char = ']';

/// Loot glyphs.
pub const GOLD: char = '$';
pub const POTION: char = '!';

/// Mob glyphs.
pub const ORC: char = 'O';
pub const GOBLIN: char = 'g';
pub const SKELETON: char = 'z';
pub const SPIDER: char = 'x';
pub const DEER: char = 'd';
pub const SHEEP: char = 'e';
pub const COW: char = 'C';
pub const RABBIT: char = 'r';

/// The player glyph default.
pub const PLAYER: char = '@';

/// A placed tile: glyph plus color tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub glyph: char,
    pub color: char,
}

impl Tile {
    pub const fn new(glyph: char, color: char) -> Self {
        Self { glyph, color }
    }

    /// Void/air tile, the result of mining.
    pub const VOID: Tile = Tile::new(VOID, 'w');
}

/// Whether an entity may stand on this glyph.
pub fn walkable(glyph: char) -> bool {
    !matches!(glyph, WALL | MOUNTAIN | WATER | LAVA | TREE | LOG | BRICK)
}
