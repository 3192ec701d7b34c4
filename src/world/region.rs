//! Region index: fixed-size partition of continuous world coordinates
//!
//! Regions scope all spawn/despawn decisions. They are created lazily the
//! first time something touches them and are cleared, never destroyed, when
//! their enemies despawn.

use hashbrown::HashSet;
use rustc_hash::FxHashMap;

use crate::util::vec2::Vec2;
use crate::world::constants::region;
use crate::world::state::EnemyId;

/// Region cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// One spawn-scoping cell of the world
#[derive(Debug)]
pub struct Region {
    pub key: CellKey,
    /// Last sim time a player was present
    pub last_active: f64,
    /// Players (and stand-in bots) currently inside
    pub player_count: u32,
    /// Every enemy this region spawned and still owns
    pub enemies: HashSet<EnemyId>,
    /// No spawning before this sim time
    pub cooldown_until: f64,
    /// Whether the region currently holds a generated population
    pub spawned: bool,
}

impl Region {
    fn new(key: CellKey) -> Self {
        Self {
            key,
            last_active: 0.0,
            player_count: 0,
            enemies: HashSet::new(),
            cooldown_until: 0.0,
            spawned: false,
        }
    }

    pub fn has_living_enemies(&self) -> bool {
        !self.enemies.is_empty()
    }

    /// Reset spawn bookkeeping after the region empties out.
    /// The region object itself is retained.
    pub fn clear(&mut self, cooldown_until: f64) {
        self.spawned = false;
        self.cooldown_until = cooldown_until;
    }
}

/// Cell-keyed index over all touched regions
pub struct RegionGrid {
    cell_size: f32,
    inv_cell_size: f32,
    regions: FxHashMap<CellKey, Region>,
}

impl Default for RegionGrid {
    fn default() -> Self {
        Self::new(region::CELL_SIZE)
    }
}

impl RegionGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            regions: FxHashMap::default(),
        }
    }

    /// Convert a world position to its cell key
    #[inline]
    pub fn cell_for(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Distance tier of a cell, 0-based. Tier escalates with cell distance
    /// from the world origin.
    pub fn tier(key: CellKey) -> usize {
        let dist = (((key.0 * key.0) + (key.1 * key.1)) as f32).sqrt();
        region::TIER_BOUNDS.iter().filter(|&&bound| dist > bound).count()
    }

    /// Get the region for a key, creating it lazily
    pub fn region_mut(&mut self, key: CellKey) -> &mut Region {
        self.regions.entry(key).or_insert_with(|| Region::new(key))
    }

    pub fn get(&self, key: CellKey) -> Option<&Region> {
        self.regions.get(&key)
    }

    pub fn get_mut(&mut self, key: CellKey) -> Option<&mut Region> {
        self.regions.get_mut(&key)
    }

    /// Zero all presence counters ahead of a presence sweep
    pub fn reset_presence(&mut self) {
        for region in self.regions.values_mut() {
            region.player_count = 0;
        }
    }

    /// Record a combatant inside a cell and refresh its activity time
    pub fn mark_present(&mut self, key: CellKey, now: f64) {
        let region = self.region_mut(key);
        region.player_count += 1;
        region.last_active = now;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_for_floors_negative_coordinates() {
        let grid = RegionGrid::new(512.0);
        assert_eq!(grid.cell_for(Vec2::new(0.0, 0.0)), (0, 0));
        assert_eq!(grid.cell_for(Vec2::new(511.9, 0.0)), (0, 0));
        assert_eq!(grid.cell_for(Vec2::new(512.0, 0.0)), (1, 0));
        assert_eq!(grid.cell_for(Vec2::new(-0.1, -600.0)), (-1, -2));
    }

    #[test]
    fn test_region_created_lazily() {
        let mut grid = RegionGrid::default();
        assert!(grid.get((3, 3)).is_none());
        grid.region_mut((3, 3));
        assert!(grid.get((3, 3)).is_some());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_tier_escalates_with_distance() {
        assert_eq!(RegionGrid::tier((0, 0)), 0);
        assert_eq!(RegionGrid::tier((3, 0)), 0);
        assert_eq!(RegionGrid::tier((5, 0)), 1);
        assert_eq!(RegionGrid::tier((0, 15)), 2);
        assert_eq!(RegionGrid::tier((21, 0)), 3);
        assert_eq!(RegionGrid::tier((30, 30)), 4);
    }

    #[test]
    fn test_presence_sweep() {
        let mut grid = RegionGrid::default();
        grid.mark_present((1, 1), 10.0);
        grid.mark_present((1, 1), 10.0);
        assert_eq!(grid.get((1, 1)).unwrap().player_count, 2);
        assert_eq!(grid.get((1, 1)).unwrap().last_active, 10.0);

        grid.reset_presence();
        assert_eq!(grid.get((1, 1)).unwrap().player_count, 0);
        // Recency survives the sweep
        assert_eq!(grid.get((1, 1)).unwrap().last_active, 10.0);
    }

    #[test]
    fn test_clear_retains_region() {
        let mut grid = RegionGrid::default();
        let region = grid.region_mut((2, -4));
        region.spawned = true;
        region.clear(55.0);
        let region = grid.get((2, -4)).unwrap();
        assert!(!region.spawned);
        assert_eq!(region.cooldown_until, 55.0);
    }
}
