//! Deduplicated vertex, line-vertex and light tables.

use glam::{Vec2, Vec3};
use std::collections::HashMap;

/// Positions and normals closer than this are equal.
pub const POSITION_TOLERANCE: f32 = 1e-3;
/// Texture coordinates closer than this are equal.
pub const UV_TOLERANCE: f32 = 8e-3;

const CELL: f32 = 0.05;

/// A textured vertex (`VT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VtEntry {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// A coloured line vertex (`VLINE`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVertex {
    pub position: Vec3,
    pub color: Vec3,
}

/// An indexed light (`VLIGHT`). The colour may be a reserved sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightVertex {
    pub position: Vec3,
    pub color: Vec3,
}

/// Something a [`Pool`] can deduplicate.
pub trait PoolEntry: Copy {
    fn position(&self) -> Vec3;

    /// Equality within tolerance, with every tolerance multiplied by `slack`.
    fn matches(&self, other: &Self, slack: f32) -> bool;

    /// Fold `other` into an entry that already stands for `weight` uses.
    fn merge(&mut self, _other: &Self, _weight: u32) {}
}

fn near(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    (a - b).abs().max_element() <= tolerance
}

impl PoolEntry for VtEntry {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn matches(&self, other: &Self, slack: f32) -> bool {
        near(self.position, other.position, POSITION_TOLERANCE * slack)
            && near(self.normal, other.normal, POSITION_TOLERANCE * slack)
            && (self.uv - other.uv).abs().max_element() <= UV_TOLERANCE * slack
    }

    fn merge(&mut self, other: &Self, weight: u32) {
        let w = weight as f32;
        self.uv = (self.uv * w + other.uv) / (w + 1.0);
    }
}

impl PoolEntry for LineVertex {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn matches(&self, other: &Self, slack: f32) -> bool {
        near(self.position, other.position, POSITION_TOLERANCE * slack)
            && near(self.color, other.color, POSITION_TOLERANCE * slack)
    }
}

impl PoolEntry for LightVertex {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn matches(&self, other: &Self, slack: f32) -> bool {
        near(self.position, other.position, POSITION_TOLERANCE * slack)
            && near(self.color, other.color, POSITION_TOLERANCE * slack)
    }
}

type Cell = (i32, i32, i32);

fn cell_of(p: Vec3) -> Cell {
    let c = (p / CELL).floor();
    (c.x as i32, c.y as i32, c.z as i32)
}

/// An append-only table with tolerance-based deduplication.
///
/// Lookups try caller-supplied hints first (the entries a mesh vertex
/// resolved to last time), then a spatial grid over the whole table.
#[derive(Debug, Clone)]
pub struct Pool<T: PoolEntry> {
    entries: Vec<T>,
    weights: Vec<u32>,
    grid: HashMap<Cell, Vec<u32>>,
}

impl<T: PoolEntry> Default for Pool<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            weights: Vec::new(),
            grid: HashMap::new(),
        }
    }
}

impl<T: PoolEntry> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }

    /// Find an entry equal to `entry` within the base tolerance.
    pub fn find(&self, entry: &T, hints: &[u32]) -> Option<u32> {
        if let Some(&hit) = hints
            .iter()
            .find(|&&i| self.entries.get(i as usize).is_some_and(|e| e.matches(entry, 1.0)))
        {
            return Some(hit);
        }
        let (cx, cy, cz) = cell_of(entry.position());
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    if let Some(&hit) = bucket
                        .iter()
                        .find(|&&i| self.entries[i as usize].matches(entry, 1.0))
                    {
                        return Some(hit);
                    }
                }
            }
        }
        None
    }

    /// Append without searching.
    pub fn push(&mut self, entry: T) -> u32 {
        let index = self.entries.len() as u32;
        self.grid.entry(cell_of(entry.position())).or_default().push(index);
        self.entries.push(entry);
        self.weights.push(1);
        index
    }

    /// Return the index of an equal entry, merging into it, or append a new one.
    pub fn add(&mut self, entry: T, hints: &[u32]) -> u32 {
        match self.find(&entry, hints) {
            Some(index) => {
                let i = index as usize;
                self.entries[i].merge(&entry, self.weights[i]);
                self.weights[i] += 1;
                index
            }
            None => self.push(entry),
        }
    }

    /// Whether the entry at `index` matches `entry` with loosened tolerances.
    pub fn matches_at(&self, index: u32, entry: &T, slack: f32) -> bool {
        self.entries
            .get(index as usize)
            .is_some_and(|e| e.matches(entry, slack))
    }
}
