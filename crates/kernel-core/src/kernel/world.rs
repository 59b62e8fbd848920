use std::collections::BTreeSet;

use contracts::{
    Cell, Direction, ObjectId, Position, Rect, Structure, WorldObject, ALL_DIRECTIONS,
};

use super::Kernel;

// Flood fills larger than this are treated as open ground, not structures.
const MAX_STRUCTURE_CELLS: usize = 1000;

impl Kernel {
    /// Cell at a position; unstored positions read as the default grass cell.
    pub fn cell(&self, position: Position) -> Cell {
        self.cells.get(&position).cloned().unwrap_or_default()
    }

    /// Stores a cell sparsely: writing the default removes the row.
    pub(crate) fn set_cell(&mut self, position: Position, cell: Cell) {
        if cell.is_default() {
            self.cells.remove(&position);
        } else {
            self.cells.insert(position, cell);
        }
        self.dirty.cells.insert(position);
    }

    pub fn cells_in_rect(&self, rect: Rect) -> Vec<(Position, Cell)> {
        let clamped = rect.clamp(self.meta.width, self.meta.height);
        clamped
            .positions()
            .into_iter()
            .map(|position| (position, self.cell(position)))
            .collect()
    }

    pub fn objects_at(&self, position: Position) -> Vec<&WorldObject> {
        self.objects
            .values()
            .filter(|object| object.position == position)
            .collect()
    }

    pub fn objects_in_rect(&self, rect: Rect) -> Vec<&WorldObject> {
        self.objects
            .values()
            .filter(|object| rect.contains(object.position))
            .collect()
    }

    pub fn object(&self, id: &str) -> Option<&WorldObject> {
        self.objects.get(id)
    }

    pub(crate) fn insert_object(&mut self, object: WorldObject) {
        self.dirty.objects.insert(object.id.clone());
        self.dirty.removed_objects.remove(&object.id);
        self.objects.insert(object.id.clone(), object);
    }

    pub(crate) fn remove_object(&mut self, id: &str) -> Option<WorldObject> {
        let removed = self.objects.remove(id);
        if removed.is_some() {
            self.dirty.objects.remove(id);
            self.dirty.removed_objects.insert(id.to_string());
        }
        removed
    }

    /// Terrain passable, in bounds, no blocking object.
    pub fn passable(&self, position: Position) -> bool {
        if !position.in_bounds(self.meta.width, self.meta.height) {
            return false;
        }
        if !self.cell(position).terrain.passable() {
            return false;
        }
        self.objects_at(position).iter().all(|object| object.passable)
    }

    /// Whether one cardinal step is legal: destination in bounds and
    /// passable, and the shared edge carries no wall on either side unless a
    /// door is set there.
    pub fn can_step(&self, from: Position, direction: Direction) -> bool {
        let to = from.step(direction);
        if !self.passable(to) {
            return false;
        }
        if !self.cell(from).can_exit(direction) {
            return false;
        }
        self.cell(to).can_exit(direction.opposite())
    }

    /// The single wall mutation routine. Both sides of the edge are updated
    /// together; at the world rim only the inner side exists. No caller may
    /// touch wall sets directly.
    pub(crate) fn place_wall(&mut self, position: Position, direction: Direction) {
        let mut cell = self.cell(position);
        cell.walls.insert(direction);
        self.set_cell(position, cell);

        let adjacent = position.step(direction);
        if adjacent.in_bounds(self.meta.width, self.meta.height) {
            let mut mirror = self.cell(adjacent);
            mirror.walls.insert(direction.opposite());
            self.set_cell(adjacent, mirror);
        }
    }

    /// Removes a wall edge symmetrically. A door in that wall goes with it.
    pub(crate) fn remove_wall(&mut self, position: Position, direction: Direction) {
        let mut cell = self.cell(position);
        cell.walls.remove(&direction);
        cell.doors.remove(&direction);
        self.set_cell(position, cell);

        let adjacent = position.step(direction);
        if adjacent.in_bounds(self.meta.width, self.meta.height) {
            let mut mirror = self.cell(adjacent);
            mirror.walls.remove(&direction.opposite());
            mirror.doors.remove(&direction.opposite());
            self.set_cell(adjacent, mirror);
        }
    }

    /// Places a door symmetrically. The wall must already exist on this edge.
    pub(crate) fn place_door(&mut self, position: Position, direction: Direction) -> bool {
        let mut cell = self.cell(position);
        if !cell.walls.contains(&direction) {
            return false;
        }
        cell.doors.insert(direction);
        self.set_cell(position, cell);

        let adjacent = position.step(direction);
        if adjacent.in_bounds(self.meta.width, self.meta.height) {
            let mut mirror = self.cell(adjacent);
            mirror.walls.insert(direction.opposite());
            mirror.doors.insert(direction.opposite());
            self.set_cell(adjacent, mirror);
        }
        true
    }

    pub(crate) fn rename_place(&mut self, position: Position, name: &str) {
        let mut cell = self.cell(position);
        cell.place_name = Some(name.to_string());
        self.set_cell(position, cell);
        self.named_places.insert(name.to_string(), position);
        self.dirty.named_places.insert(name.to_string());
    }

    pub fn place_position(&self, name: &str) -> Option<Position> {
        self.named_places.get(name).copied()
    }

    /// Flood fill from `seed` across wall-free edges. Walls bound the fill
    /// whether or not they carry a door, so a shelter with a doorway still
    /// counts as enclosed. Returns the interior, or `None` when the fill
    /// escapes the world rim or grows past the structure size cap.
    pub(crate) fn flood_fill_enclosed(&self, seed: Position) -> Option<BTreeSet<Position>> {
        if !seed.in_bounds(self.meta.width, self.meta.height) {
            return None;
        }

        let mut visited: BTreeSet<Position> = BTreeSet::new();
        let mut frontier = vec![seed];

        while let Some(current) = frontier.pop() {
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > MAX_STRUCTURE_CELLS {
                return None;
            }

            let cell = self.cell(current);
            for direction in ALL_DIRECTIONS {
                if cell.has_wall(direction) {
                    continue;
                }
                let neighbor = current.step(direction);
                if !neighbor.in_bounds(self.meta.width, self.meta.height) {
                    // Open edge at the world rim: not enclosed.
                    return None;
                }
                if !self.cell(neighbor).has_wall(direction.opposite())
                    && !visited.contains(&neighbor)
                {
                    frontier.push(neighbor);
                }
            }
        }

        Some(visited)
    }

    /// Detects the structure enclosing `seed`, if any. An existing structure
    /// over the same interior is updated in place (creators accumulate);
    /// otherwise a new one is recorded. The flag reports whether the
    /// structure is new.
    pub(crate) fn detect_structure(
        &mut self,
        seed: Position,
        builder: Option<&str>,
    ) -> Option<(ObjectId, bool)> {
        let interior = self.flood_fill_enclosed(seed)?;

        if let Some(existing) = self
            .structures
            .values()
            .find(|structure| structure.interior == interior)
            .map(|structure| structure.id.clone())
        {
            if let (Some(builder), Some(structure)) = (builder, self.structures.get_mut(&existing)) {
                if structure.creators.insert(builder.to_string()) {
                    self.dirty.structures.insert(existing.clone());
                }
            }
            return Some((existing, false));
        }

        let id = self.mint_object_id();
        let mut creators = BTreeSet::new();
        if let Some(builder) = builder {
            creators.insert(builder.to_string());
        }
        let structure = Structure {
            id: id.clone(),
            name: None,
            interior,
            creators,
            is_private: false,
        };
        self.dirty.structures.insert(id.clone());
        self.structures.insert(id.clone(), structure);
        Some((id, true))
    }

    /// Drops structures whose interior is no longer enclosed. Called after
    /// wall removal around the affected cells.
    pub(crate) fn invalidate_structures_at(&mut self, position: Position) {
        let stale: Vec<ObjectId> = self
            .structures
            .values()
            .filter(|structure| {
                if !structure.contains(position) {
                    return false;
                }
                match structure.interior.iter().next() {
                    Some(&seed) => self.flood_fill_enclosed(seed).as_ref() != Some(&structure.interior),
                    None => true,
                }
            })
            .map(|structure| structure.id.clone())
            .collect();

        for id in stale {
            self.structures.remove(&id);
            self.dirty.structures.remove(&id);
            self.dirty.removed_structures.insert(id);
        }
    }

    pub fn structure_at(&self, position: Position) -> Option<&Structure> {
        self.structures
            .values()
            .find(|structure| structure.contains(position))
    }

    /// Recomputes structures after a wall removal across the edge `a`-`b`.
    /// Stale enclosures are dropped; if the region is still (or newly)
    /// enclosed, e.g. an interior partition came down inside a larger
    /// shell, the merged structure inherits the creators of the ones it
    /// replaced. Returns newly detected structure ids.
    pub(crate) fn rebuild_structures_after_removal(
        &mut self,
        a: Position,
        b: Position,
    ) -> Vec<ObjectId> {
        let mut inherited: BTreeSet<String> = BTreeSet::new();
        for structure in self.structures.values() {
            if structure.contains(a) || structure.contains(b) {
                inherited.extend(structure.creators.iter().cloned());
            }
        }

        self.invalidate_structures_at(a);
        self.invalidate_structures_at(b);

        let mut detected = Vec::new();
        for seed in [a, b] {
            if let Some((id, true)) = self.detect_structure(seed, None) {
                if let Some(structure) = self.structures.get_mut(&id) {
                    structure.creators.extend(inherited.iter().cloned());
                    self.dirty.structures.insert(id.clone());
                }
                detected.push(id);
            }
        }
        detected
    }
}
