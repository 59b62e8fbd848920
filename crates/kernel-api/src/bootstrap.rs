use contracts::{Agent, EngineConfig, Position, Terrain};
use kernel_core::Kernel;

// Deterministic hash mixing; the engine carries no RNG.
fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

fn sample_range(seed: u64, stream: u64, min: i32, max: i32) -> i32 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as u64;
    min + (mix_seed(seed, stream) % span) as i32
}

/// Default roster for a fresh world.
pub const DEFAULT_AGENT_NAMES: [&str; 3] = ["Rowan", "Sage", "Wren"];

/// One-shot world bootstrap: a seeded sparse terrain map plus starting
/// agents on clear ground. Terrain generation proper is an external
/// collaborator; this produces the same shape of sparse map it would.
pub fn bootstrap_kernel(config: &EngineConfig, model_id: &str) -> Kernel {
    let mut kernel = Kernel::new(config.clone());
    let seed = config.seed;
    let width = config.world_width;
    let height = config.world_height;

    let mut terrain = Vec::new();

    // Scattered terrain patches: forests, stone, hills, and ponds ringed
    // with coast and sand.
    let patch_count = ((width as u64 * height as u64) / 900).clamp(8, 160);
    for patch in 0..patch_count {
        let base = mix_seed(seed, 1000 + patch);
        let center = Position::new(
            sample_range(base, 1, 2, width - 3),
            sample_range(base, 2, 2, height - 3),
        );
        let radius = sample_range(base, 3, 1, 3);
        let kind = match mix_seed(base, 4) % 5 {
            0 => Terrain::Forest,
            1 => Terrain::Stone,
            2 => Terrain::Hill,
            3 => Terrain::Sand,
            _ => Terrain::Water,
        };

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let position = Position::new(center.x + dx, center.y + dy);
                if !position.in_bounds(width, height) {
                    continue;
                }
                terrain.push((position, kind));
            }
        }
        if kind == Terrain::Water {
            // Wade-able rim so ponds never strand anyone.
            for dy in -(radius + 1)..=(radius + 1) {
                for dx in -(radius + 1)..=(radius + 1) {
                    let ring = dx * dx + dy * dy;
                    if ring <= radius * radius || ring > (radius + 1) * (radius + 1) {
                        continue;
                    }
                    let position = Position::new(center.x + dx, center.y + dy);
                    if position.in_bounds(width, height) {
                        terrain.push((position, Terrain::Coast));
                    }
                }
            }
        }
    }

    kernel.seed_terrain(terrain);

    // Agents start on passable ground near the world center, spread apart.
    let center = Position::new(width / 2, height / 2);
    let mut placed: Vec<Position> = Vec::new();
    for (index, name) in DEFAULT_AGENT_NAMES.iter().enumerate() {
        let mut position = center;
        for attempt in 0..256_u64 {
            let probe = mix_seed(seed, 5000 + index as u64 * 311 + attempt);
            let candidate = Position::new(
                center.x + sample_range(probe, 1, -40, 40),
                center.y + sample_range(probe, 2, -40, 40),
            );
            let clear = candidate.in_bounds(width, height)
                && kernel.cell(candidate).terrain == Terrain::Grass
                && placed
                    .iter()
                    .all(|other| candidate.chebyshev_distance(*other) >= 8);
            if clear {
                position = candidate;
                break;
            }
        }
        placed.push(position);
        kernel.insert_agent(Agent::new(*name, model_id, position));
    }

    kernel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            world_width: 120,
            world_height: 120,
            seed: 42,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn bootstrap_is_deterministic_for_a_seed() {
        let a = bootstrap_kernel(&config(), "model-a");
        let b = bootstrap_kernel(&config(), "model-a");
        assert_eq!(a.cells(), b.cells());
        assert_eq!(
            a.agents().values().map(|x| x.position).collect::<Vec<_>>(),
            b.agents().values().map(|x| x.position).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn agents_start_on_grass_and_apart() {
        let kernel = bootstrap_kernel(&config(), "model-a");
        assert_eq!(kernel.agents().len(), DEFAULT_AGENT_NAMES.len());

        let positions: Vec<Position> =
            kernel.agents().values().map(|agent| agent.position).collect();
        for position in &positions {
            assert_eq!(kernel.cell(*position).terrain, Terrain::Grass);
        }
        for (i, a) in positions.iter().enumerate() {
            for b in positions.iter().skip(i + 1) {
                assert!(a.chebyshev_distance(*b) >= 8);
            }
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = bootstrap_kernel(&config(), "model-a");
        let b = bootstrap_kernel(
            &EngineConfig {
                seed: 43,
                ..config()
            },
            "model-a",
        );
        assert_ne!(a.cells(), b.cells());
    }
}
