use serde::{Deserialize, Serialize};

/// Resources gathered from terrain; always stackable.
pub const BASE_RESOURCES: [&str; 4] = ["wood", "stone", "clay", "grass"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CraftVerb {
    Combine,
    Work,
    Apply,
}

/// A crafting recipe. Lookup is an exact match on
/// `(verb, sorted inputs, technique)`; `apply` recipes are ordered
/// `[tool, target]` and the tool survives the craft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    pub output_kind: String,
    pub verb: CraftVerb,
    pub inputs: Vec<String>,
    pub technique: Option<String>,
    pub output_quantity: u32,
    pub output_stackable: bool,
    pub properties: Vec<String>,
    pub discoveries: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftOutcome {
    pub output_kind: String,
    pub output_quantity: u32,
    pub output_stackable: bool,
    pub properties: Vec<String>,
    /// Input kinds actually consumed (the tool is excluded for `apply`).
    pub consumed: Vec<String>,
    pub discoveries: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftMiss {
    pub hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl Default for RecipeBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RecipeBook {
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    /// The built-in recipe set. Early material culture: fiber, cordage,
    /// shaped wood and clay, and a first tool chain.
    pub fn builtin() -> Self {
        fn recipe(
            output_kind: &str,
            verb: CraftVerb,
            inputs: &[&str],
            technique: Option<&str>,
            output_quantity: u32,
            output_stackable: bool,
            properties: &[&str],
            discoveries: &[&str],
            description: &str,
        ) -> Recipe {
            Recipe {
                output_kind: output_kind.to_string(),
                verb,
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                technique: technique.map(|s| s.to_string()),
                output_quantity,
                output_stackable,
                properties: properties.iter().map(|s| s.to_string()).collect(),
                discoveries: discoveries.iter().map(|s| s.to_string()).collect(),
                description: description.to_string(),
            }
        }

        Self::new(vec![
            recipe(
                "cordage",
                CraftVerb::Combine,
                &["grass", "grass"],
                None,
                1,
                true,
                &[],
                &["Twisted fibers hold far more weight than loose blades."],
                "Two handfuls of grass twisted into rough cordage.",
            ),
            recipe(
                "planks",
                CraftVerb::Work,
                &["wood"],
                Some("split"),
                2,
                true,
                &[],
                &[],
                "The log splits along its grain into flat planks.",
            ),
            recipe(
                "woven_mat",
                CraftVerb::Work,
                &["grass"],
                Some("weave"),
                1,
                true,
                &[],
                &["The same weave might work with thinner strips of wood."],
                "Grass woven over and under itself into a mat.",
            ),
            recipe(
                "clay_vessel",
                CraftVerb::Work,
                &["clay"],
                Some("hollow"),
                1,
                false,
                &["vessel"],
                &["A vessel like this could carry water."],
                "Thumbs pressed into the clay leave a hollow that holds its shape.",
            ),
            recipe(
                "sharpened_stone",
                CraftVerb::Work,
                &["stone"],
                Some("chip"),
                1,
                false,
                &["tool", "sharp"],
                &["An edge like this wants a handle."],
                "Flakes chip away until the stone carries a bright edge.",
            ),
            recipe(
                "stone_axe",
                CraftVerb::Combine,
                &["cordage", "sharpened_stone", "wood"],
                None,
                1,
                false,
                &["tool", "sharp"],
                &["With an axe, standing trees stop being scenery."],
                "Stone head lashed to a wooden haft with cordage.",
            ),
            recipe(
                "planks",
                CraftVerb::Apply,
                &["stone_axe", "wood"],
                None,
                3,
                true,
                &[],
                &[],
                "The axe makes quick, even work of the log.",
            ),
            recipe(
                "firewood",
                CraftVerb::Apply,
                &["sharpened_stone", "wood"],
                None,
                2,
                true,
                &[],
                &[],
                "Slow work with the stone edge, but the wood yields.",
            ),
            recipe(
                "rope",
                CraftVerb::Combine,
                &["cordage", "cordage"],
                None,
                1,
                true,
                &[],
                &[],
                "Cordage plied against itself into proper rope.",
            ),
            recipe(
                "shelter_frame",
                CraftVerb::Combine,
                &["planks", "planks", "rope"],
                None,
                1,
                false,
                &["structure"],
                &["Raised against a wall, this frame would shed rain."],
                "Planks lashed into a leaning frame.",
            ),
        ])
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Whether crafted items of this kind stack. Gathered base resources
    /// always stack; otherwise the recipe table decides.
    pub fn is_stackable_kind(&self, kind: &str) -> bool {
        if BASE_RESOURCES.contains(&kind) {
            return true;
        }
        self.recipes
            .iter()
            .any(|recipe| recipe.output_kind == kind && recipe.output_stackable)
    }

    pub fn find(&self, verb: CraftVerb, inputs: &[String], technique: Option<&str>) -> Option<&Recipe> {
        if verb == CraftVerb::Apply {
            // Order matters: first input is the tool, second the target.
            return self.recipes.iter().find(|recipe| {
                recipe.verb == CraftVerb::Apply && recipe.inputs.as_slice() == inputs
            });
        }

        let mut sorted_inputs = inputs.to_vec();
        sorted_inputs.sort();

        self.recipes.iter().find(|recipe| {
            if recipe.verb != verb {
                return false;
            }
            let mut recipe_inputs = recipe.inputs.clone();
            recipe_inputs.sort();
            if recipe_inputs != sorted_inputs {
                return false;
            }
            verb != CraftVerb::Work || recipe.technique.as_deref() == technique
        })
    }

    pub fn try_craft(
        &self,
        verb: CraftVerb,
        inputs: &[String],
        technique: Option<&str>,
    ) -> Result<CraftOutcome, CraftMiss> {
        match self.find(verb, inputs, technique) {
            Some(recipe) => {
                let consumed = match verb {
                    CraftVerb::Apply => recipe.inputs[1..].to_vec(),
                    _ => recipe.inputs.clone(),
                };
                Ok(CraftOutcome {
                    output_kind: recipe.output_kind.clone(),
                    output_quantity: recipe.output_quantity,
                    output_stackable: recipe.output_stackable,
                    properties: recipe.properties.clone(),
                    consumed,
                    discoveries: recipe.discoveries.clone(),
                    description: recipe.description.clone(),
                })
            }
            None => Err(CraftMiss {
                hints: self.hints(verb, inputs, technique),
            }),
        }
    }

    /// Partial-match hints: recipes of the same verb sharing at least one
    /// input suggest what is missing; an exact-input work recipe with a
    /// different technique names that technique.
    pub fn hints(&self, verb: CraftVerb, inputs: &[String], technique: Option<&str>) -> Vec<String> {
        let mut hints = Vec::new();
        let mut sorted_inputs = inputs.to_vec();
        sorted_inputs.sort();

        for recipe in &self.recipes {
            if recipe.verb != verb {
                continue;
            }
            let mut recipe_inputs = recipe.inputs.clone();
            recipe_inputs.sort();

            let overlap = recipe_inputs
                .iter()
                .filter(|input| sorted_inputs.contains(input))
                .count();
            if overlap > 0 && overlap < recipe_inputs.len() {
                let missing: Vec<&str> = recipe_inputs
                    .iter()
                    .filter(|input| !sorted_inputs.contains(input))
                    .map(|s| s.as_str())
                    .collect();
                if !missing.is_empty() {
                    hints.push(format!(
                        "This might work together with: {}",
                        missing.join(", ")
                    ));
                }
            }

            if verb == CraftVerb::Work
                && recipe_inputs == sorted_inputs
                && recipe.technique.as_deref() != technique
            {
                if let Some(wanted) = &recipe.technique {
                    hints.push(format!(
                        "These materials respond to a different technique: {wanted}"
                    ));
                }
            }
        }

        if hints.is_empty() {
            match verb {
                CraftVerb::Combine if inputs.len() < 2 => {
                    hints.push("Combining usually takes at least two materials.".to_string());
                }
                CraftVerb::Work if technique.is_none() => {
                    hints.push("Working a material needs a technique.".to_string());
                }
                _ => {}
            }
        }

        hints.dedup();
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn combine_matches_regardless_of_input_order() {
        let book = RecipeBook::builtin();
        let forward = book.try_craft(
            CraftVerb::Combine,
            &strings(&["cordage", "sharpened_stone", "wood"]),
            None,
        );
        let shuffled = book.try_craft(
            CraftVerb::Combine,
            &strings(&["wood", "cordage", "sharpened_stone"]),
            None,
        );
        assert_eq!(forward, shuffled);
        assert_eq!(forward.expect("recipe").output_kind, "stone_axe");
    }

    #[test]
    fn work_requires_the_exact_technique() {
        let book = RecipeBook::builtin();
        assert!(book
            .try_craft(CraftVerb::Work, &strings(&["clay"]), Some("hollow"))
            .is_ok());

        let miss = book
            .try_craft(CraftVerb::Work, &strings(&["clay"]), Some("flatten"))
            .expect_err("wrong technique");
        assert!(miss
            .hints
            .iter()
            .any(|hint| hint.contains("different technique: hollow")));
    }

    #[test]
    fn apply_consumes_target_but_not_tool() {
        let book = RecipeBook::builtin();
        let outcome = book
            .try_craft(CraftVerb::Apply, &strings(&["stone_axe", "wood"]), None)
            .expect("recipe");
        assert_eq!(outcome.consumed, strings(&["wood"]));
        assert_eq!(outcome.output_quantity, 3);
    }

    #[test]
    fn apply_is_order_sensitive() {
        let book = RecipeBook::builtin();
        assert!(book
            .try_craft(CraftVerb::Apply, &strings(&["wood", "stone_axe"]), None)
            .is_err());
    }

    #[test]
    fn miss_hints_reference_shared_inputs() {
        let book = RecipeBook::builtin();
        let miss = book
            .try_craft(CraftVerb::Combine, &strings(&["wood", "water"]), None)
            .expect_err("no such recipe");
        assert!(!miss.hints.is_empty());
        assert!(miss.hints.iter().any(|hint| hint.contains("cordage")
            || hint.contains("sharpened_stone")
            || hint.contains("planks")
            || hint.contains("rope")));
    }

    #[test]
    fn stackability_comes_from_the_table() {
        let book = RecipeBook::builtin();
        assert!(book.is_stackable_kind("wood"));
        assert!(book.is_stackable_kind("planks"));
        assert!(!book.is_stackable_kind("clay_vessel"));
        assert!(!book.is_stackable_kind("unheard_of"));
    }

    #[test]
    fn recipe_lookup_is_deterministic() {
        let book = RecipeBook::builtin();
        let first = book.try_craft(CraftVerb::Work, &strings(&["wood"]), Some("split"));
        let second = book.try_craft(CraftVerb::Work, &strings(&["wood"]), Some("split"));
        assert_eq!(first, second);
    }
}
