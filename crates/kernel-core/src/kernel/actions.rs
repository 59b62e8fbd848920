use serde_json::json;

use contracts::{
    Action, ActionResult, Direction, Event, EventKind, Item, JourneyTarget, ObjectKind, Position,
    Privacy, WorldObject,
};

use super::agents::JourneyPlanError;
use super::Kernel;
use crate::crafting::CraftVerb;

const SHELTER_WOOD_COST: u32 = 4;
const WALL_WOOD_COST: u32 = 1;

impl Kernel {
    /// Validates and executes one action. Failed actions emit no events and
    /// consume no resources; every handler checks its preconditions before
    /// touching state.
    pub fn execute_action(&mut self, agent_name: &str, action: &Action, tick: u64) -> ActionResult {
        if self.agent(agent_name).is_none() {
            return ActionResult::fail(format!("No agent named {agent_name}."));
        }

        match action {
            Action::Walk { direction } => self.action_walk(agent_name, *direction, tick),
            Action::Approach { target } => self.action_approach(agent_name, target, tick),
            Action::Journey { destination } => self.action_journey(agent_name, destination, tick),
            Action::Examine { direction } => self.action_examine(agent_name, direction),
            Action::SenseOthers => self.action_sense_others(agent_name),
            Action::Take { direction } => self.action_take(agent_name, direction, tick),
            Action::Drop { kind, quantity } => self.action_drop(agent_name, kind, *quantity, tick),
            Action::Give {
                recipient,
                kind,
                quantity,
            } => self.action_give(agent_name, recipient, kind, *quantity, tick),
            Action::Gather => self.action_gather(agent_name, tick),
            Action::Combine { items } => self.action_combine(agent_name, items, tick),
            Action::Work {
                material,
                technique,
            } => self.action_work(agent_name, material, technique, tick),
            Action::Apply { tool, target } => self.action_apply(agent_name, tool, target, tick),
            Action::BuildShelter { facing } => self.action_build_shelter(agent_name, *facing, tick),
            Action::PlaceWall { direction } => self.action_place_wall(agent_name, *direction, tick),
            Action::PlaceDoor { direction } => self.action_place_door(agent_name, *direction, tick),
            Action::PlaceItem { item } => self.action_place_item(agent_name, item, tick),
            Action::RemoveWall { direction } => {
                self.action_remove_wall(agent_name, *direction, tick)
            }
            Action::WriteSign { text } => self.action_write_sign(agent_name, text, tick),
            Action::ReadSign { direction } => self.action_read_sign(agent_name, direction),
            Action::NamePlace { name } => self.action_name_place(agent_name, name, tick),
            Action::Speak { text } => self.action_speak(agent_name, text, tick),
            Action::Invite { invitee, privacy } => {
                self.action_invite(agent_name, invitee, *privacy, tick)
            }
            Action::AcceptInvite => self.action_accept_invite(agent_name, tick),
            Action::DeclineInvite => self.action_decline_invite(agent_name, tick),
            Action::JoinConversation { participant } => {
                self.action_join_conversation(agent_name, participant, tick)
            }
            Action::LeaveConversation => self.action_leave_conversation(agent_name, tick),
            Action::Sleep => self.action_sleep(agent_name, tick),
        }
    }

    fn effective_vision(&self) -> i32 {
        self.config.effective_vision_radius(self.time_of_day())
    }

    /// Direction-addressed targeting: a compass direction or `down` for the
    /// agent's own cell. Agents never address objects by id.
    fn resolve_direction(&self, agent_name: &str, direction: &str) -> Result<Position, ActionResult> {
        let position = match self.agent(agent_name) {
            Some(agent) => agent.position,
            None => return Err(ActionResult::fail("Unknown agent.")),
        };
        if direction.eq_ignore_ascii_case("down") {
            return Ok(position);
        }
        match Direction::parse(&direction.to_ascii_lowercase()) {
            Some(parsed) => Ok(position.step(parsed)),
            None => Err(ActionResult::fail(
                "Look north, south, east, west, or down at your feet.",
            )),
        }
    }

    // --- Movement ---

    fn action_walk(&mut self, agent_name: &str, direction: Direction, tick: u64) -> ActionResult {
        let from = match self.agent(agent_name) {
            Some(agent) => agent.position,
            None => return ActionResult::fail("Unknown agent."),
        };
        if !self.can_step(from, direction) {
            return ActionResult::fail(format!(
                "Cannot move {} - the way is blocked.",
                direction.as_str()
            ));
        }

        let to = from.step(direction);
        self.update_position(agent_name, to);

        ActionResult::ok_with(
            format!("Moved {}.", direction.as_str()),
            vec![Event::unsequenced(
                tick,
                EventKind::AgentMoved {
                    agent: agent_name.to_string(),
                    from,
                    to,
                },
            )],
            Some(json!({ "direction": direction.as_str(), "position": to })),
        )
    }

    fn action_approach(&mut self, agent_name: &str, target: &str, tick: u64) -> ActionResult {
        let from = match self.agent(agent_name) {
            Some(agent) => agent.position,
            None => return ActionResult::fail("Unknown agent."),
        };
        let radius = self.effective_vision();

        let target_position = if let Some(other) = self.agent(target) {
            if from.chebyshev_distance(other.position) > radius {
                return ActionResult::fail(format!("You don't see {target} nearby."));
            }
            other.position
        } else {
            // Fall back to a visible object named by kind.
            let mut candidates: Vec<Position> = self
                .objects
                .values()
                .filter(|object| {
                    from.chebyshev_distance(object.position) <= radius
                        && match &object.kind {
                            ObjectKind::Sign { .. } => target.eq_ignore_ascii_case("sign"),
                            ObjectKind::PlacedItem { item_kind, .. } => item_kind == target,
                        }
                })
                .map(|object| object.position)
                .collect();
            candidates.sort_by_key(|position| (from.chebyshev_distance(*position), position.y, position.x));
            match candidates.first() {
                Some(position) => *position,
                None => return ActionResult::fail(format!("Cannot find {target} to approach.")),
            }
        };

        let Some(direction) = from.direction_to(target_position) else {
            return ActionResult::fail("Already at that spot.");
        };
        if !self.can_step(from, direction) {
            return ActionResult::fail(format!("Cannot move toward {target} - the way is blocked."));
        }

        let to = from.step(direction);
        self.update_position(agent_name, to);

        ActionResult::ok_with(
            format!("Moved toward {target}."),
            vec![Event::unsequenced(
                tick,
                EventKind::AgentMoved {
                    agent: agent_name.to_string(),
                    from,
                    to,
                },
            )],
            Some(json!({ "target": target, "position": to })),
        )
    }

    fn action_journey(
        &mut self,
        agent_name: &str,
        destination: &JourneyTarget,
        tick: u64,
    ) -> ActionResult {
        let destination = match destination {
            JourneyTarget::Position(position) => *position,
            JourneyTarget::Landmark(name) => match self.place_position(name) {
                Some(position) => position,
                None => return ActionResult::fail(format!("No place called \"{name}\" is known.")),
            },
        };

        match self.start_journey(agent_name, destination) {
            Ok(steps) => ActionResult::ok_with(
                format!("Began a journey of about {steps} steps."),
                vec![Event::unsequenced(
                    tick,
                    EventKind::JourneyStarted {
                        agent: agent_name.to_string(),
                        destination,
                        path_length: steps,
                    },
                )],
                Some(json!({ "destination": destination, "steps": steps })),
            ),
            Err(JourneyPlanError::AlreadyThere) => ActionResult::fail("Already at that spot."),
            Err(JourneyPlanError::Unreachable) => {
                ActionResult::fail("No path leads there from here.")
            }
        }
    }

    // --- Perception ---

    fn action_examine(&mut self, agent_name: &str, direction: &str) -> ActionResult {
        let target = match self.resolve_direction(agent_name, direction) {
            Ok(position) => position,
            Err(result) => return result,
        };

        let cell = self.cell(target);
        let mut data = json!({
            "direction": direction,
            "position": target,
            "terrain": cell.terrain.as_str(),
        });

        if !cell.walls.is_empty() {
            data["walls"] = json!(cell
                .walls
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>());
        }
        if !cell.doors.is_empty() {
            data["doors"] = json!(cell
                .doors
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>());
        }
        if let Some(place_name) = &cell.place_name {
            data["place_name"] = json!(place_name);
        }

        let objects: Vec<_> = self
            .objects_at(target)
            .into_iter()
            .map(|object| match &object.kind {
                ObjectKind::Sign { .. } => json!({ "kind": "sign" }),
                ObjectKind::PlacedItem {
                    item_kind,
                    quantity,
                    properties,
                } => json!({
                    "kind": item_kind,
                    "quantity": quantity,
                    "properties": properties,
                }),
            })
            .collect();
        if !objects.is_empty() {
            data["objects"] = json!(objects);
        }

        let others: Vec<_> = self
            .agents_at(target)
            .into_iter()
            .filter(|other| other.name != agent_name)
            .map(|other| {
                json!({
                    "name": other.name,
                    "sleeping": other.sleeping,
                    "journeying": other.is_journeying(),
                })
            })
            .collect();
        if !others.is_empty() {
            data["agents"] = json!(others);
        }

        let phrase = if direction.eq_ignore_ascii_case("down") {
            "beneath you".to_string()
        } else {
            format!("to the {direction}")
        };
        ActionResult::ok_with(format!("You examine what lies {phrase}."), Vec::new(), Some(data))
    }

    fn action_sense_others(&mut self, agent_name: &str) -> ActionResult {
        let sensed: Vec<_> = self
            .sense_others(agent_name)
            .into_iter()
            .map(|entry| {
                json!({
                    "name": entry.name,
                    "direction": entry.direction.map(|d| d.as_str()),
                    "distance": entry.distance.as_str(),
                })
            })
            .collect();

        ActionResult::ok_with(
            "You reach out with your senses.",
            Vec::new(),
            Some(json!({ "sensed": sensed })),
        )
    }

    // --- Interaction ---

    fn action_take(&mut self, agent_name: &str, direction: &str, tick: u64) -> ActionResult {
        let target = match self.resolve_direction(agent_name, direction) {
            Ok(position) => position,
            Err(result) => return result,
        };

        let taken = self
            .objects_at(target)
            .into_iter()
            .find_map(|object| match &object.kind {
                ObjectKind::PlacedItem { .. } => Some(object.id.clone()),
                ObjectKind::Sign { .. } => None,
            });

        let Some(object_id) = taken else {
            return ActionResult::fail("Nothing to pick up there.");
        };
        let Some(object) = self.remove_object(&object_id) else {
            return ActionResult::fail("Nothing to pick up there.");
        };
        let ObjectKind::PlacedItem {
            item_kind,
            quantity,
            properties,
        } = object.kind
        else {
            return ActionResult::fail("Nothing to pick up there.");
        };

        if self.recipes.is_stackable_kind(&item_kind) {
            self.add_resource(agent_name, &item_kind, quantity);
        } else {
            self.add_item(
                agent_name,
                Item {
                    id: object.id.clone(),
                    kind: item_kind.clone(),
                    properties,
                },
            );
        }

        ActionResult::ok_with(
            if quantity > 1 {
                format!("Picked up {quantity} {item_kind}.")
            } else {
                format!("Picked up {item_kind}.")
            },
            vec![Event::unsequenced(
                tick,
                EventKind::ItemTaken {
                    agent: agent_name.to_string(),
                    object_id: object.id,
                    kind: item_kind.clone(),
                    from: target,
                },
            )],
            Some(json!({ "kind": item_kind, "quantity": quantity })),
        )
    }

    fn action_drop(&mut self, agent_name: &str, kind: &str, quantity: u32, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;

        if agent.inventory.has_resource(kind, quantity) {
            self.remove_resource(agent_name, kind, quantity);
            let id = self.mint_object_id();
            self.insert_object(WorldObject::placed_item(
                id.clone(),
                position,
                agent_name,
                tick,
                kind,
                quantity,
                Vec::new(),
            ));
            return ActionResult::ok_with(
                format!("Dropped {quantity} {kind}."),
                vec![Event::unsequenced(
                    tick,
                    EventKind::ItemDropped {
                        agent: agent_name.to_string(),
                        kind: kind.to_string(),
                        quantity,
                        at: position,
                    },
                )],
                None,
            );
        }

        // Unique items are addressed by kind (or id) and drop one at a time.
        let item_id = agent
            .inventory
            .item(kind)
            .or_else(|| agent.inventory.item_of_kind(kind))
            .map(|item| item.id.clone());
        let Some(item_id) = item_id else {
            return ActionResult::fail(format!("You don't have {kind}."));
        };
        let Some(item) = self.remove_item(agent_name, &item_id) else {
            return ActionResult::fail(format!("You don't have {kind}."));
        };
        let dropped_kind = item.kind.clone();
        self.insert_object(WorldObject::placed_item(
            item.id,
            position,
            agent_name,
            tick,
            item.kind,
            1,
            item.properties,
        ));

        ActionResult::ok_with(
            format!("Dropped {dropped_kind}."),
            vec![Event::unsequenced(
                tick,
                EventKind::ItemDropped {
                    agent: agent_name.to_string(),
                    kind: dropped_kind,
                    quantity: 1,
                    at: position,
                },
            )],
            None,
        )
    }

    fn action_give(
        &mut self,
        agent_name: &str,
        recipient: &str,
        kind: &str,
        quantity: u32,
        tick: u64,
    ) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let Some(other) = self.agent(recipient) else {
            return ActionResult::fail(format!("No one named {recipient} is here."));
        };
        // One step: same cell or a cardinally adjacent one.
        if agent.position.manhattan_distance(other.position) > 1 {
            return ActionResult::fail(format!("{recipient} is too far away to hand anything to."));
        }

        if agent.inventory.has_resource(kind, quantity) {
            self.remove_resource(agent_name, kind, quantity);
            self.add_resource(recipient, kind, quantity);
            return ActionResult::ok_with(
                format!("Gave {quantity} {kind} to {recipient}."),
                vec![Event::unsequenced(
                    tick,
                    EventKind::ItemGiven {
                        giver: agent_name.to_string(),
                        receiver: recipient.to_string(),
                        kind: kind.to_string(),
                        quantity,
                    },
                )],
                None,
            );
        }

        let item_id = agent
            .inventory
            .item(kind)
            .or_else(|| agent.inventory.item_of_kind(kind))
            .map(|item| item.id.clone());
        let Some(item_id) = item_id else {
            return ActionResult::fail(format!("You don't have {kind}."));
        };
        let Some(item) = self.remove_item(agent_name, &item_id) else {
            return ActionResult::fail(format!("You don't have {kind}."));
        };
        let given_kind = item.kind.clone();
        self.add_item(recipient, item);

        ActionResult::ok_with(
            format!("Gave {given_kind} to {recipient}."),
            vec![Event::unsequenced(
                tick,
                EventKind::ItemGiven {
                    giver: agent_name.to_string(),
                    receiver: recipient.to_string(),
                    kind: given_kind,
                    quantity: 1,
                },
            )],
            None,
        )
    }

    fn action_gather(&mut self, agent_name: &str, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        let terrain = self.cell(position).terrain;

        let Some(resource) = terrain.gatherable_resource() else {
            return ActionResult::fail("Nothing to gather here.");
        };

        self.add_resource(agent_name, resource, 1);

        ActionResult::ok_with(
            format!("Gathered {resource}."),
            vec![Event::unsequenced(
                tick,
                EventKind::AgentGathered {
                    agent: agent_name.to_string(),
                    resource: resource.to_string(),
                    at: position,
                },
            )],
            Some(json!({ "resource": resource })),
        )
    }

    // --- Material (crafting) ---

    /// Resolves an item reference (stack kind, unique item id, or unique
    /// item kind) to its kind, or None if the agent holds nothing matching.
    fn resolve_item_kind(&self, agent_name: &str, reference: &str) -> Option<String> {
        let agent = self.agent(agent_name)?;
        if agent.inventory.has_resource(reference, 1) {
            return Some(reference.to_string());
        }
        if let Some(item) = agent.inventory.item(reference) {
            return Some(item.kind.clone());
        }
        agent
            .inventory
            .item_of_kind(reference)
            .map(|item| item.kind.clone())
    }

    /// Consumes one unit of a kind, preferring stacks over unique items.
    fn consume_kind(&mut self, agent_name: &str, kind: &str) -> bool {
        if self.remove_resource(agent_name, kind, 1) {
            return true;
        }
        let item_id = self
            .agent(agent_name)
            .and_then(|agent| agent.inventory.item_of_kind(kind))
            .map(|item| item.id.clone());
        match item_id {
            Some(id) => self.remove_item(agent_name, &id).is_some(),
            None => false,
        }
    }

    fn holds_kind(&self, agent_name: &str, kind: &str, count: u32) -> bool {
        let Some(agent) = self.agent(agent_name) else {
            return false;
        };
        let stacked = agent.inventory.resource_quantity(kind);
        let unique = agent
            .inventory
            .items
            .iter()
            .filter(|item| item.kind == kind)
            .count() as u32;
        stacked + unique >= count
    }

    fn grant_craft_output(&mut self, agent_name: &str, outcome: &crate::crafting::CraftOutcome) {
        if outcome.output_stackable {
            self.add_resource(agent_name, &outcome.output_kind, outcome.output_quantity);
        } else {
            let id = self.mint_object_id();
            self.add_item(
                agent_name,
                Item {
                    id,
                    kind: outcome.output_kind.clone(),
                    properties: outcome.properties.clone(),
                },
            );
        }
    }

    fn craft_failure(&self, message: String, hints: Vec<String>) -> ActionResult {
        let mut full = message;
        if let Some(first) = hints.first() {
            full.push(' ');
            full.push_str(first);
        }
        ActionResult::fail_with(full, json!({ "hints": hints }))
    }

    fn action_combine(&mut self, agent_name: &str, items: &[String], tick: u64) -> ActionResult {
        if items.len() < 2 {
            return ActionResult::fail("Combining takes at least two materials.");
        }

        // Unheld references stay as literal kind names so a miss can still
        // hint at recipes sharing the inputs the agent does hold.
        let kinds: Vec<String> = items
            .iter()
            .map(|reference| {
                self.resolve_item_kind(agent_name, reference)
                    .unwrap_or_else(|| reference.clone())
            })
            .collect();

        let outcome = match self.recipes.try_craft(CraftVerb::Combine, &kinds, None) {
            Ok(outcome) => outcome,
            Err(miss) => {
                return self.craft_failure(
                    "Those materials don't combine in any useful way.".to_string(),
                    miss.hints,
                )
            }
        };

        // The recipe matched; now the agent must actually hold every input.
        let mut counted: std::collections::BTreeMap<&str, u32> = std::collections::BTreeMap::new();
        for kind in &kinds {
            *counted.entry(kind.as_str()).or_insert(0) += 1;
        }
        for (kind, count) in &counted {
            if !self.holds_kind(agent_name, kind, *count) {
                return ActionResult::fail(format!("You need at least {count} {kind}."));
            }
        }

        for kind in &outcome.consumed {
            self.consume_kind(agent_name, kind);
        }
        self.grant_craft_output(agent_name, &outcome);

        ActionResult::ok_with(
            format!("Created {}. {}", outcome.output_kind, outcome.description),
            vec![Event::unsequenced(
                tick,
                EventKind::CraftSucceeded {
                    agent: agent_name.to_string(),
                    inputs: kinds,
                    technique: None,
                    output: outcome.output_kind.clone(),
                    quantity: outcome.output_quantity,
                },
            )],
            Some(json!({
                "output": outcome.output_kind,
                "quantity": outcome.output_quantity,
                "properties": outcome.properties,
                "discoveries": outcome.discoveries,
            })),
        )
    }

    fn action_work(
        &mut self,
        agent_name: &str,
        material: &str,
        technique: &str,
        tick: u64,
    ) -> ActionResult {
        let kind = self
            .resolve_item_kind(agent_name, material)
            .unwrap_or_else(|| material.to_string());

        let inputs = vec![kind.clone()];
        let outcome = match self.recipes.try_craft(CraftVerb::Work, &inputs, Some(technique)) {
            Ok(outcome) => outcome,
            Err(miss) => {
                return self.craft_failure(
                    format!("The {technique} technique does nothing for {kind}."),
                    miss.hints,
                )
            }
        };

        if !self.holds_kind(agent_name, &kind, 1) {
            return ActionResult::fail(format!("You don't have {material}."));
        }

        for consumed in &outcome.consumed {
            self.consume_kind(agent_name, consumed);
        }
        self.grant_craft_output(agent_name, &outcome);

        ActionResult::ok_with(
            format!("Created {}. {}", outcome.output_kind, outcome.description),
            vec![Event::unsequenced(
                tick,
                EventKind::CraftSucceeded {
                    agent: agent_name.to_string(),
                    inputs,
                    technique: Some(technique.to_string()),
                    output: outcome.output_kind.clone(),
                    quantity: outcome.output_quantity,
                },
            )],
            Some(json!({
                "output": outcome.output_kind,
                "quantity": outcome.output_quantity,
                "properties": outcome.properties,
                "discoveries": outcome.discoveries,
            })),
        )
    }

    fn action_apply(&mut self, agent_name: &str, tool: &str, target: &str, tick: u64) -> ActionResult {
        let tool_kind = self
            .resolve_item_kind(agent_name, tool)
            .unwrap_or_else(|| tool.to_string());
        let target_kind = self
            .resolve_item_kind(agent_name, target)
            .unwrap_or_else(|| target.to_string());

        // Unique tools must actually be usable as one.
        let tool_usable = match self.agent(agent_name).and_then(|agent| {
            agent
                .inventory
                .item(tool)
                .or_else(|| agent.inventory.item_of_kind(&tool_kind))
        }) {
            Some(item) => item.has_property("tool") || item.has_property("heat"),
            None => true,
        };
        if !tool_usable {
            return ActionResult::fail(format!("The {tool_kind} cannot be used that way."));
        }

        let inputs = vec![tool_kind.clone(), target_kind.clone()];
        let outcome = match self.recipes.try_craft(CraftVerb::Apply, &inputs, None) {
            Ok(outcome) => outcome,
            Err(miss) => {
                return self.craft_failure(
                    format!("The {tool_kind} does nothing useful to the {target_kind}."),
                    miss.hints,
                )
            }
        };

        if !self.holds_kind(agent_name, &tool_kind, 1) {
            return ActionResult::fail(format!("You don't have {tool}."));
        }
        for consumed in &outcome.consumed {
            if !self.holds_kind(agent_name, consumed, 1) {
                return ActionResult::fail(format!("You don't have {consumed}."));
            }
        }

        for consumed in &outcome.consumed {
            self.consume_kind(agent_name, consumed);
        }
        self.grant_craft_output(agent_name, &outcome);

        ActionResult::ok_with(
            format!("Created {}. {}", outcome.output_kind, outcome.description),
            vec![Event::unsequenced(
                tick,
                EventKind::CraftSucceeded {
                    agent: agent_name.to_string(),
                    inputs,
                    technique: None,
                    output: outcome.output_kind.clone(),
                    quantity: outcome.output_quantity,
                },
            )],
            Some(json!({
                "output": outcome.output_kind,
                "quantity": outcome.output_quantity,
                "properties": outcome.properties,
                "discoveries": outcome.discoveries,
            })),
        )
    }

    // --- Building ---

    /// Convenience macro: a 3x3 enclosure centered on the agent with a door
    /// in the middle of the facing side. Overlapping existing walls is
    /// additive.
    fn action_build_shelter(&mut self, agent_name: &str, facing: Direction, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let center = agent.position;

        let ring = Rect3::around(center);
        if !ring.fits(self.meta.width, self.meta.height) {
            return ActionResult::fail("Too close to the edge of the world to build here.");
        }
        if !agent.inventory.has_resource("wood", SHELTER_WOOD_COST) {
            return ActionResult::fail(format!(
                "Need at least {SHELTER_WOOD_COST} wood to build a shelter."
            ));
        }

        self.remove_resource(agent_name, "wood", SHELTER_WOOD_COST);

        let mut events = Vec::new();
        for (position, direction) in ring.outer_edges() {
            self.place_wall(position, direction);
            events.push(Event::unsequenced(
                tick,
                EventKind::WallPlaced {
                    position,
                    direction,
                    builder: agent_name.to_string(),
                },
            ));
        }

        let door_cell = center.step(facing);
        self.place_door(door_cell, facing);
        events.push(Event::unsequenced(
            tick,
            EventKind::DoorPlaced {
                position: door_cell,
                direction: facing,
                builder: agent_name.to_string(),
            },
        ));

        if let Some((structure_id, true)) = self.detect_structure(center, Some(agent_name)) {
            if let Some(structure) = self.structures.get(&structure_id) {
                events.push(Event::unsequenced(
                    tick,
                    EventKind::StructureDetected {
                        structure_id: structure_id.clone(),
                        size: structure.size(),
                        creators: structure.creators.iter().cloned().collect(),
                    },
                ));
            }
        }

        ActionResult::ok_with("Built a shelter around yourself.", events, None)
    }

    fn action_place_wall(&mut self, agent_name: &str, direction: Direction, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        if !agent.inventory.has_resource("wood", WALL_WOOD_COST) {
            return ActionResult::fail("Need wood to build a wall.");
        }

        self.remove_resource(agent_name, "wood", WALL_WOOD_COST);
        self.place_wall(position, direction);

        let mut events = vec![Event::unsequenced(
            tick,
            EventKind::WallPlaced {
                position,
                direction,
                builder: agent_name.to_string(),
            },
        )];

        // A new wall can close a region on either side of the edge.
        for seed in [position, position.step(direction)] {
            if let Some((structure_id, true)) = self.detect_structure(seed, Some(agent_name)) {
                if let Some(structure) = self.structures.get(&structure_id) {
                    events.push(Event::unsequenced(
                        tick,
                        EventKind::StructureDetected {
                            structure_id: structure_id.clone(),
                            size: structure.size(),
                            creators: structure.creators.iter().cloned().collect(),
                        },
                    ));
                }
            }
        }

        ActionResult::ok_with(
            format!("Built a wall to the {}.", direction.as_str()),
            events,
            None,
        )
    }

    fn action_place_door(&mut self, agent_name: &str, direction: Direction, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        let cell = self.cell(position);
        if !cell.has_wall(direction) {
            return ActionResult::fail(format!(
                "There is no wall to the {} to put a door in.",
                direction.as_str()
            ));
        }
        if cell.has_door(direction) {
            return ActionResult::fail(format!(
                "There is already a door to the {}.",
                direction.as_str()
            ));
        }

        self.place_door(position, direction);

        ActionResult::ok_with(
            format!("Set a door into the {} wall.", direction.as_str()),
            vec![Event::unsequenced(
                tick,
                EventKind::DoorPlaced {
                    position,
                    direction,
                    builder: agent_name.to_string(),
                },
            )],
            None,
        )
    }

    fn action_place_item(&mut self, agent_name: &str, item_ref: &str, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;

        if agent.inventory.has_resource(item_ref, 1) {
            self.remove_resource(agent_name, item_ref, 1);
            let id = self.mint_object_id();
            self.insert_object(WorldObject::placed_item(
                id.clone(),
                position,
                agent_name,
                tick,
                item_ref,
                1,
                Vec::new(),
            ));
            return ActionResult::ok_with(
                format!("Placed {item_ref}."),
                vec![Event::unsequenced(
                    tick,
                    EventKind::ObjectPlaced {
                        object_id: id,
                        kind: item_ref.to_string(),
                        position,
                        by: agent_name.to_string(),
                    },
                )],
                None,
            );
        }

        let item_id = agent
            .inventory
            .item(item_ref)
            .or_else(|| agent.inventory.item_of_kind(item_ref))
            .map(|item| item.id.clone());
        let Some(item_id) = item_id else {
            return ActionResult::fail(format!("You don't have {item_ref}."));
        };
        let Some(item) = self.remove_item(agent_name, &item_id) else {
            return ActionResult::fail(format!("You don't have {item_ref}."));
        };
        let kind = item.kind.clone();
        let id = item.id.clone();
        self.insert_object(WorldObject::placed_item(
            item.id,
            position,
            agent_name,
            tick,
            item.kind,
            1,
            item.properties,
        ));

        ActionResult::ok_with(
            format!("Placed {kind}."),
            vec![Event::unsequenced(
                tick,
                EventKind::ObjectPlaced {
                    object_id: id,
                    kind,
                    position,
                    by: agent_name.to_string(),
                },
            )],
            None,
        )
    }

    fn action_remove_wall(&mut self, agent_name: &str, direction: Direction, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        if !self.cell(position).has_wall(direction) {
            return ActionResult::fail(format!(
                "There is no wall to the {} to remove.",
                direction.as_str()
            ));
        }

        self.remove_wall(position, direction);
        let detected = self.rebuild_structures_after_removal(position, position.step(direction));

        let mut events = vec![Event::unsequenced(
            tick,
            EventKind::WallRemoved {
                position,
                direction,
                builder: agent_name.to_string(),
            },
        )];
        for structure_id in detected {
            if let Some(structure) = self.structures.get(&structure_id) {
                events.push(Event::unsequenced(
                    tick,
                    EventKind::StructureDetected {
                        structure_id: structure_id.clone(),
                        size: structure.size(),
                        creators: structure.creators.iter().cloned().collect(),
                    },
                ));
            }
        }

        ActionResult::ok_with(
            format!("Removed the wall to the {}.", direction.as_str()),
            events,
            None,
        )
    }

    // --- Expression ---

    fn action_write_sign(&mut self, agent_name: &str, text: &str, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        let id = self.mint_object_id();
        self.insert_object(WorldObject::sign(id.clone(), position, agent_name, tick, text));

        ActionResult::ok_with(
            "Wrote a sign.",
            vec![Event::unsequenced(
                tick,
                EventKind::SignWritten {
                    object_id: id,
                    position,
                    text: text.to_string(),
                    author: agent_name.to_string(),
                },
            )],
            None,
        )
    }

    fn action_read_sign(&mut self, agent_name: &str, direction: &str) -> ActionResult {
        let target = match self.resolve_direction(agent_name, direction) {
            Ok(position) => position,
            Err(result) => return result,
        };

        let sign = self
            .objects_at(target)
            .into_iter()
            .find_map(|object| match &object.kind {
                ObjectKind::Sign { text } => Some((text.clone(), object.created_by.clone())),
                ObjectKind::PlacedItem { .. } => None,
            });

        match sign {
            Some((text, author)) => ActionResult::ok_with(
                format!("The sign reads: \"{text}\""),
                Vec::new(),
                Some(json!({ "text": text, "author": author })),
            ),
            None => ActionResult::fail("There is no sign there."),
        }
    }

    fn action_name_place(&mut self, agent_name: &str, name: &str, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        if name.trim().is_empty() {
            return ActionResult::fail("A place needs a name.");
        }
        let position = agent.position;
        self.rename_place(position, name);

        ActionResult::ok_with(
            format!("Named this place \"{name}\"."),
            vec![Event::unsequenced(
                tick,
                EventKind::PlaceNamed {
                    position,
                    name: name.to_string(),
                    by: agent_name.to_string(),
                },
            )],
            None,
        )
    }

    // --- Social ---

    fn action_speak(&mut self, agent_name: &str, text: &str, tick: u64) -> ActionResult {
        let Some(conversation_id) = self.add_turn(agent_name, text, tick) else {
            return ActionResult::fail("You are not in a conversation.");
        };

        ActionResult::ok_with(
            format!("You say: {text}"),
            vec![Event::unsequenced(
                tick,
                EventKind::ConversationTurnAdded {
                    conversation_id,
                    speaker: agent_name.to_string(),
                    text: text.to_string(),
                },
            )],
            None,
        )
    }

    fn action_invite(
        &mut self,
        agent_name: &str,
        invitee: &str,
        privacy: Privacy,
        tick: u64,
    ) -> ActionResult {
        if self.is_in_conversation(agent_name) {
            return ActionResult::fail("You are already in a conversation. Leave it first.");
        }
        if privacy == Privacy::Private {
            if let Some(outgoing) = self.pending_invitation_from(agent_name) {
                if outgoing.privacy == Privacy::Private {
                    return ActionResult::fail(
                        "You already have a pending private invitation. Wait for a response.",
                    );
                }
            }
        }

        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let Some(other) = self.agent(invitee) else {
            return ActionResult::fail(format!("No one named {invitee} is here."));
        };
        if agent.position.chebyshev_distance(other.position) > self.effective_vision() {
            return ActionResult::fail(format!("{invitee} is too far away to invite."));
        }
        if self.pending_invitation_for(invitee).is_some() {
            return ActionResult::fail(format!("{invitee} already has a pending invitation."));
        }
        if self.is_in_conversation(invitee) {
            return ActionResult::fail(format!("{invitee} is already in a conversation."));
        }

        let invitation_id = self.create_invitation(agent_name, invitee, privacy, tick);

        ActionResult::ok_with(
            format!(
                "You invited {invitee} to a {} conversation.",
                privacy.as_str()
            ),
            vec![Event::unsequenced(
                tick,
                EventKind::InvitationSent {
                    invitation_id,
                    inviter: agent_name.to_string(),
                    invitee: invitee.to_string(),
                    privacy,
                },
            )],
            None,
        )
    }

    fn action_accept_invite(&mut self, agent_name: &str, tick: u64) -> ActionResult {
        if self.is_in_conversation(agent_name) {
            return ActionResult::fail("You are already in a conversation. Leave it first.");
        }

        let Some(outcome) = self.accept_invitation(agent_name, tick) else {
            return ActionResult::fail("You have no pending invitation.");
        };

        let mut events = vec![Event::unsequenced(
            tick,
            EventKind::InvitationAccepted {
                invitation_id: outcome.invitation.id.clone(),
                agent: agent_name.to_string(),
                inviter: outcome.invitation.inviter.clone(),
                conversation_id: outcome.conversation_id.clone(),
            },
        )];

        if outcome.started {
            let participants = self
                .conversation(&outcome.conversation_id)
                .map(|conversation| {
                    conversation
                        .active_participants()
                        .map(|p| p.name.clone())
                        .collect()
                })
                .unwrap_or_default();
            events.push(Event::unsequenced(
                tick,
                EventKind::ConversationStarted {
                    conversation_id: outcome.conversation_id.clone(),
                    participants,
                    privacy: outcome.invitation.privacy,
                },
            ));
        } else {
            events.push(Event::unsequenced(
                tick,
                EventKind::ConversationParticipantJoined {
                    conversation_id: outcome.conversation_id.clone(),
                    agent: agent_name.to_string(),
                },
            ));
        }

        ActionResult::ok_with(
            format!("You joined a conversation with {}.", outcome.invitation.inviter),
            events,
            Some(json!({
                "conversation_id": outcome.conversation_id,
                "inviter": outcome.invitation.inviter,
                "privacy": outcome.invitation.privacy.as_str(),
            })),
        )
    }

    fn action_decline_invite(&mut self, agent_name: &str, tick: u64) -> ActionResult {
        let Some(invitation) = self.decline_invitation(agent_name) else {
            return ActionResult::fail("You have no pending invitation.");
        };

        ActionResult::ok_with(
            format!("You declined {}'s invitation.", invitation.inviter),
            vec![Event::unsequenced(
                tick,
                EventKind::InvitationDeclined {
                    invitation_id: invitation.id,
                    agent: agent_name.to_string(),
                    inviter: invitation.inviter,
                },
            )],
            None,
        )
    }

    fn action_join_conversation(
        &mut self,
        agent_name: &str,
        participant: &str,
        tick: u64,
    ) -> ActionResult {
        if self.is_in_conversation(agent_name) {
            return ActionResult::fail("You are already in a conversation. Leave it first.");
        }
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let Some(other) = self.agent(participant) else {
            return ActionResult::fail(format!("No one named {participant} is here."));
        };
        if agent.position.chebyshev_distance(other.position) > self.effective_vision() {
            return ActionResult::fail(format!("{participant} is too far away to see."));
        }

        let Some(conversation) = self.conversation_for_agent(participant) else {
            return ActionResult::fail(format!("{participant} is not in a conversation."));
        };
        if conversation.privacy == Privacy::Private {
            return ActionResult::fail(format!("{participant}'s conversation is private."));
        }
        let conversation_id = conversation.id.clone();

        self.add_participant(&conversation_id, agent_name, tick);

        let others: Vec<String> = self
            .conversation(&conversation_id)
            .map(|conversation| {
                conversation
                    .active_participants()
                    .filter(|p| p.name != agent_name)
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        ActionResult::ok_with(
            format!("You joined the conversation with {}.", others.join(", ")),
            vec![Event::unsequenced(
                tick,
                EventKind::ConversationParticipantJoined {
                    conversation_id,
                    agent: agent_name.to_string(),
                },
            )],
            None,
        )
    }

    fn action_leave_conversation(&mut self, agent_name: &str, tick: u64) -> ActionResult {
        let Some((conversation_id, ended)) = self.leave_conversation(agent_name, tick) else {
            return ActionResult::fail("You are not in a conversation.");
        };

        let mut events = vec![Event::unsequenced(
            tick,
            EventKind::ConversationParticipantLeft {
                conversation_id: conversation_id.clone(),
                agent: agent_name.to_string(),
            },
        )];
        if ended {
            events.push(Event::unsequenced(
                tick,
                EventKind::ConversationEnded {
                    conversation_id,
                    reason: "all_left".to_string(),
                },
            ));
        }

        ActionResult::ok_with(
            if ended {
                "You left the conversation. It has ended."
            } else {
                "You left the conversation."
            },
            events,
            None,
        )
    }

    // --- State ---

    fn action_sleep(&mut self, agent_name: &str, tick: u64) -> ActionResult {
        let Some(agent) = self.agent(agent_name) else {
            return ActionResult::fail("Unknown agent.");
        };
        let position = agent.position;
        self.set_sleeping(agent_name, true);

        ActionResult::ok_with(
            "You drift off to sleep.",
            vec![Event::unsequenced(
                tick,
                EventKind::AgentSlept {
                    agent: agent_name.to_string(),
                    at: position,
                },
            )],
            None,
        )
    }
}

/// The 3x3 shelter footprint around a center cell.
struct Rect3 {
    min: Position,
    max: Position,
}

impl Rect3 {
    fn around(center: Position) -> Self {
        Self {
            min: Position::new(center.x - 1, center.y - 1),
            max: Position::new(center.x + 1, center.y + 1),
        }
    }

    fn fits(&self, width: i32, height: i32) -> bool {
        self.min.in_bounds(width, height) && self.max.in_bounds(width, height)
    }

    /// Outward-facing edges of the ring: three per side, twelve in all.
    fn outer_edges(&self) -> Vec<(Position, Direction)> {
        let mut edges = Vec::with_capacity(12);
        for x in self.min.x..=self.max.x {
            edges.push((Position::new(x, self.min.y), Direction::North));
            edges.push((Position::new(x, self.max.y), Direction::South));
        }
        for y in self.min.y..=self.max.y {
            edges.push((Position::new(self.min.x, y), Direction::West));
            edges.push((Position::new(self.max.x, y), Direction::East));
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Agent, EngineConfig};

    fn kernel_with(agents: &[(&str, i32, i32)]) -> Kernel {
        let mut k = Kernel::new(EngineConfig {
            world_width: 40,
            world_height: 40,
            ..EngineConfig::default()
        });
        for (name, x, y) in agents {
            k.insert_agent(Agent::new(*name, "model-a", Position::new(*x, *y)));
        }
        k
    }

    fn give_wood(k: &mut Kernel, name: &str, quantity: u32) {
        k.add_resource(name, "wood", quantity);
    }

    #[test]
    fn walk_moves_and_emits_one_event() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let result = k.execute_action(
            "Ash",
            &Action::Walk {
                direction: Direction::North,
            },
            1,
        );
        assert!(result.success);
        assert_eq!(result.events.len(), 1);
        assert_eq!(k.agent("Ash").expect("ash").position, Position::new(5, 4));
    }

    #[test]
    fn blocked_walk_fails_without_events() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        give_wood(&mut k, "Ash", 1);
        k.execute_action(
            "Ash",
            &Action::PlaceWall {
                direction: Direction::North,
            },
            1,
        );

        let result = k.execute_action(
            "Ash",
            &Action::Walk {
                direction: Direction::North,
            },
            2,
        );
        assert!(!result.success);
        assert!(result.events.is_empty());
        assert_eq!(k.agent("Ash").expect("ash").position, Position::new(5, 5));
    }

    #[test]
    fn gather_takes_terrain_resource() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.seed_terrain([(Position::new(5, 5), contracts::Terrain::Forest)]);

        let result = k.execute_action("Ash", &Action::Gather, 1);
        assert!(result.success);
        assert_eq!(
            k.agent("Ash").expect("ash").inventory.resource_quantity("wood"),
            1
        );
    }

    #[test]
    fn gather_on_barren_terrain_fails_cleanly() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.seed_terrain([(Position::new(5, 5), contracts::Terrain::Hill)]);

        let result = k.execute_action("Ash", &Action::Gather, 1);
        assert!(!result.success);
        assert!(result.events.is_empty());
        assert!(k.agent("Ash").expect("ash").inventory.is_empty());
    }

    #[test]
    fn drop_then_take_round_trips_a_stack() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        give_wood(&mut k, "Ash", 3);

        let dropped = k.execute_action(
            "Ash",
            &Action::Drop {
                kind: "wood".to_string(),
                quantity: 2,
            },
            1,
        );
        assert!(dropped.success);
        assert_eq!(
            k.agent("Ash").expect("ash").inventory.resource_quantity("wood"),
            1
        );

        let taken = k.execute_action(
            "Ash",
            &Action::Take {
                direction: "down".to_string(),
            },
            2,
        );
        assert!(taken.success);
        assert_eq!(
            k.agent("Ash").expect("ash").inventory.resource_quantity("wood"),
            3
        );
        assert!(k.objects().is_empty());
    }

    #[test]
    fn second_take_of_the_same_object_fails() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 5, 5)]);
        give_wood(&mut k, "Ash", 1);
        k.execute_action(
            "Ash",
            &Action::Drop {
                kind: "wood".to_string(),
                quantity: 1,
            },
            1,
        );

        let first = k.execute_action(
            "Ash",
            &Action::Take {
                direction: "down".to_string(),
            },
            1,
        );
        let second = k.execute_action(
            "Briar",
            &Action::Take {
                direction: "down".to_string(),
            },
            1,
        );
        assert!(first.success);
        assert!(!second.success);
        assert!(second.events.is_empty());
    }

    #[test]
    fn give_requires_adjacency() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 9, 5)]);
        give_wood(&mut k, "Ash", 1);

        let result = k.execute_action(
            "Ash",
            &Action::Give {
                recipient: "Briar".to_string(),
                kind: "wood".to_string(),
                quantity: 1,
            },
            1,
        );
        assert!(!result.success);
        assert_eq!(
            k.agent("Ash").expect("ash").inventory.resource_quantity("wood"),
            1
        );
    }

    #[test]
    fn give_transfers_between_adjacent_agents() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 6, 5)]);
        give_wood(&mut k, "Ash", 2);

        let result = k.execute_action(
            "Ash",
            &Action::Give {
                recipient: "Briar".to_string(),
                kind: "wood".to_string(),
                quantity: 2,
            },
            1,
        );
        assert!(result.success);
        assert_eq!(
            k.agent("Briar")
                .expect("briar")
                .inventory
                .resource_quantity("wood"),
            2
        );
        assert!(k.agent("Ash").expect("ash").inventory.is_empty());
    }

    #[test]
    fn failed_combine_consumes_nothing_and_hints() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        give_wood(&mut k, "Ash", 1);
        k.add_resource("Ash", "clay", 1);

        let result = k.execute_action(
            "Ash",
            &Action::Combine {
                items: vec!["wood".to_string(), "clay".to_string()],
            },
            1,
        );
        assert!(!result.success);
        assert!(result.events.is_empty());
        assert_eq!(
            k.agent("Ash").expect("ash").inventory.resource_quantity("wood"),
            1
        );
        let hints = result.data.expect("hints data");
        assert!(!hints["hints"].as_array().expect("array").is_empty());
    }

    #[test]
    fn work_crafts_and_consumes_material() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        give_wood(&mut k, "Ash", 1);

        let result = k.execute_action(
            "Ash",
            &Action::Work {
                material: "wood".to_string(),
                technique: "split".to_string(),
            },
            1,
        );
        assert!(result.success);
        let agent = k.agent("Ash").expect("ash");
        assert_eq!(agent.inventory.resource_quantity("wood"), 0);
        assert_eq!(agent.inventory.resource_quantity("planks"), 2);
    }

    #[test]
    fn apply_keeps_the_tool() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        give_wood(&mut k, "Ash", 1);
        k.add_item(
            "Ash",
            Item {
                id: "obj_axe".to_string(),
                kind: "stone_axe".to_string(),
                properties: vec!["tool".to_string(), "sharp".to_string()],
            },
        );

        let result = k.execute_action(
            "Ash",
            &Action::Apply {
                tool: "stone_axe".to_string(),
                target: "wood".to_string(),
            },
            1,
        );
        assert!(result.success);
        let agent = k.agent("Ash").expect("ash");
        assert!(agent.inventory.item_of_kind("stone_axe").is_some());
        assert_eq!(agent.inventory.resource_quantity("wood"), 0);
        assert_eq!(agent.inventory.resource_quantity("planks"), 3);
    }

    #[test]
    fn unique_craft_output_gets_a_fresh_id() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.add_resource("Ash", "clay", 1);

        let result = k.execute_action(
            "Ash",
            &Action::Work {
                material: "clay".to_string(),
                technique: "hollow".to_string(),
            },
            1,
        );
        assert!(result.success);
        let agent = k.agent("Ash").expect("ash");
        let vessel = agent.inventory.item_of_kind("clay_vessel").expect("vessel");
        assert!(vessel.has_property("vessel"));
    }

    #[test]
    fn shelter_builds_ring_with_facing_door() {
        let mut k = kernel_with(&[("Ash", 10, 10)]);
        give_wood(&mut k, "Ash", 4);

        let result = k.execute_action(
            "Ash",
            &Action::BuildShelter {
                facing: Direction::South,
            },
            1,
        );
        assert!(result.success);

        // Door sits on the southern edge of the cell south of center.
        let door_cell = k.cell(Position::new(10, 11));
        assert!(door_cell.has_door(Direction::South));

        // Structure covers the 3x3 interior with Ash as sole creator.
        let structure = k.structure_at(Position::new(10, 10)).expect("structure");
        assert_eq!(structure.size(), 9);
        assert_eq!(
            structure.creators.iter().collect::<Vec<_>>(),
            vec![&"Ash".to_string()]
        );
        assert!(k.agent("Ash").expect("ash").inventory.is_empty());

        let wall_events = result
            .events
            .iter()
            .filter(|event| matches!(event.kind, EventKind::WallPlaced { .. }))
            .count();
        assert_eq!(wall_events, 12);
        assert!(result
            .events
            .iter()
            .any(|event| matches!(event.kind, EventKind::StructureDetected { .. })));
    }

    #[test]
    fn shelter_without_wood_fails_clean() {
        let mut k = kernel_with(&[("Ash", 10, 10)]);
        let result = k.execute_action(
            "Ash",
            &Action::BuildShelter {
                facing: Direction::South,
            },
            1,
        );
        assert!(!result.success);
        assert!(result.events.is_empty());
        assert!(k.structures().is_empty());
        assert!(k.cell(Position::new(10, 9)).is_default());
    }

    #[test]
    fn door_needs_wall_first() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let result = k.execute_action(
            "Ash",
            &Action::PlaceDoor {
                direction: Direction::East,
            },
            1,
        );
        assert!(!result.success);
    }

    #[test]
    fn signs_read_back_full_text() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let text = "The long way around the marsh is faster than it looks.";
        k.execute_action(
            "Ash",
            &Action::WriteSign {
                text: text.to_string(),
            },
            1,
        );

        let result = k.execute_action(
            "Ash",
            &Action::ReadSign {
                direction: "down".to_string(),
            },
            2,
        );
        assert!(result.success);
        let data = result.data.expect("sign data");
        assert_eq!(data["text"], text);
        assert_eq!(data["author"], "Ash");
    }

    #[test]
    fn name_place_registers_landmark() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let result = k.execute_action(
            "Ash",
            &Action::NamePlace {
                name: "the old oak".to_string(),
            },
            1,
        );
        assert!(result.success);
        assert_eq!(k.place_position("the old oak"), Some(Position::new(5, 5)));
    }

    #[test]
    fn invite_requires_visibility() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 20, 20)]);
        let result = k.execute_action(
            "Ash",
            &Action::Invite {
                invitee: "Briar".to_string(),
                privacy: Privacy::Public,
            },
            1,
        );
        assert!(!result.success);
        assert!(k.pending_invitations().is_empty());
    }

    #[test]
    fn accept_works_from_any_distance() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 6, 5)]);
        k.execute_action(
            "Ash",
            &Action::Invite {
                invitee: "Briar".to_string(),
                privacy: Privacy::Public,
            },
            1,
        );
        // Briar wanders off before answering.
        k.update_position("Briar", Position::new(30, 30));

        let result = k.execute_action("Briar", &Action::AcceptInvite, 2);
        assert!(result.success);
        assert!(k.is_in_conversation("Ash"));
        assert!(k.is_in_conversation("Briar"));
    }

    #[test]
    fn speak_outside_conversation_fails() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let result = k.execute_action(
            "Ash",
            &Action::Speak {
                text: "anyone there?".to_string(),
            },
            1,
        );
        assert!(!result.success);
        assert!(result.events.is_empty());
    }

    #[test]
    fn join_requires_public_conversation_and_visible_member() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 6, 5), ("Cedar", 6, 6)]);
        k.execute_action(
            "Ash",
            &Action::Invite {
                invitee: "Briar".to_string(),
                privacy: Privacy::Private,
            },
            1,
        );
        k.execute_action("Briar", &Action::AcceptInvite, 1);

        let result = k.execute_action(
            "Cedar",
            &Action::JoinConversation {
                participant: "Ash".to_string(),
            },
            2,
        );
        assert!(!result.success);
        assert!(result.message.contains("private"));
    }

    #[test]
    fn night_shrinks_invite_range() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 8, 5)]);
        // Distance 3 is fine by day (tick 1 -> afternoon)...
        let day = k.execute_action(
            "Ash",
            &Action::Invite {
                invitee: "Briar".to_string(),
                privacy: Privacy::Public,
            },
            1,
        );
        assert!(day.success);
        k.decline_invitation("Briar");

        // ...but out of range at night (radius 3 * 0.6 -> 1).
        for _ in 0..3 {
            k.advance_tick();
        }
        assert_eq!(k.time_of_day(), contracts::TimeOfDay::Night);
        let night = k.execute_action(
            "Ash",
            &Action::Invite {
                invitee: "Briar".to_string(),
                privacy: Privacy::Public,
            },
            4,
        );
        assert!(!night.success);
    }

    #[test]
    fn sleep_sets_the_flag() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        let result = k.execute_action("Ash", &Action::Sleep, 1);
        assert!(result.success);
        assert!(k.agent("Ash").expect("ash").sleeping);
    }
}
