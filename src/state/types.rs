//! Game-state slices. Plain data, no behavior beyond the
//! invariants each slice is responsible for keeping (material caps, at most
//! one module per slot, at most one mission per id, fuel within capacity).

use crate::sidecar::LiveStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------
// Commander
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RankProgress {
    pub rank: i64,
    pub progress: i64,
}

/// The eight named rank categories the journal's `Rank`/`Progress` events
/// carry, one field each.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ranks {
    pub combat: RankProgress,
    pub trade: RankProgress,
    pub explore: RankProgress,
    pub soldier: RankProgress,
    pub exobiologist: RankProgress,
    pub empire: RankProgress,
    pub federation: RankProgress,
    pub cqc: RankProgress,
}

/// Reputation with the four superpowers, each in `-100.0..=100.0`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Reputation {
    pub empire: f64,
    pub federation: f64,
    pub alliance: f64,
    pub independent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Powerplay {
    pub power: Option<String>,
    pub merits: i64,
    pub rank: i64,
    pub time_pledged: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commander {
    pub frontier_id: Option<String>,
    pub name: Option<String>,
    pub credits: Option<i64>,
    pub loan: Option<i64>,
    pub ranks: Ranks,
    pub reputation: Reputation,
    pub game_mode: Option<String>,
    pub group: Option<String>,
    pub horizons: bool,
    pub odyssey: bool,
    pub language: Option<String>,
    pub game_version: Option<String>,
    pub build: Option<String>,
    pub powerplay: Powerplay,
    pub squadron: Option<String>,
}

// ---------------------------------------------------------------------
// Ship
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fuel {
    pub main: Option<f64>,
    pub reserve: Option<f64>,
    pub main_capacity: Option<f64>,
    pub reserve_capacity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub slot: String,
    pub item: String,
    pub on: bool,
    pub priority: Option<u32>,
    pub health: Option<f64>,
    pub value: Option<i64>,
    pub ammo_in_clip: Option<u32>,
    pub ammo_in_hopper: Option<u32>,
    /// Raw `Engineering` block, if the module has been modified. Kept as an
    /// open value rather than a fully typed blueprint/experimental-effect
    /// struct — the projector has no rule that reads into it structurally.
    pub engineering: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ship {
    pub ship_type: Option<String>,
    pub ship_id: Option<u64>,
    pub ship_name: Option<String>,
    pub ship_ident: Option<String>,
    pub hull_value: Option<i64>,
    pub modules_value: Option<i64>,
    pub rebuy: Option<i64>,
    pub hull_health: Option<f64>,
    pub unladen_mass: Option<f64>,
    pub cargo_capacity: Option<u32>,
    pub max_jump_range: Option<f64>,
    pub fuel: Fuel,
    /// Keyed by slot, so "at most one module per slot" is a
    /// structural property rather than something callers must check.
    pub modules: HashMap<String, Module>,
    /// Hold contents, kept in step with the `Cargo.json` sidecar.
    pub cargo: HashMap<String, u32>,
    pub cargo_count: u32,
    // Live booleans, mirrored here from the `Status.json` sidecar so a
    // reader of the ship slice alone sees a complete picture.
    pub hardpoints_deployed: bool,
    pub landing_gear_down: bool,
    pub shields_up: bool,
    pub cargo_scoop_open: bool,
    pub lights_on: bool,
    pub fsd_charging: bool,
    pub fsd_cooldown: bool,
    pub fsd_mass_locked: bool,
    pub silent_running: bool,
    pub night_vision: bool,
}

impl Ship {
    /// `Loadout` is the sole authority on module fitment:
    /// any event handler that touches modules must go through this, which
    /// replaces the whole set rather than patching it.
    pub fn replace_modules(&mut self, modules: Vec<Module>) {
        self.modules = modules.into_iter().map(|m| (m.slot.clone(), m)).collect();
    }

    pub fn set_fuel_main_capped(&mut self, value: f64) {
        let cap = self.fuel.main_capacity.unwrap_or(f64::MAX);
        self.fuel.main = Some(value.min(cap).max(0.0));
    }
}

// ---------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub station_type: Option<String>,
    pub market_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Surface {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub star_system: Option<String>,
    pub system_address: Option<i64>,
    pub star_pos: Option<[f64; 3]>,
    pub body: Option<String>,
    pub body_id: Option<i32>,
    pub body_type: Option<String>,
    pub docked: bool,
    pub landed: bool,
    pub on_foot: bool,
    pub supercruise: bool,
    pub in_srv: bool,
    pub in_fighter: bool,
    pub in_taxi: bool,
    pub in_multicrew: bool,
    pub station: Option<Station>,
    pub surface: Option<Surface>,
    pub distance_from_star: Option<f64>,
    pub system_allegiance: Option<String>,
    pub system_economy: Option<String>,
    pub system_government: Option<String>,
    pub system_security: Option<String>,
    pub population: Option<i64>,
}

impl Location {
    pub fn clear_station(&mut self) {
        self.docked = false;
        self.station = None;
    }

    pub fn clear_surface(&mut self) {
        self.landed = false;
        self.surface = None;
    }
}

// ---------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialCategory {
    Raw,
    Manufactured,
    Encoded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    pub localised_name: Option<String>,
    pub category: MaterialCategory,
    pub grade: u32,
    pub count: u32,
    pub maximum: u32,
}

/// Grade 1..5 caps 300/250/200/150/100. Material names outside this
/// table are accepted at a default grade of 1 — the catalogue below isn't
/// exhaustive, but new materials shouldn't make the projector reject data
/// it doesn't recognize.
fn material_grade(category: MaterialCategory, name: &str) -> Option<u32> {
    let grade1 = match category {
        MaterialCategory::Raw => ["carbon", "iron", "nickel", "phosphorus", "sulphur"].as_slice(),
        MaterialCategory::Manufactured => {
            ["basicconductors", "mechanicalscrap", "temperedalloys", "chemicalstorageunits"].as_slice()
        }
        MaterialCategory::Encoded => {
            ["scanarchives", "shieldcyclerecordings", "legacyfirmware"].as_slice()
        }
    };
    let grade2 = match category {
        MaterialCategory::Raw => {
            ["chromium", "germanium", "manganese", "selenium", "vanadium", "zinc"].as_slice()
        }
        MaterialCategory::Manufactured => {
            ["conductivecomponents", "mechanicalequipment", "heatresistantceramics"].as_slice()
        }
        MaterialCategory::Encoded => {
            ["scandatabanks", "shieldsoftwarepatterns", "encryptedfiles"].as_slice()
        }
    };
    let grade3 = match category {
        MaterialCategory::Raw => {
            ["arsenic", "cadmium", "mercury", "molybdenum", "niobium", "tin", "tungsten", "yttrium"].as_slice()
        }
        MaterialCategory::Manufactured => {
            ["conductiveceramics", "mechanicalcomponents", "heatvanes"].as_slice()
        }
        MaterialCategory::Encoded => {
            ["encodedshieldcyclerecordings", "encryptioncodes", "symmetrickeys"].as_slice()
        }
    };
    let grade4 = match category {
        MaterialCategory::Raw => ["antimony", "polonium", "ruthenium", "technetium", "tellurium"].as_slice(),
        MaterialCategory::Manufactured => {
            ["conductivepolymers", "configurablecomponents", "heatexchangers"].as_slice()
        }
        MaterialCategory::Encoded => {
            ["adaptiveencryptors", "dataminedwake", "shieldpatternanalysis"].as_slice()
        }
    };
    let grade5 = match category {
        MaterialCategory::Raw => ["boron", "rhenium", "lead", "osmium"].as_slice(),
        MaterialCategory::Manufactured => {
            ["biotechconductors", "imperialshielding", "protolightalloys"].as_slice()
        }
        MaterialCategory::Encoded => {
            ["classifiedscandata", "securityfirmwarepatches", "tg_weaponpatternanalysis"].as_slice()
        }
    };

    let key = canonical_material_name(name);
    if grade1.contains(&key.as_str()) {
        Some(1)
    } else if grade2.contains(&key.as_str()) {
        Some(2)
    } else if grade3.contains(&key.as_str()) {
        Some(3)
    } else if grade4.contains(&key.as_str()) {
        Some(4)
    } else if grade5.contains(&key.as_str()) {
        Some(5)
    } else {
        None
    }
}

pub fn canonical_material_name(name: &str) -> String {
    name.to_ascii_lowercase().replace([' ', '-', '_'], "")
}

/// Cap for a material's grade.
pub fn grade_cap(grade: u32) -> u32 {
    350 - grade.clamp(1, 5) * 50
}

/// Cap for a material's name, falling back to grade 1 for unrecognized
/// names so every material always has a concrete maximum.
pub fn material_cap(category: MaterialCategory, name: &str) -> u32 {
    grade_cap(material_grade(category, name).unwrap_or(1))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Materials {
    pub raw: HashMap<String, MaterialEntry>,
    pub manufactured: HashMap<String, MaterialEntry>,
    pub encoded: HashMap<String, MaterialEntry>,
}

impl Materials {
    fn bucket_mut(&mut self, category: MaterialCategory) -> &mut HashMap<String, MaterialEntry> {
        match category {
            MaterialCategory::Raw => &mut self.raw,
            MaterialCategory::Manufactured => &mut self.manufactured,
            MaterialCategory::Encoded => &mut self.encoded,
        }
    }

    pub fn bucket(&self, category: MaterialCategory) -> &HashMap<String, MaterialEntry> {
        match category {
            MaterialCategory::Raw => &self.raw,
            MaterialCategory::Manufactured => &self.manufactured,
            MaterialCategory::Encoded => &self.encoded,
        }
    }

    /// Add to a material's count, clamping at its grade cap. Creates the
    /// entry (at grade 1 unless known) if it doesn't exist yet.
    pub fn add(&mut self, category: MaterialCategory, name: &str, localised_name: Option<String>, count: u32) {
        let key = canonical_material_name(name);
        let grade = material_grade(category, name).unwrap_or(1);
        let cap = grade_cap(grade);
        let bucket = self.bucket_mut(category);
        let entry = bucket.entry(key.clone()).or_insert_with(|| MaterialEntry {
            name: key,
            localised_name: localised_name.clone(),
            category,
            grade,
            count: 0,
            maximum: cap,
        });
        if entry.localised_name.is_none() {
            entry.localised_name = localised_name;
        }
        entry.count = entry.count.saturating_add(count).min(entry.maximum);
    }

    /// Subtract from a material's count, clamping at zero. Returns `true` if
    /// a matching entry was found, so callers can warn on a miss per §4.5.
    pub fn subtract(&mut self, category: MaterialCategory, name: &str, count: u32) -> bool {
        let key = canonical_material_name(name);
        let bucket = self.bucket_mut(category);
        if let Some(entry) = bucket.get_mut(&key) {
            entry.count = entry.count.saturating_sub(count);
            if entry.count == 0 {
                bucket.remove(&key);
            }
            true
        } else {
            false
        }
    }

    /// Subtract from whichever of the three categories has a matching entry,
    /// searching Raw -> Manufactured -> Encoded. Used for ingredient
    /// consumption that doesn't name its own category.
    pub fn subtract_any_category(&mut self, name: &str, count: u32) -> bool {
        for category in [MaterialCategory::Raw, MaterialCategory::Manufactured, MaterialCategory::Encoded] {
            if self.bucket(category).contains_key(&canonical_material_name(name)) {
                return self.subtract(category, name, count);
            }
        }
        false
    }

    /// Wholesale replace one category, as the `Materials` startup event does:
    /// every entry is canonicalized, stamped with its category, a default
    /// grade of 1 (overridden by the catalogue where known), and a maximum
    /// from the grade cap table.
    pub fn set_category(&mut self, category: MaterialCategory, entries: Vec<(String, Option<String>, u32)>) {
        let replaced: HashMap<String, MaterialEntry> = entries
            .into_iter()
            .map(|(name, localised_name, count)| {
                let key = canonical_material_name(&name);
                let grade = material_grade(category, &name).unwrap_or(1);
                let maximum = grade_cap(grade);
                (
                    key.clone(),
                    MaterialEntry {
                        name: key,
                        localised_name,
                        category,
                        grade,
                        count: count.min(maximum),
                        maximum,
                    },
                )
            })
            .collect();
        *self.bucket_mut(category) = replaced;
    }
}

// ---------------------------------------------------------------------
// Missions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionStatus {
    Active,
    Completed,
    Failed,
    Abandoned,
    Redirected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,
    pub name: String,
    pub faction: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub destination_system: Option<String>,
    pub destination_station: Option<String>,
    pub target_faction: Option<String>,
    pub target: Option<String>,
    pub commodity: Option<String>,
    pub count: Option<u32>,
    pub kill_count: Option<u32>,
    pub reward: Option<i64>,
    pub influence: Option<String>,
    pub reputation: Option<String>,
    pub wing: bool,
    pub passenger: bool,
    pub status: MissionStatus,
}

// ---------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------

/// Aggregates that reset whenever a `LoadGame` event starts a new play
/// session. Every field here must be zeroed together by [`Session::reset`]
/// — this is the one slice §9's design notes calls out as reset-together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub start_time: Option<DateTime<Utc>>,
    pub jumps: u32,
    pub total_distance: f64,
    pub fuel_used: f64,
    pub fuel_scoops: u32,
    pub fuel_scooped: f64,
    pub credits_earned: i64,
    pub credits_spent: i64,
    pub net_profit: i64,
    pub bodies_scanned: u32,
    pub systems_visited: u32,
    pub unique_systems_visited: HashSet<String>,
    pub bounties_collected: u32,
    pub bounty_earnings: i64,
    pub missions_completed: u32,
    pub missions_failed: u32,
    pub deaths: u32,
    pub materials_collected: u32,
    pub cargo_traded: u32,
    pub trade_profit: i64,
    pub exploration_earnings: i64,
    pub mining_refined: u32,
    pub elapsed_seconds: u64,
}

impl Session {
    pub fn reset(&mut self, start_time: DateTime<Utc>) {
        *self = Session {
            start_time: Some(start_time),
            ..Session::default()
        };
    }

    pub fn record_system_visit(&mut self, system: &str) {
        self.systems_visited += 1;
        self.unique_systems_visited.insert(system.to_string());
    }

    pub fn recompute_net_profit(&mut self) {
        self.net_profit = self.credits_earned - self.credits_spent;
    }
}

// ---------------------------------------------------------------------
// Carrier
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierFinance {
    pub carrier_balance: Option<i64>,
    pub reserve_balance: Option<i64>,
    pub available_balance: Option<i64>,
    pub tax_rate_rearm: Option<u32>,
    pub tax_rate_refuel: Option<u32>,
    pub tax_rate_repair: Option<u32>,
    pub tax_rate_pioneersupplies: Option<u32>,
    pub tax_rate_shipyard: Option<u32>,
    pub tax_rate_outfitting: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierSpaceUsage {
    pub total_capacity: Option<u32>,
    pub crew: Option<u32>,
    pub cargo: Option<u32>,
    pub cargo_space_reserved: Option<u32>,
    pub ship_packs: Option<u32>,
    pub module_packs: Option<u32>,
    pub free_space: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierService {
    pub name: String,
    pub enabled: bool,
    pub activated: bool,
    pub crew_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierTradeOrder {
    pub commodity: String,
    pub black_market: bool,
    pub purchase_order: Option<u32>,
    pub sale_order: Option<u32>,
    pub price: Option<i64>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Carrier {
    pub carrier_id: Option<i64>,
    pub callsign: String,
    pub name: Option<String>,
    pub docking_access: Option<String>,
    pub allow_notorious: bool,
    pub fuel_level: Option<u32>,
    pub jump_range_current: Option<f64>,
    pub jump_range_max: Option<f64>,
    pub pending_decommission: bool,
    pub jump_in_progress: bool,
    pub space_usage: CarrierSpaceUsage,
    pub finance: CarrierFinance,
    pub services: Vec<CarrierService>,
    pub ship_packs: Vec<String>,
    pub module_packs: Vec<String>,
    /// Keyed by `commodity|blackmarket`, so add/update/cancel by that pair
    /// is a direct lookup rather than a linear scan.
    pub trade_orders: HashMap<String, CarrierTradeOrder>,
    pub current_system: Option<String>,
    pub current_body: Option<String>,
}

pub fn trade_order_key(commodity: &str, black_market: bool) -> String {
    format!("{}|{}", commodity.to_ascii_lowercase(), black_market)
}

// ---------------------------------------------------------------------
// On-foot
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuitType {
    FlightSuit,
    Exploration,
    Tactical,
    Utility,
}

/// Classify a suit by substring match on its internal (non-localized) name,
/// per §4.5's on-foot projection rule.
pub fn classify_suit(internal_name: &str) -> SuitType {
    let name = internal_name.to_ascii_lowercase();
    if name.contains("exploration") || name.contains("artemis") {
        SuitType::Exploration
    } else if name.contains("tactical") || name.contains("dominator") {
        SuitType::Tactical
    } else if name.contains("utility") || name.contains("maverick") {
        SuitType::Utility
    } else {
        // Covers names containing "flight" and anything unrecognized.
        SuitType::FlightSuit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suit {
    pub suit_id: Option<i64>,
    pub name: String,
    pub suit_type: SuitType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitLoadoutWeapon {
    pub slot_name: String,
    pub module_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitLoadoutEntry {
    pub loadout_id: Option<i64>,
    pub loadout_name: Option<String>,
    pub suit: Option<Suit>,
    pub weapons: Vec<SuitLoadoutWeapon>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicScan {
    pub species: String,
    pub system_address: Option<i64>,
    pub body_id: Option<i64>,
    pub analysed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Backpack {
    pub items: HashMap<String, u32>,
    pub components: HashMap<String, u32>,
    pub consumables: HashMap<String, u32>,
    pub data: HashMap<String, u32>,
}

impl Backpack {
    fn bucket_mut(&mut self, kind: &str) -> Option<&mut HashMap<String, u32>> {
        match kind.to_ascii_lowercase().as_str() {
            "item" | "items" => Some(&mut self.items),
            "component" | "components" => Some(&mut self.components),
            "consumable" | "consumables" => Some(&mut self.consumables),
            "data" => Some(&mut self.data),
            _ => None,
        }
    }

    pub fn add(&mut self, kind: &str, name: &str, count: u32) {
        if let Some(bucket) = self.bucket_mut(kind) {
            *bucket.entry(name.to_string()).or_insert(0) += count;
        }
    }

    pub fn remove(&mut self, kind: &str, name: &str, count: u32) {
        if let Some(bucket) = self.bucket_mut(kind) {
            if let Some(entry) = bucket.get_mut(name) {
                *entry = entry.saturating_sub(count);
                if *entry == 0 {
                    bucket.remove(name);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnFoot {
    pub on_foot: bool,
    pub current_loadout: Option<SuitLoadoutEntry>,
    pub suits: Vec<Suit>,
    pub saved_loadouts: Vec<SuitLoadoutEntry>,
    pub backpack: Backpack,
    /// Exobiology scans in progress, upserted by `(species, systemAddress,
    /// bodyId)` until the `Analyse` scan stage completes them.
    pub active_scans: Vec<OrganicScan>,
    pub species_analysed: u32,
}

impl OnFoot {
    pub fn upsert_scan(&mut self, species: &str, system_address: Option<i64>, body_id: Option<i64>, analysed: bool) {
        if let Some(existing) = self
            .active_scans
            .iter_mut()
            .find(|s| s.species == species && s.system_address == system_address && s.body_id == body_id)
        {
            existing.analysed = existing.analysed || analysed;
        } else {
            self.active_scans.push(OrganicScan {
                species: species.to_string(),
                system_address,
                body_id,
                analysed,
            });
        }
    }
}

// ---------------------------------------------------------------------
// Meta + root
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Flips `false -> true` on the first `LoadGame`/`Location` event
    /// observed and never flips back, except via a full session reset.
    pub initialized: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// The full projected game state. Never stored in a global/static —
/// it's owned by [`crate::core::Core`] and reached only through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    pub commander: Commander,
    pub ship: Ship,
    pub location: Location,
    pub materials: Materials,
    /// Keyed by mission id, so "at most one mission per id" holds
    /// structurally.
    pub missions: HashMap<i64, Mission>,
    pub session: Session,
    pub carrier: Option<Carrier>,
    pub on_foot: OnFoot,
    pub meta: Meta,
    /// Decoded from the `Status.json` sidecar's `Flags`/`Flags2` bitmask
    /// plus its pips/fuel/surface/destination fields.
    pub live_status: LiveStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_add_clamps_at_grade_cap() {
        let mut materials = Materials::default();
        materials.add(MaterialCategory::Raw, "carbon", None, 1000);
        assert_eq!(materials.raw["carbon"].count, 300);
        assert_eq!(materials.raw["carbon"].maximum, 300);
    }

    #[test]
    fn material_subtract_removes_entry_at_zero() {
        let mut materials = Materials::default();
        materials.add(MaterialCategory::Raw, "iron", None, 5);
        assert!(materials.subtract(MaterialCategory::Raw, "iron", 5));
        assert!(!materials.raw.contains_key("iron"));
    }

    #[test]
    fn material_subtract_reports_miss() {
        let mut materials = Materials::default();
        assert!(!materials.subtract(MaterialCategory::Raw, "ghost", 1));
    }

    #[test]
    fn unknown_material_defaults_to_grade_one_cap() {
        let mut materials = Materials::default();
        materials.add(MaterialCategory::Raw, "unobtainium", None, 9999);
        assert_eq!(materials.raw["unobtainium"].count, 300);
        assert_eq!(materials.raw["unobtainium"].grade, 1);
    }

    #[test]
    fn subtract_any_category_finds_the_right_bucket() {
        let mut materials = Materials::default();
        materials.add(MaterialCategory::Encoded, "shieldcyclerecordings", None, 5);
        assert!(materials.subtract_any_category("shieldcyclerecordings", 2));
        assert_eq!(materials.encoded["shieldcyclerecordings"].count, 3);
    }

    #[test]
    fn replace_modules_keeps_at_most_one_per_slot() {
        let mut ship = Ship::default();
        ship.replace_modules(vec![
            Module {
                slot: "Slot01".into(),
                item: "weapon_a".into(),
                on: true,
                priority: Some(1),
                health: Some(1.0),
                value: None,
                ammo_in_clip: None,
                ammo_in_hopper: None,
                engineering: None,
            },
            Module {
                slot: "Slot01".into(),
                item: "weapon_b".into(),
                on: true,
                priority: Some(1),
                health: Some(1.0),
                value: None,
                ammo_in_clip: None,
                ammo_in_hopper: None,
                engineering: None,
            },
        ]);
        assert_eq!(ship.modules.len(), 1);
        assert_eq!(ship.modules["Slot01"].item, "weapon_b");
    }

    #[test]
    fn session_reset_zeroes_every_field() {
        let mut session = Session::default();
        session.jumps = 5;
        session.credits_earned = 1000;
        session.unique_systems_visited.insert("Sol".to_string());
        let t = Utc::now();
        session.reset(t);
        assert_eq!(session.jumps, 0);
        assert_eq!(session.credits_earned, 0);
        assert!(session.unique_systems_visited.is_empty());
        assert_eq!(session.start_time, Some(t));
    }

    #[test]
    fn record_system_visit_dedupes_unique_but_not_total() {
        let mut session = Session::default();
        session.record_system_visit("Sol");
        session.record_system_visit("Sol");
        session.record_system_visit("Achenar");
        assert_eq!(session.systems_visited, 3);
        assert_eq!(session.unique_systems_visited.len(), 2);
    }

    #[test]
    fn classify_suit_matches_by_substring() {
        assert_eq!(classify_suit("utc_suit_explorationsuit_class1"), SuitType::Exploration);
        assert_eq!(classify_suit("utc_suit_tacticalsuit_class1"), SuitType::Tactical);
        assert_eq!(classify_suit("utc_suit_utilitysuit_class1"), SuitType::Utility);
        assert_eq!(classify_suit("utc_suit_flightsuit_class1"), SuitType::FlightSuit);
        assert_eq!(classify_suit("something_unrecognized"), SuitType::FlightSuit);
    }

    #[test]
    fn backpack_remove_drops_entry_at_zero() {
        let mut backpack = Backpack::default();
        backpack.add("Item", "health_monitor", 3);
        backpack.remove("Item", "health_monitor", 3);
        assert!(!backpack.items.contains_key("health_monitor"));
    }
}
