//! Sidecar file identities and the `Status.json` live-status bitmask.

use serde::{Deserialize, Serialize};

/// The companion JSON files Elite Dangerous writes next to the journal,
/// refreshed out-of-band from the append-only journal stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SidecarFile {
    Status,
    Cargo,
    NavRoute,
    Market,
    Backpack,
    ModulesInfo,
    Shipyard,
    Outfitting,
}

impl SidecarFile {
    pub const ALL: [SidecarFile; 8] = [
        SidecarFile::Status,
        SidecarFile::Cargo,
        SidecarFile::NavRoute,
        SidecarFile::Market,
        SidecarFile::Backpack,
        SidecarFile::ModulesInfo,
        SidecarFile::Shipyard,
        SidecarFile::Outfitting,
    ];

    pub fn filename(self) -> &'static str {
        match self {
            SidecarFile::Status => "Status.json",
            SidecarFile::Cargo => "Cargo.json",
            SidecarFile::NavRoute => "NavRoute.json",
            SidecarFile::Market => "Market.json",
            SidecarFile::Backpack => "Backpack.json",
            SidecarFile::ModulesInfo => "ModulesInfo.json",
            SidecarFile::Shipyard => "Shipyard.json",
            SidecarFile::Outfitting => "Outfitting.json",
        }
    }

    pub fn from_filename(name: &str) -> Option<SidecarFile> {
        SidecarFile::ALL.into_iter().find(|f| f.filename() == name)
    }

    /// `Status.json` changes many times a second in flight; everything else
    /// changes on player action. Distinguished so the watcher can give it a
    /// tighter stability window and poll cadence.
    pub fn is_high_frequency(self) -> bool {
        matches!(self, SidecarFile::Status)
    }
}

/// Where `Status.json`'s `Destination` field points, when the player has a
/// nav-route target selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDestination {
    pub system: Option<i64>,
    pub body: Option<i64>,
    pub name: Option<String>,
}

/// `Status.json` decoded: the `Flags`/`Flags2` bitmask bit by bit, plus the
/// document's other live fields (pips, fuel, surface position, nav
/// destination). Fields default to `false`/`None` for anything the current
/// game version/situation doesn't set — a missing field is never inferred
/// as "unchanged", since this sidecar is always a full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub docked: bool,
    pub landed: bool,
    pub landing_gear_down: bool,
    pub shields_up: bool,
    pub supercruise: bool,
    pub flight_assist_off: bool,
    pub hardpoints_deployed: bool,
    pub in_wing: bool,
    pub lights_on: bool,
    pub cargo_scoop_deployed: bool,
    pub silent_running: bool,
    pub scooping_fuel: bool,
    pub fsd_mass_locked: bool,
    pub fsd_charging: bool,
    pub fsd_cooldown: bool,
    pub low_fuel: bool,
    pub overheating: bool,
    pub in_danger: bool,
    pub being_interdicted: bool,
    pub in_main_ship: bool,
    pub in_fighter: bool,
    pub in_srv: bool,
    pub in_multicrew: bool,
    pub night_vision: bool,
    pub on_foot: bool,
    pub in_taxi: bool,
    pub in_multicrew_gunner: bool,

    // Non-boolean fields carried by the same document.
    pub pips: Option<[u8; 3]>,
    pub fire_group: Option<u32>,
    pub gui_focus: Option<u32>,
    pub fuel_main: Option<f64>,
    pub fuel_reservoir: Option<f64>,
    pub cargo_mass: Option<f64>,
    pub legal_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub body_name: Option<String>,
    pub planet_radius: Option<f64>,
    pub destination: Option<StatusDestination>,
}

impl LiveStatus {
    /// `Flags` is the primary bitmask; `Flags2` (Odyssey) carries the
    /// on-foot/taxi/multicrew-seat bits that didn't fit in the original one.
    /// Decodes only the boolean fields — use [`LiveStatus::from_document`]
    /// to pull the rest of `Status.json`'s fields too.
    pub fn decode(flags: u64, flags2: u64) -> LiveStatus {
        LiveStatus {
            docked: flags & 0x01 != 0,
            landed: flags & 0x02 != 0,
            landing_gear_down: flags & 0x04 != 0,
            shields_up: flags & 0x08 != 0,
            supercruise: flags & 0x10 != 0,
            flight_assist_off: flags & 0x20 != 0,
            hardpoints_deployed: flags & 0x40 != 0,
            in_wing: flags & 0x80 != 0,
            lights_on: flags & 0x100 != 0,
            cargo_scoop_deployed: flags & 0x200 != 0,
            silent_running: flags & 0x1000 != 0,
            scooping_fuel: flags & 0x2000 != 0,
            fsd_mass_locked: flags & 0x10000 != 0,
            fsd_charging: flags & 0x20000 != 0,
            fsd_cooldown: flags & 0x40000 != 0,
            low_fuel: flags & 0x80000 != 0,
            overheating: flags & 0x100000 != 0,
            in_danger: flags & 0x200000 != 0,
            being_interdicted: flags & 0x400000 != 0,
            in_main_ship: flags & 0x1000000 != 0,
            in_fighter: flags & 0x2000000 != 0,
            in_srv: flags & 0x4000000 != 0,
            in_multicrew: flags & 0x8000000 != 0,
            night_vision: flags & 0x10000000 != 0,
            on_foot: flags2 & 0x01 != 0,
            in_taxi: flags2 & 0x04 != 0,
            in_multicrew_gunner: flags2 & 0x02 != 0,
            ..LiveStatus::default()
        }
    }

    /// Decode a full `Status.json` document: the bitmask fields plus pips,
    /// fuel, cargo mass, legal state, surface position and nav destination.
    /// Returns `None` if `Flags` is missing (an empty/mid-write read never
    /// reaches this point — the sidecar watcher filters those out first).
    pub fn from_document(value: &serde_json::Value) -> Option<LiveStatus> {
        let flags = value.get("Flags")?.as_u64()?;
        let flags2 = value.get("Flags2").and_then(|v| v.as_u64()).unwrap_or(0);
        let mut status = LiveStatus::decode(flags, flags2);

        status.pips = value.get("Pips").and_then(|v| v.as_array()).and_then(|arr| {
            if arr.len() == 3 {
                Some([
                    arr[0].as_u64().unwrap_or(0) as u8,
                    arr[1].as_u64().unwrap_or(0) as u8,
                    arr[2].as_u64().unwrap_or(0) as u8,
                ])
            } else {
                None
            }
        });
        status.fire_group = value.get("FireGroup").and_then(|v| v.as_u64()).map(|v| v as u32);
        status.gui_focus = value.get("GuiFocus").and_then(|v| v.as_u64()).map(|v| v as u32);
        if let Some(fuel) = value.get("Fuel") {
            status.fuel_main = fuel.get("FuelMain").and_then(|v| v.as_f64());
            status.fuel_reservoir = fuel.get("FuelReservoir").and_then(|v| v.as_f64());
        }
        status.cargo_mass = value.get("Cargo").and_then(|v| v.as_f64());
        status.legal_state = value.get("LegalState").and_then(|v| v.as_str()).map(str::to_string);
        status.latitude = value.get("Latitude").and_then(|v| v.as_f64());
        status.longitude = value.get("Longitude").and_then(|v| v.as_f64());
        status.altitude = value.get("Altitude").and_then(|v| v.as_f64());
        status.heading = value.get("Heading").and_then(|v| v.as_f64());
        status.body_name = value.get("BodyName").and_then(|v| v.as_str()).map(str::to_string);
        status.planet_radius = value.get("PlanetRadius").and_then(|v| v.as_f64());
        status.destination = value.get("Destination").map(|d| StatusDestination {
            system: d.get("System").and_then(|v| v.as_i64()),
            body: d.get("Body").and_then(|v| v.as_i64()),
            name: d.get("Name").and_then(|v| v.as_str()).map(str::to_string),
        });

        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_docked_and_landing_gear() {
        let status = LiveStatus::decode(0x01 | 0x04, 0);
        assert!(status.docked);
        assert!(status.landing_gear_down);
        assert!(!status.supercruise);
    }

    #[test]
    fn decodes_on_foot_from_secondary_flags() {
        let status = LiveStatus::decode(0, 0x01 | 0x04);
        assert!(status.on_foot);
        assert!(status.in_taxi);
        assert!(!status.docked);
    }

    #[test]
    fn unset_bits_decode_to_false() {
        let status = LiveStatus::decode(0, 0);
        assert_eq!(status, LiveStatus::default());
    }

    #[test]
    fn filename_roundtrips_through_from_filename() {
        for file in SidecarFile::ALL {
            assert_eq!(SidecarFile::from_filename(file.filename()), Some(file));
        }
        assert_eq!(SidecarFile::from_filename("Journal.01.log"), None);
    }
}
