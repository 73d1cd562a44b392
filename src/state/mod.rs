//! Game-state slices and the projector that keeps them in sync with the
//! journal and sidecar streams.

mod projector;
mod types;

pub use projector::StateProjector;
pub use types::{
    canonical_material_name, classify_suit, grade_cap, material_cap, trade_order_key, Backpack, Carrier,
    CarrierFinance, CarrierService, CarrierSpaceUsage, CarrierTradeOrder, Commander, Fuel, GameState, Location,
    MaterialCategory, MaterialEntry, Materials, Meta, Mission, MissionStatus, Module, OnFoot, OrganicScan, Powerplay,
    RankProgress, Ranks, Reputation, Session, Ship, Station, Suit, SuitLoadoutEntry, SuitLoadoutWeapon, SuitType,
    Surface,
};
