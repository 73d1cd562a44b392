//! The journal event type and the catalogue of known event kinds.
//!
//! Unlike a `#[serde(tag = "event")]` enum over per-kind structs, which
//! rejects anything it doesn't have a variant for, events here carry an open
//! payload: unknown kinds must still be accepted and their payload retained,
//! so the discriminator and the structured body are deliberately decoupled. The
//! [`KnownEventKind`] enum below exists only as a reference catalogue and for
//! call sites that want an exhaustive match; it is never used to reject a
//! line during parsing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use strum::{AsRefStr, EnumString};

/// One parsed journal line. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// The `event` discriminator field, e.g. `"FSDJump"`.
    pub kind: String,
    /// The full original JSON object, including `timestamp` and `event`.
    /// Handlers decode kind-specific fields from this on demand.
    pub payload: Value,
}

impl Event {
    /// Best-effort typed decode of the payload into a kind-specific struct.
    /// Returns `None` if the payload doesn't match `T`'s shape; callers
    /// should treat that as "nothing to project here", not a parse failure.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn known_kind(&self) -> Option<KnownEventKind> {
        use std::str::FromStr;
        KnownEventKind::from_str(&self.kind).ok()
    }
}

/// Minimal shape every journal line must have to be accepted.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    timestamp: DateTime<Utc>,
    event: String,
}

pub(crate) fn decode_event(raw: &str) -> Option<Event> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let envelope: EventEnvelope = serde_json::from_value(value.clone()).ok()?;
    Some(Event {
        timestamp: envelope.timestamp,
        kind: envelope.event,
        payload: value,
    })
}

/// Reference catalogue of known event kinds, grouped by gameplay area.
/// Variant names match the journal's `event` field verbatim, so
/// `#[strum(serialize_all = ...)]` isn't needed — the discriminator is
/// already PascalCase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum KnownEventKind {
    // -- Startup --
    Fileheader,
    Commander,
    NewCommander,
    ClearSavedGame,
    LoadGame,
    Cargo,
    Materials,
    Missions,
    Passengers,
    Powerplay,
    Progress,
    Rank,
    Reputation,
    Statistics,

    // -- Travel --
    ApproachBody,
    Docked,
    DockingCancelled,
    DockingDenied,
    DockingGranted,
    DockingRequested,
    DockingTimeout,
    FSDJump,
    FSDTarget,
    LeaveBody,
    Liftoff,
    Location,
    StartJump,
    SupercruiseEntry,
    SupercruiseExit,
    Touchdown,
    Undocked,
    NavRoute,
    NavRouteClear,

    // -- Combat --
    Bounty,
    CapShipBond,
    Died,
    EscapeInterdiction,
    FactionKillBond,
    FighterDestroyed,
    HeatDamage,
    HeatWarning,
    HullDamage,
    Interdicted,
    Interdiction,
    PVPKill,
    ShieldState,
    ShipTargeted,
    SRVDestroyed,
    UnderAttack,

    // -- Exploration --
    CodexEntry,
    DiscoveryScan,
    Scan,
    FSSAllBodiesFound,
    FSSBodySignals,
    FSSDiscoveryScan,
    FSSSignalDiscovered,
    MaterialCollected,
    MaterialDiscarded,
    MaterialDiscovered,
    MultiSellExplorationData,
    NavBeaconScan,
    BuyExplorationData,
    SAAScanComplete,
    SAASignalsFound,
    ScanBaryCentre,
    SellExplorationData,
    Screenshot,

    // -- Trade --
    AsteroidCracked,
    BuyTradeData,
    CollectCargo,
    EjectCargo,
    MarketBuy,
    MarketSell,
    MiningRefined,

    // -- Station services --
    BuyAmmo,
    BuyDrones,
    CargoDepot,
    CommunityGoal,
    CommunityGoalDiscard,
    CommunityGoalJoin,
    CommunityGoalReward,
    CrewAssign,
    CrewFire,
    CrewHire,
    EngineerApply,
    EngineerContribution,
    EngineerCraft,
    EngineerLegacyConvert,
    EngineerProgress,
    FetchRemoteModule,
    Market,
    MassModuleStore,
    MaterialTrade,
    MissionAbandoned,
    MissionAccepted,
    MissionCompleted,
    MissionFailed,
    MissionRedirected,
    ModuleBuy,
    ModuleRetrieve,
    ModuleSell,
    ModuleSellRemote,
    ModuleStore,
    ModuleSwap,
    Outfitting,
    PayBounties,
    PayFines,
    PayLegacyFines,
    RedeemVoucher,
    RefuelAll,
    RefuelPartial,
    Repair,
    RepairAll,
    RestockVehicle,
    ScientificResearch,
    SearchAndRescue,
    SellDrones,
    SellShipOnRebuy,
    SetUserShipName,
    Shipyard,
    ShipyardBuy,
    ShipyardNew,
    ShipyardSell,
    ShipyardTransfer,
    ShipyardSwap,
    StoredModules,
    StoredShips,
    TechnologyBroker,
    ClearImpound,

    // -- Mining --
    ProspectedAsteroid,
    LaunchDrone,

    // -- Powerplay --
    PowerplayCollect,
    PowerplayDefect,
    PowerplayDeliver,
    PowerplayFastTrack,
    PowerplayJoin,
    PowerplayLeave,
    PowerplaySalary,
    PowerplayVote,
    PowerplayVoucher,

    // -- Squadrons --
    AppliedToSquadron,
    DisbandedSquadron,
    InvitedToSquadron,
    JoinedSquadron,
    KickedFromSquadron,
    LeftSquadron,
    SharedBookmarkToSquadron,
    SquadronCreated,
    SquadronDemotion,
    SquadronPromotion,
    SquadronStartup,
    WonATrophyForSquadron,

    // -- Fleet carriers --
    CarrierJump,
    CarrierBuy,
    CarrierStats,
    CarrierJumpRequest,
    CarrierJumpCancelled,
    CarrierDecommission,
    CarrierCancelDecommission,
    CarrierBankTransfer,
    CarrierDepositFuel,
    CarrierCrewServices,
    CarrierFinance,
    CarrierShipPack,
    CarrierModulePack,
    CarrierTradeOrder,
    CarrierDockingPermission,
    CarrierNameChanged,

    // -- On foot (Odyssey) --
    Backpack,
    BackpackChange,
    BackpackMaterials,
    BookDropship,
    BookTaxi,
    BuyMicroResources,
    BuySuit,
    BuyWeapon,
    CancelDropship,
    CancelTaxi,
    CollectItems,
    CreateSuitLoadout,
    DeleteSuitLoadout,
    Disembark,
    DropItems,
    DropShipDeploy,
    Embark,
    FCMaterials,
    LoadoutEquipModule,
    LoadoutRemoveModule,
    RenameSuitLoadout,
    Resupply,
    ScanOrganic,
    SellMicroResources,
    SellOrganicData,
    SellSuit,
    SellWeapon,
    ShipLocker,
    SuitLoadout,
    SwitchSuitLoadout,
    TransferMicroResources,
    TradeMicroResources,
    UpgradeSuit,
    UpgradeWeapon,
    UseConsumable,

    // -- Other --
    AfmuRepairs,
    ApproachSettlement,
    ChangeCrewRole,
    CockpitBreached,
    CommitCrime,
    Continued,
    CrewLaunchFighter,
    CrewMemberJoins,
    CrewMemberQuits,
    CrewMemberRoleChange,
    CrimeVictim,
    DatalinkScan,
    DatalinkVoucher,
    DataScanned,
    DockFighter,
    DockSRV,
    EndCrewSession,
    FighterRebuilt,
    FuelScoop,
    Friends,
    JetConeBoost,
    JetConeDamage,
    JoinACrew,
    KickCrewMember,
    LaunchFighter,
    LaunchSRV,
    ModuleInfo,
    Music,
    NpcCrewPaidWage,
    NpcCrewRank,
    Promotion,
    QuitACrew,
    RebootRepair,
    ReceiveText,
    RepairDrone,
    ReservoirReplenished,
    Resurrect,
    Scanned,
    SelfDestruct,
    SendText,
    Shutdown,
    Synthesis,
    SystemsShutdown,
    USSDrop,
    VehicleSwitch,
    WingAdd,
    WingInvite,
    WingJoin,
    WingLeave,
    CargoTransfer,
    SupercruiseDestinationDrop,
}
