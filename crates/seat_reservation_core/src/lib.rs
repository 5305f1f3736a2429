pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod ports;
pub mod retry;
pub mod trip_token;

pub use clock::{ManualClock, SystemClock};
pub use domain::{
    HoldReceipt, Reservation, ReservationStatus, Schedule, SeatMap, SeatState, SeatTally,
    SeatView, Trip, Vehicle,
};
pub use engine::{EngineSettings, ReservationEngine, DEFAULT_HOLD_MINUTES};
pub use error::{EngineError, EngineResult};
pub use inventory::{SeatInventory, TripCapacity};
pub use memory::{InMemoryCatalog, InMemoryLedger};
pub use ports::{Clock, LedgerTransaction, PortError, PortResult, ReservationLedger, ScheduleCatalog};
pub use retry::RetryPolicy;
