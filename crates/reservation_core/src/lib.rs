pub mod admission;
pub mod domain;
pub mod failure;
pub mod memory;
pub mod permissions;
pub mod ports;
pub mod visibility;

pub use admission::{AdmissionController, AdmissionSnapshot, ReservationDraft, ReservationPatch};
pub use domain::{
    Activity, ActivitySlot, NewActivity, NewSlot, NewUser, Principal, Reservation, ReservationDetails,
    ReservationStatistics, ReservationStatus, Role, User, UserCredentials,
};
pub use failure::{CoreError, CoreResult, Failure, FailureClass, FailureKind};
pub use memory::InMemoryDatabase;
pub use ports::{DatabaseService, PortError, PortResult};
pub use visibility::{ActivityScope, ReservationScope, ReservationSubject};
