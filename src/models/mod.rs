pub mod booking;
pub mod court;
pub mod history;
pub mod invitation;
pub mod payment;
pub mod player;
pub mod slot;

pub use booking::{Booking, BookingOptions, BookingStatus, NewBooking, Reschedule};
pub use court::{Court, CourtUpdate, NewCourt};
pub use history::{HistoryAction, HistoryEntry};
pub use invitation::{Invitation, InvitationStatus};
pub use payment::{Payment, PaymentStatus};
pub use player::{Actor, NewPlayer, Player, RatingLevel};
pub use slot::{Interval, SlotView};
