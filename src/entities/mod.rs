// Entity Models
//
// Batches and cards reference each other only through ids. A batch never
// holds its cards in memory; "cards of a batch" is a repository query.

pub mod batch;
pub mod card;
pub mod status;

pub use batch::Batch;
pub use card::Card;
pub use status::{BatchStatus, CardStatus, StatusKind, StatusRef};
