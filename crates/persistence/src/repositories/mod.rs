//! Repository implementations over the document store.

pub mod alert;
pub mod group;
pub mod invitation;
pub mod location;
pub mod user;

pub use alert::AlertRepository;
pub use group::GroupRepository;
pub use invitation::InvitationRepository;
pub use location::LocationRepository;
pub use user::UserRepository;
