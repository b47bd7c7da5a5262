pub mod archive;
pub mod configuration;
pub mod message;

pub use archive::{ArchivedDelivery, OutgoingMail};
pub use configuration::{
    Capability, ConfigurationRecord, ConfigurationUpdate, Destination, ImageBounds, SourceKind,
};
pub use message::{CandidateMessage, EnrichedMessage, GrabbedImage};
