//! Page Editor Cache Library
//!
//! Load coordination for the page editor: the host-owned loader session
//! (one parse per file identity), the per-page load status map every loader
//! consults, and the store of published page records.

pub mod identity;
pub mod load_status;
pub mod page_store;
pub mod session;

pub use identity::FileIdentity;
pub use load_status::{LoadCounts, LoadStatus, LoadStatusMap};
pub use page_store::{ChangeSet, PageChange, PageNumber, PageRecord, PageStore, Rendition, StoreStats};
pub use session::{AttachHandle, BeginLoad, LoadTicket, LoaderSession, SessionError};
