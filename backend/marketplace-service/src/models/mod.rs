pub mod chat;
pub mod listing;
pub mod notification;
pub mod profile;
pub mod report;

pub use chat::{ChatMessage, ChatRoom, DecryptedMessage, RoomStatus};
pub use listing::{Listing, ListingStatus};
pub use notification::{Notification, NotificationType};
pub use profile::{UserProfile, UserRole};
pub use report::{Report, ReportAction, ReportReason, ReportStatus, ReportTargetType, SnapshotEntry};
