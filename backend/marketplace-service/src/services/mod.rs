pub mod chat_service;
pub mod moderation;
pub mod notification_service;
pub mod report_service;
