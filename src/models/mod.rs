pub mod analysis;
pub mod conversation;
pub mod query;
pub mod request;
pub mod response;
