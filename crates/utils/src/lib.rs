pub mod response;
pub mod timestamp;
