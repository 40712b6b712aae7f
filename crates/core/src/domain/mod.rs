pub mod approval;
pub mod comment;
pub mod group;
pub mod hotel;
pub mod organization;
pub mod request;
