pub mod marker;
pub mod photo;
pub mod window;
