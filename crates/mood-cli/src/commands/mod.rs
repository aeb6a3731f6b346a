pub mod inspect;
pub mod local;
pub mod predict;
