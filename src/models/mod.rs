// Domain and request/response models
pub mod billing;
pub mod celebration;
pub mod common;
pub mod entitlement;
