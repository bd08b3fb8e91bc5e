//! Data Transfer Objects for REST request/response serialization.
//!
//! Money is serialized as a decimal string with two places (`"110.00"`) and
//! accepted as either a JSON number or a decimal string.

pub mod common_dto;
pub mod consultation_dto;
pub mod donation_dto;
pub mod sponsorship_dto;
pub mod user_dto;

pub use common_dto::*;
pub use consultation_dto::*;
pub use donation_dto::*;
pub use sponsorship_dto::*;
pub use user_dto::*;
