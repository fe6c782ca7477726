pub mod business_entity;

pub use business_entity::{BusinessEntity, BusinessEntityIndex, NewBusinessEntity};
